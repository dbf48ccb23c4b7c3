//! 🎬 *[a batch of change events arrives. two buffers wait, empty and hopeful.]*
//! *[one pass. no going back. then the flush.]*
//!
//! 🧵 The batch driver. It walks the batch exactly once, asks the [`Classifier`]
//! where each event goes, fills the primary and monitoring [`IndexBuffer`]s, and
//! then flushes every buffer that got at least one record. Empty buffers stay home;
//! nobody needs a bulk request with nothing in it.
//!
//! ⚠️ Partial-batch semantics: a broken event is logged, recorded in the
//! [`BatchReport`], and skipped. Configuration and caller bugs abort the whole
//! invocation. Transport failures are neither: they ride along in the report as
//! `status: -1`, and whoever invoked us decides whether the batch comes back.

use std::sync::Arc;

use serde::Serialize;
use thiserror::Error;
use tracing::{info, warn};

use crate::app_config::AppConfig;
use crate::buffer::{BufferError, ChangeKind, IndexBuffer};
use crate::classifier::{Classifier, Routing};
use crate::clock::Clock;
use crate::stream::{ChangeEvent, StreamBatch};
use crate::transport::{Transport, TransportResult};
use crate::wire::WireDecoder;

/// 💀 Failures that sink the whole invocation.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error(transparent)]
    Buffer(#[from] BufferError),
}

/// 🗒️ One event that didn't make it, and why.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SkippedEvent {
    /// Position of the event in the batch, zero-based.
    pub position: usize,
    pub event_id: Option<String>,
    pub reason: String,
}

/// 📋 Everything an invocation did, for the invoker to judge.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct BatchReport {
    pub events_seen: usize,
    pub primary_records: usize,
    pub monitoring_records: usize,
    pub ignored_deletes: usize,
    /// Events that produced no primary record.
    pub skipped_events: Vec<SkippedEvent>,
    /// Modifications that were indexed but got no monitoring record.
    pub skipped_projections: Vec<SkippedEvent>,
    pub primary_flush: Option<TransportResult>,
    pub monitoring_flush: Option<TransportResult>,
}

impl BatchReport {
    pub fn flush_count(&self) -> usize {
        usize::from(self.primary_flush.is_some()) + usize::from(self.monitoring_flush.is_some())
    }

    /// ✅ Every flush that happened got a 2xx.
    pub fn all_flushes_succeeded(&self) -> bool {
        self.primary_flush
            .iter()
            .chain(self.monitoring_flush.iter())
            .all(TransportResult::is_success)
    }
}

/// 🧵 One invocation's worth of wiring: config, transport, clock.
#[derive(Debug)]
pub struct Pipeline<'a> {
    config: &'a AppConfig,
    transport: &'a dyn Transport,
    clock: Arc<dyn Clock>,
}

impl<'a> Pipeline<'a> {
    pub fn new(config: &'a AppConfig, transport: &'a dyn Transport, clock: Arc<dyn Clock>) -> Self {
        Self {
            config,
            transport,
            clock,
        }
    }

    /// 🌊 Convert the raw stream envelope and process it. An unknown `eventName`
    /// aborts before any buffer is touched.
    pub async fn process_stream_batch(&self, batch: StreamBatch) -> Result<BatchReport, PipelineError> {
        let events = batch.into_events()?;
        self.process_batch(&events).await
    }

    /// 🚀 One pass over `events`, then at most two flushes: primary first, monitoring second.
    pub async fn process_batch(&self, events: &[ChangeEvent]) -> Result<BatchReport, PipelineError> {
        let classifier = Classifier::new(
            WireDecoder::new(self.config.decoder.clone()),
            self.config.projection.clone(),
            Arc::clone(&self.clock),
        );
        let mut primary = IndexBuffer::new(
            self.config.primary.clone(),
            self.config.time_zone,
            Arc::clone(&self.clock),
        );
        let mut monitoring = IndexBuffer::new(
            self.config.monitoring.clone(),
            self.config.time_zone,
            Arc::clone(&self.clock),
        );

        let mut report = BatchReport {
            events_seen: events.len(),
            ..BatchReport::default()
        };

        for (position, event) in events.iter().enumerate() {
            let skip = |reason: String| SkippedEvent {
                position,
                event_id: event.event_id.clone(),
                reason,
            };

            let routing = match classifier.classify(event) {
                Ok(routing) => routing,
                Err(err) => {
                    warn!(position, "⚠️ Skipping event that would not decode: {}", err);
                    report.skipped_events.push(skip(err.to_string()));
                    continue;
                }
            };

            match routing {
                Routing::Ignore => {
                    info!(position, "🙈 Ignoring DELETE, deletes are not shipped to the index");
                    report.ignored_deletes += 1;
                }
                Routing::Index(record) => {
                    match admit(primary.add(ChangeKind::Insert, &record, true))? {
                        Some(reason) => report.skipped_events.push(skip(reason)),
                        None => report.primary_records += 1,
                    }
                }
                Routing::Update { record, delta } => {
                    if let Some(reason) = admit(primary.add(ChangeKind::Modify, &record, true))? {
                        report.skipped_events.push(skip(reason));
                        continue;
                    }
                    report.primary_records += 1;

                    match delta {
                        Ok(delta) => {
                            monitoring.add(ChangeKind::Insert, &delta, false)?;
                            report.monitoring_records += 1;
                        }
                        Err(err) => {
                            warn!(position, "⚠️ Indexed the update but skipped its monitoring record: {}", err);
                            report.skipped_projections.push(skip(err.to_string()));
                        }
                    }
                }
            }
        }

        if !primary.is_empty() {
            report.primary_flush = Some(primary.flush(&self.config.service, self.transport).await?);
        }
        if !monitoring.is_empty() {
            report.monitoring_flush = Some(monitoring.flush(&self.config.service, self.transport).await?);
        }

        info!(
            "📋 Batch done: {} events, {} primary, {} monitoring, {} deletes ignored, {} skipped, {} flushes",
            report.events_seen,
            report.primary_records,
            report.monitoring_records,
            report.ignored_deletes,
            report.skipped_events.len(),
            report.flush_count()
        );
        Ok(report)
    }
}

/// 🚪 A missing id costs the event; anything else from the buffer costs the invocation.
fn admit(outcome: Result<(), BufferError>) -> Result<Option<String>, BufferError> {
    match outcome {
        Ok(()) => Ok(None),
        Err(err @ BufferError::MissingId { .. }) => {
            warn!("⚠️ Skipping event: {}", err);
            Ok(Some(err.to_string()))
        }
        Err(err) => Err(err),
    }
}
