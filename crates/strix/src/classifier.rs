// ai
//! 🚦 The Change Classifier: traffic cop for change events, part-time accountant for counters.
//!
//! 🎬 *[an INSERT, a MODIFY and a REMOVE walk into a batch]*
//!
//! - **Insert**: decode the new image, send it to the primary buffer as an `index`.
//! - **Modify**: decode both images, send the new one to the primary buffer as an
//!   `update`, and project a monitoring record holding how much each counter moved.
//! - **Delete**: politely declined. No buffer is touched, a notice is logged.
//!
//! The projection is allowed to fail on its own: a modification whose old image has
//! no `clicks` still updates the primary index, it just doesn't get a monitoring
//! record. The accountant shrugs, the traffic cop waves the car through. 🦆

use std::fmt;
use std::sync::Arc;

use chrono::SecondsFormat;
use serde::Deserialize;
use thiserror::Error;
use tracing::trace;

use crate::buffer::ChangeKind;
use crate::clock::Clock;
use crate::stream::ChangeEvent;
use crate::wire::{DecodeError, DecodedRecord, DecodedValue, ID_FIELD, WireDecoder};

/// 🔧 What the monitoring projection watches and how it labels its output.
#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct ProjectionConfig {
    /// 📈 Counter fields whose change is reported, in this order.
    #[serde(default = "default_counters")]
    pub counters: Vec<String>,
    #[serde(default = "default_timestamp_field")]
    pub timestamp_field: String,
    #[serde(default = "default_subject_field")]
    pub subject_field: String,
}

fn default_counters() -> Vec<String> {
    vec!["clicks".to_string(), "purchases".to_string()]
}

fn default_timestamp_field() -> String {
    "@timestamp".to_string()
}

fn default_subject_field() -> String {
    "subject_id".to_string()
}

impl Default for ProjectionConfig {
    fn default() -> Self {
        Self {
            counters: default_counters(),
            timestamp_field: default_timestamp_field(),
            subject_field: default_subject_field(),
        }
    }
}

/// 🪞 Which image of a modification we were looking at.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Side {
    New,
    Old,
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Side::New => f.write_str("new"),
            Side::Old => f.write_str("old"),
        }
    }
}

#[derive(Debug, Error, Clone, PartialEq)]
pub enum ProjectionError {
    #[error("💀 Monitored field '{field}' is missing from the {side} image. No delta for you.")]
    MissingField { field: String, side: Side },

    #[error("💀 Monitored field '{field}' in the {side} image is not a number we can subtract.")]
    NonNumericField { field: String, side: Side },
}

/// 💀 Reasons a single event cannot be classified at all.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum EventError {
    #[error(transparent)]
    Decode(#[from] DecodeError),

    #[error("💀 A {kind:?} event showed up without its {image} image.")]
    MissingImage { kind: ChangeKind, image: Side },
}

/// 🚦 Where an event's records should go.
#[derive(Debug, Clone, PartialEq)]
pub enum Routing {
    /// ➕ New row: primary buffer, `index`.
    Index(DecodedRecord),
    /// ✏️ Changed row: primary buffer, `update`, plus the monitoring delta if it could be computed.
    Update {
        record: DecodedRecord,
        delta: Result<DecodedRecord, ProjectionError>,
    },
    /// 🙈 Deletes are not handled. Nothing goes anywhere.
    Ignore,
}

/// 🚦 The classifier: one decoder, one projection config, one clock.
#[derive(Debug)]
pub struct Classifier {
    decoder: WireDecoder,
    projection: ProjectionConfig,
    clock: Arc<dyn Clock>,
}

impl Classifier {
    pub fn new(decoder: WireDecoder, projection: ProjectionConfig, clock: Arc<dyn Clock>) -> Self {
        Self {
            decoder,
            projection,
            clock,
        }
    }

    /// 🚦 Decide what happens to one event. Decoding failures fail the event;
    /// projection failures only cost the monitoring record.
    pub fn classify(&self, event: &ChangeEvent) -> Result<Routing, EventError> {
        match event.kind {
            ChangeKind::Insert => {
                let record = self.decode_image(event, Side::New)?;
                Ok(Routing::Index(record))
            }
            ChangeKind::Modify => {
                let record = self.decode_image(event, Side::New)?;
                let previous = self.decode_image(event, Side::Old)?;
                trace!(?previous, ?record, "✏️ Modification decoded");
                let delta = self.project_delta(&record, &previous);
                Ok(Routing::Update { record, delta })
            }
            ChangeKind::Delete => Ok(Routing::Ignore),
        }
    }

    /// 📈 `{timestamp, subject, counter: new - old...}` for a modification.
    ///
    /// The timestamp is "now" in UTC at second precision, RFC 3339.
    pub fn project_delta(
        &self,
        new: &DecodedRecord,
        old: &DecodedRecord,
    ) -> Result<DecodedRecord, ProjectionError> {
        let subject = new
            .get(ID_FIELD)
            .cloned()
            .ok_or_else(|| ProjectionError::MissingField {
                field: ID_FIELD.to_string(),
                side: Side::New,
            })?;

        let mut delta = DecodedRecord::new();
        delta.insert(
            self.projection.timestamp_field.as_str(),
            self.clock.now().to_rfc3339_opts(SecondsFormat::Secs, true),
        );
        delta.insert(self.projection.subject_field.as_str(), subject);

        for counter in &self.projection.counters {
            let now_count = counter_value(new, counter, Side::New)?;
            let was_count = counter_value(old, counter, Side::Old)?;
            delta.insert(counter.as_str(), now_count.saturating_sub(was_count));
        }
        Ok(delta)
    }

    fn decode_image(&self, event: &ChangeEvent, side: Side) -> Result<DecodedRecord, EventError> {
        let image = match side {
            Side::New => event.new_value.as_ref(),
            Side::Old => event.old_value.as_ref(),
        };
        let image = image.ok_or(EventError::MissingImage {
            kind: event.kind,
            image: side,
        })?;
        Ok(self.decoder.decode_record(image)?)
    }
}

fn counter_value(record: &DecodedRecord, field: &str, side: Side) -> Result<i64, ProjectionError> {
    let value: &DecodedValue = record.get(field).ok_or_else(|| ProjectionError::MissingField {
        field: field.to_string(),
        side,
    })?;
    value.as_counter().ok_or_else(|| ProjectionError::NonNumericField {
        field: field.to_string(),
        side,
    })
}
