// ai
//! 📡 The Bulk-Index Buffer: where records wait in line for their ride to the search index 🚌
//!
//! 🎬 COLD OPEN. INT. BUS STOP. EVENING
//!
//! Every record waits with a chaperone. The chaperone is a control line:
//! `{"update": {"_index": "movies", "_type": "movie", "_id": "tt0113277"}}`.
//! The record stands right behind it. Always right behind it. If the chaperone
//! and the record ever get separated, the bulk API indexes your movie plot as
//! an action directive and everybody has a bad night.
//!
//! ## Rules of the bus 📜
//! - Two stored lines per record: control first, document second. [`IndexBuffer::len`]
//!   is therefore `lines / 2`.
//! - The index name is resolved when the record is added: either the static root,
//!   or `root-YYYY.MM.DD` in the configured local time zone.
//! - [`IndexBuffer::flush`] renders NDJSON with a trailing newline, POSTs it once, and
//!   consumes the buffer. Transport trouble comes back as `status: -1`, not as an error.
//!   A missing endpoint IS an error, raised before anything is sent.
//!
//! ⚠️ No size-based auto-flush here. One invocation, one flush per buffer. 🦆

use std::str::FromStr;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;
use tracing::{debug, error, info};

use crate::clock::Clock;
use crate::transport::{Method, ServiceConfig, Transport, TransportResult};
use crate::wire::DecodedRecord;

#[derive(Debug, Error)]
pub enum BufferError {
    #[error("💀 Bad operation \"{0}\" for the index buffer. The menu is insert, modify and delete. That's the whole menu.")]
    UnsupportedOperation(String),

    #[error("💀 A record bound for '{index}' has no usable 'id' field, and this operation needs one.")]
    MissingId { index: String },

    #[error("💀 {0}")]
    Configuration(String),

    #[error("💀 A bulk line refused to become JSON: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// 🔄 What happened to the row upstream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeKind {
    Insert,
    Modify,
    Delete,
}

impl FromStr for ChangeKind {
    type Err = BufferError;

    /// Case-insensitive. `REMOVE` is what the stream actually calls a delete.
    fn from_str(name: &str) -> Result<Self, Self::Err> {
        match name.to_ascii_lowercase().as_str() {
            "insert" => Ok(ChangeKind::Insert),
            "modify" => Ok(ChangeKind::Modify),
            "delete" | "remove" => Ok(ChangeKind::Delete),
            _ => Err(BufferError::UnsupportedOperation(name.to_string())),
        }
    }
}

/// 🎟️ The bulk action verb written into each control line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum OperationCode {
    Index,
    Update,
    Delete,
}

impl OperationCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            OperationCode::Index => "index",
            OperationCode::Update => "update",
            OperationCode::Delete => "delete",
        }
    }
}

impl From<ChangeKind> for OperationCode {
    fn from(kind: ChangeKind) -> Self {
        match kind {
            ChangeKind::Insert => OperationCode::Index,
            ChangeKind::Modify => OperationCode::Update,
            ChangeKind::Delete => OperationCode::Delete,
        }
    }
}

/// 🎟️ Map a change name to its bulk verb. Total on insert/modify/delete, an error for the rest.
pub fn operation_code(kind: &str) -> Result<OperationCode, BufferError> {
    kind.parse::<ChangeKind>().map(OperationCode::from)
}

/// 📅 Static index name, or one index per local calendar day.
#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum IndexNaming {
    #[default]
    Static,
    Daily,
}

/// 🎯 Where a buffer's records go.
#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct IndexTargetConfig {
    /// 📦 The index name, or the prefix of the daily index names.
    pub index_root: String,
    /// 🏷️ The `_type` written into every control line.
    #[serde(default = "default_index_type")]
    pub index_type: String,
    #[serde(default)]
    pub naming: IndexNaming,
}

fn default_index_type() -> String {
    "_doc".to_string()
}

/// 🚌 The buffer itself. Built fresh per invocation, spent by [`IndexBuffer::flush`].
#[derive(Debug)]
pub struct IndexBuffer {
    target: IndexTargetConfig,
    time_zone: Tz,
    clock: Arc<dyn Clock>,
    lines: Vec<String>,
}

impl IndexBuffer {
    pub fn new(target: IndexTargetConfig, time_zone: Tz, clock: Arc<dyn Clock>) -> Self {
        Self {
            target,
            time_zone,
            clock,
            lines: Vec::new(),
        }
    }

    /// 📅 The index name for a record added right now.
    pub fn resolve_index_name(&self) -> String {
        self.resolve_index_name_at(self.clock.now())
    }

    /// 📅 The index name for a record added at `now`. The date is the local calendar
    /// date in the configured zone, so 23:30 UTC can already be tomorrow in Tokyo.
    pub fn resolve_index_name_at(&self, now: DateTime<Utc>) -> String {
        match self.target.naming {
            IndexNaming::Static => self.target.index_root.clone(),
            IndexNaming::Daily => {
                let here_now = now.with_timezone(&self.time_zone);
                format!("{}-{}", self.target.index_root, here_now.format("%Y.%m.%d"))
            }
        }
    }

    /// 📥 Buffer one record behind its control line.
    ///
    /// With `requires_id`, the control line carries `_id` and a record without one is
    /// rejected with [`BufferError::MissingId`]. Nothing is appended on error.
    pub fn add(
        &mut self,
        kind: ChangeKind,
        record: &DecodedRecord,
        requires_id: bool,
    ) -> Result<(), BufferError> {
        let index_name = self.resolve_index_name();

        let mut directive = Map::new();
        if requires_id {
            let id = record.id().ok_or_else(|| BufferError::MissingId {
                index: index_name.clone(),
            })?;
            directive.insert("_id".to_string(), Value::String(id));
        }
        directive.insert("_index".to_string(), Value::String(index_name));
        directive.insert(
            "_type".to_string(),
            Value::String(self.target.index_type.clone()),
        );

        let operation = OperationCode::from(kind);
        let mut control = Map::new();
        control.insert(operation.as_str().to_string(), Value::Object(directive));

        let control_line = serde_json::to_string(&control)?;
        let document_line = serde_json::to_string(record)?;
        debug!(operation = operation.as_str(), "📥 Buffered {}", control_line);

        // 🎯 the sacred order: chaperone, then record
        self.lines.push(control_line);
        self.lines.push(document_line);
        Ok(())
    }

    /// 🧮 Logical record count.
    pub fn len(&self) -> usize {
        self.lines.len() / 2
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    pub fn lines(&self) -> &[String] {
        &self.lines
    }

    /// 🎼 NDJSON: every line followed by `\n`, trailing one included.
    pub fn render_payload(&self) -> String {
        let estimated_size: usize = self.lines.iter().map(|line| line.len() + 1).sum();
        let mut payload = String::with_capacity(estimated_size);
        for line in &self.lines {
            payload.push_str(line);
            payload.push('\n');
        }
        payload
    }

    /// 🚀 Ship the whole buffer as one bulk POST and return what the service said.
    pub async fn flush(
        self,
        service: &ServiceConfig,
        transport: &dyn Transport,
    ) -> Result<TransportResult, BufferError> {
        let bulk_url = service.bulk_url().ok_or_else(|| {
            BufferError::Configuration(format!(
                "No search service endpoint configured, so the {} records for {}/{} have nowhere to go. Set service.endpoint.",
                self.len(),
                self.target.index_root,
                self.target.index_type
            ))
        })?;

        let payload = self.render_payload();
        let result = transport
            .send(Method::POST, &bulk_url, &service.region, payload)
            .await;

        info!(
            "🚀 Flushed buffer for {}/{}, {} records. Status: {}",
            self.target.index_root,
            self.target.index_type,
            self.len(),
            result.status
        );
        if !result.is_success() {
            error!(
                status = result.status,
                "💀 Bulk flush for {} did not succeed: {}", self.target.index_root, result.body
            );
        }
        Ok(result)
    }
}
