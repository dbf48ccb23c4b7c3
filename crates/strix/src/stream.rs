//! 🌊 The upstream batch envelope and the [`ChangeEvent`] each record becomes.
//!
//! The change stream hands us `{"Records": [...]}`. Each record names what happened
//! (`eventName`) and carries the row images as raw tagged JSON. We keep the images
//! raw on purpose: decoding happens per event in the classifier, so one cursed image
//! costs one event, not the batch.

use serde::Deserialize;
use serde_json::Value;

use crate::buffer::{BufferError, ChangeKind};

/// 📦 One delivery from the change stream.
#[derive(Debug, Deserialize, Clone, Default)]
pub struct StreamBatch {
    #[serde(rename = "Records", default)]
    pub records: Vec<StreamRecord>,
}

/// 📄 One record of the delivery, as the stream spells it.
#[derive(Debug, Deserialize, Clone)]
pub struct StreamRecord {
    #[serde(rename = "eventID", default)]
    pub event_id: Option<String>,
    #[serde(rename = "eventName")]
    pub event_name: String,
    #[serde(default)]
    pub dynamodb: StreamImages,
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct StreamImages {
    #[serde(rename = "NewImage", default)]
    pub new_image: Option<Value>,
    #[serde(rename = "OldImage", default)]
    pub old_image: Option<Value>,
}

/// 🔄 One unit of input: what happened, plus the wire-encoded images.
///
/// `new_value` is present for inserts and modifications, `old_value` for modifications.
#[derive(Debug, Clone)]
pub struct ChangeEvent {
    pub event_id: Option<String>,
    pub kind: ChangeKind,
    pub new_value: Option<Value>,
    pub old_value: Option<Value>,
}

impl ChangeEvent {
    pub fn insert(new_value: Value) -> Self {
        Self {
            event_id: None,
            kind: ChangeKind::Insert,
            new_value: Some(new_value),
            old_value: None,
        }
    }

    pub fn modify(old_value: Value, new_value: Value) -> Self {
        Self {
            event_id: None,
            kind: ChangeKind::Modify,
            new_value: Some(new_value),
            old_value: Some(old_value),
        }
    }

    pub fn delete() -> Self {
        Self {
            event_id: None,
            kind: ChangeKind::Delete,
            new_value: None,
            old_value: None,
        }
    }

    pub fn with_event_id(mut self, event_id: impl Into<String>) -> Self {
        self.event_id = Some(event_id.into());
        self
    }
}

impl TryFrom<StreamRecord> for ChangeEvent {
    type Error = BufferError;

    /// 💀 An `eventName` we don't know is a caller bug, not a bad row.
    fn try_from(record: StreamRecord) -> Result<Self, Self::Error> {
        Ok(Self {
            kind: record.event_name.parse()?,
            event_id: record.event_id,
            new_value: record.dynamodb.new_image,
            old_value: record.dynamodb.old_image,
        })
    }
}

impl StreamBatch {
    /// 🔄 Convert every record, failing fast on the first unknown event name.
    pub fn into_events(self) -> Result<Vec<ChangeEvent>, BufferError> {
        self.records.into_iter().map(ChangeEvent::try_from).collect()
    }
}
