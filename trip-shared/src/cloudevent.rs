//! CloudEvents envelope used on both the device-status and trip-event
//! topics.
//!
//! Only the envelope fields the pipeline relies on are modeled; unknown
//! fields in incoming records are ignored on decode.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

fn default_specversion() -> String {
    "1.0".to_string()
}

/// Generic CloudEvent envelope with a typed payload.
///
/// `subject` carries the device id for every record in this pipeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CloudEvent<T> {
    pub id: String,

    /// Upstream integration that produced the event.
    pub source: String,

    #[serde(default = "default_specversion")]
    pub specversion: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subject: Option<String>,

    pub time: DateTime<Utc>,

    #[serde(rename = "type")]
    pub event_type: String,

    pub data: T,
}

impl<T> CloudEvent<T> {
    /// Wrap a payload in a fresh envelope with a generated id and the
    /// current wall-clock time.
    pub fn new(source: &str, subject: &str, event_type: &str, data: T) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            source: source.to_string(),
            specversion: default_specversion(),
            subject: Some(subject.to_string()),
            time: Utc::now(),
            event_type: event_type.to_string(),
            data,
        }
    }
}
