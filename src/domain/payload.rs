use serde::{Deserialize, Serialize};
use serde_json::Value;
use time::OffsetDateTime;

/// Event notification carried by every webhook
///
/// Field order is the wire order: `{"event", "timestamp", "data"}`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Payload {
    pub event: String,

    #[serde(with = "time::serde::rfc3339")]
    pub timestamp: OffsetDateTime,

    #[serde(default)]
    pub data: Value,
}

impl Payload {
    /// Create a payload stamped with the current time
    pub fn new(event: impl Into<String>, data: Value) -> Self {
        Self::with_timestamp(event, OffsetDateTime::now_utc(), data)
    }

    /// Create a payload with an explicit timestamp
    pub fn with_timestamp(event: impl Into<String>, timestamp: OffsetDateTime, data: Value) -> Self {
        Self {
            event: event.into(),
            timestamp,
            data,
        }
    }

    /// Serialize to the JSON bytes that are signed and transmitted
    pub fn to_canonical_json(&self) -> Result<Vec<u8>, serde_json::Error> {
        serde_json::to_vec(self)
    }
}
