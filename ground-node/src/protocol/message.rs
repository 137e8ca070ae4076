//! Message type exchanged on the control and sensor channels.

use crate::error::{Error, Result};
use serde::{Deserialize, Deserializer, Serialize};
use std::time::{SystemTime, UNIX_EPOCH};

/// Metadata value used when a message carries none
pub const NO_METADATA: &str = "None";

/// Known `dataType` tags
pub mod data_type {
    /// Motor-thrust vector (control channel)
    pub const MOTOR_SPEEDS: &str = "motorSpds";
    /// Connection lifecycle notices (control channel)
    pub const CONN_INFO: &str = "connInfo";
    /// Settings propagated to the vehicle (control channel)
    pub const SETTINGS: &str = "settings";
}

/// `connInfo` payload announcing an intentional disconnect
pub const CLOSING: &str = "closing";

/// Current time as floating-point seconds since the Unix epoch
pub fn now_secs() -> f64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs_f64())
        .unwrap_or_default()
}

/// One application message
///
/// Field names follow the wire keys (`dataType`, `data`, `timestamp`,
/// `metadata`) and the wire order.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Message {
    /// Tag identifying the payload semantics
    #[serde(rename = "dataType")]
    pub data_type: String,
    /// Payload, carried as text
    ///
    /// Peers may also send a bare JSON value (e.g. a numeric vector); it is
    /// kept as its compact JSON text.
    #[serde(deserialize_with = "data_as_text")]
    pub data: String,
    /// Sender-side time, seconds since epoch
    pub timestamp: f64,
    /// Free-form auxiliary string, `"None"` when absent
    #[serde(default = "default_metadata")]
    pub metadata: String,
}

fn default_metadata() -> String {
    NO_METADATA.to_string()
}

fn data_as_text<'de, D>(deserializer: D) -> std::result::Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match serde_json::Value::deserialize(deserializer)? {
        serde_json::Value::String(text) => text,
        other => other.to_string(),
    })
}

impl Message {
    /// Build a message stamped with the current time
    pub fn new(
        data_type: impl Into<String>,
        data: impl Into<String>,
        metadata: impl Into<String>,
    ) -> Self {
        Self {
            data_type: data_type.into(),
            data: data.into(),
            timestamp: now_secs(),
            metadata: metadata.into(),
        }
    }

    /// Parse a frame body produced by [`crate::protocol::codec::encode`]
    pub fn parse(body: &str) -> Result<Self> {
        let msg: Message = serde_json::from_str(body)?;
        if !msg.timestamp.is_finite() {
            return Err(Error::InvalidFrame(format!(
                "non-finite timestamp {}",
                msg.timestamp
            )));
        }
        Ok(msg)
    }

    /// One-way transit latency in seconds, measured against `now`
    pub fn latency_at(&self, now: f64) -> f64 {
        now - self.timestamp
    }

    /// Whether this is the peer's "closing" notice
    pub fn is_closing(&self) -> bool {
        self.data_type == data_type::CONN_INFO && self.data == CLOSING
    }
}

/// Render a motor-thrust vector the way it travels in the `data` field
pub fn format_thrust(speeds: &[f64]) -> String {
    format!("{:?}", speeds)
}
