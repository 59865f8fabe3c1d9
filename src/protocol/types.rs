//! Message kinds and payload helpers for the A2A protocol.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Opaque key/value document carried by envelopes, tool parameters and results.
pub type Payload = Map<String, Value>;

/// Message type classification.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum MessageType {
    /// Request expecting a response
    Request,
    /// Response to a request
    Response,
    /// Fire-and-forget notification
    Event,
    /// Liveness signal
    Heartbeat,
}

impl std::fmt::Display for MessageType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MessageType::Request => write!(f, "request"),
            MessageType::Response => write!(f, "response"),
            MessageType::Event => write!(f, "event"),
            MessageType::Heartbeat => write!(f, "heartbeat"),
        }
    }
}

/// Convert a JSON value into a payload, wrapping non-objects under `value`.
pub fn into_payload(value: Value) -> Payload {
    match value {
        Value::Object(map) => map,
        Value::Null => Payload::new(),
        other => {
            let mut map = Payload::new();
            map.insert("value".to_string(), other);
            map
        }
    }
}

/// Build an error-shaped payload: `{status: "error", message}`.
pub fn error_payload(message: impl Into<String>) -> Payload {
    let mut map = Payload::new();
    map.insert("status".to_string(), Value::String("error".to_string()));
    map.insert("message".to_string(), Value::String(message.into()));
    map
}

/// Read the `status` field of a payload, if it is a string.
pub fn payload_status(payload: &Payload) -> Option<&str> {
    payload.get("status").and_then(Value::as_str)
}
