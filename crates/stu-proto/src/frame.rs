//! Control-channel framing
//!
//! One JSON text frame per message. Client frames carry an event name, a
//! payload object, and an optional correlation id; the request enum is
//! parsed out of (event, payload) so unknown events fail cleanly instead
//! of panicking mid-dispatch.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::WireError;
use crate::request::ClientRequest;

/// Raw client -> server frame before typed dispatch
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClientFrame {
    pub event: String,
    #[serde(default)]
    pub payload: Value,
    #[serde(
        rename = "correlationId",
        alias = "correlation_id",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub correlation_id: Option<String>,
}

impl ClientFrame {
    /// Decode a text frame
    pub fn decode(text: &str) -> Result<Self, WireError> {
        serde_json::from_str(text)
            .map_err(|e| WireError::invalid_request(format!("malformed frame: {}", e)))
    }

    /// Parse the typed request out of this frame
    pub fn request(&self) -> Result<ClientRequest, WireError> {
        let payload = if self.payload.is_null() {
            Value::Object(serde_json::Map::new())
        } else {
            self.payload.clone()
        };
        let tagged = serde_json::json!({
            "event": self.event,
            "payload": payload,
        });
        serde_json::from_value(tagged).map_err(|e| {
            WireError::invalid_request(format!("unknown or malformed operation {:?}: {}", self.event, e))
        })
    }
}
