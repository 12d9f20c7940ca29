//! Frame — the message unit of the chat streaming endpoint.
//!
//! DESIGN
//! ======
//! Outbound frames are a closed set (`init` once per connection, then one
//! `message` per user turn) and serialize through a serde tag. Inbound
//! frames arrive as loosely-shaped JSON text; `InboundFrame::parse` narrows
//! them into tagged variants and maps anything it does not recognize to
//! `InboundFrame::Unrecognized` instead of returning an error, so the
//! connection layer has exactly one failure path to render.

use serde::{Deserialize, Serialize};
use serde_json::Value;

// =============================================================================
// FIELD CONSTANTS
// =============================================================================

/// Frame key carrying the frame kind.
pub const FRAME_TYPE: &str = "type";

/// Frame key carrying reply or error text.
pub const FRAME_MESSAGE: &str = "message";

/// `type` value marking an inbound error frame.
pub const FRAME_TYPE_ERROR: &str = "error";

// =============================================================================
// OUTBOUND
// =============================================================================

/// Frames the client writes to the streaming endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum OutboundFrame {
    /// Binds the connection to a backend session. Sent once per open.
    Init { folder: String, document: String },
    /// One user turn.
    Message { message: String, folder: String, document: String },
}

impl OutboundFrame {
    #[must_use]
    pub fn init(folder: impl Into<String>, document: impl Into<String>) -> Self {
        Self::Init { folder: folder.into(), document: document.into() }
    }

    #[must_use]
    pub fn message(message: impl Into<String>, folder: impl Into<String>, document: impl Into<String>) -> Self {
        Self::Message { message: message.into(), folder: folder.into(), document: document.into() }
    }

    /// Encode as the JSON text payload of a websocket message.
    #[must_use]
    pub fn to_text(&self) -> String {
        // Serializing a derive-only enum of strings cannot fail.
        serde_json::to_string(self).unwrap_or_default()
    }
}

// =============================================================================
// INBOUND
// =============================================================================

/// Frames the server writes back, narrowed from raw JSON.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InboundFrame {
    /// Assistant reply text.
    Reply { message: String },
    /// Server-side failure; `message` is user-facing.
    Error { message: String },
    /// Not JSON, not an object, or missing the expected fields.
    Unrecognized { raw: String },
}

impl InboundFrame {
    /// Narrow a text payload into a frame variant. Never fails.
    #[must_use]
    pub fn parse(text: &str) -> Self {
        let Ok(value) = serde_json::from_str::<Value>(text) else {
            return Self::unrecognized(text);
        };
        let Some(object) = value.as_object() else {
            return Self::unrecognized(text);
        };

        let message = object.get(FRAME_MESSAGE).and_then(Value::as_str);
        let is_error = object.get(FRAME_TYPE).and_then(Value::as_str) == Some(FRAME_TYPE_ERROR);

        match (is_error, message) {
            (true, Some(message)) => Self::Error { message: message.to_owned() },
            (true, None) => Self::Error { message: "unknown server error".to_owned() },
            (false, Some(message)) => Self::Reply { message: message.to_owned() },
            (false, None) => Self::unrecognized(text),
        }
    }

    fn unrecognized(text: &str) -> Self {
        Self::Unrecognized { raw: text.to_owned() }
    }
}

#[cfg(test)]
#[path = "frame_test.rs"]
mod tests;
