//! Hub wire protocol: the message envelope and its text codec.
//!
//! Every frame exchanged with the Grandmaster hub is a UTF-8 JSON object.
//! Outbound frames always carry the three canonical fields
//!
//! ```text
//! { "app": "<app id>", "content": "<text>", "timestamp": "2025-03-16T12:34:56.000Z" }
//! ```
//!
//! plus any caller-supplied keys, merged last so they win over the
//! canonical ones.  Inbound frames are whatever the hub sends; anything that
//! is not valid JSON is handed to the application as `{"content": <raw>}`.

use chrono::{SecondsFormat, Utc};
use serde::Serialize;
use serde_json::{Map, Value};

/// Content of the envelope sent right after a transport opens.
pub fn handshake_content(app: &str) -> String {
    format!("App connected: {app}")
}

/// Content of the envelope sent right before a graceful close.
pub fn goodbye_content(app: &str) -> String {
    format!("App disconnecting: {app}")
}

/// Current UTC time as an ISO-8601 string with millisecond precision.
pub fn timestamp_now() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// Errors raised while encoding an outbound envelope.
#[derive(thiserror::Error, Debug)]
pub enum CodecError {
    #[error("extra fields must serialize to a JSON object, got {0}")]
    ExtraNotAnObject(&'static str),

    #[error("JSON: {0}")]
    Json(#[from] serde_json::Error),
}

/// Outbound message envelope.
#[derive(Debug, Clone, PartialEq)]
pub struct Envelope {
    pub app: String,
    pub content: String,
    pub timestamp: String,
    /// Caller-supplied fields; merged after the canonical ones.
    pub extra: Map<String, Value>,
}

impl Envelope {
    /// Build an envelope stamped with the current time.
    pub fn new(app: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            app: app.into(),
            content: content.into(),
            timestamp: timestamp_now(),
            extra: Map::new(),
        }
    }

    /// Merge arbitrary serializable data into the envelope.
    ///
    /// `extra` must serialize to a JSON object (or `null`, which adds
    /// nothing).  Later keys replace earlier ones, including the canonical
    /// `app`, `content` and `timestamp`.
    pub fn with_extra<T: Serialize + ?Sized>(mut self, extra: &T) -> Result<Self, CodecError> {
        match serde_json::to_value(extra)? {
            Value::Object(map) => self.extra.extend(map),
            Value::Null => {}
            other => return Err(CodecError::ExtraNotAnObject(json_kind(&other))),
        }
        Ok(self)
    }

    /// Flatten into a single JSON object with override precedence.
    pub fn into_value(self) -> Value {
        let mut map = Map::with_capacity(3 + self.extra.len());
        map.insert("app".into(), Value::String(self.app));
        map.insert("content".into(), Value::String(self.content));
        map.insert("timestamp".into(), Value::String(self.timestamp));
        map.extend(self.extra);
        Value::Object(map)
    }
}

/// Encode an envelope into its wire text.
pub fn encode(envelope: Envelope) -> Result<String, CodecError> {
    Ok(serde_json::to_string(&envelope.into_value())?)
}

/// Decode an inbound frame.
///
/// Never fails: text that does not parse as JSON becomes
/// `{"content": <raw text>}`.
pub fn decode(text: &str) -> Value {
    serde_json::from_str(text).unwrap_or_else(|_| {
        let mut map = Map::with_capacity(1);
        map.insert("content".into(), Value::String(text.to_owned()));
        Value::Object(map)
    })
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}
