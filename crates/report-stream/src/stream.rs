use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::model::ReportPayload;

/// Classified inbound channel events, discriminated by their `type` field.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ChannelEvent {
    /// Progress note from the backend, shown as a label.
    Status { message: String },
    /// One analysis phase, optionally carrying body text.
    Phase {
        title: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        content: Option<String>,
    },
    /// Terminal success event.
    Final { payload: ReportPayload },
    /// Terminal failure event.
    Error { message: String },
}

impl ChannelEvent {
    /// `final` and `error` end the session.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Final { .. } | Self::Error { .. })
    }

    pub(crate) fn kind_name(&self) -> &'static str {
        match self {
            Self::Status { .. } => "status",
            Self::Phase { .. } => "phase",
            Self::Final { .. } => "final",
            Self::Error { .. } => "error",
        }
    }
}

/// Decodes one text frame into events.
///
/// A frame holds either one event object or an array of them; arrays keep
/// their order. Frames and array items that do not decode are dropped.
pub(crate) fn decode_frame(text: &str) -> Vec<ChannelEvent> {
    let value: serde_json::Value = match serde_json::from_str(text) {
        Ok(value) => value,
        Err(e) => {
            warn!(error = %e, frame_len = text.len(), "dropping non-JSON channel frame");
            return Vec::new();
        }
    };
    match value {
        serde_json::Value::Array(items) => items.into_iter().filter_map(decode_value).collect(),
        other => decode_value(other).into_iter().collect(),
    }
}

fn decode_value(value: serde_json::Value) -> Option<ChannelEvent> {
    let event_type = value
        .get("type")
        .and_then(|v| v.as_str())
        .unwrap_or("<missing>")
        .to_string();
    match serde_json::from_value(value) {
        Ok(event) => Some(event),
        Err(e) => {
            warn!(event_type = %event_type, error = %e, "dropping unrecognized channel event");
            None
        }
    }
}
