use std::fmt;

use serde::{Deserialize, Serialize};

/// Unique token for a display event: enqueue time in milliseconds plus a
/// random suffix.
#[derive(Clone, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub struct EventId(pub String);

impl EventId {
    pub fn generate() -> Self {
        let millis = chrono::Utc::now().timestamp_millis();
        let nonce = uuid::Uuid::new_v4().simple().to_string();
        Self(format!("{millis}-{}", &nonce[..8]))
    }
}

impl fmt::Display for EventId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// What produced a display event.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DisplayKind {
    /// Backend progress note.
    Status,
    /// Analysis phase (or one segment of it).
    Phase,
    /// Client-side informational note, e.g. the switch to blocking mode.
    Notice,
    /// The final report; revealed in one shot.
    Final,
}

/// One unit the user should see appear.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DisplayEvent {
    pub id: EventId,
    pub kind: DisplayKind,
    pub title: String,
    /// `None` marks a label-only event.
    pub content: Option<String>,
}

impl DisplayEvent {
    pub fn new(kind: DisplayKind, title: impl Into<String>, content: Option<String>) -> Self {
        Self {
            id: EventId::generate(),
            kind,
            title: title.into(),
            content: content.filter(|c| !c.is_empty()),
        }
    }

    pub fn label(kind: DisplayKind, title: impl Into<String>) -> Self {
        Self::new(kind, title, None)
    }

    /// Number of characters the scheduler reveals for this event.
    pub fn content_chars(&self) -> usize {
        self.content.as_deref().map_or(0, |c| c.chars().count())
    }

    pub fn is_label(&self) -> bool {
        self.content.is_none()
    }
}

/// A display event as currently shown: the event plus how much of its
/// content has been revealed.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RevealedEvent {
    pub event: DisplayEvent,
    pub revealed_chars: usize,
}

impl RevealedEvent {
    pub(crate) fn begin(event: DisplayEvent) -> Self {
        Self {
            event,
            revealed_chars: 0,
        }
    }

    /// Visible prefix of the content.
    pub fn visible_text(&self) -> &str {
        let Some(content) = self.event.content.as_deref() else {
            return "";
        };
        match content.char_indices().nth(self.revealed_chars) {
            Some((idx, _)) => &content[..idx],
            None => content,
        }
    }

    pub fn is_complete(&self) -> bool {
        self.revealed_chars >= self.event.content_chars()
    }

    pub(crate) fn reveal_all(&mut self) {
        self.revealed_chars = self.event.content_chars();
    }
}
