//! Chat session state — transcript, input, and suggestion gating.
//!
//! DESIGN
//! ======
//! The transcript is append-only: insertion order is display order and
//! entries are never edited or removed. Each exchange moves the panel from
//! idle to awaiting (`loading`) and back; while awaiting, the input field
//! still accepts text but `begin_send` refuses to emit.
//!
//! Suggestion chips are visible right after a document loads, hidden on
//! every send, and come back once the transcript is long enough (the driver
//! applies the reveal delay).

use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Canned follow-up questions offered as suggestion chips.
pub const SUGGESTIONS: [&str; 4] = [
    "Can you summarize this document?",
    "Explain the key concepts",
    "Explain the difficult parts in simple terms",
    "What are some real-world applications of this content?",
];

const GREETING: &str = "Hello! If you have any questions about the document, ask me.";

// =============================================================================
// MESSAGE
// =============================================================================

/// Author of a transcript entry.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
    System,
}

/// One transcript entry. Immutable once created.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    /// Time-ordered unique id (UUID v7).
    pub id: String,
    pub role: Role,
    /// Message text; may carry lightweight markup for the renderer.
    pub content: String,
    /// Milliseconds since Unix epoch.
    pub timestamp: i64,
}

impl ChatMessage {
    #[must_use]
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self { id: Uuid::now_v7().to_string(), role, content: content.into(), timestamp: now_ms() }
    }
}

fn now_ms() -> i64 {
    let Ok(dur) = SystemTime::now().duration_since(UNIX_EPOCH) else {
        return 0;
    };
    i64::try_from(dur.as_millis()).unwrap_or(0)
}

// =============================================================================
// CONNECTION STATE
// =============================================================================

/// Streaming connection status shown by the panel indicator.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum ConnectionState {
    #[default]
    Disconnected,
    Connecting,
    Connected,
}

// =============================================================================
// CHAT STATE
// =============================================================================

/// Everything the panel renders.
#[derive(Clone, Debug)]
pub struct ChatState {
    pub messages: Vec<ChatMessage>,
    pub input: String,
    /// Text the user highlighted in the document viewer, if any.
    pub selected_text: Option<String>,
    /// Awaiting a reply.
    pub loading: bool,
    pub suggestions_visible: bool,
    pub document_loaded: bool,
    pub connection: ConnectionState,
}

impl Default for ChatState {
    fn default() -> Self {
        Self::new()
    }
}

impl ChatState {
    /// Panel state before any document is loaded.
    #[must_use]
    pub fn new() -> Self {
        Self {
            messages: vec![ChatMessage::new(Role::Assistant, GREETING)],
            input: String::new(),
            selected_text: None,
            loading: false,
            suggestions_visible: false,
            document_loaded: false,
            connection: ConnectionState::Disconnected,
        }
    }

    /// Seed state for a panel mounted on a loaded document.
    #[must_use]
    pub fn for_document(title: &str) -> Self {
        Self {
            messages: vec![ChatMessage::new(
                Role::Assistant,
                format!("\"{title}\" has been loaded. What would you like to know about it?"),
            )],
            suggestions_visible: true,
            document_loaded: true,
            ..Self::new()
        }
    }

    /// Append an entry and return it.
    pub fn push(&mut self, role: Role, content: impl Into<String>) -> &ChatMessage {
        self.messages.push(ChatMessage::new(role, content));
        let last = self.messages.len() - 1;
        &self.messages[last]
    }

    pub fn push_system(&mut self, content: impl Into<String>) {
        self.push(Role::System, content);
    }

    /// Append an assistant entry and complete the pending exchange.
    pub fn push_reply(&mut self, content: impl Into<String>) {
        self.push(Role::Assistant, content);
        self.loading = false;
    }

    /// Whether the send action is enabled.
    #[must_use]
    pub fn can_send(&self) -> bool {
        self.document_loaded && !self.loading && !self.input.trim().is_empty()
    }

    /// Move the input into the transcript as a user entry.
    ///
    /// Returns the trimmed text, or `None` when the input is blank or an
    /// exchange is already pending. Does not touch `loading`; the caller sets
    /// it once it knows the message actually went out.
    pub fn begin_send(&mut self) -> Option<String> {
        let content = self.input.trim().to_owned();
        if content.is_empty() || self.loading {
            return None;
        }

        self.push(Role::User, content.clone());
        self.input.clear();
        self.selected_text = None;
        self.suggestions_visible = false;
        Some(content)
    }

    pub fn set_input(&mut self, text: impl Into<String>) {
        self.input = text.into();
    }

    /// Record a highlighted passage. Blank selections are ignored.
    pub fn select_text(&mut self, text: &str) {
        let trimmed = text.trim();
        if !trimmed.is_empty() {
            self.selected_text = Some(trimmed.to_owned());
        }
    }

    /// Fill the input with a question about the current selection.
    pub fn ask_about_selection(&mut self) -> bool {
        let Some(selected) = self.selected_text.as_deref() else {
            return false;
        };
        self.input = format!("Please explain \"{selected}\"");
        true
    }

    /// Fill the input with the suggestion at `index`.
    pub fn apply_suggestion(&mut self, index: usize) -> bool {
        let Some(suggestion) = SUGGESTIONS.get(index) else {
            return false;
        };
        self.input = (*suggestion).to_owned();
        true
    }

    /// Whether hidden chips should be scheduled to come back.
    #[must_use]
    pub fn suggestions_due(&self, threshold: usize) -> bool {
        !self.suggestions_visible && self.messages.len() >= threshold
    }

    pub fn reveal_suggestions(&mut self) {
        self.suggestions_visible = true;
    }
}

#[cfg(test)]
#[path = "chat_test.rs"]
mod tests;
