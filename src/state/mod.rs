//! UI-facing state rendered by the chat panel.
//!
//! SYSTEM CONTEXT
//! ==============
//! `chat` holds the transcript and input-side flags. The panel driver owns
//! the only mutable copy and publishes clones for rendering.

pub mod chat;
