//! Client-side chat session manager for the document-study assistant.
//!
//! SYSTEM CONTEXT
//! ==============
//! A user opens a document stored in a folder and chats with an AI tutor
//! about it. Storage, summarization, and inference live behind an external
//! REST + WebSocket API. This crate owns the client half: the per-panel
//! streaming connection (`net::panel`), its state machine
//! (`net::connection`), the transcript it feeds (`state::chat`), and the
//! REST helpers used to load and upload documents (`net::api`, `upload`).

pub mod config;
pub mod frame;
pub mod net;
pub mod session;
pub mod state;
pub mod upload;

pub use config::ChatConfig;
pub use net::api::{ApiClient, ApiError, LoadedDocument};
pub use net::panel::{ChatPanel, PanelError};
pub use session::SessionIdentity;
pub use state::chat::{ChatMessage, ChatState, Role};
