//! Connection manager — the chat panel's state machine.
//!
//! ARCHITECTURE
//! ============
//! Every input to the panel (socket lifecycle, inbound frames, timers, user
//! actions) is an [`Event`]. [`ConnectionManager::handle`] is the single
//! transition function: it mutates the chat state, queue, and reconnect
//! policy, and returns the [`Effect`]s the driver must perform (dial, write a
//! frame, arm or cancel a timer, hang up). Nothing here touches a socket or a
//! clock, so every path is testable by feeding events.
//!
//! LIFECYCLE
//! =========
//! 1. `Connect` (or `DocumentLoaded`) → connecting, dial, arm connect timeout
//! 2. `Opened` → connected, reset backoff, send init, flush queue
//!    (entries leave the queue only once `QueueFlushed` confirms the writes)
//! 3. `Inbound` → assistant entry, loading cleared
//! 4. unclean `Closed` / `TimedOut` → reconnect with backoff until exhausted
//! 5. `Teardown` → cancel timers, hang up, drop queue; later events ignored
//!
//! ERROR HANDLING
//! ==============
//! Transport and parse failures become transcript entries. `handle` never
//! returns an error and never panics on malformed input.

use std::time::Duration;

use tracing::{debug, info, warn};

use crate::config::ChatConfig;
use crate::frame::{InboundFrame, OutboundFrame};
use crate::net::queue::MessageQueue;
use crate::net::reconnect::ReconnectPolicy;
use crate::net::transport::{Route, select_route};
use crate::session::SessionIdentity;
use crate::state::chat::{ChatState, ConnectionState};

// =============================================================================
// USER-FACING TEXT
// =============================================================================

pub const MSG_LOAD_DOCUMENT_FIRST: &str = "Please load a document first.";
pub const MSG_CONNECTED: &str = "Connected to the AI tutor.";
pub const MSG_QUEUED: &str = "Not connected yet. Your message will be sent once the connection opens.";
pub const MSG_RESPONSE_FAILED: &str = "Sorry, an error occurred while processing the response. Please try again.";
pub const MSG_CONNECTION_ERROR: &str = "Sorry, the connection to the AI tutor failed. Please try again.";
pub const MSG_CONNECTION_LOST: &str = "Connection to the AI tutor was lost.";
pub const MSG_CONNECT_TIMEOUT: &str = "Connecting to the AI tutor timed out.";
pub const MSG_RECONNECT_EXHAUSTED: &str =
    "Could not reconnect to the AI tutor. Please refresh the page or try again later.";

// =============================================================================
// EVENTS + EFFECTS
// =============================================================================

/// Inputs to the state machine.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Event {
    /// Open the streaming connection for the current session.
    Connect,
    /// The document finished loading; binds the session and connects.
    DocumentLoaded(SessionIdentity),
    /// The pending dial completed.
    Opened,
    /// The driver wrote the first `sent` frames of a `FlushQueue` batch.
    QueueFlushed { sent: usize },
    /// A text frame arrived.
    Inbound(String),
    /// The transport reported an error.
    TransportError(String),
    /// The connection closed. `clean` means a normal close code.
    Closed { clean: bool },
    /// The connect timeout fired before `Opened`.
    TimedOut,
    /// The reconnect timer fired.
    ReconnectDue,
    /// The user pressed send.
    Submit,
    /// The HTTP fallback answered (`Err` carries a log-only description).
    FallbackReplied(Result<String, String>),
    /// The suggestion reveal timer fired.
    RevealSuggestions,
    SetInput(String),
    SelectText(String),
    AskAboutSelection,
    ApplySuggestion(usize),
    /// The panel is unmounting.
    Teardown,
}

/// Work the driver performs on behalf of the machine.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Effect {
    /// Start dialing the streaming endpoint.
    Dial,
    /// Write a frame on the open socket.
    Transmit(OutboundFrame),
    /// Write queued frames in order, stopping at the first failure, and
    /// report the count with `Event::QueueFlushed`.
    FlushQueue(Vec<OutboundFrame>),
    /// Send a user turn through the HTTP fallback.
    AskFallback { message: String },
    ArmConnectTimeout(Duration),
    DisarmConnectTimeout,
    /// Replace any pending reconnect timer with a new one.
    ScheduleReconnect(Duration),
    CancelReconnect,
    ScheduleSuggestionReveal(Duration),
    CancelSuggestionReveal,
    /// Close the open or pending connection without reporting a close event.
    Hangup,
}

// =============================================================================
// MANAGER
// =============================================================================

pub struct ConnectionManager {
    identity: Option<SessionIdentity>,
    chat: ChatState,
    queue: MessageQueue,
    policy: ReconnectPolicy,
    has_fallback: bool,
    connect_timeout: Duration,
    suggestion_threshold: usize,
    suggestion_delay: Duration,
    reveal_pending: bool,
    torn_down: bool,
}

impl ConnectionManager {
    /// Build a manager. With an identity the panel starts with that
    /// document loaded; without one it waits for `DocumentLoaded`.
    #[must_use]
    pub fn new(config: &ChatConfig, identity: Option<SessionIdentity>, has_fallback: bool) -> Self {
        let chat = match &identity {
            Some(identity) => ChatState::for_document(&identity.document),
            None => ChatState::new(),
        };
        Self {
            identity,
            chat,
            queue: MessageQueue::new(),
            policy: ReconnectPolicy::new(config.reconnect_base_delay, config.reconnect_max_attempts),
            has_fallback,
            connect_timeout: config.connect_timeout,
            suggestion_threshold: config.suggestion_threshold,
            suggestion_delay: config.suggestion_delay,
            reveal_pending: false,
            torn_down: false,
        }
    }

    #[must_use]
    pub fn chat(&self) -> &ChatState {
        &self.chat
    }

    #[must_use]
    pub fn queue(&self) -> &MessageQueue {
        &self.queue
    }

    #[must_use]
    pub fn policy(&self) -> &ReconnectPolicy {
        &self.policy
    }

    #[must_use]
    pub fn identity(&self) -> Option<&SessionIdentity> {
        self.identity.as_ref()
    }

    #[must_use]
    pub fn connection(&self) -> ConnectionState {
        self.chat.connection
    }

    #[must_use]
    pub fn is_torn_down(&self) -> bool {
        self.torn_down
    }

    /// Apply one event and return the effects to perform, in order.
    pub fn handle(&mut self, event: Event) -> Vec<Effect> {
        if self.torn_down {
            debug!(?event, "chat: event after teardown ignored");
            return Vec::new();
        }

        match event {
            Event::Connect | Event::ReconnectDue => self.connect(),
            Event::DocumentLoaded(identity) => self.document_loaded(identity),
            Event::Opened => self.opened(),
            Event::QueueFlushed { sent } => self.queue_flushed(sent),
            Event::Inbound(text) => self.inbound(&text),
            Event::TransportError(error) => self.transport_error(&error),
            Event::Closed { clean } => self.closed(clean),
            Event::TimedOut => self.timed_out(),
            Event::Submit => self.submit(),
            Event::FallbackReplied(result) => self.fallback_replied(result),
            Event::RevealSuggestions => {
                if !self.reveal_pending {
                    debug!("chat: cancelled suggestion reveal ignored");
                    return Vec::new();
                }
                self.reveal_pending = false;
                self.chat.reveal_suggestions();
                Vec::new()
            }
            Event::SetInput(text) => {
                self.chat.set_input(text);
                Vec::new()
            }
            Event::SelectText(text) => {
                self.chat.select_text(&text);
                Vec::new()
            }
            Event::AskAboutSelection => {
                self.chat.ask_about_selection();
                Vec::new()
            }
            Event::ApplySuggestion(index) => {
                self.chat.apply_suggestion(index);
                Vec::new()
            }
            Event::Teardown => self.teardown(),
        }
    }

    // -------------------------------------------------------------------------
    // lifecycle
    // -------------------------------------------------------------------------

    fn connect(&mut self) -> Vec<Effect> {
        let Some(identity) = self.identity.as_ref().filter(|_| self.chat.document_loaded) else {
            self.chat.push_system(MSG_LOAD_DOCUMENT_FIRST);
            return Vec::new();
        };
        if self.chat.connection != ConnectionState::Disconnected {
            debug!(state = ?self.chat.connection, "chat: connect ignored, connection already active");
            return Vec::new();
        }

        info!(session_id = %identity.session_id(), attempt = self.policy.attempts(), "chat: connecting");
        let notice = format!("Connecting to the AI tutor for \"{}\"...", identity.document);
        self.chat.connection = ConnectionState::Connecting;
        self.chat.push_system(notice);

        vec![Effect::CancelReconnect, Effect::Dial, Effect::ArmConnectTimeout(self.connect_timeout)]
    }

    fn document_loaded(&mut self, identity: SessionIdentity) -> Vec<Effect> {
        let mut effects = Vec::new();
        if let Some(current) = &self.identity {
            if *current == identity {
                debug!(session_id = %identity.session_id(), "chat: document already loaded");
                return Vec::new();
            }
            info!(
                previous = %current.session_id(),
                session_id = %identity.session_id(),
                "chat: switching document, ending previous session"
            );
            effects = self.end_session("document changed");
        }

        self.chat
            .push_reply(format!("\"{}\" has been loaded. What would you like to know about it?", identity.document));
        self.chat.document_loaded = true;
        self.chat.reveal_suggestions();
        self.identity = Some(identity);
        effects.extend(self.connect());
        effects
    }

    fn opened(&mut self) -> Vec<Effect> {
        if self.chat.connection != ConnectionState::Connecting {
            debug!(state = ?self.chat.connection, "chat: stale open ignored");
            return vec![Effect::Hangup];
        }
        let Some(identity) = self.identity.clone() else {
            return vec![Effect::Hangup];
        };

        self.chat.connection = ConnectionState::Connected;
        self.chat.push_system(MSG_CONNECTED);
        self.policy.reset();

        let mut effects = vec![
            Effect::DisarmConnectTimeout,
            Effect::CancelReconnect,
            Effect::Transmit(OutboundFrame::init(&identity.folder, &identity.document)),
        ];
        if !self.queue.is_empty() {
            let frames = self
                .queue
                .iter()
                .map(|queued| OutboundFrame::message(&queued.content, &queued.folder, &queued.document))
                .collect();
            effects.push(Effect::FlushQueue(frames));
        }

        info!(session_id = %identity.session_id(), queued = self.queue.len(), "chat: connected");
        effects
    }

    /// Drop the `sent` entries the driver wrote; the rest stay at the head.
    fn queue_flushed(&mut self, sent: usize) -> Vec<Effect> {
        let mut confirmed = sent;
        let outcome = self.queue.flush(|_| {
            if confirmed == 0 {
                return Err(());
            }
            confirmed -= 1;
            Ok(())
        });
        if sent > 0 {
            self.chat.loading = true;
        }

        match outcome {
            Ok(flushed) => debug!(flushed, "chat: queue flushed"),
            Err(()) => warn!(sent, remaining = self.queue.len(), "chat: queue flush interrupted, keeping unsent"),
        }
        Vec::new()
    }

    fn closed(&mut self, clean: bool) -> Vec<Effect> {
        self.chat.connection = ConnectionState::Disconnected;
        let mut effects = vec![Effect::DisarmConnectTimeout];
        if clean {
            info!("chat: connection closed cleanly");
            return effects;
        }

        warn!("chat: connection closed unexpectedly");
        self.chat.push_system(MSG_CONNECTION_LOST);
        effects.extend(self.schedule_reconnect());
        effects
    }

    fn timed_out(&mut self) -> Vec<Effect> {
        if self.chat.connection != ConnectionState::Connecting {
            debug!(state = ?self.chat.connection, "chat: stale connect timeout ignored");
            return Vec::new();
        }

        warn!(timeout = ?self.connect_timeout, "chat: connect timed out");
        self.chat.connection = ConnectionState::Disconnected;
        self.chat.push_system(MSG_CONNECT_TIMEOUT);

        let mut effects = vec![Effect::Hangup];
        effects.extend(self.schedule_reconnect());
        effects
    }

    fn schedule_reconnect(&mut self) -> Vec<Effect> {
        let Some(delay) = self.policy.next_delay() else {
            warn!(attempts = self.policy.attempts(), "chat: reconnect attempts exhausted");
            self.chat.push_system(MSG_RECONNECT_EXHAUSTED);
            return Vec::new();
        };

        let attempt = self.policy.attempts();
        let max = self.policy.max_attempts();
        info!(attempt, max, ?delay, "chat: scheduling reconnect");
        self.chat.push_system(format!(
            "Reconnecting in {:.1}s (attempt {attempt}/{max})...",
            delay.as_secs_f64()
        ));
        vec![Effect::ScheduleReconnect(delay)]
    }

    fn teardown(&mut self) -> Vec<Effect> {
        self.torn_down = true;
        let effects = self.end_session("teardown");
        info!("chat: panel torn down");
        effects
    }

    /// Stop everything tied to the current session: timers, the connection,
    /// queued messages, and backoff state.
    fn end_session(&mut self, reason: &'static str) -> Vec<Effect> {
        self.chat.connection = ConnectionState::Disconnected;
        self.chat.loading = false;
        self.policy.reset();
        let dropped = self.queue.clear();
        if dropped > 0 {
            warn!(dropped, reason, "chat: dropping undelivered queued messages");
        }

        let mut effects = vec![Effect::CancelReconnect, Effect::DisarmConnectTimeout];
        effects.extend(self.cancel_reveal());
        effects.push(Effect::Hangup);
        effects
    }

    // -------------------------------------------------------------------------
    // frames
    // -------------------------------------------------------------------------

    fn inbound(&mut self, text: &str) -> Vec<Effect> {
        match InboundFrame::parse(text) {
            InboundFrame::Reply { message } => self.chat.push_reply(message),
            InboundFrame::Error { message } => {
                warn!(%message, "chat: server error frame");
                self.chat.push_reply(format!("Error: {message}"));
            }
            InboundFrame::Unrecognized { raw } => {
                warn!(len = raw.len(), "chat: unrecognized inbound frame");
                self.chat.push_reply(MSG_RESPONSE_FAILED);
            }
        }
        self.maybe_schedule_reveal()
    }

    fn transport_error(&mut self, error: &str) -> Vec<Effect> {
        warn!(%error, "chat: transport error");
        self.chat.connection = ConnectionState::Disconnected;
        self.chat.push_reply(MSG_CONNECTION_ERROR);
        self.maybe_schedule_reveal()
    }

    fn fallback_replied(&mut self, result: Result<String, String>) -> Vec<Effect> {
        match result {
            Ok(reply) => self.chat.push_reply(reply),
            Err(error) => {
                warn!(%error, "chat: fallback request failed");
                self.chat.push_reply(MSG_RESPONSE_FAILED);
            }
        }
        self.maybe_schedule_reveal()
    }

    fn maybe_schedule_reveal(&mut self) -> Vec<Effect> {
        if self.reveal_pending || !self.chat.suggestions_due(self.suggestion_threshold) {
            return Vec::new();
        }
        self.reveal_pending = true;
        vec![Effect::ScheduleSuggestionReveal(self.suggestion_delay)]
    }

    fn cancel_reveal(&mut self) -> Option<Effect> {
        if !self.reveal_pending {
            return None;
        }
        self.reveal_pending = false;
        Some(Effect::CancelSuggestionReveal)
    }

    // -------------------------------------------------------------------------
    // sending
    // -------------------------------------------------------------------------

    fn submit(&mut self) -> Vec<Effect> {
        let Some(identity) = self.identity.clone().filter(|_| self.chat.document_loaded) else {
            self.chat.push_system(MSG_LOAD_DOCUMENT_FIRST);
            return Vec::new();
        };
        let Some(content) = self.chat.begin_send() else {
            return Vec::new();
        };
        // Chips stay hidden until the next exchange completes.
        let mut effects: Vec<Effect> = self.cancel_reveal().into_iter().collect();

        match select_route(self.chat.connection, self.has_fallback) {
            Route::Socket => {
                self.chat.loading = true;
                effects.push(Effect::Transmit(OutboundFrame::message(content, &identity.folder, &identity.document)));
            }
            Route::Fallback => {
                self.chat.loading = true;
                effects.push(Effect::AskFallback { message: content });
            }
            Route::Queue => {
                self.queue.enqueue(content, &identity.folder, &identity.document);
                debug!(queued = self.queue.len(), "chat: message queued until connection opens");
                self.chat.push_system(MSG_QUEUED);
            }
        }
        effects
    }
}

#[cfg(test)]
#[path = "connection_test.rs"]
mod tests;
