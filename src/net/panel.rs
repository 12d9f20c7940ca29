//! Chat panel driver — one tokio task per mounted panel.
//!
//! ARCHITECTURE
//! ============
//! `ChatPanel` is the handle the UI holds. It forwards user actions as
//! [`Event`]s over an unbounded channel and exposes the latest
//! [`ChatState`] through a `watch` channel. The spawned task owns everything
//! with a lifetime: the websocket (or the pending dial), the connect
//! deadline, the reconnect timer, the suggestion reveal timer, and in-flight
//! fallback requests. Each wake-up is turned into events, fed through
//! [`ConnectionManager::handle`], and the returned effects are performed in
//! order. Effects may produce follow-up events (a failed write becomes a
//! transport error plus an unclean close), so dispatch runs a work-list.
//!
//! LIFECYCLE
//! =========
//! `mount` spawns the task and, when a document is already known, connects
//! right away. `teardown` (or dropping the handle) stops it: timers are
//! dropped, the socket is closed, in-flight fallback calls are aborted.
//!
//! ERROR HANDLING
//! ==============
//! Nothing inside the task returns an error to the UI; failures surface as
//! transcript entries. Handle methods only fail with `PanelError::Stopped`
//! once the task is gone.

use std::collections::VecDeque;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, watch};
use tokio::task::{JoinError, JoinHandle, JoinSet};
use tokio::time::Sleep;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::{self, Message};
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};
use tracing::{debug, info, warn};

use crate::config::ChatConfig;
use crate::net::connection::{ConnectionManager, Effect, Event};
use crate::net::transport::ChatFallback;
use crate::session::SessionIdentity;
use crate::state::chat::ChatState;

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;
type DialFuture = Pin<Box<dyn Future<Output = Result<WsStream, tungstenite::Error>> + Send>>;
type Timer = Pin<Box<Sleep>>;

#[derive(Debug, thiserror::Error)]
pub enum PanelError {
    #[error("chat panel task has stopped")]
    Stopped,
    #[error("chat panel task failed: {0}")]
    Join(#[from] JoinError),
}

// =============================================================================
// HANDLE
// =============================================================================

/// Handle to a mounted chat panel.
pub struct ChatPanel {
    commands: mpsc::UnboundedSender<Event>,
    state: watch::Receiver<ChatState>,
    task: Option<JoinHandle<()>>,
}

impl ChatPanel {
    /// Spawn the panel task on the current tokio runtime.
    ///
    /// With an identity the panel starts with that document loaded and
    /// connects immediately; without one it waits for
    /// [`ChatPanel::document_loaded`].
    #[must_use]
    pub fn mount(config: &ChatConfig, identity: Option<SessionIdentity>) -> Self {
        Self::spawn(config, identity, None)
    }

    /// Like [`ChatPanel::mount`], with an HTTP route for sends made while
    /// the socket is not open.
    #[must_use]
    pub fn mount_with_fallback(
        config: &ChatConfig,
        identity: Option<SessionIdentity>,
        fallback: Arc<dyn ChatFallback>,
    ) -> Self {
        Self::spawn(config, identity, Some(fallback))
    }

    fn spawn(config: &ChatConfig, identity: Option<SessionIdentity>, fallback: Option<Arc<dyn ChatFallback>>) -> Self {
        let connect_now = identity.is_some();
        let machine = ConnectionManager::new(config, identity, fallback.is_some());
        let (state_tx, state_rx) = watch::channel(machine.chat().clone());
        let (commands, command_rx) = mpsc::unbounded_channel();

        if let Some(identity) = machine.identity() {
            info!(session_id = %identity.session_id(), "chat: panel mounted");
        }
        if connect_now {
            // The receiver is alive until the task below exits.
            let _ = commands.send(Event::Connect);
        }

        let driver = Driver {
            machine,
            state_tx,
            chat_url: config.chat_ws_url.clone(),
            fallback,
            socket: None,
            dial: None,
            connect_deadline: None,
            reconnect_timer: None,
            reveal_timer: None,
            fallback_calls: JoinSet::new(),
        };
        let task = tokio::spawn(driver.run(command_rx));

        Self { commands, state: state_rx, task: Some(task) }
    }

    /// Open the streaming connection for the current document.
    ///
    /// # Errors
    ///
    /// `PanelError::Stopped` once the panel task has exited.
    pub fn connect(&self) -> Result<(), PanelError> {
        self.command(Event::Connect)
    }

    /// Bind a freshly loaded document and connect.
    ///
    /// # Errors
    ///
    /// `PanelError::Stopped` once the panel task has exited.
    pub fn document_loaded(&self, identity: SessionIdentity) -> Result<(), PanelError> {
        self.command(Event::DocumentLoaded(identity))
    }

    /// # Errors
    ///
    /// `PanelError::Stopped` once the panel task has exited.
    pub fn set_input(&self, text: impl Into<String>) -> Result<(), PanelError> {
        self.command(Event::SetInput(text.into()))
    }

    /// Send the current input.
    ///
    /// # Errors
    ///
    /// `PanelError::Stopped` once the panel task has exited.
    pub fn send(&self) -> Result<(), PanelError> {
        self.command(Event::Submit)
    }

    /// Replace the input with `text` and send it.
    ///
    /// # Errors
    ///
    /// `PanelError::Stopped` once the panel task has exited.
    pub fn send_message(&self, text: impl Into<String>) -> Result<(), PanelError> {
        self.set_input(text)?;
        self.send()
    }

    /// # Errors
    ///
    /// `PanelError::Stopped` once the panel task has exited.
    pub fn select_text(&self, text: impl Into<String>) -> Result<(), PanelError> {
        self.command(Event::SelectText(text.into()))
    }

    /// # Errors
    ///
    /// `PanelError::Stopped` once the panel task has exited.
    pub fn ask_about_selection(&self) -> Result<(), PanelError> {
        self.command(Event::AskAboutSelection)
    }

    /// # Errors
    ///
    /// `PanelError::Stopped` once the panel task has exited.
    pub fn apply_suggestion(&self, index: usize) -> Result<(), PanelError> {
        self.command(Event::ApplySuggestion(index))
    }

    /// Snapshot of the current panel state.
    #[must_use]
    pub fn state(&self) -> ChatState {
        self.state.borrow().clone()
    }

    /// Receiver notified on every state change.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<ChatState> {
        self.state.clone()
    }

    /// Stop the panel and wait for the socket to close.
    ///
    /// # Errors
    ///
    /// `PanelError::Join` if the task panicked.
    pub async fn teardown(mut self) -> Result<(), PanelError> {
        let _ = self.commands.send(Event::Teardown);
        if let Some(task) = self.task.take() {
            task.await?;
        }
        Ok(())
    }

    fn command(&self, event: Event) -> Result<(), PanelError> {
        self.commands.send(event).map_err(|_| PanelError::Stopped)
    }
}

impl Drop for ChatPanel {
    fn drop(&mut self) {
        if self.task.is_some() {
            let _ = self.commands.send(Event::Teardown);
        }
    }
}

// =============================================================================
// DRIVER
// =============================================================================

struct Driver {
    machine: ConnectionManager,
    state_tx: watch::Sender<ChatState>,
    chat_url: String,
    fallback: Option<Arc<dyn ChatFallback>>,
    socket: Option<WsStream>,
    dial: Option<DialFuture>,
    connect_deadline: Option<Timer>,
    reconnect_timer: Option<Timer>,
    reveal_timer: Option<Timer>,
    fallback_calls: JoinSet<Result<String, String>>,
}

/// Why the driver loop woke up.
enum Wake {
    Command(Option<Event>),
    Dialed(Result<WsStream, tungstenite::Error>),
    Socket(Option<Result<Message, tungstenite::Error>>),
    ConnectDeadline,
    ReconnectDue,
    RevealDue,
    FallbackDone(Result<Result<String, String>, JoinError>),
}

impl Driver {
    async fn run(mut self, mut commands: mpsc::UnboundedReceiver<Event>) {
        while !self.machine.is_torn_down() {
            let wake = tokio::select! {
                command = commands.recv() => Wake::Command(command),
                dialed = dial_done(&mut self.dial) => Wake::Dialed(dialed),
                message = next_message(&mut self.socket) => Wake::Socket(message),
                () = fire(&mut self.connect_deadline) => Wake::ConnectDeadline,
                () = fire(&mut self.reconnect_timer) => Wake::ReconnectDue,
                () = fire(&mut self.reveal_timer) => Wake::RevealDue,
                Some(done) = self.fallback_calls.join_next(), if !self.fallback_calls.is_empty() => {
                    Wake::FallbackDone(done)
                }
            };

            let events = self.events_for(wake);
            self.dispatch(events).await;
        }

        self.fallback_calls.abort_all();
        self.reveal_timer = None;
        debug!("chat: panel task exiting");
    }

    fn events_for(&mut self, wake: Wake) -> Vec<Event> {
        match wake {
            Wake::Command(Some(event)) => vec![event],
            // Every handle is gone.
            Wake::Command(None) => vec![Event::Teardown],
            Wake::Dialed(Ok(socket)) => {
                self.socket = Some(socket);
                vec![Event::Opened]
            }
            Wake::Dialed(Err(e)) => {
                vec![Event::TransportError(e.to_string()), Event::Closed { clean: false }]
            }
            Wake::Socket(Some(Ok(message))) => self.socket_message(message),
            Wake::Socket(Some(Err(e))) => {
                self.socket = None;
                vec![Event::TransportError(e.to_string()), Event::Closed { clean: false }]
            }
            Wake::Socket(None) => {
                self.socket = None;
                vec![Event::Closed { clean: false }]
            }
            Wake::ConnectDeadline => vec![Event::TimedOut],
            Wake::ReconnectDue => vec![Event::ReconnectDue],
            Wake::RevealDue => vec![Event::RevealSuggestions],
            Wake::FallbackDone(joined) => vec![Event::FallbackReplied(joined.unwrap_or_else(|e| Err(e.to_string())))],
        }
    }

    fn socket_message(&mut self, message: Message) -> Vec<Event> {
        match message {
            Message::Text(text) => vec![Event::Inbound(text.as_str().to_owned())],
            Message::Close(frame) => {
                self.socket = None;
                let code = frame.as_ref().map(|f| f.code);
                debug!(?code, "chat: close frame received");
                vec![Event::Closed { clean: code == Some(CloseCode::Normal) }]
            }
            other => {
                debug!(kind = message_kind(&other), "chat: non-text message ignored");
                Vec::new()
            }
        }
    }

    async fn dispatch(&mut self, events: Vec<Event>) {
        let mut pending: VecDeque<Event> = events.into();
        while let Some(event) = pending.pop_front() {
            for effect in self.machine.handle(event) {
                pending.extend(self.perform(effect).await);
            }
        }
        self.state_tx.send_replace(self.machine.chat().clone());
    }

    /// Carry out one effect, returning any events it caused.
    async fn perform(&mut self, effect: Effect) -> Vec<Event> {
        match effect {
            Effect::Dial => {
                self.hang_up().await;
                let url = self.chat_url.clone();
                debug!(%url, "chat: dialing");
                self.dial = Some(Box::pin(async move { connect_async(url).await.map(|(socket, _)| socket) }));
                Vec::new()
            }
            Effect::Transmit(frame) => {
                let Some(socket) = self.socket.as_mut() else {
                    warn!("chat: transmit without an open socket dropped");
                    return Vec::new();
                };
                if let Err(e) = socket.send(Message::text(frame.to_text())).await {
                    self.socket = None;
                    return vec![Event::TransportError(e.to_string()), Event::Closed { clean: false }];
                }
                Vec::new()
            }
            Effect::FlushQueue(frames) => {
                let mut sent = 0;
                for frame in frames {
                    let Some(socket) = self.socket.as_mut() else {
                        break;
                    };
                    if let Err(e) = socket.send(Message::text(frame.to_text())).await {
                        self.socket = None;
                        return vec![
                            Event::QueueFlushed { sent },
                            Event::TransportError(e.to_string()),
                            Event::Closed { clean: false },
                        ];
                    }
                    sent += 1;
                }
                vec![Event::QueueFlushed { sent }]
            }
            Effect::AskFallback { message } => {
                let (Some(fallback), Some(identity)) = (self.fallback.clone(), self.machine.identity().cloned())
                else {
                    return vec![Event::FallbackReplied(Err("no fallback route configured".into()))];
                };
                self.fallback_calls.spawn(async move {
                    fallback.ask(&identity, &message).await.map_err(|e| e.to_string())
                });
                Vec::new()
            }
            Effect::ArmConnectTimeout(after) => {
                self.connect_deadline = Some(Box::pin(tokio::time::sleep(after)));
                Vec::new()
            }
            Effect::DisarmConnectTimeout => {
                self.connect_deadline = None;
                Vec::new()
            }
            Effect::ScheduleReconnect(after) => {
                self.reconnect_timer = Some(Box::pin(tokio::time::sleep(after)));
                Vec::new()
            }
            Effect::CancelReconnect => {
                self.reconnect_timer = None;
                Vec::new()
            }
            Effect::ScheduleSuggestionReveal(after) => {
                self.reveal_timer = Some(Box::pin(tokio::time::sleep(after)));
                Vec::new()
            }
            Effect::CancelSuggestionReveal => {
                self.reveal_timer = None;
                Vec::new()
            }
            Effect::Hangup => {
                self.hang_up().await;
                Vec::new()
            }
        }
    }

    /// Drop a pending dial and close an open socket without reporting it.
    async fn hang_up(&mut self) {
        self.dial = None;
        if let Some(mut socket) = self.socket.take() {
            if let Err(e) = socket.close(None).await {
                debug!(error = %e, "chat: close on hangup failed");
            }
        }
    }
}

// =============================================================================
// WAKE SOURCES
// =============================================================================

/// Resolve the pending dial, or never when there is none.
async fn dial_done(dial: &mut Option<DialFuture>) -> Result<WsStream, tungstenite::Error> {
    let Some(pending) = dial.as_mut() else {
        return std::future::pending().await;
    };
    let result = pending.await;
    *dial = None;
    result
}

async fn next_message(socket: &mut Option<WsStream>) -> Option<Result<Message, tungstenite::Error>> {
    match socket.as_mut() {
        Some(socket) => socket.next().await,
        None => std::future::pending().await,
    }
}

/// Complete once the timer elapses, clearing it; never when unset.
async fn fire(timer: &mut Option<Timer>) {
    let Some(sleep) = timer.as_mut() else {
        return std::future::pending().await;
    };
    sleep.as_mut().await;
    *timer = None;
}

fn message_kind(message: &Message) -> &'static str {
    match message {
        Message::Text(_) => "text",
        Message::Binary(_) => "binary",
        Message::Ping(_) => "ping",
        Message::Pong(_) => "pong",
        Message::Close(_) => "close",
        Message::Frame(_) => "frame",
    }
}

#[cfg(test)]
#[path = "panel_test.rs"]
mod tests;
