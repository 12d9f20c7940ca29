use super::*;
use crate::state::chat::Role;

fn config() -> ChatConfig {
    ChatConfig::default()
}

fn identity() -> SessionIdentity {
    SessionIdentity::new("biology", "Cell Structure").expect("valid identity")
}

fn manager() -> ConnectionManager {
    ConnectionManager::new(&config(), Some(identity()), false)
}

fn connected_manager() -> ConnectionManager {
    let mut m = manager();
    m.handle(Event::Connect);
    m.handle(Event::Opened);
    m
}

fn submit(m: &mut ConnectionManager, text: &str) -> Vec<Effect> {
    m.handle(Event::SetInput(text.to_owned()));
    m.handle(Event::Submit)
}

fn last(m: &ConnectionManager) -> (Role, String) {
    let msg = m.chat().messages.last().expect("transcript is never empty");
    (msg.role, msg.content.clone())
}

fn reconnect_delays(effects: &[Effect]) -> Vec<Duration> {
    effects
        .iter()
        .filter_map(|e| match e {
            Effect::ScheduleReconnect(d) => Some(*d),
            _ => None,
        })
        .collect()
}

/// Frames written directly or through a queue flush, in order.
fn transmitted(effects: &[Effect]) -> Vec<OutboundFrame> {
    effects
        .iter()
        .flat_map(|e| match e {
            Effect::Transmit(frame) => vec![frame.clone()],
            Effect::FlushQueue(frames) => frames.clone(),
            _ => Vec::new(),
        })
        .collect()
}

fn queued_contents(m: &ConnectionManager) -> Vec<String> {
    m.queue().iter().map(|q| q.content.clone()).collect()
}

// =============================================================
// Connect
// =============================================================

#[test]
fn connect_dials_and_arms_timeout() {
    let mut m = manager();
    let effects = m.handle(Event::Connect);

    assert_eq!(
        effects,
        vec![Effect::CancelReconnect, Effect::Dial, Effect::ArmConnectTimeout(Duration::from_secs(15))]
    );
    assert_eq!(m.connection(), ConnectionState::Connecting);
    let (role, content) = last(&m);
    assert_eq!(role, Role::System);
    assert!(content.contains("Cell Structure"));
}

#[test]
fn connect_without_document_only_informs_user() {
    let mut m = ConnectionManager::new(&config(), None, false);
    let effects = m.handle(Event::Connect);

    assert!(effects.is_empty());
    assert_eq!(m.connection(), ConnectionState::Disconnected);
    assert_eq!(last(&m), (Role::System, MSG_LOAD_DOCUMENT_FIRST.to_owned()));
}

#[test]
fn connect_while_connecting_is_ignored() {
    let mut m = manager();
    m.handle(Event::Connect);
    let before = m.chat().messages.len();

    assert!(m.handle(Event::Connect).is_empty());
    assert_eq!(m.chat().messages.len(), before);
}

#[test]
fn document_loaded_seeds_and_connects() {
    let mut m = ConnectionManager::new(&config(), None, false);
    let effects = m.handle(Event::DocumentLoaded(identity()));

    assert!(effects.contains(&Effect::Dial));
    assert!(m.chat().document_loaded);
    assert!(m.chat().suggestions_visible);
    assert!(m.chat().messages.iter().any(|msg| msg.content.contains("\"Cell Structure\" has been loaded")));
    assert_eq!(m.identity().map(SessionIdentity::session_id), Some("biology_CellStructure"));
}

#[test]
fn document_loaded_again_is_ignored() {
    let mut m = connected_manager();
    assert!(m.handle(Event::DocumentLoaded(identity())).is_empty());
    assert_eq!(m.connection(), ConnectionState::Connected);
}

#[test]
fn switching_document_ends_old_session_and_reconnects() {
    let mut m = connected_manager();
    submit(&mut m, "What is a ribosome?");
    m.handle(Event::TransportError("reset".into()));
    m.handle(Event::Closed { clean: false });
    assert_eq!(m.policy().attempts(), 1);
    submit(&mut m, "still there?");
    assert_eq!(m.queue().len(), 1);

    let genetics = SessionIdentity::new("biology", "Genetics").expect("valid identity");
    let effects = m.handle(Event::DocumentLoaded(genetics));

    assert_eq!(
        effects,
        vec![
            Effect::CancelReconnect,
            Effect::DisarmConnectTimeout,
            Effect::Hangup,
            Effect::CancelReconnect,
            Effect::Dial,
            Effect::ArmConnectTimeout(config().connect_timeout),
        ]
    );
    assert!(m.queue().is_empty());
    assert_eq!(m.policy().attempts(), 0);
    assert!(!m.chat().loading);
    assert_eq!(m.connection(), ConnectionState::Connecting);
    assert_eq!(m.identity().map(SessionIdentity::session_id), Some("biology_Genetics"));

    let effects = m.handle(Event::Opened);
    assert_eq!(transmitted(&effects), vec![OutboundFrame::init("biology", "Genetics")]);

    let effects = submit(&mut m, "What is DNA?");
    assert_eq!(transmitted(&effects), vec![OutboundFrame::message("What is DNA?", "biology", "Genetics")]);
}

// =============================================================
// Open + queue flush
// =============================================================

#[test]
fn open_sends_init_and_resets_attempts() {
    let mut m = manager();
    m.handle(Event::Connect);
    m.handle(Event::Closed { clean: false });
    assert_eq!(m.policy().attempts(), 1);

    m.handle(Event::ReconnectDue);
    let effects = m.handle(Event::Opened);

    assert_eq!(m.connection(), ConnectionState::Connected);
    assert_eq!(m.policy().attempts(), 0);
    assert_eq!(
        effects,
        vec![
            Effect::DisarmConnectTimeout,
            Effect::CancelReconnect,
            Effect::Transmit(OutboundFrame::init("biology", "Cell Structure")),
        ]
    );
    assert_eq!(last(&m), (Role::System, MSG_CONNECTED.to_owned()));
}

#[test]
fn message_sent_before_open_is_queued_then_sent_after_init() {
    let mut m = manager();
    m.handle(Event::Connect);

    let effects = submit(&mut m, "Can you summarize this document?");
    assert!(effects.is_empty());
    assert_eq!(m.queue().len(), 1);
    assert!(!m.chat().loading);
    assert_eq!(last(&m), (Role::System, MSG_QUEUED.to_owned()));

    let effects = m.handle(Event::Opened);
    assert_eq!(
        transmitted(&effects),
        vec![
            OutboundFrame::init("biology", "Cell Structure"),
            OutboundFrame::message("Can you summarize this document?", "biology", "Cell Structure"),
        ]
    );
    // Entries stay queued until the driver confirms the write.
    assert_eq!(m.queue().len(), 1);

    assert!(m.handle(Event::QueueFlushed { sent: 1 }).is_empty());
    assert!(m.queue().is_empty());
    assert!(m.chat().loading);
}

#[test]
fn failed_flush_write_keeps_unsent_entries_for_next_open() {
    let mut m = manager();
    for text in ["first", "second", "third"] {
        submit(&mut m, text);
    }
    m.handle(Event::Connect);
    m.handle(Event::Opened);

    // The second write failed: the driver reports one sent, then the close.
    m.handle(Event::QueueFlushed { sent: 1 });
    m.handle(Event::TransportError("broken pipe".into()));
    let effects = m.handle(Event::Closed { clean: false });
    assert_eq!(reconnect_delays(&effects), vec![Duration::from_secs(3)]);
    assert_eq!(queued_contents(&m), vec!["second", "third"]);

    m.handle(Event::ReconnectDue);
    let effects = m.handle(Event::Opened);
    assert_eq!(
        transmitted(&effects),
        vec![
            OutboundFrame::init("biology", "Cell Structure"),
            OutboundFrame::message("second", "biology", "Cell Structure"),
            OutboundFrame::message("third", "biology", "Cell Structure"),
        ]
    );

    m.handle(Event::QueueFlushed { sent: 2 });
    assert!(m.queue().is_empty());
}

#[test]
fn failed_init_write_keeps_whole_queue() {
    let mut m = manager();
    submit(&mut m, "Can you summarize this document?");
    m.handle(Event::Connect);
    m.handle(Event::Opened);

    m.handle(Event::TransportError("connection reset".into()));
    m.handle(Event::Closed { clean: false });
    m.handle(Event::QueueFlushed { sent: 0 });

    assert_eq!(queued_contents(&m), vec!["Can you summarize this document?"]);
    assert!(!m.chat().loading);
}

#[test]
fn queued_messages_flush_in_submission_order() {
    let mut m = manager();
    let texts: Vec<String> = (0..8).map(|i| format!("question {i}")).collect();
    for text in &texts {
        submit(&mut m, text);
    }
    assert_eq!(m.queue().len(), texts.len());

    m.handle(Event::Connect);
    let frames = transmitted(&m.handle(Event::Opened));

    let expected: Vec<OutboundFrame> = std::iter::once(OutboundFrame::init("biology", "Cell Structure"))
        .chain(texts.iter().map(|t| OutboundFrame::message(t.as_str(), "biology", "Cell Structure")))
        .collect();
    assert_eq!(frames, expected);
}

#[test]
fn stale_open_hangs_up() {
    let mut m = manager();
    assert_eq!(m.handle(Event::Opened), vec![Effect::Hangup]);
    assert_eq!(m.connection(), ConnectionState::Disconnected);
}

// =============================================================
// Sending while connected
// =============================================================

#[test]
fn submit_when_connected_transmits_and_awaits() {
    let mut m = connected_manager();
    let effects = submit(&mut m, "What is a ribosome?");

    assert_eq!(
        effects,
        vec![Effect::Transmit(OutboundFrame::message("What is a ribosome?", "biology", "Cell Structure"))]
    );
    assert!(m.chat().loading);
    assert_eq!(last(&m), (Role::User, "What is a ribosome?".to_owned()));
}

#[test]
fn submit_while_awaiting_is_noop() {
    let mut m = connected_manager();
    submit(&mut m, "first");
    let len = m.chat().messages.len();

    assert!(submit(&mut m, "second").is_empty());
    assert_eq!(m.chat().messages.len(), len);
    assert_eq!(m.chat().input, "second");
}

#[test]
fn submit_blank_input_is_noop() {
    let mut m = connected_manager();
    let len = m.chat().messages.len();
    assert!(submit(&mut m, "   ").is_empty());
    assert_eq!(m.chat().messages.len(), len);
}

#[test]
fn submit_without_document_informs_user() {
    let mut m = ConnectionManager::new(&config(), None, false);
    assert!(submit(&mut m, "hello").is_empty());
    assert_eq!(last(&m), (Role::System, MSG_LOAD_DOCUMENT_FIRST.to_owned()));
}

#[test]
fn fallback_route_used_when_socket_not_open() {
    let mut m = ConnectionManager::new(&config(), Some(identity()), true);
    m.handle(Event::Connect);

    let effects = submit(&mut m, "Explain osmosis");
    assert_eq!(effects, vec![Effect::AskFallback { message: "Explain osmosis".into() }]);
    assert!(m.chat().loading);
    assert!(m.queue().is_empty());

    m.handle(Event::FallbackReplied(Ok("Osmosis is diffusion of water.".into())));
    assert_eq!(last(&m), (Role::Assistant, "Osmosis is diffusion of water.".to_owned()));
    assert!(!m.chat().loading);
}

#[test]
fn fallback_failure_becomes_assistant_message() {
    let mut m = ConnectionManager::new(&config(), Some(identity()), true);
    submit(&mut m, "Explain osmosis");
    m.handle(Event::FallbackReplied(Err("HTTP 500".into())));

    assert_eq!(last(&m), (Role::Assistant, MSG_RESPONSE_FAILED.to_owned()));
    assert!(!m.chat().loading);
}

// =============================================================
// Inbound frames
// =============================================================

#[test]
fn reply_frame_appends_assistant_and_clears_loading() {
    let mut m = connected_manager();
    submit(&mut m, "question");
    m.handle(Event::Inbound(r#"{"message":"answer"}"#.into()));

    assert_eq!(last(&m), (Role::Assistant, "answer".to_owned()));
    assert!(!m.chat().loading);
}

#[test]
fn error_frame_surfaces_message() {
    let mut m = connected_manager();
    submit(&mut m, "question");
    m.handle(Event::Inbound(r#"{"type":"error","message":"rate limited"}"#.into()));

    let (role, content) = last(&m);
    assert_eq!(role, Role::Assistant);
    assert!(content.contains("rate limited"));
    assert!(!m.chat().loading);
}

#[test]
fn malformed_frame_becomes_generic_failure() {
    let mut m = connected_manager();
    submit(&mut m, "question");
    m.handle(Event::Inbound("{{{ not json".into()));

    assert_eq!(last(&m), (Role::Assistant, MSG_RESPONSE_FAILED.to_owned()));
    assert!(!m.chat().loading);
    assert_eq!(m.connection(), ConnectionState::Connected);
}

#[test]
fn identical_frames_are_not_deduplicated() {
    let mut m = connected_manager();
    let before = m.chat().messages.len();
    m.handle(Event::Inbound(r#"{"message":"same"}"#.into()));
    m.handle(Event::Inbound(r#"{"message":"same"}"#.into()));

    let after = &m.chat().messages;
    assert_eq!(after.len(), before + 2);
    assert_ne!(after[before].id, after[before + 1].id);
}

// =============================================================
// Errors, closes, timeouts
// =============================================================

#[test]
fn transport_error_disconnects_and_clears_loading() {
    let mut m = connected_manager();
    submit(&mut m, "question");
    m.handle(Event::TransportError("broken pipe".into()));

    assert_eq!(m.connection(), ConnectionState::Disconnected);
    assert!(!m.chat().loading);
    assert_eq!(last(&m), (Role::Assistant, MSG_CONNECTION_ERROR.to_owned()));
}

#[test]
fn unclean_close_schedules_first_reconnect_at_base_delay() {
    let mut m = connected_manager();
    let effects = m.handle(Event::Closed { clean: false });

    assert_eq!(m.connection(), ConnectionState::Disconnected);
    assert_eq!(reconnect_delays(&effects), vec![Duration::from_millis(3000)]);
    assert!(m.chat().messages.iter().any(|msg| msg.role == Role::System && msg.content == MSG_CONNECTION_LOST));
}

#[test]
fn clean_close_does_not_reconnect() {
    let mut m = connected_manager();
    let len = m.chat().messages.len();
    let effects = m.handle(Event::Closed { clean: true });

    assert_eq!(effects, vec![Effect::DisarmConnectTimeout]);
    assert_eq!(m.chat().messages.len(), len);
    assert_eq!(m.policy().attempts(), 0);
}

#[test]
fn reconnects_back_off_and_stop_at_bound() {
    let mut m = manager();
    m.handle(Event::Connect);

    let mut delays = Vec::new();
    for _ in 0..5 {
        delays.extend(reconnect_delays(&m.handle(Event::Closed { clean: false })));
        m.handle(Event::ReconnectDue);
    }

    assert_eq!(
        delays,
        vec![Duration::from_millis(3000), Duration::from_millis(6000), Duration::from_millis(12_000)]
    );
    assert!(m.policy().is_exhausted());
    assert!(m.chat().messages.iter().any(|msg| msg.content == MSG_RECONNECT_EXHAUSTED));
}

#[test]
fn connect_timeout_hangs_up_and_reconnects() {
    let mut m = manager();
    m.handle(Event::Connect);
    let effects = m.handle(Event::TimedOut);

    assert_eq!(effects, vec![Effect::Hangup, Effect::ScheduleReconnect(Duration::from_millis(3000))]);
    assert_eq!(m.connection(), ConnectionState::Disconnected);
    assert!(m.chat().messages.iter().any(|msg| msg.content == MSG_CONNECT_TIMEOUT));
}

#[test]
fn timeout_after_open_is_ignored() {
    let mut m = connected_manager();
    assert!(m.handle(Event::TimedOut).is_empty());
    assert_eq!(m.connection(), ConnectionState::Connected);
}

// =============================================================
// Suggestions
// =============================================================

#[test]
fn suggestions_reveal_scheduled_once_after_threshold() {
    let mut m = connected_manager();
    // greeting, connecting, connected
    assert_eq!(m.chat().messages.len(), 3);

    submit(&mut m, "q1");
    let effects = m.handle(Event::Inbound(r#"{"message":"a1"}"#.into()));
    assert!(effects.is_empty());
    assert!(!m.chat().suggestions_visible);

    submit(&mut m, "q2");
    let effects = m.handle(Event::Inbound(r#"{"message":"a2"}"#.into()));
    assert_eq!(effects, vec![Effect::ScheduleSuggestionReveal(Duration::from_secs(1))]);

    let effects = m.handle(Event::Inbound(r#"{"message":"a3"}"#.into()));
    assert!(effects.is_empty());

    m.handle(Event::RevealSuggestions);
    assert!(m.chat().suggestions_visible);
}

#[test]
fn submit_cancels_pending_suggestion_reveal() {
    let mut m = connected_manager();
    submit(&mut m, "q1");
    m.handle(Event::Inbound(r#"{"message":"a1"}"#.into()));
    submit(&mut m, "q2");
    let effects = m.handle(Event::Inbound(r#"{"message":"a2"}"#.into()));
    assert_eq!(effects, vec![Effect::ScheduleSuggestionReveal(Duration::from_secs(1))]);

    let effects = submit(&mut m, "q3");
    assert_eq!(
        effects,
        vec![
            Effect::CancelSuggestionReveal,
            Effect::Transmit(OutboundFrame::message("q3", "biology", "Cell Structure")),
        ]
    );

    // A reveal that slipped through after the cancel changes nothing.
    m.handle(Event::RevealSuggestions);
    assert!(!m.chat().suggestions_visible);
    assert!(m.chat().loading);

    let effects = m.handle(Event::Inbound(r#"{"message":"a3"}"#.into()));
    assert_eq!(effects, vec![Effect::ScheduleSuggestionReveal(Duration::from_secs(1))]);
}

#[test]
fn ask_about_selection_fills_input() {
    let mut m = connected_manager();
    m.handle(Event::SelectText("cell membrane".into()));
    m.handle(Event::AskAboutSelection);
    assert_eq!(m.chat().input, "Please explain \"cell membrane\"");

    m.handle(Event::ApplySuggestion(1));
    assert_eq!(m.chat().input, crate::state::chat::SUGGESTIONS[1]);
}

// =============================================================
// Teardown
// =============================================================

#[test]
fn teardown_cancels_everything_and_drops_queue() {
    let mut m = manager();
    m.handle(Event::Connect);
    submit(&mut m, "pending");
    assert_eq!(m.queue().len(), 1);

    let effects = m.handle(Event::Teardown);

    assert_eq!(effects, vec![Effect::CancelReconnect, Effect::DisarmConnectTimeout, Effect::Hangup]);
    assert!(m.queue().is_empty());
    assert!(m.is_torn_down());
    assert_eq!(m.connection(), ConnectionState::Disconnected);
}

#[test]
fn events_after_teardown_are_ignored() {
    let mut m = connected_manager();
    m.handle(Event::Teardown);
    let len = m.chat().messages.len();

    assert!(m.handle(Event::Closed { clean: false }).is_empty());
    assert!(m.handle(Event::ReconnectDue).is_empty());
    assert!(m.handle(Event::Inbound(r#"{"message":"late"}"#.into())).is_empty());
    assert_eq!(m.chat().messages.len(), len);
}
