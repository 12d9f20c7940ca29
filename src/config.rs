//! Runtime configuration for the chat panel and REST helpers.
//!
//! DESIGN
//! ======
//! Everything is read from `TUTORCHAT_*` environment variables with typed
//! defaults; a missing or unparsable variable silently falls back to its
//! default. `Default` yields the same values without touching the
//! environment, which is what tests build on.
//!
//! Timing defaults: 3 reconnect attempts with a 3 s base delay doubling per
//! attempt, a 15 s connect timeout, and a 1 s suggestion reveal delay once
//! the transcript reaches 6 entries.

use std::time::Duration;

const DEFAULT_API_BASE_URL: &str = "http://127.0.0.1:8080";
const DEFAULT_CHAT_WS_URL: &str = "ws://127.0.0.1:8080/chat";
const DEFAULT_UPLOAD_URL: &str = "http://127.0.0.1:8080/ai_tutor_upload_document";
const DEFAULT_DOCUMENT_BUCKET_URL: &str = "https://ai-tutor-target-docs.s3.us-east-1.amazonaws.com";

const DEFAULT_RECONNECT_MAX_ATTEMPTS: u32 = 3;
const DEFAULT_RECONNECT_BASE_DELAY_MS: u64 = 3000;
const DEFAULT_CONNECT_TIMEOUT_MS: u64 = 15_000;
const DEFAULT_SUGGESTION_THRESHOLD: usize = 6;
const DEFAULT_SUGGESTION_DELAY_MS: u64 = 1000;
const DEFAULT_FETCH_MAX_RETRIES: u32 = 3;
const DEFAULT_FETCH_BASE_DELAY_MS: u64 = 1000;

/// Endpoints and timing knobs for one chat panel.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ChatConfig {
    /// REST API root (folders, documents, summaries, HTTP chat).
    pub api_base_url: String,
    /// Streaming chat endpoint (`ws://` or `wss://`).
    pub chat_ws_url: String,
    /// Upload route that accepts base64 document bodies.
    pub upload_url: String,
    /// Static bucket root serving original uploaded files.
    pub document_bucket_url: String,
    /// Reconnect attempts after an unexpected drop before giving up.
    pub reconnect_max_attempts: u32,
    /// First reconnect delay; doubles per attempt.
    pub reconnect_base_delay: Duration,
    /// How long a dial may stay pending before it counts as failed.
    pub connect_timeout: Duration,
    /// Transcript length at which suggestion chips come back.
    pub suggestion_threshold: usize,
    /// Delay before hidden suggestion chips are revealed again.
    pub suggestion_delay: Duration,
    /// Attempts made by the retrying GET helper.
    pub fetch_max_retries: u32,
    /// First retry delay of the GET helper; doubles per attempt.
    pub fetch_base_delay: Duration,
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self {
            api_base_url: DEFAULT_API_BASE_URL.to_owned(),
            chat_ws_url: DEFAULT_CHAT_WS_URL.to_owned(),
            upload_url: DEFAULT_UPLOAD_URL.to_owned(),
            document_bucket_url: DEFAULT_DOCUMENT_BUCKET_URL.to_owned(),
            reconnect_max_attempts: DEFAULT_RECONNECT_MAX_ATTEMPTS,
            reconnect_base_delay: Duration::from_millis(DEFAULT_RECONNECT_BASE_DELAY_MS),
            connect_timeout: Duration::from_millis(DEFAULT_CONNECT_TIMEOUT_MS),
            suggestion_threshold: DEFAULT_SUGGESTION_THRESHOLD,
            suggestion_delay: Duration::from_millis(DEFAULT_SUGGESTION_DELAY_MS),
            fetch_max_retries: DEFAULT_FETCH_MAX_RETRIES,
            fetch_base_delay: Duration::from_millis(DEFAULT_FETCH_BASE_DELAY_MS),
        }
    }
}

impl ChatConfig {
    /// Load config from environment with defaults.
    ///
    /// - `TUTORCHAT_API_BASE_URL`, `TUTORCHAT_CHAT_WS_URL`,
    ///   `TUTORCHAT_UPLOAD_URL`, `TUTORCHAT_DOCUMENT_BUCKET_URL`
    /// - `TUTORCHAT_RECONNECT_MAX_ATTEMPTS`, `TUTORCHAT_RECONNECT_BASE_DELAY_MS`
    /// - `TUTORCHAT_CONNECT_TIMEOUT_MS`
    /// - `TUTORCHAT_SUGGESTION_THRESHOLD`, `TUTORCHAT_SUGGESTION_DELAY_MS`
    /// - `TUTORCHAT_FETCH_MAX_RETRIES`, `TUTORCHAT_FETCH_BASE_DELAY_MS`
    #[must_use]
    pub fn from_env() -> Self {
        Self {
            api_base_url: env_string("TUTORCHAT_API_BASE_URL", DEFAULT_API_BASE_URL),
            chat_ws_url: env_string("TUTORCHAT_CHAT_WS_URL", DEFAULT_CHAT_WS_URL),
            upload_url: env_string("TUTORCHAT_UPLOAD_URL", DEFAULT_UPLOAD_URL),
            document_bucket_url: env_string("TUTORCHAT_DOCUMENT_BUCKET_URL", DEFAULT_DOCUMENT_BUCKET_URL),
            reconnect_max_attempts: env_parse("TUTORCHAT_RECONNECT_MAX_ATTEMPTS", DEFAULT_RECONNECT_MAX_ATTEMPTS),
            reconnect_base_delay: Duration::from_millis(env_parse(
                "TUTORCHAT_RECONNECT_BASE_DELAY_MS",
                DEFAULT_RECONNECT_BASE_DELAY_MS,
            )),
            connect_timeout: Duration::from_millis(env_parse("TUTORCHAT_CONNECT_TIMEOUT_MS", DEFAULT_CONNECT_TIMEOUT_MS)),
            suggestion_threshold: env_parse("TUTORCHAT_SUGGESTION_THRESHOLD", DEFAULT_SUGGESTION_THRESHOLD),
            suggestion_delay: Duration::from_millis(env_parse(
                "TUTORCHAT_SUGGESTION_DELAY_MS",
                DEFAULT_SUGGESTION_DELAY_MS,
            )),
            fetch_max_retries: env_parse("TUTORCHAT_FETCH_MAX_RETRIES", DEFAULT_FETCH_MAX_RETRIES),
            fetch_base_delay: Duration::from_millis(env_parse("TUTORCHAT_FETCH_BASE_DELAY_MS", DEFAULT_FETCH_BASE_DELAY_MS)),
        }
    }
}

fn env_string(key: &str, default: &str) -> String {
    std::env::var(key)
        .ok()
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| default.to_owned())
}

fn env_parse<T>(key: &str, default: T) -> T
where
    T: std::str::FromStr + Copy,
{
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse::<T>().ok())
        .unwrap_or(default)
}
