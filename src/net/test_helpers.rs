//! Local mock servers for network tests.

use std::time::Duration;

use axum::Router;

use crate::config::ChatConfig;

/// Route `tracing` output through the test harness. Safe to call repeatedly.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
}

/// Serve `app` on an ephemeral loopback port and return `http://127.0.0.1:{port}`.
pub async fn spawn_server(app: Router) -> String {
    init_tracing();
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.expect("failed to bind");
    let addr = listener.local_addr().expect("listener has an address");
    tokio::spawn(async move {
        axum::serve(listener, app).await.expect("mock server failed");
    });
    format!("http://{addr}")
}

/// A loopback address with nothing listening on it.
pub async fn dead_address() -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.expect("failed to bind");
    let addr = listener.local_addr().expect("listener has an address");
    drop(listener);
    format!("http://{addr}")
}

/// Config pointed at a mock server with millisecond timings.
#[must_use]
pub fn fast_config(base_url: &str) -> ChatConfig {
    ChatConfig {
        api_base_url: base_url.to_owned(),
        chat_ws_url: format!("{}/chat", base_url.replacen("http://", "ws://", 1)),
        upload_url: format!("{base_url}/ai_tutor_upload_document"),
        document_bucket_url: "https://bucket.example".to_owned(),
        reconnect_base_delay: Duration::from_millis(20),
        connect_timeout: Duration::from_millis(500),
        suggestion_delay: Duration::from_millis(10),
        fetch_base_delay: Duration::from_millis(5),
        ..ChatConfig::default()
    }
}
