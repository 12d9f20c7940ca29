//! Send routes for outbound user messages.
//!
//! DESIGN
//! ======
//! A user message can leave the panel three ways, tried in this order:
//! the open socket, an HTTP fallback (when one is configured), or the
//! outbound queue. The first route whose precondition holds wins, so the
//! choice is a lookup over connection state instead of branching on which
//! handles happen to exist.

use async_trait::async_trait;

use crate::net::api::ApiError;
use crate::session::SessionIdentity;
use crate::state::chat::ConnectionState;

/// One way to deliver a user message.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Route {
    /// Write a `message` frame on the open socket.
    Socket,
    /// Ask the HTTP chat route and append its reply.
    Fallback,
    /// Hold the message until the socket opens.
    Queue,
}

/// Evaluation order of routes at send time.
pub const ROUTE_ORDER: [Route; 3] = [Route::Socket, Route::Fallback, Route::Queue];

impl Route {
    /// Whether this route can take a message right now.
    #[must_use]
    pub fn applies(self, connection: ConnectionState, has_fallback: bool) -> bool {
        match self {
            Self::Socket => connection == ConnectionState::Connected,
            Self::Fallback => has_fallback && connection != ConnectionState::Connected,
            Self::Queue => true,
        }
    }
}

/// First applicable route in [`ROUTE_ORDER`].
#[must_use]
pub fn select_route(connection: ConnectionState, has_fallback: bool) -> Route {
    ROUTE_ORDER
        .into_iter()
        .find(|route| route.applies(connection, has_fallback))
        .unwrap_or(Route::Queue)
}

/// Request/response chat transport used when the socket is not open.
#[async_trait]
pub trait ChatFallback: Send + Sync {
    /// Send one user turn and return the assistant reply text.
    async fn ask(&self, identity: &SessionIdentity, message: &str) -> Result<String, ApiError>;
}
