//! Networking modules for the streaming chat connection and REST API.
//!
//! SYSTEM CONTEXT
//! ==============
//! `connection` is the socket-free state machine, `panel` drives it over a
//! real websocket, `queue`/`reconnect`/`transport` are its policies, `api`
//! and `retry` handle REST calls.

pub mod api;
pub mod connection;
pub mod panel;
pub mod queue;
pub mod reconnect;
pub mod retry;
pub mod transport;

#[cfg(test)]
pub mod test_helpers;
