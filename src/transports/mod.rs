//! Built-in transport implementations.
//!
//! Currently one: [`WebSocketTransport`], gated behind the default
//! `transport-websocket` feature. Custom backends implement
//! [`Transport`](crate::transport::Transport) directly — see the
//! `loopback_round` demo for an in-process example.

#[cfg(feature = "transport-websocket")]
mod websocket;

#[cfg(feature = "transport-websocket")]
pub use websocket::{WebSocketConnector, WebSocketTransport, WsStream};
