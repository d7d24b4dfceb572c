//! Transport abstraction for the Decoy Den room protocol.
//!
//! The [`Transport`] trait defines a bidirectional message channel between
//! the client and the game server. Outgoing messages are always JSON text;
//! inbound payloads may arrive as text, as a binary blob (UTF-8 JSON bytes),
//! or — for in-process transports — as an already-structured JSON value.
//! The client normalizes all three into one dispatch path, so transports
//! just hand frames over as they arrive.
//!
//! # Connection Setup
//!
//! Connection setup is intentionally NOT part of [`Transport`] — different
//! transports have fundamentally different connection parameters (URLs for
//! WebSocket, host:port for TCP, in-process channel pairs). The
//! [`Connector`] trait captures setup instead, so the client can establish
//! replacement connections when reconnecting.
//!
//! # Implementing a Custom Transport
//!
//! ```rust,no_run
//! use async_trait::async_trait;
//! use decoy_den_client::error::DecoyDenError;
//! use decoy_den_client::transport::{Transport, TransportFrame};
//!
//! struct MyTransport { /* ... */ }
//!
//! #[async_trait]
//! impl Transport for MyTransport {
//!     async fn send(&mut self, message: String) -> Result<(), DecoyDenError> {
//!         // Send the JSON text message over your transport
//!         todo!()
//!     }
//!
//!     async fn recv(&mut self) -> Option<Result<TransportFrame, DecoyDenError>> {
//!         // Receive the next frame; None on clean close
//!         todo!()
//!     }
//!
//!     async fn close(&mut self) -> Result<(), DecoyDenError> {
//!         // Gracefully shut down the connection (normal close code)
//!         todo!()
//!     }
//! }
//! ```

use async_trait::async_trait;

use crate::error::DecoyDenError;

/// One inbound payload, in whichever shape the transport delivers it.
#[derive(Debug, Clone)]
pub enum TransportFrame {
    /// A JSON text message.
    Text(String),
    /// A binary blob expected to contain UTF-8 JSON bytes.
    Binary(Vec<u8>),
    /// An already-parsed JSON value (in-process transports).
    Structured(serde_json::Value),
}

/// A bidirectional message transport for the Decoy Den room protocol.
///
/// # Object Safety
///
/// This trait is object-safe; the client drives connections as
/// `Box<dyn Transport>` so a [`Connector`] can produce replacements on
/// reconnect.
///
/// # Cancel Safety
///
/// [`recv`](Transport::recv) **MUST** be cancel-safe because it is polled
/// inside `tokio::select!`. If `recv` is cancelled before completion,
/// calling it again must not lose data. Channel-based implementations are
/// naturally cancel-safe.
#[async_trait]
pub trait Transport: Send + 'static {
    /// Send a JSON text message to the server.
    ///
    /// # Errors
    ///
    /// Returns [`DecoyDenError::TransportSend`] if the message could not be
    /// sent (connection broken, write buffer full).
    async fn send(&mut self, message: String) -> Result<(), DecoyDenError>;

    /// Receive the next frame from the server.
    ///
    /// Returns:
    /// - `Some(Ok(frame))` — a complete payload was received
    /// - `Some(Err(e))` — the connection failed or closed abnormally
    ///   (e.g. [`DecoyDenError::ConnectionLost`] with the close code)
    /// - `None` — the connection was closed cleanly (normal close code)
    ///
    /// The distinction matters: the client reconnects after errors but not
    /// after a clean close.
    ///
    /// # Cancel Safety
    ///
    /// This method **MUST** be cancel-safe (see [trait documentation](Transport)).
    async fn recv(&mut self) -> Option<Result<TransportFrame, DecoyDenError>>;

    /// Close the transport gracefully with a normal close code.
    ///
    /// # Errors
    ///
    /// Returns an error if the close handshake fails. Implementations should
    /// still release resources even when it does.
    async fn close(&mut self) -> Result<(), DecoyDenError>;
}

/// Establishes transport connections on demand.
///
/// The client holds one connector per room and calls it for the initial
/// connection and for every bounded reconnection attempt; each call must
/// produce a *fresh* connection (any previous one has already been closed
/// or lost).
#[async_trait]
pub trait Connector: Send + Sync + 'static {
    /// Open a new connection to the room's realtime endpoint.
    async fn connect(&self) -> Result<Box<dyn Transport>, DecoyDenError>;
}
