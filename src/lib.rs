//! # Decoy Den Client
//!
//! Transport-agnostic Rust client engine for the Decoy Den party-game room
//! protocol.
//!
//! A host opens a room, three to six players join, and each round one player
//! (the "leader") composes a topic and an emoji set — one emoji of which is
//! secretly swapped for a decoy before the other players see it. This crate
//! is the client-side session synchronization engine behind that game: the
//! phase state machine, roster reconciliation, role derivation, decoy
//! injection, realtime transport with bounded reconnection, and debounced
//! local persistence.
//!
//! ## Features
//!
//! - **Transport-agnostic** — implement the [`Transport`]/[`Connector`]
//!   traits for any backend
//! - **WebSocket built-in** — the default `transport-websocket` feature
//!   provides [`WebSocketTransport`]
//! - **Event-driven** — receive typed [`DecoyDenEvent`]s via a channel, and
//!   watch complete [`Session`] snapshots
//! - **Crash-tolerant** — sessions are snapshotted (debounced) to a local
//!   [`SnapshotStore`] and restored on startup
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! let created = gateway.create_room().await?;
//! let connector = WebSocketConnector::new(format!(
//!     "wss://play.decoyden.io/ws?room_id={}&user_id={}",
//!     created.room_id, created.user_id,
//! ));
//! let store = Arc::new(FileStore::open(data_dir)?);
//! let config = DecoyDenConfig::for_host(&created, "Hana");
//!
//! let (client, mut events) = DecoyDenClient::start(connector, store, config);
//! while let Some(event) = events.recv().await {
//!     // react to phase changes, roster updates, timer ticks…
//! }
//! ```

pub mod emoji;
pub mod error;
pub mod error_codes;
pub mod event;
pub mod gateway;
pub mod persist;
pub mod protocol;
pub mod roster;
pub mod rules;
pub mod session;
pub mod transport;

#[cfg(feature = "tokio-runtime")]
pub mod client;
pub mod transports;

// Re-export primary types for ergonomic imports.
#[cfg(feature = "tokio-runtime")]
pub use client::{DecoyDenClient, DecoyDenConfig};
pub use emoji::{inject_decoy, DecoyInjection};
pub use error::DecoyDenError;
pub use error_codes::ErrorCode;
pub use event::DecoyDenEvent;
pub use gateway::ActionGateway;
pub use persist::{FileStore, MemoryStore, SnapshotStore};
pub use protocol::{ClientMessage, Phase, Role, ServerEvent};
pub use rules::{Privilege, RoomRules};
pub use session::{LocalIdentity, Session};
pub use transport::{Connector, Transport, TransportFrame};

#[cfg(feature = "transport-websocket")]
pub use transports::{WebSocketConnector, WebSocketTransport};
