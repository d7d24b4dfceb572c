//! # Basic Room Example
//!
//! Demonstrates a complete Decoy Den client lifecycle:
//!
//! 1. Connect to a room server via WebSocket
//! 2. Register the local identity and request the roster
//! 3. React to room events (phase changes, roster updates, timer ticks)
//! 4. Shut down gracefully on Ctrl+C or disconnect
//!
//! ## Running
//!
//! ```sh
//! # Start a Decoy Den server on localhost:8080, create a room, then:
//! DECOY_DEN_ROOM_ID=<uuid> DECOY_DEN_USER_ID=<uuid> cargo run --example basic_room
//!
//! # Override the server URL:
//! DECOY_DEN_URL=ws://my-server:8080 cargo run --example basic_room
//! ```

use std::sync::Arc;

use decoy_den_client::{
    DecoyDenClient, DecoyDenConfig, DecoyDenEvent, FileStore, LocalIdentity, WebSocketConnector,
};

/// Default server URL when `DECOY_DEN_URL` is not set.
const DEFAULT_URL: &str = "ws://localhost:8080";

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // ── Logging ─────────────────────────────────────────────────────
    // Initialize tracing. Set `RUST_LOG=debug` for verbose output.
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    // ── Configuration ───────────────────────────────────────────────
    // In a real app the room/user IDs come from the Action Gateway's
    // create/join response; here they are supplied via the environment.
    let base_url = std::env::var("DECOY_DEN_URL").unwrap_or_else(|_| DEFAULT_URL.to_string());
    let room_id: uuid::Uuid = std::env::var("DECOY_DEN_ROOM_ID")
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or_else(uuid::Uuid::new_v4);
    let user_id: uuid::Uuid = std::env::var("DECOY_DEN_USER_ID")
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or_else(uuid::Uuid::new_v4);

    let identity = LocalIdentity::player(room_id, "AAAAAA", user_id, "RustPlayer", false);
    let config = DecoyDenConfig::new(identity);

    // One connection per (room, user): the connector bakes both into the URL
    // and is re-dialed for every reconnection attempt.
    let url = format!("{base_url}/ws?room_id={room_id}&user_id={user_id}");
    tracing::info!("Connecting to {url}");
    let connector = WebSocketConnector::new(url)
        .with_connect_timeout(std::time::Duration::from_secs(5));

    // Snapshots land next to the binary; a real app would use its data dir.
    let store = Arc::new(FileStore::open(".decoy-den")?);

    // Start the client. This spawns a background supervisor that drives the
    // transport and emits events on `event_rx`.
    let (mut client, mut event_rx) = DecoyDenClient::start(connector, store, config);

    // ── Event loop ──────────────────────────────────────────────────
    // Use `tokio::select!` to listen for both room events and Ctrl+C.
    loop {
        tokio::select! {
            // Branch 1: Incoming event from the room (or transport layer).
            event = event_rx.recv() => {
                let Some(event) = event else {
                    // Channel closed — supervisor exited.
                    tracing::info!("Event channel closed, exiting");
                    break;
                };

                match event {
                    // ── Transport lifecycle ──────────────────────────
                    DecoyDenEvent::Connected => {
                        tracing::info!("Registered with room {}", client.room_id());
                    }

                    DecoyDenEvent::Reconnecting { attempt, max_attempts } => {
                        tracing::warn!("Reconnecting… (attempt {attempt}/{max_attempts})");
                    }

                    DecoyDenEvent::ReconnectFailed { attempts } => {
                        tracing::error!("Gave up after {attempts} reconnection attempts");
                        break;
                    }

                    // ── Room lifecycle ───────────────────────────────
                    DecoyDenEvent::PhaseChanged { phase } => {
                        tracing::info!("Phase → {phase}");
                        let session = client.session();
                        if !session.visible_emojis().is_empty() {
                            tracing::info!("Emojis: {}", session.visible_emojis().join(" "));
                        }
                    }

                    DecoyDenEvent::RosterChanged { participants } => {
                        let names: Vec<&str> =
                            participants.iter().map(|p| p.user_name.as_str()).collect();
                        tracing::info!(
                            "{} participant(s): {}",
                            participants.len(),
                            names.join(", ")
                        );
                    }

                    DecoyDenEvent::EmojiAssigned { emoji } => {
                        tracing::info!("Your discussion emoji: {emoji}");
                    }

                    DecoyDenEvent::TimerTick { time } => {
                        tracing::debug!("Time remaining: {time}");
                    }

                    // ── Errors from the server ───────────────────────
                    DecoyDenEvent::ServerError { code, message } => {
                        tracing::error!("Server error [{code:?}]: {message}");
                    }

                    DecoyDenEvent::UnknownMessage { raw } => {
                        tracing::debug!("Unrecognized message: {raw}");
                    }

                    // ── Disconnect ───────────────────────────────────
                    DecoyDenEvent::Disconnected { reason } => {
                        tracing::warn!(
                            "Disconnected: {}",
                            reason.as_deref().unwrap_or("server closed the room")
                        );
                        break;
                    }
                }
            }

            // Branch 2: Ctrl+C — shut down gracefully.
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("Ctrl+C received, shutting down…");
                break;
            }
        }
    }

    // ── Cleanup ─────────────────────────────────────────────────────
    client.shutdown().await;
    tracing::info!("Client shut down. Goodbye!");
    Ok(())
}
