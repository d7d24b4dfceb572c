//! # Loopback Round Example
//!
//! Shows how to implement the [`Transport`]/[`Connector`] traits with a
//! simple in-process channel pair, then drives a full game round through
//! the client without any network. This is useful for:
//!
//! - **Testing** — exercise game flow logic without a real server
//! - **Custom backends** — adapt any I/O layer (TCP, QUIC, WebRTC data channels)
//!
//! ## Running
//!
//! ```sh
//! cargo run --example loopback_round
//! ```

use std::sync::Arc;

use async_trait::async_trait;
use decoy_den_client::protocol::{
    Assignment, ClientMessage, Phase, ServerEvent, StateData, TimerValue,
};
use decoy_den_client::{
    Connector, DecoyDenClient, DecoyDenConfig, DecoyDenError, DecoyDenEvent, LocalIdentity,
    MemoryStore, Transport, TransportFrame,
};
use tokio::sync::{mpsc, Mutex};

// ─────────────────────────────────────────────────────────────────────
// Step 1: Define a channel-based "loopback" transport
// ─────────────────────────────────────────────────────────────────────

/// A loopback transport that shuttles messages through in-process channels.
///
/// - The **client half** (`LoopbackTransport`) implements [`Transport`] and
///   is produced by the connector.
/// - The **server half** (`LoopbackServer`) lets this demo play the game
///   server: read what the client sent, push protocol events back.
struct LoopbackTransport {
    /// Messages the client sends go here (server reads the other end).
    tx: mpsc::UnboundedSender<String>,
    /// Frames the "server" sends arrive here.
    rx: mpsc::UnboundedReceiver<TransportFrame>,
}

struct LoopbackServer {
    /// Read what the client sent.
    rx: mpsc::UnboundedReceiver<String>,
    /// Send frames to the client (as if they came from a server).
    tx: mpsc::UnboundedSender<TransportFrame>,
}

fn loopback_pair() -> (LoopbackTransport, LoopbackServer) {
    let (client_tx, server_rx) = mpsc::unbounded_channel();
    let (server_tx, client_rx) = mpsc::unbounded_channel();
    (
        LoopbackTransport {
            tx: client_tx,
            rx: client_rx,
        },
        LoopbackServer {
            rx: server_rx,
            tx: server_tx,
        },
    )
}

#[async_trait]
impl Transport for LoopbackTransport {
    async fn send(&mut self, message: String) -> Result<(), DecoyDenError> {
        self.tx
            .send(message)
            .map_err(|e| DecoyDenError::TransportSend(e.to_string()))
    }

    /// Channel `recv` is cancel-safe, so this transport is safe inside the
    /// client's `select!` loop.
    async fn recv(&mut self) -> Option<Result<TransportFrame, DecoyDenError>> {
        self.rx.recv().await.map(Ok)
    }

    async fn close(&mut self) -> Result<(), DecoyDenError> {
        self.rx.close();
        Ok(())
    }
}

/// Hands out the single prepared loopback transport, then refuses.
struct LoopbackConnector {
    transport: Mutex<Option<LoopbackTransport>>,
}

#[async_trait]
impl Connector for LoopbackConnector {
    async fn connect(&self) -> Result<Box<dyn Transport>, DecoyDenError> {
        self.transport
            .lock()
            .await
            .take()
            .map(|t| Box::new(t) as Box<dyn Transport>)
            .ok_or(DecoyDenError::TransportClosed)
    }
}

// ─────────────────────────────────────────────────────────────────────
// Step 2: Drive a round from the "server" side
// ─────────────────────────────────────────────────────────────────────

fn send_event(server: &LoopbackServer, event: &ServerEvent) {
    let json = serde_json::to_string(event).unwrap_or_default();
    let _ = server.tx.send(TransportFrame::Text(json));
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let (transport, mut server) = loopback_pair();
    let connector = LoopbackConnector {
        transport: Mutex::new(Some(transport)),
    };

    let room_id = uuid::Uuid::new_v4();
    let user_id = uuid::Uuid::new_v4();
    let identity = LocalIdentity::player(room_id, "AAAAAA", user_id, "RustPlayer", true);
    let (mut client, mut events) = DecoyDenClient::start(
        connector,
        Arc::new(MemoryStore::new()),
        DecoyDenConfig::new(identity),
    );

    // The client's first two messages are the registration handshake.
    let registration = server.rx.recv().await;
    tracing::info!("server saw: {}", registration.unwrap_or_default());
    let refresh = server.rx.recv().await;
    tracing::info!("server saw: {}", refresh.unwrap_or_default());

    // Walk the round forward: topic setup, then discussion with an
    // assignment for our player.
    send_event(
        &server,
        &ServerEvent::StateUpdate {
            next_phase: Phase::SettingTopic,
            data: None,
        },
    );
    send_event(
        &server,
        &ServerEvent::StateUpdate {
            next_phase: Phase::Discussing,
            data: Some(StateData {
                topic: Some("Movies".into()),
                displayed_emojis: Some(vec!["🎬".into(), "🔧".into(), "🎭".into()]),
                assignments: Some(vec![Assignment {
                    user_id,
                    emoji: "🍎".into(),
                }]),
                ..StateData::default()
            }),
        },
    );
    send_event(
        &server,
        &ServerEvent::TimerTick {
            time: TimerValue::Display("02:39".into()),
        },
    );

    // React to the resulting client events.
    let mut assigned = None;
    while let Some(event) = events.recv().await {
        match event {
            DecoyDenEvent::Connected => tracing::info!("connected"),
            DecoyDenEvent::PhaseChanged { phase } => tracing::info!("phase → {phase}"),
            DecoyDenEvent::EmojiAssigned { emoji } => {
                tracing::info!("assigned emoji: {emoji}");
                assigned = Some(emoji);
            }
            DecoyDenEvent::TimerTick { time } => {
                tracing::info!("time remaining: {time}");
                break;
            }
            other => tracing::debug!("event: {other:?}"),
        }
    }

    // As the leader, skip the rest of the discussion.
    client.skip_discussion()?;
    if let Some(msg) = server.rx.recv().await {
        let parsed: ClientMessage = serde_json::from_str(&msg)?;
        tracing::info!("server saw skip request: {parsed:?}");
    }

    tracing::info!(
        "round state: phase={}, assigned={:?}, visible={:?}",
        client.session().phase,
        assigned,
        client.session().visible_emojis(),
    );

    client.shutdown().await;
    Ok(())
}
