#![allow(
    dead_code,
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic,
    clippy::todo,
    clippy::unimplemented,
    clippy::indexing_slicing
)]
//! Shared test utilities for Decoy Den client integration tests.
//!
//! Provides a channel-based [`MockTransport`]/[`ScriptedConnector`] pair and
//! helper functions for constructing common server event JSON strings.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex as StdMutex};

use async_trait::async_trait;
use decoy_den_client::protocol::{
    Assignment, ParticipantEntry, Phase, Role, ServerEvent, StateData, TimerValue, UserId,
};
use decoy_den_client::{Connector, DecoyDenError, Transport, TransportFrame};

/// One scripted inbound item: `Some(Ok(..))` delivers a frame, `Some(Err(..))`
/// an abnormal loss, `None` a clean close.
pub type ScriptedItem = Option<Result<TransportFrame, DecoyDenError>>;

// ── MockTransport ───────────────────────────────────────────────────

/// A channel-based mock transport for integration testing.
///
/// Scripted server frames are consumed in order by `recv()`. All messages
/// sent by the client are recorded in `sent`.
pub struct MockTransport {
    incoming: VecDeque<ScriptedItem>,
    pub sent: Arc<StdMutex<Vec<String>>>,
    pub closed: Arc<AtomicBool>,
}

impl MockTransport {
    pub fn new(incoming: Vec<ScriptedItem>) -> (Self, Arc<StdMutex<Vec<String>>>, Arc<AtomicBool>) {
        let sent = Arc::new(StdMutex::new(Vec::new()));
        let closed = Arc::new(AtomicBool::new(false));
        let transport = Self {
            incoming: VecDeque::from(incoming),
            sent: Arc::clone(&sent),
            closed: Arc::clone(&closed),
        };
        (transport, sent, closed)
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn send(&mut self, message: String) -> Result<(), DecoyDenError> {
        self.sent.lock().unwrap().push(message);
        Ok(())
    }

    async fn recv(&mut self) -> Option<Result<TransportFrame, DecoyDenError>> {
        if let Some(item) = self.incoming.pop_front() {
            item
        } else {
            // No more scripted frames — hang forever so the connection
            // stays alive until shutdown is called.
            std::future::pending().await
        }
    }

    async fn close(&mut self) -> Result<(), DecoyDenError> {
        self.closed.store(true, Ordering::Relaxed);
        Ok(())
    }
}

// ── ScriptedConnector ───────────────────────────────────────────────

/// A connector that hands out prepared transports in order; once exhausted,
/// every further connect attempt fails (as an unreachable server would).
pub struct ScriptedConnector {
    transports: StdMutex<VecDeque<MockTransport>>,
}

impl ScriptedConnector {
    pub fn new(transports: Vec<MockTransport>) -> Self {
        Self {
            transports: StdMutex::new(VecDeque::from(transports)),
        }
    }

    /// A connector with exactly one scripted transport.
    pub fn single(
        incoming: Vec<ScriptedItem>,
    ) -> (Self, Arc<StdMutex<Vec<String>>>, Arc<AtomicBool>) {
        let (transport, sent, closed) = MockTransport::new(incoming);
        (Self::new(vec![transport]), sent, closed)
    }

    /// A connector that always fails to connect.
    pub fn unreachable() -> Self {
        Self::new(vec![])
    }
}

#[async_trait]
impl Connector for ScriptedConnector {
    async fn connect(&self) -> Result<Box<dyn Transport>, DecoyDenError> {
        match self.transports.lock().unwrap().pop_front() {
            Some(transport) => Ok(Box::new(transport)),
            None => Err(DecoyDenError::Io(std::io::Error::new(
                std::io::ErrorKind::ConnectionRefused,
                "scripted connector exhausted",
            ))),
        }
    }
}

// ── JSON helper functions ───────────────────────────────────────────

/// Text frame carrying a serialized server event.
pub fn frame(event: &ServerEvent) -> ScriptedItem {
    Some(Ok(TransportFrame::Text(
        serde_json::to_string(event).expect("event serialization"),
    )))
}

/// A `STATE_UPDATE` event.
pub fn state_update(next_phase: Phase, data: Option<StateData>) -> ServerEvent {
    ServerEvent::StateUpdate { next_phase, data }
}

/// A `PARTICIPANT_UPDATE` event.
pub fn participant_update(participants: Vec<ParticipantEntry>) -> ServerEvent {
    ServerEvent::ParticipantUpdate { participants }
}

/// A fully-specified roster entry.
pub fn entry(user_id: UserId, name: &str, role: Role, is_leader: bool) -> ParticipantEntry {
    ParticipantEntry {
        user_id,
        user_name: name.into(),
        role: Some(role),
        is_leader: Some(is_leader),
    }
}

/// A `TIMER_TICK` with a preformatted clock string.
pub fn timer_tick(display: &str) -> ServerEvent {
    ServerEvent::TimerTick {
        time: TimerValue::Display(display.into()),
    }
}

/// An assignment table entry.
pub fn assignment(user_id: UserId, emoji: &str) -> Assignment {
    Assignment {
        user_id,
        emoji: emoji.into(),
    }
}

/// Owned string list from literals.
pub fn strings(list: &[&str]) -> Vec<String> {
    list.iter().map(|s| (*s).to_owned()).collect()
}
