//! Async client for the Decoy Den room protocol.
//!
//! [`DecoyDenClient`] is a thin handle that communicates with a background
//! supervisor task via an unbounded MPSC channel. The supervisor owns the
//! one live transport for the room, performs the registration handshake and
//! heartbeat, applies every inbound protocol event to the session store, and
//! reconnects (bounded) after abnormal closes. Events are emitted on a
//! bounded channel returned from [`DecoyDenClient::start`]; the full session
//! is observable through [`DecoyDenClient::session`] / [`subscribe`].
//!
//! [`subscribe`]: DecoyDenClient::subscribe
//!
//! # Example
//!
//! ```rust,ignore
//! let connector = WebSocketConnector::new(room_url(&identity));
//! let store = Arc::new(FileStore::open(data_dir)?);
//! let config = DecoyDenConfig::for_host(&created, "Hana");
//! let (client, mut events) = DecoyDenClient::start(connector, store, config);
//!
//! client.start_game()?;
//!
//! while let Some(event) = events.recv().await {
//!     match event {
//!         DecoyDenEvent::PhaseChanged { phase } => { /* … */ }
//!         DecoyDenEvent::Disconnected { .. } => break,
//!         _ => {}
//!     }
//! }
//! ```

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, oneshot, watch};
use tracing::{debug, error, info, warn};

use crate::emoji::{inject_decoy, DecoyInjection};
use crate::error::{DecoyDenError, Result};
use crate::event::DecoyDenEvent;
use crate::gateway::{CreateRoomResponse, JoinRoomResponse};
use crate::persist::{self, PersistenceAdapter, SnapshotStore};
use crate::protocol::{ClientMessage, Phase, RoomId, ServerEvent, UserId};
use crate::roster::Participant;
use crate::rules::RoomRules;
use crate::session::{LocalIdentity, Session, StateOutcome};
use crate::transport::{Connector, Transport, TransportFrame};

/// Default capacity of the bounded event channel.
const DEFAULT_EVENT_CHANNEL_CAPACITY: usize = 256;

/// Default timeout for the graceful shutdown.
const DEFAULT_SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(1);

/// Default keep-alive ping interval.
const DEFAULT_HEARTBEAT_INTERVAL: Duration = Duration::from_secs(30);

/// Default delay between reconnection attempts.
const DEFAULT_RECONNECT_DELAY: Duration = Duration::from_secs(3);

/// Default bound on consecutive reconnection attempts.
const DEFAULT_MAX_RECONNECT_ATTEMPTS: u32 = 5;

/// Default debounce window for snapshot writes.
const DEFAULT_PERSIST_DEBOUNCE: Duration = Duration::from_millis(300);

// ── Configuration ───────────────────────────────────────────────────

/// Configuration for a [`DecoyDenClient`].
///
/// The only required input is the [`LocalIdentity`] established by the
/// create/join action; all other fields have defaults matching the shipped
/// game.
///
/// # Example
///
/// ```
/// use decoy_den_client::client::DecoyDenConfig;
/// use decoy_den_client::session::LocalIdentity;
/// use std::time::Duration;
/// use uuid::Uuid;
///
/// let identity = LocalIdentity::host(Uuid::new_v4(), "AAAAAA", Uuid::new_v4(), "Hana");
/// let config = DecoyDenConfig::new(identity)
///     .with_heartbeat_interval(Duration::from_secs(15))
///     .with_max_reconnect_attempts(3);
/// assert_eq!(config.max_reconnect_attempts, 3);
/// ```
#[derive(Debug, Clone)]
pub struct DecoyDenConfig {
    /// Local participant identity (set once, never mutated).
    pub identity: LocalIdentity,
    /// Tunable room rules (participant bounds, privileges).
    pub rules: RoomRules,
    /// Keep-alive ping interval while the connection is open.
    pub heartbeat_interval: Duration,
    /// Fixed delay before each reconnection attempt.
    pub reconnect_delay: Duration,
    /// Bound on consecutive reconnection attempts; exceeding it is a
    /// terminal, user-visible failure.
    pub max_reconnect_attempts: u32,
    /// Debounce window coalescing snapshot writes.
    pub persist_debounce: Duration,
    /// Capacity of the bounded event channel. When the consumer cannot keep
    /// up, intermediate events are dropped (with a warning logged);
    /// `Disconnected` and `ReconnectFailed` are always delivered.
    /// Values below 1 are clamped to 1.
    pub event_channel_capacity: usize,
    /// Timeout for the graceful shutdown before the supervisor task is
    /// aborted.
    pub shutdown_timeout: Duration,
    /// Round theme known at creation time (host only; protect-once).
    pub seed_theme: Option<String>,
    /// Topic hint known at creation time (host only; protect-once).
    pub seed_hint: Option<String>,
}

impl DecoyDenConfig {
    /// Create a configuration with default tuning.
    pub fn new(identity: LocalIdentity) -> Self {
        Self {
            identity,
            rules: RoomRules::default(),
            heartbeat_interval: DEFAULT_HEARTBEAT_INTERVAL,
            reconnect_delay: DEFAULT_RECONNECT_DELAY,
            max_reconnect_attempts: DEFAULT_MAX_RECONNECT_ATTEMPTS,
            persist_debounce: DEFAULT_PERSIST_DEBOUNCE,
            event_channel_capacity: DEFAULT_EVENT_CHANNEL_CAPACITY,
            shutdown_timeout: DEFAULT_SHUTDOWN_TIMEOUT,
            seed_theme: None,
            seed_hint: None,
        }
    }

    /// Configuration for a room creator, seeding the server-issued theme and
    /// hint from the create response.
    pub fn for_host(response: &CreateRoomResponse, user_name: impl Into<String>) -> Self {
        let mut config = Self::new(response.identity(user_name));
        config.seed_theme = Some(response.theme.clone());
        config.seed_hint = Some(response.hint.clone());
        config
    }

    /// Configuration for a joining player.
    pub fn for_player(
        response: &JoinRoomResponse,
        room_code: impl Into<String>,
        user_name: impl Into<String>,
    ) -> Self {
        Self::new(response.identity(room_code, user_name))
    }

    #[must_use]
    pub fn with_rules(mut self, rules: RoomRules) -> Self {
        self.rules = rules;
        self
    }

    #[must_use]
    pub fn with_heartbeat_interval(mut self, interval: Duration) -> Self {
        self.heartbeat_interval = interval;
        self
    }

    #[must_use]
    pub fn with_reconnect_delay(mut self, delay: Duration) -> Self {
        self.reconnect_delay = delay;
        self
    }

    #[must_use]
    pub fn with_max_reconnect_attempts(mut self, attempts: u32) -> Self {
        self.max_reconnect_attempts = attempts;
        self
    }

    #[must_use]
    pub fn with_persist_debounce(mut self, debounce: Duration) -> Self {
        self.persist_debounce = debounce;
        self
    }

    /// Set the capacity of the bounded event channel.
    ///
    /// Defaults to **256**. Values below 1 are clamped to 1.
    #[must_use]
    pub fn with_event_channel_capacity(mut self, capacity: usize) -> Self {
        self.event_channel_capacity = capacity.max(1);
        self
    }

    #[must_use]
    pub fn with_shutdown_timeout(mut self, timeout: Duration) -> Self {
        self.shutdown_timeout = timeout;
        self
    }
}

// ── Shared state ────────────────────────────────────────────────────

/// Internal shared state between the client handle and the supervisor.
struct ClientState {
    /// The client accepts commands (supervisor task is running and has not
    /// reached a terminal state).
    alive: AtomicBool,
    /// The transport is currently believed to be open.
    connected: AtomicBool,
}

impl ClientState {
    fn new() -> Self {
        Self {
            alive: AtomicBool::new(true),
            connected: AtomicBool::new(false),
        }
    }
}

/// Commands from the handle to the supervisor.
enum Command {
    Protocol(ClientMessage),
    Reset,
}

// ── Client handle ───────────────────────────────────────────────────

/// Async client handle for one room session.
///
/// Created via [`DecoyDenClient::start`], which restores any persisted
/// snapshot, spawns the background supervisor, and returns this handle
/// together with an event receiver.
///
/// Action methods validate privilege and phase against the current session
/// snapshot, then queue a [`ClientMessage`] to the supervisor. They return
/// immediately once the message is queued (no round-trip await).
pub struct DecoyDenClient {
    cmd_tx: mpsc::UnboundedSender<Command>,
    state: Arc<ClientState>,
    session_rx: watch::Receiver<Session>,
    identity: LocalIdentity,
    rules: RoomRules,
    task: Option<tokio::task::JoinHandle<()>>,
    shutdown_tx: Option<oneshot::Sender<()>>,
    shutdown_timeout: Duration,
}

impl DecoyDenClient {
    /// Start the client supervisor and return a handle plus event receiver.
    ///
    /// Before any protocol event is processed, the most recent persisted
    /// snapshot for the room (if any) is restored and overlaid with the
    /// local identity, so a restart mid-round does not lose round content.
    ///
    /// # Arguments
    ///
    /// * `connector` — produces transport connections for the room endpoint;
    ///   called for the initial connection and every reconnection attempt.
    /// * `store` — durable local storage for session snapshots.
    /// * `config` — identity, rules, and tuning.
    #[must_use = "the event receiver must be used to receive events"]
    pub fn start(
        connector: impl Connector,
        store: Arc<dyn SnapshotStore>,
        config: DecoyDenConfig,
    ) -> (Self, mpsc::Receiver<DecoyDenEvent>) {
        let adapter = Arc::new(PersistenceAdapter::new(store));
        let identity = config.identity.clone();

        // Restore before connecting: a reload mid-round must not wait for
        // (or lose a race with) the first server broadcast.
        let mut session = adapter
            .restore(Some(identity.room_id), Some(identity.user_id))
            .unwrap_or_else(|| Session::seeded(&identity));
        overlay_identity(&mut session, &identity);
        seed_round_framing(&mut session, &config);

        let (cmd_tx, cmd_rx) = mpsc::unbounded_channel::<Command>();
        // Clamp capacity to at least 1 (tokio panics on 0).
        let capacity = config.event_channel_capacity.max(1);
        let (event_tx, event_rx) = mpsc::channel::<DecoyDenEvent>(capacity);
        let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();
        let (session_tx, session_rx) = watch::channel(session.clone());

        let (persist_tx, _writer) =
            persist::spawn_writer(Arc::clone(&adapter), config.persist_debounce);
        // Snapshot the seeded/restored session right away.
        let _ = persist_tx.send(persist::PersistCmd::Snapshot(session));

        let state = Arc::new(ClientState::new());

        let ctx = LoopCtx {
            event_tx,
            session_tx,
            persist_tx,
            adapter,
            state: Arc::clone(&state),
            identity: identity.clone(),
            heartbeat_interval: config.heartbeat_interval,
            reconnect_delay: config.reconnect_delay,
            max_reconnect_attempts: config.max_reconnect_attempts,
        };
        let task = tokio::spawn(supervisor_loop(connector, cmd_rx, shutdown_rx, ctx));

        let client = Self {
            cmd_tx,
            state,
            session_rx,
            identity,
            rules: config.rules,
            task: Some(task),
            shutdown_tx: Some(shutdown_tx),
            shutdown_timeout: config.shutdown_timeout,
        };

        (client, event_rx)
    }

    // ── Session observation ─────────────────────────────────────────

    /// The current session snapshot.
    pub fn session(&self) -> Session {
        self.session_rx.borrow().clone()
    }

    /// Watch the session for changes. Each published value is a complete
    /// immutable snapshot.
    pub fn subscribe(&self) -> watch::Receiver<Session> {
        self.session_rx.clone()
    }

    /// Returns `true` while the transport is believed to be open (false
    /// during reconnection and after teardown).
    pub fn is_connected(&self) -> bool {
        self.state.connected.load(Ordering::Acquire)
    }

    /// The room this client is bound to.
    pub fn room_id(&self) -> RoomId {
        self.identity.room_id
    }

    /// The human-shareable join token, when known.
    pub fn room_code(&self) -> Option<&str> {
        self.identity.room_code.as_deref()
    }

    /// The local participant's identifier.
    pub fn user_id(&self) -> UserId {
        self.identity.user_id
    }

    // ── Actions ─────────────────────────────────────────────────────

    /// Host advances the room from the lobby into topic setup.
    ///
    /// # Errors
    ///
    /// [`DecoyDenError::PermissionDenied`] unless the start policy permits
    /// the local participant, [`DecoyDenError::InvalidState`] outside
    /// `WAITING`, [`DecoyDenError::Validation`] below the player minimum,
    /// [`DecoyDenError::NotConnected`] after teardown.
    pub fn start_game(&self) -> Result<()> {
        let session = self.session();
        if !self
            .rules
            .start_policy
            .permits(session.is_host(), session.is_leader())
        {
            return Err(DecoyDenError::PermissionDenied {
                action: "start game".into(),
            });
        }
        if session.phase != Phase::Waiting {
            return Err(DecoyDenError::InvalidState(format!(
                "game can only start from waiting, current phase is {}",
                session.phase
            )));
        }
        if session.roster.len() < self.rules.min_players {
            return Err(DecoyDenError::Validation(format!(
                "{} players required to start, have {}",
                self.rules.min_players,
                session.roster.len()
            )));
        }
        self.send(ClientMessage::StartGame)
    }

    /// Leader/host sets the round content. Runs decoy injection locally and
    /// transmits the full tuple; the returned [`DecoyInjection`] lets the
    /// caller render immediately without waiting for the echo broadcast.
    ///
    /// # Errors
    ///
    /// [`DecoyDenError::PermissionDenied`] for non-leader/non-host callers,
    /// [`DecoyDenError::InvalidState`] outside `SETTING_TOPIC`,
    /// [`DecoyDenError::Validation`] for a blank topic or an invalid emoji
    /// selection, [`DecoyDenError::NotConnected`] after teardown.
    pub fn submit_topic(&self, topic: &str, emojis: &[String]) -> Result<DecoyInjection> {
        let session = self.session();
        if !(session.is_host() || session.is_leader()) {
            return Err(DecoyDenError::PermissionDenied {
                action: "submit topic".into(),
            });
        }
        if session.phase != Phase::SettingTopic {
            return Err(DecoyDenError::InvalidState(format!(
                "topic can only be submitted during setting_topic, current phase is {}",
                session.phase
            )));
        }
        self.rules.validate_topic(topic)?;
        self.rules.validate_emojis(emojis)?;

        let injection = inject_decoy(emojis)?;
        self.send(ClientMessage::SubmitTopic {
            topic: topic.to_owned(),
            original_emojis: injection.original.clone(),
            displayed_emojis: injection.displayed.clone(),
            dummy_index: injection.dummy_index,
            dummy_emoji: injection.dummy_emoji.clone(),
        })?;
        Ok(injection)
    }

    /// Leader submits the final guess.
    ///
    /// # Errors
    ///
    /// [`DecoyDenError::PermissionDenied`] for non-leaders,
    /// [`DecoyDenError::InvalidState`] outside `ANSWERING`,
    /// [`DecoyDenError::Validation`] for a blank answer,
    /// [`DecoyDenError::NotConnected`] after teardown.
    pub fn submit_answer(&self, answer: &str) -> Result<()> {
        let session = self.session();
        if !session.is_leader() {
            return Err(DecoyDenError::PermissionDenied {
                action: "submit answer".into(),
            });
        }
        if session.phase != Phase::Answering {
            return Err(DecoyDenError::InvalidState(format!(
                "answers can only be submitted during answering, current phase is {}",
                session.phase
            )));
        }
        if answer.trim().is_empty() {
            return Err(DecoyDenError::Validation("answer must not be empty".into()));
        }
        self.send(ClientMessage::SubmitAnswer {
            user_id: self.identity.user_id,
            answer: answer.to_owned(),
        })
    }

    /// Leader/host forces the discussion to end early.
    ///
    /// # Errors
    ///
    /// [`DecoyDenError::PermissionDenied`] unless the skip policy permits
    /// the local participant, [`DecoyDenError::InvalidState`] outside
    /// `DISCUSSING`, [`DecoyDenError::NotConnected`] after teardown.
    pub fn skip_discussion(&self) -> Result<()> {
        let session = self.session();
        if !self
            .rules
            .skip_policy
            .permits(session.is_host(), session.is_leader())
        {
            return Err(DecoyDenError::PermissionDenied {
                action: "skip discussion".into(),
            });
        }
        if session.phase != Phase::Discussing {
            return Err(DecoyDenError::InvalidState(format!(
                "discussion can only be skipped during discussing, current phase is {}",
                session.phase
            )));
        }
        self.send(ClientMessage::SkipDiscussion)
    }

    /// Ask the server to re-broadcast the roster.
    ///
    /// # Errors
    ///
    /// Returns [`DecoyDenError::NotConnected`] after teardown.
    pub fn request_roster(&self) -> Result<()> {
        self.send(ClientMessage::RequestParticipants {
            room_id: self.identity.room_id,
        })
    }

    /// Send a heartbeat ping (the supervisor already pings on its own
    /// interval; this is for manual probing).
    ///
    /// # Errors
    ///
    /// Returns [`DecoyDenError::NotConnected`] after teardown.
    pub fn ping(&self) -> Result<()> {
        self.send(ClientMessage::Ping)
    }

    /// Return to the title screen: close the connection with a normal close,
    /// stop the heartbeat and any pending reconnection, clear all
    /// room-scoped storage, and reset the session to its empty initial
    /// state. This is the only legitimate way to empty the session.
    ///
    /// # Errors
    ///
    /// Returns [`DecoyDenError::NotConnected`] if the supervisor has already
    /// terminated.
    pub fn reset(&self) -> Result<()> {
        self.cmd_tx
            .send(Command::Reset)
            .map_err(|_| DecoyDenError::NotConnected)
    }

    /// Shut down the client, closing the transport and stopping the
    /// background task.
    ///
    /// After calling this method, the event receiver will yield `None` once
    /// the supervisor exits.
    pub async fn shutdown(&mut self) {
        debug!("DecoyDenClient: shutdown requested");

        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }

        // Await the supervisor with a timeout. If it doesn't exit in time,
        // abort it so the task cannot detach and run indefinitely.
        if let Some(mut task) = self.task.take() {
            match tokio::time::timeout(self.shutdown_timeout, &mut task).await {
                Ok(Ok(())) => {}
                Ok(Err(join_err)) => {
                    warn!("supervisor terminated with join error: {join_err}");
                }
                Err(_) => {
                    warn!("supervisor did not exit within timeout; aborting task");
                    task.abort();
                    if let Err(join_err) = task.await {
                        debug!("supervisor aborted: {join_err}");
                    }
                }
            }
        }

        self.state.alive.store(false, Ordering::Release);
        self.state.connected.store(false, Ordering::Release);
    }

    // ── Internal helpers ────────────────────────────────────────────

    /// Queue a protocol message to the supervisor.
    fn send(&self, msg: ClientMessage) -> Result<()> {
        if !self.state.alive.load(Ordering::Acquire) {
            return Err(DecoyDenError::NotConnected);
        }
        self.cmd_tx
            .send(Command::Protocol(msg))
            .map_err(|_| DecoyDenError::NotConnected)
    }
}

impl std::fmt::Debug for DecoyDenClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DecoyDenClient")
            .field("room_id", &self.identity.room_id)
            .field("connected", &self.is_connected())
            .field("has_task", &self.task.is_some())
            .finish()
    }
}

impl Drop for DecoyDenClient {
    fn drop(&mut self) {
        // `Drop` is synchronous so we cannot await a graceful shutdown.
        // The only safe action is to abort the spawned task, which causes
        // the supervisor future to be dropped immediately. The shutdown
        // oneshot is intentionally *not* sent here: sending it would trigger
        // a graceful path that calls async `transport.close()`, but there is
        // no executor context to drive it inside `Drop`.
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

// ── Startup helpers ─────────────────────────────────────────────────

/// Overlay the immutable local identity onto a (possibly restored) session.
fn overlay_identity(session: &mut Session, identity: &LocalIdentity) {
    session.room_id = Some(identity.room_id);
    if identity.room_code.is_some() {
        session.room_code.clone_from(&identity.room_code);
    }
    session.local_user_id = Some(identity.user_id);
    session.local_user_name = Some(identity.user_name.clone());
    if !session
        .roster
        .iter()
        .any(|p| p.user_id == identity.user_id)
    {
        session.roster.push(Participant {
            user_id: identity.user_id,
            user_name: identity.user_name.clone(),
            role: identity.role,
            is_leader: identity.is_leader,
        });
    }
}

/// Seed round framing known at creation time, without clobbering restored
/// values.
fn seed_round_framing(session: &mut Session, config: &DecoyDenConfig) {
    if session.theme.as_deref().is_none_or(str::is_empty) {
        session.theme.clone_from(&config.seed_theme);
    }
    if session.hint.as_deref().is_none_or(str::is_empty) {
        session.hint.clone_from(&config.seed_hint);
    }
}

// ── Supervisor ──────────────────────────────────────────────────────

/// Everything the supervisor needs besides the control channels.
struct LoopCtx {
    event_tx: mpsc::Sender<DecoyDenEvent>,
    session_tx: watch::Sender<Session>,
    persist_tx: mpsc::UnboundedSender<persist::PersistCmd>,
    adapter: Arc<PersistenceAdapter>,
    state: Arc<ClientState>,
    identity: LocalIdentity,
    heartbeat_interval: Duration,
    reconnect_delay: Duration,
    max_reconnect_attempts: u32,
}

impl LoopCtx {
    /// Publish a new session snapshot to watchers and schedule a persisted
    /// write (fire-and-forget; the writer debounces).
    fn publish(&self, session: Session) {
        let _ = self
            .persist_tx
            .send(persist::PersistCmd::Snapshot(session.clone()));
        self.session_tx.send_replace(session);
    }

    /// Emit an event. If the channel is full, log a warning and drop the
    /// event to avoid blocking dispatch.
    fn emit(&self, event: DecoyDenEvent) {
        match self.event_tx.try_send(event) {
            Ok(()) => {}
            Err(mpsc::error::TrySendError::Full(dropped)) => {
                warn!(
                    "event channel full, dropping event: {:?}",
                    std::mem::discriminant(&dropped)
                );
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                debug!("event channel closed, receiver dropped");
            }
        }
    }

    /// Emit a terminal event with a blocking send: `Disconnected` and
    /// `ReconnectFailed` are the last words on the channel and must never be
    /// silently dropped.
    async fn emit_final(&self, event: DecoyDenEvent) {
        self.state.alive.store(false, Ordering::Release);
        self.state.connected.store(false, Ordering::Release);
        if self.event_tx.send(event).await.is_err() {
            debug!("event channel closed, receiver dropped");
        }
    }

    /// Clear room-scoped storage and publish the empty initial session.
    fn do_reset(&self) {
        if let Err(e) = self.adapter.reset(self.identity.room_id) {
            warn!("reset: failed to clear room storage: {e}");
        }
        // Also route the reset through the writer queue so a snapshot still
        // pending in the debounce window is discarded rather than written
        // after the keys were cleared.
        let _ = self
            .persist_tx
            .send(persist::PersistCmd::Reset(self.identity.room_id));
        self.session_tx.send_replace(Session::default());
        info!(room_id = %self.identity.room_id, "session reset to initial state");
    }
}

/// How one connection ended.
enum ConnExit {
    /// Shutdown signal, or every handle was dropped.
    Shutdown,
    /// Explicit reset; storage is already cleared.
    Reset,
    /// The server closed the connection normally. Not retried.
    RemoteClosed,
    /// Abnormal loss; subject to the reconnection policy. `progressed` is
    /// true when the connection dispatched at least one inbound event,
    /// which resets the consecutive-failure counter.
    Lost { reason: String, progressed: bool },
}

/// Background supervisor: owns the one live transport for the room,
/// reconnecting after abnormal losses up to the configured bound.
async fn supervisor_loop(
    connector: impl Connector,
    mut cmd_rx: mpsc::UnboundedReceiver<Command>,
    mut shutdown_rx: oneshot::Receiver<()>,
    ctx: LoopCtx,
) {
    debug!(room_id = %ctx.identity.room_id, "supervisor started");
    let mut attempts: u32 = 0;

    loop {
        let connected = tokio::select! {
            result = connector.connect() => result,
            _ = &mut shutdown_rx => {
                ctx.emit_final(DecoyDenEvent::Disconnected {
                    reason: Some("client shut down".into()),
                })
                .await;
                return;
            }
        };

        match connected {
            Ok(mut transport) => {
                match send_handshake(transport.as_mut(), &ctx).await {
                    Ok(()) => {
                        ctx.state.connected.store(true, Ordering::Release);
                        ctx.emit(DecoyDenEvent::Connected);

                        let exit =
                            run_connection(transport.as_mut(), &mut cmd_rx, &mut shutdown_rx, &ctx)
                                .await;
                        ctx.state.connected.store(false, Ordering::Release);

                        match exit {
                            ConnExit::Shutdown => {
                                let _ = transport.close().await;
                                ctx.emit_final(DecoyDenEvent::Disconnected {
                                    reason: Some("client shut down".into()),
                                })
                                .await;
                                return;
                            }
                            ConnExit::Reset => {
                                let _ = transport.close().await;
                                ctx.emit_final(DecoyDenEvent::Disconnected {
                                    reason: Some("session reset".into()),
                                })
                                .await;
                                return;
                            }
                            ConnExit::RemoteClosed => {
                                debug!("connection closed normally by server");
                                ctx.emit_final(DecoyDenEvent::Disconnected { reason: None })
                                    .await;
                                return;
                            }
                            ConnExit::Lost { reason, progressed } => {
                                warn!(%reason, "connection lost");
                                // Release the dead socket before dialing a
                                // replacement; one connection per room.
                                let _ = transport.close().await;
                                if progressed {
                                    attempts = 0;
                                }
                            }
                        }
                    }
                    Err(e) => {
                        warn!("registration handshake failed: {e}");
                        let _ = transport.close().await;
                    }
                }
            }
            Err(e) => {
                warn!("connection attempt failed: {e}");
            }
        }

        // ── Reconnection policy ─────────────────────────────────────
        attempts += 1;
        if attempts > ctx.max_reconnect_attempts {
            error!(
                attempts = attempts - 1,
                "reconnection attempts exhausted, giving up"
            );
            ctx.emit_final(DecoyDenEvent::ReconnectFailed {
                attempts: attempts - 1,
            })
            .await;
            return;
        }
        ctx.emit(DecoyDenEvent::Reconnecting {
            attempt: attempts,
            max_attempts: ctx.max_reconnect_attempts,
        });
        debug!(
            attempt = attempts,
            max = ctx.max_reconnect_attempts,
            "scheduling reconnect"
        );

        // The delay must stay responsive to shutdown and reset — a pending
        // reconnection timer that survives teardown is a defect.
        let deadline = tokio::time::Instant::now() + ctx.reconnect_delay;
        loop {
            tokio::select! {
                _ = tokio::time::sleep_until(deadline) => break,
                _ = &mut shutdown_rx => {
                    ctx.emit_final(DecoyDenEvent::Disconnected {
                        reason: Some("client shut down".into()),
                    })
                    .await;
                    return;
                }
                cmd = cmd_rx.recv() => match cmd {
                    Some(Command::Reset) => {
                        ctx.do_reset();
                        ctx.emit_final(DecoyDenEvent::Disconnected {
                            reason: Some("session reset".into()),
                        })
                        .await;
                        return;
                    }
                    Some(Command::Protocol(msg)) => {
                        warn!(
                            "dropping outgoing message while reconnecting: {:?}",
                            std::mem::discriminant(&msg)
                        );
                    }
                    None => {
                        ctx.emit_final(DecoyDenEvent::Disconnected {
                            reason: Some("client shut down".into()),
                        })
                        .await;
                        return;
                    }
                }
            }
        }
    }
}

/// On open: announce local identity, then request a roster refresh.
async fn send_handshake(transport: &mut dyn Transport, ctx: &LoopCtx) -> Result<()> {
    let session = ctx.session_tx.borrow().clone();
    let register = ClientMessage::Register {
        user_id: ctx.identity.user_id,
        user_name: ctx.identity.user_name.clone(),
        role: ctx.identity.role,
        is_leader: session.is_leader(),
    };
    transport.send(serde_json::to_string(&register)?).await?;

    let refresh = ClientMessage::RequestParticipants {
        room_id: ctx.identity.room_id,
    };
    transport.send(serde_json::to_string(&refresh)?).await?;
    Ok(())
}

/// Drive one open connection until it ends.
async fn run_connection(
    transport: &mut dyn Transport,
    cmd_rx: &mut mpsc::UnboundedReceiver<Command>,
    shutdown_rx: &mut oneshot::Receiver<()>,
    ctx: &LoopCtx,
) -> ConnExit {
    let mut heartbeat = tokio::time::interval_at(
        tokio::time::Instant::now() + ctx.heartbeat_interval,
        ctx.heartbeat_interval,
    );
    heartbeat.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
    let mut progressed = false;

    loop {
        tokio::select! {
            // Branch 1: outgoing command from the client handle
            cmd = cmd_rx.recv() => {
                match cmd {
                    Some(Command::Protocol(msg)) => {
                        debug!("sending client message: {:?}", std::mem::discriminant(&msg));
                        match serde_json::to_string(&msg) {
                            Ok(json) => {
                                if let Err(e) = transport.send(json).await {
                                    error!("transport send error: {e}");
                                    return ConnExit::Lost {
                                        reason: format!("transport send error: {e}"),
                                        progressed,
                                    };
                                }
                            }
                            Err(e) => {
                                error!("failed to serialize ClientMessage: {e}");
                                // Serialization errors are programming bugs; don't kill the loop.
                            }
                        }
                    }
                    Some(Command::Reset) => {
                        ctx.do_reset();
                        return ConnExit::Reset;
                    }
                    // Command channel closed — client handle dropped.
                    None => {
                        debug!("command channel closed, shutting down supervisor");
                        return ConnExit::Shutdown;
                    }
                }
            }

            // Branch 2: shutdown signal
            _ = &mut *shutdown_rx => {
                debug!("shutdown signal received");
                return ConnExit::Shutdown;
            }

            // Branch 3: heartbeat tick
            _ = heartbeat.tick() => {
                match serde_json::to_string(&ClientMessage::Ping) {
                    Ok(json) => {
                        if let Err(e) = transport.send(json).await {
                            error!("heartbeat send error: {e}");
                            return ConnExit::Lost {
                                reason: format!("heartbeat send error: {e}"),
                                progressed,
                            };
                        }
                    }
                    Err(e) => error!("failed to serialize ping: {e}"),
                }
            }

            // Branch 4: incoming frame from the server
            incoming = transport.recv() => {
                match incoming {
                    Some(Ok(frame)) => {
                        dispatch(frame, ctx);
                        progressed = true;
                    }
                    Some(Err(e)) => {
                        error!("transport receive error: {e}");
                        return ConnExit::Lost {
                            reason: e.to_string(),
                            progressed,
                        };
                    }
                    // Transport closed cleanly.
                    None => {
                        debug!("transport closed by server");
                        return ConnExit::RemoteClosed;
                    }
                }
            }
        }
    }
}

/// Normalize one inbound frame and apply it to the session store.
///
/// This is the single dispatch entry point: one frame is fully applied
/// before the next is processed, so no component needs internal locking.
fn dispatch(frame: TransportFrame, ctx: &LoopCtx) {
    let event = match frame {
        TransportFrame::Text(text) => ServerEvent::parse(&text),
        TransportFrame::Binary(bytes) => ServerEvent::parse_bytes(&bytes),
        TransportFrame::Structured(value) => ServerEvent::parse_value(value),
    };

    let mut session = ctx.session_tx.borrow().clone();
    match event {
        ServerEvent::StateUpdate { next_phase, data } => {
            match session.apply_state_update(next_phase, data.as_ref()) {
                StateOutcome::Rejected => {}
                StateOutcome::Applied {
                    phase_changed,
                    assignment_changed,
                } => {
                    let phase = session.phase;
                    let assigned = session.assigned_emoji.clone();
                    ctx.publish(session);
                    if phase_changed {
                        ctx.emit(DecoyDenEvent::PhaseChanged { phase });
                    }
                    if assignment_changed {
                        if let Some(emoji) = assigned {
                            ctx.emit(DecoyDenEvent::EmojiAssigned { emoji });
                        }
                    }
                }
            }
        }
        ServerEvent::ParticipantUpdate { participants } => {
            if session.apply_roster(&participants) {
                let roster = session.roster.clone();
                ctx.publish(session);
                ctx.emit(DecoyDenEvent::RosterChanged {
                    participants: roster,
                });
            }
        }
        ServerEvent::TimerTick { time } => {
            session.apply_timer(time.clone());
            ctx.publish(session);
            ctx.emit(DecoyDenEvent::TimerTick { time });
        }
        ServerEvent::Error { code, message } => {
            session.apply_server_error(code.clone(), message.clone());
            ctx.publish(session);
            ctx.emit(DecoyDenEvent::ServerError { code, message });
        }
        ServerEvent::Unknown { raw } => {
            warn!(%raw, "dropping unrecognized server message");
            ctx.emit(DecoyDenEvent::UnknownMessage { raw });
        }
    }
}

// ── Tests ───────────────────────────────────────────────────────────

#[cfg(test)]
#[allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic,
    clippy::todo,
    clippy::unimplemented,
    clippy::indexing_slicing
)]
mod tests {
    use super::*;
    use crate::persist::MemoryStore;
    use crate::protocol::{Role, StateData, TimerValue};
    use async_trait::async_trait;
    use std::collections::VecDeque;
    use std::sync::Mutex as StdMutex;
    use uuid::Uuid;

    // ── Mock transport / connector ──────────────────────────────────

    type Scripted = VecDeque<Option<std::result::Result<TransportFrame, DecoyDenError>>>;

    /// A mock transport that records sent messages and replays scripted
    /// frames.
    struct MockTransport {
        incoming: Scripted,
        sent: Arc<StdMutex<Vec<String>>>,
        closed: Arc<AtomicBool>,
    }

    #[async_trait]
    impl Transport for MockTransport {
        async fn send(&mut self, message: String) -> std::result::Result<(), DecoyDenError> {
            self.sent.lock().unwrap().push(message);
            Ok(())
        }

        async fn recv(
            &mut self,
        ) -> Option<std::result::Result<TransportFrame, DecoyDenError>> {
            if let Some(item) = self.incoming.pop_front() {
                // An explicit `None` entry signals a clean transport close;
                // `Some(result)` delivers the scripted frame or error.
                item
            } else {
                // All scripted frames delivered — hang forever so the
                // connection stays alive until shutdown.
                std::future::pending().await
            }
        }

        async fn close(&mut self) -> std::result::Result<(), DecoyDenError> {
            self.closed.store(true, Ordering::Relaxed);
            Ok(())
        }
    }

    /// A connector that hands out scripted transports in order, then fails.
    struct ScriptedConnector {
        transports: StdMutex<VecDeque<MockTransport>>,
    }

    impl ScriptedConnector {
        fn single(
            incoming: Vec<Option<std::result::Result<TransportFrame, DecoyDenError>>>,
        ) -> (Self, Arc<StdMutex<Vec<String>>>, Arc<AtomicBool>) {
            let sent = Arc::new(StdMutex::new(Vec::new()));
            let closed = Arc::new(AtomicBool::new(false));
            let transport = MockTransport {
                incoming: VecDeque::from(incoming),
                sent: Arc::clone(&sent),
                closed: Arc::clone(&closed),
            };
            (
                Self {
                    transports: StdMutex::new(VecDeque::from([transport])),
                },
                sent,
                closed,
            )
        }

        fn exhausted() -> Self {
            Self {
                transports: StdMutex::new(VecDeque::new()),
            }
        }
    }

    #[async_trait]
    impl Connector for ScriptedConnector {
        async fn connect(&self) -> std::result::Result<Box<dyn Transport>, DecoyDenError> {
            match self.transports.lock().unwrap().pop_front() {
                Some(transport) => Ok(Box::new(transport)),
                None => Err(DecoyDenError::Io(std::io::Error::new(
                    std::io::ErrorKind::ConnectionRefused,
                    "no more scripted transports",
                ))),
            }
        }
    }

    // ── Helpers ─────────────────────────────────────────────────────

    fn host_config() -> DecoyDenConfig {
        let identity = LocalIdentity::host(
            Uuid::from_u128(9),
            "AAAAAA",
            Uuid::from_u128(1),
            "Hana",
        );
        DecoyDenConfig::new(identity)
            .with_reconnect_delay(Duration::from_millis(10))
            .with_persist_debounce(Duration::from_millis(10))
    }

    fn text(event: &ServerEvent) -> Option<std::result::Result<TransportFrame, DecoyDenError>> {
        Some(Ok(TransportFrame::Text(
            serde_json::to_string(event).unwrap(),
        )))
    }

    fn state_update(next_phase: Phase, data: Option<StateData>) -> ServerEvent {
        ServerEvent::StateUpdate { next_phase, data }
    }

    fn memory_store() -> Arc<dyn SnapshotStore> {
        Arc::new(MemoryStore::new())
    }

    // ── Tests ───────────────────────────────────────────────────────

    #[tokio::test]
    async fn start_sends_registration_then_roster_refresh() {
        let (connector, sent, _closed) = ScriptedConnector::single(vec![]);
        let (mut client, mut events) =
            DecoyDenClient::start(connector, memory_store(), host_config());

        let event = events.recv().await.unwrap();
        assert!(matches!(event, DecoyDenEvent::Connected));

        {
            let messages = sent.lock().unwrap();
            assert!(messages.len() >= 2);
            let first: ClientMessage = serde_json::from_str(&messages[0]).unwrap();
            let second: ClientMessage = serde_json::from_str(&messages[1]).unwrap();
            assert!(matches!(
                first,
                ClientMessage::Register { role: Role::Host, .. }
            ));
            assert!(matches!(second, ClientMessage::RequestParticipants { .. }));
        }

        client.shutdown().await;
    }

    #[tokio::test]
    async fn state_update_advances_phase_and_publishes_snapshot() {
        let (connector, _sent, _closed) = ScriptedConnector::single(vec![text(&state_update(
            Phase::SettingTopic,
            Some(StateData {
                topic: Some("Movies".into()),
                ..StateData::default()
            }),
        ))]);
        let (mut client, mut events) =
            DecoyDenClient::start(connector, memory_store(), host_config());

        let _ = events.recv().await; // Connected
        let event = events.recv().await.unwrap();
        assert!(matches!(
            event,
            DecoyDenEvent::PhaseChanged {
                phase: Phase::SettingTopic
            }
        ));

        let session = client.session();
        assert_eq!(session.phase, Phase::SettingTopic);
        assert_eq!(session.topic.as_deref(), Some("Movies"));

        client.shutdown().await;
    }

    #[tokio::test]
    async fn out_of_order_phase_emits_nothing() {
        let (connector, _sent, _closed) = ScriptedConnector::single(vec![
            text(&state_update(Phase::Discussing, None)), // skips SettingTopic
            text(&ServerEvent::TimerTick {
                time: TimerValue::Seconds(5),
            }),
        ]);
        let (mut client, mut events) =
            DecoyDenClient::start(connector, memory_store(), host_config());

        let _ = events.recv().await; // Connected
        // The rejected transition produces no event; the next one through is
        // the timer tick.
        let event = events.recv().await.unwrap();
        assert!(matches!(event, DecoyDenEvent::TimerTick { .. }));
        assert_eq!(client.session().phase, Phase::Waiting);

        client.shutdown().await;
    }

    #[tokio::test]
    async fn binary_and_structured_frames_are_normalized() {
        let tick = ServerEvent::TimerTick {
            time: TimerValue::Display("02:39".into()),
        };
        let json = serde_json::to_string(&tick).unwrap();
        let (connector, _sent, _closed) = ScriptedConnector::single(vec![
            Some(Ok(TransportFrame::Binary(json.clone().into_bytes()))),
            Some(Ok(TransportFrame::Structured(
                serde_json::from_str(&json).unwrap(),
            ))),
        ]);
        let (mut client, mut events) =
            DecoyDenClient::start(connector, memory_store(), host_config());

        let _ = events.recv().await; // Connected
        for _ in 0..2 {
            let event = events.recv().await.unwrap();
            assert!(matches!(event, DecoyDenEvent::TimerTick { .. }));
        }

        client.shutdown().await;
    }

    #[tokio::test]
    async fn unknown_payload_is_surfaced_not_fatal() {
        let (connector, _sent, _closed) = ScriptedConnector::single(vec![
            Some(Ok(TransportFrame::Text("{\"type\":\"NEW_THING\"}".into()))),
            text(&ServerEvent::TimerTick {
                time: TimerValue::Seconds(1),
            }),
        ]);
        let (mut client, mut events) =
            DecoyDenClient::start(connector, memory_store(), host_config());

        let _ = events.recv().await; // Connected
        let event = events.recv().await.unwrap();
        assert!(matches!(event, DecoyDenEvent::UnknownMessage { .. }));
        // Dispatch survived; the next event still flows.
        let event = events.recv().await.unwrap();
        assert!(matches!(event, DecoyDenEvent::TimerTick { .. }));

        client.shutdown().await;
    }

    #[tokio::test]
    async fn heartbeat_pings_on_interval() {
        let (connector, sent, _closed) = ScriptedConnector::single(vec![]);
        let config = host_config().with_heartbeat_interval(Duration::from_millis(20));
        let (mut client, mut events) =
            DecoyDenClient::start(connector, memory_store(), config);

        let _ = events.recv().await; // Connected
        tokio::time::sleep(Duration::from_millis(90)).await;

        {
            let messages = sent.lock().unwrap();
            let pings = messages
                .iter()
                .filter(|m| {
                    matches!(
                        serde_json::from_str::<ClientMessage>(m),
                        Ok(ClientMessage::Ping)
                    )
                })
                .count();
            assert!(pings >= 2, "expected repeated pings, got {pings}");
        }

        client.shutdown().await;
    }

    #[tokio::test]
    async fn remote_normal_close_is_terminal_without_reconnect() {
        let (connector, _sent, _closed) = ScriptedConnector::single(vec![None]);
        let (mut client, mut events) =
            DecoyDenClient::start(connector, memory_store(), host_config());

        let _ = events.recv().await; // Connected
        let event = events.recv().await.unwrap();
        assert!(matches!(event, DecoyDenEvent::Disconnected { reason: None }));
        assert!(!client.is_connected());

        client.shutdown().await;
    }

    #[tokio::test]
    async fn abnormal_close_triggers_bounded_reconnect() {
        // One transport that dies abnormally, then a connector with nothing
        // left: every retry fails. Bound of 2 → two Reconnecting events,
        // then the terminal ReconnectFailed.
        let (connector, _sent, _closed) = ScriptedConnector::single(vec![Some(Err(
            DecoyDenError::ConnectionLost { code: 1006 },
        ))]);
        let config = host_config().with_max_reconnect_attempts(2);
        let (mut client, mut events) =
            DecoyDenClient::start(connector, memory_store(), config);

        let _ = events.recv().await; // Connected
        let event = events.recv().await.unwrap();
        assert_eq!(
            event,
            DecoyDenEvent::Reconnecting {
                attempt: 1,
                max_attempts: 2
            }
        );
        let event = events.recv().await.unwrap();
        assert_eq!(
            event,
            DecoyDenEvent::Reconnecting {
                attempt: 2,
                max_attempts: 2
            }
        );
        let event = events.recv().await.unwrap();
        assert_eq!(event, DecoyDenEvent::ReconnectFailed { attempts: 2 });

        // Terminal: the handle now refuses commands.
        let result = client.ping();
        assert!(matches!(result, Err(DecoyDenError::NotConnected)));

        client.shutdown().await;
    }

    #[tokio::test]
    async fn reset_clears_storage_and_session() {
        let store = Arc::new(MemoryStore::new());
        let (connector, _sent, closed) = ScriptedConnector::single(vec![text(&state_update(
            Phase::SettingTopic,
            Some(StateData {
                topic: Some("Movies".into()),
                ..StateData::default()
            }),
        ))]);
        let (mut client, mut events) = DecoyDenClient::start(
            connector,
            Arc::clone(&store) as Arc<dyn SnapshotStore>,
            host_config(),
        );

        let _ = events.recv().await; // Connected
        let _ = events.recv().await; // PhaseChanged

        client.reset().unwrap();
        let event = events.recv().await.unwrap();
        assert!(matches!(
            event,
            DecoyDenEvent::Disconnected { reason: Some(ref r) } if r == "session reset"
        ));

        assert_eq!(client.session(), Session::default());
        assert!(closed.load(Ordering::Relaxed), "transport must be closed");

        // All room-scoped keys are gone once the writer queue drains.
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(store
            .keys()
            .unwrap()
            .iter()
            .all(|k| !k.contains(&Uuid::from_u128(9).to_string())));

        client.shutdown().await;
    }

    #[tokio::test]
    async fn restore_on_start_precedes_protocol_events() {
        let store = Arc::new(MemoryStore::new());
        let config = host_config();

        // First life: reach SETTING_TOPIC with a topic, then vanish without
        // reset (page reload).
        {
            let (connector, _sent, _closed) = ScriptedConnector::single(vec![text(
                &state_update(
                    Phase::SettingTopic,
                    Some(StateData {
                        topic: Some("Movies".into()),
                        theme: Some("Entertainment".into()),
                        ..StateData::default()
                    }),
                ),
            )]);
            let (mut client, mut events) = DecoyDenClient::start(
                connector,
                Arc::clone(&store) as Arc<dyn SnapshotStore>,
                config.clone(),
            );
            let _ = events.recv().await; // Connected
            let _ = events.recv().await; // PhaseChanged
            // Let the debounced writer flush.
            tokio::time::sleep(Duration::from_millis(60)).await;
            client.shutdown().await;
        }

        // Second life: the session is restored before any event arrives.
        let (connector, _sent, _closed) = ScriptedConnector::single(vec![]);
        let (mut client, mut events) = DecoyDenClient::start(
            connector,
            Arc::clone(&store) as Arc<dyn SnapshotStore>,
            config,
        );
        let _ = events.recv().await; // Connected

        let session = client.session();
        assert_eq!(session.phase, Phase::SettingTopic);
        assert_eq!(session.topic.as_deref(), Some("Movies"));
        assert_eq!(session.theme.as_deref(), Some("Entertainment"));

        client.shutdown().await;
    }

    #[tokio::test]
    async fn start_game_enforces_policy_phase_and_player_count() {
        let (connector, _sent, _closed) = ScriptedConnector::single(vec![]);
        let (mut client, mut events) =
            DecoyDenClient::start(connector, memory_store(), host_config());
        let _ = events.recv().await; // Connected

        // Host in WAITING, but alone: below the 3-player minimum.
        let err = client.start_game().unwrap_err();
        assert!(matches!(err, DecoyDenError::Validation(_)));

        client.shutdown().await;
    }

    #[tokio::test]
    async fn submit_topic_requires_setting_topic_phase() {
        let (connector, _sent, _closed) = ScriptedConnector::single(vec![]);
        let (mut client, mut events) =
            DecoyDenClient::start(connector, memory_store(), host_config());
        let _ = events.recv().await; // Connected

        let emojis: Vec<String> = ["🎬", "🍿", "🎭"].iter().map(|s| s.to_string()).collect();
        let err = client.submit_topic("Movies", &emojis).unwrap_err();
        assert!(matches!(err, DecoyDenError::InvalidState(_)));

        client.shutdown().await;
    }

    #[tokio::test]
    async fn submit_topic_injects_and_transmits_the_decoy_tuple() {
        let (connector, sent, _closed) = ScriptedConnector::single(vec![text(&state_update(
            Phase::SettingTopic,
            None,
        ))]);
        let (mut client, mut events) =
            DecoyDenClient::start(connector, memory_store(), host_config());
        let _ = events.recv().await; // Connected
        let _ = events.recv().await; // PhaseChanged

        let emojis: Vec<String> = ["🎬", "🍿", "🎭"].iter().map(|s| s.to_string()).collect();
        let injection = client.submit_topic("Movies", &emojis).unwrap();
        assert_eq!(injection.original, emojis);
        assert_ne!(
            injection.displayed[injection.dummy_index],
            injection.original[injection.dummy_index]
        );

        tokio::time::sleep(Duration::from_millis(50)).await;
        {
            let messages = sent.lock().unwrap();
            let last: ClientMessage =
                serde_json::from_str(messages.last().unwrap()).unwrap();
            let ClientMessage::SubmitTopic {
                topic,
                original_emojis,
                displayed_emojis,
                dummy_index,
                dummy_emoji,
            } = last
            else {
                panic!("expected SubmitTopic");
            };
            assert_eq!(topic, "Movies");
            assert_eq!(original_emojis, injection.original);
            assert_eq!(displayed_emojis, injection.displayed);
            assert_eq!(dummy_index, injection.dummy_index);
            assert_eq!(dummy_emoji, injection.dummy_emoji);
        }

        client.shutdown().await;
    }

    #[tokio::test]
    async fn submit_answer_is_leader_only() {
        let (connector, _sent, _closed) = ScriptedConnector::single(vec![]);
        let (mut client, mut events) =
            DecoyDenClient::start(connector, memory_store(), host_config());
        let _ = events.recv().await; // Connected

        // The host is never the leader.
        let err = client.submit_answer("Totoro").unwrap_err();
        assert!(matches!(err, DecoyDenError::PermissionDenied { .. }));

        client.shutdown().await;
    }

    #[tokio::test]
    async fn connector_exhausted_at_start_reports_reconnect_failure() {
        let config = host_config().with_max_reconnect_attempts(1);
        let (mut client, mut events) =
            DecoyDenClient::start(ScriptedConnector::exhausted(), memory_store(), config);

        let event = events.recv().await.unwrap();
        assert_eq!(
            event,
            DecoyDenEvent::Reconnecting {
                attempt: 1,
                max_attempts: 1
            }
        );
        let event = events.recv().await.unwrap();
        assert_eq!(event, DecoyDenEvent::ReconnectFailed { attempts: 1 });

        client.shutdown().await;
    }

    #[tokio::test]
    async fn shutdown_emits_disconnected_and_closes_transport() {
        let (connector, _sent, closed) = ScriptedConnector::single(vec![]);
        let (mut client, mut events) =
            DecoyDenClient::start(connector, memory_store(), host_config());

        let _ = events.recv().await; // Connected
        client.shutdown().await;

        let event = events.recv().await.unwrap();
        assert!(matches!(
            event,
            DecoyDenEvent::Disconnected { reason: Some(ref r) } if r == "client shut down"
        ));
        assert!(closed.load(Ordering::Relaxed));
        assert!(!client.is_connected());
    }

    #[tokio::test]
    async fn double_shutdown_does_not_panic() {
        let (connector, _sent, _closed) = ScriptedConnector::single(vec![]);
        let (mut client, mut events) =
            DecoyDenClient::start(connector, memory_store(), host_config());

        let _ = events.recv().await; // Connected
        client.shutdown().await;
        client.shutdown().await; // should not panic
    }

    #[tokio::test]
    async fn drop_without_explicit_shutdown() {
        let (connector, _sent, _closed) = ScriptedConnector::single(vec![]);
        let (client, mut events) =
            DecoyDenClient::start(connector, memory_store(), host_config());

        let _ = events.recv().await; // Connected
        drop(client);

        // The supervisor is aborted; the event channel closes. We just
        // verify we don't hang or panic.
        while let Some(_event) = events.recv().await {}
    }

    #[tokio::test]
    async fn config_defaults() {
        let config = host_config();
        assert_eq!(config.event_channel_capacity, 256);
        assert_eq!(config.shutdown_timeout, Duration::from_secs(1));
        assert_eq!(config.heartbeat_interval, Duration::from_secs(30));
        assert_eq!(config.max_reconnect_attempts, 5);
        assert!(config.seed_theme.is_none());
    }

    #[tokio::test]
    async fn event_channel_capacity_is_clamped_to_one() {
        let config = host_config().with_event_channel_capacity(0);
        assert_eq!(config.event_channel_capacity, 1);
    }

    #[tokio::test]
    async fn for_host_seeds_theme_and_hint() {
        let response = CreateRoomResponse {
            room_id: Uuid::from_u128(9),
            user_id: Uuid::from_u128(1),
            room_code: "AAAAAA".into(),
            theme: "人物".into(),
            hint: "出身地、性別、やったこと".into(),
        };
        let config = DecoyDenConfig::for_host(&response, "Hana");

        let (connector, _sent, _closed) = ScriptedConnector::single(vec![]);
        let (mut client, mut events) =
            DecoyDenClient::start(connector, memory_store(), config);
        let _ = events.recv().await; // Connected

        let session = client.session();
        assert_eq!(session.theme.as_deref(), Some("人物"));
        assert_eq!(session.hint.as_deref(), Some("出身地、性別、やったこと"));
        assert!(session.is_host());

        client.shutdown().await;
    }
}
