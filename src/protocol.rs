//! Wire-compatible protocol types for the Decoy Den room protocol.
//!
//! Every type in this module produces JSON matching the game server's
//! envelope format: `{ "type": "...", "payload": { ... } }` with
//! `SCREAMING_SNAKE_CASE` message tags. Historical server builds emitted a
//! few camelCase payload keys (`nextState`, `originalEmojis`,
//! `selected_emojis`, `is_Leader`) — those are accepted via `#[serde(alias)]`
//! so the client stays compatible with every deployed revision.

use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;
use uuid::Uuid;

use crate::error_codes::ErrorCode;

// ── Type aliases ────────────────────────────────────────────────────

/// Unique identifier for participants.
pub type UserId = Uuid;

/// Unique identifier for rooms.
pub type RoomId = Uuid;

// ── Enums ───────────────────────────────────────────────────────────

/// The room's current stage in the round lifecycle.
///
/// Phases advance strictly forward:
/// `Waiting → SettingTopic → Discussing → Answering → Checking → Finished`.
/// The `SettingTopic → Discussing` and `Discussing → Answering` edges may be
/// taken early via a privileged skip, but they are still single forward
/// steps.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    /// Players are gathering in the lobby.
    #[default]
    Waiting,
    /// The leader is composing the round's topic and emoji set.
    SettingTopic,
    /// Players discuss the emoji set (one of which is the decoy).
    Discussing,
    /// The leader is composing a final guess.
    Answering,
    /// The host is grading the leader's guess.
    Checking,
    /// The round is over.
    Finished,
}

impl Phase {
    /// Position of this phase in the forward ordering.
    fn step(self) -> u8 {
        match self {
            Self::Waiting => 0,
            Self::SettingTopic => 1,
            Self::Discussing => 2,
            Self::Answering => 3,
            Self::Checking => 4,
            Self::Finished => 5,
        }
    }

    /// Whether a transition from `self` to `next` is allowed.
    ///
    /// Re-announcing the current phase is allowed (servers re-broadcast state
    /// on reconnect); otherwise only the immediate forward successor is
    /// valid. Backward or skipping transitions are rejected.
    pub fn allows(self, next: Phase) -> bool {
        next == self || next.step() == self.step() + 1
    }

    /// Whether the room has reached its terminal phase.
    pub fn is_terminal(self) -> bool {
        self == Self::Finished
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Waiting => "waiting",
            Self::SettingTopic => "setting_topic",
            Self::Discussing => "discussing",
            Self::Answering => "answering",
            Self::Checking => "checking",
            Self::Finished => "finished",
        };
        write!(f, "{name}")
    }
}

/// A participant's role within the room.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// The room creator; grades the final guess and never guesses.
    Host,
    /// A regular guesser (one of whom is the round's leader).
    #[default]
    Player,
}

// ── Payload structs ─────────────────────────────────────────────────

/// One roster entry as pushed by the server.
///
/// `role` and `is_leader` may be omitted on delta updates; the roster
/// reconciler back-fills them from the previous roster.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ParticipantEntry {
    pub user_id: UserId,
    pub user_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<Role>,
    /// Older server builds sent `is_Leader`, sometimes as the string
    /// `"true"`; both shapes are accepted.
    #[serde(
        default,
        alias = "is_Leader",
        deserialize_with = "flexible_bool::deserialize_opt",
        skip_serializing_if = "Option::is_none"
    )]
    pub is_leader: Option<bool>,
}

/// Per-participant emoji assignment broadcast when discussion begins.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Assignment {
    pub user_id: UserId,
    pub emoji: String,
}

/// Remaining discussion time, as replicated from the server-owned timer.
///
/// The server sends either a raw seconds count or a preformatted `"MM:SS"`
/// clock string; both deserialize transparently.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(untagged)]
pub enum TimerValue {
    /// Remaining whole seconds.
    Seconds(u64),
    /// Preformatted clock string (e.g. `"02:39"`).
    Display(String),
}

impl fmt::Display for TimerValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Seconds(s) => write!(f, "{:02}:{:02}", s / 60, s % 60),
            Self::Display(s) => write!(f, "{s}"),
        }
    }
}

/// Optional round-content payload carried by a `STATE_UPDATE`.
///
/// Absent fields mean "no change"; the session merge keeps previous values.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct StateData {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub topic: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub theme: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hint: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub answer: Option<String>,
    /// The leader's untouched emoji selection (host view / grading).
    #[serde(
        default,
        alias = "originalEmojis",
        skip_serializing_if = "Option::is_none"
    )]
    pub original_emojis: Option<Vec<String>>,
    /// The decoy-injected array shown to guessers. Historical servers sent
    /// this under `selected_emojis`.
    #[serde(
        default,
        alias = "displayedEmojis",
        alias = "selected_emojis",
        skip_serializing_if = "Option::is_none"
    )]
    pub displayed_emojis: Option<Vec<String>>,
    #[serde(default, alias = "dummyIndex", skip_serializing_if = "Option::is_none")]
    pub dummy_index: Option<usize>,
    #[serde(default, alias = "dummyEmoji", skip_serializing_if = "Option::is_none")]
    pub dummy_emoji: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub assignments: Option<Vec<Assignment>>,
}

// ── Server → client events ──────────────────────────────────────────

/// Message types pushed by the server over the realtime channel.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", content = "payload")]
pub enum ServerEvent {
    /// Drive the phase state machine, optionally carrying round content.
    #[serde(rename = "STATE_UPDATE")]
    StateUpdate {
        #[serde(alias = "nextState", alias = "nextPhase")]
        next_phase: Phase,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        data: Option<StateData>,
    },
    /// Roster snapshot (possibly partial or empty).
    #[serde(rename = "PARTICIPANT_UPDATE", alias = "PARTICIPANTS_UPDATE")]
    ParticipantUpdate {
        #[serde(default)]
        participants: Vec<ParticipantEntry>,
    },
    /// Periodic replication of the server-owned countdown.
    #[serde(rename = "TIMER_TICK")]
    TimerTick { time: TimerValue },
    /// Recoverable error surfaced to the UI as `last_error`.
    #[serde(rename = "ERROR")]
    Error {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        code: Option<ErrorCode>,
        message: String,
    },
    /// Any inbound payload the client could not recognize. Never produced by
    /// deserialization directly — see [`ServerEvent::parse`].
    #[serde(skip)]
    Unknown {
        /// The raw payload, preserved for logging.
        raw: String,
    },
}

impl ServerEvent {
    /// Parse a JSON text payload, falling back to [`ServerEvent::Unknown`]
    /// for anything unrecognized. Never fails: malformed input must be
    /// logged and dropped by the dispatcher, not crash it.
    pub fn parse(text: &str) -> Self {
        match serde_json::from_str(text) {
            Ok(event) => event,
            Err(e) => {
                tracing::warn!("unrecognized server payload ({e}): {text}");
                Self::Unknown {
                    raw: text.to_owned(),
                }
            }
        }
    }

    /// Parse a binary payload (UTF-8 JSON bytes, as delivered by transports
    /// that frame messages as blobs).
    pub fn parse_bytes(bytes: &[u8]) -> Self {
        match std::str::from_utf8(bytes) {
            Ok(text) => Self::parse(text),
            Err(_) => {
                tracing::warn!(len = bytes.len(), "non-UTF-8 binary server payload");
                Self::Unknown {
                    raw: format!("<{} bytes of non-UTF-8 data>", bytes.len()),
                }
            }
        }
    }

    /// Convert an already-structured JSON value (transports that hand over
    /// parsed objects) into an event.
    pub fn parse_value(value: serde_json::Value) -> Self {
        match serde_json::from_value(value.clone()) {
            Ok(event) => event,
            Err(e) => {
                tracing::warn!("unrecognized structured server payload ({e})");
                Self::Unknown {
                    raw: value.to_string(),
                }
            }
        }
    }
}

// ── Client → server messages ────────────────────────────────────────

/// Control messages sent from client to server over the realtime channel.
///
/// The round-submission messages mirror the Action Gateway's REST calls —
/// a deliberate dual path the server accepts on both routes.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", content = "payload")]
pub enum ClientMessage {
    /// Registration handshake announcing local identity (MUST be the first
    /// message after the connection opens).
    #[serde(rename = "CLIENT_CONNECTED")]
    Register {
        user_id: UserId,
        user_name: String,
        role: Role,
        is_leader: bool,
    },
    /// Ask the server to re-broadcast the room roster.
    #[serde(rename = "REQUEST_PARTICIPANTS")]
    RequestParticipants { room_id: RoomId },
    /// Heartbeat to maintain the connection.
    #[serde(rename = "PING")]
    Ping,
    /// Leader/host sets round content, including the full decoy tuple so the
    /// server can serve `original` to the creator and `displayed` to
    /// everyone else.
    #[serde(rename = "SUBMIT_TOPIC")]
    SubmitTopic {
        topic: String,
        original_emojis: Vec<String>,
        displayed_emojis: Vec<String>,
        dummy_index: usize,
        dummy_emoji: String,
    },
    /// Leader submits the final guess.
    #[serde(rename = "SUBMIT_ANSWER")]
    SubmitAnswer { user_id: UserId, answer: String },
    /// Host advances `WAITING → SETTING_TOPIC`.
    #[serde(rename = "START_GAME")]
    StartGame,
    /// Leader/host forces `DISCUSSING → ANSWERING` early.
    #[serde(rename = "SKIP_DISCUSSION")]
    SkipDiscussion,
}

// ── Serde helpers ───────────────────────────────────────────────────

/// Tolerant boolean deserialization: historical servers sent leadership
/// flags as JSON booleans *or* the strings `"true"`/`"false"`.
mod flexible_bool {
    use super::*;

    #[derive(Deserialize)]
    #[serde(untagged)]
    enum BoolOrString {
        Bool(bool),
        Text(String),
    }

    pub(super) fn deserialize_opt<'de, D>(deserializer: D) -> Result<Option<bool>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let value = Option::<BoolOrString>::deserialize(deserializer)?;
        Ok(value.map(|v| match v {
            BoolOrString::Bool(b) => b,
            BoolOrString::Text(s) => s.eq_ignore_ascii_case("true"),
        }))
    }
}

#[cfg(test)]
#[allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic,
    clippy::indexing_slicing
)]
mod tests {
    use super::*;

    #[test]
    fn phase_ordering_is_forward_only() {
        assert!(Phase::Waiting.allows(Phase::SettingTopic));
        assert!(Phase::SettingTopic.allows(Phase::Discussing));
        assert!(Phase::Discussing.allows(Phase::Answering));
        assert!(Phase::Answering.allows(Phase::Checking));
        assert!(Phase::Checking.allows(Phase::Finished));

        // Re-broadcast of the current phase is tolerated.
        assert!(Phase::Discussing.allows(Phase::Discussing));

        // Backward and skipping edges are not.
        assert!(!Phase::Discussing.allows(Phase::Waiting));
        assert!(!Phase::Waiting.allows(Phase::Discussing));
        assert!(!Phase::Finished.allows(Phase::Waiting));
    }

    #[test]
    fn phase_wire_names_are_snake_case() {
        assert_eq!(
            serde_json::to_string(&Phase::SettingTopic).unwrap(),
            "\"setting_topic\""
        );
        let p: Phase = serde_json::from_str("\"discussing\"").unwrap();
        assert_eq!(p, Phase::Discussing);
    }

    #[test]
    fn timer_value_accepts_both_shapes() {
        let t: TimerValue = serde_json::from_str("159").unwrap();
        assert_eq!(t, TimerValue::Seconds(159));
        assert_eq!(t.to_string(), "02:39");

        let t: TimerValue = serde_json::from_str("\"02:39\"").unwrap();
        assert_eq!(t, TimerValue::Display("02:39".into()));
        assert_eq!(t.to_string(), "02:39");
    }

    #[test]
    fn participant_entry_accepts_legacy_leader_key() {
        let json = r#"{"user_id":"2bc78967-4244-dcf6-4929-bc5ed70e4d09","user_name":"あああ","role":"player","is_Leader":"true"}"#;
        let entry: ParticipantEntry = serde_json::from_str(json).unwrap();
        assert_eq!(entry.is_leader, Some(true));
        assert_eq!(entry.role, Some(Role::Player));
    }

    #[test]
    fn state_data_accepts_camel_case_aliases() {
        let json = r#"{
            "topic": "Movies",
            "originalEmojis": ["🎬","🍿","🎭"],
            "selected_emojis": ["🎬","🔧","🎭"],
            "dummyIndex": 1,
            "dummyEmoji": "🔧"
        }"#;
        let data: StateData = serde_json::from_str(json).unwrap();
        assert_eq!(data.original_emojis.unwrap().len(), 3);
        assert_eq!(data.displayed_emojis.unwrap()[1], "🔧");
        assert_eq!(data.dummy_index, Some(1));
        assert_eq!(data.dummy_emoji.as_deref(), Some("🔧"));
    }

    #[test]
    fn server_event_parse_falls_back_to_unknown() {
        let event = ServerEvent::parse("{\"type\":\"SOMETHING_NEW\",\"payload\":{}}");
        assert!(matches!(event, ServerEvent::Unknown { .. }));

        let event = ServerEvent::parse("not json at all");
        assert!(matches!(event, ServerEvent::Unknown { .. }));
    }

    #[test]
    fn server_event_parse_bytes_handles_non_utf8() {
        let event = ServerEvent::parse_bytes(&[0xFF, 0xFE, 0x00]);
        assert!(matches!(event, ServerEvent::Unknown { .. }));

        let json = serde_json::to_string(&ServerEvent::TimerTick {
            time: TimerValue::Seconds(30),
        })
        .unwrap();
        let event = ServerEvent::parse_bytes(json.as_bytes());
        assert!(matches!(event, ServerEvent::TimerTick { .. }));
    }

    #[test]
    fn legacy_participants_update_tag_is_accepted() {
        let json = r#"{"type":"PARTICIPANTS_UPDATE","payload":{"participants":[]}}"#;
        let event = ServerEvent::parse(json);
        assert!(matches!(
            event,
            ServerEvent::ParticipantUpdate { participants } if participants.is_empty()
        ));
    }

    #[test]
    fn client_message_envelope_shape() {
        let json = serde_json::to_string(&ClientMessage::Ping).unwrap();
        assert_eq!(json, "{\"type\":\"PING\"}");

        let msg = ClientMessage::Register {
            user_id: Uuid::nil(),
            user_name: "Alice".into(),
            role: Role::Host,
            is_leader: false,
        };
        let value: serde_json::Value =
            serde_json::from_str(&serde_json::to_string(&msg).unwrap()).unwrap();
        assert_eq!(value["type"], "CLIENT_CONNECTED");
        assert_eq!(value["payload"]["role"], "host");
    }
}
