//! Consumer-facing events emitted by the client.
//!
//! Events are delivered on a bounded channel returned from
//! [`DecoyDenClient::start`](crate::client::DecoyDenClient::start). When the
//! consumer cannot keep up, intermediate events are dropped (with a warning
//! logged) rather than blocking dispatch; `Disconnected` and
//! `ReconnectFailed` are always delivered.

use crate::error_codes::ErrorCode;
use crate::protocol::{Phase, TimerValue};
use crate::roster::Participant;

/// Events emitted by [`DecoyDenClient`](crate::client::DecoyDenClient).
///
/// The full session state is always available through
/// [`DecoyDenClient::session`](crate::client::DecoyDenClient::session);
/// events signal *what changed* so UIs can react without diffing snapshots.
#[derive(Debug, Clone, PartialEq)]
pub enum DecoyDenEvent {
    /// The transport connected (or reconnected) and the registration
    /// handshake was sent.
    Connected,

    /// The connection dropped abnormally; a reconnection attempt is
    /// scheduled. Purely informational — shown as a transient
    /// "reconnecting" indicator.
    Reconnecting {
        /// 1-based attempt number.
        attempt: u32,
        max_attempts: u32,
    },

    /// The reconnection bound was exhausted. Terminal and user-visible;
    /// recovery requires explicit action (retry/navigation).
    ReconnectFailed { attempts: u32 },

    /// The connection ended and no reconnection is pending (normal close,
    /// shutdown, or reset).
    Disconnected { reason: Option<String> },

    /// The room advanced to a new phase.
    PhaseChanged { phase: Phase },

    /// The roster changed (joins, leaves, leadership moves).
    RosterChanged { participants: Vec<Participant> },

    /// The local participant received a discussion emoji.
    EmojiAssigned { emoji: String },

    /// Server-owned countdown tick.
    TimerTick { time: TimerValue },

    /// Recoverable server error, also recorded as
    /// [`Session::last_error`](crate::session::Session).
    ServerError {
        code: Option<ErrorCode>,
        message: String,
    },

    /// An inbound payload the client could not recognize (logged and
    /// surfaced, never fatal).
    UnknownMessage { raw: String },
}
