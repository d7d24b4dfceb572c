//! Action Gateway interface.
//!
//! Room-mutating actions travel over a request/response channel owned by an
//! external collaborator (an HTTP client in the shipped game). This module
//! specifies only the contract: the trait, the response shapes, and how the
//! responses seed a [`LocalIdentity`]. The round-submission actions are
//! deliberately mirrored by realtime [`ClientMessage`]s — the server accepts
//! both routes.
//!
//! [`ClientMessage`]: crate::protocol::ClientMessage

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::protocol::{RoomId, UserId};
use crate::session::LocalIdentity;

/// Response to a successful room creation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CreateRoomResponse {
    pub room_id: RoomId,
    /// Identity allocated for the creator.
    pub user_id: UserId,
    /// Human-shareable join token.
    pub room_code: String,
    /// Server-chosen round theme (protect-once on the client).
    pub theme: String,
    /// Server-chosen topic hint (protect-once on the client).
    pub hint: String,
}

impl CreateRoomResponse {
    /// The creator's local identity (host, never leader).
    pub fn identity(&self, user_name: impl Into<String>) -> LocalIdentity {
        LocalIdentity::host(self.room_id, self.room_code.clone(), self.user_id, user_name)
    }
}

/// Response to a successful room join.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct JoinRoomResponse {
    pub room_id: RoomId,
    /// Identity allocated for the joiner.
    pub user_id: UserId,
    /// Whether the server made this joiner the round leader (the most
    /// recent joiner is).
    pub is_leader: bool,
}

impl JoinRoomResponse {
    /// The joiner's local identity. `room_code` is the code the player
    /// typed; the join response does not echo it.
    pub fn identity(
        &self,
        room_code: impl Into<String>,
        user_name: impl Into<String>,
    ) -> LocalIdentity {
        LocalIdentity::player(
            self.room_id,
            room_code,
            self.user_id,
            user_name,
            self.is_leader,
        )
    }
}

/// The round-content payload submitted by the leader, carrying the full
/// decoy tuple so the server can serve `original` to the creator and
/// `displayed` to everyone else.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TopicSubmission {
    pub topic: String,
    pub original_emojis: Vec<String>,
    pub displayed_emojis: Vec<String>,
    pub dummy_index: usize,
    pub dummy_emoji: String,
}

/// Request/response actions that mutate server-side room state.
///
/// Implementations are external to this crate. Failures must be returned as
/// classified [`DecoyDenError`](crate::error::DecoyDenError)s so callers can
/// consult [`is_retryable`](crate::error::DecoyDenError::is_retryable):
/// network/timeout/server-unavailable failures may be retried,
/// validation/permission/not-found failures must not be.
#[async_trait]
pub trait ActionGateway: Send + Sync {
    /// Allocate a room and return the creator's identity and round framing.
    async fn create_room(&self) -> Result<CreateRoomResponse>;

    /// Admit a participant to the room identified by `room_code`.
    async fn join_room(&self, room_code: &str, user_name: &str) -> Result<JoinRoomResponse>;

    /// Leader/host sets the round content.
    async fn submit_topic(&self, room_id: RoomId, submission: &TopicSubmission) -> Result<()>;

    /// Leader submits the final guess.
    async fn submit_answer(&self, room_id: RoomId, user_id: UserId, answer: &str) -> Result<()>;

    /// Host advances `WAITING → SETTING_TOPIC`.
    async fn start_game(&self, room_id: RoomId) -> Result<()>;

    /// Host ends the room.
    async fn finish_room(&self, room_id: RoomId) -> Result<()>;

    /// Leader/host forces `DISCUSSING → ANSWERING`.
    async fn skip_discussion(&self, room_id: RoomId) -> Result<()>;
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
mod tests {
    use super::*;
    use crate::protocol::Role;
    use uuid::Uuid;

    #[test]
    fn create_response_seeds_host_identity() {
        let response = CreateRoomResponse {
            room_id: Uuid::from_u128(1),
            user_id: Uuid::from_u128(2),
            room_code: "AAAAAA".into(),
            theme: "人物".into(),
            hint: "出身地、性別、やったこと".into(),
        };
        let identity = response.identity("Hana");
        assert_eq!(identity.role, Role::Host);
        assert!(!identity.is_leader);
        assert_eq!(identity.room_code.as_deref(), Some("AAAAAA"));
    }

    #[test]
    fn join_response_seeds_player_identity() {
        let response = JoinRoomResponse {
            room_id: Uuid::from_u128(1),
            user_id: Uuid::from_u128(3),
            is_leader: true,
        };
        let identity = response.identity("AAAAAA", "Alice");
        assert_eq!(identity.role, Role::Player);
        assert!(identity.is_leader);
    }

    #[test]
    fn create_response_parses_server_shape() {
        let json = r#"{
            "room_id": "3f316353-f3ab-9bc1-9f68-3bc999ef7486",
            "user_id": "ff6a4c2c-b396-a84f-9c3c-6513baf12611",
            "room_code": "AAAAAA",
            "theme": "人物",
            "hint": "出身地、性別、やったこと"
        }"#;
        let response: CreateRoomResponse = serde_json::from_str(json).unwrap();
        assert_eq!(response.room_code, "AAAAAA");
    }
}
