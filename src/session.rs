//! The room session store.
//!
//! [`Session`] is the single authoritative in-memory record of a room as
//! seen by the local participant. It is mutated only through the `apply_*`
//! reducer methods, which the client's dispatch loop calls exactly once per
//! inbound protocol event; everything else observes immutable snapshots.
//!
//! All merges are non-destructive: a state update with no payload, a blank
//! `theme`/`hint`, or an empty emoji array never erases previously known
//! round content, because servers stop re-sending round data in later
//! phases and re-broadcast transitions after reconnects.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error_codes::ErrorCode;
use crate::protocol::{ParticipantEntry, Phase, Role, RoomId, StateData, TimerValue, UserId};
use crate::roster::{self, Participant, RosterOutcome};

/// Local participant identity, established once by create/join and never
/// mutated afterward except by explicit reset.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocalIdentity {
    pub room_id: RoomId,
    /// Human-shareable join token; the creator receives it, joiners typed it.
    pub room_code: Option<String>,
    pub user_id: UserId,
    pub user_name: String,
    pub role: Role,
    pub is_leader: bool,
}

impl LocalIdentity {
    /// Identity of a room creator.
    pub fn host(
        room_id: RoomId,
        room_code: impl Into<String>,
        user_id: UserId,
        user_name: impl Into<String>,
    ) -> Self {
        Self {
            room_id,
            room_code: Some(room_code.into()),
            user_id,
            user_name: user_name.into(),
            role: Role::Host,
            is_leader: false,
        }
    }

    /// Identity of a joining player.
    pub fn player(
        room_id: RoomId,
        room_code: impl Into<String>,
        user_id: UserId,
        user_name: impl Into<String>,
        is_leader: bool,
    ) -> Self {
        Self {
            room_id,
            room_code: Some(room_code.into()),
            user_id,
            user_name: user_name.into(),
            role: Role::Player,
            is_leader,
        }
    }
}

/// The most recent recoverable error surfaced to the UI.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SessionError {
    pub code: Option<ErrorCode>,
    pub message: String,
}

/// Outcome of applying a `STATE_UPDATE` to the session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StateOutcome {
    /// The named phase was out of order or otherwise invalid; the event was
    /// logged and ignored wholesale.
    Rejected,
    /// The event was applied.
    Applied {
        /// The phase actually moved forward (false for an idempotent
        /// re-broadcast of the current phase).
        phase_changed: bool,
        /// The local participant's assigned emoji changed.
        assignment_changed: bool,
    },
}

/// The authoritative in-memory session record, one per room per local
/// participant.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct Session {
    pub room_id: Option<RoomId>,
    pub room_code: Option<String>,
    pub local_user_id: Option<UserId>,
    pub local_user_name: Option<String>,
    pub phase: Phase,
    pub roster: Vec<Participant>,
    pub topic: Option<String>,
    pub theme: Option<String>,
    pub hint: Option<String>,
    pub original_emojis: Vec<String>,
    pub displayed_emojis: Vec<String>,
    pub dummy_index: Option<usize>,
    pub dummy_emoji: Option<String>,
    /// The emoji assigned to the local participant during discussion.
    pub assigned_emoji: Option<String>,
    /// All discussion assignments, keyed by participant.
    pub assignments: BTreeMap<UserId, String>,
    /// The leader's final guess.
    pub answer: Option<String>,
    /// Server-replicated countdown; the client never runs its own.
    pub timer: Option<TimerValue>,
    pub last_error: Option<SessionError>,
}

impl Session {
    /// Build a session seeded with the local identity.
    ///
    /// The local participant is inserted into the roster immediately, so
    /// `is_host`/`is_leader` derive correctly *before* the first server
    /// roster broadcast — the reconciler's empty-snapshot guard keeps the
    /// seed alive through reconnect races.
    pub fn seeded(identity: &LocalIdentity) -> Self {
        Self {
            room_id: Some(identity.room_id),
            room_code: identity.room_code.clone(),
            local_user_id: Some(identity.user_id),
            local_user_name: Some(identity.user_name.clone()),
            roster: vec![Participant {
                user_id: identity.user_id,
                user_name: identity.user_name.clone(),
                role: identity.role,
                is_leader: identity.is_leader,
            }],
            ..Self::default()
        }
    }

    // ── Derived roles ───────────────────────────────────────────────

    /// Whether the local participant created the room.
    ///
    /// Derived from the roster on every call; never stored.
    pub fn is_host(&self) -> bool {
        self.local_user_id
            .is_some_and(|id| roster::is_host(&self.roster, id))
    }

    /// Whether the local participant is the current round's leader.
    pub fn is_leader(&self) -> bool {
        self.local_user_id
            .is_some_and(|id| roster::is_leader(&self.roster, id))
    }

    /// The emoji sequence this participant should see: the creator grades
    /// against the untouched original, everyone else sees the decoy-injected
    /// array.
    pub fn visible_emojis(&self) -> &[String] {
        if self.is_host() && !self.original_emojis.is_empty() {
            &self.original_emojis
        } else {
            &self.displayed_emojis
        }
    }

    // ── Reducers ────────────────────────────────────────────────────

    /// Apply a `STATE_UPDATE` event.
    ///
    /// Out-of-order or backward phases reject the whole event (fail-soft).
    /// Payload fields merge with "present and non-blank overwrites, else
    /// keep previous" semantics. When an assignment table is present, the
    /// local participant's `assigned_emoji` is recomputed from it; an absent
    /// table retains the previous value, since duplicate and late broadcasts
    /// are expected.
    pub fn apply_state_update(&mut self, next_phase: Phase, data: Option<&StateData>) -> StateOutcome {
        if !self.phase.allows(next_phase) {
            tracing::warn!(
                current = %self.phase,
                requested = %next_phase,
                "ignoring out-of-order phase transition"
            );
            return StateOutcome::Rejected;
        }

        let phase_changed = next_phase != self.phase;
        self.phase = next_phase;

        let mut assignment_changed = false;
        if let Some(data) = data {
            merge_text(&mut self.topic, data.topic.as_ref());
            merge_text(&mut self.theme, data.theme.as_ref());
            merge_text(&mut self.hint, data.hint.as_ref());
            merge_text(&mut self.answer, data.answer.as_ref());
            merge_list(&mut self.original_emojis, data.original_emojis.as_ref());
            merge_list(&mut self.displayed_emojis, data.displayed_emojis.as_ref());
            if data.dummy_index.is_some() {
                self.dummy_index = data.dummy_index;
            }
            if let Some(decoy) = data.dummy_emoji.as_ref().filter(|d| !d.is_empty()) {
                self.dummy_emoji = Some(decoy.clone());
            }

            if let Some(assignments) = data.assignments.as_ref() {
                self.assignments = assignments
                    .iter()
                    .map(|a| (a.user_id, a.emoji.clone()))
                    .collect();
                let mine = self
                    .local_user_id
                    .and_then(|id| self.assignments.get(&id).cloned());
                if mine.is_some() && mine != self.assigned_emoji {
                    self.assigned_emoji = mine;
                    assignment_changed = true;
                }
            }
        }

        self.last_error = None;
        StateOutcome::Applied {
            phase_changed,
            assignment_changed,
        }
    }

    /// Apply a `PARTICIPANT_UPDATE` roster snapshot. Returns `true` when the
    /// roster actually changed (empty and equal snapshots short-circuit).
    pub fn apply_roster(&mut self, incoming: &[ParticipantEntry]) -> bool {
        match roster::reconcile(&self.roster, incoming) {
            RosterOutcome::Replaced(merged) => {
                self.roster = merged;
                self.last_error = None;
                true
            }
            RosterOutcome::KeptPrevious | RosterOutcome::Unchanged => false,
        }
    }

    /// Apply a `TIMER_TICK`.
    pub fn apply_timer(&mut self, time: TimerValue) {
        self.timer = Some(time);
        self.last_error = None;
    }

    /// Record a protocol-level `ERROR` event. Phase and roster are left
    /// untouched.
    pub fn apply_server_error(&mut self, code: Option<ErrorCode>, message: String) {
        tracing::error!(?code, %message, "server error event");
        self.last_error = Some(SessionError { code, message });
    }
}

/// Overwrite `slot` only when the incoming value is present and non-blank.
fn merge_text(slot: &mut Option<String>, incoming: Option<&String>) {
    if let Some(value) = incoming {
        if !value.trim().is_empty() {
            *slot = Some(value.clone());
        }
    }
}

/// Overwrite `slot` only when the incoming list is present and non-empty.
fn merge_list(slot: &mut Vec<String>, incoming: Option<&Vec<String>>) {
    if let Some(value) = incoming {
        if !value.is_empty() {
            slot.clone_from(value);
        }
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
    use crate::protocol::{Assignment, ParticipantEntry};
    use uuid::Uuid;

    fn uid(n: u128) -> UserId {
        Uuid::from_u128(n)
    }

    fn host_identity() -> LocalIdentity {
        LocalIdentity::host(Uuid::from_u128(9), "AAAAAA", uid(1), "Hana")
    }

    fn entry(n: u128, name: &str, role: Role, is_leader: bool) -> ParticipantEntry {
        ParticipantEntry {
            user_id: uid(n),
            user_name: name.into(),
            role: Some(role),
            is_leader: Some(is_leader),
        }
    }

    fn strings(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| (*s).to_owned()).collect()
    }

    #[test]
    fn seeded_session_derives_host_before_first_broadcast() {
        let session = Session::seeded(&host_identity());
        assert!(session.is_host());
        assert!(!session.is_leader());
        assert_eq!(session.phase, Phase::Waiting);
    }

    #[test]
    fn roles_follow_the_roster() {
        let mut session = Session::seeded(&host_identity());
        session.apply_roster(&[
            entry(1, "Hana", Role::Host, false),
            entry(2, "Alice", Role::Player, true),
        ]);
        assert!(session.is_host());
        assert!(!session.is_leader());

        // Leadership reassigned to the local participant.
        let mut session2 = session.clone();
        session2.local_user_id = Some(uid(2));
        assert!(session2.is_leader());
        assert!(!session2.is_host());
    }

    #[test]
    fn out_of_order_phase_is_rejected_wholesale() {
        let mut session = Session::seeded(&host_identity());
        let data = StateData {
            topic: Some("Movies".into()),
            ..StateData::default()
        };
        // Waiting → Discussing skips SettingTopic.
        let outcome = session.apply_state_update(Phase::Discussing, Some(&data));
        assert_eq!(outcome, StateOutcome::Rejected);
        assert_eq!(session.phase, Phase::Waiting);
        assert_eq!(session.topic, None, "rejected events must not merge data");
    }

    #[test]
    fn backward_phase_is_rejected() {
        let mut session = Session::seeded(&host_identity());
        session.apply_state_update(Phase::SettingTopic, None);
        let outcome = session.apply_state_update(Phase::Waiting, None);
        assert_eq!(outcome, StateOutcome::Rejected);
        assert_eq!(session.phase, Phase::SettingTopic);
    }

    #[test]
    fn rebroadcast_of_current_phase_merges_without_transition() {
        let mut session = Session::seeded(&host_identity());
        session.apply_state_update(Phase::SettingTopic, None);
        let data = StateData {
            topic: Some("Movies".into()),
            ..StateData::default()
        };
        let outcome = session.apply_state_update(Phase::SettingTopic, Some(&data));
        assert_eq!(
            outcome,
            StateOutcome::Applied {
                phase_changed: false,
                assignment_changed: false
            }
        );
        assert_eq!(session.topic.as_deref(), Some("Movies"));
    }

    #[test]
    fn payloadless_transition_preserves_round_content() {
        let mut session = Session::seeded(&host_identity());
        let data = StateData {
            topic: Some("Movies".into()),
            theme: Some("Entertainment".into()),
            original_emojis: Some(strings(&["🎬", "🍿", "🎭"])),
            displayed_emojis: Some(strings(&["🎬", "🔧", "🎭"])),
            dummy_index: Some(1),
            dummy_emoji: Some("🔧".into()),
            ..StateData::default()
        };
        session.apply_state_update(Phase::SettingTopic, Some(&data));
        session.apply_state_update(Phase::Discussing, None);

        assert_eq!(session.topic.as_deref(), Some("Movies"));
        assert_eq!(session.original_emojis, strings(&["🎬", "🍿", "🎭"]));
        assert_eq!(session.displayed_emojis, strings(&["🎬", "🔧", "🎭"]));
        assert_eq!(session.dummy_index, Some(1));
    }

    #[test]
    fn blank_theme_never_erases_known_theme() {
        let mut session = Session::seeded(&host_identity());
        session.theme = Some("人物".into());
        session.hint = Some("出身地、性別、やったこと".into());

        let data = StateData {
            theme: Some(String::new()),
            hint: Some("   ".into()),
            ..StateData::default()
        };
        session.apply_state_update(Phase::SettingTopic, Some(&data));
        assert_eq!(session.theme.as_deref(), Some("人物"));
        assert_eq!(session.hint.as_deref(), Some("出身地、性別、やったこと"));
    }

    #[test]
    fn empty_emoji_arrays_are_transient_noise() {
        let mut session = Session::seeded(&host_identity());
        session.original_emojis = strings(&["🎬", "🍿", "🎭"]);
        session.displayed_emojis = strings(&["🎬", "🔧", "🎭"]);

        let data = StateData {
            original_emojis: Some(vec![]),
            displayed_emojis: Some(vec![]),
            ..StateData::default()
        };
        session.apply_state_update(Phase::SettingTopic, Some(&data));
        assert_eq!(session.original_emojis.len(), 3);
        assert_eq!(session.displayed_emojis.len(), 3);
    }

    #[test]
    fn entering_discussion_assigns_local_emoji() {
        let mut session = Session::seeded(&host_identity());
        session.apply_state_update(Phase::SettingTopic, None);
        let data = StateData {
            assignments: Some(vec![
                Assignment {
                    user_id: uid(1),
                    emoji: "🍎".into(),
                },
                Assignment {
                    user_id: uid(2),
                    emoji: "🍇".into(),
                },
            ]),
            ..StateData::default()
        };
        let outcome = session.apply_state_update(Phase::Discussing, Some(&data));
        assert_eq!(
            outcome,
            StateOutcome::Applied {
                phase_changed: true,
                assignment_changed: true
            }
        );
        assert_eq!(session.assigned_emoji.as_deref(), Some("🍎"));
        assert_eq!(session.assignments.len(), 2);
    }

    #[test]
    fn missing_assignment_retains_previous_value() {
        let mut session = Session::seeded(&host_identity());
        session.apply_state_update(Phase::SettingTopic, None);
        session.apply_state_update(
            Phase::Discussing,
            Some(&StateData {
                assignments: Some(vec![Assignment {
                    user_id: uid(1),
                    emoji: "🍎".into(),
                }]),
                ..StateData::default()
            }),
        );
        // Duplicate broadcast without an assignment table.
        let outcome = session.apply_state_update(Phase::Discussing, None);
        assert_eq!(
            outcome,
            StateOutcome::Applied {
                phase_changed: false,
                assignment_changed: false
            }
        );
        assert_eq!(session.assigned_emoji.as_deref(), Some("🍎"));
    }

    #[test]
    fn host_sees_original_players_see_displayed() {
        let mut host = Session::seeded(&host_identity());
        host.apply_roster(&[
            entry(1, "Hana", Role::Host, false),
            entry(2, "Alice", Role::Player, true),
        ]);
        let data = StateData {
            original_emojis: Some(strings(&["🎬", "🍿", "🎭"])),
            displayed_emojis: Some(strings(&["🎬", "🔧", "🎭"])),
            dummy_index: Some(1),
            dummy_emoji: Some("🔧".into()),
            ..StateData::default()
        };
        host.apply_state_update(Phase::SettingTopic, Some(&data));

        let mut player = host.clone();
        player.local_user_id = Some(uid(2));

        assert_eq!(host.visible_emojis(), strings(&["🎬", "🍿", "🎭"]).as_slice());
        assert_eq!(
            player.visible_emojis(),
            strings(&["🎬", "🔧", "🎭"]).as_slice()
        );
    }

    #[test]
    fn server_error_sets_last_error_only() {
        let mut session = Session::seeded(&host_identity());
        session.apply_state_update(Phase::SettingTopic, None);
        let roster_before = session.roster.clone();

        session.apply_server_error(Some(ErrorCode::PermissionDenied), "host only".into());
        assert_eq!(session.phase, Phase::SettingTopic);
        assert_eq!(session.roster, roster_before);
        assert_eq!(
            session.last_error.as_ref().unwrap().code,
            Some(ErrorCode::PermissionDenied)
        );

        // The next successful update clears it.
        session.apply_timer(TimerValue::Seconds(30));
        assert!(session.last_error.is_none());
    }

    #[test]
    fn empty_roster_snapshot_keeps_seed() {
        let mut session = Session::seeded(&host_identity());
        assert!(!session.apply_roster(&[]));
        assert!(session.is_host());
        assert_eq!(session.roster.len(), 1);
    }

    #[test]
    fn full_round_walkthrough() {
        let mut session = Session::seeded(&host_identity());
        session.apply_roster(&[
            entry(1, "Hana", Role::Host, false),
            entry(2, "Alice", Role::Player, false),
            entry(3, "Ben", Role::Player, true),
        ]);

        for phase in [
            Phase::SettingTopic,
            Phase::Discussing,
            Phase::Answering,
            Phase::Checking,
            Phase::Finished,
        ] {
            let outcome = session.apply_state_update(phase, None);
            assert!(matches!(
                outcome,
                StateOutcome::Applied {
                    phase_changed: true,
                    ..
                }
            ));
        }
        assert!(session.phase.is_terminal());
    }
}
