//! Roster reconciliation and role derivation.
//!
//! The server is authoritative for the participant list, but its snapshots
//! are not always complete: delta updates may omit `role`/`is_leader`, and a
//! reconnect race can surface an empty list before the server has rebuilt
//! its participant table. The reconciler absorbs both without destroying
//! local knowledge.

use serde::{Deserialize, Serialize};

use crate::protocol::{ParticipantEntry, Role, UserId};

/// A fully-resolved participant in the room.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Participant {
    /// Unique, immutable identifier.
    pub user_id: UserId,
    pub user_name: String,
    pub role: Role,
    pub is_leader: bool,
}

/// Outcome of reconciling an incoming roster snapshot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RosterOutcome {
    /// The incoming snapshot was empty; the previous roster stands.
    KeptPrevious,
    /// The incoming snapshot resolves to the same roster; downstream updates
    /// can be skipped.
    Unchanged,
    /// The roster was replaced.
    Replaced(Vec<Participant>),
}

/// Merge an incoming roster snapshot into the previous roster.
///
/// Rules:
/// - An empty snapshot is transient noise (reconnect race), not ground
///   truth: the previous roster is kept.
/// - A non-empty snapshot replaces the roster wholesale, but `role` and
///   `is_leader` omitted by the server are back-filled from the previous
///   entry with the same `user_id` (new participants default to
///   `player`/`false`).
/// - Equality on `(user_id, is_leader, role)` short-circuits downstream
///   re-derivation.
pub fn reconcile(previous: &[Participant], incoming: &[ParticipantEntry]) -> RosterOutcome {
    if incoming.is_empty() {
        if !previous.is_empty() {
            tracing::debug!("discarding empty roster snapshot, keeping {} entries", previous.len());
            return RosterOutcome::KeptPrevious;
        }
        return RosterOutcome::Unchanged;
    }

    let merged: Vec<Participant> = incoming
        .iter()
        .map(|entry| {
            let prior = previous.iter().find(|p| p.user_id == entry.user_id);
            Participant {
                user_id: entry.user_id,
                user_name: entry.user_name.clone(),
                role: entry
                    .role
                    .or(prior.map(|p| p.role))
                    .unwrap_or(Role::Player),
                is_leader: entry
                    .is_leader
                    .or(prior.map(|p| p.is_leader))
                    .unwrap_or(false),
            }
        })
        .collect();

    let unchanged = merged.len() == previous.len()
        && merged.iter().zip(previous.iter()).all(|(a, b)| {
            a.user_id == b.user_id && a.is_leader == b.is_leader && a.role == b.role
        });

    if unchanged {
        RosterOutcome::Unchanged
    } else {
        RosterOutcome::Replaced(merged)
    }
}

/// Whether `local_user_id` holds the host role in `roster`.
///
/// Pure derivation: identical inputs always yield identical output. Host
/// status must never be cached in a separate mutable flag that can drift
/// from the roster.
pub fn is_host(roster: &[Participant], local_user_id: UserId) -> bool {
    roster
        .iter()
        .any(|p| p.user_id == local_user_id && p.role == Role::Host)
}

/// Whether `local_user_id` is the current round's leader.
pub fn is_leader(roster: &[Participant], local_user_id: UserId) -> bool {
    roster
        .iter()
        .any(|p| p.user_id == local_user_id && p.is_leader)
}

/// The current leader entry, if any.
pub fn leader(roster: &[Participant]) -> Option<&Participant> {
    roster.iter().find(|p| p.is_leader)
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
    use uuid::Uuid;

    fn uid(n: u128) -> UserId {
        Uuid::from_u128(n)
    }

    fn participant(n: u128, name: &str, role: Role, is_leader: bool) -> Participant {
        Participant {
            user_id: uid(n),
            user_name: name.into(),
            role,
            is_leader,
        }
    }

    fn entry(n: u128, name: &str, role: Option<Role>, is_leader: Option<bool>) -> ParticipantEntry {
        ParticipantEntry {
            user_id: uid(n),
            user_name: name.into(),
            role,
            is_leader,
        }
    }

    #[test]
    fn empty_snapshot_never_clears_a_populated_roster() {
        let previous = vec![
            participant(1, "Host", Role::Host, false),
            participant(2, "Alice", Role::Player, true),
        ];
        assert_eq!(reconcile(&previous, &[]), RosterOutcome::KeptPrevious);
    }

    #[test]
    fn empty_snapshot_on_empty_roster_is_a_no_op() {
        assert_eq!(reconcile(&[], &[]), RosterOutcome::Unchanged);
    }

    #[test]
    fn non_empty_snapshot_replaces_wholesale() {
        let previous = vec![participant(1, "Host", Role::Host, false)];
        let incoming = vec![
            entry(1, "Host", Some(Role::Host), Some(false)),
            entry(2, "Alice", Some(Role::Player), Some(true)),
        ];
        let RosterOutcome::Replaced(merged) = reconcile(&previous, &incoming) else {
            panic!("expected replacement");
        };
        assert_eq!(merged.len(), 2);
        assert!(merged[1].is_leader);
    }

    #[test]
    fn missing_fields_are_backfilled_from_previous_entry() {
        let previous = vec![
            participant(1, "Host", Role::Host, false),
            participant(2, "Alice", Role::Player, true),
        ];
        // Delta update omits role and leadership entirely.
        let incoming = vec![entry(1, "Host", None, None), entry(2, "Alice", None, None)];
        match reconcile(&previous, &incoming) {
            RosterOutcome::Unchanged => {}
            other => panic!("backfill should reproduce the previous roster, got {other:?}"),
        }
    }

    #[test]
    fn unknown_participants_default_to_player_without_leadership() {
        let incoming = vec![entry(7, "Newcomer", None, None)];
        let RosterOutcome::Replaced(merged) = reconcile(&[], &incoming) else {
            panic!("expected replacement");
        };
        assert_eq!(merged[0].role, Role::Player);
        assert!(!merged[0].is_leader);
    }

    #[test]
    fn name_only_changes_short_circuit() {
        // Equality is shallow over (id, leadership, role); a renamed
        // participant alone does not trigger downstream updates.
        let previous = vec![participant(2, "Alice", Role::Player, true)];
        let incoming = vec![entry(2, "Alicia", Some(Role::Player), Some(true))];
        assert_eq!(reconcile(&previous, &incoming), RosterOutcome::Unchanged);
    }

    #[test]
    fn leadership_change_is_detected() {
        let previous = vec![
            participant(2, "Alice", Role::Player, true),
            participant(3, "Bob", Role::Player, false),
        ];
        let incoming = vec![
            entry(2, "Alice", Some(Role::Player), Some(false)),
            entry(3, "Bob", Some(Role::Player), Some(true)),
        ];
        let RosterOutcome::Replaced(merged) = reconcile(&previous, &incoming) else {
            panic!("expected replacement");
        };
        assert!(!merged[0].is_leader);
        assert!(merged[1].is_leader);
    }

    #[test]
    fn role_derivation_is_pure() {
        let roster = vec![
            participant(1, "Host", Role::Host, false),
            participant(2, "Alice", Role::Player, true),
        ];
        for _ in 0..3 {
            assert!(is_host(&roster, uid(1)));
            assert!(!is_host(&roster, uid(2)));
            assert!(is_leader(&roster, uid(2)));
            assert!(!is_leader(&roster, uid(1)));
            assert!(!is_host(&roster, uid(99)));
        }
        assert_eq!(leader(&roster).map(|p| p.user_id), Some(uid(2)));
    }
}
