//! Configurable room rules.
//!
//! Deployed rooms have disagreed on participant bounds (3–7 in some builds,
//! 4–6 in others) and on whether starting/skipping is a host or leader
//! privilege. Neither is baked in: both are room configuration, with
//! defaults matching the shipped game (three to six players, 3–7 emojis,
//! host starts, host or leader skips).

use crate::error::{DecoyDenError, Result};

/// Who may perform a privileged room action.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Privilege {
    /// Only the room creator.
    HostOnly,
    /// The room creator or the current round's leader.
    HostOrLeader,
}

impl Privilege {
    /// Whether a participant with the given derived roles satisfies this
    /// privilege.
    pub fn permits(self, is_host: bool, is_leader: bool) -> bool {
        match self {
            Self::HostOnly => is_host,
            Self::HostOrLeader => is_host || is_leader,
        }
    }
}

/// Tunable room parameters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoomRules {
    /// Minimum participants required to start a round.
    pub min_players: usize,
    /// Maximum participants admitted to the room.
    pub max_players: usize,
    /// Minimum emojis in the leader's selection.
    pub min_emojis: usize,
    /// Maximum emojis in the leader's selection.
    pub max_emojis: usize,
    /// Who may start the game (`WAITING → SETTING_TOPIC`).
    pub start_policy: Privilege,
    /// Who may skip the discussion (`DISCUSSING → ANSWERING`).
    pub skip_policy: Privilege,
}

impl Default for RoomRules {
    fn default() -> Self {
        Self {
            min_players: 3,
            max_players: 6,
            min_emojis: 3,
            max_emojis: 7,
            start_policy: Privilege::HostOnly,
            skip_policy: Privilege::HostOrLeader,
        }
    }
}

impl RoomRules {
    /// Validate a leader's emoji selection: count within bounds, no
    /// duplicates.
    ///
    /// # Errors
    ///
    /// Returns [`DecoyDenError::Validation`] describing the first violation.
    pub fn validate_emojis(&self, emojis: &[String]) -> Result<()> {
        if emojis.len() < self.min_emojis || emojis.len() > self.max_emojis {
            return Err(DecoyDenError::Validation(format!(
                "emoji selection must contain {}..={} entries, got {}",
                self.min_emojis,
                self.max_emojis,
                emojis.len()
            )));
        }
        for (i, emoji) in emojis.iter().enumerate() {
            if emojis.iter().skip(i + 1).any(|other| other == emoji) {
                return Err(DecoyDenError::Validation(format!(
                    "duplicate emoji in selection: {emoji}"
                )));
            }
        }
        Ok(())
    }

    /// Validate a topic string.
    ///
    /// # Errors
    ///
    /// Returns [`DecoyDenError::Validation`] for an empty/blank topic.
    pub fn validate_topic(&self, topic: &str) -> Result<()> {
        if topic.trim().is_empty() {
            return Err(DecoyDenError::Validation("topic must not be empty".into()));
        }
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
mod tests {
    use super::*;

    fn emojis(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| (*s).to_owned()).collect()
    }

    #[test]
    fn defaults_match_the_shipped_game() {
        let rules = RoomRules::default();
        assert_eq!(rules.min_players, 3);
        assert_eq!(rules.max_players, 6);
        assert_eq!(rules.min_emojis, 3);
        assert_eq!(rules.max_emojis, 7);
        assert_eq!(rules.start_policy, Privilege::HostOnly);
        assert_eq!(rules.skip_policy, Privilege::HostOrLeader);
    }

    #[test]
    fn emoji_count_bounds_are_enforced() {
        let rules = RoomRules::default();
        assert!(rules.validate_emojis(&emojis(&["🎬", "🍿"])).is_err());
        assert!(rules.validate_emojis(&emojis(&["🎬", "🍿", "🎭"])).is_ok());
        assert!(rules
            .validate_emojis(&emojis(&["1", "2", "3", "4", "5", "6", "7", "8"]))
            .is_err());
    }

    #[test]
    fn duplicate_emojis_are_rejected() {
        let rules = RoomRules::default();
        let err = rules
            .validate_emojis(&emojis(&["🎬", "🍿", "🎬"]))
            .unwrap_err();
        assert!(matches!(err, DecoyDenError::Validation(_)));
    }

    #[test]
    fn blank_topic_is_rejected() {
        let rules = RoomRules::default();
        assert!(rules.validate_topic("  ").is_err());
        assert!(rules.validate_topic("Movies").is_ok());
    }

    #[test]
    fn privileges() {
        assert!(Privilege::HostOnly.permits(true, false));
        assert!(!Privilege::HostOnly.permits(false, true));
        assert!(Privilege::HostOrLeader.permits(false, true));
        assert!(Privilege::HostOrLeader.permits(true, false));
        assert!(!Privilege::HostOrLeader.permits(false, false));
    }
}
