//! Decoy-emoji injection.
//!
//! The leader picks an emoji sequence for the round; exactly one position is
//! secretly replaced with a decoy drawn from a curated pool before the
//! sequence is shown to guessers. Injection is one-way by design: nothing in
//! the displayed array alone reveals which position was swapped.

use crate::error::{DecoyDenError, Result};

/// Curated decoy candidates: deliberately generic emojis unlikely to appear
/// in a leader's topic selection.
pub const DECOY_POOL: &[&str] = &[
    "🔧", "🔨", "🪛", "⚙️", "🔩", // tools
    "🚗", "🚕", "🚙", "🚌", "🚎", // vehicles
    "🌵", "🌴", "🌲", "🌳", "🌿", // plants
    "🏔️", "⛰️", "🗻", "🏕️", "🏖️", // terrain
    "📱", "💻", "⌨️", "🖥️", "🖨️", // electronics
    "🎲", "🎯", "🎪", "🎭", "🎨", // entertainment
    "🔔", "🔕", "📢", "📣", "📯", // sound
    "🧲", "🧪", "🧬", "🔬", "🔭", // science
];

/// Result of replacing one emoji in the leader's selection with a decoy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecoyInjection {
    /// The leader's untouched selection (shown to the room creator for
    /// grading).
    pub original: Vec<String>,
    /// The selection with one position swapped (shown to guessers).
    pub displayed: Vec<String>,
    /// Zero-based position of the swap.
    pub dummy_index: usize,
    /// The decoy that was injected.
    pub dummy_emoji: String,
}

/// Replace one uniformly random position of `emojis` with a decoy drawn
/// uniformly from [`DECOY_POOL`], excluding any emoji already present in the
/// input. If the whole pool is contained in the input, the draw degrades to
/// the full pool and a duplicate is accepted.
///
/// The input is never mutated; `displayed` differs from `original` in
/// exactly one position.
///
/// # Errors
///
/// Returns [`DecoyDenError::Validation`] for an empty input. Length and
/// duplicate constraints on the selection itself are the caller's concern
/// (see [`RoomRules::validate_emojis`](crate::rules::RoomRules::validate_emojis)).
pub fn inject_decoy(emojis: &[String]) -> Result<DecoyInjection> {
    if emojis.is_empty() {
        return Err(DecoyDenError::Validation(
            "cannot inject a decoy into an empty emoji selection".into(),
        ));
    }

    let dummy_index = fastrand::usize(..emojis.len());

    let candidates: Vec<&str> = DECOY_POOL
        .iter()
        .copied()
        .filter(|decoy| !emojis.iter().any(|e| e == decoy))
        .collect();

    let dummy_emoji = match fastrand::choice(candidates.iter().copied()) {
        Some(decoy) => decoy,
        None => {
            // Every pool entry already appears in the selection. Degraded
            // case: draw from the full pool and accept a duplicate.
            tracing::warn!("decoy pool exhausted by selection, drawing from full pool");
            fastrand::choice(DECOY_POOL.iter().copied()).unwrap_or("🔧")
        }
    };

    let original = emojis.to_vec();
    let mut displayed = emojis.to_vec();
    if let Some(slot) = displayed.get_mut(dummy_index) {
        *slot = dummy_emoji.to_owned();
    }

    tracing::debug!(
        dummy_index,
        dummy_emoji,
        "injected decoy into emoji selection"
    );

    Ok(DecoyInjection {
        original,
        displayed,
        dummy_index,
        dummy_emoji: dummy_emoji.to_owned(),
    })
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

    fn selection(emojis: &[&str]) -> Vec<String> {
        emojis.iter().map(|s| (*s).to_owned()).collect()
    }

    #[test]
    fn rejects_empty_input() {
        let err = inject_decoy(&[]).unwrap_err();
        assert!(matches!(err, DecoyDenError::Validation(_)));
    }

    #[test]
    fn displayed_differs_in_exactly_one_position() {
        // Property holds for every valid selection length and across many
        // random draws.
        for len in 3..=7 {
            let input = selection(&["🎬", "🍿", "🎭", "🎤", "🎸", "🎹", "🎺"][..len]);
            for _ in 0..50 {
                let result = inject_decoy(&input).unwrap();
                assert_eq!(result.original, input, "original must be untouched");
                assert_eq!(result.displayed.len(), input.len());
                assert!(result.dummy_index < input.len());

                let diffs: Vec<usize> = (0..input.len())
                    .filter(|&i| result.displayed[i] != result.original[i])
                    .collect();
                assert_eq!(diffs, vec![result.dummy_index]);
                assert_eq!(result.displayed[result.dummy_index], result.dummy_emoji);
            }
        }
    }

    #[test]
    fn decoy_never_duplicates_an_original_emoji() {
        let input = selection(&["🔧", "🔨", "🎬"]);
        for _ in 0..100 {
            let result = inject_decoy(&input).unwrap();
            assert!(
                !input.contains(&result.dummy_emoji),
                "decoy {} collides with the selection",
                result.dummy_emoji
            );
        }
    }

    #[test]
    fn exhausted_pool_falls_back_to_full_pool() {
        // A selection containing the entire pool leaves no unused decoy; the
        // degraded path must still produce a swap rather than fail.
        let input: Vec<String> = DECOY_POOL.iter().map(|s| (*s).to_owned()).collect();
        let result = inject_decoy(&input).unwrap();
        assert_eq!(result.displayed.len(), input.len());
        assert!(DECOY_POOL.contains(&result.dummy_emoji.as_str()));
    }

    #[test]
    fn injection_is_one_way() {
        // Without the dummy_index the displayed array alone cannot identify
        // the swap: the decoy is indistinguishable from a legitimate pick.
        let input = selection(&["🎲", "🍿", "🎭"]); // 🎲 is itself a pool emoji
        let result = inject_decoy(&input).unwrap();
        let pool_positions: Vec<usize> = (0..result.displayed.len())
            .filter(|&i| DECOY_POOL.contains(&result.displayed[i].as_str()))
            .collect();
        // At least the injected position is a pool emoji, and when the
        // selection contains pool emojis too there is more than one
        // candidate, so membership alone cannot recover dummy_index.
        assert!(pool_positions.contains(&result.dummy_index));
    }

    #[test]
    fn index_distribution_covers_all_positions() {
        let input = selection(&["🎬", "🍿", "🎭", "🎤"]);
        let mut seen = [false; 4];
        for _ in 0..200 {
            let result = inject_decoy(&input).unwrap();
            seen[result.dummy_index] = true;
        }
        assert!(seen.iter().all(|&s| s), "every index should be drawable");
    }
}
