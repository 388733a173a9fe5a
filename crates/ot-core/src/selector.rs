//! Picking an odometer value out of noisy OCR tokens.

use crate::validate::MAX_ODOMETER_KM;

/// Reduces the integers found in a photo to a single odometer guess.
pub trait CandidateSelector: Send + Sync {
    /// Returns the best guess, or `None` if no token looks like an odometer.
    fn select(&self, tokens: &[i64]) -> Option<i64>;
}

/// Picks the largest token within the odometer range.
///
/// Odometer displays usually show the reading as the biggest numeral cluster,
/// while stray tokens (partial digits, clock, trip meter) tend to be smaller.
/// A larger unrelated number in frame will win, which is a known weakness.
#[derive(Debug, Clone, Copy, Default)]
pub struct LargestPlausible;

impl CandidateSelector for LargestPlausible {
    fn select(&self, tokens: &[i64]) -> Option<i64> {
        select_odometer(tokens)
    }
}

/// Returns the largest token in `0..=MAX_ODOMETER_KM`.
pub fn select_odometer(tokens: &[i64]) -> Option<i64> {
    tokens
        .iter()
        .copied()
        .filter(|km| (0..=MAX_ODOMETER_KM).contains(km))
        .max()
}
