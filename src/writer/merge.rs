//! Positional merge of partial-failure retry rounds
//!
//! A retry round only covers the rows that were still failed after the
//! previous round, so its statuses are positionally re-indexed. Merging maps
//! each round status back to the row's original position; the latest round
//! that attempted a row wins, and successes from earlier rounds are never
//! overwritten by rounds that did not attempt them.

use crate::writer::request::RowStatus;

/// Fold one retry round into the running per-row statuses
///
/// `attempted[i]` is the original index of the row that produced `round[i]`.
/// Extra round statuses beyond `attempted.len()` are ignored; missing ones
/// leave the previous status in place.
pub fn merge_round(base: &mut [RowStatus], attempted: &[usize], round: &[RowStatus]) {
    for (pos, status) in round.iter().enumerate() {
        if let Some(&original) = attempted.get(pos) {
            if original < base.len() {
                base[original] = status.clone();
            }
        }
    }
}

/// Original indices of rows still failed in `base`
pub fn failed_positions(base: &[RowStatus]) -> Vec<usize> {
    base.iter()
        .enumerate()
        .filter_map(|(i, s)| (!s.is_succeeded()).then_some(i))
        .collect()
}
