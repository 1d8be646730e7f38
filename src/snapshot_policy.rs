//! Pure decision function for when to emit a [`crate::model::snapshot::NewSnapshot`]
//! (spec.md section 4.3). Deliberately free of diesel/axum imports so it can
//! be unit-tested in isolation from storage and the HTTP layer.

use crate::model::enums::SnapshotReason;

/// The score/front-page facts the policy compares between observations.
#[derive(Debug, Clone, Copy)]
pub struct Observation {
    pub score: Option<i32>,
    pub is_front_page: bool,
}

/// Evaluates the rules in spec.md section 4.3, in order, returning the first
/// matching reason.
pub fn decide(old: Option<Observation>, new: Observation, update_count: i32, changed: bool) -> Option<SnapshotReason> {
    if old.is_none() && new.is_front_page {
        return Some(SnapshotReason::NewItem);
    }
    if !changed {
        return None;
    }
    if let Some(old) = old {
        if let (Some(old_score), Some(new_score)) = (old.score, new.score) {
            if new_score - old_score >= 20 {
                return Some(SnapshotReason::ScoreSpike);
            }
        }
    }
    if update_count > 0 && update_count % 4 == 0 {
        return Some(SnapshotReason::Sample);
    }
    if new.is_front_page {
        return Some(SnapshotReason::FrontPage);
    }
    None
}

/// Backfill's extra filter (spec.md section 4.6 Phase A): older items should
/// not produce `sample` or `front_page` snapshots, only `score_spike`.
pub fn keep_for_backfill(reason: SnapshotReason) -> bool {
    matches!(reason, SnapshotReason::ScoreSpike)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn obs(score: Option<i32>, is_front_page: bool) -> Observation {
        Observation { score, is_front_page }
    }

    #[test]
    fn new_front_page_item_emits_new_item() {
        let new = obs(Some(5), true);
        assert_eq!(decide(None, new, 0, true), Some(SnapshotReason::NewItem));
    }

    #[test]
    fn new_non_front_page_item_emits_nothing() {
        let new = obs(Some(5), false);
        assert_eq!(decide(None, new, 0, true), None);
    }

    #[test]
    fn unchanged_item_never_emits_even_with_front_page() {
        let old = obs(Some(5), false);
        let new = obs(Some(5), true);
        assert_eq!(decide(Some(old), new, 0, false), None);
    }

    #[test]
    fn score_spike_takes_priority_over_sample_and_front_page() {
        let old = obs(Some(10), false);
        let new = obs(Some(31), true);
        assert_eq!(decide(Some(old), new, 4, true), Some(SnapshotReason::ScoreSpike));
    }

    #[test]
    fn score_jump_below_threshold_is_not_a_spike() {
        let old = obs(Some(10), false);
        let new = obs(Some(29), false);
        assert_eq!(decide(Some(old), new, 1, true), None);
    }

    #[test]
    fn sample_fires_every_fourth_update() {
        let old = obs(Some(10), false);
        let new = obs(Some(12), false);
        assert_eq!(decide(Some(old), new, 4, true), Some(SnapshotReason::Sample));
        assert_eq!(decide(Some(old), new, 8, true), Some(SnapshotReason::Sample));
    }

    #[test]
    fn update_count_zero_never_samples() {
        let old = obs(Some(10), false);
        let new = obs(Some(12), false);
        assert_eq!(decide(Some(old), new, 0, true), None);
    }

    #[test]
    fn non_multiple_of_four_falls_through_to_front_page_check() {
        let old = obs(Some(10), false);
        let new = obs(Some(12), true);
        assert_eq!(decide(Some(old), new, 5, true), Some(SnapshotReason::FrontPage));
    }

    #[test]
    fn missing_score_on_either_side_skips_spike_rule() {
        let old = obs(None, false);
        let new = obs(Some(100), false);
        assert_eq!(decide(Some(old), new, 1, true), None);
    }

    #[test]
    fn backfill_filter_keeps_only_score_spike() {
        assert!(keep_for_backfill(SnapshotReason::ScoreSpike));
        assert!(!keep_for_backfill(SnapshotReason::FrontPage));
        assert!(!keep_for_backfill(SnapshotReason::Sample));
        assert!(!keep_for_backfill(SnapshotReason::NewItem));
    }
}
