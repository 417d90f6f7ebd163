//! Short-lived validity verdict memo and the memoized nearest-valid search.
//!
//! The memo avoids repeating an expensive reachability/validity check for
//! the same candidate when multiple providers or agents probe it within one
//! candidate-cache epoch. It must be cleared whenever the owning candidate
//! list refreshes: a stale "valid" verdict on a destroyed candidate is a
//! correctness bug, not a performance one.

use std::collections::BTreeMap;

use contracts::{CandidateRef, TargetId};

#[derive(Debug, Clone, Default)]
pub struct ValidityMemo {
    verdicts: BTreeMap<TargetId, bool>,
}

impl ValidityMemo {
    pub fn new() -> Self {
        Self {
            verdicts: BTreeMap::new(),
        }
    }

    pub fn get(&self, target: TargetId) -> Option<bool> {
        self.verdicts.get(&target).copied()
    }

    pub fn record(&mut self, target: TargetId, verdict: bool) {
        self.verdicts.insert(target, verdict);
    }

    /// Drop the verdict for one target (e.g. the target was destroyed or
    /// claimed mid-epoch).
    pub fn remove(&mut self, target: TargetId) {
        self.verdicts.remove(&target);
    }

    pub fn clear(&mut self) {
        self.verdicts.clear();
    }

    /// Keep only verdicts whose target appears in `live`. Run after a
    /// candidate list is rebuilt so no leaked verdict can outlive its
    /// candidate.
    pub fn retain_targets(&mut self, live: &[CandidateRef]) {
        self.verdicts
            .retain(|target, _| live.iter().any(|candidate| candidate.target == *target));
    }

    pub fn len(&self) -> usize {
        self.verdicts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.verdicts.is_empty()
    }
}

// ---------------------------------------------------------------------------
// Memoized search
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct SearchOutcome {
    pub chosen: Option<CandidateRef>,
    pub candidates_checked: u64,
    pub memo_hits: u64,
}

/// Walk `buckets` in ascending band order, within a bucket in the order
/// given (already shuffled), and return the first candidate the predicate
/// accepts. Verdicts are memoized per target; a memoized `false` skips the
/// predicate, a memoized `true` wins immediately.
pub fn find_first_valid<F>(
    buckets: &[Vec<CandidateRef>],
    memo: &mut ValidityMemo,
    mut predicate: F,
) -> SearchOutcome
where
    F: FnMut(&CandidateRef) -> bool,
{
    let mut outcome = SearchOutcome::default();

    for bucket in buckets {
        for candidate in bucket {
            let verdict = match memo.get(candidate.target) {
                Some(known) => {
                    outcome.memo_hits += 1;
                    known
                }
                None => {
                    outcome.candidates_checked += 1;
                    let fresh = predicate(candidate);
                    memo.record(candidate.target, fresh);
                    fresh
                }
            };
            if verdict {
                outcome.chosen = Some(*candidate);
                return outcome;
            }
        }
    }

    outcome
}

#[cfg(test)]
mod tests {
    use super::*;
    use contracts::Position;

    fn candidate(id: u64) -> CandidateRef {
        CandidateRef {
            target: TargetId(id),
            position: Position::new(id as f32, 0.0),
        }
    }

    #[test]
    fn returns_first_accepted_in_bucket_order() {
        let buckets = vec![vec![candidate(1), candidate(2)], vec![candidate(3)]];
        let mut memo = ValidityMemo::new();
        let outcome = find_first_valid(&buckets, &mut memo, |c| c.target.0 == 2);

        assert_eq!(outcome.chosen.map(|c| c.target.0), Some(2));
        assert_eq!(outcome.candidates_checked, 2);
        assert_eq!(outcome.memo_hits, 0);
    }

    #[test]
    fn rejected_verdicts_are_memoized_across_searches() {
        let buckets = vec![vec![candidate(1), candidate(2)]];
        let mut memo = ValidityMemo::new();
        let mut probes = 0_u32;

        let first = find_first_valid(&buckets, &mut memo, |_| {
            probes += 1;
            false
        });
        assert!(first.chosen.is_none());
        assert_eq!(probes, 2);

        let second = find_first_valid(&buckets, &mut memo, |_| {
            probes += 1;
            false
        });
        assert!(second.chosen.is_none());
        // All verdicts came from the memo; the predicate never ran again.
        assert_eq!(probes, 2);
        assert_eq!(second.memo_hits, 2);
        assert_eq!(second.candidates_checked, 0);
    }

    #[test]
    fn memoized_true_short_circuits() {
        let buckets = vec![vec![candidate(5)]];
        let mut memo = ValidityMemo::new();
        memo.record(TargetId(5), true);

        let outcome = find_first_valid(&buckets, &mut memo, |_| {
            panic!("predicate must not run for a memoized candidate")
        });
        assert_eq!(outcome.chosen.map(|c| c.target.0), Some(5));
        assert_eq!(outcome.memo_hits, 1);
    }

    #[test]
    fn empty_buckets_yield_nothing() {
        let buckets: Vec<Vec<CandidateRef>> = vec![Vec::new(), Vec::new()];
        let mut memo = ValidityMemo::new();
        let outcome = find_first_valid(&buckets, &mut memo, |_| true);
        assert!(outcome.chosen.is_none());
        assert_eq!(outcome.candidates_checked, 0);
    }

    #[test]
    fn retain_targets_drops_leaked_verdicts() {
        let mut memo = ValidityMemo::new();
        memo.record(TargetId(1), true);
        memo.record(TargetId(2), false);
        memo.record(TargetId(3), true);

        let live = vec![candidate(2)];
        memo.retain_targets(&live);

        assert_eq!(memo.len(), 1);
        assert_eq!(memo.get(TargetId(2)), Some(false));
        assert_eq!(memo.get(TargetId(1)), None);
    }

    #[test]
    fn remove_forgets_a_single_target() {
        let mut memo = ValidityMemo::new();
        memo.record(TargetId(9), true);
        memo.remove(TargetId(9));
        assert!(memo.is_empty());
    }
}
