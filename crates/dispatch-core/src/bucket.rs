//! Distance bucketing: partition candidates into ascending distance bands
//! around an agent, shuffling within each band.
//!
//! The search consumer walks buckets near-to-far, so this trades exact
//! nearest-candidate ordering for O(n) bucketing cost. Shuffling within a
//! band spreads contention when many agents probe the same candidate list
//! in one tick. All randomness is a SplitMix64 stream derived from
//! `(seed, tick, agent)`, so runs replay bit-identically.

use contracts::{CandidateRef, Position};

// ---------------------------------------------------------------------------
// Deterministic mixing
// ---------------------------------------------------------------------------

/// SplitMix64-style stream. Not cryptographic; used only for permutations
/// and world-generation sampling.
#[derive(Debug, Clone)]
pub struct MixStream {
    state: u64,
}

impl MixStream {
    pub fn new(seed: u64) -> Self {
        Self { state: seed }
    }

    pub fn next_u64(&mut self) -> u64 {
        self.state = self.state.wrapping_add(0x9e3779b97f4a7c15);
        let mut z = self.state;
        z = (z ^ (z >> 30)).wrapping_mul(0xbf58476d1ce4e5b9);
        z = (z ^ (z >> 27)).wrapping_mul(0x94d049bb133111eb);
        z ^ (z >> 31)
    }

    /// Uniform-enough draw in `[0, bound)`; `bound` of zero yields zero.
    pub fn next_below(&mut self, bound: u64) -> u64 {
        if bound == 0 {
            return 0;
        }
        self.next_u64() % bound
    }
}

/// Derive the shuffle seed for one agent's bucket walk at one tick.
pub fn derive_shuffle_seed(seed: u64, tick: u64, agent_id: u64) -> u64 {
    let mut h = seed;
    h = h.wrapping_add(tick.wrapping_mul(0x9e3779b97f4a7c15));
    h = h.wrapping_add(agent_id.wrapping_mul(0xbf58476d1ce4e5b9));
    h = (h ^ (h >> 30)).wrapping_mul(0xbf58476d1ce4e5b9);
    h = (h ^ (h >> 27)).wrapping_mul(0x94d049bb133111eb);
    h ^ (h >> 31)
}

// ---------------------------------------------------------------------------
// Bucketing
// ---------------------------------------------------------------------------

/// Partition `candidates` into `thresholds.len() + 1` buckets around
/// `origin`. `thresholds` are ascending squared-distance cut points; a
/// candidate lands in the first bucket whose threshold admits its squared
/// distance, or in the final overflow bucket. Each bucket is then
/// Fisher-Yates shuffled with its own stream off `shuffle_seed`.
///
/// Completeness: every candidate appears in exactly one bucket.
pub fn bucket_by_distance(
    origin: Position,
    candidates: &[CandidateRef],
    thresholds: &[f32],
    shuffle_seed: u64,
) -> Vec<Vec<CandidateRef>> {
    let mut buckets: Vec<Vec<CandidateRef>> = vec![Vec::new(); thresholds.len() + 1];

    for candidate in candidates {
        let distance_squared = origin.distance_squared(&candidate.position);
        let slot = thresholds
            .iter()
            .position(|threshold| distance_squared <= *threshold)
            .unwrap_or(thresholds.len());
        buckets[slot].push(*candidate);
    }

    for (index, bucket) in buckets.iter_mut().enumerate() {
        let mut stream = MixStream::new(shuffle_seed ^ (index as u64).wrapping_mul(0x9e3779b9));
        shuffle(bucket, &mut stream);
    }

    buckets
}

fn shuffle(bucket: &mut [CandidateRef], stream: &mut MixStream) {
    for i in (1..bucket.len()).rev() {
        let j = stream.next_below(i as u64 + 1) as usize;
        bucket.swap(i, j);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use contracts::TargetId;

    fn candidate(id: u64, x: f32, y: f32) -> CandidateRef {
        CandidateRef {
            target: TargetId(id),
            position: Position::new(x, y),
        }
    }

    fn ids(bucket: &[CandidateRef]) -> Vec<u64> {
        let mut ids: Vec<u64> = bucket.iter().map(|c| c.target.0).collect();
        ids.sort_unstable();
        ids
    }

    #[test]
    fn candidates_land_in_their_band() {
        let origin = Position::new(0.0, 0.0);
        let candidates = vec![
            candidate(1, 3.0, 4.0),   // d2 = 25
            candidate(2, 10.0, 0.0),  // d2 = 100
            candidate(3, 15.0, 0.0),  // d2 = 225
            candidate(4, 100.0, 0.0), // d2 = 10000, overflow
        ];
        let buckets = bucket_by_distance(origin, &candidates, &[100.0, 400.0], 1);

        assert_eq!(buckets.len(), 3);
        assert_eq!(ids(&buckets[0]), vec![1, 2]); // boundary is inclusive
        assert_eq!(ids(&buckets[1]), vec![3]);
        assert_eq!(ids(&buckets[2]), vec![4]);
    }

    #[test]
    fn no_candidate_is_lost_or_duplicated() {
        let origin = Position::new(5.0, 5.0);
        let candidates: Vec<CandidateRef> = (0..50)
            .map(|i| candidate(i, i as f32, (i % 7) as f32))
            .collect();
        let buckets = bucket_by_distance(origin, &candidates, &[10.0, 90.0, 500.0], 99);

        let total: usize = buckets.iter().map(Vec::len).sum();
        assert_eq!(total, candidates.len());

        let mut seen: Vec<u64> = buckets.iter().flatten().map(|c| c.target.0).collect();
        seen.sort_unstable();
        let expected: Vec<u64> = (0..50).collect();
        assert_eq!(seen, expected);
    }

    #[test]
    fn empty_thresholds_yield_single_overflow_bucket() {
        let candidates = vec![candidate(1, 1.0, 1.0), candidate(2, 9.0, 9.0)];
        let buckets = bucket_by_distance(Position::default(), &candidates, &[], 7);
        assert_eq!(buckets.len(), 1);
        assert_eq!(ids(&buckets[0]), vec![1, 2]);
    }

    #[test]
    fn shuffle_is_deterministic_for_a_seed() {
        let candidates: Vec<CandidateRef> =
            (0..20).map(|i| candidate(i, i as f32, 0.0)).collect();
        let a = bucket_by_distance(Position::default(), &candidates, &[500.0], 42);
        let b = bucket_by_distance(Position::default(), &candidates, &[500.0], 42);
        assert_eq!(a, b);
    }

    #[test]
    fn different_seeds_permute_differently() {
        let candidates: Vec<CandidateRef> =
            (0..20).map(|i| candidate(i, i as f32, 0.0)).collect();
        let a = bucket_by_distance(Position::default(), &candidates, &[500.0], 1);
        let b = bucket_by_distance(Position::default(), &candidates, &[500.0], 2);
        // Same membership, near-certainly different order for 20 elements.
        assert_eq!(ids(&a[0]), ids(&b[0]));
        assert_ne!(a, b);
    }

    #[test]
    fn next_below_zero_bound_is_zero() {
        let mut stream = MixStream::new(3);
        assert_eq!(stream.next_below(0), 0);
    }
}
