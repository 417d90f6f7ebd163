//! Candidate cache refresher: interval-gated, full-replacement rebuilds of
//! each provider's per-region candidate list.
//!
//! A list is never partially mutated; each refresh fully replaces it and
//! clears the provider's validity memo for that region, so no verdict can
//! outlive the candidate set that produced it.

use contracts::{CandidateRef, RegionId, Tick};
use tracing::warn;

use crate::cache::RegionCacheStore;
use crate::memo::ValidityMemo;
use crate::provider::ProviderError;

/// Cached candidate list plus the "has any candidates" flag used for the
/// fast early-exit before any bucketing or validity work is attempted.
#[derive(Debug, Clone, Default)]
pub struct CandidateList {
    pub entries: Vec<CandidateRef>,
    pub has_candidates: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RefreshOutcome {
    /// Cache existed and was within its interval; nothing ran.
    Fresh,
    /// `collect` ran and replaced the list. `kept` may be below
    /// `collected` when the provider cap truncated the scan.
    Rebuilt { collected: usize, kept: usize },
    /// `collect` failed; an empty list was stored and stamped so the
    /// provider retries on its normal cadence, not every tick.
    Failed { message: String },
}

/// Staleness rule: absent means stale; otherwise stale once strictly more
/// than `interval` ticks have passed since the last refresh.
pub fn is_stale(last_refresh: Option<Tick>, now: Tick, interval: Tick) -> bool {
    match last_refresh {
        None => true,
        Some(at) => now.saturating_sub(at) > interval,
    }
}

/// Rebuild the `(region, provider)` candidate list if its interval has
/// elapsed or it has never been populated.
pub fn ensure_fresh<F>(
    caches: &mut RegionCacheStore<CandidateList>,
    memos: &mut RegionCacheStore<ValidityMemo>,
    region: RegionId,
    provider_id: &str,
    interval: Tick,
    cap: usize,
    now: Tick,
    collect: F,
) -> RefreshOutcome
where
    F: FnOnce() -> Result<Vec<CandidateRef>, ProviderError>,
{
    let populated = caches.get(region, provider_id).is_some();
    if populated && !is_stale(caches.last_refresh(region, provider_id), now, interval) {
        return RefreshOutcome::Fresh;
    }

    match collect() {
        Ok(mut entries) => {
            let collected = entries.len();
            // First-N truncation in scan order. A valid candidate past the
            // cap may be missed until the next refresh; documented
            // approximation, not a correctness guarantee.
            entries.truncate(cap);
            let kept = entries.len();

            let list = caches.get_or_create(region, provider_id);
            list.has_candidates = !entries.is_empty();
            list.entries = entries;
            caches.set_last_refresh(region, provider_id, now);
            memos.get_or_create(region, provider_id).clear();

            RefreshOutcome::Rebuilt { collected, kept }
        }
        Err(error) => {
            warn!(
                provider = provider_id,
                region = region.0,
                tick = now,
                "candidate collect failed: {error}"
            );
            let list = caches.get_or_create(region, provider_id);
            list.entries.clear();
            list.has_candidates = false;
            caches.set_last_refresh(region, provider_id, now);
            memos.get_or_create(region, provider_id).clear();

            RefreshOutcome::Failed {
                message: error.message,
            }
        }
    }
}
