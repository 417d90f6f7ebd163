//! Task assignment orchestrator.
//!
//! Per agent per tick the probe runs: eligible-category scan, then
//! provider probe in descending-priority order with the has-candidates
//! early exit, then bucketed memoized search, then reserve/build. The
//! first successfully built task wins; priority order is itself the
//! tie-break. A provider failing at any hook yields nothing this tick and
//! the probe moves on, so one broken provider cannot starve the rest.

use std::collections::BTreeSet;

use contracts::{
    AgentId, AgentState, CandidateRef, ProviderCacheStat, RegionId, Task, TargetId, Tick,
};
use tracing::warn;

use crate::bucket::{bucket_by_distance, derive_shuffle_seed};
use crate::cache::RegionCacheStore;
use crate::candidates::{ensure_fresh, CandidateList, RefreshOutcome};
use crate::memo::{find_first_valid, ValidityMemo};
use crate::permission::PermissionCache;
use crate::provider::{AcceptFn, BuildFn, CollectFn, FnProvider, WorkProvider};
use crate::registry::{ProviderRegistry, RegistrationError};

// ---------------------------------------------------------------------------
// External collaborators
// ---------------------------------------------------------------------------

/// Services the host simulation supplies to the engine: the tick clock,
/// the reachability oracle, the reservation ledger, and capability
/// resolution. The engine only caches their verdicts; it never owns the
/// underlying world state.
pub trait WorldServices {
    fn now(&self) -> Tick;

    fn is_reachable(&self, agent: &AgentState, candidate: &CandidateRef) -> bool;

    fn is_reserved(&self, candidate: &CandidateRef) -> bool;

    /// Claim a candidate for an agent. Returns false if someone else holds
    /// it; the engine then forgets its verdict and keeps probing.
    fn reserve(&mut self, candidate: &CandidateRef, agent_id: AgentId) -> bool;

    fn release(&mut self, candidate: &CandidateRef);

    /// Uncached capability resolution (base flags, tag resolution, faction
    /// settings). The permission cache exists to avoid calling this every
    /// tick for every agent.
    fn can_perform(&self, agent: &AgentState, category: &str) -> bool;

    /// Agents whose permissions are recomputed on a bulk refresh.
    fn faction_roster(&self, region: RegionId) -> Vec<AgentState>;
}

// ---------------------------------------------------------------------------
// Probe reporting
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ProbeMetrics {
    pub providers_probed: u64,
    pub providers_skipped_empty: u64,
    pub candidates_checked: u64,
    pub memo_hits: u64,
    pub cache_refreshes: u64,
    pub tasks_built: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProbeStage {
    Collect,
    Accept,
    Build,
}

impl ProbeStage {
    pub fn label(&self) -> &'static str {
        match self {
            ProbeStage::Collect => "collect",
            ProbeStage::Accept => "accept",
            ProbeStage::Build => "build",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProbeFailure {
    pub provider_id: String,
    pub stage: ProbeStage,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RefreshNote {
    pub provider_id: String,
    pub collected: usize,
    pub kept: usize,
}

/// Everything observable about the most recent `assign_task` call. The
/// host turns this into events; the engine itself only traces.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProbeReport {
    pub metrics: ProbeMetrics,
    pub refreshed: Vec<RefreshNote>,
    pub failures: Vec<ProbeFailure>,
    pub permission_refreshed: bool,
}

// ---------------------------------------------------------------------------
// Engine
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
pub struct EngineConfig {
    pub seed: u64,
    /// Ascending squared-distance cut points for candidate bucketing.
    pub distance_bands: Vec<f32>,
    pub permission_refresh_interval: Tick,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            seed: 0,
            distance_bands: vec![100.0, 400.0, 1600.0],
            permission_refresh_interval: 12,
        }
    }
}

/// The assignment engine. All cache state lives here, scoped by region,
/// owned by the simulation session that constructed it; dropping or
/// resetting it costs performance, never correctness.
#[derive(Debug)]
pub struct AssignmentEngine {
    config: EngineConfig,
    registry: ProviderRegistry,
    candidates: RegionCacheStore<CandidateList>,
    memos: RegionCacheStore<ValidityMemo>,
    permissions: PermissionCache,
    last_report: ProbeReport,
}

impl AssignmentEngine {
    pub fn new(config: EngineConfig) -> Self {
        Self {
            config,
            registry: ProviderRegistry::new(),
            candidates: RegionCacheStore::new(),
            memos: RegionCacheStore::new(),
            permissions: PermissionCache::new(),
            last_report: ProbeReport::default(),
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn registry(&self) -> &ProviderRegistry {
        &self.registry
    }

    // --- Registration SPI ---

    pub fn register(&mut self, provider: Box<dyn WorkProvider>) -> Result<(), RegistrationError> {
        self.registry.register(provider)
    }

    /// Closure-based registration for hosts that do not want a provider
    /// type of their own.
    #[allow(clippy::too_many_arguments)]
    pub fn register_provider(
        &mut self,
        provider_id: impl Into<String>,
        priority: f32,
        categories: Vec<String>,
        refresh_interval: Tick,
        max_candidates: usize,
        collect: CollectFn,
        accept: AcceptFn,
        build: BuildFn,
    ) -> Result<(), RegistrationError> {
        let spec = contracts::ProviderSpec {
            provider_id: provider_id.into(),
            priority,
            categories,
            refresh_interval,
            max_candidates,
        };
        self.registry
            .register(Box::new(FnProvider::new(spec, collect, accept, build)))
    }

    pub fn reset_registry(&mut self) {
        self.registry.reset();
    }

    // --- Assignment ---

    /// The single entry point, invoked once per agent per decision tick.
    pub fn assign_task(
        &mut self,
        agent: &AgentState,
        world: &mut dyn WorldServices,
    ) -> Option<Task> {
        let mut report = ProbeReport::default();
        let now = world.now();
        let region = agent.region_id;

        // Eligible-category scan.
        let categories = self.registry.all_categories();
        let roster = world.faction_roster(region);
        report.permission_refreshed = self.permissions.ensure_fresh(
            region,
            now,
            self.config.permission_refresh_interval,
            &roster,
            &categories,
            &mut |state, category| world.can_perform(state, category),
        );

        let mut permitted = BTreeSet::new();
        for category in &categories {
            if self
                .permissions
                .can_perform(agent, category, &mut |state, cat| {
                    world.can_perform(state, cat)
                })
            {
                permitted.insert(category.clone());
            }
        }
        if permitted.is_empty() {
            self.last_report = report;
            return None;
        }

        // Provider probe, strictly priority-descending.
        for provider_id in self.registry.ordered_ids_for(&permitted) {
            let Some(provider) = self.registry.by_id(&provider_id) else {
                continue;
            };
            let spec = provider.spec().clone();

            let outcome = ensure_fresh(
                &mut self.candidates,
                &mut self.memos,
                region,
                &spec.provider_id,
                spec.refresh_interval,
                spec.max_candidates,
                now,
                || provider.collect(region),
            );
            match outcome {
                RefreshOutcome::Rebuilt { collected, kept } => {
                    report.metrics.cache_refreshes += 1;
                    report.refreshed.push(RefreshNote {
                        provider_id: spec.provider_id.clone(),
                        collected,
                        kept,
                    });
                }
                RefreshOutcome::Failed { message } => {
                    report.failures.push(ProbeFailure {
                        provider_id: spec.provider_id.clone(),
                        stage: ProbeStage::Collect,
                        message,
                    });
                }
                RefreshOutcome::Fresh => {}
            }

            // The critical early exit that keeps idle regions cheap: no
            // bucketing or validity work unless the region has candidates.
            let Some(list) = self.candidates.get(region, &spec.provider_id) else {
                continue;
            };
            if !list.has_candidates {
                report.metrics.providers_skipped_empty += 1;
                continue;
            }
            report.metrics.providers_probed += 1;

            let buckets = bucket_by_distance(
                agent.position,
                &list.entries,
                &self.config.distance_bands,
                derive_shuffle_seed(self.config.seed, now, agent.agent_id.0),
            );

            let memo = self.memos.get_or_create(region, &spec.provider_id);
            let mut accept_failure: Option<String> = None;
            let search = find_first_valid(&buckets, memo, |candidate| {
                if world.is_reserved(candidate) {
                    return false;
                }
                if !world.is_reachable(agent, candidate) {
                    return false;
                }
                match provider.accept(agent, candidate) {
                    Ok(verdict) => verdict,
                    Err(error) => {
                        accept_failure = Some(error.message);
                        false
                    }
                }
            });
            report.metrics.candidates_checked += search.candidates_checked;
            report.metrics.memo_hits += search.memo_hits;
            if let Some(message) = accept_failure {
                warn!(
                    provider = spec.provider_id.as_str(),
                    agent = agent.agent_id.0,
                    "provider accept failed: {message}"
                );
                report.failures.push(ProbeFailure {
                    provider_id: spec.provider_id.clone(),
                    stage: ProbeStage::Accept,
                    message,
                });
            }

            let Some(candidate) = search.chosen else {
                continue;
            };

            if !world.reserve(&candidate, agent.agent_id) {
                // Lost the claim between probe and acceptance.
                if let Some(memo) = self.memos.get_mut(region, &spec.provider_id) {
                    memo.record(candidate.target, false);
                }
                continue;
            }

            match provider.build(agent, &candidate, now) {
                Ok(task) => {
                    // The winning candidate is now reserved; its memoized
                    // "valid" verdict no longer holds for other agents.
                    if let Some(memo) = self.memos.get_mut(region, &spec.provider_id) {
                        memo.remove(candidate.target);
                    }
                    report.metrics.tasks_built += 1;
                    self.last_report = report;
                    return Some(task);
                }
                Err(error) => {
                    world.release(&candidate);
                    if let Some(memo) = self.memos.get_mut(region, &spec.provider_id) {
                        memo.record(candidate.target, false);
                    }
                    warn!(
                        provider = spec.provider_id.as_str(),
                        agent = agent.agent_id.0,
                        "provider build failed: {}",
                        error.message
                    );
                    report.failures.push(ProbeFailure {
                        provider_id: spec.provider_id.clone(),
                        stage: ProbeStage::Build,
                        message: error.message,
                    });
                    continue;
                }
            }
        }

        self.last_report = report;
        None
    }

    /// Observability for the most recent `assign_task` call.
    pub fn last_probe_report(&self) -> &ProbeReport {
        &self.last_report
    }

    // --- Cache control SPI ---

    /// Region teardown hook: drop every cache scoped to one region.
    pub fn reset_region(&mut self, region: RegionId) {
        self.candidates.clear(region);
        self.memos.clear(region);
        self.permissions.clear_region(region);
    }

    /// Full reload hook: drop every cache in the engine. The registry is
    /// kept; use `reset_registry` for a configuration reload.
    pub fn reset_all(&mut self) {
        self.candidates.clear_all();
        self.memos.clear_all();
        self.permissions.invalidate_all();
    }

    /// Capability-affecting event hook (e.g. a category toggled for an
    /// agent).
    pub fn invalidate_permission(&mut self, agent_id: AgentId) {
        self.permissions.invalidate(agent_id);
    }

    /// Simulation-state-changing event hook: a target died or was claimed
    /// outside the engine; forget every memoized verdict about it.
    pub fn invalidate_target(&mut self, region: RegionId, target: TargetId) {
        for (_, memo) in self.memos.entries_mut(region) {
            memo.remove(target);
        }
    }

    // --- Inspection ---

    pub fn cache_stats(&self, region: RegionId) -> Vec<ProviderCacheStat> {
        self.registry
            .specs()
            .iter()
            .map(|spec| {
                let list = self.candidates.get(region, &spec.provider_id);
                ProviderCacheStat {
                    provider_id: spec.provider_id.clone(),
                    cached_candidates: list.map_or(0, |l| l.entries.len()),
                    has_candidates: list.is_some_and(|l| l.has_candidates),
                    last_refresh_tick: self.candidates.last_refresh(region, &spec.provider_id),
                }
            })
            .collect()
    }

    pub fn permission_rows(&self, region: RegionId) -> usize {
        self.permissions.rows(region)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use contracts::{Position, ProviderSpec};
    use std::cell::Cell;
    use std::collections::BTreeSet;
    use std::sync::atomic::{AtomicU64, Ordering};
    use std::sync::Arc;

    // -- World double ------------------------------------------------------

    struct TestWorld {
        now: Tick,
        reserved: BTreeSet<TargetId>,
        unreachable: BTreeSet<TargetId>,
        denied: BTreeSet<(AgentId, String)>,
        deny_all: bool,
        roster: Vec<AgentState>,
        resolver_calls: Cell<u64>,
    }

    impl TestWorld {
        fn new() -> Self {
            Self {
                now: 0,
                reserved: BTreeSet::new(),
                unreachable: BTreeSet::new(),
                denied: BTreeSet::new(),
                deny_all: false,
                roster: Vec::new(),
                resolver_calls: Cell::new(0),
            }
        }
    }

    impl WorldServices for TestWorld {
        fn now(&self) -> Tick {
            self.now
        }

        fn is_reachable(&self, _agent: &AgentState, candidate: &CandidateRef) -> bool {
            !self.unreachable.contains(&candidate.target)
        }

        fn is_reserved(&self, candidate: &CandidateRef) -> bool {
            self.reserved.contains(&candidate.target)
        }

        fn reserve(&mut self, candidate: &CandidateRef, _agent_id: AgentId) -> bool {
            self.reserved.insert(candidate.target)
        }

        fn release(&mut self, candidate: &CandidateRef) {
            self.reserved.remove(&candidate.target);
        }

        fn can_perform(&self, agent: &AgentState, category: &str) -> bool {
            self.resolver_calls.set(self.resolver_calls.get() + 1);
            if self.deny_all {
                return false;
            }
            !self
                .denied
                .contains(&(agent.agent_id, category.to_string()))
        }

        fn faction_roster(&self, _region: RegionId) -> Vec<AgentState> {
            self.roster.clone()
        }
    }

    // -- Provider double ---------------------------------------------------

    #[derive(Default)]
    struct Counters {
        collects: AtomicU64,
        accepts: AtomicU64,
        builds: AtomicU64,
    }

    impl Counters {
        fn collects(&self) -> u64 {
            self.collects.load(Ordering::Relaxed)
        }

        fn accepts(&self) -> u64 {
            self.accepts.load(Ordering::Relaxed)
        }
    }

    fn candidate(id: u64, x: f32) -> CandidateRef {
        CandidateRef {
            target: TargetId(id),
            position: Position::new(x, 0.0),
        }
    }

    fn agent(id: u64) -> AgentState {
        AgentState {
            agent_id: AgentId(id),
            region_id: RegionId(1),
            position: Position::default(),
        }
    }

    fn counted_provider(
        engine: &mut AssignmentEngine,
        id: &str,
        priority: f32,
        category: &str,
        interval: Tick,
        candidates: Vec<CandidateRef>,
        counters: Arc<Counters>,
    ) {
        let spec = ProviderSpec {
            provider_id: id.to_string(),
            priority,
            categories: vec![category.to_string()],
            refresh_interval: interval,
            max_candidates: 200,
        };
        let build_spec = spec.clone();
        let collect_counters = Arc::clone(&counters);
        let accept_counters = Arc::clone(&counters);
        let build_counters = counters;
        engine
            .register(Box::new(FnProvider::new(
                spec,
                Box::new(move |_region| {
                    collect_counters.collects.fetch_add(1, Ordering::Relaxed);
                    Ok(candidates.clone())
                }),
                Box::new(move |_, _| {
                    accept_counters.accepts.fetch_add(1, Ordering::Relaxed);
                    Ok(true)
                }),
                Box::new(move |agent, chosen, now| {
                    build_counters.builds.fetch_add(1, Ordering::Relaxed);
                    Ok(crate::provider::task_for(
                        &build_spec,
                        agent,
                        chosen,
                        "test",
                        3,
                        now,
                    ))
                }),
            )))
            .unwrap();
    }

    fn new_engine() -> AssignmentEngine {
        AssignmentEngine::new(EngineConfig::default())
    }

    // -- Tests -------------------------------------------------------------

    #[test]
    fn no_permitted_categories_means_no_task_and_no_collect() {
        let mut engine = new_engine();
        let counters = Arc::new(Counters::default());
        counted_provider(
            &mut engine,
            "alarm",
            9.0,
            "emergency",
            60,
            vec![candidate(1, 5.0)],
            Arc::clone(&counters),
        );

        let mut world = TestWorld::new();
        world.deny_all = true;

        let task = engine.assign_task(&agent(1), &mut world);
        assert!(task.is_none());
        assert_eq!(counters.collects(), 0);
        assert_eq!(counters.accepts(), 0);
    }

    #[test]
    fn higher_priority_provider_wins_and_lower_is_never_probed() {
        let mut engine = new_engine();
        let alarm = Arc::new(Counters::default());
        let chores = Arc::new(Counters::default());
        counted_provider(
            &mut engine,
            "alarm",
            9.0,
            "emergency",
            60,
            vec![candidate(1, 5.0)],
            Arc::clone(&alarm),
        );
        counted_provider(
            &mut engine,
            "chores",
            1.0,
            "general",
            300,
            vec![candidate(2, 5.0)],
            Arc::clone(&chores),
        );

        let mut world = TestWorld::new();
        let task = engine.assign_task(&agent(1), &mut world).expect("task");

        assert_eq!(task.provider_id, "alarm");
        assert_eq!(task.target.target, TargetId(1));
        assert_eq!(chores.collects(), 0);
        assert_eq!(chores.accepts(), 0);
    }

    #[test]
    fn empty_provider_is_skipped_without_validity_work() {
        let mut engine = new_engine();
        let empty = Arc::new(Counters::default());
        let backup = Arc::new(Counters::default());
        counted_provider(
            &mut engine,
            "empty",
            9.0,
            "general",
            60,
            Vec::new(),
            Arc::clone(&empty),
        );
        counted_provider(
            &mut engine,
            "backup",
            1.0,
            "general",
            60,
            vec![candidate(7, 3.0)],
            Arc::clone(&backup),
        );

        let mut world = TestWorld::new();
        let task = engine.assign_task(&agent(1), &mut world).expect("task");

        assert_eq!(task.provider_id, "backup");
        // The empty provider collected (cache fill) but its accept hook
        // never ran: bucketing and validity were skipped entirely.
        assert_eq!(empty.collects(), 1);
        assert_eq!(empty.accepts(), 0);
        assert_eq!(engine.last_probe_report().metrics.providers_skipped_empty, 1);
    }

    #[test]
    fn reserved_and_unreachable_candidates_are_passed_over() {
        let mut engine = new_engine();
        let counters = Arc::new(Counters::default());
        // Bands of 100 put target 1 (d2=25) alone in bucket 0, target 2
        // (d2=2500) in overflow; bucket order is deterministic.
        counted_provider(
            &mut engine,
            "alarm",
            9.0,
            "emergency",
            60,
            vec![candidate(1, 5.0), candidate(2, 50.0)],
            Arc::clone(&counters),
        );

        let mut world = TestWorld::new();
        world.reserved.insert(TargetId(1));

        let task = engine.assign_task(&agent(1), &mut world).expect("task");
        assert_eq!(task.target.target, TargetId(2));

        // Same shape for reachability.
        let mut engine = new_engine();
        let counters = Arc::new(Counters::default());
        counted_provider(
            &mut engine,
            "alarm",
            9.0,
            "emergency",
            60,
            vec![candidate(1, 5.0), candidate(2, 50.0)],
            counters,
        );
        let mut world = TestWorld::new();
        world.unreachable.insert(TargetId(1));
        let task = engine.assign_task(&agent(1), &mut world).expect("task");
        assert_eq!(task.target.target, TargetId(2));
    }

    #[test]
    fn collect_failure_is_isolated_to_that_provider() {
        let mut engine = new_engine();
        let spec = ProviderSpec {
            provider_id: "broken".to_string(),
            priority: 9.0,
            categories: vec!["general".to_string()],
            refresh_interval: 60,
            max_candidates: 200,
        };
        engine
            .register(Box::new(FnProvider::new(
                spec,
                Box::new(|_| Err(crate::provider::ProviderError::new("scan exploded"))),
                Box::new(|_, _| Ok(true)),
                Box::new(|_, _, _| Err(crate::provider::ProviderError::new("unreachable"))),
            )))
            .unwrap();
        let backup = Arc::new(Counters::default());
        counted_provider(
            &mut engine,
            "backup",
            1.0,
            "general",
            60,
            vec![candidate(3, 2.0)],
            Arc::clone(&backup),
        );

        let mut world = TestWorld::new();
        let task = engine.assign_task(&agent(1), &mut world).expect("task");
        assert_eq!(task.provider_id, "backup");

        let report = engine.last_probe_report();
        assert_eq!(report.failures.len(), 1);
        assert_eq!(report.failures[0].provider_id, "broken");
        assert_eq!(report.failures[0].stage, ProbeStage::Collect);
    }

    #[test]
    fn build_failure_releases_the_reservation_and_probe_continues() {
        let mut engine = new_engine();
        let spec = ProviderSpec {
            provider_id: "flaky".to_string(),
            priority: 9.0,
            categories: vec!["general".to_string()],
            refresh_interval: 60,
            max_candidates: 200,
        };
        engine
            .register(Box::new(FnProvider::new(
                spec,
                Box::new(|_| Ok(vec![candidate(5, 1.0)])),
                Box::new(|_, _| Ok(true)),
                Box::new(|_, _, _| Err(crate::provider::ProviderError::new("forge jammed"))),
            )))
            .unwrap();
        let backup = Arc::new(Counters::default());
        counted_provider(
            &mut engine,
            "backup",
            1.0,
            "general",
            60,
            vec![candidate(6, 2.0)],
            Arc::clone(&backup),
        );

        let mut world = TestWorld::new();
        let task = engine.assign_task(&agent(1), &mut world).expect("task");

        assert_eq!(task.provider_id, "backup");
        // The flaky provider's reservation was rolled back; only the
        // winning target stays reserved.
        assert!(!world.reserved.contains(&TargetId(5)));
        assert!(world.reserved.contains(&TargetId(6)));

        let stages: Vec<ProbeStage> = engine
            .last_probe_report()
            .failures
            .iter()
            .map(|failure| failure.stage)
            .collect();
        assert_eq!(stages, vec![ProbeStage::Build]);
    }

    #[test]
    fn fresh_cache_skips_collect_until_the_interval_elapses() {
        let mut engine = new_engine();
        let counters = Arc::new(Counters::default());
        counted_provider(
            &mut engine,
            "alarm",
            9.0,
            "emergency",
            60,
            vec![candidate(1, 5.0), candidate(2, 50.0)],
            Arc::clone(&counters),
        );

        let mut world = TestWorld::new();
        engine.assign_task(&agent(1), &mut world).expect("tick 0");
        assert_eq!(counters.collects(), 1);

        world.now = 59;
        engine.assign_task(&agent(2), &mut world).expect("tick 59");
        assert_eq!(counters.collects(), 1);

        world.now = 61;
        engine.assign_task(&agent(3), &mut world);
        assert_eq!(counters.collects(), 2);
    }

    #[test]
    fn assigned_candidate_is_not_rechecked_from_a_stale_memo() {
        let mut engine = new_engine();
        let counters = Arc::new(Counters::default());
        counted_provider(
            &mut engine,
            "alarm",
            9.0,
            "emergency",
            60,
            vec![candidate(1, 5.0), candidate(2, 50.0)],
            Arc::clone(&counters),
        );

        let mut world = TestWorld::new();
        let first = engine.assign_task(&agent(1), &mut world).expect("first");
        assert_eq!(first.target.target, TargetId(1));

        // Same epoch: the second agent must not receive the now-reserved
        // target even though its verdict was memoized as valid.
        let second = engine.assign_task(&agent(2), &mut world).expect("second");
        assert_eq!(second.target.target, TargetId(2));
    }

    #[test]
    fn invalidate_target_forgets_memo_verdicts() {
        let mut engine = new_engine();
        let counters = Arc::new(Counters::default());
        counted_provider(
            &mut engine,
            "alarm",
            9.0,
            "emergency",
            60,
            vec![candidate(1, 5.0)],
            Arc::clone(&counters),
        );

        let mut world = TestWorld::new();
        engine.assign_task(&agent(1), &mut world).expect("task");
        engine.invalidate_target(RegionId(1), TargetId(1));

        // No verdict survives for the removed target.
        let stats = engine.cache_stats(RegionId(1));
        assert_eq!(stats.len(), 1);
        assert_eq!(stats[0].cached_candidates, 1);
    }

    #[test]
    fn reset_region_drops_caches_for_that_region_only() {
        let mut engine = new_engine();
        let counters = Arc::new(Counters::default());
        counted_provider(
            &mut engine,
            "alarm",
            9.0,
            "emergency",
            60,
            vec![candidate(1, 5.0)],
            Arc::clone(&counters),
        );

        let mut world = TestWorld::new();
        engine.assign_task(&agent(1), &mut world);
        assert_eq!(engine.cache_stats(RegionId(1))[0].cached_candidates, 1);

        engine.reset_region(RegionId(1));
        let stats = engine.cache_stats(RegionId(1));
        assert_eq!(stats[0].cached_candidates, 0);
        assert_eq!(stats[0].last_refresh_tick, None);
        assert_eq!(engine.permission_rows(RegionId(1)), 0);

        // Next assignment rebuilds from scratch.
        engine.assign_task(&agent(2), &mut world);
        assert_eq!(counters.collects(), 2);
    }

    #[test]
    fn closure_registration_spi_assigns_like_a_provider_struct() {
        let mut engine = new_engine();
        engine
            .register_provider(
                "inline",
                2.0,
                vec!["general".to_string()],
                10,
                50,
                Box::new(|_region| Ok(vec![candidate(3, 4.0)])),
                Box::new(|_, _| Ok(true)),
                Box::new(|agent, chosen, now| {
                    Ok(Task {
                        task_id: format!("task:inline:{}:{}", now, chosen.target.0),
                        provider_id: "inline".to_string(),
                        category: "general".to_string(),
                        agent_id: agent.agent_id,
                        region_id: agent.region_id,
                        target: *chosen,
                        kind: "inline".to_string(),
                        duration_ticks: 2,
                        created_tick: now,
                    })
                }),
            )
            .unwrap();

        let mut world = TestWorld::new();
        let task = engine.assign_task(&agent(1), &mut world).expect("task");
        assert_eq!(task.provider_id, "inline");
        assert_eq!(task.task_id, "task:inline:0:3");
    }

    #[test]
    fn permission_denial_skips_that_category_entirely() {
        let mut engine = new_engine();
        let alarm = Arc::new(Counters::default());
        let chores = Arc::new(Counters::default());
        counted_provider(
            &mut engine,
            "alarm",
            9.0,
            "emergency",
            60,
            vec![candidate(1, 5.0)],
            Arc::clone(&alarm),
        );
        counted_provider(
            &mut engine,
            "chores",
            1.0,
            "general",
            300,
            vec![candidate(2, 5.0)],
            Arc::clone(&chores),
        );

        let mut world = TestWorld::new();
        world
            .denied
            .insert((AgentId(1), "emergency".to_string()));

        let task = engine.assign_task(&agent(1), &mut world).expect("task");
        assert_eq!(task.provider_id, "chores");
        assert_eq!(alarm.collects(), 0);
        assert_eq!(alarm.accepts(), 0);
    }
}
