//! Provider SPI: the fixed contract every task provider implements.
//!
//! Providers are small policy objects; they share a contract, not state.
//! Soft "no candidate" outcomes are expressed through empty lists and
//! `Ok(false)`. `ProviderError` is reserved for genuine failures, which
//! the orchestrator isolates to "nothing from this provider this tick".

use std::cell::RefCell;
use std::fmt;

use contracts::{AgentState, CandidateRef, ProviderSpec, RegionId, Task, Tick};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProviderError {
    pub message: String,
}

impl ProviderError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

impl fmt::Display for ProviderError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "provider error: {}", self.message)
    }
}

impl std::error::Error for ProviderError {}

/// The capability contract of a task provider.
///
/// `collect` scans one region for candidate targets; it runs only when the
/// provider's cache interval elapses. `accept` is the provider-specific
/// part of the validity predicate; it runs after the engine's reservation
/// and reachability checks. `build` constructs the concrete task for an
/// accepted candidate.
pub trait WorkProvider: Send {
    fn spec(&self) -> &ProviderSpec;

    fn collect(&self, region: RegionId) -> Result<Vec<CandidateRef>, ProviderError>;

    fn accept(&self, agent: &AgentState, candidate: &CandidateRef)
        -> Result<bool, ProviderError>;

    fn build(
        &self,
        agent: &AgentState,
        candidate: &CandidateRef,
        now: Tick,
    ) -> Result<Task, ProviderError>;
}

// ---------------------------------------------------------------------------
// Closure adapter
// ---------------------------------------------------------------------------

pub type CollectFn = Box<dyn FnMut(RegionId) -> Result<Vec<CandidateRef>, ProviderError> + Send>;
pub type AcceptFn =
    Box<dyn FnMut(&AgentState, &CandidateRef) -> Result<bool, ProviderError> + Send>;
pub type BuildFn =
    Box<dyn FnMut(&AgentState, &CandidateRef, Tick) -> Result<Task, ProviderError> + Send>;

/// Adapts the closure-based registration SPI onto [`WorkProvider`]. The
/// hooks are `FnMut`, called through a RefCell behind the trait's `&self`
/// receivers.
pub struct FnProvider {
    spec: ProviderSpec,
    collect_fn: RefCell<CollectFn>,
    accept_fn: RefCell<AcceptFn>,
    build_fn: RefCell<BuildFn>,
}

impl FnProvider {
    pub fn new(spec: ProviderSpec, collect: CollectFn, accept: AcceptFn, build: BuildFn) -> Self {
        Self {
            spec,
            collect_fn: RefCell::new(collect),
            accept_fn: RefCell::new(accept),
            build_fn: RefCell::new(build),
        }
    }
}

impl WorkProvider for FnProvider {
    fn spec(&self) -> &ProviderSpec {
        &self.spec
    }

    fn collect(&self, region: RegionId) -> Result<Vec<CandidateRef>, ProviderError> {
        (self.collect_fn.borrow_mut())(region)
    }

    fn accept(
        &self,
        agent: &AgentState,
        candidate: &CandidateRef,
    ) -> Result<bool, ProviderError> {
        (self.accept_fn.borrow_mut())(agent, candidate)
    }

    fn build(
        &self,
        agent: &AgentState,
        candidate: &CandidateRef,
        now: Tick,
    ) -> Result<Task, ProviderError> {
        (self.build_fn.borrow_mut())(agent, candidate, now)
    }
}

impl fmt::Debug for FnProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FnProvider").field("spec", &self.spec).finish()
    }
}

/// Build a task in the shape providers usually want; kept here so closure
/// providers and tests do not each reinvent the id format.
pub fn task_for(
    spec: &ProviderSpec,
    agent: &AgentState,
    candidate: &CandidateRef,
    kind: &str,
    duration_ticks: Tick,
    now: Tick,
) -> Task {
    Task {
        task_id: format!("task:{}:{}:{}", spec.provider_id, now, candidate.target.0),
        provider_id: spec.provider_id.clone(),
        category: spec.categories.first().cloned().unwrap_or_default(),
        agent_id: agent.agent_id,
        region_id: agent.region_id,
        target: *candidate,
        kind: kind.to_string(),
        duration_ticks,
        created_tick: now,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use contracts::{AgentId, Position, TargetId};

    fn test_spec() -> ProviderSpec {
        ProviderSpec {
            provider_id: "probe".to_string(),
            priority: 2.0,
            categories: vec!["general".to_string()],
            refresh_interval: 10,
            max_candidates: 8,
        }
    }

    fn test_agent() -> AgentState {
        AgentState {
            agent_id: AgentId(1),
            region_id: contracts::RegionId(1),
            position: Position::default(),
        }
    }

    #[test]
    fn fn_provider_routes_all_three_hooks() {
        let spec = test_spec();
        let candidate = CandidateRef {
            target: TargetId(4),
            position: Position::new(1.0, 1.0),
        };
        let build_spec = spec.clone();
        let provider = FnProvider::new(
            spec,
            Box::new(move |_region| Ok(vec![candidate])),
            Box::new(|_, c| Ok(c.target.0 == 4)),
            Box::new(move |agent, c, now| Ok(task_for(&build_spec, agent, c, "probe", 3, now))),
        );

        let collected = provider.collect(contracts::RegionId(1)).unwrap();
        assert_eq!(collected.len(), 1);
        assert!(provider.accept(&test_agent(), &candidate).unwrap());

        let task = provider.build(&test_agent(), &candidate, 9).unwrap();
        assert_eq!(task.task_id, "task:probe:9:4");
        assert_eq!(task.category, "general");
        assert_eq!(task.created_tick, 9);
    }

    #[test]
    fn provider_error_displays_message() {
        let err = ProviderError::new("scan failed");
        assert_eq!(err.to_string(), "provider error: scan failed");
    }
}
