//! Built-in providers: thin per-kind policies over the target board. Each
//! is a small struct implementing the provider contract; they share no
//! state beyond the board itself.

use contracts::{
    AgentState, CandidateRef, ProviderSpec, RegionId, Task, TargetKind, Tick,
};

use super::{lock_board, SharedBoard};
use crate::provider::{task_for, ProviderError, WorkProvider};

pub const CATEGORY_EMERGENCY: &str = "emergency";
pub const CATEGORY_CARE: &str = "care";
pub const CATEGORY_CONSTRUCTION: &str = "construction";
pub const CATEGORY_GROWING: &str = "growing";
pub const CATEGORY_HAULING: &str = "hauling";

/// The provider set used when the run configuration ships none. Priorities
/// put emergencies first and bulk hauling last; intervals follow how fast
/// each candidate population actually churns.
pub fn default_provider_specs() -> Vec<ProviderSpec> {
    vec![
        ProviderSpec {
            provider_id: "firewatch".to_string(),
            priority: 9.0,
            categories: vec![CATEGORY_EMERGENCY.to_string()],
            refresh_interval: 4,
            max_candidates: 64,
        },
        ProviderSpec {
            provider_id: "medic".to_string(),
            priority: 7.0,
            categories: vec![CATEGORY_CARE.to_string()],
            refresh_interval: 8,
            max_candidates: 64,
        },
        ProviderSpec {
            provider_id: "builder".to_string(),
            priority: 5.0,
            categories: vec![CATEGORY_CONSTRUCTION.to_string()],
            refresh_interval: 12,
            max_candidates: 128,
        },
        ProviderSpec {
            provider_id: "grower".to_string(),
            priority: 3.0,
            categories: vec![CATEGORY_GROWING.to_string()],
            refresh_interval: 16,
            max_candidates: 128,
        },
        ProviderSpec {
            provider_id: "hauler".to_string(),
            priority: 1.0,
            categories: vec![CATEGORY_HAULING.to_string()],
            refresh_interval: 24,
            max_candidates: 200,
        },
    ]
}

pub(super) fn kind_for_category(category: &str) -> Option<TargetKind> {
    match category {
        CATEGORY_EMERGENCY => Some(TargetKind::Fire),
        CATEGORY_CARE => Some(TargetKind::Patient),
        CATEGORY_CONSTRUCTION => Some(TargetKind::Blueprint),
        CATEGORY_GROWING => Some(TargetKind::UntendedField),
        CATEGORY_HAULING => Some(TargetKind::LooseItem),
        _ => None,
    }
}

pub(super) fn duration_for_kind(kind: TargetKind) -> Tick {
    match kind {
        TargetKind::Fire => 2,
        TargetKind::Patient => 4,
        TargetKind::Blueprint => 6,
        TargetKind::UntendedField => 5,
        TargetKind::LooseItem => 3,
    }
}

/// Provider that services one target kind from the shared board.
pub(super) struct BoardProvider {
    spec: ProviderSpec,
    kind: TargetKind,
    board: SharedBoard,
}

impl BoardProvider {
    pub(super) fn new(spec: ProviderSpec, kind: TargetKind, board: SharedBoard) -> Self {
        Self { spec, kind, board }
    }
}

impl WorkProvider for BoardProvider {
    fn spec(&self) -> &ProviderSpec {
        &self.spec
    }

    fn collect(&self, region: RegionId) -> Result<Vec<CandidateRef>, ProviderError> {
        Ok(lock_board(&self.board).candidates_of_kind(region, self.kind))
    }

    fn accept(
        &self,
        _agent: &AgentState,
        candidate: &CandidateRef,
    ) -> Result<bool, ProviderError> {
        // Liveness is the provider-specific acceptance here: the cached
        // reference may point at a target consumed since the last refresh.
        let board = lock_board(&self.board);
        Ok(board
            .get(candidate.target)
            .is_some_and(|target| target.kind == self.kind))
    }

    fn build(
        &self,
        agent: &AgentState,
        candidate: &CandidateRef,
        now: Tick,
    ) -> Result<Task, ProviderError> {
        let board = lock_board(&self.board);
        let target = board
            .get(candidate.target)
            .ok_or_else(|| ProviderError::new(format!("{} vanished", candidate.target)))?;
        Ok(task_for(
            &self.spec,
            agent,
            candidate,
            target.kind.label(),
            duration_for_kind(target.kind),
            now,
        ))
    }
}

impl std::fmt::Debug for BoardProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BoardProvider")
            .field("spec", &self.spec)
            .field("kind", &self.kind)
            .finish()
    }
}
