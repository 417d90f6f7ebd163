//! ColonyWorld: a deterministic host simulation that exercises the
//! assignment engine end to end. Regions, agents, and targets are
//! generated from the run seed; each tick spawns targets, completes due
//! tasks, and runs one assignment pass over every idle agent.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

mod commands;
mod init;
mod inspect;
mod providers;
mod step;

use contracts::{
    AgentId, AgentState, CandidateRef, Command, Event, EventType, Position, RegionId, RunConfig,
    RunStatus, Task, TargetId, TargetKind, TargetState, Tick,
};
use serde_json::Value;

use crate::engine::{AssignmentEngine, WorldServices};

pub use providers::{
    default_provider_specs, CATEGORY_CARE, CATEGORY_CONSTRUCTION, CATEGORY_EMERGENCY,
    CATEGORY_GROWING, CATEGORY_HAULING,
};

// ---------------------------------------------------------------------------
// Target board
// ---------------------------------------------------------------------------

/// Live targets, reservations, and the demo reachability verdicts. The
/// board is the authority the validity predicate consults; the engine only
/// ever holds weak references into it.
#[derive(Debug, Default)]
pub(crate) struct TargetBoard {
    targets: BTreeMap<TargetId, TargetState>,
    reservations: BTreeMap<TargetId, AgentId>,
    unreachable: BTreeSet<TargetId>,
}

impl TargetBoard {
    pub(crate) fn candidates_of_kind(&self, region: RegionId, kind: TargetKind) -> Vec<CandidateRef> {
        self.targets
            .values()
            .filter(|target| target.region_id == region && target.kind == kind)
            .map(|target| CandidateRef {
                target: target.target_id,
                position: target.position,
            })
            .collect()
    }

    pub(crate) fn get(&self, target: TargetId) -> Option<&TargetState> {
        self.targets.get(&target)
    }

    fn insert(&mut self, state: TargetState, unreachable: bool) {
        if unreachable {
            self.unreachable.insert(state.target_id);
        }
        self.targets.insert(state.target_id, state);
    }

    fn remove(&mut self, target: TargetId) -> Option<TargetState> {
        self.reservations.remove(&target);
        self.unreachable.remove(&target);
        self.targets.remove(&target)
    }

    fn live_in_region(&self, region: RegionId) -> usize {
        self.targets
            .values()
            .filter(|target| target.region_id == region)
            .count()
    }

    fn kind_counts(&self, region: RegionId) -> BTreeMap<&'static str, usize> {
        let mut counts = BTreeMap::new();
        for target in self.targets.values() {
            if target.region_id == region {
                *counts.entry(target.kind.label()).or_insert(0) += 1;
            }
        }
        counts
    }
}

pub(crate) type SharedBoard = Arc<Mutex<TargetBoard>>;

/// One lock serializes board access when a multi-threaded API server owns
/// the world; within a tick all access is sequential. A poisoned lock is
/// recovered, not propagated.
pub(crate) fn lock_board(board: &SharedBoard) -> MutexGuard<'_, TargetBoard> {
    board.lock().unwrap_or_else(PoisonError::into_inner)
}

// ---------------------------------------------------------------------------
// World services adapter
// ---------------------------------------------------------------------------

/// The engine's collaborator seam, backed by the board and the seeded
/// capability policies. Built fresh for each assignment pass.
struct ColonyServices<'a> {
    now: Tick,
    board: SharedBoard,
    policies: &'a BTreeMap<AgentId, BTreeSet<String>>,
    roster: &'a [AgentState],
}

impl WorldServices for ColonyServices<'_> {
    fn now(&self) -> Tick {
        self.now
    }

    fn is_reachable(&self, agent: &AgentState, candidate: &CandidateRef) -> bool {
        let board = lock_board(&self.board);
        match board.get(candidate.target) {
            Some(target) => {
                target.region_id == agent.region_id
                    && !board.unreachable.contains(&candidate.target)
            }
            None => false,
        }
    }

    fn is_reserved(&self, candidate: &CandidateRef) -> bool {
        lock_board(&self.board)
            .reservations
            .contains_key(&candidate.target)
    }

    fn reserve(&mut self, candidate: &CandidateRef, agent_id: AgentId) -> bool {
        let mut board = lock_board(&self.board);
        if board.reservations.contains_key(&candidate.target) {
            return false;
        }
        board.reservations.insert(candidate.target, agent_id);
        true
    }

    fn release(&mut self, candidate: &CandidateRef) {
        lock_board(&self.board)
            .reservations
            .remove(&candidate.target);
    }

    fn can_perform(&self, agent: &AgentState, category: &str) -> bool {
        self.policies
            .get(&agent.agent_id)
            .is_some_and(|allowed| allowed.contains(category))
    }

    fn faction_roster(&self, region: RegionId) -> Vec<AgentState> {
        self.roster
            .iter()
            .filter(|agent| agent.region_id == region)
            .copied()
            .collect()
    }
}

// ---------------------------------------------------------------------------
// World state
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
struct QueuedCommand {
    effective_tick: Tick,
    insertion_sequence: u64,
    command: Command,
}

#[derive(Debug, Clone)]
struct ActiveTask {
    task: Task,
    finish_tick: Tick,
}

#[derive(Debug, Clone)]
struct AgentRecord {
    state: AgentState,
    active: Option<ActiveTask>,
    completed_tasks: u64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StepMetrics {
    pub advanced_ticks: u64,
    pub processed_agents: u64,
    pub tasks_assigned: u64,
    pub tasks_completed: u64,
    pub agents_exhausted: u64,
}

#[derive(Debug)]
pub struct ColonyWorld {
    config: RunConfig,
    status: RunStatus,
    engine: AssignmentEngine,
    board: SharedBoard,
    agents: BTreeMap<AgentId, AgentRecord>,
    policies: BTreeMap<AgentId, BTreeSet<String>>,
    queued_commands: Vec<QueuedCommand>,
    next_command_sequence: u64,
    event_log: Vec<Event>,
    next_target_id: u64,
    assignments_total: u64,
    exhausted_total: u64,
    replay_hash: u64,
    last_step_metrics: StepMetrics,
}

impl ColonyWorld {
    #[allow(clippy::too_many_arguments)]
    pub(super) fn push_event(
        &mut self,
        tick: Tick,
        sequence_in_tick: &mut u64,
        event_type: EventType,
        region_id: Option<RegionId>,
        agent_id: Option<AgentId>,
        provider_id: Option<String>,
        target_id: Option<TargetId>,
        caused_by: Vec<String>,
        details: Option<Value>,
    ) -> String {
        let event_id = format!("evt:{tick}:{sequence_in_tick}");
        self.replay_hash = mix_replay_hash(self.replay_hash, &event_id, tick, *sequence_in_tick);
        self.event_log.push(Event {
            schema_version: contracts::SCHEMA_VERSION_V1.to_string(),
            run_id: self.status.run_id.clone(),
            tick,
            event_id: event_id.clone(),
            sequence_in_tick: *sequence_in_tick,
            event_type,
            region_id,
            agent_id,
            provider_id,
            target_id,
            caused_by,
            details,
        });
        *sequence_in_tick += 1;
        event_id
    }

    pub(super) fn spawn_target(
        &mut self,
        region: RegionId,
        kind: TargetKind,
        position: Position,
        tick: Tick,
    ) -> TargetState {
        let target_id = TargetId(self.next_target_id);
        self.next_target_id += 1;
        let unreachable = sample_range_i64(self.config.seed, 700 + target_id.0, 0, 9) == 0;
        let state = TargetState {
            target_id,
            region_id: region,
            kind,
            position,
            spawned_tick: tick,
        };
        lock_board(&self.board).insert(state, unreachable);
        state
    }
}

// ---------------------------------------------------------------------------
// Deterministic sampling
// ---------------------------------------------------------------------------

pub(crate) fn mix_seed(seed: u64, salt: u64) -> u64 {
    let mut value = seed ^ salt.wrapping_mul(0x9E37_79B9_7F4A_7C15);
    value ^= value.rotate_left(29);
    value = value.wrapping_mul(0x517C_C1B7_2722_0A95);
    value ^ (value >> 31)
}

pub(crate) fn sample_range_i64(seed: u64, stream: u64, min: i64, max: i64) -> i64 {
    if max <= min {
        return min;
    }
    let span = (max - min + 1) as u64;
    let mixed = mix_seed(seed, stream);
    min + (mixed % span) as i64
}

fn mix_replay_hash(current: u64, event_id: &str, tick: Tick, sequence: u64) -> u64 {
    let mut hash = current ^ tick.wrapping_mul(0xA24B_1C62_5B93_2D47);
    hash ^= sequence.wrapping_mul(0x9E37_79B9_7F4A_7C15);
    for byte in event_id.as_bytes() {
        hash = hash.rotate_left(7) ^ u64::from(*byte);
        hash = hash.wrapping_mul(0x517C_C1B7_2722_0A95);
    }
    hash
}

#[cfg(test)]
mod tests;
