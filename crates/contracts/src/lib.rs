//! v1 cross-boundary contracts for the dispatch engine, API, persistence, and CLI.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

mod serde_u64_string;

pub const SCHEMA_VERSION_V1: &str = "1.0";
pub const TICKS_PER_DAY: u64 = 24;

/// The simulation's discrete time unit. All refresh intervals and
/// staleness checks are expressed in ticks.
pub type Tick = u64;

// ---------------------------------------------------------------------------
// Identifiers
// ---------------------------------------------------------------------------

/// Stable id of an isolated world partition. Caches are always scoped by
/// region id; no cache entry is ever shared across regions.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default,
)]
#[serde(transparent)]
pub struct RegionId(pub u32);

impl fmt::Display for RegionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "region:{}", self.0)
    }
}

/// Stable id of an agent, unique within a region.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default,
)]
#[serde(transparent)]
pub struct AgentId(pub u64);

impl fmt::Display for AgentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "agent:{}", self.0)
    }
}

/// Stable id of a world entity that may become the object of a task.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default,
)]
#[serde(transparent)]
pub struct TargetId(pub u64);

impl fmt::Display for TargetId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "target:{}", self.0)
    }
}

// ---------------------------------------------------------------------------
// World geometry
// ---------------------------------------------------------------------------

/// Planar position inside a region.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, Default)]
pub struct Position {
    pub x: f32,
    pub y: f32,
}

impl Position {
    pub fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }

    /// Squared planar distance. Distance bands are expressed in squared
    /// units so no square root is taken on the assignment path.
    pub fn distance_squared(&self, other: &Position) -> f32 {
        let dx = self.x - other.x;
        let dy = self.y - other.y;
        dx * dx + dy * dy
    }
}

/// Weak reference to a candidate target. The engine caches these and must
/// always re-validate liveness before use; the validity predicate is the
/// sole authority on whether the reference still denotes a usable entity.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CandidateRef {
    pub target: TargetId,
    pub position: Position,
}

/// The engine's view of an agent at assignment time.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AgentState {
    pub agent_id: AgentId,
    pub region_id: RegionId,
    pub position: Position,
}

// ---------------------------------------------------------------------------
// Targets
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum TargetKind {
    Fire,
    Patient,
    Blueprint,
    UntendedField,
    LooseItem,
}

impl TargetKind {
    pub fn label(&self) -> &'static str {
        match self {
            TargetKind::Fire => "fire",
            TargetKind::Patient => "patient",
            TargetKind::Blueprint => "blueprint",
            TargetKind::UntendedField => "untended_field",
            TargetKind::LooseItem => "loose_item",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TargetState {
    pub target_id: TargetId,
    pub region_id: RegionId,
    pub kind: TargetKind,
    pub position: Position,
    pub spawned_tick: Tick,
}

// ---------------------------------------------------------------------------
// Provider descriptors and tasks
// ---------------------------------------------------------------------------

/// Registration descriptor for a task provider. Priorities are floats;
/// ties between equal priorities are broken by registration order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProviderSpec {
    pub provider_id: String,
    pub priority: f32,
    pub categories: Vec<String>,
    /// Candidate cache refresh interval in ticks.
    pub refresh_interval: Tick,
    /// Hard cap on the cached candidate list (first-N truncation).
    pub max_candidates: usize,
}

/// A concrete task handed to an agent. Built by the winning provider;
/// the engine itself never constructs one.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    pub task_id: String,
    pub provider_id: String,
    pub category: String,
    pub agent_id: AgentId,
    pub region_id: RegionId,
    pub target: CandidateRef,
    pub kind: String,
    pub duration_ticks: Tick,
    pub created_tick: Tick,
}

// ---------------------------------------------------------------------------
// Run configuration and status
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RunConfig {
    pub schema_version: String,
    pub run_id: String,
    #[serde(with = "serde_u64_string")]
    pub seed: u64,
    pub duration_days: u32,
    pub region_count: u32,
    pub agents_per_region: u32,
    pub snapshot_every_ticks: Tick,
    /// Ascending squared-distance cut points for candidate bucketing.
    pub distance_bands: Vec<f32>,
    /// Refresh interval of the capability-permission cache, decoupled
    /// from candidate cache intervals.
    pub permission_refresh_interval: Tick,
    /// How often the demo world spawns a new target per region.
    pub target_spawn_period: Tick,
    /// Provider descriptors loaded from external configuration and handed
    /// to the registry at startup. Empty means "use the built-in set".
    #[serde(default)]
    pub providers: Vec<ProviderSpec>,
    pub notes: Option<String>,
}

impl RunConfig {
    pub fn max_ticks(&self) -> Tick {
        u64::from(self.duration_days) * TICKS_PER_DAY
    }
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            schema_version: SCHEMA_VERSION_V1.to_string(),
            run_id: "run_local_001".to_string(),
            seed: 1337,
            duration_days: 30,
            region_count: 2,
            agents_per_region: 6,
            snapshot_every_ticks: TICKS_PER_DAY,
            distance_bands: vec![100.0, 400.0, 1600.0],
            permission_refresh_interval: 12,
            target_spawn_period: 3,
            providers: Vec::new(),
            notes: None,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum RunMode {
    Running,
    Paused,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RunStatus {
    pub schema_version: String,
    pub run_id: String,
    pub current_tick: Tick,
    pub max_ticks: Tick,
    pub mode: RunMode,
    pub queue_depth: usize,
}

impl RunStatus {
    pub fn is_complete(&self) -> bool {
        self.current_tick >= self.max_ticks
    }
}

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "run_id={} tick={}/{} mode={:?} queue_depth={}",
            self.run_id, self.current_tick, self.max_ticks, self.mode, self.queue_depth
        )
    }
}

// ---------------------------------------------------------------------------
// Commands
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum CommandType {
    SimStart,
    SimPause,
    SetCategoryAllowed,
    ResetRegion,
    ResetAllCaches,
    SpawnTarget,
    RemoveTarget,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum CommandPayload {
    SimStart,
    SimPause,
    /// Toggle one capability category for one agent. The permission cache
    /// is invalidated for that agent immediately.
    SetCategoryAllowed {
        agent_id: AgentId,
        category: String,
        allowed: bool,
    },
    /// Drop every cache scoped to one region (teardown or reload hook).
    ResetRegion { region_id: RegionId },
    /// Drop every cache in the engine (full reload hook).
    ResetAllCaches,
    SpawnTarget {
        region_id: RegionId,
        kind: TargetKind,
        x: f32,
        y: f32,
    },
    RemoveTarget { target_id: TargetId },
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Command {
    pub schema_version: String,
    pub command_id: String,
    pub run_id: String,
    pub issued_at_tick: Tick,
    pub command_type: CommandType,
    pub payload: CommandPayload,
}

impl Command {
    pub fn new(
        command_id: impl Into<String>,
        run_id: impl Into<String>,
        issued_at_tick: Tick,
        command_type: CommandType,
        payload: CommandPayload,
    ) -> Self {
        Self {
            schema_version: SCHEMA_VERSION_V1.to_string(),
            command_id: command_id.into(),
            run_id: run_id.into(),
            issued_at_tick,
            command_type,
            payload,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CommandResult {
    pub schema_version: String,
    pub command_id: String,
    pub run_id: String,
    pub accepted: bool,
    pub error: Option<ApiError>,
}

impl CommandResult {
    pub fn accepted(command: &Command) -> Self {
        Self {
            schema_version: SCHEMA_VERSION_V1.to_string(),
            command_id: command.command_id.clone(),
            run_id: command.run_id.clone(),
            accepted: true,
            error: None,
        }
    }

    pub fn rejected(command: &Command, error: ApiError) -> Self {
        Self {
            schema_version: SCHEMA_VERSION_V1.to_string(),
            command_id: command.command_id.clone(),
            run_id: command.run_id.clone(),
            accepted: false,
            error: Some(error),
        }
    }
}

// ---------------------------------------------------------------------------
// API error envelope
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCode {
    RunNotFound,
    InvalidCommand,
    InvalidQuery,
    TickOutOfRange,
    RunStateConflict,
    InternalError,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ApiError {
    pub schema_version: String,
    pub error_code: ErrorCode,
    pub message: String,
    pub details: Option<String>,
}

impl ApiError {
    pub fn new(error_code: ErrorCode, message: impl Into<String>, details: Option<String>) -> Self {
        Self {
            schema_version: SCHEMA_VERSION_V1.to_string(),
            error_code,
            message: message.into(),
            details,
        }
    }
}

// ---------------------------------------------------------------------------
// Events
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum EventType {
    TaskAssigned,
    TaskCompleted,
    AssignmentExhausted,
    CandidateCacheRefreshed,
    ProviderProbeFailed,
    PermissionCacheRefreshed,
    PermissionInvalidated,
    CategoryToggled,
    TargetSpawned,
    TargetRemoved,
    RegionCachesCleared,
    AllCachesCleared,
    CommandApplied,
}

/// One entry in the world's append-only event log. `sequence_in_tick`
/// orders events emitted within the same tick.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Event {
    pub schema_version: String,
    pub run_id: String,
    pub tick: Tick,
    pub event_id: String,
    pub sequence_in_tick: u64,
    pub event_type: EventType,
    pub region_id: Option<RegionId>,
    pub agent_id: Option<AgentId>,
    pub provider_id: Option<String>,
    pub target_id: Option<TargetId>,
    #[serde(default)]
    pub caused_by: Vec<String>,
    pub details: Option<Value>,
}

/// Paginated slice of the event log.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EventPage {
    pub schema_version: String,
    pub events: Vec<Event>,
    pub total: usize,
    pub next_cursor: Option<usize>,
}

// ---------------------------------------------------------------------------
// Snapshots
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ProviderCacheStat {
    pub provider_id: String,
    pub cached_candidates: usize,
    pub has_candidates: bool,
    pub last_refresh_tick: Option<Tick>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RegionSnapshot {
    pub region_id: RegionId,
    pub live_targets: usize,
    pub idle_agents: usize,
    pub busy_agents: usize,
    pub provider_caches: Vec<ProviderCacheStat>,
    pub permission_rows: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Snapshot {
    pub schema_version: String,
    pub run_id: String,
    pub tick: Tick,
    pub mode: RunMode,
    pub regions: Vec<RegionSnapshot>,
    pub assignments_total: u64,
    pub exhausted_total: u64,
    #[serde(with = "serde_u64_string")]
    pub replay_hash: u64,
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
