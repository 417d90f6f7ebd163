//! In-process API facade with command validation, deterministic queueing,
//! and SQLite run persistence.

mod persistence;
mod server;

use std::path::Path;

use contracts::{
    ApiError, Command, CommandPayload, CommandResult, CommandType, ErrorCode, Event, RunConfig,
    RunStatus, Snapshot, SCHEMA_VERSION_V1,
};
use dispatch_core::world::ColonyWorld;
use dispatch_core::RegistrationError;
use persistence::SqliteRunStore;
pub use persistence::{PersistedCommandEntry, PersistedRunSummary, PersistenceError};
pub use server::{serve, ServerError};

#[derive(Debug)]
struct PersistenceState {
    store: SqliteRunStore,
    persisted_command_count: usize,
    persisted_event_count: usize,
    last_snapshot_tick: Option<u64>,
}

#[derive(Debug)]
pub struct EngineApi {
    world: ColonyWorld,
    command_audit: Vec<CommandResult>,
    command_log: Vec<PersistedCommandEntry>,
    persistence: Option<PersistenceState>,
    last_persistence_error: Option<String>,
}

impl EngineApi {
    /// Build the world from a run configuration. Invalid provider
    /// descriptors are rejected here with the registration error.
    pub fn from_config(config: RunConfig) -> Result<Self, RegistrationError> {
        Ok(Self {
            world: ColonyWorld::new(config)?,
            command_audit: Vec::new(),
            command_log: Vec::new(),
            persistence: None,
            last_persistence_error: None,
        })
    }

    pub fn attach_sqlite_store(&mut self, path: impl AsRef<Path>) -> Result<(), PersistenceError> {
        let store = SqliteRunStore::open(path)?;
        self.persistence = Some(PersistenceState {
            store,
            persisted_command_count: 0,
            persisted_event_count: 0,
            last_snapshot_tick: None,
        });
        Ok(())
    }

    pub fn initialize_run_storage(
        &mut self,
        replace_existing_run: bool,
    ) -> Result<(), PersistenceError> {
        let bootstrap_snapshot = self.world.snapshot();
        let config = self.world.config().clone();
        let status = self.world.status().clone();
        let run_id = status.run_id.clone();

        let Some(state) = self.persistence.as_mut() else {
            return Err(PersistenceError::NotAttached);
        };
        if state.store.run_exists(&run_id)? {
            if replace_existing_run {
                state.store.delete_run(&run_id)?;
                state.persisted_command_count = 0;
                state.persisted_event_count = 0;
                state.last_snapshot_tick = None;
            } else {
                return Err(PersistenceError::RunAlreadyExists(run_id));
            }
        }

        state
            .store
            .persist_delta(&config, &status, &[], &[], Some(&bootstrap_snapshot))?;
        state.last_snapshot_tick = Some(bootstrap_snapshot.tick);
        self.last_persistence_error = None;
        Ok(())
    }

    // --- Run control ---

    pub fn start(&mut self) -> RunStatus {
        self.world.start();
        self.flush_persistence();
        self.status()
    }

    pub fn pause(&mut self) -> RunStatus {
        self.world.pause();
        self.flush_persistence();
        self.status()
    }

    pub fn step(&mut self, steps: u64) -> (RunStatus, u64) {
        let committed = self.world.step_n(steps.max(1));
        self.flush_persistence();
        (self.status(), committed)
    }

    pub fn run_to_tick(&mut self, tick: u64) -> (RunStatus, u64) {
        let committed = self.world.run_to_tick(tick);
        self.flush_persistence();
        (self.status(), committed)
    }

    // --- Commands ---

    /// Validate and queue a command for the next tick. Rejections carry a
    /// descriptive error; nothing is ever silently accepted.
    pub fn submit_command(&mut self, command: Command) -> CommandResult {
        if command.schema_version != SCHEMA_VERSION_V1 {
            return self.reject(
                command,
                ApiError::new(
                    ErrorCode::InvalidCommand,
                    "unsupported command schema version",
                    None,
                ),
            );
        }
        if command.run_id != self.world.run_id() {
            let details = format!(
                "command run_id={} active run_id={}",
                command.run_id,
                self.world.run_id()
            );
            return self.reject(
                command,
                ApiError::new(
                    ErrorCode::RunNotFound,
                    "command run_id does not match the active run",
                    Some(details),
                ),
            );
        }
        if !payload_matches(command.command_type, &command.payload) {
            return self.reject(
                command,
                ApiError::new(
                    ErrorCode::InvalidCommand,
                    "command payload does not match command_type",
                    None,
                ),
            );
        }

        let effective_tick = self.world.status().current_tick + 1;
        self.world.enqueue_command(command.clone(), effective_tick);
        let result = CommandResult::accepted(&command);
        self.command_log.push(PersistedCommandEntry {
            command,
            result: result.clone(),
            effective_tick,
        });
        self.command_audit.push(result.clone());
        self.flush_persistence();
        result
    }

    fn reject(&mut self, command: Command, error: ApiError) -> CommandResult {
        let result = CommandResult::rejected(&command, error);
        self.command_audit.push(result.clone());
        result
    }

    pub fn command_audit(&self) -> &[CommandResult] {
        &self.command_audit
    }

    // --- Inspection ---

    pub fn run_id(&self) -> &str {
        self.world.run_id()
    }

    pub fn config(&self) -> &RunConfig {
        self.world.config()
    }

    pub fn status(&self) -> RunStatus {
        self.world.status().clone()
    }

    pub fn events(&self) -> &[Event] {
        self.world.events()
    }

    pub fn snapshot_for_current_tick(&self) -> Snapshot {
        self.world.snapshot()
    }

    pub fn inspect_region(&self, region_id: u32) -> Option<serde_json::Value> {
        self.world.inspect_region(contracts::RegionId(region_id))
    }

    pub fn inspect_agent(&self, agent_id: u64) -> Option<serde_json::Value> {
        self.world.inspect_agent(contracts::AgentId(agent_id))
    }

    pub fn last_persistence_error(&self) -> Option<&str> {
        self.last_persistence_error.as_deref()
    }

    pub fn persisted_runs(&self) -> Result<Vec<PersistedRunSummary>, PersistenceError> {
        match self.persistence.as_ref() {
            Some(state) => state.store.list_runs(),
            None => Err(PersistenceError::NotAttached),
        }
    }

    // --- Persistence ---

    pub fn flush_persistence_checked(&mut self) -> Result<(), PersistenceError> {
        if self.persistence.is_none() {
            return Err(PersistenceError::NotAttached);
        }
        self.flush_inner()
    }

    /// Best-effort flush: failures are remembered and surfaced through
    /// `last_persistence_error`, never propagated into run control.
    fn flush_persistence(&mut self) {
        if self.persistence.is_none() {
            return;
        }
        if let Err(error) = self.flush_inner() {
            tracing::warn!("persistence flush failed: {error}");
            self.last_persistence_error = Some(error.to_string());
        }
    }

    fn flush_inner(&mut self) -> Result<(), PersistenceError> {
        let config = self.world.config().clone();
        let status = self.world.status().clone();
        let cadence = config.snapshot_every_ticks.max(1);

        let Some(state) = self.persistence.as_mut() else {
            return Ok(());
        };

        let new_commands = self.command_log[state.persisted_command_count..].to_vec();
        let new_events = self.world.events()[state.persisted_event_count..].to_vec();

        let snapshot_due = status.current_tick > 0
            && (status.current_tick % cadence == 0 || status.is_complete())
            && state.last_snapshot_tick != Some(status.current_tick);
        let snapshot = snapshot_due.then(|| self.world.snapshot());

        state.store.persist_delta(
            &config,
            &status,
            &new_commands,
            &new_events,
            snapshot.as_ref(),
        )?;
        state.persisted_command_count += new_commands.len();
        state.persisted_event_count += new_events.len();
        if let Some(snapshot) = snapshot {
            state.last_snapshot_tick = Some(snapshot.tick);
        }
        self.last_persistence_error = None;
        Ok(())
    }
}

fn payload_matches(command_type: CommandType, payload: &CommandPayload) -> bool {
    matches!(
        (command_type, payload),
        (CommandType::SimStart, CommandPayload::SimStart)
            | (CommandType::SimPause, CommandPayload::SimPause)
            | (
                CommandType::SetCategoryAllowed,
                CommandPayload::SetCategoryAllowed { .. }
            )
            | (CommandType::ResetRegion, CommandPayload::ResetRegion { .. })
            | (CommandType::ResetAllCaches, CommandPayload::ResetAllCaches)
            | (CommandType::SpawnTarget, CommandPayload::SpawnTarget { .. })
            | (CommandType::RemoveTarget, CommandPayload::RemoveTarget { .. })
    )
}
