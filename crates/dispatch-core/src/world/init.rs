use super::*;

use contracts::{RunMode, SCHEMA_VERSION_V1};

use crate::engine::EngineConfig;
use crate::registry::RegistrationError;

use super::providers::{kind_for_category, BoardProvider};

const INITIAL_KINDS: [TargetKind; 4] = [
    TargetKind::Fire,
    TargetKind::LooseItem,
    TargetKind::Blueprint,
    TargetKind::Patient,
];

impl ColonyWorld {
    /// Build a world from a run configuration. Provider descriptors come
    /// from the configuration when present, otherwise the built-in set;
    /// an invalid descriptor is rejected here, never silently accepted.
    pub fn new(config: RunConfig) -> Result<Self, RegistrationError> {
        let engine_config = EngineConfig {
            seed: config.seed,
            distance_bands: config.distance_bands.clone(),
            permission_refresh_interval: config.permission_refresh_interval,
        };
        let mut engine = AssignmentEngine::new(engine_config);
        let board: SharedBoard = Arc::new(Mutex::new(TargetBoard::default()));

        let specs = if config.providers.is_empty() {
            providers::default_provider_specs()
        } else {
            config.providers.clone()
        };
        for spec in specs {
            let kind = spec
                .categories
                .first()
                .and_then(|category| kind_for_category(category))
                .unwrap_or(TargetKind::LooseItem);
            engine.register(Box::new(BoardProvider::new(spec, kind, Arc::clone(&board))))?;
        }

        let status = RunStatus {
            schema_version: SCHEMA_VERSION_V1.to_string(),
            run_id: config.run_id.clone(),
            current_tick: 0,
            max_ticks: config.max_ticks(),
            mode: RunMode::Paused,
            queue_depth: 0,
        };

        let mut world = Self {
            config,
            status,
            engine,
            board,
            agents: BTreeMap::new(),
            policies: BTreeMap::new(),
            queued_commands: Vec::new(),
            next_command_sequence: 0,
            event_log: Vec::new(),
            next_target_id: 0,
            assignments_total: 0,
            exhausted_total: 0,
            replay_hash: 0,
            last_step_metrics: StepMetrics::default(),
        };
        world.populate();
        Ok(world)
    }

    fn populate(&mut self) {
        let seed = self.config.seed;

        for region_index in 0..self.config.region_count {
            let region = RegionId(region_index);

            for slot in 0..self.config.agents_per_region {
                let agent_id = AgentId(u64::from(region_index) * 100 + u64::from(slot));
                let stream = agent_id.0;
                let position = Position::new(
                    sample_range_i64(seed, stream * 4 + 1, 0, 59) as f32,
                    sample_range_i64(seed, stream * 4 + 2, 0, 59) as f32,
                );
                let state = AgentState {
                    agent_id,
                    region_id: region,
                    position,
                };
                self.agents.insert(
                    agent_id,
                    AgentRecord {
                        state,
                        active: None,
                        completed_tasks: 0,
                    },
                );
                self.policies.insert(agent_id, generated_policy(seed, agent_id));
            }

            // A few targets so the first ticks have work on the board.
            for (slot, kind) in INITIAL_KINDS.iter().enumerate() {
                let stream = 500 + u64::from(region_index) * 16 + slot as u64;
                let position = Position::new(
                    sample_range_i64(seed, stream * 2, 0, 59) as f32,
                    sample_range_i64(seed, stream * 2 + 1, 0, 59) as f32,
                );
                self.spawn_target(region, *kind, position, 0);
            }
        }
    }
}

/// Everyone works the bulk categories; emergency and care coverage is
/// seeded per agent so regions differ in capability mix.
fn generated_policy(seed: u64, agent_id: AgentId) -> BTreeSet<String> {
    let mut allowed: BTreeSet<String> = [
        providers::CATEGORY_HAULING,
        providers::CATEGORY_CONSTRUCTION,
        providers::CATEGORY_GROWING,
    ]
    .iter()
    .map(|category| category.to_string())
    .collect();

    if sample_range_i64(seed, 300 + agent_id.0, 0, 99) < 60 {
        allowed.insert(providers::CATEGORY_EMERGENCY.to_string());
    }
    if sample_range_i64(seed, 400 + agent_id.0, 0, 99) < 35 {
        allowed.insert(providers::CATEGORY_CARE.to_string());
    }
    allowed
}
