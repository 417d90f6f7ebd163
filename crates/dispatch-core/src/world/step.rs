use super::*;

use contracts::RunMode;
use serde_json::json;

const SPAWN_KINDS: [TargetKind; 5] = [
    TargetKind::Fire,
    TargetKind::LooseItem,
    TargetKind::Blueprint,
    TargetKind::UntendedField,
    TargetKind::Patient,
];

impl ColonyWorld {
    pub fn start(&mut self) {
        if !self.status.is_complete() {
            self.status.mode = RunMode::Running;
        }
    }

    pub fn pause(&mut self) {
        self.status.mode = RunMode::Paused;
    }

    pub fn run_id(&self) -> &str {
        &self.status.run_id
    }

    pub fn config(&self) -> &RunConfig {
        &self.config
    }

    pub fn status(&self) -> &RunStatus {
        &self.status
    }

    pub fn events(&self) -> &[Event] {
        &self.event_log
    }

    pub fn replay_hash(&self) -> u64 {
        self.replay_hash
    }

    pub fn last_step_metrics(&self) -> StepMetrics {
        self.last_step_metrics
    }

    pub fn assignments_total(&self) -> u64 {
        self.assignments_total
    }

    pub fn enqueue_command(&mut self, command: Command, effective_tick: Tick) {
        self.queued_commands.push(QueuedCommand {
            effective_tick,
            insertion_sequence: self.next_command_sequence,
            command,
        });
        self.next_command_sequence = self.next_command_sequence.saturating_add(1);
        self.sync_queue_depth();
    }

    pub fn inject_command(&mut self, command: Command) {
        let effective_tick = self.status.current_tick + 1;
        self.enqueue_command(command, effective_tick);
    }

    /// Advance one tick: due commands, target spawning, task completion,
    /// then one assignment pass over every idle agent in id order.
    pub fn step(&mut self) -> bool {
        self.last_step_metrics = StepMetrics::default();
        if self.status.is_complete() {
            self.status.mode = RunMode::Paused;
            return false;
        }
        self.status.mode = RunMode::Running;
        let tick = self.status.current_tick.saturating_add(1);
        if tick > self.status.max_ticks {
            self.status.mode = RunMode::Paused;
            return false;
        }
        self.status.current_tick = tick;
        let mut sequence_in_tick = 0_u64;

        self.process_due_commands(tick, &mut sequence_in_tick);
        self.spawn_due_targets(tick, &mut sequence_in_tick);
        let tasks_completed = self.complete_due_tasks(tick, &mut sequence_in_tick);
        let (processed_agents, tasks_assigned, agents_exhausted) =
            self.run_assignment_pass(tick, &mut sequence_in_tick);

        self.last_step_metrics = StepMetrics {
            advanced_ticks: 1,
            processed_agents,
            tasks_assigned,
            tasks_completed,
            agents_exhausted,
        };

        if self.status.current_tick >= self.status.max_ticks {
            self.status.mode = RunMode::Paused;
        }
        self.sync_queue_depth();
        true
    }

    pub fn step_n(&mut self, n: u64) -> u64 {
        let mut committed = 0_u64;
        for _ in 0..n {
            if !self.step() {
                break;
            }
            committed += 1;
        }
        committed
    }

    pub fn run_to_tick(&mut self, tick: Tick) -> u64 {
        let mut committed = 0_u64;
        while self.status.current_tick < tick {
            if !self.step() {
                break;
            }
            committed += 1;
        }
        committed
    }

    pub(super) fn sync_queue_depth(&mut self) {
        self.status.queue_depth = self.queued_commands.len();
    }

    fn spawn_due_targets(&mut self, tick: Tick, sequence_in_tick: &mut u64) {
        let period = self.config.target_spawn_period;
        if period == 0 || tick % period != 0 {
            return;
        }
        for region_index in 0..self.config.region_count {
            let region = RegionId(region_index);
            let roll = mix_seed(self.config.seed, tick * 31 + u64::from(region_index));
            let kind = SPAWN_KINDS[(roll % SPAWN_KINDS.len() as u64) as usize];
            let stream = tick * 97 + u64::from(region_index) * 7;
            let position = Position::new(
                sample_range_i64(self.config.seed, stream, 0, 59) as f32,
                sample_range_i64(self.config.seed, stream + 1, 0, 59) as f32,
            );
            let state = self.spawn_target(region, kind, position, tick);
            self.push_event(
                tick,
                sequence_in_tick,
                EventType::TargetSpawned,
                Some(region),
                None,
                None,
                Some(state.target_id),
                Vec::new(),
                Some(json!({
                    "kind": state.kind.label(),
                    "x": state.position.x,
                    "y": state.position.y,
                })),
            );
        }
    }

    fn complete_due_tasks(&mut self, tick: Tick, sequence_in_tick: &mut u64) -> u64 {
        let due: Vec<AgentId> = self
            .agents
            .iter()
            .filter_map(|(agent_id, record)| {
                record
                    .active
                    .as_ref()
                    .filter(|active| active.finish_tick <= tick)
                    .map(|_| *agent_id)
            })
            .collect();

        let mut completed = 0_u64;
        for agent_id in due {
            let Some(active) = self
                .agents
                .get_mut(&agent_id)
                .and_then(|record| record.active.take())
            else {
                continue;
            };
            let task = active.task;
            let consumed = lock_board(&self.board).remove(task.target.target).is_some();
            self.engine
                .invalidate_target(task.region_id, task.target.target);
            if let Some(record) = self.agents.get_mut(&agent_id) {
                record.completed_tasks += 1;
            }
            self.push_event(
                tick,
                sequence_in_tick,
                EventType::TaskCompleted,
                Some(task.region_id),
                Some(agent_id),
                Some(task.provider_id.clone()),
                Some(task.target.target),
                Vec::new(),
                Some(json!({
                    "task_id": task.task_id,
                    "kind": task.kind,
                    "target_consumed": consumed,
                })),
            );
            completed += 1;
        }
        completed
    }

    fn run_assignment_pass(
        &mut self,
        tick: Tick,
        sequence_in_tick: &mut u64,
    ) -> (u64, u64, u64) {
        let roster: Vec<AgentState> = self.agents.values().map(|record| record.state).collect();
        let idle: Vec<AgentId> = self
            .agents
            .iter()
            .filter(|(_, record)| record.active.is_none())
            .map(|(agent_id, _)| *agent_id)
            .collect();

        let mut tasks_assigned = 0_u64;
        let mut agents_exhausted = 0_u64;
        let processed_agents = idle.len() as u64;

        for agent_id in idle {
            let state = self.agents[&agent_id].state;
            let assigned = {
                let mut services = ColonyServices {
                    now: tick,
                    board: Arc::clone(&self.board),
                    policies: &self.policies,
                    roster: &roster,
                };
                self.engine.assign_task(&state, &mut services)
            };
            self.emit_probe_events(tick, sequence_in_tick, &state);

            match assigned {
                Some(task) => {
                    let duration = task.duration_ticks.max(1);
                    self.push_event(
                        tick,
                        sequence_in_tick,
                        EventType::TaskAssigned,
                        Some(task.region_id),
                        Some(agent_id),
                        Some(task.provider_id.clone()),
                        Some(task.target.target),
                        Vec::new(),
                        Some(json!({
                            "task_id": task.task_id,
                            "category": task.category,
                            "kind": task.kind,
                            "duration_ticks": duration,
                        })),
                    );
                    if let Some(record) = self.agents.get_mut(&agent_id) {
                        record.active = Some(ActiveTask {
                            finish_tick: tick + duration,
                            task,
                        });
                    }
                    self.assignments_total += 1;
                    tasks_assigned += 1;
                }
                None => {
                    self.push_event(
                        tick,
                        sequence_in_tick,
                        EventType::AssignmentExhausted,
                        Some(state.region_id),
                        Some(agent_id),
                        None,
                        None,
                        Vec::new(),
                        None,
                    );
                    self.exhausted_total += 1;
                    agents_exhausted += 1;
                }
            }
        }

        (processed_agents, tasks_assigned, agents_exhausted)
    }

    fn emit_probe_events(&mut self, tick: Tick, sequence_in_tick: &mut u64, agent: &AgentState) {
        let report = self.engine.last_probe_report().clone();

        for note in &report.refreshed {
            self.push_event(
                tick,
                sequence_in_tick,
                EventType::CandidateCacheRefreshed,
                Some(agent.region_id),
                None,
                Some(note.provider_id.clone()),
                None,
                Vec::new(),
                Some(json!({ "collected": note.collected, "kept": note.kept })),
            );
        }
        for failure in &report.failures {
            self.push_event(
                tick,
                sequence_in_tick,
                EventType::ProviderProbeFailed,
                Some(agent.region_id),
                Some(agent.agent_id),
                Some(failure.provider_id.clone()),
                None,
                Vec::new(),
                Some(json!({
                    "stage": failure.stage.label(),
                    "message": failure.message,
                })),
            );
        }
        if report.permission_refreshed {
            self.push_event(
                tick,
                sequence_in_tick,
                EventType::PermissionCacheRefreshed,
                Some(agent.region_id),
                None,
                None,
                None,
                Vec::new(),
                None,
            );
        }
    }

}
