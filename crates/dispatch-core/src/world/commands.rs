use super::*;

use contracts::CommandPayload;
use serde_json::json;

impl ColonyWorld {
    pub(super) fn process_due_commands(&mut self, tick: Tick, sequence_in_tick: &mut u64) {
        self.queued_commands.sort_by(|a, b| {
            a.effective_tick
                .cmp(&b.effective_tick)
                .then(a.insertion_sequence.cmp(&b.insertion_sequence))
        });

        let mut future = Vec::new();
        let mut due = Vec::new();
        for queued in self.queued_commands.drain(..) {
            if queued.effective_tick <= tick {
                due.push(queued);
            } else {
                future.push(queued);
            }
        }
        self.queued_commands = future;
        self.sync_queue_depth();

        for queued in due {
            self.apply_command(queued.command, tick, sequence_in_tick);
        }
    }

    pub(super) fn apply_command(
        &mut self,
        command: Command,
        tick: Tick,
        sequence_in_tick: &mut u64,
    ) {
        let command_ref = format!("cmd:{}", command.command_id);
        match &command.payload {
            CommandPayload::SimStart => self.start(),
            CommandPayload::SimPause => self.pause(),
            CommandPayload::SetCategoryAllowed {
                agent_id,
                category,
                allowed,
            } => {
                let policy = self.policies.entry(*agent_id).or_default();
                if *allowed {
                    policy.insert(category.clone());
                } else {
                    policy.remove(category);
                }
                self.engine.invalidate_permission(*agent_id);

                let region = self.agents.get(agent_id).map(|record| record.state.region_id);
                let toggled = self.push_event(
                    tick,
                    sequence_in_tick,
                    EventType::CategoryToggled,
                    region,
                    Some(*agent_id),
                    None,
                    None,
                    vec![command_ref.clone()],
                    Some(json!({ "category": category, "allowed": allowed })),
                );
                self.push_event(
                    tick,
                    sequence_in_tick,
                    EventType::PermissionInvalidated,
                    region,
                    Some(*agent_id),
                    None,
                    None,
                    vec![toggled],
                    None,
                );
            }
            CommandPayload::ResetRegion { region_id } => {
                self.engine.reset_region(*region_id);
                self.push_event(
                    tick,
                    sequence_in_tick,
                    EventType::RegionCachesCleared,
                    Some(*region_id),
                    None,
                    None,
                    None,
                    vec![command_ref.clone()],
                    None,
                );
            }
            CommandPayload::ResetAllCaches => {
                self.engine.reset_all();
                self.push_event(
                    tick,
                    sequence_in_tick,
                    EventType::AllCachesCleared,
                    None,
                    None,
                    None,
                    None,
                    vec![command_ref.clone()],
                    None,
                );
            }
            CommandPayload::SpawnTarget {
                region_id,
                kind,
                x,
                y,
            } => {
                let state =
                    self.spawn_target(*region_id, *kind, Position::new(*x, *y), tick);
                self.push_event(
                    tick,
                    sequence_in_tick,
                    EventType::TargetSpawned,
                    Some(*region_id),
                    None,
                    None,
                    Some(state.target_id),
                    vec![command_ref.clone()],
                    Some(json!({ "kind": state.kind.label(), "x": x, "y": y })),
                );
            }
            CommandPayload::RemoveTarget { target_id } => {
                let removed = lock_board(&self.board).remove(*target_id);
                if let Some(state) = removed {
                    self.engine.invalidate_target(state.region_id, *target_id);
                    self.push_event(
                        tick,
                        sequence_in_tick,
                        EventType::TargetRemoved,
                        Some(state.region_id),
                        None,
                        None,
                        Some(*target_id),
                        vec![command_ref.clone()],
                        Some(json!({ "kind": state.kind.label() })),
                    );
                }
            }
        }

        self.push_event(
            tick,
            sequence_in_tick,
            EventType::CommandApplied,
            None,
            None,
            None,
            None,
            vec![command_ref],
            Some(json!({ "command_type": command.command_type })),
        );
    }
}
