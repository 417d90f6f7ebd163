use super::*;

use contracts::{RegionSnapshot, Snapshot, SCHEMA_VERSION_V1};
use serde_json::json;

impl ColonyWorld {
    pub fn inspect_region(&self, region: RegionId) -> Option<Value> {
        if region.0 >= self.config.region_count {
            return None;
        }
        let board = lock_board(&self.board);
        let (idle, busy) = self.agent_counts(region);
        Some(json!({
            "region_id": region.0,
            "live_targets": board.live_in_region(region),
            "targets_by_kind": board.kind_counts(region),
            "idle_agents": idle,
            "busy_agents": busy,
            "provider_caches": self.engine.cache_stats(region),
            "permission_rows": self.engine.permission_rows(region),
        }))
    }

    pub fn inspect_agent(&self, agent_id: AgentId) -> Option<Value> {
        self.agents.get(&agent_id).map(|record| {
            let active = record.active.as_ref().map(|active| {
                json!({
                    "task_id": active.task.task_id,
                    "provider_id": active.task.provider_id,
                    "kind": active.task.kind,
                    "target_id": active.task.target.target.0,
                    "finish_tick": active.finish_tick,
                })
            });
            json!({
                "agent_id": agent_id.0,
                "region_id": record.state.region_id.0,
                "position": { "x": record.state.position.x, "y": record.state.position.y },
                "allowed_categories": self.policies.get(&agent_id),
                "active_task": active,
                "completed_tasks": record.completed_tasks,
            })
        })
    }

    pub fn snapshot(&self) -> Snapshot {
        let board = lock_board(&self.board);
        let regions = (0..self.config.region_count)
            .map(|region_index| {
                let region = RegionId(region_index);
                let (idle_agents, busy_agents) = self.agent_counts(region);
                RegionSnapshot {
                    region_id: region,
                    live_targets: board.live_in_region(region),
                    idle_agents,
                    busy_agents,
                    provider_caches: self.engine.cache_stats(region),
                    permission_rows: self.engine.permission_rows(region),
                }
            })
            .collect();

        Snapshot {
            schema_version: SCHEMA_VERSION_V1.to_string(),
            run_id: self.status.run_id.clone(),
            tick: self.status.current_tick,
            mode: self.status.mode,
            regions,
            assignments_total: self.assignments_total,
            exhausted_total: self.exhausted_total,
            replay_hash: self.replay_hash,
        }
    }

    fn agent_counts(&self, region: RegionId) -> (usize, usize) {
        let mut idle = 0;
        let mut busy = 0;
        for record in self.agents.values() {
            if record.state.region_id != region {
                continue;
            }
            if record.active.is_some() {
                busy += 1;
            } else {
                idle += 1;
            }
        }
        (idle, busy)
    }
}
