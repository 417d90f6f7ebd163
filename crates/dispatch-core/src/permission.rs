//! Capability-permission cache: per-region agent × category booleans with
//! an independent refresh cadence.
//!
//! Permission changes far less often per agent than candidate sets do, so
//! this cache refreshes on its own interval, decoupled from candidate
//! caches. A bulk refresh recomputes every agent on the faction roster;
//! agents outside the roster stay stale-but-usable until the next refresh
//! or an explicit invalidation. The resolver itself is an external
//! collaborator; this cache only avoids re-running it every tick.

use std::collections::BTreeMap;

use contracts::{AgentId, AgentState, RegionId, Tick};

use crate::cache::RegionCacheStore;

const PERMISSION_KEY: &str = "permissions";

#[derive(Debug, Clone, Default)]
pub struct RegionPermissions {
    allowed: BTreeMap<AgentId, BTreeMap<String, bool>>,
}

impl RegionPermissions {
    fn rows(&self) -> usize {
        self.allowed.values().map(BTreeMap::len).sum()
    }
}

#[derive(Debug, Clone, Default)]
pub struct PermissionCache {
    store: RegionCacheStore<RegionPermissions>,
}

impl PermissionCache {
    pub fn new() -> Self {
        Self {
            store: RegionCacheStore::new(),
        }
    }

    /// Recompute the region's permission table if its interval elapsed.
    /// Returns true when a bulk refresh actually ran.
    pub fn ensure_fresh(
        &mut self,
        region: RegionId,
        now: Tick,
        interval: Tick,
        roster: &[AgentState],
        categories: &[String],
        resolve: &mut dyn FnMut(&AgentState, &str) -> bool,
    ) -> bool {
        let stale = match self.store.last_refresh(region, PERMISSION_KEY) {
            None => true,
            Some(at) => now.saturating_sub(at) > interval,
        };
        if !stale {
            return false;
        }

        let table = self.store.get_or_create(region, PERMISSION_KEY);
        for agent in roster {
            let row = table.allowed.entry(agent.agent_id).or_default();
            for category in categories {
                row.insert(category.clone(), resolve(agent, category));
            }
        }
        self.store.set_last_refresh(region, PERMISSION_KEY, now);
        true
    }

    /// Cached permission lookup; a miss resolves on demand and is cached
    /// until the next refresh or invalidation.
    pub fn can_perform(
        &mut self,
        agent: &AgentState,
        category: &str,
        resolve: &mut dyn FnMut(&AgentState, &str) -> bool,
    ) -> bool {
        let table = self.store.get_or_create(agent.region_id, PERMISSION_KEY);
        let row = table.allowed.entry(agent.agent_id).or_default();
        if let Some(cached) = row.get(category) {
            return *cached;
        }
        let verdict = resolve(agent, category);
        row.insert(category.to_string(), verdict);
        verdict
    }

    /// Drop one agent's rows in every region (capability-affecting event).
    pub fn invalidate(&mut self, agent_id: AgentId) {
        let regions: Vec<RegionId> = self.store.regions().collect();
        for region in regions {
            if let Some(table) = self.store.get_mut(region, PERMISSION_KEY) {
                table.allowed.remove(&agent_id);
            }
        }
    }

    pub fn invalidate_all(&mut self) {
        self.store.clear_all();
    }

    pub fn clear_region(&mut self, region: RegionId) {
        self.store.clear(region);
    }

    /// Number of cached agent × category rows in one region.
    pub fn rows(&self, region: RegionId) -> usize {
        self.store
            .get(region, PERMISSION_KEY)
            .map_or(0, RegionPermissions::rows)
    }

    pub fn last_refresh(&self, region: RegionId) -> Option<Tick> {
        self.store.last_refresh(region, PERMISSION_KEY)
    }
}
