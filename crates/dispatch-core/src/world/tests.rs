use super::*;

use contracts::{CommandPayload, CommandType, RunMode};

fn small_config() -> RunConfig {
    let mut config = RunConfig::default();
    config.run_id = "run_test".to_string();
    config.seed = 2024;
    config.duration_days = 2;
    config.region_count = 2;
    config.agents_per_region = 4;
    config.target_spawn_period = 2;
    config
}

fn command(
    id: &str,
    world: &ColonyWorld,
    command_type: CommandType,
    payload: CommandPayload,
) -> Command {
    Command::new(
        id,
        world.run_id().to_string(),
        world.status().current_tick,
        command_type,
        payload,
    )
}

#[test]
fn world_assigns_and_completes_tasks() {
    let mut world = ColonyWorld::new(small_config()).expect("world");
    world.start();
    world.run_to_tick(24);

    assert!(world.assignments_total() > 0, "no tasks were ever assigned");
    assert!(world
        .events()
        .iter()
        .any(|event| event.event_type == EventType::TaskAssigned));
    assert!(world
        .events()
        .iter()
        .any(|event| event.event_type == EventType::TaskCompleted));
    assert!(world
        .events()
        .iter()
        .any(|event| event.event_type == EventType::CandidateCacheRefreshed));
}

#[test]
fn same_seed_replays_identically() {
    let mut first = ColonyWorld::new(small_config()).expect("world");
    let mut second = ColonyWorld::new(small_config()).expect("world");
    first.step_n(30);
    second.step_n(30);

    assert_eq!(first.replay_hash(), second.replay_hash());
    assert_eq!(first.events(), second.events());
    assert_eq!(first.snapshot(), second.snapshot());
}

#[test]
fn different_seeds_diverge() {
    let mut config = small_config();
    let mut first = ColonyWorld::new(config.clone()).expect("world");
    config.seed = 9999;
    let mut second = ColonyWorld::new(config).expect("world");
    first.step_n(30);
    second.step_n(30);

    assert_ne!(first.replay_hash(), second.replay_hash());
}

#[test]
fn step_respects_max_ticks() {
    let mut config = small_config();
    config.duration_days = 1;
    let mut world = ColonyWorld::new(config).expect("world");
    let committed = world.step_n(1000);

    assert_eq!(committed, contracts::TICKS_PER_DAY);
    assert!(world.status().is_complete());
    assert_eq!(world.status().mode, RunMode::Paused);
    assert!(!world.step());
}

#[test]
fn revoking_every_category_idles_the_agent() {
    let mut config = small_config();
    config.region_count = 1;
    config.agents_per_region = 1;
    let mut world = ColonyWorld::new(config).expect("world");

    let agent_id = AgentId(0);
    for category in [
        CATEGORY_EMERGENCY,
        CATEGORY_CARE,
        CATEGORY_CONSTRUCTION,
        CATEGORY_GROWING,
        CATEGORY_HAULING,
    ] {
        let cmd = command(
            &format!("revoke_{category}"),
            &world,
            CommandType::SetCategoryAllowed,
            CommandPayload::SetCategoryAllowed {
                agent_id,
                category: category.to_string(),
                allowed: false,
            },
        );
        world.inject_command(cmd);
    }

    world.step_n(10);

    assert_eq!(world.assignments_total(), 0);
    assert!(world
        .events()
        .iter()
        .any(|event| event.event_type == EventType::PermissionInvalidated));
    assert!(world
        .events()
        .iter()
        .any(|event| event.event_type == EventType::AssignmentExhausted));
}

#[test]
fn reset_region_command_emits_and_rebuilds() {
    let mut world = ColonyWorld::new(small_config()).expect("world");
    world.step_n(4);

    let cmd = command(
        "reset_r0",
        &world,
        CommandType::ResetRegion,
        CommandPayload::ResetRegion {
            region_id: RegionId(0),
        },
    );
    world.inject_command(cmd);
    world.step_n(2);

    assert!(world
        .events()
        .iter()
        .any(|event| event.event_type == EventType::RegionCachesCleared));
    // The next assignment pass repopulated the region's caches.
    let snapshot = world.snapshot();
    let region = &snapshot.regions[0];
    assert!(region
        .provider_caches
        .iter()
        .any(|stat| stat.last_refresh_tick.is_some()));
}

#[test]
fn spawn_and_remove_target_commands_round_trip() {
    let mut world = ColonyWorld::new(small_config()).expect("world");

    let spawn = command(
        "spawn_fire",
        &world,
        CommandType::SpawnTarget,
        CommandPayload::SpawnTarget {
            region_id: RegionId(0),
            kind: TargetKind::Fire,
            x: 10.0,
            y: 12.0,
        },
    );
    world.inject_command(spawn);
    world.step_n(1);

    let spawned = world
        .events()
        .iter()
        .rev()
        .find(|event| {
            event.event_type == EventType::TargetSpawned && !event.caused_by.is_empty()
        })
        .expect("spawn event")
        .target_id
        .expect("target id");

    let remove = command(
        "remove_fire",
        &world,
        CommandType::RemoveTarget,
        CommandPayload::RemoveTarget { target_id: spawned },
    );
    world.inject_command(remove);
    world.step_n(1);

    assert!(world.events().iter().any(|event| {
        event.event_type == EventType::TargetRemoved && event.target_id == Some(spawned)
    }));
    assert!(lock_board(&world.board).get(spawned).is_none());
}

#[test]
fn inspectors_expose_agents_and_regions() {
    let mut world = ColonyWorld::new(small_config()).expect("world");
    world.step_n(12);

    let region = world.inspect_region(RegionId(0)).expect("region json");
    assert_eq!(region["region_id"], 0);
    assert!(region["provider_caches"].as_array().is_some());
    assert!(world.inspect_region(RegionId(99)).is_none());

    let agent = world.inspect_agent(AgentId(0)).expect("agent json");
    assert_eq!(agent["agent_id"], 0);
    assert!(agent["allowed_categories"].as_array().is_some());
    assert!(world.inspect_agent(AgentId(424242)).is_none());
}

#[test]
fn snapshot_totals_match_event_log() {
    let mut world = ColonyWorld::new(small_config()).expect("world");
    world.step_n(20);

    let snapshot = world.snapshot();
    let assigned_events = world
        .events()
        .iter()
        .filter(|event| event.event_type == EventType::TaskAssigned)
        .count() as u64;
    let exhausted_events = world
        .events()
        .iter()
        .filter(|event| event.event_type == EventType::AssignmentExhausted)
        .count() as u64;

    assert_eq!(snapshot.assignments_total, assigned_events);
    assert_eq!(snapshot.exhausted_total, exhausted_events);
    assert_eq!(snapshot.tick, 20);
    assert_eq!(snapshot.regions.len(), 2);
}

#[test]
fn busy_agents_are_not_reassigned() {
    let mut world = ColonyWorld::new(small_config()).expect("world");
    world.step_n(6);

    // An agent with an active task never appears in two overlapping
    // TaskAssigned events: each new assignment follows a completion.
    let mut active: BTreeMap<AgentId, Tick> = BTreeMap::new();
    for event in world.events() {
        match event.event_type {
            EventType::TaskAssigned => {
                let agent_id = event.agent_id.expect("agent");
                let duration = event.details.as_ref().expect("details")["duration_ticks"]
                    .as_u64()
                    .expect("duration");
                if let Some(busy_until) = active.get(&agent_id) {
                    assert!(
                        event.tick >= *busy_until,
                        "{agent_id} reassigned at tick {} while busy until {}",
                        event.tick,
                        busy_until
                    );
                }
                active.insert(agent_id, event.tick + duration);
            }
            EventType::TaskCompleted => {
                active.remove(&event.agent_id.expect("agent"));
            }
            _ => {}
        }
    }
}
