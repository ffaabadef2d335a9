//! Full-loop integration tests: the pilot ticking against the in-memory
//! world, store, and signer.

use std::sync::Arc;
use std::time::{Duration, Instant};

use agent_pilot::{
    AgentPilot, BackoffPolicy, ConfigStore, FixtureWorld, InMemoryConfigStore, IssuedCommand,
    MockWalletSigner, PilotError, PilotLogKind, PilotSettings,
};
use agent_pilot_proto::{
    AgentConfig, AgentConfigPatch, EntityKind, EntityRef, Focus, InventoryItem, ItemKind,
    Position, Strategy, WorldEntity, ZoneInfo,
};

const OWNER: &str = "owner-1";
const CUSTODIAL: &str = "custodial-1";

fn test_settings() -> PilotSettings {
    PilotSettings {
        world_base_url: "http://world.invalid".to_string(),
        store_base_url: "http://store.invalid".to_string(),
        signer_base_url: "http://store.invalid".to_string(),
        tick_interval: Duration::from_millis(10),
        request_timeout: Duration::from_millis(500),
        backoff: BackoffPolicy::new(Duration::from_millis(20), 2, Duration::from_millis(60)),
        rally_point: Position::new(0.0, 0.0),
    }
}

fn zone_info(id: &str, level_requirement: u32) -> ZoneInfo {
    ZoneInfo {
        zone_id: id.to_string(),
        level_requirement,
        order_index: None,
        neighbors: Vec::new(),
    }
}

fn avatar() -> WorldEntity {
    let mut me = WorldEntity::new("avatar-1", EntityKind::Player);
    me.level = Some(10);
    me.position = Some(Position::new(0.0, 0.0));
    me.hp = Some(100);
    me.max_hp = Some(100);
    me
}

struct Harness {
    world: Arc<FixtureWorld>,
    store: Arc<InMemoryConfigStore>,
    pilot: AgentPilot,
}

fn harness(config: AgentConfig, entity_ref: Option<EntityRef>, me: Option<WorldEntity>) -> Harness {
    let world = Arc::new(FixtureWorld::new());
    let entities = me.map(|entity| vec![entity]).unwrap_or_default();
    world.add_zone(zone_info("zone-1", 1), entities);

    let store = Arc::new(InMemoryConfigStore::new());
    store.register_agent(OWNER, config, entity_ref, Some(CUSTODIAL.to_string()));

    let signer = Arc::new(MockWalletSigner::new());
    signer.register_wallet(CUSTODIAL);

    let pilot = AgentPilot::new(
        OWNER,
        test_settings(),
        world.clone(),
        store.clone(),
        signer,
    );
    Harness {
        world,
        store,
        pilot,
    }
}

fn default_ref() -> Option<EntityRef> {
    Some(EntityRef {
        entity_id: "avatar-1".to_string(),
        zone_id: "zone-1".to_string(),
    })
}

fn wait_until(timeout: Duration, mut condition: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        std::thread::sleep(Duration::from_millis(5));
    }
    condition()
}

#[test]
fn disabled_config_rejects_start_and_ends_not_running() {
    let config = AgentConfig {
        enabled: false,
        ..AgentConfig::default()
    };
    let mut harness = harness(config, default_ref(), Some(avatar()));

    let result = harness.pilot.start(true);
    assert_eq!(result, Err(PilotError::Disabled));

    harness.pilot.join();
    assert!(!harness.pilot.running());
}

#[test]
fn healthy_agent_start_resolves_and_loop_ticks() {
    let config = AgentConfig {
        focus: Focus::Idle,
        ..AgentConfig::default()
    };
    let mut harness = harness(config, default_ref(), Some(avatar()));

    harness.pilot.start(true).expect("first tick");
    assert!(harness.pilot.running());
    assert!(wait_until(Duration::from_secs(2), || {
        harness.pilot.metrics().total_ticks >= 3
    }));

    harness.pilot.stop();
    harness.pilot.join();
    assert!(!harness.pilot.running());
    assert!(harness
        .pilot
        .log_entries()
        .iter()
        .any(|entry| entry.kind == PilotLogKind::FirstTickSucceeded));
}

#[test]
fn missing_custodial_wallet_rejects_start() {
    let world = Arc::new(FixtureWorld::new());
    world.add_zone(zone_info("zone-1", 1), vec![avatar()]);
    let store = Arc::new(InMemoryConfigStore::new());
    store.register_agent(OWNER, AgentConfig::default(), default_ref(), None);
    let signer = Arc::new(MockWalletSigner::new());

    let mut pilot = AgentPilot::new(OWNER, test_settings(), world, store, signer);
    assert_eq!(pilot.start(true), Err(PilotError::AuthFailed));
    pilot.join();
    assert!(!pilot.running());
}

#[test]
fn entity_found_nowhere_rejects_start() {
    // The hint points at a zone where the avatar does not exist, and no
    // other zone holds it either.
    let mut harness = harness(AgentConfig::default(), default_ref(), None);

    assert_eq!(harness.pilot.start(true), Err(PilotError::EntityUnresolved));
    harness.pilot.join();
    assert!(!harness.pilot.running());
}

#[test]
fn relocated_entity_is_healed_before_first_tick_resolves() {
    let mut harness = harness(AgentConfig::default(), default_ref(), None);
    // The world silently moved the avatar into zone-2.
    harness.world.add_zone(zone_info("zone-2", 1), vec![avatar()]);

    harness.pilot.start(true).expect("first tick");
    harness.pilot.stop();
    harness.pilot.join();

    let persisted = harness.store.entity_ref(OWNER).expect("entity ref");
    assert_eq!(persisted.map(|r| r.zone_id), Some("zone-2".to_string()));
    let activity = harness.store.activity_log(OWNER);
    assert!(activity
        .iter()
        .any(|entry| entry.text.contains("zone-1") && entry.text.contains("zone-2")));
}

#[test]
fn second_start_while_running_is_rejected() {
    let config = AgentConfig {
        focus: Focus::Idle,
        ..AgentConfig::default()
    };
    let mut harness = harness(config, default_ref(), Some(avatar()));

    harness.pilot.start(true).expect("first tick");
    assert_eq!(harness.pilot.start(true), Err(PilotError::AlreadyRunning));

    harness.pilot.stop();
    harness.pilot.join();
}

#[test]
fn low_hp_ticks_heal_instead_of_fighting() {
    // Balanced strategy at 18% HP with food in the bag: every tick consumes,
    // no combat happens even with an eligible mob around.
    let mut me = avatar();
    me.hp = Some(18);
    me.inventory.push(InventoryItem {
        item_id: "bread".to_string(),
        name: None,
        kind: ItemKind::Food,
        quantity: Some(5),
    });
    let config = AgentConfig {
        focus: Focus::Combat,
        strategy: Strategy::Balanced,
        ..AgentConfig::default()
    };
    let mut harness = harness(config, default_ref(), Some(me));
    let mut mob = WorldEntity::new("rat", EntityKind::Mob);
    mob.level = Some(3);
    mob.position = Some(Position::new(1.0, 0.0));
    harness.world.upsert_entity("zone-1", mob);

    harness.pilot.start(true).expect("first tick");
    assert!(wait_until(Duration::from_secs(2), || {
        harness.pilot.metrics().interrupts_consumed >= 2
    }));
    harness.pilot.stop();
    harness.pilot.join();

    let commands = harness.world.commands();
    assert!(commands
        .iter()
        .any(|command| matches!(command, IssuedCommand::Consume { item_id, .. } if item_id == "bread")));
    assert!(!commands
        .iter()
        .any(|command| matches!(command, IssuedCommand::Attack { .. })));
}

#[test]
fn disable_while_running_stops_loop_without_unresolving_start() {
    let config = AgentConfig {
        focus: Focus::Idle,
        ..AgentConfig::default()
    };
    let mut harness = harness(config, default_ref(), Some(avatar()));

    harness.pilot.start(true).expect("first tick");
    harness
        .store
        .patch_agent_config(
            OWNER,
            &AgentConfigPatch {
                enabled: Some(false),
                ..AgentConfigPatch::default()
            },
        )
        .expect("patch");

    assert!(wait_until(Duration::from_secs(2), || {
        !harness.pilot.running()
    }));
    harness.pilot.join();
    assert!(harness
        .pilot
        .log_entries()
        .iter()
        .any(|entry| entry.kind == PilotLogKind::Disabled));
}

#[test]
fn transient_read_failures_are_absorbed_after_first_tick() {
    let config = AgentConfig {
        focus: Focus::Idle,
        ..AgentConfig::default()
    };
    let mut harness = harness(config, default_ref(), Some(avatar()));

    harness.pilot.start(true).expect("first tick");
    harness.world.set_fail_reads(true);

    assert!(wait_until(Duration::from_secs(2), || {
        harness.pilot.metrics().transient_failures >= 2
    }));
    assert!(harness.pilot.running(), "one bad patch must not kill the loop");

    harness.world.set_fail_reads(false);
    let ticks_before = harness.pilot.metrics().total_ticks;
    assert!(wait_until(Duration::from_secs(2), || {
        harness.pilot.metrics().total_ticks > ticks_before + 1
    }));

    harness.pilot.stop();
    harness.pilot.join();
    assert!(harness
        .pilot
        .log_entries()
        .iter()
        .any(|entry| matches!(entry.kind, PilotLogKind::BackoffWait { .. })));
}

#[test]
fn direct_buy_works_without_running_loop() {
    let harness = harness(AgentConfig::default(), default_ref(), Some(avatar()));

    let outcome = harness
        .pilot
        .buy_item("vendor-1", "listing-1")
        .expect("buy");
    assert!(outcome.ok);

    let commands = harness.world.commands();
    assert!(commands
        .iter()
        .any(|command| matches!(command, IssuedCommand::Buy { listing_id, .. } if listing_id == "listing-1")));
    let activity = harness.store.activity_log(OWNER);
    assert!(activity.iter().any(|entry| entry.text.contains("listing-1")));
}
