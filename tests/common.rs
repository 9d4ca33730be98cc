//! Test utilities & fixtures shared by the integration tests.

use chrono::{DateTime, TimeZone, Utc};
use mushcore::config::WorldConfig;
use mushcore::container::{ContainerDataRegistry, ContainerState};
use mushcore::storage::{WorldStore, WorldStoreBuilder};
use mushcore::world::{AccessLevel, Item, Serial, World};
use std::sync::Arc;

/// Fixed starting clock so timer assertions are deterministic.
pub fn epoch() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap()
}

/// Registry parsed from the shipped container table.
pub fn registry() -> Arc<ContainerDataRegistry> {
    Arc::new(ContainerDataRegistry::parse(include_str!(
        "../data/containers.cfg"
    )))
}

pub fn world() -> World {
    world_with(WorldConfig::default())
}

pub fn world_with(config: WorldConfig) -> World {
    let mut world = World::new(config, registry(), epoch());
    world.seed_rng(7);
    world
}

/// A player and their backpack.
#[allow(dead_code)]
pub fn player(world: &mut World, name: &str) -> (Serial, Serial) {
    let mobile = world.create_player(name, AccessLevel::Player).unwrap();
    let pack = world.get_mobile(mobile).unwrap().backpack().unwrap();
    (mobile, pack)
}

#[allow(dead_code)]
pub fn bag(world: &mut World) -> Serial {
    world.spawn(
        Item::new("bag", 0x0E76)
            .with_weight(2.0)
            .with_container(ContainerState::plain()),
    )
}

/// A pile of a stackable resource weighing one stone per unit.
#[allow(dead_code)]
pub fn pile(world: &mut World, kind: &str, amount: u32) -> Serial {
    world.spawn(
        Item::new(kind, 0x1BF2)
            .stackable()
            .with_weight(1.0)
            .with_amount(amount),
    )
}

/// Throwaway store rooted in a temp dir. Keep the `TempDir` alive for the test.
#[allow(dead_code)]
pub fn temp_store() -> (tempfile::TempDir, WorldStore) {
    let dir = tempfile::tempdir().expect("tempdir");
    let store = WorldStoreBuilder::new(dir.path().join("world"))
        .open()
        .expect("open store");
    (dir, store)
}
