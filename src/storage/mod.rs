//! # Storage Module - World Persistence
//!
//! Sled-backed store for the item and mobile arenas.
//!
//! ## Layout
//!
//! ```text
//! items    ← big-endian item serial   → framed item record
//! mobiles  ← big-endian mobile serial → framed mobile record
//! meta     ← saved_at, generation
//! ```
//!
//! Records are framed by [`codec`]. Loading rebuilds a consistent world: child lists
//! are relinked against parent pointers, stored totals are checked against a fresh
//! recount and then recomputed, ownerless bank boxes
//! and leftover trade containers are dissolved, and corpse decay timers restart.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use mushcore::config::WorldConfig;
//! use mushcore::container::ContainerDataRegistry;
//! use mushcore::storage::WorldStore;
//! use std::sync::Arc;
//!
//! # fn main() -> mushcore::world::Result<()> {
//! let store = WorldStore::open("./data/world")?;
//! let (world, report) = store.load_world(
//!     WorldConfig::default(),
//!     Arc::new(ContainerDataRegistry::default()),
//!     chrono::Utc::now(),
//! )?;
//! println!("{} items, {} upgraded layers", world.item_count(), report.upgrades.len());
//! store.save_world(&world)?;
//! # Ok(())
//! # }
//! ```

pub mod codec;

use chrono::{DateTime, Utc};
use log::{debug, info, warn};
use serde::Serialize;
use std::collections::{BTreeMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use uuid::Uuid;

use crate::config::WorldConfig;
use crate::container::totals::TotalsDrift;
use crate::container::{ContainerDataRegistry, ContainerKind, CONTAINER_TOTALS_VERSION};
use crate::persist::Upgrade;
use crate::world::errors::{Result, WorldError};
use crate::world::mobile::MOBILE_TOTALS_VERSION;
use crate::world::{Item, Parent, Serial, World};

pub use codec::{decode_item, decode_mobile, encode_item, encode_mobile, frame, unframe, EntityKind};

const TREE_ITEMS: &str = "items";
const TREE_MOBILES: &str = "mobiles";
const TREE_META: &str = "meta";

const META_SAVED_AT: &str = "saved_at";
const META_GENERATION: &str = "generation";

/// Helper builder so tests can easily create throwaway stores with custom paths.
pub struct WorldStoreBuilder {
    path: PathBuf,
}

impl WorldStoreBuilder {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn open(self) -> Result<WorldStore> {
        WorldStore::open(self.path)
    }
}

/// One layer read at an older version during a load.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RecordUpgrade {
    pub serial: Serial,
    pub layer: &'static str,
    pub from_version: u32,
    pub to_version: u32,
}

/// A record left out of the loaded world.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SkippedRecord {
    pub tree: &'static str,
    pub key: String,
    pub reason: String,
}

/// What a load found and repaired.
#[derive(Debug, Clone, Default, Serialize)]
pub struct LoadReport {
    /// Records loaded, by kind label.
    pub counts: BTreeMap<&'static str, usize>,
    pub upgrades: Vec<RecordUpgrade>,
    pub skipped: Vec<SkippedRecord>,
    /// Items whose parent was missing, not a container, or part of a cycle.
    pub reparented: Vec<Serial>,
    pub banks_destroyed: usize,
    pub trades_dissolved: usize,
    pub corpse_timers: usize,
    /// Stored aggregates that disagreed with a recount of the loaded tree. The loaded
    /// world already carries the recomputed values.
    pub totals_drift: Vec<TotalsDrift>,
    pub saved_at: Option<DateTime<Utc>>,
}

impl LoadReport {
    fn record_upgrades(&mut self, serial: Serial, upgrades: Vec<Upgrade>) {
        self.upgrades
            .extend(upgrades.into_iter().map(|upgrade| RecordUpgrade {
                serial,
                layer: upgrade.entity,
                from_version: upgrade.from,
                to_version: upgrade.to,
            }));
    }

    /// Layers written before aggregates were stored have nothing to compare.
    fn has_stored_totals(&self, serial: Serial) -> bool {
        !self.upgrades.iter().any(|upgrade| {
            upgrade.serial == serial
                && match upgrade.layer {
                    "container" => upgrade.from_version < CONTAINER_TOTALS_VERSION,
                    "mobile" => upgrade.from_version < MOBILE_TOTALS_VERSION,
                    _ => false,
                }
        })
    }

    fn skip(&mut self, tree: &'static str, key: &[u8], error: &WorldError) {
        let key = match Serial::from_key(key) {
            Some(serial) => serial.to_string(),
            None => format!("{:?}", key),
        };
        warn!("Skipping {} record {}: {}", tree, key, error);
        self.skipped.push(SkippedRecord {
            tree,
            key,
            reason: error.to_string(),
        });
    }

    pub fn total(&self) -> usize {
        self.counts.values().sum()
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct SaveSummary {
    pub items: usize,
    pub mobiles: usize,
    pub removed: usize,
    pub generation: Uuid,
    pub saved_at: DateTime<Utc>,
}

/// Sled-backed persistence for the world arenas.
pub struct WorldStore {
    db: sled::Db,
    items: sled::Tree,
    mobiles: sled::Tree,
    meta: sled::Tree,
}

impl WorldStore {
    /// Open (or create) the store rooted at `path`.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path_ref = path.as_ref();
        std::fs::create_dir_all(path_ref)?;
        let db = sled::open(path_ref)?;
        let items = db.open_tree(TREE_ITEMS)?;
        let mobiles = db.open_tree(TREE_MOBILES)?;
        let meta = db.open_tree(TREE_META)?;
        Ok(Self {
            db,
            items,
            mobiles,
            meta,
        })
    }

    pub fn item_record_count(&self) -> usize {
        self.items.len()
    }

    pub fn mobile_record_count(&self) -> usize {
        self.mobiles.len()
    }

    /// Store an already framed item record as is.
    pub fn put_raw_item(&self, serial: Serial, framed: &[u8]) -> Result<()> {
        self.items.insert(&serial.to_key()[..], framed)?;
        self.items.flush()?;
        Ok(())
    }

    /// Store an already framed mobile record as is.
    pub fn put_raw_mobile(&self, serial: Serial, framed: &[u8]) -> Result<()> {
        self.mobiles.insert(&serial.to_key()[..], framed)?;
        self.mobiles.flush()?;
        Ok(())
    }

    pub fn raw_item(&self, serial: Serial) -> Result<Option<Vec<u8>>> {
        Ok(self.items.get(serial.to_key())?.map(|value| value.to_vec()))
    }

    pub fn saved_at(&self) -> Result<Option<DateTime<Utc>>> {
        let Some(raw) = self.meta.get(META_SAVED_AT)? else {
            return Ok(None);
        };
        let text = String::from_utf8_lossy(&raw);
        DateTime::parse_from_rfc3339(&text)
            .map(|time| Some(time.with_timezone(&Utc)))
            .map_err(|e| WorldError::Corrupt(format!("bad saved_at {:?}: {}", text, e)))
    }

    pub fn generation(&self) -> Result<Option<Uuid>> {
        let Some(raw) = self.meta.get(META_GENERATION)? else {
            return Ok(None);
        };
        let text = String::from_utf8_lossy(&raw);
        Uuid::parse_str(&text)
            .map(Some)
            .map_err(|e| WorldError::Corrupt(format!("bad generation {:?}: {}", text, e)))
    }

    /// Replace the stored world with `world`. Each tree is updated in one batch.
    pub fn save_world(&self, world: &World) -> Result<SaveSummary> {
        let now = world.now();

        let mut items = sled::Batch::default();
        for item in world.items() {
            items.insert(&item.serial().to_key()[..], encode_item(item, now)?);
        }
        let mut removed = 0;
        for key in self.items.iter().keys() {
            let key = key?;
            if Serial::from_key(&key).map_or(true, |serial| world.item(serial).is_none()) {
                items.remove(key);
                removed += 1;
            }
        }

        let mut mobiles = sled::Batch::default();
        for mobile in world.mobiles() {
            mobiles.insert(&mobile.serial().to_key()[..], encode_mobile(mobile, now)?);
        }
        for key in self.mobiles.iter().keys() {
            let key = key?;
            if Serial::from_key(&key).map_or(true, |serial| world.mobile(serial).is_none()) {
                mobiles.remove(key);
                removed += 1;
            }
        }

        self.items.apply_batch(items)?;
        self.mobiles.apply_batch(mobiles)?;

        let generation = Uuid::new_v4();
        self.meta.insert(META_SAVED_AT, now.to_rfc3339().as_bytes())?;
        self.meta
            .insert(META_GENERATION, generation.to_string().as_bytes())?;
        self.db.flush()?;

        let summary = SaveSummary {
            items: world.item_count(),
            mobiles: world.mobile_count(),
            removed,
            generation,
            saved_at: now,
        };
        info!(
            "Saved {} items and {} mobiles (generation {}, {} stale records removed)",
            summary.items, summary.mobiles, summary.generation, summary.removed
        );
        Ok(summary)
    }

    /// Load the stored world with its clock at `now`. Stored delta times are rebased on
    /// `now`.
    ///
    /// Records that fail their checksum or do not decode are skipped and reported. A
    /// record from a newer build (unknown version or kind tag) aborts the load.
    pub fn load_world(
        &self,
        config: WorldConfig,
        registry: Arc<ContainerDataRegistry>,
        now: DateTime<Utc>,
    ) -> Result<(World, LoadReport)> {
        let mut world = World::new(config, registry, now);
        let mut report = LoadReport {
            saved_at: self.saved_at()?,
            ..LoadReport::default()
        };

        for entry in self.mobiles.iter() {
            let (key, value) = entry?;
            let Some(serial) = Serial::from_key(&key) else {
                report.skip(TREE_MOBILES, &key, &WorldError::Corrupt("bad key".to_string()));
                continue;
            };
            match decode_mobile(serial, &value, now) {
                Ok((mobile, upgrades)) => {
                    report.record_upgrades(serial, upgrades);
                    *report.counts.entry(EntityKind::Mobile.label()).or_default() += 1;
                    world.insert_loaded_mobile(mobile);
                }
                Err(e) if is_skippable(&e) => report.skip(TREE_MOBILES, &key, &e),
                Err(e) => return Err(e),
            }
        }

        for entry in self.items.iter() {
            let (key, value) = entry?;
            let Some(serial) = Serial::from_key(&key) else {
                report.skip(TREE_ITEMS, &key, &WorldError::Corrupt("bad key".to_string()));
                continue;
            };
            match decode_item(serial, &value, now) {
                Ok((item, upgrades)) => {
                    report.record_upgrades(serial, upgrades);
                    *report.counts.entry(EntityKind::of_item(&item).label()).or_default() += 1;
                    world.insert_loaded_item(item);
                }
                Err(e) if is_skippable(&e) => report.skip(TREE_ITEMS, &key, &e),
                Err(e) => return Err(e),
            }
        }

        relink(&mut world, &mut report);
        report.totals_drift = world
            .verify_totals()?
            .into_iter()
            .filter(|drift| report.has_stored_totals(drift.serial))
            .collect();
        world.recompute_all_totals()?;
        report.banks_destroyed = destroy_ownerless_banks(&mut world)?;
        report.trades_dissolved = dissolve_trade_containers(&mut world)?;
        report.corpse_timers = world.restart_corpse_timers()?;
        world.drain_outbox();

        if !report.upgrades.is_empty() {
            info!("Upgraded {} record layers while loading", report.upgrades.len());
        }
        if !report.totals_drift.is_empty() {
            warn!("{} stored aggregates drifted and were recomputed", report.totals_drift.len());
        }
        info!(
            "Loaded {} records ({} skipped, {} reparented)",
            report.total(),
            report.skipped.len(),
            report.reparented.len()
        );
        Ok((world, report))
    }
}

fn is_skippable(error: &WorldError) -> bool {
    matches!(
        error,
        WorldError::Checksum(_) | WorldError::Corrupt(_) | WorldError::Bincode(_)
    )
}

/// True when the parent chain above `serial` ends at the world or a mobile.
fn reaches_root(world: &World, serial: Serial) -> bool {
    let mut current = serial;
    for _ in 0..=world.items.len() {
        match world.items.get(&current).map(|item| item.parent) {
            Some(Parent::Item(parent)) => {
                if parent == serial {
                    return false;
                }
                current = parent;
            }
            _ => return true,
        }
    }
    false
}

/// Make parent pointers and child lists agree. Parent pointers win; a pointer to a
/// missing or non-container parent, or into a cycle, drops the item to the ground.
fn relink(world: &mut World, report: &mut LoadReport) {
    let serials: Vec<Serial> = world.items.keys().copied().collect();
    for serial in &serials {
        let Some(parent) = world.items.get(serial).map(|item| item.parent) else {
            continue;
        };
        let valid = match parent {
            Parent::World => true,
            Parent::Item(container) => {
                world.items.get(&container).map_or(false, Item::is_container)
                    && reaches_root(world, *serial)
            }
            Parent::Mobile(mobile) => world.mobiles.contains_key(&mobile),
        };
        if !valid {
            warn!("{} had an invalid parent {:?}; moved to the ground", serial, parent);
            if let Some(item) = world.items.get_mut(serial) {
                item.parent = Parent::World;
            }
            report.reparented.push(*serial);
        }
    }

    let parents: BTreeMap<Serial, Parent> = world
        .items
        .values()
        .map(|item| (item.serial(), item.parent))
        .collect();
    for item in world.items.values_mut() {
        let own = Parent::Item(item.serial);
        if let Some(state) = item.container.as_mut() {
            let mut seen = HashSet::new();
            state
                .items
                .retain(|child| parents.get(child) == Some(&own) && seen.insert(*child));
        }
    }
    for mobile in world.mobiles.values_mut() {
        let own = Parent::Mobile(mobile.serial);
        let mut seen = HashSet::new();
        mobile
            .items
            .retain(|child| parents.get(child) == Some(&own) && seen.insert(*child));
        if mobile.backpack.map_or(false, |pack| !mobile.items.contains(&pack)) {
            mobile.backpack = None;
        }
        if mobile.bank_box.map_or(false, |bank| !mobile.items.contains(&bank)) {
            mobile.bank_box = None;
        }
    }

    for (serial, parent) in parents {
        match parent {
            Parent::World => {}
            Parent::Item(container) => {
                if let Some(state) = world
                    .items
                    .get_mut(&container)
                    .and_then(|item| item.container.as_mut())
                {
                    if !state.items.contains(&serial) {
                        debug!("Relinked {} into {}", serial, container);
                        state.items.push(serial);
                    }
                }
            }
            Parent::Mobile(mobile) => {
                if let Some(record) = world.mobiles.get_mut(&mobile) {
                    if !record.items.contains(&serial) {
                        debug!("Relinked {} onto {}", serial, mobile);
                        record.items.push(serial);
                    }
                }
            }
        }
    }
}

/// Bank boxes whose owner is unset or gone spill their contents and vanish.
fn destroy_ownerless_banks(world: &mut World) -> Result<usize> {
    let banks: Vec<Serial> = world
        .items
        .values()
        .filter(|item| {
            item.container()
                .and_then(|state| state.kind.bank())
                .map_or(false, |bank| {
                    bank.owner.map_or(true, |owner| !world.mobiles.contains_key(&owner))
                })
        })
        .map(Item::serial)
        .collect();
    for bank in &banks {
        warn!("Bank box {} has no owner; destroying it", bank);
        world.destroy(*bank)?;
    }
    Ok(banks.len())
}

/// Trade sessions do not survive a restart. Offers go back to the mobile wearing the
/// container, or to the ground, and the container is deleted.
fn dissolve_trade_containers(world: &mut World) -> Result<usize> {
    let trades: Vec<Serial> = world
        .items
        .values()
        .filter(|item| matches!(item.container().map(|s| &s.kind), Some(ContainerKind::SecureTrade(_))))
        .map(Item::serial)
        .collect();
    for container in &trades {
        let holder = world.get_item(*container)?.parent().mobile();
        let location = world.world_location(*container)?;
        let offered = world.container(*container)?.items().to_vec();
        for item in offered.into_iter().rev() {
            match holder {
                Some(mobile) => world.add_to_backpack(mobile, item)?,
                None => world.move_to_world(item, location)?,
            }
        }
        debug!("Dissolved leftover trade container {}", container);
        world.delete(*container)?;
    }
    Ok(trades.len())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::world::AccessLevel;
    use tempfile::TempDir;

    fn fresh_world() -> World {
        World::new(
            WorldConfig::default(),
            Arc::new(ContainerDataRegistry::default()),
            Utc::now(),
        )
    }

    #[test]
    fn test_relink_drops_dangling_parent() {
        let mut world = fresh_world();
        let mut stray = Item::new("bone", 0x0F7E);
        stray.serial = Serial(0x4000_0100);
        stray.parent = Parent::Item(Serial(0x4000_0999));
        world.insert_loaded_item(stray);

        let mut report = LoadReport::default();
        relink(&mut world, &mut report);
        assert_eq!(report.reparented, vec![Serial(0x4000_0100)]);
        assert_eq!(world.get_item(Serial(0x4000_0100)).unwrap().parent(), Parent::World);
    }

    #[test]
    fn test_relink_breaks_cycle() {
        let mut world = fresh_world();
        let a = Serial(0x4000_0001);
        let b = Serial(0x4000_0002);
        for (serial, parent) in [(a, b), (b, a)] {
            let mut bag = Item::new("bag", 0x0E76).with_container(crate::container::ContainerState::plain());
            bag.serial = serial;
            bag.parent = Parent::Item(parent);
            world.insert_loaded_item(bag);
        }

        let mut report = LoadReport::default();
        relink(&mut world, &mut report);
        assert_eq!(report.reparented, vec![a]);
        assert_eq!(world.get_item(b).unwrap().parent(), Parent::Item(a));
        assert_eq!(world.container(a).unwrap().items(), &[b]);
    }

    #[test]
    fn test_save_load_keeps_meta() {
        let dir = TempDir::new().unwrap();
        let store = WorldStoreBuilder::new(dir.path().join("world")).open().unwrap();
        let mut world = fresh_world();
        world.create_player("Dupre", AccessLevel::Player).unwrap();

        let summary = store.save_world(&world).unwrap();
        assert_eq!(store.generation().unwrap(), Some(summary.generation));
        assert!(store.saved_at().unwrap().is_some());

        let (loaded, report) = store
            .load_world(
                WorldConfig::default(),
                Arc::new(ContainerDataRegistry::default()),
                world.now(),
            )
            .unwrap();
        assert_eq!(loaded.item_count(), 2);
        assert_eq!(report.counts.get("mobile"), Some(&1));
        assert_eq!(report.banks_destroyed, 0);
    }
}
