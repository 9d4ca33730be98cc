//! The world arena.
//!
//! Items and mobiles live in maps keyed by [`Serial`]. A child stores its parent as a
//! serial; the parent owns the ordered child list. Every structural change goes through
//! [`World`] so totals, openers and trade sessions stay consistent.

pub mod errors;
pub mod item;
pub mod mobile;
pub mod packets;
pub mod scheduler;
pub mod types;

use chrono::{DateTime, Duration, Utc};
use log::{debug, trace};
use rand::rngs::StdRng;
use rand::SeedableRng;
use std::collections::BTreeMap;
use std::sync::Arc;

use crate::config::WorldConfig;
use crate::container::{
    BankState, ContainerDataRegistry, ContainerKind, ContainerState, SecureTrade, TradeId,
};

pub use errors::{Result, WorldError};
pub use item::Item;
pub use mobile::Mobile;
pub use packets::Packet;
pub use scheduler::{TimerAction, TimerId, TimerScheduler};
pub use types::{
    AccessLevel, ItemKind, LootType, Parent, Point3D, Rect2D, Serial, TotalType, Totals,
};

/// Graphic of a player backpack.
pub const BACKPACK_ID: u16 = 0x0E75;
/// Graphic of a bank box.
pub const BANK_BOX_ID: u16 = 0x09AB;

pub struct World {
    config: WorldConfig,
    registry: Arc<ContainerDataRegistry>,
    now: DateTime<Utc>,
    pub(crate) items: BTreeMap<Serial, Item>,
    pub(crate) mobiles: BTreeMap<Serial, Mobile>,
    next_item_serial: u32,
    next_mobile_serial: u32,
    pub(crate) timers: TimerScheduler,
    pub(crate) trades: BTreeMap<TradeId, SecureTrade>,
    pub(crate) next_trade_id: u32,
    outbox: Vec<Packet>,
    pub(crate) rng: StdRng,
}

impl World {
    pub fn new(
        config: WorldConfig,
        registry: Arc<ContainerDataRegistry>,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            next_item_serial: config.item_serial_start,
            next_mobile_serial: config.mobile_serial_start,
            config,
            registry,
            now,
            items: BTreeMap::new(),
            mobiles: BTreeMap::new(),
            timers: TimerScheduler::new(),
            trades: BTreeMap::new(),
            next_trade_id: 1,
            outbox: Vec::new(),
            rng: StdRng::from_entropy(),
        }
    }

    pub fn config(&self) -> &WorldConfig {
        &self.config
    }

    pub fn registry(&self) -> &ContainerDataRegistry {
        &self.registry
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.now
    }

    /// Make drop positions and bone graphics reproducible.
    pub fn seed_rng(&mut self, seed: u64) {
        self.rng = StdRng::seed_from_u64(seed);
    }

    // ========================================================================
    // Lookup
    // ========================================================================

    pub fn item(&self, serial: Serial) -> Option<&Item> {
        self.items.get(&serial)
    }

    pub fn get_item(&self, serial: Serial) -> Result<&Item> {
        self.items.get(&serial).ok_or(WorldError::NotFound(serial))
    }

    pub(crate) fn item_mut(&mut self, serial: Serial) -> Result<&mut Item> {
        self.items
            .get_mut(&serial)
            .ok_or(WorldError::NotFound(serial))
    }

    pub fn mobile(&self, serial: Serial) -> Option<&Mobile> {
        self.mobiles.get(&serial)
    }

    pub fn get_mobile(&self, serial: Serial) -> Result<&Mobile> {
        self.mobiles.get(&serial).ok_or(WorldError::NotFound(serial))
    }

    pub(crate) fn mobile_mut(&mut self, serial: Serial) -> Result<&mut Mobile> {
        self.mobiles
            .get_mut(&serial)
            .ok_or(WorldError::NotFound(serial))
    }

    pub fn container(&self, serial: Serial) -> Result<&ContainerState> {
        self.get_item(serial)?
            .container
            .as_ref()
            .ok_or(WorldError::NotAContainer(serial))
    }

    pub(crate) fn container_mut(&mut self, serial: Serial) -> Result<&mut ContainerState> {
        self.item_mut(serial)?
            .container
            .as_mut()
            .ok_or(WorldError::NotAContainer(serial))
    }

    pub fn items(&self) -> impl Iterator<Item = &Item> {
        self.items.values()
    }

    pub fn mobiles(&self) -> impl Iterator<Item = &Mobile> {
        self.mobiles.values()
    }

    pub fn item_count(&self) -> usize {
        self.items.len()
    }

    pub fn mobile_count(&self) -> usize {
        self.mobiles.len()
    }

    pub fn is_elevated(&self, actor: Option<Serial>) -> bool {
        actor
            .and_then(|serial| self.mobiles.get(&serial))
            .map_or(false, Mobile::is_elevated)
    }

    /// Parent of the outermost item above `serial`: the world or a mobile.
    pub fn root_parent(&self, serial: Serial) -> Parent {
        let mut current = serial;
        while let Some(item) = self.items.get(&current) {
            match item.parent {
                Parent::Item(parent) => current = parent,
                other => return other,
            }
        }
        Parent::World
    }

    /// True when `ancestor` appears on the parent chain of `serial`.
    pub fn is_ancestor(&self, ancestor: Serial, serial: Serial) -> bool {
        let mut current = self.items.get(&serial).and_then(|i| i.parent.item());
        while let Some(parent) = current {
            if parent == ancestor {
                return true;
            }
            current = self.items.get(&parent).and_then(|i| i.parent.item());
        }
        false
    }

    /// Containers from `serial` (inclusive) up to the outermost one.
    pub fn container_chain(&self, serial: Serial) -> Vec<Serial> {
        let mut chain = Vec::new();
        let mut current = Some(serial);
        while let Some(at) = current {
            let Some(item) = self.items.get(&at) else {
                break;
            };
            if item.is_container() {
                chain.push(at);
            }
            current = item.parent.item();
        }
        chain
    }

    /// Where the item effectively is: its own location on the ground, or the location of
    /// the mobile carrying it.
    pub fn world_location(&self, serial: Serial) -> Result<Point3D> {
        let mut current = self.get_item(serial)?;
        loop {
            match current.parent {
                Parent::World => return Ok(current.location),
                Parent::Mobile(mobile) => return Ok(self.get_mobile(mobile)?.location),
                Parent::Item(parent) => current = self.get_item(parent)?,
            }
        }
    }

    // ========================================================================
    // Creation
    // ========================================================================

    fn allocate_item_serial(&mut self) -> Serial {
        let items = &self.items;
        next_free_serial(&mut self.next_item_serial, |serial| items.contains_key(&serial))
    }

    fn allocate_mobile_serial(&mut self) -> Serial {
        let mobiles = &self.mobiles;
        next_free_serial(&mut self.next_mobile_serial, |serial| mobiles.contains_key(&serial))
    }

    /// Insert a new item into the world with no parent.
    pub fn spawn(&mut self, mut item: Item) -> Serial {
        let serial = self.allocate_item_serial();
        item.serial = serial;
        item.parent = Parent::World;
        if let Some(state) = item.container.as_mut() {
            state.items.clear();
            state.totals = Totals::default();
            state.openers.clear();
        }
        trace!("Spawned {} ({})", serial, item.kind);
        self.items.insert(serial, item);
        serial
    }

    pub fn spawn_mobile(&mut self, mut mobile: Mobile) -> Serial {
        let serial = self.allocate_mobile_serial();
        mobile.serial = serial;
        mobile.items.clear();
        mobile.backpack = None;
        mobile.bank_box = None;
        mobile.totals = Totals::default();
        self.mobiles.insert(serial, mobile);
        serial
    }

    /// A mobile with an equipped backpack and a closed bank box.
    pub fn create_player(&mut self, name: &str, access_level: AccessLevel) -> Result<Serial> {
        let mobile = self.spawn_mobile(Mobile::new(name, access_level));

        let backpack = self.spawn(
            Item::new("backpack", BACKPACK_ID)
                .with_weight(3.0)
                .with_container(ContainerState::plain()),
        );
        self.equip(mobile, backpack)?;

        let bank = self.spawn(
            Item::new("bankbox", BANK_BOX_ID)
                .with_weight(0.0)
                .immovable()
                .virtual_item()
                .with_container(ContainerState::new(ContainerKind::BankBox(BankState {
                    owner: Some(mobile),
                    open: false,
                }))),
        );
        self.equip(mobile, bank)?;

        let record = self.mobile_mut(mobile)?;
        record.backpack = Some(backpack);
        record.bank_box = Some(bank);
        debug!("Created player {} ({})", name, mobile);
        Ok(mobile)
    }

    // ========================================================================
    // Structure
    // ========================================================================

    /// Put `item` into `container` without any capacity check, keeping its location.
    ///
    /// Detaches the item from its current parent first. Fails if the result would not be
    /// a tree.
    pub fn add_item(&mut self, container: Serial, item: Serial) -> Result<()> {
        self.validate_move(container, item)?;
        self.detach(item)?;

        self.container_mut(container)?.items.push(item);
        let moved = self.item_mut(item)?;
        moved.parent = Parent::Item(container);
        let contribution = moved.contribution();
        self.propagate_contribution(Parent::Item(container), item, contribution);

        self.on_item_added(container, item);
        Ok(())
    }

    fn validate_move(&self, container: Serial, item: Serial) -> Result<()> {
        self.container(container)?;
        self.get_item(item)?;
        if container == item {
            return Err(WorldError::InvalidParent {
                item,
                reason: "an item cannot contain itself".to_string(),
            });
        }
        if self.is_ancestor(item, container) {
            return Err(WorldError::InvalidParent {
                item,
                reason: format!("{} is inside {}", container, item),
            });
        }
        Ok(())
    }

    /// Take the item out of its parent. It is left parentless, as if held by a cursor.
    pub fn remove_item(&mut self, item: Serial) -> Result<()> {
        self.get_item(item)?;
        self.detach(item)
    }

    pub(crate) fn detach(&mut self, item: Serial) -> Result<()> {
        let (parent, contribution) = {
            let record = self.get_item(item)?;
            (record.parent, record.contribution())
        };
        match parent {
            Parent::World => return Ok(()),
            Parent::Item(container) => {
                if let Some(state) = self.items.get_mut(&container).and_then(|i| i.container.as_mut()) {
                    state.items.retain(|s| *s != item);
                }
            }
            Parent::Mobile(mobile) => {
                if let Some(record) = self.mobiles.get_mut(&mobile) {
                    record.items.retain(|s| *s != item);
                    if record.backpack == Some(item) {
                        record.backpack = None;
                    }
                    if record.bank_box == Some(item) {
                        record.bank_box = None;
                    }
                }
            }
        }

        self.propagate_contribution(parent, item, negate(contribution));
        self.item_mut(item)?.parent = Parent::World;

        if let Parent::Item(container) = parent {
            self.on_item_removed(container, item);
        }
        Ok(())
    }

    /// Place the item on the ground.
    pub fn move_to_world(&mut self, item: Serial, location: Point3D) -> Result<()> {
        self.remove_item(item)?;
        self.item_mut(item)?.location = location;
        Ok(())
    }

    /// Wear the item on a mobile.
    pub fn equip(&mut self, mobile: Serial, item: Serial) -> Result<()> {
        self.get_mobile(mobile)?;
        self.detach(item)?;
        self.mobile_mut(mobile)?.items.push(item);
        let record = self.item_mut(item)?;
        record.parent = Parent::Mobile(mobile);
        let contribution = record.contribution();
        self.propagate_contribution(Parent::Mobile(mobile), item, contribution);
        Ok(())
    }

    /// Change a pile's amount, adjusting weight and gold totals up the chain.
    pub fn set_amount(&mut self, item: Serial, amount: u32) -> Result<()> {
        let record = self.item_mut(item)?;
        let old_weight = record.pile_weight();
        let old_gold = record.own_gold();
        record.amount = amount.max(1);
        let weight_delta = record.pile_weight() - old_weight;
        let gold_delta = record.own_gold() - old_gold;
        let parent = record.parent;

        self.propagate_from(parent, item, TotalType::Weight, weight_delta);
        self.propagate_from(parent, item, TotalType::Gold, gold_delta);
        if let Parent::Item(container) = parent {
            self.send_content_update(container, item);
            self.invalidate_trades_above(container);
        }
        Ok(())
    }

    /// Remove the item and everything inside it. Owned timers are cancelled.
    pub fn delete(&mut self, item: Serial) -> Result<()> {
        if self.cancel_trade_for(item)? {
            return Ok(());
        }
        self.detach(item)?;

        let mut pending = vec![item];
        while let Some(serial) = pending.pop() {
            let Some(record) = self.items.remove(&serial) else {
                continue;
            };
            if let Some(state) = record.container {
                pending.extend(state.items.iter().copied());
                match state.kind {
                    ContainerKind::Corpse(corpse) => {
                        if let Some(timer) = corpse.decay_timer {
                            self.timers.cancel(timer);
                        }
                    }
                    ContainerKind::SecureTrade(trade) => {
                        if let Some(id) = trade.trade {
                            self.drop_trade_session(id)?;
                        }
                    }
                    _ => {}
                }
            }
        }
        trace!("Deleted {}", item);
        Ok(())
    }

    // ========================================================================
    // Clock
    // ========================================================================

    /// Advance the clock to `now`, firing due timers in deadline order. Returns how
    /// many fired.
    pub fn tick(&mut self, now: DateTime<Utc>) -> Result<usize> {
        let mut fired = 0;
        while let Some((_, deadline, action)) = self.timers.pop_due(now) {
            if deadline > self.now {
                self.now = deadline;
            }
            match action {
                TimerAction::CorpseDecay(corpse) => self.on_decay_timer(corpse)?,
            }
            fired += 1;
        }
        if now > self.now {
            self.now = now;
        }
        Ok(fired)
    }

    pub fn advance(&mut self, by: Duration) -> Result<usize> {
        let target = self.now + by;
        self.tick(target)
    }

    // ========================================================================
    // Outbound
    // ========================================================================

    pub(crate) fn send(&mut self, packet: Packet) {
        self.outbox.push(packet);
    }

    pub(crate) fn announce(&mut self, to: Option<Serial>, text: &str) {
        if let Some(to) = to {
            self.send(Packet::Message {
                to,
                text: text.to_string(),
            });
        }
    }

    pub fn outbox(&self) -> &[Packet] {
        &self.outbox
    }

    pub fn drain_outbox(&mut self) -> Vec<Packet> {
        std::mem::take(&mut self.outbox)
    }

    // ========================================================================
    // Loader support
    // ========================================================================

    pub(crate) fn insert_loaded_item(&mut self, item: Item) {
        if item.serial.0 >= self.next_item_serial {
            self.next_item_serial = item.serial.0.wrapping_add(1);
        }
        self.items.insert(item.serial, item);
    }

    pub(crate) fn insert_loaded_mobile(&mut self, mobile: Mobile) {
        if mobile.serial.0 >= self.next_mobile_serial {
            self.next_mobile_serial = mobile.serial.0.wrapping_add(1);
        }
        self.mobiles.insert(mobile.serial, mobile);
    }

    pub(crate) fn set_clock(&mut self, now: DateTime<Utc>) {
        self.now = now;
    }
}

/// First serial at or after `next` that is neither zero nor taken. Wraps at `u32::MAX`.
fn next_free_serial(next: &mut u32, taken: impl Fn(Serial) -> bool) -> Serial {
    while *next == 0 || taken(Serial(*next)) {
        *next = next.wrapping_add(1);
    }
    let serial = Serial(*next);
    *next = next.wrapping_add(1);
    serial
}

fn negate(totals: Totals) -> Totals {
    Totals {
        gold: -totals.gold,
        items: -totals.items,
        weight: -totals.weight,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn world() -> World {
        World::new(
            WorldConfig::default(),
            Arc::new(ContainerDataRegistry::default()),
            Utc::now(),
        )
    }

    #[test]
    fn test_create_player_equips_pack_and_bank() {
        let mut world = world();
        let player = world.create_player("Iolo", AccessLevel::Player).unwrap();
        let mobile = world.get_mobile(player).unwrap();
        let pack = mobile.backpack().unwrap();
        let bank = mobile.bank_box().unwrap();
        assert_eq!(mobile.items(), &[pack, bank]);
        assert_eq!(world.root_parent(pack), Parent::Mobile(player));
        // The bank box is virtual, so only the backpack weighs on the mobile.
        assert_eq!(world.get_mobile(player).unwrap().totals().weight, 3);
        assert_eq!(world.get_mobile(player).unwrap().totals().items, 1);
    }

    #[test]
    fn test_add_item_rejects_cycles() {
        let mut world = world();
        let outer = world.spawn(Item::new("bag", 0x0E76).with_container(ContainerState::plain()));
        let inner = world.spawn(Item::new("pouch", 0x0E79).with_container(ContainerState::plain()));
        world.add_item(outer, inner).unwrap();

        assert!(matches!(
            world.add_item(inner, outer),
            Err(WorldError::InvalidParent { .. })
        ));
        assert!(matches!(
            world.add_item(inner, inner),
            Err(WorldError::InvalidParent { .. })
        ));
        let plain = world.spawn(Item::new("apple", 0x09D0));
        assert!(matches!(
            world.add_item(plain, inner),
            Err(WorldError::NotAContainer(_))
        ));
    }

    #[test]
    fn test_serials_wrap_past_loaded_maximum() {
        let mut world = world();
        world.insert_loaded_mobile(Mobile::blank(Serial(u32::MAX)));
        let mut loaded = Item::blank(Serial(u32::MAX));
        loaded.kind = "stone".into();
        world.insert_loaded_item(loaded);

        let mobile = world.spawn_mobile(Mobile::new("Dupre", AccessLevel::Player));
        assert_eq!(mobile, Serial(1));
        let item = world.spawn(Item::new("apple", 0x09D0));
        assert_eq!(item, Serial(1));
        assert_eq!(world.spawn_mobile(Mobile::new("Iolo", AccessLevel::Player)), Serial(2));
    }

    #[test]
    fn test_delete_removes_subtree() {
        let mut world = world();
        let bag = world.spawn(Item::new("bag", 0x0E76).with_container(ContainerState::plain()));
        let pouch = world.spawn(Item::new("pouch", 0x0E79).with_container(ContainerState::plain()));
        let coins = world.spawn(Item::gold(10));
        world.add_item(bag, pouch).unwrap();
        world.add_item(pouch, coins).unwrap();
        assert_eq!(world.container(bag).unwrap().totals().gold, 10);

        world.delete(pouch).unwrap();
        assert!(world.item(coins).is_none());
        assert!(world.container(bag).unwrap().items().is_empty());
        assert_eq!(world.container(bag).unwrap().totals(), Totals::default());
    }

    #[test]
    fn test_world_location_follows_carrier() {
        let mut world = world();
        let player = world.create_player("Shamino", AccessLevel::Player).unwrap();
        world.mobile_mut(player).unwrap().location = Point3D::new(1500, 1600, 5);
        let pack = world.get_mobile(player).unwrap().backpack().unwrap();
        let apple = world.spawn(Item::new("apple", 0x09D0));
        world.add_item(pack, apple).unwrap();
        assert_eq!(world.world_location(apple).unwrap(), Point3D::new(1500, 1600, 5));
    }
}
