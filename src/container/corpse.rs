//! Corpses.
//!
//! A corpse decays in two steps driven by the world scheduler: after the decay delay
//! it turns to bones and schedules the same delay again; when that runs out it is
//! deleted. While the instanced window is open, items assigned to a looter are visible
//! and liftable only by that looter.

use chrono::{DateTime, Duration, Utc};
use log::{debug, info};
use rand::Rng;
use std::collections::BTreeMap;

use super::{ContainerKind, ContainerState};
use crate::persist::{ReadStep, RecordReader, RecordWriter, VersionLadder, VersionedRecord};
use crate::world::errors::{Result, WorldError};
use crate::world::{Item, LootType, Packet, Point3D, Serial, TimerAction, TimerId, World};

pub const CORPSE_ID: u16 = 0x2006;
/// Bone graphics are picked from this range.
pub const BONES_IDS: std::ops::RangeInclusive<u16> = 0x0ECA..=0x0ED2;

pub const MSG_NO_LOOT_RIGHTS: &str = "You did not earn the right to loot this creature!";
pub const MSG_NOTHING_TO_CARVE: &str = "You see nothing useful to carve from the corpse.";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CorpseFlags(pub u8);

impl CorpseFlags {
    pub const CARVED: u8 = 0x01;
    pub const IS_BONES: u8 = 0x02;
    /// The next decay step deletes the corpse instead of leaving bones.
    pub const NO_BONES: u8 = 0x04;
    /// The owner has looted their own corpse.
    pub const SELF_LOOTED: u8 = 0x08;

    pub fn contains(self, flag: u8) -> bool {
        self.0 & flag != 0
    }

    pub fn insert(&mut self, flag: u8) {
        self.0 |= flag;
    }

    pub fn remove(&mut self, flag: u8) {
        self.0 &= !flag;
    }
}

/// Visible decay state. A deleted corpse no longer exists in the world.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CorpsePhase {
    Fresh,
    Bones,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CorpseState {
    pub owner: Option<Serial>,
    pub killer: Option<Serial>,
    pub corpse_name: String,
    pub time_of_death: DateTime<Utc>,
    pub flags: CorpseFlags,
    /// Mobiles that have taken something from the corpse.
    pub looters: Vec<Serial>,
    /// Mobiles entitled to loot while the instanced window is open.
    pub aggressors: Vec<Serial>,
    /// Where each item sat on its owner before death.
    pub restore_table: BTreeMap<Serial, Point3D>,
    /// Item to the looter it is reserved for.
    pub instanced_items: BTreeMap<Serial, Serial>,
    pub(crate) decay_timer: Option<TimerId>,
    pub decay_time: Option<DateTime<Utc>>,
}

impl Default for CorpseState {
    fn default() -> Self {
        Self {
            owner: None,
            killer: None,
            corpse_name: String::new(),
            time_of_death: DateTime::<Utc>::default(),
            flags: CorpseFlags::default(),
            looters: Vec::new(),
            aggressors: Vec::new(),
            restore_table: BTreeMap::new(),
            instanced_items: BTreeMap::new(),
            decay_timer: None,
            decay_time: None,
        }
    }
}

impl CorpseState {
    pub fn phase(&self) -> CorpsePhase {
        if self.flags.contains(CorpseFlags::IS_BONES) {
            CorpsePhase::Bones
        } else {
            CorpsePhase::Fresh
        }
    }

    pub fn decay_timer(&self) -> Option<TimerId> {
        self.decay_timer
    }
}

// ============================================================================
// Persistence (corpse layer)
// ============================================================================

fn read_corpse_v0(corpse: &mut CorpseState, reader: &mut RecordReader<'_>) -> Result<()> {
    corpse.owner = reader.read_opt_serial()?;
    corpse.corpse_name = reader.read_string()?;
    corpse.time_of_death = reader.read_delta_time()?;
    // Carving was a plain flag before the flag byte existed.
    if reader.read_bool()? {
        corpse.flags.insert(CorpseFlags::CARVED);
    }
    Ok(())
}

fn read_corpse_v1(corpse: &mut CorpseState, reader: &mut RecordReader<'_>) -> Result<()> {
    corpse.killer = reader.read_opt_serial()?;
    corpse.looters = reader.read_serial_list()?;
    corpse.aggressors = reader.read_serial_list()?;
    Ok(())
}

fn read_corpse_v2(corpse: &mut CorpseState, reader: &mut RecordReader<'_>) -> Result<()> {
    corpse.flags = CorpseFlags(reader.read_u8()?);
    Ok(())
}

fn read_corpse_v3(corpse: &mut CorpseState, reader: &mut RecordReader<'_>) -> Result<()> {
    let count = reader.read_u32()?;
    for _ in 0..count {
        let item = reader.read_serial()?;
        let location = reader.read_point()?;
        corpse.restore_table.insert(item, location);
    }
    Ok(())
}

fn read_corpse_v4(corpse: &mut CorpseState, reader: &mut RecordReader<'_>) -> Result<()> {
    if reader.read_bool()? {
        corpse.decay_time = Some(reader.read_delta_time()?);
    }
    Ok(())
}

fn read_corpse_v5(corpse: &mut CorpseState, reader: &mut RecordReader<'_>) -> Result<()> {
    let count = reader.read_u32()?;
    for _ in 0..count {
        let item = reader.read_serial()?;
        let holder = reader.read_serial()?;
        corpse.instanced_items.insert(item, holder);
    }
    Ok(())
}

const CORPSE_STEPS: &[ReadStep<CorpseState>] = &[
    read_corpse_v0,
    read_corpse_v1,
    read_corpse_v2,
    read_corpse_v3,
    read_corpse_v4,
    read_corpse_v5,
];
static CORPSE_LADDER: VersionLadder<CorpseState> = VersionLadder::new("corpse", CORPSE_STEPS);

impl VersionedRecord for CorpseState {
    fn ladder() -> &'static VersionLadder<Self> {
        &CORPSE_LADDER
    }

    fn write_fields(&self, writer: &mut RecordWriter) -> Result<()> {
        // v5
        writer.write_u32(self.instanced_items.len() as u32)?;
        for (item, holder) in &self.instanced_items {
            writer.write_serial(*item)?;
            writer.write_serial(*holder)?;
        }
        // v4
        writer.write_bool(self.decay_time.is_some())?;
        if let Some(decay_time) = self.decay_time {
            writer.write_delta_time(decay_time)?;
        }
        // v3
        writer.write_u32(self.restore_table.len() as u32)?;
        for (item, location) in &self.restore_table {
            writer.write_serial(*item)?;
            writer.write_point(*location)?;
        }
        // v2
        writer.write_u8(self.flags.0)?;
        // v1
        writer.write_opt_serial(self.killer)?;
        writer.write_serial_list(&self.looters)?;
        writer.write_serial_list(&self.aggressors)?;
        // v0
        writer.write_opt_serial(self.owner)?;
        writer.write_string(&self.corpse_name)?;
        writer.write_delta_time(self.time_of_death)?;
        writer.write_bool(self.flags.contains(CorpseFlags::CARVED))
    }
}

// ============================================================================
// Corpse operations
// ============================================================================

impl World {
    pub fn corpse_state(&self, corpse: Serial) -> Result<&CorpseState> {
        self.container(corpse)?
            .kind
            .corpse()
            .ok_or(WorldError::NotAContainer(corpse))
    }

    pub(crate) fn corpse_state_mut(&mut self, corpse: Serial) -> Result<&mut CorpseState> {
        self.container_mut(corpse)?
            .kind
            .corpse_mut()
            .ok_or(WorldError::NotAContainer(corpse))
    }

    pub fn corpse_phase(&self, corpse: Serial) -> Result<CorpsePhase> {
        Ok(self.corpse_state(corpse)?.phase())
    }

    /// An empty corpse on the ground with its decay timer running.
    pub fn create_corpse(
        &mut self,
        owner: Option<Serial>,
        name: &str,
        location: Point3D,
    ) -> Result<Serial> {
        let state = CorpseState {
            owner,
            corpse_name: name.to_string(),
            time_of_death: self.now(),
            ..CorpseState::default()
        };
        let mut item = Item::new("corpse", CORPSE_ID)
            .with_weight(0.0)
            .immovable()
            .with_name(name)
            .with_container(ContainerState::new(ContainerKind::Corpse(Box::new(state))));
        item.location = location;
        let corpse = self.spawn(item);
        self.begin_decay(corpse, self.config().corpse.decay_delay())?;
        debug!("Created corpse {} for {}", corpse, name);
        Ok(corpse)
    }

    /// Lay out a dead mobile: everything it carries that is not blessed moves into a
    /// new corpse, remembering where it sat.
    pub fn create_corpse_from(&mut self, mobile: Serial, killer: Option<Serial>) -> Result<Serial> {
        let (name, location, worn, backpack, bank) = {
            let record = self.get_mobile(mobile)?;
            (
                record.name.clone(),
                record.location,
                record.items.clone(),
                record.backpack,
                record.bank_box,
            )
        };
        let corpse = self.create_corpse(Some(mobile), &format!("corpse of {}", name), location)?;
        {
            let state = self.corpse_state_mut(corpse)?;
            state.killer = killer;
            if let Some(killer) = killer {
                state.aggressors.push(killer);
            }
        }

        let mut moving = Vec::new();
        if let Some(pack) = backpack {
            moving.extend(self.container(pack)?.items.iter().copied());
        }
        moving.extend(
            worn.into_iter()
                .filter(|serial| Some(*serial) != backpack && Some(*serial) != bank),
        );

        for item in moving {
            let (loot_type, at) = {
                let record = self.get_item(item)?;
                (record.loot_type, record.location)
            };
            if matches!(loot_type, LootType::Blessed | LootType::Newbied) {
                continue;
            }
            self.add_item(corpse, item)?;
            self.corpse_state_mut(corpse)?.restore_table.insert(item, at);
        }
        info!("{} died, corpse {}", name, corpse);
        Ok(corpse)
    }

    /// (Re)start the decay timer `delay` from now.
    pub fn begin_decay(&mut self, corpse: Serial, delay: Duration) -> Result<()> {
        let deadline = self.now() + delay;
        self.schedule_decay_at(corpse, deadline)
    }

    pub(crate) fn schedule_decay_at(&mut self, corpse: Serial, deadline: DateTime<Utc>) -> Result<()> {
        if let Some(previous) = self.corpse_state_mut(corpse)?.decay_timer.take() {
            self.timers.cancel(previous);
        }
        let timer = self.timers.schedule(deadline, TimerAction::CorpseDecay(corpse));
        let state = self.corpse_state_mut(corpse)?;
        state.decay_timer = Some(timer);
        state.decay_time = Some(deadline);
        Ok(())
    }

    pub(crate) fn on_decay_timer(&mut self, corpse: Serial) -> Result<()> {
        let Ok(state) = self.corpse_state_mut(corpse) else {
            return Ok(());
        };
        state.decay_timer = None;
        state.decay_time = None;
        if state.flags.contains(CorpseFlags::NO_BONES) {
            debug!("Corpse {} decayed away", corpse);
            self.delete(corpse)
        } else {
            self.turn_to_bones(corpse)
        }
    }

    /// Swap to a bone graphic and restart decay; the next step deletes the corpse.
    pub fn turn_to_bones(&mut self, corpse: Serial) -> Result<()> {
        let bones = self.rng.gen_range(BONES_IDS);
        let openers: Vec<Serial> = self.container(corpse)?.openers().collect();
        self.container_mut(corpse)?.openers.clear();
        for opener in openers {
            self.send(Packet::RemoveEntity {
                to: opener,
                entity: corpse,
            });
        }

        let item = self.item_mut(corpse)?;
        item.item_id = bones;
        item.hue = 0;
        let state = self.corpse_state_mut(corpse)?;
        state.flags.insert(CorpseFlags::NO_BONES | CorpseFlags::IS_BONES);
        debug!("Corpse {} turned to bones", corpse);
        self.begin_decay(corpse, self.config().corpse.decay_delay())
    }

    /// Mark the corpse carved and restart its decay.
    pub fn carve(&mut self, actor: Serial, corpse: Serial) -> Result<bool> {
        let state = self.corpse_state(corpse)?;
        if state.flags.contains(CorpseFlags::CARVED) || state.flags.contains(CorpseFlags::IS_BONES) {
            self.announce(Some(actor), MSG_NOTHING_TO_CARVE);
            return Ok(false);
        }
        self.corpse_state_mut(corpse)?.flags.insert(CorpseFlags::CARVED);
        self.begin_decay(corpse, self.config().corpse.decay_delay())?;
        Ok(true)
    }

    pub fn is_instanced_window(&self, corpse: Serial) -> bool {
        match self.corpse_state(corpse) {
            Ok(state) => self.now() < state.time_of_death + self.config().corpse.instanced_window(),
            Err(_) => false,
        }
    }

    /// Reserve the corpse contents among `holders`: whole items round-robin, stacks
    /// split evenly with the remainder going to the first holder.
    pub fn assign_instanced_loot(&mut self, corpse: Serial, holders: &[Serial]) -> Result<()> {
        if holders.is_empty() {
            return Ok(());
        }
        let contents = self.container(corpse)?.items.clone();
        let mut assigned = BTreeMap::new();
        let mut next = 0usize;

        for serial in contents {
            let (stackable, amount) = {
                let item = self.get_item(serial)?;
                (item.stackable && !item.is_container(), item.amount())
            };
            if !stackable || holders.len() == 1 {
                assigned.insert(serial, holders[next % holders.len()]);
                next += 1;
                continue;
            }

            let share = amount / holders.len() as u32;
            let remainder = amount % holders.len() as u32;
            if share == 0 {
                assigned.insert(serial, holders[0]);
                continue;
            }
            self.set_amount(serial, share + remainder)?;
            assigned.insert(serial, holders[0]);
            for holder in &holders[1..] {
                let copy = self.duplicate_pile(serial, share)?;
                self.add_item(corpse, copy)?;
                assigned.insert(copy, *holder);
            }
        }

        let state = self.corpse_state_mut(corpse)?;
        state.instanced_items = assigned;
        for holder in holders {
            if !state.aggressors.contains(holder) {
                state.aggressors.push(*holder);
            }
        }
        Ok(())
    }

    fn duplicate_pile(&mut self, serial: Serial, amount: u32) -> Result<Serial> {
        let mut copy = self.get_item(serial)?.clone();
        copy.container = None;
        copy.amount = amount;
        Ok(self.spawn(copy))
    }

    /// Whether `viewer` sees `item` when looking into `container`.
    pub fn can_see_item(&self, viewer: Serial, container: Serial, item: Serial) -> bool {
        let Ok(state) = self.corpse_state(container) else {
            return true;
        };
        if self.is_elevated(Some(viewer)) || !self.is_instanced_window(container) {
            return true;
        }
        match state.instanced_items.get(&item) {
            Some(holder) => *holder == viewer,
            None => true,
        }
    }

    /// Looting rights: staff and the owner always; inside the instanced window a
    /// reserved item only for its holder and anything else for the killer and
    /// aggressors; afterwards anyone.
    pub fn can_loot(&self, actor: Serial, corpse: Serial, item: Serial) -> bool {
        let Ok(state) = self.corpse_state(corpse) else {
            return true;
        };
        if self.is_elevated(Some(actor)) || state.owner == Some(actor) {
            return true;
        }
        if !self.is_instanced_window(corpse) {
            return true;
        }
        match state.instanced_items.get(&item) {
            Some(holder) => *holder == actor,
            None => state.killer == Some(actor) || state.aggressors.contains(&actor),
        }
    }

    pub(crate) fn record_looter(&mut self, corpse: Serial, actor: Serial) -> Result<()> {
        let state = self.corpse_state_mut(corpse)?;
        if state.owner == Some(actor) {
            state.flags.insert(CorpseFlags::SELF_LOOTED);
        } else if !state.looters.contains(&actor) {
            state.looters.push(actor);
        }
        Ok(())
    }

    /// Move every item with a recorded restore location back into `mobile`'s backpack
    /// at that location. Returns how many moved.
    pub fn restore_equipment(&mut self, corpse: Serial, mobile: Serial) -> Result<usize> {
        let Some(pack) = self.get_mobile(mobile)?.backpack() else {
            return Ok(0);
        };
        let contents = self.container(corpse)?.items.clone();
        let mut restored = 0;
        for item in contents {
            let Some(location) = self.corpse_state(corpse)?.restore_table.get(&item).copied() else {
                continue;
            };
            if !self.check_hold(Some(mobile), pack, item, super::HoldOptions::quiet()) {
                continue;
            }
            self.add_item(pack, item)?;
            self.item_mut(item)?.location = location;
            self.corpse_state_mut(corpse)?.restore_table.remove(&item);
            restored += 1;
        }
        Ok(restored)
    }

    /// Restart decay timers after a load: at the stored deadline, or a fresh full delay
    /// when none was stored.
    pub(crate) fn restart_corpse_timers(&mut self) -> Result<usize> {
        let corpses: Vec<(Serial, Option<DateTime<Utc>>)> = self
            .items
            .values()
            .filter_map(|item| {
                let state = item.container()?.kind.corpse()?;
                Some((item.serial(), state.decay_time))
            })
            .collect();
        let count = corpses.len();
        for (corpse, deadline) in corpses {
            match deadline {
                Some(deadline) => self.schedule_decay_at(corpse, deadline)?,
                None => self.begin_decay(corpse, self.config().corpse.decay_delay())?,
            }
        }
        Ok(count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::WorldConfig;
    use crate::container::ContainerDataRegistry;
    use crate::world::{AccessLevel, Parent};
    use std::sync::Arc;

    fn world() -> World {
        let mut world = World::new(
            WorldConfig::default(),
            Arc::new(ContainerDataRegistry::default()),
            Utc::now(),
        );
        world.seed_rng(11);
        world
    }

    #[test]
    fn test_corpse_takes_unblessed_items() {
        let mut world = world();
        let victim = world.create_player("Sentri", AccessLevel::Player).unwrap();
        let killer = world.create_player("Blackthorn", AccessLevel::Player).unwrap();
        let pack = world.get_mobile(victim).unwrap().backpack().unwrap();
        let sword = world.spawn(Item::new("sword", 0x0F5E).with_weight(6.0));
        let ring = world.spawn(Item::new("ring", 0x108A).with_loot_type(LootType::Blessed));
        world.add_item(pack, sword).unwrap();
        world.add_item(pack, ring).unwrap();
        world.item_mut(sword).unwrap().location = Point3D::new(60, 80, 0);

        let corpse = world.create_corpse_from(victim, Some(killer)).unwrap();
        assert_eq!(world.get_item(sword).unwrap().parent(), Parent::Item(corpse));
        assert_eq!(world.get_item(ring).unwrap().parent(), Parent::Item(pack));
        let state = world.corpse_state(corpse).unwrap();
        assert_eq!(state.killer, Some(killer));
        assert_eq!(state.restore_table.get(&sword), Some(&Point3D::new(60, 80, 0)));

        assert_eq!(world.restore_equipment(corpse, victim).unwrap(), 1);
        assert_eq!(world.get_item(sword).unwrap().parent(), Parent::Item(pack));
        assert_eq!(world.get_item(sword).unwrap().location, Point3D::new(60, 80, 0));
    }

    #[test]
    fn test_carve_once() {
        let mut world = world();
        let butcher = world.create_player("Butcher", AccessLevel::Player).unwrap();
        let corpse = world.create_corpse(None, "a deer", Point3D::default()).unwrap();
        let first_deadline = world.corpse_state(corpse).unwrap().decay_time;

        world.advance(Duration::minutes(2)).unwrap();
        assert!(world.carve(butcher, corpse).unwrap());
        assert!(world.corpse_state(corpse).unwrap().decay_time > first_deadline);
        assert!(!world.carve(butcher, corpse).unwrap());
        assert_eq!(
            world.drain_outbox().last(),
            Some(&Packet::Message {
                to: butcher,
                text: MSG_NOTHING_TO_CARVE.to_string()
            })
        );
    }

    #[test]
    fn test_instanced_loot_splits_stacks_and_gates_visibility() {
        let mut world = world();
        let a = world.create_player("Iolo", AccessLevel::Player).unwrap();
        let b = world.create_player("Gwenno", AccessLevel::Player).unwrap();
        let corpse = world.create_corpse(None, "a troll", Point3D::default()).unwrap();
        let coins = world.spawn(Item::gold(101));
        let axe = world.spawn(Item::new("axe", 0x0F49));
        let mace = world.spawn(Item::new("mace", 0x0F5C));
        world.add_item(corpse, coins).unwrap();
        world.add_item(corpse, axe).unwrap();
        world.add_item(corpse, mace).unwrap();

        world.assign_instanced_loot(corpse, &[a, b]).unwrap();
        assert_eq!(world.get_item(coins).unwrap().amount(), 51);
        assert_eq!(world.get_amount(corpse, &["gold"], false), 101);

        let state = world.corpse_state(corpse).unwrap().clone();
        assert_eq!(state.instanced_items.get(&axe), Some(&a));
        assert_eq!(state.instanced_items.get(&mace), Some(&b));
        assert!(world.can_see_item(a, corpse, axe));
        assert!(!world.can_see_item(b, corpse, axe));
        assert!(!world.can_loot(b, corpse, axe));
        assert!(world.can_loot(b, corpse, mace));

        world.advance(Duration::minutes(4)).unwrap();
        assert!(world.can_see_item(b, corpse, axe));
        assert!(world.can_loot(b, corpse, axe));
    }

    #[test]
    fn test_loot_rights_outside_assignment() {
        let mut world = world();
        let owner = world.create_player("Owner", AccessLevel::Player).unwrap();
        let stranger = world.create_player("Stranger", AccessLevel::Player).unwrap();
        let corpse = world.create_corpse(Some(owner), "corpse of Owner", Point3D::default()).unwrap();
        let apple = world.spawn(Item::new("apple", 0x09D0));
        world.add_item(corpse, apple).unwrap();

        assert!(!world.lift_item(stranger, apple).unwrap());
        assert!(world.lift_item(owner, apple).unwrap());
        let state = world.corpse_state(corpse).unwrap();
        assert!(state.flags.contains(CorpseFlags::SELF_LOOTED));
    }
}
