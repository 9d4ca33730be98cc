use crate::container::ContainerState;
use crate::persist::{ReadStep, RecordReader, RecordWriter, VersionLadder, VersionedRecord};

use super::errors::Result;
use super::types::{ItemKind, LootType, Parent, Point3D, Rect2D, Serial, Totals};

/// Largest amount a single stack may reach through merging.
pub const DEFAULT_MAX_STACK_AMOUNT: u32 = 60_000;

/// A world item. Items with `container` state hold other items.
#[derive(Debug, Clone, PartialEq)]
pub struct Item {
    pub(crate) serial: Serial,
    pub kind: ItemKind,
    /// Visual (graphic) id.
    pub item_id: u16,
    pub(crate) amount: u32,
    /// Weight of one unit.
    pub weight: f64,
    pub hue: i32,
    pub name: Option<String>,
    /// World coordinates, or the display position when inside a container.
    pub location: Point3D,
    pub(crate) parent: Parent,
    pub movable: bool,
    pub stackable: bool,
    pub(crate) virtual_item: bool,
    pub loot_type: LootType,
    /// Graphic bounds used to keep the item inside a container gump. Not persisted.
    pub footprint: Rect2D,
    pub(crate) container: Option<ContainerState>,
}

impl Item {
    pub fn new(kind: impl Into<ItemKind>, item_id: u16) -> Self {
        Self {
            serial: Serial::ZERO,
            kind: kind.into(),
            item_id,
            amount: 1,
            weight: 1.0,
            hue: 0,
            name: None,
            location: Point3D::default(),
            parent: Parent::World,
            movable: true,
            stackable: false,
            virtual_item: false,
            loot_type: LootType::Regular,
            footprint: Rect2D::default(),
            container: None,
        }
    }

    /// A pile of gold coins at 0.02 stones each.
    pub fn gold(amount: u32) -> Self {
        Self::new(ItemKind::GOLD, 0x0EED)
            .with_amount(amount)
            .with_weight(0.02)
            .stackable()
    }

    pub fn with_amount(mut self, amount: u32) -> Self {
        self.amount = amount.max(1);
        self
    }

    pub fn with_weight(mut self, weight: f64) -> Self {
        self.weight = weight;
        self
    }

    pub fn with_hue(mut self, hue: i32) -> Self {
        self.hue = hue;
        self
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn with_footprint(mut self, width: i32, height: i32) -> Self {
        self.footprint = Rect2D::new(0, 0, width, height);
        self
    }

    pub fn with_loot_type(mut self, loot_type: LootType) -> Self {
        self.loot_type = loot_type;
        self
    }

    pub fn stackable(mut self) -> Self {
        self.stackable = true;
        self
    }

    pub fn immovable(mut self) -> Self {
        self.movable = false;
        self
    }

    pub fn virtual_item(mut self) -> Self {
        self.virtual_item = true;
        self
    }

    pub fn with_container(mut self, state: ContainerState) -> Self {
        self.container = Some(state);
        self
    }

    pub fn serial(&self) -> Serial {
        self.serial
    }

    pub fn amount(&self) -> u32 {
        self.amount
    }

    pub fn parent(&self) -> Parent {
        self.parent
    }

    pub fn is_virtual(&self) -> bool {
        self.virtual_item
    }

    pub fn is_container(&self) -> bool {
        self.container.is_some()
    }

    pub fn container(&self) -> Option<&ContainerState> {
        self.container.as_ref()
    }

    pub(crate) fn container_mut(&mut self) -> Option<&mut ContainerState> {
        self.container.as_mut()
    }

    /// Children in display order; empty for plain items.
    pub fn items(&self) -> &[Serial] {
        self.container
            .as_ref()
            .map(|c| c.items.as_slice())
            .unwrap_or(&[])
    }

    /// Weight of the whole pile, rounded up to whole stones.
    pub fn pile_weight(&self) -> i64 {
        // Tolerance keeps exact products such as 0.02 * 500 from rounding up a stone.
        let raw = self.weight * self.amount as f64;
        (raw - 1e-9).ceil().max(0.0) as i64
    }

    /// Gold carried by this item itself, not counting contents.
    pub fn own_gold(&self) -> i64 {
        if self.kind.is_gold() {
            self.amount as i64
        } else {
            0
        }
    }

    /// Aggregates over this item's contents.
    pub fn subtree_totals(&self) -> Totals {
        self.container
            .as_ref()
            .map(|c| c.totals)
            .unwrap_or_default()
    }

    /// What this item adds to its parent's aggregates: its contents plus itself.
    pub fn contribution(&self) -> Totals {
        let sub = self.subtree_totals();
        Totals {
            gold: sub.gold + self.own_gold(),
            items: sub.items + 1,
            weight: sub.weight + self.pile_weight(),
        }
    }

    /// Stack compatibility, not counting capacity.
    pub fn can_stack_with(&self, other: &Item, max_stack_amount: u32) -> bool {
        self.serial != other.serial
            && self.stackable
            && other.stackable
            && !self.is_container()
            && !other.is_container()
            && self.kind == other.kind
            && self.item_id == other.item_id
            && self.hue == other.hue
            && self.name == other.name
            && self.amount as u64 + other.amount as u64 <= max_stack_amount as u64
    }

    /// A blank record for the loader to fill in.
    pub(crate) fn blank(serial: Serial) -> Self {
        let mut item = Item::new(ItemKind::new(""), 0);
        item.serial = serial;
        item
    }
}

// ============================================================================
// Persistence (item layer)
// ============================================================================

const FLAG_MOVABLE: u8 = 0x01;
const FLAG_STACKABLE: u8 = 0x02;
const FLAG_VIRTUAL: u8 = 0x04;

fn read_item_v0(item: &mut Item, reader: &mut RecordReader<'_>) -> Result<()> {
    item.kind = ItemKind::new(reader.read_string()?);
    item.item_id = reader.read_u16()?;
    item.amount = reader.read_u32()?.max(1);
    item.weight = reader.read_f64()?;
    item.location = reader.read_point()?;
    item.parent = match reader.read_u8()? {
        1 => Parent::Item(reader.read_serial()?),
        2 => Parent::Mobile(reader.read_serial()?),
        _ => Parent::World,
    };
    Ok(())
}

fn read_item_v1(item: &mut Item, reader: &mut RecordReader<'_>) -> Result<()> {
    let flags = reader.read_u8()?;
    item.movable = flags & FLAG_MOVABLE != 0;
    item.stackable = flags & FLAG_STACKABLE != 0;
    item.virtual_item = flags & FLAG_VIRTUAL != 0;
    Ok(())
}

fn read_item_v2(item: &mut Item, reader: &mut RecordReader<'_>) -> Result<()> {
    item.hue = reader.read_i32()?;
    item.name = reader.read_opt_string()?;
    Ok(())
}

fn read_item_v3(item: &mut Item, reader: &mut RecordReader<'_>) -> Result<()> {
    item.loot_type = LootType::from_u8(reader.read_u8()?);
    Ok(())
}

const ITEM_STEPS: &[ReadStep<Item>] = &[read_item_v0, read_item_v1, read_item_v2, read_item_v3];
static ITEM_LADDER: VersionLadder<Item> = VersionLadder::new("item", ITEM_STEPS);

impl VersionedRecord for Item {
    fn ladder() -> &'static VersionLadder<Self> {
        &ITEM_LADDER
    }

    fn write_fields(&self, writer: &mut RecordWriter) -> Result<()> {
        // v3
        writer.write_u8(self.loot_type.to_u8())?;
        // v2
        writer.write_i32(self.hue)?;
        writer.write_opt_string(self.name.as_deref())?;
        // v1
        let mut flags = 0u8;
        if self.movable {
            flags |= FLAG_MOVABLE;
        }
        if self.stackable {
            flags |= FLAG_STACKABLE;
        }
        if self.virtual_item {
            flags |= FLAG_VIRTUAL;
        }
        writer.write_u8(flags)?;
        // v0
        writer.write_string(self.kind.as_str())?;
        writer.write_u16(self.item_id)?;
        writer.write_u32(self.amount)?;
        writer.write_f64(self.weight)?;
        writer.write_point(self.location)?;
        match self.parent {
            Parent::World => writer.write_u8(0),
            Parent::Item(serial) => {
                writer.write_u8(1)?;
                writer.write_serial(serial)
            }
            Parent::Mobile(serial) => {
                writer.write_u8(2)?;
                writer.write_serial(serial)
            }
        }
    }
}
