use serde::{Deserialize, Serialize};
use std::fmt;

/// Unique identity of a world entity. Items and mobiles draw from separate ranges.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Serial(pub u32);

impl Serial {
    pub const ZERO: Serial = Serial(0);

    pub fn value(self) -> u32 {
        self.0
    }

    /// Big-endian bytes, used as sled keys so iteration follows serial order.
    pub fn to_key(self) -> [u8; 4] {
        self.0.to_be_bytes()
    }

    pub fn from_key(bytes: &[u8]) -> Option<Self> {
        let raw: [u8; 4] = bytes.try_into().ok()?;
        Some(Serial(u32::from_be_bytes(raw)))
    }
}

impl fmt::Display for Serial {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{:08X}", self.0)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Point3D {
    pub x: i32,
    pub y: i32,
    pub z: i32,
}

impl Point3D {
    pub fn new(x: i32, y: i32, z: i32) -> Self {
        Self { x, y, z }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Rect2D {
    pub x: i32,
    pub y: i32,
    pub width: i32,
    pub height: i32,
}

impl Rect2D {
    pub fn new(x: i32, y: i32, width: i32, height: i32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    /// True when the point lies inside the rectangle (right/bottom edges exclusive).
    pub fn contains(&self, x: i32, y: i32) -> bool {
        x >= self.x && y >= self.y && x < self.x + self.width && y < self.y + self.height
    }
}

/// Type tag of an item. Typed searches match on it.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ItemKind(String);

impl ItemKind {
    /// Gold coins; their amount counts toward `total_gold`.
    pub const GOLD: &'static str = "gold";
    /// Matches any item that carries container state, whatever its own kind.
    pub const ANY_CONTAINER: &'static str = "container";

    pub fn new(kind: impl Into<String>) -> Self {
        Self(kind.into().to_ascii_lowercase())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_gold(&self) -> bool {
        self.0 == Self::GOLD
    }
}

impl From<&str> for ItemKind {
    fn from(value: &str) -> Self {
        ItemKind::new(value)
    }
}

impl fmt::Display for ItemKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AccessLevel {
    #[default]
    Player,
    Counselor,
    GameMaster,
    Seer,
    Administrator,
}

impl AccessLevel {
    /// Game masters and above bypass container access and display restrictions.
    pub fn is_elevated(self) -> bool {
        self >= AccessLevel::GameMaster
    }

    pub fn to_u8(self) -> u8 {
        match self {
            AccessLevel::Player => 0,
            AccessLevel::Counselor => 1,
            AccessLevel::GameMaster => 2,
            AccessLevel::Seer => 3,
            AccessLevel::Administrator => 4,
        }
    }

    pub fn from_u8(raw: u8) -> Self {
        match raw {
            0 => AccessLevel::Player,
            1 => AccessLevel::Counselor,
            2 => AccessLevel::GameMaster,
            3 => AccessLevel::Seer,
            _ => AccessLevel::Administrator,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LootType {
    #[default]
    Regular,
    Newbied,
    Blessed,
    Cursed,
}

impl LootType {
    pub fn to_u8(self) -> u8 {
        match self {
            LootType::Regular => 0,
            LootType::Newbied => 1,
            LootType::Blessed => 2,
            LootType::Cursed => 3,
        }
    }

    pub fn from_u8(raw: u8) -> Self {
        match raw {
            1 => LootType::Newbied,
            2 => LootType::Blessed,
            3 => LootType::Cursed,
            _ => LootType::Regular,
        }
    }
}

/// Where an item lives. Parents are stored as serials; the parent owns the child list.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Parent {
    /// Lying in the world.
    #[default]
    World,
    /// Inside a container item.
    Item(Serial),
    /// Worn or layered on a mobile.
    Mobile(Serial),
}

impl Parent {
    pub fn item(&self) -> Option<Serial> {
        match self {
            Parent::Item(serial) => Some(*serial),
            _ => None,
        }
    }

    pub fn mobile(&self) -> Option<Serial> {
        match self {
            Parent::Mobile(serial) => Some(*serial),
            _ => None,
        }
    }

    pub fn is_world(&self) -> bool {
        matches!(self, Parent::World)
    }
}

/// Which running aggregate an update targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TotalType {
    Gold,
    Items,
    Weight,
}

/// Running aggregates over a subtree.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Totals {
    pub gold: i64,
    pub items: i64,
    pub weight: i64,
}

impl Totals {
    pub fn get(&self, kind: TotalType) -> i64 {
        match kind {
            TotalType::Gold => self.gold,
            TotalType::Items => self.items,
            TotalType::Weight => self.weight,
        }
    }

    pub fn adjust(&mut self, kind: TotalType, delta: i64) {
        match kind {
            TotalType::Gold => self.gold += delta,
            TotalType::Items => self.items += delta,
            TotalType::Weight => self.weight += delta,
        }
    }
}

impl std::ops::AddAssign for Totals {
    fn add_assign(&mut self, rhs: Self) {
        self.gold += rhs.gold;
        self.items += rhs.items;
        self.weight += rhs.weight;
    }
}
