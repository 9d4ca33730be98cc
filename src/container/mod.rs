//! Container engine.
//!
//! Containers are items carrying [`ContainerState`]. Structural operations live on
//! [`World`](crate::world::World) because they touch the parent chain: capacity checks
//! walk up it, totals propagate along it, and every specialization (bank box, secure
//! trade, corpse) hooks into it through [`ContainerKind`].

pub mod bank;
pub mod corpse;
pub mod data;
pub mod find;
pub mod hold;
pub mod place;
pub mod totals;
pub mod trade;

use std::collections::BTreeSet;

use crate::config::WorldConfig;
use crate::persist::{ReadStep, RecordReader, RecordWriter, VersionLadder, VersionedRecord};
use crate::world::errors::Result;
use crate::world::types::{Serial, Totals};

pub use bank::BankState;
pub use corpse::{CorpseFlags, CorpsePhase, CorpseState};
pub use data::{ContainerData, ContainerDataRegistry};
pub use hold::HoldOptions;
pub use trade::{SecureTrade, TradeId, TradeParty, TradeState};

/// Specialization of a container. Each variant overrides capacity or access policy
/// and carries its own persisted layer.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum ContainerKind {
    #[default]
    Plain,
    BankBox(BankState),
    SecureTrade(TradeState),
    Corpse(Box<CorpseState>),
}

impl ContainerKind {
    pub fn name(&self) -> &'static str {
        match self {
            ContainerKind::Plain => "container",
            ContainerKind::BankBox(_) => "bank box",
            ContainerKind::SecureTrade(_) => "secure trade container",
            ContainerKind::Corpse(_) => "corpse",
        }
    }

    /// Item limit used when the container carries the `-1` sentinel. Zero is unlimited.
    pub fn default_max_items(&self, config: &WorldConfig) -> i32 {
        match self {
            ContainerKind::Corpse(_) => 0,
            _ => config.default_max_items,
        }
    }

    /// Weight limit used when no override is set. Zero is unlimited.
    pub fn default_max_weight(&self, config: &WorldConfig) -> i32 {
        match self {
            ContainerKind::BankBox(_) | ContainerKind::Corpse(_) => 0,
            _ => config.default_max_weight,
        }
    }

    pub fn bank(&self) -> Option<&BankState> {
        match self {
            ContainerKind::BankBox(state) => Some(state),
            _ => None,
        }
    }

    pub fn trade(&self) -> Option<&TradeState> {
        match self {
            ContainerKind::SecureTrade(state) => Some(state),
            _ => None,
        }
    }

    pub fn corpse(&self) -> Option<&CorpseState> {
        match self {
            ContainerKind::Corpse(state) => Some(state),
            _ => None,
        }
    }

    pub(crate) fn corpse_mut(&mut self) -> Option<&mut CorpseState> {
        match self {
            ContainerKind::Corpse(state) => Some(state),
            _ => None,
        }
    }
}

/// Per-container state attached to an [`Item`](crate::world::Item).
#[derive(Debug, Clone, PartialEq)]
pub struct ContainerState {
    pub(crate) items: Vec<Serial>,
    /// `-1` uses the kind default, `0` is unlimited.
    pub max_items: i32,
    /// Explicit weight limit; `None` derives it from the kind and the parent.
    pub max_weight: Option<i32>,
    /// `-1` inherits from the registry entry for the item id.
    pub gump_id: i32,
    /// `-1` inherits from the registry entry for the item id.
    pub drop_sound: i32,
    /// Lets an immovable world container accept drops.
    pub lift_override: bool,
    pub(crate) totals: Totals,
    /// Mobiles viewing the container. Never persisted.
    pub(crate) openers: BTreeSet<Serial>,
    pub kind: ContainerKind,
}

impl Default for ContainerState {
    fn default() -> Self {
        Self::new(ContainerKind::Plain)
    }
}

impl ContainerState {
    pub fn new(kind: ContainerKind) -> Self {
        Self {
            items: Vec::new(),
            max_items: -1,
            max_weight: None,
            gump_id: -1,
            drop_sound: -1,
            lift_override: false,
            totals: Totals::default(),
            openers: BTreeSet::new(),
            kind,
        }
    }

    pub fn plain() -> Self {
        Self::new(ContainerKind::Plain)
    }

    pub fn with_max_items(mut self, max_items: i32) -> Self {
        self.max_items = max_items;
        self
    }

    pub fn with_max_weight(mut self, max_weight: i32) -> Self {
        self.max_weight = Some(max_weight);
        self
    }

    pub fn items(&self) -> &[Serial] {
        &self.items
    }

    pub fn totals(&self) -> Totals {
        self.totals
    }

    pub fn openers(&self) -> impl Iterator<Item = Serial> + '_ {
        self.openers.iter().copied()
    }

    pub fn is_open_to(&self, mobile: Serial) -> bool {
        self.openers.contains(&mobile)
    }
}

// ============================================================================
// Persistence (container layer)
// ============================================================================

fn read_container_v0(state: &mut ContainerState, reader: &mut RecordReader<'_>) -> Result<()> {
    state.items = reader.read_serial_list()?;
    state.gump_id = reader.read_i32()?;
    state.drop_sound = reader.read_i32()?;
    Ok(())
}

fn read_container_v1(state: &mut ContainerState, reader: &mut RecordReader<'_>) -> Result<()> {
    state.max_items = reader.read_i32()?;
    Ok(())
}

fn read_container_v2(state: &mut ContainerState, reader: &mut RecordReader<'_>) -> Result<()> {
    if reader.read_bool()? {
        state.max_weight = Some(reader.read_i32()?);
    }
    Ok(())
}

fn read_container_v3(state: &mut ContainerState, reader: &mut RecordReader<'_>) -> Result<()> {
    state.lift_override = reader.read_bool()?;
    Ok(())
}

fn read_container_v4(state: &mut ContainerState, reader: &mut RecordReader<'_>) -> Result<()> {
    state.totals = reader.read_totals()?;
    Ok(())
}

/// Layer version that first stored the aggregates.
pub const CONTAINER_TOTALS_VERSION: u32 = 4;

const CONTAINER_STEPS: &[ReadStep<ContainerState>] = &[
    read_container_v0,
    read_container_v1,
    read_container_v2,
    read_container_v3,
    read_container_v4,
];
static CONTAINER_LADDER: VersionLadder<ContainerState> =
    VersionLadder::new("container", CONTAINER_STEPS);

impl VersionedRecord for ContainerState {
    fn ladder() -> &'static VersionLadder<Self> {
        &CONTAINER_LADDER
    }

    /// Totals are written as they stand so a load can tell whether they drifted.
    fn write_fields(&self, writer: &mut RecordWriter) -> Result<()> {
        // v4
        writer.write_totals(self.totals)?;
        // v3
        writer.write_bool(self.lift_override)?;
        // v2
        writer.write_bool(self.max_weight.is_some())?;
        if let Some(max_weight) = self.max_weight {
            writer.write_i32(max_weight)?;
        }
        // v1
        writer.write_i32(self.max_items)?;
        // v0
        writer.write_serial_list(&self.items)?;
        writer.write_i32(self.gump_id)?;
        writer.write_i32(self.drop_sound)
    }
}
