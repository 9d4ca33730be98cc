//! Bank boxes: owner-bound, virtual, unlimited by weight and gated on being open.

use log::debug;

use super::ContainerKind;
use crate::persist::{ReadStep, RecordReader, RecordWriter, VersionLadder, VersionedRecord};
use crate::world::errors::{Result, WorldError};
use crate::world::{Packet, Serial, World};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BankState {
    pub owner: Option<Serial>,
    pub open: bool,
}

fn read_bank_v0(state: &mut BankState, reader: &mut RecordReader<'_>) -> Result<()> {
    state.owner = reader.read_opt_serial()?;
    Ok(())
}

fn read_bank_v1(state: &mut BankState, reader: &mut RecordReader<'_>) -> Result<()> {
    state.open = reader.read_bool()?;
    Ok(())
}

const BANK_STEPS: &[ReadStep<BankState>] = &[read_bank_v0, read_bank_v1];
static BANK_LADDER: VersionLadder<BankState> = VersionLadder::new("bank box", BANK_STEPS);

impl VersionedRecord for BankState {
    fn ladder() -> &'static VersionLadder<Self> {
        &BANK_LADDER
    }

    fn write_fields(&self, writer: &mut RecordWriter) -> Result<()> {
        writer.write_bool(self.open)?;
        writer.write_opt_serial(self.owner)
    }
}

impl World {
    fn bank_state(&self, bank: Serial) -> Result<&BankState> {
        self.container(bank)?
            .kind
            .bank()
            .ok_or(WorldError::NotAContainer(bank))
    }

    fn bank_state_mut(&mut self, bank: Serial) -> Result<&mut BankState> {
        match &mut self.container_mut(bank)?.kind {
            ContainerKind::BankBox(state) => Ok(state),
            _ => Err(WorldError::NotAContainer(bank)),
        }
    }

    /// The owner may use an open box; staff may always.
    pub fn bank_accessible(&self, actor: Serial, bank: Serial) -> bool {
        if self.is_elevated(Some(actor)) {
            return true;
        }
        match self.bank_state(bank) {
            Ok(state) => state.open && state.owner == Some(actor),
            Err(_) => false,
        }
    }

    pub fn is_bank_open(&self, bank: Serial) -> bool {
        self.bank_state(bank).map_or(false, |state| state.open)
    }

    /// Open the box, tell the owner what is inside and show it.
    pub fn open_bank(&mut self, bank: Serial) -> Result<()> {
        let state = self.bank_state_mut(bank)?;
        state.open = true;
        let Some(owner) = state.owner else {
            return Ok(());
        };

        let totals = self.container(bank)?.totals();
        self.send(Packet::Message {
            to: owner,
            text: format!(
                "Bank container has {} items, {} stones",
                totals.items, totals.weight
            ),
        });
        self.send(Packet::EquipUpdate {
            to: owner,
            item: bank,
            mobile: owner,
        });
        self.display_to(owner, bank)?;
        debug!("Opened bank box {} for {}", bank, owner);
        Ok(())
    }

    pub fn close_bank(&mut self, bank: Serial) -> Result<()> {
        let state = self.bank_state_mut(bank)?;
        state.open = false;
        let owner = state.owner;
        if let Some(owner) = owner {
            self.container_mut(bank)?.openers.remove(&owner);
            if self.config().bank.send_remove_on_close {
                self.send(Packet::RemoveEntity {
                    to: owner,
                    entity: bank,
                });
            }
        }
        Ok(())
    }
}
