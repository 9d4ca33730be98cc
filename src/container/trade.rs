//! Secure trades.
//!
//! Each party offers items in their own trade container. Any change anywhere below
//! either container clears both acceptances, so an accepted trade always reflects what
//! is on the table. Sessions are not persisted.

use log::{debug, info, trace};
use std::fmt;

use super::{ContainerKind, ContainerState};
use crate::persist::{ReadStep, RecordReader, RecordWriter, VersionLadder, VersionedRecord};
use crate::world::errors::{Result, WorldError};
use crate::world::{Item, Packet, Serial, World};

/// Graphic of a trade container.
pub const TRADE_CONTAINER_ID: u16 = 0x1E5E;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TradeId(pub u32);

impl fmt::Display for TradeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "trade#{}", self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TradeParty {
    pub mobile: Serial,
    pub container: Serial,
    pub accepted: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SecureTrade {
    pub id: TradeId,
    pub from: TradeParty,
    pub to: TradeParty,
}

impl SecureTrade {
    fn party_mut(&mut self, mobile: Serial) -> Option<&mut TradeParty> {
        if self.from.mobile == mobile {
            Some(&mut self.from)
        } else if self.to.mobile == mobile {
            Some(&mut self.to)
        } else {
            None
        }
    }
}

/// Link from a trade container back to its session.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TradeState {
    pub trade: Option<TradeId>,
}

fn read_trade_v0(_state: &mut TradeState, _reader: &mut RecordReader<'_>) -> Result<()> {
    Ok(())
}

const TRADE_STEPS: &[ReadStep<TradeState>] = &[read_trade_v0];
static TRADE_LADDER: VersionLadder<TradeState> =
    VersionLadder::new("secure trade container", TRADE_STEPS);

impl VersionedRecord for TradeState {
    fn ladder() -> &'static VersionLadder<Self> {
        &TRADE_LADDER
    }

    /// The session link is transient; only the version tag is stored.
    fn write_fields(&self, _writer: &mut RecordWriter) -> Result<()> {
        Ok(())
    }
}

impl World {
    pub fn trade(&self, id: TradeId) -> Option<&SecureTrade> {
        self.trades.get(&id)
    }

    pub fn trades(&self) -> impl Iterator<Item = &SecureTrade> {
        self.trades.values()
    }

    fn trade_of(&self, container: Serial) -> Option<TradeId> {
        self.item(container)
            .and_then(Item::container)
            .and_then(|state| state.kind.trade())
            .and_then(|state| state.trade)
    }

    /// The mobile receiving whatever is put into `container`.
    pub fn trade_recipient(&self, container: Serial) -> Option<Serial> {
        let trade = self.trades.get(&self.trade_of(container)?)?;
        if trade.from.container == container {
            Some(trade.to.mobile)
        } else {
            Some(trade.from.mobile)
        }
    }

    /// Start a trade between two mobiles, giving each an empty trade container.
    pub fn open_trade(&mut self, from: Serial, to: Serial) -> Result<TradeId> {
        self.get_mobile(from)?;
        self.get_mobile(to)?;
        let id = TradeId(self.next_trade_id);
        self.next_trade_id += 1;

        let from_container = self.spawn_trade_container(from, id)?;
        let to_container = self.spawn_trade_container(to, id)?;
        self.trades.insert(
            id,
            SecureTrade {
                id,
                from: TradeParty {
                    mobile: from,
                    container: from_container,
                    accepted: false,
                },
                to: TradeParty {
                    mobile: to,
                    container: to_container,
                    accepted: false,
                },
            },
        );

        self.send(Packet::TradeOpen {
            to: from,
            with: to,
            first: from_container,
            second: to_container,
        });
        self.send(Packet::TradeOpen {
            to,
            with: from,
            first: to_container,
            second: from_container,
        });
        info!("Opened {} between {} and {}", id, from, to);
        Ok(id)
    }

    fn spawn_trade_container(&mut self, mobile: Serial, id: TradeId) -> Result<Serial> {
        let container = self.spawn(
            Item::new("tradecontainer", TRADE_CONTAINER_ID)
                .with_weight(0.0)
                .immovable()
                .with_container(ContainerState::new(ContainerKind::SecureTrade(TradeState {
                    trade: Some(id),
                }))),
        );
        self.equip(mobile, container)?;
        Ok(container)
    }

    /// Offer an item: it goes into the actor's own trade container.
    pub fn offer_item(&mut self, id: TradeId, actor: Serial, item: Serial) -> Result<bool> {
        let trade = self.trades.get(&id).ok_or(WorldError::NoSuchTrade(id.0))?;
        let container = if trade.from.mobile == actor {
            trade.from.container
        } else if trade.to.mobile == actor {
            trade.to.container
        } else {
            return Ok(false);
        };
        self.try_drop_item(Some(actor), container, item, true)
    }

    /// Set or clear one party's acceptance. Completes the trade once both accept and
    /// returns whether it did.
    pub fn set_accepted(&mut self, id: TradeId, mobile: Serial, accepted: bool) -> Result<bool> {
        let trade = self.trades.get_mut(&id).ok_or(WorldError::NoSuchTrade(id.0))?;
        let Some(party) = trade.party_mut(mobile) else {
            return Ok(false);
        };
        party.accepted = accepted;
        if trade.from.accepted && trade.to.accepted {
            self.complete_trade(id)?;
            return Ok(true);
        }
        self.send_trade_update(id);
        Ok(false)
    }

    /// Clear both acceptances and tell both parties.
    pub fn clear_checks(&mut self, id: TradeId) {
        let Some(trade) = self.trades.get_mut(&id) else {
            return;
        };
        trade.from.accepted = false;
        trade.to.accepted = false;
        trace!("Cleared acceptance on {}", id);
        self.send_trade_update(id);
    }

    fn send_trade_update(&mut self, id: TradeId) {
        let Some(trade) = self.trades.get(&id) else {
            return;
        };
        let (from, to) = (trade.from.clone(), trade.to.clone());
        for party in [&from, &to] {
            self.send(Packet::TradeUpdate {
                to: party.mobile,
                container: from.container,
                first: from.accepted,
                second: to.accepted,
            });
        }
    }

    /// Clear acceptance on every trade whose container lies above `container`.
    pub(crate) fn invalidate_trades_above(&mut self, container: Serial) {
        let sessions: Vec<TradeId> = self
            .container_chain(container)
            .into_iter()
            .filter_map(|serial| self.trade_of(serial))
            .collect();
        for id in sessions {
            self.clear_checks(id);
        }
    }

    /// Return every offered item to its owner's backpack and close the trade.
    pub fn cancel_trade(&mut self, id: TradeId) -> Result<()> {
        let trade = self.trades.remove(&id).ok_or(WorldError::NoSuchTrade(id.0))?;
        for party in [&trade.from, &trade.to] {
            self.return_offer(party.container, party.mobile)?;
        }
        self.close_trade(&trade)?;
        info!("Cancelled {}", id);
        Ok(())
    }

    /// Swap the offers and close the trade.
    pub fn complete_trade(&mut self, id: TradeId) -> Result<()> {
        let trade = self.trades.remove(&id).ok_or(WorldError::NoSuchTrade(id.0))?;
        self.return_offer(trade.from.container, trade.to.mobile)?;
        self.return_offer(trade.to.container, trade.from.mobile)?;
        self.close_trade(&trade)?;
        info!("Completed {}", id);
        Ok(())
    }

    fn return_offer(&mut self, container: Serial, mobile: Serial) -> Result<()> {
        let offered = self.container(container)?.items.clone();
        for item in offered.into_iter().rev() {
            self.add_to_backpack(mobile, item)?;
        }
        Ok(())
    }

    /// Put the item in the mobile's backpack, or at their feet if it does not fit.
    pub fn add_to_backpack(&mut self, mobile: Serial, item: Serial) -> Result<()> {
        if let Some(pack) = self.get_mobile(mobile)?.backpack() {
            self.remove_item(item)?;
            if self.try_drop_item(Some(mobile), pack, item, false)? {
                return Ok(());
            }
        }
        let location = self.get_mobile(mobile)?.location;
        self.move_to_world(item, location)
    }

    fn close_trade(&mut self, trade: &SecureTrade) -> Result<()> {
        for party in [&trade.from, &trade.to] {
            self.send(Packet::TradeClose {
                to: party.mobile,
                container: party.container,
            });
            if self.item(party.container).is_some() {
                self.delete(party.container)?;
            }
        }
        Ok(())
    }

    /// Cancel the live session `container` belongs to, if any. Offers go back to their
    /// owners and both trade containers are deleted.
    pub(crate) fn cancel_trade_for(&mut self, container: Serial) -> Result<bool> {
        match self.trade_of(container) {
            Some(id) if self.trades.contains_key(&id) => {
                debug!("Cancelling {} because {} is being deleted", id, container);
                self.cancel_trade(id)?;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    /// Close a session whose container vanished along with its contents. What is left
    /// on the other side goes back to its owner.
    pub(crate) fn drop_trade_session(&mut self, id: TradeId) -> Result<()> {
        let Some(trade) = self.trades.remove(&id) else {
            return Ok(());
        };
        debug!("Dropping {} after its container was deleted", id);
        for party in [&trade.from, &trade.to] {
            if self.item(party.container).is_some() {
                self.return_offer(party.container, party.mobile)?;
            }
        }
        self.close_trade(&trade)
    }
}
