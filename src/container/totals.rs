//! Running aggregates (gold, item count, weight) over container subtrees.
//!
//! Mutations adjust the aggregates incrementally along the parent chain;
//! [`World::update_totals`] rebuilds them from scratch after a load or when the
//! incremental path cannot be trusted.

use log::{debug, warn};
use serde::Serialize;

use crate::world::errors::Result;
use crate::world::{Item, Parent, Serial, TotalType, Totals, World};

/// A container or mobile whose stored totals differ from a fresh recount.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TotalsDrift {
    pub serial: Serial,
    pub stored: Totals,
    pub fresh: Totals,
}

impl World {
    /// Apply `delta` to `container`'s aggregate on behalf of the descendant `sender`,
    /// then pass it on to the container's parent.
    ///
    /// Nothing happens when the sender is the container itself, the delta is zero or
    /// the sender is virtual. A virtual container keeps its own totals but does not
    /// propagate further; a mobile ends the chain.
    pub fn update_total(&mut self, container: Serial, sender: Serial, kind: TotalType, delta: i64) {
        self.propagate_from(Parent::Item(container), sender, kind, delta);
    }

    pub(crate) fn propagate_from(&mut self, start: Parent, sender: Serial, kind: TotalType, delta: i64) {
        if delta == 0 {
            return;
        }
        if self.items.get(&sender).map_or(false, Item::is_virtual) {
            return;
        }

        let mut at = start;
        loop {
            match at {
                Parent::Item(serial) => {
                    if serial == sender {
                        return;
                    }
                    let Some(item) = self.items.get_mut(&serial) else {
                        return;
                    };
                    if let Some(state) = item.container.as_mut() {
                        state.totals.adjust(kind, delta);
                    }
                    if item.virtual_item {
                        return;
                    }
                    at = item.parent;
                }
                Parent::Mobile(serial) => {
                    if let Some(mobile) = self.mobiles.get_mut(&serial) {
                        mobile.totals.adjust(kind, delta);
                    }
                    return;
                }
                Parent::World => return,
            }
        }
    }

    pub(crate) fn propagate_contribution(&mut self, start: Parent, sender: Serial, delta: Totals) {
        self.propagate_from(start, sender, TotalType::Gold, delta.gold);
        self.propagate_from(start, sender, TotalType::Items, delta.items);
        self.propagate_from(start, sender, TotalType::Weight, delta.weight);
    }

    /// Recompute `container`'s aggregates bottom-up, storing fresh totals on every
    /// nested container on the way. Virtual children are recomputed but not counted.
    pub fn update_totals(&mut self, container: Serial) -> Result<Totals> {
        let children = self.container(container)?.items.clone();
        let mut totals = Totals::default();
        for child in children {
            if self.get_item(child)?.is_container() {
                self.update_totals(child)?;
            }
            let item = self.get_item(child)?;
            if item.is_virtual() {
                continue;
            }
            totals += item.contribution();
        }
        self.container_mut(container)?.totals = totals;
        Ok(totals)
    }

    /// Rebuild every container and mobile aggregate in the world.
    pub fn recompute_all_totals(&mut self) -> Result<()> {
        let roots: Vec<Serial> = self
            .items
            .values()
            .filter(|item| item.is_container() && item.parent.item().is_none())
            .map(Item::serial)
            .collect();
        for root in &roots {
            self.update_totals(*root)?;
        }

        let mobiles: Vec<Serial> = self.mobiles.keys().copied().collect();
        for serial in mobiles {
            let worn = self.get_mobile(serial)?.items.clone();
            let mut totals = Totals::default();
            for item in worn {
                let item = self.get_item(item)?;
                if !item.is_virtual() {
                    totals += item.contribution();
                }
            }
            self.mobile_mut(serial)?.totals = totals;
        }
        debug!(
            "Recomputed totals for {} root containers and {} mobiles",
            roots.len(),
            self.mobiles.len()
        );
        Ok(())
    }

    /// Fresh aggregates of a container without touching stored state.
    pub fn fresh_totals(&self, container: Serial) -> Result<Totals> {
        let mut totals = Totals::default();
        for child in &self.container(container)?.items {
            let item = self.get_item(*child)?;
            if item.is_virtual() {
                continue;
            }
            let sub = if item.is_container() {
                self.fresh_totals(*child)?
            } else {
                Totals::default()
            };
            totals += Totals {
                gold: sub.gold + item.own_gold(),
                items: sub.items + 1,
                weight: sub.weight + item.pile_weight(),
            };
        }
        Ok(totals)
    }

    /// Compare stored aggregates against a fresh recount everywhere.
    pub fn verify_totals(&self) -> Result<Vec<TotalsDrift>> {
        let mut drift = Vec::new();
        for item in self.items.values() {
            let Some(state) = item.container() else {
                continue;
            };
            let fresh = self.fresh_totals(item.serial)?;
            if fresh != state.totals {
                warn!(
                    "Totals drift on {}: stored {:?}, fresh {:?}",
                    item.serial, state.totals, fresh
                );
                drift.push(TotalsDrift {
                    serial: item.serial,
                    stored: state.totals,
                    fresh,
                });
            }
        }
        for mobile in self.mobiles.values() {
            let mut fresh = Totals::default();
            for serial in &mobile.items {
                let item = self.get_item(*serial)?;
                if item.is_virtual() {
                    continue;
                }
                let sub = if item.is_container() {
                    self.fresh_totals(*serial)?
                } else {
                    Totals::default()
                };
                fresh += Totals {
                    gold: sub.gold + item.own_gold(),
                    items: sub.items + 1,
                    weight: sub.weight + item.pile_weight(),
                };
            }
            if fresh != mobile.totals {
                drift.push(TotalsDrift {
                    serial: mobile.serial,
                    stored: mobile.totals,
                    fresh,
                });
            }
        }
        Ok(drift)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::WorldConfig;
    use crate::container::{ContainerDataRegistry, ContainerState};
    use chrono::Utc;
    use std::sync::Arc;

    fn world() -> World {
        World::new(
            WorldConfig::default(),
            Arc::new(ContainerDataRegistry::default()),
            Utc::now(),
        )
    }

    fn bag(world: &mut World) -> Serial {
        world.spawn(
            Item::new("bag", 0x0E76)
                .with_weight(2.0)
                .with_container(ContainerState::plain()),
        )
    }

    #[test]
    fn test_nested_totals_propagate_to_every_ancestor() {
        let mut world = world();
        let outer = bag(&mut world);
        let inner = bag(&mut world);
        world.add_item(outer, inner).unwrap();
        let coins = world.spawn(Item::gold(500));
        world.add_item(inner, coins).unwrap();

        let inner_totals = world.container(inner).unwrap().totals();
        assert_eq!(inner_totals, Totals { gold: 500, items: 1, weight: 10 });
        let outer_totals = world.container(outer).unwrap().totals();
        assert_eq!(outer_totals, Totals { gold: 500, items: 2, weight: 12 });

        world.set_amount(coins, 50).unwrap();
        let outer_totals = world.container(outer).unwrap().totals();
        assert_eq!(outer_totals, Totals { gold: 50, items: 2, weight: 3 });
        assert!(world.verify_totals().unwrap().is_empty());
    }

    #[test]
    fn test_update_total_ignores_self_and_virtual_senders() {
        let mut world = world();
        let outer = bag(&mut world);
        let check = world.spawn(Item::new("check", 0x14F0).virtual_item());
        world.add_item(outer, check).unwrap();
        assert_eq!(world.container(outer).unwrap().totals(), Totals::default());

        world.update_total(outer, outer, TotalType::Weight, 5);
        world.update_total(outer, check, TotalType::Weight, 5);
        assert_eq!(world.container(outer).unwrap().totals().weight, 0);
    }

    #[test]
    fn test_recompute_repairs_drift() {
        let mut world = world();
        let outer = bag(&mut world);
        let inner = bag(&mut world);
        world.add_item(outer, inner).unwrap();
        let ingot = world.spawn(Item::new("ingot", 0x1BF2).with_weight(1.0).with_amount(7));
        world.add_item(inner, ingot).unwrap();

        world.container_mut(outer).unwrap().totals = Totals::default();
        let drift = world.verify_totals().unwrap();
        assert_eq!(drift.len(), 1);
        assert_eq!(drift[0].serial, outer);

        world.recompute_all_totals().unwrap();
        assert!(world.verify_totals().unwrap().is_empty());
        assert_eq!(world.container(outer).unwrap().totals().weight, 9);
    }
}
