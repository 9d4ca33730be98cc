//! Dropping, stacking, lifting and displaying.

use log::{debug, trace};
use rand::Rng;

use super::hold::HoldOptions;
use super::ContainerKind;
use crate::world::errors::{Result, WorldError};
use crate::world::{Item, LootType, Packet, Parent, Point3D, Rect2D, Serial, World};

pub const MSG_NOT_ACCESSIBLE: &str = "That is not accessible.";
pub const MSG_CANNOT_LIFT: &str = "You cannot pick that up.";

impl World {
    /// Display bounds for items inside `container`.
    pub fn container_bounds(&self, container: Serial) -> Rect2D {
        let item_id = self.item(container).map_or(0, |i| i.item_id);
        self.registry().get(item_id).bounds
    }

    pub fn gump_id(&self, container: Serial) -> i32 {
        let Some(item) = self.item(container) else {
            return self.registry().default_data().gump_id;
        };
        match item.container() {
            Some(state) if state.gump_id != -1 => state.gump_id,
            _ => self.registry().get(item.item_id).gump_id,
        }
    }

    pub fn drop_sound(&self, container: Serial) -> i32 {
        let Some(item) = self.item(container) else {
            return self.registry().default_data().drop_sound;
        };
        match item.container() {
            Some(state) if state.drop_sound != -1 => state.drop_sound,
            _ => self.registry().get(item.item_id).drop_sound,
        }
    }

    /// Check capacity, merge into a matching stack if one exists, otherwise drop the
    /// item at a random spot. Returns whether the item went in.
    pub fn try_drop_item(
        &mut self,
        actor: Option<Serial>,
        container: Serial,
        item: Serial,
        announce: bool,
    ) -> Result<bool> {
        self.ensure_can_enter(container, item)?;
        if !self.can_access_chain(actor, container) {
            if announce {
                self.announce(actor, MSG_NOT_ACCESSIBLE);
            }
            return Ok(false);
        }

        let stacks = self.check_stack(container, item);
        let options = HoldOptions {
            announce,
            check_items: !stacks,
            ..HoldOptions::default()
        };
        if !self.check_hold(actor, container, item, options) {
            return Ok(false);
        }

        let children = self.container(container)?.items.clone();
        for child in children {
            if self.get_item(child)?.is_container() {
                continue;
            }
            if self.stack_with(actor, child, item, false)? {
                return Ok(true);
            }
        }

        self.drop_item(container, item)?;
        Ok(true)
    }

    /// Add the item unconditionally at a random position inside the container bounds.
    ///
    /// On each axis the item is centred when its footprint is at least as large as the
    /// bounds, otherwise placed uniformly in the leftover space.
    pub fn drop_item(&mut self, container: Serial, item: Serial) -> Result<()> {
        self.ensure_can_enter(container, item)?;
        let bounds = self.container_bounds(container);
        let footprint = self.get_item(item)?.footprint;

        let mut x = if footprint.width >= bounds.width {
            (bounds.width - footprint.width) / 2
        } else {
            self.rng.gen_range(0..bounds.width - footprint.width)
        };
        let mut y = if footprint.height >= bounds.height {
            (bounds.height - footprint.height) / 2
        } else {
            self.rng.gen_range(0..bounds.height - footprint.height)
        };
        x += bounds.x - footprint.x;
        y += bounds.y - footprint.y;

        self.item_mut(item)?.location = Point3D::new(x, y, 0);
        self.add_item(container, item)
    }

    /// Merge `dropped` into `target` if they stack. `dropped` is deleted on success.
    pub fn stack_with(
        &mut self,
        actor: Option<Serial>,
        target: Serial,
        dropped: Serial,
        play_sound: bool,
    ) -> Result<bool> {
        let max_stack = self.config().max_stack_amount;
        let (new_amount, mixed_loot) = {
            let stack = self.get_item(target)?;
            let incoming = self.get_item(dropped)?;
            if !stack.can_stack_with(incoming, max_stack) {
                return Ok(false);
            }
            (
                stack.amount() + incoming.amount(),
                stack.loot_type != incoming.loot_type,
            )
        };

        if mixed_loot {
            self.item_mut(target)?.loot_type = LootType::Regular;
        }
        self.delete(dropped)?;
        self.set_amount(target, new_amount)?;
        trace!("Stacked {} onto {} ({} total)", dropped, target, new_amount);

        if play_sound {
            if let Some(actor) = actor {
                let sound = match self.get_item(target)?.parent() {
                    Parent::Item(container) => self.drop_sound(container),
                    _ => self.registry().default_data().drop_sound,
                };
                self.send(Packet::PlaySound { to: actor, sound });
            }
        }
        Ok(true)
    }

    /// Validate the weight the merge adds before stacking onto an item in `container`.
    pub fn on_stack_attempt(
        &mut self,
        actor: Option<Serial>,
        container: Serial,
        target: Serial,
        dropped: Serial,
    ) -> Result<bool> {
        if !self.check_hold(actor, container, dropped, HoldOptions::weight_only(true)) {
            return Ok(false);
        }
        self.stack_with(actor, target, dropped, true)
    }

    /// Drop an item onto another item.
    pub fn drop_onto_item(
        &mut self,
        actor: Option<Serial>,
        target: Serial,
        dropped: Serial,
    ) -> Result<bool> {
        match self.get_item(target)?.parent() {
            Parent::Item(container) => {
                if !self.can_access_chain(actor, container) {
                    self.announce(actor, MSG_NOT_ACCESSIBLE);
                    return Ok(false);
                }
                self.on_stack_attempt(actor, container, target, dropped)
            }
            _ => self.stack_with(actor, target, dropped, true),
        }
    }

    /// Drag-and-drop into the container, with the drop sound on success.
    pub fn on_drag_drop(&mut self, actor: Serial, container: Serial, item: Serial) -> Result<bool> {
        if !self.try_drop_item(Some(actor), container, item, true)? {
            return Ok(false);
        }
        let sound = self.drop_sound(container);
        self.send(Packet::PlaySound { to: actor, sound });
        Ok(true)
    }

    /// Pick an item up out of wherever it is, leaving it parentless.
    pub fn lift_item(&mut self, actor: Serial, item: Serial) -> Result<bool> {
        let (movable, parent) = {
            let record = self.get_item(item)?;
            (record.movable, record.parent())
        };
        if !movable && !self.is_elevated(Some(actor)) {
            self.announce(Some(actor), MSG_CANNOT_LIFT);
            return Ok(false);
        }

        if let Parent::Item(container) = parent {
            if !self.can_access_chain(Some(actor), container) {
                self.announce(Some(actor), MSG_NOT_ACCESSIBLE);
                return Ok(false);
            }
            if self.container(container)?.kind.corpse().is_some() {
                if !self.can_loot(actor, container, item) {
                    self.announce(Some(actor), super::corpse::MSG_NO_LOOT_RIGHTS);
                    return Ok(false);
                }
                self.record_looter(container, actor)?;
            }
        }

        self.remove_item(item)?;
        Ok(true)
    }

    /// Spill the contents at the container's world location, then delete it.
    pub fn destroy(&mut self, container: Serial) -> Result<()> {
        let location = self.world_location(container)?;
        let children = self.container(container)?.items.clone();
        for child in children.into_iter().rev() {
            self.move_to_world(child, location)?;
        }
        debug!("Destroyed {} at {:?}", container, location);
        self.delete(container)
    }

    /// Open the container gump for `viewer` and list what they may see.
    pub fn display_to(&mut self, viewer: Serial, container: Serial) -> Result<()> {
        let gump_id = self.gump_id(container);
        let children = self.container(container)?.items.clone();
        let visible: Vec<Serial> = children
            .into_iter()
            .filter(|child| self.can_see_item(viewer, container, *child))
            .collect();

        self.send(Packet::ContainerDisplay {
            to: viewer,
            container,
            gump_id,
        });
        self.send(Packet::ContainerContent {
            to: viewer,
            container,
            items: visible,
        });
        self.container_mut(container)?.openers.insert(viewer);
        Ok(())
    }

    /// Open the container on double-click if the viewer may access it.
    pub fn on_double_click(&mut self, viewer: Serial, container: Serial) -> Result<bool> {
        if !self.can_access_chain(Some(viewer), container) {
            self.announce(Some(viewer), MSG_NOT_ACCESSIBLE);
            return Ok(false);
        }
        self.display_to(viewer, container)?;
        Ok(true)
    }

    pub fn close_for(&mut self, viewer: Serial, container: Serial) -> Result<()> {
        self.container_mut(container)?.openers.remove(&viewer);
        Ok(())
    }

    /// Bank and trade containers anywhere above `container` must admit the actor.
    pub fn can_access_chain(&self, actor: Option<Serial>, container: Serial) -> bool {
        if self.is_elevated(actor) {
            return true;
        }
        for serial in self.container_chain(container) {
            let Some(state) = self.item(serial).and_then(Item::container) else {
                continue;
            };
            let allowed = match &state.kind {
                ContainerKind::BankBox(_) => actor.map_or(false, |a| self.bank_accessible(a, serial)),
                ContainerKind::SecureTrade(_) => {
                    actor.is_some() && self.item(serial).map(Item::parent) == actor.map(Parent::Mobile)
                }
                _ => true,
            };
            if !allowed {
                return false;
            }
        }
        true
    }

    fn ensure_can_enter(&self, container: Serial, item: Serial) -> Result<()> {
        self.container(container)?;
        self.get_item(item)?;
        if container == item || self.is_ancestor(item, container) {
            return Err(WorldError::InvalidParent {
                item,
                reason: format!("{} cannot go inside itself", item),
            });
        }
        Ok(())
    }

    // ========================================================================
    // Hooks
    // ========================================================================

    pub(crate) fn on_item_added(&mut self, container: Serial, item: Serial) {
        self.send_content_update(container, item);
        self.invalidate_trades_above(container);
    }

    /// Refresh `item` for everyone viewing `container` who may see it.
    pub(crate) fn send_content_update(&mut self, container: Serial, item: Serial) {
        let location = self.item(item).map(|i| i.location).unwrap_or_default();
        let openers: Vec<Serial> = self
            .container(container)
            .map(|state| state.openers().collect())
            .unwrap_or_default();
        for opener in openers {
            if !self.can_see_item(opener, container, item) {
                continue;
            }
            self.send(Packet::ContainerContentUpdate {
                to: opener,
                container,
                item,
                location,
            });
        }
    }

    pub(crate) fn on_item_removed(&mut self, container: Serial, item: Serial) {
        let openers: Vec<Serial> = self
            .container(container)
            .map(|state| state.openers().collect())
            .unwrap_or_default();
        for opener in openers {
            self.send(Packet::RemoveEntity { to: opener, entity: item });
        }
        self.invalidate_trades_above(container);
    }
}
