//! Capacity checks.
//!
//! Capacity is a constraint on the whole ownership chain: an item that fits a pouch must
//! also fit the bag around it and the backpack around that.

use log::trace;

use super::ContainerKind;
use crate::world::{Item, Serial, World};

pub const MSG_DECO: &str = "You cannot put anything into this.";
pub const MSG_TOO_MANY_ITEMS: &str = "That container cannot hold more items.";
pub const MSG_TOO_HEAVY: &str = "That container cannot hold more weight.";
pub const MSG_TRADE_RECIPIENT: &str = "The recipient of this trade would not be able to carry this.";

/// Knobs for [`World::check_hold`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HoldOptions {
    /// Send the refusal message to the actor.
    pub announce: bool,
    /// Count the item against the item limit. Off when it will merge into a stack.
    pub check_items: bool,
    /// Hypothetical items already on their way in.
    pub extra_items: i64,
    /// Hypothetical weight already on its way in.
    pub extra_weight: i64,
}

impl Default for HoldOptions {
    fn default() -> Self {
        Self {
            announce: true,
            check_items: true,
            extra_items: 0,
            extra_weight: 0,
        }
    }
}

impl HoldOptions {
    pub fn quiet() -> Self {
        Self {
            announce: false,
            ..Self::default()
        }
    }

    pub fn weight_only(announce: bool) -> Self {
        Self {
            announce,
            check_items: false,
            ..Self::default()
        }
    }
}

impl World {
    /// Effective item limit; `0` is unlimited.
    pub fn max_items(&self, container: Serial) -> i32 {
        match self.item(container).and_then(Item::container) {
            Some(state) if state.max_items == -1 => state.kind.default_max_items(self.config()),
            Some(state) => state.max_items,
            None => 0,
        }
    }

    /// Effective weight limit; `0` is unlimited. Without an override, a container
    /// inside an unlimited container is unlimited too.
    pub fn max_weight(&self, container: Serial) -> i32 {
        let Some(item) = self.item(container) else {
            return 0;
        };
        let Some(state) = item.container() else {
            return 0;
        };
        if let Some(max_weight) = state.max_weight {
            return max_weight;
        }
        if let Some(parent) = item.parent().item() {
            if self.item(parent).map_or(false, Item::is_container) && self.max_weight(parent) == 0 {
                return 0;
            }
        }
        state.kind.default_max_weight(self.config())
    }

    /// An immovable container lying in the world that only staff may fill.
    pub fn is_deco_container(&self, container: Serial) -> bool {
        let Some(item) = self.item(container) else {
            return false;
        };
        let Some(state) = item.container() else {
            return false;
        };
        if matches!(state.kind, ContainerKind::Corpse(_)) {
            return false;
        }
        !item.movable && !state.lift_override && item.parent().is_world()
    }

    /// Whether a stack inside `container` would absorb `item`.
    pub fn check_stack(&self, container: Serial, item: Serial) -> bool {
        let (Some(state), Some(dropped)) = (
            self.item(container).and_then(Item::container),
            self.item(item),
        ) else {
            return false;
        };
        let max_stack = self.config().max_stack_amount;
        state
            .items
            .iter()
            .filter_map(|serial| self.item(*serial))
            .any(|child| !child.is_container() && child.can_stack_with(dropped, max_stack))
    }

    /// Would adding `item` to `container` respect every limit up the chain?
    ///
    /// Refusals are reported as `false`, with a message to the actor when
    /// `options.announce` is set.
    pub fn check_hold(
        &mut self,
        actor: Option<Serial>,
        container: Serial,
        item: Serial,
        options: HoldOptions,
    ) -> bool {
        let Some(dropped) = self.item(item) else {
            return false;
        };
        let sub = dropped.subtree_totals();
        let (item_count, item_weight) = if dropped.is_virtual() {
            (0, 0)
        } else {
            (sub.items + 1, sub.weight + dropped.pile_weight())
        };
        let elevated = self.is_elevated(actor);

        let mut current = Some(container);
        while let Some(serial) = current {
            let Some(target) = self.item(serial) else {
                break;
            };
            let parent = target.parent().item();
            let Some(state) = target.container() else {
                current = parent;
                continue;
            };
            let totals = state.totals;
            let is_trade = matches!(state.kind, ContainerKind::SecureTrade(_));

            if !elevated && self.is_deco_container(serial) {
                self.refuse(actor, options, MSG_DECO);
                return false;
            }

            let max_items = self.max_items(serial) as i64;
            if options.check_items
                && max_items != 0
                && totals.items + options.extra_items + item_count > max_items
            {
                trace!("{} refused {}: item limit {}", serial, item, max_items);
                self.refuse(actor, options, MSG_TOO_MANY_ITEMS);
                return false;
            }
            let max_weight = self.max_weight(serial) as i64;
            if max_weight != 0 && totals.weight + options.extra_weight + item_weight > max_weight {
                trace!("{} refused {}: weight limit {}", serial, item, max_weight);
                self.refuse(actor, options, MSG_TOO_HEAVY);
                return false;
            }

            if is_trade && !self.check_trade_recipient(actor, serial, item, options) {
                return false;
            }

            current = parent;
        }
        true
    }

    fn refuse(&mut self, actor: Option<Serial>, options: HoldOptions, text: &str) {
        if options.announce {
            self.announce(actor, text);
        }
    }

    /// The other party must be able to carry everything offered in `trade_container`
    /// plus the new item.
    fn check_trade_recipient(
        &mut self,
        actor: Option<Serial>,
        trade_container: Serial,
        item: Serial,
        options: HoldOptions,
    ) -> bool {
        if self.item(item).map_or(false, Item::is_virtual) {
            return true;
        }
        let Some(recipient) = self.trade_recipient(trade_container) else {
            return false;
        };
        let Some(backpack) = self.mobile(recipient).and_then(|m| m.backpack()) else {
            self.refuse(actor, options, MSG_TRADE_RECIPIENT);
            return false;
        };
        let offered = match self.container(trade_container) {
            Ok(state) => state.totals(),
            Err(_) => return false,
        };
        let nested = HoldOptions {
            announce: false,
            check_items: options.check_items,
            extra_items: options.extra_items + offered.items,
            extra_weight: options.extra_weight + offered.weight,
        };
        if self.check_hold(actor, backpack, item, nested) {
            return true;
        }
        self.refuse(actor, options, MSG_TRADE_RECIPIENT);
        false
    }
}
