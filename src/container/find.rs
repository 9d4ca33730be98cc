//! Typed search and consumption over container subtrees.
//!
//! All searches walk the children depth-first in display order. A match is collected
//! before its own contents are searched, so a matching container is followed by its
//! matching descendants.

use std::cmp::Ordering;
use std::collections::VecDeque;

use log::trace;

use crate::world::errors::Result;
use crate::world::{Item, ItemKind, Serial, World};

fn kinds_of(kinds: &[&str]) -> Vec<ItemKind> {
    kinds.iter().map(|k| ItemKind::new(*k)).collect()
}

fn kind_matches(item: &Item, kinds: &[ItemKind]) -> bool {
    kinds.iter().any(|kind| {
        item.kind == *kind || (kind.as_str() == ItemKind::ANY_CONTAINER && item.is_container())
    })
}

impl World {
    fn collect_matches<F>(
        &self,
        container: Serial,
        kinds: &[ItemKind],
        recurse: bool,
        predicate: &F,
        out: &mut Vec<Serial>,
    ) where
        F: Fn(&Item) -> bool,
    {
        let Some(state) = self.item(container).and_then(Item::container) else {
            return;
        };
        for serial in &state.items {
            let Some(item) = self.item(*serial) else {
                continue;
            };
            if kind_matches(item, kinds) && predicate(item) {
                out.push(*serial);
            }
            if recurse && item.is_container() {
                self.collect_matches(*serial, kinds, recurse, predicate, out);
            }
        }
    }

    pub fn find_items_matching<F>(
        &self,
        container: Serial,
        kinds: &[&str],
        recurse: bool,
        predicate: F,
    ) -> Vec<Serial>
    where
        F: Fn(&Item) -> bool,
    {
        let kinds = kinds_of(kinds);
        let mut out = Vec::new();
        self.collect_matches(container, &kinds, recurse, &predicate, &mut out);
        out
    }

    pub fn find_items_by_types(&self, container: Serial, kinds: &[&str], recurse: bool) -> Vec<Serial> {
        self.find_items_matching(container, kinds, recurse, |_| true)
    }

    pub fn find_items_by_type(&self, container: Serial, kind: &str, recurse: bool) -> Vec<Serial> {
        self.find_items_by_types(container, &[kind], recurse)
    }

    /// First match in search order.
    pub fn find_item_by_type(&self, container: Serial, kind: &str, recurse: bool) -> Option<Serial> {
        self.find_items_by_type(container, kind, recurse)
            .into_iter()
            .next()
    }

    fn sum_amounts(&self, serials: &[Serial]) -> u64 {
        serials
            .iter()
            .filter_map(|s| self.item(*s))
            .map(|item| item.amount() as u64)
            .sum()
    }

    /// Total quantity (not item count) of the matches.
    pub fn get_amount(&self, container: Serial, kinds: &[&str], recurse: bool) -> u64 {
        self.sum_amounts(&self.find_items_by_types(container, kinds, recurse))
    }

    /// Take `amount` units from `matches` in order, deleting emptied piles.
    fn consume_from<F>(&mut self, matches: &[Serial], amount: u32, on_consumed: &mut F) -> Result<()>
    where
        F: FnMut(&Item, u32),
    {
        let mut need = amount;
        for serial in matches {
            if need == 0 {
                break;
            }
            let Some(item) = self.item(*serial) else {
                continue;
            };
            let theirs = item.amount();
            let take = theirs.min(need);
            on_consumed(item, take);
            if take == theirs {
                self.delete(*serial)?;
            } else {
                self.set_amount(*serial, theirs - take)?;
            }
            need -= take;
        }
        Ok(())
    }

    /// Consume exactly `amount` units or nothing at all.
    pub fn consume_total(
        &mut self,
        container: Serial,
        kinds: &[&str],
        amount: u32,
        recurse: bool,
    ) -> Result<bool> {
        self.consume_total_with(container, kinds, amount, recurse, |_, _| {})
    }

    /// [`consume_total`](Self::consume_total) reporting each pile and how much was
    /// taken from it, before the pile is changed.
    pub fn consume_total_with<F>(
        &mut self,
        container: Serial,
        kinds: &[&str],
        amount: u32,
        recurse: bool,
        mut on_consumed: F,
    ) -> Result<bool>
    where
        F: FnMut(&Item, u32),
    {
        let matches = self.find_items_by_types(container, kinds, recurse);
        if self.sum_amounts(&matches) < amount as u64 {
            return Ok(false);
        }
        self.consume_from(&matches, amount, &mut on_consumed)?;
        Ok(true)
    }

    /// Consume several requirements at once. Returns the index of the first
    /// requirement that cannot be met, in which case nothing is consumed.
    pub fn consume_total_many(
        &mut self,
        container: Serial,
        requirements: &[(&[&str], u32)],
        recurse: bool,
    ) -> Result<Option<usize>> {
        for (index, (kinds, amount)) in requirements.iter().enumerate() {
            if self.get_amount(container, kinds, recurse) < *amount as u64 {
                return Ok(Some(index));
            }
        }
        for (kinds, amount) in requirements {
            let matches = self.find_items_by_types(container, kinds, recurse);
            self.consume_from(&matches, *amount, &mut |_, _| {})?;
        }
        Ok(None)
    }

    /// Consume as much as is available up to `amount`; returns what was taken.
    ///
    /// Emptied piles are queued and deleted after the walk.
    pub fn consume_up_to(
        &mut self,
        container: Serial,
        kinds: &[&str],
        amount: u32,
        recurse: bool,
    ) -> Result<u32> {
        let matches = self.find_items_by_types(container, kinds, recurse);
        let mut consumed = 0u32;
        let mut to_delete = VecDeque::new();

        for serial in matches {
            if consumed >= amount {
                break;
            }
            let Some(item) = self.item(serial) else {
                continue;
            };
            let theirs = item.amount();
            let max_take = amount - consumed;
            if theirs > max_take {
                self.set_amount(serial, theirs - max_take)?;
                consumed = amount;
            } else {
                to_delete.push_back(serial);
                consumed += theirs;
            }
        }

        while let Some(serial) = to_delete.pop_front() {
            if self.item(serial).is_some() {
                self.delete(serial)?;
            }
        }
        trace!("Consumed {} of {} from {}", consumed, amount, container);
        Ok(consumed)
    }

    /// Split the matches into runs of consecutive equivalent items. Equivalent items
    /// separated by a different one land in different groups.
    fn group_matches<G>(&self, matches: &[Serial], grouper: &G) -> Vec<Vec<Serial>>
    where
        G: Fn(&Item, &Item) -> Ordering,
    {
        let mut groups: Vec<Vec<Serial>> = Vec::new();
        let mut index = 0;
        while index < matches.len() {
            let head = matches[index];
            index += 1;
            let mut group = vec![head];
            let Some(first) = self.item(head) else {
                continue;
            };
            while index < matches.len() {
                let Some(next) = self.item(matches[index]) else {
                    break;
                };
                if grouper(first, next) != Ordering::Equal {
                    break;
                }
                group.push(matches[index]);
                index += 1;
            }
            groups.push(group);
        }
        groups
    }

    /// Largest total of any single group.
    pub fn get_best_group_amount<G>(
        &self,
        container: Serial,
        kinds: &[&str],
        recurse: bool,
        grouper: G,
    ) -> u64
    where
        G: Fn(&Item, &Item) -> Ordering,
    {
        let matches = self.find_items_by_types(container, kinds, recurse);
        self.group_matches(&matches, &grouper)
            .iter()
            .map(|group| self.sum_amounts(group))
            .max()
            .unwrap_or(0)
    }

    /// Consume `amount` from the first group that holds enough on its own.
    pub fn consume_total_grouped<G>(
        &mut self,
        container: Serial,
        kinds: &[&str],
        amount: u32,
        recurse: bool,
        grouper: G,
    ) -> Result<bool>
    where
        G: Fn(&Item, &Item) -> Ordering,
    {
        let matches = self.find_items_by_types(container, kinds, recurse);
        let groups = self.group_matches(&matches, &grouper);
        let Some(group) = groups
            .into_iter()
            .find(|group| self.sum_amounts(group) >= amount as u64)
        else {
            return Ok(false);
        };
        self.consume_from(&group, amount, &mut |_, _| {})?;
        Ok(true)
    }
}
