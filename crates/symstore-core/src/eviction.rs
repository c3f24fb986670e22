//! Reachability sweep for records that no longer hang off any root.
//!
//! # Limits
//!
//! - Evicted arena slots are set to `None` and never reclaimed, so the arena
//!   only grows over the life of a store. Handles stay unambiguous at the
//!   cost of memory proportional to every record ever created.
//! - Each sweep marks from all roots and scans the whole arena. Under
//!   [`EvictionPolicy::Unreachable`](crate::EvictionPolicy) this runs after
//!   every update, so update cost grows with the total record count rather
//!   than with the size of the change.

use symstore_types::{EntityId, TypeName};
use tracing::debug;

use crate::graph::Graph;
use crate::record::RecordHandle;
use crate::subscription::Dispatch;

impl Graph {
    /// Remove every record not reachable from a root record through field
    /// references. Evicted records leave their collections, their
    /// subscriptions are cancelled, and surviving records drop them from
    /// `parents`. Returns the removed identities as (primary type, id).
    pub(crate) fn sweep_unreachable(&mut self, dispatch: &mut Dispatch) -> Vec<(TypeName, EntityId)> {
        let mut reachable = vec![false; self.records.len()];
        let mut stack: Vec<RecordHandle> = self
            .records
            .iter()
            .enumerate()
            .filter(|(_, r)| r.as_ref().is_some_and(|r| r.root))
            .map(|(i, _)| RecordHandle(i))
            .collect();

        while let Some(handle) = stack.pop() {
            if std::mem::replace(&mut reachable[handle.0], true) {
                continue;
            }
            if let Some(Some(record)) = self.records.get(handle.0) {
                stack.extend(record.children().into_iter().filter(|c| !reachable[c.0]));
            }
        }

        let mut evicted = Vec::new();
        for index in 0..self.records.len() {
            if reachable[index] {
                continue;
            }
            let Some(record) = self.records[index].take() else {
                continue;
            };
            let handle = RecordHandle(index);
            for type_name in &record.types {
                if let Some(collection) = self.collections.get_mut(type_name) {
                    if collection.get(&record.id) == Some(handle) {
                        collection.items.remove(&record.id);
                        dispatch.collection_changed(type_name);
                    }
                }
            }
            for sub in &record.subscriptions {
                sub.deactivate();
            }
            if let Some(primary) = record.types.first() {
                evicted.push((primary.clone(), record.id.clone()));
            }
        }

        if !evicted.is_empty() {
            for record in self.records.iter_mut().flatten() {
                record.parents.retain(|p| reachable[p.0]);
            }
            debug!(count = evicted.len(), "evicted unreachable records");
        }
        evicted
    }
}
