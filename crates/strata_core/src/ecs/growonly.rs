//! # Grow-Only Component Store
//!
//! Append-style log per entity, used for components whose merges union
//! rather than overwrite (e.g. network entity mappings). Elements are
//! ordered by `(timestamp, encoded bytes)` — the same total order the
//! LWW store uses — so every peer's log converges to the same sequence
//! regardless of arrival order. Nothing is ever overwritten or deleted.

use std::collections::{BTreeMap, BTreeSet};

use crate::codec::CodecError;

use super::component::{Component, Timestamp};
use super::entity::EntityId;
use super::store::MergeEffect;

struct LogElement<C> {
    timestamp: Timestamp,
    value: C,
    dirty: bool,
}

/// Append-only log store for one grow-only component type.
pub struct GrowOnlyStore<C: Component> {
    logs: BTreeMap<EntityId, Vec<LogElement<C>>>,
    changed: BTreeSet<EntityId>,
    listeners: std::collections::HashMap<EntityId, Vec<super::store::ChangeCallback<C>>>,
}

impl<C: Component> GrowOnlyStore<C> {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self {
            logs: BTreeMap::new(),
            changed: BTreeSet::new(),
            listeners: std::collections::HashMap::new(),
        }
    }

    /// Appends a value to an entity's log with the next local
    /// timestamp, marking it dirty for the next drain.
    pub fn append(&mut self, entity: EntityId, value: C) {
        let log = self.logs.entry(entity).or_default();
        let timestamp = log
            .last()
            .map(|element| element.timestamp)
            .unwrap_or(Timestamp::ZERO)
            .next();
        log.push(LogElement {
            timestamp,
            value,
            dirty: true,
        });
        self.changed.insert(entity);
    }

    /// Iterates an entity's log values in converged order.
    pub fn values(&self, entity: EntityId) -> impl Iterator<Item = &C> {
        self.logs
            .get(&entity)
            .into_iter()
            .flat_map(|log| log.iter().map(|element| &element.value))
    }

    /// Number of elements in an entity's log.
    #[must_use]
    pub fn len(&self, entity: EntityId) -> usize {
        self.logs.get(&entity).map_or(0, Vec::len)
    }

    /// True if the entity's log is empty.
    #[must_use]
    pub fn is_empty(&self, entity: EntityId) -> bool {
        self.len(entity) == 0
    }

    /// Registers a change callback fired when the entity's log grows.
    ///
    /// The callback receives the element just appended.
    pub fn on_change<F>(&mut self, entity: EntityId, callback: F)
    where
        F: FnMut(EntityId, Option<&C>) + 'static,
    {
        self.listeners
            .entry(entity)
            .or_default()
            .push(Box::new(callback));
    }

    /// Merges an incoming APPEND frame: union semantics.
    ///
    /// An element already present (same timestamp, same bytes) is an
    /// idempotent duplicate; anything else is inserted at its position
    /// in the `(timestamp, bytes)` order.
    pub fn merge_append(
        &mut self,
        entity: EntityId,
        timestamp: Timestamp,
        payload: &[u8],
    ) -> Result<MergeEffect, CodecError> {
        let value = C::from_bytes(payload)?;
        let log = self.logs.entry(entity).or_default();

        let position = log.partition_point(|element| {
            let bytes = element.value.to_bytes();
            (element.timestamp, bytes.as_slice()) <= (timestamp, payload)
        });
        let exists = position
            .checked_sub(1)
            .and_then(|i| log.get(i))
            .is_some_and(|element| {
                element.timestamp == timestamp && element.value.to_bytes() == payload
            });
        if exists {
            return Ok(MergeEffect::Duplicate);
        }
        log.insert(
            position,
            LogElement {
                timestamp,
                value,
                dirty: false,
            },
        );
        self.notify(entity, position);
        Ok(MergeEffect::Changed)
    }

    /// Collects dirty log elements without clearing their flags.
    pub(crate) fn collect_dirty(&self, out: &mut Vec<super::erased::DirtyRecord>) {
        for (entity, log) in &self.logs {
            for element in log {
                if element.dirty {
                    out.push(super::erased::DirtyRecord {
                        component_id: C::ID,
                        entity: *entity,
                        timestamp: element.timestamp,
                        op: super::erased::DrainOp::Append(element.value.to_bytes()),
                    });
                }
            }
        }
    }

    /// Clears the dirty flag of the single log element a drained
    /// record referred to.
    ///
    /// Local appends carry strictly increasing timestamps per entity,
    /// so `(entity, timestamp)` pins exactly one element. Sibling
    /// appends not yet handed off keep their flags and re-drain.
    pub(crate) fn clear_dirty(&mut self, entity: EntityId, timestamp: Timestamp) {
        if let Some(log) = self.logs.get_mut(&entity) {
            if let Some(element) = log
                .iter_mut()
                .find(|element| element.timestamp == timestamp)
            {
                element.dirty = false;
            }
        }
    }

    /// Fires change callbacks for entities appended locally since the
    /// last drain.
    pub(crate) fn fire_changed(&mut self) {
        let changed = std::mem::take(&mut self.changed);
        for entity in changed {
            let last = self
                .logs
                .get(&entity)
                .and_then(|log| log.last())
                .map(|element| element.value.clone());
            if let Some(callbacks) = self.listeners.get_mut(&entity) {
                for callback in callbacks.iter_mut() {
                    callback(entity, last.as_ref());
                }
            }
        }
    }

    fn notify(&mut self, entity: EntityId, position: usize) {
        let value = self
            .logs
            .get(&entity)
            .and_then(|log| log.get(position))
            .map(|element| element.value.clone());
        if let Some(callbacks) = self.listeners.get_mut(&entity) {
            for callback in callbacks.iter_mut() {
                callback(entity, value.as_ref());
            }
        }
    }
}

impl<C: Component> Default for GrowOnlyStore<C> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::super::builtin::NetworkMapping;
    use super::*;

    fn entity(n: u16) -> EntityId {
        EntityId::new(n, 1)
    }

    fn mapping(peer: u32) -> NetworkMapping {
        NetworkMapping {
            peer,
            remote_entity: peer * 10,
        }
    }

    #[test]
    fn test_append_assigns_monotonic_timestamps() {
        let mut store = GrowOnlyStore::<NetworkMapping>::new();
        store.append(entity(1), mapping(1));
        store.append(entity(1), mapping(2));

        let mut records = Vec::new();
        store.collect_dirty(&mut records);
        assert_eq!(records.len(), 2);
        assert!(records[0].timestamp < records[1].timestamp);
    }

    #[test]
    fn test_merge_union_converges_regardless_of_order() {
        let a = (Timestamp::from_raw(1), mapping(1).to_bytes());
        let b = (Timestamp::from_raw(2), mapping(2).to_bytes());

        let mut forward = GrowOnlyStore::<NetworkMapping>::new();
        forward.merge_append(entity(1), a.0, &a.1).unwrap();
        forward.merge_append(entity(1), b.0, &b.1).unwrap();

        let mut backward = GrowOnlyStore::<NetworkMapping>::new();
        backward.merge_append(entity(1), b.0, &b.1).unwrap();
        backward.merge_append(entity(1), a.0, &a.1).unwrap();

        let f: Vec<_> = forward.values(entity(1)).cloned().collect();
        let r: Vec<_> = backward.values(entity(1)).cloned().collect();
        assert_eq!(f, r);
        assert_eq!(f.len(), 2);
    }

    #[test]
    fn test_clear_dirty_is_element_granular() {
        let mut store = GrowOnlyStore::<NetworkMapping>::new();
        store.append(entity(1), mapping(1));
        store.append(entity(1), mapping(2));

        let mut records = Vec::new();
        store.collect_dirty(&mut records);
        assert_eq!(records.len(), 2);

        // Only the first record was handed off; its sibling must
        // still be pending.
        store.clear_dirty(entity(1), records[0].timestamp);
        let mut after = Vec::new();
        store.collect_dirty(&mut after);
        assert_eq!(after.len(), 1);
        assert_eq!(after[0].timestamp, records[1].timestamp);
    }

    #[test]
    fn test_merge_duplicate_is_idempotent() {
        let mut store = GrowOnlyStore::<NetworkMapping>::new();
        let bytes = mapping(7).to_bytes();
        let ts = Timestamp::from_raw(4);

        assert_eq!(
            store.merge_append(entity(1), ts, &bytes).unwrap(),
            MergeEffect::Changed
        );
        assert_eq!(
            store.merge_append(entity(1), ts, &bytes).unwrap(),
            MergeEffect::Duplicate
        );
        assert_eq!(store.len(entity(1)), 1);
    }
}
