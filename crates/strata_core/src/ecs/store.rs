//! # Last-Write-Wins Component Store
//!
//! One table per component type: `entity -> (value, timestamp, dirty)`.
//!
//! ## Invariants
//!
//! - At most one live entry per entity
//! - A deleted entry leaves a tombstone carrying the delete timestamp,
//!   so a late-arriving older write cannot resurrect it
//! - Timestamps are monotonically non-decreasing per entry from this
//!   writer's perspective
//! - The merge rule is a total order: timestamp first, then encoded
//!   payload bytes on an exact tie (a delete orders as the empty byte
//!   string). Every peer applies the same rule, so every peer converges.

use std::cmp::Ordering;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::ops::{Deref, DerefMut};

use thiserror::Error;

use crate::codec::CodecError;

use super::component::{Component, ComponentId, Timestamp};
use super::entity::EntityId;

/// Errors surfaced by store operations that represent local API misuse.
///
/// These are programming errors in the calling system, not runtime
/// network conditions, and are never silently ignored.
#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum StoreError {
    /// `create` was called for an entity that already has a live value.
    #[error("{component} already exists on {entity}")]
    AlreadyExists {
        /// Component type name.
        component: &'static str,
        /// The entity in question.
        entity: EntityId,
    },

    /// A read/mutate/delete targeted an entity with no live value.
    #[error("{component} not present on {entity}")]
    NotFound {
        /// Component type name.
        component: &'static str,
        /// The entity in question.
        entity: EntityId,
    },

    /// A write targeted a dead or stale entity handle.
    #[error("entity handle {entity} is stale or dead")]
    StaleEntity {
        /// The offending handle.
        entity: EntityId,
    },

    /// The component type was never registered with this world.
    #[error("{id} is not registered")]
    UnregisteredComponent {
        /// The unregistered id.
        id: ComponentId,
    },

    /// Two component types were registered with the same wire id.
    #[error("{id} already registered as {existing}")]
    DuplicateComponent {
        /// The contested id.
        id: ComponentId,
        /// Name of the type already holding the id.
        existing: &'static str,
    },

    /// A typed accessor was used against a component whose storage
    /// semantics do not support the operation.
    #[error("{component} does not support {operation}")]
    WrongSemantics {
        /// Component type name.
        component: &'static str,
        /// The unsupported operation.
        operation: &'static str,
    },
}

/// Outcome of merging one incoming frame into a store.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MergeEffect {
    /// The frame won and the locally-visible value changed.
    Changed,
    /// The frame won (timestamp advanced) but the value was already
    /// identical; no change callback fires.
    Accepted,
    /// The frame is byte-for-byte the current state; idempotent replay.
    Duplicate,
    /// The frame lost the last-write-wins comparison and was discarded.
    Stale,
}

impl MergeEffect {
    /// True if the frame was accepted into local state (and should be
    /// re-broadcast to other attached transports).
    #[inline]
    #[must_use]
    pub const fn accepted(self) -> bool {
        matches!(self, Self::Changed | Self::Accepted)
    }
}

/// Change callback: receives the entity and its new value (`None` when
/// the value was removed).
pub type ChangeCallback<C> = Box<dyn FnMut(EntityId, Option<&C>)>;

struct Entry<C> {
    /// `None` is a tombstone retaining the delete timestamp.
    value: Option<C>,
    timestamp: Timestamp,
    dirty: bool,
}

/// Per-component-type LWW table with dirty tracking and change
/// callbacks.
pub struct ComponentStore<C: Component> {
    entries: BTreeMap<EntityId, Entry<C>>,
    listeners: HashMap<EntityId, Vec<ChangeCallback<C>>>,
    /// Entities whose value changed locally since the last drain;
    /// callbacks for these fire during the drain step, not mid-write.
    changed: BTreeSet<EntityId>,
}

/// Total LWW order between an incoming write and the local entry.
///
/// `Greater` means the incoming write wins. Compares timestamps first;
/// on an exact tie, lexicographic payload bytes (so a PUT beats a
/// DELETE at the same timestamp, and identical bytes are a duplicate).
#[must_use]
pub fn lww_ordering(
    incoming_ts: Timestamp,
    incoming_bytes: &[u8],
    local_ts: Timestamp,
    local_bytes: &[u8],
) -> Ordering {
    (incoming_ts, incoming_bytes).cmp(&(local_ts, local_bytes))
}

impl<C: Component> ComponentStore<C> {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self {
            entries: BTreeMap::new(),
            listeners: HashMap::new(),
            changed: BTreeSet::new(),
        }
    }

    /// Number of entities with a live value.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries
            .values()
            .filter(|entry| entry.value.is_some())
            .count()
    }

    /// True if no entity has a live value.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Inserts a value for an entity that must not already have one.
    ///
    /// Creating over a tombstone is allowed — the tombstone's timestamp
    /// is carried forward so the new value still orders after the
    /// delete it replaces.
    pub fn create(&mut self, entity: EntityId, value: C) -> Result<(), StoreError> {
        if self
            .entries
            .get(&entity)
            .is_some_and(|entry| entry.value.is_some())
        {
            return Err(StoreError::AlreadyExists {
                component: C::NAME,
                entity,
            });
        }
        self.write(entity, Some(value));
        Ok(())
    }

    /// Upserts a value, bumping the timestamp and marking dirty.
    pub fn create_or_replace(&mut self, entity: EntityId, value: C) {
        self.write(entity, Some(value));
    }

    /// Non-failing read of the live value.
    #[must_use]
    pub fn get_or_null(&self, entity: EntityId) -> Option<&C> {
        self.entries.get(&entity).and_then(|e| e.value.as_ref())
    }

    /// Read that surfaces absence as an error.
    pub fn get(&self, entity: EntityId) -> Result<&C, StoreError> {
        self.get_or_null(entity).ok_or(StoreError::NotFound {
            component: C::NAME,
            entity,
        })
    }

    /// Returns a guard for in-place mutation.
    ///
    /// Dropping the guard after a mutable access bumps the timestamp
    /// and marks the entry dirty; a guard only read through leaves the
    /// entry clean.
    pub fn get_mutable(&mut self, entity: EntityId) -> Result<MutGuard<'_, C>, StoreError> {
        let Some(entry) = self.entries.get_mut(&entity) else {
            return Err(StoreError::NotFound {
                component: C::NAME,
                entity,
            });
        };
        let Entry {
            value,
            timestamp,
            dirty,
        } = entry;
        let Some(value) = value.as_mut() else {
            return Err(StoreError::NotFound {
                component: C::NAME,
                entity,
            });
        };
        Ok(MutGuard {
            entity,
            value,
            timestamp,
            dirty,
            changed: &mut self.changed,
            touched: false,
        })
    }

    /// Removes the live value, leaving a dirty tombstone whose delete
    /// will be propagated to peers.
    pub fn delete_from(&mut self, entity: EntityId) -> Result<(), StoreError> {
        if self.get_or_null(entity).is_none() {
            return Err(StoreError::NotFound {
                component: C::NAME,
                entity,
            });
        }
        self.write(entity, None);
        Ok(())
    }

    /// Registers a change callback for one entity.
    ///
    /// The callback fires once per write or merge that actually changes
    /// the value (including to "removed"), during the frame's drain
    /// step for local writes and during merge for remote writes.
    pub fn on_change<F>(&mut self, entity: EntityId, callback: F)
    where
        F: FnMut(EntityId, Option<&C>) + 'static,
    {
        self.listeners
            .entry(entity)
            .or_default()
            .push(Box::new(callback));
    }

    /// Iterates live `(entity, value)` pairs, entity-id ascending.
    pub fn iter(&self) -> impl Iterator<Item = (EntityId, &C)> {
        self.entries
            .iter()
            .filter_map(|(entity, entry)| entry.value.as_ref().map(|v| (*entity, v)))
    }

    /// Merges an incoming PUT frame. The caller has already admitted
    /// the entity and decoded nothing — payload decoding happens only
    /// if the frame wins.
    pub fn merge_put(
        &mut self,
        entity: EntityId,
        timestamp: Timestamp,
        payload: &[u8],
    ) -> Result<MergeEffect, CodecError> {
        let effect = match self.entries.get(&entity) {
            None => {
                let value = C::from_bytes(payload)?;
                self.entries.insert(
                    entity,
                    Entry {
                        value: Some(value),
                        timestamp,
                        dirty: false,
                    },
                );
                MergeEffect::Changed
            }
            Some(entry) => {
                let local_bytes = entry.value.as_ref().map(C::to_bytes).unwrap_or_default();
                match lww_ordering(timestamp, payload, entry.timestamp, &local_bytes) {
                    Ordering::Less => MergeEffect::Stale,
                    Ordering::Equal => MergeEffect::Duplicate,
                    Ordering::Greater => {
                        let value = C::from_bytes(payload)?;
                        let value_changed = entry.value.as_ref() != Some(&value);
                        // The incoming write superseded any local
                        // pending one, so the dirty flag drops too.
                        self.entries.insert(
                            entity,
                            Entry {
                                value: Some(value),
                                timestamp,
                                dirty: false,
                            },
                        );
                        if value_changed {
                            MergeEffect::Changed
                        } else {
                            MergeEffect::Accepted
                        }
                    }
                }
            }
        };
        if effect == MergeEffect::Changed {
            self.notify(entity);
        }
        Ok(effect)
    }

    /// Merges an incoming DELETE frame.
    ///
    /// Recording the tombstone even for entities this store has never
    /// seen is what stops a late-arriving older PUT from resurrecting
    /// the value.
    pub fn merge_delete(&mut self, entity: EntityId, timestamp: Timestamp) -> MergeEffect {
        let effect = match self.entries.get(&entity) {
            None => {
                self.entries.insert(
                    entity,
                    Entry {
                        value: None,
                        timestamp,
                        dirty: false,
                    },
                );
                // Nothing visible changed; the tombstone just pins the
                // delete timestamp.
                MergeEffect::Accepted
            }
            Some(entry) => {
                let local_bytes = entry.value.as_ref().map(C::to_bytes).unwrap_or_default();
                match lww_ordering(timestamp, &[], entry.timestamp, &local_bytes) {
                    Ordering::Less => MergeEffect::Stale,
                    Ordering::Equal => MergeEffect::Duplicate,
                    Ordering::Greater => {
                        let value_changed = entry.value.is_some();
                        self.entries.insert(
                            entity,
                            Entry {
                                value: None,
                                timestamp,
                                dirty: false,
                            },
                        );
                        if value_changed {
                            MergeEffect::Changed
                        } else {
                            MergeEffect::Accepted
                        }
                    }
                }
            }
        };
        if effect == MergeEffect::Changed {
            self.notify(entity);
        }
        effect
    }

    /// Tombstones the entity's value as part of entity removal; the
    /// delete is dirty so it propagates like any local delete.
    pub fn remove_entity(&mut self, entity: EntityId) {
        if self.get_or_null(entity).is_some() {
            self.write(entity, None);
        }
    }

    /// Collects dirty entries without clearing their flags.
    pub(crate) fn collect_dirty(&self, out: &mut Vec<super::erased::DirtyRecord>) {
        for (entity, entry) in &self.entries {
            if entry.dirty {
                out.push(super::erased::DirtyRecord {
                    component_id: C::ID,
                    entity: *entity,
                    timestamp: entry.timestamp,
                    op: match &entry.value {
                        Some(value) => super::erased::DrainOp::Put(value.to_bytes()),
                        None => super::erased::DrainOp::Delete,
                    },
                });
            }
        }
    }

    /// Clears the dirty flag for one entity after a successful
    /// hand-off to a transport.
    ///
    /// The timestamp must match the drained record's: a write that
    /// landed after the drain keeps its flag and goes out next frame.
    pub(crate) fn clear_dirty(&mut self, entity: EntityId, timestamp: Timestamp) {
        if let Some(entry) = self.entries.get_mut(&entity) {
            if entry.timestamp == timestamp {
                entry.dirty = false;
            }
        }
    }

    /// Fires change callbacks for every entity written locally since
    /// the last drain.
    pub(crate) fn fire_changed(&mut self) {
        let changed = std::mem::take(&mut self.changed);
        for entity in changed {
            self.notify(entity);
        }
    }

    /// Local write path shared by create/replace/delete: bumps the
    /// timestamp, marks dirty, queues the change callback.
    fn write(&mut self, entity: EntityId, value: Option<C>) {
        let entry = self.entries.entry(entity).or_insert(Entry {
            value: None,
            timestamp: Timestamp::ZERO,
            dirty: false,
        });
        entry.value = value;
        entry.timestamp = entry.timestamp.next();
        entry.dirty = true;
        self.changed.insert(entity);
    }

    fn notify(&mut self, entity: EntityId) {
        let Some(callbacks) = self.listeners.get_mut(&entity) else {
            return;
        };
        // Clone out of the entry so callbacks see a value while the
        // callback list is mutably borrowed.
        let value = self
            .entries
            .get(&entity)
            .and_then(|entry| entry.value.clone());
        for callback in callbacks.iter_mut() {
            callback(entity, value.as_ref());
        }
    }
}

impl<C: Component> Default for ComponentStore<C> {
    fn default() -> Self {
        Self::new()
    }
}

/// Mutable access guard returned by [`ComponentStore::get_mutable`].
///
/// Dropping the guard after a `DerefMut` access bumps the entry's
/// timestamp and marks it dirty.
pub struct MutGuard<'a, C: Component> {
    entity: EntityId,
    value: &'a mut C,
    timestamp: &'a mut Timestamp,
    dirty: &'a mut bool,
    changed: &'a mut BTreeSet<EntityId>,
    touched: bool,
}

impl<C: Component> Deref for MutGuard<'_, C> {
    type Target = C;

    fn deref(&self) -> &C {
        self.value
    }
}

impl<C: Component> DerefMut for MutGuard<'_, C> {
    fn deref_mut(&mut self) -> &mut C {
        self.touched = true;
        self.value
    }
}

impl<C: Component> Drop for MutGuard<'_, C> {
    fn drop(&mut self) {
        if self.touched {
            *self.timestamp = self.timestamp.next();
            *self.dirty = true;
            self.changed.insert(self.entity);
        }
    }
}
