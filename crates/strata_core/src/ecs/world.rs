//! # World
//!
//! The explicit engine context: an entity registry plus one typed
//! store per registered component. Every API call takes the world —
//! there is no module-level default instance and no hidden global
//! state.
//!
//! The world is single-threaded by design: systems mutate it during
//! the frame, the merge path mutates it when a transport delivers a
//! buffer, and both run on the same logical thread of execution.
//! Cross-engine sharing happens exclusively through serialized frames.

use std::collections::BTreeMap;

use thiserror::Error;

use super::component::{Component, ComponentId, StorageSemantics, Timestamp};
use super::entity::EntityId;
use super::erased::{DirtyRecord, ErasedStore, MergeError};
use super::growonly::GrowOnlyStore;
use super::registry::{Admission, EntityRegistry};
use super::store::{ComponentStore, MergeEffect, MutGuard, StoreError};

/// Errors surfaced while applying an incoming wire operation.
#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum ApplyError {
    /// The frame references a component id this world has not
    /// registered (schema skew between peers).
    #[error("{0} is not registered on this world")]
    UnknownComponent(ComponentId),

    /// The store rejected the operation or payload.
    #[error(transparent)]
    Merge(#[from] MergeError),
}

/// Container for all entity and component state.
pub struct World {
    registry: EntityRegistry,
    stores: BTreeMap<ComponentId, Box<dyn ErasedStore>>,
}

impl World {
    /// Creates an empty world with no registered components.
    #[must_use]
    pub fn new() -> Self {
        Self::with_registry(EntityRegistry::new())
    }

    /// Creates a world around a pre-configured registry (e.g. one with
    /// a partitioned entity-index range).
    #[must_use]
    pub fn with_registry(registry: EntityRegistry) -> Self {
        Self {
            registry,
            stores: BTreeMap::new(),
        }
    }

    /// Creates a world with every built-in component registered.
    #[must_use]
    pub fn with_builtins() -> Self {
        Self::with_builtins_on(EntityRegistry::new())
    }

    /// Creates a world with built-ins registered around a
    /// pre-configured registry.
    ///
    /// # Panics
    ///
    /// Never panics in practice: the built-in ids are distinct by
    /// construction.
    #[must_use]
    pub fn with_builtins_on(registry: EntityRegistry) -> Self {
        use super::builtin::{Collider, Label, NetworkMapping, Position, Transform, Velocity};
        let mut world = Self::with_registry(registry);
        // Built-in ids are distinct constants; registration cannot fail.
        let _ = world.register_component::<Position>();
        let _ = world.register_component::<Velocity>();
        let _ = world.register_component::<Transform>();
        let _ = world.register_component::<Label>();
        let _ = world.register_component::<Collider>();
        let _ = world.register_component::<NetworkMapping>();
        world
    }

    /// Registers a component schema, installing its typed store.
    ///
    /// Registration is the only moment a schema enters the world;
    /// component ids are fixed from here on.
    pub fn register_component<C: Component>(&mut self) -> Result<(), StoreError> {
        if let Some(existing) = self.stores.get(&C::ID) {
            return Err(StoreError::DuplicateComponent {
                id: C::ID,
                existing: existing.component_name(),
            });
        }
        let store: Box<dyn ErasedStore> = match C::SEMANTICS {
            StorageSemantics::LastWriteWins => Box::new(ComponentStore::<C>::new()),
            StorageSemantics::GrowOnly => Box::new(GrowOnlyStore::<C>::new()),
        };
        self.stores.insert(C::ID, store);
        Ok(())
    }

    // =========================================================================
    // Entity lifecycle
    // =========================================================================

    /// Allocates a fresh or recycled entity handle.
    pub fn add_entity(&mut self) -> EntityId {
        self.registry.spawn()
    }

    /// Removes an entity: tombstones its value in every registered
    /// store (so the deletions propagate) and releases the handle.
    ///
    /// # Returns
    ///
    /// `false` if the handle was null, stale, or already dead.
    pub fn remove_entity(&mut self, entity: EntityId) -> bool {
        if !self.registry.despawn(entity) {
            return false;
        }
        for store in self.stores.values_mut() {
            store.remove_entity(entity);
        }
        true
    }

    /// Checks whether a handle refers to a currently-alive entity.
    #[must_use]
    pub fn is_alive(&self, entity: EntityId) -> bool {
        self.registry.is_alive(entity)
    }

    /// Number of currently alive entities.
    #[must_use]
    pub fn alive_count(&self) -> usize {
        self.registry.alive_count()
    }

    // =========================================================================
    // Typed component access
    // =========================================================================

    /// Inserts a value for an entity that must not already have one.
    pub fn create<C: Component>(&mut self, entity: EntityId, value: C) -> Result<(), StoreError> {
        self.check_alive(entity)?;
        self.lww_store_mut::<C>()?.create(entity, value)
    }

    /// Upserts a value, bumping its timestamp and marking it dirty.
    pub fn create_or_replace<C: Component>(
        &mut self,
        entity: EntityId,
        value: C,
    ) -> Result<(), StoreError> {
        self.check_alive(entity)?;
        self.lww_store_mut::<C>()?.create_or_replace(entity, value);
        Ok(())
    }

    /// Non-throwing read: returns `None` for missing values, stale
    /// handles, and unregistered components alike.
    #[must_use]
    pub fn get_or_null<C: Component>(&self, entity: EntityId) -> Option<&C> {
        if !self.registry.is_alive(entity) {
            return None;
        }
        self.lww_store::<C>().ok()?.get_or_null(entity)
    }

    /// Read that surfaces absence as an error.
    pub fn get<C: Component>(&self, entity: EntityId) -> Result<&C, StoreError> {
        self.check_alive(entity)?;
        self.lww_store::<C>()?.get(entity)
    }

    /// Returns a guard for in-place mutation; dropping the guard after
    /// a mutable access marks the entry dirty.
    pub fn get_mutable<C: Component>(
        &mut self,
        entity: EntityId,
    ) -> Result<MutGuard<'_, C>, StoreError> {
        self.check_alive(entity)?;
        self.lww_store_mut::<C>()?.get_mutable(entity)
    }

    /// Removes the live value, recording a propagating delete.
    pub fn delete_from<C: Component>(&mut self, entity: EntityId) -> Result<(), StoreError> {
        self.check_alive(entity)?;
        self.lww_store_mut::<C>()?.delete_from(entity)
    }

    /// Appends to a grow-only component's log.
    pub fn append<C: Component>(&mut self, entity: EntityId, value: C) -> Result<(), StoreError> {
        self.check_alive(entity)?;
        self.grow_store_mut::<C>()?.append(entity, value);
        Ok(())
    }

    /// Iterates a grow-only component's log for one entity.
    pub fn log_values<C: Component>(
        &self,
        entity: EntityId,
    ) -> Result<impl Iterator<Item = &C>, StoreError> {
        Ok(self.grow_store::<C>()?.values(entity))
    }

    /// Registers a change callback for `(entity, component)`.
    ///
    /// Fires once per write or merge that actually changes the value,
    /// during the drain step for local writes and during merge for
    /// remote ones.
    pub fn on_change<C: Component, F>(
        &mut self,
        entity: EntityId,
        callback: F,
    ) -> Result<(), StoreError>
    where
        F: FnMut(EntityId, Option<&C>) + 'static,
    {
        match C::SEMANTICS {
            StorageSemantics::LastWriteWins => {
                self.lww_store_mut::<C>()?.on_change(entity, callback);
            }
            StorageSemantics::GrowOnly => {
                self.grow_store_mut::<C>()?.on_change(entity, callback);
            }
        }
        Ok(())
    }

    // =========================================================================
    // Queries
    // =========================================================================

    /// Lazy iteration over every entity holding component `A`,
    /// entity-id ascending, reflecting removals made earlier in the
    /// same frame.
    pub fn entities_with<A: Component>(&self) -> impl Iterator<Item = (EntityId, &A)> {
        self.lww_store::<A>()
            .ok()
            .into_iter()
            .flat_map(ComponentStore::iter)
    }

    /// Lazy iteration over entities holding both `A` and `B`.
    pub fn entities_with2<A: Component, B: Component>(
        &self,
    ) -> impl Iterator<Item = (EntityId, &A, &B)> {
        let b = self.lww_store::<B>().ok();
        self.entities_with::<A>().filter_map(move |(entity, a)| {
            b.and_then(|store| store.get_or_null(entity))
                .map(|value| (entity, a, value))
        })
    }

    /// Lazy iteration over entities holding `A`, `B`, and `C`.
    pub fn entities_with3<A: Component, B: Component, C: Component>(
        &self,
    ) -> impl Iterator<Item = (EntityId, &A, &B, &C)> {
        let c = self.lww_store::<C>().ok();
        self.entities_with2::<A, B>()
            .filter_map(move |(entity, a, b)| {
                c.and_then(|store| store.get_or_null(entity))
                    .map(|value| (entity, a, b, value))
            })
    }

    // =========================================================================
    // Synchronization seams (used by the sync layer)
    // =========================================================================

    /// Collects every dirty write in deterministic `(component,
    /// entity)` order and fires pending local-change callbacks.
    ///
    /// Dirty flags are *not* cleared here; call
    /// [`World::clear_drained`] only after a successful transport
    /// hand-off, so failed sends retry next frame.
    pub fn drain_dirty(&mut self, out: &mut Vec<DirtyRecord>) {
        for store in self.stores.values() {
            store.collect_dirty(out);
        }
        for store in self.stores.values_mut() {
            store.fire_changed();
        }
    }

    /// Clears dirty flags for records whose hand-off succeeded.
    ///
    /// Clearing is per record, not per entity: a grow-only log with
    /// several pending appends keeps the ones whose records are not in
    /// `records`, and they re-drain next frame.
    pub fn clear_drained(&mut self, records: &[DirtyRecord]) {
        for record in records {
            if let Some(store) = self.stores.get_mut(&record.component_id) {
                store.clear_dirty(record);
            }
        }
    }

    /// Applies an incoming PUT frame.
    pub fn apply_put(
        &mut self,
        component: ComponentId,
        entity: EntityId,
        timestamp: Timestamp,
        payload: &[u8],
    ) -> Result<MergeEffect, ApplyError> {
        if self.registry.admit(entity) == Admission::Stale {
            return Ok(MergeEffect::Stale);
        }
        let store = self
            .stores
            .get_mut(&component)
            .ok_or(ApplyError::UnknownComponent(component))?;
        Ok(store.apply_put(entity, timestamp, payload)?)
    }

    /// Applies an incoming DELETE frame.
    pub fn apply_delete(
        &mut self,
        component: ComponentId,
        entity: EntityId,
        timestamp: Timestamp,
    ) -> Result<MergeEffect, ApplyError> {
        if self.registry.admit(entity) == Admission::Stale {
            return Ok(MergeEffect::Stale);
        }
        let store = self
            .stores
            .get_mut(&component)
            .ok_or(ApplyError::UnknownComponent(component))?;
        Ok(store.apply_delete(entity, timestamp)?)
    }

    /// Applies an incoming APPEND frame.
    pub fn apply_append(
        &mut self,
        component: ComponentId,
        entity: EntityId,
        timestamp: Timestamp,
        payload: &[u8],
    ) -> Result<MergeEffect, ApplyError> {
        if self.registry.admit(entity) == Admission::Stale {
            return Ok(MergeEffect::Stale);
        }
        let store = self
            .stores
            .get_mut(&component)
            .ok_or(ApplyError::UnknownComponent(component))?;
        Ok(store.apply_append(entity, timestamp, payload)?)
    }

    /// Writes a decoded-and-remapped payload as a local write (the
    /// composite instantiation path).
    pub fn insert_local(
        &mut self,
        component: ComponentId,
        entity: EntityId,
        payload: &[u8],
        remap: &super::component::EntityRemap,
    ) -> Result<(), ApplyError> {
        let store = self
            .stores
            .get_mut(&component)
            .ok_or(ApplyError::UnknownComponent(component))?;
        Ok(store.insert_local(entity, payload, remap)?)
    }

    /// Resolves a component id to its registered name, for logs.
    #[must_use]
    pub fn component_name(&self, component: ComponentId) -> Option<&'static str> {
        self.stores.get(&component).map(|s| s.component_name())
    }

    fn check_alive(&self, entity: EntityId) -> Result<(), StoreError> {
        if self.registry.is_alive(entity) {
            Ok(())
        } else {
            Err(StoreError::StaleEntity { entity })
        }
    }

    fn lww_store<C: Component>(&self) -> Result<&ComponentStore<C>, StoreError> {
        let store = self
            .stores
            .get(&C::ID)
            .ok_or(StoreError::UnregisteredComponent { id: C::ID })?;
        store
            .as_any()
            .downcast_ref::<ComponentStore<C>>()
            .ok_or(StoreError::WrongSemantics {
                component: C::NAME,
                operation: "last-write-wins access",
            })
    }

    fn lww_store_mut<C: Component>(&mut self) -> Result<&mut ComponentStore<C>, StoreError> {
        let store = self
            .stores
            .get_mut(&C::ID)
            .ok_or(StoreError::UnregisteredComponent { id: C::ID })?;
        store
            .as_any_mut()
            .downcast_mut::<ComponentStore<C>>()
            .ok_or(StoreError::WrongSemantics {
                component: C::NAME,
                operation: "last-write-wins access",
            })
    }

    fn grow_store<C: Component>(&self) -> Result<&GrowOnlyStore<C>, StoreError> {
        let store = self
            .stores
            .get(&C::ID)
            .ok_or(StoreError::UnregisteredComponent { id: C::ID })?;
        store
            .as_any()
            .downcast_ref::<GrowOnlyStore<C>>()
            .ok_or(StoreError::WrongSemantics {
                component: C::NAME,
                operation: "grow-only access",
            })
    }

    fn grow_store_mut<C: Component>(&mut self) -> Result<&mut GrowOnlyStore<C>, StoreError> {
        let store = self
            .stores
            .get_mut(&C::ID)
            .ok_or(StoreError::UnregisteredComponent { id: C::ID })?;
        store
            .as_any_mut()
            .downcast_mut::<GrowOnlyStore<C>>()
            .ok_or(StoreError::WrongSemantics {
                component: C::NAME,
                operation: "grow-only access",
            })
    }
}

impl Default for World {
    fn default() -> Self {
        Self::new()
    }
}
