//! # Type-Erased Store Access
//!
//! The world keeps one typed store per component behind this trait so
//! the synchronization layer can drain and merge by numeric component
//! id without knowing concrete types. Typed access is recovered through
//! `Any` downcasts at the world's accessor seam only.

use std::any::Any;

use thiserror::Error;

use crate::codec::CodecError;

use super::component::{Component, ComponentId, EntityRemap, StorageSemantics, Timestamp};
use super::entity::EntityId;
use super::growonly::GrowOnlyStore;
use super::store::{ComponentStore, MergeEffect};

/// Errors surfaced when applying a wire operation to a store.
#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum MergeError {
    /// The payload could not be decoded against the component schema.
    #[error(transparent)]
    Codec(#[from] CodecError),

    /// The operation is not valid for the component's storage
    /// semantics (e.g. DELETE against a grow-only log).
    #[error("{component} does not support wire op {op}")]
    UnsupportedOp {
        /// The rejected operation.
        op: &'static str,
        /// Component type name.
        component: &'static str,
    },
}

/// One dirty component write, drained at end of frame.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DirtyRecord {
    /// Wire id of the component.
    pub component_id: ComponentId,
    /// The written entity.
    pub entity: EntityId,
    /// Timestamp of the write.
    pub timestamp: Timestamp,
    /// The operation and payload to frame.
    pub op: DrainOp,
}

/// The wire-level shape of a drained write.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum DrainOp {
    /// Full value replacement; carries the encoded payload.
    Put(Vec<u8>),
    /// Tombstoned deletion; empty payload on the wire.
    Delete,
    /// Grow-only log append; carries the encoded element.
    Append(Vec<u8>),
}

/// Type-erased facade over a [`ComponentStore`] or [`GrowOnlyStore`].
pub trait ErasedStore: Any {
    /// Wire id of the stored component type.
    fn component_id(&self) -> ComponentId;

    /// Human-readable component name for logs.
    fn component_name(&self) -> &'static str;

    /// Storage semantics of the component type.
    fn semantics(&self) -> StorageSemantics;

    /// Collects dirty writes without clearing flags; clearing happens
    /// only after a successful transport hand-off.
    fn collect_dirty(&self, out: &mut Vec<DirtyRecord>);

    /// Clears the dirty flag belonging to one drained record.
    ///
    /// Record-granular: a grow-only log clears only the element with
    /// the record's timestamp, and an LWW entry whose timestamp moved
    /// past the record keeps its flag.
    fn clear_dirty(&mut self, record: &DirtyRecord);

    /// Fires pending local-change callbacks (the drain step).
    fn fire_changed(&mut self);

    /// Applies an incoming PUT frame.
    fn apply_put(
        &mut self,
        entity: EntityId,
        timestamp: Timestamp,
        payload: &[u8],
    ) -> Result<MergeEffect, MergeError>;

    /// Applies an incoming DELETE frame.
    fn apply_delete(
        &mut self,
        entity: EntityId,
        timestamp: Timestamp,
    ) -> Result<MergeEffect, MergeError>;

    /// Applies an incoming APPEND frame.
    fn apply_append(
        &mut self,
        entity: EntityId,
        timestamp: Timestamp,
        payload: &[u8],
    ) -> Result<MergeEffect, MergeError>;

    /// Writes a decoded-and-remapped payload as a *local* write (used
    /// by composite instantiation, so the write is dirty and
    /// propagates like any other local mutation).
    fn insert_local(
        &mut self,
        entity: EntityId,
        payload: &[u8],
        remap: &EntityRemap,
    ) -> Result<(), MergeError>;

    /// Tombstones the entity across this store (entity removal).
    fn remove_entity(&mut self, entity: EntityId);

    /// Upcast for typed downcasting at the world seam.
    fn as_any(&self) -> &dyn Any;

    /// Mutable upcast for typed downcasting at the world seam.
    fn as_any_mut(&mut self) -> &mut dyn Any;
}

impl<C: Component> ErasedStore for ComponentStore<C> {
    fn component_id(&self) -> ComponentId {
        C::ID
    }

    fn component_name(&self) -> &'static str {
        C::NAME
    }

    fn semantics(&self) -> StorageSemantics {
        StorageSemantics::LastWriteWins
    }

    fn collect_dirty(&self, out: &mut Vec<DirtyRecord>) {
        ComponentStore::collect_dirty(self, out);
    }

    fn clear_dirty(&mut self, record: &DirtyRecord) {
        ComponentStore::clear_dirty(self, record.entity, record.timestamp);
    }

    fn fire_changed(&mut self) {
        ComponentStore::fire_changed(self);
    }

    fn apply_put(
        &mut self,
        entity: EntityId,
        timestamp: Timestamp,
        payload: &[u8],
    ) -> Result<MergeEffect, MergeError> {
        Ok(self.merge_put(entity, timestamp, payload)?)
    }

    fn apply_delete(
        &mut self,
        entity: EntityId,
        timestamp: Timestamp,
    ) -> Result<MergeEffect, MergeError> {
        Ok(self.merge_delete(entity, timestamp))
    }

    fn apply_append(
        &mut self,
        _entity: EntityId,
        _timestamp: Timestamp,
        _payload: &[u8],
    ) -> Result<MergeEffect, MergeError> {
        Err(MergeError::UnsupportedOp {
            op: "APPEND_VALUE",
            component: C::NAME,
        })
    }

    fn insert_local(
        &mut self,
        entity: EntityId,
        payload: &[u8],
        remap: &EntityRemap,
    ) -> Result<(), MergeError> {
        let mut value = C::from_bytes(payload)?;
        value.remap_entities(remap);
        self.create_or_replace(entity, value);
        Ok(())
    }

    fn remove_entity(&mut self, entity: EntityId) {
        ComponentStore::remove_entity(self, entity);
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

impl<C: Component> ErasedStore for GrowOnlyStore<C> {
    fn component_id(&self) -> ComponentId {
        C::ID
    }

    fn component_name(&self) -> &'static str {
        C::NAME
    }

    fn semantics(&self) -> StorageSemantics {
        StorageSemantics::GrowOnly
    }

    fn collect_dirty(&self, out: &mut Vec<DirtyRecord>) {
        GrowOnlyStore::collect_dirty(self, out);
    }

    fn clear_dirty(&mut self, record: &DirtyRecord) {
        GrowOnlyStore::clear_dirty(self, record.entity, record.timestamp);
    }

    fn fire_changed(&mut self) {
        GrowOnlyStore::fire_changed(self);
    }

    fn apply_put(
        &mut self,
        _entity: EntityId,
        _timestamp: Timestamp,
        _payload: &[u8],
    ) -> Result<MergeEffect, MergeError> {
        Err(MergeError::UnsupportedOp {
            op: "PUT_COMPONENT",
            component: C::NAME,
        })
    }

    fn apply_delete(
        &mut self,
        _entity: EntityId,
        _timestamp: Timestamp,
    ) -> Result<MergeEffect, MergeError> {
        Err(MergeError::UnsupportedOp {
            op: "DELETE_COMPONENT",
            component: C::NAME,
        })
    }

    fn apply_append(
        &mut self,
        entity: EntityId,
        timestamp: Timestamp,
        payload: &[u8],
    ) -> Result<MergeEffect, MergeError> {
        Ok(self.merge_append(entity, timestamp, payload)?)
    }

    fn insert_local(
        &mut self,
        entity: EntityId,
        payload: &[u8],
        remap: &EntityRemap,
    ) -> Result<(), MergeError> {
        let mut value = C::from_bytes(payload)?;
        value.remap_entities(remap);
        self.append(entity, value);
        Ok(())
    }

    fn remove_entity(&mut self, _entity: EntityId) {
        // Grow-only logs never shrink; entity removal leaves the log
        // intact so late-joining peers still converge on it.
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}
