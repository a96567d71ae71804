//! # Entity Component System
//!
//! A data-oriented component store built for state synchronization.
//!
//! ## Design Philosophy
//!
//! - Entities are generational handles; all data lives in per-type stores
//! - Every write carries a logical timestamp; merges are last-write-wins
//!   under a total order shared by every peer
//! - Dirty tracking feeds the end-of-frame drain; nothing transmits twice
//!   unless a send failed
//! - No global world instance: the `World` is passed explicitly

pub mod builtin;
mod component;
mod entity;
mod erased;
mod growonly;
mod registry;
mod store;
mod world;

pub use component::{Component, ComponentId, EntityRemap, StorageSemantics, Timestamp};
pub use entity::EntityId;
pub use erased::{DirtyRecord, DrainOp, ErasedStore, MergeError};
pub use growonly::GrowOnlyStore;
pub use registry::{Admission, EntityRegistry, MAX_ENTITY_INDEX};
pub use store::{ComponentStore, MergeEffect, MutGuard, StoreError, lww_ordering};
pub use world::{ApplyError, World};
