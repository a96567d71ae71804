//! # STRATA Core
//!
//! Entity-Component store with CRDT-friendly write tracking, designed
//! for state synchronization between independent engine instances:
//!
//! - Generational entity handles that detect stale references
//! - Per-component tables with logical timestamps and dirty tracking
//! - A deterministic binary codec for component values
//! - A frame scheduler for registered systems
//!
//! ## Architecture Rules
//!
//! 1. **No hidden globals** - the `World` is an explicit context object
//! 2. **Total merge order** - every peer resolves conflicts identically
//! 3. **Single-threaded per engine** - concurrency is between engines,
//!    over serialized frames, never shared memory
//!
//! ## Example
//!
//! ```rust,ignore
//! use strata_core::{World, builtin::Position};
//!
//! let mut world = World::with_builtins();
//! let e = world.add_entity();
//! world.create(e, Position::new(1.0, 0.0, 0.0))?;
//! ```

pub mod codec;
pub mod ecs;
pub mod schedule;

pub use codec::{ByteReader, ByteWriter, CodecError};
pub use ecs::{
    builtin, Admission, ApplyError, Component, ComponentId, ComponentStore, DirtyRecord, DrainOp,
    EntityId, EntityRegistry, EntityRemap, ErasedStore, GrowOnlyStore, MergeEffect, MergeError,
    MutGuard, StorageSemantics, StoreError, Timestamp, World, MAX_ENTITY_INDEX,
};
pub use schedule::{Scheduler, SystemError, SystemFn, SystemRun, DEFAULT_PRIORITY};
