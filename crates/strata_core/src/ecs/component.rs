//! # Component Schemas
//!
//! Components are pure data with a registration-time schema: a stable
//! numeric wire id, a storage semantic, and a binary encoding. The
//! registry of schemas is closed at registration — there is no runtime
//! lookup by string name and no dynamically-typed payload; typed access
//! goes through generics.

use std::collections::HashMap;

use crate::codec::{ByteReader, ByteWriter, CodecError};

use super::entity::EntityId;

/// Stable numeric identifier for a component type, used on the wire.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(transparent)]
pub struct ComponentId(pub u32);

impl std::fmt::Display for ComponentId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "component({})", self.0)
    }
}

/// How concurrent writes to a component are reconciled.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StorageSemantics {
    /// At most one value per entity; newer writes fully replace older
    /// ones, deletions tombstone the entry.
    LastWriteWins,
    /// An append-only log per entity; merges union, nothing is ever
    /// overwritten or deleted.
    GrowOnly,
}

/// Logical timestamp attached to every component write.
///
/// A Lamport counter scoped to one `(entity, component)` pair: each
/// local write bumps it, each accepted merge adopts the incoming value.
/// Monotonically non-decreasing from any single writer's perspective.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(transparent)]
pub struct Timestamp(u32);

impl Timestamp {
    /// The zero timestamp: no write has happened yet.
    pub const ZERO: Self = Self(0);

    /// Reconstructs a timestamp from its raw wire representation.
    #[inline]
    #[must_use]
    pub const fn from_raw(raw: u32) -> Self {
        Self(raw)
    }

    /// Returns the raw 32-bit wire representation.
    #[inline]
    #[must_use]
    pub const fn raw(self) -> u32 {
        self.0
    }

    /// Returns the next timestamp after this one.
    ///
    /// Saturates rather than wrapping: a wrapped counter would break
    /// the total order every peer relies on for convergence.
    #[inline]
    #[must_use]
    pub const fn next(self) -> Self {
        Self(self.0.saturating_add(1))
    }
}

/// Mapping from template-local entity handles to freshly-allocated
/// ones, threaded explicitly through composite instantiation.
#[derive(Debug, Default)]
pub struct EntityRemap {
    map: HashMap<EntityId, EntityId>,
}

impl EntityRemap {
    /// Creates an empty remap table.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Records that template-local `from` materialized as `to`.
    pub fn insert(&mut self, from: EntityId, to: EntityId) {
        self.map.insert(from, to);
    }

    /// Resolves a template-local handle, passing through handles the
    /// table does not know (references to pre-existing scene entities).
    #[must_use]
    pub fn resolve(&self, id: EntityId) -> EntityId {
        self.map.get(&id).copied().unwrap_or(id)
    }

    /// Returns the number of recorded mappings.
    #[must_use]
    pub fn len(&self) -> usize {
        self.map.len()
    }

    /// Returns true if no mappings have been recorded.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }
}

/// A component schema: data layout, wire id, and storage semantics.
///
/// Field order in `encode`/`decode` *is* the wire schema; changing it
/// is a wire-format break.
///
/// # Example
///
/// ```rust,ignore
/// #[derive(Clone, Debug, PartialEq)]
/// struct Health { current: u32, max: u32 }
///
/// impl Component for Health {
///     const ID: ComponentId = ComponentId(100);
///     const NAME: &'static str = "Health";
///
///     fn encode(&self, w: &mut ByteWriter) {
///         w.write_u32(self.current);
///         w.write_u32(self.max);
///     }
///
///     fn decode(r: &mut ByteReader<'_>) -> Result<Self, CodecError> {
///         Ok(Self { current: r.read_u32()?, max: r.read_u32()? })
///     }
/// }
/// ```
pub trait Component: Clone + PartialEq + Send + Sync + 'static {
    /// Stable numeric wire id. Must be unique within a world.
    const ID: ComponentId;

    /// Human-readable name, used in logs and errors only — never for
    /// lookup.
    const NAME: &'static str;

    /// Reconciliation semantics for this component.
    const SEMANTICS: StorageSemantics = StorageSemantics::LastWriteWins;

    /// Encodes this value in schema field order.
    fn encode(&self, w: &mut ByteWriter);

    /// Decodes a value, reconstructing defaults for absent optional
    /// fields and never panicking on malformed input.
    fn decode(r: &mut ByteReader<'_>) -> Result<Self, CodecError>;

    /// Rewrites any entity-reference fields through a remap table.
    ///
    /// Components without entity references keep the default no-op.
    fn remap_entities(&mut self, remap: &EntityRemap) {
        let _ = remap;
    }

    /// Encodes a value to a fresh byte buffer.
    #[must_use]
    fn to_bytes(&self) -> Vec<u8> {
        let mut w = ByteWriter::new();
        self.encode(&mut w);
        w.into_bytes()
    }

    /// Decodes a value from a byte buffer, ignoring trailing unknown
    /// bytes (forward compatibility with newer writers).
    fn from_bytes(bytes: &[u8]) -> Result<Self, CodecError> {
        let mut r = ByteReader::new(bytes);
        Self::decode(&mut r)
    }
}
