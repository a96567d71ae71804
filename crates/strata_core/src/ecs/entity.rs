//! # Entity Handles
//!
//! Entities are lightweight identifiers consisting of:
//! - A slot index into the registry
//! - A generation counter for safe reuse
//!
//! The whole handle fits in 32 bits so it can travel on the wire as a
//! single fixed-width field.

/// Unique identifier for an entity.
///
/// The ID is split into two parts:
/// - Lower 16 bits: Slot index in the registry
/// - Upper 16 bits: Generation counter for detecting stale references
///
/// An entity carries no data of its own; all data lives in component
/// stores keyed by this handle.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(transparent)]
pub struct EntityId(u32);

impl EntityId {
    /// Creates a new entity ID from index and generation.
    ///
    /// # Arguments
    ///
    /// * `index` - The registry slot index
    /// * `generation` - The generation counter for that slot
    #[inline]
    #[must_use]
    pub const fn new(index: u16, generation: u16) -> Self {
        Self(((generation as u32) << 16) | (index as u32))
    }

    /// Reconstructs an entity ID from its raw wire representation.
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

    /// Returns the slot index portion of the entity ID.
    #[inline]
    #[must_use]
    pub const fn index(self) -> u16 {
        self.0 as u16
    }

    /// Returns the generation portion of the entity ID.
    #[inline]
    #[must_use]
    pub const fn generation(self) -> u16 {
        (self.0 >> 16) as u16
    }

    /// Null/invalid entity ID.
    pub const NULL: Self = Self(u32::MAX);

    /// Checks if this entity ID is null/invalid.
    #[inline]
    #[must_use]
    pub const fn is_null(self) -> bool {
        self.0 == u32::MAX
    }
}

impl Default for EntityId {
    fn default() -> Self {
        Self::NULL
    }
}

impl std::fmt::Display for EntityId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.is_null() {
            write!(f, "entity(null)")
        } else {
            write!(f, "entity({}v{})", self.index(), self.generation())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_entity_id_roundtrip() {
        let id = EntityId::new(12345, 678);
        assert_eq!(id.index(), 12345);
        assert_eq!(id.generation(), 678);
        assert_eq!(EntityId::from_raw(id.raw()), id);
    }

    #[test]
    fn test_null_is_detectable() {
        assert!(EntityId::NULL.is_null());
        assert!(!EntityId::new(0, 0).is_null());
        assert_eq!(EntityId::default(), EntityId::NULL);
    }

    #[test]
    fn test_ordering_is_index_major_within_generation() {
        // BTreeMap iteration relies on Ord being total and stable.
        let a = EntityId::new(1, 0);
        let b = EntityId::new(2, 0);
        assert!(a < b);
    }
}
