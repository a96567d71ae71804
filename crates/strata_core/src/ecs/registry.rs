//! # Entity Registry
//!
//! Allocates and recycles entity handles.
//!
//! Freed slot indices go back on a free set and come back with a bumped
//! generation, so a handle held across a despawn is detectable as stale
//! rather than silently aliasing the new occupant.
//!
//! The registry also *admits* entities it has never allocated: when a
//! merge references an entity created by a remote writer, the slot is
//! adopted at the remote generation. Cooperating writers avoid slot
//! collisions by partitioning the index space with
//! [`EntityRegistry::with_range`].

use std::collections::{BTreeMap, BTreeSet};

use super::entity::EntityId;

/// Highest slot index a registry may allocate. Index `u16::MAX` is
/// reserved so [`EntityId::NULL`] can never collide with a live handle.
pub const MAX_ENTITY_INDEX: u16 = u16::MAX - 1;

#[derive(Clone, Copy, Debug)]
struct Slot {
    generation: u16,
    alive: bool,
}

/// Outcome of admitting a remotely-created entity handle.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Admission {
    /// The handle is live locally (already known, or adopted just now).
    Live,
    /// The handle refers to a generation this registry has already
    /// retired; writes against it are stale and must be discarded.
    Stale,
}

/// Allocates and recycles [`EntityId`] handles.
pub struct EntityRegistry {
    slots: BTreeMap<u16, Slot>,
    /// Recycled indices available for reuse, lowest first.
    free: BTreeSet<u16>,
    /// Next never-used index inside the local range.
    next: u16,
    /// First index this registry may allocate.
    base: u16,
    /// One past the last index this registry may allocate.
    limit: u16,
    alive_count: usize,
}

impl EntityRegistry {
    /// Creates a registry that owns the whole allocatable index space.
    #[must_use]
    pub fn new() -> Self {
        Self::with_range(0, MAX_ENTITY_INDEX)
    }

    /// Creates a registry restricted to allocating indices in
    /// `[base, limit)`.
    ///
    /// Two engines writing into the same scene partition the index
    /// space this way so their locally-spawned entities never collide.
    /// Entities outside the range can still be admitted from merges.
    ///
    /// # Panics
    ///
    /// Panics if the range is empty or extends past
    /// [`MAX_ENTITY_INDEX`].
    #[must_use]
    pub fn with_range(base: u16, limit: u16) -> Self {
        assert!(base < limit, "entity index range must be non-empty");
        assert!(limit <= MAX_ENTITY_INDEX, "entity index range too large");
        Self {
            slots: BTreeMap::new(),
            free: BTreeSet::new(),
            next: base,
            base,
            limit,
            alive_count: 0,
        }
    }

    /// Returns the number of currently alive entities (local and
    /// admitted).
    #[inline]
    #[must_use]
    pub const fn alive_count(&self) -> usize {
        self.alive_count
    }

    /// Allocates a fresh or recycled entity handle.
    ///
    /// Recycled slots come back with a bumped generation. Returns
    /// [`EntityId::NULL`] only when every index in the local range is
    /// live.
    pub fn spawn(&mut self) -> EntityId {
        let index = if let Some(index) = self.free.pop_first() {
            index
        } else if self.next < self.limit {
            let index = self.next;
            self.next += 1;
            index
        } else {
            return EntityId::NULL;
        };

        let slot = self.slots.entry(index).or_insert(Slot {
            generation: 0,
            alive: false,
        });
        slot.generation = slot.generation.wrapping_add(1);
        slot.alive = true;
        self.alive_count += 1;
        EntityId::new(index, slot.generation)
    }

    /// Releases an entity handle, freeing its slot for reuse.
    ///
    /// # Returns
    ///
    /// `true` if the entity was despawned, `false` if the handle was
    /// null, stale, or already dead.
    pub fn despawn(&mut self, id: EntityId) -> bool {
        if id.is_null() {
            return false;
        }
        let Some(slot) = self.slots.get_mut(&id.index()) else {
            return false;
        };
        if !slot.alive || slot.generation != id.generation() {
            return false;
        }
        slot.alive = false;
        self.alive_count -= 1;
        // Only indices this registry owns go back in the local pool;
        // a remotely-admitted slot stays under its writer's control.
        if id.index() >= self.base && id.index() < self.limit {
            self.free.insert(id.index());
        }
        true
    }

    /// Checks whether a handle refers to a currently-alive entity.
    #[inline]
    #[must_use]
    pub fn is_alive(&self, id: EntityId) -> bool {
        if id.is_null() {
            return false;
        }
        self.slots
            .get(&id.index())
            .is_some_and(|slot| slot.alive && slot.generation == id.generation())
    }

    /// Adopts an entity handle created by a remote writer.
    ///
    /// - Unknown slot, or known slot at an older generation: the slot
    ///   takes the remote generation and becomes alive.
    /// - Slot already alive at the same generation: no-op.
    /// - Slot at the same generation but locally despawned, or at a
    ///   newer generation: the incoming handle is stale.
    pub fn admit(&mut self, id: EntityId) -> Admission {
        if id.is_null() || id.index() > MAX_ENTITY_INDEX {
            return Admission::Stale;
        }
        let slot = self.slots.entry(id.index()).or_insert(Slot {
            generation: 0,
            alive: false,
        });
        if slot.generation == id.generation() {
            if slot.alive {
                Admission::Live
            } else if slot.generation == 0 {
                // Generation 0 means the slot was default-created just
                // now; a remote writer can legitimately use it.
                slot.alive = true;
                self.alive_count += 1;
                self.free.remove(&id.index());
                Admission::Live
            } else {
                // We despawned this exact incarnation; the write is late.
                Admission::Stale
            }
        } else if slot.generation < id.generation() {
            slot.generation = id.generation();
            if !slot.alive {
                slot.alive = true;
                self.alive_count += 1;
            }
            self.free.remove(&id.index());
            Admission::Live
        } else {
            Admission::Stale
        }
    }

    /// Iterates over all currently-alive entity handles, index
    /// ascending.
    pub fn iter_alive(&self) -> impl Iterator<Item = EntityId> + '_ {
        self.slots.iter().filter_map(|(index, slot)| {
            slot.alive
                .then_some(EntityId::new(*index, slot.generation))
        })
    }
}

impl Default for EntityRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_spawn_despawn_recycles_with_new_generation() {
        let mut registry = EntityRegistry::new();

        let a = registry.spawn();
        assert!(registry.is_alive(a));
        assert_eq!(registry.alive_count(), 1);

        assert!(registry.despawn(a));
        assert!(!registry.is_alive(a));
        assert_eq!(registry.alive_count(), 0);

        let b = registry.spawn();
        assert_eq!(b.index(), a.index());
        assert_ne!(b.generation(), a.generation());
        assert!(registry.is_alive(b));
        assert!(!registry.is_alive(a), "stale handle must stay dead");
    }

    #[test]
    fn test_despawn_rejects_stale_and_null() {
        let mut registry = EntityRegistry::new();
        let a = registry.spawn();
        assert!(registry.despawn(a));
        assert!(!registry.despawn(a), "double despawn");
        assert!(!registry.despawn(EntityId::NULL));
    }

    #[test]
    fn test_range_partitioning() {
        let mut low = EntityRegistry::with_range(0, 10);
        let mut high = EntityRegistry::with_range(10, 20);

        let a = low.spawn();
        let b = high.spawn();
        assert_eq!(a.index(), 0);
        assert_eq!(b.index(), 10);

        // Exhaust the low range.
        for _ in 0..9 {
            assert!(!low.spawn().is_null());
        }
        assert!(low.spawn().is_null());
    }

    #[test]
    fn test_admit_adopts_remote_entity() {
        let mut registry = EntityRegistry::with_range(0, 10);
        let remote = EntityId::new(42, 3);

        assert_eq!(registry.admit(remote), Admission::Live);
        assert!(registry.is_alive(remote));
        // Re-admission is idempotent.
        assert_eq!(registry.admit(remote), Admission::Live);
        assert_eq!(registry.alive_count(), 1);
    }

    #[test]
    fn test_admit_rejects_retired_generation() {
        let mut registry = EntityRegistry::new();
        let a = registry.spawn();
        registry.despawn(a);

        // The exact incarnation we removed must not come back.
        assert_eq!(registry.admit(a), Admission::Stale);
        // A newer incarnation from the slot's owner is fine.
        let newer = EntityId::new(a.index(), a.generation().wrapping_add(5));
        assert_eq!(registry.admit(newer), Admission::Live);
    }

    #[test]
    fn test_iter_alive_ascending() {
        let mut registry = EntityRegistry::new();
        let a = registry.spawn();
        let b = registry.spawn();
        let c = registry.spawn();
        registry.despawn(b);

        let alive: Vec<_> = registry.iter_alive().collect();
        assert_eq!(alive, vec![a, c]);
    }
}
