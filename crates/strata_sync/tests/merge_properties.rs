//! Property tests for the merge laws.
//!
//! Convergence rests on the merge being commutative, associative, and
//! idempotent under the `(timestamp, payload)` total order. These
//! generate random operation histories and check the laws hold no
//! matter how delivery reorders or duplicates them.

use proptest::prelude::*;

use strata_core::builtin::Position;
use strata_core::{Component, EntityId, Timestamp, World};

const ENTITIES: u16 = 6;

#[derive(Clone, Debug)]
enum WireEvent {
    Put { entity: u16, ts: u32, value: i16 },
    Delete { entity: u16, ts: u32 },
}

fn event_strategy() -> impl Strategy<Value = WireEvent> {
    prop_oneof![
        (0..ENTITIES, 1u32..64, any::<i16>())
            .prop_map(|(entity, ts, value)| WireEvent::Put { entity, ts, value }),
        (0..ENTITIES, 1u32..64).prop_map(|(entity, ts)| WireEvent::Delete { entity, ts }),
    ]
}

/// A history and a shuffled copy of the same history.
fn reordered_histories() -> impl Strategy<Value = (Vec<WireEvent>, Vec<WireEvent>)> {
    prop::collection::vec(event_strategy(), 1..48)
        .prop_flat_map(|events| (Just(events.clone()), Just(events).prop_shuffle()))
}

fn deliver(world: &mut World, event: &WireEvent) {
    match *event {
        WireEvent::Put { entity, ts, value } => {
            let payload = Position::new(f32::from(value), 0.0, 0.0).to_bytes();
            world
                .apply_put(
                    Position::ID,
                    EntityId::new(entity, 1),
                    Timestamp::from_raw(ts),
                    &payload,
                )
                .unwrap();
        }
        WireEvent::Delete { entity, ts } => {
            world
                .apply_delete(Position::ID, EntityId::new(entity, 1), Timestamp::from_raw(ts))
                .unwrap();
        }
    }
}

fn snapshot(world: &World) -> Vec<Option<Position>> {
    (0..ENTITIES)
        .map(|index| world.get_or_null::<Position>(EntityId::new(index, 1)).cloned())
        .collect()
}

proptest! {
    /// Delivery order never changes the converged state.
    #[test]
    fn merge_is_commutative((original, shuffled) in reordered_histories()) {
        let mut left = World::with_builtins();
        let mut right = World::with_builtins();
        for event in &original {
            deliver(&mut left, event);
        }
        for event in &shuffled {
            deliver(&mut right, event);
        }
        prop_assert_eq!(snapshot(&left), snapshot(&right));
    }

    /// Delivering a history twice is the same as delivering it once.
    #[test]
    fn merge_is_idempotent(events in prop::collection::vec(event_strategy(), 1..48)) {
        let mut once = World::with_builtins();
        let mut twice = World::with_builtins();
        for event in &events {
            deliver(&mut once, event);
        }
        for event in events.iter().chain(events.iter()) {
            deliver(&mut twice, event);
        }
        prop_assert_eq!(snapshot(&once), snapshot(&twice));
    }

    /// A tombstone with a higher timestamp can never be resurrected by
    /// a lower-timestamped value, regardless of arrival order.
    #[test]
    fn stale_put_never_resurrects(
        put_ts in 1u32..50,
        delete_gap in 1u32..50,
        value in any::<i16>(),
        delete_first in any::<bool>(),
    ) {
        let mut world = World::with_builtins();
        let entity = EntityId::new(0, 1);
        let delete_ts = put_ts + delete_gap;

        let put = WireEvent::Put { entity: 0, ts: put_ts, value };
        let delete = WireEvent::Delete { entity: 0, ts: delete_ts };
        if delete_first {
            deliver(&mut world, &delete);
            deliver(&mut world, &put);
        } else {
            deliver(&mut world, &put);
            deliver(&mut world, &delete);
        }
        prop_assert_eq!(world.get_or_null::<Position>(entity), None);
    }

    /// On a timestamp tie a present value orders above a tombstone.
    #[test]
    fn put_beats_delete_on_tie(ts in 1u32..64, value in any::<i16>(), delete_first in any::<bool>()) {
        let mut world = World::with_builtins();
        let entity = EntityId::new(0, 1);

        let put = WireEvent::Put { entity: 0, ts, value };
        let delete = WireEvent::Delete { entity: 0, ts };
        if delete_first {
            deliver(&mut world, &delete);
            deliver(&mut world, &put);
        } else {
            deliver(&mut world, &put);
            deliver(&mut world, &delete);
        }
        prop_assert_eq!(
            world.get_or_null::<Position>(entity),
            Some(&Position::new(f32::from(value), 0.0, 0.0))
        );
    }
}
