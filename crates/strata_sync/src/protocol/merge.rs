//! # Buffer Merge
//!
//! Folds a received buffer into the world, frame by frame. The failure
//! granularity is deliberate: a frame that fails semantically (unknown
//! component, undecodable payload, unsupported op) is logged and
//! skipped; a frame that fails structurally aborts the rest of the
//! buffer because the cursor can no longer find frame boundaries.
//! Frames merged before an abort stay merged.

use std::ops::Range;

use tracing::{debug, warn};

use strata_core::{ApplyError, MergeEffect, World};

use super::frame::{FrameCursor, FrameHeader, WireOp};

/// Counters describing what one buffer merge did.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct MergeReport {
    /// Frames structurally parsed.
    pub frames: usize,
    /// Frames that won their merge and changed (or confirmed) state.
    pub applied: usize,
    /// Exact duplicates (timestamp and payload equal); converged no-ops.
    pub duplicates: usize,
    /// Frames that lost to newer local state or a retired entity.
    pub stale: usize,
    /// Frames for component ids this world has not registered.
    pub unknown_component: usize,
    /// Frames with an operation discriminant this build does not speak.
    pub unknown_op: usize,
    /// Frames rejected by the store (payload decode, semantics).
    pub rejected: usize,
    /// True if a structural error abandoned the rest of the buffer.
    pub aborted: bool,
}

/// One frame that won its merge, by byte range in the source buffer.
///
/// The range covers the whole frame including its length prefix, so
/// rebroadcast buffers are built by verbatim slice concatenation.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AcceptedFrame {
    /// The frame's decoded header, for transport filtering.
    pub header: FrameHeader,
    /// Byte range of the complete frame in the merged buffer.
    pub range: Range<usize>,
}

/// A merge report plus the accepted frames eligible for rebroadcast.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct MergeOutcome {
    /// What happened, frame by frame, in counters.
    pub report: MergeReport,
    /// Frames to forward to other transports. Duplicates and stale
    /// frames are excluded: forwarding them would let two relaying
    /// peers bounce the same write forever.
    pub accepted: Vec<AcceptedFrame>,
}

/// Merges every frame of `buffer` into `world`.
pub fn merge_buffer(world: &mut World, buffer: &[u8]) -> MergeOutcome {
    let mut outcome = MergeOutcome::default();
    let report = &mut outcome.report;
    let mut cursor = FrameCursor::new(buffer);

    loop {
        let frame_start = cursor.position();
        let frame = match cursor.next() {
            Some(Ok(frame)) => frame,
            Some(Err(error)) => {
                warn!(%error, "malformed buffer; keeping frames merged so far");
                report.aborted = true;
                break;
            }
            None => break,
        };
        report.frames += 1;

        let header = frame.header;
        let Some(op) = WireOp::from_raw(header.op) else {
            debug!(op = header.op, "skipping frame with unknown operation");
            report.unknown_op += 1;
            continue;
        };

        let result = match op {
            WireOp::Put => world.apply_put(
                header.component_id,
                header.entity_id,
                header.timestamp,
                frame.payload,
            ),
            WireOp::Delete => {
                world.apply_delete(header.component_id, header.entity_id, header.timestamp)
            }
            WireOp::Append => world.apply_append(
                header.component_id,
                header.entity_id,
                header.timestamp,
                frame.payload,
            ),
        };

        match result {
            Ok(effect) if effect.accepted() => {
                report.applied += 1;
                outcome.accepted.push(AcceptedFrame {
                    header,
                    range: frame_start..cursor.position(),
                });
            }
            Ok(MergeEffect::Duplicate) => report.duplicates += 1,
            Ok(_) => report.stale += 1,
            Err(ApplyError::UnknownComponent(id)) => {
                debug!(component = %id, entity = %header.entity_id, "frame for unregistered component");
                report.unknown_component += 1;
            }
            Err(ApplyError::Merge(error)) => {
                warn!(
                    component = world.component_name(header.component_id).unwrap_or("?"),
                    entity = %header.entity_id,
                    %error,
                    "store rejected frame"
                );
                report.rejected += 1;
            }
        }
    }

    outcome
}

#[cfg(test)]
mod tests {
    use strata_core::builtin::Position;
    use strata_core::{Component, ComponentId, EntityId, Timestamp};

    use super::super::frame::FrameBatch;
    use super::*;

    fn put_frame(entity: EntityId, timestamp: u32, position: Position) -> Vec<u8> {
        let mut batch = FrameBatch::new();
        batch.push(
            WireOp::Put,
            Position::ID,
            entity,
            Timestamp::from_raw(timestamp),
            &position.to_bytes(),
        );
        batch.into_bytes()
    }

    #[test]
    fn test_merge_applies_and_reports() {
        let mut world = World::with_builtins();
        let entity = EntityId::new(3, 1);
        let buffer = put_frame(entity, 5, Position::new(1.0, 2.0, 3.0));

        let outcome = merge_buffer(&mut world, &buffer);
        assert_eq!(outcome.report.frames, 1);
        assert_eq!(outcome.report.applied, 1);
        assert!(!outcome.report.aborted);
        assert_eq!(outcome.accepted.len(), 1);
        assert_eq!(outcome.accepted[0].range, 0..buffer.len());
        assert_eq!(
            world.get_or_null::<Position>(entity),
            Some(&Position::new(1.0, 2.0, 3.0))
        );
    }

    #[test]
    fn test_duplicate_is_not_rebroadcast() {
        let mut world = World::with_builtins();
        let entity = EntityId::new(3, 1);
        let buffer = put_frame(entity, 5, Position::new(1.0, 2.0, 3.0));

        merge_buffer(&mut world, &buffer);
        let second = merge_buffer(&mut world, &buffer);
        assert_eq!(second.report.duplicates, 1);
        assert_eq!(second.report.applied, 0);
        assert!(second.accepted.is_empty());
    }

    #[test]
    fn test_stale_frame_skipped() {
        let mut world = World::with_builtins();
        let entity = EntityId::new(3, 1);
        merge_buffer(&mut world, &put_frame(entity, 10, Position::new(9.0, 0.0, 0.0)));

        let older = merge_buffer(&mut world, &put_frame(entity, 4, Position::new(1.0, 0.0, 0.0)));
        assert_eq!(older.report.stale, 1);
        assert!(older.accepted.is_empty());
        assert_eq!(
            world.get_or_null::<Position>(entity),
            Some(&Position::new(9.0, 0.0, 0.0))
        );
    }

    #[test]
    fn test_unknown_component_does_not_poison_buffer() {
        let mut world = World::with_builtins();
        let entity = EntityId::new(3, 1);

        let mut batch = FrameBatch::new();
        batch.push(
            WireOp::Put,
            ComponentId(9999),
            entity,
            Timestamp::from_raw(1),
            &[1, 2, 3],
        );
        batch.push(
            WireOp::Put,
            Position::ID,
            entity,
            Timestamp::from_raw(2),
            &Position::new(4.0, 0.0, 0.0).to_bytes(),
        );

        let outcome = merge_buffer(&mut world, &batch.into_bytes());
        assert_eq!(outcome.report.unknown_component, 1);
        assert_eq!(outcome.report.applied, 1);
        assert_eq!(
            world.get_or_null::<Position>(entity),
            Some(&Position::new(4.0, 0.0, 0.0))
        );
    }

    #[test]
    fn test_structural_error_keeps_earlier_merges() {
        let mut world = World::with_builtins();
        let entity = EntityId::new(3, 1);

        let mut buffer = put_frame(entity, 5, Position::new(1.0, 0.0, 0.0));
        buffer.extend_from_slice(&[0xFF, 0xFF]); // garbage tail

        let outcome = merge_buffer(&mut world, &buffer);
        assert!(outcome.report.aborted);
        assert_eq!(outcome.report.applied, 1);
        assert!(world.get_or_null::<Position>(entity).is_some());
    }

    #[test]
    fn test_undecodable_payload_is_rejected_not_fatal() {
        let mut world = World::with_builtins();
        let entity = EntityId::new(3, 1);

        let mut batch = FrameBatch::new();
        batch.push(
            WireOp::Put,
            Position::ID,
            entity,
            Timestamp::from_raw(1),
            &[0x01], // too short for three f32 fields
        );
        let outcome = merge_buffer(&mut world, &batch.into_bytes());
        assert_eq!(outcome.report.rejected, 1);
        assert!(!outcome.report.aborted);
        assert_eq!(world.get_or_null::<Position>(entity), None);
    }
}
