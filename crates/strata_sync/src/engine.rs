//! # Sync Engine
//!
//! Owns a world, a scheduler, and the attached transports, and drives
//! the per-frame loop:
//!
//! 1. **Pump** — poll every transport, merge received buffers, forward
//!    accepted frames to the other transports
//! 2. **Run** — execute registered systems in priority order
//! 3. **Flush** — drain dirty writes, frame them, hand the batch to
//!    every transport whose filter accepts it
//!
//! Dirty flags are cleared only after a successful hand-off, so a
//! failed send retries the same writes next frame. Merges are
//! idempotent, which makes that at-least-once delivery safe.
//!
//! Outgoing traffic is split at frame boundaries so no buffer handed
//! to a transport exceeds its [`Transport::max_buffer`] limit; frames
//! are self-delimiting, so a receiver merges each chunk independently.
//!
//! With several transports attached, a write counts as delivered once
//! any one of them accepts it; a transport whose send failed that
//! frame is not offered those writes again. A bridged topology must
//! tolerate this and recover through rebroadcast from a peer that did
//! receive them.

use tracing::{debug, warn};

use strata_core::{DirtyRecord, DrainOp, Scheduler, World};

use crate::config::SyncConfig;
use crate::protocol::{merge_buffer, AcceptedFrame, FrameBatch, FrameHeader, WireOp};
use crate::transport::Transport;

/// Running totals for one engine instance.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct EngineStats {
    /// Frames the engine has run.
    pub frames: u64,
    /// Received buffers merged.
    pub buffers_merged: u64,
    /// Wire frames that won their merge.
    pub frames_applied: u64,
    /// Wire frames that lost to newer local state.
    pub frames_stale: u64,
    /// Wire frames skipped (unknown component or op, decode failure).
    pub frames_rejected: u64,
    /// Outgoing batches successfully handed to a transport.
    pub batches_sent: u64,
    /// Wire frames inside those batches.
    pub wire_frames_sent: u64,
    /// Transport sends that failed (the writes stayed dirty).
    pub send_failures: u64,
    /// Local writes dropped for exceeding the payload cap.
    pub oversize_dropped: u64,
}

/// A world plus its scheduler, transports, and sync loop.
pub struct SyncEngine {
    world: World,
    scheduler: Scheduler,
    transports: Vec<Box<dyn Transport>>,
    config: SyncConfig,
    stats: EngineStats,
    drained: Vec<DirtyRecord>,
}

impl SyncEngine {
    /// Creates an engine around an existing world.
    #[must_use]
    pub fn new(world: World, config: SyncConfig) -> Self {
        Self {
            world,
            scheduler: Scheduler::new(),
            transports: Vec::new(),
            config,
            stats: EngineStats::default(),
            drained: Vec::new(),
        }
    }

    /// Attaches a transport. Buffers flow on the next frame.
    pub fn add_transport(&mut self, transport: Box<dyn Transport>) {
        debug!(label = transport.label(), "transport attached");
        self.transports.push(transport);
    }

    /// The engine's world.
    #[must_use]
    pub fn world(&self) -> &World {
        &self.world
    }

    /// Mutable access to the world, for local writes between frames.
    pub fn world_mut(&mut self) -> &mut World {
        &mut self.world
    }

    /// Mutable access to the scheduler, for system registration.
    pub fn scheduler_mut(&mut self) -> &mut Scheduler {
        &mut self.scheduler
    }

    /// Current totals.
    #[must_use]
    pub fn stats(&self) -> EngineStats {
        self.stats
    }

    /// The active configuration.
    #[must_use]
    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    /// Runs one frame: pump, systems, flush.
    pub fn update(&mut self, delta: f32) {
        self.pump();
        self.scheduler.run(&mut self.world, delta);
        self.flush();
        self.stats.frames += 1;
    }

    /// Merges pending buffers from every transport, up to the
    /// per-transport inbox budget.
    fn pump(&mut self) {
        for index in 0..self.transports.len() {
            for _ in 0..self.config.inbox_budget {
                let Some(buffer) = self.transports[index].try_recv() else {
                    break;
                };
                let outcome = merge_buffer(&mut self.world, &buffer);
                let report = &outcome.report;
                self.stats.buffers_merged += 1;
                self.stats.frames_applied += report.applied as u64;
                self.stats.frames_stale += report.stale as u64;
                self.stats.frames_rejected +=
                    (report.unknown_component + report.unknown_op + report.rejected) as u64;

                if self.config.rebroadcast && !outcome.accepted.is_empty() {
                    self.rebroadcast(index, &buffer, &outcome.accepted);
                }
            }
        }
    }

    /// Forwards accepted frames to every transport except the one that
    /// delivered them. Stale and duplicate frames were already
    /// excluded by the merge, so relay loops terminate.
    fn rebroadcast(&mut self, origin: usize, buffer: &[u8], accepted: &[AcceptedFrame]) {
        for index in 0..self.transports.len() {
            if index == origin {
                continue;
            }
            let frames: Vec<(usize, &[u8])> = accepted
                .iter()
                .enumerate()
                .filter(|(_, frame)| self.transports[index].filter(&frame.header))
                .map(|(tag, frame)| (tag, &buffer[frame.range.clone()]))
                .collect();
            send_chunked(self.transports[index].as_mut(), &frames, &mut self.stats);
        }
    }

    /// Drains dirty writes and hands them to the transports.
    fn flush(&mut self) {
        self.drained.clear();
        self.world.drain_dirty(&mut self.drained);
        if self.drained.is_empty() {
            return;
        }

        let mut outgoing: Vec<(usize, FrameHeader, Vec<u8>)> = Vec::new();
        let mut dropped: Vec<DirtyRecord> = Vec::new();
        for (index, record) in self.drained.iter().enumerate() {
            let (op, payload) = match &record.op {
                DrainOp::Put(payload) => (WireOp::Put, payload.as_slice()),
                DrainOp::Delete => (WireOp::Delete, &[][..]),
                DrainOp::Append(payload) => (WireOp::Append, payload.as_slice()),
            };
            if payload.len() > self.config.max_payload {
                warn!(
                    component = self.world.component_name(record.component_id).unwrap_or("?"),
                    entity = %record.entity,
                    size = payload.len(),
                    cap = self.config.max_payload,
                    "dropping oversize write"
                );
                self.stats.oversize_dropped += 1;
                dropped.push(record.clone());
                continue;
            }
            let mut batch = FrameBatch::new();
            batch.push(op, record.component_id, record.entity, record.timestamp, payload);
            let header = FrameHeader {
                op: op as u32,
                component_id: record.component_id,
                entity_id: record.entity,
                timestamp: record.timestamp,
                payload_len: payload.len() as u32,
            };
            outgoing.push((index, header, batch.into_bytes()));
        }

        // An oversize write will never fit; retrying it forever would
        // wedge the drain, so its dirty flag clears unconditionally.
        // Only its own record — sibling writes on the same entity stay
        // dirty until a transport takes them.
        self.world.clear_drained(&dropped);
        if outgoing.is_empty() {
            return;
        }

        // Standalone engines have nowhere to deliver; the drain still
        // completes so callbacks fire and flags clear.
        if self.transports.is_empty() {
            self.world.clear_drained(&self.drained);
            return;
        }

        let mut attempted = vec![false; self.drained.len()];
        let mut delivered = vec![false; self.drained.len()];
        for index in 0..self.transports.len() {
            let frames: Vec<(usize, &[u8])> = outgoing
                .iter()
                .filter(|(_, header, _)| self.transports[index].filter(header))
                .map(|(record, _, bytes)| (*record, bytes.as_slice()))
                .collect();
            for &(record, _) in &frames {
                attempted[record] = true;
            }
            for record in send_chunked(self.transports[index].as_mut(), &frames, &mut self.stats) {
                delivered[record] = true;
            }
        }

        // A record every transport's filter vetoed counts as delivered:
        // no retry can change a filter's answer for the same frame.
        let cleared: Vec<DirtyRecord> = self
            .drained
            .iter()
            .enumerate()
            .filter(|&(index, _)| delivered[index] || !attempted[index])
            .map(|(_, record)| record.clone())
            .collect();
        self.world.clear_drained(&cleared);
    }
}

/// Hands frames to one transport, splitting at frame boundaries so no
/// buffer exceeds the transport's limit. Returns the tags of frames
/// inside chunks the transport accepted.
fn send_chunked(
    transport: &mut dyn Transport,
    frames: &[(usize, &[u8])],
    stats: &mut EngineStats,
) -> Vec<usize> {
    let limit = transport.max_buffer().unwrap_or(usize::MAX);
    let mut delivered = Vec::new();
    let mut chunk: Vec<u8> = Vec::new();
    let mut members: Vec<usize> = Vec::new();
    for &(tag, bytes) in frames {
        if bytes.len() > limit {
            warn!(
                transport = transport.label(),
                size = bytes.len(),
                limit,
                "frame exceeds the transport's buffer limit"
            );
            continue;
        }
        if !chunk.is_empty() && chunk.len() + bytes.len() > limit {
            send_chunk(transport, &chunk, &members, &mut delivered, stats);
            chunk.clear();
            members.clear();
        }
        chunk.extend_from_slice(bytes);
        members.push(tag);
    }
    send_chunk(transport, &chunk, &members, &mut delivered, stats);
    delivered
}

fn send_chunk(
    transport: &mut dyn Transport,
    chunk: &[u8],
    members: &[usize],
    delivered: &mut Vec<usize>,
    stats: &mut EngineStats,
) {
    if chunk.is_empty() {
        return;
    }
    match transport.send(chunk) {
        Ok(()) => {
            stats.batches_sent += 1;
            stats.wire_frames_sent += members.len() as u64;
            delivered.extend_from_slice(members);
        }
        Err(error) => {
            warn!(transport = transport.label(), %error, "send failed; writes stay dirty");
            stats.send_failures += 1;
        }
    }
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;
    use std::rc::Rc;

    use strata_core::builtin::{Label, Position, TextAlign};
    use strata_core::{ByteReader, ByteWriter, CodecError, Component, ComponentId, StorageSemantics};

    use crate::protocol::FrameCursor;
    use crate::transport::{MemoryTransport, RecorderTransport, TransportError};

    use super::*;

    /// Transport whose sends always fail.
    struct DeadTransport;

    impl Transport for DeadTransport {
        fn send(&mut self, _buffer: &[u8]) -> Result<(), TransportError> {
            Err(TransportError::Disconnected)
        }

        fn try_recv(&mut self) -> Option<Vec<u8>> {
            None
        }

        fn label(&self) -> &str {
            "dead"
        }
    }

    /// Transport that records sends but refuses buffers over a cap.
    struct CappedTransport {
        sent: Rc<RefCell<Vec<Vec<u8>>>>,
        cap: usize,
    }

    impl Transport for CappedTransport {
        fn send(&mut self, buffer: &[u8]) -> Result<(), TransportError> {
            if buffer.len() > self.cap {
                return Err(TransportError::Io(std::io::Error::new(
                    std::io::ErrorKind::InvalidInput,
                    "buffer over cap",
                )));
            }
            self.sent.borrow_mut().push(buffer.to_vec());
            Ok(())
        }

        fn try_recv(&mut self) -> Option<Vec<u8>> {
            None
        }

        fn max_buffer(&self) -> Option<usize> {
            Some(self.cap)
        }

        fn label(&self) -> &str {
            "capped"
        }
    }

    /// Grow-only log of free-text notes, for exercising append flows.
    #[derive(Clone, Debug, PartialEq)]
    struct Note {
        text: String,
    }

    impl Component for Note {
        const ID: ComponentId = ComponentId(300);
        const NAME: &'static str = "Note";
        const SEMANTICS: StorageSemantics = StorageSemantics::GrowOnly;

        fn encode(&self, writer: &mut ByteWriter) {
            writer.write_str(&self.text);
        }

        fn decode(reader: &mut ByteReader<'_>) -> Result<Self, CodecError> {
            Ok(Self {
                text: reader.read_str()?,
            })
        }
    }

    fn engine() -> SyncEngine {
        SyncEngine::new(World::with_builtins(), SyncConfig::default())
    }

    #[test]
    fn test_two_engines_converge_over_memory_pair() {
        let (a_end, b_end) = MemoryTransport::pair();
        let mut a = engine();
        let mut b = engine();
        a.add_transport(Box::new(a_end));
        b.add_transport(Box::new(b_end));

        let e = a.world_mut().add_entity();
        a.world_mut().create(e, Position::new(1.0, 2.0, 3.0)).unwrap();

        a.update(0.016); // flush on a
        b.update(0.016); // pump on b

        assert_eq!(
            b.world().get_or_null::<Position>(e),
            Some(&Position::new(1.0, 2.0, 3.0))
        );
        assert_eq!(b.stats().frames_applied, 1);
    }

    #[test]
    fn test_failed_send_retries_next_frame() {
        let mut engine = engine();
        engine.add_transport(Box::new(DeadTransport));

        let e = engine.world_mut().add_entity();
        engine
            .world_mut()
            .create(e, Position::new(1.0, 0.0, 0.0))
            .unwrap();

        engine.update(0.016);
        assert_eq!(engine.stats().send_failures, 1);

        // The write is still dirty: swapping in a live transport
        // delivers it on the next frame.
        let recorder = RecorderTransport::new("tape");
        let handle = recorder.handle();
        engine.transports.clear();
        engine.add_transport(Box::new(recorder));

        engine.update(0.016);
        assert_eq!(handle.outgoing_len(), 1);

        // Delivered once; nothing further to send.
        engine.update(0.016);
        assert_eq!(handle.outgoing_len(), 1);
    }

    #[test]
    fn test_oversize_write_dropped_and_cleared() {
        let config = SyncConfig {
            max_payload: 16,
            ..SyncConfig::default()
        };
        let mut engine = SyncEngine::new(World::with_builtins(), config);
        let recorder = RecorderTransport::new("tape");
        let handle = recorder.handle();
        engine.add_transport(Box::new(recorder));

        let e = engine.world_mut().add_entity();
        let label = Label {
            text: "x".repeat(100),
            tags: Vec::new(),
            align: TextAlign::Left,
        };
        engine.world_mut().create(e, label).unwrap();

        engine.update(0.016);
        assert_eq!(engine.stats().oversize_dropped, 1);
        assert_eq!(handle.outgoing_len(), 0);

        // Dropped means dropped: it does not retry.
        engine.update(0.016);
        assert_eq!(engine.stats().oversize_dropped, 1);
    }

    #[test]
    fn test_oversize_append_drop_keeps_sibling_dirty() {
        let mut world = World::with_builtins();
        world.register_component::<Note>().unwrap();
        let config = SyncConfig {
            max_payload: 16,
            ..SyncConfig::default()
        };
        let mut engine = SyncEngine::new(world, config);
        engine.add_transport(Box::new(DeadTransport));

        let e = engine.world_mut().add_entity();
        engine.world_mut().append(e, Note { text: "hi".into() }).unwrap();
        engine
            .world_mut()
            .append(e, Note { text: "x".repeat(100) })
            .unwrap();

        engine.update(0.016);
        assert_eq!(engine.stats().oversize_dropped, 1);
        assert_eq!(engine.stats().send_failures, 1);

        // The oversize append is gone, but its sibling survived the
        // failed send and must still be pending.
        let mut records = Vec::new();
        engine.world_mut().drain_dirty(&mut records);
        let notes: Vec<_> = records
            .iter()
            .filter(|record| record.component_id == Note::ID)
            .collect();
        assert_eq!(notes.len(), 1);
        assert!(matches!(&notes[0].op, DrainOp::Append(payload) if payload.len() <= 16));

        // A live transport picks the survivor up next frame.
        let recorder = RecorderTransport::new("tape");
        let handle = recorder.handle();
        engine.transports.clear();
        engine.add_transport(Box::new(recorder));
        engine.update(0.016);
        assert_eq!(handle.outgoing_len(), 1);
    }

    #[test]
    fn test_outgoing_batch_splits_at_transport_limit() {
        let sent = Rc::new(RefCell::new(Vec::new()));
        let mut engine = engine();
        engine.add_transport(Box::new(CappedTransport {
            sent: Rc::clone(&sent),
            cap: 100,
        }));

        for index in 0..10 {
            let e = engine.world_mut().add_entity();
            engine
                .world_mut()
                .create(e, Position::new(index as f32, 0.0, 0.0))
                .unwrap();
        }
        engine.update(0.016);
        assert_eq!(engine.stats().send_failures, 0);

        // Chunks split at frame boundaries: each stays under the cap
        // and parses as whole frames.
        let chunks = sent.borrow();
        assert!(chunks.len() >= 4);
        let mut frames = 0;
        for chunk in chunks.iter() {
            assert!(chunk.len() <= 100);
            frames += FrameCursor::new(chunk).map(|frame| frame.unwrap()).count();
        }
        assert_eq!(frames, 10);
        drop(chunks);

        // Everything was delivered; nothing re-sends next frame.
        engine.update(0.016);
        assert_eq!(engine.stats().wire_frames_sent, 10);
    }

    #[test]
    fn test_one_successful_transport_clears_dirty() {
        // Delivery rule: once any transport accepts a write, a
        // transport whose send failed does not get a retry.
        let recorder = RecorderTransport::new("tape");
        let handle = recorder.handle();
        let mut engine = engine();
        engine.add_transport(Box::new(DeadTransport));
        engine.add_transport(Box::new(recorder));

        let e = engine.world_mut().add_entity();
        engine
            .world_mut()
            .create(e, Position::new(1.0, 0.0, 0.0))
            .unwrap();

        engine.update(0.016);
        assert_eq!(engine.stats().send_failures, 1);
        assert_eq!(handle.outgoing_len(), 1);

        engine.update(0.016);
        assert_eq!(engine.stats().send_failures, 1, "no retry after delivery");
        assert_eq!(handle.outgoing_len(), 1);
    }

    #[test]
    fn test_standalone_engine_clears_dirty() {
        let mut engine = engine();
        let e = engine.world_mut().add_entity();
        engine
            .world_mut()
            .create(e, Position::new(1.0, 0.0, 0.0))
            .unwrap();

        engine.update(0.016);
        let mut records = Vec::new();
        engine.world_mut().drain_dirty(&mut records);
        assert!(records.is_empty());
    }

    #[test]
    fn test_rebroadcast_forwards_to_third_engine() {
        // a <-> b <-> c in a line; b relays.
        let (a_end, b_left) = MemoryTransport::pair();
        let (b_right, c_end) = MemoryTransport::pair();

        let mut a = engine();
        let mut b = engine();
        let mut c = engine();
        a.add_transport(Box::new(a_end));
        b.add_transport(Box::new(b_left));
        b.add_transport(Box::new(b_right));
        c.add_transport(Box::new(c_end));

        let e = a.world_mut().add_entity();
        a.world_mut().create(e, Position::new(5.0, 0.0, 0.0)).unwrap();

        a.update(0.016);
        b.update(0.016);
        c.update(0.016);

        assert_eq!(
            c.world().get_or_null::<Position>(e),
            Some(&Position::new(5.0, 0.0, 0.0))
        );

        // The relayed frame must not bounce back through b forever.
        for _ in 0..4 {
            a.update(0.016);
            b.update(0.016);
            c.update(0.016);
        }
        assert_eq!(a.stats().frames_applied, 0);
    }

    #[test]
    fn test_scheduler_writes_flush_same_frame() {
        let recorder = RecorderTransport::new("tape");
        let handle = recorder.handle();
        let mut engine = engine();
        engine.add_transport(Box::new(recorder));

        let e = engine.world_mut().add_entity();
        engine.scheduler_mut().add_system("mover", move |world, _| {
            world
                .create_or_replace(e, Position::new(1.0, 0.0, 0.0))
                .map_err(|err| strata_core::SystemError::new(err.to_string()))?;
            Ok(strata_core::SystemRun::Detach)
        });

        engine.update(0.016);
        assert_eq!(handle.outgoing_len(), 1);
    }
}
