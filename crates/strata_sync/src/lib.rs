//! # STRATA Sync
//!
//! State synchronization between [`strata_core`] worlds:
//!
//! - A length-prefixed binary frame protocol (PUT / DELETE / APPEND)
//! - A merge path with last-write-wins conflict resolution under a
//!   total order, so every peer converges on identical state
//! - Pluggable transports: in-memory channel pairs, non-blocking UDP,
//!   and a recorder for capture/replay
//! - The [`SyncEngine`] frame loop: pump, run systems, flush
//! - Composite (prefab) instantiation that propagates like any other
//!   local write
//!
//! ## Convergence
//!
//! Every write carries a `(timestamp, payload-bytes)` pair, compared
//! lexicographically; deletes compare as an empty payload. That order
//! is total, so merge is commutative, associative, and idempotent:
//! peers may receive frames duplicated, reordered, or relayed through
//! intermediaries and still end in the same state.

pub mod composite;
pub mod config;
pub mod engine;
pub mod protocol;
pub mod transport;

pub use composite::{
    instantiate, CompositeDefinition, CompositeEntry, CompositeError, CompositeLibrary,
    CompositeProvider,
};
pub use config::{ConfigError, SyncConfig, DEFAULT_MAX_PAYLOAD};
pub use engine::{EngineStats, SyncEngine};
pub use protocol::{
    merge_buffer, Frame, FrameBatch, FrameCursor, FrameHeader, MergeOutcome, MergeReport,
    ProtocolError, WireOp,
};
pub use transport::{
    MemoryTransport, RecorderHandle, RecorderTransport, Transport, TransportError, UdpTransport,
};
