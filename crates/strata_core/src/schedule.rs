//! # System Scheduler
//!
//! Runs registered systems once per logical frame, in priority order
//! (lower first; ties run in registration order).
//!
//! Add and remove requests made while a frame is running take effect
//! at the start of the next frame, never mid-iteration. A failing
//! system is logged and skipped for the frame; it does not prevent
//! later systems from running or the frame's drain from completing.

use thiserror::Error;
use tracing::warn;

use crate::ecs::World;

/// Error returned by a system callback.
///
/// Systems own their failure detail; the scheduler only logs it.
#[derive(Clone, Debug, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct SystemError {
    message: String,
}

impl SystemError {
    /// Creates a system error with a human-readable message.
    #[must_use]
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// What a system asks the scheduler to do with it after this frame.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum SystemRun {
    /// Keep running every frame.
    #[default]
    Continue,
    /// Deregister starting next frame (self-removal is always safe;
    /// the current frame's iteration is unaffected).
    Detach,
}

/// A per-frame system callback: receives the world and the elapsed
/// time in seconds.
pub type SystemFn = Box<dyn FnMut(&mut World, f32) -> Result<SystemRun, SystemError>>;

struct SystemEntry {
    name: String,
    priority: f64,
    seq: u64,
    run: SystemFn,
}

/// Registers and drives per-frame systems.
pub struct Scheduler {
    systems: Vec<SystemEntry>,
    pending_add: Vec<SystemEntry>,
    pending_remove: Vec<String>,
    next_seq: u64,
}

/// Default priority for systems registered without an explicit one.
pub const DEFAULT_PRIORITY: f64 = 0.0;

impl Scheduler {
    /// Creates an empty scheduler.
    #[must_use]
    pub fn new() -> Self {
        Self {
            systems: Vec::new(),
            pending_add: Vec::new(),
            pending_remove: Vec::new(),
            next_seq: 0,
        }
    }

    /// Registers a system at the default priority.
    pub fn add_system<F>(&mut self, name: impl Into<String>, system: F)
    where
        F: FnMut(&mut World, f32) -> Result<SystemRun, SystemError> + 'static,
    {
        self.add_system_at(name, DEFAULT_PRIORITY, system);
    }

    /// Registers a system at an explicit priority.
    ///
    /// Lower priorities run first; `f64::NEG_INFINITY` is a legitimate
    /// way to run before everything else. Registration during a frame
    /// takes effect next frame.
    pub fn add_system_at<F>(&mut self, name: impl Into<String>, priority: f64, system: F)
    where
        F: FnMut(&mut World, f32) -> Result<SystemRun, SystemError> + 'static,
    {
        let entry = SystemEntry {
            name: name.into(),
            priority,
            seq: self.next_seq,
            run: Box::new(system),
        };
        self.next_seq += 1;
        self.pending_add.push(entry);
    }

    /// Deregisters a system by name, effective at the start of the
    /// next frame.
    ///
    /// # Returns
    ///
    /// `true` if a system with that name is registered or pending.
    pub fn remove_system(&mut self, name: &str) -> bool {
        let known = self
            .systems
            .iter()
            .chain(self.pending_add.iter())
            .any(|entry| entry.name == name);
        if known {
            self.pending_remove.push(name.to_string());
        }
        known
    }

    /// Number of currently-active systems (pending changes excluded).
    #[must_use]
    pub fn len(&self) -> usize {
        self.systems.len()
    }

    /// True if no system is currently active.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.systems.is_empty()
    }

    /// Runs one frame: applies pending add/removes, then invokes every
    /// system once in priority order.
    ///
    /// A system error is logged and does not stop the frame.
    pub fn run(&mut self, world: &mut World, delta: f32) {
        self.apply_pending();
        let mut detached = Vec::new();
        for entry in &mut self.systems {
            match (entry.run)(world, delta) {
                Ok(SystemRun::Continue) => {}
                Ok(SystemRun::Detach) => detached.push(entry.name.clone()),
                Err(error) => {
                    warn!(system = %entry.name, %error, "system failed; continuing frame");
                }
            }
        }
        self.pending_remove.extend(detached);
    }

    fn apply_pending(&mut self) {
        for name in self.pending_remove.drain(..) {
            self.systems.retain(|entry| entry.name != name);
            self.pending_add.retain(|entry| entry.name != name);
        }
        if !self.pending_add.is_empty() {
            self.systems.append(&mut self.pending_add);
            self.systems
                .sort_by(|a, b| a.priority.total_cmp(&b.priority).then(a.seq.cmp(&b.seq)));
        }
    }
}

impl Default for Scheduler {
    fn default() -> Self {
        Self::new()
    }
}
