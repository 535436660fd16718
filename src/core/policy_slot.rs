//! Snapshot-and-swap access to the learned controller parameters.
//!
//! The trainer is the only writer: after an update it publishes a new
//! immutable parameter snapshot. An episode runner takes a snapshot at
//! episode start and holds it for the episode's duration, so a mid-episode
//! publish is never observed by an in-flight rollout.

use parking_lot::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Single-writer, snapshot-reader slot for policy parameters.
///
/// Burn modules are `Send` but not `Sync`, so the slot hands out clones
/// rather than references.
pub struct PolicySlot<M> {
    current: Mutex<M>,
    version: AtomicU64,
}

impl<M: Clone + Send> PolicySlot<M> {
    /// Create a slot holding the initial parameters (version 1).
    pub fn new(initial: M) -> Self {
        Self {
            current: Mutex::new(initial),
            version: AtomicU64::new(1),
        }
    }

    /// Publish a new parameter snapshot, replacing the previous one.
    ///
    /// Called by the trainer between training steps; returns the new version.
    pub fn publish(&self, model: M) -> u64 {
        let mut guard = self.current.lock();
        *guard = model;
        self.version.fetch_add(1, Ordering::Release) + 1
    }

    /// Clone the current snapshot for a rollout.
    pub fn snapshot(&self) -> M {
        self.current.lock().clone()
    }

    /// Current parameter version.
    pub fn version(&self) -> u64 {
        self.version.load(Ordering::Acquire)
    }
}

/// Shared handle to a [`PolicySlot`].
pub type SharedPolicySlot<M> = Arc<PolicySlot<M>>;

/// Create a shared slot holding the initial parameters.
pub fn policy_slot<M: Clone + Send>(initial: M) -> SharedPolicySlot<M> {
    Arc::new(PolicySlot::new(initial))
}
