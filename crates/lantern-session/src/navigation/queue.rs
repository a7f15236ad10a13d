//! Serialized backstack mutation queue.
//!
//! All mutations go through [`BackStackHandle`], which applies them one at a
//! time under a single lock and publishes the result twice:
//! - a `watch` snapshot carrying only the latest stack (for renderers)
//! - a `broadcast` feed carrying every committed change exactly once, in order
//!
//! # Blocking Lock Usage
//!
//! Uses `parking_lot::Mutex` because the lock is never held across `.await`
//! and the work inside is a handful of vector operations.

use parking_lot::Mutex;
use std::sync::Arc;
use tokio::sync::{broadcast, watch};

use crate::errors::NavigationError;
use crate::navigation::backstack::{BackStack, BackStackEntry, EntryKey, StackOperation};
use crate::navigation::destination::Destination;

/// Immutable view of the stack at one version
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StackSnapshot {
    /// Version of the stack; bumps once per committed change
    pub version: u64,
    entries: Arc<[BackStackEntry]>,
    top: BackStackEntry,
}

impl StackSnapshot {
    fn of(version: u64, stack: &BackStack) -> Self {
        Self {
            version,
            entries: stack.entries().cloned().collect(),
            top: stack.top().clone(),
        }
    }

    /// Current entry; a stack always has one
    pub fn top(&self) -> &BackStackEntry {
        &self.top
    }

    /// Entries from root to top
    pub fn entries(&self) -> &[BackStackEntry] {
        &self.entries
    }

    /// Check if an entry is part of this snapshot
    pub fn contains_key(&self, key: EntryKey) -> bool {
        self.entries.iter().any(|entry| entry.key == key)
    }

    /// Destinations from root to top
    pub fn destinations(&self) -> Vec<Destination> {
        self.entries
            .iter()
            .map(|entry| entry.destination.clone())
            .collect()
    }
}

/// A committed backstack change
#[derive(Clone, Debug)]
pub struct BackStackChange {
    /// Version after the change
    pub version: u64,
    /// Operations applied, in order
    pub operations: Vec<StackOperation>,
    /// Resulting stack
    pub snapshot: StackSnapshot,
}

/// Staged mutations applied atomically by [`BackStackHandle::transaction`].
pub struct Transaction {
    stack: BackStack,
    base_version: u64,
    applied: Vec<StackOperation>,
}

impl Transaction {
    /// Stage an operation; no-ops are not recorded
    pub fn apply(&mut self, op: StackOperation) -> Result<(), NavigationError> {
        if self.stack.apply(&op)? {
            self.applied.push(op);
        }
        Ok(())
    }

    /// Staged stack
    pub fn stack(&self) -> &BackStack {
        &self.stack
    }

    /// Version the stack will have once committed
    pub fn version(&self) -> u64 {
        if self.applied.is_empty() {
            self.base_version
        } else {
            self.base_version + 1
        }
    }
}

struct QueueState {
    stack: BackStack,
    version: u64,
}

struct Shared {
    state: Mutex<QueueState>,
    snapshot_tx: watch::Sender<StackSnapshot>,
    changes_tx: broadcast::Sender<BackStackChange>,
}

/// Cloneable handle to the controller's backstack
#[derive(Clone)]
pub struct BackStackHandle {
    shared: Arc<Shared>,
}

impl BackStackHandle {
    /// Wrap an initial stack
    pub fn new(stack: BackStack, change_capacity: usize) -> Self {
        let (snapshot_tx, _snapshot_rx) = watch::channel(StackSnapshot::of(0, &stack));
        let (changes_tx, _changes_rx) = broadcast::channel(change_capacity.max(1));
        Self {
            shared: Arc::new(Shared {
                state: Mutex::new(QueueState { stack, version: 0 }),
                snapshot_tx,
                changes_tx,
            }),
        }
    }

    /// Latest snapshot
    pub fn snapshot(&self) -> StackSnapshot {
        self.shared.snapshot_tx.borrow().clone()
    }

    /// Subscribe to the latest snapshot
    pub fn watch(&self) -> watch::Receiver<StackSnapshot> {
        self.shared.snapshot_tx.subscribe()
    }

    /// Subscribe to every committed change from now on
    pub fn changes(&self) -> broadcast::Receiver<BackStackChange> {
        self.shared.changes_tx.subscribe()
    }

    /// Current top destination
    pub fn top(&self) -> Destination {
        self.shared.state.lock().stack.top().destination.clone()
    }

    /// Encode the current stack for persistence
    pub fn save_state(&self) -> Result<String, serde_json::Error> {
        self.shared.state.lock().stack.save()
    }

    /// Push a destination
    pub fn push(&self, destination: Destination) -> Result<u64, NavigationError> {
        self.apply(StackOperation::Push(destination))
    }

    /// Pop the top
    pub fn pop(&self) -> Result<u64, NavigationError> {
        self.apply(StackOperation::Pop)
    }

    /// Replace the top
    pub fn replace(&self, destination: Destination) -> Result<u64, NavigationError> {
        self.apply(StackOperation::Replace(destination))
    }

    /// Make a destination current without duplicating it
    pub fn single_top(&self, destination: Destination) -> Result<u64, NavigationError> {
        self.apply(StackOperation::SingleTop(destination))
    }

    /// Reset to a single entry
    pub fn new_root(&self, destination: Destination) -> Result<u64, NavigationError> {
        self.apply(StackOperation::NewRoot(destination))
    }

    /// Remove everything above the root
    pub fn pop_to_root(&self) -> Result<u64, NavigationError> {
        self.apply(StackOperation::PopToRoot)
    }

    /// Apply one operation; returns the resulting version.
    pub fn apply(&self, op: StackOperation) -> Result<u64, NavigationError> {
        self.transaction(|tx| tx.apply(op)).map(|(version, ())| version)
    }

    /// Apply several operations as one change.
    ///
    /// The closure works on a staged copy; if it fails nothing is committed.
    /// The closure runs while the queue is held, so work it does (such as
    /// registering interest in a staged entry) happens before any observer
    /// can see the committed stack.
    pub fn transaction<R, F>(&self, f: F) -> Result<(u64, R), NavigationError>
    where
        F: FnOnce(&mut Transaction) -> Result<R, NavigationError>,
    {
        let mut state = self.shared.state.lock();
        let mut tx = Transaction {
            stack: state.stack.clone(),
            base_version: state.version,
            applied: Vec::new(),
        };
        let result = f(&mut tx)?;

        if tx.applied.is_empty() {
            return Ok((state.version, result));
        }

        state.stack = tx.stack;
        state.version += 1;
        let snapshot = StackSnapshot::of(state.version, &state.stack);
        tracing::debug!(
            version = state.version,
            ops = ?tx.applied.iter().map(StackOperation::name).collect::<Vec<_>>(),
            top = state.stack.top().destination.name(),
            "Backstack changed"
        );

        self.shared.snapshot_tx.send_replace(snapshot.clone());
        // No subscribers is fine; the watch snapshot still carries the state.
        let _ = self.shared.changes_tx.send(BackStackChange {
            version: state.version,
            operations: tx.applied,
            snapshot,
        });
        Ok((state.version, result))
    }
}

impl std::fmt::Debug for BackStackHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BackStackHandle")
            .field("snapshot", &self.snapshot())
            .finish()
    }
}
