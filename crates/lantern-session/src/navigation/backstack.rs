//! # Backstack
//!
//! Ordered navigation history of the logged-in flow. The stack is a value:
//! a root entry plus the entries above it, so it can never be empty. Every
//! entry carries a stable [`EntryKey`] so two equal destinations pushed twice
//! stay distinct mounted children.
//!
//! Persisted state keeps destinations only; keys are reassigned on restore.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::errors::{NavigationError, RestoreError};
use crate::navigation::destination::Destination;

/// Format version written into persisted backstack blobs
pub const BACKSTACK_STATE_VERSION: u32 = 1;

/// Stable identity of one backstack entry
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EntryKey(u64);

impl EntryKey {
    /// Raw key value
    pub fn value(&self) -> u64 {
        self.0
    }

    #[cfg(test)]
    pub(crate) fn from_raw(value: u64) -> Self {
        Self(value)
    }
}

impl fmt::Display for EntryKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// One entry of the backstack
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BackStackEntry {
    /// Entry identity
    pub key: EntryKey,
    /// Where the entry navigates to
    pub destination: Destination,
}

/// Backstack mutation
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum StackOperation {
    /// Append as the new top
    Push(Destination),
    /// Remove the top
    Pop,
    /// Remove the top and push in one step
    Replace(Destination),
    /// Push unless already on top; reactivate an equal entry further down
    SingleTop(Destination),
    /// Clear the stack down to a single entry
    NewRoot(Destination),
    /// Remove everything above the root
    PopToRoot,
}

impl StackOperation {
    /// Get the operation name for logs
    pub fn name(&self) -> &'static str {
        match self {
            StackOperation::Push(_) => "push",
            StackOperation::Pop => "pop",
            StackOperation::Replace(_) => "replace",
            StackOperation::SingleTop(_) => "single_top",
            StackOperation::NewRoot(_) => "new_root",
            StackOperation::PopToRoot => "pop_to_root",
        }
    }
}

/// Navigation history; last entry is the current one.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BackStack {
    root: BackStackEntry,
    above: Vec<BackStackEntry>,
    next_key: u64,
}

impl BackStack {
    /// Create a stack holding a single destination
    pub fn new(initial: Destination) -> Result<Self, NavigationError> {
        ensure_stackable(&initial)?;
        Ok(Self {
            root: BackStackEntry {
                key: EntryKey(0),
                destination: initial,
            },
            above: Vec::new(),
            next_key: 1,
        })
    }

    /// Rebuild from persisted state, falling back to `initial` when the blob
    /// is absent or unusable.
    pub fn restore_or_initialize(
        persisted: Option<&str>,
        initial: Destination,
    ) -> Result<Self, NavigationError> {
        if let Some(blob) = persisted {
            match Self::restore(blob) {
                Ok(stack) => {
                    tracing::debug!(depth = stack.len(), "Restored backstack");
                    return Ok(stack);
                }
                Err(error) => {
                    tracing::warn!(%error, "Discarding persisted backstack");
                }
            }
        }
        Self::new(initial)
    }

    /// Decode a persisted blob
    pub fn restore(blob: &str) -> Result<Self, RestoreError> {
        let header: VersionHeader =
            serde_json::from_str(blob).map_err(|e| RestoreError::Malformed {
                reason: e.to_string(),
            })?;
        if header.version != BACKSTACK_STATE_VERSION {
            return Err(RestoreError::VersionMismatch {
                found: header.version,
                expected: BACKSTACK_STATE_VERSION,
            });
        }

        let persisted: PersistedBackStack =
            serde_json::from_str(blob).map_err(|e| RestoreError::Malformed {
                reason: e.to_string(),
            })?;

        let mut destinations = persisted.stack.into_iter();
        let root = destinations.next().ok_or(RestoreError::Empty)?;
        let mut stack = Self::new(root).map_err(|_| RestoreError::ContainsPermanent)?;
        for destination in destinations {
            stack
                .push(destination)
                .map_err(|_| RestoreError::ContainsPermanent)?;
        }
        Ok(stack)
    }

    /// Encode as a versioned persisted blob
    pub fn save(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(&PersistedBackStack {
            version: BACKSTACK_STATE_VERSION,
            stack: self.destinations().cloned().collect(),
        })
    }

    /// Current entry
    pub fn top(&self) -> &BackStackEntry {
        self.above.last().unwrap_or(&self.root)
    }

    /// Bottom entry
    pub fn root(&self) -> &BackStackEntry {
        &self.root
    }

    /// Number of entries
    pub fn len(&self) -> usize {
        self.above.len() + 1
    }

    /// Always false; present for API symmetry with collections
    pub fn is_empty(&self) -> bool {
        false
    }

    /// Entries from root to top
    pub fn entries(&self) -> impl Iterator<Item = &BackStackEntry> {
        std::iter::once(&self.root).chain(self.above.iter())
    }

    /// Destinations from root to top
    pub fn destinations(&self) -> impl Iterator<Item = &Destination> {
        self.entries().map(|entry| &entry.destination)
    }

    /// Check if an entry is still in the stack
    pub fn contains_key(&self, key: EntryKey) -> bool {
        self.entries().any(|entry| entry.key == key)
    }

    /// Apply an operation; returns whether the stack changed.
    pub fn apply(&mut self, op: &StackOperation) -> Result<bool, NavigationError> {
        match op {
            StackOperation::Push(destination) => self.push(destination.clone()).map(|_| true),
            StackOperation::Pop => self.pop().map(|_| true),
            StackOperation::Replace(destination) => self.replace(destination.clone()).map(|_| true),
            StackOperation::SingleTop(destination) => self.single_top(destination.clone()),
            StackOperation::NewRoot(destination) => self.new_root(destination.clone()),
            StackOperation::PopToRoot => Ok(self.pop_to_root()),
        }
    }

    /// Append `destination` as the new top
    pub fn push(&mut self, destination: Destination) -> Result<EntryKey, NavigationError> {
        ensure_stackable(&destination)?;
        let entry = self.entry(destination);
        let key = entry.key;
        self.above.push(entry);
        Ok(key)
    }

    /// Remove the top; the root can never be popped
    pub fn pop(&mut self) -> Result<BackStackEntry, NavigationError> {
        self.above.pop().ok_or(NavigationError::EmptyPop)
    }

    /// Remove the top and push `destination` in its place
    pub fn replace(&mut self, destination: Destination) -> Result<EntryKey, NavigationError> {
        ensure_stackable(&destination)?;
        let entry = self.entry(destination);
        let key = entry.key;
        match self.above.last_mut() {
            Some(top) => *top = entry,
            None => self.root = entry,
        }
        Ok(key)
    }

    /// Make `destination` current without duplicating it.
    ///
    /// No-op when it is already on top. When an equal entry sits further
    /// down, everything above that entry is removed; otherwise it is pushed.
    pub fn single_top(&mut self, destination: Destination) -> Result<bool, NavigationError> {
        ensure_stackable(&destination)?;
        if self.top().destination == destination {
            return Ok(false);
        }
        match self
            .above
            .iter()
            .rposition(|entry| entry.destination == destination)
        {
            Some(index) => self.above.truncate(index + 1),
            None if self.root.destination == destination => self.above.clear(),
            None => {
                self.push(destination)?;
            }
        }
        Ok(true)
    }

    /// Clear the stack so `destination` is the only entry
    pub fn new_root(&mut self, destination: Destination) -> Result<bool, NavigationError> {
        ensure_stackable(&destination)?;
        if self.root.destination == destination {
            let changed = !self.above.is_empty();
            self.above.clear();
            return Ok(changed);
        }
        self.above.clear();
        self.root = self.entry(destination);
        Ok(true)
    }

    /// Remove every entry above the root; returns whether any was removed
    pub fn pop_to_root(&mut self) -> bool {
        let changed = !self.above.is_empty();
        self.above.clear();
        changed
    }

    fn entry(&mut self, destination: Destination) -> BackStackEntry {
        let key = EntryKey(self.next_key);
        self.next_key += 1;
        BackStackEntry { key, destination }
    }
}

fn ensure_stackable(destination: &Destination) -> Result<(), NavigationError> {
    if destination.is_stackable() {
        Ok(())
    } else {
        Err(NavigationError::PermanentInStack)
    }
}

#[derive(Serialize, Deserialize)]
struct PersistedBackStack {
    version: u32,
    stack: Vec<Destination>,
}

#[derive(Deserialize)]
struct VersionHeader {
    version: u32,
}
