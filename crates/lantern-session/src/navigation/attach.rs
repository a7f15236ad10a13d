//! Attachment registry.
//!
//! Records which children are attached and lets callers wait for the child of
//! a specific backstack entry. A waiter is satisfied immediately when the
//! child is already attached, fulfilled when the mounter attaches it, and
//! failed when the entry leaves the stack first.
//!
//! Waiters remember the stack version their entry was committed at, so a
//! mounter still working through an older snapshot cannot fail them early.

use parking_lot::Mutex;
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use tokio::sync::oneshot;

use crate::errors::NavigationError;
use crate::navigation::backstack::EntryKey;
use crate::navigation::destination::Destination;
use crate::navigation::node::MountedChild;
use crate::navigation::queue::StackSnapshot;

type AttachResult = Result<MountedChild, NavigationError>;

struct Waiter {
    key: EntryKey,
    destination: Destination,
    since_version: u64,
    tx: oneshot::Sender<AttachResult>,
}

#[derive(Default)]
struct Inner {
    attached: HashMap<EntryKey, MountedChild>,
    permanent: Option<MountedChild>,
    waiters: Vec<Waiter>,
    closed: bool,
}

/// Shared registry of attached children and pending waiters
#[derive(Clone, Default)]
pub struct AttachRegistry {
    inner: Arc<Mutex<Inner>>,
}

impl AttachRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Wait for the child of `key`, committed at `since_version`.
    ///
    /// Registration happens now; the returned future only awaits the result,
    /// so dropping it leaves no state behind except a closed waiter that the
    /// next notification discards.
    pub fn wait_for(
        &self,
        key: EntryKey,
        destination: Destination,
        since_version: u64,
    ) -> impl Future<Output = AttachResult> + Send + 'static {
        let (tx, rx) = oneshot::channel();
        {
            let mut inner = self.inner.lock();
            if inner.closed {
                let _ = tx.send(Err(NavigationError::ControllerDestroyed));
            } else if let Some(child) = inner.attached.get(&key) {
                let _ = tx.send(Ok(child.clone()));
            } else {
                inner.waiters.push(Waiter {
                    key,
                    destination,
                    since_version,
                    tx,
                });
            }
        }
        async move {
            rx.await
                .unwrap_or(Err(NavigationError::ControllerDestroyed))
        }
    }

    /// Record an attached child and release its waiters.
    ///
    /// Returns `false` once the registry is closed; the child is not kept and
    /// the caller must destroy it.
    #[must_use]
    pub fn attached(&self, child: MountedChild) -> bool {
        let mut inner = self.inner.lock();
        if inner.closed {
            return false;
        }
        let Some(key) = child.key else {
            inner.permanent = Some(child);
            return true;
        };
        let waiters = std::mem::take(&mut inner.waiters);
        for waiter in waiters {
            if waiter.key == key {
                let _ = waiter.tx.send(Ok(child.clone()));
            } else if !waiter.tx.is_closed() {
                inner.waiters.push(waiter);
            }
        }
        inner.attached.insert(key, child);
        true
    }

    /// Fail waiters whose entry is absent from a snapshot at or after the
    /// version they were committed at.
    pub fn fail_missing(&self, snapshot: &StackSnapshot) {
        let mut inner = self.inner.lock();
        let waiters = std::mem::take(&mut inner.waiters);
        for waiter in waiters {
            let superseded =
                waiter.since_version <= snapshot.version && !snapshot.contains_key(waiter.key);
            if superseded {
                tracing::debug!(
                    key = %waiter.key,
                    destination = waiter.destination.name(),
                    "Awaited entry left the backstack before attaching"
                );
                let _ = waiter.tx.send(Err(NavigationError::AttachmentSuperseded {
                    destination: waiter.destination,
                }));
            } else if !waiter.tx.is_closed() {
                inner.waiters.push(waiter);
            }
        }
    }

    /// Fail the waiters of one entry whose child could not be built
    pub fn fail(&self, key: EntryKey, error: &NavigationError) {
        let mut inner = self.inner.lock();
        let waiters = std::mem::take(&mut inner.waiters);
        for waiter in waiters {
            if waiter.key == key {
                let _ = waiter.tx.send(Err(error.clone()));
            } else if !waiter.tx.is_closed() {
                inner.waiters.push(waiter);
            }
        }
    }

    /// Remove children whose entries are absent from a snapshot.
    ///
    /// Returns them so the caller can destroy them.
    pub fn detach_missing(&self, snapshot: &StackSnapshot) -> Vec<MountedChild> {
        let mut inner = self.inner.lock();
        let gone: Vec<EntryKey> = inner
            .attached
            .keys()
            .copied()
            .filter(|key| !snapshot.contains_key(*key))
            .collect();
        gone.into_iter()
            .filter_map(|key| inner.attached.remove(&key))
            .collect()
    }

    /// Child attached for an entry
    pub fn get(&self, key: EntryKey) -> Option<MountedChild> {
        self.inner.lock().attached.get(&key).cloned()
    }

    /// The permanent child, if mounted
    pub fn permanent(&self) -> Option<MountedChild> {
        self.inner.lock().permanent.clone()
    }

    /// Number of attached stack children
    pub fn attached_count(&self) -> usize {
        self.inner.lock().attached.len()
    }

    /// Number of pending waiters
    pub fn pending_waiters(&self) -> usize {
        self.inner.lock().waiters.len()
    }

    /// Tear down: fail every waiter and drop every child.
    ///
    /// Returns the children so the caller can destroy them.
    pub fn close(&self) -> Vec<MountedChild> {
        let mut inner = self.inner.lock();
        inner.closed = true;
        for waiter in inner.waiters.drain(..) {
            let _ = waiter.tx.send(Err(NavigationError::ControllerDestroyed));
        }
        let mut children: Vec<MountedChild> = inner.attached.drain().map(|(_, c)| c).collect();
        children.extend(inner.permanent.take());
        children
    }
}

impl std::fmt::Debug for AttachRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let inner = self.inner.lock();
        f.debug_struct("AttachRegistry")
            .field("attached", &inner.attached.len())
            .field("waiters", &inner.waiters.len())
            .field("closed", &inner.closed)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::navigation::backstack::BackStack;
    use crate::navigation::node::Node;
    use crate::navigation::queue::BackStackHandle;
    use assert_matches::assert_matches;

    struct Dummy;

    #[async_trait::async_trait]
    impl Node for Dummy {
        fn name(&self) -> &str {
            "dummy"
        }
    }

    fn child(key: EntryKey, destination: Destination) -> MountedChild {
        MountedChild {
            key: Some(key),
            destination,
            node: Arc::new(Dummy),
        }
    }

    fn stack_with_invites() -> (BackStackHandle, EntryKey, u64) {
        let stack = BackStackHandle::new(BackStack::new(Destination::RoomList).unwrap(), 8);
        let version = stack.push(Destination::InviteList).unwrap();
        let key = stack.snapshot().top().key;
        (stack, key, version)
    }

    #[tokio::test]
    async fn already_attached_resolves_immediately() {
        let registry = AttachRegistry::new();
        let (_stack, key, version) = stack_with_invites();
        assert!(registry.attached(child(key, Destination::InviteList)));

        let mounted = registry
            .wait_for(key, Destination::InviteList, version)
            .await
            .unwrap();
        assert!(mounted.is_entry(key));
        assert_eq!(registry.pending_waiters(), 0);
    }

    #[tokio::test]
    async fn waiter_released_on_attach() {
        let registry = AttachRegistry::new();
        let (_stack, key, version) = stack_with_invites();

        let wait = registry.wait_for(key, Destination::InviteList, version);
        assert_eq!(registry.pending_waiters(), 1);

        assert!(registry.attached(child(key, Destination::InviteList)));
        assert_eq!(wait.await.unwrap().destination, Destination::InviteList);
    }

    #[tokio::test]
    async fn stale_snapshot_does_not_fail_waiter() {
        let registry = AttachRegistry::new();
        let stack = BackStackHandle::new(BackStack::new(Destination::RoomList).unwrap(), 8);
        let old_snapshot = stack.snapshot();
        let version = stack.push(Destination::InviteList).unwrap();
        let key = stack.snapshot().top().key;

        let wait = registry.wait_for(key, Destination::InviteList, version);
        registry.fail_missing(&old_snapshot);
        assert_eq!(registry.pending_waiters(), 1);

        stack.pop().unwrap();
        registry.fail_missing(&stack.snapshot());
        assert_matches!(
            wait.await,
            Err(NavigationError::AttachmentSuperseded {
                destination: Destination::InviteList
            })
        );
    }

    #[tokio::test]
    async fn close_fails_pending_and_future_waiters() {
        let registry = AttachRegistry::new();
        let (_stack, key, version) = stack_with_invites();
        let wait = registry.wait_for(key, Destination::InviteList, version);

        registry.close();
        assert_matches!(wait.await, Err(NavigationError::ControllerDestroyed));
        assert_matches!(
            registry.wait_for(key, Destination::InviteList, version).await,
            Err(NavigationError::ControllerDestroyed)
        );
        assert!(!registry.attached(child(key, Destination::InviteList)));
        assert_eq!(registry.attached_count(), 0);
    }

    #[tokio::test]
    async fn debug_reports_counts() {
        let registry = AttachRegistry::new();
        let (_stack, key, version) = stack_with_invites();
        let _wait = registry.wait_for(key, Destination::InviteList, version);

        let rendered = format!("{registry:?}");
        assert!(rendered.starts_with("AttachRegistry"));
        assert!(rendered.contains("waiters: 1"));
    }

    #[test]
    fn dropped_waiters_are_discarded() {
        let registry = AttachRegistry::new();
        let (_stack, key, version) = stack_with_invites();
        drop(registry.wait_for(key, Destination::InviteList, version));

        let other = EntryKey::from_raw(999);
        assert!(registry.attached(child(other, Destination::Settings)));
        assert_eq!(registry.pending_waiters(), 0);
    }
}
