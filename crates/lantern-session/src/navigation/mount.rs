//! Child mounting.
//!
//! [`ChildMounter`] follows the backstack snapshots and keeps the set of
//! mounted children in line with them: children whose entries left the stack
//! are destroyed, the top entry is resolved and attached when it has no child
//! yet, and the active flag moves to the top child. The permanent unit is
//! mounted once before the first snapshot is handled.
//!
//! Snapshots are coalesced: when several changes land while a child is
//! attaching, only the latest stack is mounted. Entries that were pushed and
//! popped in between are never built.

use std::sync::Arc;
use tokio::sync::watch;

use crate::errors::NavigationError;
use crate::navigation::attach::AttachRegistry;
use crate::navigation::backstack::{BackStackEntry, EntryKey};
use crate::navigation::destination::Destination;
use crate::navigation::navigator::Navigator;
use crate::navigation::node::MountedChild;
use crate::navigation::queue::StackSnapshot;
use crate::navigation::resolver::DestinationResolver;

/// Mounts children for backstack entries
pub struct ChildMounter {
    resolver: Arc<DestinationResolver>,
    navigator: Navigator,
    attachments: AttachRegistry,
    active: Option<EntryKey>,
}

impl ChildMounter {
    /// Create a mounter
    pub fn new(resolver: Arc<DestinationResolver>, navigator: Navigator) -> Self {
        let attachments = navigator.attachments().clone();
        Self {
            resolver,
            navigator,
            attachments,
            active: None,
        }
    }

    /// Mount until the backstack goes away.
    ///
    /// Run this inside the controller's scope; teardown of mounted children
    /// happens through [`AttachRegistry::close`].
    pub async fn run(mut self) {
        let mut snapshots = self.navigator.backstack().watch();
        self.mount_permanent().await;

        loop {
            let snapshot = snapshots.borrow_and_update().clone();
            self.sync_to(&snapshot).await;
            if snapshots.changed().await.is_err() {
                break;
            }
        }
        tracing::debug!("Backstack closed; mounter exiting");
    }

    async fn mount_permanent(&self) {
        match self.resolver.resolve(&Destination::Permanent) {
            Ok(node) => {
                node.on_attach().await;
                node.on_active(true);
                let kept = self.attachments.attached(MountedChild {
                    key: None,
                    destination: Destination::Permanent,
                    node: node.clone(),
                });
                if !kept {
                    node.on_destroy();
                }
            }
            Err(error) => tracing::error!(%error, "Permanent session unit not mounted"),
        }
    }

    /// Bring mounted children in line with one snapshot
    async fn sync_to(&mut self, snapshot: &StackSnapshot) {
        for child in self.attachments.detach_missing(snapshot) {
            if child.key.is_some() && child.key == self.active {
                self.active = None;
            }
            tracing::debug!(node = child.node.name(), "Destroying child");
            child.node.on_destroy();
        }
        self.attachments.fail_missing(snapshot);

        let top = snapshot.top();
        if self.attachments.get(top.key).is_none() && !self.attach(top).await {
            return;
        }
        self.activate(top.key);
    }

    /// Resolve and attach the child of `entry`; false if nothing was attached
    async fn attach(&self, entry: &BackStackEntry) -> bool {
        match self.resolver.resolve(&entry.destination) {
            Ok(node) => {
                node.on_attach().await;
                if !self.navigator.backstack().snapshot().contains_key(entry.key) {
                    // Left the stack while attaching; its waiters fail on the next pass.
                    tracing::debug!(key = %entry.key, node = node.name(), "Attached child is stale");
                    node.on_destroy();
                    return false;
                }
                let kept = self.attachments.attached(MountedChild {
                    key: Some(entry.key),
                    destination: entry.destination.clone(),
                    node: node.clone(),
                });
                if !kept {
                    tracing::debug!(node = node.name(), "Registry closed; dropping child");
                    node.on_destroy();
                    return false;
                }
                tracing::debug!(key = %entry.key, node = node.name(), "Child attached");
                true
            }
            Err(error) => {
                self.unresolvable(entry, error);
                false
            }
        }
    }

    fn unresolvable(&self, entry: &BackStackEntry, error: NavigationError) {
        tracing::error!(%error, key = %entry.key, "Cannot mount backstack entry");
        self.attachments.fail(entry.key, &error);
        if entry.destination == Destination::RoomList {
            // Nothing left to fall back to.
            return;
        }
        if let Err(error) = self.navigator.recover_to_root() {
            tracing::error!(%error, "Recovery to the room list failed");
        }
    }

    fn activate(&mut self, key: EntryKey) {
        if self.active == Some(key) {
            return;
        }
        if let Some(previous) = self.active.and_then(|k| self.attachments.get(k)) {
            previous.node.on_active(false);
        }
        if let Some(current) = self.attachments.get(key) {
            current.node.on_active(true);
        }
        self.active = Some(key);
    }
}

/// Destroy children handed back by [`AttachRegistry::close`]
pub fn destroy_all(children: Vec<MountedChild>) {
    for child in children {
        child.node.on_active(false);
        child.node.on_destroy();
    }
}

/// Wait until the mounter has attached the current top entry
pub async fn wait_for_top(
    snapshots: &mut watch::Receiver<StackSnapshot>,
    attachments: &AttachRegistry,
) -> Result<MountedChild, NavigationError> {
    let (key, destination, version) = {
        let snapshot = snapshots.borrow_and_update();
        let top = snapshot.top();
        (top.key, top.destination.clone(), snapshot.version)
    };
    attachments.wait_for(key, destination, version).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::flow::callbacks::CallbackConsumers;
    use crate::flow::scope::TaskScope;
    use crate::ids::{ControllerId, SessionId};
    use crate::navigation::backstack::{BackStack, StackOperation};
    use crate::navigation::navigator::NavigationPolicy;
    use crate::navigation::node::BuildContext;
    use crate::navigation::queue::BackStackHandle;
    use crate::navigation::resolver::{EntryPoints, FlowCallbacks};
    use crate::testing::StubFeatures;
    use assert_matches::assert_matches;
    use std::time::Duration;

    struct Fixture {
        features: Arc<StubFeatures>,
        navigator: Navigator,
        scope: Arc<TaskScope>,
    }

    fn start(entry_points: impl FnOnce(&Arc<StubFeatures>) -> EntryPoints) -> Fixture {
        let navigator = Navigator::new(
            BackStackHandle::new(BackStack::new(Destination::RoomList).unwrap(), 16),
            AttachRegistry::new(),
            NavigationPolicy::Strict,
        );
        let scope = TaskScope::root("mount-test");
        let features = StubFeatures::new();
        let callbacks = Arc::new(FlowCallbacks::new(
            navigator.clone(),
            CallbackConsumers::new(),
            &scope,
        ));
        let resolver = Arc::new(DestinationResolver::new(
            BuildContext {
                controller_id: ControllerId::new_random(),
                session_id: SessionId::new("@alice:example.org"),
            },
            entry_points(&features),
            callbacks,
        ));
        scope.spawn(ChildMounter::new(resolver, navigator.clone()).run());
        Fixture {
            features,
            navigator,
            scope,
        }
    }

    async fn settle(mut done: impl FnMut() -> bool) {
        for _ in 0..100 {
            if done() {
                return;
            }
            tokio::task::yield_now().await;
        }
        panic!("mounter did not settle");
    }

    async fn top_child(fx: &Fixture) -> Result<MountedChild, NavigationError> {
        let mut snapshots = fx.navigator.backstack().watch();
        wait_for_top(&mut snapshots, fx.navigator.attachments()).await
    }

    #[tokio::test]
    async fn mounts_permanent_and_root() {
        let fx = start(StubFeatures::entry_points);
        let root = top_child(&fx).await.unwrap();
        assert_eq!(root.destination, Destination::RoomList);

        let permanent = fx.features.last_built(&Destination::Permanent).unwrap();
        assert!(permanent.is_attached());
        assert!(fx.navigator.attachments().permanent().is_some());
        assert!(fx
            .features
            .last_built(&Destination::RoomList)
            .unwrap()
            .is_active());
    }

    #[tokio::test]
    async fn popped_children_are_destroyed_and_active_moves() {
        let fx = start(StubFeatures::entry_points);
        top_child(&fx).await.unwrap();

        fx.navigator
            .navigate(StackOperation::Push(Destination::Settings))
            .unwrap();
        top_child(&fx).await.unwrap();
        let settings = fx.features.last_built(&Destination::Settings).unwrap();
        let room_list = fx.features.last_built(&Destination::RoomList).unwrap();
        assert!(settings.is_active());
        assert!(!room_list.is_active());

        fx.navigator.navigate(StackOperation::Pop).unwrap();
        settle(|| settings.is_destroyed()).await;
        assert!(room_list.is_active());
        assert_eq!(fx.navigator.attachments().attached_count(), 1);
    }

    #[tokio::test]
    async fn unresolvable_top_falls_back_to_room_list() {
        let fx = start(|features| {
            let mut entry_points = features.entry_points();
            entry_points.preferences = None;
            entry_points
        });
        top_child(&fx).await.unwrap();

        let version = fx
            .navigator
            .navigate(StackOperation::Push(Destination::Settings))
            .unwrap();
        let key = fx.navigator.backstack().snapshot().top().key;
        let wait = fx
            .navigator
            .attachments()
            .wait_for(key, Destination::Settings, version);

        assert_matches!(
            wait.await,
            Err(NavigationError::UnresolvableDestination {
                destination: Destination::Settings
            })
        );
        let mut snapshots = fx.navigator.backstack().watch();
        snapshots
            .wait_for(|s| s.destinations() == vec![Destination::RoomList])
            .await
            .unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn entries_passed_over_while_attaching_are_never_built() {
        let fx = start(StubFeatures::entry_points);
        fx.features
            .set_attach_delay("Settings", Duration::from_millis(50));
        top_child(&fx).await.unwrap();

        fx.navigator
            .navigate(StackOperation::Push(Destination::Settings))
            .unwrap();
        tokio::task::yield_now().await;
        fx.navigator
            .navigate(StackOperation::Push(Destination::CreateRoom))
            .unwrap();
        fx.navigator.navigate(StackOperation::Pop).unwrap();
        fx.navigator
            .navigate(StackOperation::Push(Destination::InviteList))
            .unwrap();

        let child = top_child(&fx).await.unwrap();
        assert_eq!(child.destination, Destination::InviteList);
        assert!(fx.features.last_built(&Destination::CreateRoom).is_none());
        fx.scope.shutdown();
    }

    #[tokio::test]
    async fn destroy_all_tears_children_down() {
        let fx = start(StubFeatures::entry_points);
        top_child(&fx).await.unwrap();
        fx.scope.shutdown();

        destroy_all(fx.navigator.attachments().close());
        for node in fx.features.built() {
            assert!(node.is_destroyed());
        }
    }
}
