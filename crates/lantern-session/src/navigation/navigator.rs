//! Policy-aware navigation.
//!
//! [`Navigator`] sits between callers and the [`BackStackHandle`]. It applies
//! the error policy for navigation programming errors and implements the
//! canonical "land through the room list" navigation used by deep links and
//! room forwarding, including waiting for the target child to attach.

use std::future::Future;

use crate::errors::NavigationError;
use crate::navigation::attach::AttachRegistry;
use crate::navigation::backstack::StackOperation;
use crate::navigation::destination::Destination;
use crate::navigation::node::MountedChild;
use crate::navigation::queue::BackStackHandle;

/// What to do with navigation programming errors
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum NavigationPolicy {
    /// Return the error to the caller
    Strict,
    /// Log the error and reset the stack to the room list
    RecoverToRoot,
}

impl NavigationPolicy {
    /// Policy for a `strict_navigation` config flag
    pub fn from_strict(strict: bool) -> Self {
        if strict {
            NavigationPolicy::Strict
        } else {
            NavigationPolicy::RecoverToRoot
        }
    }
}

/// Cloneable navigation front-end over the backstack
#[derive(Clone, Debug)]
pub struct Navigator {
    backstack: BackStackHandle,
    attachments: AttachRegistry,
    policy: NavigationPolicy,
}

impl Navigator {
    /// Create a navigator
    pub fn new(
        backstack: BackStackHandle,
        attachments: AttachRegistry,
        policy: NavigationPolicy,
    ) -> Self {
        Self {
            backstack,
            attachments,
            policy,
        }
    }

    /// Underlying backstack
    pub fn backstack(&self) -> &BackStackHandle {
        &self.backstack
    }

    /// Attachment registry shared with the mounter
    pub fn attachments(&self) -> &AttachRegistry {
        &self.attachments
    }

    /// Active error policy
    pub fn policy(&self) -> NavigationPolicy {
        self.policy
    }

    /// Apply an operation under the error policy
    pub fn navigate(&self, op: StackOperation) -> Result<u64, NavigationError> {
        let name = op.name();
        match self.backstack.apply(op) {
            Ok(version) => Ok(version),
            Err(error) => {
                tracing::error!(%error, op = name, "Navigation failed");
                match self.policy {
                    NavigationPolicy::Strict => Err(error),
                    NavigationPolicy::RecoverToRoot => self.recover_to_root(),
                }
            }
        }
    }

    /// Apply an operation on behalf of a child callback.
    ///
    /// Callbacks have nobody to return an error to, so it is only logged.
    pub fn dispatch(&self, op: StackOperation) {
        // navigate() already logged the failure
        let _ = self.navigate(op);
    }

    /// Reset the stack to the room list
    pub fn recover_to_root(&self) -> Result<u64, NavigationError> {
        tracing::warn!("Recovering navigation to the room list");
        self.backstack.new_root(Destination::RoomList)
    }

    /// Land on the room list, optionally push `target`, and wait for the
    /// resulting top child to attach.
    ///
    /// When `target` (or the room list, without a target) is already on top,
    /// nothing is pushed and the existing child is returned. The mutation and
    /// the waiter registration happen now, in one serialized step; the returned
    /// future only waits, so dropping it never leaves a half-applied stack.
    pub fn navigate_and_attach(
        &self,
        target: Option<Destination>,
    ) -> impl Future<Output = Result<MountedChild, NavigationError>> + Send + 'static {
        let attachments = self.attachments.clone();
        let staged = self.backstack.transaction(|tx| {
            let wanted = target.as_ref().unwrap_or(&Destination::RoomList);
            if &tx.stack().top().destination != wanted {
                tx.apply(StackOperation::SingleTop(Destination::RoomList))?;
                if let Some(destination) = &target {
                    tx.apply(StackOperation::Push(destination.clone()))?;
                }
            }
            let top = tx.stack().top().clone();
            Ok(attachments.wait_for(top.key, top.destination, tx.version()))
        });

        let staged = match staged {
            Ok((_, wait)) => Ok(wait),
            Err(error) => {
                tracing::error!(%error, ?target, "Canonical navigation failed");
                if self.policy == NavigationPolicy::RecoverToRoot {
                    let _ = self.recover_to_root();
                }
                Err(error)
            }
        };

        async move { staged?.await }
    }
}
