//! Mounted child units.
//!
//! A [`Node`] is whatever a feature builds for a destination. The flow only
//! drives its lifecycle; it never looks inside.

use async_trait::async_trait;
use std::fmt;
use std::sync::Arc;

use crate::ids::{ControllerId, SessionId};
use crate::navigation::backstack::EntryKey;
use crate::navigation::destination::Destination;

/// A child unit mounted by the session flow.
#[async_trait]
pub trait Node: Send + Sync {
    /// Short name for logs
    fn name(&self) -> &str;

    /// Finish construction. The child counts as attached once this returns.
    async fn on_attach(&self) {}

    /// The entry became (or stopped being) the current one
    fn on_active(&self, _active: bool) {}

    /// The entry left the backstack, or the flow is shutting down
    fn on_destroy(&self) {}
}

/// Shared node reference
pub type NodeRef = Arc<dyn Node>;

/// Inputs every feature receives at construction
#[derive(Clone, Debug)]
pub struct BuildContext {
    /// Owning controller
    pub controller_id: ControllerId,
    /// Session the flow belongs to
    pub session_id: SessionId,
}

/// A node that has been built and attached for a backstack entry.
#[derive(Clone)]
pub struct MountedChild {
    /// Entry the node was built for; `None` for the permanent unit
    pub key: Option<EntryKey>,
    /// Destination the node was resolved from
    pub destination: Destination,
    /// The node itself
    pub node: NodeRef,
}

impl MountedChild {
    /// Check if this child is the node for a given entry
    pub fn is_entry(&self, key: EntryKey) -> bool {
        self.key == Some(key)
    }
}

impl fmt::Debug for MountedChild {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MountedChild")
            .field("key", &self.key)
            .field("destination", &self.destination)
            .field("node", &self.node.name())
            .finish()
    }
}
