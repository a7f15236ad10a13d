//! Navigation: destinations, the backstack and the children mounted for it.

pub mod attach;
pub mod backstack;
pub mod destination;
pub mod mount;
pub mod navigator;
pub mod node;
pub mod queue;
pub mod resolver;

pub use attach::AttachRegistry;
pub use backstack::{BackStack, BackStackEntry, EntryKey, StackOperation, BACKSTACK_STATE_VERSION};
pub use destination::{Destination, RoomInitialScreen};
pub use mount::ChildMounter;
pub use navigator::{NavigationPolicy, Navigator};
pub use node::{BuildContext, MountedChild, Node, NodeRef};
pub use queue::{BackStackChange, BackStackHandle, StackSnapshot, Transaction};
pub use resolver::{DestinationResolver, EntryPoints, FlowCallbacks};
