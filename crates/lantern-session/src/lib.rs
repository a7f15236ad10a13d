//! Lantern Session: logged-in session flow controller
//!
//! Once a user is signed in, this crate owns navigation between the top-level
//! destinations of the chat client and keeps the background sync engine
//! running in step with connectivity and the host's foreground lifecycle.
//!
//! # Architecture Overview
//!
//! - **Backstack**: persistable, versioned stack of typed destinations. All
//!   mutations go through one serialized queue ([`BackStackHandle`]).
//! - **Resolver and mounter**: map the top entry to a feature node, wire the
//!   node's callbacks back into backstack mutations, and attach/destroy
//!   children as entries come and go.
//! - **Supervisor**: reacts to host create/start/stop/destroy, registers the
//!   session, and runs the sync/network reconciliation loop only while the
//!   host is visible.
//! - **Deep links**: land on a canonical stack and wait for the target child
//!   to attach.
//!
//! # Usage
//!
//! ```rust,ignore
//! use lantern_session::{SessionFlowConfig, SessionFlowController, SessionFlowInputs};
//!
//! let controller = SessionFlowController::new(
//!     SessionFlowConfig::load(None)?,
//!     SessionFlowInputs::new("@alice:example.org".into()),
//!     services,
//!     entry_points,
//! )?;
//! controller.on_create()?;
//! controller.on_start()?;
//! let room = controller.attach_room("!abc:example.org".into()).await?;
//! ```

#![forbid(unsafe_code)]

// =============================================================================
// Foundation
// =============================================================================

pub mod config;
pub mod errors;
pub mod ids;
pub mod services;

// =============================================================================
// Navigation and flow
// =============================================================================

pub mod flow;
pub mod navigation;

// =============================================================================
// Test support
// =============================================================================

#[cfg(any(test, feature = "testing"))]
pub mod testing;

pub use config::SessionFlowConfig;
pub use errors::{
    ConfigError, ErrorCategory, LifecycleError, NavigationError, RestoreError, SessionFlowError,
    SyncCommandError,
};
pub use flow::{
    LifecycleState, SessionFlowCallback, SessionFlowController, SessionFlowInputs, TaskScope,
};
pub use ids::{ControllerId, RoomId, SessionId, SpaceMarker};
pub use navigation::{
    BackStack, BackStackHandle, Destination, EntryKey, EntryPoints, MountedChild, Node, NodeRef,
    RoomInitialScreen, StackOperation, StackSnapshot,
};
pub use services::{
    NavigationStateRegistry, NetworkMonitor, NetworkStatus, NotificationDrawer, OnboardingGate,
    SessionEvent, SessionEventSource, SessionServices, SyncService, SyncState,
};
