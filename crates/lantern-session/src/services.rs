//! External collaborator contracts
//!
//! The session flow owns none of these; it observes and commands them through
//! the traits below. Concrete implementations live with the sync engine,
//! platform connectivity, notification and onboarding code. In-memory versions
//! for tests live in [`crate::testing`].
//!
//! Live values are exposed as `tokio::sync::watch` receivers: each subscriber
//! starts from the current value and sees later values coalesced.

use async_trait::async_trait;
use futures::stream::BoxStream;
use std::sync::Arc;
use tokio::sync::watch;

use crate::errors::SyncCommandError;
use crate::ids::{ControllerId, RoomId, SessionId, SpaceMarker};

/// State reported by the sync engine
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum SyncState {
    /// Not syncing, ready to start
    #[default]
    Idle,
    /// Actively syncing
    Running,
    /// Stopped on request
    Terminated,
    /// Failed; waiting to be restarted
    Error,
    /// Gave up because the server is unreachable
    Offline,
}

/// Connectivity reported by the platform
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum NetworkStatus {
    /// Network reachable
    Online,
    /// Network unreachable
    #[default]
    Offline,
}

/// Session-scoped event observed for the life of the session
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SessionEvent {
    /// Another device asked this session to verify
    VerificationRequested,
    /// A room invite arrived
    RoomInviteReceived {
        /// Room the invite is for
        room_id: RoomId,
    },
    /// The session was signed out remotely
    SessionLoggedOut,
}

/// Long-running sync process
#[async_trait]
pub trait SyncService: Send + Sync {
    /// Live sync state
    fn state(&self) -> watch::Receiver<SyncState>;

    /// Start syncing
    async fn start(&self) -> Result<(), SyncCommandError>;

    /// Stop syncing
    async fn stop(&self) -> Result<(), SyncCommandError>;
}

/// Platform connectivity
pub trait NetworkMonitor: Send + Sync {
    /// Live connectivity status
    fn status(&self) -> watch::Receiver<NetworkStatus>;
}

/// Registry that maps controllers to the session and space they show.
///
/// All calls are idempotent and fire-and-forget.
pub trait NavigationStateRegistry: Send + Sync {
    /// Record that `controller` shows `session`
    fn register_session(&self, controller: ControllerId, session: &SessionId);

    /// Record that `controller` shows `space`
    fn register_space(&self, controller: ControllerId, space: SpaceMarker);

    /// Forget the space shown by `controller`
    fn unregister_space(&self, controller: ControllerId);

    /// Forget the session shown by `controller`
    fn unregister_session(&self, controller: ControllerId);
}

/// Notification drawer bookkeeping
pub trait NotificationDrawer: Send + Sync {
    /// Clear pending notifications for a session
    fn clear_pending_for_session(&self, session: &SessionId);
}

/// Onboarding gate
pub trait OnboardingGate: Send + Sync {
    /// Live "should show onboarding now" flag
    fn should_show(&self) -> watch::Receiver<bool>;
}

/// Source of session-scoped events
pub trait SessionEventSource: Send + Sync {
    /// Subscribe to events from now on
    fn events(&self) -> BoxStream<'static, SessionEvent>;
}

/// Bundle of collaborators handed to the controller
#[derive(Clone)]
pub struct SessionServices {
    /// Sync engine
    pub sync: Arc<dyn SyncService>,
    /// Connectivity monitor
    pub network: Arc<dyn NetworkMonitor>,
    /// Navigation-state registry
    pub registry: Arc<dyn NavigationStateRegistry>,
    /// Notification drawer
    pub notifications: Arc<dyn NotificationDrawer>,
    /// Onboarding gate
    pub onboarding: Arc<dyn OnboardingGate>,
    /// Session event source
    pub events: Arc<dyn SessionEventSource>,
}
