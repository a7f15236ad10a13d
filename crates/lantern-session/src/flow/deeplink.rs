//! Deep-link attachment.
//!
//! External entry points (notification taps, links, shortcuts) land on a
//! canonical stack: the room list at the bottom with the target above it.
//! Each call resolves to the attached child once the mounter has built it.

use std::future::Future;
use std::sync::Arc;

use crate::errors::NavigationError;
use crate::ids::{RoomId, SessionId};
use crate::navigation::destination::Destination;
use crate::navigation::navigator::Navigator;
use crate::navigation::node::MountedChild;
use crate::services::NotificationDrawer;

/// Sequences deep-link navigation and waits for the target child
#[derive(Clone)]
pub struct AttachSequencer {
    navigator: Navigator,
    notifications: Arc<dyn NotificationDrawer>,
}

impl AttachSequencer {
    /// Create a sequencer
    pub fn new(navigator: Navigator, notifications: Arc<dyn NotificationDrawer>) -> Self {
        Self {
            navigator,
            notifications,
        }
    }

    /// Land on the room list
    pub fn attach_root(
        &self,
    ) -> impl Future<Output = Result<MountedChild, NavigationError>> + Send + 'static {
        tracing::debug!("Attaching room list");
        self.navigator.navigate_and_attach(None)
    }

    /// Land on a room, above the room list
    pub fn attach_room(
        &self,
        room_id: RoomId,
    ) -> impl Future<Output = Result<MountedChild, NavigationError>> + Send + 'static {
        tracing::debug!(%room_id, "Attaching room");
        self.navigator
            .navigate_and_attach(Some(Destination::room(room_id)))
    }

    /// Land on the invite list, above the room list.
    ///
    /// Pending notifications for the session are cleared first, even when the
    /// invite list is already showing.
    pub fn attach_invite_list(
        &self,
        session_id: &SessionId,
    ) -> impl Future<Output = Result<MountedChild, NavigationError>> + Send + 'static {
        self.notifications.clear_pending_for_session(session_id);
        tracing::debug!(%session_id, "Attaching invite list");
        self.navigator
            .navigate_and_attach(Some(Destination::InviteList))
    }
}
