//! # Destinations
//!
//! Typed identifiers for everything the logged-in flow can show. Each variant
//! carries only what is needed to resolve it again after the process is
//! recreated, so destinations serialize trivially.

use serde::{Deserialize, Serialize};

use crate::ids::RoomId;

/// Sub-screen a room flow opens on
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RoomInitialScreen {
    /// Message timeline
    #[default]
    Messages,
    /// Room details
    Details,
    /// Per-room notification settings
    NotificationSettings,
}

/// Where the logged-in flow is
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Destination {
    /// Always-mounted background session unit (never a backstack entry)
    Permanent,
    /// Room list (root)
    RoomList,
    /// A specific room
    Room {
        /// Room to open
        room_id: RoomId,
        /// Sub-screen the room opens on
        #[serde(default)]
        initial: RoomInitialScreen,
    },
    /// Preferences
    Settings,
    /// Room creation
    CreateRoom,
    /// Session verification
    VerifySession,
    /// Pending invites
    InviteList,
    /// First-run onboarding
    Ftue,
}

impl Destination {
    /// Room destination opening on the timeline
    pub fn room(room_id: impl Into<RoomId>) -> Self {
        Self::Room {
            room_id: room_id.into(),
            initial: RoomInitialScreen::Messages,
        }
    }

    /// Room destination opening on a chosen sub-screen
    pub fn room_at(room_id: impl Into<RoomId>, initial: RoomInitialScreen) -> Self {
        Self::Room {
            room_id: room_id.into(),
            initial,
        }
    }

    /// Get the display name for logs
    pub fn name(&self) -> &'static str {
        match self {
            Destination::Permanent => "Permanent",
            Destination::RoomList => "RoomList",
            Destination::Room { .. } => "Room",
            Destination::Settings => "Settings",
            Destination::CreateRoom => "CreateRoom",
            Destination::VerifySession => "VerifySession",
            Destination::InviteList => "InviteList",
            Destination::Ftue => "Ftue",
        }
    }

    /// Check if this destination may live in the backstack
    pub fn is_stackable(&self) -> bool {
        !matches!(self, Destination::Permanent)
    }

    /// Room id for room destinations
    pub fn room_id(&self) -> Option<&RoomId> {
        match self {
            Destination::Room { room_id, .. } => Some(room_id),
            _ => None,
        }
    }
}

impl From<RoomId> for Destination {
    fn from(room_id: RoomId) -> Self {
        Destination::room(room_id)
    }
}
