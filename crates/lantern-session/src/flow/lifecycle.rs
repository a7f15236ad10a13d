//! Host lifecycle state machine.
//!
//! ```text
//! Initialized ──create──▶ Created ──start──▶ Started ◀──start── Stopped
//!                            │                  │ stop            ▲
//!                            │                  └─────────────────┘
//!                            └──────destroy (from Created/Started/Stopped)──▶ Destroyed
//! ```
//!
//! Destroyed is terminal.

use crate::errors::LifecycleError;

/// Lifecycle state of the controller
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum LifecycleState {
    /// Constructed, not yet created
    #[default]
    Initialized,
    /// Session registered, not visible
    Created,
    /// Visible; reconciliation running
    Started,
    /// Backgrounded; sync stopped
    Stopped,
    /// Torn down
    Destroyed,
}

/// Event delivered by the host
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum LifecycleEvent {
    /// Controller created
    Create,
    /// Host became visible
    Start,
    /// Host was backgrounded
    Stop,
    /// Controller torn down
    Destroy,
}

impl LifecycleState {
    /// Compute the state after `event`
    pub fn transition(self, event: LifecycleEvent) -> Result<LifecycleState, LifecycleError> {
        use LifecycleEvent as E;
        use LifecycleState as S;

        match (self, event) {
            (S::Initialized, E::Create) => Ok(S::Created),
            (S::Created | S::Stopped, E::Start) => Ok(S::Started),
            (S::Started, E::Stop) => Ok(S::Stopped),
            (S::Created | S::Started | S::Stopped, E::Destroy) => Ok(S::Destroyed),
            (from, event) => Err(LifecycleError::InvalidTransition { from, event }),
        }
    }

    /// Check if the state is terminal
    pub fn is_destroyed(&self) -> bool {
        matches!(self, LifecycleState::Destroyed)
    }

    /// Check if the host is in the visible window
    pub fn is_started(&self) -> bool {
        matches!(self, LifecycleState::Started)
    }
}
