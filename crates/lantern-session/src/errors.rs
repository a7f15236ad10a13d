//! Categorized session flow errors
//!
//! Each concern gets its own error enum; [`SessionFlowError`] is the umbrella
//! returned from controller entry points. [`ErrorCategory`] tells callers how
//! an error is meant to be handled:
//! - programming errors surface loudly (strict mode) or recover to the room list
//! - transient errors are logged and retried by the next signal
//! - recoverable errors are absorbed where they happen

use std::fmt;

use crate::flow::lifecycle::{LifecycleEvent, LifecycleState};
use crate::navigation::destination::Destination;

// ============================================================================
// Error Categories
// ============================================================================

/// How an error is expected to be handled.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ErrorCategory {
    /// Bug in the caller (invalid navigation, missing feature wiring)
    Programming,
    /// Failure of an external command that a later signal retries
    Transient,
    /// Bad input that is discarded in favour of a default
    Recoverable,
    /// Invalid configuration
    Config,
}

impl ErrorCategory {
    /// Get a short label for this category.
    #[must_use]
    pub fn label(&self) -> &'static str {
        match self {
            Self::Programming => "Programming",
            Self::Transient => "Transient",
            Self::Recoverable => "Recoverable",
            Self::Config => "Config",
        }
    }

    /// Check if errors of this category should be retried rather than reported.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Transient)
    }
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

// ============================================================================
// Concern-specific errors
// ============================================================================

/// Navigation programming errors.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum NavigationError {
    /// Popping would leave the backstack empty
    #[error("cannot pop the last backstack entry")]
    EmptyPop,

    /// No feature is wired to build this destination
    #[error("no feature entry point resolves {destination:?}")]
    UnresolvableDestination {
        /// The destination that could not be resolved
        destination: Destination,
    },

    /// The permanent destination was offered to the backstack
    #[error("the permanent destination is mounted beside the backstack, never inside it")]
    PermanentInStack,

    /// An awaited entry left the backstack before its child attached
    #[error("{destination:?} left the backstack before it was attached")]
    AttachmentSuperseded {
        /// The destination that was awaited
        destination: Destination,
    },

    /// Children only attach once the controller has been created
    #[error("session flow controller is not created yet")]
    NotCreated,

    /// The controller has been destroyed
    #[error("session flow controller is destroyed")]
    ControllerDestroyed,
}

/// Failure of a sync engine command.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SyncCommandError {
    /// The sync engine refused or failed to start
    #[error("sync start failed: {reason}")]
    StartFailed {
        /// Reason reported by the sync engine
        reason: String,
    },

    /// The sync engine failed to stop
    #[error("sync stop failed: {reason}")]
    StopFailed {
        /// Reason reported by the sync engine
        reason: String,
    },
}

/// Persisted navigation state could not be restored.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RestoreError {
    /// The blob does not decode
    #[error("persisted backstack is malformed: {reason}")]
    Malformed {
        /// Decoder message
        reason: String,
    },

    /// The blob was written by an incompatible format version
    #[error("persisted backstack version {found} does not match {expected}")]
    VersionMismatch {
        /// Version found in the blob
        found: u32,
        /// Version this build writes
        expected: u32,
    },

    /// The blob holds no destinations
    #[error("persisted backstack is empty")]
    Empty,

    /// The blob lists the permanent destination as a stack entry
    #[error("persisted backstack contains the permanent destination")]
    ContainsPermanent,
}

/// Configuration loading and validation errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// The config file could not be read
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    /// The config file is not valid TOML for this schema
    #[error("invalid TOML: {0}")]
    Parse(#[from] toml::de::Error),

    /// A value is out of range
    #[error("invalid config value for {key}: {message}")]
    Invalid {
        /// Offending key
        key: &'static str,
        /// What is wrong with it
        message: String,
    },
}

/// Invalid lifecycle transition.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LifecycleError {
    /// The event is not valid in the current state
    #[error("lifecycle event {event:?} is not valid in state {from:?}")]
    InvalidTransition {
        /// State the controller was in
        from: LifecycleState,
        /// Event that was delivered
        event: LifecycleEvent,
    },
}

// ============================================================================
// Umbrella error
// ============================================================================

/// Error returned by [`crate::SessionFlowController`] entry points.
#[derive(Debug, thiserror::Error)]
pub enum SessionFlowError {
    /// Navigation programming error
    #[error(transparent)]
    Navigation(#[from] NavigationError),

    /// Sync command failure
    #[error(transparent)]
    Sync(#[from] SyncCommandError),

    /// Persisted state could not be restored
    #[error(transparent)]
    Restore(#[from] RestoreError),

    /// Configuration error
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// Lifecycle misuse
    #[error(transparent)]
    Lifecycle(#[from] LifecycleError),

    /// Navigation state could not be encoded
    #[error("failed to encode navigation state: {message}")]
    Persistence {
        /// Encoder message
        message: String,
    },
}

impl SessionFlowError {
    /// Get the handling category of this error.
    #[must_use]
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::Navigation(_) | Self::Lifecycle(_) | Self::Persistence { .. } => {
                ErrorCategory::Programming
            }
            Self::Sync(_) => ErrorCategory::Transient,
            Self::Restore(_) => ErrorCategory::Recoverable,
            Self::Config(_) => ErrorCategory::Config,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn categories_follow_taxonomy() {
        let nav: SessionFlowError = NavigationError::EmptyPop.into();
        assert_eq!(nav.category(), ErrorCategory::Programming);

        let sync: SessionFlowError = SyncCommandError::StartFailed {
            reason: "offline".into(),
        }
        .into();
        assert!(sync.category().is_transient());

        let restore: SessionFlowError = RestoreError::Empty.into();
        assert_eq!(restore.category(), ErrorCategory::Recoverable);
    }

    #[test]
    fn messages_name_the_destination() {
        let err = NavigationError::UnresolvableDestination {
            destination: Destination::Settings,
        };
        assert_eq!(err.to_string(), "no feature entry point resolves Settings");
    }
}
