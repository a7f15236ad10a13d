//! Lifecycle-scoped flow: supervision, sync reconciliation and deep links.

pub mod callbacks;
pub mod controller;
pub mod debounce;
pub mod deeplink;
pub mod lifecycle;
pub mod reconcile;
pub mod scope;
pub mod supervisor;

pub use callbacks::{CallbackConsumers, SessionFlowCallback};
pub use controller::{SessionFlowController, SessionFlowInputs};
pub use deeplink::AttachSequencer;
pub use lifecycle::{LifecycleEvent, LifecycleState};
pub use reconcile::{decide, SyncDecision, SyncReconciler};
pub use scope::{ScopeToken, TaskScope};
pub use supervisor::SessionLifecycleSupervisor;
