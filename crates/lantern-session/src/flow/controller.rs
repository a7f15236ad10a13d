//! Session flow controller.
//!
//! [`SessionFlowController`] is the public face of the logged-in flow. It owns
//! the backstack, mounts children for it, supervises sync for the host's
//! lifecycle, and exposes the deep-link entry points.
//!
//! Lifecycle methods are synchronous and must be called from inside a tokio
//! runtime, since they spawn the flow's background tasks.
//!
//! ```ignore
//! let controller = SessionFlowController::new(config, inputs, services, entry_points)?;
//! controller.on_create()?;
//! controller.on_start()?;
//! let invites = controller.attach_invite_list(controller.session_id()).await?;
//! ```

use parking_lot::Mutex;
use std::future::Future;
use std::sync::Arc;

use crate::config::SessionFlowConfig;
use crate::errors::{NavigationError, SessionFlowError};
use crate::flow::callbacks::{CallbackConsumers, SessionFlowCallback};
use crate::flow::deeplink::AttachSequencer;
use crate::flow::lifecycle::LifecycleState;
use crate::flow::scope::TaskScope;
use crate::flow::supervisor::SessionLifecycleSupervisor;
use crate::ids::{ControllerId, RoomId, SessionId};
use crate::navigation::attach::AttachRegistry;
use crate::navigation::backstack::{BackStack, StackOperation};
use crate::navigation::destination::Destination;
use crate::navigation::mount::{destroy_all, ChildMounter};
use crate::navigation::navigator::{NavigationPolicy, Navigator};
use crate::navigation::node::{BuildContext, MountedChild};
use crate::navigation::queue::BackStackHandle;
use crate::navigation::resolver::{DestinationResolver, EntryPoints, FlowCallbacks};
use crate::services::SessionServices;

/// Per-session construction inputs
#[derive(Clone, Debug)]
pub struct SessionFlowInputs {
    /// Session the flow shows
    pub session_id: SessionId,
    /// Backstack saved by a previous instance, if any
    pub persisted_state: Option<String>,
}

impl SessionFlowInputs {
    /// Inputs for a fresh flow
    pub fn new(session_id: SessionId) -> Self {
        Self {
            session_id,
            persisted_state: None,
        }
    }

    /// Restore the backstack from a saved blob
    pub fn with_persisted_state(mut self, blob: impl Into<String>) -> Self {
        self.persisted_state = Some(blob.into());
        self
    }
}

/// The logged-in session flow
pub struct SessionFlowController {
    id: ControllerId,
    session_id: SessionId,
    navigator: Navigator,
    sequencer: AttachSequencer,
    consumers: CallbackConsumers,
    supervisor: SessionLifecycleSupervisor,
    services: SessionServices,
    scope: Arc<TaskScope>,
    mounter: Mutex<Option<ChildMounter>>,
}

impl SessionFlowController {
    /// Build a controller.
    ///
    /// Unusable persisted state is discarded with a warning; the flow then
    /// starts from the room list.
    pub fn new(
        config: SessionFlowConfig,
        inputs: SessionFlowInputs,
        services: SessionServices,
        entry_points: EntryPoints,
    ) -> Result<Self, SessionFlowError> {
        config.validate()?;

        let id = ControllerId::new_random();
        let stack = BackStack::restore_or_initialize(
            inputs.persisted_state.as_deref(),
            Destination::RoomList,
        )?;
        let navigator = Navigator::new(
            BackStackHandle::new(stack, config.change_feed_capacity),
            AttachRegistry::new(),
            NavigationPolicy::from_strict(config.strict_navigation),
        );
        let scope = TaskScope::root(format!("session-flow:{id}"));
        let consumers = CallbackConsumers::new();

        let callbacks = Arc::new(FlowCallbacks::new(
            navigator.clone(),
            consumers.clone(),
            &scope,
        ));
        let resolver = Arc::new(DestinationResolver::new(
            BuildContext {
                controller_id: id,
                session_id: inputs.session_id.clone(),
            },
            entry_points,
            callbacks,
        ));
        let mounter = ChildMounter::new(resolver, navigator.clone());

        let sequencer = AttachSequencer::new(navigator.clone(), services.notifications.clone());
        let supervisor = SessionLifecycleSupervisor::new(
            id,
            inputs.session_id.clone(),
            services.clone(),
            navigator.clone(),
            consumers.clone(),
            config.sync_debounce(),
            scope.clone(),
        );

        tracing::debug!(
            controller = %id,
            session = %inputs.session_id,
            strict = config.strict_navigation,
            "Session flow controller built"
        );

        Ok(Self {
            id,
            session_id: inputs.session_id,
            navigator,
            sequencer,
            consumers,
            supervisor,
            services,
            scope,
            mounter: Mutex::new(Some(mounter)),
        })
    }

    /// Controller identity
    pub fn id(&self) -> ControllerId {
        self.id
    }

    /// Session the flow shows
    pub fn session_id(&self) -> &SessionId {
        &self.session_id
    }

    /// Current lifecycle state
    pub fn lifecycle(&self) -> LifecycleState {
        self.supervisor.lifecycle()
    }

    /// Register a consumer of flow callbacks
    pub fn add_callback(&self, callback: Arc<dyn SessionFlowCallback>) {
        self.consumers.add(callback);
    }

    /// The backstack
    pub fn backstack(&self) -> &BackStackHandle {
        self.navigator.backstack()
    }

    // ─── Lifecycle ───────────────────────────────────────────────────────

    /// Host created the flow
    pub fn on_create(&self) -> Result<(), SessionFlowError> {
        self.supervisor.on_create()?;
        if let Some(mounter) = self.mounter.lock().take() {
            self.scope.spawn(mounter.run());
        }
        Ok(())
    }

    /// Host became visible
    pub fn on_start(&self) -> Result<(), SessionFlowError> {
        Ok(self.supervisor.on_start()?)
    }

    /// Host was backgrounded
    pub fn on_stop(&self) -> Result<(), SessionFlowError> {
        Ok(self.supervisor.on_stop()?)
    }

    /// Wait for sync stops issued by `on_stop` or `on_destroy` to complete
    pub async fn wait_for_sync_stops(&self) {
        self.supervisor.wait_for_stops().await;
    }

    /// Host tore the flow down; every child is destroyed
    pub fn on_destroy(&self) -> Result<(), SessionFlowError> {
        self.supervisor.on_destroy()?;
        destroy_all(self.navigator.attachments().close());
        Ok(())
    }

    // ─── Navigation ──────────────────────────────────────────────────────

    /// Apply a backstack operation under the configured error policy
    pub fn navigate(&self, op: StackOperation) -> Result<u64, SessionFlowError> {
        self.ensure_alive()?;
        Ok(self.navigator.navigate(op)?)
    }

    /// System back: pops when there is history, otherwise returns `false`
    /// so the host can handle it
    pub fn on_back(&self) -> bool {
        if self.ensure_alive().is_err() {
            return false;
        }
        let popped = self.backstack().transaction(|tx| {
            if tx.stack().len() > 1 {
                tx.apply(StackOperation::Pop)?;
                Ok(true)
            } else {
                Ok(false)
            }
        });
        match popped {
            Ok((_, popped)) => popped,
            Err(error) => {
                tracing::warn!(%error, "Back navigation failed");
                false
            }
        }
    }

    /// Land on the room list and wait for it to attach
    pub fn attach_root(
        &self,
    ) -> impl Future<Output = Result<MountedChild, NavigationError>> + Send + 'static {
        let staged = self.ensure_mounting().map(|()| self.sequencer.attach_root());
        async move { staged?.await }
    }

    /// Land on a room and wait for it to attach
    pub fn attach_room(
        &self,
        room_id: RoomId,
    ) -> impl Future<Output = Result<MountedChild, NavigationError>> + Send + 'static {
        let staged = self
            .ensure_mounting()
            .map(|()| self.sequencer.attach_room(room_id));
        async move { staged?.await }
    }

    /// Clear pending notifications of `session_id`, land on the invite list
    /// and wait for it to attach
    pub fn attach_invite_list(
        &self,
        session_id: &SessionId,
    ) -> impl Future<Output = Result<MountedChild, NavigationError>> + Send + 'static {
        let staged = self
            .ensure_mounting()
            .map(|()| self.sequencer.attach_invite_list(session_id));
        async move { staged?.await }
    }

    /// Child of the current top entry, once attached
    pub fn active_child(&self) -> Option<MountedChild> {
        let key = self.backstack().snapshot().top().key;
        self.navigator.attachments().get(key)
    }

    /// Check if the permanent unit should be shown; hidden while onboarding is
    pub fn permanent_visible(&self) -> bool {
        !*self.services.onboarding.should_show().borrow()
    }

    /// Encode the backstack for persistence
    pub fn save_state(&self) -> Result<String, SessionFlowError> {
        self.backstack()
            .save_state()
            .map_err(|e| SessionFlowError::Persistence {
                message: e.to_string(),
            })
    }

    /// Attach waits need the mounter, which only runs from `on_create`
    fn ensure_mounting(&self) -> Result<(), NavigationError> {
        match self.supervisor.lifecycle() {
            LifecycleState::Initialized => Err(NavigationError::NotCreated),
            LifecycleState::Destroyed => Err(NavigationError::ControllerDestroyed),
            _ => Ok(()),
        }
    }

    fn ensure_alive(&self) -> Result<(), NavigationError> {
        if self.supervisor.lifecycle().is_destroyed() {
            Err(NavigationError::ControllerDestroyed)
        } else {
            Ok(())
        }
    }
}

impl Drop for SessionFlowController {
    fn drop(&mut self) {
        if !self.supervisor.lifecycle().is_destroyed() {
            tracing::debug!(controller = %self.id, "Controller dropped without destroy");
            self.scope.shutdown();
            destroy_all(self.navigator.attachments().close());
        }
    }
}

impl std::fmt::Debug for SessionFlowController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionFlowController")
            .field("id", &self.id)
            .field("session_id", &self.session_id)
            .field("lifecycle", &self.lifecycle())
            .field("backstack", &self.backstack().snapshot().destinations())
            .finish()
    }
}
