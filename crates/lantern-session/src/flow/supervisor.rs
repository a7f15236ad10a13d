//! Session lifecycle supervision.
//!
//! [`SessionLifecycleSupervisor`] reacts to host lifecycle events:
//!
//! - **create**: registers the session and its space, starts observing
//!   session events, and pushes onboarding when the gate says so.
//! - **start**: runs [`SyncReconciler`] in a child scope that lives exactly as
//!   long as the host is visible.
//! - **stop**: cancels that scope and stops sync. A later start waits until
//!   every stop issued before it has completed, so a stop can never land after
//!   the start that follows it.
//! - **destroy**: stops sync if still started, unregisters the space and then
//!   the session, and shuts every flow task down. Later calls are ignored.
//!
//! Sync stops run in their own scope, owned by the supervisor. Destroy leaves
//! them to finish; dropping the supervisor cancels whatever is still pending.
//! Hosts that must know the engine has stopped await
//! [`SessionLifecycleSupervisor::wait_for_stops`] before dropping.
//!
//! # Blocking Lock Usage
//!
//! Uses `parking_lot::Mutex` for the supervisor state because:
//! 1. Each lifecycle call holds it for a few field updates and spawns
//! 2. Lock is never held across `.await` points
//! 3. Host lifecycle callbacks are synchronous

use futures::StreamExt;
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;

use crate::errors::LifecycleError;
use crate::flow::callbacks::CallbackConsumers;
use crate::flow::lifecycle::{LifecycleEvent, LifecycleState};
use crate::flow::reconcile::SyncReconciler;
use crate::flow::scope::TaskScope;
use crate::ids::{ControllerId, SessionId, SpaceMarker};
use crate::navigation::backstack::StackOperation;
use crate::navigation::destination::Destination;
use crate::navigation::navigator::Navigator;
use crate::services::{SessionEvent, SessionServices, SyncService};

#[derive(Default)]
struct SupervisorState {
    lifecycle: LifecycleState,
    reconcile: Option<Arc<TaskScope>>,
    registered: bool,
}

/// Reacts to host lifecycle events
pub struct SessionLifecycleSupervisor {
    controller_id: ControllerId,
    session_id: SessionId,
    services: SessionServices,
    navigator: Navigator,
    consumers: CallbackConsumers,
    debounce_window: Duration,
    scope: Arc<TaskScope>,
    stop_scope: Arc<TaskScope>,
    stops_in_flight: Arc<watch::Sender<u32>>,
    state: Mutex<SupervisorState>,
}

impl SessionLifecycleSupervisor {
    /// Create a supervisor whose tasks live in `scope`
    pub fn new(
        controller_id: ControllerId,
        session_id: SessionId,
        services: SessionServices,
        navigator: Navigator,
        consumers: CallbackConsumers,
        debounce_window: Duration,
        scope: Arc<TaskScope>,
    ) -> Self {
        let (stops_in_flight, _stops_rx) = watch::channel(0);
        Self {
            controller_id,
            session_id,
            services,
            navigator,
            consumers,
            debounce_window,
            scope,
            stop_scope: TaskScope::root(format!("sync-stop:{controller_id}")),
            stops_in_flight: Arc::new(stops_in_flight),
            state: Mutex::new(SupervisorState::default()),
        }
    }

    /// Current lifecycle state
    pub fn lifecycle(&self) -> LifecycleState {
        self.state.lock().lifecycle
    }

    /// Check if a reconciliation scope is live
    pub fn is_reconciling(&self) -> bool {
        self.state
            .lock()
            .reconcile
            .as_ref()
            .is_some_and(|scope| !scope.is_shut_down())
    }

    /// Number of sync stops still running
    pub fn pending_stops(&self) -> u32 {
        *self.stops_in_flight.borrow()
    }

    /// Wait until every sync stop issued so far has completed
    pub async fn wait_for_stops(&self) {
        let mut stops = self.stops_in_flight.subscribe();
        let _ = stops.wait_for(|n| *n == 0).await;
    }

    /// Handle host creation
    pub fn on_create(&self) -> Result<(), LifecycleError> {
        let mut state = self.state.lock();
        if !Self::advance(&mut state, LifecycleEvent::Create)? {
            return Ok(());
        }

        let registry = &self.services.registry;
        registry.register_session(self.controller_id, &self.session_id);
        registry.register_space(self.controller_id, SpaceMarker::Main);
        state.registered = true;
        tracing::info!(
            controller = %self.controller_id,
            session = %self.session_id,
            "Session flow created"
        );

        self.observe_session_events();

        if *self.services.onboarding.should_show().borrow() {
            // A restored stack may already show it.
            tracing::debug!("Onboarding pending; showing first-time-use flow");
            self.navigator
                .dispatch(StackOperation::SingleTop(Destination::Ftue));
        }
        Ok(())
    }

    /// Handle the host becoming visible
    pub fn on_start(&self) -> Result<(), LifecycleError> {
        let mut state = self.state.lock();
        if !Self::advance(&mut state, LifecycleEvent::Start)? {
            return Ok(());
        }

        let reconcile = self.scope.child("reconcile");
        let reconciler = SyncReconciler::new(
            self.services.sync.clone(),
            self.services.network.clone(),
            self.debounce_window,
        );
        let mut stops = self.stops_in_flight.subscribe();
        reconcile.spawn(async move {
            if stops.wait_for(|n| *n == 0).await.is_err() {
                return;
            }
            reconciler.run().await;
        });
        state.reconcile = Some(reconcile);
        tracing::debug!("Sync reconciliation scope opened");
        Ok(())
    }

    /// Handle the host being backgrounded
    pub fn on_stop(&self) -> Result<(), LifecycleError> {
        let mut state = self.state.lock();
        if !Self::advance(&mut state, LifecycleEvent::Stop)? {
            return Ok(());
        }
        Self::close_reconcile(&mut state);

        self.issue_stop();
        Ok(())
    }

    /// Handle host teardown
    pub fn on_destroy(&self) -> Result<(), LifecycleError> {
        let mut state = self.state.lock();
        let was_started = state.lifecycle.is_started();
        if !Self::advance(&mut state, LifecycleEvent::Destroy)? {
            return Ok(());
        }
        Self::close_reconcile(&mut state);

        if was_started {
            self.issue_stop();
        }

        if std::mem::take(&mut state.registered) {
            let registry = &self.services.registry;
            registry.unregister_space(self.controller_id);
            registry.unregister_session(self.controller_id);
        }

        self.scope.shutdown();
        tracing::info!(controller = %self.controller_id, "Session flow destroyed");
        Ok(())
    }

    /// Apply a lifecycle event; `Ok(false)` means the supervisor is destroyed
    /// and the event is ignored
    fn advance(state: &mut SupervisorState, event: LifecycleEvent) -> Result<bool, LifecycleError> {
        if state.lifecycle.is_destroyed() {
            tracing::debug!(?event, "Lifecycle event after destroy ignored");
            return Ok(false);
        }
        state.lifecycle = state.lifecycle.transition(event)?;
        Ok(true)
    }

    /// Stop sync on the stop scope, counted by the restart barrier
    fn issue_stop(&self) {
        let sync = self.services.sync.clone();
        let stops = self.stops_in_flight.clone();
        stops.send_modify(|n| *n += 1);
        let spawned = self.stop_scope.spawn(async move {
            stop_sync(sync.as_ref()).await;
            stops.send_modify(|n| *n = n.saturating_sub(1));
        });
        if !spawned {
            self.stops_in_flight
                .send_modify(|n| *n = n.saturating_sub(1));
        }
    }

    fn close_reconcile(state: &mut SupervisorState) {
        if let Some(scope) = state.reconcile.take() {
            scope.shutdown();
        }
    }

    fn observe_session_events(&self) {
        let mut events = self.services.events.events();
        let navigator = self.navigator.clone();
        let consumers = self.consumers.clone();
        self.scope.spawn(async move {
            while let Some(event) = events.next().await {
                match event {
                    SessionEvent::VerificationRequested => {
                        tracing::debug!("Verification requested; showing verification");
                        navigator.dispatch(StackOperation::SingleTop(Destination::VerifySession));
                    }
                    other => consumers.session_event(&other),
                }
            }
        });
    }
}

impl Drop for SessionLifecycleSupervisor {
    fn drop(&mut self) {
        if self.pending_stops() > 0 {
            tracing::debug!(
                controller = %self.controller_id,
                pending = self.pending_stops(),
                "Supervisor dropped with sync stops pending"
            );
        }
        self.stop_scope.shutdown();
    }
}

async fn stop_sync(sync: &dyn SyncService) {
    if let Err(error) = sync.stop().await {
        tracing::warn!(%error, "Sync stop failed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ids::RoomId;
    use crate::navigation::attach::AttachRegistry;
    use crate::navigation::backstack::BackStack;
    use crate::navigation::navigator::NavigationPolicy;
    use crate::navigation::queue::BackStackHandle;
    use crate::services::SyncState;
    use crate::testing::{FakeServices, RecordingFlowCallback, RegistryCall, SyncCommand};
    use assert_matches::assert_matches;

    const WINDOW: Duration = Duration::from_millis(100);

    struct Fixture {
        fakes: FakeServices,
        navigator: Navigator,
        consumer: Arc<RecordingFlowCallback>,
        supervisor: SessionLifecycleSupervisor,
        controller_id: ControllerId,
    }

    fn fixture(fakes: FakeServices) -> Fixture {
        let navigator = Navigator::new(
            BackStackHandle::new(BackStack::new(Destination::RoomList).unwrap(), 16),
            AttachRegistry::new(),
            NavigationPolicy::Strict,
        );
        let consumers = CallbackConsumers::new();
        let consumer = RecordingFlowCallback::new();
        consumers.add(consumer.clone());
        let controller_id = ControllerId::new_random();
        let supervisor = SessionLifecycleSupervisor::new(
            controller_id,
            SessionId::new("@alice:example.org"),
            fakes.services(),
            navigator.clone(),
            consumers,
            WINDOW,
            TaskScope::root("supervisor-test"),
        );
        Fixture {
            fakes,
            navigator,
            consumer,
            supervisor,
            controller_id,
        }
    }

    #[tokio::test]
    async fn create_registers_session_before_space() {
        let fx = fixture(FakeServices::new());
        fx.supervisor.on_create().unwrap();

        assert_eq!(
            fx.fakes.registry.calls(),
            vec![
                RegistryCall::RegisterSession(
                    fx.controller_id,
                    SessionId::new("@alice:example.org")
                ),
                RegistryCall::RegisterSpace(fx.controller_id, SpaceMarker::Main),
            ]
        );
        assert_eq!(fx.navigator.backstack().top(), Destination::RoomList);
    }

    #[tokio::test]
    async fn create_pushes_onboarding_when_gate_is_open() {
        let fakes = FakeServices::new();
        fakes.onboarding.set(true);
        let fx = fixture(fakes);
        fx.supervisor.on_create().unwrap();
        assert_eq!(fx.navigator.backstack().top(), Destination::Ftue);
    }

    #[tokio::test(start_paused = true)]
    async fn start_reconciles_and_stop_cancels() {
        let fx = fixture(FakeServices::new());
        fx.supervisor.on_create().unwrap();
        fx.supervisor.on_start().unwrap();
        assert!(fx.supervisor.is_reconciling());

        tokio::time::sleep(WINDOW * 2).await;
        assert_eq!(fx.fakes.sync.commands(), vec![SyncCommand::Start]);

        fx.supervisor.on_stop().unwrap();
        assert!(!fx.supervisor.is_reconciling());
        tokio::time::sleep(WINDOW * 5).await;
        assert_eq!(
            fx.fakes.sync.commands(),
            vec![SyncCommand::Start, SyncCommand::Stop]
        );
        assert_eq!(fx.fakes.sync.current_state(), SyncState::Idle);
    }

    #[tokio::test(start_paused = true)]
    async fn restart_waits_for_pending_stop() {
        let fx = fixture(FakeServices::new());
        fx.supervisor.on_create().unwrap();
        fx.supervisor.on_start().unwrap();
        tokio::time::sleep(WINDOW * 2).await;

        fx.fakes.sync.set_stop_delay(WINDOW * 5);
        fx.supervisor.on_stop().unwrap();
        tokio::task::yield_now().await;
        fx.fakes.sync.set_state(SyncState::Error);
        fx.supervisor.on_start().unwrap();

        tokio::time::sleep(WINDOW * 3).await;
        assert_eq!(
            fx.fakes.sync.commands(),
            vec![SyncCommand::Start, SyncCommand::Stop]
        );

        tokio::time::sleep(WINDOW * 5).await;
        assert_eq!(
            fx.fakes.sync.commands(),
            vec![SyncCommand::Start, SyncCommand::Stop, SyncCommand::Start]
        );
        assert_eq!(fx.fakes.sync.current_state(), SyncState::Running);
    }

    #[tokio::test(start_paused = true)]
    async fn destroy_unregisters_once_in_order() {
        let fx = fixture(FakeServices::new());
        fx.supervisor.on_create().unwrap();
        fx.supervisor.on_start().unwrap();
        tokio::time::sleep(WINDOW * 2).await;

        fx.supervisor.on_destroy().unwrap();
        fx.supervisor.on_destroy().unwrap();
        fx.supervisor.on_start().unwrap();
        tokio::time::sleep(WINDOW).await;

        let calls = fx.fakes.registry.calls();
        assert_eq!(
            &calls[2..],
            &[
                RegistryCall::UnregisterSpace(fx.controller_id),
                RegistryCall::UnregisterSession(fx.controller_id),
            ]
        );
        assert_eq!(fx.fakes.sync.stop_calls(), 1);
        assert!(fx.supervisor.lifecycle().is_destroyed());
        assert!(!fx.supervisor.is_reconciling());
    }

    #[tokio::test(start_paused = true)]
    async fn destroy_does_not_abort_pending_stop() {
        let fx = fixture(FakeServices::new());
        fx.supervisor.on_create().unwrap();
        fx.supervisor.on_start().unwrap();
        tokio::time::sleep(WINDOW * 2).await;

        fx.fakes.sync.set_stop_delay(WINDOW * 3);
        fx.supervisor.on_stop().unwrap();
        tokio::task::yield_now().await;
        fx.supervisor.on_destroy().unwrap();

        assert_eq!(fx.supervisor.pending_stops(), 1);
        fx.supervisor.wait_for_stops().await;
        assert_eq!(fx.supervisor.pending_stops(), 0);
        assert_eq!(fx.fakes.sync.stop_calls(), 1);
        assert_eq!(fx.fakes.sync.current_state(), SyncState::Idle);
    }

    #[tokio::test(start_paused = true)]
    async fn dropping_supervisor_cancels_pending_stops() {
        let fx = fixture(FakeServices::new());
        fx.supervisor.on_create().unwrap();
        fx.supervisor.on_start().unwrap();
        tokio::time::sleep(WINDOW * 2).await;

        fx.fakes.sync.set_stop_delay(WINDOW * 10);
        fx.supervisor.on_stop().unwrap();
        tokio::task::yield_now().await;
        fx.supervisor.on_destroy().unwrap();
        let Fixture {
            fakes, supervisor, ..
        } = fx;
        drop(supervisor);

        tokio::time::sleep(WINDOW * 20).await;
        assert_eq!(fakes.sync.stop_calls(), 1);
        assert_eq!(fakes.sync.current_state(), SyncState::Running);
    }

    #[tokio::test]
    async fn invalid_transitions_are_reported() {
        let fx = fixture(FakeServices::new());
        assert_matches!(
            fx.supervisor.on_start(),
            Err(LifecycleError::InvalidTransition {
                from: LifecycleState::Initialized,
                event: LifecycleEvent::Start
            })
        );
    }

    #[tokio::test]
    async fn session_events_navigate_or_propagate() {
        let fx = fixture(FakeServices::new());
        fx.supervisor.on_create().unwrap();
        let mut snapshots = fx.navigator.backstack().watch();

        fx.fakes.events.emit(SessionEvent::RoomInviteReceived {
            room_id: RoomId::new("!inv"),
        });
        fx.fakes.events.emit(SessionEvent::VerificationRequested);

        snapshots
            .wait_for(|s| s.top().destination == Destination::VerifySession)
            .await
            .unwrap();
        assert_eq!(
            fx.consumer.events(),
            vec![SessionEvent::RoomInviteReceived {
                room_id: RoomId::new("!inv")
            }]
        );
    }
}
