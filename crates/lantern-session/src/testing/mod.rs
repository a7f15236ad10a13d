//! In-memory collaborators for tests and the session simulator.
//!
//! Every fake records what was asked of it so tests can assert on ordering,
//! and exposes setters that drive the live values the flow observes.

use async_trait::async_trait;
use futures::stream::{BoxStream, StreamExt};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, watch};
use tokio_stream::wrappers::BroadcastStream;

use crate::errors::SyncCommandError;
use crate::flow::callbacks::SessionFlowCallback;
use crate::ids::{ControllerId, RoomId, SessionId, SpaceMarker};
use crate::navigation::destination::{Destination, RoomInitialScreen};
use crate::navigation::node::{BuildContext, Node, NodeRef};
use crate::navigation::resolver::{
    CreateRoomCallbacks, CreateRoomEntryPoint, EntryPoints, InviteListCallbacks,
    InviteListEntryPoint, OnboardingCallbacks, OnboardingEntryPoint, PreferencesCallbacks,
    PreferencesEntryPoint, RoomFlowCallbacks, RoomFlowEntryPoint, RoomListCallbacks,
    RoomListEntryPoint, SessionEntryPoint, VerifySessionEntryPoint,
};
use crate::services::{
    NavigationStateRegistry, NetworkMonitor, NetworkStatus, NotificationDrawer, OnboardingGate,
    SessionEvent, SessionEventSource, SessionServices, SyncService, SyncState,
};

// ─── Sync engine ─────────────────────────────────────────────────────────

/// Command received by [`FakeSyncService`]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SyncCommand {
    /// `start()` was called
    Start,
    /// `stop()` was called
    Stop,
}

/// Sync engine that flips its state on command
pub struct FakeSyncService {
    state_tx: watch::Sender<SyncState>,
    commands: Mutex<Vec<SyncCommand>>,
    failing_starts: AtomicUsize,
    stop_delay: Mutex<Duration>,
}

impl FakeSyncService {
    /// Create an engine in `initial` state
    pub fn new(initial: SyncState) -> Arc<Self> {
        let (state_tx, _state_rx) = watch::channel(initial);
        Arc::new(Self {
            state_tx,
            commands: Mutex::new(Vec::new()),
            failing_starts: AtomicUsize::new(0),
            stop_delay: Mutex::new(Duration::ZERO),
        })
    }

    /// Publish a state as if the engine changed on its own
    pub fn set_state(&self, state: SyncState) {
        self.state_tx.send_replace(state);
    }

    /// Current published state
    pub fn current_state(&self) -> SyncState {
        *self.state_tx.borrow()
    }

    /// Make the next `n` start commands fail
    pub fn fail_next_starts(&self, n: usize) {
        self.failing_starts.store(n, Ordering::SeqCst);
    }

    /// Make stop commands take `delay` before completing
    pub fn set_stop_delay(&self, delay: Duration) {
        *self.stop_delay.lock() = delay;
    }

    /// Every command received, in order
    pub fn commands(&self) -> Vec<SyncCommand> {
        self.commands.lock().clone()
    }

    /// Number of start commands received
    pub fn start_calls(&self) -> usize {
        self.count(SyncCommand::Start)
    }

    /// Number of stop commands received
    pub fn stop_calls(&self) -> usize {
        self.count(SyncCommand::Stop)
    }

    fn count(&self, command: SyncCommand) -> usize {
        self.commands.lock().iter().filter(|c| **c == command).count()
    }
}

#[async_trait]
impl SyncService for FakeSyncService {
    fn state(&self) -> watch::Receiver<SyncState> {
        self.state_tx.subscribe()
    }

    async fn start(&self) -> Result<(), SyncCommandError> {
        self.commands.lock().push(SyncCommand::Start);
        let failing = self
            .failing_starts
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if failing {
            self.set_state(SyncState::Error);
            return Err(SyncCommandError::StartFailed {
                reason: "injected failure".to_string(),
            });
        }
        self.set_state(SyncState::Running);
        Ok(())
    }

    async fn stop(&self) -> Result<(), SyncCommandError> {
        self.commands.lock().push(SyncCommand::Stop);
        let delay = *self.stop_delay.lock();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        self.set_state(SyncState::Idle);
        Ok(())
    }
}

// ─── Connectivity ────────────────────────────────────────────────────────

/// Connectivity monitor driven by the test
pub struct FakeNetworkMonitor {
    status_tx: watch::Sender<NetworkStatus>,
}

impl FakeNetworkMonitor {
    /// Create a monitor reporting `initial`
    pub fn new(initial: NetworkStatus) -> Arc<Self> {
        let (status_tx, _status_rx) = watch::channel(initial);
        Arc::new(Self { status_tx })
    }

    /// Publish a new status
    pub fn set_status(&self, status: NetworkStatus) {
        self.status_tx.send_replace(status);
    }
}

impl NetworkMonitor for FakeNetworkMonitor {
    fn status(&self) -> watch::Receiver<NetworkStatus> {
        self.status_tx.subscribe()
    }
}

// ─── Navigation-state registry ───────────────────────────────────────────

/// Call received by [`RecordingRegistry`]
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum RegistryCall {
    /// `register_session`
    RegisterSession(ControllerId, SessionId),
    /// `register_space`
    RegisterSpace(ControllerId, SpaceMarker),
    /// `unregister_space`
    UnregisterSpace(ControllerId),
    /// `unregister_session`
    UnregisterSession(ControllerId),
}

/// Registry that records every call
#[derive(Default)]
pub struct RecordingRegistry {
    calls: Mutex<Vec<RegistryCall>>,
}

impl RecordingRegistry {
    /// Create an empty registry
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Calls received, in order
    pub fn calls(&self) -> Vec<RegistryCall> {
        self.calls.lock().clone()
    }
}

impl NavigationStateRegistry for RecordingRegistry {
    fn register_session(&self, controller: ControllerId, session: &SessionId) {
        self.calls
            .lock()
            .push(RegistryCall::RegisterSession(controller, session.clone()));
    }

    fn register_space(&self, controller: ControllerId, space: SpaceMarker) {
        self.calls
            .lock()
            .push(RegistryCall::RegisterSpace(controller, space));
    }

    fn unregister_space(&self, controller: ControllerId) {
        self.calls
            .lock()
            .push(RegistryCall::UnregisterSpace(controller));
    }

    fn unregister_session(&self, controller: ControllerId) {
        self.calls
            .lock()
            .push(RegistryCall::UnregisterSession(controller));
    }
}

// ─── Notifications / onboarding / events ─────────────────────────────────

/// Notification drawer that records clears
#[derive(Default)]
pub struct RecordingNotificationDrawer {
    cleared: Mutex<Vec<SessionId>>,
}

impl RecordingNotificationDrawer {
    /// Create an empty drawer
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Sessions cleared, in order
    pub fn cleared(&self) -> Vec<SessionId> {
        self.cleared.lock().clone()
    }
}

impl NotificationDrawer for RecordingNotificationDrawer {
    fn clear_pending_for_session(&self, session: &SessionId) {
        self.cleared.lock().push(session.clone());
    }
}

/// Onboarding gate with a settable flag
pub struct FakeOnboardingGate {
    show_tx: watch::Sender<bool>,
}

impl FakeOnboardingGate {
    /// Create a gate
    pub fn new(show: bool) -> Arc<Self> {
        let (show_tx, _show_rx) = watch::channel(show);
        Arc::new(Self { show_tx })
    }

    /// Change the flag
    pub fn set(&self, show: bool) {
        self.show_tx.send_replace(show);
    }
}

impl OnboardingGate for FakeOnboardingGate {
    fn should_show(&self) -> watch::Receiver<bool> {
        self.show_tx.subscribe()
    }
}

/// Event source fed through a broadcast channel
pub struct ChannelSessionEvents {
    tx: broadcast::Sender<SessionEvent>,
}

impl ChannelSessionEvents {
    /// Create a source
    pub fn new() -> Arc<Self> {
        let (tx, _rx) = broadcast::channel(32);
        Arc::new(Self { tx })
    }

    /// Emit an event; returns the number of subscribers that got it
    pub fn emit(&self, event: SessionEvent) -> usize {
        self.tx.send(event).unwrap_or(0)
    }

    /// Number of live subscribers
    pub fn subscribers(&self) -> usize {
        self.tx.receiver_count()
    }
}

impl SessionEventSource for ChannelSessionEvents {
    fn events(&self) -> BoxStream<'static, SessionEvent> {
        BroadcastStream::new(self.tx.subscribe())
            .filter_map(|event| async move { event.ok() })
            .boxed()
    }
}

/// All fakes, wired together
#[derive(Clone)]
pub struct FakeServices {
    /// Sync engine
    pub sync: Arc<FakeSyncService>,
    /// Connectivity
    pub network: Arc<FakeNetworkMonitor>,
    /// Navigation-state registry
    pub registry: Arc<RecordingRegistry>,
    /// Notification drawer
    pub notifications: Arc<RecordingNotificationDrawer>,
    /// Onboarding gate
    pub onboarding: Arc<FakeOnboardingGate>,
    /// Session events
    pub events: Arc<ChannelSessionEvents>,
}

impl FakeServices {
    /// Idle sync, online network, no onboarding
    pub fn new() -> Self {
        Self {
            sync: FakeSyncService::new(SyncState::Idle),
            network: FakeNetworkMonitor::new(NetworkStatus::Online),
            registry: RecordingRegistry::new(),
            notifications: RecordingNotificationDrawer::new(),
            onboarding: FakeOnboardingGate::new(false),
            events: ChannelSessionEvents::new(),
        }
    }

    /// Bundle for the controller
    pub fn services(&self) -> SessionServices {
        SessionServices {
            sync: self.sync.clone(),
            network: self.network.clone(),
            registry: self.registry.clone(),
            notifications: self.notifications.clone(),
            onboarding: self.onboarding.clone(),
            events: self.events.clone(),
        }
    }
}

impl Default for FakeServices {
    fn default() -> Self {
        Self::new()
    }
}

/// Flow consumer that records what it receives
#[derive(Default)]
pub struct RecordingFlowCallback {
    bug_reports: AtomicUsize,
    events: Mutex<Vec<SessionEvent>>,
}

impl RecordingFlowCallback {
    /// Create a consumer
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Number of bug report requests
    pub fn bug_reports(&self) -> usize {
        self.bug_reports.load(Ordering::SeqCst)
    }

    /// Events forwarded, in order
    pub fn events(&self) -> Vec<SessionEvent> {
        self.events.lock().clone()
    }
}

impl SessionFlowCallback for RecordingFlowCallback {
    fn on_open_bug_report(&self) {
        self.bug_reports.fetch_add(1, Ordering::SeqCst);
    }

    fn on_session_event(&self, event: &SessionEvent) {
        self.events.lock().push(event.clone());
    }
}

// ─── Features ────────────────────────────────────────────────────────────

/// Node that records its lifecycle
pub struct StubNode {
    destination: Destination,
    attach_delay: Duration,
    attached: AtomicBool,
    active: AtomicBool,
    destroyed: AtomicBool,
}

impl StubNode {
    /// Create a node for `destination`
    pub fn new(destination: Destination, attach_delay: Duration) -> Arc<Self> {
        Arc::new(Self {
            destination,
            attach_delay,
            attached: AtomicBool::new(false),
            active: AtomicBool::new(false),
            destroyed: AtomicBool::new(false),
        })
    }

    /// Destination the node was built for
    pub fn destination(&self) -> &Destination {
        &self.destination
    }

    /// Check if `on_attach` completed
    pub fn is_attached(&self) -> bool {
        self.attached.load(Ordering::SeqCst)
    }

    /// Check if the node is the active entry
    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::SeqCst)
    }

    /// Check if `on_destroy` ran
    pub fn is_destroyed(&self) -> bool {
        self.destroyed.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Node for StubNode {
    fn name(&self) -> &str {
        self.destination.name()
    }

    async fn on_attach(&self) {
        if !self.attach_delay.is_zero() {
            tokio::time::sleep(self.attach_delay).await;
        }
        self.attached.store(true, Ordering::SeqCst);
    }

    fn on_active(&self, active: bool) {
        self.active.store(active, Ordering::SeqCst);
    }

    fn on_destroy(&self) {
        self.active.store(false, Ordering::SeqCst);
        self.destroyed.store(true, Ordering::SeqCst);
    }
}

#[derive(Default)]
struct WiredCallbacks {
    room_list: Option<Arc<dyn RoomListCallbacks>>,
    room: Option<Arc<dyn RoomFlowCallbacks>>,
    preferences: Option<Arc<dyn PreferencesCallbacks>>,
    create_room: Option<Arc<dyn CreateRoomCallbacks>>,
    invite_list: Option<Arc<dyn InviteListCallbacks>>,
    onboarding: Option<Arc<dyn OnboardingCallbacks>>,
}

/// Every feature entry point, building [`StubNode`]s.
///
/// Keeps each node it builds and the latest callbacks handed to each feature
/// so tests can act as the child.
#[derive(Default)]
pub struct StubFeatures {
    built: Mutex<Vec<Arc<StubNode>>>,
    callbacks: Mutex<WiredCallbacks>,
    attach_delays: Mutex<HashMap<&'static str, Duration>>,
}

impl StubFeatures {
    /// Create the features
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Entry points backed by these features
    pub fn entry_points(self: &Arc<Self>) -> EntryPoints {
        EntryPoints::new()
            .with_session(self.clone())
            .with_room_list(self.clone())
            .with_room(self.clone())
            .with_preferences(self.clone())
            .with_create_room(self.clone())
            .with_verify_session(self.clone())
            .with_invite_list(self.clone())
            .with_onboarding(self.clone())
    }

    /// Delay `on_attach` of nodes built for destinations named `name`
    pub fn set_attach_delay(&self, name: &'static str, delay: Duration) {
        self.attach_delays.lock().insert(name, delay);
    }

    /// Every node built, in order
    pub fn built(&self) -> Vec<Arc<StubNode>> {
        self.built.lock().clone()
    }

    /// Latest node built for `destination`
    pub fn last_built(&self, destination: &Destination) -> Option<Arc<StubNode>> {
        self.built
            .lock()
            .iter()
            .rev()
            .find(|node| node.destination() == destination)
            .cloned()
    }

    /// Callbacks handed to the room list
    pub fn room_list_callbacks(&self) -> Option<Arc<dyn RoomListCallbacks>> {
        self.callbacks.lock().room_list.clone()
    }

    /// Callbacks handed to the latest room
    pub fn room_callbacks(&self) -> Option<Arc<dyn RoomFlowCallbacks>> {
        self.callbacks.lock().room.clone()
    }

    /// Callbacks handed to settings
    pub fn preferences_callbacks(&self) -> Option<Arc<dyn PreferencesCallbacks>> {
        self.callbacks.lock().preferences.clone()
    }

    /// Callbacks handed to room creation
    pub fn create_room_callbacks(&self) -> Option<Arc<dyn CreateRoomCallbacks>> {
        self.callbacks.lock().create_room.clone()
    }

    /// Callbacks handed to the invite list
    pub fn invite_list_callbacks(&self) -> Option<Arc<dyn InviteListCallbacks>> {
        self.callbacks.lock().invite_list.clone()
    }

    /// Callbacks handed to onboarding
    pub fn onboarding_callbacks(&self) -> Option<Arc<dyn OnboardingCallbacks>> {
        self.callbacks.lock().onboarding.clone()
    }

    fn make(&self, destination: Destination) -> NodeRef {
        let delay = self
            .attach_delays
            .lock()
            .get(destination.name())
            .copied()
            .unwrap_or(Duration::ZERO);
        let node = StubNode::new(destination, delay);
        self.built.lock().push(node.clone());
        node
    }
}

impl SessionEntryPoint for StubFeatures {
    fn build(&self, _ctx: &BuildContext) -> NodeRef {
        self.make(Destination::Permanent)
    }
}

impl RoomListEntryPoint for StubFeatures {
    fn build(&self, _ctx: &BuildContext, callbacks: Arc<dyn RoomListCallbacks>) -> NodeRef {
        self.callbacks.lock().room_list = Some(callbacks);
        self.make(Destination::RoomList)
    }
}

impl RoomFlowEntryPoint for StubFeatures {
    fn build(
        &self,
        _ctx: &BuildContext,
        room_id: &RoomId,
        initial: RoomInitialScreen,
        callbacks: Arc<dyn RoomFlowCallbacks>,
    ) -> NodeRef {
        self.callbacks.lock().room = Some(callbacks);
        self.make(Destination::room_at(room_id.clone(), initial))
    }
}

impl PreferencesEntryPoint for StubFeatures {
    fn build(&self, _ctx: &BuildContext, callbacks: Arc<dyn PreferencesCallbacks>) -> NodeRef {
        self.callbacks.lock().preferences = Some(callbacks);
        self.make(Destination::Settings)
    }
}

impl CreateRoomEntryPoint for StubFeatures {
    fn build(&self, _ctx: &BuildContext, callbacks: Arc<dyn CreateRoomCallbacks>) -> NodeRef {
        self.callbacks.lock().create_room = Some(callbacks);
        self.make(Destination::CreateRoom)
    }
}

impl VerifySessionEntryPoint for StubFeatures {
    fn build(&self, _ctx: &BuildContext) -> NodeRef {
        self.make(Destination::VerifySession)
    }
}

impl InviteListEntryPoint for StubFeatures {
    fn build(&self, _ctx: &BuildContext, callbacks: Arc<dyn InviteListCallbacks>) -> NodeRef {
        self.callbacks.lock().invite_list = Some(callbacks);
        self.make(Destination::InviteList)
    }
}

impl OnboardingEntryPoint for StubFeatures {
    fn build(&self, _ctx: &BuildContext, callbacks: Arc<dyn OnboardingCallbacks>) -> NodeRef {
        self.callbacks.lock().onboarding = Some(callbacks);
        self.make(Destination::Ftue)
    }
}
