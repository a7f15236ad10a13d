//! Destination resolution.
//!
//! Each feature exposes an entry point that builds its node and a small
//! callback interface the node calls back into. [`DestinationResolver`] maps
//! a [`Destination`] to the matching entry point, hands it the flow's callback
//! implementation, and returns the node. Resolving has no side effects on the
//! backstack; the callbacks only mutate it later, when a child invokes them.
//!
//! ## Callback table
//!
//! | Destination | Callback                           | Effect                                   |
//! |-------------|------------------------------------|------------------------------------------|
//! | RoomList    | `on_room_clicked(id)`              | push `Room(id)`                          |
//! | RoomList    | `on_settings_clicked`              | push `Settings`                          |
//! | RoomList    | `on_create_room_clicked`           | push `CreateRoom`                        |
//! | RoomList    | `on_session_verification_clicked`  | push `VerifySession`                     |
//! | RoomList    | `on_invites_clicked`               | push `InviteList`                        |
//! | RoomList    | `on_room_settings_clicked(id)`     | push `Room(id)` opened on details        |
//! | RoomList    | `on_report_bug_clicked`            | consumers' `on_open_bug_report`          |
//! | Room        | `on_forward_to_another_room(id)`   | land on RoomList, push `Room(id)`, async |
//! | Settings    | `on_open_bug_report`               | consumers' `on_open_bug_report`          |
//! | Settings    | `on_verify_clicked`                | push `VerifySession`                     |
//! | CreateRoom  | `on_success(id)`                   | replace top with `Room(id)`              |
//! | InviteList  | `on_back_clicked`                  | pop                                      |
//! | InviteList  | `on_invite_accepted(id)`           | push `Room(id)`                          |
//! | Ftue        | `on_finished`                      | pop                                      |

use std::sync::{Arc, Weak};

use crate::errors::NavigationError;
use crate::flow::callbacks::CallbackConsumers;
use crate::flow::scope::TaskScope;
use crate::ids::RoomId;
use crate::navigation::backstack::StackOperation;
use crate::navigation::destination::{Destination, RoomInitialScreen};
use crate::navigation::navigator::Navigator;
use crate::navigation::node::{BuildContext, NodeRef};

// ─── Callback interfaces ─────────────────────────────────────────────────

/// Callbacks of the room list
pub trait RoomListCallbacks: Send + Sync {
    /// A room was opened
    fn on_room_clicked(&self, room_id: RoomId);
    /// Settings were opened
    fn on_settings_clicked(&self);
    /// Room creation was requested
    fn on_create_room_clicked(&self);
    /// Session verification was requested
    fn on_session_verification_clicked(&self);
    /// The invite list was opened
    fn on_invites_clicked(&self);
    /// A room's settings were opened
    fn on_room_settings_clicked(&self, room_id: RoomId);
    /// A bug report was requested
    fn on_report_bug_clicked(&self);
}

/// Callbacks of an open room
pub trait RoomFlowCallbacks: Send + Sync {
    /// Content should be forwarded to another room
    fn on_forward_to_another_room(&self, room_id: RoomId);
}

/// Callbacks of the settings screen
pub trait PreferencesCallbacks: Send + Sync {
    /// A bug report was requested
    fn on_open_bug_report(&self);
    /// Session verification was requested
    fn on_verify_clicked(&self);
}

/// Callbacks of the room creation flow
pub trait CreateRoomCallbacks: Send + Sync {
    /// The room was created
    fn on_success(&self, room_id: RoomId);
}

/// Callbacks of the invite list
pub trait InviteListCallbacks: Send + Sync {
    /// The user navigated back
    fn on_back_clicked(&self);
    /// An invite was accepted
    fn on_invite_accepted(&self, room_id: RoomId);
}

/// Callbacks of the first-time-use onboarding
pub trait OnboardingCallbacks: Send + Sync {
    /// Onboarding completed
    fn on_finished(&self);
}

// ─── Entry points ────────────────────────────────────────────────────────

/// Builds the background session unit
pub trait SessionEntryPoint: Send + Sync {
    /// Build the node
    fn build(&self, ctx: &BuildContext) -> NodeRef;
}

/// Builds the room list
pub trait RoomListEntryPoint: Send + Sync {
    /// Build the node
    fn build(&self, ctx: &BuildContext, callbacks: Arc<dyn RoomListCallbacks>) -> NodeRef;
}

/// Builds a single room's flow
pub trait RoomFlowEntryPoint: Send + Sync {
    /// Build the node for `room_id`, opened on `initial`
    fn build(
        &self,
        ctx: &BuildContext,
        room_id: &RoomId,
        initial: RoomInitialScreen,
        callbacks: Arc<dyn RoomFlowCallbacks>,
    ) -> NodeRef;
}

/// Builds the settings screen
pub trait PreferencesEntryPoint: Send + Sync {
    /// Build the node
    fn build(&self, ctx: &BuildContext, callbacks: Arc<dyn PreferencesCallbacks>) -> NodeRef;
}

/// Builds the room creation flow
pub trait CreateRoomEntryPoint: Send + Sync {
    /// Build the node
    fn build(&self, ctx: &BuildContext, callbacks: Arc<dyn CreateRoomCallbacks>) -> NodeRef;
}

/// Builds the session verification flow
pub trait VerifySessionEntryPoint: Send + Sync {
    /// Build the node
    fn build(&self, ctx: &BuildContext) -> NodeRef;
}

/// Builds the invite list
pub trait InviteListEntryPoint: Send + Sync {
    /// Build the node
    fn build(&self, ctx: &BuildContext, callbacks: Arc<dyn InviteListCallbacks>) -> NodeRef;
}

/// Builds the first-time-use onboarding
pub trait OnboardingEntryPoint: Send + Sync {
    /// Build the node
    fn build(&self, ctx: &BuildContext, callbacks: Arc<dyn OnboardingCallbacks>) -> NodeRef;
}

/// Feature entry points wired into the flow.
///
/// A destination whose entry point is missing cannot be resolved.
#[derive(Clone, Default)]
pub struct EntryPoints {
    /// Background session unit
    pub session: Option<Arc<dyn SessionEntryPoint>>,
    /// Room list
    pub room_list: Option<Arc<dyn RoomListEntryPoint>>,
    /// Room flow
    pub room: Option<Arc<dyn RoomFlowEntryPoint>>,
    /// Settings
    pub preferences: Option<Arc<dyn PreferencesEntryPoint>>,
    /// Room creation
    pub create_room: Option<Arc<dyn CreateRoomEntryPoint>>,
    /// Session verification
    pub verify_session: Option<Arc<dyn VerifySessionEntryPoint>>,
    /// Invite list
    pub invite_list: Option<Arc<dyn InviteListEntryPoint>>,
    /// Onboarding
    pub onboarding: Option<Arc<dyn OnboardingEntryPoint>>,
}

impl EntryPoints {
    /// No entry points
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the background session unit
    pub fn with_session(mut self, entry: Arc<dyn SessionEntryPoint>) -> Self {
        self.session = Some(entry);
        self
    }

    /// Set the room list
    pub fn with_room_list(mut self, entry: Arc<dyn RoomListEntryPoint>) -> Self {
        self.room_list = Some(entry);
        self
    }

    /// Set the room flow
    pub fn with_room(mut self, entry: Arc<dyn RoomFlowEntryPoint>) -> Self {
        self.room = Some(entry);
        self
    }

    /// Set the settings screen
    pub fn with_preferences(mut self, entry: Arc<dyn PreferencesEntryPoint>) -> Self {
        self.preferences = Some(entry);
        self
    }

    /// Set the room creation flow
    pub fn with_create_room(mut self, entry: Arc<dyn CreateRoomEntryPoint>) -> Self {
        self.create_room = Some(entry);
        self
    }

    /// Set the verification flow
    pub fn with_verify_session(mut self, entry: Arc<dyn VerifySessionEntryPoint>) -> Self {
        self.verify_session = Some(entry);
        self
    }

    /// Set the invite list
    pub fn with_invite_list(mut self, entry: Arc<dyn InviteListEntryPoint>) -> Self {
        self.invite_list = Some(entry);
        self
    }

    /// Set the onboarding flow
    pub fn with_onboarding(mut self, entry: Arc<dyn OnboardingEntryPoint>) -> Self {
        self.onboarding = Some(entry);
        self
    }
}

// ─── Flow callbacks ──────────────────────────────────────────────────────

/// The flow's implementation of every child callback interface
pub struct FlowCallbacks {
    navigator: Navigator,
    consumers: CallbackConsumers,
    scope: Weak<TaskScope>,
}

impl FlowCallbacks {
    /// Create callbacks that navigate through `navigator` and spawn
    /// asynchronous navigation on `scope`
    pub fn new(navigator: Navigator, consumers: CallbackConsumers, scope: &Arc<TaskScope>) -> Self {
        Self {
            navigator,
            consumers,
            scope: Arc::downgrade(scope),
        }
    }

    fn push(&self, destination: Destination) {
        self.navigator.dispatch(StackOperation::Push(destination));
    }
}

impl RoomListCallbacks for FlowCallbacks {
    fn on_room_clicked(&self, room_id: RoomId) {
        self.push(Destination::room(room_id));
    }

    fn on_settings_clicked(&self) {
        self.push(Destination::Settings);
    }

    fn on_create_room_clicked(&self) {
        self.push(Destination::CreateRoom);
    }

    fn on_session_verification_clicked(&self) {
        self.push(Destination::VerifySession);
    }

    fn on_invites_clicked(&self) {
        self.push(Destination::InviteList);
    }

    fn on_room_settings_clicked(&self, room_id: RoomId) {
        self.push(Destination::room_at(room_id, RoomInitialScreen::Details));
    }

    fn on_report_bug_clicked(&self) {
        self.consumers.open_bug_report();
    }
}

impl RoomFlowCallbacks for FlowCallbacks {
    fn on_forward_to_another_room(&self, room_id: RoomId) {
        let Some(scope) = self.scope.upgrade() else {
            tracing::debug!(%room_id, "Flow is gone; forward dropped");
            return;
        };
        let navigator = self.navigator.clone();
        scope.spawn(async move {
            let target = Destination::room(room_id);
            if let Err(error) = navigator.navigate_and_attach(Some(target)).await {
                tracing::warn!(%error, "Forward to room did not complete");
            }
        });
    }
}

impl PreferencesCallbacks for FlowCallbacks {
    fn on_open_bug_report(&self) {
        self.consumers.open_bug_report();
    }

    fn on_verify_clicked(&self) {
        self.push(Destination::VerifySession);
    }
}

impl CreateRoomCallbacks for FlowCallbacks {
    fn on_success(&self, room_id: RoomId) {
        self.navigator
            .dispatch(StackOperation::Replace(Destination::room(room_id)));
    }
}

impl InviteListCallbacks for FlowCallbacks {
    fn on_back_clicked(&self) {
        self.navigator.dispatch(StackOperation::Pop);
    }

    fn on_invite_accepted(&self, room_id: RoomId) {
        self.push(Destination::room(room_id));
    }
}

impl OnboardingCallbacks for FlowCallbacks {
    fn on_finished(&self) {
        self.navigator.dispatch(StackOperation::Pop);
    }
}

// ─── Resolver ────────────────────────────────────────────────────────────

/// Maps destinations to built nodes
pub struct DestinationResolver {
    ctx: BuildContext,
    entry_points: EntryPoints,
    callbacks: Arc<FlowCallbacks>,
}

impl DestinationResolver {
    /// Create a resolver
    pub fn new(ctx: BuildContext, entry_points: EntryPoints, callbacks: Arc<FlowCallbacks>) -> Self {
        Self {
            ctx,
            entry_points,
            callbacks,
        }
    }

    /// Build the node for a destination
    pub fn resolve(&self, destination: &Destination) -> Result<NodeRef, NavigationError> {
        let missing = || NavigationError::UnresolvableDestination {
            destination: destination.clone(),
        };
        let ep = &self.entry_points;
        let ctx = &self.ctx;

        let node = match destination {
            Destination::Permanent => ep.session.as_ref().ok_or_else(missing)?.build(ctx),
            Destination::RoomList => ep
                .room_list
                .as_ref()
                .ok_or_else(missing)?
                .build(ctx, self.callbacks.clone()),
            Destination::Room { room_id, initial } => ep.room.as_ref().ok_or_else(missing)?.build(
                ctx,
                room_id,
                *initial,
                self.callbacks.clone(),
            ),
            Destination::Settings => ep
                .preferences
                .as_ref()
                .ok_or_else(missing)?
                .build(ctx, self.callbacks.clone()),
            Destination::CreateRoom => ep
                .create_room
                .as_ref()
                .ok_or_else(missing)?
                .build(ctx, self.callbacks.clone()),
            Destination::VerifySession => {
                ep.verify_session.as_ref().ok_or_else(missing)?.build(ctx)
            }
            Destination::InviteList => ep
                .invite_list
                .as_ref()
                .ok_or_else(missing)?
                .build(ctx, self.callbacks.clone()),
            Destination::Ftue => ep
                .onboarding
                .as_ref()
                .ok_or_else(missing)?
                .build(ctx, self.callbacks.clone()),
        };
        tracing::trace!(destination = destination.name(), node = node.name(), "Resolved");
        Ok(node)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ids::{ControllerId, SessionId};
    use crate::navigation::attach::AttachRegistry;
    use crate::navigation::backstack::BackStack;
    use crate::navigation::navigator::NavigationPolicy;
    use crate::navigation::queue::BackStackHandle;
    use crate::testing::{RecordingFlowCallback, StubFeatures};
    use assert_matches::assert_matches;

    impl std::fmt::Debug for dyn crate::navigation::node::Node {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            f.debug_tuple("Node").field(&self.name()).finish()
        }
    }

    struct Fixture {
        features: Arc<StubFeatures>,
        resolver: DestinationResolver,
        navigator: Navigator,
        bug_reports: Arc<RecordingFlowCallback>,
        _scope: Arc<TaskScope>,
    }

    fn fixture(entry_points: impl FnOnce(&Arc<StubFeatures>) -> EntryPoints) -> Fixture {
        let navigator = Navigator::new(
            BackStackHandle::new(BackStack::new(Destination::RoomList).unwrap(), 16),
            AttachRegistry::new(),
            NavigationPolicy::Strict,
        );
        let consumers = CallbackConsumers::new();
        let bug_reports = RecordingFlowCallback::new();
        consumers.add(bug_reports.clone());
        let scope = TaskScope::root("resolver-test");
        let callbacks = Arc::new(FlowCallbacks::new(
            navigator.clone(),
            consumers,
            &scope,
        ));
        let features = StubFeatures::new();
        let ctx = BuildContext {
            controller_id: ControllerId::new_random(),
            session_id: SessionId::new("@alice:example.org"),
        };
        Fixture {
            resolver: DestinationResolver::new(ctx, entry_points(&features), callbacks),
            features,
            navigator,
            bug_reports,
            _scope: scope,
        }
    }

    fn top(fx: &Fixture) -> Destination {
        fx.navigator.backstack().top()
    }

    #[test]
    fn missing_entry_point_is_an_error() {
        let fx = fixture(|_| EntryPoints::new());
        assert_matches!(
            fx.resolver.resolve(&Destination::Settings),
            Err(NavigationError::UnresolvableDestination {
                destination: Destination::Settings
            })
        );
    }

    #[test]
    fn resolving_does_not_touch_the_backstack() {
        let fx = fixture(StubFeatures::entry_points);
        for destination in [
            Destination::Permanent,
            Destination::RoomList,
            Destination::room("!a"),
            Destination::Settings,
            Destination::CreateRoom,
            Destination::VerifySession,
            Destination::InviteList,
            Destination::Ftue,
        ] {
            let node = fx.resolver.resolve(&destination).unwrap();
            assert_eq!(node.name(), destination.name());
        }
        assert_eq!(fx.navigator.backstack().snapshot().version, 0);
    }

    #[test]
    fn room_list_callbacks_push_destinations() {
        let fx = fixture(StubFeatures::entry_points);
        fx.resolver.resolve(&Destination::RoomList).unwrap();
        let callbacks = fx.features.room_list_callbacks().unwrap();

        callbacks.on_room_clicked(RoomId::new("!a"));
        assert_eq!(top(&fx), Destination::room("!a"));
        callbacks.on_settings_clicked();
        assert_eq!(top(&fx), Destination::Settings);
        callbacks.on_create_room_clicked();
        assert_eq!(top(&fx), Destination::CreateRoom);
        callbacks.on_session_verification_clicked();
        assert_eq!(top(&fx), Destination::VerifySession);
        callbacks.on_invites_clicked();
        assert_eq!(top(&fx), Destination::InviteList);
        callbacks.on_room_settings_clicked(RoomId::new("!b"));
        assert_eq!(
            top(&fx),
            Destination::room_at("!b", RoomInitialScreen::Details)
        );

        callbacks.on_report_bug_clicked();
        assert_eq!(fx.bug_reports.bug_reports(), 1);
    }

    #[test]
    fn create_room_success_replaces_top() {
        let fx = fixture(StubFeatures::entry_points);
        fx.navigator
            .navigate(StackOperation::Push(Destination::CreateRoom))
            .unwrap();
        fx.resolver.resolve(&Destination::CreateRoom).unwrap();

        fx.features
            .create_room_callbacks()
            .unwrap()
            .on_success(RoomId::new("!new"));
        assert_eq!(
            fx.navigator.backstack().snapshot().destinations(),
            vec![Destination::RoomList, Destination::room("!new")]
        );
    }

    #[test]
    fn invite_list_and_onboarding_callbacks() {
        let fx = fixture(StubFeatures::entry_points);
        fx.resolver.resolve(&Destination::InviteList).unwrap();
        fx.resolver.resolve(&Destination::Ftue).unwrap();

        fx.navigator
            .navigate(StackOperation::Push(Destination::InviteList))
            .unwrap();
        let invites = fx.features.invite_list_callbacks().unwrap();
        invites.on_invite_accepted(RoomId::new("!joined"));
        assert_eq!(top(&fx), Destination::room("!joined"));
        fx.navigator.navigate(StackOperation::Pop).unwrap();
        invites.on_back_clicked();
        assert_eq!(top(&fx), Destination::RoomList);

        fx.navigator
            .navigate(StackOperation::Push(Destination::Ftue))
            .unwrap();
        fx.features.onboarding_callbacks().unwrap().on_finished();
        assert_eq!(top(&fx), Destination::RoomList);
    }

    #[test]
    fn settings_callbacks() {
        let fx = fixture(StubFeatures::entry_points);
        fx.resolver.resolve(&Destination::Settings).unwrap();
        let prefs = fx.features.preferences_callbacks().unwrap();

        prefs.on_verify_clicked();
        assert_eq!(top(&fx), Destination::VerifySession);
        prefs.on_open_bug_report();
        assert_eq!(fx.bug_reports.bug_reports(), 1);
    }

    #[tokio::test]
    async fn forward_lands_through_room_list() {
        let fx = fixture(StubFeatures::entry_points);
        fx.navigator
            .navigate(StackOperation::Push(Destination::room("!one")))
            .unwrap();
        fx.resolver.resolve(&Destination::room("!one")).unwrap();

        fx.features
            .room_callbacks()
            .unwrap()
            .on_forward_to_another_room(RoomId::new("!two"));
        // Forwarding is asynchronous; the stack is unchanged until the task runs.
        assert_eq!(top(&fx), Destination::room("!one"));

        let mut snapshots = fx.navigator.backstack().watch();
        snapshots
            .wait_for(|s| s.top().destination == Destination::room("!two"))
            .await
            .unwrap();
        assert_eq!(
            fx.navigator.backstack().snapshot().destinations(),
            vec![Destination::RoomList, Destination::room("!two")]
        );
    }
}
