//! Shared setup for session flow integration tests.
//!
//! [`FlowEnv`] wires a [`SessionFlowController`] to the in-memory
//! collaborators and stub features from `lantern_session::testing`.

#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use lantern_session::testing::{FakeServices, RecordingFlowCallback, StubFeatures};
use lantern_session::{
    Destination, MountedChild, NavigationError, SessionFlowConfig, SessionFlowController,
    SessionFlowInputs, SessionId,
};

pub const SESSION: &str = "@alice:example.org";

/// Controller plus handles on everything it talks to
pub struct FlowEnv {
    pub controller: SessionFlowController,
    pub fakes: FakeServices,
    pub features: Arc<StubFeatures>,
    pub consumer: Arc<RecordingFlowCallback>,
}

impl FlowEnv {
    /// Fresh controller with default fakes, not yet created
    pub fn new() -> Self {
        Self::build(SessionFlowConfig::for_testing(), FakeServices::new(), None)
    }

    /// Fresh controller restored from `blob`
    pub fn restored(blob: &str) -> Self {
        Self::build(
            SessionFlowConfig::for_testing(),
            FakeServices::new(),
            Some(blob.to_string()),
        )
    }

    /// Controller over the given config and fakes
    pub fn build(config: SessionFlowConfig, fakes: FakeServices, persisted: Option<String>) -> Self {
        let features = StubFeatures::new();
        let mut inputs = SessionFlowInputs::new(SessionId::new(SESSION));
        if let Some(blob) = persisted {
            inputs = inputs.with_persisted_state(blob);
        }
        let controller =
            SessionFlowController::new(config, inputs, fakes.services(), features.entry_points())
                .expect("controller builds");
        let consumer = RecordingFlowCallback::new();
        controller.add_callback(consumer.clone());
        Self {
            controller,
            fakes,
            features,
            consumer,
        }
    }

    /// Create the flow and return it
    pub fn created(self) -> Self {
        self.controller.on_create().expect("create");
        self
    }

    /// Create and start the flow and return it
    pub fn started(self) -> Self {
        let env = self.created();
        env.controller.on_start().expect("start");
        env
    }

    pub fn session_id(&self) -> SessionId {
        SessionId::new(SESSION)
    }

    pub fn destinations(&self) -> Vec<Destination> {
        self.controller.backstack().snapshot().destinations()
    }

    pub fn top(&self) -> Destination {
        self.controller.backstack().top()
    }

    /// Wait until the current top entry has an attached child
    pub async fn top_attached(&self) -> Result<MountedChild, NavigationError> {
        wait_until(|| self.controller.active_child().is_some()).await;
        self.controller
            .active_child()
            .ok_or(NavigationError::ControllerDestroyed)
    }
}

/// Poll `done` every millisecond until it holds.
///
/// Sleeping rather than yielding lets paused-clock tests auto-advance.
pub async fn wait_until(mut done: impl FnMut() -> bool) {
    for _ in 0..1_000 {
        if done() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(1)).await;
    }
    panic!("condition not reached");
}
