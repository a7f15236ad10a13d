//! Sync/network reconciliation loop.
//!
//! While the host is started, this loop keeps the sync engine running when
//! the network allows it. It subscribes fresh to the sync state (debounced)
//! and connectivity streams, combines their latest values, and issues a start
//! command whenever sync is not running while the network is online.
//!
//! The loop never stops sync; that belongs to the supervisor when the host is
//! backgrounded. A failed start is logged and left for the next combined
//! event to retry.

use futures::stream::{self, StreamExt};
use std::sync::Arc;
use std::time::Duration;
use tokio_stream::wrappers::WatchStream;

use crate::flow::debounce::debounce;
use crate::services::{NetworkMonitor, NetworkStatus, SyncService, SyncState};

/// Decision for one combined state
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SyncDecision {
    /// Issue a start command
    Start,
    /// Leave the sync engine alone
    Hold,
}

/// Decide what to do for a combined (sync, network) state
pub fn decide(sync: SyncState, network: NetworkStatus) -> SyncDecision {
    if sync != SyncState::Running && network == NetworkStatus::Online {
        SyncDecision::Start
    } else {
        SyncDecision::Hold
    }
}

#[derive(Debug)]
enum Signal {
    Sync(SyncState),
    Network(NetworkStatus),
}

/// Combined latest values of both signals
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
struct Combined {
    sync: Option<SyncState>,
    network: Option<NetworkStatus>,
}

impl Combined {
    fn update(&mut self, signal: Signal) -> Option<(SyncState, NetworkStatus)> {
        match signal {
            Signal::Sync(state) => self.sync = Some(state),
            Signal::Network(status) => self.network = Some(status),
        }
        self.sync.zip(self.network)
    }
}

/// Reconciliation loop over a sync engine and a connectivity monitor
pub struct SyncReconciler {
    sync: Arc<dyn SyncService>,
    network: Arc<dyn NetworkMonitor>,
    debounce_window: Duration,
}

impl SyncReconciler {
    /// Create a reconciler
    pub fn new(
        sync: Arc<dyn SyncService>,
        network: Arc<dyn NetworkMonitor>,
        debounce_window: Duration,
    ) -> Self {
        Self {
            sync,
            network,
            debounce_window,
        }
    }

    /// Run until either input stream closes.
    ///
    /// Cancellation is the caller's job: run this inside a scope that is shut
    /// down when the host leaves the started window.
    pub async fn run(self) {
        let sync_states = debounce(WatchStream::new(self.sync.state()), self.debounce_window)
            .map(Signal::Sync);
        let network_states = WatchStream::new(self.network.status()).map(Signal::Network);
        let mut signals = stream::select(sync_states, network_states);

        tracing::debug!(
            debounce_ms = self.debounce_window.as_millis() as u64,
            "Sync reconciliation started"
        );

        let mut combined = Combined::default();
        while let Some(signal) = signals.next().await {
            let Some((sync, network)) = combined.update(signal) else {
                continue;
            };
            match decide(sync, network) {
                SyncDecision::Start => {
                    tracing::debug!(?sync, ?network, "Starting sync");
                    if let Err(error) = self.sync.start().await {
                        tracing::warn!(%error, "Sync start failed; waiting for next state change");
                    }
                }
                SyncDecision::Hold => {
                    tracing::trace!(?sync, ?network, "Sync left as is");
                }
            }
        }

        tracing::debug!("Sync reconciliation inputs closed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{FakeNetworkMonitor, FakeSyncService};

    const WINDOW: Duration = Duration::from_millis(100);

    #[test]
    fn decision_table() {
        use NetworkStatus::*;
        use SyncState::*;
        use NetworkStatus::Offline;

        assert_eq!(decide(Idle, Online), SyncDecision::Start);
        assert_eq!(decide(Error, Online), SyncDecision::Start);
        assert_eq!(decide(Terminated, Online), SyncDecision::Start);
        assert_eq!(decide(Running, Online), SyncDecision::Hold);
        assert_eq!(decide(Idle, Offline), SyncDecision::Hold);
        assert_eq!(decide(Running, Offline), SyncDecision::Hold);
    }

    fn spawn_loop(
        sync: &Arc<FakeSyncService>,
        network: &Arc<FakeNetworkMonitor>,
    ) -> tokio::task::JoinHandle<()> {
        let reconciler = SyncReconciler::new(sync.clone(), network.clone(), WINDOW);
        tokio::spawn(reconciler.run())
    }

    #[tokio::test(start_paused = true)]
    async fn starts_sync_when_idle_and_online() {
        let sync = FakeSyncService::new(SyncState::Idle);
        let network = FakeNetworkMonitor::new(NetworkStatus::Online);
        let task = spawn_loop(&sync, &network);

        tokio::time::sleep(WINDOW * 3).await;
        assert_eq!(sync.start_calls(), 1);
        assert_eq!(sync.current_state(), SyncState::Running);
        task.abort();
    }

    #[tokio::test(start_paused = true)]
    async fn offline_holds_until_online() {
        let sync = FakeSyncService::new(SyncState::Idle);
        let network = FakeNetworkMonitor::new(NetworkStatus::Offline);
        let task = spawn_loop(&sync, &network);

        tokio::time::sleep(WINDOW * 3).await;
        assert_eq!(sync.start_calls(), 0);

        network.set_status(NetworkStatus::Online);
        tokio::time::sleep(WINDOW).await;
        assert_eq!(sync.start_calls(), 1);
        task.abort();
    }

    #[tokio::test(start_paused = true)]
    async fn flapping_within_window_coalesces_into_one_start() {
        let sync = FakeSyncService::new(SyncState::Running);
        let network = FakeNetworkMonitor::new(NetworkStatus::Online);
        let task = spawn_loop(&sync, &network);
        tokio::time::sleep(WINDOW * 2).await;
        assert_eq!(sync.start_calls(), 0);

        for state in [SyncState::Error, SyncState::Idle, SyncState::Error] {
            sync.set_state(state);
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        tokio::time::sleep(WINDOW * 2).await;
        assert_eq!(sync.start_calls(), 1);
        task.abort();
    }

    #[tokio::test(start_paused = true)]
    async fn settling_on_running_issues_no_start() {
        let sync = FakeSyncService::new(SyncState::Idle);
        let network = FakeNetworkMonitor::new(NetworkStatus::Offline);
        let task = spawn_loop(&sync, &network);

        sync.set_state(SyncState::Idle);
        network.set_status(NetworkStatus::Online);
        tokio::time::sleep(Duration::from_millis(10)).await;
        sync.set_state(SyncState::Running);
        tokio::time::sleep(WINDOW * 3).await;

        assert_eq!(sync.start_calls(), 0);
        task.abort();
    }

    #[tokio::test(start_paused = true)]
    async fn failed_start_is_retried_on_next_change() {
        let sync = FakeSyncService::new(SyncState::Idle);
        sync.fail_next_starts(1);
        let network = FakeNetworkMonitor::new(NetworkStatus::Online);
        let task = spawn_loop(&sync, &network);

        tokio::time::sleep(WINDOW + WINDOW / 2).await;
        assert_eq!(sync.start_calls(), 1);
        assert_eq!(sync.current_state(), SyncState::Error);

        tokio::time::sleep(WINDOW * 2).await;
        assert_eq!(sync.start_calls(), 2);
        assert_eq!(sync.current_state(), SyncState::Running);
        assert!(!task.is_finished());
        task.abort();
    }
}
