//! Structured task scopes.
//!
//! Every background task the session flow starts belongs to a [`TaskScope`].
//! Scopes form a tree: shutting a scope down shuts its children down first,
//! then aborts its own tasks, so nothing outlives the scope that owns it.
//!
//! # Blocking Lock Usage
//!
//! Uses `parking_lot::Mutex` for JoinHandle and child storage because:
//! 1. Operations are O(1) push or O(n) drain (shutdown only)
//! 2. Lock is never held across `.await` points
//! 3. No I/O or async work inside lock scope

use parking_lot::Mutex;
use std::future::Future;
use std::sync::Arc;
use tokio::sync::watch;
use tokio::task::JoinHandle;

/// A node in the task tree
#[derive(Debug)]
pub struct TaskScope {
    name: String,
    shutdown_tx: watch::Sender<bool>,
    handles: Mutex<Vec<JoinHandle<()>>>,
    children: Mutex<Vec<Arc<TaskScope>>>,
}

impl TaskScope {
    /// Create a root scope
    pub fn root(name: impl Into<String>) -> Arc<Self> {
        let (shutdown_tx, _shutdown_rx) = watch::channel(false);
        Arc::new(Self {
            name: name.into(),
            shutdown_tx,
            handles: Mutex::new(Vec::new()),
            children: Mutex::new(Vec::new()),
        })
    }

    /// Create a child scope cancelled together with this one.
    ///
    /// A child of an already shut down scope starts shut down.
    pub fn child(self: &Arc<Self>, name: impl Into<String>) -> Arc<Self> {
        let child = Self::root(format!("{}/{}", self.name, name.into()));
        if self.is_shut_down() {
            child.shutdown();
            return child;
        }
        let mut children = self.children.lock();
        children.retain(|c| !c.is_shut_down());
        children.push(child.clone());
        child
    }

    /// Scope name (path from the root)
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Check if the scope was shut down
    pub fn is_shut_down(&self) -> bool {
        *self.shutdown_tx.borrow()
    }

    /// Token that resolves when this scope shuts down
    pub fn token(&self) -> ScopeToken {
        ScopeToken {
            shutdown_rx: self.shutdown_tx.subscribe(),
        }
    }

    /// Spawn a task that stops at the next await after shutdown.
    ///
    /// Returns `false` (and drops the future) if the scope is already shut down.
    pub fn spawn<F>(&self, fut: F) -> bool
    where
        F: Future<Output = ()> + Send + 'static,
    {
        if self.is_shut_down() {
            tracing::debug!(scope = %self.name, "Scope shut down; task not spawned");
            return false;
        }
        let token = self.token();
        let handle = tokio::spawn(async move {
            tokio::select! {
                _ = token.cancelled() => {}
                _ = fut => {}
            }
        });
        let mut handles = self.handles.lock();
        handles.retain(|h| !h.is_finished());
        handles.push(handle);
        true
    }

    /// Number of tasks still running
    pub fn running_tasks(&self) -> usize {
        self.handles
            .lock()
            .iter()
            .filter(|h| !h.is_finished())
            .count()
    }

    /// Cancel children, then this scope's own tasks
    pub fn shutdown(&self) {
        let children: Vec<_> = self.children.lock().drain(..).collect();
        for child in children {
            child.shutdown();
        }
        if self.shutdown_tx.send_replace(true) {
            return;
        }
        tracing::debug!(scope = %self.name, "Scope shut down");
        for handle in self.handles.lock().drain(..) {
            handle.abort();
        }
    }
}

impl Drop for TaskScope {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// Cancellation signal of one scope
#[derive(Clone, Debug)]
pub struct ScopeToken {
    shutdown_rx: watch::Receiver<bool>,
}

impl ScopeToken {
    /// Resolves once the scope is shut down (immediately if it already is)
    pub async fn cancelled(&self) {
        let mut shutdown_rx = self.shutdown_rx.clone();
        loop {
            if *shutdown_rx.borrow_and_update() {
                return;
            }
            if shutdown_rx.changed().await.is_err() {
                return;
            }
        }
    }

    /// Non-blocking cancellation check
    pub fn is_cancelled(&self) -> bool {
        *self.shutdown_rx.borrow()
    }
}
