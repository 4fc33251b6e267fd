//! Network reachability.

use std::sync::Arc;
use tokio::sync::watch;

/// Source of online/offline state.
pub trait ConnectivityObserver: Send + Sync {
    /// Whether the remote is currently reachable.
    fn is_online(&self) -> bool;

    /// A receiver that observes every online/offline transition.
    fn subscribe(&self) -> watch::Receiver<bool>;
}

/// In-process connectivity flag.
///
/// The platform's reachability listener calls [`set_online`]; the engine
/// and scheduler observe it. Clones share the same flag.
///
/// [`set_online`]: ConnectivityState::set_online
#[derive(Debug, Clone)]
pub struct ConnectivityState {
    tx: Arc<watch::Sender<bool>>,
}

impl ConnectivityState {
    /// Creates a flag with the given initial state.
    pub fn new(online: bool) -> Self {
        let (tx, _rx) = watch::channel(online);
        Self { tx: Arc::new(tx) }
    }

    /// Starts online.
    pub fn online() -> Self {
        Self::new(true)
    }

    /// Starts offline.
    pub fn offline() -> Self {
        Self::new(false)
    }

    /// Records a reachability change. Returns true if the state changed.
    pub fn set_online(&self, online: bool) -> bool {
        let changed = self.tx.send_if_modified(|current| {
            if *current == online {
                false
            } else {
                *current = online;
                true
            }
        });
        if changed {
            tracing::info!(online, "connectivity changed");
        }
        changed
    }
}

impl ConnectivityObserver for ConnectivityState {
    fn is_online(&self) -> bool {
        *self.tx.borrow()
    }

    fn subscribe(&self) -> watch::Receiver<bool> {
        self.tx.subscribe()
    }
}
