//! Connectivity monitoring
//!
//! The monitor is the single source of truth for online/offline state. The
//! host supplies a `tokio::sync::watch` channel fed from whatever platform
//! reachability facility it has; the monitor mirrors the current value and
//! wakes drain triggers on every offline→online transition.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::sync::{watch, Notify};
use tokio::task::JoinHandle;
use tracing::debug;

/// Mirrors host connectivity state and signals online transitions
///
/// The monitor subscribes to the watch channel for its entire lifetime; the
/// background task is aborted when the monitor is dropped.
pub struct ConnectivityMonitor {
    online: Arc<AtomicBool>,
    online_edge: Arc<Notify>,
    task: JoinHandle<()>,
}

impl ConnectivityMonitor {
    /// Create a monitor from a host-supplied connectivity channel
    ///
    /// The channel's current value seeds the initial state.
    pub fn new(mut rx: watch::Receiver<bool>) -> Self {
        let online = Arc::new(AtomicBool::new(*rx.borrow()));
        let online_edge = Arc::new(Notify::new());

        let online_for_task = online.clone();
        let edge_for_task = online_edge.clone();
        let task = tokio::spawn(async move {
            while rx.changed().await.is_ok() {
                let now_online = *rx.borrow();
                let was_online = online_for_task.swap(now_online, Ordering::SeqCst);
                if now_online && !was_online {
                    debug!("Connectivity restored");
                    // notify_one stores a permit, so an edge that fires
                    // while no trigger task is waiting is not lost
                    edge_for_task.notify_one();
                } else if !now_online && was_online {
                    debug!("Connectivity lost");
                }
            }
        });

        Self {
            online,
            online_edge,
            task,
        }
    }

    /// Current connectivity state
    pub fn is_online(&self) -> bool {
        self.online.load(Ordering::SeqCst)
    }

    /// Wait for the next offline→online transition
    pub async fn online_edge(&self) {
        self.online_edge.notified().await;
    }
}

impl Drop for ConnectivityMonitor {
    fn drop(&mut self) {
        self.task.abort();
    }
}
