//! SyncQueue - the primary entry point for the offline operation queue
//!
//! SyncQueue composes the durable store, the operation registry, the
//! connectivity monitor, and the queue processor:
//! - Online calls go straight to the registered handler
//! - Offline calls (and online calls whose handler fails) are captured as
//!   queue items and replayed when connectivity returns
//!
//! # Example
//!
//! ```ignore
//! use syncqueue_core::{OperationRegistry, SyncQueue};
//! use tokio::sync::watch;
//!
//! let registry = OperationRegistry::builder()
//!     .operation("messages", "send", |args| async move {
//!         api::send_message(args).await
//!     })
//!     .build();
//!
//! // Connectivity fed from the platform's reachability facility
//! let (connectivity_tx, connectivity_rx) = watch::channel(true);
//!
//! let queue = SyncQueue::new("~/.myapp/data", registry, connectivity_rx).await?;
//!
//! match queue.perform(&"messages".into(), "send", vec!["user-42".into(), "hello".into()]).await? {
//!     Performed::Executed(result) => println!("sent: {result}"),
//!     Performed::Queued(id) => println!("offline, queued as {id}"),
//! }
//! ```

use std::path::Path;
use std::sync::Arc;

use serde_json::Value;
use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::config::QueueConfig;
use crate::connectivity::ConnectivityMonitor;
use crate::error::{QueueError, QueueResult};
use crate::events::QueueEvent;
use crate::processor::QueueProcessor;
use crate::registry::OperationRegistry;
use crate::store::QueueStore;
use crate::types::{Category, DeadLetter, ItemId, QueueItem};

/// Database file name within the data directory
const DB_FILE: &str = "syncqueue.redb";

/// Outcome of [`SyncQueue::perform`]
#[derive(Debug, Clone)]
pub enum Performed {
    /// The handler ran immediately and returned this value
    Executed(Value),
    /// Offline: the operation was captured for later replay
    Queued(ItemId),
}

/// Public entry point for capturing and replaying operations
///
/// Owns the background wiring: a connectivity monitor mirroring the host's
/// online/offline channel, and a trigger task that drains all queues on
/// every offline→online transition.
pub struct SyncQueue {
    processor: Arc<QueueProcessor>,
    connectivity: Arc<ConnectivityMonitor>,
    trigger_task: JoinHandle<()>,
}

impl SyncQueue {
    /// Create a queue with the default configuration
    ///
    /// # Errors
    ///
    /// Returns `QueueError::Io` if the data directory cannot be created,
    /// or a database error if the store cannot be initialized.
    pub async fn new(
        data_dir: impl AsRef<Path>,
        registry: OperationRegistry,
        connectivity_rx: watch::Receiver<bool>,
    ) -> QueueResult<Self> {
        Self::with_config(data_dir, registry, connectivity_rx, QueueConfig::default()).await
    }

    /// Create a queue with a custom configuration
    pub async fn with_config(
        data_dir: impl AsRef<Path>,
        registry: OperationRegistry,
        connectivity_rx: watch::Receiver<bool>,
        config: QueueConfig,
    ) -> QueueResult<Self> {
        let data_dir = data_dir.as_ref();
        info!(?data_dir, "Initializing SyncQueue");

        std::fs::create_dir_all(data_dir)?;
        let store = QueueStore::new(data_dir.join(DB_FILE))?;

        let connectivity = Arc::new(ConnectivityMonitor::new(connectivity_rx));
        let processor = Arc::new(QueueProcessor::new(
            store,
            registry,
            connectivity.clone(),
            config,
        ));

        // Drain everything whenever connectivity comes back
        let processor_for_task = processor.clone();
        let connectivity_for_task = connectivity.clone();
        let trigger_task = tokio::spawn(async move {
            loop {
                connectivity_for_task.online_edge().await;
                info!("Connectivity restored, draining queues");
                processor_for_task.drain_all().await;
            }
        });

        Ok(Self {
            processor,
            connectivity,
            trigger_task,
        })
    }

    /// Current connectivity state
    pub fn is_online(&self) -> bool {
        self.connectivity.is_online()
    }

    /// Subscribe to queue events
    ///
    /// Multiple subscribers can exist; events are broadcast to all.
    pub fn subscribe(&self) -> broadcast::Receiver<QueueEvent> {
        self.processor.subscribe()
    }

    /// Attempt an operation now if online, capturing it for replay
    /// otherwise.
    ///
    /// Online: the handler is resolved and invoked directly. If it fails,
    /// the operation is enqueued as a fallback so a transient failure still
    /// gets retried later, and the original error is returned.
    ///
    /// Offline: the operation is enqueued immediately and no handler runs.
    ///
    /// # Errors
    ///
    /// `QueueError::UnknownCategory` / `QueueError::UnknownOperation` when
    /// resolution fails on the direct (online) path.
    /// `QueueError::Handler` when the direct invocation fails (the
    /// operation has been enqueued by then).
    pub async fn perform(
        &self,
        category: &Category,
        operation: &str,
        arguments: Vec<Value>,
    ) -> QueueResult<Performed> {
        if !self.is_online() {
            let id = self.enqueue(category, operation, arguments).await?;
            return Ok(Performed::Queued(id));
        }

        let handler = self.processor.registry().resolve(category, operation)?;
        match handler(arguments.clone()).await {
            Ok(value) => Ok(Performed::Executed(value)),
            Err(e) => {
                warn!(
                    %category, operation, error = %e,
                    "Direct invocation failed, enqueueing for replay"
                );
                self.enqueue(category, operation, arguments).await?;
                Err(QueueError::Handler(e.to_string()))
            }
        }
    }

    /// Capture an operation for later replay without attempting it now.
    ///
    /// Category/operation are not validated here; resolution is deferred to
    /// processing time. If the queue was empty and the host is online, a
    /// drain pass is triggered in the background.
    pub async fn enqueue(
        &self,
        category: &Category,
        operation: &str,
        arguments: Vec<Value>,
    ) -> QueueResult<ItemId> {
        let enqueued = self.processor.enqueue(category, operation, arguments).await?;

        // Queue transitioned empty -> non-empty while online: trigger a pass
        if enqueued.queue_len == 1 && self.is_online() {
            let processor = self.processor.clone();
            let category = category.clone();
            tokio::spawn(async move {
                if let Err(e) = processor.drain(&category).await {
                    warn!(%category, error = %e, "Background drain failed");
                }
            });
        }

        Ok(enqueued.id)
    }

    /// Run a drain pass for a category now, subject to the same guards as
    /// automatic triggers.
    ///
    /// Returns `true` if a pass ran, `false` if it was a no-op (offline,
    /// already draining, or empty).
    pub async fn drain(&self, category: &Category) -> QueueResult<bool> {
        self.processor.drain(category).await
    }

    /// Empty a category's queue and dead letters (e.g. on logout)
    pub async fn clear(&self, category: &Category) -> QueueResult<()> {
        self.processor.clear(category).await
    }

    /// Snapshot of a category's queued items, in FIFO order
    pub async fn items(&self, category: &Category) -> QueueResult<Vec<QueueItem>> {
        self.processor.items(category).await
    }

    /// Number of items queued for a category
    pub async fn len(&self, category: &Category) -> QueueResult<usize> {
        self.processor.len(category).await
    }

    /// Whether any queued item in the category has a recorded failure
    ///
    /// This is the aggregate "some items failed to sync" signal for UI.
    pub async fn has_failed_items(&self, category: &Category) -> QueueResult<bool> {
        self.processor.has_failed_items(category).await
    }

    /// Items discarded after exhausting the attempt ceiling, with their
    /// last known errors
    pub async fn dead_letters(&self, category: &Category) -> QueueResult<Vec<DeadLetter>> {
        self.processor.dead_letters(category).await
    }

    /// Stop the background drain trigger
    pub fn shutdown(self) {
        info!("Shutting down SyncQueue");
        self.trigger_task.abort();
    }
}

impl Drop for SyncQueue {
    fn drop(&mut self) {
        self.trigger_task.abort();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tempfile::TempDir;

    fn echo_registry(calls: Arc<AtomicUsize>) -> OperationRegistry {
        OperationRegistry::builder()
            .operation("messages", "send", move |args| {
                let calls = calls.clone();
                async move {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Ok(json!(args))
                }
            })
            .build()
    }

    fn failing_registry() -> OperationRegistry {
        OperationRegistry::builder()
            .operation("messages", "send", |_args| async move {
                anyhow::bail!("server unavailable")
            })
            .build()
    }

    async fn create_queue(
        registry: OperationRegistry,
        online: bool,
    ) -> (SyncQueue, watch::Sender<bool>, TempDir) {
        let temp_dir = TempDir::new().unwrap();
        let (tx, rx) = watch::channel(online);
        let queue = SyncQueue::new(temp_dir.path(), registry, rx).await.unwrap();
        (queue, tx, temp_dir)
    }

    #[tokio::test(start_paused = true)]
    async fn test_online_direct_path_does_not_enqueue() {
        let calls = Arc::new(AtomicUsize::new(0));
        let (queue, _tx, _temp) = create_queue(echo_registry(calls.clone()), true).await;
        let category = Category::new("messages");

        let result = queue
            .perform(&category, "send", vec![json!("user-42"), json!("hello")])
            .await
            .unwrap();

        assert!(matches!(result, Performed::Executed(_)));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(queue.len(&category).await.unwrap(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_offline_capture_never_invokes_handler() {
        let calls = Arc::new(AtomicUsize::new(0));
        let (queue, _tx, _temp) = create_queue(echo_registry(calls.clone()), false).await;
        let category = Category::new("messages");

        let result = queue
            .perform(&category, "send", vec![json!("user-42"), json!("hello")])
            .await
            .unwrap();

        assert!(matches!(result, Performed::Queued(_)));
        assert_eq!(calls.load(Ordering::SeqCst), 0);
        assert_eq!(queue.len(&category).await.unwrap(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_fallback_enqueue_surfaces_original_error() {
        let (queue, _tx, _temp) = create_queue(failing_registry(), true).await;
        let category = Category::new("messages");

        let err = queue
            .perform(&category, "send", vec![json!("hi")])
            .await
            .unwrap_err();

        assert!(matches!(err, QueueError::Handler(_)));
        assert_eq!(err.to_string(), "Handler error: server unavailable");
        assert_eq!(queue.items(&category).await.unwrap().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_unknown_category_propagates_on_direct_path() {
        let calls = Arc::new(AtomicUsize::new(0));
        let (queue, _tx, _temp) = create_queue(echo_registry(calls), true).await;

        let err = queue
            .perform(&Category::new("profiles"), "update", vec![])
            .await
            .unwrap_err();
        assert!(matches!(err, QueueError::UnknownCategory(_)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_enqueue_skips_validation() {
        let calls = Arc::new(AtomicUsize::new(0));
        let (queue, _tx, _temp) = create_queue(echo_registry(calls), false).await;

        // Neither the category nor the operation is registered; enqueue
        // must still succeed because resolution is deferred
        let id = queue
            .enqueue(&Category::new("profiles"), "update", vec![])
            .await
            .unwrap();

        let items = queue.items(&Category::new("profiles")).await.unwrap();
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].id, id);
    }

    #[tokio::test(start_paused = true)]
    async fn test_clear_empties_category() {
        let calls = Arc::new(AtomicUsize::new(0));
        let (queue, _tx, _temp) = create_queue(echo_registry(calls), false).await;
        let category = Category::new("messages");

        queue.enqueue(&category, "send", vec![]).await.unwrap();
        queue.enqueue(&category, "send", vec![]).await.unwrap();
        queue.clear(&category).await.unwrap();

        assert_eq!(queue.len(&category).await.unwrap(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_is_online_mirrors_channel() {
        let calls = Arc::new(AtomicUsize::new(0));
        let (queue, tx, _temp) = create_queue(echo_registry(calls), false).await;

        assert!(!queue.is_online());
        tx.send(true).unwrap();
        tokio::task::yield_now().await;
        assert!(queue.is_online());
    }
}
