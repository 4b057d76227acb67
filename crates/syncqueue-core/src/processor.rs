//! Queue processor: drain scheduling, retry policy, and concurrency control
//!
//! The processor owns the in-memory queue state for every category and
//! drives replay passes over it. Each category moves through a small state
//! machine:
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │  Per-category drain state                                       │
//! │                                                                 │
//! │        trigger (online edge, enqueue, manual)                   │
//! │  Idle ────────────────────────────────────────▶ Draining        │
//! │    ▲                                               │            │
//! │    └───────────── last snapshot item ──────────────┘            │
//! │                                                                 │
//! │  A trigger while Draining is a no-op: at most one pass per      │
//! │  category at any time.                                          │
//! └─────────────────────────────────────────────────────────────────┘
//! ```
//!
//! A pass operates on the snapshot of item ids taken at its start; items
//! enqueued mid-pass wait for the next trigger. A per-item failure is
//! recorded and the pass moves on, so one poisoned item never blocks the
//! rest of the queue.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use serde_json::Value;
use tokio::sync::{broadcast, RwLock};
use tracing::{debug, error, info, warn};

use crate::config::QueueConfig;
use crate::connectivity::ConnectivityMonitor;
use crate::error::QueueResult;
use crate::events::QueueEvent;
use crate::registry::OperationRegistry;
use crate::store::QueueStore;
use crate::types::{Category, DeadLetter, ItemId, QueueItem};

/// In-memory state for one category's queue
struct CategoryQueue {
    /// Items in FIFO order; the durable store mirrors this list
    items: Vec<QueueItem>,
    /// Drain guard: true while a pass is running
    draining: Arc<AtomicBool>,
}

/// Resets the drain flag when a pass ends, on every exit path
struct DrainGuard(Arc<AtomicBool>);

impl Drop for DrainGuard {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

/// Result of an enqueue, including the queue length after insertion
///
/// `queue_len == 1` means the queue just transitioned from empty to
/// non-empty, which is a drain trigger while online.
#[derive(Debug, Clone, Copy)]
pub struct Enqueued {
    /// The new item's id
    pub id: ItemId,
    /// Queue length after the insert
    pub queue_len: usize,
}

/// What happened to an item that failed an attempt
enum FailureDisposition {
    /// Item stays queued for a later retry
    Retained { attempts: u32 },
    /// Attempt ceiling reached; item left the live queue
    Discarded(QueueItem),
    /// Item vanished mid-pass (e.g. the category was cleared)
    Gone,
}

/// Drives queue draining with FIFO ordering, bounded retries, and
/// at-most-one concurrent drain per category
pub struct QueueProcessor {
    store: QueueStore,
    registry: OperationRegistry,
    connectivity: Arc<ConnectivityMonitor>,
    config: QueueConfig,
    /// Per-category queues, loaded from the store on first touch
    queues: RwLock<HashMap<Category, CategoryQueue>>,
    /// Event broadcast channel
    event_tx: broadcast::Sender<QueueEvent>,
}

impl QueueProcessor {
    /// Create a processor over a store, a registry, and a connectivity
    /// monitor
    pub fn new(
        store: QueueStore,
        registry: OperationRegistry,
        connectivity: Arc<ConnectivityMonitor>,
        config: QueueConfig,
    ) -> Self {
        let (event_tx, _) = broadcast::channel(config.event_capacity);
        Self {
            store,
            registry,
            connectivity,
            config,
            queues: RwLock::new(HashMap::new()),
            event_tx,
        }
    }

    /// Subscribe to queue events
    pub fn subscribe(&self) -> broadcast::Receiver<QueueEvent> {
        self.event_tx.subscribe()
    }

    /// The operation registry this processor resolves handlers through
    pub fn registry(&self) -> &OperationRegistry {
        &self.registry
    }

    /// Load a category's persisted queue into memory if not already there
    async fn ensure_loaded(&self, category: &Category) -> QueueResult<()> {
        {
            let queues = self.queues.read().await;
            if queues.contains_key(category) {
                return Ok(());
            }
        }

        let items = self.store.load(category)?;
        let mut queues = self.queues.write().await;
        queues.entry(category.clone()).or_insert_with(|| {
            debug!(%category, count = items.len(), "Loaded persisted queue");
            CategoryQueue {
                items,
                draining: Arc::new(AtomicBool::new(false)),
            }
        });
        Ok(())
    }

    /// Persist the current in-memory list for a category.
    ///
    /// A failed save is logged and otherwise ignored: the queue keeps
    /// operating in memory and the next successful save checkpoints the
    /// full latest state.
    async fn checkpoint(&self, category: &Category) {
        let items = {
            let queues = self.queues.read().await;
            match queues.get(category) {
                Some(queue) => queue.items.clone(),
                None => return,
            }
        };

        if let Err(e) = self.store.save(category, &items) {
            error!(%category, error = %e, "Failed to checkpoint queue");
        }
    }

    /// Append a new item to a category's queue and persist it
    pub async fn enqueue(
        &self,
        category: &Category,
        operation: impl Into<String>,
        arguments: Vec<Value>,
    ) -> QueueResult<Enqueued> {
        self.ensure_loaded(category).await?;

        let item = QueueItem::new(operation, arguments);
        let id = item.id;

        let queue_len = {
            let mut queues = self.queues.write().await;
            let queue = queues
                .entry(category.clone())
                .or_insert_with(|| CategoryQueue {
                    items: Vec::new(),
                    draining: Arc::new(AtomicBool::new(false)),
                });
            queue.items.push(item);
            queue.items.len()
        };
        self.checkpoint(category).await;

        debug!(%category, %id, queue_len, "Enqueued operation");
        let _ = self.event_tx.send(QueueEvent::Enqueued {
            category: category.clone(),
            id,
        });

        Ok(Enqueued { id, queue_len })
    }

    /// Number of items queued for a category
    pub async fn len(&self, category: &Category) -> QueueResult<usize> {
        self.ensure_loaded(category).await?;
        let queues = self.queues.read().await;
        Ok(queues.get(category).map_or(0, |q| q.items.len()))
    }

    /// Snapshot of a category's queued items, in FIFO order
    pub async fn items(&self, category: &Category) -> QueueResult<Vec<QueueItem>> {
        self.ensure_loaded(category).await?;
        let queues = self.queues.read().await;
        Ok(queues.get(category).map_or_else(Vec::new, |q| q.items.clone()))
    }

    /// Whether any queued item in the category has a recorded failure
    pub async fn has_failed_items(&self, category: &Category) -> QueueResult<bool> {
        let items = self.items(category).await?;
        Ok(items.iter().any(QueueItem::has_failed))
    }

    /// Dead letters retained for a category
    pub async fn dead_letters(&self, category: &Category) -> QueueResult<Vec<DeadLetter>> {
        self.store.load_dead_letters(category)
    }

    /// Empty a category's queue and dead letters
    pub async fn clear(&self, category: &Category) -> QueueResult<()> {
        {
            let mut queues = self.queues.write().await;
            if let Some(queue) = queues.get_mut(category) {
                queue.items.clear();
            }
        }
        self.store.clear(category)?;

        info!(%category, "Cleared queue");
        let _ = self.event_tx.send(QueueEvent::Cleared {
            category: category.clone(),
        });
        Ok(())
    }

    /// Run one drain pass over a category's queue.
    ///
    /// No-op (returns `Ok(false)`) when offline, when a pass is already
    /// running for the category, or when the queue is empty. Otherwise
    /// processes the snapshot taken at pass start strictly in FIFO order
    /// and returns `Ok(true)`.
    pub async fn drain(&self, category: &Category) -> QueueResult<bool> {
        if !self.connectivity.is_online() {
            debug!(%category, "Skipping drain while offline");
            return Ok(false);
        }

        self.ensure_loaded(category).await?;

        let (draining, snapshot) = {
            let queues = self.queues.read().await;
            let Some(queue) = queues.get(category) else {
                return Ok(false);
            };
            if queue.items.is_empty() {
                return Ok(false);
            }
            let ids: Vec<ItemId> = queue.items.iter().map(|i| i.id).collect();
            (queue.draining.clone(), ids)
        };

        if draining.swap(true, Ordering::SeqCst) {
            debug!(%category, "Drain already in progress");
            return Ok(false);
        }
        let _guard = DrainGuard(draining);

        info!(%category, pending = snapshot.len(), "Starting drain pass");
        let _ = self.event_tx.send(QueueEvent::DrainStarted {
            category: category.clone(),
        });

        let mut completed = 0;
        let mut failed = 0;
        let mut discarded = 0;

        for (index, id) in snapshot.iter().enumerate() {
            let item = {
                let queues = self.queues.read().await;
                queues
                    .get(category)
                    .and_then(|q| q.items.iter().find(|i| i.id == *id).cloned())
            };
            // Removed mid-pass (e.g. the category was cleared)
            let Some(item) = item else { continue };

            // Resolution failures count like any other execution failure:
            // the item's attempt ceiling still applies
            let outcome = match self.registry.resolve(category, &item.operation) {
                Ok(handler) => handler(item.arguments.clone())
                    .await
                    .map_err(|e| e.to_string()),
                Err(e) => Err(e.to_string()),
            };

            match outcome {
                Ok(_) => {
                    self.remove_item(category, *id).await;
                    self.checkpoint(category).await;
                    completed += 1;

                    debug!(%category, %id, operation = %item.operation, "Item replayed");
                    let _ = self.event_tx.send(QueueEvent::ItemCompleted {
                        category: category.clone(),
                        id: *id,
                        operation: item.operation.clone(),
                    });
                }
                Err(error_msg) => {
                    let disposition = self.record_failure(category, *id, &error_msg).await;
                    self.checkpoint(category).await;

                    match disposition {
                        FailureDisposition::Retained { attempts } => {
                            failed += 1;
                            debug!(
                                %category, %id, attempts, error = %error_msg,
                                "Item attempt failed, retained for retry"
                            );
                            let _ = self.event_tx.send(QueueEvent::ItemFailed {
                                category: category.clone(),
                                id: *id,
                                operation: item.operation.clone(),
                                attempts,
                                error: error_msg,
                            });
                        }
                        FailureDisposition::Discarded(dead) => {
                            discarded += 1;
                            warn!(
                                %category, %id, attempts = dead.attempts, error = %error_msg,
                                "Item exceeded attempt ceiling, moving to dead letters"
                            );
                            if let Err(e) = self
                                .store
                                .append_dead_letter(category, DeadLetter::new(dead))
                            {
                                error!(%category, %id, error = %e, "Failed to persist dead letter");
                            }
                            let _ = self.event_tx.send(QueueEvent::ItemDiscarded {
                                category: category.clone(),
                                id: *id,
                                operation: item.operation.clone(),
                                error: error_msg,
                            });
                        }
                        FailureDisposition::Gone => {}
                    }
                }
            }

            if index + 1 < snapshot.len() {
                tokio::time::sleep(self.config.item_delay).await;
            }
        }

        info!(%category, completed, failed, discarded, "Drain pass finished");
        let _ = self.event_tx.send(QueueEvent::DrainFinished {
            category: category.clone(),
            completed,
            failed,
            discarded,
        });

        Ok(true)
    }

    /// Drain every category with pending items.
    ///
    /// Covers both queues already loaded this session and queues persisted
    /// by an earlier run. Categories drain concurrently with respect to
    /// each other; ordering is only guaranteed within a category.
    pub async fn drain_all(&self) {
        let mut categories: Vec<Category> = {
            let queues = self.queues.read().await;
            queues.keys().cloned().collect()
        };
        match self.store.categories() {
            Ok(persisted) => {
                for category in persisted {
                    if !categories.contains(&category) {
                        categories.push(category);
                    }
                }
            }
            Err(e) => error!(error = %e, "Failed to list persisted categories"),
        }

        let passes = categories.iter().map(|category| async move {
            if let Err(e) = self.drain(category).await {
                error!(%category, error = %e, "Drain pass failed");
            }
        });
        futures::future::join_all(passes).await;
    }

    /// Remove an item from a category's in-memory list
    async fn remove_item(&self, category: &Category, id: ItemId) -> Option<QueueItem> {
        let mut queues = self.queues.write().await;
        let queue = queues.get_mut(category)?;
        let pos = queue.items.iter().position(|i| i.id == id)?;
        Some(queue.items.remove(pos))
    }

    /// Record a failed attempt against an item, removing it if the attempt
    /// ceiling has been reached
    async fn record_failure(
        &self,
        category: &Category,
        id: ItemId,
        error_msg: &str,
    ) -> FailureDisposition {
        let mut queues = self.queues.write().await;
        let Some(queue) = queues.get_mut(category) else {
            return FailureDisposition::Gone;
        };
        let Some(pos) = queue.items.iter().position(|i| i.id == id) else {
            return FailureDisposition::Gone;
        };

        let item = &mut queue.items[pos];
        item.record_failure(error_msg);
        let attempts = item.attempts;

        if attempts >= self.config.max_attempts {
            FailureDisposition::Discarded(queue.items.remove(pos))
        } else {
            FailureDisposition::Retained { attempts }
        }
    }
}
