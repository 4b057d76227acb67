//! SyncQueue Core Library
//!
//! Offline operation queue: durable capture and replay of state-changing
//! operations attempted while disconnected.
//!
//! ## Overview
//!
//! Applications embedding this crate keep working offline: operations
//! attempted without connectivity are captured as queue items, persisted
//! in an embedded redb database, and replayed in FIFO order once
//! connectivity returns. Replay is at-least-once with a bounded retry
//! ceiling per item and at most one drain pass per category at any time;
//! idempotency belongs to the registered handlers.
//!
//! ## Core Principles
//!
//! - **Durable**: queues survive process restarts; every mutation rewrites
//!   the complete list atomically
//! - **Ordered**: strict FIFO within a category; categories are independent
//! - **Bounded**: items are moved to a dead-letter list after exhausting
//!   their attempt ceiling, never retried forever
//!
//! ## Quick Start
//!
//! ```ignore
//! use syncqueue_core::{OperationRegistry, Performed, SyncQueue};
//! use tokio::sync::watch;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let registry = OperationRegistry::builder()
//!         .operation("messages", "send", |args| async move {
//!             api::send_message(args).await
//!         })
//!         .build();
//!
//!     let (connectivity_tx, connectivity_rx) = watch::channel(true);
//!     let queue = SyncQueue::new("~/.myapp/data", registry, connectivity_rx).await?;
//!
//!     // Online: runs now. Offline: captured and replayed later.
//!     let outcome = queue
//!         .perform(&"messages".into(), "send", vec!["user-42".into(), "hello".into()])
//!         .await?;
//!
//!     if let Performed::Queued(id) = outcome {
//!         println!("offline, queued as {id}");
//!     }
//!
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod connectivity;
pub mod error;
pub mod events;
pub mod processor;
pub mod queue;
pub mod registry;
pub mod store;
pub mod types;

// Re-exports
pub use config::QueueConfig;
pub use connectivity::ConnectivityMonitor;
pub use error::{QueueError, QueueResult};
pub use events::QueueEvent;
pub use processor::QueueProcessor;
pub use queue::{Performed, SyncQueue};
pub use registry::{Handler, OperationRegistry, RegistryBuilder};
pub use store::QueueStore;
pub use types::{Category, DeadLetter, ItemId, PersistedQueue, QueueItem};
