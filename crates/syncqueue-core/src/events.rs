//! Queue event types for observer notification
//!
//! The queue notifies listeners of enqueue/drain activity through an
//! explicit broadcast channel rather than through framework lifecycle
//! hooks. UI code subscribes to drive "pending sync" and "some actions
//! could not be synced" indicators.
//!
//! ## Overview
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │  QueueEvent: Notifications about queue activity                 │
//! │  ├── Enqueued: An operation was captured for later replay       │
//! │  ├── DrainStarted / DrainFinished: A replay pass ran            │
//! │  ├── ItemCompleted: An item replayed successfully               │
//! │  ├── ItemFailed: An attempt failed, item retained for retry     │
//! │  ├── ItemDiscarded: Attempt ceiling reached, item dead-lettered │
//! │  └── Cleared: A category's queue was explicitly emptied         │
//! └─────────────────────────────────────────────────────────────────┘
//! ```

use crate::types::{Category, ItemId};

/// Events emitted during queue processing
#[derive(Debug, Clone)]
pub enum QueueEvent {
    /// An operation was enqueued for later replay
    Enqueued {
        /// The category the item was enqueued under
        category: Category,
        /// The new item's id
        id: ItemId,
    },
    /// A drain pass started for a category
    DrainStarted {
        /// The category being drained
        category: Category,
    },
    /// An item was replayed successfully and removed from the queue
    ItemCompleted {
        /// The item's category
        category: Category,
        /// The item's id
        id: ItemId,
        /// The operation name
        operation: String,
    },
    /// An execution attempt failed; the item stays queued for retry
    ItemFailed {
        /// The item's category
        category: Category,
        /// The item's id
        id: ItemId,
        /// The operation name
        operation: String,
        /// Failed attempts so far
        attempts: u32,
        /// The failure message
        error: String,
    },
    /// An item exhausted its attempt ceiling and was moved to dead letters
    ItemDiscarded {
        /// The item's category
        category: Category,
        /// The item's id
        id: ItemId,
        /// The operation name
        operation: String,
        /// The final failure message
        error: String,
    },
    /// A drain pass finished
    DrainFinished {
        /// The category that was drained
        category: Category,
        /// Items removed after successful replay
        completed: usize,
        /// Items that failed and remain queued
        failed: usize,
        /// Items discarded to the dead-letter list
        discarded: usize,
    },
    /// A category's queue (and dead letters) was explicitly emptied
    Cleared {
        /// The category that was cleared
        category: Category,
    },
}

impl QueueEvent {
    /// Get the category associated with this event
    pub fn category(&self) -> &Category {
        match self {
            QueueEvent::Enqueued { category, .. } => category,
            QueueEvent::DrainStarted { category } => category,
            QueueEvent::ItemCompleted { category, .. } => category,
            QueueEvent::ItemFailed { category, .. } => category,
            QueueEvent::ItemDiscarded { category, .. } => category,
            QueueEvent::DrainFinished { category, .. } => category,
            QueueEvent::Cleared { category } => category,
        }
    }
}
