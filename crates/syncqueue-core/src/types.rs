//! Core types for the offline operation queue

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use ulid::Ulid;

/// Namespace grouping related queued operations (e.g. "messages",
/// "documents", "applications")
///
/// Each category has its own persisted queue, its own drain state, and its
/// own set of registered handlers. Queues in different categories are
/// independent of each other.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Category(String);

impl Category {
    /// Create a category from a name
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    /// Get the category name
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for Category {
    fn from(name: &str) -> Self {
        Self::new(name)
    }
}

impl From<String> for Category {
    fn from(name: String) -> Self {
        Self::new(name)
    }
}

impl std::fmt::Display for Category {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Unique identifier for a queued item
///
/// Uses ULID: a millisecond timestamp plus 80 random bits, so ids generated
/// within the same millisecond never collide and sort in enqueue order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ItemId(pub Ulid);

impl ItemId {
    /// Create a new ItemId with the current timestamp
    pub fn new() -> Self {
        Self(Ulid::new())
    }

    /// Get the underlying ULID
    pub fn as_ulid(&self) -> &Ulid {
        &self.0
    }

    /// Parse from string representation
    pub fn from_string(s: &str) -> Result<Self, ulid::DecodeError> {
        Ok(Self(Ulid::from_string(s)?))
    }
}

impl Default for ItemId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for ItemId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// One captured operation awaiting replay
///
/// Created only by the queue façade (offline enqueue or online fallback),
/// mutated only by the processor when an attempt fails, and removed on
/// success or when the attempt ceiling is reached.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueueItem {
    /// Unique identifier, generated at enqueue time
    pub id: ItemId,
    /// Operation name within the category (e.g. "send", "upload")
    pub operation: String,
    /// Arguments passed to the resolved handler, opaque to the queue
    pub arguments: Vec<Value>,
    /// When the item was enqueued
    pub enqueued_at: DateTime<Utc>,
    /// Count of failed execution attempts
    pub attempts: u32,
    /// Timestamp of the most recent failed attempt
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_attempt_at: Option<DateTime<Utc>>,
    /// Message from the most recent failure
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
}

impl QueueItem {
    /// Create a new item with zero attempts
    pub fn new(operation: impl Into<String>, arguments: Vec<Value>) -> Self {
        Self {
            id: ItemId::new(),
            operation: operation.into(),
            arguments,
            enqueued_at: Utc::now(),
            attempts: 0,
            last_attempt_at: None,
            last_error: None,
        }
    }

    /// Record a failed execution attempt
    pub fn record_failure(&mut self, error: impl Into<String>) {
        self.attempts += 1;
        self.last_attempt_at = Some(Utc::now());
        self.last_error = Some(error.into());
    }

    /// Whether this item has failed at least once
    pub fn has_failed(&self) -> bool {
        self.last_error.is_some()
    }
}

/// Persisted representation of one category's queue
///
/// This is the complete value written to the durable store on every
/// mutation; the store never sees a partial list.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PersistedQueue {
    /// The category this queue belongs to
    pub category: Category,
    /// Items in FIFO order
    pub items: Vec<QueueItem>,
}

/// An item discarded after exhausting its attempt ceiling, retained so the
/// last known error stays inspectable
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeadLetter {
    /// The item as it looked on its final failure
    pub item: QueueItem,
    /// When the item was discarded from the live queue
    pub discarded_at: DateTime<Utc>,
}

impl DeadLetter {
    /// Wrap a discarded item
    pub fn new(item: QueueItem) -> Self {
        Self {
            item,
            discarded_at: Utc::now(),
        }
    }
}
