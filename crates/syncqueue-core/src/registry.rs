//! Operation registry
//!
//! Resolves a `(category, operation)` pair to a callable handler without
//! the processor knowing any concrete business logic. Registration is
//! static configuration supplied at construction time through the builder;
//! the built registry is immutable, so queued items can never resolve to a
//! handler the composing code did not explicitly wire in.

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;

use futures::future::BoxFuture;
use futures::FutureExt;
use serde_json::Value;

use crate::error::{QueueError, QueueResult};
use crate::types::Category;

/// A callable operation handler
///
/// Handlers take the queued item's arguments and return the business
/// result. Failures are arbitrary embedder errors (`anyhow::Error`); the
/// queue only records their message. Handlers must tolerate at-least-once
/// invocation.
pub type Handler = Arc<dyn Fn(Vec<Value>) -> BoxFuture<'static, anyhow::Result<Value>> + Send + Sync>;

/// Static lookup from `(category, operation)` to handler
pub struct OperationRegistry {
    categories: HashMap<Category, HashMap<String, Handler>>,
}

impl OperationRegistry {
    /// Start building a registry
    pub fn builder() -> RegistryBuilder {
        RegistryBuilder {
            categories: HashMap::new(),
        }
    }

    /// Resolve a category/operation pair to its handler
    ///
    /// Returns `QueueError::UnknownCategory` if no handlers are registered
    /// for the category, `QueueError::UnknownOperation` if the category is
    /// known but the operation is not.
    pub fn resolve(&self, category: &Category, operation: &str) -> QueueResult<Handler> {
        let operations = self
            .categories
            .get(category)
            .ok_or_else(|| QueueError::UnknownCategory(category.to_string()))?;

        operations
            .get(operation)
            .cloned()
            .ok_or_else(|| QueueError::UnknownOperation {
                category: category.to_string(),
                operation: operation.to_string(),
            })
    }

    /// Whether any handlers are registered for a category
    pub fn has_category(&self, category: &Category) -> bool {
        self.categories.contains_key(category)
    }
}

impl std::fmt::Debug for OperationRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut entries: Vec<String> = self
            .categories
            .iter()
            .map(|(category, ops)| format!("{} ({} operations)", category, ops.len()))
            .collect();
        entries.sort();
        f.debug_struct("OperationRegistry")
            .field("categories", &entries)
            .finish()
    }
}

/// Builder for [`OperationRegistry`]
///
/// # Example
///
/// ```ignore
/// let registry = OperationRegistry::builder()
///     .operation("messages", "send", |args| async move {
///         api::send_message(args).await
///     })
///     .operation("documents", "upload", |args| async move {
///         api::upload_document(args).await
///     })
///     .build();
/// ```
pub struct RegistryBuilder {
    categories: HashMap<Category, HashMap<String, Handler>>,
}

impl RegistryBuilder {
    /// Register a handler for an operation within a category
    ///
    /// Registering the same pair twice replaces the earlier handler.
    pub fn operation<F, Fut>(
        mut self,
        category: impl Into<Category>,
        name: impl Into<String>,
        handler: F,
    ) -> Self
    where
        F: Fn(Vec<Value>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<Value>> + Send + 'static,
    {
        let boxed: Handler = Arc::new(move |args| handler(args).boxed());
        self.categories
            .entry(category.into())
            .or_default()
            .insert(name.into(), boxed);
        self
    }

    /// Finish building
    pub fn build(self) -> OperationRegistry {
        OperationRegistry {
            categories: self.categories,
        }
    }
}
