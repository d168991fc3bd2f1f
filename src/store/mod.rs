// Document store port - schemaless collections, equality queries, single-collection batches
mod query;
pub mod sqlite;
mod typed;

use async_trait::async_trait;
use futures::stream::BoxStream;
use serde_json::Value;
use std::sync::Arc;
use thiserror::Error;

pub use query::{Direction, Filter, OrderBy, Query, MAX_FILTERS};
pub use sqlite::SqliteDocumentStore;
pub use typed::{decode, encode, Document};

/// Logical collection names.
pub mod collections {
    pub const USERS: &str = "users";
    pub const POSTS: &str = "posts";
    pub const MATCHES: &str = "matches";
    pub const CHAT_MESSAGES: &str = "chatMessages";
    pub const NOTIFICATIONS: &str = "notifications";
    pub const REVIEWS: &str = "reviews";
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Pool error: {0}")]
    Pool(#[from] r2d2::Error),

    #[error("SQL error: {0}")]
    Sql(#[from] rusqlite::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Invalid query: {0}")]
    InvalidQuery(String),

    #[error("Store unavailable: {0}")]
    Unavailable(String),

    #[error("Background task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

pub type StoreResult<T> = Result<T, StoreError>;

/// A raw document as held by the store. `data` never contains the id.
#[derive(Debug, Clone, PartialEq)]
pub struct StoredDocument {
    pub id: String,
    pub data: Value,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeKind {
    Added,
    Modified,
    Removed,
}

/// Delta pushed to subscribers after a committed write.
#[derive(Debug, Clone, PartialEq)]
pub struct Change {
    pub collection: String,
    pub id: String,
    pub kind: ChangeKind,
    /// Body after the write; for removals, the last body before it.
    pub data: Value,
}

/// Port to the externally owned document store.
///
/// Deletes are idempotent: removing an absent document succeeds. Batch
/// operations are atomic within one collection; nothing spans collections.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    async fn get(&self, collection: &str, id: &str) -> StoreResult<Option<StoredDocument>>;

    async fn query(&self, collection: &str, query: &Query) -> StoreResult<Vec<StoredDocument>>;

    /// Insert with a store-assigned identifier, returned to the caller.
    async fn insert(&self, collection: &str, data: Value) -> StoreResult<String>;

    /// Insert unless a document matching any of `conflicts` already exists.
    /// The check and the write happen in one transaction. Returns None on
    /// conflict, without writing.
    async fn insert_unless(
        &self,
        collection: &str,
        data: Value,
        conflicts: &[Query],
    ) -> StoreResult<Option<String>>;

    /// Create or replace a document under a caller-chosen id.
    async fn put(&self, collection: &str, id: &str, data: Value) -> StoreResult<()>;

    /// Merge top-level fields of `patch` into an existing document.
    /// Returns false when the document does not exist.
    async fn update(&self, collection: &str, id: &str, patch: Value) -> StoreResult<bool>;

    /// Returns true if a document was removed.
    async fn delete(&self, collection: &str, id: &str) -> StoreResult<bool>;

    /// Atomically delete every listed id. Missing ids are skipped.
    async fn batch_delete(&self, collection: &str, ids: &[String]) -> StoreResult<u64>;

    /// Atomically merge `patch` into every listed id. Missing ids are skipped.
    async fn batch_update(&self, collection: &str, ids: &[String], patch: Value)
        -> StoreResult<u64>;

    /// Push-based deltas for documents in `collection` matching `query`.
    fn subscribe(&self, collection: &str, query: Query) -> BoxStream<'static, Change>;
}

pub type DynDocumentStore = Arc<dyn DocumentStore>;
