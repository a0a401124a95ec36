//! The `Source` boundary: an async query executor for one backing store
//!
//! The framework builds declarative query records and hands them to a
//! `Source`; how they execute (SQL generation, transactions) is the
//! implementation's concern. Errors cross this boundary as a structured
//! contract rather than backend-specific strings, so constraint
//! violations can be mapped to field-level validation failures.

use async_trait::async_trait;
use serde_json::{Map, Value};

use crate::core::query::{Create, Delete, Read, Update};

/// A single row, keyed by field name.
pub type Item = Map<String, Value>;

/// A page of rows plus the total (pre-paging) match count.
#[derive(Debug, Clone, Default)]
pub struct Collection {
    pub items: Vec<Item>,
    pub count: u64,
}

/// The result of a read query.
#[derive(Debug, Clone)]
pub enum ReadOutcome {
    /// Single-item query: `None` when no row matched.
    Item(Option<Item>),
    Collection(Collection),
}

/// Structured errors a `Source` may report.
#[derive(Debug, Clone, thiserror::Error)]
pub enum SourceError {
    /// The target of an update or delete does not exist
    #[error("query target does not exist")]
    NotFound,

    /// A foreign key referenced a nonexistent row
    #[error("field '{field}' references a row that does not exist")]
    ConstraintViolation { field: String },

    /// Backend failure (connection, lock, corruption)
    #[error("storage backend error: {0}")]
    Backend(String),
}

/// An asynchronous query executor bound to one backing store.
///
/// Create and update queries must honor their `joins`: when a payload
/// embeds a full related object instead of a key, the related row is
/// created first (transactionally, where the backend supports it) and
/// its generated key substituted before the owning row is written.
#[async_trait]
pub trait Source: Send + Sync {
    async fn create(&self, query: &Create) -> Result<Item, SourceError>;

    async fn read(&self, query: &Read) -> Result<ReadOutcome, SourceError>;

    async fn update(&self, query: &Update) -> Result<Item, SourceError>;

    /// Returns whether any row was deleted.
    async fn delete(&self, query: &Delete) -> Result<bool, SourceError>;
}
