//! Document Store Layer
//!
//! Trait-based abstraction over the schema-less store the ODM talks to.
//! Documents are JSON objects addressed by table name and `id`.

pub mod error;
pub mod file;
pub mod filter;
pub mod memory;

pub use error::{Result, StoreError};
pub use file::FileStore;
pub use filter::{Filter, FilterOp, Order, Predicate, StoreQuery};
pub use memory::{MemoryStore, StoreStats};

use async_trait::async_trait;
use serde_json::{Map, Value};

/// Primary key field every stored document carries
pub const ID_FIELD: &str = "id";

/// A stored document
pub type Doc = Map<String, Value>;

/// Core document store trait — all backends implement this
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Whether the table has been created
    async fn table_exists(&self, table: &str) -> Result<bool>;

    /// Create a table; fails with `TableExists` if it is already there
    async fn create_table(&self, table: &str) -> Result<()>;

    /// All table names, sorted
    async fn list_tables(&self) -> Result<Vec<String>>;

    /// Fetch one document by primary key
    async fn get(&self, table: &str, id: &str) -> Result<Option<Doc>>;

    /// Filter, sort and page a table
    async fn query(&self, table: &str, query: &StoreQuery) -> Result<Vec<Doc>>;

    /// Count documents matching the query filters
    async fn count(&self, table: &str, query: &StoreQuery) -> Result<usize>;

    /// Insert a document and return the generated id
    async fn insert(&self, table: &str, doc: Doc) -> Result<String>;

    /// Replace the document stored under `id`
    async fn update(&self, table: &str, id: &str, doc: Doc) -> Result<()>;

    /// Delete by primary key, returns whether a document was removed
    async fn delete(&self, table: &str, id: &str) -> Result<bool>;

    /// Create a secondary index; fails with `IndexExists` if present
    async fn create_index(&self, table: &str, field: &str) -> Result<()>;

    /// Secondary index names of a table
    async fn list_indexes(&self, table: &str) -> Result<Vec<String>>;
}

/// Validate a table name
pub(crate) fn validate_table_name(name: &str) -> Result<()> {
    if name.is_empty() {
        return Err(StoreError::InvalidName("name cannot be empty".to_string()));
    }

    if name.starts_with('_') {
        return Err(StoreError::InvalidName("name cannot start with underscore".to_string()));
    }

    if !name.chars().all(|c| c.is_alphanumeric() || c == '_') {
        return Err(StoreError::InvalidName(format!("{} must be alphanumeric", name)));
    }

    Ok(())
}

/// Generate a fresh document id
pub(crate) fn generate_id() -> String {
    uuid::Uuid::new_v4().to_string()
}
