//! Document store abstraction
//!
//! The adapter only needs a small Mongo-like subset: collection and index
//! creation plus find/insert/update/delete over raw BSON documents. Keeping
//! it behind a trait lets the stores run against MongoDB in production and
//! against [`MemoryStore`](super::MemoryStore) in tests.

use async_trait::async_trait;
use bson::Document;
use mongodb::{options::Collation, IndexModel};

/// Errors reported by a document store implementation
#[derive(Debug, thiserror::Error)]
pub enum DbError {
    /// The collection already exists
    #[error("Namespace exists: {0}")]
    NamespaceExists(String),

    #[error("Database error: {0}")]
    Database(String),
}

impl From<mongodb::error::Error> for DbError {
    fn from(err: mongodb::error::Error) -> Self {
        Self::Database(err.to_string())
    }
}

impl From<bson::ser::Error> for DbError {
    fn from(err: bson::ser::Error) -> Self {
        Self::Database(format!("BSON serialization failed: {}", err))
    }
}

pub type DbResult<T> = std::result::Result<T, DbError>;

/// A find request: filter plus cursor modifiers
#[derive(Debug, Clone, Default)]
pub struct FindQuery {
    pub filter: Document,
    pub sort: Option<Document>,
    pub skip: Option<u64>,
    pub limit: Option<i64>,
    pub projection: Option<Document>,
    pub collation: Option<Collation>,
}

impl FindQuery {
    pub fn new(filter: Document) -> Self {
        Self {
            filter,
            ..Default::default()
        }
    }

    pub fn sort(mut self, sort: Document) -> Self {
        self.sort = Some(sort);
        self
    }

    pub fn skip(mut self, skip: u64) -> Self {
        self.skip = Some(skip);
        self
    }

    pub fn limit(mut self, limit: i64) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn projection(mut self, projection: Document) -> Self {
        self.projection = Some(projection);
        self
    }

    pub fn collation(mut self, collation: Collation) -> Self {
        self.collation = Some(collation);
        self
    }
}

/// The external document database as seen by the adapter
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Names of all collections in the database
    async fn collection_names(&self) -> DbResult<Vec<String>>;

    /// Create a collection; fails with [`DbError::NamespaceExists`] if present
    async fn create_collection(&self, name: &str) -> DbResult<()>;

    /// Secondary indexes on a collection (the implicit `_id` index is excluded)
    async fn list_indexes(&self, collection: &str) -> DbResult<Vec<IndexModel>>;

    async fn create_index(&self, collection: &str, index: IndexModel) -> DbResult<()>;

    async fn find(&self, collection: &str, query: FindQuery) -> DbResult<Vec<Document>>;

    async fn find_one(
        &self,
        collection: &str,
        filter: Document,
        projection: Option<Document>,
    ) -> DbResult<Option<Document>>;

    async fn insert_one(&self, collection: &str, document: Document) -> DbResult<()>;

    async fn insert_many(&self, collection: &str, documents: Vec<Document>) -> DbResult<()>;

    /// Apply an update document to the first match; returns the matched count
    async fn update_one(
        &self,
        collection: &str,
        filter: Document,
        update: Document,
    ) -> DbResult<u64>;

    /// Returns the number of deleted documents (0 or 1)
    async fn delete_one(&self, collection: &str, filter: Document) -> DbResult<u64>;

    async fn delete_many(&self, collection: &str, filter: Document) -> DbResult<u64>;

    async fn count_documents(&self, collection: &str, filter: Document) -> DbResult<u64>;
}
