//! Database layer
//!
//! The [`DocumentStore`] seam with its MongoDB and in-memory implementations,
//! plus the document schemas stored through it.

pub mod memory;
pub mod mongo;
pub mod schemas;
pub mod store;

pub use memory::MemoryStore;
pub use mongo::{MongoClient, MongoDocumentStore};
pub use schemas::{BlobDoc, IntoIndexes, ListEntryDoc, BLOB_COLLECTION, LIST_COLLECTION};
pub use store::{DbError, DbResult, DocumentStore, FindQuery};
