//! Document schemas for the storage collections
//!
//! Each schema names the indexes its collection is provisioned with.

mod blob;
mod list_entry;

use bson::Document;
use mongodb::options::{Collation, IndexOptions};

pub use blob::{BlobDoc, BLOB_COLLECTION};
pub use list_entry::{ListEntryDoc, LIST_COLLECTION};

/// Trait for schemas that provide index definitions
pub trait IntoIndexes {
    fn into_indices() -> Vec<(Document, Option<IndexOptions>)>;
}

/// Locale-aware collation shared by every storage index
pub fn storage_collation() -> Collation {
    Collation::builder()
        .locale("en".to_string())
        .backwards(true)
        .build()
}
