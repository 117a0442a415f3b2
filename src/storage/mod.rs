//! Blob and list storage over a document store
//!
//! Both stores route every call through the shared
//! [`CollectionProvisioner`], so collections and indexes are created lazily
//! on first use.

pub mod blob;
pub mod list;
pub mod provisioner;

use tracing::error;

use crate::db::DbError;
use crate::types::StorageError;

pub use blob::BlobStore;
pub use list::{ListStore, DEFAULT_PAGE_SIZE};
pub use provisioner::{CollectionHandle, CollectionProvisioner};

/// Log a store failure and collapse it into the opaque operation error
pub(crate) fn operation_error(operation: &'static str) -> impl Fn(DbError) -> StorageError {
    move |e| {
        error!("mongodb storage error during {}: {}", operation, e);
        StorageError::Operation
    }
}
