//! storage-mongodb - blob and list storage on top of MongoDB
//!
//! Two independent stores share one lazily provisioned set of collections:
//!
//! - **BlobStore**: keyed read/write/delete of text or binary content,
//!   one document per key in the `objects` collection
//! - **ListStore**: many named lists of item ids in the `lists` collection,
//!   newest first, with offset pagination
//!
//! Both sit behind a [`StorageContext`] built once at startup.

pub mod config;
pub mod context;
pub mod db;
pub mod storage;
pub mod types;

pub use config::{Args, StorageConfig};
pub use context::StorageContext;
pub use storage::{BlobStore, CollectionProvisioner, ListStore};
pub use types::{InvalidArgument, Result, StorageError};
