//! Storage context
//!
//! Owns the document store connection and the collection-handle cache for
//! the lifetime of the process. Built once at startup; the blob and list
//! stores it hands out share its provisioner.

use bson::doc;
use std::sync::Arc;
use tracing::{error, info, warn};

use crate::config::StorageConfig;
use crate::db::{BlobDoc, DocumentStore, ListEntryDoc, MongoClient, BLOB_COLLECTION, LIST_COLLECTION};
use crate::storage::{operation_error, BlobStore, CollectionProvisioner, ListStore};
use crate::types::{Result, StorageError};

/// Process-wide storage state: connection plus provisioned collections
#[derive(Clone)]
pub struct StorageContext {
    config: StorageConfig,
    provisioner: CollectionProvisioner,
    blobs: BlobStore,
    lists: ListStore,
}

impl StorageContext {
    /// Connect to MongoDB and provision the blob and list collections
    ///
    /// Connection failure is returned to the caller, which is expected to
    /// treat it as fatal.
    pub async fn connect(config: StorageConfig) -> Result<Self> {
        config.validate().map_err(StorageError::Config)?;
        let client = MongoClient::new(&config.mongodb_url, &config.database).await?;
        Self::setup(config, Arc::new(client.store())).await
    }

    /// Build a context over an existing document store
    pub async fn setup(config: StorageConfig, store: Arc<dyn DocumentStore>) -> Result<Self> {
        config.validate().map_err(StorageError::Config)?;

        let provisioner = CollectionProvisioner::new(store);
        provisioner.collection::<BlobDoc>(BLOB_COLLECTION).await?;
        provisioner.collection::<ListEntryDoc>(LIST_COLLECTION).await?;

        if config.test_mode {
            warn!("Storage running in test mode; flush is enabled");
        }
        info!(
            "Storage ready on database '{}' (page size {})",
            config.database, config.page_size
        );

        Ok(Self {
            blobs: BlobStore::new(provisioner.clone(), config.test_mode),
            lists: ListStore::new(provisioner.clone(), config.page_size, config.test_mode),
            provisioner,
            config,
        })
    }

    pub fn blobs(&self) -> &BlobStore {
        &self.blobs
    }

    pub fn lists(&self) -> &ListStore {
        &self.lists
    }

    pub fn config(&self) -> &StorageConfig {
        &self.config
    }

    /// Names of collections provisioned through this context
    pub fn provisioned_collections(&self) -> Vec<String> {
        self.provisioner.provisioned_names()
    }

    /// Delete every document in every collection (test mode only)
    ///
    /// Collections, indexes and memoized handles are left in place.
    pub async fn flush(&self) -> Result<()> {
        if !self.config.test_mode {
            error!("Refusing to flush storage outside test mode");
            return Err(StorageError::FlushDisabled);
        }

        let store = self.provisioner.store();
        let names = store
            .collection_names()
            .await
            .map_err(operation_error("flush"))?;
        for name in &names {
            store
                .delete_many(name, doc! {})
                .await
                .map_err(operation_error("flush"))?;
        }
        info!("Flushed {} collection(s)", names.len());
        Ok(())
    }
}
