//! Collection provisioning
//!
//! Creates a collection and its indexes the first time a logical name is
//! used, then memoizes the handle for the lifetime of the adapter. Two
//! callers racing on first use may both provision; the store tolerates
//! repeated "create if absent" calls.

use dashmap::DashMap;
use mongodb::IndexModel;
use std::sync::Arc;
use tracing::{debug, error, info};

use crate::db::{DbError, DocumentStore, IntoIndexes};
use crate::types::{Result, StorageError};

/// A collection that has been created and indexed
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CollectionHandle {
    pub name: String,
    pub provisioned: bool,
}

/// Lazy, memoized per-name collection provisioning
#[derive(Clone)]
pub struct CollectionProvisioner {
    store: Arc<dyn DocumentStore>,
    handles: Arc<DashMap<String, Arc<CollectionHandle>>>,
}

impl CollectionProvisioner {
    pub fn new(store: Arc<dyn DocumentStore>) -> Self {
        Self {
            store,
            handles: Arc::new(DashMap::new()),
        }
    }

    /// The document store collections are provisioned in
    pub fn store(&self) -> &Arc<dyn DocumentStore> {
        &self.store
    }

    /// Return a ready handle for `name`, provisioning it on first use
    pub async fn collection<T: IntoIndexes>(&self, name: &str) -> Result<Arc<CollectionHandle>> {
        if let Some(handle) = self.handles.get(name) {
            return Ok(handle.clone());
        }

        match self.store.create_collection(name).await {
            Ok(()) => info!("Created collection '{}'", name),
            Err(DbError::NamespaceExists(_)) => debug!("Collection '{}' already exists", name),
            Err(e) => {
                error!("Failed to create collection '{}': {}", name, e);
                return Err(StorageError::Provisioning);
            }
        }

        let existing = self.store.list_indexes(name).await.map_err(|e| {
            error!("Failed to list indexes on '{}': {}", name, e);
            StorageError::Provisioning
        })?;

        if existing.is_empty() {
            for (keys, options) in T::into_indices() {
                let index = IndexModel::builder().keys(keys).options(options).build();
                self.store.create_index(name, index).await.map_err(|e| {
                    error!("Failed to create index on '{}': {}", name, e);
                    StorageError::Provisioning
                })?;
            }
            info!("Created indexes on '{}'", name);
        }

        let handle = Arc::new(CollectionHandle {
            name: name.to_string(),
            provisioned: true,
        });
        self.handles.insert(name.to_string(), handle.clone());
        Ok(handle)
    }

    /// Names of every collection provisioned so far
    pub fn provisioned_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.handles.iter().map(|e| e.key().clone()).collect();
        names.sort();
        names
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{BlobDoc, ListEntryDoc, MemoryStore};
    use bson::doc;

    #[tokio::test]
    async fn test_provisions_once_per_name() {
        let store = Arc::new(MemoryStore::new());
        let provisioner = CollectionProvisioner::new(store.clone());

        let first = provisioner.collection::<ListEntryDoc>("lists").await.unwrap();
        let second = provisioner.collection::<ListEntryDoc>("lists").await.unwrap();

        assert_eq!(first, second);
        assert!(first.provisioned);
        assert_eq!(store.create_collection_calls(), 1);
        assert_eq!(store.create_index_calls(), 2);
    }

    #[tokio::test]
    async fn test_creates_path_and_created_indexes_with_collation() {
        let store = Arc::new(MemoryStore::new());
        let provisioner = CollectionProvisioner::new(store.clone());
        provisioner.collection::<ListEntryDoc>("lists").await.unwrap();

        let indexes = store.list_indexes("lists").await.unwrap();
        let keys: Vec<_> = indexes.iter().map(|i| i.keys.clone()).collect();
        assert_eq!(keys, vec![doc! { "path": 1 }, doc! { "created": -1 }]);

        for index in &indexes {
            let collation = index.options.as_ref().and_then(|o| o.collation.clone()).unwrap();
            assert_eq!(collation.locale, "en");
            assert_eq!(collation.backwards, Some(true));
        }
    }

    #[tokio::test]
    async fn test_existing_collection_is_reused() {
        let store = Arc::new(MemoryStore::new());

        // Provisioned by an earlier process
        CollectionProvisioner::new(store.clone())
            .collection::<BlobDoc>("objects")
            .await
            .unwrap();

        let provisioner = CollectionProvisioner::new(store.clone());
        let handle = provisioner.collection::<BlobDoc>("objects").await.unwrap();

        assert_eq!(handle.name, "objects");
        assert_eq!(store.create_collection_calls(), 2);
        assert_eq!(store.create_index_calls(), 2);
    }

    #[tokio::test]
    async fn test_store_failure_is_provisioning_error() {
        let store = Arc::new(MemoryStore::new());
        store.set_failing(true);
        let provisioner = CollectionProvisioner::new(store.clone());

        let err = provisioner.collection::<BlobDoc>("objects").await.unwrap_err();
        assert!(matches!(err, StorageError::Provisioning));
        assert!(provisioner.provisioned_names().is_empty());

        // Nothing was memoized, so a retry provisions from scratch
        store.set_failing(false);
        provisioner.collection::<BlobDoc>("objects").await.unwrap();
        assert_eq!(provisioner.provisioned_names(), vec!["objects".to_string()]);
    }
}
