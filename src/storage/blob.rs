//! Keyed blob storage
//!
//! Every blob lives in the `objects` collection, addressed by its `file`
//! key. Text writes update in place; binary writes always insert.

use bson::doc;
use std::collections::HashMap;
use tracing::debug;

use super::{operation_error, CollectionProvisioner};
use crate::db::{BlobDoc, FindQuery, BLOB_COLLECTION};
use crate::types::{InvalidArgument, Result, StorageError};

/// Keyed read/write/delete of text or binary content
#[derive(Clone)]
pub struct BlobStore {
    provisioner: CollectionProvisioner,
    test_mode: bool,
}

fn check_key(key: &str) -> Result<()> {
    if key.is_empty() {
        return Err(InvalidArgument::Key.into());
    }
    Ok(())
}

impl BlobStore {
    pub fn new(provisioner: CollectionProvisioner, test_mode: bool) -> Self {
        Self {
            provisioner,
            test_mode,
        }
    }

    async fn collection(&self) -> Result<String> {
        let handle = self
            .provisioner
            .collection::<BlobDoc>(BLOB_COLLECTION)
            .await?;
        Ok(handle.name.clone())
    }

    /// Whether a record exists for `key`
    pub async fn exists(&self, key: &str) -> Result<bool> {
        check_key(key)?;
        let collection = self.collection().await?;
        let query = FindQuery::new(BlobDoc::key_filter(key))
            .projection(doc! { "_id": 1 })
            .limit(1);
        let found = self
            .provisioner
            .store()
            .find(&collection, query)
            .await
            .map_err(operation_error("exists"))?;
        Ok(found.len() == 1)
    }

    /// Text contents stored under `key`
    pub async fn read(&self, key: &str) -> Result<String> {
        check_key(key)?;
        let collection = self.collection().await?;
        let record = self
            .provisioner
            .store()
            .find_one(&collection, BlobDoc::key_filter(key), Some(doc! { "contents": 1 }))
            .await
            .map_err(operation_error("read"))?
            .ok_or_else(|| StorageError::NotFound(key.to_string()))?;

        record
            .get_str("contents")
            .map(str::to_string)
            .map_err(|_| StorageError::NotFound(key.to_string()))
    }

    /// Read several text blobs stored as `prefix/key` in one query
    ///
    /// The result is keyed by the bare keys; keys without a record are absent.
    pub async fn read_many<S: AsRef<str>>(
        &self,
        prefix: &str,
        keys: &[S],
    ) -> Result<HashMap<String, String>> {
        if keys.is_empty() {
            return Err(InvalidArgument::Keys.into());
        }

        let appended: Vec<String> = keys
            .iter()
            .map(|k| format!("{}/{}", prefix, k.as_ref()))
            .collect();

        let collection = self.collection().await?;
        let records = self
            .provisioner
            .store()
            .find(
                &collection,
                FindQuery::new(doc! { "file": { "$in": appended.clone() } }),
            )
            .await
            .map_err(operation_error("read_many"))?;

        let mut data = HashMap::new();
        for (key, composite) in keys.iter().zip(&appended) {
            let itemid: &str = key.as_ref();
            // The record stored under the composite key wins; otherwise the
            // last record with any field naming the composite key or holding
            // either the composite or the bare key.
            let matched = records
                .iter()
                .find(|record| record.get_str("file").ok() == Some(composite.as_str()))
                .or_else(|| {
                    records.iter().rev().find(|record| {
                        record.iter().any(|(field, value)| {
                            field == composite
                                || value.as_str() == Some(composite.as_str())
                                || value.as_str() == Some(itemid)
                        })
                    })
                });

            if let Some(contents) = matched.and_then(|r| r.get_str("contents").ok()) {
                data.insert(itemid.to_string(), contents.to_string());
            }
        }

        debug!(
            "read_many '{}': {} of {} keys found",
            prefix,
            data.len(),
            keys.len()
        );
        Ok(data)
    }

    /// Binary contents stored under `key`
    pub async fn read_binary(&self, key: &str) -> Result<Vec<u8>> {
        check_key(key)?;
        let collection = self.collection().await?;
        let record = self
            .provisioner
            .store()
            .find_one(&collection, BlobDoc::key_filter(key), Some(doc! { "buffer": 1 }))
            .await
            .map_err(operation_error("read_binary"))?
            .ok_or_else(|| StorageError::NotFound(key.to_string()))?;

        record
            .get_binary_generic("buffer")
            .cloned()
            .map_err(|_| StorageError::NotFound(key.to_string()))
    }

    /// Store text under `key`, updating the existing record if there is one
    pub async fn write(&self, key: &str, contents: &str) -> Result<()> {
        check_key(key)?;
        let collection = self.collection().await?;
        let store = self.provisioner.store();

        if self.exists(key).await? {
            store
                .update_one(
                    &collection,
                    BlobDoc::key_filter(key),
                    doc! { "$set": { "contents": contents } },
                )
                .await
                .map_err(operation_error("write"))?;
            debug!("Updated blob '{}'", key);
            return Ok(());
        }

        let document = bson::to_document(&BlobDoc::text(key, contents))
            .map_err(|e| operation_error("write")(e.into()))?;
        store
            .insert_one(&collection, document)
            .await
            .map_err(operation_error("write"))?;
        debug!("Inserted blob '{}'", key);
        Ok(())
    }

    /// Store text that may be missing; a missing payload is rejected
    pub async fn write_optional(&self, key: &str, contents: Option<&str>) -> Result<()> {
        check_key(key)?;
        match contents {
            Some(contents) => self.write(key, contents).await,
            None => Err(InvalidArgument::Contents.into()),
        }
    }

    /// Insert a binary record for `key`
    ///
    /// Never checks for an existing record: repeated writes for the same key
    /// leave duplicate records behind.
    pub async fn write_binary(&self, key: &str, buffer: &[u8]) -> Result<()> {
        check_key(key)?;
        if buffer.is_empty() {
            return Err(InvalidArgument::Buffer.into());
        }

        let collection = self.collection().await?;
        let document = bson::to_document(&BlobDoc::binary(key, buffer))
            .map_err(|e| operation_error("write_binary")(e.into()))?;
        self.provisioner
            .store()
            .insert_one(&collection, document)
            .await
            .map_err(operation_error("write_binary"))?;
        debug!("Inserted binary blob '{}' ({} bytes)", key, buffer.len());
        Ok(())
    }

    /// Delete at most one record for `key`; missing keys are not an error
    pub async fn delete(&self, key: &str) -> Result<()> {
        check_key(key)?;
        let collection = self.collection().await?;
        let deleted = self
            .provisioner
            .store()
            .delete_one(&collection, BlobDoc::key_filter(key))
            .await
            .map_err(operation_error("delete"))?;
        debug!("Deleted {} blob(s) for '{}'", deleted, key);
        Ok(())
    }

    /// Remove every blob (test mode only)
    pub async fn flush(&self) -> Result<()> {
        if !self.test_mode {
            return Err(StorageError::FlushDisabled);
        }
        let collection = self.collection().await?;
        self.provisioner
            .store()
            .delete_many(&collection, doc! {})
            .await
            .map_err(operation_error("flush"))?;
        Ok(())
    }
}
