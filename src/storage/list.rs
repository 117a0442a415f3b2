//! Grouped, ordered list storage
//!
//! All lists share the single `lists` collection; a list is the set of
//! entries carrying its `path`. Entries are returned newest first.
//!
//! `add` checks for an existing pair before inserting. The check and the
//! insert are separate round-trips, so concurrent adds of the same pair can
//! both insert. A hard guarantee needs a unique (path, itemid) index.

use bson::{doc, Document};
use chrono::Utc;
use tracing::debug;

use super::{operation_error, CollectionProvisioner};
use crate::db::schemas::storage_collation;
use crate::db::{FindQuery, ListEntryDoc, LIST_COLLECTION};
use crate::types::{InvalidArgument, Result, StorageError};

/// Page size used when the caller does not pass one
pub const DEFAULT_PAGE_SIZE: u32 = 10;

/// Many independent named lists of item ids
#[derive(Clone)]
pub struct ListStore {
    provisioner: CollectionProvisioner,
    page_size: u32,
    test_mode: bool,
}

fn check_path(path: &str) -> Result<()> {
    if path.is_empty() {
        return Err(InvalidArgument::Path.into());
    }
    Ok(())
}

fn check_pair(path: &str, itemid: &str) -> Result<()> {
    check_path(path)?;
    if itemid.is_empty() {
        return Err(InvalidArgument::ItemId.into());
    }
    Ok(())
}

/// Newest first; entries sharing a timestamp are ordered by `_id` so
/// successive pages see one stable order
fn newest_first() -> Document {
    doc! { "created": -1, "_id": -1 }
}

fn item_ids(entries: Vec<Document>) -> Option<Vec<String>> {
    let ids: Vec<String> = entries
        .iter()
        .filter_map(|entry| entry.get_str("itemid").ok().map(str::to_string))
        .collect();

    if ids.is_empty() {
        None
    } else {
        Some(ids)
    }
}

impl ListStore {
    pub fn new(provisioner: CollectionProvisioner, page_size: u32, test_mode: bool) -> Self {
        Self {
            provisioner,
            page_size,
            test_mode,
        }
    }

    /// Page size applied by [`list`](Self::list) when none is given
    pub fn page_size(&self) -> u32 {
        self.page_size
    }

    async fn collection(&self) -> Result<String> {
        let handle = self
            .provisioner
            .collection::<ListEntryDoc>(LIST_COLLECTION)
            .await?;
        Ok(handle.name.clone())
    }

    /// Add `itemid` to the list at `path`; adding an existing member is a no-op
    pub async fn add(&self, path: &str, itemid: &str) -> Result<()> {
        check_pair(path, itemid)?;
        if self.exists(path, itemid).await? {
            debug!("'{}' already in list '{}'", itemid, path);
            return Ok(());
        }

        let collection = self.collection().await?;
        let entry = ListEntryDoc::new(path, itemid, Utc::now().timestamp_millis());
        let document =
            bson::to_document(&entry).map_err(|e| operation_error("add")(e.into()))?;
        self.provisioner
            .store()
            .insert_one(&collection, document)
            .await
            .map_err(operation_error("add"))?;
        debug!("Added '{}' to list '{}'", itemid, path);
        Ok(())
    }

    /// Bulk insert one entry per (path, itemid) pair, all sharing one timestamp
    ///
    /// No membership check is made; intended for initial population.
    pub async fn add_many<I, P, V>(&self, items: I) -> Result<()>
    where
        I: IntoIterator<Item = (P, V)>,
        P: AsRef<str>,
        V: AsRef<str>,
    {
        let created = Utc::now().timestamp_millis();
        let mut documents = Vec::new();
        for (path, itemid) in items {
            let (path, itemid) = (path.as_ref(), itemid.as_ref());
            check_pair(path, itemid)?;
            let entry = ListEntryDoc::new(path, itemid, created);
            documents.push(
                bson::to_document(&entry).map_err(|e| operation_error("add_many")(e.into()))?,
            );
        }

        if documents.is_empty() {
            return Ok(());
        }

        let collection = self.collection().await?;
        let count = documents.len();
        self.provisioner
            .store()
            .insert_many(&collection, documents)
            .await
            .map_err(operation_error("add_many"))?;
        debug!("Bulk added {} list entries", count);
        Ok(())
    }

    /// Number of entries under `path`
    pub async fn count(&self, path: &str) -> Result<u64> {
        check_path(path)?;
        let collection = self.collection().await?;
        self.provisioner
            .store()
            .count_documents(&collection, doc! { "path": path })
            .await
            .map_err(operation_error("count"))
    }

    /// Whether `itemid` is a member of the list at `path`
    pub async fn exists(&self, path: &str, itemid: &str) -> Result<bool> {
        check_pair(path, itemid)?;
        let collection = self.collection().await?;
        let query = FindQuery::new(ListEntryDoc::pair_filter(path, itemid))
            .projection(doc! { "_id": 1 })
            .limit(1)
            .collation(storage_collation());
        let found = self
            .provisioner
            .store()
            .find(&collection, query)
            .await
            .map_err(operation_error("exists"))?;
        Ok(found.len() == 1)
    }

    /// One page of item ids, newest first
    ///
    /// Returns `None` rather than an empty page once `offset` runs past the
    /// end of the list.
    pub async fn list(
        &self,
        path: &str,
        offset: i64,
        page_size: Option<u32>,
    ) -> Result<Option<Vec<String>>> {
        if offset < 0 {
            return Err(InvalidArgument::Offset.into());
        }
        let page_size = page_size.unwrap_or(self.page_size);
        if page_size == 0 {
            return Err(InvalidArgument::PageSize.into());
        }
        check_path(path)?;

        let collection = self.collection().await?;
        let query = FindQuery::new(doc! { "path": path })
            .sort(newest_first())
            .collation(storage_collation())
            .skip(offset as u64)
            .limit(i64::from(page_size));
        let entries = self
            .provisioner
            .store()
            .find(&collection, query)
            .await
            .map_err(operation_error("list"))?;
        Ok(item_ids(entries))
    }

    /// Every item id in the list, newest first; `None` when empty
    pub async fn list_all(&self, path: &str) -> Result<Option<Vec<String>>> {
        check_path(path)?;
        let collection = self.collection().await?;
        let query = FindQuery::new(doc! { "path": path })
            .sort(newest_first())
            .collation(storage_collation());
        let entries = self
            .provisioner
            .store()
            .find(&collection, query)
            .await
            .map_err(operation_error("list_all"))?;
        Ok(item_ids(entries))
    }

    /// Remove at most one entry for the pair; missing pairs are not an error
    pub async fn remove(&self, path: &str, itemid: &str) -> Result<()> {
        check_pair(path, itemid)?;
        let collection = self.collection().await?;
        let removed = self
            .provisioner
            .store()
            .delete_one(&collection, ListEntryDoc::pair_filter(path, itemid))
            .await
            .map_err(operation_error("remove"))?;
        debug!("Removed {} entry for '{}' from '{}'", removed, itemid, path);
        Ok(())
    }

    /// Remove every list entry (test mode only)
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

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{DocumentStore, MemoryStore};
    use bson::oid::ObjectId;
    use std::sync::Arc;
    use tokio_test::assert_ok;

    fn list_store(page_size: u32) -> (Arc<MemoryStore>, ListStore) {
        let store = Arc::new(MemoryStore::new());
        let provisioner = CollectionProvisioner::new(store.clone());
        (store, ListStore::new(provisioner, page_size, true))
    }

    #[tokio::test]
    async fn test_add_is_idempotent() {
        let (_, lists) = list_store(10);
        lists.add("users/42/orders", "o1").await.unwrap();
        lists.add("users/42/orders", "o1").await.unwrap();

        assert!(lists.exists("users/42/orders", "o1").await.unwrap());
        assert_eq!(lists.count("users/42/orders").await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_lists_are_independent() {
        let (store, lists) = list_store(10);
        lists.add("a", "x").await.unwrap();
        lists.add("b", "x").await.unwrap();
        lists.add("b", "y").await.unwrap();

        assert_eq!(lists.count("a").await.unwrap(), 1);
        assert_eq!(lists.count("b").await.unwrap(), 2);
        assert!(!lists.exists("a", "y").await.unwrap());

        // One shared collection regardless of path
        assert_eq!(store.collection_names().await.unwrap(), vec!["lists".to_string()]);
    }

    #[tokio::test]
    async fn test_list_all_is_newest_first() {
        let (_, lists) = list_store(10);
        lists.add("users/42/orders", "o1").await.unwrap();
        tokio::time::sleep(std::time::Duration::from_millis(2)).await;
        lists.add("users/42/orders", "o2").await.unwrap();

        assert_eq!(
            lists.list_all("users/42/orders").await.unwrap(),
            Some(vec!["o2".to_string(), "o1".to_string()])
        );
    }

    #[tokio::test]
    async fn test_pages_reconstruct_full_list() {
        let (_, lists) = list_store(3);
        for i in 0..8 {
            lists.add("feed", &format!("item-{}", i)).await.unwrap();
        }

        let all = lists.list_all("feed").await.unwrap().unwrap();
        let mut paged = Vec::new();
        let mut offset = 0;
        while let Some(page) = lists.list("feed", offset, None).await.unwrap() {
            assert!(page.len() <= 3);
            offset += page.len() as i64;
            paged.extend(page);
        }

        assert_eq!(paged, all);
        assert_eq!(all.len(), 8);
    }

    #[tokio::test]
    async fn test_list_past_end_is_none() {
        let (_, lists) = list_store(10);
        lists.add("feed", "only").await.unwrap();

        assert_eq!(lists.list("feed", 1, Some(5)).await.unwrap(), None);
        assert_eq!(lists.list("empty", 0, None).await.unwrap(), None);
        assert_eq!(lists.list_all("empty").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_negative_offset_rejected() {
        let (store, lists) = list_store(10);
        let err = lists.list("feed", -1, Some(5)).await.unwrap_err();
        assert_eq!(err.invalid_argument(), Some(InvalidArgument::Offset));
        assert_eq!(store.create_collection_calls(), 0);
    }

    #[tokio::test]
    async fn test_zero_page_size_rejected() {
        let (_, lists) = list_store(10);
        let err = lists.list("feed", 0, Some(0)).await.unwrap_err();
        assert_eq!(err.invalid_argument(), Some(InvalidArgument::PageSize));
    }

    #[tokio::test]
    async fn test_remove_missing_pair_is_noop() {
        let (_, lists) = list_store(10);
        assert_ok!(lists.remove("feed", "ghost").await);
        assert!(!lists.exists("feed", "ghost").await.unwrap());

        lists.add("feed", "real").await.unwrap();
        lists.remove("feed", "real").await.unwrap();
        assert_eq!(lists.count("feed").await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_add_many_shares_timestamp_and_skips_dedup() {
        let (store, lists) = list_store(10);
        lists.add("a", "x").await.unwrap();
        lists
            .add_many(vec![("a", "x"), ("b", "y")])
            .await
            .unwrap();

        assert_eq!(lists.count("a").await.unwrap(), 2);

        let bulk = store
            .find(LIST_COLLECTION, FindQuery::new(doc! { "itemid": { "$in": ["x", "y"] } }))
            .await
            .unwrap();
        let created: Vec<i64> = bulk.iter().skip(1).map(|d| d.get_i64("created").unwrap()).collect();
        assert_eq!(created[0], created[1]);
    }

    #[tokio::test]
    async fn test_remove_drops_one_duplicate() {
        let (_, lists) = list_store(10);
        lists
            .add_many(vec![("feed", "dup"), ("feed", "dup"), ("feed", "other")])
            .await
            .unwrap();
        assert_eq!(lists.count("feed").await.unwrap(), 3);

        lists.remove("feed", "dup").await.unwrap();

        assert_eq!(lists.count("feed").await.unwrap(), 2);
        assert!(lists.exists("feed", "dup").await.unwrap());
    }

    #[tokio::test]
    async fn test_tied_timestamps_order_by_id() {
        let (store, lists) = list_store(2);
        // Inserted out of _id order, all sharing one timestamp
        for (last_byte, itemid) in [(2u8, "b"), (5, "e"), (1, "a"), (4, "d"), (3, "c")] {
            let mut id = [0u8; 12];
            id[11] = last_byte;
            store
                .insert_one(
                    LIST_COLLECTION,
                    doc! { "_id": ObjectId::from_bytes(id), "path": "feed", "itemid": itemid, "created": 7_i64 },
                )
                .await
                .unwrap();
        }

        let expected: Vec<String> = ["e", "d", "c", "b", "a"].iter().map(|s| s.to_string()).collect();
        assert_eq!(lists.list_all("feed").await.unwrap(), Some(expected.clone()));

        let mut paged = Vec::new();
        let mut offset = 0;
        while let Some(page) = lists.list("feed", offset, None).await.unwrap() {
            offset += page.len() as i64;
            paged.extend(page);
        }
        assert_eq!(paged, expected);

        let query = store.last_find().unwrap();
        assert_eq!(query.sort, Some(doc! { "created": -1, "_id": -1 }));
        assert_eq!(query.collation, Some(storage_collation()));
    }

    #[tokio::test]
    async fn test_add_many_pages_are_stable() {
        let (_, lists) = list_store(2);
        let pairs: Vec<(String, String)> = (0..5)
            .map(|i| ("feed".to_string(), format!("item-{}", i)))
            .collect();
        lists.add_many(pairs).await.unwrap();

        let all = lists.list_all("feed").await.unwrap().unwrap();
        let mut paged = Vec::new();
        let mut offset = 0;
        while let Some(page) = lists.list("feed", offset, None).await.unwrap() {
            offset += page.len() as i64;
            paged.extend(page);
        }

        assert_eq!(paged, all);
        assert_eq!(all.len(), 5);
    }

    #[tokio::test]
    async fn test_add_many_empty_is_noop() {
        let (store, lists) = list_store(10);
        let none: Vec<(String, String)> = Vec::new();
        lists.add_many(none).await.unwrap();
        assert_eq!(store.create_collection_calls(), 0);
    }

    #[tokio::test]
    async fn test_empty_path_or_itemid_rejected() {
        let (_, lists) = list_store(10);
        let err = lists.add("", "x").await.unwrap_err();
        assert_eq!(err.invalid_argument(), Some(InvalidArgument::Path));
        let err = lists.add("feed", "").await.unwrap_err();
        assert_eq!(err.invalid_argument(), Some(InvalidArgument::ItemId));
    }

    #[tokio::test]
    async fn test_store_failure_is_opaque() {
        let (store, lists) = list_store(10);
        lists.add("feed", "x").await.unwrap();
        store.set_failing(true);

        assert!(matches!(lists.count("feed").await, Err(StorageError::Operation)));
    }
}
