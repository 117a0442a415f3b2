//! In-memory document store
//!
//! Implements the query subset the adapter relies on (equality and `$in`
//! filters, `$set` updates, sort/skip/limit, inclusion projections) over
//! plain BSON documents. Collation is recorded but not applied: strings
//! compare byte-wise. Used by the test suites and the CLI `--memory` mode.

use async_trait::async_trait;
use bson::{oid::ObjectId, Bson, Document};
use mongodb::IndexModel;
use std::cmp::Ordering;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering as AtomicOrdering};
use std::sync::Mutex;
use tokio::sync::RwLock;

use super::store::{DbError, DbResult, DocumentStore, FindQuery};

#[derive(Default)]
struct MemCollection {
    /// Documents tagged with their insertion sequence number
    documents: Vec<(u64, Document)>,
    indexes: Vec<IndexModel>,
}

/// Document store held entirely in process memory
#[derive(Default)]
pub struct MemoryStore {
    collections: RwLock<HashMap<String, MemCollection>>,
    next_seq: AtomicU64,
    create_collection_calls: AtomicU32,
    create_index_calls: AtomicU32,
    failing: AtomicBool,
    last_find: Mutex<Option<FindQuery>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every subsequent call fail with a database error
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, AtomicOrdering::SeqCst);
    }

    /// Number of `create_collection` calls received
    pub fn create_collection_calls(&self) -> u32 {
        self.create_collection_calls.load(AtomicOrdering::SeqCst)
    }

    /// Number of `create_index` calls received
    pub fn create_index_calls(&self) -> u32 {
        self.create_index_calls.load(AtomicOrdering::SeqCst)
    }

    /// The most recent query passed to `find`
    pub fn last_find(&self) -> Option<FindQuery> {
        self.last_find.lock().ok().and_then(|query| query.clone())
    }

    fn check_available(&self) -> DbResult<()> {
        if self.failing.load(AtomicOrdering::SeqCst) {
            return Err(DbError::Database("simulated store failure".to_string()));
        }
        Ok(())
    }

    fn next_seq(&self) -> u64 {
        self.next_seq.fetch_add(1, AtomicOrdering::SeqCst)
    }

    fn prepare(&self, mut document: Document) -> (u64, Document) {
        if !document.contains_key("_id") {
            document.insert("_id", ObjectId::new());
        }
        (self.next_seq(), document)
    }
}

// ============================================================================
// Query evaluation
// ============================================================================

fn as_number(value: &Bson) -> Option<f64> {
    match value {
        Bson::Int32(v) => Some(*v as f64),
        Bson::Int64(v) => Some(*v as f64),
        Bson::Double(v) => Some(*v),
        _ => None,
    }
}

fn values_equal(a: &Bson, b: &Bson) -> bool {
    match (as_number(a), as_number(b)) {
        (Some(x), Some(y)) => x == y,
        _ => a == b,
    }
}

fn compare_values(a: Option<&Bson>, b: Option<&Bson>) -> Ordering {
    match (a, b) {
        (None, None) => Ordering::Equal,
        (None, Some(_)) => Ordering::Less,
        (Some(_), None) => Ordering::Greater,
        (Some(a), Some(b)) => {
            if let (Some(x), Some(y)) = (as_number(a), as_number(b)) {
                return x.partial_cmp(&y).unwrap_or(Ordering::Equal);
            }
            match (a, b) {
                (Bson::String(x), Bson::String(y)) => x.cmp(y),
                (Bson::DateTime(x), Bson::DateTime(y)) => x.cmp(y),
                (Bson::ObjectId(x), Bson::ObjectId(y)) => x.bytes().cmp(&y.bytes()),
                (Bson::Boolean(x), Bson::Boolean(y)) => x.cmp(y),
                _ => Ordering::Equal,
            }
        }
    }
}

fn field_matches(actual: Option<&Bson>, expected: &Bson) -> bool {
    if let Bson::Document(operators) = expected {
        if operators.keys().all(|k| k.starts_with('$')) && !operators.is_empty() {
            return operators.iter().all(|(op, arg)| match (op.as_str(), arg) {
                ("$in", Bson::Array(candidates)) => actual
                    .map(|value| candidates.iter().any(|c| values_equal(value, c)))
                    .unwrap_or(false),
                _ => false,
            });
        }
    }
    actual.map(|value| values_equal(value, expected)).unwrap_or(false)
}

fn matches(document: &Document, filter: &Document) -> bool {
    filter
        .iter()
        .all(|(field, expected)| field_matches(document.get(field), expected))
}

fn is_descending(direction: &Bson) -> bool {
    as_number(direction).map(|d| d < 0.0).unwrap_or(false)
}

/// Ties fall back to insertion order, in the direction of the last sort key
fn sort_documents(documents: &mut [(u64, Document)], sort: &Document) {
    let tie_descending = sort.iter().last().map(|(_, d)| is_descending(d)).unwrap_or(false);

    documents.sort_by(|(seq_a, a), (seq_b, b)| {
        for (field, direction) in sort {
            let mut ord = compare_values(a.get(field), b.get(field));
            if is_descending(direction) {
                ord = ord.reverse();
            }
            if ord != Ordering::Equal {
                return ord;
            }
        }
        if tie_descending {
            seq_b.cmp(seq_a)
        } else {
            seq_a.cmp(seq_b)
        }
    });
}

fn project(document: Document, projection: &Document) -> Document {
    let included: Vec<&String> = projection
        .iter()
        .filter(|(_, v)| as_number(v).map(|n| n != 0.0).unwrap_or(matches!(v, Bson::Boolean(true))))
        .map(|(k, _)| k)
        .collect();

    if included.is_empty() {
        return document;
    }

    document
        .into_iter()
        .filter(|(k, _)| k == "_id" || included.iter().any(|f| *f == k))
        .collect()
}

fn apply_update(document: &mut Document, update: &Document) -> DbResult<()> {
    for (op, fields) in update {
        let fields = fields
            .as_document()
            .ok_or_else(|| DbError::Database(format!("{} expects a document", op)))?;
        match op.as_str() {
            "$set" => {
                for (k, v) in fields {
                    document.insert(k.clone(), v.clone());
                }
            }
            other => return Err(DbError::Database(format!("unsupported update operator {}", other))),
        }
    }
    Ok(())
}

// ============================================================================
// DocumentStore
// ============================================================================

#[async_trait]
impl DocumentStore for MemoryStore {
    async fn collection_names(&self) -> DbResult<Vec<String>> {
        self.check_available()?;
        let collections = self.collections.read().await;
        let mut names: Vec<String> = collections.keys().cloned().collect();
        names.sort();
        Ok(names)
    }

    async fn create_collection(&self, name: &str) -> DbResult<()> {
        self.create_collection_calls.fetch_add(1, AtomicOrdering::SeqCst);
        self.check_available()?;
        let mut collections = self.collections.write().await;
        if collections.contains_key(name) {
            return Err(DbError::NamespaceExists(name.to_string()));
        }
        collections.insert(name.to_string(), MemCollection::default());
        Ok(())
    }

    async fn list_indexes(&self, collection: &str) -> DbResult<Vec<IndexModel>> {
        self.check_available()?;
        let collections = self.collections.read().await;
        Ok(collections
            .get(collection)
            .map(|c| c.indexes.clone())
            .unwrap_or_default())
    }

    async fn create_index(&self, collection: &str, index: IndexModel) -> DbResult<()> {
        self.create_index_calls.fetch_add(1, AtomicOrdering::SeqCst);
        self.check_available()?;
        let mut collections = self.collections.write().await;
        let entry = collections.entry(collection.to_string()).or_default();
        if !entry.indexes.iter().any(|existing| existing.keys == index.keys) {
            entry.indexes.push(index);
        }
        Ok(())
    }

    async fn find(&self, collection: &str, query: FindQuery) -> DbResult<Vec<Document>> {
        self.check_available()?;
        if let Ok(mut last) = self.last_find.lock() {
            *last = Some(query.clone());
        }
        let collections = self.collections.read().await;
        let Some(coll) = collections.get(collection) else {
            return Ok(Vec::new());
        };

        let mut found: Vec<(u64, Document)> = coll
            .documents
            .iter()
            .filter(|(_, d)| matches(d, &query.filter))
            .cloned()
            .collect();

        if let Some(sort) = &query.sort {
            sort_documents(&mut found, sort);
        }

        let skip = query.skip.unwrap_or(0) as usize;
        let limit = match query.limit {
            Some(0) | None => usize::MAX,
            Some(n) => n.unsigned_abs() as usize,
        };

        Ok(found
            .into_iter()
            .skip(skip)
            .take(limit)
            .map(|(_, d)| match &query.projection {
                Some(projection) => project(d, projection),
                None => d,
            })
            .collect())
    }

    async fn find_one(
        &self,
        collection: &str,
        filter: Document,
        projection: Option<Document>,
    ) -> DbResult<Option<Document>> {
        let mut query = FindQuery::new(filter).limit(1);
        query.projection = projection;
        Ok(self.find(collection, query).await?.into_iter().next())
    }

    async fn insert_one(&self, collection: &str, document: Document) -> DbResult<()> {
        self.check_available()?;
        let prepared = self.prepare(document);
        let mut collections = self.collections.write().await;
        collections
            .entry(collection.to_string())
            .or_default()
            .documents
            .push(prepared);
        Ok(())
    }

    async fn insert_many(&self, collection: &str, documents: Vec<Document>) -> DbResult<()> {
        self.check_available()?;
        let prepared: Vec<(u64, Document)> =
            documents.into_iter().map(|d| self.prepare(d)).collect();
        let mut collections = self.collections.write().await;
        collections
            .entry(collection.to_string())
            .or_default()
            .documents
            .extend(prepared);
        Ok(())
    }

    async fn update_one(
        &self,
        collection: &str,
        filter: Document,
        update: Document,
    ) -> DbResult<u64> {
        self.check_available()?;
        let mut collections = self.collections.write().await;
        let Some(coll) = collections.get_mut(collection) else {
            return Ok(0);
        };
        match coll.documents.iter_mut().find(|(_, d)| matches(d, &filter)) {
            Some((_, document)) => {
                apply_update(document, &update)?;
                Ok(1)
            }
            None => Ok(0),
        }
    }

    async fn delete_one(&self, collection: &str, filter: Document) -> DbResult<u64> {
        self.check_available()?;
        let mut collections = self.collections.write().await;
        let Some(coll) = collections.get_mut(collection) else {
            return Ok(0);
        };
        match coll.documents.iter().position(|(_, d)| matches(d, &filter)) {
            Some(index) => {
                coll.documents.remove(index);
                Ok(1)
            }
            None => Ok(0),
        }
    }

    async fn delete_many(&self, collection: &str, filter: Document) -> DbResult<u64> {
        self.check_available()?;
        let mut collections = self.collections.write().await;
        let Some(coll) = collections.get_mut(collection) else {
            return Ok(0);
        };
        let before = coll.documents.len();
        coll.documents.retain(|(_, d)| !matches(d, &filter));
        Ok((before - coll.documents.len()) as u64)
    }

    async fn count_documents(&self, collection: &str, filter: Document) -> DbResult<u64> {
        self.check_available()?;
        let collections = self.collections.read().await;
        Ok(collections
            .get(collection)
            .map(|c| c.documents.iter().filter(|(_, d)| matches(d, &filter)).count() as u64)
            .unwrap_or(0))
    }
}
