//! MongoDB client and document store implementation
//!
//! Connection handling follows the gateway's client wrapper: a bounded
//! server-selection timeout so an unreachable server fails fast, then a
//! `ping` to verify the connection before anything is provisioned.

use async_trait::async_trait;
use bson::{doc, Document};
use futures_util::TryStreamExt;
use mongodb::{
    error::ErrorKind,
    options::{
        Acknowledgment, FindOneOptions, FindOptions, InsertManyOptions, InsertOneOptions,
        WriteConcern,
    },
    Client, Collection, Database, IndexModel,
};
use tracing::{debug, info};

use super::store::{DbError, DbResult, DocumentStore, FindQuery};
use crate::types::StorageError;

/// Server error code for "collection already exists"
const NAMESPACE_EXISTS: i32 = 48;

/// MongoDB client wrapper
#[derive(Clone)]
pub struct MongoClient {
    client: Client,
    db_name: String,
}

impl MongoClient {
    /// Connect and verify the connection with a ping
    pub async fn new(uri: &str, db_name: &str) -> Result<Self, StorageError> {
        info!("Connecting to MongoDB at {}", uri);

        let timeout_uri = if uri.contains('?') {
            format!("{}&serverSelectionTimeoutMS=3000&connectTimeoutMS=3000", uri)
        } else {
            format!("{}?serverSelectionTimeoutMS=3000&connectTimeoutMS=3000", uri)
        };

        let client = Client::with_uri_str(&timeout_uri)
            .await
            .map_err(|e| StorageError::Connection(format!("Failed to connect to MongoDB: {}", e)))?;

        client
            .database(db_name)
            .run_command(doc! { "ping": 1 })
            .await
            .map_err(|e| StorageError::Connection(format!("MongoDB ping failed: {}", e)))?;

        info!("Connected to MongoDB database '{}'", db_name);

        Ok(Self {
            client,
            db_name: db_name.to_string(),
        })
    }

    /// Document store view over the configured database
    pub fn store(&self) -> MongoDocumentStore {
        MongoDocumentStore {
            db: self.client.database(&self.db_name),
        }
    }
}

/// [`DocumentStore`] backed by a MongoDB database
#[derive(Clone)]
pub struct MongoDocumentStore {
    db: Database,
}

impl MongoDocumentStore {
    fn collection(&self, name: &str) -> Collection<Document> {
        self.db.collection::<Document>(name)
    }

    fn write_concern() -> WriteConcern {
        WriteConcern::builder().w(Acknowledgment::Nodes(1)).build()
    }
}

fn is_primary_key_index(index: &IndexModel) -> bool {
    index.keys.len() == 1 && index.keys.contains_key("_id")
}

#[async_trait]
impl DocumentStore for MongoDocumentStore {
    async fn collection_names(&self) -> DbResult<Vec<String>> {
        Ok(self.db.list_collection_names().await?)
    }

    async fn create_collection(&self, name: &str) -> DbResult<()> {
        match self.db.create_collection(name).await {
            Ok(()) => {
                debug!("Created collection '{}'", name);
                Ok(())
            }
            Err(e) => {
                let exists = matches!(
                    e.kind.as_ref(),
                    ErrorKind::Command(cmd) if cmd.code == NAMESPACE_EXISTS
                );
                if exists {
                    Err(DbError::NamespaceExists(name.to_string()))
                } else {
                    Err(e.into())
                }
            }
        }
    }

    async fn list_indexes(&self, collection: &str) -> DbResult<Vec<IndexModel>> {
        let indexes: Vec<IndexModel> = self
            .collection(collection)
            .list_indexes()
            .await?
            .try_collect()
            .await?;

        Ok(indexes
            .into_iter()
            .filter(|index| !is_primary_key_index(index))
            .collect())
    }

    async fn create_index(&self, collection: &str, index: IndexModel) -> DbResult<()> {
        self.collection(collection).create_index(index).await?;
        Ok(())
    }

    async fn find(&self, collection: &str, query: FindQuery) -> DbResult<Vec<Document>> {
        let options = FindOptions::builder()
            .sort(query.sort)
            .skip(query.skip)
            .limit(query.limit)
            .projection(query.projection)
            .collation(query.collation)
            .build();

        let documents = self
            .collection(collection)
            .find(query.filter)
            .with_options(options)
            .await?
            .try_collect()
            .await?;

        Ok(documents)
    }

    async fn find_one(
        &self,
        collection: &str,
        filter: Document,
        projection: Option<Document>,
    ) -> DbResult<Option<Document>> {
        let options = FindOneOptions::builder().projection(projection).build();

        Ok(self
            .collection(collection)
            .find_one(filter)
            .with_options(options)
            .await?)
    }

    async fn insert_one(&self, collection: &str, document: Document) -> DbResult<()> {
        let options = InsertOneOptions::builder()
            .write_concern(Self::write_concern())
            .build();

        self.collection(collection)
            .insert_one(document)
            .with_options(options)
            .await?;
        Ok(())
    }

    async fn insert_many(&self, collection: &str, documents: Vec<Document>) -> DbResult<()> {
        let options = InsertManyOptions::builder()
            .write_concern(Self::write_concern())
            .build();

        self.collection(collection)
            .insert_many(documents)
            .with_options(options)
            .await?;
        Ok(())
    }

    async fn update_one(
        &self,
        collection: &str,
        filter: Document,
        update: Document,
    ) -> DbResult<u64> {
        let result = self.collection(collection).update_one(filter, update).await?;
        Ok(result.matched_count)
    }

    async fn delete_one(&self, collection: &str, filter: Document) -> DbResult<u64> {
        let result = self.collection(collection).delete_one(filter).await?;
        Ok(result.deleted_count)
    }

    async fn delete_many(&self, collection: &str, filter: Document) -> DbResult<u64> {
        let result = self.collection(collection).delete_many(filter).await?;
        Ok(result.deleted_count)
    }

    async fn count_documents(&self, collection: &str, filter: Document) -> DbResult<u64> {
        Ok(self.collection(collection).count_documents(filter).await?)
    }
}
