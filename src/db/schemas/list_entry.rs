//! List entry document schema

use bson::{doc, oid::ObjectId, Document};
use mongodb::options::IndexOptions;
use serde::{Deserialize, Serialize};

use super::{storage_collation, IntoIndexes};

/// Collection name for list membership
pub const LIST_COLLECTION: &str = "lists";

/// Membership of one item id under a list path
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct ListEntryDoc {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub _id: Option<ObjectId>,

    pub path: String,

    pub itemid: String,

    /// Milliseconds since the epoch
    pub created: i64,
}

impl ListEntryDoc {
    pub fn new(path: &str, itemid: &str, created: i64) -> Self {
        Self {
            _id: None,
            path: path.to_string(),
            itemid: itemid.to_string(),
            created,
        }
    }

    /// Filter selecting one (path, itemid) pair
    pub fn pair_filter(path: &str, itemid: &str) -> Document {
        doc! { "path": path, "itemid": itemid }
    }
}

impl IntoIndexes for ListEntryDoc {
    fn into_indices() -> Vec<(Document, Option<IndexOptions>)> {
        vec![
            (
                doc! { "path": 1 },
                Some(
                    IndexOptions::builder()
                        .name("path_index".to_string())
                        .collation(storage_collation())
                        .build(),
                ),
            ),
            (
                doc! { "created": -1 },
                Some(
                    IndexOptions::builder()
                        .name("created_desc".to_string())
                        .collation(storage_collation())
                        .build(),
                ),
            ),
        ]
    }
}
