//! Blob document schema
//!
//! One document per logical file, holding either text `contents` or a
//! binary `buffer`.

use bson::{doc, oid::ObjectId, spec::BinarySubtype, Binary, DateTime, Document};
use mongodb::options::IndexOptions;
use serde::{Deserialize, Serialize};

use super::{storage_collation, IntoIndexes};

/// Collection name for blobs
pub const BLOB_COLLECTION: &str = "objects";

/// Blob document stored in MongoDB
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct BlobDoc {
    /// MongoDB document ID
    #[serde(skip_serializing_if = "Option::is_none")]
    pub _id: Option<ObjectId>,

    /// Storage key
    pub file: String,

    /// Text payload
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub contents: Option<String>,

    /// Binary payload
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub buffer: Option<Binary>,

    /// Set on first insert, never updated
    pub created: DateTime,
}

impl BlobDoc {
    /// Create a text blob
    pub fn text(file: &str, contents: &str) -> Self {
        Self {
            _id: None,
            file: file.to_string(),
            contents: Some(contents.to_string()),
            buffer: None,
            created: DateTime::now(),
        }
    }

    /// Create a binary blob
    pub fn binary(file: &str, bytes: &[u8]) -> Self {
        Self {
            _id: None,
            file: file.to_string(),
            contents: None,
            buffer: Some(Binary {
                subtype: BinarySubtype::Generic,
                bytes: bytes.to_vec(),
            }),
            created: DateTime::now(),
        }
    }

    /// Lookup filter for a key
    pub fn key_filter(file: &str) -> Document {
        doc! { "file": file }
    }
}

impl IntoIndexes for BlobDoc {
    fn into_indices() -> Vec<(Document, Option<IndexOptions>)> {
        vec![
            (
                doc! { "file": 1 },
                Some(
                    IndexOptions::builder()
                        .name("file_index".to_string())
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

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_text_blob_serializes_without_buffer() {
        let document = bson::to_document(&BlobDoc::text("reports/jan.txt", "")).unwrap();
        assert_eq!(document.get_str("file").unwrap(), "reports/jan.txt");
        assert_eq!(document.get_str("contents").unwrap(), "");
        assert!(!document.contains_key("buffer"));
        assert!(!document.contains_key("_id"));
    }

    #[test]
    fn test_binary_blob_round_trips_bytes() {
        let document = bson::to_document(&BlobDoc::binary("img.png", &[1, 2, 3])).unwrap();
        let parsed: BlobDoc = bson::from_document(document).unwrap();
        assert_eq!(parsed.buffer.unwrap().bytes, vec![1, 2, 3]);
        assert!(parsed.contents.is_none());
    }
}
