/*
 * Abstraction over the two storage services the pipeline writes to:
 * a blob store (raw messages, addressed by object key, with attachable
 * key-value metadata) and a document store (field maps addressed by
 * collection path + document id, queryable by field equality).
 *
 * Clients are built once at process startup through a Builder and shared
 * by every pipeline instance for the process lifetime.
 */

pub mod garage;
pub mod in_memory;

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StorageError {
    #[error("item not found")]
    NotFound,
    #[error("internal error")]
    Internal,
}

pub type Store = Arc<dyn IStore + Send + Sync>;
pub type Builder = Arc<dyn IBuilder + Send + Sync>;

#[async_trait]
pub trait IBuilder: std::fmt::Debug {
    /// Construct the store client. Called once per process; the resulting
    /// handle must be safe for concurrent use.
    async fn build(&self) -> Result<Store, StorageError>;
}

#[async_trait]
pub trait IStore {
    async fn blob_insert(&self, blob_val: BlobVal) -> Result<(), StorageError>;
    /// Replace the metadata attached to an existing object. Not atomic with
    /// the body write; the content type must be re-asserted because a
    /// metadata replace would otherwise reset it.
    async fn blob_set_meta(
        &self,
        blob_ref: &BlobRef,
        content_type: &str,
        meta: HashMap<String, String>,
    ) -> Result<(), StorageError>;
    async fn blob_fetch(&self, blob_ref: &BlobRef) -> Result<BlobVal, StorageError>;

    /// Equality lookup over the documents of a top-level collection.
    async fn doc_query(
        &self,
        collection: &str,
        field: &str,
        value: &str,
    ) -> Result<Vec<DocRef>, StorageError>;
    /// Full-document overwrite. `doc_ref.collection` may be a hierarchical
    /// path (`recipients/<id>/messages`).
    async fn doc_insert(&self, doc_ref: &DocRef, doc: Document) -> Result<(), StorageError>;
    async fn doc_fetch(&self, doc_ref: &DocRef) -> Result<Document, StorageError>;

    /// Bucket or container name, as published in storage references.
    fn bucket(&self) -> &str;
}

// ------ Blobs

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlobRef(pub String);

impl std::fmt::Display for BlobRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "blob {}", self.0)
    }
}

#[derive(Debug, Clone)]
pub struct BlobVal {
    pub blob_ref: BlobRef,
    pub content_type: String,
    pub meta: HashMap<String, String>,
    pub value: Vec<u8>,
}

impl BlobVal {
    pub fn new(blob_ref: BlobRef, content_type: &str, value: Vec<u8>) -> Self {
        Self {
            blob_ref,
            content_type: content_type.to_string(),
            meta: HashMap::new(),
            value,
        }
    }
}

// ------ Documents

pub type Document = serde_json::Map<String, serde_json::Value>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DocRef {
    pub collection: String,
    pub id: String,
}

impl DocRef {
    pub fn new(collection: &str, id: &str) -> Self {
        Self {
            collection: collection.to_string(),
            id: id.to_string(),
        }
    }
}

impl std::fmt::Display for DocRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "doc {}/{}", self.collection, self.id)
    }
}
