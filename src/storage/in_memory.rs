use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use super::*;

/// A complete in-process implementation of the storage interface, used by
/// the test suite and by local development without a Garage deployment.
#[derive(Clone, Debug)]
pub struct MemBuilder {
    store: Arc<MemStore>,
}

impl MemBuilder {
    pub fn new(bucket: &str) -> Arc<Self> {
        Arc::new(Self {
            store: MemStore::new(bucket),
        })
    }

    /// Direct handle on the underlying store, for test inspection.
    pub fn inner(&self) -> Arc<MemStore> {
        self.store.clone()
    }
}

#[async_trait]
impl IBuilder for MemBuilder {
    async fn build(&self) -> Result<Store, StorageError> {
        Ok(self.store.clone())
    }
}

#[derive(Debug, Clone)]
struct MemBlob {
    content_type: String,
    meta: HashMap<String, String>,
    value: Vec<u8>,
}

#[derive(Debug)]
pub struct MemStore {
    bucket: String,
    blobs: RwLock<HashMap<String, MemBlob>>,
    docs: RwLock<HashMap<(String, String), Document>>,
}

impl MemStore {
    pub fn new(bucket: &str) -> Arc<Self> {
        Arc::new(Self {
            bucket: bucket.to_string(),
            blobs: RwLock::new(HashMap::new()),
            docs: RwLock::new(HashMap::new()),
        })
    }

    pub fn blob_keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.blobs.read().unwrap().keys().cloned().collect();
        keys.sort();
        keys
    }

    pub fn doc_ids(&self, collection: &str) -> Vec<String> {
        let mut ids: Vec<String> = self
            .docs
            .read()
            .unwrap()
            .keys()
            .filter(|(c, _)| c == collection)
            .map(|(_, id)| id.clone())
            .collect();
        ids.sort();
        ids
    }
}

#[async_trait]
impl IStore for MemStore {
    async fn blob_insert(&self, blob_val: BlobVal) -> Result<(), StorageError> {
        tracing::trace!(entry=%blob_val.blob_ref, command="blob_insert");
        self.blobs.write().unwrap().insert(
            blob_val.blob_ref.0,
            MemBlob {
                content_type: blob_val.content_type,
                meta: blob_val.meta,
                value: blob_val.value,
            },
        );
        Ok(())
    }

    async fn blob_set_meta(
        &self,
        blob_ref: &BlobRef,
        content_type: &str,
        meta: HashMap<String, String>,
    ) -> Result<(), StorageError> {
        tracing::trace!(entry=%blob_ref, command="blob_set_meta");
        match self.blobs.write().unwrap().get_mut(&blob_ref.0) {
            None => Err(StorageError::NotFound),
            Some(blob) => {
                blob.content_type = content_type.to_string();
                blob.meta = meta;
                Ok(())
            }
        }
    }

    async fn blob_fetch(&self, blob_ref: &BlobRef) -> Result<BlobVal, StorageError> {
        tracing::trace!(entry=%blob_ref, command="blob_fetch");
        match self.blobs.read().unwrap().get(&blob_ref.0) {
            None => Err(StorageError::NotFound),
            Some(blob) => Ok(BlobVal {
                blob_ref: blob_ref.clone(),
                content_type: blob.content_type.clone(),
                meta: blob.meta.clone(),
                value: blob.value.clone(),
            }),
        }
    }

    async fn doc_query(
        &self,
        collection: &str,
        field: &str,
        value: &str,
    ) -> Result<Vec<DocRef>, StorageError> {
        tracing::trace!(collection = collection, field = field, command = "doc_query");
        let mut matches: Vec<DocRef> = self
            .docs
            .read()
            .unwrap()
            .iter()
            .filter(|((c, _), doc)| {
                c == collection && doc.get(field).and_then(|v| v.as_str()) == Some(value)
            })
            .map(|((c, id), _)| DocRef::new(c, id))
            .collect();
        matches.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(matches)
    }

    async fn doc_insert(&self, doc_ref: &DocRef, doc: Document) -> Result<(), StorageError> {
        tracing::trace!(entry=%doc_ref, command="doc_insert");
        self.docs
            .write()
            .unwrap()
            .insert((doc_ref.collection.clone(), doc_ref.id.clone()), doc);
        Ok(())
    }

    async fn doc_fetch(&self, doc_ref: &DocRef) -> Result<Document, StorageError> {
        tracing::trace!(entry=%doc_ref, command="doc_fetch");
        self.docs
            .read()
            .unwrap()
            .get(&(doc_ref.collection.clone(), doc_ref.id.clone()))
            .cloned()
            .ok_or(StorageError::NotFound)
    }

    fn bucket(&self) -> &str {
        &self.bucket
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn doc_query_matches_on_field_equality() {
        let store = MemStore::new("test-bucket");

        let mut alice = Document::new();
        alice.insert("notification_email".into(), "a@example.com".into());
        store
            .doc_insert(&DocRef::new("recipients", "alice"), alice)
            .await
            .unwrap();

        let mut bob = Document::new();
        bob.insert("notification_email".into(), "b@example.com".into());
        store
            .doc_insert(&DocRef::new("recipients", "bob"), bob)
            .await
            .unwrap();

        let found = store
            .doc_query("recipients", "notification_email", "a@example.com")
            .await
            .unwrap();
        assert_eq!(found, vec![DocRef::new("recipients", "alice")]);

        let none = store
            .doc_query("recipients", "notification_email", "nobody@example.com")
            .await
            .unwrap();
        assert!(none.is_empty());
    }

    #[tokio::test]
    async fn blob_set_meta_requires_existing_object() {
        let store = MemStore::new("test-bucket");
        let missing = store
            .blob_set_meta(&BlobRef("nope".into()), "text/plain", HashMap::new())
            .await;
        assert_eq!(missing, Err(StorageError::NotFound));
    }
}
