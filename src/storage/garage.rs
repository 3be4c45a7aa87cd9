use std::collections::HashMap;
use std::sync::Arc;

use aws_sdk_s3::{
    self as s3,
    error::SdkError,
    operation::get_object::GetObjectError,
    types::MetadataDirective,
};
use serde::{Deserialize, Serialize};

use super::*;

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct GarageConf {
    pub region: String,
    pub s3_endpoint: String,
    pub bucket: String,
    // static credentials are for local development;
    // leave both unset to use ambient credentials
    pub aws_access_key_id: Option<String>,
    pub aws_secret_access_key: Option<String>,
}

#[derive(Clone, Debug)]
pub struct GarageBuilder {
    conf: GarageConf,
}

impl GarageBuilder {
    pub fn new(conf: GarageConf) -> Arc<Self> {
        Arc::new(Self { conf })
    }
}

#[async_trait]
impl IBuilder for GarageBuilder {
    async fn build(&self) -> Result<Store, StorageError> {
        let mut loader = aws_config::from_env()
            .region(aws_config::Region::new(self.conf.region.clone()))
            .endpoint_url(self.conf.s3_endpoint.clone());

        if let (Some(key_id), Some(secret)) = (
            self.conf.aws_access_key_id.as_ref(),
            self.conf.aws_secret_access_key.as_ref(),
        ) {
            let s3_creds =
                s3::config::Credentials::new(key_id.clone(), secret.clone(), None, None, "mailstash");
            loader = loader.credentials_provider(s3_creds);
        }

        let sdk_config = loader.load().await;

        let s3_config = aws_sdk_s3::config::Builder::from(&sdk_config)
            .force_path_style(true)
            .build();

        let s3_client = aws_sdk_s3::Client::from_conf(s3_config);

        Ok(Arc::new(GarageStore {
            bucket: self.conf.bucket.clone(),
            s3: s3_client,
        }))
    }
}

pub struct GarageStore {
    bucket: String,
    s3: s3::Client,
}

impl GarageStore {
    async fn object_fetch(&self, key: &str) -> Result<s3::operation::get_object::GetObjectOutput, StorageError> {
        let maybe_out = self
            .s3
            .get_object()
            .bucket(self.bucket.to_string())
            .key(key.to_string())
            .send()
            .await;

        match maybe_out {
            Ok(output) => Ok(output),
            Err(SdkError::ServiceError(x)) => match x.err() {
                GetObjectError::NoSuchKey(_) => Err(StorageError::NotFound),
                e => {
                    tracing::warn!("Object fetch error, service error: {}", e);
                    Err(StorageError::Internal)
                }
            },
            Err(e) => {
                tracing::warn!("Object fetch error, {}", e);
                Err(StorageError::Internal)
            }
        }
    }

    async fn collect_body(
        &self,
        key: &str,
        output: s3::operation::get_object::GetObjectOutput,
    ) -> Result<(Vec<u8>, Option<String>, HashMap<String, String>), StorageError> {
        let content_type = output.content_type.clone();
        let meta = output.metadata.clone().unwrap_or_default();
        let buffer = match output.body.collect().await {
            Ok(aggreg) => aggreg.to_vec(),
            Err(e) => {
                tracing::warn!("Fetching body of {} failed with {}", key, e);
                return Err(StorageError::Internal);
            }
        };
        Ok((buffer, content_type, meta))
    }
}

#[async_trait]
impl IStore for GarageStore {
    async fn blob_insert(&self, blob_val: BlobVal) -> Result<(), StorageError> {
        tracing::trace!(entry=%blob_val.blob_ref, command="blob_insert");
        let streamable_value = s3::primitives::ByteStream::from(blob_val.value);
        let obj_key = blob_val.blob_ref.0;

        let maybe_send = self
            .s3
            .put_object()
            .bucket(self.bucket.to_string())
            .key(obj_key.to_string())
            .content_type(blob_val.content_type)
            .set_metadata(Some(blob_val.meta))
            .body(streamable_value)
            .send()
            .await;

        match maybe_send {
            Err(e) => {
                tracing::error!("unable to send object: {}", e);
                Err(StorageError::Internal)
            }
            Ok(_) => {
                tracing::debug!("Inserted {}/{}", self.bucket, obj_key);
                Ok(())
            }
        }
    }

    async fn blob_set_meta(
        &self,
        blob_ref: &BlobRef,
        content_type: &str,
        meta: HashMap<String, String>,
    ) -> Result<(), StorageError> {
        tracing::trace!(entry=%blob_ref, command="blob_set_meta");
        // S3 has no in-place metadata update; a self-copy with the REPLACE
        // directive rewrites the attached metadata under the same key.
        let maybe_copy = self
            .s3
            .copy_object()
            .bucket(self.bucket.to_string())
            .key(blob_ref.0.clone())
            .copy_source(format!("/{}/{}", self.bucket, blob_ref.0))
            .metadata_directive(MetadataDirective::Replace)
            .content_type(content_type)
            .set_metadata(Some(meta))
            .send()
            .await;

        match maybe_copy {
            Err(e) => {
                tracing::error!(
                    "unable to set metadata on {} (bucket: {}), error: {}",
                    blob_ref.0,
                    self.bucket,
                    e
                );
                Err(StorageError::Internal)
            }
            Ok(_) => {
                tracing::debug!("set metadata on {} (bucket: {})", blob_ref.0, self.bucket);
                Ok(())
            }
        }
    }

    async fn blob_fetch(&self, blob_ref: &BlobRef) -> Result<BlobVal, StorageError> {
        tracing::trace!(entry=%blob_ref, command="blob_fetch");
        let output = self.object_fetch(&blob_ref.0).await?;
        let (buffer, content_type, meta) = self.collect_body(&blob_ref.0, output).await?;

        tracing::debug!("Fetched {}/{}", self.bucket, blob_ref.0);
        Ok(BlobVal {
            blob_ref: blob_ref.clone(),
            content_type: content_type.unwrap_or_default(),
            meta,
            value: buffer,
        })
    }

    async fn doc_query(
        &self,
        collection: &str,
        field: &str,
        value: &str,
    ) -> Result<Vec<DocRef>, StorageError> {
        tracing::trace!(collection = collection, field = field, command = "doc_query");
        let prefix = format!("{}/", collection);
        let maybe_list = self
            .s3
            .list_objects_v2()
            .bucket(self.bucket.to_string())
            .prefix(prefix.clone())
            .into_paginator()
            .send()
            .try_collect()
            .await;

        let keys = match maybe_list {
            Err(e) => {
                tracing::error!(
                    "listing prefix {} on bucket {} failed: {}",
                    prefix,
                    self.bucket,
                    e
                );
                return Err(StorageError::Internal);
            }
            Ok(pagin_list_out) => pagin_list_out
                .into_iter()
                .flat_map(|list_out| list_out.contents.unwrap_or_default())
                .filter_map(|obj| obj.key)
                .collect::<Vec<_>>(),
        };

        let mut matches = vec![];
        for key in keys {
            let doc_id = match key.strip_prefix(&prefix) {
                // skip objects in nested sub-collections
                Some(rest) if !rest.is_empty() && !rest.contains('/') => rest.to_string(),
                _ => continue,
            };
            let doc = self.doc_fetch(&DocRef::new(collection, &doc_id)).await?;
            if doc.get(field).and_then(|v| v.as_str()) == Some(value) {
                matches.push(DocRef::new(collection, &doc_id));
            }
        }
        tracing::debug!(match_count = matches.len(), command = "doc_query");
        Ok(matches)
    }

    async fn doc_insert(&self, doc_ref: &DocRef, doc: Document) -> Result<(), StorageError> {
        tracing::trace!(entry=%doc_ref, command="doc_insert");
        let body = match serde_json::to_vec(&doc) {
            Ok(body) => body,
            Err(e) => {
                tracing::error!("unable to serialize document {}: {}", doc_ref, e);
                return Err(StorageError::Internal);
            }
        };

        let obj_key = format!("{}/{}", doc_ref.collection, doc_ref.id);
        let maybe_send = self
            .s3
            .put_object()
            .bucket(self.bucket.to_string())
            .key(obj_key.clone())
            .content_type("application/json")
            .body(s3::primitives::ByteStream::from(body))
            .send()
            .await;

        match maybe_send {
            Err(e) => {
                tracing::error!("unable to write document {}: {}", doc_ref, e);
                Err(StorageError::Internal)
            }
            Ok(_) => {
                tracing::debug!("Wrote {}/{}", self.bucket, obj_key);
                Ok(())
            }
        }
    }

    async fn doc_fetch(&self, doc_ref: &DocRef) -> Result<Document, StorageError> {
        tracing::trace!(entry=%doc_ref, command="doc_fetch");
        let obj_key = format!("{}/{}", doc_ref.collection, doc_ref.id);
        let output = self.object_fetch(&obj_key).await?;
        let (buffer, _, _) = self.collect_body(&obj_key, output).await?;

        match serde_json::from_slice(&buffer) {
            Ok(doc) => Ok(doc),
            Err(e) => {
                tracing::error!("document {} is not valid JSON: {}", doc_ref, e);
                Err(StorageError::Internal)
            }
        }
    }

    fn bucket(&self) -> &str {
        &self.bucket
    }
}
