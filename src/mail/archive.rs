use std::collections::HashMap;

use crate::error::IngestError;
use crate::mail::ident::MessageId;
use crate::mail::view::MailView;
use crate::storage::{BlobRef, BlobVal, Store};
use crate::timestamp::{now_msec, now_rfc3339};

pub const ARCHIVE_PREFIX: &str = "emails/";
const ARCHIVE_SUFFIX: &str = ".eml";
const ARCHIVE_CONTENT_TYPE: &str = "message/rfc822";

/// Where one archived message lives: the hand-off value published by the
/// archival stage and consumed read-only by the metadata stage. Absent from
/// the per-message context when no archival stage ran.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StorageReference {
    pub bucket: String,
    pub object_key: String,
    pub message_id: String,
    pub location: String,
}

/// Upload the raw message under `emails/<id>.eml`, then attach descriptive
/// metadata as a second write.
///
/// The two writes are not atomic: body-written-but-metadata-failed is an
/// observable partial state that surfaces as a persistence error and a
/// soft-retry of the whole stage. The key is derived from the message
/// identifier, so a retried upload overwrites the same object.
pub async fn archive(
    store: &Store,
    view: &MailView,
    raw: &[u8],
) -> Result<StorageReference, IngestError> {
    let message_id = match MessageId::resolve(view) {
        MessageId::Embedded(id) => id,
        // a timestamp suffix keeps concurrent generated ids apart
        MessageId::Generated(token) => format!("{}{}", token, now_msec()),
    };

    let object_key = format!("{}{}{}", ARCHIVE_PREFIX, message_id, ARCHIVE_SUFFIX);
    let blob_ref = BlobRef(object_key.clone());

    store
        .blob_insert(BlobVal::new(
            blob_ref.clone(),
            ARCHIVE_CONTENT_TYPE,
            raw.to_vec(),
        ))
        .await?;

    let mut meta = HashMap::new();
    meta.insert("message-id".to_string(), message_id.clone());
    meta.insert("subject".to_string(), view.subject.clone());
    meta.insert("from".to_string(), view.from.clone());
    meta.insert("to".to_string(), view.to.clone());
    meta.insert(
        "date".to_string(),
        view.date.clone().unwrap_or_else(now_rfc3339),
    );
    store
        .blob_set_meta(&blob_ref, ARCHIVE_CONTENT_TYPE, meta)
        .await?;

    let bucket = store.bucket().to_string();
    let location = format!("s3://{}/{}", bucket, object_key);
    Ok(StorageReference {
        bucket,
        object_key,
        message_id,
        location,
    })
}
