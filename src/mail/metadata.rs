use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::config::IngestConfig;
use crate::error::IngestError;
use crate::mail::archive::StorageReference;
use crate::mail::ident::MessageId;
use crate::mail::view::MailView;
use crate::storage::{DocRef, Document, StorageError, Store};
use crate::timestamp::now_rfc3339;

/// Recipient-record field matched by equality against the message's first
/// "to" address.
const RECIPIENT_EMAIL_FIELD: &str = "notification_email";

/// The document persisted per message, keyed by message identifier under
/// the recipient's sub-collection. Written once with full-overwrite
/// semantics: re-processing the same identifier replaces the document
/// instead of duplicating it.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MetadataRecord {
    pub message_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bucket_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub object_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub storage_url: Option<String>,
    pub subject: String,
    pub from: String,
    pub to: String,
    pub cc: String,
    pub cc_addresses: Vec<String>,
    pub bcc: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub in_reply_to: Option<String>,
    /// Declared date, or processing time when the message carries none.
    pub date: String,
    /// Always processing time.
    pub recorded_at: String,
    pub attachments_count: usize,
    pub plain_text_length: usize,
}

impl MetadataRecord {
    pub fn build(view: &MailView, message_id: &str, reference: Option<&StorageReference>) -> Self {
        Self {
            message_id: message_id.to_string(),
            bucket_name: reference.map(|r| r.bucket.clone()),
            object_name: reference.map(|r| r.object_key.clone()),
            storage_url: reference.map(|r| r.location.clone()),
            subject: view.subject.clone(),
            from: view.from.clone(),
            to: view.to.clone(),
            cc: view.cc.clone(),
            cc_addresses: view.cc_addresses.clone(),
            bcc: view.bcc.clone(),
            in_reply_to: view.in_reply_to.clone(),
            date: view.date.clone().unwrap_or_else(now_rfc3339),
            recorded_at: now_rfc3339(),
            attachments_count: view.attachment_count,
            plain_text_length: view.text_len,
        }
    }

    fn to_document(&self) -> Result<Document, IngestError> {
        match serde_json::to_value(self) {
            Ok(serde_json::Value::Object(map)) => Ok(map),
            _ => Err(IngestError::Persistence(StorageError::Internal)),
        }
    }
}

/// Record searchable metadata for one message under its recipient's
/// sub-collection. Returns the message identifier the document was keyed
/// by.
///
/// The identifier comes from the storage reference when an archival stage
/// ran in this pipeline instance; otherwise it is resolved independently
/// (generated form: bare hex, no timestamp suffix). Zero recipient matches
/// is an explicit failure, never a silent skip; several matches take the
/// first, with a warning.
pub async fn record_metadata(
    store: &Store,
    config: &IngestConfig,
    raw: &[u8],
    reference: Option<&StorageReference>,
) -> Result<String, IngestError> {
    let view = MailView::parse(raw)?;

    let message_id = match reference {
        Some(r) => r.message_id.clone(),
        None => MessageId::resolve(&view).into_inner(),
    };

    let to_address = view.to_address.clone().unwrap_or_default();
    let matches = store
        .doc_query(
            &config.recipient_collection,
            RECIPIENT_EMAIL_FIELD,
            &to_address,
        )
        .await?;

    let recipient = match matches.as_slice() {
        [] => return Err(IngestError::RecipientNotFound(to_address)),
        [one] => one,
        [first, ..] => {
            warn!(
                to = %to_address,
                matches = matches.len(),
                "recipient lookup is ambiguous, taking the first record"
            );
            first
        }
    };

    let record = MetadataRecord::build(&view, &message_id, reference);
    let subcollection = format!(
        "{}/{}/{}",
        config.recipient_collection, recipient.id, config.metadata_subcollection
    );
    store
        .doc_insert(&DocRef::new(&subcollection, &message_id), record.to_document()?)
        .await?;

    Ok(message_id)
}
