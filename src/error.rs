use crate::storage::StorageError;

/// Everything that can go wrong while ingesting one message.
///
/// Stages never swallow these into silent success: the pipeline maps each
/// one to a soft-reject so the sending agent retries the whole message.
#[derive(Debug, thiserror::Error)]
pub enum IngestError {
    #[error("stream capture failed: {0}")]
    Stream(#[from] std::io::Error),

    #[error("message could not be parsed")]
    Parse,

    #[error("no recipient record matches '{0}'")]
    RecipientNotFound(String),

    #[error("storage operation failed: {0}")]
    Persistence(#[from] StorageError),
}
