use std::time::Duration;

use tracing::{error, info};

use crate::config::IngestConfig;
use crate::mail::archive::{self, StorageReference};
use crate::mail::metadata;
use crate::mail::view::MailView;
use crate::storage::Store;

/// Bound on each stage body, covering its storage calls. A stage that
/// exceeds it soft-rejects so the sender retries later.
const STAGE_TIMEOUT: Duration = Duration::from_secs(30);

/// State scoped to one inbound message, shared only between the stages
/// processing that message. The storage reference is the typed hand-off
/// from the archival stage to the metadata stage: present exactly when an
/// archival stage ran in this pipeline instance.
#[derive(Debug, Default)]
pub struct MessageContext {
    pub raw: Option<Vec<u8>>,
    pub archive_ref: Option<StorageReference>,
}

impl MessageContext {
    pub fn new(raw: Vec<u8>) -> Self {
        Self {
            raw: Some(raw),
            archive_ref: None,
        }
    }
}

/// What a stage tells the coordinator: proceed to the next registered
/// stage, stop with final acceptance, or stop and ask the sender to retry
/// the whole message later. Every stage entry point returns exactly one of
/// these on every path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StageOutcome {
    Next,
    Accept,
    SoftReject { reason: String },
}

pub struct Pipeline {
    store: Store,
    config: IngestConfig,
}

impl Pipeline {
    pub fn new(store: Store, config: IngestConfig) -> Self {
        Self { store, config }
    }

    /// Both stages, in order, for one message: archival first, metadata
    /// only when archival passes control on.
    pub async fn run(&self, ctx: &mut MessageContext) -> StageOutcome {
        match self.archive_stage(ctx).await {
            StageOutcome::Next => self.metadata_stage(ctx).await,
            outcome => outcome,
        }
    }

    pub async fn archive_stage(&self, ctx: &mut MessageContext) -> StageOutcome {
        let raw = match ctx.raw.as_deref() {
            Some(raw) => raw,
            None => return StageOutcome::Next,
        };

        let view = match MailView::parse(raw) {
            Ok(view) => view,
            Err(e) => {
                error!("could not parse message for archival: {}", e);
                return StageOutcome::SoftReject {
                    reason: e.to_string(),
                };
            }
        };

        let archived = tokio::time::timeout(STAGE_TIMEOUT, archive::archive(&self.store, &view, raw)).await;
        match archived {
            Ok(Ok(reference)) => {
                info!(
                    message_id = %reference.message_id,
                    key = %reference.object_key,
                    "archived message"
                );
                ctx.archive_ref = Some(reference);
                if self.config.archive_only {
                    StageOutcome::Accept
                } else {
                    StageOutcome::Next
                }
            }
            Ok(Err(e)) => {
                error!("archival failed: {}", e);
                StageOutcome::SoftReject {
                    reason: e.to_string(),
                }
            }
            Err(_) => {
                error!("archival timed out");
                StageOutcome::SoftReject {
                    reason: "archival timed out".to_string(),
                }
            }
        }
    }

    pub async fn metadata_stage(&self, ctx: &mut MessageContext) -> StageOutcome {
        // no in-flight message: nothing to record
        let raw = match ctx.raw.as_deref() {
            Some(raw) => raw,
            None => return StageOutcome::Next,
        };

        let recorded = tokio::time::timeout(
            STAGE_TIMEOUT,
            metadata::record_metadata(&self.store, &self.config, raw, ctx.archive_ref.as_ref()),
        )
        .await;

        match recorded {
            Ok(Ok(message_id)) => {
                info!(message_id = %message_id, "recorded message metadata");
                StageOutcome::Next
            }
            Ok(Err(e)) => {
                error!("metadata recording failed: {}", e);
                StageOutcome::SoftReject {
                    reason: e.to_string(),
                }
            }
            Err(_) => {
                error!("metadata recording timed out");
                StageOutcome::SoftReject {
                    reason: "metadata recording timed out".to_string(),
                }
            }
        }
    }
}
