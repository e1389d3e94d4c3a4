//! Resuming interrupted HTTP file transfers

use async_trait::async_trait;
use tracing::info;

use rcs_message_core::resume_info::{parse_resume_info, ACTION_FT_RESUME};
use rcs_message_core::ResumeInfo;

use crate::errors::{Result, SessionError};

/// Persistence of resume info between the trigger and the transfer
#[async_trait]
pub trait ResumeInfoStore: Send + Sync {
    async fn store_resume_info(&self, info: ResumeInfo) -> Result<()>;
}

/// A resume request received from the network
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileTransferResume {
    pub transfer_id: String,
    pub info: ResumeInfo,
}

impl FileTransferResume {
    /// Accept an `FT_RESUME` trigger and parse its resume info
    pub fn from_trigger(action: &str, transfer_id: &str, xml: &[u8]) -> Result<Self> {
        if action != ACTION_FT_RESUME {
            return Err(SessionError::UnsupportedAction {
                action: action.to_string(),
            });
        }
        let info = parse_resume_info(xml)?.with_transfer_id(transfer_id);
        Ok(Self {
            transfer_id: transfer_id.to_string(),
            info,
        })
    }

    /// Hand the resume info over to `store`
    pub async fn persist(self, store: &dyn ResumeInfoStore) -> Result<ResumeInfo> {
        info!(
            "Resuming file transfer {} at byte {}",
            self.transfer_id, self.info.range_start
        );
        store.store_resume_info(self.info.clone()).await?;
        Ok(self.info)
    }
}

/// Parse a resume trigger and store its info
pub async fn handle_resume_trigger(
    store: &dyn ResumeInfoStore,
    action: &str,
    transfer_id: &str,
    xml: &[u8],
) -> Result<ResumeInfo> {
    FileTransferResume::from_trigger(action, transfer_id, xml)?
        .persist(store)
        .await
}
