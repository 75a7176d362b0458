use std::sync::Arc;

use thiserror::Error;

use hirelink_api::{ConversationFetcher, FetchError};
use hirelink_content::FileInput;

use crate::scheduler::{PollTarget, Tick};

#[derive(Debug, Error)]
pub enum SendError {
    #[error("reply not delivered: {0}")]
    Remote(#[source] FetchError),
}

/// Composer contents: text plus picked files, kept until a send succeeds.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ComposeDraft {
    pub text: String,
    pub files: Vec<FileInput>,
}

impl ComposeDraft {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            files: Vec::new(),
        }
    }

    pub fn with_file(mut self, file: FileInput) -> Self {
        self.files.push(file);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.text.trim().is_empty() && self.files.is_empty()
    }

    pub fn clear(&mut self) {
        self.text.clear();
        self.files.clear();
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SendOutcome {
    Sent { attachments: usize, oversized: bool },
    Skipped,
}

#[derive(Clone)]
pub struct SendPipeline {
    fetcher: ConversationFetcher,
    refresh: Arc<dyn PollTarget>,
}

impl SendPipeline {
    pub fn new(fetcher: ConversationFetcher, refresh: Arc<dyn PollTarget>) -> Self {
        Self { fetcher, refresh }
    }

    /// Encodes and appends the draft as a reply. On success the draft is
    /// cleared and one refresh runs outside the poll cadence; on failure the
    /// draft is left as it was.
    pub async fn send(
        &self,
        conversation_id: &str,
        draft: &mut ComposeDraft,
    ) -> Result<SendOutcome, SendError> {
        if draft.is_empty() {
            return Ok(SendOutcome::Skipped);
        }
        let block = hirelink_content::encode(&draft.text, draft.files.clone()).await;
        if block.is_empty() {
            return Ok(SendOutcome::Skipped);
        }
        if block.oversized {
            tracing::warn!(conversation_id, "attachments over size cap, sending placeholder");
        }
        self.fetcher
            .append_reply(conversation_id, &block.content)
            .await
            .map_err(SendError::Remote)?;
        tracing::info!(
            conversation_id,
            attachments = block.attachment_count,
            "reply sent"
        );
        draft.clear();
        self.refresh.poll(Tick::Forced).await;
        Ok(SendOutcome::Sent {
            attachments: block.attachment_count,
            oversized: block.oversized,
        })
    }
}
