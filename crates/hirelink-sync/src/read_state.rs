use hirelink_api::{ConversationFetcher, FetchError};

use crate::store::{self, LocalOp, SharedStore};

#[derive(Debug)]
pub enum ReadOutcome {
    /// Already read locally; nothing was sent.
    AlreadyRead,
    Unknown,
    /// Flipped locally. `confirmation` carries the remote error, if any.
    Marked { confirmation: Option<FetchError> },
}

impl ReadOutcome {
    pub fn sent_request(&self) -> bool {
        matches!(self, ReadOutcome::Marked { .. })
    }
}

#[derive(Clone)]
pub struct ReadStateTracker {
    fetcher: ConversationFetcher,
    store: SharedStore,
}

impl ReadStateTracker {
    pub fn new(fetcher: ConversationFetcher, store: SharedStore) -> Self {
        Self { fetcher, store }
    }

    pub async fn mark_read(&self, conversation_id: &str) -> ReadOutcome {
        {
            let mut store = store::lock(&self.store);
            let Some(conversation) = store.conversation(conversation_id) else {
                return ReadOutcome::Unknown;
            };
            if conversation.is_read {
                return ReadOutcome::AlreadyRead;
            }
            store.apply(LocalOp::MarkRead(conversation_id.to_string()));
        }
        let confirmation = match self.fetcher.mark_read(conversation_id).await {
            Ok(()) => None,
            Err(err) => {
                tracing::warn!(%err, conversation_id, "mark-read not confirmed, keeping local state");
                Some(err)
            }
        };
        ReadOutcome::Marked { confirmation }
    }
}
