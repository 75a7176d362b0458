use chrono::{DateTime, Utc};
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;

use crate::send::ComposeDraft;

pub const EVENT_QUEUE_CAPACITY: usize = 256;

#[derive(Debug)]
pub enum MessagingEvent {
    Loading,
    Refreshed {
        conversations: usize,
        unread: usize,
        selection_refreshed: bool,
        synced_at: DateTime<Utc>,
    },
    FetchFailed {
        reason: String,
        auth: bool,
    },
    SendStarted {
        conversation_id: String,
    },
    SendCompleted {
        conversation_id: String,
        attachments: usize,
        oversized: bool,
    },
    SendSkipped {
        conversation_id: String,
    },
    /// The draft comes back untouched so the composer can restore it.
    SendFailed {
        conversation_id: String,
        reason: String,
        draft: ComposeDraft,
    },
    ReadConfirmFailed {
        conversation_id: String,
        reason: String,
    },
}

impl MessagingEvent {
    pub fn kind(&self) -> &'static str {
        match self {
            MessagingEvent::Loading => "loading",
            MessagingEvent::Refreshed { .. } => "refreshed",
            MessagingEvent::FetchFailed { .. } => "fetch_failed",
            MessagingEvent::SendStarted { .. } => "send_started",
            MessagingEvent::SendCompleted { .. } => "send_completed",
            MessagingEvent::SendSkipped { .. } => "send_skipped",
            MessagingEvent::SendFailed { .. } => "send_failed",
            MessagingEvent::ReadConfirmFailed { .. } => "read_confirm_failed",
        }
    }
}

/// Waits for queue space. Used for events that carry user data, which must
/// not be dropped when the view falls behind.
pub(crate) async fn deliver(tx: &mpsc::Sender<MessagingEvent>, event: MessagingEvent) {
    if let Err(err) = tx.send(event).await {
        tracing::warn!(kind = err.0.kind(), "messaging event receiver gone, event lost");
    }
}

pub(crate) fn emit(tx: &mpsc::Sender<MessagingEvent>, event: MessagingEvent) {
    match tx.try_send(event) {
        Ok(()) => {}
        Err(TrySendError::Full(event)) => {
            tracing::debug!(kind = event.kind(), "messaging event queue full, dropping");
        }
        Err(TrySendError::Closed(_)) => {}
    }
}
