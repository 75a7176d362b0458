use chrono::{DateTime, Local, Utc};
use tokio::sync::mpsc::error::TryRecvError;

use hirelink_core::Conversation;
use hirelink_sync::MessagingEvent;

use super::{App, Focus, SyncStatus};

impl App {
    pub(crate) fn drain_events(&mut self) {
        loop {
            match self.events_mut().try_recv() {
                Ok(event) => self.on_event(event),
                Err(TryRecvError::Empty) => break,
                Err(TryRecvError::Disconnected) => {
                    if !matches!(self.sync_status, SyncStatus::SignedOut(_)) {
                        self.sync_status = SyncStatus::Offline("session closed".to_string());
                    }
                    break;
                }
            }
        }
    }

    pub(crate) fn on_event(&mut self, event: MessagingEvent) {
        tracing::trace!(kind = event.kind(), "ui event");
        match event {
            MessagingEvent::Loading => self.sync_status = SyncStatus::Loading,
            MessagingEvent::Refreshed {
                selection_refreshed,
                synced_at,
                ..
            } => {
                self.sync_status = SyncStatus::Synced(synced_at);
                if selection_refreshed {
                    // New replies arrived in the open thread; follow the tail.
                    self.thread_scroll = 0;
                    let selected = self.selected_conversation();
                    if let Some(id) = reread_target(selected.as_deref(), self.focus) {
                        self.session.spawn_mark_read(id);
                    }
                }
            }
            MessagingEvent::FetchFailed { reason, auth } => {
                self.sync_status = if auth {
                    SyncStatus::SignedOut(reason)
                } else {
                    SyncStatus::Offline(reason)
                };
            }
            MessagingEvent::SendStarted { .. } => {
                self.sending = self.sending.saturating_add(1);
                self.status_message = Some("Sending...".to_string());
            }
            MessagingEvent::SendCompleted {
                attachments,
                oversized,
                ..
            } => {
                self.sending = self.sending.saturating_sub(1);
                self.status_message = Some(send_completed_message(attachments, oversized));
            }
            MessagingEvent::SendSkipped { .. } => {
                self.sending = self.sending.saturating_sub(1);
            }
            MessagingEvent::SendFailed {
                conversation_id,
                reason,
                draft,
            } => {
                self.sending = self.sending.saturating_sub(1);
                let restored = self.compose.is_empty()
                    && self
                        .compose_target
                        .as_deref()
                        .is_none_or(|id| id == conversation_id);
                if restored {
                    self.compose_cursor = draft.text.chars().count();
                    self.compose = draft;
                    self.compose_target = Some(conversation_id);
                    self.status_message = Some(format!("Send failed, draft restored: {}", reason));
                } else {
                    self.status_message = Some(format!("Send failed: {}", reason));
                }
            }
            MessagingEvent::ReadConfirmFailed { reason, .. } => {
                self.status_message = Some(format!("Could not confirm read: {}", reason));
            }
        }
    }
}

/// The open conversation when it turned unread while being viewed.
pub(crate) fn reread_target(selected: Option<&Conversation>, focus: Focus) -> Option<&str> {
    let conversation = selected?;
    if focus == Focus::List || conversation.is_read {
        return None;
    }
    Some(conversation.id.as_str())
}

fn send_completed_message(attachments: usize, oversized: bool) -> String {
    if oversized {
        "Sent, attachments too large and replaced".to_string()
    } else if attachments > 0 {
        format!("Sent with {} attachment(s)", attachments)
    } else {
        "Sent".to_string()
    }
}

pub(crate) fn sync_status_label(status: &SyncStatus, spinner: &str) -> String {
    match status {
        SyncStatus::Starting => format!("{} connecting", spinner),
        SyncStatus::Loading => format!("{} loading", spinner),
        SyncStatus::Synced(at) => format!("synced {}", format_clock(*at)),
        SyncStatus::Offline(reason) => format!("offline: {}", truncate_reason(reason, 40)),
        SyncStatus::SignedOut(_) => "signed out (hirelink login)".to_string(),
    }
}

fn format_clock(at: DateTime<Utc>) -> String {
    at.with_timezone(&Local).format("%H:%M:%S").to_string()
}

fn truncate_reason(reason: &str, max: usize) -> String {
    if reason.chars().count() <= max {
        return reason.to_string();
    }
    let mut out: String = reason.chars().take(max.saturating_sub(3)).collect();
    out.push_str("...");
    out
}
