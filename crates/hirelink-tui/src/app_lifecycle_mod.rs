use std::sync::Arc;
use std::time::Instant;

use hirelink_core::Conversation;
use hirelink_sync::{ComposeDraft, MessagingEvent, MessagingSession};
use tokio::sync::mpsc;

use super::{App, Focus, LOADING_SPINNER_FRAMES, SyncStatus};

impl App {
    pub(crate) fn new(
        runtime: Arc<tokio::runtime::Runtime>,
        session: MessagingSession,
        events: mpsc::Receiver<MessagingEvent>,
        my_user_id: Option<String>,
    ) -> Self {
        Self {
            runtime,
            session,
            events,
            conversations: Vec::new(),
            list_index: 0,
            focus: Focus::List,
            compose: ComposeDraft::default(),
            compose_cursor: 0,
            compose_target: None,
            attach_input: String::new(),
            sending: 0,
            sync_status: SyncStatus::Starting,
            status_message: None,
            my_user_id,
            thread_scroll: 0,
            spinner_frame: 0,
            last_tick: Instant::now(),
        }
    }

    pub(crate) fn runtime(&self) -> &tokio::runtime::Runtime {
        &self.runtime
    }

    pub(crate) fn events_mut(&mut self) -> &mut mpsc::Receiver<MessagingEvent> {
        &mut self.events
    }

    /// Pulls the latest list from the store. Entries keep their `Arc` across
    /// polls when nothing changed, so this is cheap per frame.
    pub(crate) fn refresh_snapshot(&mut self) {
        self.conversations = self.session.conversations();
        self.list_index = clamp_index(self.list_index, self.conversations.len());
    }

    pub(crate) fn highlighted_conversation(&self) -> Option<&Arc<Conversation>> {
        self.conversations.get(self.list_index)
    }

    pub(crate) fn selected_conversation(&self) -> Option<Arc<Conversation>> {
        self.session.selected()
    }

    pub(crate) fn unread_count(&self) -> usize {
        self.conversations.iter().filter(|c| !c.is_read).count()
    }

    pub(crate) fn is_busy(&self) -> bool {
        self.sending > 0 || matches!(self.sync_status, SyncStatus::Starting | SyncStatus::Loading)
    }

    pub(crate) fn spinner(&self) -> &'static str {
        LOADING_SPINNER_FRAMES[self.spinner_frame % LOADING_SPINNER_FRAMES.len()]
    }

    pub(crate) fn on_tick(&mut self) {
        if self.is_busy() {
            self.spinner_frame = self.spinner_frame.wrapping_add(1);
        }
    }

    pub(crate) fn shutdown(&mut self) {
        if !self.compose.is_empty() {
            tracing::info!(
                chars = self.compose.text.chars().count(),
                files = self.compose.files.len(),
                "unsent draft discarded on exit"
            );
        }
        let runtime = self.runtime.clone();
        runtime.block_on(self.session.unmount());
    }
}

pub(crate) fn clamp_index(index: usize, len: usize) -> usize {
    if len == 0 { 0 } else { index.min(len - 1) }
}

#[cfg(test)]
mod tests {
    use super::clamp_index;

    #[test]
    fn list_index_stays_in_range() {
        assert_eq!(clamp_index(4, 0), 0);
        assert_eq!(clamp_index(4, 3), 2);
        assert_eq!(clamp_index(1, 3), 1);
    }
}
