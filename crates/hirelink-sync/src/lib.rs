//! Conversation sync: polling, reconciliation, read state and sending.

use std::sync::Arc;
use std::time::Duration;

use tokio::runtime::Handle;
use tokio::sync::mpsc;

use hirelink_api::ConversationFetcher;
use hirelink_core::Conversation;

mod cycle;
mod events;
mod read_state;
mod scheduler;
mod send;
pub mod store;

pub use cycle::RefreshCycle;
pub use events::{EVENT_QUEUE_CAPACITY, MessagingEvent};
pub use read_state::{ReadOutcome, ReadStateTracker};
pub use scheduler::{DEFAULT_POLL_INTERVAL, PollScheduler, PollTarget, Tick};
pub use send::{ComposeDraft, SendError, SendOutcome, SendPipeline};
pub use store::{ConversationStore, LocalOp, MergeReport, SharedStore};

use events::{deliver, emit};

/// A mounted messaging view: owns the poll loop and the store, and reports
/// progress through the event receiver returned by `mount`.
pub struct MessagingSession {
    runtime: Handle,
    store: SharedStore,
    scheduler: PollScheduler,
    cycle: Arc<RefreshCycle>,
    sender: SendPipeline,
    reader: ReadStateTracker,
    events: mpsc::Sender<MessagingEvent>,
}

impl MessagingSession {
    /// Starts polling immediately. Must be called from within a tokio runtime.
    pub fn mount(
        fetcher: ConversationFetcher,
        interval: Duration,
    ) -> (Self, mpsc::Receiver<MessagingEvent>) {
        let (tx, rx) = mpsc::channel(EVENT_QUEUE_CAPACITY);
        let store = store::shared(ConversationStore::new());
        let cycle = Arc::new(RefreshCycle::new(fetcher.clone(), store.clone(), tx.clone()));
        let scheduler = PollScheduler::start(interval, cycle.clone());
        tracing::debug!(interval_ms = interval.as_millis() as u64, "messaging session mounted");
        let session = Self {
            runtime: Handle::current(),
            sender: SendPipeline::new(fetcher.clone(), cycle.clone()),
            reader: ReadStateTracker::new(fetcher, store.clone()),
            store,
            scheduler,
            cycle,
            events: tx,
        };
        (session, rx)
    }

    pub fn store(&self) -> SharedStore {
        self.store.clone()
    }

    pub fn conversations(&self) -> Vec<Arc<Conversation>> {
        store::lock(&self.store).conversations().to_vec()
    }

    pub fn selected(&self) -> Option<Arc<Conversation>> {
        store::lock(&self.store).selected()
    }

    pub fn select(&self, conversation_id: &str) -> Option<Arc<Conversation>> {
        store::lock(&self.store).select(conversation_id)
    }

    pub fn deselect(&self) {
        store::lock(&self.store).deselect();
    }

    pub fn is_polling(&self) -> bool {
        self.scheduler.is_running()
    }

    /// Fetch and merge now, after any pass already in flight.
    pub async fn refresh(&self) {
        self.cycle.poll(Tick::Forced).await;
    }

    pub fn spawn_refresh(&self) {
        let cycle = self.cycle.clone();
        self.runtime.spawn(async move {
            cycle.poll(Tick::Forced).await;
        });
    }

    pub async fn mark_read(&self, conversation_id: &str) -> ReadOutcome {
        mark_read_with_events(&self.reader, &self.events, conversation_id).await
    }

    pub fn spawn_mark_read(&self, conversation_id: &str) {
        let reader = self.reader.clone();
        let events = self.events.clone();
        let id = conversation_id.to_string();
        self.runtime.spawn(async move {
            mark_read_with_events(&reader, &events, &id).await;
        });
    }

    pub async fn send(
        &self,
        conversation_id: &str,
        draft: &mut ComposeDraft,
    ) -> Result<SendOutcome, SendError> {
        emit(
            &self.events,
            MessagingEvent::SendStarted {
                conversation_id: conversation_id.to_string(),
            },
        );
        let result = self.sender.send(conversation_id, draft).await;
        let event = match &result {
            Ok(SendOutcome::Sent {
                attachments,
                oversized,
            }) => MessagingEvent::SendCompleted {
                conversation_id: conversation_id.to_string(),
                attachments: *attachments,
                oversized: *oversized,
            },
            Ok(SendOutcome::Skipped) => MessagingEvent::SendSkipped {
                conversation_id: conversation_id.to_string(),
            },
            Err(err) => {
                tracing::warn!(%err, conversation_id, "send failed, draft kept");
                MessagingEvent::SendFailed {
                    conversation_id: conversation_id.to_string(),
                    reason: err.to_string(),
                    draft: draft.clone(),
                }
            }
        };
        match event {
            MessagingEvent::SendFailed { .. } => deliver(&self.events, event).await,
            event => emit(&self.events, event),
        }
        result
    }

    /// Sends in the background; a failed draft comes back in `SendFailed`.
    pub fn spawn_send(&self, conversation_id: &str, draft: ComposeDraft) {
        let sender = self.sender.clone();
        let events = self.events.clone();
        let id = conversation_id.to_string();
        self.runtime.spawn(async move {
            emit(
                &events,
                MessagingEvent::SendStarted {
                    conversation_id: id.clone(),
                },
            );
            let mut draft = draft;
            match sender.send(&id, &mut draft).await {
                Ok(SendOutcome::Sent {
                    attachments,
                    oversized,
                }) => emit(
                    &events,
                    MessagingEvent::SendCompleted {
                        conversation_id: id,
                        attachments,
                        oversized,
                    },
                ),
                Ok(SendOutcome::Skipped) => {
                    emit(&events, MessagingEvent::SendSkipped { conversation_id: id })
                }
                Err(err) => {
                    tracing::warn!(%err, conversation_id = %id, "send failed, draft kept");
                    deliver(
                        &events,
                        MessagingEvent::SendFailed {
                            conversation_id: id,
                            reason: err.to_string(),
                            draft,
                        },
                    )
                    .await;
                }
            }
        });
    }

    /// Stops polling and detaches the store; late fetches are discarded.
    pub async fn unmount(&mut self) {
        self.scheduler.stop().await;
        store::lock(&self.store).close();
        tracing::debug!("messaging session unmounted");
    }
}

impl Drop for MessagingSession {
    fn drop(&mut self) {
        store::lock(&self.store).close();
    }
}

async fn mark_read_with_events(
    reader: &ReadStateTracker,
    events: &mpsc::Sender<MessagingEvent>,
    conversation_id: &str,
) -> ReadOutcome {
    let outcome = reader.mark_read(conversation_id).await;
    if let ReadOutcome::Marked {
        confirmation: Some(err),
    } = &outcome
    {
        emit(
            events,
            MessagingEvent::ReadConfirmFailed {
                conversation_id: conversation_id.to_string(),
                reason: err.to_string(),
            },
        );
    }
    outcome
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    use async_trait::async_trait;
    use serde_json::{Value, json};
    use tokio::sync::mpsc;

    use hirelink_api::{ApiError, ConversationApi, ConversationFetcher, LoginSession};
    use hirelink_content::FileInput;
    use hirelink_core::{Credentials, MemoryKvStore, TOKEN_KEY};

    use super::{
        ComposeDraft, ConversationStore, EVENT_QUEUE_CAPACITY, MessagingEvent, MessagingSession,
        PollTarget, ReadOutcome, ReadStateTracker, RefreshCycle, SendError, SendOutcome,
        SendPipeline, SharedStore, Tick, store,
    };

    #[derive(Default)]
    struct ServerState {
        threads: Vec<(String, bool, Vec<String>)>,
        reply_calls: usize,
        mark_read_calls: usize,
        fail_replies: bool,
        fail_mark_read: bool,
        offline: bool,
        reject_tokens: bool,
    }

    #[derive(Default)]
    struct FakeServer {
        state: Mutex<ServerState>,
    }

    impl FakeServer {
        fn with_threads(threads: &[(&str, bool, usize)]) -> Self {
            let server = FakeServer::default();
            server.state.lock().unwrap().threads = threads
                .iter()
                .map(|(id, read, n)| {
                    let replies = (1..=*n).map(|i| format!("seed {}", i)).collect();
                    (id.to_string(), *read, replies)
                })
                .collect();
            server
        }

        fn contents(&self, id: &str) -> Vec<String> {
            let state = self.state.lock().unwrap();
            state
                .threads
                .iter()
                .find(|t| t.0 == id)
                .map(|t| t.2.clone())
                .unwrap_or_default()
        }

        fn update(&self, f: impl FnOnce(&mut ServerState)) {
            let mut state = self.state.lock().unwrap();
            f(&mut *state);
        }

        fn guard(&self) -> Result<(), ApiError> {
            let state = self.state.lock().unwrap();
            if state.offline {
                return Err(ApiError::Other("connection reset".to_string()));
            }
            if state.reject_tokens {
                return Err(ApiError::Unauthorized);
            }
            Ok(())
        }
    }

    #[async_trait]
    impl ConversationApi for FakeServer {
        async fn list_conversations(&self, _token: &str) -> Result<Value, ApiError> {
            self.guard()?;
            let state = self.state.lock().unwrap();
            let list: Vec<Value> = state
                .threads
                .iter()
                .map(|(id, read, replies)| {
                    let replies: Vec<Value> = replies
                        .iter()
                        .enumerate()
                        .map(|(i, content)| {
                            json!({
                                "id": format!("{}-{}", id, i + 1),
                                "senderId": 1,
                                "content": content,
                                "createdAt": 1_714_550_400_000i64 + i as i64 * 1000,
                            })
                        })
                        .collect();
                    json!({"id": id, "participantName": "Ada", "isRead": read, "replies": replies})
                })
                .collect();
            Ok(json!({"result": {"data": {"json": list}}}))
        }

        async fn append_reply(&self, _token: &str, id: &str, content: &str) -> Result<(), ApiError> {
            self.guard()?;
            let mut state = self.state.lock().unwrap();
            state.reply_calls += 1;
            if state.fail_replies {
                return Err(ApiError::Status {
                    status: 500,
                    body: "boom".to_string(),
                });
            }
            match state.threads.iter_mut().find(|t| t.0 == id) {
                Some(thread) => {
                    thread.2.push(content.to_string());
                    Ok(())
                }
                None => Err(ApiError::Status {
                    status: 404,
                    body: "no such conversation".to_string(),
                }),
            }
        }

        async fn mark_read(&self, _token: &str, id: &str) -> Result<(), ApiError> {
            self.guard()?;
            let mut state = self.state.lock().unwrap();
            state.mark_read_calls += 1;
            if state.fail_mark_read {
                return Err(ApiError::Other("timeout".to_string()));
            }
            if let Some(thread) = state.threads.iter_mut().find(|t| t.0 == id) {
                thread.1 = true;
            }
            Ok(())
        }

        async fn login(&self, _credentials: &Credentials) -> Result<LoginSession, ApiError> {
            Err(ApiError::Unauthorized)
        }
    }

    struct Harness {
        server: Arc<FakeServer>,
        store: SharedStore,
        cycle: Arc<RefreshCycle>,
        sender: SendPipeline,
        reader: ReadStateTracker,
        events: mpsc::Receiver<MessagingEvent>,
    }

    fn fetcher(server: &Arc<FakeServer>) -> ConversationFetcher {
        ConversationFetcher::new(
            server.clone(),
            Arc::new(MemoryKvStore::with_entries([(TOKEN_KEY, "t")])),
        )
    }

    async fn harness(server: FakeServer) -> Harness {
        let server = Arc::new(server);
        let fetcher = fetcher(&server);
        let (tx, rx) = mpsc::channel(EVENT_QUEUE_CAPACITY);
        let store = store::shared(ConversationStore::new());
        let cycle = Arc::new(RefreshCycle::new(fetcher.clone(), store.clone(), tx));
        cycle.poll(Tick::Forced).await;
        Harness {
            sender: SendPipeline::new(fetcher.clone(), cycle.clone()),
            reader: ReadStateTracker::new(fetcher, store.clone()),
            server,
            store,
            cycle,
            events: rx,
        }
    }

    fn replies(store: &SharedStore, id: &str) -> Vec<String> {
        store::lock(store)
            .conversation(id)
            .map(|c| c.replies.iter().map(|r| r.content.clone()).collect())
            .unwrap_or_default()
    }

    #[tokio::test]
    async fn mark_read_sends_at_most_one_request() {
        let h = harness(FakeServer::with_threads(&[("a", false, 1)])).await;

        assert!(h.reader.mark_read("a").await.sent_request());
        assert!(!h.reader.mark_read("a").await.sent_request());
        assert_eq!(h.server.state.lock().unwrap().mark_read_calls, 1);
        assert!(store::lock(&h.store).conversation("a").unwrap().is_read);
    }

    #[tokio::test]
    async fn read_conversation_is_never_marked_remotely() {
        let h = harness(FakeServer::with_threads(&[("a", true, 1)])).await;
        assert!(matches!(h.reader.mark_read("a").await, ReadOutcome::AlreadyRead));
        assert!(matches!(h.reader.mark_read("zz").await, ReadOutcome::Unknown));
        assert_eq!(h.server.state.lock().unwrap().mark_read_calls, 0);
    }

    #[tokio::test]
    async fn failed_read_confirmation_is_not_reverted() {
        let h = harness(FakeServer::with_threads(&[("a", false, 1)])).await;
        store::lock(&h.store).select("a");
        h.server.update(|s| s.fail_mark_read = true);

        let outcome = h.reader.mark_read("a").await;
        assert!(matches!(
            outcome,
            ReadOutcome::Marked {
                confirmation: Some(_)
            }
        ));

        h.cycle.poll(Tick::Forced).await;
        let store = store::lock(&h.store);
        assert!(store.conversation("a").unwrap().is_read);
        assert!(store.selected().unwrap().is_read);
    }

    #[tokio::test]
    async fn incoming_reply_after_read_is_unread_again() {
        let h = harness(FakeServer::with_threads(&[("a", false, 1)])).await;
        assert!(matches!(
            h.reader.mark_read("a").await,
            ReadOutcome::Marked { confirmation: None }
        ));

        h.server.update(|s| {
            s.threads[0].1 = false;
            s.threads[0].2.push("new from recruiter".to_string());
        });
        h.cycle.poll(Tick::Forced).await;
        h.cycle.poll(Tick::Forced).await;

        {
            let store = store::lock(&h.store);
            assert!(!store.conversation("a").unwrap().is_read);
            assert!(store.pending().is_empty());
            assert_eq!(store.unread_count(), 1);
        }
        assert!(h.reader.mark_read("a").await.sent_request());
        assert_eq!(h.server.state.lock().unwrap().mark_read_calls, 2);
    }

    #[tokio::test]
    async fn empty_draft_is_skipped_without_network() -> anyhow::Result<()> {
        let h = harness(FakeServer::with_threads(&[("a", true, 0)])).await;
        let mut draft = ComposeDraft::new("   \n ");
        assert_eq!(h.sender.send("a", &mut draft).await?, SendOutcome::Skipped);
        assert_eq!(h.server.state.lock().unwrap().reply_calls, 0);
        assert_eq!(draft.text, "   \n ");
        Ok(())
    }

    #[tokio::test]
    async fn sequential_sends_arrive_in_call_order() -> anyhow::Result<()> {
        let h = harness(FakeServer::with_threads(&[("a", true, 0)])).await;
        let texts: Vec<String> = (1..=5).map(|i| format!("message {}", i)).collect();
        for text in &texts {
            let mut draft = ComposeDraft::new(text.clone());
            h.sender.send("a", &mut draft).await?;
            assert!(draft.is_empty());
        }
        assert_eq!(h.server.contents("a"), texts);
        // Each send forces a refresh, so the store is current without a tick.
        assert_eq!(replies(&h.store, "a"), texts);
        Ok(())
    }

    #[tokio::test]
    async fn two_rapid_sends_both_arrive_in_order() -> anyhow::Result<()> {
        let h = harness(FakeServer::with_threads(&[("a", true, 0)])).await;
        let mut first = ComposeDraft::new("first");
        let mut second = ComposeDraft::new("second");

        let (a, b) = tokio::join!(
            h.sender.send("a", &mut first),
            h.sender.send("a", &mut second)
        );
        a?;
        b?;

        assert_eq!(h.server.state.lock().unwrap().reply_calls, 2);
        assert_eq!(h.server.contents("a"), vec!["first", "second"]);
        assert_eq!(replies(&h.store, "a"), vec!["first", "second"]);
        Ok(())
    }

    #[tokio::test]
    async fn failed_send_keeps_the_draft() {
        let h = harness(FakeServer::with_threads(&[("a", true, 0)])).await;
        h.server.update(|s| s.fail_replies = true);
        let mut draft =
            ComposeDraft::new("keep me").with_file(FileInput::new("cv.txt", b"hello".to_vec()));

        let err = h.sender.send("a", &mut draft).await.unwrap_err();
        assert!(matches!(err, SendError::Remote(_)));
        assert_eq!(draft.text, "keep me");
        assert_eq!(draft.files.len(), 1);
        assert!(replies(&h.store, "a").is_empty());
    }

    #[tokio::test]
    async fn attachment_reply_decodes_after_refresh() -> anyhow::Result<()> {
        let h = harness(FakeServer::with_threads(&[("a", true, 0)])).await;
        let mut draft =
            ComposeDraft::new("Hi").with_file(FileInput::new("cv.pdf", b"%PDF-1.4".to_vec()));

        let outcome = h.sender.send("a", &mut draft).await?;
        assert_eq!(
            outcome,
            SendOutcome::Sent {
                attachments: 1,
                oversized: false
            }
        );

        let stored = replies(&h.store, "a");
        assert!(stored[0].starts_with("Hi\n\n__FILETYPE:pdf__"));
        let envelope = hirelink_content::decode(&stored[0]);
        assert_eq!(envelope.text, "Hi");
        assert_eq!(envelope.attachments[0].name, "cv.pdf");
        Ok(())
    }

    #[tokio::test]
    async fn auth_failure_empties_the_store() {
        let mut h = harness(FakeServer::with_threads(&[("a", false, 2)])).await;
        assert_eq!(store::lock(&h.store).conversations().len(), 1);

        h.server.update(|s| s.reject_tokens = true);
        h.cycle.poll(Tick::Forced).await;

        assert!(store::lock(&h.store).conversations().is_empty());
        let mut saw_auth_failure = false;
        while let Ok(event) = h.events.try_recv() {
            if let MessagingEvent::FetchFailed { auth: true, .. } = event {
                saw_auth_failure = true;
            }
        }
        assert!(saw_auth_failure);
    }

    #[tokio::test]
    async fn transport_failure_keeps_previous_state() {
        let h = harness(FakeServer::with_threads(&[("a", false, 2)])).await;
        let before = store::lock(&h.store).conversation("a").unwrap();

        h.server.update(|s| s.offline = true);
        h.cycle.poll(Tick::Forced).await;

        let after = store::lock(&h.store).conversation("a").unwrap();
        assert!(Arc::ptr_eq(&before, &after));
    }

    #[tokio::test(start_paused = true)]
    async fn session_polls_until_unmounted() {
        let server = Arc::new(FakeServer::with_threads(&[("a", false, 1)]));
        let (mut session, mut events) =
            MessagingSession::mount(fetcher(&server), Duration::from_secs(1));

        assert!(matches!(events.recv().await, Some(MessagingEvent::Loading)));
        assert!(matches!(
            events.recv().await,
            Some(MessagingEvent::Refreshed {
                conversations: 1,
                unread: 1,
                ..
            })
        ));
        let opened = session.select("a").unwrap();

        server.update(|s| s.threads[0].2.push("new one".to_string()));
        tokio::time::sleep(Duration::from_millis(1500)).await;
        let refreshed = session.selected().unwrap();
        assert!(!Arc::ptr_eq(&opened, &refreshed));
        assert_eq!(refreshed.reply_count(), 2);

        session.unmount().await;
        assert!(!session.is_polling());
        while events.try_recv().is_ok() {}

        server.update(|s| s.threads[0].2.push("after teardown".to_string()));
        tokio::time::sleep(Duration::from_secs(5)).await;
        assert!(events.try_recv().is_err());
        assert_eq!(session.selected().unwrap().reply_count(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn session_send_reports_failure_with_draft() {
        let server = Arc::new(FakeServer::with_threads(&[("a", true, 0)]));
        server.update(|s| s.fail_replies = true);
        let (mut session, mut events) =
            MessagingSession::mount(fetcher(&server), Duration::from_secs(60));

        session.spawn_send("a", ComposeDraft::new("retry later"));
        let mut returned = None;
        while let Some(event) = events.recv().await {
            if let MessagingEvent::SendFailed { draft, .. } = event {
                returned = Some(draft);
                break;
            }
        }
        assert_eq!(returned.unwrap().text, "retry later");
        session.unmount().await;
    }

    #[tokio::test(start_paused = true)]
    async fn failed_draft_survives_a_full_event_queue() {
        let server = Arc::new(FakeServer::with_threads(&[("a", true, 0)]));
        server.update(|s| s.fail_replies = true);
        let (mut session, mut events) =
            MessagingSession::mount(fetcher(&server), Duration::from_secs(1));

        // Nobody drains while the poller fills the queue with refreshes.
        tokio::time::sleep(Duration::from_secs(300)).await;
        session.spawn_send("a", ComposeDraft::new("important reply"));

        let mut returned = None;
        while let Some(event) = events.recv().await {
            if let MessagingEvent::SendFailed { draft, .. } = event {
                returned = Some(draft);
                break;
            }
        }
        assert_eq!(returned.unwrap().text, "important reply");
        session.unmount().await;
    }
}
