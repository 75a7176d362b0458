use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::mpsc;

use hirelink_api::{ConversationFetcher, FetchError};

use crate::events::{MessagingEvent, emit};
use crate::scheduler::{PollTarget, Tick};
use crate::store::{self, SharedStore};

/// One fetch-and-merge pass. Scheduled ticks are dropped while another pass
/// is in flight; forced passes wait for it instead.
pub struct RefreshCycle {
    fetcher: ConversationFetcher,
    store: SharedStore,
    events: mpsc::Sender<MessagingEvent>,
    in_flight: tokio::sync::Mutex<()>,
}

impl RefreshCycle {
    pub fn new(
        fetcher: ConversationFetcher,
        store: SharedStore,
        events: mpsc::Sender<MessagingEvent>,
    ) -> Self {
        Self {
            fetcher,
            store,
            events,
            in_flight: tokio::sync::Mutex::new(()),
        }
    }

    async fn run(&self, tick: Tick) {
        if !store::lock(&self.store).is_live() {
            return;
        }
        if tick.shows_loading() {
            emit(&self.events, MessagingEvent::Loading);
        }
        match self.fetcher.fetch_all().await {
            Ok(fresh) => {
                let report = store::lock(&self.store).merge(fresh);
                match report {
                    Some(report) => emit(
                        &self.events,
                        MessagingEvent::Refreshed {
                            conversations: report.conversations,
                            unread: report.unread,
                            selection_refreshed: report.selection_refreshed,
                            synced_at: Utc::now(),
                        },
                    ),
                    None => tracing::debug!("fetch resolved after teardown, discarded"),
                }
            }
            Err(err @ FetchError::Auth(_)) => {
                tracing::warn!(%err, "conversation fetch not authorized");
                store::lock(&self.store).clear();
                emit(
                    &self.events,
                    MessagingEvent::FetchFailed {
                        reason: err.to_string(),
                        auth: true,
                    },
                );
            }
            Err(err) => {
                tracing::warn!(%err, "conversation fetch failed, keeping previous state");
                emit(
                    &self.events,
                    MessagingEvent::FetchFailed {
                        reason: err.to_string(),
                        auth: false,
                    },
                );
            }
        }
    }
}

#[async_trait]
impl PollTarget for RefreshCycle {
    async fn poll(&self, tick: Tick) {
        let _guard = match tick {
            Tick::Forced => self.in_flight.lock().await,
            Tick::Initial | Tick::Scheduled => match self.in_flight.try_lock() {
                Ok(guard) => guard,
                Err(_) => {
                    tracing::debug!(?tick, "refresh already in flight, skipping");
                    return;
                }
            },
        };
        self.run(tick).await;
    }
}
