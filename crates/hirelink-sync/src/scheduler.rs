use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(1000);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tick {
    /// First tick after start.
    Initial,
    Scheduled,
    /// Out-of-cadence refresh, e.g. right after a send.
    Forced,
}

impl Tick {
    pub fn shows_loading(self) -> bool {
        matches!(self, Tick::Initial)
    }
}

#[async_trait]
pub trait PollTarget: Send + Sync {
    async fn poll(&self, tick: Tick);
}

/// Drives a `PollTarget` on a fixed cadence. Polls run inside the loop task,
/// so a tick that comes due while a poll is still running is skipped.
pub struct PollScheduler {
    interval: Duration,
    handle: Option<JoinHandle<()>>,
}

impl PollScheduler {
    /// Must be called from within a tokio runtime.
    pub fn start(interval: Duration, target: Arc<dyn PollTarget>) -> Self {
        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            let mut tick = Tick::Initial;
            loop {
                ticker.tick().await;
                tracing::trace!(?tick, "poll tick");
                target.poll(tick).await;
                tick = Tick::Scheduled;
            }
        });
        Self {
            interval,
            handle: Some(handle),
        }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    pub fn is_running(&self) -> bool {
        self.handle.as_ref().is_some_and(|h| !h.is_finished())
    }

    /// Cancels the loop and waits until it is gone; no poll starts after this
    /// returns. Calling it again is a no-op.
    pub async fn stop(&mut self) {
        let Some(handle) = self.handle.take() else {
            return;
        };
        handle.abort();
        match handle.await {
            Ok(()) => {}
            Err(err) if err.is_cancelled() => {}
            Err(err) => tracing::warn!(%err, "poll loop ended abnormally"),
        }
        tracing::debug!("poll scheduler stopped");
    }
}

impl Drop for PollScheduler {
    fn drop(&mut self) {
        if let Some(handle) = self.handle.take() {
            handle.abort();
        }
    }
}
