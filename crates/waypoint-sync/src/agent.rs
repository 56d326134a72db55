use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};
use waypoint_core::SessionCode;

use crate::{LocalCache, SessionFeed};

pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(3);

/// Shortest accepted poll period; smaller requests (including zero) are raised to it.
pub const MIN_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Background poller that keeps a [`LocalCache`] in step with one session record.
pub struct SyncAgent {
    feed: Arc<dyn SessionFeed>,
    cache: LocalCache,
    session: SessionCode,
    interval: Duration,
    cancel: CancellationToken,
}

/// Owner's grip on a running agent. Dropping it does not stop the agent; call
/// [`SyncHandle::stop`].
pub struct SyncHandle {
    session: SessionCode,
    cancel: CancellationToken,
    task: JoinHandle<()>,
}

impl SyncAgent {
    /// Starts polling: one sync right away, then one per `interval`.
    pub fn spawn(
        feed: Arc<dyn SessionFeed>,
        cache: LocalCache,
        session: SessionCode,
        interval: Duration,
    ) -> SyncHandle {
        let cancel = CancellationToken::new();
        let agent = SyncAgent {
            feed,
            cache,
            session: session.clone(),
            interval: interval.max(MIN_POLL_INTERVAL),
            cancel: cancel.clone(),
        };
        let task = tokio::spawn(agent.run());
        SyncHandle {
            session,
            cancel,
            task,
        }
    }

    async fn run(self) {
        debug!(session = %self.session, interval_ms = self.interval.as_millis() as u64, "sync agent started");
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = self.cancel.cancelled() => break,
                _ = ticker.tick() => {}
            }
            // A fetch already in flight is abandoned on cancellation so a stale record
            // from the previous session can never land in the cache.
            tokio::select! {
                _ = self.cancel.cancelled() => break,
                _ = self.sync_once() => {}
            }
        }
        debug!(session = %self.session, "sync agent stopped");
    }

    async fn sync_once(&self) {
        match self.feed.fetch(&self.session).await {
            Ok(fetched) => {
                self.cache.merge_remote(&self.session, &fetched).await;
            }
            Err(err) => {
                warn!(session = %self.session, error = %err, "session sync failed");
            }
        }
    }
}

impl SyncHandle {
    pub fn session(&self) -> &SessionCode {
        &self.session
    }

    pub fn is_running(&self) -> bool {
        !self.task.is_finished()
    }

    /// Stops polling and waits for the task to wind down.
    pub async fn stop(self) {
        self.cancel.cancel();
        if let Err(err) = self.task.await {
            if err.is_panic() {
                warn!(session = %self.session, "sync agent panicked");
            }
        }
    }
}
