use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use waypoint_core::{FieldName, FieldUpdate, FieldValue, SessionCode};

use crate::{LocalCache, SessionFeed, SyncAgent, SyncHandle, DEFAULT_POLL_INTERVAL};

/// A device's participation in at most one session at a time.
///
/// Binding a code starts a [`SyncAgent`]; binding a different code replaces it and
/// unbinding stops polling altogether. Local changes go through [`DeviceSession::record`],
/// which updates the cache immediately and publishes in the background.
pub struct DeviceSession {
    feed: Arc<dyn SessionFeed>,
    cache: LocalCache,
    poll_interval: Duration,
    agent: Mutex<Option<SyncHandle>>,
}

impl DeviceSession {
    pub fn new(feed: Arc<dyn SessionFeed>, cache: LocalCache) -> Self {
        Self::with_interval(feed, cache, DEFAULT_POLL_INTERVAL)
    }

    pub fn with_interval(feed: Arc<dyn SessionFeed>, cache: LocalCache, poll_interval: Duration) -> Self {
        Self {
            feed,
            cache,
            poll_interval,
            agent: Mutex::new(None),
        }
    }

    pub fn cache(&self) -> &LocalCache {
        &self.cache
    }

    pub async fn session(&self) -> Option<SessionCode> {
        self.agent
            .lock()
            .await
            .as_ref()
            .map(|handle| handle.session().clone())
    }

    /// Holds `session` and polls it. Rebinding the same code keeps the running agent;
    /// a new code stops the old agent and drops fields cached from the old session.
    pub async fn bind(&self, session: SessionCode) {
        let mut agent = self.agent.lock().await;
        if let Some(current) = agent.as_ref() {
            if current.session() == &session && current.is_running() {
                return;
            }
        }

        let previous = agent.take();
        if let Some(previous) = previous {
            let switching = previous.session() != &session;
            previous.stop().await;
            if switching {
                self.cache.clear_shared().await;
            }
        }

        info!(session = %session, "binding device to session");
        *agent = Some(SyncAgent::spawn(
            self.feed.clone(),
            self.cache.clone(),
            session,
            self.poll_interval,
        ));
    }

    /// Stops polling; the cache keeps its contents.
    pub async fn unbind(&self) {
        if let Some(handle) = self.agent.lock().await.take() {
            info!(session = %handle.session(), "unbinding device from session");
            handle.stop().await;
        }
    }

    /// Optimistic local write followed by a fire-and-forget publish.
    ///
    /// The returned handle is only useful to tests and shutdown paths; publish
    /// failures are logged and the next poll reconciles.
    pub async fn record(
        &self,
        name: impl Into<FieldName>,
        value: impl Into<FieldValue>,
    ) -> Option<JoinHandle<()>> {
        let name = name.into();
        let value = value.into();
        self.cache.set(name.clone(), value.clone()).await;

        if self.cache.is_device_only(&name) {
            return None;
        }
        let Some(session) = self.session().await else {
            warn!(field = %name, "no session held; change kept locally only");
            return None;
        };
        Some(self.publish(FieldUpdate::field(session, name, value)))
    }

    /// Pushes every shared cached field as one snapshot.
    pub async fn record_snapshot(&self) -> Option<JoinHandle<()>> {
        let Some(session) = self.session().await else {
            warn!("no session held; snapshot not sent");
            return None;
        };
        let fields = self.cache.shared_snapshot().await;
        if fields.is_empty() {
            return None;
        }
        Some(self.publish(FieldUpdate::snapshot(session, fields)))
    }

    fn publish(&self, update: FieldUpdate) -> JoinHandle<()> {
        let feed = self.feed.clone();
        tokio::spawn(async move {
            match feed.publish(&update).await {
                Ok(()) => debug!(session = %update.session(), "published session update"),
                Err(err) => warn!(
                    session = %update.session(),
                    error = %err,
                    "session update not published; relying on next poll"
                ),
            }
        })
    }
}
