use std::collections::HashSet;
use std::sync::Arc;

use tokio::sync::{broadcast, RwLock};
use tracing::debug;
use waypoint_core::{FieldName, FieldValue, SessionCode, SessionFields};

const EVENT_CHANNEL_CAPACITY: usize = 64;

/// Notification sent whenever a merge from the store changed the cache.
#[derive(Debug, Clone, PartialEq)]
pub enum SyncEvent {
    Merged {
        session: SessionCode,
        changed: Vec<FieldName>,
    },
}

/// One device's view of its session.
///
/// Clones share state. Fields marked device-only live here but are never included in
/// snapshots pushed to the store.
#[derive(Clone)]
pub struct LocalCache {
    inner: Arc<CacheInner>,
}

struct CacheInner {
    fields: RwLock<SessionFields>,
    device_only: HashSet<FieldName>,
    events: broadcast::Sender<SyncEvent>,
}

impl Default for LocalCache {
    fn default() -> Self {
        Self::new()
    }
}

impl LocalCache {
    pub fn new() -> Self {
        Self::with_device_only(std::iter::empty::<FieldName>())
    }

    pub fn with_device_only<I>(names: I) -> Self
    where
        I: IntoIterator,
        I::Item: Into<FieldName>,
    {
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self {
            inner: Arc::new(CacheInner {
                fields: RwLock::new(SessionFields::new()),
                device_only: names.into_iter().map(Into::into).collect(),
                events,
            }),
        }
    }

    pub fn is_device_only(&self, name: &FieldName) -> bool {
        self.inner.device_only.contains(name)
    }

    /// Local write; applied as given, without merge rules.
    pub async fn set(&self, name: impl Into<FieldName>, value: impl Into<FieldValue>) {
        self.inner.fields.write().await.insert(name, value);
    }

    pub async fn get(&self, name: &FieldName) -> Option<FieldValue> {
        self.inner.fields.read().await.get(name).cloned()
    }

    pub async fn flag(&self, name: &FieldName) -> bool {
        self.inner.fields.read().await.flag(name)
    }

    pub async fn fields(&self) -> SessionFields {
        self.inner.fields.read().await.clone()
    }

    /// Everything that may be pushed to the store.
    pub async fn shared_snapshot(&self) -> SessionFields {
        self.inner
            .fields
            .read()
            .await
            .iter()
            .filter(|(name, _)| !self.is_device_only(name))
            .map(|(name, value)| (name.clone(), value.clone()))
            .collect()
    }

    /// Folds a fetched record into the cache. Device-only names in the record are
    /// ignored. Subscribers hear about it only when something changed.
    pub async fn merge_remote(&self, session: &SessionCode, fetched: &SessionFields) -> Vec<FieldName> {
        let relevant: SessionFields = fetched
            .iter()
            .filter(|(name, _)| !self.is_device_only(name))
            .map(|(name, value)| (name.clone(), value.clone()))
            .collect();

        let changed = self.inner.fields.write().await.merge_remote(&relevant);
        if !changed.is_empty() {
            debug!(session = %session, changed = changed.len(), "merged remote session fields");
            // No subscribers is fine; the cache itself is already updated.
            let _ = self.inner.events.send(SyncEvent::Merged {
                session: session.clone(),
                changed: changed.clone(),
            });
        }
        changed
    }

    /// Drops every field that came from (or goes to) the store, keeping device-only
    /// ones.
    pub async fn clear_shared(&self) {
        let mut fields = self.inner.fields.write().await;
        let kept: SessionFields = fields
            .iter()
            .filter(|(name, _)| self.is_device_only(name))
            .map(|(name, value)| (name.clone(), value.clone()))
            .collect();
        *fields = kept;
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SyncEvent> {
        self.inner.events.subscribe()
    }
}
