use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use dashmap::DashMap;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, info};
use waypoint_core::{FieldName, FieldValue, SessionCode, SessionFields};

use super::{clamp_ttl, StoreBackend, StoreError};

#[derive(Debug)]
struct SessionEntry {
    fields: SessionFields,
    expires_at: Instant,
}

impl SessionEntry {
    fn is_expired(&self, now: Instant) -> bool {
        now >= self.expires_at
    }
}

/// In-process fallback used when no networked store is configured.
///
/// Clones share the same map. Each session lives in one map entry and every mutation
/// happens under that entry's shard lock, so a snapshot merge is never observed half
/// applied. Expiry runs on the Tokio clock.
#[derive(Clone)]
pub struct MemoryStore {
    sessions: Arc<DashMap<String, SessionEntry>>,
    ttl: Duration,
}

impl MemoryStore {
    pub fn new(ttl: Duration) -> Self {
        Self {
            sessions: Arc::new(DashMap::new()),
            ttl: clamp_ttl(ttl),
        }
    }

    /// Periodically drops expired sessions. Reads already ignore them; this only keeps
    /// abandoned sessions from holding memory.
    pub fn spawn_sweeper(&self, every: Duration) -> JoinHandle<()> {
        let store = self.clone();
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(every);
            loop {
                interval.tick().await;
                let purged = store.purge_expired();
                if purged > 0 {
                    info!(purged, "purged expired sessions from memory store");
                }
            }
        })
    }

    pub fn purge_expired(&self) -> usize {
        let now = Instant::now();
        let before = self.sessions.len();
        self.sessions.retain(|_, entry| !entry.is_expired(now));
        before.saturating_sub(self.sessions.len())
    }

    pub fn session_count(&self) -> usize {
        self.sessions.len()
    }

    /// Applies `update` to the live entry for `session`, starting from an empty record
    /// when the session is unknown or expired, and pushes the expiry out.
    fn upsert(&self, session: &SessionCode, update: impl FnOnce(&mut SessionFields)) {
        let now = Instant::now();
        let expires_at = now + self.ttl;
        let mut entry = self
            .sessions
            .entry(session.store_key())
            .or_insert_with(|| SessionEntry {
                fields: SessionFields::new(),
                expires_at,
            });
        if entry.is_expired(now) {
            entry.fields = SessionFields::new();
        }
        update(&mut entry.fields);
        entry.expires_at = expires_at;
    }

    fn drop_if_expired(&self, key: &str, now: Instant) {
        if self
            .sessions
            .remove_if(key, |_, entry| entry.is_expired(now))
            .is_some()
        {
            debug!(key, "dropped expired session on read");
        }
    }
}

#[async_trait]
impl StoreBackend for MemoryStore {
    async fn set_field(
        &self,
        session: &SessionCode,
        name: &FieldName,
        value: &FieldValue,
    ) -> Result<(), StoreError> {
        self.upsert(session, |fields| {
            fields.insert(name.clone(), value.clone());
        });
        Ok(())
    }

    async fn merge_snapshot(
        &self,
        session: &SessionCode,
        fields: &SessionFields,
    ) -> Result<(), StoreError> {
        if fields.is_empty() {
            return Ok(());
        }
        self.upsert(session, |current| current.upsert_all(fields));
        Ok(())
    }

    async fn get_field(
        &self,
        session: &SessionCode,
        name: &FieldName,
    ) -> Result<Option<FieldValue>, StoreError> {
        let now = Instant::now();
        Ok(self
            .sessions
            .get(&session.store_key())
            .filter(|entry| !entry.is_expired(now))
            .and_then(|entry| entry.fields.get(name).cloned()))
    }

    async fn get_all(&self, session: &SessionCode) -> Result<SessionFields, StoreError> {
        let key = session.store_key();
        let now = Instant::now();
        self.drop_if_expired(&key, now);

        let Some(mut entry) = self.sessions.get_mut(&key) else {
            return Ok(SessionFields::new());
        };
        if !entry.fields.is_empty() {
            entry.expires_at = now + self.ttl;
        }
        Ok(entry.fields.clone())
    }

    fn backend_name(&self) -> &'static str {
        "memory"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    const TTL: Duration = Duration::from_secs(6 * 60 * 60);

    fn code(raw: &str) -> SessionCode {
        SessionCode::parse(raw).unwrap()
    }

    #[test_timeout::tokio_timeout_test(10, paused)]
    async fn first_write_creates_the_session() {
        let store = MemoryStore::new(TTL);
        let session = code("ABCD1234");
        assert!(store.get_all(&session).await.unwrap().is_empty());
        assert_eq!(store.session_count(), 0);

        store
            .set_field(&session, &FieldName::Started, &FieldValue::Flag(true))
            .await
            .unwrap();
        let fields = store.get_all(&session).await.unwrap();
        assert!(fields.flag(&FieldName::Started));
        assert_eq!(
            store.get_field(&session, &FieldName::Started).await.unwrap(),
            Some(FieldValue::Flag(true))
        );
    }

    #[test_timeout::tokio_timeout_test(10, paused)]
    async fn clones_share_one_record() {
        let host = MemoryStore::new(TTL);
        let player = host.clone();
        let session = code("shared");

        host.set_field(&session, &FieldName::HintsS1Unlocked, &true.into())
            .await
            .unwrap();
        player
            .set_field(&session, &FieldName::Token1, &"C".into())
            .await
            .unwrap();

        let seen_by_host = host.get_all(&session).await.unwrap();
        assert!(seen_by_host.flag(&FieldName::HintsS1Unlocked));
        assert_eq!(seen_by_host.text(&FieldName::Token1), Some("C"));
    }

    #[test_timeout::tokio_timeout_test(10, paused)]
    async fn ttl_slides_on_non_empty_reads() {
        let store = MemoryStore::new(TTL);
        let session = code("ttl");
        store
            .set_field(&session, &FieldName::Started, &true.into())
            .await
            .unwrap();

        tokio::time::advance(Duration::from_secs(5 * 60 * 60)).await;
        assert!(!store.get_all(&session).await.unwrap().is_empty());

        // Five more hours: past the original expiry, inside the refreshed one.
        tokio::time::advance(Duration::from_secs(5 * 60 * 60)).await;
        assert!(!store.get_all(&session).await.unwrap().is_empty());

        tokio::time::advance(TTL + Duration::from_secs(1)).await;
        assert!(store.get_all(&session).await.unwrap().is_empty());
        assert_eq!(store.session_count(), 0);
        assert_eq!(
            store.get_field(&session, &FieldName::Started).await.unwrap(),
            None
        );
    }

    #[test_timeout::tokio_timeout_test(10, paused)]
    async fn empty_reads_do_not_resurrect_or_extend() {
        let store = MemoryStore::new(TTL);
        let session = code("ghost");
        assert!(store.get_all(&session).await.unwrap().is_empty());
        assert_eq!(store.session_count(), 0);

        store
            .set_field(&session, &FieldName::Token2, &"8".into())
            .await
            .unwrap();
        tokio::time::advance(TTL).await;
        assert!(store.get_all(&session).await.unwrap().is_empty());

        // A write after expiry starts a fresh record.
        store
            .set_field(&session, &FieldName::Token3, &"H".into())
            .await
            .unwrap();
        let fields = store.get_all(&session).await.unwrap();
        assert_eq!(fields.len(), 1);
        assert_eq!(fields.text(&FieldName::Token3), Some("H"));
    }

    #[test_timeout::tokio_timeout_test(10, paused)]
    async fn snapshot_merges_every_key() {
        let store = MemoryStore::new(TTL);
        let session = code("snap");
        store
            .set_field(&session, &FieldName::Started, &true.into())
            .await
            .unwrap();

        let snapshot: SessionFields =
            serde_json::from_value(json!({ "a": 1, "b": 2, "c": 3 })).unwrap();
        store.merge_snapshot(&session, &snapshot).await.unwrap();

        let fields = store.get_all(&session).await.unwrap();
        assert_eq!(fields.len(), 4);
        assert_eq!(fields.get(&"b".into()), Some(&FieldValue::from(json!(2))));
    }

    #[test_timeout::timeout(30)]
    fn concurrent_readers_never_see_a_partial_snapshot() {
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(4)
            .enable_all()
            .build()
            .unwrap();
        runtime.block_on(async {
            for round in 0..50 {
                let store = MemoryStore::new(TTL);
                let session = code(&format!("atomic{round}"));
                let snapshot: SessionFields =
                    serde_json::from_value(json!({ "a": 1, "b": 2, "c": 3 })).unwrap();

                let readers: Vec<_> = (0..3)
                    .map(|_| {
                        let store = store.clone();
                        let session = session.clone();
                        tokio::spawn(async move {
                            let mut seen = Vec::new();
                            loop {
                                let len = store.get_all(&session).await.unwrap().len();
                                seen.push(len);
                                if len == 3 {
                                    return seen;
                                }
                                tokio::task::yield_now().await;
                            }
                        })
                    })
                    .collect();
                let writer = {
                    let store = store.clone();
                    let session = session.clone();
                    tokio::spawn(async move { store.merge_snapshot(&session, &snapshot).await })
                };

                writer.await.unwrap().unwrap();
                for reader in readers {
                    let seen = reader.await.unwrap();
                    assert!(
                        seen.iter().all(|len| *len == 0 || *len == 3),
                        "round {round} observed a partial snapshot: {seen:?}"
                    );
                }
            }
        });
    }

    #[test_timeout::tokio_timeout_test(10, paused)]
    async fn zero_ttl_still_keeps_a_fresh_write() {
        let store = MemoryStore::new(Duration::ZERO);
        let session = code("zero");
        store
            .set_field(&session, &FieldName::Started, &true.into())
            .await
            .unwrap();
        assert!(store.get_all(&session).await.unwrap().flag(&FieldName::Started));

        tokio::time::advance(Duration::from_secs(2)).await;
        assert!(store.get_all(&session).await.unwrap().is_empty());
    }

    #[test_timeout::tokio_timeout_test(10, paused)]
    async fn oversized_ttl_is_capped() {
        let store = MemoryStore::new(Duration::from_secs(u64::MAX));
        let session = code("forever");
        store
            .set_field(&session, &FieldName::Started, &true.into())
            .await
            .unwrap();
        tokio::time::advance(super::super::MAX_SESSION_TTL + Duration::from_secs(1)).await;
        assert!(store.get_all(&session).await.unwrap().is_empty());
    }

    #[test_timeout::tokio_timeout_test(10, paused)]
    async fn sweeper_purges_abandoned_sessions() {
        let store = MemoryStore::new(Duration::from_secs(60));
        store
            .set_field(&code("old"), &FieldName::Started, &true.into())
            .await
            .unwrap();
        let sweeper = store.spawn_sweeper(Duration::from_secs(30));

        tokio::time::sleep(Duration::from_secs(95)).await;
        assert_eq!(store.session_count(), 0);
        sweeper.abort();
    }
}
