//! Session record storage.
//!
//! One hash per session code, field name to JSON value, with a sliding expiry. The
//! process builds exactly one backend at startup and every request handler shares it,
//! so devices served by the same process always observe each other's writes.

mod memory;
mod redis_store;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;
use waypoint_core::{FieldName, FieldValue, SessionCode, SessionFields};

pub use memory::MemoryStore;
pub use redis_store::RedisStore;

pub type SharedStore = Arc<dyn StoreBackend>;

/// Longest session lifetime a backend accepts (30 days).
pub const MAX_SESSION_TTL: Duration = Duration::from_secs(30 * 24 * 60 * 60);

/// Bounds a configured TTL to `1s..=MAX_SESSION_TTL`. A zero TTL would make every
/// write delete the record it just created.
pub fn clamp_ttl(ttl: Duration) -> Duration {
    ttl.clamp(Duration::from_secs(1), MAX_SESSION_TTL)
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("failed to connect to session store: {0}")]
    Connect(#[source] redis::RedisError),
    #[error("redis error: {0}")]
    Redis(#[from] redis::RedisError),
    #[error("failed to encode field value: {0}")]
    Encode(#[from] serde_json::Error),
}

#[async_trait]
pub trait StoreBackend: Send + Sync {
    /// Upserts one field, creating the session when needed, and refreshes the TTL.
    async fn set_field(
        &self,
        session: &SessionCode,
        name: &FieldName,
        value: &FieldValue,
    ) -> Result<(), StoreError>;

    /// Upserts every field of `fields` in one atomic operation and refreshes the TTL.
    async fn merge_snapshot(
        &self,
        session: &SessionCode,
        fields: &SessionFields,
    ) -> Result<(), StoreError>;

    /// Reads one field without touching the TTL.
    async fn get_field(
        &self,
        session: &SessionCode,
        name: &FieldName,
    ) -> Result<Option<FieldValue>, StoreError>;

    /// Full record, empty when unknown or expired. Only a non-empty result refreshes the
    /// TTL.
    async fn get_all(&self, session: &SessionCode) -> Result<SessionFields, StoreError>;

    fn backend_name(&self) -> &'static str;
}
