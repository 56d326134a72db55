use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::{AsyncCommands, Client, IntoConnectionInfo};
use serde_json::Value;
use tracing::debug;
use waypoint_core::{FieldName, FieldValue, SessionCode, SessionFields};

use super::{clamp_ttl, StoreBackend, StoreError};

/// Networked backend: one Redis hash per session, values stored as JSON text.
#[derive(Clone)]
pub struct RedisStore {
    redis: ConnectionManager,
    ttl_seconds: i64,
}

impl RedisStore {
    /// Connects to `url`, authenticating with `token` as the Redis password. A blank
    /// token keeps whatever credentials the URL carries.
    pub async fn connect(url: &str, token: &str, ttl: Duration) -> Result<Self, StoreError> {
        let mut info = url.into_connection_info()?;
        if !token.trim().is_empty() {
            info.redis.password = Some(token.to_string());
        }
        let client = Client::open(info)?;
        let redis = ConnectionManager::new(client)
            .await
            .map_err(StoreError::Connect)?;

        Ok(Self {
            redis,
            ttl_seconds: expire_seconds(ttl),
        })
    }
}

/// Seconds for `EXPIRE`, always positive.
fn expire_seconds(ttl: Duration) -> i64 {
    i64::try_from(clamp_ttl(ttl).as_secs()).unwrap_or(i64::MAX)
}

fn encode(value: &FieldValue) -> Result<String, StoreError> {
    Ok(serde_json::to_string(value)?)
}

/// Values written by other tools may not be JSON; those surface as plain strings.
fn decode(raw: String) -> FieldValue {
    match serde_json::from_str::<Value>(&raw) {
        Ok(value) => FieldValue::from(value),
        Err(_) => FieldValue::Text(raw),
    }
}

#[async_trait]
impl StoreBackend for RedisStore {
    async fn set_field(
        &self,
        session: &SessionCode,
        name: &FieldName,
        value: &FieldValue,
    ) -> Result<(), StoreError> {
        let mut conn = self.redis.clone();
        let key = session.store_key();
        let encoded = encode(value)?;
        redis::pipe()
            .atomic()
            .hset(&key, name.as_str(), encoded)
            .ignore()
            .expire(&key, self.ttl_seconds)
            .ignore()
            .query_async::<()>(&mut conn)
            .await?;
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
        let mut conn = self.redis.clone();
        let key = session.store_key();
        let items = fields
            .iter()
            .map(|(name, value)| Ok((name.as_str().to_string(), encode(value)?)))
            .collect::<Result<Vec<(String, String)>, StoreError>>()?;
        redis::pipe()
            .atomic()
            .hset_multiple(&key, items.as_slice())
            .ignore()
            .expire(&key, self.ttl_seconds)
            .ignore()
            .query_async::<()>(&mut conn)
            .await?;
        debug!(session = %session, fields = items.len(), "merged snapshot into redis hash");
        Ok(())
    }

    async fn get_field(
        &self,
        session: &SessionCode,
        name: &FieldName,
    ) -> Result<Option<FieldValue>, StoreError> {
        let mut conn = self.redis.clone();
        let raw: Option<String> = conn.hget(session.store_key(), name.as_str()).await?;
        Ok(raw.map(decode))
    }

    async fn get_all(&self, session: &SessionCode) -> Result<SessionFields, StoreError> {
        let mut conn = self.redis.clone();
        let key = session.store_key();
        let raw: HashMap<String, String> = conn.hgetall(&key).await?;
        if raw.is_empty() {
            return Ok(SessionFields::new());
        }

        conn.expire::<_, ()>(&key, self.ttl_seconds).await?;
        Ok(raw
            .into_iter()
            .map(|(name, value)| (FieldName::from(name), decode(value)))
            .collect())
    }

    fn backend_name(&self) -> &'static str {
        "redis"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test_timeout::timeout]
    fn foreign_values_decode_as_text() {
        assert_eq!(decode("true".into()), FieldValue::Flag(true));
        assert_eq!(decode("\"C\"".into()), FieldValue::from("C"));
        assert_eq!(decode("{\"a\":1}".into()), FieldValue::from(json!({ "a": 1 })));
        assert_eq!(decode("plain words".into()), FieldValue::from("plain words"));
    }

    #[test_timeout::timeout]
    fn expire_seconds_are_positive_and_bounded() {
        assert_eq!(expire_seconds(Duration::ZERO), 1);
        assert_eq!(expire_seconds(Duration::from_secs(21_600)), 21_600);
        assert_eq!(
            expire_seconds(Duration::from_secs(u64::MAX)),
            super::super::MAX_SESSION_TTL.as_secs() as i64
        );
    }

    #[test_timeout::timeout]
    fn strings_are_stored_quoted() {
        assert_eq!(encode(&FieldValue::from("8")).unwrap(), "\"8\"");
        assert_eq!(encode(&FieldValue::Flag(false)).unwrap(), "false");
    }
}
