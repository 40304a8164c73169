//! Cache-with-TTL session storage on Redis
//!
//! Each session is one string key holding the JSON record. Expiration is left
//! to the server: every save sets the key's TTL to the time remaining until
//! `expire`, so there is nothing for a sweep to do.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use redis::aio::ConnectionManager;
use redis::{AsyncCommands, RedisError};
use sessionstore_core::config::RedisConfig;
use sessionstore_core::{Session, SessionError, SessionProvider, SessionRecord, SessionResult};
use tokio::sync::OnceCell;
use tracing::{debug, info};

const BACKEND: &str = "redis";

/// Redis session storage
///
/// No connection is opened until the first operation. Concurrent first
/// callers share a single connection attempt; a failed attempt is retried on
/// the next call.
pub struct RedisProvider {
    url: String,
    key_prefix: Option<String>,
    connection: OnceCell<ConnectionManager>,
}

impl RedisProvider {
    pub fn new(config: &RedisConfig) -> Self {
        Self::with_url(config.connection_url()).with_key_prefix(config.key_prefix.clone())
    }

    /// Use a ready-made `redis://` URL
    pub fn with_url(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            key_prefix: None,
            connection: OnceCell::new(),
        }
    }

    /// Namespace every key as `prefix:id`
    pub fn with_key_prefix(mut self, prefix: Option<String>) -> Self {
        self.key_prefix = prefix.filter(|prefix| !prefix.is_empty());
        self
    }

    /// Build the full key with prefix
    fn build_key(&self, id: &str) -> String {
        match &self.key_prefix {
            Some(prefix) => format!("{}:{}", prefix, id),
            None => id.to_string(),
        }
    }

    async fn connection(&self) -> SessionResult<ConnectionManager> {
        let connection = self
            .connection
            .get_or_try_init(|| async {
                let client = redis::Client::open(self.url.as_str())
                    .map_err(|e| SessionError::storage(BACKEND, "Invalid Redis connection URL", e))?;
                let connection = ConnectionManager::new(client)
                    .await
                    .map_err(|e| SessionError::storage(BACKEND, "Failed to connect to Redis", e))?;

                info!("Connected to Redis session storage");
                Ok::<_, SessionError>(connection)
            })
            .await?;

        Ok(connection.clone())
    }
}

/// Milliseconds left until `expire`, or `None` when it is not in the future
fn ttl_millis(expire: DateTime<Utc>, now: DateTime<Utc>) -> Option<u64> {
    let remaining = (expire - now).num_milliseconds();
    (remaining > 0).then_some(remaining as u64)
}

#[async_trait]
impl SessionProvider for RedisProvider {
    async fn read(&self, id: &str) -> SessionResult<Session> {
        let mut conn = self.connection().await?;

        let value: Option<String> = conn
            .get(self.build_key(id))
            .await
            .map_err(|e: RedisError| SessionError::storage(BACKEND, "Failed to get session from Redis", e))?;

        match value {
            Some(json) => {
                let record: SessionRecord = serde_json::from_str(&json)
                    .map_err(|e| SessionError::serialization("Failed to parse session record", e))?;
                debug!("Loaded session {} from Redis storage", id);
                Ok(Session::from(record))
            }
            None => Err(SessionError::not_found(id)),
        }
    }

    async fn save(&self, session: &Session) -> SessionResult<()> {
        let record = session.to_record();
        let key = self.build_key(&record.uuid);
        let mut conn = self.connection().await?;

        match ttl_millis(record.expire, Utc::now()) {
            Some(ttl) => {
                let json = serde_json::to_string(&record)
                    .map_err(|e| SessionError::serialization("Failed to serialize session record", e))?;

                let _: () = conn
                    .pset_ex(&key, json, ttl)
                    .await
                    .map_err(|e: RedisError| {
                        SessionError::storage(BACKEND, "Failed to set session in Redis", e)
                    })?;
                debug!("Saved session {} to Redis storage (ttl {} ms)", record.uuid, ttl);
            }
            None => {
                // Already expired: behave as an immediate expiry.
                let _: () = conn
                    .del(&key)
                    .await
                    .map_err(|e: RedisError| {
                        SessionError::storage(BACKEND, "Failed to delete session from Redis", e)
                    })?;
                debug!("Session {} saved already expired, key removed", record.uuid);
            }
        }

        Ok(())
    }

    async fn destroy(&self, id: &str) -> SessionResult<()> {
        let mut conn = self.connection().await?;

        let _: () = conn
            .del(self.build_key(id))
            .await
            .map_err(|e: RedisError| SessionError::storage(BACKEND, "Failed to delete session from Redis", e))?;

        debug!("Destroyed session {} in Redis storage", id);
        Ok(())
    }

    async fn garbage_collect(&self) -> SessionResult<u64> {
        // Keys expire on the server.
        Ok(0)
    }
}
