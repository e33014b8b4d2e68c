//! Primary cache backend.
//!
//! `PrimaryBackend` is the seam between `CacheStore` and the shared key/value
//! service. `RedisBackend` is the production implementation.

use std::time::Duration;

use async_trait::async_trait;
use redis::AsyncCommands;
use redis::aio::MultiplexedConnection;
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::debug;

#[derive(Debug, Error)]
pub enum BackendError {
    #[error("redis error: {0}")]
    Redis(#[from] redis::RedisError),
    #[error("backend operation timed out after {0:?}")]
    Timeout(Duration),
    #[error("backend not connected: {0}")]
    NotConnected(String),
}

/// Shared key/value service holding already-namespaced, serialized entries.
///
/// Implementations report failures as errors; `CacheStore` turns them into
/// misses and dropped writes.
#[async_trait]
pub trait PrimaryBackend: Send + Sync + 'static {
    /// Cheap round trip used to decide availability.
    async fn ping(&self) -> Result<(), BackendError>;
    async fn get(&self, key: &str) -> Result<Option<String>, BackendError>;
    /// Store `value` expiring `ttl` from now. Overwrites any previous value.
    async fn set(&self, key: &str, value: &str, ttl: Duration) -> Result<(), BackendError>;
    async fn delete(&self, key: &str) -> Result<(), BackendError>;
}

/// Redis-backed primary store over a lazily opened multiplexed connection.
pub struct RedisBackend {
    client: redis::Client,
    connect_timeout: Duration,
    connection: Mutex<Option<MultiplexedConnection>>,
}

impl RedisBackend {
    /// Parse the URL without connecting; the first operation connects.
    pub fn open(url: &str, connect_timeout: Duration) -> Result<Self, BackendError> {
        let client = redis::Client::open(url)?;
        Ok(Self {
            client,
            connect_timeout,
            connection: Mutex::new(None),
        })
    }

    async fn connection(&self) -> Result<MultiplexedConnection, BackendError> {
        let mut slot = self.connection.lock().await;
        if let Some(conn) = slot.as_ref() {
            return Ok(conn.clone());
        }

        let conn = tokio::time::timeout(
            self.connect_timeout,
            self.client.get_multiplexed_async_connection(),
        )
        .await
        .map_err(|_| BackendError::Timeout(self.connect_timeout))??;

        debug!(backend = "redis", "opened primary cache connection");
        *slot = Some(conn.clone());
        Ok(conn)
    }

    /// Drop the cached connection so the next call reconnects.
    async fn reset_on_error<T>(
        &self,
        result: Result<T, redis::RedisError>,
    ) -> Result<T, BackendError> {
        match result {
            Ok(value) => Ok(value),
            Err(err) => {
                if err.is_connection_dropped() || err.is_io_error() || err.is_timeout() {
                    self.connection.lock().await.take();
                }
                Err(err.into())
            }
        }
    }
}

#[async_trait]
impl PrimaryBackend for RedisBackend {
    async fn ping(&self) -> Result<(), BackendError> {
        let mut conn = self.connection().await?;
        let result: Result<String, _> = redis::cmd("PING").query_async(&mut conn).await;
        self.reset_on_error(result).await.map(|_| ())
    }

    async fn get(&self, key: &str) -> Result<Option<String>, BackendError> {
        let mut conn = self.connection().await?;
        let result: Result<Option<String>, _> = conn.get(key).await;
        self.reset_on_error(result).await
    }

    async fn set(&self, key: &str, value: &str, ttl: Duration) -> Result<(), BackendError> {
        let mut conn = self.connection().await?;
        let seconds = ttl.as_secs().max(1);
        let result: Result<(), _> = conn.set_ex(key, value, seconds).await;
        self.reset_on_error(result).await
    }

    async fn delete(&self, key: &str) -> Result<(), BackendError> {
        let mut conn = self.connection().await?;
        let result: Result<i64, _> = conn.del(key).await;
        self.reset_on_error(result).await.map(|_| ())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn open_rejects_malformed_url() {
        let result = RedisBackend::open("not a url", Duration::from_millis(10));
        assert!(matches!(result, Err(BackendError::Redis(_))));
    }

    #[test]
    fn open_does_not_connect() {
        // Nothing listens on port 1; opening must still succeed.
        let backend = RedisBackend::open("redis://127.0.0.1:1/", Duration::from_millis(10));
        assert!(backend.is_ok());
    }
}
