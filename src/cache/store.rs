//! Namespaced cache store.
//!
//! Reads and writes go to the primary backend while it is available and to
//! the in-process fallback otherwise. No operation ever returns an error:
//! failures degrade to a miss, a dropped write or a no-op delete.

use std::future::Future;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use metrics::{counter, gauge};
use serde::Serialize;
use serde::de::DeserializeOwned;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

use super::backend::{BackendError, PrimaryBackend};
use super::config::CacheConfig;
use super::fallback::FallbackStore;
use super::lock::mutex_lock;

const SOURCE: &str = "cache::store";
const METRIC_PRIMARY_FAILURE_TOTAL: &str = "snapfront_cache_primary_failure_total";
const METRIC_PRIMARY_AVAILABLE: &str = "snapfront_cache_primary_available";

#[derive(Debug, Clone, Copy)]
enum PrimaryHealth {
    Unprobed,
    Available,
    Unavailable { since: Instant },
}

/// Process-wide cache handle.
///
/// Build one at startup and share it as `Arc<CacheStore>`.
pub struct CacheStore {
    namespace: String,
    default_ttl: Duration,
    operation_timeout: Duration,
    probe_timeout: Duration,
    reconnect_interval: Duration,
    primary: Option<Arc<dyn PrimaryBackend>>,
    fallback: FallbackStore,
    health: Mutex<PrimaryHealth>,
}

impl CacheStore {
    /// Create a store. Without a primary backend every operation uses the
    /// fallback and `is_primary_available` stays false.
    pub fn new(config: &CacheConfig, primary: Option<Arc<dyn PrimaryBackend>>) -> Self {
        Self {
            namespace: config.namespace.clone(),
            default_ttl: config.default_ttl(),
            operation_timeout: config.operation_timeout(),
            // A probe may have to open the connection first.
            probe_timeout: config.connect_timeout() + config.operation_timeout(),
            reconnect_interval: config.reconnect_interval(),
            primary,
            fallback: FallbackStore::new(config.maxsize_non_zero()),
            health: Mutex::new(PrimaryHealth::Unprobed),
        }
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    pub fn default_ttl(&self) -> Duration {
        self.default_ttl
    }

    pub fn has_primary(&self) -> bool {
        self.primary.is_some()
    }

    /// Whether the last probe or operation against the primary succeeded.
    ///
    /// Does not probe; a store that has not been used yet reports `false`.
    pub fn is_primary_available(&self) -> bool {
        matches!(
            *mutex_lock(&self.health, SOURCE, "is_primary_available"),
            PrimaryHealth::Available
        )
    }

    /// Probe the primary now, bypassing the reconnect interval.
    pub async fn probe(&self) -> bool {
        match &self.primary {
            Some(primary) => self.run_probe(primary).await,
            None => false,
        }
    }

    /// Fetch and decode `key`. A miss, a backend failure and a value that does
    /// not decode as `T` all return `None`.
    pub async fn get<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        let key = self.namespaced(key);
        let raw = match self.available_primary().await {
            Some(primary) => {
                match self.guarded("get", primary.get(&key)).await {
                    Ok(raw) => raw,
                    Err(()) => self.fallback.get(&key),
                }
            }
            None => self.fallback.get(&key),
        }?;

        match serde_json::from_str(&raw) {
            Ok(value) => Some(value),
            Err(err) => {
                debug!(
                    key = %key,
                    error = %err,
                    outcome = "type_mismatch",
                    "cached value does not match expected shape, treating as miss"
                );
                None
            }
        }
    }

    /// Store `value` under `key` with the default TTL.
    pub async fn set<T: Serialize + ?Sized>(&self, key: &str, value: &T) {
        self.set_with_ttl(key, value, self.default_ttl).await;
    }

    /// Store `value` under `key`, expiring `ttl` from now. Overwrites fully.
    pub async fn set_with_ttl<T: Serialize + ?Sized>(&self, key: &str, value: &T, ttl: Duration) {
        let key = self.namespaced(key);
        let ttl = ttl.max(Duration::from_secs(1));
        let encoded = match serde_json::to_string(value) {
            Ok(encoded) => encoded,
            Err(err) => {
                error!(key = %key, error = %err, "failed to serialize cache value, dropping write");
                return;
            }
        };

        match self.available_primary().await {
            Some(primary) => {
                if self
                    .guarded("set", primary.set(&key, &encoded, ttl))
                    .await
                    .is_err()
                {
                    self.fallback.set(&key, encoded, ttl);
                }
            }
            None => self.fallback.set(&key, encoded, ttl),
        }
    }

    /// Remove `key` from the primary and the fallback. No-op if absent.
    ///
    /// The primary is tried even while it is marked unavailable, so an
    /// invalidation reaches the shared cache as soon as it is reachable again.
    pub async fn delete(&self, key: &str) {
        let key = self.namespaced(key);
        self.fallback.delete(&key);
        match self.available_primary().await {
            Some(primary) => {
                let _ = self.guarded("delete", primary.delete(&key)).await;
            }
            None => {
                if let Some(primary) = &self.primary {
                    self.delete_while_unavailable(primary, &key).await;
                }
            }
        }
    }

    fn namespaced(&self, key: &str) -> String {
        format!("{}:{}", self.namespace, key)
    }

    /// Returns the primary if it should be used for the next operation,
    /// probing lazily on first use and after the reconnect interval.
    async fn available_primary(&self) -> Option<&Arc<dyn PrimaryBackend>> {
        let primary = self.primary.as_ref()?;
        let health = *mutex_lock(&self.health, SOURCE, "available_primary");
        let usable = match health {
            PrimaryHealth::Available => true,
            PrimaryHealth::Unprobed => self.run_probe(primary).await,
            PrimaryHealth::Unavailable { since } => {
                if since.elapsed() >= self.reconnect_interval {
                    self.run_probe(primary).await
                } else {
                    false
                }
            }
        };
        usable.then_some(primary)
    }

    /// A success counts as recovery. A failure leaves the reconnect schedule
    /// untouched.
    async fn delete_while_unavailable(&self, primary: &Arc<dyn PrimaryBackend>, key: &str) {
        match self
            .with_timeout(self.operation_timeout, primary.delete(key))
            .await
        {
            Ok(()) => self.mark_available(),
            Err(err) => {
                counter!(METRIC_PRIMARY_FAILURE_TOTAL, "op" => "delete").increment(1);
                debug!(key = %key, error = %err, "primary cache delete failed during outage");
            }
        }
    }

    async fn run_probe(&self, primary: &Arc<dyn PrimaryBackend>) -> bool {
        match self.with_timeout(self.probe_timeout, primary.ping()).await {
            Ok(()) => {
                self.mark_available();
                true
            }
            Err(err) => {
                self.mark_unavailable("probe", &err);
                false
            }
        }
    }

    /// Run a primary operation under the operation timeout, recording a
    /// failure as unavailability.
    async fn guarded<T>(
        &self,
        op: &'static str,
        future: impl Future<Output = Result<T, BackendError>>,
    ) -> Result<T, ()> {
        self.with_timeout(self.operation_timeout, future)
            .await
            .map_err(|err| {
                self.mark_unavailable(op, &err);
            })
    }

    async fn with_timeout<T>(
        &self,
        limit: Duration,
        future: impl Future<Output = Result<T, BackendError>>,
    ) -> Result<T, BackendError> {
        match tokio::time::timeout(limit, future).await {
            Ok(result) => result,
            Err(_) => Err(BackendError::Timeout(limit)),
        }
    }

    fn mark_available(&self) {
        let previous = {
            let mut health = mutex_lock(&self.health, SOURCE, "mark_available");
            std::mem::replace(&mut *health, PrimaryHealth::Available)
        };
        gauge!(METRIC_PRIMARY_AVAILABLE).set(1.0);

        match previous {
            PrimaryHealth::Available => {}
            PrimaryHealth::Unprobed => {
                info!(namespace = %self.namespace, "primary cache backend available");
            }
            PrimaryHealth::Unavailable { .. } => {
                // Entries written during the outage may have been invalidated
                // on the primary since; drop them before they can resurface.
                self.fallback.clear();
                info!(
                    namespace = %self.namespace,
                    "primary cache backend recovered, fallback cleared"
                );
            }
        }
    }

    fn mark_unavailable(&self, op: &'static str, err: &BackendError) {
        let previous = {
            let mut health = mutex_lock(&self.health, SOURCE, "mark_unavailable");
            std::mem::replace(
                &mut *health,
                PrimaryHealth::Unavailable {
                    since: Instant::now(),
                },
            )
        };
        counter!(METRIC_PRIMARY_FAILURE_TOTAL, "op" => op).increment(1);
        gauge!(METRIC_PRIMARY_AVAILABLE).set(0.0);

        if matches!(previous, PrimaryHealth::Unavailable { .. }) {
            debug!(op, error = %err, "primary cache backend still unavailable");
        } else {
            warn!(
                op,
                error = %err,
                namespace = %self.namespace,
                "primary cache backend unavailable, using in-process fallback"
            );
        }
    }
}
