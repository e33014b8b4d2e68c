//! Cache configuration.
//!
//! Controls the key namespace, the fallback store bound, TTLs and the primary
//! backend connection via `snapfront.toml`.

use std::collections::BTreeMap;
use std::num::NonZeroUsize;
use std::time::Duration;

use super::keys::ResourceClass;

// Default values for cache configuration
const DEFAULT_NAMESPACE: &str = "snapfront";
const DEFAULT_MAXSIZE: usize = 1000;
const DEFAULT_TTL_SECS: u64 = 300;
const DEFAULT_CONNECT_TIMEOUT_MS: u64 = 1000;
const DEFAULT_OPERATION_TIMEOUT_MS: u64 = 500;
const DEFAULT_RECONNECT_INTERVAL_SECS: u64 = 30;

/// Cache configuration, resolved once per process.
#[derive(Debug, Clone)]
pub struct CacheConfig {
    /// Prefix applied to every key.
    pub namespace: String,
    /// Maximum entries held by the in-process fallback store.
    pub maxsize: usize,
    /// TTL used when a caller does not pass one.
    pub ttl_secs: u64,
    /// Primary backend URL; `None` runs on the fallback store only.
    pub redis_url: Option<String>,
    /// Timeout for establishing the primary connection.
    pub connect_timeout_ms: u64,
    /// Timeout for every primary operation, probes included.
    pub operation_timeout_ms: u64,
    /// Minimum delay before an unavailable primary is probed again.
    pub reconnect_interval_secs: u64,
    /// Per-class TTL overrides in seconds.
    pub class_ttl_secs: BTreeMap<ResourceClass, u64>,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            namespace: DEFAULT_NAMESPACE.to_string(),
            maxsize: DEFAULT_MAXSIZE,
            ttl_secs: DEFAULT_TTL_SECS,
            redis_url: None,
            connect_timeout_ms: DEFAULT_CONNECT_TIMEOUT_MS,
            operation_timeout_ms: DEFAULT_OPERATION_TIMEOUT_MS,
            reconnect_interval_secs: DEFAULT_RECONNECT_INTERVAL_SECS,
            class_ttl_secs: BTreeMap::new(),
        }
    }
}

impl From<&crate::config::CacheSettings> for CacheConfig {
    fn from(settings: &crate::config::CacheSettings) -> Self {
        Self {
            namespace: settings.namespace.clone(),
            maxsize: settings.maxsize.get(),
            ttl_secs: settings.default_ttl.as_secs(),
            redis_url: settings.redis_url.clone(),
            connect_timeout_ms: duration_millis(settings.connect_timeout),
            operation_timeout_ms: duration_millis(settings.operation_timeout),
            reconnect_interval_secs: settings.reconnect_interval.as_secs(),
            class_ttl_secs: settings
                .class_ttl
                .iter()
                .map(|(class, ttl)| (*class, ttl.as_secs()))
                .collect(),
        }
    }
}

impl CacheConfig {
    /// Returns the fallback bound as NonZeroUsize, clamping to 1 if zero.
    pub fn maxsize_non_zero(&self) -> NonZeroUsize {
        NonZeroUsize::new(self.maxsize).unwrap_or(NonZeroUsize::MIN)
    }

    /// Default TTL, clamped to at least one second.
    pub fn default_ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_secs.max(1))
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms.max(1))
    }

    pub fn operation_timeout(&self) -> Duration {
        Duration::from_millis(self.operation_timeout_ms.max(1))
    }

    pub fn reconnect_interval(&self) -> Duration {
        Duration::from_secs(self.reconnect_interval_secs)
    }

    /// TTL for a resource class: configured override, else the class default.
    pub fn class_ttl(&self, class: ResourceClass) -> Duration {
        self.class_ttl_secs
            .get(&class)
            .map(|secs| Duration::from_secs((*secs).max(1)))
            .unwrap_or_else(|| class.default_ttl())
    }
}

fn duration_millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_values() {
        let config = CacheConfig::default();
        assert_eq!(config.namespace, "snapfront");
        assert_eq!(config.maxsize, 1000);
        assert_eq!(config.ttl_secs, 300);
        assert!(config.redis_url.is_none());
        assert_eq!(config.operation_timeout(), Duration::from_millis(500));
        assert_eq!(config.reconnect_interval(), Duration::from_secs(30));
    }

    #[test]
    fn non_zero_clamps_to_min() {
        let config = CacheConfig {
            maxsize: 0,
            ttl_secs: 0,
            ..Default::default()
        };
        assert_eq!(config.maxsize_non_zero().get(), 1);
        assert_eq!(config.default_ttl(), Duration::from_secs(1));
    }

    #[test]
    fn class_ttl_prefers_override() {
        let mut config = CacheConfig::default();
        config.class_ttl_secs.insert(ResourceClass::SnapInfo, 42);

        assert_eq!(
            config.class_ttl(ResourceClass::SnapInfo),
            Duration::from_secs(42)
        );
        assert_eq!(
            config.class_ttl(ResourceClass::Explore),
            ResourceClass::Explore.default_ttl()
        );
    }
}
