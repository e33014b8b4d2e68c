//! Primary cache backend bootstrap.

use std::sync::Arc;

use tracing::info;

use crate::cache::{CacheConfig, PrimaryBackend, RedisBackend};

use super::error::InfraError;

/// Opens the configured Redis backend, or `None` when the cache runs on the
/// in-process fallback only. A URL Redis cannot parse is a configuration
/// error rather than a cache failure.
pub fn open_primary(config: &CacheConfig) -> Result<Option<Arc<dyn PrimaryBackend>>, InfraError> {
    let Some(url) = config.redis_url.as_deref() else {
        info!("no primary cache backend configured, using the in-process fallback only");
        return Ok(None);
    };

    let backend: Arc<dyn PrimaryBackend> = Arc::new(
        RedisBackend::open(url, config.connect_timeout()).map_err(|err| {
            InfraError::configuration(format!("invalid cache.redis_url `{url}`: {err}"))
        })?,
    );
    Ok(Some(backend))
}
