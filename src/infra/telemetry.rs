use std::sync::Once;

use metrics::{Unit, describe_counter, describe_gauge};
use tracing_error::ErrorLayer;
use tracing_subscriber::{
    EnvFilter, fmt,
    layer::{Layer, SubscriberExt},
    util::SubscriberInitExt,
};

use crate::config::{LogFormat, LoggingSettings};

use super::error::InfraError;

static METRIC_DESCRIPTIONS: Once = Once::new();

/// Install a global tracing subscriber using the provided logging settings.
///
/// Logs go to stderr so command output on stdout stays machine-readable.
pub fn init(logging: &LoggingSettings) -> Result<(), InfraError> {
    describe_metrics();

    let env_filter = EnvFilter::builder()
        .with_default_directive(logging.level.into())
        .from_env_lossy();

    let fmt_layer = match logging.format {
        LogFormat::Json => fmt::layer()
            .json()
            .with_writer(std::io::stderr)
            .with_current_span(true)
            .with_span_list(true)
            .with_target(true)
            .boxed(),
        LogFormat::Compact => fmt::layer()
            .compact()
            .with_writer(std::io::stderr)
            .with_target(true)
            .boxed(),
    };

    tracing_subscriber::registry()
        .with(env_filter)
        .with(ErrorLayer::default())
        .with(fmt_layer)
        .try_init()
        .map_err(|err| {
            InfraError::telemetry(format!("failed to install tracing subscriber: {err}"))
        })
}

fn describe_metrics() {
    METRIC_DESCRIPTIONS.call_once(|| {
        describe_counter!(
            "snapfront_cache_hit_total",
            Unit::Count,
            "Total number of cache reads served, by class and key scope."
        );
        describe_counter!(
            "snapfront_cache_miss_total",
            Unit::Count,
            "Total number of cache reads that found no usable entry."
        );
        describe_counter!(
            "snapfront_cache_write_total",
            Unit::Count,
            "Total number of cache writes, by class and key scope."
        );
        describe_counter!(
            "snapfront_cache_primary_failure_total",
            Unit::Count,
            "Total number of primary backend operations that failed or timed out."
        );
        describe_counter!(
            "snapfront_cache_fallback_evict_total",
            Unit::Count,
            "Total number of fallback store evictions due to capacity."
        );
        describe_gauge!(
            "snapfront_cache_primary_available",
            Unit::Count,
            "1 while the primary backend is reachable, 0 otherwise."
        );
    });
}
