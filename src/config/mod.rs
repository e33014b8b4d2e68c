//! Configuration layer: typed settings with layered precedence (file → env → CLI).

use std::{
    collections::{BTreeMap, HashMap},
    num::NonZeroUsize,
    path::PathBuf,
    str::FromStr,
    time::Duration,
};

use clap::{Args, Parser, Subcommand, builder::BoolishValueParser};
use config::{Config, Environment, File};
use redis::IntoConnectionInfo;
use serde::Deserialize;
use thiserror::Error;
use tracing::level_filters::LevelFilter;

use crate::cache::ResourceClass;

const DEFAULT_CONFIG_BASENAME: &str = "config/default";
const LOCAL_CONFIG_BASENAME: &str = "snapfront";
const DEFAULT_CACHE_NAMESPACE: &str = "snapfront";
const DEFAULT_CACHE_MAXSIZE: u64 = 1000;
const DEFAULT_CACHE_TTL_SECS: u64 = 300;
const DEFAULT_CACHE_CONNECT_TIMEOUT_MS: u64 = 1000;
const DEFAULT_CACHE_OPERATION_TIMEOUT_MS: u64 = 500;
const DEFAULT_CACHE_RECONNECT_INTERVAL_SECS: u64 = 30;
const REDIS_URL_SCHEMES: [&str; 3] = ["redis://", "rediss://", "redis+unix://"];

/// Command-line arguments for the snapfront binary.
#[derive(Debug, Parser)]
#[command(name = "snapfront", version, about = "Snap store cache operator tool")]
pub struct CliArgs {
    /// Optional path to a configuration file.
    #[arg(long = "config-file", env = "SNAPFRONT_CONFIG_FILE", value_name = "PATH")]
    pub config_file: Option<PathBuf>,

    #[command(flatten)]
    pub overrides: Overrides,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Debug, Subcommand, Clone)]
pub enum Command {
    /// Probe the primary cache backend and report availability.
    Probe,
    /// Print the cached value a requester would be served.
    Inspect(EntryArgs),
    /// Invalidate the cached entries of a resource.
    Invalidate(EntryArgs),
}

#[derive(Debug, Args, Clone)]
pub struct EntryArgs {
    /// Resource class, e.g. `snap_info` or `store-members`.
    #[arg(value_name = "CLASS")]
    pub class: ResourceClass,

    /// Resource identifier, e.g. a snap name or store id.
    #[arg(value_name = "RESOURCE_ID")]
    pub resource_id: String,

    /// Act as this authenticated identity (includes its owner-scoped entry).
    #[arg(long = "as", value_name = "IDENTITY")]
    pub identity: Option<String>,
}

#[derive(Debug, Args, Default, Clone)]
pub struct Overrides {
    /// Override the base log level (trace|debug|info|warn|error).
    #[arg(long = "log-level", value_name = "LEVEL", global = true)]
    pub log_level: Option<String>,

    /// Toggle JSON logging.
    #[arg(
        long = "log-json",
        value_name = "BOOL",
        value_parser = BoolishValueParser::new(),
        global = true
    )]
    pub log_json: Option<bool>,

    /// Override the cache key namespace.
    #[arg(long = "cache-namespace", value_name = "NAMESPACE", global = true)]
    pub cache_namespace: Option<String>,

    /// Override the primary cache backend URL.
    #[arg(long = "cache-redis-url", value_name = "URL", global = true)]
    pub cache_redis_url: Option<String>,

    /// Override the fallback store capacity.
    #[arg(long = "cache-maxsize", value_name = "COUNT", global = true)]
    pub cache_maxsize: Option<u64>,

    /// Override the default cache TTL.
    #[arg(long = "cache-ttl", value_name = "SECONDS", global = true)]
    pub cache_ttl: Option<u64>,
}

/// Fully-resolved settings after precedence resolution and validation.
#[derive(Debug, Clone)]
pub struct Settings {
    pub logging: LoggingSettings,
    pub cache: CacheSettings,
}

#[derive(Debug, Clone)]
pub struct LoggingSettings {
    pub level: LevelFilter,
    pub format: LogFormat,
}

#[derive(Debug, Clone, Copy)]
pub enum LogFormat {
    Json,
    Compact,
}

#[derive(Debug, Clone)]
pub struct CacheSettings {
    pub namespace: String,
    pub maxsize: NonZeroUsize,
    pub default_ttl: Duration,
    pub redis_url: Option<String>,
    pub connect_timeout: Duration,
    pub operation_timeout: Duration,
    pub reconnect_interval: Duration,
    pub class_ttl: BTreeMap<ResourceClass, Duration>,
}

#[derive(Debug, Error)]
pub enum LoadError {
    #[error("failed to build configuration: {0}")]
    Build(#[from] config::ConfigError),
    #[error("invalid configuration for `{key}`: {reason}")]
    Invalid { key: String, reason: String },
}

impl LoadError {
    fn invalid(key: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Invalid {
            key: key.into(),
            reason: reason.into(),
        }
    }
}

/// Load settings using the configured precedence (file → environment → CLI).
pub fn load(cli: &CliArgs) -> Result<Settings, LoadError> {
    let mut builder = Config::builder()
        .add_source(File::with_name(DEFAULT_CONFIG_BASENAME).required(false))
        .add_source(File::with_name(LOCAL_CONFIG_BASENAME).required(false));

    if let Some(path) = cli.config_file.as_ref() {
        builder = builder.add_source(File::from(path.as_path()).required(true));
    }

    builder = builder.add_source(Environment::with_prefix("SNAPFRONT").separator("__"));

    let mut raw: RawSettings = builder.build()?.try_deserialize()?;
    raw.apply_overrides(&cli.overrides);

    Settings::from_raw(raw)
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawSettings {
    logging: RawLoggingSettings,
    cache: RawCacheSettings,
}

impl RawSettings {
    fn apply_overrides(&mut self, overrides: &Overrides) {
        if let Some(level) = overrides.log_level.as_ref() {
            self.logging.level = Some(level.clone());
        }
        if let Some(json) = overrides.log_json {
            self.logging.json = Some(json);
        }
        if let Some(namespace) = overrides.cache_namespace.as_ref() {
            self.cache.namespace = Some(namespace.clone());
        }
        if let Some(url) = overrides.cache_redis_url.as_ref() {
            self.cache.redis_url = Some(url.clone());
        }
        if let Some(maxsize) = overrides.cache_maxsize {
            self.cache.maxsize = Some(maxsize);
        }
        if let Some(ttl) = overrides.cache_ttl {
            self.cache.ttl = Some(ttl);
        }
    }
}

impl Settings {
    fn from_raw(raw: RawSettings) -> Result<Self, LoadError> {
        let RawSettings { logging, cache } = raw;

        let logging = build_logging_settings(logging)?;
        let cache = build_cache_settings(cache)?;

        Ok(Self { logging, cache })
    }
}

fn build_logging_settings(logging: RawLoggingSettings) -> Result<LoggingSettings, LoadError> {
    let level = match logging.level {
        Some(level) => LevelFilter::from_str(level.as_str()).map_err(|err| {
            LoadError::invalid("logging.level", format!("failed to parse: {err}"))
        })?,
        None => LevelFilter::INFO,
    };

    let format = if logging.json.unwrap_or(false) {
        LogFormat::Json
    } else {
        LogFormat::Compact
    };

    Ok(LoggingSettings { level, format })
}

fn build_cache_settings(cache: RawCacheSettings) -> Result<CacheSettings, LoadError> {
    let namespace = cache
        .namespace
        .map(|value| value.trim().to_string())
        .unwrap_or_else(|| DEFAULT_CACHE_NAMESPACE.to_string());
    if namespace.is_empty() {
        return Err(LoadError::invalid("cache.namespace", "must not be empty"));
    }
    if namespace.chars().any(|ch| ch.is_whitespace() || ch == ':') {
        return Err(LoadError::invalid(
            "cache.namespace",
            "must not contain whitespace or `:`",
        ));
    }

    let maxsize_value = cache.maxsize.unwrap_or(DEFAULT_CACHE_MAXSIZE);
    let maxsize = usize::try_from(maxsize_value)
        .ok()
        .and_then(NonZeroUsize::new)
        .ok_or_else(|| {
            LoadError::invalid("cache.maxsize", "must be greater than zero and fit in usize")
        })?;

    let default_ttl = positive_secs(
        cache.ttl.unwrap_or(DEFAULT_CACHE_TTL_SECS),
        "cache.ttl",
    )?;

    let redis_url = cache.redis_url.and_then(|value| {
        let trimmed = value.trim();
        (!trimmed.is_empty()).then(|| trimmed.to_string())
    });
    if let Some(url) = redis_url.as_deref() {
        if !REDIS_URL_SCHEMES.iter().any(|scheme| url.starts_with(scheme)) {
            return Err(LoadError::invalid(
                "cache.redis_url",
                format!("unsupported scheme in `{url}`"),
            ));
        }
        if let Err(err) = url.into_connection_info() {
            return Err(LoadError::invalid(
                "cache.redis_url",
                format!("malformed url `{url}`: {err}"),
            ));
        }
    }

    let connect_timeout = positive_millis(
        cache
            .connect_timeout_ms
            .unwrap_or(DEFAULT_CACHE_CONNECT_TIMEOUT_MS),
        "cache.connect_timeout_ms",
    )?;
    let operation_timeout = positive_millis(
        cache
            .operation_timeout_ms
            .unwrap_or(DEFAULT_CACHE_OPERATION_TIMEOUT_MS),
        "cache.operation_timeout_ms",
    )?;
    let reconnect_interval = positive_secs(
        cache
            .reconnect_interval_secs
            .unwrap_or(DEFAULT_CACHE_RECONNECT_INTERVAL_SECS),
        "cache.reconnect_interval_secs",
    )?;

    let mut class_ttl = BTreeMap::new();
    for (name, secs) in cache.class_ttl {
        let key = format!("cache.class_ttl.{name}");
        let class = ResourceClass::from_str(&name)
            .map_err(|err| LoadError::invalid(key.clone(), err.to_string()))?;
        class_ttl.insert(class, positive_secs(secs, key)?);
    }

    Ok(CacheSettings {
        namespace,
        maxsize,
        default_ttl,
        redis_url,
        connect_timeout,
        operation_timeout,
        reconnect_interval,
        class_ttl,
    })
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawLoggingSettings {
    level: Option<String>,
    json: Option<bool>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawCacheSettings {
    namespace: Option<String>,
    maxsize: Option<u64>,
    ttl: Option<u64>,
    redis_url: Option<String>,
    connect_timeout_ms: Option<u64>,
    operation_timeout_ms: Option<u64>,
    reconnect_interval_secs: Option<u64>,
    class_ttl: HashMap<String, u64>,
}

fn positive_secs(value: u64, key: impl Into<String>) -> Result<Duration, LoadError> {
    if value == 0 {
        return Err(LoadError::invalid(key, "must be greater than zero"));
    }
    Ok(Duration::from_secs(value))
}

fn positive_millis(value: u64, key: impl Into<String>) -> Result<Duration, LoadError> {
    if value == 0 {
        return Err(LoadError::invalid(key, "must be greater than zero"));
    }
    Ok(Duration::from_millis(value))
}

/// Resolve configuration using the supplied CLI arguments, returning both for downstream use.
pub fn load_with_cli() -> Result<(CliArgs, Settings), LoadError> {
    let args = CliArgs::parse();
    let settings = load(&args)?;
    Ok((args, settings))
}

#[cfg(test)]
mod tests;
