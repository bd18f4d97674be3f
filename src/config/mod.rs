//! Configuration layer: typed settings with layered precedence (file → env → CLI).

use std::{
    num::{NonZeroU32, NonZeroUsize},
    str::FromStr,
    time::Duration,
};

use clap::Parser;
use config::{Config, Environment, File};
use serde::Deserialize;
use thiserror::Error;
use tracing::level_filters::LevelFilter;

mod cli;

pub use cli::{
    CliArgs, Command, CommentsArgs, FeedArgs, HealthArgs, InvalidateArgs, MigrateArgs,
    RepliesArgs, RuntimeOverrides, SortArg,
};

const DEFAULT_CONFIG_BASENAME: &str = "config/default";
const LOCAL_CONFIG_BASENAME: &str = "feedline";
const ENV_PREFIX: &str = "FEEDLINE";
const DEFAULT_DB_MAX_CONNECTIONS: u32 = 8;
const DEFAULT_DB_ACQUIRE_TIMEOUT_MS: u64 = 5_000;
const DEFAULT_SNAPSHOT_TTL_SECS: u64 = 3_600;
const DEFAULT_PAGE_TTL_SECS: u64 = 86_400;
const DEFAULT_CACHE_OP_TIMEOUT_MS: u64 = 250;
const DEFAULT_SCAN_BATCH_SIZE: u64 = 100;
const DEFAULT_TTL_JITTER_PERCENT: u64 = 10;
const MAX_TTL_JITTER_PERCENT: u64 = 50;
const DEFAULT_MEMORY_CAPACITY: u64 = 10_000;
const DEFAULT_FEED_PAGE_SIZE: u32 = 20;
const DEFAULT_FEED_MAX_PAGE_SIZE: u32 = 100;
const DEFAULT_BOOST_LIMIT: u32 = 5;
const DEFAULT_COMMENT_PAGE_SIZE: u32 = 20;
const DEFAULT_REPLY_PAGE_SIZE: u32 = 20;

/// Fully-resolved settings after precedence resolution and validation.
#[derive(Debug, Clone)]
pub struct Settings {
    pub logging: LoggingSettings,
    pub database: DatabaseSettings,
    pub cache: CacheSettings,
    pub feed: FeedSettings,
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
pub struct DatabaseSettings {
    pub url: Option<String>,
    pub max_connections: NonZeroU32,
    pub acquire_timeout: Duration,
}

#[derive(Debug, Clone)]
pub struct CacheSettings {
    pub redis_url: Option<String>,
    pub snapshot_ttl: Duration,
    pub page_ttl: Duration,
    pub op_timeout: Duration,
    pub scan_batch_size: NonZeroUsize,
    pub ttl_jitter_percent: u8,
    pub memory_capacity: NonZeroUsize,
}

#[derive(Debug, Clone)]
pub struct FeedSettings {
    pub page_size: NonZeroU32,
    pub max_page_size: NonZeroU32,
    pub boost_limit: u32,
    pub boost_first_page_only: bool,
    pub comment_page_size: NonZeroU32,
    pub reply_page_size: NonZeroU32,
    pub record_views: bool,
}

#[derive(Debug, Error)]
pub enum LoadError {
    #[error("failed to build configuration: {0}")]
    Build(#[from] config::ConfigError),
    #[error("invalid configuration for `{key}`: {reason}")]
    Invalid { key: &'static str, reason: String },
}

impl LoadError {
    fn invalid(key: &'static str, reason: impl Into<String>) -> Self {
        Self::Invalid {
            key,
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

    builder = builder.add_source(Environment::with_prefix(ENV_PREFIX).separator("__"));

    let mut raw: RawSettings = builder.build()?.try_deserialize()?;
    raw.apply_overrides(cli.command.overrides());

    Settings::from_raw(raw)
}

/// Resolve configuration using the supplied CLI arguments, returning both for downstream use.
pub fn load_with_cli() -> Result<(CliArgs, Settings), LoadError> {
    let args = CliArgs::parse();
    let settings = load(&args)?;
    Ok((args, settings))
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawSettings {
    logging: RawLoggingSettings,
    database: RawDatabaseSettings,
    cache: RawCacheSettings,
    feed: RawFeedSettings,
}

impl RawSettings {
    fn apply_overrides(&mut self, overrides: &RuntimeOverrides) {
        if let Some(url) = overrides.database_url.as_ref() {
            self.database.url = Some(url.clone());
        }
        if let Some(url) = overrides.redis_url.as_ref() {
            self.cache.redis_url = Some(url.clone());
        }
        if let Some(level) = overrides.log_level.as_ref() {
            self.logging.level = Some(level.clone());
        }
        if let Some(json) = overrides.log_json {
            self.logging.json = Some(json);
        }
    }
}

impl Settings {
    fn from_raw(raw: RawSettings) -> Result<Self, LoadError> {
        let RawSettings {
            logging,
            database,
            cache,
            feed,
        } = raw;

        Ok(Self {
            logging: build_logging_settings(logging)?,
            database: build_database_settings(database)?,
            cache: build_cache_settings(cache)?,
            feed: build_feed_settings(feed)?,
        })
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

fn build_database_settings(database: RawDatabaseSettings) -> Result<DatabaseSettings, LoadError> {
    let url = non_blank(database.url);

    let max_connections = non_zero_u32(
        database
            .max_connections
            .unwrap_or(DEFAULT_DB_MAX_CONNECTIONS)
            .into(),
        "database.max_connections",
    )?;

    let acquire_ms = database
        .acquire_timeout_ms
        .unwrap_or(DEFAULT_DB_ACQUIRE_TIMEOUT_MS);
    if acquire_ms == 0 {
        return Err(LoadError::invalid(
            "database.acquire_timeout_ms",
            "must be greater than zero",
        ));
    }

    Ok(DatabaseSettings {
        url,
        max_connections,
        acquire_timeout: Duration::from_millis(acquire_ms),
    })
}

fn build_cache_settings(cache: RawCacheSettings) -> Result<CacheSettings, LoadError> {
    let snapshot_ttl = positive_secs(
        cache.snapshot_ttl_seconds.unwrap_or(DEFAULT_SNAPSHOT_TTL_SECS),
        "cache.snapshot_ttl_seconds",
    )?;
    let page_ttl = positive_secs(
        cache.page_ttl_seconds.unwrap_or(DEFAULT_PAGE_TTL_SECS),
        "cache.page_ttl_seconds",
    )?;

    let op_timeout_ms = cache.op_timeout_ms.unwrap_or(DEFAULT_CACHE_OP_TIMEOUT_MS);
    if op_timeout_ms == 0 {
        return Err(LoadError::invalid(
            "cache.op_timeout_ms",
            "must be greater than zero",
        ));
    }

    let jitter = cache
        .ttl_jitter_percent
        .unwrap_or(DEFAULT_TTL_JITTER_PERCENT);
    if jitter > MAX_TTL_JITTER_PERCENT {
        return Err(LoadError::invalid(
            "cache.ttl_jitter_percent",
            format!("must not exceed {MAX_TTL_JITTER_PERCENT}"),
        ));
    }

    Ok(CacheSettings {
        redis_url: non_blank(cache.redis_url),
        snapshot_ttl,
        page_ttl,
        op_timeout: Duration::from_millis(op_timeout_ms),
        scan_batch_size: non_zero_usize(
            cache.scan_batch_size.unwrap_or(DEFAULT_SCAN_BATCH_SIZE),
            "cache.scan_batch_size",
        )?,
        ttl_jitter_percent: jitter as u8,
        memory_capacity: non_zero_usize(
            cache.memory_capacity.unwrap_or(DEFAULT_MEMORY_CAPACITY),
            "cache.memory_capacity",
        )?,
    })
}

fn build_feed_settings(feed: RawFeedSettings) -> Result<FeedSettings, LoadError> {
    let max_page_size = non_zero_u32(
        feed.max_page_size.unwrap_or(DEFAULT_FEED_MAX_PAGE_SIZE).into(),
        "feed.max_page_size",
    )?;
    let page_size = non_zero_u32(
        feed.page_size.unwrap_or(DEFAULT_FEED_PAGE_SIZE).into(),
        "feed.page_size",
    )?;
    if page_size > max_page_size {
        return Err(LoadError::invalid(
            "feed.page_size",
            format!("must not exceed feed.max_page_size ({max_page_size})"),
        ));
    }

    Ok(FeedSettings {
        page_size,
        max_page_size,
        boost_limit: feed.boost_limit.unwrap_or(DEFAULT_BOOST_LIMIT),
        boost_first_page_only: feed.boost_first_page_only.unwrap_or(false),
        comment_page_size: non_zero_u32(
            feed.comment_page_size
                .unwrap_or(DEFAULT_COMMENT_PAGE_SIZE)
                .into(),
            "feed.comment_page_size",
        )?,
        reply_page_size: non_zero_u32(
            feed.reply_page_size.unwrap_or(DEFAULT_REPLY_PAGE_SIZE).into(),
            "feed.reply_page_size",
        )?,
        record_views: feed.record_views.unwrap_or(true),
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
struct RawDatabaseSettings {
    url: Option<String>,
    max_connections: Option<u32>,
    acquire_timeout_ms: Option<u64>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawCacheSettings {
    redis_url: Option<String>,
    snapshot_ttl_seconds: Option<u64>,
    page_ttl_seconds: Option<u64>,
    op_timeout_ms: Option<u64>,
    scan_batch_size: Option<u64>,
    ttl_jitter_percent: Option<u64>,
    memory_capacity: Option<u64>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawFeedSettings {
    page_size: Option<u32>,
    max_page_size: Option<u32>,
    boost_limit: Option<u32>,
    boost_first_page_only: Option<bool>,
    comment_page_size: Option<u32>,
    reply_page_size: Option<u32>,
    record_views: Option<bool>,
}

fn non_blank(value: Option<String>) -> Option<String> {
    value.and_then(|value| {
        let trimmed = value.trim();
        (!trimmed.is_empty()).then(|| trimmed.to_string())
    })
}

fn positive_secs(value: u64, key: &'static str) -> Result<Duration, LoadError> {
    if value == 0 {
        return Err(LoadError::invalid(key, "must be greater than zero"));
    }
    Ok(Duration::from_secs(value))
}

fn non_zero_u32(value: u64, key: &'static str) -> Result<NonZeroU32, LoadError> {
    if value == 0 {
        return Err(LoadError::invalid(key, "must be greater than zero"));
    }
    let value_u32: u32 = value
        .try_into()
        .map_err(|_| LoadError::invalid(key, "value exceeds supported range for u32"))?;
    NonZeroU32::new(value_u32).ok_or_else(|| LoadError::invalid(key, "must be greater than zero"))
}

fn non_zero_usize(value: u64, key: &'static str) -> Result<NonZeroUsize, LoadError> {
    let value_usize: usize = value
        .try_into()
        .map_err(|_| LoadError::invalid(key, "value exceeds supported range for usize"))?;
    NonZeroUsize::new(value_usize).ok_or_else(|| LoadError::invalid(key, "must be greater than zero"))
}
