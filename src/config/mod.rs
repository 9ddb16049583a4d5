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

use crate::cache::{DEFAULT_RECOVERY_WINDOW, DEFAULT_SYNC_BATCH_LIMIT};

mod cli;

pub use cli::{CliArgs, Command, DatabaseOverride, MigrateArgs, ServeArgs, ServeOverrides};

const DEFAULT_CONFIG_BASENAME: &str = "config/default";
const LOCAL_CONFIG_BASENAME: &str = "quizstore";
const ENV_PREFIX: &str = "QUIZSTORE";
const DEFAULT_DB_MAX_CONNECTIONS: u32 = 8;
const DEFAULT_FAST_SYNC_INTERVAL_MS: u64 = 1_000;
const DEFAULT_SLOW_SYNC_INTERVAL_MS: u64 = 5_000;

/// Fully-resolved settings after precedence resolution and validation.
#[derive(Debug, Clone)]
pub struct Settings {
    pub logging: LoggingSettings,
    pub database: DatabaseSettings,
    pub stores: StoreSettings,
    /// `None` disables the user store.
    pub security: Option<SecuritySettings>,
}

#[derive(Debug, Clone)]
pub struct LoggingSettings {
    pub level: LevelFilter,
    pub format: LogFormat,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Json,
    Compact,
}

#[derive(Debug, Clone)]
pub struct DatabaseSettings {
    /// Without a URL the binary runs against the in-memory engine.
    pub url: Option<String>,
    pub max_connections: NonZeroU32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreSettings {
    pub recovery_window: i64,
    pub sync_batch_limit: NonZeroUsize,
    pub fast_sync_interval: Duration,
    pub slow_sync_interval: Duration,
}

impl Default for StoreSettings {
    fn default() -> Self {
        Self {
            recovery_window: DEFAULT_RECOVERY_WINDOW,
            sync_batch_limit: NonZeroUsize::new(DEFAULT_SYNC_BATCH_LIMIT).unwrap_or(NonZeroUsize::MIN),
            fast_sync_interval: Duration::from_millis(DEFAULT_FAST_SYNC_INTERVAL_MS),
            slow_sync_interval: Duration::from_millis(DEFAULT_SLOW_SYNC_INTERVAL_MS),
        }
    }
}

#[derive(Clone, PartialEq, Eq)]
pub struct SecuritySettings {
    pub password_salt: String,
}

impl std::fmt::Debug for SecuritySettings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SecuritySettings")
            .field("password_salt", &"<redacted>")
            .finish()
    }
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

    match cli.command.as_ref() {
        Some(Command::Serve(args)) => raw.apply_serve_overrides(&args.overrides),
        Some(Command::Migrate(args)) => raw.apply_database_override(&args.database),
        Some(Command::Version) => {}
        None => raw.apply_serve_overrides(&ServeOverrides::default()),
    }

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
    stores: RawStoreSettings,
    security: RawSecuritySettings,
}

impl RawSettings {
    fn apply_serve_overrides(&mut self, overrides: &ServeOverrides) {
        if let Some(level) = overrides.log_level.as_ref() {
            self.logging.level = Some(level.clone());
        }
        if let Some(json) = overrides.log_json {
            self.logging.json = Some(json);
        }
        self.apply_database_override(&overrides.database);
        if let Some(window) = overrides.recovery_window {
            self.stores.recovery_window = Some(window);
        }
        if let Some(limit) = overrides.sync_batch_limit {
            self.stores.sync_batch_limit = Some(limit);
        }
        if let Some(ms) = overrides.fast_sync_interval_ms {
            self.stores.fast_sync_interval_ms = Some(ms);
        }
        if let Some(ms) = overrides.slow_sync_interval_ms {
            self.stores.slow_sync_interval_ms = Some(ms);
        }
    }

    fn apply_database_override(&mut self, overrides: &DatabaseOverride) {
        if let Some(url) = overrides.database_url.as_ref() {
            self.database.url = Some(url.clone());
        }
        if let Some(max) = overrides.database_max_connections {
            self.database.max_connections = Some(max);
        }
    }
}

impl Settings {
    fn from_raw(raw: RawSettings) -> Result<Self, LoadError> {
        let RawSettings {
            logging,
            database,
            stores,
            security,
        } = raw;

        Ok(Self {
            logging: build_logging_settings(logging)?,
            database: build_database_settings(database)?,
            stores: build_store_settings(stores)?,
            security: build_security_settings(security)?,
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
    let url = database.url.and_then(|value| {
        let trimmed = value.trim();
        (!trimmed.is_empty()).then(|| trimmed.to_string())
    });

    let max_connections = NonZeroU32::new(
        database
            .max_connections
            .unwrap_or(DEFAULT_DB_MAX_CONNECTIONS),
    )
    .ok_or_else(|| LoadError::invalid("database.max_connections", "must be greater than zero"))?;

    Ok(DatabaseSettings {
        url,
        max_connections,
    })
}

fn build_store_settings(stores: RawStoreSettings) -> Result<StoreSettings, LoadError> {
    let recovery_window = stores.recovery_window.unwrap_or(DEFAULT_RECOVERY_WINDOW);
    if recovery_window < 0 {
        return Err(LoadError::invalid(
            "stores.recovery_window",
            "must not be negative",
        ));
    }

    let limit = stores
        .sync_batch_limit
        .unwrap_or(DEFAULT_SYNC_BATCH_LIMIT as u64);
    let limit: usize = limit.try_into().map_err(|_| {
        LoadError::invalid(
            "stores.sync_batch_limit",
            "value exceeds supported range for usize",
        )
    })?;
    let sync_batch_limit = NonZeroUsize::new(limit).ok_or_else(|| {
        LoadError::invalid("stores.sync_batch_limit", "must be greater than zero")
    })?;

    let fast_sync_interval = interval(
        stores.fast_sync_interval_ms,
        DEFAULT_FAST_SYNC_INTERVAL_MS,
        "stores.fast_sync_interval_ms",
    )?;
    let slow_sync_interval = interval(
        stores.slow_sync_interval_ms,
        DEFAULT_SLOW_SYNC_INTERVAL_MS,
        "stores.slow_sync_interval_ms",
    )?;

    Ok(StoreSettings {
        recovery_window,
        sync_batch_limit,
        fast_sync_interval,
        slow_sync_interval,
    })
}

fn build_security_settings(
    security: RawSecuritySettings,
) -> Result<Option<SecuritySettings>, LoadError> {
    match security.password_salt {
        None => Ok(None),
        Some(salt) if salt.is_empty() => Err(LoadError::invalid(
            "security.password_salt",
            "must not be empty when set",
        )),
        Some(password_salt) => Ok(Some(SecuritySettings { password_salt })),
    }
}

fn interval(value: Option<u64>, default: u64, key: &'static str) -> Result<Duration, LoadError> {
    match value.unwrap_or(default) {
        0 => Err(LoadError::invalid(key, "must be greater than zero")),
        ms => Ok(Duration::from_millis(ms)),
    }
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
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawStoreSettings {
    recovery_window: Option<i64>,
    sync_batch_limit: Option<u64>,
    fast_sync_interval_ms: Option<u64>,
    slow_sync_interval_ms: Option<u64>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawSecuritySettings {
    password_salt: Option<String>,
}
