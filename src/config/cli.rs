use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueHint, builder::BoolishValueParser};

/// Command-line arguments for the quizstore binary.
#[derive(Debug, Parser)]
#[command(name = "quizstore", version, about = "Quiz backend cache store")]
pub struct CliArgs {
    /// Optional path to a configuration file.
    #[arg(
        long = "config-file",
        env = "QUIZSTORE_CONFIG_FILE",
        value_name = "PATH",
        value_hint = ValueHint::FilePath
    )]
    pub config_file: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Debug, Subcommand, Clone)]
pub enum Command {
    /// Load every store and keep it in sync until interrupted.
    Serve(ServeArgs),
    /// Apply database migrations and seed the built-in roles.
    Migrate(MigrateArgs),
    /// Print the version and exit.
    Version,
}

#[derive(Debug, Args, Clone, Default)]
pub struct DatabaseOverride {
    /// PostgreSQL connection string.
    #[arg(long = "database-url", env = "QUIZSTORE_DATABASE_URL", value_name = "URL")]
    pub database_url: Option<String>,

    /// Size of the connection pool.
    #[arg(long = "database-max-connections", value_name = "COUNT")]
    pub database_max_connections: Option<u32>,
}

#[derive(Debug, Args, Clone, Default)]
pub struct ServeArgs {
    #[command(flatten)]
    pub overrides: ServeOverrides,
}

#[derive(Debug, Args, Clone, Default)]
pub struct ServeOverrides {
    /// Log level filter (error, warn, info, debug, trace).
    #[arg(long = "log-level", value_name = "LEVEL")]
    pub log_level: Option<String>,

    /// Emit logs as JSON lines.
    #[arg(long = "log-json", value_parser = BoolishValueParser::new(), value_name = "BOOL")]
    pub log_json: Option<bool>,

    #[command(flatten)]
    pub database: DatabaseOverride,

    /// Events replayed behind the newest event id when a store initializes.
    #[arg(long = "recovery-window", value_name = "EVENTS")]
    pub recovery_window: Option<i64>,

    /// Maximum number of events fetched per query during sync.
    #[arg(long = "sync-batch-limit", value_name = "EVENTS")]
    pub sync_batch_limit: Option<u64>,

    /// Sync interval of the account, session and user stores.
    #[arg(long = "fast-sync-interval-ms", value_name = "MILLIS")]
    pub fast_sync_interval_ms: Option<u64>,

    /// Sync interval of every other store.
    #[arg(long = "slow-sync-interval-ms", value_name = "MILLIS")]
    pub slow_sync_interval_ms: Option<u64>,
}

#[derive(Debug, Args, Clone, Default)]
pub struct MigrateArgs {
    #[command(flatten)]
    pub database: DatabaseOverride,

    /// Skip seeding the built-in roles.
    #[arg(long = "no-seed")]
    pub no_seed: bool,
}
