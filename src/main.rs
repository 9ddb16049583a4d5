use std::process;

use quizstore::{
    application::{
        core::Core,
        error::AppError,
        seed::{SeedOutcome, seed_builtin_roles},
    },
    cache::Database,
    config::{self, Command, MigrateArgs, ServeArgs},
    infra::{
        db::{MemoryDatabase, PgDatabase},
        error::InfraError,
        telemetry,
    },
};
use tracing::{Dispatch, Level, dispatcher, error, info, warn};
use tracing_subscriber::fmt as tracing_fmt;

#[tokio::main]
async fn main() {
    if let Err(error) = run().await {
        report_application_error(&error);
        process::exit(1);
    }
}

fn report_application_error(error: &AppError) {
    if dispatcher::has_been_set() {
        error!(error = %error, "application error");
        return;
    }

    let subscriber = tracing_fmt().with_max_level(Level::ERROR).finish();
    let dispatch = Dispatch::new(subscriber);
    dispatcher::with_default(&dispatch, || {
        error!(error = %error, "application error");
    });
}

async fn run() -> Result<(), AppError> {
    let (cli_args, settings) = config::load_with_cli()?;

    let command = cli_args
        .command
        .unwrap_or_else(|| Command::Serve(ServeArgs::default()));

    if let Command::Version = command {
        println!("quizstore {}", env!("CARGO_PKG_VERSION"));
        return Ok(());
    }

    telemetry::init(&settings.logging)?;

    match command {
        Command::Serve(_) => run_serve(settings).await,
        Command::Migrate(args) => run_migrate(settings, args).await,
        Command::Version => Ok(()),
    }
}

async fn run_serve(settings: config::Settings) -> Result<(), AppError> {
    match settings.database.url.as_deref() {
        Some(url) => {
            let pool = PgDatabase::connect(url, settings.database.max_connections.get())
                .await
                .map_err(InfraError::from)?;
            let db = PgDatabase::new(pool);
            db.health_check().await.map_err(InfraError::from)?;
            info!(
                max_connections = settings.database.max_connections.get(),
                "Connected to PostgreSQL"
            );
            serve(Core::new(db, &settings.stores, settings.security.as_ref())).await
        }
        None => {
            warn!("No database url configured; running against the in-memory engine");
            let core = Core::new(
                MemoryDatabase::new(),
                &settings.stores,
                settings.security.as_ref(),
            );
            seed_builtin_roles(&core).await?;
            serve(core).await
        }
    }
}

async fn serve<D: Database>(core: Core<D>) -> Result<(), AppError> {
    core.start().await?;
    let result = wait_for_shutdown().await;
    info!("Shutdown requested");
    core.stop().await;
    result
}

async fn wait_for_shutdown() -> Result<(), AppError> {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{SignalKind, signal};

        let mut terminate = signal(SignalKind::terminate()).map_err(InfraError::from)?;
        tokio::select! {
            result = tokio::signal::ctrl_c() => result.map_err(InfraError::from)?,
            _ = terminate.recv() => {}
        }
        Ok(())
    }

    #[cfg(not(unix))]
    {
        tokio::signal::ctrl_c().await.map_err(InfraError::from)?;
        Ok(())
    }
}

async fn run_migrate(settings: config::Settings, args: MigrateArgs) -> Result<(), AppError> {
    let url = settings
        .database
        .url
        .as_deref()
        .ok_or_else(|| InfraError::configuration("database url is not configured"))?;

    let pool = PgDatabase::connect(url, settings.database.max_connections.get())
        .await
        .map_err(InfraError::from)?;
    PgDatabase::run_migrations(&pool)
        .await
        .map_err(InfraError::from)?;
    info!("Migrations applied");

    if args.no_seed {
        return Ok(());
    }

    let core = Core::new(
        PgDatabase::new(pool),
        &settings.stores,
        settings.security.as_ref(),
    );
    match seed_builtin_roles(&core).await? {
        SeedOutcome::Created { roles, edges } => info!(roles, edges, "Seed completed"),
        SeedOutcome::AlreadySeeded => info!("Seed skipped"),
    }
    Ok(())
}
