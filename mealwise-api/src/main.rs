//! mealwise-api - Meal planning service
//!
//! Serves the recipe library, URL recipe import, meal plan calendar and
//! meal-planning assistant over HTTP, or manages the database schema.

use std::net::SocketAddr;
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use mealwise_common::config::{ConfigOverrides, TomlConfig};
use mealwise_common::db::migrations;
use tokio::signal;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use mealwise_api::AppState;

/// Command-line arguments for mealwise-api
#[derive(Parser, Debug)]
#[command(name = "mealwise-api")]
#[command(about = "Recipe library and meal planning service")]
#[command(version)]
struct Args {
    /// TOML configuration file
    #[arg(short, long, env = "MEALWISE_CONFIG")]
    config: Option<PathBuf>,

    /// Port to listen on
    #[arg(short, long)]
    port: Option<u16>,

    /// SQLite database file
    #[arg(short, long)]
    database: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the HTTP server (default)
    Serve,
    /// Inspect or change the schema version
    Migrate {
        #[command(subcommand)]
        action: MigrateAction,
    },
}

#[derive(Subcommand, Debug)]
enum MigrateAction {
    /// Show applied and pending migrations
    Status,
    /// Apply all pending migrations
    Up,
    /// Roll back to a given version
    Down {
        #[arg(long)]
        to: i64,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let overrides = ConfigOverrides {
        database_path: args.database.clone(),
        port: args.port,
    };
    let settings = TomlConfig::load(args.config.as_deref(), &overrides)
        .context("Failed to load configuration")?;

    // RUST_LOG wins over the configured filter
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| settings.logging.level.as_str().into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    match args.command.unwrap_or(Command::Serve) {
        Command::Serve => serve(settings).await,
        Command::Migrate { action } => migrate(&settings, action).await,
    }
}

async fn migrate(settings: &TomlConfig, action: MigrateAction) -> Result<()> {
    let pool = mealwise_common::db::open_database(&settings.database.path)
        .await
        .context("Failed to open database")?;

    match action {
        MigrateAction::Status => {
            let current = migrations::current_version(&pool).await?;
            println!("Database: {}", settings.database.path.display());
            println!("Current version: {} (latest {})", current, migrations::latest_version());
            for applied in migrations::applied(&pool).await? {
                println!("  [x] {:>3} {} ({})", applied.version, applied.name, applied.applied_at);
            }
            for pending in migrations::pending(&pool).await? {
                println!("  [ ] {:>3} {}", pending.version, pending.name);
            }
        }
        MigrateAction::Up => {
            let version = migrations::run_migrations(&pool)
                .await
                .context("Migration failed")?;
            println!("Schema at version {}", version);
        }
        MigrateAction::Down { to } => {
            let version = migrations::downgrade_to(&pool, to)
                .await
                .context("Downgrade failed")?;
            println!("Schema at version {}", version);
        }
    }

    pool.close().await;
    Ok(())
}

async fn serve(settings: TomlConfig) -> Result<()> {
    info!(
        "Starting mealwise-api v{} ({}, {})",
        env!("CARGO_PKG_VERSION"),
        env!("GIT_HASH"),
        env!("BUILD_PROFILE")
    );
    info!("Database: {}", settings.database.path.display());

    let pool = mealwise_common::db::init_database(&settings.database.path)
        .await
        .context("Failed to initialize database")?;

    match mealwise_api::db::tokens::purge_expired_tokens(&pool).await {
        Ok(purged) if purged > 0 => info!(purged, "Purged expired session tokens"),
        Ok(_) => {}
        Err(e) => warn!(error = %e, "Failed to purge expired session tokens"),
    }

    let addr: SocketAddr = format!("{}:{}", settings.server.host, settings.server.port)
        .parse()
        .context("Invalid server.host / server.port")?;

    let state = AppState::from_config(pool, settings).context("Failed to configure language model")?;
    if let Err(e) = state.drafts.purge_expired().await {
        warn!(error = %e, "Failed to purge expired recipe drafts");
    }

    let app = mealwise_api::build_router(state);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .context("Failed to bind to address")?;
    info!("Listening on http://{}", addr);
    info!("Health check: http://{}/health", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    info!("Server shutdown complete");
    Ok(())
}

/// Resolves on Ctrl+C or SIGTERM
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                warn!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received Ctrl+C, shutting down"),
        _ = terminate => info!("Received terminate signal, shutting down"),
    }
}
