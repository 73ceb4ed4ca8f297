//! MealRoute Worker - route generation backend
//!
//! Claims route-generation jobs from the database queue, turns location
//! groups into vehicle routes, and persists the results.

use std::sync::Arc;

use anyhow::Result;
use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use mealroute_worker::services::paths::{PathClient, PathConfig};
use mealroute_worker::services::routing::{
    FleetRouting, FleetRoutingConfig, RoutingAlgorithm, SweepRouting,
};
use mealroute_worker::services::scheduler::Scheduler;
use mealroute_worker::services::maintenance;
use mealroute_worker::worker::{JobWorker, WorkerConfig};
use mealroute_worker::{cli, config, db, defaults};

#[tokio::main]
async fn main() -> Result<()> {
    // Logs directory - use LOGS_DIR env var or default to ./logs
    let logs_dir = std::env::var("LOGS_DIR")
        .unwrap_or_else(|_| "./logs".to_string());
    std::fs::create_dir_all(&logs_dir).ok();

    // File appender for persistent logs (daily rotation)
    let file_appender = RollingFileAppender::new(
        Rotation::DAILY,
        &logs_dir,
        "worker.log",
    );
    let (non_blocking, _guard) = tracing_appender::non_blocking(file_appender);

    // Initialize logging - both stdout and file
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info,mealroute_worker=debug".into()),
        ))
        .with(tracing_subscriber::fmt::layer())  // stdout
        .with(tracing_subscriber::fmt::layer().with_writer(non_blocking).with_ansi(false))  // file
        .init();

    let cli = cli::Cli::parse();

    info!("Starting MealRoute Worker...");

    // Load configuration
    let config = config::Config::from_env()?;
    info!("Configuration loaded");

    // Connect to database
    let pool = db::create_pool(&config.database_url).await?;
    info!("Connected to PostgreSQL");

    // Run migrations
    db::run_migrations(&pool).await?;

    if matches!(cli.command, Some(cli::Command::Migrate)) {
        return Ok(());
    }

    // Routing algorithm: the external optimizer when configured, the local
    // sweep heuristic otherwise
    let routing: Arc<dyn RoutingAlgorithm> = match &config.fleet_api {
        Some(fleet) => {
            info!("Using fleet optimization service at {}", fleet.base_url);
            Arc::new(FleetRouting::new(FleetRoutingConfig {
                base_url: fleet.base_url.clone(),
                project_id: fleet.project_id.clone(),
                token_url: fleet.token_url.clone(),
                client_id: fleet.client_id.clone(),
                client_secret: fleet.client_secret.clone(),
                timeout_seconds: defaults::DEFAULT_HTTP_TIMEOUT_SECS,
            }))
        }
        None => {
            info!("Fleet optimization not configured - using local sweep heuristic");
            Arc::new(SweepRouting::new())
        }
    };

    let paths = config.path_api.as_ref().map(|path_api| {
        Arc::new(PathClient::new(PathConfig {
            base_url: path_api.base_url.clone(),
            api_key: path_api.api_key.clone(),
            timeout_seconds: defaults::DEFAULT_HTTP_TIMEOUT_SECS,
        }))
    });

    let shutdown = CancellationToken::new();

    // Recurring maintenance: refresh expired cached paths daily
    let scheduler = Scheduler::new(shutdown.clone());
    {
        let pool = pool.clone();
        let paths = paths.clone();
        let warehouse = config.warehouse;
        let ttl_days = config.polyline_ttl_days;
        scheduler.add_interval_job(
            "path-refresh",
            defaults::PATH_REFRESH_INTERVAL,
            move || {
                let pool = pool.clone();
                let paths = paths.clone();
                async move {
                    maintenance::refresh_expired_paths(&pool, paths.as_ref(), warehouse, ttl_days)
                        .await
                        .map(|_| ())
                }
            },
        );
    }

    let worker = JobWorker::new(
        pool,
        routing,
        paths,
        WorkerConfig {
            warehouse: config.warehouse,
            poll_interval: config.poll_interval,
            job_timeout: config.job_timeout,
            polyline_ttl_days: config.polyline_ttl_days,
            enable_orphan_recovery: true,
        },
        shutdown.clone(),
    );
    let worker_handle = tokio::spawn(async move { worker.start().await });

    tokio::signal::ctrl_c().await?;
    info!("Shutdown signal received");
    shutdown.cancel();

    if let Err(e) = worker_handle.await? {
        error!("Worker error: {e:#}");
        return Err(e);
    }
    scheduler.stop().await;

    Ok(())
}
