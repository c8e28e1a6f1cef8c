use std::sync::Arc;
use std::time::Duration;

use actix_web::{web, App, HttpServer};
use clap::{Parser, Subcommand};
use sqlx::{Pool, Postgres};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{error, info};

use feed_importer::api::health::health_config;
use feed_importer::api::import::{import_config, ImportService};
use feed_importer::api::validation;
use feed_importer::config::Config;
use feed_importer::db::{self, PgImportQueue, PgStore};
use feed_importer::feed::{FeedSource, HttpFeedConfig, HttpFeedSource};
use feed_importer::import::ImportTrigger;
use feed_importer::queue::{subscribe, ImportQueue, SubscribeOptions};
use feed_importer::shutdown::ShutdownCoordinator;
use feed_importer::store::ImportLogStore;
use feed_importer::telemetry;
use feed_importer::worker::ImportWorker;

#[derive(Debug, Parser)]
#[command(name = "feed-importer", version)]
#[command(about = "Import RSS job feeds into Postgres through a work queue")]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Run the HTTP API together with the import workers (default)
    Serve,
    /// Run only the import workers
    Worker {
        /// Overrides NUM_WORKERS
        #[arg(long)]
        workers: Option<usize>,
    },
    /// Fetch feeds once and queue them for the workers
    Import {
        /// Feed URL to fetch; repeat for several. Defaults to FEED_URLS.
        #[arg(long = "url")]
        urls: Vec<String>,
        /// Defaults to IMPORT_SOURCE_LABEL
        #[arg(long)]
        label: Option<String>,
    },
    /// Apply database migrations and exit
    Migrate,
    /// Print the most recent import logs
    Logs {
        #[arg(long, default_value_t = 20)]
        limit: usize,
    },
}

fn startup_error<E>(context: &str, err: E) -> std::io::Error
where
    E: std::fmt::Display,
{
    std::io::Error::other(format!("{}: {}", context, err))
}

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    let cli = Cli::parse();

    // Load configuration from environment
    let config =
        Config::from_env().map_err(|e| startup_error("Failed to load configuration", e))?;

    telemetry::init_tracing(&config.log_dir)?;

    info!("Starting feed-importer");
    info!("Configuration loaded successfully:");
    info!("  - Max payload size: {} bytes", config.max_payload_size);
    info!("  - Max database connections: {}", config.max_db_connections);
    info!("  - Number of workers: {}", config.num_workers);
    info!("  - Feed URLs: {}", config.feed_urls.len());

    let pool = db::connection::get_connection(&config.database_url, config.max_db_connections)
        .await
        .map_err(|e| startup_error("Failed to connect to database", e))?;
    info!("Database connection pool established");

    db::migrations::run_migrations(&pool)
        .await
        .map_err(|e| startup_error("Failed to run database migrations", e))?;

    let store = Arc::new(PgStore::new(pool.clone()));
    let queue: Arc<dyn ImportQueue> = Arc::new(PgImportQueue::new(
        pool.clone(),
        config.task_lease,
        config.max_task_attempts,
    ));

    match cli.command.unwrap_or(Commands::Serve) {
        Commands::Serve => serve(config, pool, store, queue).await,
        Commands::Worker { workers } => {
            let count = workers.unwrap_or(config.num_workers);
            let heartbeat = heartbeat_for_lease(config.task_lease);
            run_workers(count, config.worker_poll_interval, heartbeat, pool, store, queue).await
        }
        Commands::Import { urls, label } => {
            let urls = if urls.is_empty() { config.feed_urls.clone() } else { urls };
            let label = label.unwrap_or_else(|| config.source_label.clone());
            let trigger = ImportTrigger::new(feed_source(&config)?, queue);

            let outcome = trigger
                .trigger(&urls, &label)
                .await
                .map_err(|e| startup_error("Import failed", e))?;

            println!(
                "Queued task {}: {} jobs from {}/{} feeds",
                outcome.task_id,
                outcome.total_fetched,
                outcome.sources_succeeded,
                urls.len()
            );
            for failure in &outcome.failed_sources {
                println!("  failed: {} ({})", failure.url, failure.reason);
            }
            pool.close().await;
            Ok(())
        }
        Commands::Migrate => {
            // Migrations already ran above
            pool.close().await;
            Ok(())
        }
        Commands::Logs { limit } => {
            let logs = store
                .list_recent(Some(limit))
                .await
                .map_err(|e| startup_error("Failed to read import logs", e))?;
            for log in &logs {
                println!(
                    "{} {} total={} new={} updated={} failed={}",
                    log.timestamp.to_rfc3339(),
                    log.source_label,
                    log.total_processed,
                    log.new_count,
                    log.updated_count,
                    log.failed_count
                );
                for reason in &log.failure_reasons {
                    println!("    {}", reason);
                }
            }
            pool.close().await;
            Ok(())
        }
    }
}

fn feed_source(config: &Config) -> std::io::Result<Arc<dyn FeedSource>> {
    let mut http = HttpFeedConfig {
        timeout: config.http_timeout,
        ..HttpFeedConfig::default()
    };
    if let Some(agent) = &config.feed_user_agent {
        http.user_agent.clone_from(agent);
    }

    let source =
        HttpFeedSource::new(http).map_err(|e| startup_error("Failed to build HTTP client", e))?;
    Ok(Arc::new(source))
}

/// Renew claims three times per lease so one missed beat does not lose it.
fn heartbeat_for_lease(lease: Duration) -> Duration {
    (lease / 3).max(Duration::from_secs(1))
}

/// Spawn `count` subscription loops, each driving its own [`ImportWorker`].
fn spawn_workers(
    count: usize,
    poll_interval: Duration,
    heartbeat_interval: Duration,
    store: &Arc<PgStore>,
    queue: &Arc<dyn ImportQueue>,
    shutdown_rx: &watch::Receiver<bool>,
) -> Vec<JoinHandle<()>> {
    (1..=count)
        .map(|worker_id| {
            let worker = ImportWorker::new(store.clone(), store.clone());
            let options = SubscribeOptions::new(format!("worker-{}", worker_id), poll_interval)
                .with_heartbeat(heartbeat_interval);
            let handle = tokio::spawn(subscribe(
                Arc::clone(queue),
                worker,
                options,
                shutdown_rx.clone(),
            ));
            info!("Spawned worker {}", worker_id);
            handle
        })
        .collect()
}

/// The queue must be reachable before anything starts consuming from it.
async fn check_queue(queue: &Arc<dyn ImportQueue>) -> std::io::Result<()> {
    match queue.pending_count().await {
        Ok(pending) => {
            info!("Import queue reachable, {} tasks pending", pending);
            Ok(())
        }
        Err(e) => {
            error!("Import queue unavailable at startup: {}", e);
            Err(startup_error("Import queue unavailable", e))
        }
    }
}

async fn run_workers(
    count: usize,
    poll_interval: Duration,
    heartbeat_interval: Duration,
    pool: Pool<Postgres>,
    store: Arc<PgStore>,
    queue: Arc<dyn ImportQueue>,
) -> std::io::Result<()> {
    check_queue(&queue).await?;

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let worker_handles = spawn_workers(
        count,
        poll_interval,
        heartbeat_interval,
        &store,
        &queue,
        &shutdown_rx,
    );

    ShutdownCoordinator::new(worker_handles, shutdown_tx, pool)
        .wait_for_shutdown()
        .await
}

async fn serve(
    config: Config,
    pool: Pool<Postgres>,
    store: Arc<PgStore>,
    queue: Arc<dyn ImportQueue>,
) -> std::io::Result<()> {
    check_queue(&queue).await?;

    // watch channel allows multiple receivers to get the same value
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let worker_handles = spawn_workers(
        config.num_workers,
        config.worker_poll_interval,
        heartbeat_for_lease(config.task_lease),
        &store,
        &queue,
        &shutdown_rx,
    );

    let logs: Arc<dyn ImportLogStore> = store;
    let import_service = web::Data::new(ImportService::new(
        feed_source(&config)?,
        queue,
        logs,
        config.feed_urls.clone(),
        config.source_label.clone(),
    ));

    let server_pool = pool.clone();
    let max_payload_size = config.max_payload_size;

    let server = HttpServer::new(move || {
        // Configure payload size limits globally
        let payload_config = web::PayloadConfig::default().limit(max_payload_size);

        App::new()
            .app_data(web::Data::new(server_pool.clone()))
            .app_data(import_service.clone())
            .app_data(payload_config)
            .app_data(validation::query_config())
            .configure(health_config)
            .configure(import_config)
    });

    info!("Server starting on http://{}:{}", config.bind_addr, config.port);

    let server = server.bind((config.bind_addr.as_str(), config.port))?.run();
    let server_handle = server.handle();
    let server_task = tokio::spawn(server);

    ShutdownCoordinator::new(worker_handles, shutdown_tx, pool)
        .with_server(server_handle, server_task)
        .wait_for_shutdown()
        .await
}
