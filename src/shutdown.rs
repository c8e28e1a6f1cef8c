use actix_web::dev::ServerHandle;
use sqlx::{Pool, Postgres};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

/// Orchestrates graceful shutdown of the server and the import workers.
///
/// Workers observe the shutdown flag between tasks, so a batch that is
/// already being imported runs to completion and is acknowledged.
pub struct ShutdownCoordinator {
    server: Option<(ServerHandle, JoinHandle<Result<(), std::io::Error>>)>,
    worker_handles: Vec<JoinHandle<()>>,
    shutdown_tx: watch::Sender<bool>,
    pool: Pool<Postgres>,
}

impl ShutdownCoordinator {
    pub fn new(
        worker_handles: Vec<JoinHandle<()>>,
        shutdown_tx: watch::Sender<bool>,
        pool: Pool<Postgres>,
    ) -> Self {
        Self {
            server: None,
            worker_handles,
            shutdown_tx,
            pool,
        }
    }

    /// Also stop an HTTP server as the first shutdown step.
    pub fn with_server(
        mut self,
        server_handle: ServerHandle,
        server_task: JoinHandle<Result<(), std::io::Error>>,
    ) -> Self {
        self.server = Some((server_handle, server_task));
        self
    }

    /// Wait for CTRL+C or SIGTERM (Unix only), then shut everything down.
    pub async fn wait_for_shutdown(self) -> Result<(), std::io::Error> {
        #[cfg(unix)]
        {
            let mut terminate =
                tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())?;

            tokio::select! {
                result = tokio::signal::ctrl_c() => {
                    result?;
                    info!("Received CTRL+C signal, initiating graceful shutdown...");
                }
                _ = terminate.recv() => {
                    info!("Received SIGTERM signal, initiating graceful shutdown...");
                }
            }
        }

        #[cfg(not(unix))]
        {
            tokio::signal::ctrl_c().await?;
            info!("Received CTRL+C signal, initiating graceful shutdown...");
        }

        self.shutdown().await
    }

    /// Perform the actual shutdown sequence
    pub async fn shutdown(self) -> Result<(), std::io::Error> {
        // 1. Stop HTTP server (stop accepting new requests)
        let server_task = match self.server {
            Some((handle, task)) => {
                info!("Stopping HTTP server (no longer accepting new requests)...");
                handle.stop(true).await;
                Some(task)
            }
            None => None,
        };

        // 2. Signal workers to stop claiming tasks
        info!("Signaling workers to stop claiming import tasks...");
        if self.shutdown_tx.send(true).is_err() {
            warn!("No worker is listening for the shutdown signal");
        }

        // 3. Wait for workers to finish the batch they are on
        let num_workers = self.worker_handles.len();
        info!("Waiting for {} workers to finish their current batch...", num_workers);
        for (i, handle) in self.worker_handles.into_iter().enumerate() {
            match handle.await {
                Ok(()) => info!("Worker {} stopped ({}/{})", i + 1, i + 1, num_workers),
                Err(e) => error!("Worker {} failed to stop: {:?}", i + 1, e),
            }
        }
        info!("All workers stopped");

        // 4. Wait for HTTP server task to complete
        if let Some(task) = server_task {
            match task.await {
                Ok(Ok(())) => info!("HTTP server shut down successfully"),
                Ok(Err(e)) => error!("HTTP server encountered error during shutdown: {:?}", e),
                Err(e) => error!("HTTP server task panicked: {:?}", e),
            }
        }

        // 5. Close database connections
        info!("Closing database connection pool...");
        self.pool.close().await;
        info!("Graceful shutdown completed successfully");
        Ok(())
    }
}
