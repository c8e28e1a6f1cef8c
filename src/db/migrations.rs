use sqlx::{Pool, Postgres};
use tracing::info;

/// Apply the embedded `jobs`, `import_logs` and `import_tasks` migrations.
///
/// Safe to run on every start; sqlx records which ones are already applied.
pub async fn run_migrations(pool: &Pool<Postgres>) -> Result<(), sqlx::migrate::MigrateError> {
    info!("Running database migrations...");

    sqlx::migrate!("./migrations").run(pool).await?;

    info!("Database migrations completed successfully");
    Ok(())
}
