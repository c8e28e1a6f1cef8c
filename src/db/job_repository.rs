use sqlx::{Pool, Postgres};
use tracing::debug;

use crate::db::models::JobRow;
use crate::import::models::{JobRecord, UpsertOutcome};

const JOB_COLUMNS: &str = "id, identity, title, company, location, description, link, \
                           published, created_at, updated_at";

/// Repository for job posting database operations
pub struct JobRepository;

impl JobRepository {
    /// Insert or overwrite a job keyed by its identity in a single statement.
    ///
    /// `xmax = 0` only holds for a freshly inserted tuple, which is how the
    /// statement reports whether the identity was new.
    pub async fn upsert(
        pool: &Pool<Postgres>,
        record: &JobRecord,
    ) -> Result<UpsertOutcome, sqlx::Error> {
        debug!("Upserting job: identity={}", record.identity);

        let is_new = sqlx::query_scalar::<_, bool>(
            r#"
            INSERT INTO jobs (identity, title, company, location, description, link, published)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            ON CONFLICT (identity) DO UPDATE SET
                title       = EXCLUDED.title,
                company     = EXCLUDED.company,
                location    = EXCLUDED.location,
                description = EXCLUDED.description,
                link        = EXCLUDED.link,
                published   = EXCLUDED.published,
                updated_at  = NOW()
            RETURNING (xmax = 0) AS is_new
            "#,
        )
        .bind(&record.identity)
        .bind(&record.title)
        .bind(&record.company)
        .bind(&record.location)
        .bind(&record.description)
        .bind(&record.link)
        .bind(record.published)
        .fetch_one(pool)
        .await?;

        Ok(if is_new {
            UpsertOutcome::Created
        } else {
            UpsertOutcome::Updated
        })
    }

    pub async fn find_by_identity(
        pool: &Pool<Postgres>,
        identity: &str,
    ) -> Result<Option<JobRow>, sqlx::Error> {
        sqlx::query_as::<_, JobRow>(&format!(
            "SELECT {JOB_COLUMNS} FROM jobs WHERE identity = $1"
        ))
        .bind(identity)
        .fetch_optional(pool)
        .await
    }

    pub async fn count(pool: &Pool<Postgres>) -> Result<i64, sqlx::Error> {
        sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM jobs")
            .fetch_one(pool)
            .await
    }
}
