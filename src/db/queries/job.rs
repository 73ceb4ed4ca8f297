//! Job queue queries
//!
//! The `jobs` table is the queue. Claiming is a single transaction around
//! `SELECT ... FOR UPDATE SKIP LOCKED` + the transition to RUNNING, so a
//! job is handed to at most one worker even with several worker processes
//! polling the same table.

use std::time::Duration;

use anyhow::Result;
use sqlx::types::Json;
use sqlx::PgPool;
use uuid::Uuid;

use crate::types::{Job, JobProgress, RouteGenerationSettings};

const JOB_COLUMNS: &str = "job_id, location_group_id, route_group_id, progress, payload, \
     message, created_at, updated_at, started_at, finished_at";

/// Insert a new job as PENDING, then immediately promote it to QUEUED.
///
/// The two-step write keeps PENDING visible as the "being created" state;
/// only QUEUED rows are eligible for claim.
pub async fn enqueue(
    pool: &PgPool,
    location_group_id: Uuid,
    settings: &RouteGenerationSettings,
) -> Result<Job> {
    let job_id = Uuid::new_v4();

    sqlx::query(
        "INSERT INTO jobs (job_id, location_group_id, progress, payload) \
         VALUES ($1, $2, 'pending', $3)",
    )
    .bind(job_id)
    .bind(location_group_id)
    .bind(Json(settings))
    .execute(pool)
    .await?;

    let job = sqlx::query_as::<_, Job>(&format!(
        "UPDATE jobs SET progress = 'queued', updated_at = NOW() \
         WHERE job_id = $1 RETURNING {JOB_COLUMNS}"
    ))
    .bind(job_id)
    .fetch_one(pool)
    .await?;

    Ok(job)
}

/// Get a job by id
pub async fn get_job(pool: &PgPool, job_id: Uuid) -> Result<Option<Job>> {
    let job = sqlx::query_as::<_, Job>(&format!(
        "SELECT {JOB_COLUMNS} FROM jobs WHERE job_id = $1"
    ))
    .bind(job_id)
    .fetch_optional(pool)
    .await?;

    Ok(job)
}

/// List jobs, optionally filtered by progress, oldest first
pub async fn list_jobs(pool: &PgPool, progress: Option<JobProgress>) -> Result<Vec<Job>> {
    let jobs = match progress {
        Some(progress) => {
            sqlx::query_as::<_, Job>(&format!(
                "SELECT {JOB_COLUMNS} FROM jobs WHERE progress = $1 ORDER BY created_at"
            ))
            .bind(progress)
            .fetch_all(pool)
            .await?
        }
        None => {
            sqlx::query_as::<_, Job>(&format!(
                "SELECT {JOB_COLUMNS} FROM jobs ORDER BY created_at"
            ))
            .fetch_all(pool)
            .await?
        }
    };

    Ok(jobs)
}

/// Atomically claim the oldest QUEUED job and transition it to RUNNING.
///
/// `FOR UPDATE SKIP LOCKED` makes concurrent claimants skip rows another
/// transaction already holds, so each job goes to exactly one worker.
/// Returns `None` when no eligible job exists.
pub async fn claim_next_queued(pool: &PgPool) -> Result<Option<Job>> {
    let mut tx = pool.begin().await?;

    let claimed: Option<(Uuid,)> = sqlx::query_as(
        "SELECT job_id FROM jobs WHERE progress = 'queued' \
         ORDER BY created_at LIMIT 1 FOR UPDATE SKIP LOCKED",
    )
    .fetch_optional(&mut *tx)
    .await?;

    let Some((job_id,)) = claimed else {
        tx.rollback().await?;
        return Ok(None);
    };

    let job = sqlx::query_as::<_, Job>(&format!(
        "UPDATE jobs SET progress = 'running', started_at = NOW(), updated_at = NOW() \
         WHERE job_id = $1 RETURNING {JOB_COLUMNS}"
    ))
    .bind(job_id)
    .fetch_one(&mut *tx)
    .await?;

    tx.commit().await?;
    Ok(Some(job))
}

/// Mark a RUNNING job COMPLETED and attach the generated route group.
/// Returns false when the job was not RUNNING (e.g. already force-failed
/// by the stuck-job scan).
pub async fn mark_completed(pool: &PgPool, job_id: Uuid, route_group_id: Uuid) -> Result<bool> {
    let result = sqlx::query(
        "UPDATE jobs SET progress = 'completed', route_group_id = $2, \
         finished_at = NOW(), updated_at = NOW() \
         WHERE job_id = $1 AND progress = 'running'",
    )
    .bind(job_id)
    .bind(route_group_id)
    .execute(pool)
    .await?;

    Ok(result.rows_affected() > 0)
}

/// Mark a job FAILED with the underlying reason. Terminal states are never
/// overwritten.
pub async fn mark_failed(pool: &PgPool, job_id: Uuid, message: &str) -> Result<bool> {
    let result = sqlx::query(
        "UPDATE jobs SET progress = 'failed', message = $2, \
         finished_at = NOW(), updated_at = NOW() \
         WHERE job_id = $1 AND progress NOT IN ('completed', 'failed')",
    )
    .bind(job_id)
    .bind(message)
    .execute(pool)
    .await?;

    Ok(result.rows_affected() > 0)
}

/// Force-fail RUNNING jobs whose start time is older than `timeout`.
/// Returns the ids of the jobs that were failed.
pub async fn fail_stuck_jobs(pool: &PgPool, timeout: Duration) -> Result<Vec<Uuid>> {
    let cutoff = chrono::Utc::now() - chrono::Duration::from_std(timeout)?;
    let message = format!("Job exceeded the {}s processing timeout", timeout.as_secs());

    let rows: Vec<(Uuid,)> = sqlx::query_as(
        "UPDATE jobs SET progress = 'failed', message = $2, \
         finished_at = NOW(), updated_at = NOW() \
         WHERE progress = 'running' AND started_at IS NOT NULL AND started_at < $1 \
         RETURNING job_id",
    )
    .bind(cutoff)
    .bind(&message)
    .fetch_all(pool)
    .await?;

    Ok(rows.into_iter().map(|(id,)| id).collect())
}

/// Reset RUNNING jobs back to QUEUED. Run exactly once at worker startup,
/// before the poll loop: rows left RUNNING at that point belonged to a
/// worker process that died, and a restart should resume them, not lose
/// them.
pub async fn recover_orphaned_jobs(pool: &PgPool) -> Result<Vec<Uuid>> {
    let rows: Vec<(Uuid,)> = sqlx::query_as(
        "UPDATE jobs SET progress = 'queued', started_at = NULL, updated_at = NOW() \
         WHERE progress = 'running' RETURNING job_id",
    )
    .fetch_all(pool)
    .await?;

    Ok(rows.into_iter().map(|(id,)| id).collect())
}

// ==========================================================================
// Integration tests: need a live PostgreSQL (set DATABASE_URL)
// ==========================================================================
