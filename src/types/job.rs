//! Job queue types
//!
//! The `jobs` table is both the audit trail and the queue itself: workers
//! claim rows directly with row-level locks, no broker in between.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::types::Json;
use sqlx::FromRow;
use uuid::Uuid;

use super::settings::RouteGenerationSettings;

/// Progress of a route-generation job.
///
/// `Pending` and `Queued` are both "not yet claimed": enqueue inserts the
/// row as `Pending` and immediately promotes it to `Queued` to signal
/// eligibility. `Completed` and `Failed` are terminal; no transition ever
/// leaves them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "job_progress", rename_all = "lowercase")]
#[serde(rename_all = "camelCase")]
pub enum JobProgress {
    Pending,
    Queued,
    Running,
    Completed,
    Failed,
}

impl JobProgress {
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobProgress::Completed | JobProgress::Failed)
    }
}

/// A persisted route-generation job
#[derive(Debug, Clone, FromRow)]
pub struct Job {
    pub job_id: Uuid,
    /// The location group routes are generated for
    pub location_group_id: Uuid,
    /// Set once generation succeeds and the route group is persisted
    pub route_group_id: Option<Uuid>,
    pub progress: JobProgress,
    /// Requested generation settings, stored as JSON
    pub payload: Json<RouteGenerationSettings>,
    /// Failure reason for FAILED jobs
    pub message: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
}

/// Response when a job is enqueued
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobSubmitResponse {
    pub job_id: Uuid,
}

/// Job read model (what the API layer returns for a job lookup)
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobRead {
    pub job_id: Uuid,
    pub location_group_id: Uuid,
    pub route_group_id: Option<Uuid>,
    pub progress: JobProgress,
    pub message: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
}

impl From<Job> for JobRead {
    fn from(job: Job) -> Self {
        Self {
            job_id: job.job_id,
            location_group_id: job.location_group_id,
            route_group_id: job.route_group_id,
            progress: job.progress,
            message: job.message,
            created_at: job.created_at,
            updated_at: job.updated_at,
            started_at: job.started_at,
            finished_at: job.finished_at,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_progress_serializes_lowercase() {
        let json = serde_json::to_string(&JobProgress::Running).unwrap();
        assert_eq!(json, "\"running\"");
        let json = serde_json::to_string(&JobProgress::Completed).unwrap();
        assert_eq!(json, "\"completed\"");
    }

    #[test]
    fn test_progress_round_trips() {
        for progress in [
            JobProgress::Pending,
            JobProgress::Queued,
            JobProgress::Running,
            JobProgress::Completed,
            JobProgress::Failed,
        ] {
            let json = serde_json::to_string(&progress).unwrap();
            let back: JobProgress = serde_json::from_str(&json).unwrap();
            assert_eq!(back, progress);
        }
    }

    #[test]
    fn test_terminal_states() {
        assert!(JobProgress::Completed.is_terminal());
        assert!(JobProgress::Failed.is_terminal());
        assert!(!JobProgress::Pending.is_terminal());
        assert!(!JobProgress::Queued.is_terminal());
        assert!(!JobProgress::Running.is_terminal());
    }

    #[test]
    fn test_submit_response_serializes_to_camel_case() {
        let response = JobSubmitResponse { job_id: Uuid::nil() };
        let json = serde_json::to_string(&response).unwrap();
        assert!(json.contains("jobId"));
        assert!(!json.contains("job_id"));
    }
}
