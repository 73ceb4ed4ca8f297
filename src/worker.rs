//! Job worker
//!
//! Drives route generation off the database queue:
//! 1. Recover orphaned jobs once at startup (RUNNING → QUEUED)
//! 2. Poll for the oldest QUEUED job and claim it atomically
//! 3. Run the routing algorithm under a wall-clock timeout
//! 4. Persist the route group, routes, stops, and cached paths
//! 5. Transition the job to COMPLETED or FAILED
//!
//! Jobs persist in the database, so a restart resumes instead of losing
//! work. Several worker processes may poll the same queue concurrently;
//! the claim query is the only coordination between them.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use chrono::Utc;
use sqlx::PgPool;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::db::queries;
use crate::services::error::GenerationError;
use crate::services::geo;
use crate::services::paths::PathClient;
use crate::services::routing::RoutingAlgorithm;
use crate::types::{Coordinates, Job, Location, RouteGenerationSettings};

/// Worker tuning knobs
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// Fixed start/end coordinate for all routes
    pub warehouse: Coordinates,
    /// Sleep between polls when the queue is empty
    pub poll_interval: Duration,
    /// Wall-clock bound on one job's route generation
    pub job_timeout: Duration,
    /// How long cached paths stay valid
    pub polyline_ttl_days: i64,
    /// Reset orphaned RUNNING jobs to QUEUED at startup
    pub enable_orphan_recovery: bool,
}

/// Worker that processes route-generation jobs from the database queue.
pub struct JobWorker {
    pool: PgPool,
    routing: Arc<dyn RoutingAlgorithm>,
    paths: Option<Arc<PathClient>>,
    config: WorkerConfig,
    shutdown: CancellationToken,
}

impl JobWorker {
    pub fn new(
        pool: PgPool,
        routing: Arc<dyn RoutingAlgorithm>,
        paths: Option<Arc<PathClient>>,
        config: WorkerConfig,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            pool,
            routing,
            paths,
            config,
            shutdown,
        }
    }

    /// Run the worker until the shutdown token fires.
    pub async fn start(&self) -> Result<()> {
        info!("Job worker starting...");

        if self.config.enable_orphan_recovery {
            match queries::job::recover_orphaned_jobs(&self.pool).await {
                Ok(recovered) if !recovered.is_empty() => {
                    info!("Re-queued {} orphaned jobs", recovered.len());
                }
                Ok(_) => {}
                Err(e) => error!("Orphan recovery failed: {e:#}"),
            }
        }

        self.worker_loop().await;
        Ok(())
    }

    async fn worker_loop(&self) {
        info!("Worker loop started - polling for queued jobs");

        while !self.shutdown.is_cancelled() {
            match queries::job::fail_stuck_jobs(&self.pool, self.config.job_timeout).await {
                Ok(stuck) => {
                    for job_id in stuck {
                        warn!("Job {job_id} ran past the timeout and was marked failed");
                    }
                }
                Err(e) => error!("Stuck-job scan failed: {e:#}"),
            }

            match queries::job::claim_next_queued(&self.pool).await {
                Ok(Some(job)) => self.process_job(job).await,
                Ok(None) => {
                    debug!("No queued jobs found");
                    self.idle().await;
                }
                Err(e) => {
                    // Transient store failures must not kill the loop
                    error!("Error finding next job: {e:#}");
                    self.idle().await;
                }
            }
        }

        info!("Worker loop stopped");
    }

    async fn idle(&self) {
        tokio::select! {
            _ = self.shutdown.cancelled() => {}
            _ = tokio::time::sleep(self.config.poll_interval) => {}
        }
    }

    /// Process one claimed job. Every error ends up on the job row as
    /// FAILED; nothing propagates back into the loop.
    async fn process_job(&self, job: Job) {
        info!(
            "Processing job {} for location group {}",
            job.job_id, job.location_group_id
        );

        match self.run_generation(&job).await {
            Ok(route_group_id) => {
                match queries::job::mark_completed(&self.pool, job.job_id, route_group_id).await {
                    Ok(true) => info!("Job {} completed", job.job_id),
                    Ok(false) => warn!(
                        "Job {} was no longer RUNNING when completion was recorded",
                        job.job_id
                    ),
                    Err(e) => error!("Failed to mark job {} completed: {e:#}", job.job_id),
                }
            }
            Err(e) => {
                warn!("Job {} failed: {e:#}", job.job_id);
                let message = format!("{e:#}");
                if let Err(update_err) =
                    queries::job::mark_failed(&self.pool, job.job_id, &message).await
                {
                    error!("Failed to mark job {} as failed: {update_err:#}", job.job_id);
                }
            }
        }
    }

    /// Resolve the job's locations, run routing, persist the results.
    /// Returns the id of the new route group.
    async fn run_generation(&self, job: &Job) -> Result<Uuid> {
        let settings = &job.payload.0;

        let group = queries::location::get_group(&self.pool, job.location_group_id)
            .await?
            .ok_or_else(|| {
                anyhow::anyhow!("location group {} not found", job.location_group_id)
            })?;

        let locations =
            queries::location::list_for_group(&self.pool, job.location_group_id).await?;
        if locations.is_empty() {
            return Err(GenerationError::InvalidInput(format!(
                "location group {} has no locations",
                job.location_group_id
            ))
            .into());
        }

        info!(
            "Generating {} routes for {} locations",
            settings.num_routes,
            locations.len()
        );

        let routes = execute_routing(
            self.routing.as_ref(),
            &locations,
            self.config.warehouse,
            settings,
            self.config.job_timeout,
        )
        .await?;

        let route_group = queries::route::insert_route_group(
            &self.pool,
            job.location_group_id,
            &format!("{} {}", group.name, Utc::now().format("%Y-%m-%d")),
        )
        .await?;

        for (index, stops) in routes.iter().enumerate() {
            self.persist_route(route_group.route_group_id, index, stops, settings)
                .await?;
        }

        Ok(route_group.route_group_id)
    }

    async fn persist_route(
        &self,
        route_group_id: Uuid,
        index: usize,
        stops: &[Location],
        settings: &RouteGenerationSettings,
    ) -> Result<()> {
        let mut coords = Vec::with_capacity(stops.len());
        for stop in stops {
            coords.push(stop.coordinates()?);
        }

        // Prefer the real drivable path when a path service is configured;
        // a fetch failure downgrades to the road estimate, it does not fail
        // the job.
        let fetched = match &self.paths {
            Some(client) if !stops.is_empty() => {
                match client
                    .fetch_route_path(self.config.warehouse, &coords, settings.return_to_warehouse)
                    .await
                {
                    Ok(path) => Some(path),
                    Err(e) => {
                        warn!(
                            "Path fetch failed for route {}: {e:#}; using road estimate",
                            index + 1
                        );
                        None
                    }
                }
            }
            _ => None,
        };

        let length_km = fetched.as_ref().map(|path| path.distance_km).unwrap_or_else(|| {
            geo::route_length_km(&self.config.warehouse, &coords, settings.return_to_warehouse)
        });

        let route = queries::route::insert_route(
            &self.pool,
            route_group_id,
            &format!("Route {}", index + 1),
            length_km,
            settings.return_to_warehouse,
        )
        .await?;

        for (offset, stop) in stops.iter().enumerate() {
            queries::route::insert_route_stop(
                &self.pool,
                route.route_id,
                stop.location_id,
                offset as i32 + 1,
            )
            .await?;
        }

        if let Some(path) = fetched {
            let expires_at = Utc::now() + chrono::Duration::days(self.config.polyline_ttl_days);
            queries::route::insert_polyline(
                &self.pool,
                route.route_id,
                &path.encoded_polyline,
                Some(expires_at),
            )
            .await?;
        }

        Ok(())
    }
}

/// Run the routing algorithm under a wall-clock timeout.
///
/// The timeout is passed down so cooperative algorithms can stop early, and
/// enforced here so non-cooperative ones (a hung network call, a spinning
/// heuristic) still surface as a timeout error instead of blocking the
/// worker forever.
pub(crate) async fn execute_routing(
    routing: &dyn RoutingAlgorithm,
    locations: &[Location],
    warehouse: Coordinates,
    settings: &RouteGenerationSettings,
    timeout: Duration,
) -> Result<Vec<Vec<Location>>, GenerationError> {
    match tokio::time::timeout(
        timeout,
        routing.generate_routes(locations, warehouse, settings, Some(timeout)),
    )
    .await
    {
        Ok(result) => result,
        Err(_) => Err(GenerationError::timeout("route generation", timeout)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::routing::SweepRouting;
    use crate::types::location::test_location;
    use crate::types::JobProgress;
    use async_trait::async_trait;

    fn warehouse() -> Coordinates {
        Coordinates { lat: 43.0, lng: -79.0 }
    }

    fn settings(num_routes: usize) -> RouteGenerationSettings {
        RouteGenerationSettings {
            num_routes,
            max_stops_per_route: None,
            max_boxes_per_route: None,
            return_to_warehouse: false,
            service_time_seconds: 600,
        }
    }

    /// Routing stub that never finishes in time
    struct SlowRouting;

    #[async_trait]
    impl RoutingAlgorithm for SlowRouting {
        async fn generate_routes(
            &self,
            _locations: &[Location],
            _warehouse: Coordinates,
            _settings: &RouteGenerationSettings,
            _timeout: Option<Duration>,
        ) -> Result<Vec<Vec<Location>>, GenerationError> {
            tokio::time::sleep(Duration::from_secs(60)).await;
            Ok(Vec::new())
        }
    }

    /// Routing stub that always reports a service failure
    struct FailingRouting;

    #[async_trait]
    impl RoutingAlgorithm for FailingRouting {
        async fn generate_routes(
            &self,
            _locations: &[Location],
            _warehouse: Coordinates,
            _settings: &RouteGenerationSettings,
            _timeout: Option<Duration>,
        ) -> Result<Vec<Vec<Location>>, GenerationError> {
            Err(GenerationError::Service(
                "optimizer returned 503: unavailable".to_string(),
            ))
        }
    }

    #[tokio::test]
    async fn test_execute_routing_converts_slow_call_to_timeout() {
        let locations = vec![test_location(43.1, -79.1, 1)];

        let err = execute_routing(
            &SlowRouting,
            &locations,
            warehouse(),
            &settings(1),
            Duration::from_millis(10),
        )
        .await
        .unwrap_err();

        assert!(matches!(err, GenerationError::Timeout { .. }));
    }

    #[tokio::test]
    async fn test_execute_routing_passes_results_through() {
        let locations: Vec<Location> = (0..6)
            .map(|i| test_location(43.0 + i as f64 * 0.01, -79.0 + i as f64 * 0.01, 1))
            .collect();

        let routes = execute_routing(
            &SweepRouting::new(),
            &locations,
            warehouse(),
            &settings(2),
            Duration::from_secs(5),
        )
        .await
        .unwrap();

        assert_eq!(routes.len(), 2);
        assert_eq!(routes.iter().map(Vec::len).sum::<usize>(), 6);
    }

    #[tokio::test]
    async fn test_execute_routing_passes_errors_through() {
        let locations = vec![test_location(43.1, -79.1, 1)];

        let err = execute_routing(
            &FailingRouting,
            &locations,
            warehouse(),
            &settings(1),
            Duration::from_secs(5),
        )
        .await
        .unwrap_err();

        assert!(matches!(err, GenerationError::Service(_)));
    }

    // ======================================================================
    // Integration tests: need a live PostgreSQL (set DATABASE_URL)
    // ======================================================================

    async fn test_pool() -> PgPool {
        let url = std::env::var("DATABASE_URL").expect("DATABASE_URL must be set for DB tests");
        let pool = crate::db::create_pool(&url).await.unwrap();
        crate::db::run_migrations(&pool).await.unwrap();
        pool
    }

    async fn seeded_group(pool: &PgPool, location_count: usize) -> Uuid {
        let group_id = Uuid::new_v4();
        sqlx::query("INSERT INTO location_groups (location_group_id, name) VALUES ($1, 'test')")
            .bind(group_id)
            .execute(pool)
            .await
            .unwrap();

        for i in 0..location_count {
            sqlx::query(
                "INSERT INTO locations (location_id, location_group_id, address, \
                 contact_name, notes, latitude, longitude, num_boxes) \
                 VALUES ($1, $2, '', '', '', $3, $4, 2)",
            )
            .bind(Uuid::new_v4())
            .bind(group_id)
            .bind(43.0 + i as f64 * 0.01)
            .bind(-79.0 - i as f64 * 0.01)
            .execute(pool)
            .await
            .unwrap();
        }

        group_id
    }

    fn test_worker(pool: PgPool, routing: Arc<dyn RoutingAlgorithm>, job_timeout: Duration) -> JobWorker {
        JobWorker::new(
            pool,
            routing,
            None,
            WorkerConfig {
                warehouse: warehouse(),
                poll_interval: Duration::from_millis(50),
                job_timeout,
                polyline_ttl_days: 30,
                enable_orphan_recovery: true,
            },
            CancellationToken::new(),
        )
    }

    #[tokio::test]
    #[ignore = "Requires PostgreSQL"]
    async fn test_process_job_success_persists_routes_and_completes() {
        let pool = test_pool().await;
        let group = seeded_group(&pool, 6).await;

        queries::job::enqueue(&pool, group, &settings(2)).await.unwrap();
        let job = queries::job::claim_next_queued(&pool).await.unwrap().unwrap();
        let job_id = job.job_id;

        let worker = test_worker(pool.clone(), Arc::new(SweepRouting::new()), Duration::from_secs(60));
        worker.process_job(job).await;

        let job = queries::job::get_job(&pool, job_id).await.unwrap().unwrap();
        assert_eq!(job.progress, JobProgress::Completed);
        assert!(job.finished_at.is_some());
        let route_group_id = job.route_group_id.expect("completed job links its route group");

        let routes: Vec<(Uuid,)> =
            sqlx::query_as("SELECT route_id FROM routes WHERE route_group_id = $1")
                .bind(route_group_id)
                .fetch_all(&pool)
                .await
                .unwrap();
        assert_eq!(routes.len(), 2);

        // Stop numbers are contiguous from 1 within each route
        let mut total_stops = 0;
        for (route_id,) in routes {
            let numbers: Vec<(i32,)> = sqlx::query_as(
                "SELECT stop_number FROM route_stops WHERE route_id = $1 ORDER BY stop_number",
            )
            .bind(route_id)
            .fetch_all(&pool)
            .await
            .unwrap();
            let numbers: Vec<i32> = numbers.into_iter().map(|(n,)| n).collect();
            assert_eq!(numbers, (1..=numbers.len() as i32).collect::<Vec<_>>());
            total_stops += numbers.len();
        }
        assert_eq!(total_stops, 6);
    }

    #[tokio::test]
    #[ignore = "Requires PostgreSQL"]
    async fn test_process_job_routing_failure_marks_failed() {
        let pool = test_pool().await;
        let group = seeded_group(&pool, 3).await;

        queries::job::enqueue(&pool, group, &settings(1)).await.unwrap();
        let job = queries::job::claim_next_queued(&pool).await.unwrap().unwrap();
        let job_id = job.job_id;

        let worker = test_worker(pool.clone(), Arc::new(FailingRouting), Duration::from_secs(60));
        worker.process_job(job).await;

        let job = queries::job::get_job(&pool, job_id).await.unwrap().unwrap();
        assert_eq!(job.progress, JobProgress::Failed);
        assert!(job.message.unwrap().contains("503"));
        assert!(job.route_group_id.is_none());
    }

    #[tokio::test]
    #[ignore = "Requires PostgreSQL"]
    async fn test_process_job_timeout_marks_failed_not_hangs() {
        let pool = test_pool().await;
        let group = seeded_group(&pool, 3).await;

        queries::job::enqueue(&pool, group, &settings(1)).await.unwrap();
        let job = queries::job::claim_next_queued(&pool).await.unwrap().unwrap();
        let job_id = job.job_id;

        let worker = test_worker(pool.clone(), Arc::new(SlowRouting), Duration::from_millis(10));
        worker.process_job(job).await;

        let job = queries::job::get_job(&pool, job_id).await.unwrap().unwrap();
        assert_eq!(job.progress, JobProgress::Failed);
        assert!(job.message.unwrap().contains("timeout"));
    }

    #[tokio::test]
    #[ignore = "Requires PostgreSQL"]
    async fn test_empty_location_group_marks_failed() {
        let pool = test_pool().await;
        let group = seeded_group(&pool, 0).await;

        queries::job::enqueue(&pool, group, &settings(1)).await.unwrap();
        let job = queries::job::claim_next_queued(&pool).await.unwrap().unwrap();
        let job_id = job.job_id;

        let worker = test_worker(pool.clone(), Arc::new(SweepRouting::new()), Duration::from_secs(60));
        worker.process_job(job).await;

        let job = queries::job::get_job(&pool, job_id).await.unwrap().unwrap();
        assert_eq!(job.progress, JobProgress::Failed);
        assert!(job.message.unwrap().contains("no locations"));
    }

    #[tokio::test]
    #[ignore = "Requires PostgreSQL"]
    async fn test_worker_loop_drains_queue_until_cancelled() {
        let pool = test_pool().await;
        let group = seeded_group(&pool, 4).await;

        queries::job::enqueue(&pool, group, &settings(2)).await.unwrap();
        queries::job::enqueue(&pool, group, &settings(2)).await.unwrap();

        let shutdown = CancellationToken::new();
        let worker = JobWorker::new(
            pool.clone(),
            Arc::new(SweepRouting::new()),
            None,
            WorkerConfig {
                warehouse: warehouse(),
                poll_interval: Duration::from_millis(20),
                job_timeout: Duration::from_secs(60),
                polyline_ttl_days: 30,
                enable_orphan_recovery: true,
            },
            shutdown.clone(),
        );

        let handle = tokio::spawn(async move { worker.start().await });
        tokio::time::sleep(Duration::from_millis(500)).await;
        shutdown.cancel();
        handle.await.unwrap().unwrap();

        let remaining = queries::job::list_jobs(&pool, Some(JobProgress::Queued)).await.unwrap();
        let remaining_for_group: Vec<_> = remaining
            .iter()
            .filter(|j| j.location_group_id == group)
            .collect();
        assert!(remaining_for_group.is_empty(), "both jobs should have been claimed");
    }
}
