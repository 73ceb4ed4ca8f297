//! Scheduled maintenance tasks
//!
//! A small registry of recurring tasks: interval trigger in, async callback
//! out. Deliberately decoupled from the job queue; these are process-local
//! tokio loops for housekeeping (cache refresh and the like), not durable
//! work.

use std::future::Future;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

/// Registry of recurring background tasks.
///
/// All registered tasks stop when the shared [`CancellationToken`] fires.
pub struct Scheduler {
    shutdown: CancellationToken,
    jobs: Mutex<Vec<(String, JoinHandle<()>)>>,
}

impl Scheduler {
    pub fn new(shutdown: CancellationToken) -> Self {
        Self {
            shutdown,
            jobs: Mutex::new(Vec::new()),
        }
    }

    /// Register a recurring task. The first run happens one full `period`
    /// after registration; a failing run is logged and does not unschedule
    /// the task.
    pub fn add_interval_job<F, Fut>(&self, job_id: &str, period: Duration, func: F)
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        let token = self.shutdown.clone();
        let id = job_id.to_string();

        let handle = tokio::spawn(async move {
            let start = tokio::time::Instant::now() + period;
            let mut interval = tokio::time::interval_at(start, period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    _ = token.cancelled() => break,
                    _ = interval.tick() => {
                        if let Err(e) = func().await {
                            error!("Scheduled job '{}' failed: {e:#}", id);
                        }
                    }
                }
            }
            info!("Scheduled job '{}' stopped", id);
        });

        self.jobs.lock().push((job_id.to_string(), handle));
        info!("Registered job '{}' - every {:?}", job_id, period);
    }

    /// Registered job ids, in registration order.
    pub fn job_ids(&self) -> Vec<String> {
        self.jobs.lock().iter().map(|(id, _)| id.clone()).collect()
    }

    /// Wait for all tasks to wind down. Call after cancelling the token.
    pub async fn stop(self) {
        let jobs = std::mem::take(&mut *self.jobs.lock());
        for (id, handle) in jobs {
            if handle.await.is_err() {
                error!("Scheduled job '{}' panicked", id);
            }
        }
        info!("Scheduler stopped");
    }
}
