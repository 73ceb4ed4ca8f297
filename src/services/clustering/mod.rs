//! Clustering algorithms
//!
//! Pure functions: locations plus constraints in, capacity-bounded clusters
//! out. No database access: strategies only compute assignments, and are
//! interchangeable behind [`ClusteringAlgorithm`].
//!
//! At most one of `max_locations_per_cluster` / `max_boxes_per_cluster` is
//! honored per call; combining them is an unresolved extension point.

mod greedy;
mod kmeans;
mod sweep;

pub use greedy::RoundRobinClustering;
pub use kmeans::KMeansClustering;
pub use sweep::SweepClustering;

use std::time::{Duration, Instant};

use async_trait::async_trait;

use crate::services::error::GenerationError;
use crate::types::Location;

/// Contract shared by all clustering strategies.
///
/// Strategies may perform long computations, so the contract is async and
/// carries an optional timeout that implementations must check at bounded
/// intervals, at minimum once per location processed.
#[async_trait]
pub trait ClusteringAlgorithm: Send + Sync {
    async fn cluster_locations(
        &self,
        locations: &[Location],
        num_clusters: usize,
        max_locations_per_cluster: Option<usize>,
        max_boxes_per_cluster: Option<i64>,
        timeout: Option<Duration>,
    ) -> Result<Vec<Vec<Location>>, GenerationError>;
}

/// Elapsed-time budget for one clustering run.
pub(crate) struct TimeBudget {
    stage: &'static str,
    started: Instant,
    limit: Option<Duration>,
}

impl TimeBudget {
    pub(crate) fn new(stage: &'static str, limit: Option<Duration>) -> Self {
        Self {
            stage,
            started: Instant::now(),
            limit,
        }
    }

    /// Errors once the limit is exceeded. Call at least once per location.
    pub(crate) fn check(&self) -> Result<(), GenerationError> {
        if let Some(limit) = self.limit {
            if self.started.elapsed() > limit {
                return Err(GenerationError::timeout(self.stage, limit));
            }
        }
        Ok(())
    }
}

/// Input validation shared by every strategy.
pub(crate) fn validate_inputs(
    locations: &[Location],
    num_clusters: usize,
) -> Result<(), GenerationError> {
    if locations.is_empty() {
        return Err(GenerationError::InvalidInput(
            "locations list cannot be empty".to_string(),
        ));
    }
    if num_clusters < 1 {
        return Err(GenerationError::InvalidInput(
            "num_clusters must be at least 1".to_string(),
        ));
    }
    Ok(())
}

/// Fail fast before any clustering work when a location cap is
/// mathematically impossible: the fullest of `num_clusters` clusters holds
/// at least ceil(n / num_clusters) locations.
pub(crate) fn check_location_cap_feasible(
    total_locations: usize,
    num_clusters: usize,
    max_locations_per_cluster: Option<usize>,
) -> Result<(), GenerationError> {
    if let Some(cap) = max_locations_per_cluster {
        let min_largest = total_locations.div_ceil(num_clusters);
        if min_largest > cap {
            return Err(GenerationError::Infeasible(format!(
                "cannot create {num_clusters} clusters with max {cap} locations per \
                 cluster; the fullest cluster would hold at least {min_largest}"
            )));
        }
    }
    Ok(())
}

/// Same fail-fast check for a box cap: total demand must fit in
/// `num_clusters` clusters of `max_boxes_per_cluster` boxes each.
pub(crate) fn check_box_cap_feasible(
    locations: &[Location],
    num_clusters: usize,
    max_boxes_per_cluster: Option<i64>,
) -> Result<(), GenerationError> {
    if let Some(cap) = max_boxes_per_cluster {
        let total_boxes: i64 = locations.iter().map(|loc| i64::from(loc.num_boxes)).sum();
        let max_possible = cap.saturating_mul(num_clusters as i64);
        if total_boxes > max_possible {
            return Err(GenerationError::Infeasible(format!(
                "cannot fit {total_boxes} boxes into {num_clusters} clusters of at \
                 most {cap} boxes each"
            )));
        }
    }
    Ok(())
}
