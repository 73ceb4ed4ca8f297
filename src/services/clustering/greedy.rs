//! Round-robin partitioner
//!
//! Deals locations into clusters in input order, skipping clusters whose
//! cap is reached. Baseline/reference implementation; the interesting
//! strategies live in `sweep` and `kmeans`.

use std::time::Duration;

use async_trait::async_trait;

use crate::services::error::GenerationError;
use crate::types::Location;

use super::{
    check_box_cap_feasible, check_location_cap_feasible, validate_inputs,
    ClusteringAlgorithm, TimeBudget,
};

pub struct RoundRobinClustering;

#[async_trait]
impl ClusteringAlgorithm for RoundRobinClustering {
    async fn cluster_locations(
        &self,
        locations: &[Location],
        num_clusters: usize,
        max_locations_per_cluster: Option<usize>,
        max_boxes_per_cluster: Option<i64>,
        timeout: Option<Duration>,
    ) -> Result<Vec<Vec<Location>>, GenerationError> {
        debug_assert!(
            max_locations_per_cluster.is_none() || max_boxes_per_cluster.is_none(),
            "location and box caps are mutually exclusive"
        );
        validate_inputs(locations, num_clusters)?;
        check_location_cap_feasible(locations.len(), num_clusters, max_locations_per_cluster)?;
        check_box_cap_feasible(locations, num_clusters, max_boxes_per_cluster)?;

        let budget = TimeBudget::new("round-robin clustering", timeout);

        let mut clusters: Vec<Vec<Location>> = vec![Vec::new(); num_clusters];
        let mut boxes: Vec<i64> = vec![0; num_clusters];
        let mut cursor = 0usize;

        for location in locations {
            budget.check()?;
            let demand = i64::from(location.num_boxes);

            let mut placed = false;
            for offset in 0..num_clusters {
                let cluster = (cursor + offset) % num_clusters;
                let over_locations = max_locations_per_cluster
                    .is_some_and(|cap| clusters[cluster].len() + 1 > cap);
                let over_boxes =
                    max_boxes_per_cluster.is_some_and(|cap| boxes[cluster] + demand > cap);
                if over_locations || over_boxes {
                    continue;
                }
                clusters[cluster].push(location.clone());
                boxes[cluster] += demand;
                cursor = (cluster + 1) % num_clusters;
                placed = true;
                break;
            }

            if !placed {
                return Err(GenerationError::Infeasible(format!(
                    "no cluster has capacity left for location {}",
                    location.location_id
                )));
            }
        }

        Ok(clusters)
    }
}
