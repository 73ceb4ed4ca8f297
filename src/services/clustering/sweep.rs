//! Angular sweep clustering
//!
//! Locations are sorted by their bearing angle from the warehouse (distance
//! as tie-breaker) and the sorted sequence is cut into contiguous runs.
//! Deterministic, O(n log n), and the runs come out as geographically
//! contiguous wedges.

use std::time::Duration;

use async_trait::async_trait;

use crate::services::error::GenerationError;
use crate::services::geo;
use crate::types::{Coordinates, Location};

use super::{
    check_location_cap_feasible, validate_inputs, ClusteringAlgorithm, TimeBudget,
};

/// How the sorted sweep sequence is cut into clusters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SweepMode {
    /// Exactly `num_clusters` runs sized ⌊n/k⌋ or ⌊n/k⌋+1 (the first
    /// `n mod k` runs get the extra element).
    EvenSplit,
    /// Ignore the cluster-count target; start a new cluster whenever adding
    /// one more location would exceed a cap.
    PackByConstraint,
}

/// Sweep clustering around a fixed warehouse.
pub struct SweepClustering {
    warehouse: Coordinates,
    mode: SweepMode,
}

impl SweepClustering {
    /// Even split: honors `num_clusters` and (fail-fast) a location cap.
    pub fn new(warehouse: Coordinates) -> Self {
        Self {
            warehouse,
            mode: SweepMode::EvenSplit,
        }
    }

    /// Pack-by-constraint variant: greedily fills clusters up to the
    /// location or box cap, producing as many clusters as the caps demand.
    pub fn pack_by_constraint(warehouse: Coordinates) -> Self {
        Self {
            warehouse,
            mode: SweepMode::PackByConstraint,
        }
    }

    /// Locations sorted by (bearing from warehouse, squared distance).
    /// Errors on missing coordinates; checks the budget once per location.
    fn sorted_by_sweep(
        &self,
        locations: &[Location],
        budget: &TimeBudget,
    ) -> Result<Vec<Location>, GenerationError> {
        let mut keyed: Vec<(f64, f64, Location)> = Vec::with_capacity(locations.len());
        for location in locations {
            budget.check()?;
            let coords = location.coordinates()?;
            let angle = geo::bearing_from(&self.warehouse, &coords);
            let dist2 = geo::distance_squared(&self.warehouse, &coords);
            keyed.push((angle, dist2, location.clone()));
        }
        keyed.sort_by(|a, b| {
            a.0.total_cmp(&b.0).then_with(|| a.1.total_cmp(&b.1))
        });
        Ok(keyed.into_iter().map(|(_, _, loc)| loc).collect())
    }

    fn even_split(
        &self,
        sorted: Vec<Location>,
        num_clusters: usize,
        max_locations_per_cluster: Option<usize>,
    ) -> Result<Vec<Vec<Location>>, GenerationError> {
        let total = sorted.len();
        let base_size = total / num_clusters;
        let remainder = total % num_clusters;

        if base_size == 0 {
            return Err(GenerationError::Infeasible(format!(
                "cannot create {num_clusters} clusters: not enough locations"
            )));
        }
        check_location_cap_feasible(total, num_clusters, max_locations_per_cluster)?;

        let mut clusters = Vec::with_capacity(num_clusters);
        let mut sorted = sorted.into_iter();
        for i in 0..num_clusters {
            let size = base_size + usize::from(i < remainder);
            clusters.push(sorted.by_ref().take(size).collect());
        }
        Ok(clusters)
    }

    fn pack(
        &self,
        sorted: Vec<Location>,
        max_locations_per_cluster: Option<usize>,
        max_boxes_per_cluster: Option<i64>,
        budget: &TimeBudget,
    ) -> Result<Vec<Vec<Location>>, GenerationError> {
        let mut clusters: Vec<Vec<Location>> = Vec::new();
        let mut current: Vec<Location> = Vec::new();
        let mut current_boxes: i64 = 0;

        for location in sorted {
            budget.check()?;

            let would_exceed_locations = max_locations_per_cluster
                .is_some_and(|cap| current.len() + 1 > cap);
            let would_exceed_boxes = max_boxes_per_cluster
                .is_some_and(|cap| current_boxes + i64::from(location.num_boxes) > cap);

            if !current.is_empty() && (would_exceed_locations || would_exceed_boxes) {
                clusters.push(std::mem::take(&mut current));
                current_boxes = 0;
            }

            current_boxes += i64::from(location.num_boxes);
            current.push(location);
        }
        if !current.is_empty() {
            clusters.push(current);
        }
        Ok(clusters)
    }
}

#[async_trait]
impl ClusteringAlgorithm for SweepClustering {
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

        let budget = TimeBudget::new("sweep clustering", timeout);
        let sorted = self.sorted_by_sweep(locations, &budget)?;

        match self.mode {
            SweepMode::EvenSplit => {
                if max_boxes_per_cluster.is_some() {
                    return Err(GenerationError::InvalidInput(
                        "even-split sweep cannot bound boxes per cluster; use the \
                         pack-by-constraint variant"
                            .to_string(),
                    ));
                }
                self.even_split(sorted, num_clusters, max_locations_per_cluster)
            }
            SweepMode::PackByConstraint => self.pack(
                sorted,
                max_locations_per_cluster,
                max_boxes_per_cluster,
                &budget,
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::location::test_location;
    use std::collections::HashSet;
    use uuid::Uuid;

    fn warehouse() -> Coordinates {
        Coordinates { lat: 43.0, lng: -79.0 }
    }

    /// Twelve locations on a circle around the warehouse.
    fn ring(count: usize) -> Vec<Location> {
        (0..count)
            .map(|i| {
                let angle = i as f64 / count as f64 * std::f64::consts::TAU;
                test_location(
                    43.0 + 0.1 * angle.sin(),
                    -79.0 + 0.1 * angle.cos(),
                    (i % 3 + 1) as i32,
                )
            })
            .collect()
    }

    fn ids(locations: &[Location]) -> HashSet<Uuid> {
        locations.iter().map(|l| l.location_id).collect()
    }

    #[tokio::test]
    async fn test_even_split_partitions_all_locations() {
        let locations = ring(12);
        let algorithm = SweepClustering::new(warehouse());

        let clusters = algorithm
            .cluster_locations(&locations, 3, None, None, None)
            .await
            .unwrap();

        assert_eq!(clusters.len(), 3);
        for cluster in &clusters {
            assert_eq!(cluster.len(), 4);
        }
        let all: HashSet<Uuid> = clusters.iter().flatten().map(|l| l.location_id).collect();
        assert_eq!(all, ids(&locations));
        assert_eq!(clusters.iter().map(Vec::len).sum::<usize>(), 12);
    }

    #[tokio::test]
    async fn test_even_split_remainder_goes_to_first_clusters() {
        let locations = ring(11);
        let algorithm = SweepClustering::new(warehouse());

        let clusters = algorithm
            .cluster_locations(&locations, 3, None, None, None)
            .await
            .unwrap();

        // 11 = 4 + 4 + 3
        assert_eq!(clusters[0].len(), 4);
        assert_eq!(clusters[1].len(), 4);
        assert_eq!(clusters[2].len(), 3);
    }

    #[tokio::test]
    async fn test_deterministic_across_calls() {
        let locations = ring(10);
        let algorithm = SweepClustering::new(warehouse());

        let first = algorithm
            .cluster_locations(&locations, 4, None, None, None)
            .await
            .unwrap();
        let second = algorithm
            .cluster_locations(&locations, 4, None, None, None)
            .await
            .unwrap();

        let first_ids: Vec<Vec<Uuid>> = first
            .iter()
            .map(|c| c.iter().map(|l| l.location_id).collect())
            .collect();
        let second_ids: Vec<Vec<Uuid>> = second
            .iter()
            .map(|c| c.iter().map(|l| l.location_id).collect())
            .collect();
        assert_eq!(first_ids, second_ids);
    }

    #[tokio::test]
    async fn test_infeasible_location_cap_fails_fast() {
        // ceil(10 / 2) = 5 > 3
        let locations = ring(10);
        let algorithm = SweepClustering::new(warehouse());

        let err = algorithm
            .cluster_locations(&locations, 2, Some(3), None, None)
            .await
            .unwrap_err();
        assert!(matches!(err, GenerationError::Infeasible(_)));
    }

    #[tokio::test]
    async fn test_empty_locations_rejected() {
        let algorithm = SweepClustering::new(warehouse());
        let err = algorithm
            .cluster_locations(&[], 2, None, None, None)
            .await
            .unwrap_err();
        assert!(matches!(err, GenerationError::InvalidInput(_)));
    }

    #[tokio::test]
    async fn test_zero_clusters_rejected() {
        let locations = ring(4);
        let algorithm = SweepClustering::new(warehouse());
        let err = algorithm
            .cluster_locations(&locations, 0, None, None, None)
            .await
            .unwrap_err();
        assert!(matches!(err, GenerationError::InvalidInput(_)));
    }

    #[tokio::test]
    async fn test_more_clusters_than_locations_rejected() {
        let locations = ring(2);
        let algorithm = SweepClustering::new(warehouse());
        let err = algorithm
            .cluster_locations(&locations, 3, None, None, None)
            .await
            .unwrap_err();
        assert!(matches!(err, GenerationError::Infeasible(_)));
    }

    #[tokio::test]
    async fn test_missing_coordinates_rejected() {
        let mut locations = ring(4);
        locations[2].latitude = None;
        let algorithm = SweepClustering::new(warehouse());

        let err = algorithm
            .cluster_locations(&locations, 2, None, None, None)
            .await
            .unwrap_err();
        assert!(matches!(err, GenerationError::MissingLatitude(_)));
    }

    #[tokio::test]
    async fn test_zero_timeout_reports_timeout() {
        let locations = ring(64);
        let algorithm = SweepClustering::new(warehouse());

        let err = algorithm
            .cluster_locations(&locations, 4, None, None, Some(Duration::ZERO))
            .await
            .unwrap_err();
        assert!(matches!(err, GenerationError::Timeout { .. }));
    }

    #[tokio::test]
    async fn test_pack_by_constraint_respects_location_cap() {
        let locations = ring(10);
        let algorithm = SweepClustering::pack_by_constraint(warehouse());

        let clusters = algorithm
            .cluster_locations(&locations, 1, Some(3), None, None)
            .await
            .unwrap();

        // Cluster-count target is ignored; the cap is what matters.
        assert_eq!(clusters.len(), 4);
        for cluster in &clusters {
            assert!(cluster.len() <= 3);
        }
        let all: HashSet<Uuid> = clusters.iter().flatten().map(|l| l.location_id).collect();
        assert_eq!(all, ids(&locations));
    }

    #[tokio::test]
    async fn test_pack_by_constraint_respects_box_cap() {
        let locations = ring(9); // box demands cycle 1,2,3
        let algorithm = SweepClustering::pack_by_constraint(warehouse());

        let clusters = algorithm
            .cluster_locations(&locations, 1, None, Some(4), None)
            .await
            .unwrap();

        for cluster in &clusters {
            let boxes: i64 = cluster.iter().map(|l| i64::from(l.num_boxes)).sum();
            assert!(boxes <= 4, "cluster holds {boxes} boxes");
        }
        assert_eq!(clusters.iter().map(Vec::len).sum::<usize>(), 9);
    }

    #[tokio::test]
    async fn test_even_split_rejects_box_cap() {
        let locations = ring(6);
        let algorithm = SweepClustering::new(warehouse());
        let err = algorithm
            .cluster_locations(&locations, 2, None, Some(5), None)
            .await
            .unwrap_err();
        assert!(matches!(err, GenerationError::InvalidInput(_)));
    }

    #[tokio::test]
    async fn test_wedges_are_angularly_contiguous() {
        let locations = ring(12);
        let algorithm = SweepClustering::new(warehouse());
        let wh = warehouse();

        let clusters = algorithm
            .cluster_locations(&locations, 3, None, None, None)
            .await
            .unwrap();

        // Within each cluster the sweep order is preserved: bearings ascend.
        for cluster in &clusters {
            let bearings: Vec<f64> = cluster
                .iter()
                .map(|l| geo::bearing_from(&wh, &l.coordinates().unwrap()))
                .collect();
            for pair in bearings.windows(2) {
                assert!(pair[0] <= pair[1] + 1e-12);
            }
        }
    }
}
