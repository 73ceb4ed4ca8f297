//! Capacity-constrained k-means clustering
//!
//! Standard Lloyd's iterations produce centroids; the assignment step then
//! respects per-cluster capacity with a greedy pass: points are assigned
//! in global distance-ascending order, so the closest points claim their
//! preferred cluster first and overflow spills to the next-nearest cluster
//! with room.
//!
//! Restarts are seeded, so the same input always clusters the same way.

use std::time::Duration;

use async_trait::async_trait;
use rand::rngs::StdRng;
use rand::SeedableRng;

use crate::services::error::GenerationError;
use crate::types::Location;

use super::{
    check_box_cap_feasible, check_location_cap_feasible, validate_inputs,
    ClusteringAlgorithm, TimeBudget,
};

const DEFAULT_MAX_ITERATIONS: usize = 100;
const DEFAULT_RESTARTS: usize = 10;
const DEFAULT_SEED: u64 = 42;

/// K-means over (latitude, longitude) with optional capacity constraints.
pub struct KMeansClustering {
    max_iterations: usize,
    restarts: usize,
    seed: u64,
}

impl Default for KMeansClustering {
    fn default() -> Self {
        Self {
            max_iterations: DEFAULT_MAX_ITERATIONS,
            restarts: DEFAULT_RESTARTS,
            seed: DEFAULT_SEED,
        }
    }
}

impl KMeansClustering {
    pub fn new() -> Self {
        Self::default()
    }
}

type Point = [f64; 2];

fn dist2(a: &Point, b: &Point) -> f64 {
    let dx = a[0] - b[0];
    let dy = a[1] - b[1];
    dx * dx + dy * dy
}

/// One Lloyd's run from a random initialization.
/// Returns (centroids, assignments, inertia).
fn lloyd_run(
    points: &[Point],
    k: usize,
    rng: &mut StdRng,
    max_iterations: usize,
    budget: &TimeBudget,
) -> Result<(Vec<Point>, Vec<usize>, f64), GenerationError> {
    let init = rand::seq::index::sample(rng, points.len(), k);
    let mut centroids: Vec<Point> = init.iter().map(|i| points[i]).collect();
    let mut assignments = vec![0usize; points.len()];

    for _ in 0..max_iterations {
        let mut changed = false;
        for (i, point) in points.iter().enumerate() {
            budget.check()?;
            let nearest = (0..k)
                .min_by(|&a, &b| dist2(point, &centroids[a]).total_cmp(&dist2(point, &centroids[b])))
                .unwrap_or(0);
            if assignments[i] != nearest {
                assignments[i] = nearest;
                changed = true;
            }
        }

        let mut sums = vec![[0.0f64; 2]; k];
        let mut counts = vec![0usize; k];
        for (i, point) in points.iter().enumerate() {
            let cluster = assignments[i];
            sums[cluster][0] += point[0];
            sums[cluster][1] += point[1];
            counts[cluster] += 1;
        }
        for cluster in 0..k {
            // An emptied cluster keeps its previous centroid.
            if counts[cluster] > 0 {
                centroids[cluster] = [
                    sums[cluster][0] / counts[cluster] as f64,
                    sums[cluster][1] / counts[cluster] as f64,
                ];
            }
        }

        if !changed {
            break;
        }
    }

    let inertia = points
        .iter()
        .zip(&assignments)
        .map(|(point, &cluster)| dist2(point, &centroids[cluster]))
        .sum();
    Ok((centroids, assignments, inertia))
}

/// Assign points to clusters respecting a capacity, closest points first.
/// `demand(i)` is 1 per location for the location cap, `num_boxes` for the
/// box cap.
fn assign_with_capacity(
    points: &[Point],
    centroids: &[Point],
    capacity: i64,
    demand: impl Fn(usize) -> i64,
    budget: &TimeBudget,
) -> Result<Vec<usize>, GenerationError> {
    let k = centroids.len();
    let mut used = vec![0i64; k];
    let mut assignments = vec![usize::MAX; points.len()];

    // (point index, preferred cluster, distance to preferred)
    let mut candidates: Vec<(usize, usize, f64)> = points
        .iter()
        .enumerate()
        .map(|(i, point)| {
            let preferred = (0..k)
                .min_by(|&a, &b| {
                    dist2(point, &centroids[a]).total_cmp(&dist2(point, &centroids[b]))
                })
                .unwrap_or(0);
            (i, preferred, dist2(point, &centroids[preferred]))
        })
        .collect();
    candidates.sort_by(|a, b| a.2.total_cmp(&b.2));

    for (index, preferred, _) in candidates {
        budget.check()?;
        let need = demand(index);

        if used[preferred] + need <= capacity {
            assignments[index] = preferred;
            used[preferred] += need;
            continue;
        }

        // Spill to the next-nearest cluster with remaining capacity.
        let mut by_distance: Vec<usize> = (0..k).collect();
        by_distance.sort_by(|&a, &b| {
            dist2(&points[index], &centroids[a]).total_cmp(&dist2(&points[index], &centroids[b]))
        });
        let placed = by_distance.into_iter().find(|&cluster| {
            used[cluster] + need <= capacity
        });

        match placed {
            Some(cluster) => {
                assignments[index] = cluster;
                used[cluster] += need;
            }
            None => {
                return Err(GenerationError::Infeasible(format!(
                    "unable to assign location index {index} under capacity constraints"
                )));
            }
        }
    }

    Ok(assignments)
}

#[async_trait]
impl ClusteringAlgorithm for KMeansClustering {
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
        if max_locations_per_cluster.is_some_and(|cap| cap == 0) {
            return Err(GenerationError::InvalidInput(
                "max_locations_per_cluster must be positive".to_string(),
            ));
        }
        if max_boxes_per_cluster.is_some_and(|cap| cap <= 0) {
            return Err(GenerationError::InvalidInput(
                "max_boxes_per_cluster must be positive".to_string(),
            ));
        }
        if locations.len() < num_clusters {
            return Err(GenerationError::Infeasible(format!(
                "cannot create {num_clusters} clusters from {} locations",
                locations.len()
            )));
        }
        check_location_cap_feasible(locations.len(), num_clusters, max_locations_per_cluster)?;
        check_box_cap_feasible(locations, num_clusters, max_boxes_per_cluster)?;

        let budget = TimeBudget::new("k-means clustering", timeout);

        let mut points: Vec<Point> = Vec::with_capacity(locations.len());
        for location in locations {
            budget.check()?;
            let coords = location.coordinates()?;
            points.push([coords.lat, coords.lng]);
        }

        // Seeded restarts: keep the run with the lowest inertia.
        let mut best: Option<(Vec<Point>, Vec<usize>, f64)> = None;
        for restart in 0..self.restarts {
            let mut rng = StdRng::seed_from_u64(self.seed.wrapping_add(restart as u64));
            let run = lloyd_run(&points, num_clusters, &mut rng, self.max_iterations, &budget)?;
            if best.as_ref().map_or(true, |(_, _, inertia)| run.2 < *inertia) {
                best = Some(run);
            }
        }
        let (centroids, free_assignments, _) =
            best.expect("at least one k-means restart always runs");

        let assignments = if let Some(cap) = max_locations_per_cluster {
            assign_with_capacity(&points, &centroids, cap as i64, |_| 1, &budget)?
        } else if let Some(cap) = max_boxes_per_cluster {
            assign_with_capacity(
                &points,
                &centroids,
                cap,
                |i| i64::from(locations[i].num_boxes),
                &budget,
            )?
        } else {
            free_assignments
        };

        let mut clusters: Vec<Vec<Location>> = vec![Vec::new(); num_clusters];
        for (location, &cluster) in locations.iter().zip(&assignments) {
            clusters[cluster].push(location.clone());
        }
        Ok(clusters)
    }
}
