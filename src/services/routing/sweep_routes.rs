//! Local sweep routing heuristic
//!
//! Clusters with the angular sweep (one cluster per route), then orders
//! each cluster by the same (bearing, distance) key. Stops within a wedge
//! are visited in sweep order, which approximates a short tour without
//! crossing paths, as a polynomial-time stand-in for exact TSP.

use std::time::Duration;

use async_trait::async_trait;

use crate::services::clustering::{ClusteringAlgorithm, SweepClustering};
use crate::services::error::GenerationError;
use crate::services::geo;
use crate::types::{Coordinates, Location, RouteGenerationSettings};

use super::RoutingAlgorithm;

pub struct SweepRouting;

impl SweepRouting {
    pub fn new() -> Self {
        Self
    }
}

impl Default for SweepRouting {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl RoutingAlgorithm for SweepRouting {
    async fn generate_routes(
        &self,
        locations: &[Location],
        warehouse: Coordinates,
        settings: &RouteGenerationSettings,
        timeout: Option<Duration>,
    ) -> Result<Vec<Vec<Location>>, GenerationError> {
        if locations.is_empty() {
            return Ok(Vec::new());
        }

        let clustering = SweepClustering::new(warehouse);
        let clusters = clustering
            .cluster_locations(
                locations,
                settings.num_routes,
                settings.max_stops_per_route,
                None,
                timeout,
            )
            .await?;

        // Each cluster comes back in global sweep order already; re-sorting
        // by the same key keeps that an explicit guarantee rather than a
        // side effect of the clustering implementation.
        let mut routes = Vec::with_capacity(clusters.len());
        for cluster in clusters {
            let mut keyed = Vec::with_capacity(cluster.len());
            for location in cluster {
                let coords = location.coordinates()?;
                let angle = geo::bearing_from(&warehouse, &coords);
                let dist2 = geo::distance_squared(&warehouse, &coords);
                keyed.push((angle, dist2, location));
            }
            keyed.sort_by(|a, b| a.0.total_cmp(&b.0).then_with(|| a.1.total_cmp(&b.1)));
            routes.push(keyed.into_iter().map(|(_, _, loc)| loc).collect());
        }
        Ok(routes)
    }
}
