//! Route path client
//!
//! Fetches a drivable path for an ordered stop sequence from a
//! computeRoutes-style endpoint: encoded polyline plus total distance.
//! Results are cached in the `polylines` table with an expiry; this client
//! only talks HTTP.

use anyhow::{Context, Result};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::types::Coordinates;

/// Path service configuration
#[derive(Debug, Clone)]
pub struct PathConfig {
    /// Base URL of the path service
    pub base_url: String,
    /// API key sent as X-Goog-Api-Key
    pub api_key: String,
    /// Request timeout in seconds
    pub timeout_seconds: u64,
}

/// Fetched path for one route
#[derive(Debug, Clone)]
pub struct RoutePath {
    pub encoded_polyline: String,
    pub distance_km: f64,
}

/// Path service client
pub struct PathClient {
    client: Client,
    config: PathConfig,
}

impl PathClient {
    pub fn new(config: PathConfig) -> Self {
        let client = Client::builder()
            .timeout(std::time::Duration::from_secs(config.timeout_seconds))
            .build()
            .expect("Failed to create HTTP client");

        Self { client, config }
    }

    /// Fetch the encoded polyline and distance for a stop sequence starting
    /// at the warehouse, optionally returning to it.
    pub async fn fetch_route_path(
        &self,
        warehouse: Coordinates,
        stops: &[Coordinates],
        return_to_warehouse: bool,
    ) -> Result<RoutePath> {
        anyhow::ensure!(!stops.is_empty(), "stops list cannot be empty");

        let request = build_route_request(warehouse, stops, return_to_warehouse);
        let url = format!("{}/directions/v2:computeRoutes", self.config.base_url);

        debug!("Requesting route path for {} stops", stops.len());

        let response = self
            .client
            .post(&url)
            .header("X-Goog-Api-Key", &self.config.api_key)
            .header(
                "X-Goog-FieldMask",
                "routes.polyline.encodedPolyline,routes.distanceMeters",
            )
            .json(&request)
            .send()
            .await
            .context("Failed to send route path request")?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            anyhow::bail!("Path service returned error {}: {}", status, body);
        }

        let parsed: ComputeRoutesResponse = response
            .json()
            .await
            .context("Failed to parse path service response")?;

        let route = parsed
            .routes
            .into_iter()
            .next()
            .context("Path service returned no routes")?;

        Ok(RoutePath {
            encoded_polyline: route.polyline.encoded_polyline,
            distance_km: route.distance_meters / 1000.0,
        })
    }
}

/// Build the computeRoutes request. The origin is always the warehouse;
/// when the route does not return, the final stop becomes the destination.
fn build_route_request(
    warehouse: Coordinates,
    stops: &[Coordinates],
    return_to_warehouse: bool,
) -> ComputeRoutesRequest {
    let origin = Waypoint::from(warehouse);
    let mut intermediates: Vec<Waypoint> = stops.iter().copied().map(Waypoint::from).collect();

    let destination = if return_to_warehouse {
        origin.clone()
    } else {
        // Non-empty guaranteed by the caller
        intermediates.pop().expect("stops list is non-empty")
    };

    ComputeRoutesRequest {
        origin,
        destination,
        intermediates,
        travel_mode: "DRIVE".to_string(),
        routing_preference: "TRAFFIC_AWARE".to_string(),
    }
}

// Path service API types

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
struct ComputeRoutesRequest {
    origin: Waypoint,
    destination: Waypoint,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    intermediates: Vec<Waypoint>,
    travel_mode: String,
    routing_preference: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
struct Waypoint {
    location: WaypointLocation,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
struct WaypointLocation {
    lat_lng: LatLng,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
struct LatLng {
    latitude: f64,
    longitude: f64,
}

impl From<Coordinates> for Waypoint {
    fn from(coords: Coordinates) -> Self {
        Self {
            location: WaypointLocation {
                lat_lng: LatLng {
                    latitude: coords.lat,
                    longitude: coords.lng,
                },
            },
        }
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
struct ComputeRoutesResponse {
    routes: Vec<ComputedRoute>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
struct ComputedRoute {
    polyline: ResponsePolyline,
    distance_meters: f64,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
struct ResponsePolyline {
    encoded_polyline: String,
}
