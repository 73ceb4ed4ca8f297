//! Fleet-optimization service adapter
//!
//! Builds an `optimizeTours`-style request (one vehicle per route, one
//! forced pickup per vehicle at the warehouse, one delivery per location),
//! sends it to the remote optimizer, and maps the per-vehicle visit lists
//! back onto the input locations.
//!
//! Shipment indices `0..num_routes` are the forced pickups; a delivery's
//! location is recovered as `shipment_index - num_routes`. The forced
//! pickups carry zero load demand: they exist only so the optimizer uses
//! every vehicle instead of leaving some idle.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::{debug, warn};

use crate::services::error::GenerationError;
use crate::types::{Coordinates, Location, RouteGenerationSettings};

use super::RoutingAlgorithm;

/// Tokens are refreshed this long before their reported expiry.
const TOKEN_EXPIRY_MARGIN_SECS: i64 = 30;

/// Fleet-optimization client configuration
#[derive(Debug, Clone)]
pub struct FleetRoutingConfig {
    /// Base URL of the optimization service
    pub base_url: String,
    /// Project the optimizeTours call is billed against
    pub project_id: String,
    /// OAuth token endpoint (client-credentials grant)
    pub token_url: String,
    pub client_id: String,
    pub client_secret: String,
    /// Per-request timeout in seconds
    pub timeout_seconds: u64,
}

/// A cached bearer token with its expiry
struct CachedToken {
    access_token: String,
    expires_at: DateTime<Utc>,
}

impl CachedToken {
    fn is_valid(&self) -> bool {
        self.expires_at - chrono::Duration::seconds(TOKEN_EXPIRY_MARGIN_SECS) > Utc::now()
    }
}

/// Routing via the external fleet-optimization service.
pub struct FleetRouting {
    client: Client,
    config: FleetRoutingConfig,
    // Routing calls can run on parallel worker tasks; the cached token is
    // shared per process and refreshed under this lock.
    token: Mutex<Option<CachedToken>>,
}

impl FleetRouting {
    pub fn new(config: FleetRoutingConfig) -> Self {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_seconds))
            .build()
            .expect("Failed to create HTTP client");

        Self {
            client,
            config,
            token: Mutex::new(None),
        }
    }

    /// Bearer token for the optimization service: fetched lazily, cached,
    /// and refreshed only when expired.
    async fn bearer_token(&self) -> Result<String, GenerationError> {
        let mut cached = self.token.lock().await;

        if let Some(token) = cached.as_ref() {
            if token.is_valid() {
                return Ok(token.access_token.clone());
            }
        }

        debug!("Fetching fleet routing access token");
        let response = self
            .client
            .post(&self.config.token_url)
            .form(&[
                ("grant_type", "client_credentials"),
                ("client_id", self.config.client_id.as_str()),
                ("client_secret", self.config.client_secret.as_str()),
            ])
            .send()
            .await
            .map_err(|e| GenerationError::Service(format!("token request failed: {e}")))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(GenerationError::Service(format!(
                "token endpoint returned {status}: {body}"
            )));
        }

        let token: TokenResponse = response
            .json()
            .await
            .map_err(|e| GenerationError::Service(format!("malformed token response: {e}")))?;

        let access_token = token.access_token.clone();
        *cached = Some(CachedToken {
            access_token: token.access_token,
            expires_at: Utc::now() + chrono::Duration::seconds(token.expires_in),
        });
        Ok(access_token)
    }
}

#[async_trait]
impl RoutingAlgorithm for FleetRouting {
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

        let request = build_payload(locations, warehouse, settings)?;
        let token = self.bearer_token().await?;
        let url = format!(
            "{}/v1/projects/{}:optimizeTours",
            self.config.base_url, self.config.project_id
        );

        debug!(
            "Requesting fleet optimization for {} locations over {} routes",
            locations.len(),
            settings.num_routes
        );

        let call = async {
            let response = self
                .client
                .post(&url)
                .bearer_auth(&token)
                .json(&request)
                .send()
                .await
                .map_err(|e| {
                    GenerationError::Service(format!("fleet routing request failed: {e}"))
                })?;

            let status = response.status();
            if !status.is_success() {
                let body = response.text().await.unwrap_or_default();
                return Err(GenerationError::Service(format!(
                    "fleet routing returned {status}: {body}"
                )));
            }

            response.json::<OptimizeToursResponse>().await.map_err(|e| {
                GenerationError::Service(format!("malformed fleet routing response: {e}"))
            })
        };

        let response = match timeout {
            Some(limit) => tokio::time::timeout(limit, call)
                .await
                .map_err(|_| GenerationError::timeout("fleet routing", limit))??,
            None => call.await?,
        };

        Ok(parse_routes(&response, locations, settings.num_routes))
    }
}

/// Build the optimizeTours payload.
fn build_payload(
    locations: &[Location],
    warehouse: Coordinates,
    settings: &RouteGenerationSettings,
) -> Result<OptimizeToursRequest, GenerationError> {
    let warehouse = LatLng {
        latitude: warehouse.lat,
        longitude: warehouse.lng,
    };

    let vehicles = (0..settings.num_routes)
        .map(|i| Vehicle {
            display_name: format!("driver_{i}"),
            start_location: warehouse.clone(),
            end_location: settings.return_to_warehouse.then(|| warehouse.clone()),
            load_limits: settings.max_stops_per_route.map(|cap| LoadLimits {
                load: LoadLimit {
                    max_load: cap.to_string(),
                },
            }),
        })
        .collect();

    // One mandatory zero-demand pickup per vehicle, so no driver is idle.
    let forced_pickups = (0..settings.num_routes).map(|i| Shipment {
        display_name: format!("initial_load_driver_{i}"),
        pickups: vec![VisitRequest {
            arrival_location: warehouse.clone(),
            duration: None,
            load_demands: None,
        }],
        deliveries: Vec::new(),
        allowed_vehicle_indices: Some(vec![i]),
    });

    let mut deliveries = Vec::with_capacity(locations.len());
    for (i, location) in locations.iter().enumerate() {
        let coords = location.coordinates()?;
        deliveries.push(Shipment {
            display_name: format!("ship_{i}"),
            pickups: Vec::new(),
            deliveries: vec![VisitRequest {
                arrival_location: LatLng {
                    latitude: coords.lat,
                    longitude: coords.lng,
                },
                duration: Some(format!("{}s", settings.service_time_seconds)),
                load_demands: Some(LoadDemands {
                    load: LoadAmount {
                        amount: "1".to_string(),
                    },
                }),
            }],
            allowed_vehicle_indices: None,
        });
    }

    Ok(OptimizeToursRequest {
        model: Model {
            vehicles,
            shipments: forced_pickups.chain(deliveries).collect(),
        },
    })
}

/// Map the per-vehicle visit lists back onto the input locations.
///
/// Pickup visits are skipped; delivery shipment indices are offset by
/// `num_routes` (the forced pickups occupy indices `0..num_routes`). A
/// vehicle index outside the expected range is logged and skipped; the
/// remaining routes are still useful.
fn parse_routes(
    response: &OptimizeToursResponse,
    locations: &[Location],
    num_routes: usize,
) -> Vec<Vec<Location>> {
    let mut routes: Vec<Vec<Location>> = vec![Vec::new(); num_routes];

    for vehicle_route in &response.routes {
        if vehicle_route.vehicle_index >= num_routes {
            warn!(
                "Fleet routing returned vehicle index {} for {} routes; skipping",
                vehicle_route.vehicle_index, num_routes
            );
            continue;
        }

        for visit in &vehicle_route.visits {
            if visit.is_pickup {
                continue;
            }
            match visit.shipment_index.checked_sub(num_routes) {
                Some(location_index) if location_index < locations.len() => {
                    routes[vehicle_route.vehicle_index].push(locations[location_index].clone());
                }
                _ => {
                    warn!(
                        "Fleet routing returned shipment index {} outside the delivery \
                         range; skipping visit",
                        visit.shipment_index
                    );
                }
            }
        }
    }

    routes
}

// Fleet optimization API types

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    expires_in: i64,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
struct LatLng {
    latitude: f64,
    longitude: f64,
}

#[derive(Debug, Serialize)]
struct OptimizeToursRequest {
    model: Model,
}

#[derive(Debug, Serialize)]
struct Model {
    vehicles: Vec<Vehicle>,
    shipments: Vec<Shipment>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct Vehicle {
    display_name: String,
    start_location: LatLng,
    #[serde(skip_serializing_if = "Option::is_none")]
    end_location: Option<LatLng>,
    #[serde(skip_serializing_if = "Option::is_none")]
    load_limits: Option<LoadLimits>,
}

#[derive(Debug, Serialize)]
struct LoadLimits {
    load: LoadLimit,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct LoadLimit {
    max_load: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct Shipment {
    display_name: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pickups: Vec<VisitRequest>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    deliveries: Vec<VisitRequest>,
    #[serde(skip_serializing_if = "Option::is_none")]
    allowed_vehicle_indices: Option<Vec<usize>>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct VisitRequest {
    arrival_location: LatLng,
    #[serde(skip_serializing_if = "Option::is_none")]
    duration: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    load_demands: Option<LoadDemands>,
}

#[derive(Debug, Serialize)]
struct LoadDemands {
    load: LoadAmount,
}

#[derive(Debug, Serialize)]
struct LoadAmount {
    amount: String,
}

// The optimizer omits zero/default-valued fields, so every response field
// needs a default.

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
struct OptimizeToursResponse {
    routes: Vec<VehicleRoute>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
struct VehicleRoute {
    vehicle_index: usize,
    visits: Vec<Visit>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
struct Visit {
    shipment_index: usize,
    is_pickup: bool,
}
