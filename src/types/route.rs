//! Generated route types
//!
//! Routes are immutable once created; a generation run replaces a route
//! group wholesale instead of editing routes in place.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// A batch of routes produced by one generation run
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct RouteGroup {
    pub route_group_id: Uuid,
    pub location_group_id: Option<Uuid>,
    pub name: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// One vehicle route
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Route {
    pub route_id: Uuid,
    pub route_group_id: Uuid,
    pub name: String,
    /// Total length in km, non-negative
    pub length_km: f64,
    /// Whether this route ends back at the warehouse (recorded so cached
    /// paths can be refreshed with the same shape later)
    pub returns_to_warehouse: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A stop within a route. `stop_number` is 1-based and contiguous per route.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct RouteStop {
    pub route_stop_id: Uuid,
    pub route_id: Uuid,
    pub location_id: Uuid,
    pub stop_number: i32,
}

/// Cached encoded path for a route, refreshed when `expires_at` passes
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Polyline {
    pub polyline_id: Uuid,
    pub route_id: Uuid,
    pub encoded_polyline: String,
    pub expires_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_route_stop_serializes_to_camel_case() {
        let stop = RouteStop {
            route_stop_id: Uuid::nil(),
            route_id: Uuid::nil(),
            location_id: Uuid::nil(),
            stop_number: 1,
        };
        let json = serde_json::to_string(&stop).unwrap();
        assert!(json.contains("stopNumber"));
        assert!(json.contains("routeStopId"));
    }
}
