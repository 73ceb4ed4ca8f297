//! Route generation settings
//!
//! Not persisted as their own entity; they travel inside `jobs.payload`.

use serde::{Deserialize, Serialize};

use crate::defaults::DEFAULT_SERVICE_TIME_SECONDS;

/// Settings for one route-generation run
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RouteGenerationSettings {
    /// Number of vehicle routes to produce
    pub num_routes: usize,
    /// Cap on stops per route (mutually exclusive with max_boxes_per_route)
    #[serde(default)]
    pub max_stops_per_route: Option<usize>,
    /// Cap on food boxes per route (mutually exclusive with max_stops_per_route)
    #[serde(default)]
    pub max_boxes_per_route: Option<i64>,
    /// Whether vehicles return to the warehouse after the last stop
    #[serde(default)]
    pub return_to_warehouse: bool,
    /// Time spent unloading at each stop, in seconds
    #[serde(default = "default_service_time")]
    pub service_time_seconds: u64,
}

fn default_service_time() -> u64 {
    DEFAULT_SERVICE_TIME_SECONDS
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_settings_deserialize_with_defaults() {
        let settings: RouteGenerationSettings =
            serde_json::from_str(r#"{"numRoutes":3}"#).unwrap();
        assert_eq!(settings.num_routes, 3);
        assert_eq!(settings.max_stops_per_route, None);
        assert_eq!(settings.max_boxes_per_route, None);
        assert!(!settings.return_to_warehouse);
        assert_eq!(settings.service_time_seconds, DEFAULT_SERVICE_TIME_SECONDS);
    }

    #[test]
    fn test_settings_serialize_to_camel_case() {
        let settings = RouteGenerationSettings {
            num_routes: 2,
            max_stops_per_route: Some(5),
            max_boxes_per_route: None,
            return_to_warehouse: true,
            service_time_seconds: 300,
        };
        let json = serde_json::to_string(&settings).unwrap();
        assert!(json.contains("numRoutes"));
        assert!(json.contains("maxStopsPerRoute"));
        assert!(json.contains("returnToWarehouse"));
    }
}
