//! Delivery location types

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

use crate::services::error::GenerationError;

/// Coordinates
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Coordinates {
    pub lat: f64,
    pub lng: f64,
}

/// A named group of delivery locations (the unit route generation runs over)
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct LocationGroup {
    pub location_group_id: Uuid,
    pub name: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A delivery stop (charity food-drop location)
///
/// Latitude/longitude are nullable in storage because locations may be
/// imported before geocoding. Clustering and routing require both; a NULL
/// coordinate is a data-integrity error, never silently skipped.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Location {
    pub location_id: Uuid,
    pub location_group_id: Option<Uuid>,
    pub address: String,
    pub contact_name: String,
    pub notes: String,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    /// Number of food boxes this stop receives
    pub num_boxes: i32,
    pub geocoded_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Location {
    /// Both coordinates, or the matching missing-coordinate error.
    pub fn coordinates(&self) -> Result<Coordinates, GenerationError> {
        let lat = self
            .latitude
            .ok_or(GenerationError::MissingLatitude(self.location_id))?;
        let lng = self
            .longitude
            .ok_or(GenerationError::MissingLongitude(self.location_id))?;
        Ok(Coordinates { lat, lng })
    }
}

/// Test factory shared by clustering/routing test modules.
#[cfg(test)]
pub(crate) fn test_location(lat: f64, lng: f64, num_boxes: i32) -> Location {
    Location {
        location_id: Uuid::new_v4(),
        location_group_id: None,
        address: "123 Test St".to_string(),
        contact_name: "Test Contact".to_string(),
        notes: String::new(),
        latitude: Some(lat),
        longitude: Some(lng),
        num_boxes,
        geocoded_at: None,
        created_at: Utc::now(),
        updated_at: Utc::now(),
    }
}
