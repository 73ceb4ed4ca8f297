//! Location database queries

use anyhow::Result;
use sqlx::PgPool;
use uuid::Uuid;

use crate::types::{Location, LocationGroup};

const LOCATION_COLUMNS: &str = "location_id, location_group_id, address, contact_name, \
     notes, latitude, longitude, num_boxes, geocoded_at, created_at, updated_at";

/// Get a location group by id
pub async fn get_group(pool: &PgPool, location_group_id: Uuid) -> Result<Option<LocationGroup>> {
    let group = sqlx::query_as::<_, LocationGroup>(
        "SELECT location_group_id, name, created_at, updated_at \
         FROM location_groups WHERE location_group_id = $1",
    )
    .bind(location_group_id)
    .fetch_optional(pool)
    .await?;

    Ok(group)
}

/// All locations of a group, oldest first
pub async fn list_for_group(pool: &PgPool, location_group_id: Uuid) -> Result<Vec<Location>> {
    let locations = sqlx::query_as::<_, Location>(&format!(
        "SELECT {LOCATION_COLUMNS} FROM locations \
         WHERE location_group_id = $1 ORDER BY created_at, location_id"
    ))
    .bind(location_group_id)
    .fetch_all(pool)
    .await?;

    Ok(locations)
}
