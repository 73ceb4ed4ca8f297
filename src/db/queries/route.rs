//! Route database queries

use anyhow::Result;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use crate::types::{Polyline, Route, RouteGroup, RouteStop};

/// Create a route group for one generation run
pub async fn insert_route_group(
    pool: &PgPool,
    location_group_id: Uuid,
    name: &str,
) -> Result<RouteGroup> {
    let group = sqlx::query_as::<_, RouteGroup>(
        "INSERT INTO route_groups (route_group_id, location_group_id, name) \
         VALUES ($1, $2, $3) \
         RETURNING route_group_id, location_group_id, name, created_at, updated_at",
    )
    .bind(Uuid::new_v4())
    .bind(location_group_id)
    .bind(name)
    .fetch_one(pool)
    .await?;

    Ok(group)
}

/// Insert a route
pub async fn insert_route(
    pool: &PgPool,
    route_group_id: Uuid,
    name: &str,
    length_km: f64,
    returns_to_warehouse: bool,
) -> Result<Route> {
    let route = sqlx::query_as::<_, Route>(
        "INSERT INTO routes (route_id, route_group_id, name, length_km, returns_to_warehouse) \
         VALUES ($1, $2, $3, $4, $5) \
         RETURNING route_id, route_group_id, name, length_km, returns_to_warehouse, \
                   created_at, updated_at",
    )
    .bind(Uuid::new_v4())
    .bind(route_group_id)
    .bind(name)
    .bind(length_km)
    .bind(returns_to_warehouse)
    .fetch_one(pool)
    .await?;

    Ok(route)
}

/// Insert a route stop. Stop numbers are 1-based and contiguous per route;
/// the UNIQUE(route_id, stop_number) constraint backs that invariant.
pub async fn insert_route_stop(
    pool: &PgPool,
    route_id: Uuid,
    location_id: Uuid,
    stop_number: i32,
) -> Result<RouteStop> {
    let stop = sqlx::query_as::<_, RouteStop>(
        "INSERT INTO route_stops (route_stop_id, route_id, location_id, stop_number) \
         VALUES ($1, $2, $3, $4) \
         RETURNING route_stop_id, route_id, location_id, stop_number",
    )
    .bind(Uuid::new_v4())
    .bind(route_id)
    .bind(location_id)
    .bind(stop_number)
    .fetch_one(pool)
    .await?;

    Ok(stop)
}

/// Get a route by id
pub async fn get_route(pool: &PgPool, route_id: Uuid) -> Result<Option<Route>> {
    let route = sqlx::query_as::<_, Route>(
        "SELECT route_id, route_group_id, name, length_km, returns_to_warehouse, \
                created_at, updated_at \
         FROM routes WHERE route_id = $1",
    )
    .bind(route_id)
    .fetch_optional(pool)
    .await?;

    Ok(route)
}

/// Ordered (latitude, longitude) pairs of a route's stops
pub async fn route_stop_points(
    pool: &PgPool,
    route_id: Uuid,
) -> Result<Vec<(Option<f64>, Option<f64>)>> {
    let points: Vec<(Option<f64>, Option<f64>)> = sqlx::query_as(
        "SELECT l.latitude, l.longitude \
         FROM route_stops rs \
         JOIN locations l ON l.location_id = rs.location_id \
         WHERE rs.route_id = $1 ORDER BY rs.stop_number",
    )
    .bind(route_id)
    .fetch_all(pool)
    .await?;

    Ok(points)
}

/// Cache an encoded path for a route
pub async fn insert_polyline(
    pool: &PgPool,
    route_id: Uuid,
    encoded_polyline: &str,
    expires_at: Option<DateTime<Utc>>,
) -> Result<Polyline> {
    let polyline = sqlx::query_as::<_, Polyline>(
        "INSERT INTO polylines (polyline_id, route_id, encoded_polyline, expires_at) \
         VALUES ($1, $2, $3, $4) \
         RETURNING polyline_id, route_id, encoded_polyline, expires_at, created_at, updated_at",
    )
    .bind(Uuid::new_v4())
    .bind(route_id)
    .bind(encoded_polyline)
    .bind(expires_at)
    .fetch_one(pool)
    .await?;

    Ok(polyline)
}

/// Replace a cached path and push its expiry out
pub async fn update_polyline(
    pool: &PgPool,
    polyline_id: Uuid,
    encoded_polyline: &str,
    expires_at: Option<DateTime<Utc>>,
) -> Result<()> {
    sqlx::query(
        "UPDATE polylines SET encoded_polyline = $2, expires_at = $3, updated_at = NOW() \
         WHERE polyline_id = $1",
    )
    .bind(polyline_id)
    .bind(encoded_polyline)
    .bind(expires_at)
    .execute(pool)
    .await?;

    Ok(())
}

/// Drop a cached path (a stale cache row must not be served)
pub async fn delete_polyline(pool: &PgPool, polyline_id: Uuid) -> Result<()> {
    sqlx::query("DELETE FROM polylines WHERE polyline_id = $1")
        .bind(polyline_id)
        .execute(pool)
        .await?;

    Ok(())
}

/// Cached paths whose expiry has passed
pub async fn list_expired_polylines(pool: &PgPool) -> Result<Vec<Polyline>> {
    let polylines = sqlx::query_as::<_, Polyline>(
        "SELECT polyline_id, route_id, encoded_polyline, expires_at, created_at, updated_at \
         FROM polylines WHERE expires_at IS NOT NULL AND expires_at < NOW() \
         ORDER BY expires_at",
    )
    .fetch_all(pool)
    .await?;

    Ok(polylines)
}
