//! Scheduled maintenance: cached-path refresh
//!
//! Runs daily from the scheduler. Expired polylines are re-fetched from the
//! path service with the same stop sequence and route shape; rows that can
//! no longer be refreshed (no path service configured, stops missing
//! coordinates, fetch failure) are deleted so a stale path is never served.

use std::sync::Arc;

use anyhow::Result;
use chrono::Utc;
use sqlx::PgPool;
use tracing::{info, warn};

use uuid::Uuid;

use crate::db::queries;
use crate::services::paths::PathClient;
use crate::types::Coordinates;

/// Outcome counts of one refresh pass
#[derive(Debug, Default, PartialEq, Eq)]
pub struct PathRefreshReport {
    pub refreshed: usize,
    pub deleted: usize,
}

/// Refresh every expired cached path.
pub async fn refresh_expired_paths(
    pool: &PgPool,
    paths: Option<&Arc<PathClient>>,
    warehouse: Coordinates,
    ttl_days: i64,
) -> Result<PathRefreshReport> {
    let expired = queries::route::list_expired_polylines(pool).await?;
    if expired.is_empty() {
        info!("No cached paths need refreshing");
        return Ok(PathRefreshReport::default());
    }

    info!("Found {} expired cached paths", expired.len());
    let mut report = PathRefreshReport::default();

    for polyline in expired {
        let refreshed = match paths {
            Some(client) => {
                refresh_one(pool, client, warehouse, polyline.route_id, ttl_days)
                    .await
                    .map(|encoded| (polyline.polyline_id, encoded))
            }
            None => Err(anyhow::anyhow!("no path service configured")),
        };

        match refreshed {
            Ok((polyline_id, (encoded, expires_at))) => {
                queries::route::update_polyline(pool, polyline_id, &encoded, Some(expires_at))
                    .await?;
                report.refreshed += 1;
            }
            Err(e) => {
                warn!(
                    "Dropping cached path for route {}: {e:#}",
                    polyline.route_id
                );
                queries::route::delete_polyline(pool, polyline.polyline_id).await?;
                report.deleted += 1;
            }
        }
    }

    info!(
        "Cached path refresh complete: {} refreshed, {} dropped",
        report.refreshed, report.deleted
    );
    Ok(report)
}

async fn refresh_one(
    pool: &PgPool,
    client: &PathClient,
    warehouse: Coordinates,
    route_id: Uuid,
    ttl_days: i64,
) -> Result<(String, chrono::DateTime<Utc>)> {
    let route = queries::route::get_route(pool, route_id)
        .await?
        .ok_or_else(|| anyhow::anyhow!("route no longer exists"))?;

    let points = queries::route::route_stop_points(pool, route_id).await?;
    anyhow::ensure!(!points.is_empty(), "route has no stops");

    let mut stops = Vec::with_capacity(points.len());
    for (lat, lng) in points {
        match (lat, lng) {
            (Some(lat), Some(lng)) => stops.push(Coordinates { lat, lng }),
            _ => anyhow::bail!("route stop is missing coordinates"),
        }
    }

    let path = client
        .fetch_route_path(warehouse, &stops, route.returns_to_warehouse)
        .await?;

    Ok((
        path.encoded_polyline,
        Utc::now() + chrono::Duration::days(ttl_days),
    ))
}

// ==========================================================================
// Integration tests: need a live PostgreSQL (set DATABASE_URL)
// ==========================================================================

#[cfg(test)]
mod tests {
    use super::*;

    async fn test_pool() -> PgPool {
        let url = std::env::var("DATABASE_URL").expect("DATABASE_URL must be set for DB tests");
        let pool = crate::db::create_pool(&url).await.unwrap();
        crate::db::run_migrations(&pool).await.unwrap();
        pool
    }

    #[tokio::test]
    #[ignore = "Requires PostgreSQL"]
    async fn test_expired_path_without_client_is_dropped() {
        let pool = test_pool().await;

        let group_id = Uuid::new_v4();
        sqlx::query("INSERT INTO location_groups (location_group_id, name) VALUES ($1, 'm')")
            .bind(group_id)
            .execute(&pool)
            .await
            .unwrap();
        let group = queries::route::insert_route_group(&pool, group_id, "test")
            .await
            .unwrap();

        let route = queries::route::insert_route(&pool, group.route_group_id, "Route 1", 1.0, false)
            .await
            .unwrap();
        let polyline = queries::route::insert_polyline(
            &pool,
            route.route_id,
            "stale",
            Some(Utc::now() - chrono::Duration::days(1)),
        )
        .await
        .unwrap();

        let report = refresh_expired_paths(
            &pool,
            None,
            Coordinates { lat: 43.0, lng: -79.0 },
            30,
        )
        .await
        .unwrap();

        assert!(report.deleted >= 1);

        let remaining: Option<(Uuid,)> =
            sqlx::query_as("SELECT polyline_id FROM polylines WHERE polyline_id = $1")
                .bind(polyline.polyline_id)
                .fetch_optional(&pool)
                .await
                .unwrap();
        assert!(remaining.is_none(), "stale cached path must be removed");
    }
}
