//! Configuration management

use std::time::Duration;

use anyhow::{Context, Result};

use crate::defaults::{
    DEFAULT_JOB_TIMEOUT_MINUTES, DEFAULT_POLL_INTERVAL_SECS, DEFAULT_POLYLINE_TTL_DAYS,
};
use crate::types::Coordinates;

/// Fleet-optimization service settings. All five values are required to
/// enable the external optimizer; otherwise the worker falls back to the
/// local sweep heuristic.
#[derive(Debug, Clone)]
pub struct FleetApiConfig {
    pub base_url: String,
    pub project_id: String,
    pub token_url: String,
    pub client_id: String,
    pub client_secret: String,
}

/// Path service settings (cached route polylines). Optional; without it,
/// route lengths fall back to the road estimate and no paths are cached.
#[derive(Debug, Clone)]
pub struct PathApiConfig {
    pub base_url: String,
    pub api_key: String,
}

/// Application configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// PostgreSQL connection string
    pub database_url: String,

    /// Fixed start/end coordinate for all routes
    pub warehouse: Coordinates,

    /// External fleet-optimization service (optional)
    pub fleet_api: Option<FleetApiConfig>,

    /// Path service for cached polylines (optional)
    pub path_api: Option<PathApiConfig>,

    /// Sleep between queue polls
    pub poll_interval: Duration,

    /// Wall-clock bound on one job's route generation
    pub job_timeout: Duration,

    /// How long cached paths stay valid
    pub polyline_ttl_days: i64,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        // Load .env file if present
        dotenvy::dotenv().ok();

        let database_url = std::env::var("DATABASE_URL")
            .context("DATABASE_URL must be set")?;

        let warehouse_lat: f64 = std::env::var("WAREHOUSE_LAT")
            .context("WAREHOUSE_LAT must be set")?
            .parse()
            .context("WAREHOUSE_LAT must be a number")?;
        let warehouse_lon: f64 = std::env::var("WAREHOUSE_LON")
            .context("WAREHOUSE_LON must be set")?
            .parse()
            .context("WAREHOUSE_LON must be a number")?;
        let warehouse = validate_warehouse(warehouse_lat, warehouse_lon)?;

        let fleet_api = fleet_api_from_env()?;
        let path_api = path_api_from_env()?;

        let poll_interval = Duration::from_secs(parsed_var_or(
            "POLL_INTERVAL_SECS",
            DEFAULT_POLL_INTERVAL_SECS,
        )?);
        let job_timeout = Duration::from_secs(
            parsed_var_or("JOB_TIMEOUT_MINUTES", DEFAULT_JOB_TIMEOUT_MINUTES)? * 60,
        );
        let polyline_ttl_days =
            parsed_var_or("POLYLINE_TTL_DAYS", DEFAULT_POLYLINE_TTL_DAYS)?;

        Ok(Self {
            database_url,
            warehouse,
            fleet_api,
            path_api,
            poll_interval,
            job_timeout,
            polyline_ttl_days,
        })
    }
}

fn validate_warehouse(lat: f64, lng: f64) -> Result<Coordinates> {
    if !(-90.0..=90.0).contains(&lat) {
        anyhow::bail!("WAREHOUSE_LAT must be within [-90, 90], got {lat}");
    }
    if !(-180.0..=180.0).contains(&lng) {
        anyhow::bail!("WAREHOUSE_LON must be within [-180, 180], got {lng}");
    }
    Ok(Coordinates { lat, lng })
}

/// The fleet quintet is all-or-nothing: a partially configured optimizer is
/// a deployment mistake, not a fallback case.
fn fleet_api_from_env() -> Result<Option<FleetApiConfig>> {
    const VARS: [&str; 5] = [
        "FLEET_API_URL",
        "FLEET_PROJECT_ID",
        "FLEET_TOKEN_URL",
        "FLEET_CLIENT_ID",
        "FLEET_CLIENT_SECRET",
    ];
    let values: Vec<Option<String>> = VARS.iter().map(|name| optional_var(name)).collect();

    if values.iter().all(Option::is_none) {
        return Ok(None);
    }
    if let Some(missing) = VARS
        .iter()
        .zip(&values)
        .find(|(_, value)| value.is_none())
        .map(|(name, _)| name)
    {
        anyhow::bail!(
            "fleet optimization is partially configured: {missing} is missing \
             (set all of {VARS:?} or none)"
        );
    }

    let mut values = values.into_iter().flatten();
    Ok(Some(FleetApiConfig {
        base_url: values.next().expect("checked above"),
        project_id: values.next().expect("checked above"),
        token_url: values.next().expect("checked above"),
        client_id: values.next().expect("checked above"),
        client_secret: values.next().expect("checked above"),
    }))
}

fn path_api_from_env() -> Result<Option<PathApiConfig>> {
    match (optional_var("PATHS_API_URL"), optional_var("PATHS_API_KEY")) {
        (Some(base_url), Some(api_key)) => Ok(Some(PathApiConfig { base_url, api_key })),
        (None, None) => Ok(None),
        _ => anyhow::bail!(
            "path service is partially configured: set both PATHS_API_URL and \
             PATHS_API_KEY or neither"
        ),
    }
}

fn optional_var(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|value| !value.is_empty())
}

fn parsed_var_or<T: std::str::FromStr>(name: &str, default: T) -> Result<T>
where
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match optional_var(name) {
        Some(value) => value
            .parse()
            .with_context(|| format!("{name} has an invalid value")),
        None => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_warehouse_accepts_valid_coordinates() {
        let coords = validate_warehouse(43.65, -79.38).unwrap();
        assert!((coords.lat - 43.65).abs() < f64::EPSILON);
        assert!((coords.lng - -79.38).abs() < f64::EPSILON);
    }

    #[test]
    fn test_validate_warehouse_rejects_out_of_range_latitude() {
        assert!(validate_warehouse(91.0, 0.0).is_err());
        assert!(validate_warehouse(-91.0, 0.0).is_err());
    }

    #[test]
    fn test_validate_warehouse_rejects_out_of_range_longitude() {
        assert!(validate_warehouse(0.0, 181.0).is_err());
        assert!(validate_warehouse(0.0, -181.0).is_err());
    }

    #[test]
    #[ignore] // requires --test-threads=1 due to env var race
    fn test_fleet_api_none_when_unset() {
        for name in [
            "FLEET_API_URL",
            "FLEET_PROJECT_ID",
            "FLEET_TOKEN_URL",
            "FLEET_CLIENT_ID",
            "FLEET_CLIENT_SECRET",
        ] {
            std::env::remove_var(name);
        }
        assert!(fleet_api_from_env().unwrap().is_none());
    }

    #[test]
    #[ignore] // requires --test-threads=1 due to env var race
    fn test_fleet_api_partial_configuration_is_an_error() {
        std::env::set_var("FLEET_API_URL", "https://fleet.example.com");
        for name in [
            "FLEET_PROJECT_ID",
            "FLEET_TOKEN_URL",
            "FLEET_CLIENT_ID",
            "FLEET_CLIENT_SECRET",
        ] {
            std::env::remove_var(name);
        }

        let err = fleet_api_from_env().unwrap_err();
        assert!(err.to_string().contains("partially configured"));

        std::env::remove_var("FLEET_API_URL");
    }

    #[test]
    #[ignore] // requires --test-threads=1 due to env var race
    fn test_path_api_requires_both_values() {
        std::env::set_var("PATHS_API_URL", "https://paths.example.com");
        std::env::remove_var("PATHS_API_KEY");

        assert!(path_api_from_env().is_err());

        std::env::set_var("PATHS_API_KEY", "key");
        let config = path_api_from_env().unwrap().unwrap();
        assert_eq!(config.base_url, "https://paths.example.com");

        std::env::remove_var("PATHS_API_URL");
        std::env::remove_var("PATHS_API_KEY");
    }
}
