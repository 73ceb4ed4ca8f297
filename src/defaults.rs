use std::time::Duration;

/// Unloading time per delivery stop
pub const DEFAULT_SERVICE_TIME_SECONDS: u64 = 600;

/// Sleep between queue polls when no job is eligible
pub const DEFAULT_POLL_INTERVAL_SECS: u64 = 5;

/// Wall-clock bound on one job's route generation
pub const DEFAULT_JOB_TIMEOUT_MINUTES: u64 = 30;

/// How long cached route paths stay valid
pub const DEFAULT_POLYLINE_TTL_DAYS: i64 = 30;

/// Timeout for outbound HTTP calls (fleet optimizer, path service)
pub const DEFAULT_HTTP_TIMEOUT_SECS: u64 = 60;

/// Expired cached paths are refreshed once a day
pub const PATH_REFRESH_INTERVAL: Duration = Duration::from_secs(24 * 60 * 60);
