//! Routing algorithms
//!
//! A routing algorithm turns an unordered set of delivery locations into
//! `num_routes` ordered visiting sequences, all starting (and optionally
//! ending) at the warehouse. Implementations do not touch the database.

mod fleet;
mod sweep_routes;

pub use fleet::{FleetRouting, FleetRoutingConfig};
pub use sweep_routes::SweepRouting;

use std::time::Duration;

use async_trait::async_trait;

use crate::services::error::GenerationError;
use crate::types::{Coordinates, Location, RouteGenerationSettings};

/// Contract shared by all routing strategies.
///
/// Implementations may call external APIs or run long computations, so the
/// contract is async with an optional wall-clock timeout; exceeding it must
/// surface as [`GenerationError::Timeout`], never as an indefinite block.
#[async_trait]
pub trait RoutingAlgorithm: Send + Sync {
    async fn generate_routes(
        &self,
        locations: &[Location],
        warehouse: Coordinates,
        settings: &RouteGenerationSettings,
        timeout: Option<Duration>,
    ) -> Result<Vec<Vec<Location>>, GenerationError>;
}
