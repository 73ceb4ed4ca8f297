//! Type definitions

pub mod job;
pub mod location;
pub mod route;
pub mod settings;

pub use job::*;
pub use location::*;
pub use route::*;
pub use settings::*;
