//! Database queries

pub mod job;
pub mod location;
pub mod route;
