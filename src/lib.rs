//! MealRoute worker library
//!
//! Route generation for the MealRoute food-box delivery platform: clustering
//! and routing algorithms, the database-backed job queue, and the worker
//! loop that ties them together. The binary in `main.rs` wires these up;
//! the HTTP layer lives elsewhere and talks to the same database through
//! the query modules here.

pub mod cli;
pub mod config;
pub mod db;
pub mod defaults;
pub mod services;
pub mod types;
pub mod worker;
