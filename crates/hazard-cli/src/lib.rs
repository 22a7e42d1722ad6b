//! Hazard CLI - operator front end for the hazard engine.
//!
//! Loads JSON inputs from disk, runs one engine operation, and returns the
//! result as JSON:
//! - assess: detections (+ weather, population) into a hazard snapshot
//! - route: one hazard-aware route between two points
//! - evacuate: zone-to-shelter evacuation plan

pub mod cli;
pub mod commands;
pub mod config;
pub mod input;

pub use cli::{Cli, Command};
pub use input::LatLon;
