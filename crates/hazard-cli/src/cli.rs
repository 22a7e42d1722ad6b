use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};
use hazard_core::RoutePriority;

use crate::input::LatLon;

#[derive(Parser, Debug)]
#[command(author, version, about = "Hazard risk assessment and hazard-aware routing")]
pub struct Cli {
    /// Engine configuration file (JSON). Falls back to HAZARD_CONFIG.
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Pretty-print JSON output
    #[arg(long, global = true)]
    pub pretty: bool,

    /// Write logs to stderr as JSON lines
    #[arg(long, global = true)]
    pub log_json: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Score hazard detections into a snapshot of hazard zones
    Assess(AssessArgs),
    /// Find one route between two points
    Route(RouteArgs),
    /// Route evacuation zones to their nearest shelters
    Evacuate(EvacuateArgs),
}

#[derive(Args, Debug)]
pub struct AssessArgs {
    /// Hazard detections (JSON array)
    #[arg(long)]
    pub detections: PathBuf,

    /// Weather samples (JSON array)
    #[arg(long)]
    pub weather: Option<PathBuf>,

    /// Population units (JSON array)
    #[arg(long)]
    pub population: Option<PathBuf>,
}

/// Inputs shared by every command that builds a routing graph.
#[derive(Args, Debug)]
pub struct NetworkArgs {
    /// Road segments (JSON array)
    #[arg(long)]
    pub roads: PathBuf,

    /// Hazard snapshot or zone list produced by `assess`
    #[arg(long)]
    pub zones: Option<PathBuf>,

    /// Congestion per segment id (JSON object of 0..1 values)
    #[arg(long)]
    pub traffic: Option<PathBuf>,

    /// Vehicle profile: fire_engine, ambulance, civilian
    #[arg(long, default_value = "civilian")]
    pub vehicle: String,

    /// Never use segments that exceed the vehicle's limits
    #[arg(long)]
    pub strict: bool,
}

#[derive(Args, Debug)]
pub struct RouteArgs {
    #[command(flatten)]
    pub network: NetworkArgs,

    /// Origin as LAT,LON
    #[arg(long, allow_hyphen_values = true)]
    pub from: LatLon,

    /// Destination as LAT,LON
    #[arg(long, allow_hyphen_values = true)]
    pub to: LatLon,

    /// fastest or safest
    #[arg(long, default_value = "fastest")]
    pub priority: RoutePriority,
}

#[derive(Args, Debug)]
pub struct EvacuateArgs {
    #[command(flatten)]
    pub network: NetworkArgs,

    /// Evacuation zones (JSON array)
    #[arg(long)]
    pub evac_zones: PathBuf,

    /// Shelters (JSON array)
    #[arg(long)]
    pub shelters: PathBuf,

    /// fastest or safest
    #[arg(long, default_value = "safest")]
    pub priority: RoutePriority,
}
