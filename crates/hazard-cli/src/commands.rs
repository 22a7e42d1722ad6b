//! Command implementations. Each returns a serializable result; the binary
//! decides how to print it.

use std::sync::Arc;

use anyhow::{anyhow, Context, Result};
use hazard_core::{
    plan_evacuation, ConstraintMode, EngineConfig, EvacuationPlan, EvacuationZone, HazardDetection,
    HazardRiskEngine, HazardSnapshot, PopulationUnit, RoadSegment, RouteOutcome, RoutePriority,
    RoutingGraph, RoutingGraphBuilder, SafeRouteSearch, Shelter, TrafficReport, VehicleProfile,
    WeatherSample,
};
use serde_json::Value;

use crate::cli::{AssessArgs, Command, EvacuateArgs, NetworkArgs, RouteArgs};
use crate::input::{read_json, read_optional, read_zones, LatLon};

/// Load inputs for `command`, run it, and return its JSON result.
pub fn run(command: &Command, config: &EngineConfig) -> Result<Value> {
    let value = match command {
        Command::Assess(args) => serde_json::to_value(run_assess(args, config)?)?,
        Command::Route(args) => serde_json::to_value(run_route(args, config)?)?,
        Command::Evacuate(args) => serde_json::to_value(run_evacuate(args, config)?)?,
    };
    Ok(value)
}

pub fn vehicle_profile(name: &str) -> Result<VehicleProfile> {
    VehicleProfile::named(name).ok_or_else(|| {
        anyhow!("unknown vehicle '{name}' (expected fire_engine, ambulance or civilian)")
    })
}

fn constraint_mode(strict: bool) -> ConstraintMode {
    if strict {
        ConstraintMode::Strict
    } else {
        ConstraintMode::Soft
    }
}

fn run_assess(args: &AssessArgs, config: &EngineConfig) -> Result<HazardSnapshot> {
    let detections: Vec<HazardDetection> = read_json(&args.detections)?;
    let weather: Vec<WeatherSample> = read_optional(args.weather.as_deref())?;
    let population: Vec<PopulationUnit> = read_optional(args.population.as_deref())?;
    assess(config, &detections, &weather, &population)
}

pub fn assess(
    config: &EngineConfig,
    detections: &[HazardDetection],
    weather: &[WeatherSample],
    population: &[PopulationUnit],
) -> Result<HazardSnapshot> {
    let mut engine = HazardRiskEngine::new(config.risk.clone()).context("invalid risk rules")?;
    let snapshot = engine.assess(detections, weather, population);
    tracing::info!(
        "Assessed {} detections into {} zones ({} skipped)",
        snapshot.detections.received,
        snapshot.zones.len(),
        snapshot.detections.skipped()
    );
    Ok(snapshot)
}

/// Everything needed to build a routing graph.
pub struct Network {
    pub roads: Vec<RoadSegment>,
    pub hazards: HazardSnapshot,
    pub traffic: Option<TrafficReport>,
    pub vehicle: VehicleProfile,
}

impl Network {
    fn load(args: &NetworkArgs) -> Result<Self> {
        let traffic = match &args.traffic {
            Some(path) => Some(read_json::<TrafficReport>(path)?),
            None => None,
        };
        Ok(Self {
            roads: read_json(&args.roads)?,
            hazards: read_zones(args.zones.as_deref())?,
            traffic,
            vehicle: vehicle_profile(&args.vehicle)?,
        })
    }

    pub fn build_graph(&self, config: &EngineConfig) -> Result<RoutingGraph> {
        let builder = RoutingGraphBuilder::new(config.graph.clone()).context("invalid graph config")?;
        let graph = builder
            .build_for_snapshot(&self.roads, &self.hazards, &self.vehicle, self.traffic.as_ref())
            .context("failed to build routing graph")?;
        tracing::info!(
            "Routing graph: {} nodes, {} edges, {} segments skipped",
            graph.nodes().len(),
            graph.edges().len(),
            graph.stats().skipped_segments
        );
        Ok(graph)
    }
}

fn run_route(args: &RouteArgs, config: &EngineConfig) -> Result<RouteOutcome> {
    let network = Network::load(&args.network)?;
    route(
        config,
        &network,
        args.from,
        args.to,
        args.priority,
        constraint_mode(args.network.strict),
    )
}

pub fn route(
    config: &EngineConfig,
    network: &Network,
    from: LatLon,
    to: LatLon,
    priority: RoutePriority,
    mode: ConstraintMode,
) -> Result<RouteOutcome> {
    let graph = Arc::new(network.build_graph(config)?);
    let mut search = SafeRouteSearch::with_graph(config.search.clone(), graph);
    let outcome = search.search(from.as_tuple(), to.as_tuple(), priority, mode);
    match &outcome {
        RouteOutcome::Found(route) => tracing::info!(
            "Found {} route from {} to {}: {:.2} km, {:.1} min, safety {:.2}",
            priority,
            from,
            to,
            route.total_distance_km,
            route.total_time_min,
            route.safety_score
        ),
        RouteOutcome::NoPath => tracing::info!("No {} route from {} to {}", priority, from, to),
        RouteOutcome::InvalidInput { detail } => tracing::warn!("Route request rejected: {}", detail),
    }
    Ok(outcome)
}

fn run_evacuate(args: &EvacuateArgs, config: &EngineConfig) -> Result<EvacuationPlan> {
    let network = Network::load(&args.network)?;
    let zones: Vec<EvacuationZone> = read_json(&args.evac_zones)?;
    let shelters: Vec<Shelter> = read_json(&args.shelters)?;
    evacuate(
        config,
        &network,
        &zones,
        &shelters,
        args.priority,
        constraint_mode(args.network.strict),
    )
}

pub fn evacuate(
    config: &EngineConfig,
    network: &Network,
    zones: &[EvacuationZone],
    shelters: &[Shelter],
    priority: RoutePriority,
    mode: ConstraintMode,
) -> Result<EvacuationPlan> {
    let graph = network.build_graph(config)?;
    Ok(plan_evacuation(
        &graph,
        &config.search,
        &config.evacuation,
        zones,
        shelters,
        priority,
        mode,
    ))
}
