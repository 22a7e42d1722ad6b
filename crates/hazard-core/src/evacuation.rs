//! Batch evacuation routing from population zones to shelters.
//!
//! Each zone is routed to its nearest shelters independently; a failure for
//! one zone or shelter pair is recorded and never aborts the batch.

use serde::{Deserialize, Serialize};

use crate::error::{HazardError, Result};
use crate::graph::RoutingGraph;
use crate::models::{EvacuationZone, Shelter};
use crate::route_engine::{find_route, ConstraintMode, RouteOutcome, RoutePriority, RouteResult, SearchConfig};
use crate::spatial::{haversine_distance, validate_coordinate};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EvacuationConfig {
    /// Candidate shelters per zone, nearest first
    pub shelters_per_zone: usize,
    /// Routes kept per zone after ranking
    pub max_routes_per_zone: usize,
}

impl Default for EvacuationConfig {
    fn default() -> Self {
        Self {
            shelters_per_zone: 3,
            max_routes_per_zone: 2,
        }
    }
}

impl EvacuationConfig {
    pub fn validate(&self) -> Result<()> {
        if self.shelters_per_zone == 0 || self.max_routes_per_zone == 0 {
            return Err(HazardError::InvalidConfig(
                "shelters_per_zone and max_routes_per_zone must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct EvacuationRoute {
    pub shelter_id: String,
    /// Straight-line distance used to pick candidates
    pub shelter_distance_km: f64,
    pub route: RouteResult,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PairFailure {
    /// `None` when the zone itself could not be routed
    pub shelter_id: Option<String>,
    pub reason: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct ZoneEvacuation {
    pub zone_id: String,
    pub population: u64,
    /// Best first: safest, then quickest
    pub routes: Vec<EvacuationRoute>,
    pub failures: Vec<PairFailure>,
}

impl ZoneEvacuation {
    pub fn best(&self) -> Option<&EvacuationRoute> {
        self.routes.first()
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct EvacuationPlan {
    pub vehicle: String,
    pub snapshot_version: u64,
    pub priority: RoutePriority,
    pub mode: ConstraintMode,
    pub zones: Vec<ZoneEvacuation>,
}

impl EvacuationPlan {
    pub fn routed_zones(&self) -> usize {
        self.zones.iter().filter(|z| !z.routes.is_empty()).count()
    }

    /// Population with at least one route to a shelter.
    pub fn covered_population(&self) -> u64 {
        self.zones
            .iter()
            .filter(|z| !z.routes.is_empty())
            .map(|z| z.population)
            .sum()
    }
}

/// Route every zone to its `shelters_per_zone` nearest shelters and keep the
/// best `max_routes_per_zone` found routes.
pub fn plan_evacuation(
    graph: &RoutingGraph,
    search: &SearchConfig,
    config: &EvacuationConfig,
    zones: &[EvacuationZone],
    shelters: &[Shelter],
    priority: RoutePriority,
    mode: ConstraintMode,
) -> EvacuationPlan {
    let plans: Vec<ZoneEvacuation> = zones
        .iter()
        .map(|zone| plan_zone(graph, search, config, zone, shelters, priority, mode))
        .collect();

    let plan = EvacuationPlan {
        vehicle: graph.vehicle().name.clone(),
        snapshot_version: graph.snapshot_version(),
        priority,
        mode,
        zones: plans,
    };
    tracing::info!(
        "Evacuation plan: {}/{} zones routed, {} people covered",
        plan.routed_zones(),
        plan.zones.len(),
        plan.covered_population()
    );
    plan
}

fn plan_zone(
    graph: &RoutingGraph,
    search: &SearchConfig,
    config: &EvacuationConfig,
    zone: &EvacuationZone,
    shelters: &[Shelter],
    priority: RoutePriority,
    mode: ConstraintMode,
) -> ZoneEvacuation {
    let mut result = ZoneEvacuation {
        zone_id: zone.id.clone(),
        population: zone.population,
        routes: Vec::new(),
        failures: Vec::new(),
    };

    if let Err(err) = validate_coordinate(zone.latitude, zone.longitude) {
        result.failures.push(PairFailure {
            shelter_id: None,
            reason: err.to_string(),
        });
        return result;
    }
    if shelters.is_empty() {
        result.failures.push(PairFailure {
            shelter_id: None,
            reason: "no shelters available".to_string(),
        });
        return result;
    }

    let mut candidates: Vec<(&Shelter, f64)> = shelters
        .iter()
        .map(|s| {
            let km = haversine_distance(zone.latitude, zone.longitude, s.latitude, s.longitude) / 1000.0;
            (s, km)
        })
        .collect();
    candidates.sort_by(|a, b| a.1.total_cmp(&b.1).then_with(|| a.0.id.cmp(&b.0.id)));
    candidates.truncate(config.shelters_per_zone);

    for (shelter, distance_km) in candidates {
        let outcome = find_route(
            graph,
            search,
            (zone.latitude, zone.longitude),
            (shelter.latitude, shelter.longitude),
            priority,
            mode,
        );
        match outcome {
            Ok(RouteOutcome::Found(route)) => result.routes.push(EvacuationRoute {
                shelter_id: shelter.id.clone(),
                shelter_distance_km: distance_km,
                route,
            }),
            Ok(RouteOutcome::NoPath) => result.failures.push(PairFailure {
                shelter_id: Some(shelter.id.clone()),
                reason: HazardError::NoPathFound.to_string(),
            }),
            Ok(RouteOutcome::InvalidInput { detail }) => result.failures.push(PairFailure {
                shelter_id: Some(shelter.id.clone()),
                reason: detail,
            }),
            Err(err) => result.failures.push(PairFailure {
                shelter_id: Some(shelter.id.clone()),
                reason: err.to_string(),
            }),
        }
    }

    result.routes.sort_by(|a, b| {
        b.route
            .safety_score
            .total_cmp(&a.route.safety_score)
            .then_with(|| a.route.total_time_min.total_cmp(&b.route.total_time_min))
    });
    result.routes.truncate(config.max_routes_per_zone);

    if result.routes.is_empty() {
        tracing::warn!("No evacuation route for zone {}", zone.id);
    }
    result
}
