pub mod cache;
pub mod cells;
pub mod config;
pub mod error;
pub mod evacuation;
pub mod graph;
pub mod hazard;
pub mod models;
pub mod route_engine;
pub mod rules;
pub mod spatial;

pub use cache::{CacheConfig, RouteCache, RouteKey};
pub use cells::SpatialIndexer;
pub use config::EngineConfig;
pub use error::{HazardError, Result};
pub use evacuation::{
    plan_evacuation, EvacuationConfig, EvacuationPlan, EvacuationRoute, PairFailure, ZoneEvacuation,
};
pub use graph::{GraphConfig, GraphEdge, HazardFootprint, RoutingGraph, RoutingGraphBuilder};
pub use hazard::{BatchSummary, HazardRiskEngine, SpreadStep};
pub use models::{
    EvacuationZone, HazardDetection, HazardSnapshot, HazardType, HazardZone, PopulationUnit,
    RoadClass, RoadSegment, Severity, Shelter, TrafficReport, VehicleProfile, WeatherObservation,
    WeatherSample,
};
pub use route_engine::{
    find_route, hazard_clearance_m, safety_score, ConstraintMode, RouteOutcome, RoutePriority,
    RouteResult, SafeRouteSearch, SearchConfig, SearchState,
};
pub use rules::RiskRules;
pub use spatial::haversine_distance;
