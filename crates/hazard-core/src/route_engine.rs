//! Hazard-aware A* search over a [`RoutingGraph`].
//!
//! "No path" is an ordinary outcome, not an error. Structural problems
//! (no graph loaded, bad coordinates, endpoints off the network) are typed
//! errors from [`SafeRouteSearch::try_search`] and are flattened into
//! [`RouteOutcome::InvalidInput`] by [`SafeRouteSearch::search`].

use std::cmp::{Ordering, Reverse};
use std::collections::BinaryHeap;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::cache::{RouteCache, RouteKey};
use crate::error::{HazardError, Result};
use crate::graph::{GraphEdge, HazardFootprint, RoutingGraph};
use crate::spatial::{haversine_distance, validate_coordinate, LonLat};

const COST_EPSILON: f64 = 1e-9;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchConfig {
    /// Endpoints farther than this from every road are unreachable
    pub max_snap_distance_m: f64,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            max_snap_distance_m: 500.0,
        }
    }
}

impl SearchConfig {
    pub fn validate(&self) -> Result<()> {
        if !(self.max_snap_distance_m > 0.0) {
            return Err(HazardError::InvalidConfig(
                "max_snap_distance_m must be positive".to_string(),
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RoutePriority {
    /// Minimize travel time; hazard proximity is ignored
    #[default]
    Fastest,
    /// Minimize the full hazard-weighted cost
    Safest,
}

impl fmt::Display for RoutePriority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RoutePriority::Fastest => write!(f, "fastest"),
            RoutePriority::Safest => write!(f, "safest"),
        }
    }
}

impl FromStr for RoutePriority {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "fastest" => Ok(RoutePriority::Fastest),
            "safest" => Ok(RoutePriority::Safest),
            other => Err(format!("unknown route priority '{other}' (expected fastest or safest)")),
        }
    }
}

/// How edges that exceed a vehicle limit are treated.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConstraintMode {
    /// Traverse at the constraint penalty
    #[default]
    Soft,
    /// Never traverse
    Strict,
}

impl fmt::Display for ConstraintMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConstraintMode::Soft => write!(f, "soft"),
            ConstraintMode::Strict => write!(f, "strict"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SearchState {
    Idle,
    GraphReady,
    Searching,
    Found,
    NoPath,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RouteResult {
    /// Road segment ids in travel order
    pub segments: Vec<String>,
    pub geometry: Vec<LonLat>,
    pub total_distance_km: f64,
    /// Unpenalized travel time
    pub total_time_min: f64,
    /// Accumulated cost under the requested priority
    pub search_weight: f64,
    /// 1.0 is clear of every hazard buffer, 0.0 touches a hazard
    pub safety_score: f64,
    /// Minimum distance to any hazard footprint; absent with no hazards
    pub hazard_clearance_m: Option<f64>,
    pub constraint_violations: usize,
    pub nodes_visited: usize,
    pub priority: RoutePriority,
    pub mode: ConstraintMode,
    pub vehicle: String,
    pub snapshot_version: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum RouteOutcome {
    Found(RouteResult),
    NoPath,
    InvalidInput { detail: String },
}

impl RouteOutcome {
    pub fn is_found(&self) -> bool {
        matches!(self, RouteOutcome::Found(_))
    }

    pub fn route(&self) -> Option<&RouteResult> {
        match self {
            RouteOutcome::Found(route) => Some(route),
            _ => None,
        }
    }

    pub fn into_result(self) -> Result<RouteResult> {
        match self {
            RouteOutcome::Found(route) => Ok(route),
            RouteOutcome::NoPath => Err(HazardError::NoPathFound),
            RouteOutcome::InvalidInput { detail } => Err(HazardError::InvalidInput(detail)),
        }
    }
}

/// Minimum distance from a route to any hazard footprint.
pub fn hazard_clearance_m(geometry: &[LonLat], hazards: &[HazardFootprint]) -> Option<f64> {
    hazards
        .iter()
        .filter_map(|hazard| hazard.distance_to_m(geometry))
        .reduce(f64::min)
}

/// Route safety in [0, 1]: full clearance of the buffer scores 1.0, touching
/// or crossing a hazard scores 0.0, linear in between.
pub fn safety_score(geometry: &[LonLat], hazards: &[HazardFootprint], buffer_m: f64) -> f64 {
    match hazard_clearance_m(geometry, hazards) {
        None => 1.0,
        Some(clearance) if clearance <= 0.0 => 0.0,
        Some(clearance) if clearance >= buffer_m => 1.0,
        Some(clearance) => (clearance / buffer_m).clamp(0.0, 1.0),
    }
}

#[derive(Debug, Clone, Copy)]
struct FloatOrd(f64);

impl PartialEq for FloatOrd {
    fn eq(&self, other: &Self) -> bool {
        self.0.to_bits() == other.0.to_bits()
    }
}

impl Eq for FloatOrd {}

impl PartialOrd for FloatOrd {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for FloatOrd {
    fn cmp(&self, other: &Self) -> Ordering {
        self.0.total_cmp(&other.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct OpenNode {
    node: usize,
    hops: usize,
    g_score: FloatOrd,
    f_score: FloatOrd,
}

impl PartialOrd for OpenNode {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for OpenNode {
    fn cmp(&self, other: &Self) -> Ordering {
        self.f_score
            .cmp(&other.f_score)
            .then_with(|| self.hops.cmp(&other.hops))
            .then_with(|| self.g_score.cmp(&other.g_score))
            .then_with(|| self.node.cmp(&other.node))
    }
}

fn edge_cost(edge: &GraphEdge, priority: RoutePriority) -> f64 {
    match priority {
        RoutePriority::Fastest => edge.fastest_cost(),
        RoutePriority::Safest => edge.weight,
    }
}

/// Snap a point to the closer endpoint of its nearest edge.
fn snap_endpoint(
    graph: &RoutingGraph,
    config: &SearchConfig,
    endpoint: &'static str,
    (lat, lon): (f64, f64),
) -> Result<usize> {
    validate_coordinate(lat, lon)?;
    let unreachable = HazardError::UnreachableEndpoint {
        endpoint,
        lat,
        lon,
        max_snap_m: config.max_snap_distance_m,
    };
    let Some((edge_idx, distance)) = graph.nearest_edge(lat, lon) else {
        return Err(unreachable);
    };
    if distance > config.max_snap_distance_m {
        return Err(unreachable);
    }
    let Some(edge) = graph.edge(edge_idx) else {
        return Err(unreachable);
    };

    let to_node = |idx: usize| {
        graph
            .node(idx)
            .map(|n| haversine_distance(lat, lon, n.lat, n.lon))
            .unwrap_or(f64::INFINITY)
    };
    if to_node(edge.to) < to_node(edge.from) {
        Ok(edge.to)
    } else {
        Ok(edge.from)
    }
}

/// Run one search against a shared graph. Stateless, so it can be called
/// from several threads against the same `RoutingGraph`.
pub fn find_route(
    graph: &RoutingGraph,
    config: &SearchConfig,
    origin: (f64, f64),
    destination: (f64, f64),
    priority: RoutePriority,
    mode: ConstraintMode,
) -> Result<RouteOutcome> {
    let start = snap_endpoint(graph, config, "origin", origin)?;
    let goal = snap_endpoint(graph, config, "destination", destination)?;

    let Some(goal_node) = graph.node(goal).copied() else {
        return Ok(RouteOutcome::NoPath);
    };
    let cost_factor = match priority {
        RoutePriority::Fastest => graph.min_fastest_factor(),
        RoutePriority::Safest => graph.min_weight_factor(),
    } * graph.min_length_ratio();
    let max_speed_kmh = graph.max_speed_kmh();
    let heuristic = |node: usize| -> f64 {
        if max_speed_kmh <= 0.0 {
            return 0.0;
        }
        graph
            .node(node)
            .map(|n| {
                let km = haversine_distance(n.lat, n.lon, goal_node.lat, goal_node.lon) / 1000.0;
                km / max_speed_kmh * 60.0 * cost_factor
            })
            .unwrap_or(0.0)
    };

    let node_count = graph.nodes().len();
    let mut g_score = vec![f64::INFINITY; node_count];
    let mut hops = vec![usize::MAX; node_count];
    let mut came_from: Vec<Option<usize>> = vec![None; node_count];
    let mut closed = vec![false; node_count];
    let mut open_set: BinaryHeap<Reverse<OpenNode>> = BinaryHeap::new();

    g_score[start] = 0.0;
    hops[start] = 0;
    open_set.push(Reverse(OpenNode {
        node: start,
        hops: 0,
        g_score: FloatOrd(0.0),
        f_score: FloatOrd(heuristic(start)),
    }));

    let mut nodes_visited = 0usize;
    let mut reached = false;

    while let Some(Reverse(current)) = open_set.pop() {
        if closed[current.node] {
            continue;
        }
        let best_g = g_score[current.node];
        if current.g_score.0 > best_g + COST_EPSILON {
            continue;
        }

        nodes_visited += 1;
        if current.node == goal {
            reached = true;
            break;
        }
        closed[current.node] = true;

        for &edge_idx in graph.outgoing(current.node) {
            let Some(edge) = graph.edge(edge_idx) else {
                continue;
            };
            if closed[edge.to] {
                continue;
            }
            if mode == ConstraintMode::Strict && edge.violates_constraints {
                continue;
            }

            let tentative_g = best_g + edge_cost(edge, priority);
            let tentative_hops = hops[current.node] + 1;
            let known_g = g_score[edge.to];
            let improves = tentative_g < known_g - COST_EPSILON
                || ((tentative_g - known_g).abs() <= COST_EPSILON && tentative_hops < hops[edge.to]);
            if !improves {
                continue;
            }

            g_score[edge.to] = tentative_g;
            hops[edge.to] = tentative_hops;
            came_from[edge.to] = Some(edge_idx);
            open_set.push(Reverse(OpenNode {
                node: edge.to,
                hops: tentative_hops,
                g_score: FloatOrd(tentative_g),
                f_score: FloatOrd(tentative_g + heuristic(edge.to)),
            }));
        }
    }

    if !reached {
        tracing::debug!(
            "No {} route for {} after visiting {} nodes",
            priority,
            graph.vehicle().name,
            nodes_visited
        );
        return Ok(RouteOutcome::NoPath);
    }

    let mut path_edges = Vec::new();
    let mut cursor = goal;
    while let Some(edge_idx) = came_from[cursor] {
        path_edges.push(edge_idx);
        match graph.edge(edge_idx) {
            Some(edge) => cursor = edge.from,
            None => break,
        }
        if cursor == start {
            break;
        }
    }
    path_edges.reverse();

    let route = assemble_route(graph, &path_edges, start, priority, mode, nodes_visited);
    tracing::debug!(
        "Found {} route for {}: {} segments, {:.2} min, safety {:.2}, {} nodes visited",
        priority,
        route.vehicle,
        route.segments.len(),
        route.total_time_min,
        route.safety_score,
        nodes_visited
    );
    Ok(RouteOutcome::Found(route))
}

fn assemble_route(
    graph: &RoutingGraph,
    path_edges: &[usize],
    start: usize,
    priority: RoutePriority,
    mode: ConstraintMode,
    nodes_visited: usize,
) -> RouteResult {
    let mut segments = Vec::with_capacity(path_edges.len());
    let mut geometry: Vec<LonLat> = Vec::new();
    let mut distance_m = 0.0;
    let mut time_min = 0.0;
    let mut search_weight = 0.0;
    let mut constraint_violations = 0;

    for edge in path_edges.iter().filter_map(|&idx| graph.edge(idx)) {
        segments.push(edge.segment_id.clone());
        let skip_first = geometry.last() == edge.geometry.first();
        geometry.extend(edge.geometry.iter().skip(usize::from(skip_first)).copied());
        distance_m += edge.length_m;
        time_min += edge.base_time_min;
        search_weight += edge_cost(edge, priority);
        if edge.violates_constraints {
            constraint_violations += 1;
        }
    }

    if geometry.is_empty() {
        if let Some(node) = graph.node(start) {
            geometry.push([node.lon, node.lat]);
        }
    }

    let clearance = hazard_clearance_m(&geometry, graph.hazards());
    RouteResult {
        segments,
        safety_score: safety_score(&geometry, graph.hazards(), graph.buffer_distance_m()),
        hazard_clearance_m: clearance,
        geometry,
        total_distance_km: distance_m / 1000.0,
        total_time_min: time_min,
        search_weight,
        constraint_violations,
        nodes_visited,
        priority,
        mode,
        vehicle: graph.vehicle().name.clone(),
        snapshot_version: graph.snapshot_version(),
    }
}

/// Search front end that owns the loaded graph and tracks its state.
#[derive(Debug, Clone)]
pub struct SafeRouteSearch {
    config: SearchConfig,
    graph: Option<Arc<RoutingGraph>>,
    state: SearchState,
}

impl SafeRouteSearch {
    pub fn new(config: SearchConfig) -> Self {
        Self {
            config,
            graph: None,
            state: SearchState::Idle,
        }
    }

    pub fn with_graph(config: SearchConfig, graph: Arc<RoutingGraph>) -> Self {
        let mut search = Self::new(config);
        search.load_graph(graph);
        search
    }

    /// Replace the active graph, e.g. after a new hazard snapshot.
    pub fn load_graph(&mut self, graph: Arc<RoutingGraph>) {
        self.graph = Some(graph);
        self.state = SearchState::GraphReady;
    }

    pub fn graph(&self) -> Option<&Arc<RoutingGraph>> {
        self.graph.as_ref()
    }

    pub fn state(&self) -> SearchState {
        self.state
    }

    pub fn config(&self) -> &SearchConfig {
        &self.config
    }

    pub fn try_search(
        &mut self,
        origin: (f64, f64),
        destination: (f64, f64),
        priority: RoutePriority,
        mode: ConstraintMode,
    ) -> Result<RouteOutcome> {
        let Some(graph) = self.graph.clone() else {
            return Err(HazardError::GraphNotReady);
        };

        self.state = SearchState::Searching;
        match find_route(&graph, &self.config, origin, destination, priority, mode) {
            Ok(outcome) => {
                self.state = if outcome.is_found() {
                    SearchState::Found
                } else {
                    SearchState::NoPath
                };
                Ok(outcome)
            }
            Err(err) => {
                self.state = SearchState::GraphReady;
                Err(err)
            }
        }
    }

    /// Like [`try_search`](Self::try_search) but never fails.
    pub fn search(
        &mut self,
        origin: (f64, f64),
        destination: (f64, f64),
        priority: RoutePriority,
        mode: ConstraintMode,
    ) -> RouteOutcome {
        self.try_search(origin, destination, priority, mode)
            .unwrap_or_else(|err| {
                tracing::warn!("Route search rejected: {}", err);
                RouteOutcome::InvalidInput {
                    detail: err.to_string(),
                }
            })
    }

    /// [`search`](Self::search) through `cache`, keyed by the loaded graph's
    /// snapshot version, fingerprint and vehicle.
    pub fn search_cached(
        &mut self,
        cache: &RouteCache,
        origin: (f64, f64),
        destination: (f64, f64),
        priority: RoutePriority,
        mode: ConstraintMode,
    ) -> RouteOutcome {
        let key = match &self.graph {
            Some(graph) => RouteKey::new(
                graph.snapshot_version(),
                graph.fingerprint(),
                graph.vehicle().name.clone(),
                priority,
                mode,
                origin,
                destination,
            ),
            None => return self.search(origin, destination, priority, mode),
        };
        let outcome = cache.get_or_insert_with(key, || self.search(origin, destination, priority, mode));
        self.state = match &outcome {
            RouteOutcome::Found(_) => SearchState::Found,
            RouteOutcome::NoPath => SearchState::NoPath,
            RouteOutcome::InvalidInput { .. } => SearchState::GraphReady,
        };
        outcome
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::RoutingGraphBuilder;
    use crate::models::{RoadSegment, Severity, VehicleProfile};
    use crate::spatial::{meters_to_lat, meters_to_lon};

    fn square(lat: f64, lon: f64, half_m: f64) -> Vec<LonLat> {
        let dlat = meters_to_lat(half_m, lat);
        let dlon = meters_to_lon(half_m, lat);
        vec![
            [lon - dlon, lat - dlat],
            [lon + dlon, lat - dlat],
            [lon + dlon, lat + dlat],
            [lon - dlon, lat + dlat],
        ]
    }

    fn line_graph() -> Arc<RoutingGraph> {
        let segments = vec![
            RoadSegment::new("ab", vec![[-118.00, 34.0], [-117.99, 34.0]], 50.0),
            RoadSegment::new("bc", vec![[-117.99, 34.0], [-117.98, 34.0]], 50.0),
        ];
        let graph = RoutingGraphBuilder::default()
            .build(&segments, &[], &VehicleProfile::civilian(), None)
            .unwrap();
        Arc::new(graph)
    }

    #[test]
    fn safety_score_without_hazards_is_one() {
        let route = vec![[-118.0, 34.0], [-117.99, 34.0]];
        assert_eq!(safety_score(&route, &[], 1_000.0), 1.0);
        assert_eq!(hazard_clearance_m(&route, &[]), None);
    }

    #[test]
    fn safety_score_is_bounded_and_linear() {
        let route = vec![[-118.01, 34.0], [-117.99, 34.0]];
        let crossing = HazardFootprint::from_ring(Severity::High, square(34.0, -118.0, 50.0)).unwrap();
        assert_eq!(safety_score(&route, &[crossing], 1_000.0), 0.0);

        let north = 34.0 + meters_to_lat(550.0, 34.0);
        let near = HazardFootprint::from_ring(Severity::High, square(north, -118.0, 50.0)).unwrap();
        let score = safety_score(&route, &[near.clone()], 1_000.0);
        assert!((score - 0.5).abs() < 0.01, "got {score}");
        assert_eq!(safety_score(&route, &[near], 400.0), 1.0);
    }

    #[test]
    fn search_before_graph_is_not_ready() {
        let mut search = SafeRouteSearch::new(SearchConfig::default());
        assert_eq!(search.state(), SearchState::Idle);
        let err = search
            .try_search((34.0, -118.0), (34.0, -117.98), RoutePriority::Fastest, ConstraintMode::Soft)
            .unwrap_err();
        assert_eq!(err, HazardError::GraphNotReady);
        assert_eq!(search.state(), SearchState::Idle);
    }

    #[test]
    fn finds_route_along_line() {
        let mut search = SafeRouteSearch::with_graph(SearchConfig::default(), line_graph());
        assert_eq!(search.state(), SearchState::GraphReady);

        let outcome = search.search((34.0, -118.0), (34.0, -117.98), RoutePriority::Fastest, ConstraintMode::Soft);
        let route = outcome.into_result().unwrap();
        assert_eq!(route.segments, vec!["ab", "bc"]);
        assert_eq!(route.geometry.len(), 3);
        assert!((route.total_distance_km - 1.846).abs() < 0.01);
        assert!((route.total_time_min - route.search_weight).abs() < 1e-9);
        assert_eq!(route.safety_score, 1.0);
        assert_eq!(search.state(), SearchState::Found);
    }

    #[test]
    fn invalid_coordinates_flatten_to_invalid_input() {
        let mut search = SafeRouteSearch::with_graph(SearchConfig::default(), line_graph());
        let err = search
            .try_search((91.0, -118.0), (34.0, -117.98), RoutePriority::Safest, ConstraintMode::Soft)
            .unwrap_err();
        assert!(matches!(err, HazardError::InvalidCoordinate { .. }));

        let outcome = search.search((91.0, -118.0), (34.0, -117.98), RoutePriority::Safest, ConstraintMode::Soft);
        assert!(matches!(outcome, RouteOutcome::InvalidInput { .. }));
        assert!(matches!(outcome.into_result(), Err(HazardError::InvalidInput(_))));
    }

    #[test]
    fn equal_cost_prefers_fewer_segments() {
        let mut ab = RoadSegment::new("ab", vec![[-118.00, 34.0], [-117.99, 34.0]], 50.0);
        ab.length_m = Some(1_000.0);
        let mut bc = RoadSegment::new("bc", vec![[-117.99, 34.0], [-117.98, 34.0]], 50.0);
        bc.length_m = Some(1_000.0);
        let mut ac = RoadSegment::new("ac", vec![[-118.00, 34.0], [-117.99, 34.002], [-117.98, 34.0]], 50.0);
        ac.length_m = Some(2_000.0);

        let graph = RoutingGraphBuilder::default()
            .build(&[ab, bc, ac], &[], &VehicleProfile::civilian(), None)
            .unwrap();
        let outcome = find_route(
            &graph,
            &SearchConfig::default(),
            (34.0, -118.0),
            (34.0, -117.98),
            RoutePriority::Fastest,
            ConstraintMode::Soft,
        )
        .unwrap();
        assert_eq!(outcome.route().unwrap().segments, vec!["ac"]);
    }

    #[test]
    fn no_path_serializes_with_reason() {
        let json = serde_json::to_value(RouteOutcome::NoPath).unwrap();
        assert_eq!(json["reason"], "no_path");
        assert!(matches!(RouteOutcome::NoPath.into_result(), Err(HazardError::NoPathFound)));
    }

    #[test]
    fn priority_parses_case_insensitively() {
        assert_eq!("Safest".parse::<RoutePriority>(), Ok(RoutePriority::Safest));
        assert!("scenic".parse::<RoutePriority>().is_err());
    }
}
