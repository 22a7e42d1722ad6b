//! Weighted road graph construction.
//!
//! Edge weight is travel time inflated by hazard proximity, congestion, and
//! vehicle constraint violations; lower weight is always a better route.
//! A graph is immutable once built and is rebuilt for every hazard snapshot
//! or vehicle change.

use std::collections::hash_map::DefaultHasher;
use std::collections::HashMap;
use std::hash::{Hash, Hasher};

use serde::{Deserialize, Serialize};

use crate::error::{HazardError, Result};
use crate::models::{HazardSnapshot, HazardZone, RoadSegment, Severity, TrafficReport, VehicleProfile};
use crate::rules::SeverityTable;
use crate::spatial::{
    distance_to_segment_m, haversine_distance, meters_per_deg_lat, meters_per_deg_lon,
    polygon_area_m2, polyline_length_m, polyline_to_polygon_distance_m, validate_coordinate,
    BoundingBox, LonLat,
};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GraphConfig {
    /// Hazards farther than this from an edge add no penalty
    pub buffer_distance_m: f64,
    /// Distance scale of the exponential hazard falloff
    pub hazard_decay_m: f64,
    pub severity_multipliers: SeverityTable,
    /// Penalty per unit of congestion
    pub traffic_weight: f64,
    /// Soft-infinity added when a vehicle exceeds a physical limit
    pub constraint_penalty: f64,
    /// Added when the segment's class is outside the vehicle's preferences
    pub preference_penalty: f64,
    /// Endpoints closer than this are merged into one node
    pub merge_tolerance_m: f64,
}

impl Default for GraphConfig {
    fn default() -> Self {
        Self {
            buffer_distance_m: 1_000.0,
            hazard_decay_m: 250.0,
            severity_multipliers: SeverityTable::default(),
            traffic_weight: 1.0,
            constraint_penalty: 1_000.0,
            preference_penalty: 0.5,
            merge_tolerance_m: 25.0,
        }
    }
}

impl GraphConfig {
    pub fn validate(&self) -> Result<()> {
        if !(self.buffer_distance_m >= 0.0) || !(self.hazard_decay_m > 0.0) {
            return Err(HazardError::InvalidConfig(
                "buffer_distance_m must be >= 0 and hazard_decay_m > 0".to_string(),
            ));
        }
        if self.traffic_weight < 0.0 || self.constraint_penalty < 0.0 || self.preference_penalty < 0.0 {
            return Err(HazardError::InvalidConfig(
                "graph penalties must be non-negative".to_string(),
            ));
        }
        if !(self.merge_tolerance_m >= 0.0) {
            return Err(HazardError::InvalidConfig(
                "merge_tolerance_m must be non-negative".to_string(),
            ));
        }
        Ok(())
    }
}

/// Hazard outline prepared for repeated distance queries.
#[derive(Debug, Clone)]
pub struct HazardFootprint {
    pub severity: Severity,
    pub ring: Vec<LonLat>,
    bbox: BoundingBox,
}

impl HazardFootprint {
    /// `None` for empty, collinear, or zero-area outlines.
    pub fn from_zone(zone: &HazardZone) -> Option<Self> {
        Self::from_ring(zone.severity, zone.footprint.clone())
    }

    pub fn from_ring(severity: Severity, ring: Vec<LonLat>) -> Option<Self> {
        if ring.len() < 3 || polygon_area_m2(&ring) <= 1e-6 {
            return None;
        }
        let bbox = BoundingBox::from_points(&ring)?;
        Some(Self {
            severity,
            ring,
            bbox,
        })
    }

    pub fn bbox(&self) -> &BoundingBox {
        &self.bbox
    }

    pub fn distance_to_m(&self, polyline: &[LonLat]) -> Option<f64> {
        polyline_to_polygon_distance_m(polyline, &self.ring)
    }
}

pub fn footprints_from_zones(zones: &[HazardZone]) -> Vec<HazardFootprint> {
    zones.iter().filter_map(HazardFootprint::from_zone).collect()
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct GraphNode {
    pub lat: f64,
    pub lon: f64,
}

/// Directed edge. Two-way segments produce one edge per direction.
#[derive(Debug, Clone, Serialize)]
pub struct GraphEdge {
    pub segment_id: String,
    pub from: usize,
    pub to: usize,
    /// Oriented from `from` to `to`
    pub geometry: Vec<LonLat>,
    pub length_m: f64,
    pub speed_limit_kmh: f64,
    pub base_time_min: f64,
    pub hazard_penalty: f64,
    pub traffic_penalty: f64,
    pub constraint_penalty: f64,
    pub violates_constraints: bool,
    pub weight: f64,
}

impl GraphEdge {
    /// Cost ignoring hazard proximity.
    pub fn fastest_cost(&self) -> f64 {
        self.base_time_min * (1.0 + self.traffic_penalty + self.constraint_penalty)
    }
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct GraphBuildStats {
    pub segments: usize,
    pub skipped_segments: usize,
    pub hazards: usize,
    pub degenerate_hazards: usize,
    pub penalized_edges: usize,
    pub constraint_violations: usize,
}

#[derive(Debug, Clone)]
pub struct RoutingGraph {
    nodes: Vec<GraphNode>,
    edges: Vec<GraphEdge>,
    adjacency: Vec<Vec<usize>>,
    hazards: Vec<HazardFootprint>,
    vehicle: VehicleProfile,
    buffer_distance_m: f64,
    snapshot_version: u64,
    max_speed_kmh: f64,
    min_weight_factor: f64,
    min_fastest_factor: f64,
    min_length_ratio: f64,
    fingerprint: u64,
    stats: GraphBuildStats,
}

impl RoutingGraph {
    pub fn nodes(&self) -> &[GraphNode] {
        &self.nodes
    }

    pub fn edges(&self) -> &[GraphEdge] {
        &self.edges
    }

    pub fn node(&self, idx: usize) -> Option<&GraphNode> {
        self.nodes.get(idx)
    }

    pub fn edge(&self, idx: usize) -> Option<&GraphEdge> {
        self.edges.get(idx)
    }

    /// Outgoing edge indices of `node`.
    pub fn outgoing(&self, node: usize) -> &[usize] {
        self.adjacency.get(node).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn hazards(&self) -> &[HazardFootprint] {
        &self.hazards
    }

    pub fn vehicle(&self) -> &VehicleProfile {
        &self.vehicle
    }

    pub fn buffer_distance_m(&self) -> f64 {
        self.buffer_distance_m
    }

    pub fn snapshot_version(&self) -> u64 {
        self.snapshot_version
    }

    pub fn max_speed_kmh(&self) -> f64 {
        self.max_speed_kmh
    }

    /// Smallest `weight / base_time` over all edges (at least 1).
    pub fn min_weight_factor(&self) -> f64 {
        self.min_weight_factor
    }

    /// Smallest `fastest_cost / base_time` over all edges (at least 1).
    pub fn min_fastest_factor(&self) -> f64 {
        self.min_fastest_factor
    }

    /// Smallest `length / straight-line node distance` over all edges (at most 1).
    /// Overridden segment lengths and merged endpoints can push it below 1.
    pub fn min_length_ratio(&self) -> f64 {
        self.min_length_ratio
    }

    /// Hash of everything a search result depends on: topology, edge costs,
    /// hazard footprints, and the buffer. Two graphs with the same
    /// fingerprint return the same routes.
    pub fn fingerprint(&self) -> u64 {
        self.fingerprint
    }

    pub fn stats(&self) -> &GraphBuildStats {
        &self.stats
    }

    /// Closest edge to a point and its distance in meters.
    pub fn nearest_edge(&self, lat: f64, lon: f64) -> Option<(usize, f64)> {
        let mut best: Option<(usize, f64)> = None;
        for (idx, edge) in self.edges.iter().enumerate() {
            let d = polyline_point_distance_m(&edge.geometry, lat, lon);
            if best.map(|(_, bd)| d < bd).unwrap_or(true) {
                best = Some((idx, d));
            }
        }
        best
    }
}

fn polyline_point_distance_m(polyline: &[LonLat], lat: f64, lon: f64) -> f64 {
    match polyline {
        [] => f64::INFINITY,
        [only] => haversine_distance(lat, lon, only[1], only[0]),
        _ => polyline
            .windows(2)
            .map(|pair| distance_to_segment_m(lat, lon, pair[0][1], pair[0][0], pair[1][1], pair[1][0]))
            .fold(f64::INFINITY, f64::min),
    }
}

/// Merges nearby endpoints using a metric grid hash.
struct NodeIndex {
    tolerance_m: f64,
    cell_m: f64,
    meters_lat: f64,
    meters_lon: f64,
    grid: HashMap<(i64, i64), Vec<usize>>,
    nodes: Vec<GraphNode>,
}

impl NodeIndex {
    fn new(tolerance_m: f64, ref_lat: f64) -> Self {
        Self {
            tolerance_m,
            cell_m: tolerance_m.max(1.0),
            meters_lat: meters_per_deg_lat(ref_lat),
            meters_lon: meters_per_deg_lon(ref_lat).max(1.0),
            grid: HashMap::new(),
            nodes: Vec::new(),
        }
    }

    fn cell_of(&self, point: LonLat) -> (i64, i64) {
        let x = point[0] * self.meters_lon / self.cell_m;
        let y = point[1] * self.meters_lat / self.cell_m;
        (x.floor() as i64, y.floor() as i64)
    }

    fn node_for(&mut self, point: LonLat) -> usize {
        let (cx, cy) = self.cell_of(point);
        let mut best: Option<(usize, f64)> = None;
        for dx in -1..=1 {
            for dy in -1..=1 {
                let Some(indices) = self.grid.get(&(cx + dx, cy + dy)) else {
                    continue;
                };
                for &idx in indices {
                    let node = self.nodes[idx];
                    let d = haversine_distance(node.lat, node.lon, point[1], point[0]);
                    if d <= self.tolerance_m && best.map(|(_, bd)| d < bd).unwrap_or(true) {
                        best = Some((idx, d));
                    }
                }
            }
        }
        if let Some((idx, _)) = best {
            return idx;
        }

        let idx = self.nodes.len();
        self.nodes.push(GraphNode {
            lat: point[1],
            lon: point[0],
        });
        self.grid.entry((cx, cy)).or_default().push(idx);
        idx
    }
}

/// Builds [`RoutingGraph`]s from a road network and a hazard set.
#[derive(Debug, Clone, Default)]
pub struct RoutingGraphBuilder {
    config: GraphConfig,
}

impl RoutingGraphBuilder {
    pub fn new(config: GraphConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self { config })
    }

    pub fn config(&self) -> &GraphConfig {
        &self.config
    }

    /// Build a graph stamped with the snapshot's version.
    pub fn build_for_snapshot(
        &self,
        segments: &[RoadSegment],
        snapshot: &HazardSnapshot,
        vehicle: &VehicleProfile,
        traffic: Option<&TrafficReport>,
    ) -> Result<RoutingGraph> {
        let mut graph = self.build(segments, &snapshot.zones, vehicle, traffic)?;
        graph.snapshot_version = snapshot.version;
        Ok(graph)
    }

    pub fn build(
        &self,
        segments: &[RoadSegment],
        zones: &[HazardZone],
        vehicle: &VehicleProfile,
        traffic: Option<&TrafficReport>,
    ) -> Result<RoutingGraph> {
        if segments.is_empty() {
            return Err(HazardError::EmptyRoadNetwork);
        }

        let mut stats = GraphBuildStats {
            segments: segments.len(),
            hazards: zones.len(),
            ..GraphBuildStats::default()
        };

        let hazards = footprints_from_zones(zones);
        stats.degenerate_hazards = zones.len() - hazards.len();
        if stats.degenerate_hazards > 0 {
            tracing::warn!(
                "Ignoring {} hazard zone(s) with degenerate footprints",
                stats.degenerate_hazards
            );
        }

        let valid: Vec<&RoadSegment> = segments
            .iter()
            .filter(|segment| {
                let ok = segment_is_usable(segment);
                if !ok {
                    tracing::debug!("Skipping unusable road segment {}", segment.id);
                }
                ok
            })
            .collect();
        stats.skipped_segments = segments.len() - valid.len();
        if valid.is_empty() {
            return Err(HazardError::EmptyRoadNetwork);
        }

        let ref_lat = valid.iter().map(|s| s.geometry[0][1]).sum::<f64>() / valid.len() as f64;
        let mut node_index = NodeIndex::new(self.config.merge_tolerance_m, ref_lat);
        let mut edges: Vec<GraphEdge> = Vec::with_capacity(valid.len() * 2);

        for segment in valid {
            let geometry = &segment.geometry;
            let (Some(first), Some(last)) = (geometry.first(), geometry.last()) else {
                continue;
            };
            let from = node_index.node_for(*first);
            let to = node_index.node_for(*last);

            let length_m = segment
                .length_m
                .filter(|len| len.is_finite() && *len > 0.0)
                .unwrap_or_else(|| polyline_length_m(geometry));
            let base_time_min = length_m / 1000.0 / segment.speed_limit_kmh * 60.0;

            let hazard_penalty = self.hazard_penalty(geometry, &hazards);
            let traffic_penalty = self.traffic_penalty(&segment.id, traffic);
            let (constraint_penalty, violates_constraints) = self.constraint_penalty(segment, vehicle);
            let weight = base_time_min * (1.0 + hazard_penalty + traffic_penalty + constraint_penalty);

            if hazard_penalty > 0.0 {
                stats.penalized_edges += 1;
            }
            if violates_constraints {
                stats.constraint_violations += 1;
            }

            let forward = GraphEdge {
                segment_id: segment.id.clone(),
                from,
                to,
                geometry: geometry.clone(),
                length_m,
                speed_limit_kmh: segment.speed_limit_kmh,
                base_time_min,
                hazard_penalty,
                traffic_penalty,
                constraint_penalty,
                violates_constraints,
                weight,
            };
            if !segment.oneway {
                let mut reversed = geometry.clone();
                reversed.reverse();
                edges.push(GraphEdge {
                    from: to,
                    to: from,
                    geometry: reversed,
                    ..forward.clone()
                });
            }
            edges.push(forward);
        }

        let nodes = node_index.nodes;
        let mut adjacency = vec![Vec::new(); nodes.len()];
        for (idx, edge) in edges.iter().enumerate() {
            adjacency[edge.from].push(idx);
        }

        let max_speed_kmh = edges
            .iter()
            .map(|e| e.speed_limit_kmh)
            .fold(0.0, f64::max);
        let min_weight_factor = min_cost_factor(&edges, |e| e.weight);
        let min_fastest_factor = min_cost_factor(&edges, GraphEdge::fastest_cost);
        let min_length_ratio = shortest_length_ratio(&nodes, &edges);
        let fingerprint = graph_fingerprint(&edges, &hazards, self.config.buffer_distance_m);

        tracing::debug!(
            "Built routing graph for {}: {} nodes, {} edges, {} hazard-penalized, {} constraint violations",
            vehicle.name,
            nodes.len(),
            edges.len(),
            stats.penalized_edges,
            stats.constraint_violations
        );

        Ok(RoutingGraph {
            nodes,
            edges,
            adjacency,
            hazards,
            vehicle: vehicle.clone(),
            buffer_distance_m: self.config.buffer_distance_m,
            snapshot_version: 0,
            max_speed_kmh,
            min_weight_factor,
            min_fastest_factor,
            min_length_ratio,
            fingerprint,
            stats,
        })
    }

    /// Sum of `severity_multiplier × exp(−d / decay)` over hazards inside the buffer.
    pub fn hazard_penalty(&self, geometry: &[LonLat], hazards: &[HazardFootprint]) -> f64 {
        let buffer = self.config.buffer_distance_m;
        let Some(search_box) = BoundingBox::from_points(geometry).map(|b| b.expanded_by_m(buffer)) else {
            return 0.0;
        };

        let mut penalty = 0.0;
        for hazard in hazards {
            if !search_box.intersects(hazard.bbox()) {
                continue;
            }
            let Some(distance) = hazard.distance_to_m(geometry) else {
                continue;
            };
            if distance < buffer {
                penalty += self.config.severity_multipliers.get(hazard.severity)
                    * (-distance / self.config.hazard_decay_m).exp();
            }
        }
        penalty
    }

    fn traffic_penalty(&self, segment_id: &str, traffic: Option<&TrafficReport>) -> f64 {
        traffic
            .and_then(|report| report.get(segment_id))
            .filter(|level| level.is_finite())
            .map(|level| level.clamp(0.0, 1.0) * self.config.traffic_weight)
            .unwrap_or(0.0)
    }

    /// Returns the penalty and whether a hard physical limit is exceeded.
    fn constraint_penalty(&self, segment: &RoadSegment, vehicle: &VehicleProfile) -> (f64, bool) {
        let exceeds = |limit: Option<f64>, value: f64| limit.is_some_and(|limit| value > limit);
        let violates = exceeds(segment.bridge_weight_limit_t, vehicle.max_weight_t)
            || exceeds(segment.height_limit_m, vehicle.height_m)
            || exceeds(segment.width_limit_m, vehicle.width_m);

        let mut penalty = 0.0;
        if violates {
            penalty += self.config.constraint_penalty;
        }
        if !vehicle.prefers(segment.road_class) {
            penalty += self.config.preference_penalty;
        }
        (penalty, violates)
    }
}

fn segment_is_usable(segment: &RoadSegment) -> bool {
    segment.geometry.len() >= 2
        && segment.speed_limit_kmh.is_finite()
        && segment.speed_limit_kmh > 0.0
        && segment
            .geometry
            .iter()
            .all(|p| validate_coordinate(p[1], p[0]).is_ok())
}

/// Smallest ratio of `cost` to base travel time, floored at 1.
fn min_cost_factor(edges: &[GraphEdge], cost: impl Fn(&GraphEdge) -> f64) -> f64 {
    let factor = edges
        .iter()
        .filter(|e| e.base_time_min > 0.0)
        .map(|e| cost(e) / e.base_time_min)
        .fold(f64::INFINITY, f64::min);
    if factor.is_finite() {
        factor.max(1.0)
    } else {
        1.0
    }
}

fn shortest_length_ratio(nodes: &[GraphNode], edges: &[GraphEdge]) -> f64 {
    edges
        .iter()
        .filter_map(|e| {
            let (from, to) = (nodes.get(e.from)?, nodes.get(e.to)?);
            let straight = haversine_distance(from.lat, from.lon, to.lat, to.lon);
            (straight > 0.0).then(|| e.length_m / straight)
        })
        .fold(1.0, f64::min)
}

fn graph_fingerprint(edges: &[GraphEdge], hazards: &[HazardFootprint], buffer_m: f64) -> u64 {
    let mut hasher = DefaultHasher::new();
    buffer_m.to_bits().hash(&mut hasher);
    for edge in edges {
        edge.segment_id.hash(&mut hasher);
        (edge.from, edge.to, edge.violates_constraints).hash(&mut hasher);
        for value in [edge.length_m, edge.weight, edge.fastest_cost()] {
            value.to_bits().hash(&mut hasher);
        }
    }
    for hazard in hazards {
        for [lon, lat] in &hazard.ring {
            (lon.to_bits(), lat.to_bits()).hash(&mut hasher);
        }
    }
    hasher.finish()
}
