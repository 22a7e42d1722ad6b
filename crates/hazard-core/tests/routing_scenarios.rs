use std::sync::Arc;

use chrono::{TimeZone, Utc};
use hazard_core::spatial::{meters_to_lat, meters_to_lon};
use hazard_core::{
    cells, find_route, CacheConfig, ConstraintMode, GraphConfig, HazardDetection, HazardError,
    HazardRiskEngine, HazardType, HazardZone, RiskRules, RoadClass, RoadSegment, RouteCache,
    RouteOutcome, RoutePriority, RoutingGraphBuilder, SafeRouteSearch, SearchConfig, SearchState,
    Severity, VehicleProfile,
};

const LONS: [f64; 4] = [-118.00, -117.99, -117.98, -117.97];
const SOUTH: f64 = 34.00;
const NORTH: f64 = 34.01;

/// 2x4 ladder: two east-west rows joined by four rungs, 10 segments.
fn grid_segments() -> Vec<RoadSegment> {
    let mut segments = Vec::new();
    for (row, lat) in [("a", SOUTH), ("b", NORTH)] {
        for i in 0..3 {
            segments.push(RoadSegment::new(
                format!("{row}{i}{}", i + 1),
                vec![[LONS[i], lat], [LONS[i + 1], lat]],
                50.0,
            ));
        }
    }
    for (i, lon) in LONS.iter().enumerate() {
        segments.push(RoadSegment::new(format!("v{i}"), vec![[*lon, SOUTH], [*lon, NORTH]], 50.0));
    }
    segments
}

fn square_zone(lat: f64, lon: f64, half_m: f64, severity: Severity) -> HazardZone {
    let dlat = meters_to_lat(half_m, lat);
    let dlon = meters_to_lon(half_m, lat);
    let now = Utc::now();
    HazardZone {
        cell: cells::index(lat, lon, 7).unwrap(),
        latitude: lat,
        longitude: lon,
        hazard_type: HazardType::Fire,
        observed_severity: severity,
        severity,
        confidence: 0.9,
        risk_score: 3.6,
        detection_count: 3,
        first_detected: now,
        last_detected: now,
        affected_population: 0,
        spread_cells: Vec::new(),
        weather_fallback: false,
        footprint: vec![
            [lon - dlon, lat - dlat],
            [lon + dlon, lat - dlat],
            [lon + dlon, lat + dlat],
            [lon - dlon, lat + dlat],
        ],
    }
}

fn blocked_middle() -> HazardZone {
    square_zone(SOUTH, -117.985, 25.0, Severity::Critical)
}

fn search(priority: RoutePriority, mode: ConstraintMode, zones: &[HazardZone], vehicle: &VehicleProfile) -> RouteOutcome {
    let graph = RoutingGraphBuilder::default()
        .build(&grid_segments(), zones, vehicle, None)
        .unwrap();
    let mut search = SafeRouteSearch::with_graph(SearchConfig::default(), Arc::new(graph));
    search.search((SOUTH, LONS[0]), (SOUTH, LONS[3]), priority, mode)
}

#[test]
fn safest_route_detours_around_hazard() {
    let zones = vec![blocked_middle()];
    let civilian = VehicleProfile::civilian();

    let fastest = search(RoutePriority::Fastest, ConstraintMode::Soft, &zones, &civilian)
        .into_result()
        .unwrap();
    let safest = search(RoutePriority::Safest, ConstraintMode::Soft, &zones, &civilian)
        .into_result()
        .unwrap();

    assert_eq!(fastest.segments, vec!["a01", "a12", "a23"]);
    assert_eq!(fastest.safety_score, 0.0);
    assert_eq!(fastest.hazard_clearance_m, Some(0.0));

    assert_eq!(safest.segments, vec!["v0", "b01", "b12", "b23", "v3"]);
    assert_eq!(safest.safety_score, 1.0);
    assert!(safest.total_distance_km > fastest.total_distance_km);
    assert!(safest.total_time_min > fastest.total_time_min);
    assert!(safest.safety_score > fastest.safety_score);
}

#[test]
fn no_hazards_gives_the_same_route_for_both_priorities() {
    let civilian = VehicleProfile::civilian();
    let fastest = search(RoutePriority::Fastest, ConstraintMode::Soft, &[], &civilian)
        .into_result()
        .unwrap();
    let safest = search(RoutePriority::Safest, ConstraintMode::Soft, &[], &civilian)
        .into_result()
        .unwrap();

    assert_eq!(fastest.segments, safest.segments);
    assert!((fastest.search_weight - safest.search_weight).abs() < 1e-9);
    assert!((safest.search_weight - safest.total_time_min).abs() < 1e-9);
    assert_eq!(safest.safety_score, 1.0);
}

#[test]
fn search_is_deterministic() {
    let zones = vec![blocked_middle()];
    let civilian = VehicleProfile::civilian();
    let first = search(RoutePriority::Safest, ConstraintMode::Soft, &zones, &civilian);
    let second = search(RoutePriority::Safest, ConstraintMode::Soft, &zones, &civilian);
    assert_eq!(first, second);
}

#[test]
fn strict_mode_refuses_overweight_bridge() {
    let segments = vec![
        RoadSegment::new("approach", vec![[LONS[0], SOUTH], [LONS[1], SOUTH]], 50.0)
            .with_class(RoadClass::Primary),
        RoadSegment::new("bridge", vec![[LONS[1], SOUTH], [LONS[2], SOUTH]], 50.0)
            .with_class(RoadClass::Primary)
            .with_weight_limit(10.0),
        RoadSegment::new("exit", vec![[LONS[2], SOUTH], [LONS[3], SOUTH]], 50.0)
            .with_class(RoadClass::Primary),
    ];
    let graph = RoutingGraphBuilder::default()
        .build(&segments, &[], &VehicleProfile::fire_engine(), None)
        .unwrap();
    let config = SearchConfig::default();
    let from = (SOUTH, LONS[0]);
    let to = (SOUTH, LONS[3]);

    let strict = find_route(&graph, &config, from, to, RoutePriority::Fastest, ConstraintMode::Strict).unwrap();
    assert_eq!(strict, RouteOutcome::NoPath);

    let soft = find_route(&graph, &config, from, to, RoutePriority::Fastest, ConstraintMode::Soft)
        .unwrap()
        .into_result()
        .unwrap();
    assert_eq!(soft.constraint_violations, 1);
    assert!(soft.search_weight > 1_000.0 * soft.total_time_min / 3.0);

    // The same bridge is fine for an ambulance.
    let light = RoutingGraphBuilder::default()
        .build(&segments, &[], &VehicleProfile::ambulance(), None)
        .unwrap();
    let outcome = find_route(&light, &config, from, to, RoutePriority::Fastest, ConstraintMode::Strict).unwrap();
    assert!(outcome.is_found());
}

#[test]
fn distant_endpoint_is_unreachable() {
    let graph = RoutingGraphBuilder::default()
        .build(&grid_segments(), &[], &VehicleProfile::civilian(), None)
        .unwrap();
    let mut search = SafeRouteSearch::with_graph(SearchConfig::default(), Arc::new(graph));

    let err = search
        .try_search((SOUTH, LONS[0]), (SOUTH + 1.0, LONS[3]), RoutePriority::Fastest, ConstraintMode::Soft)
        .unwrap_err();
    assert!(matches!(
        err,
        HazardError::UnreachableEndpoint {
            endpoint: "destination",
            ..
        }
    ));
    assert_eq!(search.state(), SearchState::GraphReady);
}

#[test]
fn origin_is_reported_first_when_both_endpoints_are_off_network() {
    let graph = RoutingGraphBuilder::default()
        .build(&grid_segments(), &[], &VehicleProfile::civilian(), None)
        .unwrap();
    let err = find_route(
        &graph,
        &SearchConfig::default(),
        (SOUTH + 1.0, LONS[0]),
        (SOUTH + 1.0, LONS[3]),
        RoutePriority::Fastest,
        ConstraintMode::Soft,
    )
    .unwrap_err();
    assert!(matches!(
        err,
        HazardError::UnreachableEndpoint {
            endpoint: "origin",
            ..
        }
    ));
}

#[test]
fn overridden_short_segment_still_yields_cheapest_route() {
    let origin = [LONS[0], SOUTH];
    let spur_end = [LONS[0], SOUTH + 0.001];
    let goal = [LONS[2], SOUTH];
    let mut shortcut = RoadSegment::new("shortcut", vec![spur_end, goal], 50.0);
    shortcut.length_m = Some(10.0);
    let segments = vec![
        RoadSegment::new("direct", vec![origin, goal], 50.0),
        RoadSegment::new("spur", vec![origin, spur_end], 50.0),
        shortcut,
    ];
    let graph = RoutingGraphBuilder::default()
        .build(&segments, &[], &VehicleProfile::civilian(), None)
        .unwrap();
    assert!(graph.min_length_ratio() < 0.01);

    let route = find_route(
        &graph,
        &SearchConfig::default(),
        (SOUTH, LONS[0]),
        (SOUTH, LONS[2]),
        RoutePriority::Fastest,
        ConstraintMode::Soft,
    )
    .unwrap()
    .into_result()
    .unwrap();
    assert_eq!(route.segments, vec!["spur", "shortcut"]);
    assert!(route.total_time_min < 0.2);
}

#[test]
fn empty_network_is_an_error() {
    let err = RoutingGraphBuilder::default()
        .build(&[], &[blocked_middle()], &VehicleProfile::civilian(), None)
        .unwrap_err();
    assert_eq!(err, HazardError::EmptyRoadNetwork);
}

#[test]
fn narrower_buffer_ignores_distant_hazard() {
    let config = GraphConfig {
        buffer_distance_m: 100.0,
        ..GraphConfig::default()
    };
    let graph = RoutingGraphBuilder::new(config)
        .unwrap()
        .build(&grid_segments(), &[blocked_middle()], &VehicleProfile::civilian(), None)
        .unwrap();
    let penalized: Vec<&str> = graph
        .edges()
        .iter()
        .filter(|e| e.hazard_penalty > 0.0)
        .map(|e| e.segment_id.as_str())
        .collect();
    assert!(!penalized.is_empty());
    assert!(penalized.iter().all(|id| *id == "a12"));
}

#[test]
fn assessed_snapshot_feeds_the_router() {
    let mut engine = HazardRiskEngine::new(RiskRules::default()).unwrap();
    let detected_at = Utc.with_ymd_and_hms(2025, 8, 14, 12, 0, 0).unwrap();
    let snapshot = engine.assess(
        &[
            HazardDetection::new(SOUTH, -117.985, 500.0, detected_at),
            HazardDetection::new(SOUTH, -117.985, f64::NAN, detected_at),
        ],
        &[],
        &[],
    );
    assert_eq!(snapshot.version, 1);
    assert_eq!(snapshot.zones.len(), 1);
    assert_eq!(snapshot.zones[0].severity, Severity::Critical);
    assert_eq!(snapshot.detections.defaulted_intensity, 1);

    let graph = RoutingGraphBuilder::default()
        .build_for_snapshot(&grid_segments(), &snapshot, &VehicleProfile::civilian(), None)
        .unwrap();
    assert_eq!(graph.snapshot_version(), 1);
    assert!(graph.stats().penalized_edges > 0);

    let route = find_route(
        &graph,
        &SearchConfig::default(),
        (SOUTH, LONS[0]),
        (SOUTH, LONS[3]),
        RoutePriority::Safest,
        ConstraintMode::Soft,
    )
    .unwrap()
    .into_result()
    .unwrap();
    assert_eq!(route.snapshot_version, 1);
    assert!(route.search_weight >= route.total_time_min);
}

#[test]
fn cached_search_is_scoped_to_snapshot() {
    let mut engine = HazardRiskEngine::new(RiskRules::default()).unwrap();
    let detected_at = Utc.with_ymd_and_hms(2025, 8, 14, 12, 0, 0).unwrap();
    let detections = [HazardDetection::new(SOUTH, -117.985, 450.0, detected_at)];
    let civilian = VehicleProfile::civilian();
    let builder = RoutingGraphBuilder::default();
    let cache = RouteCache::new(CacheConfig::default());

    let first = engine.assess(&detections, &[], &[]);
    let graph = builder
        .build_for_snapshot(&grid_segments(), &first, &civilian, None)
        .unwrap();
    let mut search = SafeRouteSearch::with_graph(SearchConfig::default(), Arc::new(graph));
    let from = (SOUTH, LONS[0]);
    let to = (SOUTH, LONS[3]);

    let computed = search.search_cached(&cache, from, to, RoutePriority::Safest, ConstraintMode::Soft);
    let cached = search.search_cached(&cache, from, to, RoutePriority::Safest, ConstraintMode::Soft);
    assert!(computed.is_found());
    assert_eq!(computed, cached);
    assert_eq!(cache.len(), 1);
    assert_eq!(search.state(), SearchState::Found);

    let second = engine.assess(&detections, &[], &[]);
    assert_eq!(second.version, 2);
    assert_eq!(cache.invalidate_before(second.version), 1);
    assert!(cache.is_empty());

    let graph = builder
        .build_for_snapshot(&grid_segments(), &second, &civilian, None)
        .unwrap();
    search.load_graph(Arc::new(graph));
    let fresh = search.search_cached(&cache, from, to, RoutePriority::Safest, ConstraintMode::Soft);
    assert_eq!(fresh.route().map(|r| r.snapshot_version), Some(2));
}

#[test]
fn cache_separates_graphs_sharing_a_snapshot_version() {
    let civilian = VehicleProfile::civilian();
    let builder = RoutingGraphBuilder::default();
    let cache = RouteCache::new(CacheConfig::default());
    let clean = builder.build(&grid_segments(), &[], &civilian, None).unwrap();
    let hazardous = builder
        .build(&grid_segments(), &[blocked_middle()], &civilian, None)
        .unwrap();
    assert_eq!(clean.snapshot_version(), hazardous.snapshot_version());
    assert_ne!(clean.fingerprint(), hazardous.fingerprint());

    let from = (SOUTH, LONS[0]);
    let to = (SOUTH, LONS[3]);
    let mut search = SafeRouteSearch::with_graph(SearchConfig::default(), Arc::new(clean));
    let before = search.search_cached(&cache, from, to, RoutePriority::Fastest, ConstraintMode::Soft);
    search.load_graph(Arc::new(hazardous));
    let after = search.search_cached(&cache, from, to, RoutePriority::Fastest, ConstraintMode::Soft);

    assert_eq!(before.route().map(|r| r.safety_score), Some(1.0));
    assert_eq!(after.route().map(|r| r.safety_score), Some(0.0));
    assert_eq!(cache.len(), 2);
}
