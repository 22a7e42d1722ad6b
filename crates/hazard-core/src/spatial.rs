//! Spatial math for hazard proximity and route distance calculations.
//!
//! Polylines and polygons are `[lon, lat]` pairs, matching GeoJSON order.

use crate::error::{HazardError, Result};

/// A `[lon, lat]` pair in decimal degrees.
pub type LonLat = [f64; 2];

pub const EARTH_RADIUS_M: f64 = 6_371_000.0;

/// Reject coordinates outside the valid WGS84 range. Never clamps.
pub fn validate_coordinate(lat: f64, lon: f64) -> Result<()> {
    if !lat.is_finite()
        || !lon.is_finite()
        || !(-90.0..=90.0).contains(&lat)
        || !(-180.0..=180.0).contains(&lon)
    {
        return Err(HazardError::InvalidCoordinate { lat, lon });
    }
    Ok(())
}

/// Calculate distance between two points in meters using Haversine formula.
///
/// # Arguments
/// * `lat1`, `lon1` - First point coordinates in decimal degrees
/// * `lat2`, `lon2` - Second point coordinates in decimal degrees
pub fn haversine_distance(lat1: f64, lon1: f64, lat2: f64, lon2: f64) -> f64 {
    let phi1 = lat1.to_radians();
    let phi2 = lat2.to_radians();
    let dphi = (lat2 - lat1).to_radians();
    let dlambda = (lon2 - lon1).to_radians();
    let a = (dphi / 2.0).sin().powi(2) + phi1.cos() * phi2.cos() * (dlambda / 2.0).sin().powi(2);
    2.0 * EARTH_RADIUS_M * a.sqrt().atan2((1.0 - a).sqrt())
}

/// Total length of a polyline in meters.
pub fn polyline_length_m(points: &[LonLat]) -> f64 {
    points
        .windows(2)
        .map(|pair| haversine_distance(pair[0][1], pair[0][0], pair[1][1], pair[1][0]))
        .sum()
}

// ==== Local metric conversion ====

/// Meters per degree of latitude at a given latitude (WGS84 approximation).
pub fn meters_per_deg_lat(lat_deg: f64) -> f64 {
    let lat_rad = lat_deg.to_radians();
    111_132.954 - 559.822 * (2.0 * lat_rad).cos() + 1.175 * (4.0 * lat_rad).cos()
        - 0.0023 * (6.0 * lat_rad).cos()
}

/// Meters per degree of longitude at a given latitude (WGS84 approximation).
pub fn meters_per_deg_lon(lat_deg: f64) -> f64 {
    let lat_rad = lat_deg.to_radians();
    111_412.84 * lat_rad.cos() - 93.5 * (3.0 * lat_rad).cos() + 0.118 * (5.0 * lat_rad).cos()
}

/// Convert a north/south offset in meters to degrees latitude.
pub fn meters_to_lat(meters: f64, ref_lat_deg: f64) -> f64 {
    meters / meters_per_deg_lat(ref_lat_deg).max(1e-9)
}

/// Convert an east/west offset in meters to degrees longitude.
pub fn meters_to_lon(meters: f64, ref_lat_deg: f64) -> f64 {
    meters / meters_per_deg_lon(ref_lat_deg).max(1e-9)
}

pub fn lat_to_meters(deg: f64, ref_lat_deg: f64) -> f64 {
    deg * meters_per_deg_lat(ref_lat_deg)
}

pub fn lon_to_meters(deg: f64, ref_lat_deg: f64) -> f64 {
    deg * meters_per_deg_lon(ref_lat_deg)
}

/// Offset a position by distance and bearing.
///
/// # Arguments
/// * `lat`, `lon` - Starting position in degrees
/// * `distance_m` - Distance in meters
/// * `bearing_rad` - Bearing in radians (0 = north, π/2 = east)
///
/// # Returns
/// (new_lat, new_lon) in degrees
pub fn offset_by_bearing(lat: f64, lon: f64, distance_m: f64, bearing_rad: f64) -> (f64, f64) {
    if distance_m.abs() <= f64::EPSILON {
        return (lat, lon);
    }

    let lat1 = lat.to_radians();
    let lon1 = lon.to_radians();
    let angular_distance = distance_m / EARTH_RADIUS_M;

    let sin_lat1 = lat1.sin();
    let cos_lat1 = lat1.cos();
    let sin_ad = angular_distance.sin();
    let cos_ad = angular_distance.cos();

    let sin_lat2 = sin_lat1 * cos_ad + cos_lat1 * sin_ad * bearing_rad.cos();
    let lat2 = sin_lat2.clamp(-1.0, 1.0).asin();

    let y = bearing_rad.sin() * sin_ad * cos_lat1;
    let x = cos_ad - sin_lat1 * sin_lat2;
    let mut lon2 = lon1 + y.atan2(x);
    lon2 =
        (lon2 + std::f64::consts::PI).rem_euclid(2.0 * std::f64::consts::PI) - std::f64::consts::PI;

    (lat2.to_degrees(), lon2.to_degrees())
}

/// Minimum distance from a point to a line segment, in meters.
pub fn distance_to_segment_m(
    point_lat: f64,
    point_lon: f64,
    seg_start_lat: f64,
    seg_start_lon: f64,
    seg_end_lat: f64,
    seg_end_lon: f64,
) -> f64 {
    // Local ENU with the segment start as origin
    let ref_lat = seg_start_lat;

    let px = lon_to_meters(point_lon - seg_start_lon, ref_lat);
    let py = lat_to_meters(point_lat - seg_start_lat, ref_lat);
    let sx = lon_to_meters(seg_end_lon - seg_start_lon, ref_lat);
    let sy = lat_to_meters(seg_end_lat - seg_start_lat, ref_lat);

    let seg_len_sq = sx * sx + sy * sy;
    if seg_len_sq < 0.0001 {
        return (px * px + py * py).sqrt();
    }

    let t = ((px * sx + py * sy) / seg_len_sq).clamp(0.0, 1.0);
    let dx = px - t * sx;
    let dy = py - t * sy;

    (dx * dx + dy * dy).sqrt()
}

/// Minimum distance between two line segments in meters; zero when they cross or touch.
pub fn segment_to_segment_distance(a1: LonLat, a2: LonLat, b1: LonLat, b2: LonLat) -> f64 {
    let ref_lat = (a1[1] + a2[1] + b1[1] + b2[1]) / 4.0;
    let ref_lon = (a1[0] + a2[0] + b1[0] + b2[0]) / 4.0;
    let project = |p: LonLat| {
        (
            lon_to_meters(p[0] - ref_lon, ref_lat),
            lat_to_meters(p[1] - ref_lat, ref_lat),
        )
    };

    if segments_intersect_2d(project(a1), project(a2), project(b1), project(b2)) {
        return 0.0;
    }

    let d1 = distance_to_segment_m(a1[1], a1[0], b1[1], b1[0], b2[1], b2[0]);
    let d2 = distance_to_segment_m(a2[1], a2[0], b1[1], b1[0], b2[1], b2[0]);
    let d3 = distance_to_segment_m(b1[1], b1[0], a1[1], a1[0], a2[1], a2[0]);
    let d4 = distance_to_segment_m(b2[1], b2[0], a1[1], a1[0], a2[1], a2[0]);

    d1.min(d2).min(d3).min(d4)
}

pub(crate) fn segments_intersect_2d(
    a1: (f64, f64),
    a2: (f64, f64),
    b1: (f64, f64),
    b2: (f64, f64),
) -> bool {
    // Tolerance in meters on locally projected coordinates.
    const EPS_M: f64 = 1e-6;

    fn orient(p: (f64, f64), q: (f64, f64), r: (f64, f64)) -> f64 {
        (q.0 - p.0) * (r.1 - p.1) - (q.1 - p.1) * (r.0 - p.0)
    }

    fn within(a: f64, b: f64, value: f64) -> bool {
        value >= a.min(b) - EPS_M && value <= a.max(b) + EPS_M
    }

    fn on_segment(p: (f64, f64), q: (f64, f64), r: (f64, f64)) -> bool {
        within(p.0, q.0, r.0) && within(p.1, q.1, r.1)
    }

    let o1 = orient(a1, a2, b1);
    let o2 = orient(a1, a2, b2);
    let o3 = orient(b1, b2, a1);
    let o4 = orient(b1, b2, a2);

    if (o1.abs() <= EPS_M && on_segment(a1, a2, b1))
        || (o2.abs() <= EPS_M && on_segment(a1, a2, b2))
        || (o3.abs() <= EPS_M && on_segment(b1, b2, a1))
        || (o4.abs() <= EPS_M && on_segment(b1, b2, a2))
    {
        return true;
    }

    let a_crosses = (o1 > EPS_M && o2 < -EPS_M) || (o1 < -EPS_M && o2 > EPS_M);
    let b_crosses = (o3 > EPS_M && o4 < -EPS_M) || (o3 < -EPS_M && o4 > EPS_M);
    a_crosses && b_crosses
}

/// Ray-casting point-in-polygon test. Rings with fewer than 3 vertices contain nothing.
pub fn point_in_polygon(lat: f64, lon: f64, polygon: &[LonLat]) -> bool {
    let n = polygon.len();
    if n < 3 {
        return false;
    }

    let mut inside = false;
    let mut j = n - 1;
    for i in 0..n {
        let (xi, yi) = (polygon[i][0], polygon[i][1]);
        let (xj, yj) = (polygon[j][0], polygon[j][1]);
        if ((yi > lat) != (yj > lat)) && (lon < (xj - xi) * (lat - yi) / (yj - yi) + xi) {
            inside = !inside;
        }
        j = i;
    }
    inside
}

/// Approximate planar area of a ring in square meters (shoelace on a local projection).
pub fn polygon_area_m2(polygon: &[LonLat]) -> f64 {
    if polygon.len() < 3 {
        return 0.0;
    }
    let ref_lat = polygon.iter().map(|p| p[1]).sum::<f64>() / polygon.len() as f64;
    let ref_lon = polygon[0][0];
    let xy: Vec<(f64, f64)> = polygon
        .iter()
        .map(|p| {
            (
                lon_to_meters(p[0] - ref_lon, ref_lat),
                lat_to_meters(p[1] - ref_lat, ref_lat),
            )
        })
        .collect();

    let mut twice_area = 0.0;
    for i in 0..xy.len() {
        let (x1, y1) = xy[i];
        let (x2, y2) = xy[(i + 1) % xy.len()];
        twice_area += x1 * y2 - x2 * y1;
    }
    (twice_area / 2.0).abs()
}

/// Minimum distance in meters from a polyline to a polygon ring.
///
/// Zero when any vertex lies inside the polygon or any segment crosses its
/// boundary. `None` when either geometry is degenerate.
pub fn polyline_to_polygon_distance_m(polyline: &[LonLat], polygon: &[LonLat]) -> Option<f64> {
    if polyline.is_empty() || polygon.len() < 3 {
        return None;
    }

    if polyline
        .iter()
        .any(|p| point_in_polygon(p[1], p[0], polygon))
    {
        return Some(0.0);
    }

    let ring: Vec<(LonLat, LonLat)> = (0..polygon.len())
        .map(|i| (polygon[i], polygon[(i + 1) % polygon.len()]))
        .collect();

    let mut best = f64::INFINITY;
    if polyline.len() == 1 {
        let p = polyline[0];
        for (r1, r2) in &ring {
            best = best.min(distance_to_segment_m(p[1], p[0], r1[1], r1[0], r2[1], r2[0]));
        }
        return Some(best);
    }

    for pair in polyline.windows(2) {
        for (r1, r2) in &ring {
            let d = segment_to_segment_distance(pair[0], pair[1], *r1, *r2);
            if d < best {
                best = d;
                if best <= 0.0 {
                    return Some(0.0);
                }
            }
        }
    }
    Some(best)
}

/// Axis-aligned bounding box in degrees.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BoundingBox {
    pub min_lon: f64,
    pub min_lat: f64,
    pub max_lon: f64,
    pub max_lat: f64,
}

impl BoundingBox {
    pub fn from_points(points: &[LonLat]) -> Option<Self> {
        let first = points.first()?;
        let mut bbox = Self {
            min_lon: first[0],
            min_lat: first[1],
            max_lon: first[0],
            max_lat: first[1],
        };
        for p in &points[1..] {
            bbox.min_lon = bbox.min_lon.min(p[0]);
            bbox.min_lat = bbox.min_lat.min(p[1]);
            bbox.max_lon = bbox.max_lon.max(p[0]);
            bbox.max_lat = bbox.max_lat.max(p[1]);
        }
        Some(bbox)
    }

    /// Grow the box by a metric margin on every side.
    pub fn expanded_by_m(&self, margin_m: f64) -> Self {
        let ref_lat = (self.min_lat + self.max_lat) / 2.0;
        let dlat = meters_to_lat(margin_m, ref_lat);
        // Use the higher-latitude edge so the longitude margin is never undersized.
        let edge_lat = self.min_lat.abs().max(self.max_lat.abs()).min(89.0);
        let dlon = meters_to_lon(margin_m, edge_lat);
        Self {
            min_lon: self.min_lon - dlon,
            min_lat: self.min_lat - dlat,
            max_lon: self.max_lon + dlon,
            max_lat: self.max_lat + dlat,
        }
    }

    pub fn intersects(&self, other: &BoundingBox) -> bool {
        self.min_lon <= other.max_lon
            && other.min_lon <= self.max_lon
            && self.min_lat <= other.max_lat
            && other.min_lat <= self.max_lat
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn square(center_lat: f64, center_lon: f64, half_m: f64) -> Vec<LonLat> {
        let dlat = meters_to_lat(half_m, center_lat);
        let dlon = meters_to_lon(half_m, center_lat);
        vec![
            [center_lon - dlon, center_lat - dlat],
            [center_lon + dlon, center_lat - dlat],
            [center_lon + dlon, center_lat + dlat],
            [center_lon - dlon, center_lat + dlat],
        ]
    }

    #[test]
    fn test_haversine_known_distance() {
        // ~111km between these points (1 degree latitude)
        let dist = haversine_distance(0.0, 0.0, 1.0, 0.0);
        assert!((dist - 111_194.0).abs() < 100.0);
    }

    #[test]
    fn validate_coordinate_rejects_out_of_range() {
        assert!(validate_coordinate(45.0, 120.0).is_ok());
        assert!(validate_coordinate(-90.0, 180.0).is_ok());
        assert_eq!(
            validate_coordinate(91.0, 0.0),
            Err(HazardError::InvalidCoordinate { lat: 91.0, lon: 0.0 })
        );
        assert!(validate_coordinate(0.0, -180.5).is_err());
        assert!(validate_coordinate(f64::NAN, 0.0).is_err());
    }

    #[test]
    fn segment_to_segment_distance_detects_crossing_segments() {
        let base_lat = 33.0;
        let base_lon = -117.0;
        let delta = meters_to_lat(100.0, base_lat);

        let dist = segment_to_segment_distance(
            [base_lon, base_lat],
            [base_lon + delta, base_lat + delta],
            [base_lon, base_lat + delta],
            [base_lon + delta, base_lat],
        );
        assert!(dist < 0.001, "expected crossing distance 0, got {dist}");
    }

    #[test]
    fn polyline_inside_polygon_has_zero_distance() {
        let polygon = square(34.0, -118.0, 200.0);
        let line = vec![[-118.0, 34.0], [-118.0005, 34.0]];
        assert_eq!(polyline_to_polygon_distance_m(&line, &polygon), Some(0.0));
    }

    #[test]
    fn polyline_distance_to_polygon_matches_offset() {
        let polygon = square(34.0, -118.0, 50.0);
        let north = 34.0 + meters_to_lat(550.0, 34.0);
        let line = vec![[-118.01, north], [-117.99, north]];
        let dist = polyline_to_polygon_distance_m(&line, &polygon).unwrap();
        assert!((dist - 500.0).abs() < 2.0, "got {dist}");
    }

    #[test]
    fn degenerate_polygon_has_no_distance() {
        let line = vec![[-118.0, 34.0], [-117.9, 34.0]];
        assert_eq!(
            polyline_to_polygon_distance_m(&line, &[[-118.0, 34.0], [-117.9, 34.0]]),
            None
        );
        assert_eq!(polygon_area_m2(&[[-118.0, 34.0]]), 0.0);
    }

    #[test]
    fn polygon_area_of_square() {
        let area = polygon_area_m2(&square(10.0, 10.0, 500.0));
        assert!((area - 1_000_000.0).abs() < 5_000.0, "got {area}");
    }

    #[test]
    fn expanded_bbox_reaches_neighbor() {
        let a = BoundingBox::from_points(&[[0.0, 0.0], [0.001, 0.001]]).unwrap();
        let b = BoundingBox::from_points(&[[0.01, 0.0], [0.011, 0.001]]).unwrap();
        assert!(!a.intersects(&b));
        assert!(a.expanded_by_m(1_500.0).intersects(&b));
    }
}
