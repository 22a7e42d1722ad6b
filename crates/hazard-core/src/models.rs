//! Core data models for hazard assessment and routing.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use h3o::CellIndex;
use serde::{Deserialize, Serialize};
use serde_with::{serde_as, DisplayFromStr};

use crate::spatial::LonLat;

// ========== HAZARDS ==========

/// Ordered hazard level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Low,
    Medium,
    High,
    Critical,
}

impl Severity {
    pub const ALL: [Severity; 4] = [
        Severity::Low,
        Severity::Medium,
        Severity::High,
        Severity::Critical,
    ];
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HazardType {
    #[default]
    Fire,
    Flood,
    Chemical,
    Other,
}

/// One raw sensor or satellite reading.
///
/// Location and timestamp are optional on the wire so that malformed records
/// can be counted instead of failing deserialization of the whole batch.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HazardDetection {
    #[serde(default)]
    pub latitude: Option<f64>,
    #[serde(default)]
    pub longitude: Option<f64>,
    /// Brightness or radiative intensity
    #[serde(default, alias = "brightness")]
    pub intensity: Option<f64>,
    #[serde(default)]
    pub timestamp: Option<DateTime<Utc>>,
    #[serde(default)]
    pub source: String,
    #[serde(default)]
    pub hazard_type: HazardType,
}

impl HazardDetection {
    pub fn new(lat: f64, lon: f64, intensity: f64, timestamp: DateTime<Utc>) -> Self {
        Self {
            latitude: Some(lat),
            longitude: Some(lon),
            intensity: Some(intensity),
            timestamp: Some(timestamp),
            source: String::new(),
            hazard_type: HazardType::Fire,
        }
    }

    pub fn with_type(mut self, hazard_type: HazardType) -> Self {
        self.hazard_type = hazard_type;
        self
    }

    pub fn with_source(mut self, source: impl Into<String>) -> Self {
        self.source = source.into();
        self
    }
}

/// Ground or forecast weather at a location. Wind components in m/s.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WeatherSample {
    pub latitude: f64,
    pub longitude: f64,
    /// Eastward wind component
    pub wind_u: f64,
    /// Northward wind component
    pub wind_v: f64,
    #[serde(default)]
    pub humidity: Option<f64>,
    #[serde(default)]
    pub temperature: Option<f64>,
}

/// Weather sample after indexing and wind decomposition.
#[serde_as]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WeatherObservation {
    #[serde_as(as = "DisplayFromStr")]
    pub cell: CellIndex,
    pub latitude: f64,
    pub longitude: f64,
    pub wind_speed_mps: f64,
    /// Direction the wind blows from, degrees clockwise from north
    pub wind_direction_deg: f64,
    pub humidity: Option<f64>,
    pub temperature: Option<f64>,
}

impl WeatherObservation {
    /// Direction the wind blows toward, degrees clockwise from north.
    pub fn downwind_bearing_deg(&self) -> f64 {
        (self.wind_direction_deg + 180.0).rem_euclid(360.0)
    }
}

/// A risk-scored, spatially indexed hazard.
#[serde_as]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HazardZone {
    #[serde_as(as = "DisplayFromStr")]
    pub cell: CellIndex,
    pub latitude: f64,
    pub longitude: f64,
    pub hazard_type: HazardType,
    /// Severity implied by the raw intensity readings
    pub observed_severity: Severity,
    /// Severity categorized from `risk_score`
    pub severity: Severity,
    pub confidence: f64,
    pub risk_score: f64,
    pub detection_count: usize,
    pub first_detected: DateTime<Utc>,
    pub last_detected: DateTime<Utc>,
    pub affected_population: u64,
    #[serde_as(as = "Vec<DisplayFromStr>")]
    pub spread_cells: Vec<CellIndex>,
    /// Default wind was used because no weather sample was close enough
    pub weather_fallback: bool,
    /// Hazard outline as a `[lon, lat]` ring
    pub footprint: Vec<LonLat>,
}

/// All zones produced by one processing cycle.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HazardSnapshot {
    pub version: u64,
    pub generated_at: DateTime<Utc>,
    pub zones: Vec<HazardZone>,
    pub detections: crate::hazard::BatchSummary,
    pub weather: crate::hazard::BatchSummary,
}

/// A census or planning unit used for exposure estimates.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PopulationUnit {
    pub id: String,
    pub latitude: f64,
    pub longitude: f64,
    pub population: u64,
}

// ========== ROAD NETWORK ==========

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RoadClass {
    Motorway,
    Trunk,
    Primary,
    Secondary,
    Tertiary,
    Residential,
    Service,
    #[default]
    Unclassified,
}

/// One drivable road edge.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoadSegment {
    pub id: String,
    /// Ordered `[lon, lat]` pairs
    pub geometry: Vec<LonLat>,
    /// Overrides the length measured from `geometry`
    #[serde(default)]
    pub length_m: Option<f64>,
    pub speed_limit_kmh: f64,
    #[serde(default)]
    pub road_class: RoadClass,
    /// Bridge weight limit in tonnes
    #[serde(default)]
    pub bridge_weight_limit_t: Option<f64>,
    #[serde(default)]
    pub height_limit_m: Option<f64>,
    #[serde(default)]
    pub width_limit_m: Option<f64>,
    #[serde(default)]
    pub is_bridge: bool,
    #[serde(default)]
    pub is_tunnel: bool,
    #[serde(default)]
    pub oneway: bool,
}

impl RoadSegment {
    pub fn new(id: impl Into<String>, geometry: Vec<LonLat>, speed_limit_kmh: f64) -> Self {
        Self {
            id: id.into(),
            geometry,
            length_m: None,
            speed_limit_kmh,
            road_class: RoadClass::Unclassified,
            bridge_weight_limit_t: None,
            height_limit_m: None,
            width_limit_m: None,
            is_bridge: false,
            is_tunnel: false,
            oneway: false,
        }
    }

    pub fn with_class(mut self, road_class: RoadClass) -> Self {
        self.road_class = road_class;
        self
    }

    pub fn with_weight_limit(mut self, tonnes: f64) -> Self {
        self.bridge_weight_limit_t = Some(tonnes);
        self.is_bridge = true;
        self
    }
}

/// Congestion level in [0, 1] keyed by road segment id.
pub type TrafficReport = HashMap<String, f64>;

/// Physical constraints of a vehicle class.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VehicleProfile {
    pub name: String,
    /// Gross weight in tonnes
    pub max_weight_t: f64,
    pub height_m: f64,
    pub width_m: f64,
    /// Empty means every class is acceptable
    #[serde(default)]
    pub preferred_road_classes: Vec<RoadClass>,
}

impl VehicleProfile {
    pub fn fire_engine() -> Self {
        Self {
            name: "fire_engine".to_string(),
            max_weight_t: 20.0,
            height_m: 3.4,
            width_m: 2.55,
            preferred_road_classes: vec![
                RoadClass::Motorway,
                RoadClass::Trunk,
                RoadClass::Primary,
                RoadClass::Secondary,
                RoadClass::Tertiary,
            ],
        }
    }

    pub fn ambulance() -> Self {
        Self {
            name: "ambulance".to_string(),
            max_weight_t: 5.0,
            height_m: 2.8,
            width_m: 2.3,
            preferred_road_classes: Vec::new(),
        }
    }

    pub fn civilian() -> Self {
        Self {
            name: "civilian".to_string(),
            max_weight_t: 2.0,
            height_m: 1.8,
            width_m: 1.9,
            preferred_road_classes: Vec::new(),
        }
    }

    /// Look up a built-in profile by name.
    pub fn named(name: &str) -> Option<Self> {
        match name.to_ascii_lowercase().replace('-', "_").as_str() {
            "fire_engine" | "engine" => Some(Self::fire_engine()),
            "ambulance" => Some(Self::ambulance()),
            "civilian" | "car" => Some(Self::civilian()),
            _ => None,
        }
    }

    pub fn prefers(&self, road_class: RoadClass) -> bool {
        self.preferred_road_classes.is_empty() || self.preferred_road_classes.contains(&road_class)
    }
}

// ========== EVACUATION ==========

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EvacuationZone {
    pub id: String,
    pub latitude: f64,
    pub longitude: f64,
    #[serde(default)]
    pub population: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Shelter {
    pub id: String,
    pub latitude: f64,
    pub longitude: f64,
    #[serde(default)]
    pub capacity: Option<u64>,
}
