//! JSON input loading.

use std::fmt;
use std::fs;
use std::path::Path;
use std::str::FromStr;

use anyhow::{Context, Result};
use chrono::Utc;
use hazard_core::{BatchSummary, HazardSnapshot, HazardZone};
use serde::de::DeserializeOwned;
use serde::Deserialize;

pub fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let text = fs::read_to_string(path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    serde_json::from_str(&text).with_context(|| format!("failed to parse {}", path.display()))
}

/// Read an optional input, using the type's default when no path is given.
pub fn read_optional<T: DeserializeOwned + Default>(path: Option<&Path>) -> Result<T> {
    match path {
        Some(path) => read_json(path),
        None => Ok(T::default()),
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum ZoneSource {
    Snapshot(HazardSnapshot),
    Zones(Vec<HazardZone>),
}

/// Read hazard zones from either a full snapshot or a bare zone list.
///
/// A bare list is wrapped in a version-0 snapshot.
pub fn read_zones(path: Option<&Path>) -> Result<HazardSnapshot> {
    let source = match path {
        Some(path) => read_json(path)?,
        None => ZoneSource::Zones(Vec::new()),
    };
    Ok(match source {
        ZoneSource::Snapshot(snapshot) => snapshot,
        ZoneSource::Zones(zones) => HazardSnapshot {
            version: 0,
            generated_at: Utc::now(),
            zones,
            detections: BatchSummary::default(),
            weather: BatchSummary::default(),
        },
    })
}

/// A `LAT,LON` command line coordinate.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LatLon {
    pub lat: f64,
    pub lon: f64,
}

impl LatLon {
    pub fn as_tuple(&self) -> (f64, f64) {
        (self.lat, self.lon)
    }
}

impl FromStr for LatLon {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let (lat, lon) = s
            .split_once(',')
            .ok_or_else(|| format!("expected LAT,LON but got '{s}'"))?;
        let parse = |v: &str| {
            v.trim()
                .parse::<f64>()
                .map_err(|_| format!("'{}' is not a number", v.trim()))
        };
        Ok(Self {
            lat: parse(lat)?,
            lon: parse(lon)?,
        })
    }
}

impl fmt::Display for LatLon {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{},{}", self.lat, self.lon)
    }
}
