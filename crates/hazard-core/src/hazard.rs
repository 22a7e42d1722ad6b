//! Hazard risk engine.
//!
//! Turns noisy detections and weather samples into comparable, risk-scored
//! hazard zones keyed by spatial cell, with short-horizon spread projection.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use h3o::CellIndex;
use serde::{Deserialize, Serialize};

use crate::cells::{self, SpatialIndexer};
use crate::error::{HazardError, Result};
use crate::models::{
    HazardDetection, HazardSnapshot, HazardType, HazardZone, PopulationUnit, Severity,
    WeatherObservation, WeatherSample,
};
use crate::rules::RiskRules;
use crate::spatial::{haversine_distance, offset_by_bearing};

/// Per-batch data-quality counters. Skipped records never abort a batch.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchSummary {
    pub received: usize,
    pub accepted: usize,
    pub missing_location: usize,
    pub missing_timestamp: usize,
    pub invalid_coordinate: usize,
    pub invalid_value: usize,
    /// Accepted records whose intensity fell back to the configured median
    pub defaulted_intensity: usize,
}

impl BatchSummary {
    pub fn skipped(&self) -> usize {
        self.missing_location + self.missing_timestamp + self.invalid_coordinate + self.invalid_value
    }

    fn record_skip(&mut self, err: &HazardError) {
        match err {
            HazardError::MissingRequiredField("timestamp") => self.missing_timestamp += 1,
            HazardError::MissingRequiredField(_) => self.missing_location += 1,
            HazardError::InvalidCoordinate { .. } => self.invalid_coordinate += 1,
            _ => self.invalid_value += 1,
        }
    }
}

#[derive(Debug, Clone)]
pub struct DetectionBatch {
    pub zones: Vec<HazardZone>,
    pub summary: BatchSummary,
}

#[derive(Debug, Clone)]
pub struct WeatherBatch {
    pub observations: Vec<WeatherObservation>,
    pub summary: BatchSummary,
}

/// One hourly step of a spread projection.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SpreadStep {
    pub hour: u32,
    pub distance_km: f64,
    pub latitude: f64,
    pub longitude: f64,
    pub cell: CellIndex,
}

/// Lazy, finite projection of a zone along the downwind bearing.
///
/// Holds no reference to the engine; every `predict_spread` call starts a
/// fresh sequence.
#[derive(Debug, Clone)]
pub struct SpreadSteps {
    origin_lat: f64,
    origin_lon: f64,
    bearing_rad: f64,
    km_per_hour: f64,
    resolution: u8,
    hour: u32,
    horizon: u32,
}

impl Iterator for SpreadSteps {
    type Item = SpreadStep;

    fn next(&mut self) -> Option<Self::Item> {
        if self.hour >= self.horizon {
            return None;
        }
        self.hour += 1;
        let distance_km = self.km_per_hour * self.hour as f64;
        let (latitude, longitude) = offset_by_bearing(
            self.origin_lat,
            self.origin_lon,
            distance_km * 1000.0,
            self.bearing_rad,
        );
        match cells::index(latitude, longitude, self.resolution) {
            Ok(cell) => Some(SpreadStep {
                hour: self.hour,
                distance_km,
                latitude,
                longitude,
                cell,
            }),
            Err(_) => {
                self.hour = self.horizon;
                None
            }
        }
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (0, Some(self.horizon.saturating_sub(self.hour) as usize))
    }
}

#[derive(Debug, Clone)]
struct AcceptedDetection {
    lat: f64,
    lon: f64,
    intensity: f64,
    timestamp: DateTime<Utc>,
    hazard_type: HazardType,
}

/// Risk scoring and spread projection over one set of rules.
#[derive(Debug, Clone)]
pub struct HazardRiskEngine {
    rules: RiskRules,
    indexer: SpatialIndexer,
    last_version: u64,
}

impl HazardRiskEngine {
    pub fn new(rules: RiskRules) -> Result<Self> {
        rules.validate()?;
        let indexer = SpatialIndexer::new(rules.h3_resolution)?;
        Ok(Self {
            rules,
            indexer,
            last_version: 0,
        })
    }

    pub fn rules(&self) -> &RiskRules {
        &self.rules
    }

    /// Linear confidence from intensity, clamped to `[min_confidence, 1.0]`.
    pub fn confidence(&self, intensity: f64) -> f64 {
        let normalized = self.normalized_intensity(intensity);
        normalized.clamp(self.rules.min_confidence, 1.0)
    }

    fn normalized_intensity(&self, intensity: f64) -> f64 {
        let span = self.rules.max_intensity - self.rules.min_intensity;
        ((intensity - self.rules.min_intensity) / span).clamp(0.0, 1.0)
    }

    fn accept_detection(&self, detection: &HazardDetection) -> Result<(CellIndex, AcceptedDetection, bool)> {
        let (Some(lat), Some(lon)) = (detection.latitude, detection.longitude) else {
            return Err(HazardError::MissingRequiredField("location"));
        };
        let cell = self.indexer.index(lat, lon)?;
        let timestamp = detection
            .timestamp
            .ok_or(HazardError::MissingRequiredField("timestamp"))?;
        let (intensity, defaulted) = match detection.intensity {
            Some(value) if value.is_finite() => (value, false),
            _ => (self.rules.median_intensity, true),
        };
        Ok((
            cell,
            AcceptedDetection {
                lat,
                lon,
                intensity,
                timestamp,
                hazard_type: detection.hazard_type,
            },
            defaulted,
        ))
    }

    /// Group detections by cell into unscored-by-weather hazard zones.
    pub fn ingest_detections(&self, detections: &[HazardDetection]) -> DetectionBatch {
        let mut summary = BatchSummary {
            received: detections.len(),
            ..BatchSummary::default()
        };
        let mut groups: BTreeMap<u64, (CellIndex, Vec<AcceptedDetection>)> = BTreeMap::new();

        for (idx, detection) in detections.iter().enumerate() {
            match self.accept_detection(detection) {
                Ok((cell, accepted, defaulted)) => {
                    summary.accepted += 1;
                    if defaulted {
                        summary.defaulted_intensity += 1;
                    }
                    groups
                        .entry(u64::from(cell))
                        .or_insert_with(|| (cell, Vec::new()))
                        .1
                        .push(accepted);
                }
                Err(err) => {
                    tracing::debug!("Skipping detection {} ({}): {}", idx, detection.source, err);
                    summary.record_skip(&err);
                }
            }
        }

        if summary.skipped() > 0 {
            tracing::warn!(
                "Skipped {} of {} detections ({} missing location, {} missing timestamp, {} invalid coordinate)",
                summary.skipped(),
                summary.received,
                summary.missing_location,
                summary.missing_timestamp,
                summary.invalid_coordinate
            );
        }

        let zones = groups
            .into_values()
            .filter_map(|(cell, group)| self.zone_from_group(cell, &group))
            .collect();

        DetectionBatch { zones, summary }
    }

    fn zone_from_group(&self, cell: CellIndex, group: &[AcceptedDetection]) -> Option<HazardZone> {
        let brightest = group
            .iter()
            .reduce(|best, d| if d.intensity > best.intensity { d } else { best })?;
        let count = group.len() as f64;
        let latitude = group.iter().map(|d| d.lat).sum::<f64>() / count;
        let longitude = group.iter().map(|d| d.lon).sum::<f64>() / count;
        let first_detected = group.iter().map(|d| d.timestamp).min()?;
        let last_detected = group.iter().map(|d| d.timestamp).max()?;

        let confidence = self.confidence(brightest.intensity);
        let observed_severity = self
            .rules
            .intensity_bands
            .categorize(self.normalized_intensity(brightest.intensity));

        let mut zone = HazardZone {
            cell,
            latitude,
            longitude,
            hazard_type: brightest.hazard_type,
            observed_severity,
            severity: Severity::Low,
            confidence,
            risk_score: 0.0,
            detection_count: group.len(),
            first_detected,
            last_detected,
            affected_population: 0,
            spread_cells: Vec::new(),
            weather_fallback: false,
            footprint: cells::cell_boundary(cell),
        };
        zone.risk_score = self.score_risk(&zone, None);
        zone.severity = self.categorize(zone.risk_score);
        Some(zone)
    }

    /// Index weather samples and decompose wind components.
    pub fn ingest_weather(&self, samples: &[WeatherSample]) -> WeatherBatch {
        let mut summary = BatchSummary {
            received: samples.len(),
            ..BatchSummary::default()
        };
        let mut observations = Vec::with_capacity(samples.len());

        for sample in samples {
            if !sample.wind_u.is_finite() || !sample.wind_v.is_finite() {
                summary.invalid_value += 1;
                continue;
            }
            let cell = match self.indexer.index(sample.latitude, sample.longitude) {
                Ok(cell) => cell,
                Err(err) => {
                    summary.record_skip(&err);
                    continue;
                }
            };
            let wind_speed_mps = sample.wind_u.hypot(sample.wind_v);
            let wind_direction_deg = (-sample.wind_u)
                .atan2(-sample.wind_v)
                .to_degrees()
                .rem_euclid(360.0);
            observations.push(WeatherObservation {
                cell,
                latitude: sample.latitude,
                longitude: sample.longitude,
                wind_speed_mps,
                wind_direction_deg,
                humidity: sample.humidity,
                temperature: sample.temperature,
            });
            summary.accepted += 1;
        }

        if summary.skipped() > 0 {
            tracing::warn!(
                "Skipped {} of {} weather samples",
                summary.skipped(),
                summary.received
            );
        }

        WeatherBatch {
            observations,
            summary,
        }
    }

    /// Closest observation within `max_weather_distance_km`, if any.
    pub fn nearest_weather<'a>(
        &self,
        zone: &HazardZone,
        observations: &'a [WeatherObservation],
    ) -> Option<&'a WeatherObservation> {
        let max_m = self.rules.max_weather_distance_km * 1000.0;
        observations
            .iter()
            .map(|obs| {
                let d = haversine_distance(zone.latitude, zone.longitude, obs.latitude, obs.longitude);
                (d, obs)
            })
            .filter(|(d, _)| *d <= max_m)
            .min_by(|a, b| a.0.total_cmp(&b.0))
            .map(|(_, obs)| obs)
    }

    /// `confidence × severity multiplier × type multiplier`, optionally
    /// amplified by wind. Never negative.
    pub fn score_risk(&self, zone: &HazardZone, nearest_weather: Option<&WeatherObservation>) -> f64 {
        let base = zone.confidence
            * self.rules.severity_multipliers.get(zone.observed_severity)
            * self.rules.type_multipliers.get(zone.hazard_type);
        let wind_speed = nearest_weather
            .map(|w| w.wind_speed_mps)
            .unwrap_or(self.rules.default_wind_speed_mps);
        let wind_gain = 1.0 + self.rules.wind_amplification * wind_speed / self.rules.reference_wind_mps;
        let score = base * wind_gain;
        if score.is_finite() {
            score.max(0.0)
        } else {
            0.0
        }
    }

    pub fn categorize(&self, score: f64) -> Severity {
        self.rules.thresholds.categorize(score)
    }

    /// Probability-like spread factor in [0, 1]. Halved without weather.
    pub fn spread_probability(&self, zone: &HazardZone, nearest_weather: Option<&WeatherObservation>) -> f64 {
        let wind_speed = nearest_weather
            .map(|w| w.wind_speed_mps)
            .unwrap_or(self.rules.default_wind_speed_mps);
        let wind_factor = (wind_speed / self.rules.reference_wind_mps).clamp(0.25, 2.0);
        let mut probability = (zone.confidence * wind_factor).clamp(0.0, 1.0);
        if nearest_weather.is_none() {
            probability *= self.rules.fallback_confidence_factor;
        }
        probability
    }

    /// Hourly downwind projection of `zone` out to `horizon_hours`.
    pub fn predict_spread(
        &self,
        zone: &HazardZone,
        nearest_weather: Option<&WeatherObservation>,
        horizon_hours: u32,
    ) -> SpreadSteps {
        let downwind_deg = match nearest_weather {
            Some(weather) => weather.downwind_bearing_deg(),
            None => (self.rules.default_wind_direction_deg + 180.0).rem_euclid(360.0),
        };
        SpreadSteps {
            origin_lat: zone.latitude,
            origin_lon: zone.longitude,
            bearing_rad: downwind_deg.to_radians(),
            km_per_hour: self.spread_probability(zone, nearest_weather)
                * self.rules.spread_base_rate_km_per_hour,
            resolution: self.indexer.resolution(),
            hour: 0,
            horizon: horizon_hours,
        }
    }

    /// Population of every unit whose centroid lies inside the severity buffer.
    pub fn estimate_affected_population(&self, zone: &HazardZone, units: &[PopulationUnit]) -> u64 {
        let radius_m = self.rules.population_buffer_km.get(zone.severity) * 1000.0;
        units
            .iter()
            .filter(|unit| {
                haversine_distance(zone.latitude, zone.longitude, unit.latitude, unit.longitude)
                    <= radius_m
            })
            .fold(0u64, |acc, unit| acc.saturating_add(unit.population))
    }

    /// Run one full processing cycle and stamp a new snapshot version.
    pub fn assess(
        &mut self,
        detections: &[HazardDetection],
        weather: &[WeatherSample],
        population: &[PopulationUnit],
    ) -> HazardSnapshot {
        let detection_batch = self.ingest_detections(detections);
        let weather_batch = self.ingest_weather(weather);

        let zones: Vec<HazardZone> = detection_batch
            .zones
            .into_iter()
            .map(|zone| self.finish_zone(zone, &weather_batch.observations, population))
            .collect();

        self.last_version += 1;
        let fallbacks = zones.iter().filter(|z| z.weather_fallback).count();
        if fallbacks > 0 {
            tracing::warn!("{} of {} zones used default wind", fallbacks, zones.len());
        }
        tracing::debug!(
            "Assessed {} zones from {} detections (snapshot v{})",
            zones.len(),
            detection_batch.summary.accepted,
            self.last_version
        );

        HazardSnapshot {
            version: self.last_version,
            generated_at: Utc::now(),
            zones,
            detections: detection_batch.summary,
            weather: weather_batch.summary,
        }
    }

    fn finish_zone(
        &self,
        mut zone: HazardZone,
        observations: &[WeatherObservation],
        population: &[PopulationUnit],
    ) -> HazardZone {
        let weather = self.nearest_weather(&zone, observations);
        zone.weather_fallback = weather.is_none();
        zone.risk_score = self.score_risk(&zone, weather);
        zone.severity = self.categorize(zone.risk_score);
        zone.spread_cells = self
            .predict_spread(&zone, weather, self.rules.spread_horizon_hours)
            .map(|step| step.cell)
            .collect();
        zone.affected_population = self.estimate_affected_population(&zone, population);
        zone
    }
}
