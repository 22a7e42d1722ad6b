//! Risk rules, multiplier tables, and thresholds for hazard assessment.
//!
//! Every table here is a configuration default, not a calibrated model.

use serde::{Deserialize, Serialize};

use crate::error::{HazardError, Result};
use crate::models::{HazardType, Severity};

/// Score multipliers per severity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SeverityTable {
    pub low: f64,
    pub medium: f64,
    pub high: f64,
    pub critical: f64,
}

impl SeverityTable {
    pub fn get(&self, severity: Severity) -> f64 {
        match severity {
            Severity::Low => self.low,
            Severity::Medium => self.medium,
            Severity::High => self.high,
            Severity::Critical => self.critical,
        }
    }

    fn is_monotonic(&self) -> bool {
        self.low >= 0.0 && self.low <= self.medium && self.medium <= self.high && self.high <= self.critical
    }
}

impl Default for SeverityTable {
    fn default() -> Self {
        Self {
            low: 0.5,
            medium: 1.0,
            high: 2.0,
            critical: 4.0,
        }
    }
}

/// Relative danger of hazard categories.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HazardTypeTable {
    pub fire: f64,
    pub flood: f64,
    pub chemical: f64,
    pub other: f64,
}

impl HazardTypeTable {
    pub fn get(&self, hazard_type: HazardType) -> f64 {
        match hazard_type {
            HazardType::Fire => self.fire,
            HazardType::Flood => self.flood,
            HazardType::Chemical => self.chemical,
            HazardType::Other => self.other,
        }
    }
}

impl Default for HazardTypeTable {
    fn default() -> Self {
        Self {
            fire: 1.0,
            flood: 0.8,
            chemical: 1.5,
            other: 0.7,
        }
    }
}

/// Lower score bounds for each severity above `low`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RiskThresholds {
    pub medium: f64,
    pub high: f64,
    pub critical: f64,
}

impl RiskThresholds {
    /// Map a score to exactly one severity. Total over all inputs; NaN and
    /// negative scores are `Low`.
    pub fn categorize(&self, score: f64) -> Severity {
        if score >= self.critical {
            Severity::Critical
        } else if score >= self.high {
            Severity::High
        } else if score >= self.medium {
            Severity::Medium
        } else {
            Severity::Low
        }
    }

    pub fn validate(&self) -> Result<()> {
        let ordered = self.medium.is_finite()
            && self.high.is_finite()
            && self.critical.is_finite()
            && self.medium > 0.0
            && self.medium < self.high
            && self.high < self.critical;
        if !ordered {
            return Err(HazardError::InvalidConfig(format!(
                "risk thresholds must satisfy 0 < medium < high < critical (got {} / {} / {})",
                self.medium, self.high, self.critical
            )));
        }
        Ok(())
    }
}

impl Default for RiskThresholds {
    fn default() -> Self {
        Self {
            medium: 1.0,
            high: 2.0,
            critical: 3.0,
        }
    }
}

/// Configuration for the hazard risk engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RiskRules {
    /// H3 resolution for the spatial join key
    pub h3_resolution: u8,
    /// Intensity mapped to the lowest confidence
    pub min_intensity: f64,
    /// Intensity mapped to full confidence
    pub max_intensity: f64,
    /// Used when a detection has no intensity reading
    pub median_intensity: f64,
    /// Floor for confidence so "no hazard" is never asserted with certainty
    pub min_confidence: f64,
    /// Normalized-intensity lower bounds for observed medium/high/critical
    pub intensity_bands: RiskThresholds,
    pub severity_multipliers: SeverityTable,
    pub type_multipliers: HazardTypeTable,
    pub thresholds: RiskThresholds,
    /// Score gain per unit of `wind_speed / reference_wind_mps`; zero keeps the model linear
    pub wind_amplification: f64,
    pub reference_wind_mps: f64,
    /// Weather farther than this from a zone is ignored
    pub max_weather_distance_km: f64,
    pub default_wind_speed_mps: f64,
    /// Meteorological "from" direction used when no weather is available
    pub default_wind_direction_deg: f64,
    /// Spread probability multiplier when default wind is used
    pub fallback_confidence_factor: f64,
    pub spread_base_rate_km_per_hour: f64,
    pub spread_horizon_hours: u32,
    /// Exposure radius per severity
    pub population_buffer_km: SeverityTable,
}

impl Default for RiskRules {
    fn default() -> Self {
        Self {
            h3_resolution: crate::cells::DEFAULT_RESOLUTION,
            min_intensity: 300.0,
            max_intensity: 500.0,
            median_intensity: 350.0,
            min_confidence: 0.1,
            intensity_bands: RiskThresholds {
                medium: 0.25,
                high: 0.5,
                critical: 0.75,
            },
            severity_multipliers: SeverityTable::default(),
            type_multipliers: HazardTypeTable::default(),
            thresholds: RiskThresholds::default(),
            wind_amplification: 0.0,
            reference_wind_mps: 5.0,
            max_weather_distance_km: 50.0,
            default_wind_speed_mps: 5.0,
            default_wind_direction_deg: 270.0,
            fallback_confidence_factor: 0.5,
            spread_base_rate_km_per_hour: 1.0,
            spread_horizon_hours: 6,
            population_buffer_km: SeverityTable {
                low: 1.0,
                medium: 3.0,
                high: 5.0,
                critical: 10.0,
            },
        }
    }
}

impl RiskRules {
    pub fn validate(&self) -> Result<()> {
        crate::cells::parse_resolution(self.h3_resolution)?;
        if !(self.max_intensity > self.min_intensity) {
            return Err(HazardError::InvalidConfig(
                "max_intensity must exceed min_intensity".to_string(),
            ));
        }
        if !(0.0..=1.0).contains(&self.min_confidence) || self.min_confidence <= 0.0 {
            return Err(HazardError::InvalidConfig(
                "min_confidence must be in (0, 1]".to_string(),
            ));
        }
        self.thresholds.validate()?;
        self.intensity_bands.validate()?;
        if !self.severity_multipliers.is_monotonic() {
            return Err(HazardError::InvalidConfig(
                "severity multipliers must be non-negative and non-decreasing".to_string(),
            ));
        }
        if !self.population_buffer_km.is_monotonic() {
            return Err(HazardError::InvalidConfig(
                "population buffers must be non-negative and non-decreasing".to_string(),
            ));
        }
        if self.reference_wind_mps <= 0.0 {
            return Err(HazardError::InvalidConfig(
                "reference_wind_mps must be positive".to_string(),
            ));
        }
        for (name, value) in [
            ("max_weather_distance_km", self.max_weather_distance_km),
            ("default_wind_speed_mps", self.default_wind_speed_mps),
            ("spread_base_rate_km_per_hour", self.spread_base_rate_km_per_hour),
        ] {
            if !(value.is_finite() && value >= 0.0) {
                return Err(HazardError::InvalidConfig(format!(
                    "{name} must be finite and non-negative"
                )));
            }
        }
        Ok(())
    }
}
