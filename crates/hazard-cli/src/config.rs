//! Engine configuration from file and environment.

use std::env;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use hazard_core::EngineConfig;

use crate::input::read_json;

pub const CONFIG_ENV: &str = "HAZARD_CONFIG";

/// Load configuration from `path` (or `HAZARD_CONFIG`), then apply
/// environment overrides and validate.
pub fn load_config(path: Option<&Path>) -> Result<EngineConfig> {
    let path = path
        .map(Path::to_path_buf)
        .or_else(|| env::var(CONFIG_ENV).ok().map(PathBuf::from));

    let mut config = match path {
        Some(path) => {
            tracing::info!("Loading engine config from {}", path.display());
            read_json::<EngineConfig>(&path)?
        }
        None => EngineConfig::default(),
    };
    apply_overrides(&mut config, |key| env::var(key).ok());
    config.validate().context("invalid engine configuration")?;
    Ok(config)
}

/// Apply `HAZARD_*` overrides read through `lookup`. Unparseable values are
/// ignored with a warning.
pub fn apply_overrides(config: &mut EngineConfig, lookup: impl Fn(&str) -> Option<String>) {
    if let Some(resolution) = parse_var(&lookup, "HAZARD_H3_RESOLUTION") {
        config.risk.h3_resolution = resolution;
    }
    if let Some(buffer) = parse_var(&lookup, "HAZARD_BUFFER_M") {
        config.graph.buffer_distance_m = buffer;
    }
    if let Some(hours) = parse_var(&lookup, "HAZARD_SPREAD_HORIZON_H") {
        config.risk.spread_horizon_hours = hours;
    }
}

fn parse_var<T: std::str::FromStr>(lookup: &impl Fn(&str) -> Option<String>, key: &str) -> Option<T> {
    let raw = lookup(key)?;
    let parsed = raw.trim().parse().ok();
    if parsed.is_none() {
        tracing::warn!("Ignoring {}={:?}: not a valid value", key, raw);
    }
    parsed
}
