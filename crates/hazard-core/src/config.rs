//! Engine-wide configuration.

use serde::{Deserialize, Serialize};

use crate::cache::CacheConfig;
use crate::error::Result;
use crate::evacuation::EvacuationConfig;
use crate::graph::GraphConfig;
use crate::route_engine::SearchConfig;
use crate::rules::RiskRules;

/// Every tunable of the risk engine and router. Missing sections and fields
/// take their defaults when deserialized.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub risk: RiskRules,
    pub graph: GraphConfig,
    pub search: SearchConfig,
    pub evacuation: EvacuationConfig,
    pub cache: CacheConfig,
}

impl EngineConfig {
    pub fn validate(&self) -> Result<()> {
        self.risk.validate()?;
        self.graph.validate()?;
        self.search.validate()?;
        self.evacuation.validate()?;
        self.cache.validate()
    }

    pub fn from_json(json: &str) -> std::result::Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }
}
