//! Error taxonomy shared by the risk engine and the router.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, HazardError>;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum HazardError {
    #[error("invalid coordinate: lat={lat}, lon={lon}")]
    InvalidCoordinate { lat: f64, lon: f64 },

    #[error("missing required field: {0}")]
    MissingRequiredField(&'static str),

    #[error("road network is empty")]
    EmptyRoadNetwork,

    #[error("no path found between origin and destination")]
    NoPathFound,

    /// Origin or destination is farther than the snap tolerance from every road.
    #[error("{endpoint} at ({lat}, {lon}) is more than {max_snap_m} m from any road segment")]
    UnreachableEndpoint {
        endpoint: &'static str,
        lat: f64,
        lon: f64,
        max_snap_m: f64,
    },

    #[error("search requested before a routing graph was loaded")]
    GraphNotReady,

    /// A search input was rejected; carries the original error text.
    #[error("invalid routing input: {0}")]
    InvalidInput(String),

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}
