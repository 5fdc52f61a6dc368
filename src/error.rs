use std::path::PathBuf;

/// Errors raised while building the network index, talking to the simulator,
/// reading configuration or persisting metrics.
#[derive(thiserror::Error, Debug)]
pub enum RerouteError {
    #[error("Road segment '{0}' doesn't exist in the road network")]
    UnknownSegment(String),
    #[error("Vehicle '{0}' is not present in the simulation")]
    UnknownVehicle(String),
    #[error("Invalid road network: {0}")]
    Network(String),
    #[error("Invalid configuration: {0}")]
    Config(String),
    #[error("Simulator error: {0}")]
    Simulator(String),
    #[error("Error accessing metrics store '{path}': {message}")]
    Storage { path: PathBuf, message: String },
    #[error("I/O error on '{path}': {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("Failed to (de)serialize JSON: {0}")]
    Json(#[from] serde_json::Error),
    #[error("Failed to parse TOML: {0}")]
    Toml(#[from] toml::de::Error),
}

impl RerouteError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        RerouteError::Io {
            path: path.into(),
            source,
        }
    }
}
