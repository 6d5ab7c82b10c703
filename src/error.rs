//! Error types for topology construction.

use thiserror::Error;

use crate::simulation::types::MoteId;

/// Result type for topology operations.
pub type Result<T> = std::result::Result<T, TopologyError>;

/// Errors that can occur while building, reading or writing a topology.
#[derive(Debug, Error)]
pub enum TopologyError {
    /// No mote carries the root role.
    #[error("configuration error: no mote is designated as root")]
    MissingRoot,

    /// More than one mote carries the root role.
    #[error("configuration error: multiple root motes designated: {0:?}")]
    MultipleRoots(Vec<MoteId>),

    /// A mote id was referenced that is not part of the registry.
    #[error("unknown mote {0}")]
    UnknownMote(MoteId),

    /// Placement ran out of attempts for a mote.
    #[error("topology infeasible: mote {mote} found no position with enough stable neighbors after {attempts} attempts")]
    Infeasible { mote: MoteId, attempts: u32 },

    /// A position lies outside the configured square.
    #[error("mote {mote} position ({x}, {y}) lies outside the square [0, {side}]")]
    OutOfBounds { mote: MoteId, x: f64, y: f64, side: f64 },

    /// A recorded position coincides with an already placed mote.
    #[error("mote {mote} shares its position with mote {other}")]
    CoincidentMotes { mote: MoteId, other: MoteId },

    /// A persisted topology record could not be decoded.
    #[error("failed to deserialize topology record {record}: {reason}")]
    Deserialize { record: usize, reason: String },

    /// Settings failed validation.
    #[error("invalid settings: {0}")]
    InvalidSettings(String),

    /// Calibration table failed validation.
    #[error("invalid calibration table: {0}")]
    InvalidCalibration(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON encoding or decoding error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// TOML configuration error
    #[error("config error: {0}")]
    Config(#[from] toml::de::Error),
}
