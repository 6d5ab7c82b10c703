//! Topology settings and their TOML loading.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::{Result, TopologyError};
use crate::simulation::rssi_pdr_table::CalibrationTable;
use crate::simulation::signal_calculations::PropagationParameters;

/// Default side of the deployment square (grid units, 2 km at the default scale).
pub const DEFAULT_SQUARE_SIDE: f64 = 2.0;
/// Default number of stable neighbors each mote must reach.
pub const DEFAULT_STABLE_NEIGHBORS: u32 = 3;
/// Default RSSI threshold of a stable link (dBm), the 50% PDR point of the
/// default calibration table.
pub const DEFAULT_STABLE_RSSI: f64 = -93.6;
/// Default number of rejected candidates tolerated per mote.
pub const DEFAULT_MAX_PLACEMENT_ATTEMPTS: u32 = 10_000;

/// Where mote positions come from and whether the result is stored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PersistenceMode {
    /// Random placement, nothing stored.
    #[default]
    Generate,
    /// Replay positions from `topology-file`.
    Read,
    /// Random placement, then store to `topology-file`.
    Write,
}

/// On-disk representation of a stored topology.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TopologyFileFormat {
    /// Self-describing JSON document keyed by mote id.
    #[default]
    Json,
    /// Positional text records: `x y pdr...`, one line per mote.
    Legacy,
}

/// Settings of one topology build. Immutable for the duration of the build.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct TopologySettings {
    /// Side of the deployment square (grid units).
    pub square_side: f64,
    /// Required number of stable neighbors (K).
    pub stable_neighbors: u32,
    /// Minimum RSSI of a stable neighbor (T, dBm).
    pub stable_rssi: f64,
    pub persistence: PersistenceMode,
    pub topology_file: Option<PathBuf>,
    pub file_format: TopologyFileFormat,
    /// Rejected candidates tolerated per mote before giving up.
    pub max_placement_attempts: u32,
    /// Seed of the build RNG; entropy when absent.
    pub seed: Option<u64>,
    pub propagation: PropagationParameters,
    /// Custom calibration table; the measured 2.4 GHz table when absent.
    pub calibration: Option<CalibrationTable>,
}

impl Default for TopologySettings {
    fn default() -> Self {
        Self {
            square_side: DEFAULT_SQUARE_SIDE,
            stable_neighbors: DEFAULT_STABLE_NEIGHBORS,
            stable_rssi: DEFAULT_STABLE_RSSI,
            persistence: PersistenceMode::Generate,
            topology_file: None,
            file_format: TopologyFileFormat::Json,
            max_placement_attempts: DEFAULT_MAX_PLACEMENT_ATTEMPTS,
            seed: None,
            propagation: PropagationParameters::default(),
            calibration: None,
        }
    }
}

impl TopologySettings {
    /// Load settings from a TOML file. Missing keys take their defaults.
    ///
    /// # Arguments
    /// * `config_path` - Path to the TOML file
    ///
    /// # Returns
    /// * `Ok(TopologySettings)` if the file was read, parsed and validated
    /// * `Err(TopologyError)` otherwise
    pub fn load(config_path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(config_path)?;
        Self::from_toml_str(&content)
    }

    pub fn from_toml_str(content: &str) -> Result<Self> {
        let settings: TopologySettings = toml::from_str(content)?;
        settings.validate()?;
        Ok(settings)
    }

    /// Reject settings that would make a build meaningless or unbounded.
    pub fn validate(&self) -> Result<()> {
        if !(self.square_side.is_finite() && self.square_side > 0.0) {
            return Err(TopologyError::InvalidSettings(format!("square-side must be positive, got {}", self.square_side)));
        }
        if !self.stable_rssi.is_finite() {
            return Err(TopologyError::InvalidSettings(format!("stable-rssi must be finite, got {}", self.stable_rssi)));
        }
        if self.max_placement_attempts == 0 {
            return Err(TopologyError::InvalidSettings("max-placement-attempts must be at least 1".to_string()));
        }
        if matches!(self.persistence, PersistenceMode::Read | PersistenceMode::Write) && self.topology_file.is_none() {
            return Err(TopologyError::InvalidSettings(format!(
                "persistence mode {:?} requires topology-file",
                self.persistence
            )));
        }
        self.propagation.validate()?;
        if let Some(table) = &self.calibration {
            table.validate()?;
        }
        Ok(())
    }

    /// The calibration table in effect.
    pub fn calibration_table(&self) -> CalibrationTable {
        self.calibration.clone().unwrap_or_default()
    }
}
