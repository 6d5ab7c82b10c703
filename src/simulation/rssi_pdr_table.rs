//! RSSI to PDR calibration table.
//!
//! Maps integer RSSI buckets (dBm) to measured packet delivery ratios. Values
//! between buckets are linearly interpolated; values outside the calibrated
//! range clamp to 0 below the lowest bucket and 1 at or above the highest.

use serde::{Deserialize, Serialize};

use crate::error::{Result, TopologyError};

/// Lowest bucket of the default 2.4 GHz table (dBm).
pub const DEFAULT_MIN_BUCKET: i32 = -97;

/// Measured PDR for buckets -97..=-79 dBm. The two end values are not
/// measurements; they anchor the table at 0 and 1. 50% PDR sits near -93.6 dBm.
pub const DEFAULT_PDR_VALUES: [f64; 19] = [
    0.0000, // -97
    0.1494, // -96
    0.2340, // -95
    0.4071, // -94
    0.6359, // -93
    0.6866, // -92
    0.7476, // -91
    0.8603, // -90
    0.8702, // -89
    0.9324, // -88
    0.9427, // -87
    0.9562, // -86
    0.9611, // -85
    0.9739, // -84
    0.9745, // -83
    0.9844, // -82
    0.9854, // -81
    0.9903, // -80
    1.0000, // -79
];

/// Contiguous calibration table starting at `min_bucket`, one value per 1 dB.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct CalibrationTable {
    min_bucket: i32,
    pdr: Vec<f64>,
}

impl Default for CalibrationTable {
    fn default() -> Self {
        Self {
            min_bucket: DEFAULT_MIN_BUCKET,
            pdr: DEFAULT_PDR_VALUES.to_vec(),
        }
    }
}

impl CalibrationTable {
    /// Build a validated table.
    ///
    /// # Parameters
    ///
    /// * `min_bucket` - RSSI (dBm) of the first value
    /// * `pdr` - delivery ratios for consecutive 1 dB buckets
    ///
    /// # Returns
    ///
    /// The table, or `InvalidCalibration` when fewer than two buckets are given,
    /// a value lies outside [0, 1], or the values decrease.
    pub fn new(min_bucket: i32, pdr: Vec<f64>) -> Result<Self> {
        let table = Self { min_bucket, pdr };
        table.validate()?;
        Ok(table)
    }

    /// Check the table invariants. Tables coming from configuration files
    /// are deserialized directly and must be validated before use.
    pub fn validate(&self) -> Result<()> {
        if self.pdr.len() < 2 {
            return Err(TopologyError::InvalidCalibration(format!("need at least 2 buckets, got {}", self.pdr.len())));
        }
        for (i, value) in self.pdr.iter().enumerate() {
            if !(0.0..=1.0).contains(value) {
                return Err(TopologyError::InvalidCalibration(format!(
                    "bucket {} dBm has PDR {} outside [0, 1]",
                    self.min_bucket + i as i32,
                    value
                )));
            }
        }
        for (i, pair) in self.pdr.windows(2).enumerate() {
            if pair[1] < pair[0] {
                return Err(TopologyError::InvalidCalibration(format!(
                    "PDR decreases from {} to {} at bucket {} dBm",
                    pair[0],
                    pair[1],
                    self.min_bucket + i as i32 + 1
                )));
            }
        }
        Ok(())
    }

    pub fn min_rssi(&self) -> i32 {
        self.min_bucket
    }

    pub fn max_rssi(&self) -> i32 {
        self.min_bucket + self.pdr.len() as i32 - 1
    }

    /// Tabulated PDR of an integer bucket, if calibrated.
    pub fn bucket(&self, rssi: i32) -> Option<f64> {
        let offset = rssi.checked_sub(self.min_bucket)?;
        usize::try_from(offset).ok().and_then(|i| self.pdr.get(i).copied())
    }

    /// Translate an RSSI (dBm) to a delivery ratio in [0, 1].
    ///
    /// NaN is treated as no signal.
    pub fn rssi_to_pdr(&self, rssi: f64) -> f64 {
        if rssi.is_nan() || rssi < self.min_rssi() as f64 {
            return 0.0;
        }
        if rssi >= self.max_rssi() as f64 {
            return 1.0;
        }
        let floor = rssi.floor();
        let index = (floor as i32 - self.min_bucket) as usize;
        let low = self.pdr[index];
        let high = self.pdr[index + 1];
        // rounding must not push the result past the bracketing buckets
        (low + (high - low) * (rssi - floor)).max(low).min(high)
    }
}
