// Tunable dashboard parameters, loaded from JSON at startup.
//
// Every field has a default (`#[serde(default)]` on the struct), so a config
// file only needs the keys it changes and an empty object is valid:
//
//   {"low_charge_threshold": 15.0, "station_correlation": "in_order"}
//
// See also: `simulator.rs` (threshold), `coordinator.rs` (correlation),
// `dashboard.rs` (restart policy), and the dashboard bridge, which turns
// `tick_interval_ms` into its tick deadline.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{FleetError, read_file};

/// How station answers are paired with users when several users wait on one
/// batched assignment.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StationCorrelation {
    /// The most recently received station goes to every user.
    #[default]
    LatestForAll,
    /// The i-th answer goes to the i-th requested user.
    InOrder,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimConfig {
    /// A vehicle at or below this charge has crossed.
    pub low_charge_threshold: f64,
    pub tick_interval_ms: u64,
    pub station_correlation: StationCorrelation,
    /// When true, starting again after a stop abandons any pending
    /// assignment, clears the crossing set and re-arms the coordinator.
    pub rearm_on_restart: bool,
}

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            low_charge_threshold: 20.0,
            tick_interval_ms: 1000,
            station_correlation: StationCorrelation::LatestForAll,
            rearm_on_restart: false,
        }
    }
}

impl SimConfig {
    pub fn from_json(json: &str) -> Result<Self, FleetError> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, FleetError> {
        Self::from_json(&read_file(path.as_ref())?)
    }

    /// Never zero; a zero interval would spin the bridge loop.
    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_interval_ms.max(1))
    }
}
