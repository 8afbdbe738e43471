// Location → charging station lookup used by the station finder.
//
// A directory is a JSON document mapping location tokens to station ids,
// with an optional fallback for locations it doesn't know:
//
//   {"stations": {"Main St": "S-12", "Dock 4": "S-3"}, "fallback": "S-1"}
//
// Matching is exact on the token. Without a fallback an unknown location has
// no answer, and the requesting dashboard keeps waiting.

use std::collections::BTreeMap;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{FleetError, read_file};
use crate::types::{Location, StationId};

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StationDirectory {
    #[serde(default)]
    pub stations: BTreeMap<Location, StationId>,
    #[serde(default)]
    pub fallback: Option<StationId>,
}

impl StationDirectory {
    pub fn from_json(json: &str) -> Result<Self, FleetError> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, FleetError> {
        Self::from_json(&read_file(path.as_ref())?)
    }

    pub fn resolve(&self, location: &Location) -> Option<StationId> {
        self.stations
            .get(location)
            .or(self.fallback.as_ref())
            .cloned()
    }
}
