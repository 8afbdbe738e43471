// fleet_charge_dashboard: relay clients around the fleet-charge core.
//
// - `bridge.rs`: `DashboardBridge`, which drives one `Dashboard` from a tick
//                deadline and relay events on a single thread, and publishes
//                what it produces.
// - `finder.rs`: `StationFinder`, the responder that answers `location`
//                requests with `filteredlocations` from a `StationDirectory`.
// - `config.rs`: `BridgeConfig` (relay address, client name).
// - `error.rs`:  `BridgeError`.
//
// Binaries: `dashboard` (src/main.rs) and `station_finder`
// (src/bin/station_finder.rs).

pub mod bridge;
pub mod config;
pub mod error;
pub mod finder;

pub use bridge::{Command, DashboardBridge, output_to_event};
pub use config::BridgeConfig;
pub use error::BridgeError;
pub use finder::{FinderHandle, StationFinder};
