// fleet_charge_sim: the network-free core of the fleet-charge dashboard.
//
// Everything here is plain state and methods: no sockets, no threads, no
// clock. The dashboard bridge drives it from relay events and a tick
// deadline; tests drive it by calling methods in sequence.
//
// Module overview:
// - `types.rs`:             String-backed ids (`VehicleId`, `UserId`,
//                           `StationId`, `Location`).
// - `fleet.rs`:             `FleetRegistry` boundary, `FleetSnapshot` JSON
//                           registry, and the resolved startup `Fleet`.
// - `config.rs`:            `SimConfig` and `StationCorrelation`.
// - `simulator.rs`:         `ChargeSimulator`: run state, countdown,
//                           threshold crossings, `CrossingSet`.
// - `coordinator.rs`:       `StationCoordinator`: latched request/answer
//                           round that produces station assignments.
// - `dashboard.rs`:         `Dashboard`, the aggregate one client owns, and
//                           its `VehicleRow` view.
// - `station_directory.rs`: Location → station table for station finders.
// - `error.rs`:             `FleetError` for the startup loaders.
//
// Iteration order is always the fleet's enumeration order; nothing here
// depends on hashing.

pub mod config;
pub mod coordinator;
pub mod dashboard;
pub mod error;
pub mod fleet;
pub mod simulator;
pub mod station_directory;
pub mod types;

pub use config::{SimConfig, StationCorrelation};
pub use coordinator::{Directive, Phase, StationCoordinator};
pub use dashboard::{Dashboard, Output, VehicleRow};
pub use error::FleetError;
pub use fleet::{Fleet, FleetRegistry, FleetSnapshot, User, Vehicle};
pub use simulator::{ChargeSimulator, CrossingSet, RunState, SimulatorEvent};
pub use station_directory::StationDirectory;
pub use types::{Location, StationId, UserId, VehicleId};
