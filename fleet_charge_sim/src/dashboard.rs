// The per-dashboard aggregate: fleet, simulator and coordinator together.
//
// `Dashboard` is what one dashboard client owns. Every entry point is a
// plain method that returns the `Output`s to publish, in order; the caller
// (the bridge, or a test) maps them onto relay events. No I/O and no clock
// here, so the whole flow is testable by calling methods in sequence.
//
// Entry points and the events they correspond to:
// - `toggle` / `start` / `stop`: the local start/pause control.
// - `tick`: the periodic timer.
// - `remote_run_state`: a `timerUpdate` from another client.
// - `station_received`: a `filteredlocations` answer.
// - `shutdown`: the dashboard is going away; flush a partial assignment.
//
// Restart policy: with `rearm_on_restart` off (the default), the crossing
// set and the coordinator latch survive a stop/start, so a run assigns
// stations at most once over the dashboard's lifetime. With it on, every
// start after the first abandons what is pending, clears the crossing set
// and re-arms the coordinator.

use tracing::info;

use crate::config::SimConfig;
use crate::coordinator::{Directive, StationCoordinator};
use crate::fleet::Fleet;
use crate::simulator::{ChargeSimulator, SimulatorEvent};
use crate::types::{StationId, UserId, VehicleId};

/// Something to publish, in the order returned.
#[derive(Clone, Debug, PartialEq)]
pub enum Output {
    RunState { running: bool },
    Directive(Directive),
}

/// One card of the dashboard view: a user and the live state of their
/// vehicle.
#[derive(Clone, Debug, PartialEq)]
pub struct VehicleRow {
    pub user: UserId,
    pub user_name: String,
    pub vehicle: VehicleId,
    pub vehicle_name: String,
    pub capacity: String,
    pub charge: f64,
    pub drain_rate: f64,
}

pub struct Dashboard {
    fleet: Fleet,
    config: SimConfig,
    simulator: ChargeSimulator,
    coordinator: StationCoordinator,
}

impl Dashboard {
    pub fn new(fleet: Fleet, config: SimConfig) -> Self {
        let simulator = ChargeSimulator::new(&fleet, &config);
        let coordinator = StationCoordinator::new(config.station_correlation);
        info!(
            users = fleet.users().len(),
            vehicles = fleet.vehicles().len(),
            threshold = config.low_charge_threshold,
            "dashboard loaded"
        );
        Self {
            fleet,
            config,
            simulator,
            coordinator,
        }
    }

    pub fn toggle(&mut self) -> Vec<Output> {
        if self.simulator.is_running() {
            self.stop()
        } else {
            self.start()
        }
    }

    pub fn start(&mut self) -> Vec<Output> {
        let events = self.simulator.start();
        if events.is_empty() {
            return Vec::new();
        }
        let mut outputs = self.on_run_started();
        outputs.extend(self.apply(events));
        outputs
    }

    pub fn stop(&mut self) -> Vec<Output> {
        let events = self.simulator.stop();
        self.apply(events)
    }

    pub fn tick(&mut self) -> Vec<Output> {
        let events = self.simulator.tick();
        self.apply(events)
    }

    /// Adopt a run state another client announced. Never produces a
    /// `RunState` output, so the announcement is not echoed.
    pub fn remote_run_state(&mut self, running: bool) -> Vec<Output> {
        if self.simulator.set_running_remote(running) && running {
            self.on_run_started()
        } else {
            Vec::new()
        }
    }

    pub fn station_received(&mut self, station: StationId) -> Vec<Output> {
        directives(self.coordinator.on_station(station))
    }

    /// Assign whatever stations have arrived for a pending request round.
    pub fn shutdown(&mut self) -> Vec<Output> {
        directives(self.coordinator.abandon())
    }

    /// The dashboard view, in user order. Users without a tracked vehicle
    /// have no row.
    pub fn rows(&self) -> Vec<VehicleRow> {
        self.fleet
            .users()
            .iter()
            .filter_map(|user| {
                let vehicle = self.fleet.vehicle(user.vehicle.as_ref()?)?;
                let charge = self.simulator.charge(&vehicle.id)?;
                Some(VehicleRow {
                    user: user.id.clone(),
                    user_name: user.name.clone(),
                    vehicle: vehicle.id.clone(),
                    vehicle_name: vehicle.name.clone(),
                    capacity: vehicle.capacity.clone(),
                    charge,
                    drain_rate: vehicle.drain_rate,
                })
            })
            .collect()
    }

    pub fn fleet(&self) -> &Fleet {
        &self.fleet
    }

    pub fn config(&self) -> &SimConfig {
        &self.config
    }

    pub fn simulator(&self) -> &ChargeSimulator {
        &self.simulator
    }

    pub fn coordinator(&self) -> &StationCoordinator {
        &self.coordinator
    }

    fn on_run_started(&mut self) -> Vec<Output> {
        if !self.config.rearm_on_restart || self.simulator.run_number() <= 1 {
            return Vec::new();
        }
        let flushed = self.coordinator.abandon();
        self.coordinator.rearm();
        self.simulator.reset_crossings();
        info!(run = self.simulator.run_number(), "re-armed station assignment");
        directives(flushed)
    }

    fn apply(&mut self, events: Vec<SimulatorEvent>) -> Vec<Output> {
        let mut outputs = Vec::new();
        for event in events {
            match event {
                SimulatorEvent::RunStateChanged { running } => {
                    outputs.push(Output::RunState { running });
                }
                SimulatorEvent::ThresholdCrossed { .. } => {
                    let found = self
                        .coordinator
                        .on_crossing(self.simulator.crossing_set(), &self.fleet);
                    outputs.extend(directives(found));
                }
            }
        }
        outputs
    }
}

fn directives(directives: Vec<Directive>) -> Vec<Output> {
    directives.into_iter().map(Output::Directive).collect()
}
