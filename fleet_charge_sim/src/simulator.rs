// Charge countdown state machine.
//
// `ChargeSimulator` owns the live charge of every tracked vehicle and the
// crossing set. It has two run states: `Stopped` (initial) and `Running`.
// While running, each `tick()` scans vehicles in enumeration order and drains
// every vehicle still above the low-charge threshold by its drain rate. The
// first vehicle to land at or below the threshold ends the scan (vehicles
// after it keep their charge this tick), stops the simulator, and appends its
// users to the crossing set.
//
// The simulator has no clock. Whoever owns it decides when a tick happens
// (the bridge uses a deadline, tests call `tick()` directly), and a tick
// while stopped is a no-op, so a stop is observed at the next tick boundary.
//
// Transitions are reported as `SimulatorEvent`s; nothing is published from
// here. `set_running_remote` applies a run state learned from another
// observer without reporting it, so the change is not echoed back.
//
// See also: `coordinator.rs`, which consumes the crossing set, and
// `dashboard.rs`, which wires both together.

use tracing::{debug, info};

use crate::config::SimConfig;
use crate::fleet::Fleet;
use crate::types::{UserId, VehicleId};

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum RunState {
    #[default]
    Stopped,
    Running,
}

/// Output of a simulator operation.
#[derive(Clone, Debug, PartialEq)]
pub enum SimulatorEvent {
    /// The run state changed. Emitted by `start`, `stop`, `toggle` and by a
    /// crossing, never by `set_running_remote`.
    RunStateChanged { running: bool },
    /// `vehicle` reached `charge`, at or below the threshold. `new_users` are
    /// the users appended to the crossing set by this crossing (possibly
    /// none, if they were all already in it).
    ThresholdCrossed {
        vehicle: VehicleId,
        charge: f64,
        new_users: Vec<UserId>,
    },
}

/// Users whose vehicle crossed the threshold, in first-crossing order.
/// Append-only while a run is live; never holds a user twice.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct CrossingSet {
    users: Vec<UserId>,
}

impl CrossingSet {
    /// Returns false if `user` was already present.
    fn insert(&mut self, user: UserId) -> bool {
        if self.users.contains(&user) {
            return false;
        }
        self.users.push(user);
        true
    }

    fn clear(&mut self) {
        self.users.clear();
    }

    pub fn contains(&self, user: &UserId) -> bool {
        self.users.contains(user)
    }

    pub fn len(&self) -> usize {
        self.users.len()
    }

    pub fn is_empty(&self) -> bool {
        self.users.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &UserId> {
        self.users.iter()
    }

    pub fn as_slice(&self) -> &[UserId] {
        &self.users
    }
}

#[derive(Clone, Debug)]
struct Countdown {
    vehicle: VehicleId,
    drain_rate: f64,
    charge: f64,
}

#[derive(Clone, Debug)]
pub struct ChargeSimulator {
    state: RunState,
    threshold: f64,
    /// One entry per tracked vehicle, in enumeration order.
    countdowns: Vec<Countdown>,
    /// `(user, vehicle)` for users with a tracked vehicle, grouped by vehicle
    /// and in registry order within each group.
    owners: Vec<(UserId, VehicleId)>,
    crossing: CrossingSet,
    run_number: u64,
    ticks_run: u64,
}

impl ChargeSimulator {
    /// Build the countdown from the fleet's startup charges. Starts stopped.
    pub fn new(fleet: &Fleet, config: &SimConfig) -> Self {
        let countdowns = fleet
            .vehicles()
            .iter()
            .map(|v| Countdown {
                vehicle: v.id.clone(),
                drain_rate: v.drain_rate,
                charge: v.current_charge,
            })
            .collect();
        let owners = fleet
            .vehicles()
            .iter()
            .flat_map(|v| fleet.users_of(&v.id).map(move |u| (u.id.clone(), v.id.clone())))
            .collect();

        Self {
            state: RunState::Stopped,
            threshold: config.low_charge_threshold,
            countdowns,
            owners,
            crossing: CrossingSet::default(),
            run_number: 0,
            ticks_run: 0,
        }
    }

    // -----------------------------------------------------------------------
    // Run state
    // -----------------------------------------------------------------------

    pub fn start(&mut self) -> Vec<SimulatorEvent> {
        if self.set_state(RunState::Running) {
            vec![SimulatorEvent::RunStateChanged { running: true }]
        } else {
            Vec::new()
        }
    }

    pub fn stop(&mut self) -> Vec<SimulatorEvent> {
        if self.set_state(RunState::Stopped) {
            vec![SimulatorEvent::RunStateChanged { running: false }]
        } else {
            Vec::new()
        }
    }

    pub fn toggle(&mut self) -> Vec<SimulatorEvent> {
        match self.state {
            RunState::Stopped => self.start(),
            RunState::Running => self.stop(),
        }
    }

    /// Adopt a run state announced by another observer. Returns whether the
    /// state changed; emits nothing.
    pub fn set_running_remote(&mut self, running: bool) -> bool {
        let state = if running {
            RunState::Running
        } else {
            RunState::Stopped
        };
        self.set_state(state)
    }

    fn set_state(&mut self, state: RunState) -> bool {
        if self.state == state {
            return false;
        }
        self.state = state;
        if state == RunState::Running {
            self.run_number += 1;
        }
        info!(?state, run = self.run_number, "charge simulator run state changed");
        true
    }

    // -----------------------------------------------------------------------
    // Countdown
    // -----------------------------------------------------------------------

    /// Advance one tick. No-op while stopped.
    pub fn tick(&mut self) -> Vec<SimulatorEvent> {
        if self.state != RunState::Running {
            return Vec::new();
        }
        self.ticks_run += 1;

        let threshold = self.threshold;
        let crossed = self.countdowns.iter_mut().find_map(|c| {
            if c.charge <= threshold {
                return None;
            }
            // Clamp so a drain larger than the remaining charge can't go
            // negative.
            c.charge = (c.charge - c.drain_rate).max(0.0);
            (c.charge <= threshold).then(|| (c.vehicle.clone(), c.charge))
        });

        let Some((vehicle, charge)) = crossed else {
            debug!(tick = self.ticks_run, "countdown tick, no crossing");
            return Vec::new();
        };

        self.state = RunState::Stopped;
        let mut new_users = Vec::new();
        for (user, owned) in &self.owners {
            if owned == &vehicle && self.crossing.insert(user.clone()) {
                new_users.push(user.clone());
            }
        }
        info!(
            %vehicle,
            charge,
            new_users = new_users.len(),
            crossing_set = self.crossing.len(),
            "vehicle crossed the low-charge threshold, stopping"
        );

        vec![
            SimulatorEvent::RunStateChanged { running: false },
            SimulatorEvent::ThresholdCrossed {
                vehicle,
                charge,
                new_users,
            },
        ]
    }

    /// Forget every crossing. Used when a new run re-arms assignment.
    pub fn reset_crossings(&mut self) {
        self.crossing.clear();
    }

    // -----------------------------------------------------------------------
    // Queries
    // -----------------------------------------------------------------------

    pub fn state(&self) -> RunState {
        self.state
    }

    pub fn is_running(&self) -> bool {
        self.state == RunState::Running
    }

    /// Live charge of a tracked vehicle.
    pub fn charge(&self, vehicle: &VehicleId) -> Option<f64> {
        self.countdowns
            .iter()
            .find(|c| &c.vehicle == vehicle)
            .map(|c| c.charge)
    }

    pub fn crossing_set(&self) -> &CrossingSet {
        &self.crossing
    }

    /// Number of Stopped→Running transitions so far; 0 before the first
    /// start.
    pub fn run_number(&self) -> u64 {
        self.run_number
    }

    /// Ticks processed while running.
    pub fn ticks_run(&self) -> u64 {
        self.ticks_run
    }
}
