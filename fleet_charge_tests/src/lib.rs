// Test-only helpers for end-to-end fleet-charge tests.
//
// Everything runs over real sockets: a real relay, real `DashboardBridge`s
// and real `StationFinder`s. The only test-specific code is here: fixture
// builders and synchronous polling loops that drive a bridge while watching
// what a passive viewer receives.
//
// See also: `tests/full_pipeline.rs` for the scenarios.

use std::net::SocketAddr;
use std::thread;
use std::time::{Duration, Instant};

use fleet_charge_dashboard::{BridgeConfig, DashboardBridge, FinderHandle, StationFinder};
use fleet_charge_protocol::event::DashboardEvent;
use fleet_charge_relay::client::RelayClient;
use fleet_charge_relay::server::{RelayConfig, RelayHandle, start_relay};
use fleet_charge_sim::{
    Dashboard, Fleet, FleetSnapshot, Location, SimConfig, StationDirectory, User, Vehicle,
    VehicleId,
};

/// Default timeout for blocking poll operations.
pub const POLL_TIMEOUT: Duration = Duration::from_secs(5);

/// Wait per poll attempt.
pub const POLL_INTERVAL: Duration = Duration::from_millis(10);

/// Start a relay on a random localhost port.
pub fn start_test_relay() -> (RelayHandle, SocketAddr) {
    let config = RelayConfig {
        port: 0,
        ..RelayConfig::default()
    };
    start_relay(config).expect("relay failed to start")
}

pub fn bridge_config(addr: SocketAddr, name: &str) -> BridgeConfig {
    BridgeConfig {
        relay_address: addr.to_string(),
        client_name: name.into(),
    }
}

pub fn vehicle(id: &str, drain_rate: f64, current_charge: f64) -> Vehicle {
    Vehicle {
        id: id.into(),
        name: format!("{id} car"),
        drain_rate,
        capacity: "60kWh".into(),
        current_charge,
    }
}

/// A user whose location token is `loc-<id>`.
pub fn user(id: &str, vehicle: &str) -> User {
    User {
        id: id.into(),
        name: format!("{id} name"),
        vehicle: Some(VehicleId::from(vehicle)),
        location: Location::new(format!("loc-{id}")),
    }
}

pub fn fleet(users: Vec<User>, vehicles: Vec<Vehicle>) -> Fleet {
    Fleet::load(&FleetSnapshot { users, vehicles })
}

/// Connect a dashboard bridge for `fleet`.
pub fn connect_dashboard(
    addr: SocketAddr,
    name: &str,
    fleet: Fleet,
    config: SimConfig,
) -> DashboardBridge {
    DashboardBridge::connect(&bridge_config(addr, name), Dashboard::new(fleet, config))
        .expect("dashboard failed to connect")
}

/// Spawn a station finder answering from `(location, station)` pairs.
pub fn spawn_finder(addr: SocketAddr, table: &[(&str, &str)]) -> FinderHandle {
    let directory = StationDirectory {
        stations: table
            .iter()
            .map(|(loc, station)| ((*loc).into(), (*station).into()))
            .collect(),
        fallback: None,
    };
    StationFinder::spawn(&bridge_config(addr, "finder"), directory)
        .expect("finder failed to connect")
}

/// A passive relay subscriber that records every typed event it sees.
pub struct TestViewer {
    client: RelayClient,
    pub seen: Vec<DashboardEvent>,
}

impl TestViewer {
    pub fn connect(addr: SocketAddr) -> Self {
        let client = RelayClient::connect(&addr.to_string(), "viewer")
            .expect("viewer failed to connect");
        Self {
            client,
            seen: Vec::new(),
        }
    }

    /// Non-blocking: record whatever has arrived.
    pub fn drain(&mut self) {
        for delivery in self.client.poll() {
            if let Ok(event) = DashboardEvent::from_envelope(&delivery.envelope) {
                self.seen.push(event);
            }
        }
    }

    /// Events seen so far with the given wire name.
    pub fn named(&self, name: &str) -> Vec<&DashboardEvent> {
        self.seen.iter().filter(|e| e.name() == name).collect()
    }
}

/// Pump `bridge` until `viewer` has seen an event matching `pred`, and
/// return it. Panics after `POLL_TIMEOUT`.
pub fn drive_until_seen(
    bridge: &mut DashboardBridge,
    viewer: &mut TestViewer,
    what: &str,
    pred: impl Fn(&DashboardEvent) -> bool,
) -> DashboardEvent {
    let start = Instant::now();
    loop {
        assert!(start.elapsed() < POLL_TIMEOUT, "timed out waiting for {what}");
        bridge.pump(POLL_INTERVAL);
        viewer.drain();
        if let Some(event) = viewer.seen.iter().find(|&e| pred(e)) {
            return event.clone();
        }
    }
}

/// Pump `bridge` until `pred` holds for it. Panics after `POLL_TIMEOUT`.
pub fn drive_until(
    bridge: &mut DashboardBridge,
    what: &str,
    pred: impl Fn(&DashboardBridge) -> bool,
) {
    let start = Instant::now();
    while !pred(bridge) {
        assert!(start.elapsed() < POLL_TIMEOUT, "timed out waiting for {what}");
        bridge.pump(POLL_INTERVAL);
    }
}

/// Pump `bridge` for `duration`, for checking that something does NOT
/// happen.
pub fn drive_for(bridge: &mut DashboardBridge, viewer: &mut TestViewer, duration: Duration) {
    let start = Instant::now();
    while start.elapsed() < duration {
        bridge.pump(POLL_INTERVAL);
        viewer.drain();
    }
    thread::sleep(POLL_INTERVAL);
    viewer.drain();
}
