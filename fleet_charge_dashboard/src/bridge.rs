// Bridge between a `Dashboard` and the relay hub.
//
// `DashboardBridge` owns one `Dashboard` and one `RelayClient` and is the
// only thing that touches either. Ticks and inbound relay events are
// serialized onto the thread that calls `step()`/`run()`: `step()` waits on
// the relay inbox until the next tick deadline, so an event is never handled
// in the middle of a tick and ticks never overlap.
//
// Outbound: every `Output` the dashboard returns is turned into a
// `DashboardEvent` and published. Publish failures are logged and dropped;
// the hub gives no delivery guarantee anyway.
//
// Inbound:
// - `timerUpdate` from another client → `Dashboard::remote_run_state`. Our
//   own `timerUpdate` comes back from the hub too (the hub echoes to the
//   publisher) and is skipped, since local state already reflects it.
// - `filteredlocations` → `Dashboard::station_received`.
// - `chargeNow` / `chargeNowMultiple` are logged (this dashboard is also a
//   viewer of assignments, including its own).
// - `location`, unknown names and malformed payloads are ignored.
//
// See also: `finder.rs` for the responder on the other side of the
// `location` round trip, `fleet_charge_sim::dashboard` for the state being
// driven.

use std::sync::mpsc::Receiver;
use std::time::{Duration, Instant};

use fleet_charge_protocol::event::DashboardEvent;
use fleet_charge_protocol::types::ClientId;
use fleet_charge_relay::client::{Delivery, RelayClient};
use fleet_charge_sim::{Dashboard, Directive, Output, StationId, VehicleRow};
use tracing::{debug, info, warn};

use crate::config::BridgeConfig;
use crate::error::BridgeError;

/// Upper bound on one wait, so control commands are noticed promptly even
/// while stopped.
pub const CONTROL_POLL: Duration = Duration::from_millis(50);

/// Operator commands fed to `run()`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Command {
    Toggle,
    Start,
    Stop,
    Status,
    Quit,
}

impl Command {
    /// Parse one line of operator input.
    pub fn parse(line: &str) -> Option<Self> {
        match line.trim() {
            "toggle" | "t" => Some(Self::Toggle),
            "start" => Some(Self::Start),
            "stop" | "pause" => Some(Self::Stop),
            "status" | "s" => Some(Self::Status),
            "quit" | "q" | "exit" => Some(Self::Quit),
            _ => None,
        }
    }
}

/// The relay event an `Output` is published as.
pub fn output_to_event(output: &Output) -> DashboardEvent {
    match output {
        Output::RunState { running } => DashboardEvent::TimerUpdate { timer: *running },
        Output::Directive(Directive::RequestStation { location, .. }) => {
            DashboardEvent::Location {
                loc: location.to_string(),
            }
        }
        Output::Directive(Directive::Assign { station, user }) => DashboardEvent::ChargeNow {
            station: station.to_string(),
            user_id: user.to_string(),
        },
        Output::Directive(Directive::AssignBatch { stations, users }) => {
            DashboardEvent::ChargeNowMultiple {
                stations: stations.iter().map(ToString::to_string).collect(),
                user_ids: users.iter().map(ToString::to_string).collect(),
            }
        }
    }
}

pub struct DashboardBridge {
    client: RelayClient,
    dashboard: Dashboard,
    tick_interval: Duration,
    next_tick: Instant,
    published: u64,
}

impl DashboardBridge {
    pub fn connect(config: &BridgeConfig, dashboard: Dashboard) -> Result<Self, BridgeError> {
        let client = RelayClient::connect(&config.relay_address, &config.client_name)?;
        info!(
            client = %client.client_id(),
            relay = %config.relay_address,
            "dashboard connected"
        );
        let tick_interval = dashboard.config().tick_interval();
        Ok(Self {
            client,
            dashboard,
            tick_interval,
            next_tick: Instant::now() + tick_interval,
            published: 0,
        })
    }

    pub fn client_id(&self) -> ClientId {
        self.client.client_id()
    }

    pub fn dashboard(&self) -> &Dashboard {
        &self.dashboard
    }

    pub fn rows(&self) -> Vec<VehicleRow> {
        self.dashboard.rows()
    }

    pub fn is_connected(&self) -> bool {
        self.client.is_connected()
    }

    /// Events published so far.
    pub fn published(&self) -> u64 {
        self.published
    }

    // -----------------------------------------------------------------------
    // Local controls
    // -----------------------------------------------------------------------

    pub fn toggle(&mut self) {
        let outputs = self.dashboard.toggle();
        self.apply(outputs);
    }

    pub fn start(&mut self) {
        let outputs = self.dashboard.start();
        self.apply(outputs);
    }

    pub fn stop(&mut self) {
        let outputs = self.dashboard.stop();
        self.apply(outputs);
    }

    /// Run one countdown tick now, regardless of the deadline.
    pub fn tick(&mut self) {
        let outputs = self.dashboard.tick();
        self.apply(outputs);
    }

    // -----------------------------------------------------------------------
    // Event loop
    // -----------------------------------------------------------------------

    /// Handle every delivery that arrives within `timeout`. Waits for the
    /// first one, then drains whatever else is already queued. Returns the
    /// number handled.
    pub fn pump(&mut self, timeout: Duration) -> usize {
        let Some(first) = self.client.recv_timeout(timeout) else {
            return 0;
        };
        self.handle_delivery(first);
        let mut handled = 1;
        for delivery in self.client.poll() {
            self.handle_delivery(delivery);
            handled += 1;
        }
        handled
    }

    /// One turn of the loop: tick if the deadline has passed, otherwise wait
    /// for relay events until the deadline (or `max_wait`, whichever is
    /// sooner).
    pub fn step(&mut self, max_wait: Duration) {
        let now = Instant::now();
        let running = self.dashboard.simulator().is_running();
        if running && now >= self.next_tick {
            self.next_tick = now + self.tick_interval;
            self.tick();
            return;
        }
        let wait = if running {
            self.next_tick.saturating_duration_since(now).min(max_wait)
        } else {
            max_wait
        };
        self.pump(wait);
    }

    /// Drive the dashboard until `Quit` or until the relay goes away.
    /// `on_status` receives the current rows for each `Status` command.
    /// Flushes any partial assignment on the way out.
    pub fn run(
        mut self,
        commands: &Receiver<Command>,
        mut on_status: impl FnMut(&[VehicleRow]),
    ) {
        loop {
            let mut quit = false;
            for command in commands.try_iter() {
                match command {
                    Command::Toggle => self.toggle(),
                    Command::Start => self.start(),
                    Command::Stop => self.stop(),
                    Command::Status => on_status(&self.rows()),
                    Command::Quit => quit = true,
                }
            }
            if quit {
                break;
            }
            if !self.is_connected() {
                warn!("relay connection closed");
                break;
            }
            self.step(CONTROL_POLL);
        }
        self.shutdown();
    }

    /// Publish a partial assignment if one is pending, then leave the hub.
    pub fn shutdown(mut self) {
        let outputs = self.dashboard.shutdown();
        self.apply(outputs);
        self.client.disconnect();
        info!(
            published = self.published,
            ticks = self.dashboard.simulator().ticks_run(),
            "dashboard shut down"
        );
    }

    pub fn handle_delivery(&mut self, delivery: Delivery) {
        let event = match DashboardEvent::from_envelope(&delivery.envelope) {
            Ok(event) => event,
            Err(e) => {
                debug!(from = %delivery.from, error = %e, "ignoring relay event");
                return;
            }
        };

        match event {
            DashboardEvent::TimerUpdate { timer } => {
                if delivery.from == self.client.client_id() {
                    return;
                }
                let was_running = self.dashboard.simulator().is_running();
                let outputs = self.dashboard.remote_run_state(timer);
                if timer && !was_running {
                    self.next_tick = Instant::now() + self.tick_interval;
                }
                self.apply(outputs);
            }
            DashboardEvent::FilteredLocations { station } => {
                let outputs = self.dashboard.station_received(StationId::new(station));
                self.apply(outputs);
            }
            DashboardEvent::ChargeNow { station, user_id } => {
                info!(%station, user = %user_id, "charging station assigned");
            }
            DashboardEvent::ChargeNowMultiple { stations, user_ids } => {
                info!(?stations, users = ?user_ids, "charging stations assigned");
            }
            DashboardEvent::Location { .. } => {}
        }
    }

    fn apply(&mut self, outputs: Vec<Output>) {
        for output in &outputs {
            if matches!(output, Output::RunState { running: true }) {
                self.next_tick = Instant::now() + self.tick_interval;
            }
            let event = output_to_event(output);
            match self.client.publish(&event) {
                Ok(()) => {
                    self.published += 1;
                    debug!(event = event.name(), "published");
                }
                Err(e) => warn!(event = event.name(), error = %e, "publish failed, dropping"),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn outputs_map_to_wire_events() {
        assert_eq!(
            output_to_event(&Output::RunState { running: false }),
            DashboardEvent::TimerUpdate { timer: false }
        );
        assert_eq!(
            output_to_event(&Output::Directive(Directive::RequestStation {
                user: "u1".into(),
                location: "Main St".into(),
            })),
            DashboardEvent::Location {
                loc: "Main St".into()
            }
        );
        assert_eq!(
            output_to_event(&Output::Directive(Directive::Assign {
                station: "S1".into(),
                user: "u1".into(),
            })),
            DashboardEvent::ChargeNow {
                station: "S1".into(),
                user_id: "u1".into(),
            }
        );
        assert_eq!(
            output_to_event(&Output::Directive(Directive::AssignBatch {
                stations: vec!["S1".into(), "S2".into()],
                users: vec!["u1".into(), "u2".into()],
            })),
            DashboardEvent::ChargeNowMultiple {
                stations: vec!["S1".into(), "S2".into()],
                user_ids: vec!["u1".into(), "u2".into()],
            }
        );
    }

    #[test]
    fn command_parsing() {
        assert_eq!(Command::parse(" start\n"), Some(Command::Start));
        assert_eq!(Command::parse("t"), Some(Command::Toggle));
        assert_eq!(Command::parse("status"), Some(Command::Status));
        assert_eq!(Command::parse("q"), Some(Command::Quit));
        assert_eq!(Command::parse("launch"), None);
    }
}
