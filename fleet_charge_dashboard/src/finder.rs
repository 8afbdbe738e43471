// Station finder: answers `location` requests over the relay.
//
// For every `location { loc }` it sees, the finder looks the token up in its
// `StationDirectory` and publishes `filteredlocations { station }`. Unknown
// locations with no fallback get no answer. Everything else on the relay is
// ignored.
//
// Runs on the calling thread (`run`) or on a background thread (`spawn`,
// stopped through the returned `FinderHandle`), the same shape as the relay
// server's `RelayHandle`.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use fleet_charge_protocol::event::DashboardEvent;
use fleet_charge_relay::client::{ClientError, Delivery, RelayClient};
use fleet_charge_sim::{Location, StationDirectory};
use tracing::{debug, info, warn};

use crate::config::BridgeConfig;

const POLL: Duration = Duration::from_millis(50);

pub struct StationFinder {
    client: RelayClient,
    directory: StationDirectory,
    answered: u64,
}

impl StationFinder {
    pub fn connect(
        config: &BridgeConfig,
        directory: StationDirectory,
    ) -> Result<Self, ClientError> {
        let client = RelayClient::connect(&config.relay_address, &config.client_name)?;
        info!(
            client = %client.client_id(),
            stations = directory.stations.len(),
            "station finder connected"
        );
        Ok(Self {
            client,
            directory,
            answered: 0,
        })
    }

    /// Connect and serve on a background thread.
    pub fn spawn(
        config: &BridgeConfig,
        directory: StationDirectory,
    ) -> Result<FinderHandle, ClientError> {
        let mut finder = Self::connect(config, directory)?;
        let running = Arc::new(AtomicBool::new(true));
        let flag = running.clone();
        let thread = thread::spawn(move || {
            while flag.load(Ordering::SeqCst) && finder.client.is_connected() {
                finder.pump(POLL);
            }
            info!(answered = finder.answered, "station finder stopped");
            finder.client.disconnect();
        });
        Ok(FinderHandle {
            running,
            thread: Some(thread),
        })
    }

    /// Serve until the relay connection closes.
    pub fn run(mut self) {
        while self.client.is_connected() {
            self.pump(POLL);
        }
        warn!(answered = self.answered, "relay connection closed");
    }

    /// Answer every request that arrives within `timeout`.
    pub fn pump(&mut self, timeout: Duration) {
        let Some(first) = self.client.recv_timeout(timeout) else {
            return;
        };
        self.handle_delivery(first);
        for delivery in self.client.poll() {
            self.handle_delivery(delivery);
        }
    }

    fn handle_delivery(&mut self, delivery: Delivery) {
        let event = DashboardEvent::from_envelope(&delivery.envelope);
        let Ok(DashboardEvent::Location { loc }) = event else {
            return;
        };
        let Some(station) = self.directory.resolve(&Location::new(loc.as_str())) else {
            debug!(%loc, "no station for location");
            return;
        };
        let answer = DashboardEvent::FilteredLocations {
            station: station.to_string(),
        };
        match self.client.publish(&answer) {
            Ok(()) => {
                self.answered += 1;
                debug!(%loc, %station, "answered station request");
            }
            Err(e) => warn!(error = %e, "failed to publish station answer"),
        }
    }
}

/// Stops a spawned finder.
pub struct FinderHandle {
    running: Arc<AtomicBool>,
    thread: Option<JoinHandle<()>>,
}

impl FinderHandle {
    pub fn stop(mut self) {
        self.running.store(false, Ordering::SeqCst);
        if let Some(thread) = self.thread.take() {
            let _ = thread.join();
        }
    }
}
