// TCP server and main loop for the relay hub.
//
// Architecture: thread-per-reader with a central `mpsc` channel.
//
// - **Listener thread**: non-blocking `accept()` loop. Each new stream gets
//   a short-lived handshake thread that waits (up to `HANDSHAKE_TIMEOUT`) for
//   `Hello` and hands the stream to the hub as `HubInput::Joined`. A peer
//   that never says `Hello` only ties up its own thread.
// - **Reader threads** (one per client): `read_frame()` in a loop, forwarding
//   `Publish` as `HubInput::Publish`. EOF, a read error, a malformed frame or
//   `Goodbye` all end the loop with `HubInput::Disconnected`.
// - **Hub thread**: owns the `Hub`, admits or rejects joined streams and
//   does every write. It never blocks on a read. Waits with `recv_timeout`
//   so it notices `stop()`.
//
// The hub thread is the only writer to client sockets; reader threads only
// read. That single writer is what gives in-order delivery.

use std::collections::BTreeMap;
use std::io::{self, BufReader, BufWriter};
use std::net::{SocketAddr, TcpListener, TcpStream};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::thread;
use std::time::Duration;

use fleet_charge_protocol::event::Envelope;
use fleet_charge_protocol::framing::{read_frame, write_frame};
use fleet_charge_protocol::message::{ClientMessage, ServerMessage};
use fleet_charge_protocol::types::ClientId;
use tracing::{debug, info, warn};

use crate::hub::Hub;

/// Port used when neither `PORT` nor `--port` is given.
pub const DEFAULT_PORT: u16 = 4000;

/// How long the hub thread blocks before rechecking `keep_running`.
const HUB_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// How long a new connection has to send `Hello`.
const HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(5);

enum HubInput {
    /// A connection that has sent `Hello`. `reader` is positioned after it.
    Joined {
        stream: TcpStream,
        reader: BufReader<TcpStream>,
        client_name: String,
        protocol_version: u32,
    },
    Publish { from: ClientId, envelope: Envelope },
    Disconnected { id: ClientId },
}

/// Configuration for starting a relay hub.
#[derive(Clone, Debug)]
pub struct RelayConfig {
    pub bind_address: String,
    pub port: u16,
    pub max_clients: u32,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            bind_address: "127.0.0.1".into(),
            port: DEFAULT_PORT,
            max_clients: 64,
        }
    }
}

impl RelayConfig {
    /// Defaults, with the port taken from `PORT` when it is set and valid.
    pub fn from_env() -> Self {
        let mut config = Self::default();
        config.apply_port(std::env::var("PORT").ok().as_deref());
        config
    }

    /// Take the port from a raw `PORT` value. Unset leaves the port alone;
    /// an unparseable value is logged and ignored.
    pub fn apply_port(&mut self, raw: Option<&str>) {
        let Some(raw) = raw else {
            return;
        };
        match raw.trim().parse() {
            Ok(port) => self.port = port,
            Err(_) => warn!(value = %raw, "ignoring invalid PORT"),
        }
    }
}

/// Events relayed per event name over the hub's lifetime.
pub type RelayTotals = BTreeMap<String, u64>;

/// Handle returned by `start_relay`.
pub struct RelayHandle {
    keep_running: Arc<AtomicBool>,
    thread: Option<thread::JoinHandle<RelayTotals>>,
}

impl RelayHandle {
    /// Signal the hub to stop and wait for its thread to exit. Returns how
    /// many events of each name were relayed.
    pub fn stop(mut self) -> RelayTotals {
        self.keep_running.store(false, Ordering::SeqCst);
        match self.thread.take() {
            Some(handle) => handle.join().unwrap_or_default(),
            None => RelayTotals::new(),
        }
    }
}

/// Bind and start the hub on background threads. Returns the handle and the
/// bound address (port 0 lets the OS choose, which tests rely on).
pub fn start_relay(config: RelayConfig) -> io::Result<(RelayHandle, SocketAddr)> {
    let listener = TcpListener::bind((config.bind_address.as_str(), config.port))?;
    let addr = listener.local_addr()?;
    listener.set_nonblocking(true)?;
    info!(%addr, "relay listening");

    let keep_running = Arc::new(AtomicBool::new(true));
    let (tx, rx) = mpsc::channel();

    let keep_running_listener = keep_running.clone();
    let tx_listener = tx.clone();
    thread::spawn(move || accept_loop(listener, tx_listener, keep_running_listener));

    let keep_running_hub = keep_running.clone();
    let max_clients = config.max_clients;
    let thread = thread::spawn(move || run_hub(max_clients, rx, tx, keep_running_hub));

    Ok((
        RelayHandle {
            keep_running,
            thread: Some(thread),
        },
        addr,
    ))
}

fn accept_loop(listener: TcpListener, tx: Sender<HubInput>, keep_running: Arc<AtomicBool>) {
    while keep_running.load(Ordering::SeqCst) {
        match listener.accept() {
            Ok((stream, peer)) => {
                debug!(%peer, "accepted connection");
                if stream.set_nonblocking(false).is_err() {
                    continue;
                }
                let tx = tx.clone();
                thread::spawn(move || handshake(stream, tx));
            }
            Err(ref e) if e.kind() == io::ErrorKind::WouldBlock => {
                thread::sleep(Duration::from_millis(20));
            }
            Err(e) => {
                warn!(error = %e, "accept failed; listener exiting");
                break;
            }
        }
    }
}

fn run_hub(
    max_clients: u32,
    rx: Receiver<HubInput>,
    tx: Sender<HubInput>,
    keep_running: Arc<AtomicBool>,
) -> RelayTotals {
    let mut hub = Hub::new(max_clients);
    while keep_running.load(Ordering::SeqCst) {
        match rx.recv_timeout(HUB_POLL_INTERVAL) {
            Ok(input) => handle_input(&mut hub, input, &tx, &keep_running),
            Err(RecvTimeoutError::Timeout) => {}
            Err(RecvTimeoutError::Disconnected) => break,
        }
    }
    hub.close_all();
    let totals = hub.relayed().clone();
    info!(?totals, "relay stopped");
    totals
}

fn handle_input(
    hub: &mut Hub,
    input: HubInput,
    tx: &Sender<HubInput>,
    keep_running: &Arc<AtomicBool>,
) {
    match input {
        HubInput::Joined {
            stream,
            reader,
            client_name,
            protocol_version,
        } => admit(hub, stream, reader, client_name, protocol_version, tx, keep_running),
        HubInput::Publish { from, envelope } => hub.publish(from, envelope),
        HubInput::Disconnected { id } => hub.remove_subscriber(id),
    }
}

/// Wait for `Hello` on a fresh connection and pass it to the hub thread.
/// Anything other than a timely `Hello` drops the connection.
fn handshake(stream: TcpStream, tx: Sender<HubInput>) {
    stream.set_read_timeout(Some(HANDSHAKE_TIMEOUT)).ok();
    let Ok(read_half) = stream.try_clone() else {
        return;
    };
    let mut reader = BufReader::new(read_half);

    let (protocol_version, client_name) = match read_frame(&mut reader) {
        Ok(ClientMessage::Hello {
            protocol_version,
            client_name,
        }) => (protocol_version, client_name),
        Ok(other) => {
            debug!(?other, "expected Hello; dropping connection");
            return;
        }
        Err(e) => {
            debug!(error = %e, "handshake read failed");
            return;
        }
    };
    stream.set_read_timeout(None).ok();

    let _ = tx.send(HubInput::Joined {
        stream,
        reader,
        client_name,
        protocol_version,
    });
}

/// Register a joined connection and spawn its reader thread, or answer
/// `Rejected` and drop it.
fn admit(
    hub: &mut Hub,
    stream: TcpStream,
    reader: BufReader<TcpStream>,
    client_name: String,
    protocol_version: u32,
    tx: &Sender<HubInput>,
    keep_running: &Arc<AtomicBool>,
) {
    let Ok(write_half) = stream.try_clone() else {
        return;
    };
    match hub.add_subscriber(client_name, protocol_version, write_half) {
        Ok(id) => {
            let tx_reader = tx.clone();
            let keep_running_reader = keep_running.clone();
            thread::spawn(move || reader_loop(reader, id, tx_reader, keep_running_reader));
        }
        Err(reason) => {
            info!(%reason, "handshake rejected");
            let rejected = ServerMessage::Rejected {
                reason: reason.to_string(),
            };
            let _ = write_frame(&mut BufWriter::new(stream), &rejected);
        }
    }
}

fn reader_loop(
    mut reader: BufReader<TcpStream>,
    id: ClientId,
    tx: Sender<HubInput>,
    keep_running: Arc<AtomicBool>,
) {
    while keep_running.load(Ordering::SeqCst) {
        match read_frame::<_, ClientMessage>(&mut reader) {
            Ok(ClientMessage::Publish { envelope }) => {
                if tx.send(HubInput::Publish { from: id, envelope }).is_err() {
                    return;
                }
            }
            Ok(ClientMessage::Hello { .. }) => {
                debug!(%id, "ignoring repeated Hello");
            }
            Ok(ClientMessage::Goodbye) => break,
            Err(e) => {
                if !e.is_eof() {
                    debug!(%id, error = %e, "read failed");
                }
                break;
            }
        }
    }
    let _ = tx.send(HubInput::Disconnected { id });
}
