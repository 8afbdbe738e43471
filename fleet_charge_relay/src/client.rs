// Blocking TCP client for the relay hub.
//
// - `connect()` performs the TCP connect and `Hello`/`Welcome` handshake on
//   the calling thread, then spawns a reader thread.
// - The reader thread decodes `ServerMessage::Event` frames and pushes them
//   into an `mpsc` channel as `Delivery` values. When the hub goes away it
//   pushes nothing more; `is_connected()` turns false.
// - The caller keeps the write half and publishes synchronously (frames are
//   small, a flush per publish is fine).
// - `poll()` drains without blocking; `recv_timeout()` waits for the next
//   delivery, which is what a tick-driven owner uses as its sleep.
//
// The client is an explicit subscription handle: dropping it (or calling
// `disconnect()`) ends interest in every event. No callbacks are registered.

use std::io::{BufReader, BufWriter};
use std::net::TcpStream;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError};
use std::thread;
use std::time::Duration;

use fleet_charge_protocol::event::{DashboardEvent, Envelope};
use fleet_charge_protocol::framing::{FrameError, read_frame, write_frame};
use fleet_charge_protocol::message::{ClientMessage, ServerMessage};
use fleet_charge_protocol::types::{ClientId, PROTOCOL_VERSION};
use thiserror::Error;
use tracing::debug;

const HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("connect to {addr} failed: {source}")]
    Connect {
        addr: String,
        #[source]
        source: std::io::Error,
    },

    #[error("handshake failed: {0}")]
    Handshake(#[source] FrameError),

    #[error("rejected by hub: {0}")]
    Rejected(String),

    #[error("unexpected handshake reply: {0}")]
    UnexpectedReply(String),

    #[error("send failed: {0}")]
    Send(#[source] FrameError),
}

/// One relayed event as seen by this client.
#[derive(Clone, Debug, PartialEq)]
pub struct Delivery {
    pub from: ClientId,
    pub envelope: Envelope,
}

pub struct RelayClient {
    client_id: ClientId,
    writer: BufWriter<TcpStream>,
    inbox: Receiver<Delivery>,
    connected: Arc<AtomicBool>,
}

impl RelayClient {
    /// Connect and subscribe. `addr` is anything `TcpStream::connect` takes
    /// as a string, e.g. `"127.0.0.1:4000"`.
    pub fn connect(addr: &str, client_name: &str) -> Result<Self, ClientError> {
        let stream = TcpStream::connect(addr).map_err(|source| ClientError::Connect {
            addr: addr.into(),
            source,
        })?;
        stream.set_read_timeout(Some(HANDSHAKE_TIMEOUT)).ok();
        let read_half = stream.try_clone().map_err(|source| ClientError::Connect {
            addr: addr.into(),
            source,
        })?;

        let mut writer = BufWriter::new(stream);
        let hello = ClientMessage::Hello {
            protocol_version: PROTOCOL_VERSION,
            client_name: client_name.into(),
        };
        write_frame(&mut writer, &hello).map_err(ClientError::Handshake)?;

        let mut reader = BufReader::new(read_half);
        let client_id = match read_frame(&mut reader).map_err(ClientError::Handshake)? {
            ServerMessage::Welcome { client_id, .. } => client_id,
            ServerMessage::Rejected { reason } => return Err(ClientError::Rejected(reason)),
            other => return Err(ClientError::UnexpectedReply(format!("{other:?}"))),
        };
        reader.get_ref().set_read_timeout(None).ok();

        let (tx, rx) = mpsc::channel();
        let connected = Arc::new(AtomicBool::new(true));
        let connected_reader = connected.clone();
        thread::spawn(move || reader_loop(reader, tx, connected_reader));

        Ok(Self {
            client_id,
            writer,
            inbox: rx,
            connected,
        })
    }

    /// The id the hub assigned to this connection.
    pub fn client_id(&self) -> ClientId {
        self.client_id
    }

    pub fn publish(&mut self, event: &DashboardEvent) -> Result<(), ClientError> {
        self.publish_envelope(event.to_envelope())
    }

    pub fn publish_envelope(&mut self, envelope: Envelope) -> Result<(), ClientError> {
        write_frame(&mut self.writer, &ClientMessage::Publish { envelope })
            .map_err(ClientError::Send)
    }

    /// Drain every delivery received so far without blocking.
    pub fn poll(&self) -> Vec<Delivery> {
        self.inbox.try_iter().collect()
    }

    /// Wait up to `timeout` for the next delivery.
    pub fn recv_timeout(&self, timeout: Duration) -> Option<Delivery> {
        match self.inbox.recv_timeout(timeout) {
            Ok(delivery) => Some(delivery),
            Err(RecvTimeoutError::Timeout | RecvTimeoutError::Disconnected) => None,
        }
    }

    /// False once the hub connection has closed and the inbox is drained of
    /// new arrivals.
    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    /// Send `Goodbye`. The hub drops the subscription when it reads it.
    pub fn disconnect(&mut self) {
        let _ = write_frame(&mut self.writer, &ClientMessage::Goodbye);
    }
}

fn reader_loop(
    mut reader: BufReader<TcpStream>,
    tx: mpsc::Sender<Delivery>,
    connected: Arc<AtomicBool>,
) {
    loop {
        match read_frame::<_, ServerMessage>(&mut reader) {
            Ok(ServerMessage::Event { from, envelope }) => {
                if tx.send(Delivery { from, envelope }).is_err() {
                    break;
                }
            }
            Ok(other) => debug!(?other, "ignoring non-event message"),
            Err(e) => {
                if !e.is_eof() {
                    debug!(error = %e, "relay read failed");
                }
                break;
            }
        }
    }
    connected.store(false, Ordering::SeqCst);
}
