// Subscriber roster and broadcast for the relay hub.
//
// `Hub` is the data structure `server.rs` drives from its single main loop:
// it holds one buffered write half per connected client and fans every
// published envelope out to all of them, the publisher included. There is no
// internal locking; only the hub thread touches it.
//
// Ordering: because one thread performs every write, envelopes reach each
// subscriber in exactly the order they were published. That is stronger than
// the per-event-name ordering viewers rely on.
//
// Failure policy: a failed write to one subscriber is logged at debug and
// otherwise ignored. The subscriber's reader thread sees the broken pipe and
// reports the disconnect, at which point `remove_subscriber` drops it. No
// retry, no acknowledgment, no persistence.

use std::collections::BTreeMap;
use std::io::BufWriter;
use std::net::{Shutdown, TcpStream};

use fleet_charge_protocol::event::Envelope;
use fleet_charge_protocol::framing::write_frame;
use fleet_charge_protocol::message::ServerMessage;
use fleet_charge_protocol::types::{ClientId, PROTOCOL_VERSION};
use thiserror::Error;
use tracing::{debug, info};

/// Why a handshake was refused. The text is sent to the client verbatim.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum HubError {
    #[error("unsupported protocol version {got} (hub speaks {PROTOCOL_VERSION})")]
    ProtocolVersion { got: u32 },

    #[error("hub is full ({max} subscribers)")]
    Full { max: u32 },
}

pub struct Hub {
    subscribers: BTreeMap<ClientId, Subscriber>,
    next_client_id: u32,
    max_subscribers: u32,
    relayed: BTreeMap<String, u64>,
}

struct Subscriber {
    name: String,
    writer: BufWriter<TcpStream>,
}

impl Hub {
    pub fn new(max_subscribers: u32) -> Self {
        Self {
            subscribers: BTreeMap::new(),
            next_client_id: 0,
            max_subscribers,
            relayed: BTreeMap::new(),
        }
    }

    /// Register a new connection and send it `Welcome`. The returned id tags
    /// the connection's reader thread so its publishes carry the right origin.
    pub fn add_subscriber(
        &mut self,
        client_name: String,
        protocol_version: u32,
        stream: TcpStream,
    ) -> Result<ClientId, HubError> {
        if protocol_version != PROTOCOL_VERSION {
            return Err(HubError::ProtocolVersion {
                got: protocol_version,
            });
        }
        if self.subscribers.len() as u32 >= self.max_subscribers {
            return Err(HubError::Full {
                max: self.max_subscribers,
            });
        }

        let id = ClientId(self.next_client_id);
        self.next_client_id += 1;
        info!(%id, name = %client_name, "New client connected");

        self.subscribers.insert(
            id,
            Subscriber {
                name: client_name,
                writer: BufWriter::new(stream),
            },
        );

        let welcome = ServerMessage::Welcome {
            client_id: id,
            subscriber_count: self.subscribers.len() as u32,
        };
        self.send_to(id, &welcome);
        Ok(id)
    }

    /// Drop a subscriber. Unknown ids are ignored (a reader thread may report
    /// a disconnect for a connection the hub already dropped).
    pub fn remove_subscriber(&mut self, id: ClientId) {
        if let Some(sub) = self.subscribers.remove(&id) {
            info!(%id, name = %sub.name, "Client disconnected");
        }
    }

    /// Relay `envelope` to every subscriber, sender included.
    pub fn publish(&mut self, from: ClientId, envelope: Envelope) {
        debug!(%from, event = %envelope.event, payload = %envelope.payload, "relaying");
        *self.relayed.entry(envelope.event.clone()).or_default() += 1;
        let msg = ServerMessage::Event { from, envelope };
        let ids: Vec<ClientId> = self.subscribers.keys().copied().collect();
        for id in ids {
            self.send_to(id, &msg);
        }
    }

    /// Shut down every subscriber socket. Unblocks their reader threads and
    /// lets clients see EOF when the hub stops.
    pub fn close_all(&mut self) {
        for (id, sub) in std::mem::take(&mut self.subscribers) {
            let _ = sub.writer.get_ref().shutdown(Shutdown::Both);
            debug!(%id, "closed on hub shutdown");
        }
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers.len()
    }

    /// Events relayed so far, per event name.
    pub fn relayed(&self) -> &BTreeMap<String, u64> {
        &self.relayed
    }

    fn send_to(&mut self, id: ClientId, msg: &ServerMessage) {
        let Some(sub) = self.subscribers.get_mut(&id) else {
            return;
        };
        if let Err(e) = write_frame(&mut sub.writer, msg) {
            debug!(%id, error = %e, "write to subscriber failed");
        }
    }
}

#[cfg(test)]
mod tests {
    use std::io::BufReader;
    use std::net::TcpListener;

    use fleet_charge_protocol::event::DashboardEvent;
    use fleet_charge_protocol::framing::read_frame;

    use super::*;

    /// (client side, hub side) of a localhost TCP connection.
    fn tcp_pair() -> (TcpStream, TcpStream) {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        let client = TcpStream::connect(addr).unwrap();
        let (server, _) = listener.accept().unwrap();
        (client, server)
    }

    fn recv(reader: &mut BufReader<TcpStream>) -> ServerMessage {
        read_frame(reader).unwrap()
    }

    fn join(hub: &mut Hub, name: &str) -> (ClientId, BufReader<TcpStream>) {
        let (client, server) = tcp_pair();
        let id = hub
            .add_subscriber(name.into(), PROTOCOL_VERSION, server)
            .unwrap();
        let mut reader = BufReader::new(client);
        assert!(matches!(recv(&mut reader), ServerMessage::Welcome { .. }));
        (id, reader)
    }

    #[test]
    fn welcome_carries_id_and_count() {
        let mut hub = Hub::new(8);
        let (_a, _ra) = join(&mut hub, "a");

        let (client, server) = tcp_pair();
        let id = hub
            .add_subscriber("b".into(), PROTOCOL_VERSION, server)
            .unwrap();
        assert_eq!(id, ClientId(1));
        let mut reader = BufReader::new(client);
        match recv(&mut reader) {
            ServerMessage::Welcome {
                client_id,
                subscriber_count,
            } => {
                assert_eq!(client_id, ClientId(1));
                assert_eq!(subscriber_count, 2);
            }
            other => panic!("expected Welcome, got {other:?}"),
        }
    }

    #[test]
    fn wrong_protocol_version_rejected() {
        let (_client, server) = tcp_pair();
        let mut hub = Hub::new(8);
        let err = hub.add_subscriber("old".into(), 0, server).unwrap_err();
        assert_eq!(err, HubError::ProtocolVersion { got: 0 });
        assert_eq!(hub.subscriber_count(), 0);
    }

    #[test]
    fn full_hub_rejects() {
        let mut hub = Hub::new(1);
        let (_a, _ra) = join(&mut hub, "a");
        let (_client, server) = tcp_pair();
        let err = hub
            .add_subscriber("b".into(), PROTOCOL_VERSION, server)
            .unwrap_err();
        assert_eq!(err, HubError::Full { max: 1 });
    }

    #[test]
    fn publish_reaches_everyone_including_sender() {
        let mut hub = Hub::new(8);
        let (a, mut ra) = join(&mut hub, "a");
        let (_b, mut rb) = join(&mut hub, "b");

        let envelope = DashboardEvent::TimerUpdate { timer: true }.to_envelope();
        hub.publish(a, envelope.clone());

        for reader in [&mut ra, &mut rb] {
            match recv(reader) {
                ServerMessage::Event { from, envelope: got } => {
                    assert_eq!(from, a);
                    assert_eq!(got, envelope);
                }
                other => panic!("expected Event, got {other:?}"),
            }
        }
        assert_eq!(hub.relayed().get("timerUpdate"), Some(&1));
        assert_eq!(hub.relayed().get("location"), None);
    }

    #[test]
    fn publish_order_is_preserved_per_subscriber() {
        let mut hub = Hub::new(8);
        let (a, _ra) = join(&mut hub, "a");
        let (_b, mut rb) = join(&mut hub, "b");

        for i in 0..5 {
            let loc = format!("loc-{i}");
            hub.publish(a, DashboardEvent::Location { loc }.to_envelope());
        }
        for i in 0..5 {
            let ServerMessage::Event { envelope, .. } = recv(&mut rb) else {
                panic!("expected Event");
            };
            assert_eq!(envelope.payload["loc"], format!("loc-{i}"));
        }
    }

    #[test]
    fn removed_subscriber_no_longer_receives() {
        let mut hub = Hub::new(8);
        let (a, _ra) = join(&mut hub, "a");
        let (b, rb) = join(&mut hub, "b");

        hub.remove_subscriber(b);
        assert_eq!(hub.subscriber_count(), 1);
        // Unknown id is a no-op.
        hub.remove_subscriber(b);

        hub.publish(a, DashboardEvent::TimerUpdate { timer: false }.to_envelope());
        // b's socket was closed when the hub dropped its writer: EOF, no frame.
        let mut rb = rb;
        let result: Result<ServerMessage, _> = read_frame(&mut rb);
        assert!(result.is_err());
    }

    #[test]
    fn publish_with_dead_subscriber_still_reaches_others() {
        let mut hub = Hub::new(8);
        let (a, mut ra) = join(&mut hub, "a");
        let (_b, rb) = join(&mut hub, "b");
        drop(rb);

        hub.publish(a, DashboardEvent::Location { loc: "x".into() }.to_envelope());
        hub.publish(a, DashboardEvent::Location { loc: "y".into() }.to_envelope());
        assert!(matches!(recv(&mut ra), ServerMessage::Event { .. }));
        assert!(matches!(recv(&mut ra), ServerMessage::Event { .. }));
    }
}
