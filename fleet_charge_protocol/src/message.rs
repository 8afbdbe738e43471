// Protocol messages between hub clients and the relay hub.
//
// - `ClientMessage`: sent by dashboards, station finders and viewers.
// - `ServerMessage`: sent by the hub.
//
// The hub's only real job is `Publish` in, `Event` out to every subscriber
// (the publisher included). `Envelope` payloads are opaque to the hub; see
// `event.rs` for the typed view clients use.

use serde::{Deserialize, Serialize};

use crate::event::Envelope;
use crate::types::ClientId;

/// Messages sent by a client to the hub.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum ClientMessage {
    /// Subscribe (handshake). Must be the first message on a connection.
    Hello {
        protocol_version: u32,
        client_name: String,
    },
    /// Broadcast a named event to every subscriber.
    Publish { envelope: Envelope },
    /// Leaving gracefully.
    Goodbye,
}

/// Messages sent by the hub to a client.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum ServerMessage {
    /// Handshake accepted.
    Welcome {
        client_id: ClientId,
        subscriber_count: u32,
    },
    /// Handshake rejected; the connection is closed afterwards.
    Rejected { reason: String },
    /// A relayed event, tagged with the connection it came in on.
    Event { from: ClientId, envelope: Envelope },
}
