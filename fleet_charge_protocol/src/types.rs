// Core ID types for the relay protocol.
//
// The hub assigns each connection a compact integer id on handshake. It is
// relay-scoped: it says nothing about users or vehicles, only which socket an
// event came in on. Dashboards use it to recognise the echo of their own
// publishes (the hub delivers every event back to its sender too).

use std::fmt;

use serde::{Deserialize, Serialize};

/// Hub-assigned connection id.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ClientId(pub u32);

impl fmt::Display for ClientId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "client#{}", self.0)
    }
}

/// Protocol version sent in `Hello`. The hub rejects any other value.
pub const PROTOCOL_VERSION: u32 = 1;
