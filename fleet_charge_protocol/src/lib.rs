// fleet_charge_protocol: wire protocol for the fleet-charge relay hub.
//
// Shared by the hub (`fleet_charge_relay`) and every client (dashboards,
// station finders, viewers). No dependency on the simulation crate.
//
// Module overview:
// - `types.rs`:   `ClientId` and the protocol version constant.
// - `event.rs`:   `Envelope` (name + opaque JSON payload, what the hub
//                 relays) and `DashboardEvent` (the typed event vocabulary:
//                 location, filteredlocations, timerUpdate, chargeNow,
//                 chargeNowMultiple).
// - `message.rs`: `ClientMessage` / `ServerMessage` handshake and relay
//                 messages.
// - `framing.rs`: 4-byte length prefix + JSON body over any `Read`/`Write`.
//
// Blocking `std::io` only; no async runtime.

pub mod event;
pub mod framing;
pub mod message;
pub mod types;

pub use event::{DashboardEvent, Envelope, EventError};
pub use framing::{FrameError, MAX_FRAME_LEN, read_frame, write_frame};
pub use message::{ClientMessage, ServerMessage};
pub use types::{ClientId, PROTOCOL_VERSION};
