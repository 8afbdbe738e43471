// fleet_charge_relay: the relay hub for the fleet-charge dashboard.
//
// The hub is a thin broadcaster: clients connect over TCP, publish named
// events, and every connected client (publisher included) receives each one
// verbatim, in publish order. It never looks inside payloads and keeps no
// state across events apart from who is connected.
//
// Module overview:
// - `hub.rs`:    Subscriber roster, handshake checks, broadcast.
// - `server.rs`: Listener thread, per-client reader threads, and the single
//                hub thread that owns `Hub` and does all writes.
// - `client.rs`: `RelayClient`, a blocking client with a background reader
//                thread and an `mpsc` inbox. Used by the dashboard bridge,
//                the station finder and the tests.
//
// Runs standalone (`relay` binary) or embedded via `start_relay`.

pub mod client;
pub mod hub;
pub mod server;

pub use client::{ClientError, Delivery, RelayClient};
pub use server::{DEFAULT_PORT, RelayConfig, RelayHandle, RelayTotals, start_relay};
