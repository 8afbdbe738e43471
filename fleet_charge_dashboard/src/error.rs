// Errors that stop a dashboard or station finder from starting: the relay
// connection failed, or the fleet and config files could not be loaded.

use fleet_charge_relay::ClientError;
use fleet_charge_sim::FleetError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum BridgeError {
    #[error("relay: {0}")]
    Client(#[from] ClientError),

    #[error("fleet data: {0}")]
    Fleet(#[from] FleetError),
}
