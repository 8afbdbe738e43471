// Connection settings shared by the dashboard and station finder clients.

use fleet_charge_relay::DEFAULT_PORT;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BridgeConfig {
    /// `host:port` of the relay hub.
    pub relay_address: String,
    /// Name sent in the hub handshake; shows up in the hub's logs.
    pub client_name: String,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            relay_address: format!("127.0.0.1:{DEFAULT_PORT}"),
            client_name: "dashboard".into(),
        }
    }
}

impl BridgeConfig {
    pub fn with_name(client_name: impl Into<String>) -> Self {
        Self {
            client_name: client_name.into(),
            ..Self::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_points_at_local_relay() {
        let config = BridgeConfig::default();
        assert_eq!(config.relay_address, "127.0.0.1:4000");
        assert_eq!(BridgeConfig::with_name("finder").client_name, "finder");
    }
}
