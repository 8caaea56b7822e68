// Copyright (C) 2024, 2025 Solopool Developers (see AUTHORS)
//
// This file is part of Solopool
//
// Solopool is free software: you can redistribute it and/or modify it under
// the terms of the GNU General Public License as published by the Free
// Software Foundation, either version 3 of the License, or (at your option)
// any later version.
//
// Solopool is distributed in the hope that it will be useful, but WITHOUT ANY
// WARRANTY; without even the implied warranty of MERCHANTABILITY or FITNESS
// FOR A PARTICULAR PURPOSE. See the GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License along with
// Solopool. If not, see <https://www.gnu.org/licenses/>.

use serde::Deserialize;

/// Which side of the template channel this instance plays.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Primary,
    Relay,
}

/// Configuration for the template distributor.
#[derive(Debug, Clone, Deserialize)]
pub struct DistributorConfig {
    pub role: Role,
    /// Address a primary listens on for relay connections
    pub listen_address: Option<String>,
    /// Address a relay connects to
    pub primary_address: Option<String>,
    /// Shared secret relays present when connecting
    pub auth_token: String,
    /// Seconds between template polls against bitcoind
    pub poll_interval: u64,
    /// Seconds of primary silence before a relay goes independent
    pub failover_threshold: u64,
    /// Seconds between reconnect attempts to the primary
    pub reconnect_delay: u64,
    /// bitcoind ZMQ hashblock endpoint, e.g. tcp://127.0.0.1:28332
    pub zmq_endpoint: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_deserialize_primary_config() {
        let config: DistributorConfig = serde_json::from_value(serde_json::json!({
            "role": "primary",
            "listen_address": "0.0.0.0:9500",
            "primary_address": null,
            "auth_token": "sekrit",
            "poll_interval": 30,
            "failover_threshold": 90,
            "reconnect_delay": 5,
            "zmq_endpoint": "tcp://127.0.0.1:28332"
        }))
        .unwrap();

        assert_eq!(config.role, Role::Primary);
        assert_eq!(config.listen_address.as_deref(), Some("0.0.0.0:9500"));
        assert!(config.primary_address.is_none());
        assert_eq!(config.poll_interval, 30);
    }

    #[test]
    fn test_deserialize_relay_config() {
        let config: DistributorConfig = serde_json::from_value(serde_json::json!({
            "role": "relay",
            "listen_address": null,
            "primary_address": "10.0.0.1:9500",
            "auth_token": "sekrit",
            "poll_interval": 30,
            "failover_threshold": 90,
            "reconnect_delay": 5,
            "zmq_endpoint": null
        }))
        .unwrap();

        assert_eq!(config.role, Role::Relay);
        assert_eq!(config.primary_address.as_deref(), Some("10.0.0.1:9500"));
    }

    #[test]
    fn test_unknown_role_rejected() {
        let result = serde_json::from_value::<DistributorConfig>(serde_json::json!({
            "role": "observer",
            "listen_address": null,
            "primary_address": null,
            "auth_token": "sekrit",
            "poll_interval": 30,
            "failover_threshold": 90,
            "reconnect_delay": 5,
            "zmq_endpoint": null
        }));
        assert!(result.is_err());
    }
}
