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

#[derive(Debug, Deserialize, Clone)]
pub struct StratumConfig {
    /// The hostname for the Stratum server
    pub hostname: String,
    /// The port for the Stratum server
    pub port: u16,
    /// The start difficulty for all miners that connect to the server
    pub start_difficulty: f64,
    /// The minimum difficulty for the pool
    pub minimum_difficulty: f64,
    /// The maximum difficulty for the pool, if set to None, it is not enforced
    pub maximum_difficulty: Option<f64>,
    /// Target seconds between two shares from one connection
    pub target_share_interval: u64,
    /// Retarget after this many shares since the last adjustment
    pub retarget_shares: u32,
    /// Retarget after this many seconds since the last adjustment
    pub retarget_seconds: u64,
    /// Number of superseded workbases kept valid for late submissions
    pub workbase_retention: usize,
    /// Seconds of silence before an idle connection is closed
    pub idle_timeout: u64,
    /// Capacity of the bounded event queue
    pub event_queue_capacity: usize,
    /// The address for solo mining payouts
    pub solo_address: Option<String>,
    /// The network can be "main", "test", "testnet4", "signet" or "regtest"
    #[serde(deserialize_with = "deserialize_network")]
    pub network: bitcoin::Network,
    /// The version mask to use for version-rolling
    #[serde(deserialize_with = "deserialize_version_mask")]
    pub version_mask: u32,
}

impl StratumConfig {
    /// Parse the configured solo payout address against the configured network.
    pub fn parse_solo_address(&self) -> Option<bitcoin::Address> {
        let address = self.solo_address.as_ref()?;
        address
            .parse::<bitcoin::Address<_>>()
            .ok()?
            .require_network(self.network)
            .ok()
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct LoggingConfig {
    /// Log level filter, e.g. "info" or "stratum=debug"
    pub level: String,
    /// Log to console, defaults to true
    pub console: Option<bool>,
    /// Optional log file path, rotated daily
    pub file: Option<String>,
}

/// helper function to deserialize the network from the config file, which is provided as a string like Core
/// Possible values are: main, test, testnet4, signet, regtest
fn deserialize_network<'de, D>(deserializer: D) -> Result<bitcoin::Network, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let s: String = serde::Deserialize::deserialize(deserializer)?;
    bitcoin::Network::from_core_arg(&s).map_err(serde::de::Error::custom)
}

fn deserialize_version_mask<'de, D>(deserializer: D) -> Result<u32, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let s: String = serde::Deserialize::deserialize(deserializer)?;
    u32::from_str_radix(&s, 16).map_err(serde::de::Error::custom)
}
