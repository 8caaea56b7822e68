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

/// Max username includes the dot and the worker name
/// btcaddress.workername, with btcaddress max at 62 bytes
const MAX_USERNAME_LENGTH: usize = 100;

/// Worker name used when the miner authorizes with a bare address
pub const DEFAULT_WORKER_NAME: &str = "default";

/// Characters allowed in a worker name besides ASCII alphanumerics
const WORKER_NAME_EXTRA_CHARS: &[char] = &['.', '-', '_'];

#[derive(Debug, thiserror::Error)]
pub enum UsernameValidationError {
    #[error("Invalid Bitcoin address: {0}")]
    InvalidAddress(String),
    #[error("Username too long (max {0} characters)")]
    UserNameTooLong(usize),
    #[error("Invalid worker name: {0}")]
    InvalidWorkerName(String),
}

fn valid_worker_name(worker: &str) -> bool {
    !worker.is_empty()
        && worker
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || WORKER_NAME_EXTRA_CHARS.contains(&c))
}

/// Validates a stratum username in the format <btcaddress>.<workername>
///
/// The address part must parse as a Bitcoin address for the given network.
/// Everything after the first dot is the worker name; when absent the
/// caller falls back to [`DEFAULT_WORKER_NAME`].
pub fn validate(
    username: &str,
    network: bitcoin::Network,
) -> Result<(&str, Option<&str>), UsernameValidationError> {
    if username.len() > MAX_USERNAME_LENGTH {
        return Err(UsernameValidationError::UserNameTooLong(
            MAX_USERNAME_LENGTH,
        ));
    }

    let parts: Vec<&str> = username.splitn(2, '.').collect();

    let address_part = parts[0];
    let address = address_part.parse::<bitcoin::Address<_>>().map_err(|e| {
        UsernameValidationError::InvalidAddress(format!("Failed to parse address: {e}"))
    })?;

    address.require_network(network).map_err(|_| {
        UsernameValidationError::InvalidAddress(format!(
            "Expected an address for network {network}",
        ))
    })?;

    if parts.len() > 1 {
        let worker = parts[1];
        if !valid_worker_name(worker) {
            return Err(UsernameValidationError::InvalidWorkerName(
                worker.to_string(),
            ));
        }
        Ok((address_part, Some(worker)))
    } else {
        Ok((address_part, None))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bitcoin::Network;

    #[test]
    fn test_valid_address_no_worker() {
        let testnet_address = "tb1qw508d6qejxtdg4y5r3zarvary0c5xw7kxpjzsx";
        let result = validate(testnet_address, Network::Testnet);
        assert!(result.is_ok());
        let (address, worker_name) = result.unwrap();
        assert_eq!(address.to_string(), testnet_address);
        assert_eq!(worker_name, None);
    }

    #[test]
    fn test_valid_address_with_worker() {
        let username = "tb1qw508d6qejxtdg4y5r3zarvary0c5xw7kxpjzsx.worker1";
        let result = validate(username, Network::Testnet);
        assert!(result.is_ok());
        let (address, worker_name) = result.unwrap();
        assert_eq!(address, "tb1qw508d6qejxtdg4y5r3zarvary0c5xw7kxpjzsx");
        assert_eq!(worker_name, Some("worker1"));
    }

    #[test]
    fn test_invalid_address() {
        let result = validate("not_a_bitcoin_address", Network::Bitcoin);
        assert!(matches!(
            result.unwrap_err(),
            UsernameValidationError::InvalidAddress(_)
        ));
    }

    #[test]
    fn test_wrong_network() {
        // Using a testnet address on mainnet
        let testnet_address = "tb1qw508d6qejxtdg4y5r3zarvary0c5xw7kxpjzsx";
        let result = validate(testnet_address, Network::Bitcoin);
        assert!(matches!(
            result.unwrap_err(),
            UsernameValidationError::InvalidAddress(_)
        ));
    }

    #[test]
    fn test_username_too_long() {
        let mainnet_address = "1A1zP1eP5QGefi2DMPTfTL5SLmv7DivfNa";
        let long_worker = format!("{}.{}", mainnet_address, "a".repeat(70));
        let result = validate(&long_worker, Network::Bitcoin);
        assert!(matches!(
            result.unwrap_err(),
            UsernameValidationError::UserNameTooLong(MAX_USERNAME_LENGTH)
        ));
    }

    #[test]
    fn test_worker_name_with_forbidden_characters() {
        let mainnet_address = "1A1zP1eP5QGefi2DMPTfTL5SLmv7DivfNa";
        for worker in ["rig 1", "rig!", "rig/1", "rig\u{e9}"] {
            let username = format!("{}.{}", mainnet_address, worker);
            let result = validate(&username, Network::Bitcoin);
            assert!(
                matches!(
                    result,
                    Err(UsernameValidationError::InvalidWorkerName(_))
                ),
                "worker {:?} should be rejected",
                worker
            );
        }
    }

    #[test]
    fn test_empty_worker_name_rejected() {
        let mainnet_address = "1A1zP1eP5QGefi2DMPTfTL5SLmv7DivfNa";
        let username = format!("{}.", mainnet_address);
        let result = validate(&username, Network::Bitcoin);
        assert!(matches!(
            result,
            Err(UsernameValidationError::InvalidWorkerName(_))
        ));
    }

    #[test]
    fn test_multiple_dots_in_username() {
        let mainnet_address = "1A1zP1eP5QGefi2DMPTfTL5SLmv7DivfNa";
        let multiple_dots = format!("{}.worker.with.dots", mainnet_address);
        let result = validate(&multiple_dots, Network::Bitcoin);
        assert!(result.is_ok());
        let (address, worker_name) = result.unwrap();
        assert_eq!(address.to_string(), mainnet_address);
        assert_eq!(worker_name, Some("worker.with.dots"));
    }
}
