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

//! Coinbase construction for stratum work.
//!
//! The coinbase transaction is serialized into two hex fragments with a gap
//! where the miner splices extranonce1 and extranonce2. The fragments use the
//! legacy (non-witness) serialization, as stratum requires. The miner-facing
//! split happens inside the scriptsig, after the BIP34 height push.

use crate::session::{EXTRANONCE1_SIZE, EXTRANONCE2_SIZE};
use crate::work::error::WorkError;
use bitcoin::blockdata::script::Builder;
use bitcoin::consensus::{deserialize, serialize};
use bitcoin::{Address, Amount, ScriptBuf, Transaction};
use std::str::FromStr;

/// Coinbase transaction version
const COINBASE_TX_VERSION: u32 = 2;

/// Attribution tag appended to the scriptsig after the extranonce gap,
/// also reported on found blocks
pub const COINBASE_TAG: &str = "/solopool/";

/// An output address and amount pair for the coinbase transaction
#[derive(Debug, Clone)]
pub struct OutputPair {
    pub address: Address,
    pub amount: Amount,
}

/// Parse an address string and require it to match the given network.
pub fn parse_address(
    address: &str,
    network: bitcoin::Network,
) -> Result<Address, WorkError> {
    Address::from_str(address)
        .map_err(|e| WorkError {
            message: format!("Invalid address: {}", e),
        })?
        .require_network(network)
        .map_err(|e| WorkError {
            message: format!("Address network mismatch: {}", e),
        })
}

fn push_u64_le(buf: &mut Vec<u8>, value: u64) {
    buf.extend_from_slice(&value.to_le_bytes());
}

fn push_u32_le(buf: &mut Vec<u8>, value: u32) {
    buf.extend_from_slice(&value.to_le_bytes());
}

fn serialize_output(buf: &mut Vec<u8>, value: u64, script: &ScriptBuf) {
    push_u64_le(buf, value);
    // Coinbase scripts are always far below the single byte varint limit
    buf.push(script.len() as u8);
    buf.extend_from_slice(script.as_bytes());
}

/// Build the two coinbase fragments for a block template.
///
/// Returns (coinbase1, coinbase2) hex strings. Concatenating
/// coinbase1 + extranonce1 + extranonce2 + coinbase2 yields a consensus
/// valid coinbase transaction paying `reward` to `payout`.
pub fn build_coinbase_fragments(
    height: u32,
    reward: Amount,
    payout: &OutputPair,
    witness_commitment: Option<&str>,
    aux_flags: Option<&str>,
) -> Result<(String, String), WorkError> {
    let height_push = Builder::new().push_int(height as i64).into_script();
    let flags = match aux_flags {
        Some(flags) if !flags.is_empty() => hex::decode(flags).map_err(|e| WorkError {
            message: format!("Invalid coinbaseaux flags: {}", e),
        })?,
        _ => Vec::new(),
    };

    let script_len =
        height_push.len() + flags.len() + EXTRANONCE1_SIZE + EXTRANONCE2_SIZE + COINBASE_TAG.len();
    if script_len > 100 {
        return Err(WorkError {
            message: format!("Coinbase scriptsig too long: {} bytes", script_len),
        });
    }

    let mut coinbase1 = Vec::new();
    push_u32_le(&mut coinbase1, COINBASE_TX_VERSION);
    coinbase1.push(0x01); // one input
    coinbase1.extend_from_slice(&[0u8; 32]); // null prevout
    coinbase1.extend_from_slice(&[0xff; 4]); // prevout index
    coinbase1.push(script_len as u8);
    coinbase1.extend_from_slice(height_push.as_bytes());
    coinbase1.extend_from_slice(&flags);
    // the miner splices extranonce1 + extranonce2 here

    let mut coinbase2 = Vec::new();
    coinbase2.extend_from_slice(COINBASE_TAG.as_bytes());
    coinbase2.extend_from_slice(&[0xff; 4]); // sequence

    let payout_script = payout.address.script_pubkey();
    let commitment_script = match witness_commitment {
        Some(commitment) => {
            let bytes = hex::decode(commitment).map_err(|e| WorkError {
                message: format!("Invalid witness commitment: {}", e),
            })?;
            Some(ScriptBuf::from_bytes(bytes))
        }
        None => None,
    };

    coinbase2.push(1 + commitment_script.is_some() as u8); // output count
    serialize_output(&mut coinbase2, reward.to_sat(), &payout_script);
    if let Some(script) = &commitment_script {
        serialize_output(&mut coinbase2, 0, script);
    }
    push_u32_le(&mut coinbase2, 0); // locktime

    Ok((hex::encode(coinbase1), hex::encode(coinbase2)))
}

/// Splice the miner's extranonces into the fragments and decode the
/// resulting coinbase transaction.
pub fn assemble_coinbase(
    coinbase1: &str,
    enonce1: &str,
    enonce2: &str,
    coinbase2: &str,
) -> Result<Transaction, WorkError> {
    let complete = format!("{}{}{}{}", coinbase1, enonce1, enonce2, coinbase2);
    let bytes = hex::decode(&complete).map_err(|e| WorkError {
        message: format!("Invalid coinbase hex: {}", e),
    })?;
    deserialize::<Transaction>(&bytes).map_err(|e| WorkError {
        message: format!("Failed to decode coinbase: {}", e),
    })
}

/// Serialize a full coinbase transaction to hex. Used by tests and the
/// template distributor when logging found blocks.
pub fn coinbase_to_hex(tx: &Transaction) -> String {
    hex::encode(serialize(tx))
}
