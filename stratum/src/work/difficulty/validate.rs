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

//! Share validation.
//!
//! Rebuilds the block header a miner actually hashed from its submission
//! and the workbase it was mining on, then checks the hash against the
//! session target and the network target.

use crate::session::EXTRANONCE2_SIZE;
use crate::work::coinbase::assemble_coinbase;
use crate::work::difficulty::{difficulty_to_target, hash_to_difficulty, meets_target};
use crate::work::error::WorkError;
use crate::work::workbase::Workbase;
use bitcoin::blockdata::block::{Block, Header, Version};
use bitcoin::consensus::deserialize;
use bitcoin::hashes::{sha256d, Hash};
use bitcoin::{BlockHash, CompactTarget, Target, Transaction, Witness};
use tracing::debug;

/// Maximum seconds a submitted ntime may deviate from the workbase time
pub const MAX_NTIME_DRIFT: u32 = 600;

/// Why a share was rejected. Codes follow the stratum convention.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RejectReason {
    Stale,
    Duplicate,
    BadExtranonce2Size,
    TimeOutOfRange,
    LowDifficulty,
    Malformed,
}

impl RejectReason {
    pub fn code(&self) -> i32 {
        match self {
            Self::Stale => 21,
            Self::Duplicate => 22,
            Self::LowDifficulty => 23,
            Self::BadExtranonce2Size => 20,
            Self::TimeOutOfRange => 20,
            Self::Malformed => 20,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Stale => "stale",
            Self::Duplicate => "duplicate",
            Self::LowDifficulty => "low_difficulty",
            Self::BadExtranonce2Size => "bad_extranonce2_size",
            Self::TimeOutOfRange => "time_out_of_range",
            Self::Malformed => "malformed",
        }
    }
}

impl std::fmt::Display for RejectReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The miner supplied fields of a mining.submit, hex encoded as received.
#[derive(Debug, Clone)]
pub struct ShareSubmission<'a> {
    pub enonce1: &'a str,
    pub enonce2: &'a str,
    pub ntime: &'a str,
    pub nonce: &'a str,
    /// Version bits from version-rolling, if the miner negotiated it
    pub version_bits: Option<&'a str>,
}

/// Outcome of a successful share validation.
#[derive(Debug, Clone)]
pub struct ValidationResult {
    pub header: Header,
    pub hash: BlockHash,
    /// The difficulty the hash actually achieved
    pub share_difficulty: f64,
    pub meets_network_target: bool,
}

/// Rebuild the header from a submission and validate it against the
/// session difficulty and the network target.
///
/// Stale and duplicate detection happen before this is called, the caller
/// has the workbase lookup and the per-session submission history.
pub fn validate_submission(
    workbase: &Workbase,
    share: &ShareSubmission<'_>,
    session_difficulty: f64,
    version_mask: u32,
) -> Result<ValidationResult, RejectReason> {
    if share.enonce2.len() != EXTRANONCE2_SIZE * 2 || hex::decode(share.enonce2).is_err() {
        return Err(RejectReason::BadExtranonce2Size);
    }

    let ntime = u32::from_str_radix(share.ntime, 16).map_err(|_| RejectReason::Malformed)?;
    if ntime.abs_diff(workbase.ntime) > MAX_NTIME_DRIFT {
        return Err(RejectReason::TimeOutOfRange);
    }

    let nonce = u32::from_str_radix(share.nonce, 16).map_err(|_| RejectReason::Malformed)?;

    let coinbase = assemble_coinbase(
        &workbase.coinbase1,
        share.enonce1,
        share.enonce2,
        &workbase.coinbase2,
    )
    .map_err(|_| RejectReason::Malformed)?;

    let merkle_root = compute_merkle_root(&coinbase, &workbase.merkle_branches)
        .map_err(|_| RejectReason::Malformed)?;

    let version = match share.version_bits {
        Some(bits) => {
            let bits = u32::from_str_radix(bits, 16).map_err(|_| RejectReason::Malformed)?;
            if bits & !version_mask != 0 {
                return Err(RejectReason::Malformed);
            }
            (workbase.version as u32 & !version_mask) | (bits & version_mask)
        }
        None => workbase.version as u32,
    };

    let header = Header {
        version: Version::from_consensus(version as i32),
        prev_blockhash: workbase
            .prevhash
            .parse()
            .map_err(|_| RejectReason::Malformed)?,
        merkle_root,
        time: ntime,
        bits: CompactTarget::from_unprefixed_hex(&workbase.nbits)
            .map_err(|_| RejectReason::Malformed)?,
        nonce,
    };

    let hash = header.block_hash();
    let share_difficulty = hash_to_difficulty(&hash);

    // The network test does not depend on the session target; a block
    // solve is never a low_difficulty reject even when the session
    // difficulty sits above the network difficulty.
    let network_target = Target::from_compact(header.bits);
    let meets_network_target = header.validate_pow(network_target).is_ok();

    if !meets_network_target && !meets_target(&hash, difficulty_to_target(session_difficulty)) {
        debug!(
            "Share below session target: achieved {:.3e}, required {}",
            share_difficulty, session_difficulty
        );
        return Err(RejectReason::LowDifficulty);
    }

    Ok(ValidationResult {
        header,
        hash,
        share_difficulty,
        meets_network_target,
    })
}

/// Fold the coinbase txid through the merkle branches to get the root.
fn compute_merkle_root(
    coinbase: &Transaction,
    branches: &[String],
) -> Result<bitcoin::TxMerkleNode, WorkError> {
    let mut current = coinbase.compute_txid().to_raw_hash();
    for branch_hex in branches {
        let branch: sha256d::Hash = branch_hex.parse().map_err(|_| WorkError {
            message: format!("Invalid merkle branch: {}", branch_hex),
        })?;
        current = sha256d::Hash::hash(&[current, branch].concat());
    }
    Ok(current.into())
}

/// Assemble a full block from a workbase and the winning coinbase.
///
/// Only possible on workbases carrying the template transactions. The
/// coinbase gets the witness reserved value when the block contains
/// witness transactions.
pub fn assemble_block(
    workbase: &Workbase,
    header: Header,
    mut coinbase: Transaction,
) -> Result<Block, WorkError> {
    let raw_txns = workbase.transactions.as_ref().ok_or_else(|| WorkError {
        message: "Workbase has no transactions, cannot assemble a block".to_string(),
    })?;

    let mut txdata = Vec::with_capacity(raw_txns.len() + 1);
    for raw in raw_txns {
        let bytes = hex::decode(raw).map_err(|e| WorkError {
            message: format!("Invalid transaction hex in workbase: {}", e),
        })?;
        let tx: Transaction = deserialize(&bytes).map_err(|e| WorkError {
            message: format!("Failed to decode workbase transaction: {}", e),
        })?;
        txdata.push(tx);
    }

    let has_witness = txdata
        .iter()
        .any(|tx| tx.input.iter().any(|input| !input.witness.is_empty()));
    if has_witness {
        coinbase.input[0].witness = Witness::from_slice(&[[0u8; 32]]);
    }

    txdata.insert(0, coinbase);

    Ok(Block { header, txdata })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::work::coinbase::parse_address;
    use crate::work::gbt::parse_block_template;

    fn test_workbase() -> Workbase {
        let template = parse_block_template(
            &serde_json::json!({
                "version": 536870912,
                "rules": ["csv", "!segwit"],
                "previousblockhash":
                    "000000006648c58af2ea07d976804c4cbd40377e566af5694f14ecac2b0065c1",
                "transactions": [],
                "coinbaseaux": {},
                "coinbasevalue": 5000000000u64,
                "longpollid": "abc",
                "target": "00000377ae000000000000000000000000000000000000000000000000000000",
                "mintime": 1746434169,
                "curtime": 1746436703,
                "bits": "1e0377ae",
                "height": 99
            })
            .to_string(),
        )
        .unwrap();
        let address = parse_address(
            "bcrt1qe2qaq0e8qlp425pxytrakala7725dynwhknufr",
            bitcoin::Network::Regtest,
        )
        .unwrap();
        Workbase::from_template(1, &template, address).unwrap()
    }

    // Workbase where nonce 00000001 is a known solve of the regtest target
    fn solving_workbase() -> Workbase {
        let template = parse_block_template(
            &serde_json::json!({
                "version": 536870912,
                "rules": ["csv", "!segwit"],
                "previousblockhash":
                    "000000006648c58af2ea07d976804c4cbd40377e566af5694f14ecac2b0065c1",
                "transactions": [],
                "coinbaseaux": {},
                "coinbasevalue": 5000000000u64,
                "longpollid": "abc",
                "target": "7fffff0000000000000000000000000000000000000000000000000000000000",
                "mintime": 1746434169,
                "curtime": 1746436703,
                "bits": "207fffff",
                "height": 99
            })
            .to_string(),
        )
        .unwrap();
        let address = parse_address(
            "bcrt1qe2qaq0e8qlp425pxytrakala7725dynwhknufr",
            bitcoin::Network::Regtest,
        )
        .unwrap();
        Workbase::from_template(1, &template, address).unwrap()
    }

    fn test_share(workbase: &Workbase) -> ShareSubmission<'static> {
        let ntime = format!("{:08x}", workbase.ntime);
        ShareSubmission {
            enonce1: "0a731f0d",
            enonce2: "fe36a31b00000000",
            ntime: Box::leak(ntime.into_boxed_str()),
            nonce: "e9695791",
            version_bits: None,
        }
    }

    #[test]
    fn test_validate_accepts_share_meeting_session_target() {
        let workbase = test_workbase();
        let share = test_share(&workbase);

        // Any hash at all meets a vanishingly small session difficulty
        let result = validate_submission(&workbase, &share, 1e-12, 0x1fffe000).unwrap();

        assert!(result.share_difficulty > 0.0);
        assert!(!result.meets_network_target);
        assert_eq!(result.header.time, workbase.ntime);
        assert_eq!(
            result.header.prev_blockhash.to_string(),
            workbase.prevhash
        );
        assert_eq!(result.hash, result.header.block_hash());
    }

    #[test]
    fn test_validate_rejects_low_difficulty() {
        let workbase = test_workbase();
        let share = test_share(&workbase);

        let result = validate_submission(&workbase, &share, 1e12, 0x1fffe000);
        assert_eq!(result.unwrap_err(), RejectReason::LowDifficulty);
    }

    #[test]
    fn test_block_solve_passes_despite_session_target_above_network() {
        let workbase = solving_workbase();
        let mut share = test_share(&workbase);
        share.nonce = "00000001";

        // session difficulty 1.0 is far above the regtest network difficulty,
        // the solve misses the session target but must still come back
        let result = validate_submission(&workbase, &share, 1.0, 0x1fffe000).unwrap();
        assert!(result.meets_network_target);
        assert!(result.share_difficulty < 1.0);
        assert_eq!(
            result.hash.to_string(),
            "757892754875fa48ed4ce661aebc3a2e1a16e2445266156f05c7aedd64d5310d"
        );
    }

    #[test]
    fn test_validate_rejects_bad_extranonce2_size() {
        let workbase = test_workbase();
        let mut share = test_share(&workbase);
        share.enonce2 = "00";

        let result = validate_submission(&workbase, &share, 1e-12, 0x1fffe000);
        assert_eq!(result.unwrap_err(), RejectReason::BadExtranonce2Size);
    }

    #[test]
    fn test_validate_rejects_ntime_drift() {
        let workbase = test_workbase();
        let mut share = test_share(&workbase);
        let far_future = format!("{:08x}", workbase.ntime + MAX_NTIME_DRIFT + 1);
        share.ntime = Box::leak(far_future.into_boxed_str());

        let result = validate_submission(&workbase, &share, 1e-12, 0x1fffe000);
        assert_eq!(result.unwrap_err(), RejectReason::TimeOutOfRange);
    }

    #[test]
    fn test_validate_accepts_ntime_within_drift() {
        let workbase = test_workbase();
        let mut share = test_share(&workbase);
        let nudged = format!("{:08x}", workbase.ntime + MAX_NTIME_DRIFT);
        share.ntime = Box::leak(nudged.into_boxed_str());

        assert!(validate_submission(&workbase, &share, 1e-12, 0x1fffe000).is_ok());
    }

    #[test]
    fn test_validate_rejects_malformed_nonce() {
        let workbase = test_workbase();
        let mut share = test_share(&workbase);
        share.nonce = "not-hex!";

        let result = validate_submission(&workbase, &share, 1e-12, 0x1fffe000);
        assert_eq!(result.unwrap_err(), RejectReason::Malformed);
    }

    #[test]
    fn test_version_rolling_applies_masked_bits() {
        let workbase = test_workbase();
        let mut share = test_share(&workbase);
        share.version_bits = Some("00002000");

        let result = validate_submission(&workbase, &share, 1e-12, 0x1fffe000).unwrap();
        let version = result.header.version.to_consensus() as u32;
        assert_eq!(version & 0x00002000, 0x00002000);
        // bits outside the mask are untouched
        assert_eq!(version & !0x1fffe000, workbase.version as u32 & !0x1fffe000);
    }

    #[test]
    fn test_version_rolling_rejects_bits_outside_mask() {
        let workbase = test_workbase();
        let mut share = test_share(&workbase);
        share.version_bits = Some("00000001");

        let result = validate_submission(&workbase, &share, 1e-12, 0x1fffe000);
        assert_eq!(result.unwrap_err(), RejectReason::Malformed);
    }

    #[test]
    fn test_version_bits_change_the_hash() {
        let workbase = test_workbase();
        let plain = test_share(&workbase);
        let mut rolled = test_share(&workbase);
        rolled.version_bits = Some("00002000");

        let r1 = validate_submission(&workbase, &plain, 1e-12, 0x1fffe000).unwrap();
        let r2 = validate_submission(&workbase, &rolled, 1e-12, 0x1fffe000).unwrap();
        assert_ne!(r1.hash, r2.hash);
    }

    #[test]
    fn test_assemble_block_coinbase_only() {
        let workbase = test_workbase();
        let share = test_share(&workbase);
        let result = validate_submission(&workbase, &share, 1e-12, 0x1fffe000).unwrap();

        let coinbase = assemble_coinbase(
            &workbase.coinbase1,
            share.enonce1,
            share.enonce2,
            &workbase.coinbase2,
        )
        .unwrap();
        let block = assemble_block(&workbase, result.header, coinbase).unwrap();

        assert_eq!(block.txdata.len(), 1);
        assert!(block.txdata[0].is_coinbase());
        assert!(block.check_merkle_root());
    }

    #[test]
    fn test_assemble_block_requires_transactions() {
        let mut workbase = test_workbase();
        let share = test_share(&workbase);
        let result = validate_submission(&workbase, &share, 1e-12, 0x1fffe000).unwrap();
        let coinbase = assemble_coinbase(
            &workbase.coinbase1,
            share.enonce1,
            share.enonce2,
            &workbase.coinbase2,
        )
        .unwrap();

        workbase.transactions = None;
        assert!(assemble_block(&workbase, result.header, coinbase).is_err());
    }
}
