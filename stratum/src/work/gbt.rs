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

use crate::work::error::WorkError;
use bitcoin::hashes::{sha256d, Hash};
use serde::{Deserialize, Serialize};

/// Struct representing the getblocktemplate response from Bitcoin Core
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct BlockTemplate {
    pub version: i32,
    pub rules: Vec<String>,
    pub previousblockhash: String,
    pub transactions: Vec<TemplateTransaction>,
    pub coinbaseaux: std::collections::HashMap<String, String>,
    pub coinbasevalue: u64,
    pub longpollid: String,
    pub target: String,
    pub mintime: u64,
    pub curtime: u64,
    pub bits: String,
    pub height: u32,
    #[serde(
        rename = "default_witness_commitment",
        skip_serializing_if = "Option::is_none"
    )]
    pub default_witness_commitment: Option<String>,
}

/// Transaction data in the block template
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct TemplateTransaction {
    pub data: String,
    pub txid: String,
    pub hash: String,
    pub fee: u64,
    pub weight: u32,
}

/// Parse the raw getblocktemplate JSON returned by bitcoind.
pub fn parse_block_template(json: &str) -> Result<BlockTemplate, WorkError> {
    serde_json::from_str::<BlockTemplate>(json).map_err(|e| WorkError {
        message: format!("Failed to parse block template: {}", e),
    })
}

/// Compute merkle branches for the transactions in the block template
/// Uses compute_merkle_branches after parsing the txids from the template
pub fn build_merkle_branches_for_template(
    template: &BlockTemplate,
) -> Result<Vec<sha256d::Hash>, WorkError> {
    let txids = template
        .transactions
        .iter()
        .map(|tx| {
            tx.txid.parse().map_err(|_| WorkError {
                message: format!("Invalid txid in template: {}", tx.txid),
            })
        })
        .collect::<Result<Vec<sha256d::Hash>, WorkError>>()?;
    Ok(compute_merkle_branches(txids))
}

/// Compute merkle branches that, folded with the coinbase txid, produce the
/// block's merkle root. The coinbase occupies position zero of the tree.
fn compute_merkle_branches(input_txids: Vec<sha256d::Hash>) -> Vec<sha256d::Hash> {
    let mut txids = input_txids;
    let mut merkle_branches = Vec::new();
    while !txids.is_empty() {
        merkle_branches.push(txids[0]);
        let mut new_txids = Vec::new();
        for i in (1..txids.len()).step_by(2) {
            let left = txids[i];
            let right = if i + 1 < txids.len() {
                txids[i + 1]
            } else {
                left
            };
            let hash = sha256d::Hash::hash(&[left, right].concat());
            new_txids.push(hash);
        }
        txids = new_txids;
    }
    merkle_branches
}
