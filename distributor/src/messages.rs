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

//! Frames exchanged between a primary and its relays.
//!
//! One JSON object per line over the persistent TCP stream, tagged by
//! `type`. The stream is trusted after the Hello handshake, so frames
//! carry work and solves, never miner identities beyond the payout user.

use serde::{Deserialize, Serialize};
use stratum::work::workbase::Workbase;
use stratum::work::SolvedBlock;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Frame {
    Hello(Hello),
    TemplatePush(TemplatePush),
    BlockForward(BlockForward),
}

/// First frame on a relay connection. The primary drops the connection
/// when the token does not match its own.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Hello {
    pub token: String,
}

/// A workbase pushed from the primary, minus the raw transactions.
///
/// Relays rebuild headers from the coinbase fragments and branches alone;
/// the primary keeps the transaction bodies for block assembly.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TemplatePush {
    pub template_id: u64,
    pub previous_hash: String,
    /// [coinbase1, coinbase2], the extranonce gap sits between them
    pub coinbase_fragments: [String; 2],
    pub merkle_branches: Vec<String>,
    pub version: i32,
    pub compact_target: String,
    pub timestamp: u32,
    pub height: u32,
}

impl From<&Workbase> for TemplatePush {
    fn from(workbase: &Workbase) -> Self {
        TemplatePush {
            template_id: workbase.id,
            previous_hash: workbase.prevhash.clone(),
            coinbase_fragments: [workbase.coinbase1.clone(), workbase.coinbase2.clone()],
            merkle_branches: workbase.merkle_branches.clone(),
            version: workbase.version,
            compact_target: workbase.nbits.clone(),
            timestamp: workbase.ntime,
            height: workbase.height,
        }
    }
}

impl TemplatePush {
    /// Turn the push back into a workbase a relay can serve. No
    /// transactions, so the relay cannot assemble a block from it.
    pub fn into_workbase(self) -> Workbase {
        let [coinbase1, coinbase2] = self.coinbase_fragments;
        Workbase {
            id: self.template_id,
            prevhash: self.previous_hash,
            coinbase1,
            coinbase2,
            merkle_branches: self.merkle_branches,
            version: self.version,
            nbits: self.compact_target,
            ntime: self.timestamp,
            height: self.height,
            transactions: None,
        }
    }
}

/// A solve found on a relay, forwarded for submission through the
/// primary's node. Carries the raw submission fields so the primary
/// rebuilds the block against its own copy of the template.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct BlockForward {
    pub template_id: u64,
    pub username: String,
    pub worker_name: String,
    pub enonce1: String,
    pub enonce2: String,
    pub ntime: String,
    pub nonce: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub version_bits: Option<String>,
    pub share_difficulty: f64,
}

impl From<&SolvedBlock> for BlockForward {
    fn from(solved: &SolvedBlock) -> Self {
        BlockForward {
            template_id: solved.workbase_id,
            username: solved.username.clone(),
            worker_name: solved.worker_name.clone(),
            enonce1: solved.enonce1.clone(),
            enonce2: solved.enonce2.clone(),
            ntime: solved.ntime.clone(),
            nonce: solved.nonce.clone(),
            version_bits: solved.version_bits.clone(),
            share_difficulty: solved.share_difficulty,
        }
    }
}
