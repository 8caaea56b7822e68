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

//! Difficulty and target conversions.
//!
//! Difficulty 1 corresponds to the original bitcoin target 0xFFFF * 2^208.
//! Session difficulties are f64, which is plenty of precision for share
//! targets and matches what miners expect in mining.set_difficulty.

pub mod validate;

use bitcoin::{BlockHash, Target};

/// The difficulty 1 target as a float: 0xFFFF * 2^208
pub const DIFF1_F64: f64 =
    65535.0 * 411376139330301510538742295639337626245683966408394965837152256.0;

/// Interval between block subsidy halvings
const HALVING_INTERVAL: u32 = 210_000;

/// Initial block subsidy in satoshis
const INITIAL_SUBSIDY: u64 = 5_000_000_000;

/// Convert a pool difficulty to the target a share hash must meet.
pub fn difficulty_to_target(difficulty: f64) -> Target {
    if difficulty <= 0.0 {
        return Target::MAX;
    }
    let mut value = DIFF1_F64 / difficulty;
    let mut bytes = [0u8; 32];
    for (i, byte) in bytes.iter_mut().enumerate() {
        let scale = 2f64.powi((8 * (31 - i)) as i32);
        let digit = (value / scale).floor().min(255.0);
        *byte = digit as u8;
        value -= digit * scale;
    }
    Target::from_be_bytes(bytes)
}

/// The difficulty a target corresponds to.
pub fn target_to_difficulty(target: Target) -> f64 {
    let bytes = target.to_be_bytes();
    let mut value = 0.0f64;
    for byte in bytes {
        value = value * 256.0 + byte as f64;
    }
    if value == 0.0 {
        return f64::MAX;
    }
    DIFF1_F64 / value
}

/// The difficulty a block hash actually achieved.
pub fn hash_to_difficulty(hash: &BlockHash) -> f64 {
    use bitcoin::hashes::Hash;
    let mut value = 0.0f64;
    // hash bytes are stored little endian, walk them backwards
    for byte in hash.to_byte_array().iter().rev() {
        value = value * 256.0 + *byte as f64;
    }
    if value == 0.0 {
        return f64::MAX;
    }
    DIFF1_F64 / value
}

/// Does the hash meet the target? Equal to the target counts as met.
pub fn meets_target(hash: &BlockHash, target: Target) -> bool {
    target.is_met_by(*hash)
}

/// Block subsidy in satoshis at a given height.
pub fn block_subsidy(height: u32) -> u64 {
    let halvings = height / HALVING_INTERVAL;
    if halvings >= 64 {
        return 0;
    }
    INITIAL_SUBSIDY >> halvings
}
