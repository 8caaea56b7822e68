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

pub mod coinbase;
pub mod difficulty;
pub mod error;
pub mod gbt;
pub mod notify;
pub mod workbase;

/// A share that met the network target, handed off for block submission.
///
/// Carries the assembled header and coinbase plus the raw submission
/// fields, so a relay can forward the solve upstream without the full
/// transaction set.
#[derive(Debug, Clone)]
pub struct SolvedBlock {
    pub workbase_id: u64,
    pub header: bitcoin::blockdata::block::Header,
    pub coinbase: bitcoin::Transaction,
    pub username: String,
    pub worker_name: String,
    pub share_difficulty: f64,
    pub enonce1: String,
    pub enonce2: String,
    pub ntime: String,
    pub nonce: String,
    pub version_bits: Option<String>,
}
