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

use crate::difficulty_adjuster::{DifficultyAdjusterTrait, VardiffSettings};
use std::collections::HashSet;
use std::time::SystemTime;

/// Use 4 byte extranonce1
pub const EXTRANONCE1_SIZE: usize = 4;
/// Use 8 byte extranonce2
pub const EXTRANONCE2_SIZE: usize = 8;

/// Per-connection state for one miner.
///
/// Tracks the protocol state machine (subscribed, authorized), the
/// extranonce1 assigned at subscribe, the difficulty adjuster, and the
/// submission history used for duplicate detection.
pub struct Session<D: DifficultyAdjusterTrait> {
    /// Session id, also the extranonce1 value
    pub id: u32,
    /// extranonce1 sent to the miner, hex of the session id
    pub enonce1: String,
    /// Remote socket address, set by the connection task at accept
    pub remote_addr: String,
    /// Did the miner subscribe already?
    pub subscribed: bool,
    /// User agent string from mining.subscribe
    pub user_agent: Option<String>,
    /// Payout address portion of the authorized username
    pub username: Option<String>,
    /// Worker name portion of the authorized username
    pub worker_name: Option<String>,
    /// Password supplied at authorize, stored but not checked
    pub password: Option<String>,
    pub difficulty_adjuster: D,
    /// Version rolling mask negotiated via mining.configure
    pub version_rolling_mask: Option<u32>,
    /// Highest share difficulty seen this session
    pub best_share_difficulty: f64,
    /// Accepted shares this session
    pub accepted_shares: u64,
    pub connected_at: SystemTime,
    /// Last accepted or rejected share time, drives idle disconnects
    pub last_activity: SystemTime,
    /// (workbase id, enonce2, ntime, nonce) of every submission seen
    seen_submissions: HashSet<(u64, String, String, String)>,
}

impl<D: DifficultyAdjusterTrait> Session<D> {
    /// Creates a new session with the given extranonce1 and start difficulty.
    pub fn new(
        enonce1: u32,
        start_difficulty: f64,
        settings: VardiffSettings,
        now: SystemTime,
    ) -> Self {
        Self {
            id: enonce1,
            enonce1: format!("{:08x}", enonce1),
            remote_addr: String::new(),
            subscribed: false,
            user_agent: None,
            username: None,
            worker_name: None,
            password: None,
            difficulty_adjuster: D::new(start_difficulty, settings),
            version_rolling_mask: None,
            best_share_difficulty: 0.0,
            accepted_shares: 0,
            connected_at: now,
            last_activity: now,
            seen_submissions: HashSet::new(),
        }
    }

    /// Has the miner completed mining.authorize?
    pub fn authorized(&self) -> bool {
        self.username.is_some()
    }

    /// Record a submission tuple, returns false if it was already seen.
    pub fn record_submission(
        &mut self,
        workbase_id: u64,
        enonce2: &str,
        ntime: &str,
        nonce: &str,
    ) -> bool {
        self.seen_submissions.insert((
            workbase_id,
            enonce2.to_string(),
            ntime.to_string(),
            nonce.to_string(),
        ))
    }
}
