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

//! User and worker statistics.
//!
//! Tracks per-user and per-worker share counts and best share difficulties,
//! with weekly counters keyed by ISO week. The table is read-mostly and
//! shared behind a read-write lock; a write only happens on an accepted
//! share.

use chrono::Datelike;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::RwLock;

const INITIAL_WORKER_MAP_CAPACITY: usize = 4;

/// Per-worker share statistics
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct Worker {
    /// Timestamp of the last share, seconds since epoch
    pub last_share_at: u64,
    pub shares_valid_total: u64,
    pub shares_this_week: u64,
    /// Best share difficulty ever seen from this worker
    pub best_share: f64,
    pub best_share_week: f64,
}

impl Worker {
    fn record_share(&mut self, difficulty: f64, timestamp: u64) {
        self.last_share_at = timestamp;
        self.shares_valid_total += 1;
        self.shares_this_week += 1;
        if difficulty > self.best_share {
            self.best_share = difficulty;
        }
        if difficulty > self.best_share_week {
            self.best_share_week = difficulty;
        }
    }

    fn reset_week(&mut self) {
        self.shares_this_week = 0;
        self.best_share_week = 0.0;
    }
}

/// Per-user share statistics with weekly rollover
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct User {
    pub last_share_at: u64,
    pub shares_valid_total: u64,
    pub shares_this_week: u64,
    /// Best share difficulty the user ever achieved
    pub best_share: f64,
    pub best_share_week: f64,
    /// (ISO year, ISO week) the weekly counters belong to
    pub iso_week: (i32, u32),
    pub workers: HashMap<String, Worker>,
}

impl Default for User {
    fn default() -> Self {
        User {
            last_share_at: 0,
            shares_valid_total: 0,
            shares_this_week: 0,
            best_share: 0.0,
            best_share_week: 0.0,
            iso_week: (0, 0),
            workers: HashMap::with_capacity(INITIAL_WORKER_MAP_CAPACITY),
        }
    }
}

/// Summary of a user's finished ISO week, emitted on rollover.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct WeeklySummary {
    pub username: String,
    pub iso_year: i32,
    pub iso_week: u32,
    pub shares: u64,
    pub best_share: f64,
}

/// What recording a share produced: a new personal best and/or a finished
/// week to report.
#[derive(Debug, Clone, Default)]
pub struct ShareRecordOutcome {
    pub personal_best: bool,
    pub weekly_summary: Option<WeeklySummary>,
}

fn iso_week_of(timestamp: u64) -> (i32, u32) {
    match chrono::DateTime::from_timestamp(timestamp as i64, 0) {
        Some(dt) => {
            let week = dt.iso_week();
            (week.year(), week.week())
        }
        None => (0, 0),
    }
}

impl User {
    /// Record a share, rolling the weekly counters first when the ISO week
    /// has changed since the last share.
    fn record_share(
        &mut self,
        username: &str,
        worker_name: &str,
        difficulty: f64,
        timestamp: u64,
    ) -> ShareRecordOutcome {
        let mut outcome = ShareRecordOutcome::default();

        let week = iso_week_of(timestamp);
        if week != self.iso_week {
            if self.shares_this_week > 0 {
                outcome.weekly_summary = Some(WeeklySummary {
                    username: username.to_string(),
                    iso_year: self.iso_week.0,
                    iso_week: self.iso_week.1,
                    shares: self.shares_this_week,
                    best_share: self.best_share_week,
                });
            }
            self.shares_this_week = 0;
            self.best_share_week = 0.0;
            for worker in self.workers.values_mut() {
                worker.reset_week();
            }
            self.iso_week = week;
        }

        if difficulty > self.best_share {
            // first ever share is not announced as a personal best
            outcome.personal_best = self.shares_valid_total > 0;
            self.best_share = difficulty;
        }
        if difficulty > self.best_share_week {
            self.best_share_week = difficulty;
        }

        self.last_share_at = timestamp;
        self.shares_valid_total += 1;
        self.shares_this_week += 1;

        self.workers
            .entry(worker_name.to_string())
            .or_default()
            .record_share(difficulty, timestamp);

        outcome
    }
}

/// All known users keyed by payout address.
#[derive(Debug, Default)]
pub struct UserTable {
    inner: RwLock<HashMap<String, User>>,
}

impl UserTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Ensure the User and Worker records exist. Called on a successful
    /// authorize so a worker shows up before its first share.
    pub fn register(&self, username: &str, worker_name: &str) {
        let mut users = match self.inner.write() {
            Ok(users) => users,
            Err(poisoned) => poisoned.into_inner(),
        };
        users
            .entry(username.to_string())
            .or_default()
            .workers
            .entry(worker_name.to_string())
            .or_default();
    }

    /// Record an accepted share for a user and worker.
    pub fn record_share(
        &self,
        username: &str,
        worker_name: &str,
        difficulty: f64,
        timestamp: u64,
    ) -> ShareRecordOutcome {
        let mut users = match self.inner.write() {
            Ok(users) => users,
            Err(poisoned) => poisoned.into_inner(),
        };
        users
            .entry(username.to_string())
            .or_default()
            .record_share(username, worker_name, difficulty, timestamp)
    }

    /// Snapshot of a user's stats.
    pub fn get(&self, username: &str) -> Option<User> {
        let users = match self.inner.read() {
            Ok(users) => users,
            Err(poisoned) => poisoned.into_inner(),
        };
        users.get(username).cloned()
    }

    pub fn user_count(&self) -> usize {
        let users = match self.inner.read() {
            Ok(users) => users,
            Err(poisoned) => poisoned.into_inner(),
        };
        users.len()
    }
}
