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

//! Remembers the last difficulty a worker was running at, so a reconnect
//! resumes near its working difficulty instead of starting from scratch.

use std::collections::HashMap;
use std::sync::RwLock;
use std::time::{Duration, SystemTime};

/// Remembered difficulties older than this are ignored and dropped.
pub const MEMORY_TTL_SECONDS: u64 = 3600;

#[derive(Debug)]
struct RememberedDifficulty {
    difficulty: f64,
    stored_at: SystemTime,
}

/// Last-known difficulty per (username, worker_name), shared across
/// connections behind a read-write lock.
#[derive(Debug, Default)]
pub struct DifficultyMemory {
    inner: RwLock<HashMap<String, RememberedDifficulty>>,
}

fn key(username: &str, worker_name: &str) -> String {
    format!("{}.{}", username, worker_name)
}

impl DifficultyMemory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store the difficulty a worker disconnected at.
    pub fn remember(&self, username: &str, worker_name: &str, difficulty: f64, now: SystemTime) {
        let mut map = match self.inner.write() {
            Ok(map) => map,
            Err(poisoned) => poisoned.into_inner(),
        };
        map.insert(
            key(username, worker_name),
            RememberedDifficulty {
                difficulty,
                stored_at: now,
            },
        );
    }

    /// Fetch the remembered difficulty for a worker, if it is still fresh.
    pub fn recall(&self, username: &str, worker_name: &str, now: SystemTime) -> Option<f64> {
        let map = match self.inner.read() {
            Ok(map) => map,
            Err(poisoned) => poisoned.into_inner(),
        };
        let entry = map.get(&key(username, worker_name))?;
        let age = now
            .duration_since(entry.stored_at)
            .unwrap_or_else(|_| Duration::from_secs(0));
        if age > Duration::from_secs(MEMORY_TTL_SECONDS) {
            return None;
        }
        Some(entry.difficulty)
    }

    /// Drop entries past the TTL. Called opportunistically from the
    /// session timeout monitor.
    pub fn prune(&self, now: SystemTime) {
        let mut map = match self.inner.write() {
            Ok(map) => map,
            Err(poisoned) => poisoned.into_inner(),
        };
        map.retain(|_, entry| {
            now.duration_since(entry.stored_at)
                .map(|age| age <= Duration::from_secs(MEMORY_TTL_SECONDS))
                .unwrap_or(true)
        });
    }
}
