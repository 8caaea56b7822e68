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

//! Per-connection variable difficulty.
//!
//! Tracks an exponential moving average of the inter-share interval and
//! retargets the session difficulty towards the configured share interval.
//! Adjustments are dampened, clamped to a single doubling or halving per
//! step, and rate limited by a cooldown. A one-time fast ramp lets a fast
//! miner escape a far-too-low starting difficulty without waiting through
//! many dampened steps.

mod calc;
pub mod memory;

#[cfg(test)]
use mockall::automock;
use std::time::SystemTime;
use tracing::{debug, info};

use crate::config::StratumConfig;
use crate::difficulty_adjuster::calc::{clamp_step, sane_time_diff, update_ema};

/// Smoothing factor for the inter-share interval EMA
pub const EMA_ALPHA: f64 = 0.3;

/// Interval ratios inside this band leave the difficulty alone
pub const DEAD_BAND_LOW: f64 = 0.8;
pub const DEAD_BAND_HIGH: f64 = 1.2;

/// Fraction of the computed correction actually applied per retarget
pub const DAMPENING: f64 = 0.6;

/// A single retarget never more than doubles or halves the difficulty
pub const MAX_STEP_UP: f64 = 2.0;
pub const MAX_STEP_DOWN: f64 = 0.5;

/// Minimum seconds between two difficulty changes
pub const COOLDOWN_SECONDS: f64 = 30.0;

/// Interval ratio above which the one-time fast ramp kicks in
pub const FAST_RAMP_TRIGGER: f64 = 8.0;

/// Upper bound on the fast ramp as a multiple of the current difficulty
pub const FAST_RAMP_MAX_MULTIPLIER: f64 = 64.0;

/// Retarget tuning shared by all adjusters, lifted from the stratum config.
#[derive(Debug, Clone, Copy)]
pub struct VardiffSettings {
    pub target_share_interval: f64,
    pub retarget_shares: u32,
    pub retarget_seconds: f64,
    pub minimum_difficulty: f64,
    pub maximum_difficulty: Option<f64>,
}

impl From<&StratumConfig> for VardiffSettings {
    fn from(config: &StratumConfig) -> Self {
        Self {
            target_share_interval: config.target_share_interval as f64,
            retarget_shares: config.retarget_shares,
            retarget_seconds: config.retarget_seconds as f64,
            minimum_difficulty: config.minimum_difficulty,
            maximum_difficulty: config.maximum_difficulty,
        }
    }
}

/// A difficulty change to be pushed to the miner as mining.set_difficulty.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DifficultyChange {
    pub old: f64,
    pub new: f64,
}

/// Tracks one connection's share cadence and retargets its difficulty.
pub struct DifficultyAdjuster {
    /// Current session difficulty
    pub current_difficulty: f64,
    /// Difficulty before the last change
    pub old_difficulty: f64,
    /// EMA of seconds between consecutive accepted shares
    pub ema_interval: Option<f64>,
    /// Timestamp of the last accepted share
    pub last_share_timestamp: Option<SystemTime>,
    /// Shares accepted since the last difficulty change
    pub shares_since_adjust: u32,
    /// Timestamp of the last difficulty change
    pub last_adjust_timestamp: Option<SystemTime>,
    /// The fast ramp fires at most once per connection
    pub fast_ramp_used: bool,
    /// Difficulty suggested by the client, used as a floor
    pub suggested_difficulty: Option<f64>,
    pub settings: VardiffSettings,
}

#[cfg_attr(test, automock)]
pub trait DifficultyAdjusterTrait {
    /// Create a new adjuster starting at the given difficulty.
    fn new(start_difficulty: f64, settings: VardiffSettings) -> Self;

    /// Records an accepted share and retargets if due.
    ///
    /// Returns the difficulty change if one was made, and whether this was
    /// the first share of the connection.
    fn record_share_submission(
        &mut self,
        current_timestamp: SystemTime,
    ) -> (Option<DifficultyChange>, bool);

    /// The difficulty shares are currently validated against.
    fn current_difficulty(&self) -> f64;

    /// Overwrite the session difficulty without touching the retarget state.
    fn set_current_difficulty(&mut self, difficulty: f64);

    /// Store the client's suggested difficulty, used as a floor from then on.
    fn set_suggested_difficulty(&mut self, difficulty: f64);

    /// Clamp a difficulty to the pool bounds and the client's suggestion.
    fn apply_difficulty_constraints(&self, difficulty: f64) -> f64;
}

impl DifficultyAdjusterTrait for DifficultyAdjuster {
    fn new(start_difficulty: f64, settings: VardiffSettings) -> Self {
        Self {
            current_difficulty: start_difficulty,
            old_difficulty: start_difficulty,
            ema_interval: None,
            last_share_timestamp: None,
            shares_since_adjust: 0,
            last_adjust_timestamp: None,
            fast_ramp_used: false,
            suggested_difficulty: None,
            settings,
        }
    }

    fn record_share_submission(
        &mut self,
        current_timestamp: SystemTime,
    ) -> (Option<DifficultyChange>, bool) {
        if self.last_share_timestamp.is_none() {
            debug!("First share received, starting interval tracking");
            self.last_share_timestamp = Some(current_timestamp);
            self.last_adjust_timestamp = Some(current_timestamp);
            return (None, true);
        }

        let interval = sane_time_diff(current_timestamp, self.last_share_timestamp);
        self.last_share_timestamp = Some(current_timestamp);
        self.ema_interval = Some(update_ema(self.ema_interval, interval, EMA_ALPHA));
        self.shares_since_adjust += 1;

        let since_adjust = sane_time_diff(current_timestamp, self.last_adjust_timestamp);

        let due = self.shares_since_adjust >= self.settings.retarget_shares
            || since_adjust >= self.settings.retarget_seconds;

        debug!(
            "Share interval {:.3}s, ema {:.3}s, {} shares since adjust, due: {}",
            interval,
            self.ema_interval.unwrap_or(0.0),
            self.shares_since_adjust,
            due
        );

        if !due || since_adjust < COOLDOWN_SECONDS {
            return (None, false);
        }

        let ema = match self.ema_interval {
            Some(ema) if ema > 0.0 => ema,
            _ => return (None, false),
        };

        // Miner faster than target -> ratio above one -> difficulty goes up
        let ratio = self.settings.target_share_interval / ema;

        if (DEAD_BAND_LOW..=DEAD_BAND_HIGH).contains(&ratio) {
            debug!("Interval ratio {:.3} within dead band, keeping difficulty", ratio);
            self.shares_since_adjust = 0;
            self.last_adjust_timestamp = Some(current_timestamp);
            return (None, false);
        }

        let proposed = if !self.fast_ramp_used && ratio >= FAST_RAMP_TRIGGER {
            self.fast_ramp_used = true;
            let ramped = self.current_difficulty * ratio;
            ramped.min(self.current_difficulty * FAST_RAMP_MAX_MULTIPLIER)
        } else {
            let dampened = self.current_difficulty * (1.0 + (ratio - 1.0) * DAMPENING);
            clamp_step(self.current_difficulty, dampened, MAX_STEP_UP, MAX_STEP_DOWN)
        };

        let new_diff = self.apply_difficulty_constraints(proposed);

        if new_diff == self.current_difficulty {
            self.shares_since_adjust = 0;
            self.last_adjust_timestamp = Some(current_timestamp);
            return (None, false);
        }

        self.old_difficulty = self.current_difficulty;
        self.current_difficulty = new_diff;
        self.shares_since_adjust = 0;
        self.last_adjust_timestamp = Some(current_timestamp);
        self.ema_interval = None;

        info!(
            "Difficulty retargeted from {} to {} (interval ratio {:.3})",
            self.old_difficulty, self.current_difficulty, ratio
        );

        (
            Some(DifficultyChange {
                old: self.old_difficulty,
                new: self.current_difficulty,
            }),
            false,
        )
    }

    fn current_difficulty(&self) -> f64 {
        self.current_difficulty
    }

    fn set_current_difficulty(&mut self, difficulty: f64) {
        self.current_difficulty = difficulty;
    }

    fn set_suggested_difficulty(&mut self, difficulty: f64) {
        self.suggested_difficulty = Some(difficulty);
    }

    fn apply_difficulty_constraints(&self, difficulty: f64) -> f64 {
        let mut diff = difficulty.max(self.settings.minimum_difficulty);
        if let Some(suggested) = self.suggested_difficulty {
            diff = diff.max(suggested);
        }
        if let Some(max) = self.settings.maximum_difficulty {
            diff = diff.min(max);
        }
        diff
    }
}
