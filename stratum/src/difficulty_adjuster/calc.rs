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

use std::time::{Duration, SystemTime};

/// Floor for time differences so interval math never divides by zero.
pub const MIN_SANE_TIME_DIFF: f64 = 0.001;

/// Compute seconds between `current` and an optional earlier timestamp.
///
/// Clock steps backwards and None both collapse to the floor value.
pub fn sane_time_diff(current: SystemTime, earlier: Option<SystemTime>) -> f64 {
    match earlier {
        Some(earlier) => {
            let diff = current
                .duration_since(earlier)
                .unwrap_or_else(|_| Duration::from_secs(0))
                .as_secs_f64();
            diff.max(MIN_SANE_TIME_DIFF)
        }
        None => MIN_SANE_TIME_DIFF,
    }
}

/// Fold a new inter-share interval sample into the exponential moving average.
/// The first sample initializes the average.
pub fn update_ema(previous: Option<f64>, sample: f64, alpha: f64) -> f64 {
    match previous {
        Some(previous) => alpha * sample + (1.0 - alpha) * previous,
        None => sample,
    }
}

/// Clamp a proposed difficulty to a single step relative to the current one.
pub fn clamp_step(current: f64, proposed: f64, max_up: f64, max_down: f64) -> f64 {
    proposed.min(current * max_up).max(current * max_down)
}
