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

//! Template distribution between pool instances.
//!
//! A primary instance builds work from its bitcoind and pushes it to any
//! number of relay instances over a persistent authenticated TCP stream.
//! Relays serve the pushed work to their miners and fall back to their
//! local node when the primary goes quiet.

pub mod blocknotify;
pub mod config;
pub mod error;
pub mod messages;
pub mod primary;
pub mod relay;
