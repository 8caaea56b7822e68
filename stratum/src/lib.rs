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

pub mod client_connections;
pub mod config;
pub mod difficulty_adjuster;
pub mod error;
pub mod events;
pub mod logging;
pub mod message_handlers;
pub mod messages;
pub mod server;
pub mod session;
pub mod users;
pub mod utils;
pub mod validate_username;
pub mod work;
