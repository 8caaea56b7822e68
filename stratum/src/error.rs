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

use std::fmt;

/// Error types for the Stratum server used to propagate errors and eventually
/// disconnect misbehaving miners.
///
/// Protocol errors are fatal to the session. Validation failures are reported
/// to the miner as rejected shares and never surface here.
#[derive(Debug)]
pub enum Error {
    InvalidMethod(String),
    InvalidParams(String),
    AuthorizationFailure(String),
    SubmitFailure(String),
    SubscriptionFailure(String),
    IoError(std::io::Error),
    TimeoutError,
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidMethod(method) => write!(f, "Invalid stratum method: {}", method),
            Self::InvalidParams(msg) => write!(f, "Invalid parameters provided: {}", msg),
            Self::AuthorizationFailure(reason) => write!(f, "Authorization failed: {}", reason),
            Self::SubmitFailure(reason) => write!(f, "Submit failure: {}", reason),
            Self::SubscriptionFailure(reason) => write!(f, "Subscription failure: {}", reason),
            Self::IoError(err) => write!(f, "IO error: {}", err),
            Self::TimeoutError => write!(f, "Session timed out"),
        }
    }
}

impl std::error::Error for Error {}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Self::IoError(err)
    }
}
