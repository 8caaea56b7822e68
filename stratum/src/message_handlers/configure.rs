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

use crate::difficulty_adjuster::DifficultyAdjusterTrait;
use crate::error::Error;
use crate::message_handlers::StratumContext;
use crate::messages::{Message, Request, Response};
use crate::session::Session;
use serde_json::json;
use tracing::debug;

/// Handle mining.configure.
///
/// Only the version-rolling extension is supported. The granted mask is
/// the intersection of the miner's requested mask and the pool's mask;
/// other requested extensions are reported as false.
pub fn handle_configure<D: DifficultyAdjusterTrait>(
    message: Request,
    session: &mut Session<D>,
    ctx: &StratumContext,
) -> Result<Vec<Message>, Error> {
    let extensions = message
        .params
        .get(0)
        .and_then(|v| v.as_array())
        .ok_or_else(|| Error::InvalidParams("mining.configure expects an extension list".to_string()))?;

    let mut result = serde_json::Map::new();
    for extension in extensions {
        match extension.as_str() {
            Some("version-rolling") => {
                let requested = message
                    .params
                    .get(1)
                    .and_then(|options| options.get("version-rolling.mask"))
                    .and_then(|mask| mask.as_str())
                    .and_then(|mask| u32::from_str_radix(mask, 16).ok())
                    .unwrap_or(u32::MAX);
                let granted = requested & ctx.config.version_mask;
                session.version_rolling_mask = Some(granted);
                debug!(
                    "Version rolling negotiated, mask {:08x} for client {}",
                    granted, session.enonce1
                );
                result.insert("version-rolling".to_string(), json!(true));
                result.insert(
                    "version-rolling.mask".to_string(),
                    json!(format!("{:08x}", granted)),
                );
            }
            Some(other) => {
                result.insert(other.to_string(), json!(false));
            }
            None => {}
        }
    }

    Ok(vec![Message::Response(Response::new_ok(
        message.id,
        serde_json::Value::Object(result),
    ))])
}
