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
use crate::messages::{Message, Request, Response, SetDifficultyNotification};
use crate::session::Session;
use serde_json::json;
use tracing::debug;

/// Handle mining.suggest_difficulty.
///
/// The suggestion becomes a floor for this session's difficulty. The
/// pool's bounds still win, so the applied value is pushed back as
/// mining.set_difficulty rather than assumed by the miner.
pub fn handle_suggest_difficulty<D: DifficultyAdjusterTrait>(
    message: Request,
    session: &mut Session<D>,
) -> Result<Vec<Message>, Error> {
    let suggested = message
        .params
        .get(0)
        .and_then(|v| v.as_f64())
        .filter(|d| d.is_finite() && *d > 0.0)
        .ok_or_else(|| {
            Error::InvalidParams("mining.suggest_difficulty expects a positive number".to_string())
        })?;

    session.difficulty_adjuster.set_suggested_difficulty(suggested);
    let applied = session
        .difficulty_adjuster
        .apply_difficulty_constraints(session.difficulty_adjuster.current_difficulty());
    session.difficulty_adjuster.set_current_difficulty(applied);

    debug!(
        "Client {} suggested difficulty {}, applying {}",
        session.enonce1, suggested, applied
    );

    Ok(vec![
        Message::Response(Response::new_ok(message.id, json!(true))),
        Message::SetDifficulty(SetDifficultyNotification::new(applied)),
    ])
}
