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
use crate::messages::{Message, Request, Response};
use crate::session::{Session, EXTRANONCE2_SIZE};
use serde_json::json;
use tracing::debug;

/// Handle mining.subscribe.
///
/// Marks the session subscribed and hands out its extranonce1 and the
/// extranonce2 size. Subscribing twice is a protocol violation and closes
/// the connection.
pub fn handle_subscribe<D: DifficultyAdjusterTrait>(
    message: Request,
    session: &mut Session<D>,
) -> Result<Vec<Message>, Error> {
    if session.subscribed {
        return Err(Error::SubscriptionFailure(
            "Client already subscribed".to_string(),
        ));
    }

    if let Some(user_agent) = message.param_str(0) {
        debug!("Subscribe from user agent: {}", user_agent);
        session.user_agent = Some(user_agent.to_string());
    }
    session.subscribed = true;

    let result = json!([
        [
            ["mining.notify", format!("{}1", session.enonce1)],
            ["mining.set_difficulty", format!("{}2", session.enonce1)]
        ],
        session.enonce1,
        EXTRANONCE2_SIZE
    ]);

    Ok(vec![Message::Response(Response::new_ok(
        message.id, result,
    ))])
}
