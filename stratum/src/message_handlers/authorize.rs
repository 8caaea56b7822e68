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
use crate::events::EventKind;
use crate::message_handlers::StratumContext;
use crate::messages::{Message, Request, Response, SetDifficultyNotification};
use crate::session::Session;
use crate::validate_username::{self, DEFAULT_WORKER_NAME};
use crate::work::notify::NotifyCmd;
use serde_json::json;
use std::time::SystemTime;
use tracing::{debug, info};

/// Error code sent to the miner on a rejected authorize
const AUTHORIZE_REJECT_CODE: i32 = 24;

/// Handle mining.authorize.
///
/// The username is <payout address>.<worker name>; the address must parse
/// for the pool's network. A worker that mined here recently resumes at
/// its remembered difficulty instead of the configured start difficulty.
///
/// Authorizing out of order or twice is fatal, a bad username is a
/// rejected response the miner can retry.
pub async fn handle_authorize<D: DifficultyAdjusterTrait>(
    message: Request,
    session: &mut Session<D>,
    ctx: &StratumContext,
    now: SystemTime,
) -> Result<Vec<Message>, Error> {
    if !session.subscribed {
        return Err(Error::AuthorizationFailure(
            "Authorize before subscribe".to_string(),
        ));
    }
    if session.authorized() {
        return Err(Error::AuthorizationFailure(
            "Client already authorized".to_string(),
        ));
    }

    let username = message
        .param_str(0)
        .ok_or_else(|| Error::InvalidParams("Missing username".to_string()))?;

    let (address, worker_name) = match validate_username::validate(username, ctx.config.network) {
        Ok(parts) => parts,
        Err(e) => {
            debug!("Rejected authorize for {}: {}", username, e);
            return Ok(vec![Message::Response(Response::new_err(
                message.id,
                AUTHORIZE_REJECT_CODE,
                &e.to_string(),
            ))]);
        }
    };
    let worker_name = worker_name.unwrap_or(DEFAULT_WORKER_NAME);

    session.username = Some(address.to_string());
    session.worker_name = Some(worker_name.to_string());
    session.password = message.param_str(1).map(String::from);

    if let Some(remembered) = ctx.difficulty_memory.recall(address, worker_name, now) {
        let constrained = session
            .difficulty_adjuster
            .apply_difficulty_constraints(remembered);
        debug!(
            "Resuming {}.{} at remembered difficulty {}",
            address, worker_name, constrained
        );
        session.difficulty_adjuster.set_current_difficulty(constrained);
    }

    info!("Authorized {}.{}", address, worker_name);

    // the worker exists in the stats from authorize on, not first share
    ctx.users.register(address, worker_name);
    ctx.emitter.emit(EventKind::ConnectionOpened {
        client_id: session.enonce1.clone(),
        remote_addr: session.remote_addr.clone(),
    });

    // the initial work push for this client
    let _ = ctx
        .notify_tx
        .send(NotifyCmd::SendToClient {
            client_id: session.id,
        })
        .await;

    Ok(vec![
        Message::Response(Response::new_ok(message.id, json!(true))),
        Message::SetDifficulty(SetDifficultyNotification::new(
            session.difficulty_adjuster.current_difficulty(),
        )),
    ])
}
