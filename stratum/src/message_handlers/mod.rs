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

use crate::config::StratumConfig;
use crate::difficulty_adjuster::memory::DifficultyMemory;
use crate::difficulty_adjuster::DifficultyAdjusterTrait;
use crate::error::Error;
use crate::events::emitter::EventEmitter;
use crate::messages::{Message, Request};
use crate::session::Session;
use crate::users::UserTable;
use crate::work::notify::NotifyCmd;
use crate::work::workbase::WorkbaseStore;
use crate::work::SolvedBlock;
use std::sync::Arc;
use std::time::SystemTime;
use tokio::sync::mpsc;

pub mod authorize;
pub mod configure;
pub mod submit;
pub mod subscribe;
pub mod suggest_difficulty;

use authorize::handle_authorize;
use configure::handle_configure;
use submit::handle_submit;
use subscribe::handle_subscribe;
use suggest_difficulty::handle_suggest_difficulty;

/// Shared server state handed to every connection task.
#[derive(Clone)]
pub struct StratumContext {
    pub config: Arc<StratumConfig>,
    pub store: Arc<WorkbaseStore>,
    pub users: Arc<UserTable>,
    pub difficulty_memory: Arc<DifficultyMemory>,
    pub emitter: EventEmitter,
    pub notify_tx: mpsc::Sender<NotifyCmd>,
    /// Shares that met the network target go here for block submission
    pub solved_tx: mpsc::Sender<SolvedBlock>,
}

/// Handle an incoming stratum request.
///
/// Updates the session in response to the message and returns the messages
/// to write back to the miner. An Err return is a protocol violation and
/// terminates the connection; share rejections come back as Ok responses.
pub(crate) async fn handle_message<D: DifficultyAdjusterTrait>(
    message: Request,
    session: &mut Session<D>,
    ctx: &StratumContext,
    now: SystemTime,
) -> Result<Vec<Message>, Error> {
    match message.method.as_str() {
        "mining.subscribe" => handle_subscribe(message, session),
        "mining.configure" => handle_configure(message, session, ctx),
        "mining.authorize" => handle_authorize(message, session, ctx, now).await,
        "mining.submit" => handle_submit(message, session, ctx, now).await,
        "mining.suggest_difficulty" => handle_suggest_difficulty(message, session),
        method => Err(Error::InvalidMethod(method.to_string())),
    }
}
