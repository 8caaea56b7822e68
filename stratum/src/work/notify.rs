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

use crate::client_connections::ClientConnectionsHandle;
use crate::messages::{Notify, NotifyParams};
use crate::work::workbase::{Workbase, WorkbaseStore};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, error};

/// Commands for the notify task.
#[derive(Debug, Clone, Copy)]
pub enum NotifyCmd {
    /// Push the current workbase to all clients
    BroadcastCurrent { clean_jobs: bool },
    /// Push the current workbase to one freshly subscribed client
    SendToClient { client_id: u32 },
}

/// Build the mining.notify message for a workbase.
pub fn build_notify(workbase: &Workbase, clean_jobs: bool) -> Notify {
    let params = NotifyParams {
        job_id: format!("{:016x}", workbase.id),
        prevhash: workbase.prevhash.clone(),
        coinbase1: workbase.coinbase1.clone(),
        coinbase2: workbase.coinbase2.clone(),
        merkle_branches: workbase.merkle_branches.clone(),
        version: format!("{:08x}", workbase.version),
        nbits: workbase.nbits.clone(),
        ntime: format!("{:08x}", workbase.ntime),
        clean_jobs,
    };
    Notify::new_notify(params)
}

/// Task that turns notify commands into mining.notify pushes.
///
/// Work sources publish a workbase to the store and then send a command
/// here; the task always notifies from the store's current workbase so a
/// lost race never pushes outdated work.
pub async fn start_notify(
    mut notify_rx: mpsc::Receiver<NotifyCmd>,
    store: Arc<WorkbaseStore>,
    connections: ClientConnectionsHandle,
) {
    while let Some(cmd) = notify_rx.recv().await {
        let workbase = match store.current() {
            Some(workbase) => workbase,
            None => {
                debug!("Notify requested with no workbase published yet");
                continue;
            }
        };
        match cmd {
            NotifyCmd::BroadcastCurrent { clean_jobs } => {
                match serde_json::to_string(&build_notify(&workbase, clean_jobs)) {
                    Ok(message) => connections.send_to_all(Arc::new(message)).await,
                    Err(e) => error!("Failed to serialize notify: {}", e),
                }
            }
            NotifyCmd::SendToClient { client_id } => {
                // a fresh client always gets clean work
                match serde_json::to_string(&build_notify(&workbase, true)) {
                    Ok(message) => {
                        connections.send_to_client(client_id, Arc::new(message)).await;
                    }
                    Err(e) => error!("Failed to serialize notify: {}", e),
                }
            }
        }
    }
}
