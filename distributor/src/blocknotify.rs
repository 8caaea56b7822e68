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

//! New-tip notifications from bitcoind's ZMQ hashblock publisher.
//!
//! A dedicated thread blocks on the ZMQ socket and signals the async side
//! through a unit channel. The channel holds a single slot; coalescing
//! back-to-back blocks into one refresh is fine since the template is
//! refetched anyway.

use crate::config::DistributorConfig;
use thiserror::Error;
use tracing::{error, info};

const BLOCK_HASH_SIZE: usize = 32;
const ZMQ_PUB_BLOCKHASH: &str = "hashblock";
const ZMQ_CHANNEL_SIZE: usize = 1;

#[derive(Debug, Error)]
#[error("Block notify error: {message}")]
pub struct BlockNotifyError {
    pub message: String,
}

pub trait BlockNotifyTrait {
    /// Starts the ZeroMQ subscriber socket. Sends a unit message on the
    /// returned channel for every hashblock notification.
    fn start(&self, address: &str) -> Result<tokio::sync::mpsc::Receiver<()>, BlockNotifyError>;
}

#[derive(Default)]
pub struct BlockNotify;

impl BlockNotifyTrait for BlockNotify {
    fn start(&self, address: &str) -> Result<tokio::sync::mpsc::Receiver<()>, BlockNotifyError> {
        let context = zmq::Context::new();
        let socket = context.socket(zmq::SUB).map_err(|e| BlockNotifyError {
            message: format!("Failed to create ZMQ socket: {e:?}"),
        })?;
        socket
            .set_subscribe(ZMQ_PUB_BLOCKHASH.as_bytes())
            .map_err(|e| BlockNotifyError {
                message: format!("Failed to set ZMQ subscription: {e}"),
            })?;
        socket.connect(address).map_err(|e| BlockNotifyError {
            message: format!("Failed to connect ZMQ socket: {e}"),
        })?;

        let (tx, rx) = tokio::sync::mpsc::channel::<()>(ZMQ_CHANNEL_SIZE);
        std::thread::spawn(move || {
            // Runtime local to this thread, just to drive the channel send
            let rt = match tokio::runtime::Builder::new_current_thread()
                .enable_all()
                .build()
            {
                Ok(rt) => rt,
                Err(e) => {
                    error!("Failed to create runtime in block notify thread: {}", e);
                    return;
                }
            };

            loop {
                match socket.recv_multipart(0) {
                    Ok(parts) => {
                        if parts.len() != 3 || parts[1].len() != BLOCK_HASH_SIZE {
                            continue;
                        }
                        if let Err(e) = rt.block_on(tx.send(())) {
                            info!("Block notify channel closed: {}", e);
                            break;
                        }
                    }
                    Err(e) => {
                        info!("Failed to receive ZMQ message: {}", e);
                    }
                }
            }
        });
        Ok(rx)
    }
}

/// Subscribe according to the distributor config. Without a configured
/// endpoint the returned channel never fires and the poll interval alone
/// drives template refreshes.
pub fn subscribe(
    config: &DistributorConfig,
) -> Result<tokio::sync::mpsc::Receiver<()>, BlockNotifyError> {
    match &config.zmq_endpoint {
        Some(endpoint) => BlockNotify.start(endpoint),
        None => Ok(tokio::sync::mpsc::channel(ZMQ_CHANNEL_SIZE).1),
    }
}
