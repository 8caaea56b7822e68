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

//! Primary side of the template channel.
//!
//! The primary polls its bitcoind for block templates, publishes each one
//! locally and pushes it to every connected relay. Relays connect here,
//! authenticate with the shared token and stream template pushes back;
//! blocks they solve come back over the same stream for submission
//! through the primary's node.

use crate::config::DistributorConfig;
use crate::error::DistributorError;
use crate::messages::{BlockForward, Frame, TemplatePush};
use bitcoindrpc::BitcoindRpcClient;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use stratum::config::StratumConfig;
use stratum::events::EventKind;
use stratum::message_handlers::StratumContext;
use stratum::work::coinbase::{assemble_coinbase, parse_address};
use stratum::work::difficulty::validate::{assemble_block, validate_submission, ShareSubmission};
use stratum::work::gbt::parse_block_template;
use stratum::work::notify::NotifyCmd;
use stratum::work::workbase::Workbase;
use stratum::work::SolvedBlock;
use tokio::io::AsyncWriteExt;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{mpsc, oneshot};
use tokio_stream::StreamExt;
use tokio_util::codec::{FramedRead, LinesCodec};
use tracing::{debug, error, info, warn};

/// Template pushes carry merkle branches, not transactions, so frames
/// stay small. The cap is generous headroom, not a tight bound.
pub const MAX_FRAME_LENGTH: usize = 1024 * 1024;

const RELAY_QUEUE_SIZE: usize = 16;

type RelayRegistry = Arc<Mutex<Vec<mpsc::Sender<String>>>>;

/// Fetch a fresh block template and turn it into a workbase with the
/// given id.
pub(crate) async fn fetch_workbase(
    client: &BitcoindRpcClient,
    network: bitcoin::Network,
    payout_address: &bitcoin::Address,
    id: u64,
) -> Result<Workbase, DistributorError> {
    let response = client.getblocktemplate(network).await?;
    let template = parse_block_template(&response)?;
    Ok(Workbase::from_template(id, &template, payout_address.clone())?)
}

/// The solo payout address is optional for a pure relay but required
/// wherever templates are generated.
pub(crate) fn resolve_payout_address(
    config: &StratumConfig,
) -> Result<bitcoin::Address, DistributorError> {
    let address = config.solo_address.as_deref().ok_or_else(|| {
        DistributorError::Config("A solo payout address is required to build templates".to_string())
    })?;
    Ok(parse_address(address, config.network)?)
}

/// Submit a finished block through the given node, logging the verdict.
pub(crate) async fn submit_block(client: &BitcoindRpcClient, block: &bitcoin::Block) -> bool {
    let hash = block.block_hash();
    match client.submit_block(block).await {
        Ok(result) if result == "null" => {
            info!("Block {} accepted by bitcoind", hash);
            true
        }
        Ok(result) => {
            error!("Block {} rejected by bitcoind: {}", hash, result);
            false
        }
        Err(e) => {
            error!("Failed to submit block {}: {}", hash, e);
            false
        }
    }
}

pub struct TemplateDistributor {
    config: DistributorConfig,
    ctx: StratumContext,
    client: BitcoindRpcClient,
    payout_address: bitcoin::Address,
    relays: RelayRegistry,
    next_template_id: u64,
}

impl TemplateDistributor {
    pub fn new(
        config: DistributorConfig,
        ctx: StratumContext,
        client: BitcoindRpcClient,
    ) -> Result<Self, DistributorError> {
        let payout_address = resolve_payout_address(&ctx.config)?;
        Ok(TemplateDistributor {
            config,
            ctx,
            client,
            payout_address,
            relays: Arc::new(Mutex::new(Vec::new())),
            next_template_id: 0,
        })
    }

    /// Run the distributor until shutdown. Fetches an initial template
    /// before signalling readiness so relays and miners never see an
    /// empty store.
    pub async fn start(
        mut self,
        mut solved_rx: mpsc::Receiver<SolvedBlock>,
        mut block_rx: mpsc::Receiver<()>,
        mut shutdown_rx: oneshot::Receiver<()>,
        ready_tx: Option<oneshot::Sender<()>>,
    ) -> Result<(), DistributorError> {
        let listen_address = self.config.listen_address.clone().ok_or_else(|| {
            DistributorError::Config("A primary needs a listen_address for relays".to_string())
        })?;
        let listener = TcpListener::bind(&listen_address).await?;
        info!("Template distributor listening on {}", listen_address);

        self.refresh(true).await?;

        if let Some(ready_tx) = ready_tx {
            let _ = ready_tx.send(());
        }

        let mut poll = tokio::time::interval(std::time::Duration::from_secs(
            self.config.poll_interval.max(1),
        ));
        poll.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        // the initial template was just fetched, skip the immediate tick
        poll.tick().await;

        loop {
            tokio::select! {
                _ = &mut shutdown_rx => {
                    info!("Template distributor shutting down");
                    break;
                }
                _ = poll.tick() => {
                    if let Err(e) = self.refresh(false).await {
                        error!("Template refresh failed: {}", e);
                    }
                }
                Some(()) = block_rx.recv() => {
                    info!("New network block, refreshing work");
                    self.ctx.store.clear_retained();
                    match self.refresh(true).await {
                        Ok(()) => {
                            if let Some(current) = self.ctx.store.current() {
                                self.ctx.emitter.emit(EventKind::NewNetworkBlock {
                                    height: current.height,
                                    previous_hash: current.prevhash.clone(),
                                });
                            }
                        }
                        Err(e) => error!("Template refresh after new block failed: {}", e),
                    }
                }
                accepted = listener.accept() => {
                    match accepted {
                        Ok((stream, remote_addr)) => {
                            tokio::spawn(handle_relay_connection(
                                stream,
                                remote_addr,
                                self.ctx.clone(),
                                self.client.clone(),
                                self.config.auth_token.clone(),
                                self.relays.clone(),
                            ));
                        }
                        Err(e) => warn!("Failed to accept relay connection: {}", e),
                    }
                }
                Some(solved) = solved_rx.recv() => {
                    self.submit_local_solve(solved).await;
                }
            }
        }
        Ok(())
    }

    /// Fetch, publish and distribute one new template.
    async fn refresh(&mut self, clean_jobs: bool) -> Result<(), DistributorError> {
        let id = self.next_template_id + 1;
        let workbase = fetch_workbase(
            &self.client,
            self.ctx.config.network,
            &self.payout_address,
            id,
        )
        .await?;

        let push = Frame::TemplatePush(TemplatePush::from(&workbase));
        if self.ctx.store.publish(workbase).is_none() {
            warn!("Workbase {} lost the publish race, not distributing", id);
            return Ok(());
        }
        self.next_template_id = id;

        if let Err(e) = self
            .ctx
            .notify_tx
            .send(NotifyCmd::BroadcastCurrent { clean_jobs })
            .await
        {
            error!("Notify task is gone: {}", e);
        }

        let line = serde_json::to_string(&push)?;
        let mut relays = match self.relays.lock() {
            Ok(relays) => relays,
            Err(poisoned) => poisoned.into_inner(),
        };
        relays.retain(|relay| match relay.try_send(line.clone()) {
            Ok(()) => true,
            Err(mpsc::error::TrySendError::Full(_)) => {
                warn!("Relay queue full, dropping template push");
                true
            }
            Err(mpsc::error::TrySendError::Closed(_)) => false,
        });
        debug!("Distributed template {} to {} relays", id, relays.len());
        Ok(())
    }

    /// A block solved by one of this instance's own miners.
    async fn submit_local_solve(&self, solved: SolvedBlock) {
        let Some(workbase) = self.ctx.store.get(solved.workbase_id) else {
            warn!(
                "Solved block references unknown workbase {}, cannot assemble",
                solved.workbase_id
            );
            return;
        };
        match assemble_block(&workbase, solved.header, solved.coinbase) {
            Ok(block) => {
                submit_block(&self.client, &block).await;
            }
            Err(e) => error!("Failed to assemble solved block: {}", e),
        }
    }
}

/// One accepted relay connection. Authenticates, streams template pushes
/// out and block forwards in.
async fn handle_relay_connection(
    stream: TcpStream,
    remote_addr: SocketAddr,
    ctx: StratumContext,
    client: BitcoindRpcClient,
    auth_token: String,
    relays: RelayRegistry,
) {
    let (read_half, mut write_half) = stream.into_split();
    let mut framed = FramedRead::new(read_half, LinesCodec::new_with_max_length(MAX_FRAME_LENGTH));

    let hello = match framed.next().await {
        Some(Ok(line)) => serde_json::from_str::<Frame>(&line).ok(),
        _ => None,
    };
    match hello {
        Some(Frame::Hello(hello)) if hello.token == auth_token => {}
        _ => {
            warn!("Relay {} failed the handshake, dropping", remote_addr);
            return;
        }
    }
    info!("Relay connected from {}", remote_addr);

    let (frame_tx, mut frame_rx) = mpsc::channel::<String>(RELAY_QUEUE_SIZE);

    // catch the relay up with the current work before anything else
    if let Some(current) = ctx.store.current() {
        let push = Frame::TemplatePush(TemplatePush::from(current.as_ref()));
        if let Ok(line) = serde_json::to_string(&push) {
            let _ = frame_tx.try_send(line);
        }
    }
    {
        let mut relays = match relays.lock() {
            Ok(relays) => relays,
            Err(poisoned) => poisoned.into_inner(),
        };
        relays.push(frame_tx);
    }

    loop {
        tokio::select! {
            Some(line) = frame_rx.recv() => {
                if write_half.write_all(line.as_bytes()).await.is_err()
                    || write_half.write_all(b"\n").await.is_err()
                    || write_half.flush().await.is_err()
                {
                    break;
                }
            }
            frame = framed.next() => {
                match frame {
                    Some(Ok(line)) => match serde_json::from_str::<Frame>(&line) {
                        Ok(Frame::BlockForward(forward)) => {
                            submit_forwarded_block(&ctx, &client, forward).await;
                        }
                        Ok(other) => {
                            warn!("Unexpected frame from relay {}: {:?}", remote_addr, other);
                        }
                        Err(e) => {
                            warn!("Bad frame from relay {}: {}", remote_addr, e);
                        }
                    },
                    Some(Err(e)) => {
                        warn!("Relay {} framing error: {}", remote_addr, e);
                        break;
                    }
                    None => break,
                }
            }
        }
    }
    info!("Relay {} disconnected", remote_addr);
    // the registry entry is dropped on the next distribution attempt
}

/// Rebuild and submit a block a relay solved against one of our
/// templates.
async fn submit_forwarded_block(ctx: &StratumContext, client: &BitcoindRpcClient, forward: BlockForward) {
    info!(
        "Block forwarded for template {} by {}.{}",
        forward.template_id, forward.username, forward.worker_name
    );
    let Some(workbase) = ctx.store.get(forward.template_id) else {
        warn!(
            "Forwarded block references unknown template {}, cannot assemble",
            forward.template_id
        );
        return;
    };

    let share = ShareSubmission {
        enonce1: &forward.enonce1,
        enonce2: &forward.enonce2,
        ntime: &forward.ntime,
        nonce: &forward.nonce,
        version_bits: forward.version_bits.as_deref(),
    };
    // the relay already enforced the session target, only the header
    // reconstruction and the network target matter here
    let result = match validate_submission(&workbase, &share, 0.0, ctx.config.version_mask) {
        Ok(result) => result,
        Err(reason) => {
            warn!("Forwarded block failed validation: {}", reason);
            return;
        }
    };
    if !result.meets_network_target {
        warn!(
            "Forwarded block {} does not meet the network target",
            result.hash
        );
        return;
    }

    let coinbase = match assemble_coinbase(
        &workbase.coinbase1,
        &forward.enonce1,
        &forward.enonce2,
        &workbase.coinbase2,
    ) {
        Ok(coinbase) => coinbase,
        Err(e) => {
            error!("Failed to assemble forwarded coinbase: {}", e);
            return;
        }
    };
    match assemble_block(&workbase, result.header, coinbase) {
        Ok(block) => {
            submit_block(client, &block).await;
        }
        Err(e) => error!("Failed to assemble forwarded block: {}", e),
    }
}
