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

//! Relay side of the template channel.
//!
//! A relay serves work pushed by the primary. When the link goes quiet
//! past the failover threshold it switches to templates from its local
//! node and keeps mining, reverting to passthrough once the primary is
//! back. Solved blocks go to the local node and to the primary
//! independently, whichever path is alive.

use crate::config::DistributorConfig;
use crate::error::DistributorError;
use crate::messages::{BlockForward, Frame, Hello, TemplatePush};
use crate::primary::{fetch_workbase, resolve_payout_address, submit_block, MAX_FRAME_LENGTH};
use bitcoindrpc::BitcoindRpcClient;
use std::collections::HashMap;
use stratum::events::EventKind;
use stratum::message_handlers::StratumContext;
use stratum::work::difficulty::validate::assemble_block;
use stratum::work::notify::NotifyCmd;
use stratum::work::SolvedBlock;
use tokio::io::AsyncWriteExt;
use tokio::net::tcp::OwnedWriteHalf;
use tokio::net::TcpStream;
use tokio::sync::{mpsc, oneshot};
use tokio_stream::StreamExt;
use tokio_util::codec::{FramedRead, LinesCodec};
use tracing::{debug, error, info, warn};

enum LinkOutcome {
    Shutdown,
    Lost,
}

enum IndependentOutcome {
    Shutdown,
    Reconnected(TcpStream),
}

pub struct RelayCoordinator {
    config: DistributorConfig,
    ctx: StratumContext,
    client: BitcoindRpcClient,
    payout_address: bitcoin::Address,
    /// Local workbase id counter, shared by pushed and self-generated work
    next_template_id: u64,
    /// Highest template id seen from the primary, for stale push detection
    last_primary_id: u64,
    last_height: u32,
    /// Local workbase id back to the primary's template id, for forwarding
    origin: HashMap<u64, u64>,
    ready_tx: Option<oneshot::Sender<()>>,
}

impl RelayCoordinator {
    pub fn new(
        config: DistributorConfig,
        ctx: StratumContext,
        client: BitcoindRpcClient,
    ) -> Result<Self, DistributorError> {
        let payout_address = resolve_payout_address(&ctx.config)?;
        Ok(RelayCoordinator {
            config,
            ctx,
            client,
            payout_address,
            next_template_id: 0,
            last_primary_id: 0,
            last_height: 0,
            origin: HashMap::new(),
            ready_tx: None,
        })
    }

    /// Run the relay until shutdown. Alternates between passthrough and
    /// independent mode as the link to the primary comes and goes.
    pub async fn start(
        mut self,
        mut solved_rx: mpsc::Receiver<SolvedBlock>,
        mut block_rx: mpsc::Receiver<()>,
        mut shutdown_rx: oneshot::Receiver<()>,
        ready_tx: Option<oneshot::Sender<()>>,
    ) -> Result<(), DistributorError> {
        let primary_address = self.config.primary_address.clone().ok_or_else(|| {
            DistributorError::Config("A relay needs a primary_address to connect to".to_string())
        })?;
        self.ready_tx = ready_tx;

        let mut pending: Option<TcpStream> = None;
        loop {
            let stream = match pending.take() {
                Some(stream) => Some(stream),
                None => match TcpStream::connect(&primary_address).await {
                    Ok(stream) => Some(stream),
                    Err(e) => {
                        warn!("Cannot reach primary at {}: {}", primary_address, e);
                        None
                    }
                },
            };

            if let Some(stream) = stream {
                match self
                    .run_connected(stream, &mut solved_rx, &mut block_rx, &mut shutdown_rx)
                    .await?
                {
                    LinkOutcome::Shutdown => return Ok(()),
                    LinkOutcome::Lost => {}
                }
            }

            match self
                .run_independent(
                    &primary_address,
                    &mut solved_rx,
                    &mut block_rx,
                    &mut shutdown_rx,
                )
                .await?
            {
                IndependentOutcome::Shutdown => return Ok(()),
                IndependentOutcome::Reconnected(stream) => pending = Some(stream),
            }
        }
    }

    /// Passthrough mode: serve whatever the primary pushes.
    async fn run_connected(
        &mut self,
        stream: TcpStream,
        solved_rx: &mut mpsc::Receiver<SolvedBlock>,
        block_rx: &mut mpsc::Receiver<()>,
        shutdown_rx: &mut oneshot::Receiver<()>,
    ) -> Result<LinkOutcome, DistributorError> {
        info!("Connected to primary, entering passthrough mode");
        let (read_half, mut write_half) = stream.into_split();
        let mut framed =
            FramedRead::new(read_half, LinesCodec::new_with_max_length(MAX_FRAME_LENGTH));

        let hello = serde_json::to_string(&Frame::Hello(Hello {
            token: self.config.auth_token.clone(),
        }))?;
        if write_half.write_all(hello.as_bytes()).await.is_err()
            || write_half.write_all(b"\n").await.is_err()
            || write_half.flush().await.is_err()
        {
            warn!("Primary dropped the connection during the handshake");
            return Ok(LinkOutcome::Lost);
        }

        let failover = std::time::Duration::from_secs(self.config.failover_threshold.max(1));
        let mut last_seen = tokio::time::Instant::now();
        let mut watchdog = tokio::time::interval(std::time::Duration::from_secs(1));

        loop {
            tokio::select! {
                _ = &mut *shutdown_rx => {
                    info!("Relay shutting down");
                    return Ok(LinkOutcome::Shutdown);
                }
                _ = watchdog.tick() => {
                    if last_seen.elapsed() >= failover {
                        warn!(
                            "Primary silent for {}s, failing over to the local node",
                            last_seen.elapsed().as_secs()
                        );
                        return Ok(LinkOutcome::Lost);
                    }
                }
                frame = framed.next() => {
                    match frame {
                        Some(Ok(line)) => {
                            last_seen = tokio::time::Instant::now();
                            match serde_json::from_str::<Frame>(&line) {
                                Ok(Frame::TemplatePush(push)) => self.apply_push(push).await,
                                Ok(other) => warn!("Unexpected frame from primary: {:?}", other),
                                Err(e) => warn!("Bad frame from primary: {}", e),
                            }
                        }
                        Some(Err(e)) => {
                            warn!("Primary link framing error: {}", e);
                            return Ok(LinkOutcome::Lost);
                        }
                        None => {
                            warn!("Primary closed the connection");
                            return Ok(LinkOutcome::Lost);
                        }
                    }
                }
                Some(()) = block_rx.recv() => {
                    self.local_tip_changed().await;
                }
                Some(solved) = solved_rx.recv() => {
                    self.handle_solved(solved, Some(&mut write_half)).await;
                }
            }
        }
    }

    /// Independent mode: generate work from the local node while probing
    /// for the primary to come back.
    async fn run_independent(
        &mut self,
        primary_address: &str,
        solved_rx: &mut mpsc::Receiver<SolvedBlock>,
        block_rx: &mut mpsc::Receiver<()>,
        shutdown_rx: &mut oneshot::Receiver<()>,
    ) -> Result<IndependentOutcome, DistributorError> {
        info!("Entering independent mode, serving templates from the local node");
        if let Err(e) = self.refresh_local(true).await {
            error!("Local template generation failed: {}", e);
        }

        let mut poll = tokio::time::interval(std::time::Duration::from_secs(
            self.config.poll_interval.max(1),
        ));
        poll.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        poll.tick().await;

        let mut reconnect = tokio::time::interval(std::time::Duration::from_secs(
            self.config.reconnect_delay.max(1),
        ));
        reconnect.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        reconnect.tick().await;

        loop {
            tokio::select! {
                _ = &mut *shutdown_rx => {
                    info!("Relay shutting down");
                    return Ok(IndependentOutcome::Shutdown);
                }
                _ = poll.tick() => {
                    if let Err(e) = self.refresh_local(false).await {
                        error!("Local template refresh failed: {}", e);
                    }
                }
                _ = reconnect.tick() => {
                    match TcpStream::connect(primary_address).await {
                        Ok(stream) => {
                            info!("Primary is back, leaving independent mode");
                            return Ok(IndependentOutcome::Reconnected(stream));
                        }
                        Err(e) => debug!("Primary still unreachable: {}", e),
                    }
                }
                Some(()) = block_rx.recv() => {
                    info!("New network block, refreshing local work");
                    self.ctx.store.clear_retained();
                    match self.refresh_local(true).await {
                        Ok(()) => {
                            if let Some(current) = self.ctx.store.current() {
                                self.ctx.emitter.emit(EventKind::NewNetworkBlock {
                                    height: current.height,
                                    previous_hash: current.prevhash.clone(),
                                });
                            }
                        }
                        Err(e) => error!("Local template refresh after new block failed: {}", e),
                    }
                }
                Some(solved) = solved_rx.recv() => {
                    self.handle_solved(solved, None).await;
                }
            }
        }
    }

    /// Apply one template push from the primary.
    ///
    /// Primary ids must strictly increase; stale and duplicate pushes are
    /// ignored. The published workbase gets a fresh local id since the
    /// local counter may have run ahead during independent mode.
    async fn apply_push(&mut self, push: TemplatePush) {
        if push.template_id <= self.last_primary_id {
            debug!("Ignoring stale template push {}", push.template_id);
            return;
        }
        let primary_id = push.template_id;
        let local_id = self.next_template_id + 1;
        let height = push.height;
        let previous_hash = push.previous_hash.clone();
        let clean_jobs = height > self.last_height;

        let mut workbase = push.into_workbase();
        workbase.id = local_id;
        if self.ctx.store.publish(workbase).is_none() {
            return;
        }

        self.last_primary_id = primary_id;
        self.next_template_id = local_id;
        self.origin.insert(local_id, primary_id);
        let horizon = self.ctx.config.workbase_retention as u64 + 2;
        self.origin.retain(|id, _| *id + horizon > local_id);

        if clean_jobs && self.last_height != 0 {
            self.ctx.emitter.emit(EventKind::NewNetworkBlock {
                height,
                previous_hash,
            });
        }
        self.last_height = self.last_height.max(height);

        if let Err(e) = self
            .ctx
            .notify_tx
            .send(NotifyCmd::BroadcastCurrent { clean_jobs })
            .await
        {
            error!("Notify task is gone: {}", e);
        }
        self.signal_ready();
    }

    /// Generate and publish one template from the local node.
    async fn refresh_local(&mut self, clean_jobs: bool) -> Result<(), DistributorError> {
        let id = self.next_template_id + 1;
        let workbase = fetch_workbase(
            &self.client,
            self.ctx.config.network,
            &self.payout_address,
            id,
        )
        .await?;
        let height = workbase.height;
        if self.ctx.store.publish(workbase).is_none() {
            return Ok(());
        }
        self.next_template_id = id;
        self.last_height = self.last_height.max(height);

        if let Err(e) = self
            .ctx
            .notify_tx
            .send(NotifyCmd::BroadcastCurrent { clean_jobs })
            .await
        {
            error!("Notify task is gone: {}", e);
        }
        self.signal_ready();
        Ok(())
    }

    /// The local node saw a new tip before the primary's push arrived.
    /// Miners get a clean-work signal right away so no one burns hashes
    /// on a dead height.
    async fn local_tip_changed(&mut self) {
        info!("Local node saw a new block, signalling clean work");
        self.ctx.store.clear_retained();
        if let Err(e) = self
            .ctx
            .notify_tx
            .send(NotifyCmd::BroadcastCurrent { clean_jobs: true })
            .await
        {
            error!("Notify task is gone: {}", e);
        }
    }

    /// Submit a solved block locally and forward it upstream. The two
    /// paths are independent; one failing does not stop the other, both
    /// failing is a critical condition.
    async fn handle_solved(&self, solved: SolvedBlock, writer: Option<&mut OwnedWriteHalf>) {
        let workbase_id = solved.workbase_id;
        let block_hash = solved.header.block_hash();

        let mut submitted_locally = false;
        match self.ctx.store.get(workbase_id) {
            Some(workbase) if workbase.transactions.is_some() => {
                match assemble_block(&workbase, solved.header, solved.coinbase.clone()) {
                    Ok(block) => {
                        submitted_locally = submit_block(&self.client, &block).await;
                    }
                    Err(e) => error!("Failed to assemble solved block: {}", e),
                }
            }
            Some(_) => {
                debug!(
                    "Workbase {} came from the primary, no transactions for local assembly",
                    workbase_id
                );
            }
            None => warn!("Solved block references unknown workbase {}", workbase_id),
        }

        let mut forwarded = false;
        let primary_id = self.origin.get(&workbase_id).copied();
        match (writer, primary_id) {
            (Some(write_half), Some(primary_id)) => {
                let mut forward = BlockForward::from(&solved);
                forward.template_id = primary_id;
                match serde_json::to_string(&Frame::BlockForward(forward)) {
                    Ok(line) => {
                        if write_half.write_all(line.as_bytes()).await.is_ok()
                            && write_half.write_all(b"\n").await.is_ok()
                            && write_half.flush().await.is_ok()
                        {
                            info!("Forwarded block {} to the primary", block_hash);
                            forwarded = true;
                        } else {
                            error!("Failed to forward block {} to the primary", block_hash);
                        }
                    }
                    Err(e) => error!("Failed to encode block forward: {}", e),
                }
            }
            (Some(_), None) => {
                debug!(
                    "Workbase {} was generated locally, nothing to forward",
                    workbase_id
                );
            }
            (None, _) => {}
        }

        if !submitted_locally && !forwarded {
            error!(
                "CRITICAL: block {} solved on workbase {} was not submitted anywhere",
                block_hash, workbase_id
            );
        }
    }

    fn signal_ready(&mut self) {
        if let Some(ready_tx) = self.ready_tx.take() {
            let _ = ready_tx.send(());
        }
    }
}
