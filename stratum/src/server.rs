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

use crate::client_connections::{start_connections_handler, ClientConnectionsHandle};
use crate::difficulty_adjuster::DifficultyAdjuster;
use crate::error::Error;
use crate::events::EventKind;
use crate::message_handlers::{handle_message, StratumContext};
use crate::messages::Request;
use crate::session::Session;
use crate::work::notify::{start_notify, NotifyCmd};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, SystemTime};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpListener;
use tokio::sync::{mpsc, oneshot};
use tokio_stream::StreamExt;
use tokio_util::codec::{FramedRead, LinesCodec};
use tracing::{debug, error, info};

/// Maximum accepted line length, longer lines close the connection
const MAX_LINE_LENGTH: usize = 8 * 1024;

/// The stratum TCP server.
///
/// Accepts miner connections, runs one task per connection and wires every
/// connection to the shared context (workbase store, user stats, events).
pub struct StratumServer {
    ctx: StratumContext,
    connections: ClientConnectionsHandle,
    shutdown_rx: oneshot::Receiver<()>,
    notify_rx: mpsc::Receiver<NotifyCmd>,
}

impl StratumServer {
    pub async fn new(
        ctx: StratumContext,
        shutdown_rx: oneshot::Receiver<()>,
        notify_rx: mpsc::Receiver<NotifyCmd>,
    ) -> Self {
        let connections = start_connections_handler().await;
        Self {
            ctx,
            connections,
            shutdown_rx,
            notify_rx,
        }
    }

    /// The connections handle, used by work sources to push notifies.
    pub fn connections(&self) -> ClientConnectionsHandle {
        self.connections.clone()
    }

    /// Run the accept loop until shutdown. Signals `ready_tx` once the
    /// listener is bound so callers can sequence startup.
    pub async fn start(
        &mut self,
        ready_tx: Option<oneshot::Sender<()>>,
    ) -> Result<(), Box<dyn std::error::Error + Send>> {
        let bind_address = format!("{}:{}", self.ctx.config.hostname, self.ctx.config.port);
        info!("Starting stratum server at {}", bind_address);

        let listener = match TcpListener::bind(&bind_address).await {
            Ok(listener) => listener,
            Err(e) => {
                error!("Failed to bind to {}: {}", bind_address, e);
                return Err(Box::new(e));
            }
        };

        // the notify task runs until every notify sender is gone
        let notify_rx = std::mem::replace(&mut self.notify_rx, mpsc::channel(1).1);
        tokio::spawn(start_notify(
            notify_rx,
            self.ctx.store.clone(),
            self.connections.clone(),
        ));

        if let Some(ready_tx) = ready_tx {
            info!("Stratum server ready on {}", bind_address);
            ready_tx.send(()).ok();
        }

        loop {
            tokio::select! {
                _ = &mut self.shutdown_rx => {
                    info!("Shutdown signal received");
                    break;
                }
                connection = listener.accept() => {
                    match connection {
                        Ok((stream, addr)) => {
                            info!("New connection from {}", addr);
                            let (client_id, message_rx, conn_shutdown_rx) =
                                self.connections.add().await;
                            let ctx = self.ctx.clone();
                            let connections = self.connections.clone();
                            let (reader, writer) = stream.into_split();
                            let buf_reader = BufReader::new(reader);
                            tokio::spawn(async move {
                                let _ = handle_connection(
                                    buf_reader,
                                    writer,
                                    addr,
                                    client_id,
                                    ctx,
                                    message_rx,
                                    conn_shutdown_rx,
                                )
                                .await;
                                connections.remove(client_id).await;
                            });
                        }
                        Err(e) => {
                            info!("Connection failed: {}", e);
                            continue;
                        }
                    }
                }
            }
        }
        Ok(())
    }
}

/// Handles a single miner connection.
///
/// Reads line-delimited requests, dispatches them and writes the replies,
/// interleaved with messages pushed by the notify task. Ends on client
/// disconnect, protocol violation, idle timeout or server shutdown.
async fn handle_connection<R, W>(
    reader: R,
    mut writer: W,
    addr: SocketAddr,
    client_id: u32,
    ctx: StratumContext,
    mut message_rx: mpsc::Receiver<Arc<String>>,
    mut shutdown_rx: oneshot::Receiver<()>,
) -> Result<(), Error>
where
    R: AsyncBufReadExt + Unpin,
    W: AsyncWriteExt + Unpin,
{
    let mut framed = FramedRead::new(reader, LinesCodec::new_with_max_length(MAX_LINE_LENGTH));
    let mut session: Session<DifficultyAdjuster> = Session::new(
        client_id,
        ctx.config.start_difficulty,
        ctx.config.as_ref().into(),
        SystemTime::now(),
    );
    session.remote_addr = addr.to_string();

    let idle_timeout = Duration::from_secs(ctx.config.idle_timeout.max(1));
    let mut idle_check = tokio::time::interval(idle_timeout);
    idle_check.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    idle_check.tick().await; // the first tick fires immediately

    let result = loop {
        tokio::select! {
            _ = &mut shutdown_rx => {
                info!("Shutdown signal received, closing connection from {}", addr);
                break Ok(());
            }
            _ = idle_check.tick() => {
                let idle = SystemTime::now()
                    .duration_since(session.last_activity)
                    .unwrap_or_default();
                if idle >= idle_timeout {
                    info!("Closing idle connection from {}", addr);
                    break Err(Error::TimeoutError);
                }
                ctx.difficulty_memory.prune(SystemTime::now());
            }
            Some(message) = message_rx.recv() => {
                debug!("Pushing to {}: {}", addr, message);
                if let Err(e) = writer.write_all(format!("{}\n", message).as_bytes()).await {
                    error!("Failed to write to {}: {}", addr, e);
                    break Err(e.into());
                }
                if let Err(e) = writer.flush().await {
                    error!("Failed to flush writer for {}: {}", addr, e);
                    break Err(e.into());
                }
            }
            line = framed.next() => {
                match line {
                    Some(Ok(line)) => {
                        if line.is_empty() {
                            continue;
                        }
                        session.last_activity = SystemTime::now();
                        if let Err(e) =
                            process_incoming_message(&line, &mut writer, &mut session, &ctx, addr)
                                .await
                        {
                            error!("Error processing message from {}: {}", addr, e);
                            break Err(e);
                        }
                    }
                    Some(Err(e)) => {
                        error!("Error reading line from {}: {}", addr, e);
                        break Err(Error::IoError(std::io::Error::new(
                            std::io::ErrorKind::InvalidData,
                            e.to_string(),
                        )));
                    }
                    None => {
                        info!("Connection closed by client: {}", addr);
                        break Ok(());
                    }
                }
            }
        }
    };

    // a reconnecting worker resumes at the difficulty it left with
    if let (Some(username), Some(worker_name)) = (&session.username, &session.worker_name) {
        ctx.difficulty_memory.remember(
            username,
            worker_name,
            session.difficulty_adjuster.current_difficulty,
            SystemTime::now(),
        );
    }
    ctx.emitter.emit(EventKind::ConnectionClosed {
        client_id: session.enonce1.clone(),
        remote_addr: addr.to_string(),
        duration_secs: session
            .connected_at
            .elapsed()
            .map(|d| d.as_secs())
            .unwrap_or(0),
        accepted_shares: session.accepted_shares,
    });

    result
}

/// Parse one request line, dispatch it and write the replies.
async fn process_incoming_message<W>(
    line: &str,
    writer: &mut W,
    session: &mut Session<DifficultyAdjuster>,
    ctx: &StratumContext,
    addr: SocketAddr,
) -> Result<(), Error>
where
    W: AsyncWriteExt + Unpin,
{
    let request = serde_json::from_str::<Request>(line).map_err(|e| {
        Error::InvalidParams(format!("Invalid request from {}: {}", addr, e))
    })?;

    let replies = handle_message(request, session, ctx, SystemTime::now()).await?;

    for reply in replies {
        let json = serde_json::to_string(&reply)
            .map_err(|e| Error::InvalidParams(format!("Failed to serialize reply: {}", e)))?;
        debug!("Sending to {}: {}", addr, json);
        writer.write_all(format!("{}\n", json).as_bytes()).await?;
    }
    writer.flush().await?;
    Ok(())
}
