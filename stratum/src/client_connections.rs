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

use bitcoin::secp256k1::rand::{self, Rng};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};

/// Buffer size for channels to send messages to a client.
const MSG_CHANNEL_SIZE: usize = 10;

/// Represents client channel endpoints
pub struct ClientChannels {
    message_tx: mpsc::Sender<Arc<String>>,
    shutdown_tx: oneshot::Sender<()>,
}

/// Commands that can be sent to the ClientConnections actor
#[derive(Debug)]
pub enum ClientConnectionCommand {
    Add {
        response: oneshot::Sender<(u32, mpsc::Receiver<Arc<String>>, oneshot::Receiver<()>)>,
    },
    Remove {
        client_id: u32,
    },
    SendToAll {
        message: Arc<String>,
    },
    SendToClient {
        client_id: u32,
        message: Arc<String>,
    },
    Count {
        response: oneshot::Sender<usize>,
    },
}

/// A handle to interact with the ClientConnections actor
#[derive(Clone)]
pub struct ClientConnectionsHandle {
    cmd_tx: mpsc::Sender<ClientConnectionCommand>,
}

impl ClientConnectionsHandle {
    /// Register a new client connection.
    ///
    /// Returns the extranonce1 allocated for the connection, the receiver
    /// for outbound messages and the shutdown receiver.
    pub async fn add(&self) -> (u32, mpsc::Receiver<Arc<String>>, oneshot::Receiver<()>) {
        let (tx, rx) = oneshot::channel();
        let _ = self
            .cmd_tx
            .send(ClientConnectionCommand::Add { response: tx })
            .await;
        rx.await.expect("ClientConnections actor has been dropped")
    }

    /// Remove a client, releasing its extranonce1 for reuse.
    pub async fn remove(&self, client_id: u32) {
        let _ = self
            .cmd_tx
            .send(ClientConnectionCommand::Remove { client_id })
            .await;
    }

    /// Send a message to all clients.
    /// Don't wait for the actor to respond. Fire and forget.
    pub async fn send_to_all(&self, message: Arc<String>) {
        let _ = self
            .cmd_tx
            .send(ClientConnectionCommand::SendToAll { message })
            .await;
    }

    /// Send a message to a specific client identified by its extranonce1.
    /// Don't wait for the actor to respond. Fire and forget.
    pub async fn send_to_client(&self, client_id: u32, message: Arc<String>) -> bool {
        let cmd = ClientConnectionCommand::SendToClient { client_id, message };
        self.cmd_tx.send(cmd).await.is_ok()
    }

    /// Number of connected clients.
    pub async fn count(&self) -> usize {
        let (tx, rx) = oneshot::channel();
        let _ = self
            .cmd_tx
            .send(ClientConnectionCommand::Count { response: tx })
            .await;
        rx.await.unwrap_or(0)
    }
}

#[cfg(test)]
mockall::mock! {
    pub ClientConnectionsHandle {
        pub async fn add(&self) -> (u32, mpsc::Receiver<Arc<String>>, oneshot::Receiver<()>);
        pub async fn remove(&self, client_id: u32);
        pub async fn send_to_all(&self, message: Arc<String>);
        pub async fn send_to_client(&self, client_id: u32, message: Arc<String>) -> bool;
        pub async fn count(&self) -> usize;
    }

    impl Clone for ClientConnectionsHandle {
        fn clone(&self) -> Self;
    }
}

/// An actor model to manage connections to clients.
///
/// Most of the time we are not sending messages to clients, so we avoid a
/// Mutex around the clients map. All add/remove/send operations run on the
/// actor task. The actor also owns extranonce1 allocation, which keeps the
/// uniqueness check in one place.
#[derive(Default)]
struct ClientConnections {
    clients: HashMap<u32, ClientChannels>,
    allocated: HashSet<u32>,
}

impl ClientConnections {
    /// Adds a new client connection with a freshly allocated extranonce1.
    fn add(&mut self) -> (u32, mpsc::Receiver<Arc<String>>, oneshot::Receiver<()>) {
        let client_id = self.allocate_enonce1();
        let (message_tx, message_rx) = mpsc::channel(MSG_CHANNEL_SIZE);
        let (shutdown_tx, shutdown_rx) = oneshot::channel();

        self.clients.insert(
            client_id,
            ClientChannels {
                message_tx,
                shutdown_tx,
            },
        );
        (client_id, message_rx, shutdown_rx)
    }

    /// Random extranonce1 unique among live connections.
    fn allocate_enonce1(&mut self) -> u32 {
        let mut rng = rand::thread_rng();
        loop {
            let candidate: u32 = rng.gen();
            if self.allocated.insert(candidate) {
                return candidate;
            }
        }
    }

    /// Removes a client connection by id.
    ///
    /// Returns true if the connection was found and removed, false otherwise.
    fn remove(&mut self, client_id: u32) -> bool {
        self.allocated.remove(&client_id);
        if let Some(channels) = self.clients.remove(&client_id) {
            // Try to send shutdown signal, but don't care if it fails
            let _ = channels.shutdown_tx.send(());
            true
        } else {
            false
        }
    }

    /// Sends a message to all connected clients.
    ///
    /// We use try_send so a stalled client cannot block the actor. Clients
    /// whose channel is full are removed, which shuts their connection down.
    fn send_to_all(&mut self, message: Arc<String>) {
        let mut failed_ids = Vec::new();

        for (client_id, channels) in &self.clients {
            if channels.message_tx.try_send(message.clone()).is_err() {
                failed_ids.push(*client_id);
            }
        }

        for client_id in failed_ids {
            self.remove(client_id);
        }
    }

    /// Sends a message to a specific client.
    ///
    /// Returns true if the message was sent successfully, false if the
    /// client was not found or sending failed (which also removes it).
    fn send_to_client(&mut self, client_id: u32, message: Arc<String>) -> bool {
        if let Some(channels) = self.clients.get(&client_id) {
            if channels.message_tx.try_send(message).is_ok() {
                return true;
            }
            self.remove(client_id);
        }
        false
    }
}

/// Spawn a new ClientConnections actor and return a handle to it
pub async fn start_connections_handler() -> ClientConnectionsHandle {
    let (cmd_tx, mut cmd_rx) = mpsc::channel::<ClientConnectionCommand>(32);
    let handle = ClientConnectionsHandle { cmd_tx };

    let mut connections = ClientConnections::default();

    tokio::spawn(async move {
        while let Some(cmd) = cmd_rx.recv().await {
            match cmd {
                ClientConnectionCommand::Add { response } => {
                    let _ = response.send(connections.add());
                }
                ClientConnectionCommand::Remove { client_id } => {
                    connections.remove(client_id);
                }
                ClientConnectionCommand::SendToAll { message } => {
                    connections.send_to_all(message);
                }
                ClientConnectionCommand::SendToClient { client_id, message } => {
                    connections.send_to_client(client_id, message);
                }
                ClientConnectionCommand::Count { response } => {
                    let _ = response.send(connections.clients.len());
                }
            }
        }
    });
    handle
}
