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

//! Non-blocking event emission.
//!
//! `emit` is synchronous and never waits: events go into a bounded queue
//! and a drain task delivers them to the transport. When the queue is full
//! the event is dropped and counted, mining is never back-pressured by a
//! slow consumer.

use crate::events::{Event, EventKind};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tracing::{debug, warn};

/// Seconds between reconnect attempts of the TCP transport
const RECONNECT_DELAY_SECONDS: u64 = 5;

/// Delivers serialized event lines to a consumer.
pub trait EventTransport: Send + 'static {
    fn deliver(
        &mut self,
        line: &str,
    ) -> impl std::future::Future<Output = Result<(), std::io::Error>> + Send;
}

/// Line-delimited JSON over a TCP connection, reconnecting on failure.
pub struct TcpTransport {
    address: String,
    stream: Option<TcpStream>,
}

impl TcpTransport {
    pub fn new(address: String) -> Self {
        Self {
            address,
            stream: None,
        }
    }
}

impl EventTransport for TcpTransport {
    async fn deliver(&mut self, line: &str) -> Result<(), std::io::Error> {
        if self.stream.is_none() {
            match TcpStream::connect(&self.address).await {
                Ok(stream) => self.stream = Some(stream),
                Err(e) => {
                    tokio::time::sleep(Duration::from_secs(RECONNECT_DELAY_SECONDS)).await;
                    return Err(e);
                }
            }
        }
        let stream = self.stream.as_mut().ok_or_else(|| {
            std::io::Error::new(std::io::ErrorKind::NotConnected, "no event stream")
        })?;
        let result = stream.write_all(format!("{}\n", line).as_bytes()).await;
        if result.is_err() {
            // force a reconnect on the next event
            self.stream = None;
        }
        result
    }
}

/// Transport delivering into an in-process channel. Used in tests.
pub struct ChannelTransport {
    tx: mpsc::Sender<String>,
}

impl ChannelTransport {
    pub fn new(tx: mpsc::Sender<String>) -> Self {
        Self { tx }
    }
}

impl EventTransport for ChannelTransport {
    async fn deliver(&mut self, line: &str) -> Result<(), std::io::Error> {
        self.tx
            .send(line.to_string())
            .await
            .map_err(|_| std::io::Error::new(std::io::ErrorKind::BrokenPipe, "channel closed"))
    }
}

/// Cheap clonable handle used from connection tasks to publish events.
#[derive(Clone)]
pub struct EventEmitter {
    tx: mpsc::Sender<Event>,
    dropped: Arc<AtomicU64>,
}

impl EventEmitter {
    /// Queue an event without blocking. Full queue drops the event and
    /// bumps the drop counter.
    pub fn emit(&self, kind: EventKind) {
        let timestamp = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or(0);
        if self.tx.try_send(Event::new(timestamp, kind)).is_err() {
            let dropped = self.dropped.fetch_add(1, Ordering::Relaxed) + 1;
            debug!("Event queue full, dropped {} events so far", dropped);
        }
    }

    /// Total events dropped due to a full queue.
    pub fn dropped_count(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}

/// Start the emitter drain task. Returns the emitter handle; the task runs
/// until all emitter clones are dropped.
pub fn start_emitter<T: EventTransport>(capacity: usize, mut transport: T) -> EventEmitter {
    let (tx, mut rx) = mpsc::channel::<Event>(capacity);
    let emitter = EventEmitter {
        tx,
        dropped: Arc::new(AtomicU64::new(0)),
    };

    tokio::spawn(async move {
        while let Some(event) = rx.recv().await {
            let line = match serde_json::to_string(&event) {
                Ok(line) => line,
                Err(e) => {
                    warn!("Failed to serialize event: {}", e);
                    continue;
                }
            };
            if let Err(e) = transport.deliver(&line).await {
                warn!("Failed to deliver event: {}", e);
            }
        }
    });

    emitter
}
