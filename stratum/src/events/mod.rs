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

//! Pool events published to external consumers.
//!
//! Event names and field names are a stable interface consumed by tooling
//! outside this repository. Adding a new event is fine, renaming or
//! removing fields of an existing one is a breaking change.

pub mod emitter;

use serde::{Deserialize, Serialize};

/// A single pool event with its emission timestamp.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Event {
    /// Seconds since epoch at emission time
    pub timestamp: u64,
    #[serde(flatten)]
    pub kind: EventKind,
}

/// The event payloads, tagged by `event_type` on the wire.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "event_type", rename_all = "snake_case")]
pub enum EventKind {
    ShareSubmitted {
        username: String,
        worker_name: String,
        workbase_id: u64,
        session_difficulty: f64,
        /// Difficulty the share hash achieved, zero when rejected before hashing
        share_difficulty: f64,
        accepted: bool,
        #[serde(skip_serializing_if = "Option::is_none")]
        reject_reason: Option<String>,
    },
    SharePersonalBest {
        username: String,
        worker_name: String,
        share_difficulty: f64,
    },
    BlockFound {
        username: String,
        worker_name: String,
        block_hash: String,
        height: u32,
        /// Block subsidy in satoshis at this height
        reward: u64,
        /// Attribution string embedded in the coinbase scriptsig
        coinbase_tag: String,
        share_difficulty: f64,
    },
    ConnectionOpened {
        client_id: String,
        remote_addr: String,
    },
    ConnectionClosed {
        client_id: String,
        remote_addr: String,
        /// Seconds between accept and disconnect
        duration_secs: u64,
        accepted_shares: u64,
    },
    DifficultyChanged {
        client_id: String,
        old_difficulty: f64,
        new_difficulty: f64,
    },
    NewNetworkBlock {
        height: u32,
        previous_hash: String,
    },
    WeeklySummary {
        username: String,
        iso_year: i32,
        iso_week: u32,
        shares: u64,
        best_share: f64,
    },
}

impl Event {
    pub fn new(timestamp: u64, kind: EventKind) -> Self {
        Event { timestamp, kind }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_type_tag_serialization() {
        let event = Event::new(
            1704067200,
            EventKind::ConnectionOpened {
                client_id: "0a731f0d".to_string(),
                remote_addr: "127.0.0.1:50210".to_string(),
            },
        );
        let serialized = serde_json::to_string(&event).unwrap();
        assert_eq!(
            serialized,
            r#"{"timestamp":1704067200,"event_type":"connection_opened","client_id":"0a731f0d","remote_addr":"127.0.0.1:50210"}"#
        );
    }

    #[test]
    fn test_share_submitted_accepted_omits_reject_reason() {
        let event = Event::new(
            1704067200,
            EventKind::ShareSubmitted {
                username: "bcrt1qe2qaq0e8qlp425pxytrakala7725dynwhknufr".to_string(),
                worker_name: "rig1".to_string(),
                workbase_id: 7,
                session_difficulty: 1000.0,
                share_difficulty: 1523.5,
                accepted: true,
                reject_reason: None,
            },
        );
        let serialized = serde_json::to_string(&event).unwrap();
        assert!(serialized.contains(r#""event_type":"share_submitted""#));
        assert!(!serialized.contains("reject_reason"));

        let parsed: Event = serde_json::from_str(&serialized).unwrap();
        assert_eq!(parsed, event);
    }

    #[test]
    fn test_share_submitted_rejected_carries_reason() {
        let event = Event::new(
            1704067200,
            EventKind::ShareSubmitted {
                username: "bcrt1qe2qaq0e8qlp425pxytrakala7725dynwhknufr".to_string(),
                worker_name: "rig1".to_string(),
                workbase_id: 7,
                session_difficulty: 1000.0,
                share_difficulty: 0.0,
                accepted: false,
                reject_reason: Some("stale".to_string()),
            },
        );
        let serialized = serde_json::to_string(&event).unwrap();
        assert!(serialized.contains(r#""reject_reason":"stale""#));
    }

    #[test]
    fn test_block_found_carries_attribution() {
        let event = Event::new(
            1704067200,
            EventKind::BlockFound {
                username: "bcrt1qe2qaq0e8qlp425pxytrakala7725dynwhknufr".to_string(),
                worker_name: "rig1".to_string(),
                block_hash:
                    "757892754875fa48ed4ce661aebc3a2e1a16e2445266156f05c7aedd64d5310d".to_string(),
                height: 99,
                reward: 5_000_000_000,
                coinbase_tag: "/solopool/".to_string(),
                share_difficulty: 1.5,
            },
        );
        let serialized = serde_json::to_string(&event).unwrap();
        assert!(serialized.contains(r#""event_type":"block_found""#));
        assert!(serialized.contains(r#""coinbase_tag":"/solopool/""#));
        assert!(serialized.contains(r#""reward":5000000000"#));
    }

    #[test]
    fn test_all_event_types_roundtrip() {
        let kinds = vec![
            EventKind::SharePersonalBest {
                username: "user".to_string(),
                worker_name: "rig1".to_string(),
                share_difficulty: 9000.0,
            },
            EventKind::BlockFound {
                username: "user".to_string(),
                worker_name: "rig1".to_string(),
                block_hash: "00000000000000000002f5f0a7ab8e6f9c9a1b3a".to_string(),
                height: 840000,
                reward: 312_500_000,
                coinbase_tag: "/solopool/".to_string(),
                share_difficulty: 9.1e13,
            },
            EventKind::ConnectionClosed {
                client_id: "0a731f0d".to_string(),
                remote_addr: "127.0.0.1:50210".to_string(),
                duration_secs: 3600,
                accepted_shares: 42,
            },
            EventKind::DifficultyChanged {
                client_id: "0a731f0d".to_string(),
                old_difficulty: 1000.0,
                new_difficulty: 2000.0,
            },
            EventKind::NewNetworkBlock {
                height: 840001,
                previous_hash:
                    "000000006648c58af2ea07d976804c4cbd40377e566af5694f14ecac2b0065c1".to_string(),
            },
            EventKind::WeeklySummary {
                username: "user".to_string(),
                iso_year: 2024,
                iso_week: 1,
                shares: 1000,
                best_share: 5000.0,
            },
        ];
        for kind in kinds {
            let event = Event::new(1, kind);
            let serialized = serde_json::to_string(&event).unwrap();
            let parsed: Event = serde_json::from_str(&serialized).unwrap();
            assert_eq!(parsed, event);
        }
    }
}
