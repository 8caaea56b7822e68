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

//! Primary distributor tests against a mocked bitcoind and a hand-driven
//! relay connection.

use bitcoindrpc::test_utils::setup_mock_bitcoin_rpc;
use bitcoindrpc::BitcoindRpcClient;
use distributor::config::DistributorConfig;
use distributor::messages::{BlockForward, Frame, Hello};
use distributor::primary::TemplateDistributor;
use std::sync::Arc;
use stratum::config::StratumConfig;
use stratum::difficulty_adjuster::memory::DifficultyMemory;
use stratum::events::emitter::{start_emitter, ChannelTransport};
use stratum::message_handlers::StratumContext;
use stratum::users::UserTable;
use stratum::work::notify::NotifyCmd;
use stratum::work::workbase::WorkbaseStore;
use stratum::work::SolvedBlock;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, oneshot};
use wiremock::matchers::{body_partial_json, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const ADDRESS: &str = "bcrt1qe2qaq0e8qlp425pxytrakala7725dynwhknufr";
const TOKEN: &str = "sekrit";
const PORT: u16 = 39921;

fn stratum_config() -> StratumConfig {
    serde_json::from_value(serde_json::json!({
        "hostname": "127.0.0.1",
        "port": 0,
        "start_difficulty": 1e-12,
        "minimum_difficulty": 1e-16,
        "maximum_difficulty": 1e6,
        "target_share_interval": 10,
        "retarget_shares": 16,
        "retarget_seconds": 120,
        "workbase_retention": 2,
        "idle_timeout": 900,
        "event_queue_capacity": 64,
        "solo_address": ADDRESS,
        "network": "regtest",
        "version_mask": "1fffe000"
    }))
    .unwrap()
}

fn distributor_config(port: u16) -> DistributorConfig {
    serde_json::from_value(serde_json::json!({
        "role": "primary",
        "listen_address": format!("127.0.0.1:{}", port),
        "primary_address": null,
        "auth_token": TOKEN,
        "poll_interval": 30,
        "failover_threshold": 90,
        "reconnect_delay": 1,
        "zmq_endpoint": null
    }))
    .unwrap()
}

fn template_json(height: u32, bits: &str, target: &str) -> serde_json::Value {
    serde_json::json!({
        "version": 536870912,
        "rules": ["csv"],
        "previousblockhash":
            "000000006648c58af2ea07d976804c4cbd40377e566af5694f14ecac2b0065c1",
        "transactions": [],
        "coinbaseaux": {},
        "coinbasevalue": 5000000000u64,
        "longpollid": "abc",
        "target": target,
        "mintime": 1746434169,
        "curtime": 1746436703,
        "bits": bits,
        "height": height
    })
}

async fn mock_getblocktemplate(mock_server: &MockServer, template: serde_json::Value) {
    Mock::given(method("POST"))
        .and(path("/"))
        .and(body_partial_json(
            serde_json::json!({"method": "getblocktemplate"}),
        ))
        .respond_with(ResponseTemplate::new(200).set_body_json(
            serde_json::json!({ "result": template, "error": null, "id": 0 }),
        ))
        .mount(mock_server)
        .await;
}

async fn mock_submitblock(mock_server: &MockServer) {
    Mock::given(method("POST"))
        .and(path("/"))
        .and(body_partial_json(serde_json::json!({"method": "submitblock"})))
        .respond_with(ResponseTemplate::new(200).set_body_json(
            serde_json::json!({ "result": null, "error": null, "id": 0 }),
        ))
        .mount(mock_server)
        .await;
}

struct TestPrimary {
    ctx: StratumContext,
    notify_rx: mpsc::Receiver<NotifyCmd>,
    solved_tx: mpsc::Sender<SolvedBlock>,
    _shutdown_tx: oneshot::Sender<()>,
    block_tx: mpsc::Sender<()>,
    mock_server: MockServer,
}

async fn start_primary(port: u16, template: serde_json::Value) -> TestPrimary {
    let (mock_server, rpc_config) = setup_mock_bitcoin_rpc().await;
    mock_getblocktemplate(&mock_server, template).await;
    mock_submitblock(&mock_server).await;

    let config = Arc::new(stratum_config());
    let (events_tx, _events_rx) = mpsc::channel(64);
    let emitter = start_emitter(64, ChannelTransport::new(events_tx));
    let (notify_tx, notify_rx) = mpsc::channel(64);
    let (solved_tx, solved_rx) = mpsc::channel(16);
    let (block_tx, block_rx) = mpsc::channel(1);

    let ctx = StratumContext {
        config,
        store: Arc::new(WorkbaseStore::new(2)),
        users: Arc::new(UserTable::new()),
        difficulty_memory: Arc::new(DifficultyMemory::new()),
        emitter,
        notify_tx,
        solved_tx: solved_tx.clone(),
    };

    let client = BitcoindRpcClient::from_config(&rpc_config).unwrap();
    let distributor =
        TemplateDistributor::new(distributor_config(port), ctx.clone(), client).unwrap();

    let (shutdown_tx, shutdown_rx) = oneshot::channel();
    let (ready_tx, ready_rx) = oneshot::channel();
    tokio::spawn(async move {
        let _ = distributor
            .start(solved_rx, block_rx, shutdown_rx, Some(ready_tx))
            .await;
    });
    ready_rx.await.expect("Primary should signal readiness");

    TestPrimary {
        ctx,
        notify_rx,
        solved_tx,
        _shutdown_tx: shutdown_tx,
        block_tx,
        mock_server,
    }
}

async fn connect_relay(
    port: u16,
    token: &str,
) -> (
    tokio::io::Lines<BufReader<tokio::net::tcp::OwnedReadHalf>>,
    tokio::net::tcp::OwnedWriteHalf,
) {
    let stream = TcpStream::connect(("127.0.0.1", port)).await.unwrap();
    let (read_half, mut write_half) = stream.into_split();
    let reader = BufReader::new(read_half).lines();

    let hello = serde_json::to_string(&Frame::Hello(Hello {
        token: token.to_string(),
    }))
    .unwrap();
    write_half
        .write_all(format!("{}\n", hello).as_bytes())
        .await
        .unwrap();
    (reader, write_half)
}

async fn read_frame(
    reader: &mut tokio::io::Lines<BufReader<tokio::net::tcp::OwnedReadHalf>>,
) -> Frame {
    let line = tokio::time::timeout(std::time::Duration::from_secs(5), reader.next_line())
        .await
        .expect("Timed out waiting for a frame")
        .expect("Read failed")
        .expect("Connection closed");
    serde_json::from_str(&line).expect("Line should be a valid frame")
}

#[tokio::test]
async fn test_primary_publishes_and_pushes_templates() {
    let mut primary = start_primary(
        PORT,
        template_json(
            99,
            "1e0377ae",
            "00000377ae000000000000000000000000000000000000000000000000000000",
        ),
    )
    .await;

    // the initial template was applied locally before readiness
    let current = primary.ctx.store.current().unwrap();
    assert_eq!(current.id, 1);
    assert_eq!(current.height, 99);
    assert!(current.transactions.is_some());
    assert!(matches!(
        primary.notify_rx.try_recv(),
        Ok(NotifyCmd::BroadcastCurrent { clean_jobs: true })
    ));

    // a connecting relay is caught up with the current template
    let (mut reader, _write_half) = connect_relay(PORT, TOKEN).await;
    let Frame::TemplatePush(push) = read_frame(&mut reader).await else {
        panic!("Expected a template push");
    };
    assert_eq!(push.template_id, 1);
    assert_eq!(push.height, 99);
    assert_eq!(push.compact_target, "1e0377ae");
    assert!(!push.coinbase_fragments[0].is_empty());
    assert!(!push.coinbase_fragments[1].is_empty());

    // a new network block triggers a fresh template with a bumped id
    primary.block_tx.send(()).await.unwrap();
    let Frame::TemplatePush(push) = read_frame(&mut reader).await else {
        panic!("Expected a template push");
    };
    assert_eq!(push.template_id, 2);
    assert_eq!(primary.ctx.store.current().unwrap().id, 2);
}

#[tokio::test]
async fn test_primary_drops_relay_with_bad_token() {
    let _primary = start_primary(
        PORT + 1,
        template_json(
            99,
            "1e0377ae",
            "00000377ae000000000000000000000000000000000000000000000000000000",
        ),
    )
    .await;

    let (mut reader, _write_half) = connect_relay(PORT + 1, "wrong").await;
    let line = tokio::time::timeout(std::time::Duration::from_secs(5), reader.next_line())
        .await
        .expect("Timed out waiting for close")
        .expect("Read failed");
    assert!(line.is_none(), "Primary should close the connection");
}

#[tokio::test]
async fn test_primary_submits_forwarded_block() {
    // a target every hash beats, so the known nonce solves the block
    let primary = start_primary(
        PORT + 2,
        template_json(
            99,
            "207fffff",
            "7fffff0000000000000000000000000000000000000000000000000000000000",
        ),
    )
    .await;

    let (mut reader, mut write_half) = connect_relay(PORT + 2, TOKEN).await;
    // drain the catch-up push first
    let Frame::TemplatePush(push) = read_frame(&mut reader).await else {
        panic!("Expected a template push");
    };

    let forward = Frame::BlockForward(BlockForward {
        template_id: push.template_id,
        username: ADDRESS.to_string(),
        worker_name: "rig1".to_string(),
        enonce1: "0a731f0d".to_string(),
        enonce2: "fe36a31b00000000".to_string(),
        ntime: "6818825f".to_string(),
        nonce: "00000001".to_string(),
        version_bits: None,
        share_difficulty: 1.0,
    });
    let line = serde_json::to_string(&forward).unwrap();
    write_half
        .write_all(format!("{}\n", line).as_bytes())
        .await
        .unwrap();

    tokio::time::sleep(std::time::Duration::from_millis(500)).await;

    let submissions: Vec<_> = primary
        .mock_server
        .received_requests()
        .await
        .unwrap()
        .into_iter()
        .filter(|request| {
            String::from_utf8_lossy(&request.body).contains(r#""method":"submitblock""#)
        })
        .collect();
    assert_eq!(submissions.len(), 1, "Expected exactly one block submission");
}

#[tokio::test]
async fn test_primary_submits_locally_solved_block() {
    let primary = start_primary(
        PORT + 3,
        template_json(
            99,
            "207fffff",
            "7fffff0000000000000000000000000000000000000000000000000000000000",
        ),
    )
    .await;

    // rebuild the solve the way the submit handler would have
    let workbase = primary.ctx.store.current().unwrap();
    let share = stratum::work::difficulty::validate::ShareSubmission {
        enonce1: "0a731f0d",
        enonce2: "fe36a31b00000000",
        ntime: "6818825f",
        nonce: "00000001",
        version_bits: None,
    };
    let result = stratum::work::difficulty::validate::validate_submission(
        &workbase, &share, 1e-12, 0x1fffe000,
    )
    .unwrap();
    assert!(result.meets_network_target);
    let coinbase = stratum::work::coinbase::assemble_coinbase(
        &workbase.coinbase1,
        share.enonce1,
        share.enonce2,
        &workbase.coinbase2,
    )
    .unwrap();

    primary
        .solved_tx
        .send(SolvedBlock {
            workbase_id: workbase.id,
            header: result.header,
            coinbase,
            username: ADDRESS.to_string(),
            worker_name: "rig1".to_string(),
            share_difficulty: result.share_difficulty,
            enonce1: "0a731f0d".to_string(),
            enonce2: "fe36a31b00000000".to_string(),
            ntime: "6818825f".to_string(),
            nonce: "00000001".to_string(),
            version_bits: None,
        })
        .await
        .unwrap();

    tokio::time::sleep(std::time::Duration::from_millis(500)).await;

    let submitted = primary
        .mock_server
        .received_requests()
        .await
        .unwrap()
        .iter()
        .any(|request| String::from_utf8_lossy(&request.body).contains(r#""method":"submitblock""#));
    assert!(submitted, "The solved block should reach bitcoind");
}
