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

use crate::difficulty_adjuster::DifficultyAdjusterTrait;
use crate::error::Error;
use crate::events::EventKind;
use crate::message_handlers::StratumContext;
use crate::messages::{Id, Message, Request, Response, SetDifficultyNotification};
use crate::session::Session;
use crate::work::coinbase::{assemble_coinbase, COINBASE_TAG};
use crate::work::difficulty::block_subsidy;
use crate::work::difficulty::validate::{validate_submission, RejectReason, ShareSubmission};
use crate::work::SolvedBlock;
use serde_json::json;
use std::time::{SystemTime, UNIX_EPOCH};
use tracing::{debug, info, warn};

/// Error code for submits on an unauthorized connection
const UNAUTHORIZED_CODE: i32 = 24;

/// Handle mining.submit.
///
/// Looks up the workbase, rebuilds the header the miner hashed and checks
/// it against the session difficulty. Accepted shares feed the difficulty
/// adjuster and the user stats; a share meeting the network target is
/// handed off for block submission.
pub async fn handle_submit<D: DifficultyAdjusterTrait>(
    message: Request,
    session: &mut Session<D>,
    ctx: &StratumContext,
    now: SystemTime,
) -> Result<Vec<Message>, Error> {
    if message.param_count() < 5 {
        return Err(Error::InvalidParams(format!(
            "mining.submit expects at least 5 params, got {}",
            message.param_count()
        )));
    }

    session.last_activity = now;

    if !session.authorized() {
        debug!("Submit on unauthorized connection {}", session.enonce1);
        return Ok(vec![Message::Response(Response::new_err(
            message.id,
            UNAUTHORIZED_CODE,
            "Unauthorized worker",
        ))]);
    }

    // authorized() guarantees both are set
    let username = session.username.clone().unwrap_or_default();
    let worker_name = session.worker_name.clone().unwrap_or_default();

    let job_id = message.param_str(1).unwrap_or_default();
    let enonce2 = message.param_str(2).unwrap_or_default().to_string();
    let ntime = message.param_str(3).unwrap_or_default().to_string();
    let nonce = message.param_str(4).unwrap_or_default().to_string();
    let version_bits = message.param_str(5).map(String::from);

    let session_difficulty = session.difficulty_adjuster.current_difficulty();

    let workbase_id = match u64::from_str_radix(job_id, 16) {
        Ok(id) => id,
        Err(_) => {
            return Ok(reject(
                ctx,
                message.id,
                &username,
                &worker_name,
                0,
                session_difficulty,
                RejectReason::Malformed,
            ));
        }
    };

    let workbase = match ctx.store.get(workbase_id) {
        Some(workbase) => workbase,
        None => {
            debug!("Stale share for workbase {}", workbase_id);
            return Ok(reject(
                ctx,
                message.id,
                &username,
                &worker_name,
                workbase_id,
                session_difficulty,
                RejectReason::Stale,
            ));
        }
    };

    if !session.record_submission(workbase_id, &enonce2, &ntime, &nonce) {
        return Ok(reject(
            ctx,
            message.id,
            &username,
            &worker_name,
            workbase_id,
            session_difficulty,
            RejectReason::Duplicate,
        ));
    }

    let share = ShareSubmission {
        enonce1: &session.enonce1,
        enonce2: &enonce2,
        ntime: &ntime,
        nonce: &nonce,
        version_bits: version_bits.as_deref(),
    };

    let result = match validate_submission(
        &workbase,
        &share,
        session_difficulty,
        ctx.config.version_mask,
    ) {
        Ok(result) => result,
        Err(reason) => {
            return Ok(reject(
                ctx,
                message.id,
                &username,
                &worker_name,
                workbase_id,
                session_difficulty,
                reason,
            ));
        }
    };

    session.accepted_shares += 1;
    if result.share_difficulty > session.best_share_difficulty {
        session.best_share_difficulty = result.share_difficulty;
    }

    let mut messages = vec![Message::Response(Response::new_ok(
        message.id,
        json!(true),
    ))];

    let (change, _first_share) = session.difficulty_adjuster.record_share_submission(now);
    if let Some(change) = change {
        messages.push(Message::SetDifficulty(SetDifficultyNotification::new(
            change.new,
        )));
        ctx.emitter.emit(EventKind::DifficultyChanged {
            client_id: session.enonce1.clone(),
            old_difficulty: change.old,
            new_difficulty: change.new,
        });
        ctx.difficulty_memory
            .remember(&username, &worker_name, change.new, now);
    }

    let timestamp = now
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0);
    let outcome = ctx
        .users
        .record_share(&username, &worker_name, result.share_difficulty, timestamp);
    if outcome.personal_best {
        ctx.emitter.emit(EventKind::SharePersonalBest {
            username: username.clone(),
            worker_name: worker_name.clone(),
            share_difficulty: result.share_difficulty,
        });
    }
    if let Some(summary) = outcome.weekly_summary {
        ctx.emitter.emit(EventKind::WeeklySummary {
            username: summary.username,
            iso_year: summary.iso_year,
            iso_week: summary.iso_week,
            shares: summary.shares,
            best_share: summary.best_share,
        });
    }

    ctx.emitter.emit(EventKind::ShareSubmitted {
        username: username.clone(),
        worker_name: worker_name.clone(),
        workbase_id,
        session_difficulty,
        share_difficulty: result.share_difficulty,
        accepted: true,
        reject_reason: None,
    });

    if result.meets_network_target {
        info!(
            "Block found at height {} by {}.{}, hash {}",
            workbase.height, username, worker_name, result.hash
        );
        match assemble_coinbase(
            &workbase.coinbase1,
            &session.enonce1,
            &enonce2,
            &workbase.coinbase2,
        ) {
            Ok(coinbase) => {
                let solved = SolvedBlock {
                    workbase_id,
                    header: result.header,
                    coinbase,
                    username: username.clone(),
                    worker_name: worker_name.clone(),
                    share_difficulty: result.share_difficulty,
                    enonce1: session.enonce1.clone(),
                    enonce2,
                    ntime,
                    nonce,
                    version_bits,
                };
                if ctx.solved_tx.send(solved).await.is_err() {
                    warn!("Block submitter is gone, found block not submitted");
                }
            }
            Err(e) => warn!("Failed to reassemble winning coinbase: {}", e),
        }
        ctx.emitter.emit(EventKind::BlockFound {
            username,
            worker_name,
            block_hash: result.hash.to_string(),
            height: workbase.height,
            reward: block_subsidy(workbase.height),
            coinbase_tag: COINBASE_TAG.to_string(),
            share_difficulty: result.share_difficulty,
        });
    }

    Ok(messages)
}

/// Build the reject response and emit the matching share event.
fn reject(
    ctx: &StratumContext,
    id: Option<Id>,
    username: &str,
    worker_name: &str,
    workbase_id: u64,
    session_difficulty: f64,
    reason: RejectReason,
) -> Vec<Message> {
    ctx.emitter.emit(EventKind::ShareSubmitted {
        username: username.to_string(),
        worker_name: worker_name.to_string(),
        workbase_id,
        session_difficulty,
        share_difficulty: 0.0,
        accepted: false,
        reject_reason: Some(reason.as_str().to_string()),
    });
    vec![Message::Response(Response::new_err(
        id,
        reason.code(),
        reason.as_str(),
    ))]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message_handlers::test_support::{test_config, test_harness, test_session};
    use crate::work::coinbase::parse_address;
    use crate::work::gbt::parse_block_template;
    use crate::work::workbase::Workbase;

    const ADDRESS: &str = "bcrt1qe2qaq0e8qlp425pxytrakala7725dynwhknufr";

    fn publish_workbase(harness: &super::super::test_support::TestHarness, nbits: &str) -> u64 {
        let template = parse_block_template(
            &serde_json::json!({
                "version": 536870912,
                "rules": ["csv"],
                "previousblockhash":
                    "000000006648c58af2ea07d976804c4cbd40377e566af5694f14ecac2b0065c1",
                "transactions": [],
                "coinbaseaux": {},
                "coinbasevalue": 5000000000u64,
                "longpollid": "abc",
                "target": "00000377ae000000000000000000000000000000000000000000000000000000",
                "mintime": 1746434169,
                "curtime": 1746436703,
                "bits": nbits,
                "height": 99
            })
            .to_string(),
        )
        .unwrap();
        let address = parse_address(ADDRESS, bitcoin::Network::Regtest).unwrap();
        let workbase = Workbase::from_template(1, &template, address).unwrap();
        harness.ctx.store.publish(workbase);
        1
    }

    fn authorized_session() -> crate::session::Session<crate::difficulty_adjuster::DifficultyAdjuster>
    {
        let mut session = test_session();
        session.subscribed = true;
        session.username = Some(ADDRESS.to_string());
        session.worker_name = Some("rig1".to_string());
        session
    }

    fn submit_request(job_id: &str, nonce: &str) -> Request {
        Request::new_submit(
            4,
            format!("{}.rig1", ADDRESS),
            job_id.to_string(),
            "fe36a31b00000000".to_string(),
            "6818825f".to_string(),
            nonce.to_string(),
        )
    }

    #[tokio::test]
    async fn test_submit_before_authorize_is_rejected_not_fatal() {
        let harness = test_harness(test_config());
        let mut session = test_session();
        session.subscribed = true;

        let messages = handle_submit(
            submit_request("0000000000000001", "e9695791"),
            &mut session,
            &harness.ctx,
            SystemTime::now(),
        )
        .await
        .unwrap();

        let Message::Response(response) = &messages[0] else {
            panic!("Expected a response");
        };
        assert_eq!(response.error.as_ref().unwrap().code, UNAUTHORIZED_CODE);
        assert_eq!(response.result, Some(json!(false)));
    }

    #[tokio::test]
    async fn test_submit_with_missing_params_is_fatal() {
        let harness = test_harness(test_config());
        let mut session = authorized_session();

        let request: Request = serde_json::from_str(
            r#"{"id": 4, "method": "mining.submit", "params": ["user", "01"]}"#,
        )
        .unwrap();
        let result = handle_submit(request, &mut session, &harness.ctx, SystemTime::now()).await;
        assert!(matches!(result, Err(Error::InvalidParams(_))));
    }

    #[tokio::test]
    async fn test_accepted_share() {
        let mut harness = test_harness(test_config());
        publish_workbase(&harness, "1e0377ae");
        let mut session = authorized_session();

        let messages = handle_submit(
            submit_request("0000000000000001", "e9695791"),
            &mut session,
            &harness.ctx,
            SystemTime::now(),
        )
        .await
        .unwrap();

        let Message::Response(response) = &messages[0] else {
            panic!("Expected a response");
        };
        assert_eq!(response.result, Some(json!(true)));
        assert!(response.error.is_none());

        assert_eq!(session.accepted_shares, 1);
        assert!(session.best_share_difficulty > 0.0);

        let user = harness.ctx.users.get(ADDRESS).unwrap();
        assert_eq!(user.shares_valid_total, 1);
        assert!(user.workers.contains_key("rig1"));

        let events = harness.collect_events().await;
        let share_event = events
            .iter()
            .find_map(|e| match &e.kind {
                EventKind::ShareSubmitted {
                    accepted,
                    reject_reason,
                    workbase_id,
                    ..
                } => Some((*accepted, reject_reason.clone(), *workbase_id)),
                _ => None,
            })
            .unwrap();
        assert_eq!(share_event, (true, None, 1));

        // an ordinary share does not produce a block
        assert!(harness.solved_rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_stale_share_rejected() {
        let mut harness = test_harness(test_config());
        publish_workbase(&harness, "1e0377ae");
        let mut session = authorized_session();

        let messages = handle_submit(
            submit_request("00000000000000ff", "e9695791"),
            &mut session,
            &harness.ctx,
            SystemTime::now(),
        )
        .await
        .unwrap();

        let Message::Response(response) = &messages[0] else {
            panic!("Expected a response");
        };
        assert_eq!(response.error.as_ref().unwrap().code, 21);
        assert_eq!(session.accepted_shares, 0);

        let events = harness.collect_events().await;
        assert!(events.iter().any(|e| matches!(
            &e.kind,
            EventKind::ShareSubmitted {
                accepted: false,
                reject_reason: Some(reason),
                ..
            } if reason == "stale"
        )));
    }

    #[tokio::test]
    async fn test_duplicate_share_rejected() {
        let mut harness = test_harness(test_config());
        publish_workbase(&harness, "1e0377ae");
        let mut session = authorized_session();

        let request = submit_request("0000000000000001", "e9695791");
        handle_submit(request.clone(), &mut session, &harness.ctx, SystemTime::now())
            .await
            .unwrap();
        let messages = handle_submit(request, &mut session, &harness.ctx, SystemTime::now())
            .await
            .unwrap();

        let Message::Response(response) = &messages[0] else {
            panic!("Expected a response");
        };
        assert_eq!(response.error.as_ref().unwrap().code, 22);
        assert_eq!(session.accepted_shares, 1);

        let events = harness.collect_events().await;
        assert!(events.iter().any(|e| matches!(
            &e.kind,
            EventKind::ShareSubmitted {
                accepted: false,
                reject_reason: Some(reason),
                ..
            } if reason == "duplicate"
        )));
    }

    #[tokio::test]
    async fn test_low_difficulty_share_rejected() {
        let harness = {
            let mut config = test_config();
            config.start_difficulty = 1e12;
            test_harness(config)
        };
        publish_workbase(&harness, "1e0377ae");
        let mut session = authorized_session();
        session.difficulty_adjuster.set_current_difficulty(1e12);

        let messages = handle_submit(
            submit_request("0000000000000001", "e9695791"),
            &mut session,
            &harness.ctx,
            SystemTime::now(),
        )
        .await
        .unwrap();

        let Message::Response(response) = &messages[0] else {
            panic!("Expected a response");
        };
        assert_eq!(response.error.as_ref().unwrap().code, 23);
    }

    #[tokio::test]
    async fn test_malformed_job_id_rejected() {
        let harness = test_harness(test_config());
        publish_workbase(&harness, "1e0377ae");
        let mut session = authorized_session();

        let messages = handle_submit(
            submit_request("not-hex", "e9695791"),
            &mut session,
            &harness.ctx,
            SystemTime::now(),
        )
        .await
        .unwrap();

        let Message::Response(response) = &messages[0] else {
            panic!("Expected a response");
        };
        assert_eq!(response.error.as_ref().unwrap().code, 20);
    }

    #[tokio::test]
    async fn test_share_meeting_network_target_produces_block() {
        let mut harness = test_harness(test_config());
        // regtest compact target, nonce 1 is a known solve for this workbase
        publish_workbase(&harness, "207fffff");
        let mut session = authorized_session();

        let messages = handle_submit(
            submit_request("0000000000000001", "00000001"),
            &mut session,
            &harness.ctx,
            SystemTime::now(),
        )
        .await
        .unwrap();

        let Message::Response(response) = &messages[0] else {
            panic!("Expected a response");
        };
        assert_eq!(response.result, Some(json!(true)));

        let solved = harness.solved_rx.recv().await.unwrap();
        assert_eq!(solved.workbase_id, 1);
        assert_eq!(solved.username, ADDRESS);
        assert_eq!(solved.nonce, "00000001");
        assert!(solved.coinbase.is_coinbase());
        assert_eq!(
            solved.header.block_hash().to_string(),
            "757892754875fa48ed4ce661aebc3a2e1a16e2445266156f05c7aedd64d5310d"
        );

        let events = harness.collect_events().await;
        assert!(events.iter().any(|e| matches!(
            &e.kind,
            EventKind::BlockFound { height: 99, .. }
        )));
    }

    #[tokio::test]
    async fn test_block_solve_survives_session_target_above_network() {
        let mut harness = test_harness(test_config());
        publish_workbase(&harness, "207fffff");
        let mut session = authorized_session();
        // regtest network difficulty is far below 1.0, the solve misses
        // the session target but the block must still be submitted
        session.difficulty_adjuster.set_current_difficulty(1.0);

        let messages = handle_submit(
            submit_request("0000000000000001", "00000001"),
            &mut session,
            &harness.ctx,
            SystemTime::now(),
        )
        .await
        .unwrap();

        let Message::Response(response) = &messages[0] else {
            panic!("Expected a response");
        };
        assert_eq!(response.result, Some(json!(true)));

        let solved = harness.solved_rx.recv().await.unwrap();
        assert_eq!(
            solved.header.block_hash().to_string(),
            "757892754875fa48ed4ce661aebc3a2e1a16e2445266156f05c7aedd64d5310d"
        );

        let events = harness.collect_events().await;
        assert!(events.iter().any(|e| matches!(
            &e.kind,
            EventKind::BlockFound { height: 99, .. }
        )));
    }

    #[tokio::test]
    async fn test_first_share_is_not_announced_as_personal_best() {
        let mut harness = test_harness(test_config());
        publish_workbase(&harness, "1e0377ae");
        let mut session = authorized_session();

        handle_submit(
            submit_request("0000000000000001", "e9695791"),
            &mut session,
            &harness.ctx,
            SystemTime::now(),
        )
        .await
        .unwrap();
        // first share never announces a personal best
        let events = harness.collect_events().await;
        assert!(!events
            .iter()
            .any(|e| matches!(e.kind, EventKind::SharePersonalBest { .. })));
    }
}
