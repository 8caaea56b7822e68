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

//! Workbase storage shared by the connection tasks and the work sources.
//!
//! Reads dominate by orders of magnitude (every share submission looks up
//! its workbase) so the store is a read-write lock, not an actor. Writers
//! only appear when a new template or network block arrives.

use crate::work::coinbase::{build_coinbase_fragments, OutputPair};
use crate::work::difficulty::block_subsidy;
use crate::work::error::WorkError;
use crate::work::gbt::{build_merkle_branches_for_template, BlockTemplate};
use bitcoin::Amount;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::sync::RwLock;
use tracing::{debug, info};

/// A fully prepared piece of work miners can be notified about.
///
/// Carries everything needed to rebuild a block header from a share
/// submission. Transactions are only present when the workbase was built
/// from a local block template; workbases received from an upstream
/// distributor carry branches only.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Workbase {
    /// Monotonically increasing workbase id, doubles as the stratum job id
    pub id: u64,
    /// Previous block hash, display order hex
    pub prevhash: String,
    pub coinbase1: String,
    pub coinbase2: String,
    /// Merkle branches as display order hex
    pub merkle_branches: Vec<String>,
    /// Block version from the template
    pub version: i32,
    /// Compact target, unprefixed hex
    pub nbits: String,
    /// Header timestamp the work was built with
    pub ntime: u32,
    pub height: u32,
    /// Raw transaction hex for block assembly, present on the primary only
    #[serde(skip_serializing_if = "Option::is_none")]
    pub transactions: Option<Vec<String>>,
}

impl Workbase {
    /// Build a workbase from a bitcoind block template.
    ///
    /// The coinbase pays the block subsidy for the template height to the
    /// solo payout address. Fees are left to the network; a solo pool that
    /// wants them can switch to the template's coinbasevalue here.
    pub fn from_template(
        id: u64,
        template: &BlockTemplate,
        payout_address: bitcoin::Address,
    ) -> Result<Self, WorkError> {
        let payout = OutputPair {
            address: payout_address,
            amount: Amount::from_sat(block_subsidy(template.height)),
        };
        let (coinbase1, coinbase2) = build_coinbase_fragments(
            template.height,
            payout.amount,
            &payout,
            template.default_witness_commitment.as_deref(),
            template.coinbaseaux.get("flags").map(|s| s.as_str()),
        )?;

        let merkle_branches = build_merkle_branches_for_template(template)?
            .iter()
            .map(|branch| branch.to_string())
            .collect();

        Ok(Workbase {
            id,
            prevhash: template.previousblockhash.clone(),
            coinbase1,
            coinbase2,
            merkle_branches,
            version: template.version,
            nbits: template.bits.clone(),
            ntime: template.curtime as u32,
            height: template.height,
            transactions: Some(
                template
                    .transactions
                    .iter()
                    .map(|tx| tx.data.clone())
                    .collect(),
            ),
        })
    }
}

struct Inner {
    current: Option<std::sync::Arc<Workbase>>,
    retained: VecDeque<std::sync::Arc<Workbase>>,
}

/// Store holding the current workbase plus a bounded window of superseded
/// ones that still accept shares.
pub struct WorkbaseStore {
    inner: RwLock<Inner>,
    retention: usize,
}

impl WorkbaseStore {
    pub fn new(retention: usize) -> Self {
        Self {
            inner: RwLock::new(Inner {
                current: None,
                retained: VecDeque::new(),
            }),
            retention,
        }
    }

    /// Publish a new workbase, superseding the current one.
    ///
    /// Ids must increase monotonically; a workbase with an id not above the
    /// current one loses the race and is dropped. Returns the published
    /// workbase, or None if it lost.
    pub fn publish(&self, workbase: Workbase) -> Option<std::sync::Arc<Workbase>> {
        let mut inner = match self.inner.write() {
            Ok(inner) => inner,
            Err(poisoned) => poisoned.into_inner(),
        };
        if let Some(current) = &inner.current {
            if workbase.id <= current.id {
                debug!(
                    "Dropping workbase {} superseded by {} before publish",
                    workbase.id, current.id
                );
                return None;
            }
        }
        let workbase = std::sync::Arc::new(workbase);
        if let Some(previous) = inner.current.replace(workbase.clone()) {
            inner.retained.push_back(previous);
            while inner.retained.len() > self.retention {
                inner.retained.pop_front();
            }
        }
        info!(
            "Published workbase {} for height {}",
            workbase.id, workbase.height
        );
        Some(workbase)
    }

    /// The workbase miners are currently working on.
    pub fn current(&self) -> Option<std::sync::Arc<Workbase>> {
        let inner = match self.inner.read() {
            Ok(inner) => inner,
            Err(poisoned) => poisoned.into_inner(),
        };
        inner.current.clone()
    }

    /// Look up a workbase by id. Returns None for ids outside the retention
    /// window, which makes the share stale.
    pub fn get(&self, id: u64) -> Option<std::sync::Arc<Workbase>> {
        let inner = match self.inner.read() {
            Ok(inner) => inner,
            Err(poisoned) => poisoned.into_inner(),
        };
        if let Some(current) = &inner.current {
            if current.id == id {
                return Some(current.clone());
            }
        }
        inner.retained.iter().find(|wb| wb.id == id).cloned()
    }

    /// Is the given workbase id the current one?
    pub fn is_current(&self, id: u64) -> bool {
        let inner = match self.inner.read() {
            Ok(inner) => inner,
            Err(poisoned) => poisoned.into_inner(),
        };
        inner.current.as_ref().map(|wb| wb.id) == Some(id)
    }

    /// Drop all retained workbases. Called when a new network block makes
    /// work for the previous height unsubmittable.
    pub fn clear_retained(&self) {
        let mut inner = match self.inner.write() {
            Ok(inner) => inner,
            Err(poisoned) => poisoned.into_inner(),
        };
        inner.retained.clear();
    }
}
