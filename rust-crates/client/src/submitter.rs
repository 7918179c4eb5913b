//! `yoink` / `yoinkTo` submission with one in-flight transaction per kind.

use crate::{
    binding::WriteHandle,
    contract::{
        JointWrite,
        TxReceipt,
    },
    error::TxError,
};
use alloy::primitives::{
    Address,
    B256,
};
use serde::Serialize;
use std::{
    collections::HashMap,
    fmt,
    sync::{
        Mutex,
        PoisonError,
    },
};
use tracing::{
    info,
    warn,
};

#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq, Serialize)]
pub enum TxSlot {
    Claim,
    TransferTo,
}

impl fmt::Display for TxSlot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TxSlot::Claim => write!(f, "yoink"),
            TxSlot::TransferTo => write!(f, "yoinkTo"),
        }
    }
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub enum TxKind {
    Claim,
    /// Raw, unvalidated recipient as typed by the user.
    TransferTo(String),
}

impl TxKind {
    pub fn slot(&self) -> TxSlot {
        match self {
            TxKind::Claim => TxSlot::Claim,
            TxKind::TransferTo(_) => TxSlot::TransferTo,
        }
    }
}

#[derive(Clone, Debug, Default, Eq, PartialEq, Serialize)]
pub enum PendingTx {
    #[default]
    Idle,
    Submitted,
    Confirmed(B256),
    Failed(String),
}

impl PendingTx {
    pub fn is_submitted(&self) -> bool {
        matches!(self, PendingTx::Submitted)
    }
}

/// Parses a recipient the way web3 wallets do; see [`joint_config::parse_address`].
pub fn parse_address(input: &str) -> Result<Address, TxError> {
    joint_config::parse_address(input).ok_or_else(|| TxError::InvalidAddress(input.to_string()))
}

#[derive(Default)]
struct SlotTable {
    generation: u64,
    slots: HashMap<TxSlot, PendingTx>,
}

#[derive(Default)]
pub struct TxSubmitter {
    table: Mutex<SlotTable>,
}

/// Marks the slot failed if the submitting future is dropped mid-flight.
struct InFlight<'a> {
    submitter: &'a TxSubmitter,
    slot: TxSlot,
    generation: u64,
    settled: bool,
}

impl InFlight<'_> {
    fn settle(mut self, outcome: PendingTx) {
        self.submitter.settle(self.slot, self.generation, outcome);
        self.settled = true;
    }
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        if !self.settled {
            self.submitter.settle(
                self.slot,
                self.generation,
                PendingTx::Failed("submission abandoned".to_string()),
            );
        }
    }
}

impl TxSubmitter {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, SlotTable> {
        self.table.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn status(&self, slot: TxSlot) -> PendingTx {
        self.lock().slots.get(&slot).cloned().unwrap_or_default()
    }

    /// Forget every pending flag. Transactions still in flight keep running
    /// but no longer report into the table.
    pub fn reset(&self) {
        let mut table = self.lock();
        table.generation += 1;
        table.slots.clear();
    }

    fn begin(&self, slot: TxSlot) -> Result<InFlight<'_>, TxError> {
        let mut table = self.lock();
        let entry = table.slots.entry(slot).or_default();
        if entry.is_submitted() {
            return Err(TxError::AlreadyPending(slot));
        }
        *entry = PendingTx::Submitted;
        Ok(InFlight {
            submitter: self,
            slot,
            generation: table.generation,
            settled: false,
        })
    }

    fn settle(&self, slot: TxSlot, generation: u64, outcome: PendingTx) {
        let mut table = self.lock();
        if table.generation == generation {
            table.slots.insert(slot, outcome);
        }
    }

    /// Validate, send and wait for the receipt. Never retries.
    pub async fn submit<W: JointWrite>(
        &self,
        kind: TxKind,
        handle: &WriteHandle<W>,
    ) -> Result<TxReceipt, TxError> {
        let target = match &kind {
            TxKind::Claim => None,
            TxKind::TransferTo(raw) => Some(parse_address(raw)?),
        };
        let slot = kind.slot();
        let in_flight = self.begin(slot)?;
        info!(%slot, account = %handle.account(), epoch = handle.epoch(), "submitting transaction");

        let result = match target {
            None => handle.writer().yoink().await,
            Some(target) => handle.writer().yoink_to(target).await,
        };
        match &result {
            Ok(receipt) => {
                info!(%slot, tx = %receipt.tx_hash, gas_used = receipt.gas_used, "transaction confirmed");
                in_flight.settle(PendingTx::Confirmed(receipt.tx_hash));
            }
            Err(err) => {
                warn!(%slot, %err, "transaction failed");
                in_flight.settle(PendingTx::Failed(err.to_string()));
            }
        }
        result
    }
}
