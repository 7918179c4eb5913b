//! Logical operations of the Pass the JOINT contract.
//!
//! [`JointRead`] is implemented by every handle; [`JointWrite`] only by handles
//! that can sign, so read-only code can never submit a transaction.

use crate::error::{
    ContractError,
    TxError,
};
use alloy::primitives::{
    Address,
    B256,
    U256,
};
use serde::Serialize;
use std::{
    future::Future,
    sync::Arc,
};

pub type CallResult<T> = Result<T, ContractError>;

#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize)]
pub struct TxReceipt {
    pub tx_hash: B256,
    pub block_number: Option<u64>,
    pub gas_used: u64,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize)]
pub struct TransferRecord {
    pub from: Address,
    pub to: Address,
    pub token_id: U256,
    pub block_number: Option<u64>,
}

/// Indexed-topic filter for `Transfer` log queries.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct TransferFilter {
    pub token_id: Option<U256>,
    pub to: Option<Address>,
    pub from_block: u64,
}

impl TransferFilter {
    pub fn for_token(token_id: U256, from_block: u64) -> Self {
        Self {
            token_id: Some(token_id),
            to: None,
            from_block,
        }
    }

    pub fn matches(&self, record: &TransferRecord) -> bool {
        self.token_id.is_none_or(|id| id == record.token_id)
            && self.to.is_none_or(|to| to == record.to)
            && record
                .block_number
                .is_none_or(|height| height >= self.from_block)
    }
}

pub trait JointRead: Send + Sync {
    fn time_until_yoinkable(&self) -> impl Future<Output = CallResult<U256>> + Send;

    fn owner_of(&self, token_id: U256) -> impl Future<Output = CallResult<Address>> + Send;

    fn balance_of(&self, owner: Address) -> impl Future<Output = CallResult<U256>> + Send;

    fn token_of_owner_by_index(
        &self,
        owner: Address,
        index: U256,
    ) -> impl Future<Output = CallResult<U256>> + Send;

    fn total_supply(&self) -> impl Future<Output = CallResult<U256>> + Send;

    fn token_by_index(&self, index: U256) -> impl Future<Output = CallResult<U256>> + Send;

    /// `Transfer` logs matching the filter, oldest first.
    fn transfers(
        &self,
        filter: TransferFilter,
    ) -> impl Future<Output = CallResult<Vec<TransferRecord>>> + Send;
}

pub trait JointWrite: JointRead {
    fn yoink(&self) -> impl Future<Output = Result<TxReceipt, TxError>> + Send;

    fn yoink_to(
        &self,
        target: Address,
    ) -> impl Future<Output = Result<TxReceipt, TxError>> + Send;
}

impl<T: JointRead + ?Sized> JointRead for Arc<T> {
    fn time_until_yoinkable(&self) -> impl Future<Output = CallResult<U256>> + Send {
        (**self).time_until_yoinkable()
    }

    fn owner_of(&self, token_id: U256) -> impl Future<Output = CallResult<Address>> + Send {
        (**self).owner_of(token_id)
    }

    fn balance_of(&self, owner: Address) -> impl Future<Output = CallResult<U256>> + Send {
        (**self).balance_of(owner)
    }

    fn token_of_owner_by_index(
        &self,
        owner: Address,
        index: U256,
    ) -> impl Future<Output = CallResult<U256>> + Send {
        (**self).token_of_owner_by_index(owner, index)
    }

    fn total_supply(&self) -> impl Future<Output = CallResult<U256>> + Send {
        (**self).total_supply()
    }

    fn token_by_index(&self, index: U256) -> impl Future<Output = CallResult<U256>> + Send {
        (**self).token_by_index(index)
    }

    fn transfers(
        &self,
        filter: TransferFilter,
    ) -> impl Future<Output = CallResult<Vec<TransferRecord>>> + Send {
        (**self).transfers(filter)
    }
}

impl<T: JointWrite + ?Sized> JointWrite for Arc<T> {
    fn yoink(&self) -> impl Future<Output = Result<TxReceipt, TxError>> + Send {
        (**self).yoink()
    }

    fn yoink_to(
        &self,
        target: Address,
    ) -> impl Future<Output = Result<TxReceipt, TxError>> + Send {
        (**self).yoink_to(target)
    }
}
