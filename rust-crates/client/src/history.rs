use crate::{
    contract::{
        JointRead,
        TransferFilter,
        TransferRecord,
    },
    error::PollError,
};
use alloy::primitives::Address;
use itertools::Itertools;
use joint_abi::JOINT_TOKEN_ID;
use joint_config::JointConfig;
use serde::Serialize;
use std::fmt;

#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize)]
pub struct PastHolder {
    /// 1 is the earliest holder.
    pub rank: usize,
    pub address: Address,
}

impl fmt::Display for PastHolder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}. {}", self.rank, self.address)
    }
}

/// Senders of the joint, most recent first, each listed once at the position
/// of its first hand-off.
pub fn past_holders(transfers: &[TransferRecord]) -> Vec<PastHolder> {
    let senders: Vec<Address> = transfers
        .iter()
        .map(|t| t.from)
        .filter(|from| !from.is_zero())
        .unique()
        .collect();
    let total = senders.len();
    senders
        .into_iter()
        .rev()
        .enumerate()
        .map(|(position, address)| PastHolder {
            rank: total - position,
            address,
        })
        .collect()
}

pub async fn holder_history<R: JointRead>(
    reader: &R,
    config: &JointConfig,
) -> Result<Vec<PastHolder>, PollError> {
    let filter = TransferFilter::for_token(JOINT_TOKEN_ID, config.deployment_block);
    let transfers = reader.transfers(filter).await?;
    tracing::debug!(count = transfers.len(), "fetched joint transfers");
    Ok(past_holders(&transfers))
}
