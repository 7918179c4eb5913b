use crate::{
    connector::{
        Connection,
        ConnectionState,
    },
    contract::{
        CallResult,
        JointRead,
        JointWrite,
        TransferFilter,
        TransferRecord,
        TxReceipt,
    },
    error::{
        BindError,
        ContractError,
        TxError,
    },
    wallet::WalletProvider,
};
use alloy::{
    primitives::{
        Address,
        U256,
    },
    providers::{
        DynProvider,
        Provider,
        ProviderBuilder,
    },
    rpc::types::TransactionReceipt,
};
use joint_abi::{
    PassTheJoint::{
        self,
        PassTheJointInstance,
    },
    address_topic,
    token_topic,
};
use joint_config::JointConfig;
use std::{
    future::Future,
    sync::atomic::{
        AtomicU64,
        Ordering,
    },
};

static NEXT_HANDLE_ID: AtomicU64 = AtomicU64::new(1);

/// Typed binding to the deployed contract over some provider.
#[derive(Clone, Debug)]
pub struct ContractHandle {
    contract: PassTheJointInstance<DynProvider>,
}

/// Read-only handle bound to the configured public RPC endpoint.
pub type ReadHandle = ContractHandle;

impl ContractHandle {
    pub fn new(address: Address, provider: DynProvider) -> Self {
        Self {
            contract: PassTheJoint::new(address, provider),
        }
    }

    pub fn address(&self) -> Address {
        *self.contract.address()
    }
}

/// Builds the read-only handle. Connection errors surface on first call.
pub fn bind_read_only(config: &JointConfig) -> ReadHandle {
    let provider = ProviderBuilder::new()
        .connect_http(config.rpc_url.clone())
        .erased();
    tracing::debug!(rpc = %config.rpc_url, "bound read-only contract handle");
    ContractHandle::new(config.contract_address, provider)
}

fn call_err(method: &'static str) -> impl FnOnce(alloy::contract::Error) -> ContractError {
    move |e| ContractError::new(method, e.to_string())
}

impl JointRead for ContractHandle {
    async fn time_until_yoinkable(&self) -> CallResult<U256> {
        self.contract
            .timeUntilYoinkable()
            .call()
            .await
            .map_err(call_err("timeUntilYoinkable"))
    }

    async fn owner_of(&self, token_id: U256) -> CallResult<Address> {
        self.contract
            .ownerOf(token_id)
            .call()
            .await
            .map_err(call_err("ownerOf"))
    }

    async fn balance_of(&self, owner: Address) -> CallResult<U256> {
        self.contract
            .balanceOf(owner)
            .call()
            .await
            .map_err(call_err("balanceOf"))
    }

    async fn token_of_owner_by_index(&self, owner: Address, index: U256) -> CallResult<U256> {
        self.contract
            .tokenOfOwnerByIndex(owner, index)
            .call()
            .await
            .map_err(call_err("tokenOfOwnerByIndex"))
    }

    async fn total_supply(&self) -> CallResult<U256> {
        self.contract
            .totalSupply()
            .call()
            .await
            .map_err(call_err("totalSupply"))
    }

    async fn token_by_index(&self, index: U256) -> CallResult<U256> {
        self.contract
            .tokenByIndex(index)
            .call()
            .await
            .map_err(call_err("tokenByIndex"))
    }

    async fn transfers(&self, filter: TransferFilter) -> CallResult<Vec<TransferRecord>> {
        let mut event = self.contract.Transfer_filter().from_block(filter.from_block);
        if let Some(to) = filter.to {
            event = event.topic2(address_topic(to));
        }
        if let Some(token_id) = filter.token_id {
            event = event.topic3(token_topic(token_id));
        }
        let logs = event
            .query()
            .await
            .map_err(|e| ContractError::new("Transfer", e.to_string()))?;
        Ok(logs
            .into_iter()
            .map(|(transfer, log)| TransferRecord {
                from: transfer.from,
                to: transfer.to,
                token_id: transfer.tokenId,
                block_number: log.block_number,
            })
            .collect())
    }
}

/// Contract binding whose provider carries the wallet's signer.
#[derive(Clone, Debug)]
pub struct SignedContract {
    inner: ContractHandle,
}

impl SignedContract {
    pub fn new(address: Address, signing_provider: DynProvider) -> Self {
        Self {
            inner: ContractHandle::new(address, signing_provider),
        }
    }
}

fn into_receipt(receipt: TransactionReceipt) -> Result<TxReceipt, TxError> {
    if !receipt.status() {
        return Err(TxError::Reverted {
            tx_hash: Some(receipt.transaction_hash),
            reason: "transaction mined with failed status".to_string(),
        });
    }
    Ok(TxReceipt {
        tx_hash: receipt.transaction_hash,
        block_number: receipt.block_number,
        gas_used: receipt.gas_used,
    })
}

impl JointRead for SignedContract {
    fn time_until_yoinkable(&self) -> impl Future<Output = CallResult<U256>> + Send {
        self.inner.time_until_yoinkable()
    }

    fn owner_of(&self, token_id: U256) -> impl Future<Output = CallResult<Address>> + Send {
        self.inner.owner_of(token_id)
    }

    fn balance_of(&self, owner: Address) -> impl Future<Output = CallResult<U256>> + Send {
        self.inner.balance_of(owner)
    }

    fn token_of_owner_by_index(
        &self,
        owner: Address,
        index: U256,
    ) -> impl Future<Output = CallResult<U256>> + Send {
        self.inner.token_of_owner_by_index(owner, index)
    }

    fn total_supply(&self) -> impl Future<Output = CallResult<U256>> + Send {
        self.inner.total_supply()
    }

    fn token_by_index(&self, index: U256) -> impl Future<Output = CallResult<U256>> + Send {
        self.inner.token_by_index(index)
    }

    fn transfers(
        &self,
        filter: TransferFilter,
    ) -> impl Future<Output = CallResult<Vec<TransferRecord>>> + Send {
        self.inner.transfers(filter)
    }
}

impl JointWrite for SignedContract {
    async fn yoink(&self) -> Result<TxReceipt, TxError> {
        let pending = self
            .inner
            .contract
            .yoink()
            .send()
            .await
            .map_err(|e| TxError::from_send_failure(e.to_string()))?;
        tracing::info!(tx = %pending.tx_hash(), "yoink submitted");
        let receipt = pending
            .get_receipt()
            .await
            .map_err(|e| TxError::Transport(e.to_string()))?;
        into_receipt(receipt)
    }

    async fn yoink_to(&self, target: Address) -> Result<TxReceipt, TxError> {
        let pending = self
            .inner
            .contract
            .yoinkTo(target)
            .send()
            .await
            .map_err(|e| TxError::from_send_failure(e.to_string()))?;
        tracing::info!(tx = %pending.tx_hash(), %target, "yoinkTo submitted");
        let receipt = pending
            .get_receipt()
            .await
            .map_err(|e| TxError::Transport(e.to_string()))?;
        into_receipt(receipt)
    }
}

/// Signing handle, valid only for the connection epoch it was bound in.
#[derive(Debug)]
pub struct WriteHandle<W> {
    writer: W,
    account: Address,
    epoch: u64,
    id: u64,
}

impl<W> WriteHandle<W> {
    pub fn writer(&self) -> &W {
        &self.writer
    }

    pub fn account(&self) -> Address {
        self.account
    }

    pub fn epoch(&self) -> u64 {
        self.epoch
    }

    /// Unique per bind; two handles never share an id.
    pub fn id(&self) -> u64 {
        self.id
    }
}

pub fn bind_read_write<P: WalletProvider>(
    wallet: &P,
    connection: &Connection,
    config: &JointConfig,
) -> Result<WriteHandle<P::Writer>, BindError> {
    let ConnectionState::Connected { account, .. } = connection.state else {
        return Err(BindError::NotConnected);
    };
    let writer = wallet.writer(config.contract_address, account)?;
    let id = NEXT_HANDLE_ID.fetch_add(1, Ordering::Relaxed);
    tracing::debug!(%account, epoch = connection.epoch, id, "bound write handle");
    Ok(WriteHandle {
        writer,
        account,
        epoch: connection.epoch,
        id,
    })
}

#[cfg(test)]
mod tests {
    #![allow(non_snake_case)]
    use super::*;
    use crate::{
        error::WalletError,
        test_helpers::{
            ALICE,
            FakeJoint,
            FakeWallet,
            SONIC_CHAIN_ID,
            addr,
            test_config,
        },
    };
    use std::sync::Arc;

    fn connected(epoch: u64) -> Connection {
        Connection {
            state: ConnectionState::Connected {
                account: ALICE,
                chain_id: SONIC_CHAIN_ID,
            },
            epoch,
        }
    }

    #[test]
    fn bind_read_only__targets_configured_contract() {
        let handle = bind_read_only(&test_config());

        assert_eq!(handle.address(), addr(0xc0));
    }

    #[test]
    fn bind_read_write__requires_connected_state() {
        let wallet = FakeWallet::new(ALICE, SONIC_CHAIN_ID, Arc::new(FakeJoint::new()));

        let err = bind_read_write(&wallet, &Connection::default(), &test_config()).err().unwrap();

        assert_eq!(err, BindError::NotConnected);
    }

    #[test]
    fn bind_read_write__stamps_epoch_and_fresh_id() {
        let wallet = FakeWallet::new(ALICE, SONIC_CHAIN_ID, Arc::new(FakeJoint::new()));

        let first = bind_read_write(&wallet, &connected(3), &test_config()).unwrap();
        let second = bind_read_write(&wallet, &connected(3), &test_config()).unwrap();

        assert_eq!(first.epoch(), 3);
        assert_eq!(first.account(), ALICE);
        assert_ne!(first.id(), second.id());
    }

    #[test]
    fn bind_read_write__surfaces_signer_failure() {
        // given
        let wallet = FakeWallet::new(ALICE, SONIC_CHAIN_ID, Arc::new(FakeJoint::new()));
        let locked = WalletError::Unavailable("wallet is locked".into());
        wallet.fail_writer(locked.clone());

        // when
        let err = bind_read_write(&wallet, &connected(1), &test_config()).err().unwrap();

        // then
        assert_eq!(err, BindError::Wallet(locked));
    }
}
