use crate::{
    contract::JointWrite,
    error::WalletError,
};
use alloy::primitives::Address;
use std::future::Future;
use tokio::sync::broadcast;

/// Notifications pushed by the wallet outside of any request.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum WalletEvent {
    AccountsChanged(Vec<Address>),
    ChainChanged(u64),
}

/// The wallet the user brings: authorizes accounts, reports its chain and signs.
pub trait WalletProvider: Send + Sync + 'static {
    type Writer: JointWrite + 'static;

    /// Ask the user to authorize access; may be interactive.
    fn request_accounts(
        &self,
    ) -> impl Future<Output = Result<Vec<Address>, WalletError>> + Send;

    fn chain_id(&self) -> impl Future<Output = Result<u64, WalletError>> + Send;

    /// Event feed shared by every subscriber for the lifetime of the provider.
    fn subscribe(&self) -> broadcast::Receiver<WalletEvent>;

    /// Signing contract binding for `account`.
    fn writer(&self, contract: Address, account: Address) -> Result<Self::Writer, WalletError>;
}
