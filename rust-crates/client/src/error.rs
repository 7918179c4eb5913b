use crate::submitter::TxSlot;
use alloy::primitives::B256;

/// Failure of a single contract read.
#[derive(Clone, Debug, Eq, PartialEq, thiserror::Error)]
#[error("{method} failed: {message}")]
pub struct ContractError {
    pub method: &'static str,
    pub message: String,
}

impl ContractError {
    pub fn new(method: &'static str, message: impl Into<String>) -> Self {
        Self {
            method,
            message: message.into(),
        }
    }
}

/// Failure reported by the wallet provider itself.
#[derive(Clone, Debug, Eq, PartialEq, thiserror::Error)]
pub enum WalletError {
    #[error("request rejected by the user: {0}")]
    Rejected(String),
    #[error("wallet unavailable: {0}")]
    Unavailable(String),
    #[error("wallet RPC failure: {0}")]
    Rpc(String),
}

#[derive(Clone, Debug, Eq, PartialEq, thiserror::Error)]
pub enum ConnectError {
    #[error("configuration data is missing")]
    ConfigMissing,
    #[error("no wallet provider detected")]
    NoWalletProvider,
    #[error("wallet authorization rejected by the user")]
    UserRejected,
    #[error("please connect to the {name} network (expected chain {expected}, wallet is on {actual})")]
    WrongNetwork {
        expected: u64,
        actual: u64,
        name: String,
    },
    #[error("failed to connect to the blockchain: {0}")]
    Provider(String),
}

impl From<WalletError> for ConnectError {
    fn from(err: WalletError) -> Self {
        match err {
            WalletError::Rejected(_) => ConnectError::UserRejected,
            WalletError::Unavailable(msg) | WalletError::Rpc(msg) => {
                ConnectError::Provider(msg)
            }
        }
    }
}

#[derive(Clone, Debug, Eq, PartialEq, thiserror::Error)]
pub enum BindError {
    #[error("wallet is not connected")]
    NotConnected,
    #[error("wallet could not produce a signer: {0}")]
    Wallet(#[from] WalletError),
}

#[derive(Clone, Debug, Eq, PartialEq, thiserror::Error)]
pub enum PollError {
    #[error(transparent)]
    Contract(#[from] ContractError),
    #[error("unexpected contract value: {0}")]
    Malformed(String),
}

#[derive(Clone, Debug, Eq, PartialEq, thiserror::Error)]
pub enum TxError {
    #[error("wallet is not connected")]
    NotConnected,
    #[error("invalid address `{0}`")]
    InvalidAddress(String),
    #[error("a {0} transaction is already pending")]
    AlreadyPending(TxSlot),
    #[error("transaction rejected: {0}")]
    Rejected(String),
    #[error("transaction reverted{}: {reason}", tx_suffix(.tx_hash))]
    Reverted {
        tx_hash: Option<B256>,
        reason: String,
    },
    #[error("transaction failed: {0}")]
    Transport(String),
    #[error("wallet cannot sign: {0}")]
    Signer(String),
}

impl From<BindError> for TxError {
    fn from(err: BindError) -> Self {
        match err {
            BindError::NotConnected => TxError::NotConnected,
            BindError::Wallet(inner) => TxError::Signer(inner.to_string()),
        }
    }
}

fn tx_suffix(tx_hash: &Option<B256>) -> String {
    tx_hash.map(|h| format!(" ({h})")).unwrap_or_default()
}

impl TxError {
    /// Classify an error message from the transport or signer.
    pub fn from_send_failure(message: impl Into<String>) -> Self {
        let message = message.into();
        let lowered = message.to_ascii_lowercase();
        if lowered.contains("revert") {
            TxError::Reverted {
                tx_hash: None,
                reason: message,
            }
        } else if lowered.contains("user rejected") || lowered.contains("user denied") {
            TxError::Rejected(message)
        } else {
            TxError::Transport(message)
        }
    }
}
