pub mod binding;
pub mod connector;
pub mod contract;
pub mod error;
pub mod history;
pub mod poller;
pub mod session;
pub mod submitter;
pub mod wallet;
pub mod wallets;

#[cfg(any(test, feature = "test-helpers"))]
pub mod test_helpers;

pub use binding::{
    ReadHandle,
    WriteHandle,
    bind_read_only,
    bind_read_write,
};
pub use connector::{
    Connection,
    ConnectionState,
    WalletConnector,
};
pub use contract::{
    JointRead,
    JointWrite,
    TxReceipt,
};
pub use error::{
    BindError,
    ConnectError,
    PollError,
    TxError,
    WalletError,
};
pub use joint_config::{
    ConfigOverrides,
    ConfigSource,
    JointConfig,
    load_config,
};
pub use poller::{
    Snapshot,
    poll_once,
};
pub use session::JointSession;
pub use submitter::{
    PendingTx,
    TxKind,
    TxSlot,
};
pub use wallet::{
    WalletEvent,
    WalletProvider,
};
