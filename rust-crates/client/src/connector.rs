//! Wallet connection state machine.
//!
//! The connector is the only writer of [`Connection`]; everyone else observes it
//! through a `watch` receiver. Connect cycles and wallet events are serialized
//! by one mutex so the state never interleaves two transitions.

use crate::{
    error::ConnectError,
    wallet::{
        WalletEvent,
        WalletProvider,
    },
};
use alloy::primitives::Address;
use joint_config::JointConfig;
use serde::Serialize;
use std::sync::{
    Arc,
    Weak,
    atomic::{
        AtomicBool,
        Ordering,
    },
};
use tokio::sync::{
    Mutex,
    broadcast::error::RecvError,
    watch,
};
use tracing::{
    info,
    warn,
};

pub const LOCKED_REASON: &str = "wallet locked or disconnected";

#[derive(Clone, Debug, Default, Eq, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "camelCase")]
pub enum ConnectionState {
    #[default]
    Disconnected,
    Connecting,
    #[serde(rename_all = "camelCase")]
    Connected { account: Address, chain_id: u64 },
    Failed { reason: String },
}

impl ConnectionState {
    pub fn account(&self) -> Option<Address> {
        match self {
            ConnectionState::Connected { account, .. } => Some(*account),
            _ => None,
        }
    }

    pub fn is_connected(&self) -> bool {
        matches!(self, ConnectionState::Connected { .. })
    }
}

/// Connection state tagged with the number of transitions so far.
#[derive(Clone, Debug, Default, Eq, PartialEq, Serialize)]
pub struct Connection {
    pub state: ConnectionState,
    pub epoch: u64,
}

struct Inner<P> {
    wallet: Option<Arc<P>>,
    config: Option<Arc<JointConfig>>,
    connection: watch::Sender<Connection>,
    cycle: Mutex<()>,
    listening: AtomicBool,
}

pub struct WalletConnector<P> {
    inner: Arc<Inner<P>>,
}

impl<P> Clone for WalletConnector<P> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<P: WalletProvider> WalletConnector<P> {
    pub fn new(wallet: Option<Arc<P>>, config: Option<Arc<JointConfig>>) -> Self {
        let (connection, _) = watch::channel(Connection::default());
        Self {
            inner: Arc::new(Inner {
                wallet,
                config,
                connection,
                cycle: Mutex::new(()),
                listening: AtomicBool::new(false),
            }),
        }
    }

    pub fn wallet(&self) -> Option<&Arc<P>> {
        self.inner.wallet.as_ref()
    }

    pub fn current(&self) -> Connection {
        self.inner.connection.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<Connection> {
        self.inner.connection.subscribe()
    }

    /// Request account access and validate the network.
    ///
    /// A no-op when already connected. Concurrent callers are serialized and
    /// the later one observes the earlier one's result.
    pub async fn connect(&self) -> Result<ConnectionState, ConnectError> {
        let _cycle = self.inner.cycle.lock().await;
        self.connect_cycle().await
    }

    /// Reconcile an unsolicited wallet notification.
    ///
    /// Returns the state after reconciliation; a chain change yields the
    /// outcome of the reconnect it triggers.
    pub async fn handle_event(&self, event: WalletEvent) -> Result<ConnectionState, ConnectError> {
        let _cycle = self.inner.cycle.lock().await;
        let current = self.current().state;
        match event {
            WalletEvent::AccountsChanged(accounts) => {
                match (accounts.first(), &current) {
                    (None, ConnectionState::Failed { reason }) if reason == LOCKED_REASON => {}
                    (None, _) => {
                        info!("wallet reported no accounts");
                        self.transition(ConnectionState::Failed {
                            reason: LOCKED_REASON.to_string(),
                        });
                    }
                    (Some(&next), ConnectionState::Connected { account, chain_id })
                        if next != *account =>
                    {
                        info!(from = %account, to = %next, "wallet account changed");
                        self.transition(ConnectionState::Connected {
                            account: next,
                            chain_id: *chain_id,
                        });
                    }
                    _ => {}
                }
                Ok(self.current().state)
            }
            WalletEvent::ChainChanged(chain_id) => {
                info!(chain_id, "wallet chain changed, reconnecting");
                self.transition(ConnectionState::Disconnected);
                self.connect_cycle().await
            }
        }
    }

    async fn connect_cycle(&self) -> Result<ConnectionState, ConnectError> {
        let current = self.current().state;
        if current.is_connected() {
            return Ok(current);
        }
        let Some(config) = self.inner.config.clone() else {
            return Err(self.fail(ConnectError::ConfigMissing));
        };
        let Some(wallet) = self.inner.wallet.clone() else {
            return Err(self.fail(ConnectError::NoWalletProvider));
        };

        self.transition(ConnectionState::Connecting);
        match authorize(wallet.as_ref(), &config).await {
            Ok((account, chain_id)) => {
                let state = ConnectionState::Connected { account, chain_id };
                self.transition(state.clone());
                info!(%account, chain_id, "wallet connected");
                self.ensure_listener(&wallet);
                Ok(state)
            }
            Err(err) => Err(self.fail(err)),
        }
    }

    fn fail(&self, err: ConnectError) -> ConnectError {
        warn!(%err, "wallet connection failed");
        self.transition(ConnectionState::Failed {
            reason: err.to_string(),
        });
        err
    }

    fn transition(&self, state: ConnectionState) {
        self.inner.connection.send_modify(|connection| {
            connection.state = state;
            connection.epoch += 1;
        });
    }

    /// Registers the wallet event listener the first time a connect succeeds.
    fn ensure_listener(&self, wallet: &Arc<P>) {
        if self.inner.listening.swap(true, Ordering::SeqCst) {
            return;
        }
        let mut events = wallet.subscribe();
        let connector: Weak<Inner<P>> = Arc::downgrade(&self.inner);
        tokio::spawn(async move {
            loop {
                match events.recv().await {
                    Ok(event) => {
                        let Some(inner) = connector.upgrade() else {
                            break;
                        };
                        let connector = WalletConnector { inner };
                        if let Err(err) = connector.handle_event(event).await {
                            warn!(%err, "reconnect after wallet event failed");
                        }
                    }
                    Err(RecvError::Lagged(skipped)) => {
                        warn!(skipped, "wallet event listener lagged");
                    }
                    Err(RecvError::Closed) => break,
                }
            }
            tracing::debug!("wallet event listener stopped");
        });
    }
}

async fn authorize<P: WalletProvider>(
    wallet: &P,
    config: &JointConfig,
) -> Result<(Address, u64), ConnectError> {
    let accounts = wallet.request_accounts().await?;
    let Some(&account) = accounts.first() else {
        return Err(ConnectError::UserRejected);
    };
    let chain_id = wallet.chain_id().await?;
    if chain_id != config.network.id {
        return Err(ConnectError::WrongNetwork {
            expected: config.network.id,
            actual: chain_id,
            name: config.network.name.clone(),
        });
    }
    Ok((account, chain_id))
}

#[cfg(test)]
mod tests {
    #![allow(non_snake_case)]
    use super::*;
    use crate::{
        error::WalletError,
        test_helpers::{
            FakeJoint,
            FakeWallet,
            SONIC_CHAIN_ID,
            addr,
            test_config,
        },
    };
    use std::time::Duration;

    fn connector_for(wallet: FakeWallet) -> (WalletConnector<FakeWallet>, Arc<FakeWallet>) {
        let wallet = Arc::new(wallet);
        let connector =
            WalletConnector::new(Some(wallet.clone()), Some(Arc::new(test_config())));
        (connector, wallet)
    }

    fn fake_wallet(account: Address) -> FakeWallet {
        FakeWallet::new(account, SONIC_CHAIN_ID, Arc::new(FakeJoint::new()))
    }

    #[tokio::test]
    async fn connect__happy_path_uses_first_account() {
        // given
        let wallet = fake_wallet(addr(0xaa));
        wallet.set_accounts(Ok(vec![addr(0xaa), addr(0xbb)]));
        let (connector, _) = connector_for(wallet);

        // when
        let state = connector.connect().await.unwrap();

        // then
        assert_eq!(
            state,
            ConnectionState::Connected {
                account: addr(0xaa),
                chain_id: SONIC_CHAIN_ID
            }
        );
        assert_eq!(connector.current().state, state);
    }

    #[tokio::test]
    async fn connect__already_connected_is_a_no_op() {
        // given
        let (connector, wallet) = connector_for(fake_wallet(addr(0xaa)));
        connector.connect().await.unwrap();
        let epoch = connector.current().epoch;

        // when
        connector.connect().await.unwrap();

        // then
        assert_eq!(wallet.request_count(), 1);
        assert_eq!(connector.current().epoch, epoch);
    }

    #[tokio::test]
    async fn connect__wrong_network_fails_with_network_name() {
        // given
        let wallet = fake_wallet(addr(0xaa));
        wallet.set_chain_id(1);
        let (connector, _) = connector_for(wallet);

        // when
        let err = connector.connect().await.unwrap_err();

        // then
        assert_eq!(
            err,
            ConnectError::WrongNetwork {
                expected: SONIC_CHAIN_ID,
                actual: 1,
                name: "Sonic".to_string()
            }
        );
        assert!(matches!(
            connector.current().state,
            ConnectionState::Failed { reason } if reason.contains("Sonic")
        ));
    }

    #[tokio::test]
    async fn connect__empty_account_list_is_a_rejection() {
        let wallet = fake_wallet(addr(0xaa));
        wallet.set_accounts(Ok(vec![]));
        let (connector, _) = connector_for(wallet);

        let err = connector.connect().await.unwrap_err();

        assert_eq!(err, ConnectError::UserRejected);
    }

    #[tokio::test]
    async fn connect__provider_failure_is_reported() {
        let wallet = fake_wallet(addr(0xaa));
        wallet.set_accounts(Err(WalletError::Rpc("connection refused".into())));
        let (connector, _) = connector_for(wallet);

        let err = connector.connect().await.unwrap_err();

        assert_eq!(err, ConnectError::Provider("connection refused".into()));
    }

    #[tokio::test]
    async fn connect__missing_config_or_wallet() {
        let no_config: WalletConnector<FakeWallet> =
            WalletConnector::new(Some(Arc::new(fake_wallet(addr(0xaa)))), None);
        let no_wallet: WalletConnector<FakeWallet> =
            WalletConnector::new(None, Some(Arc::new(test_config())));

        assert_eq!(
            no_config.connect().await.unwrap_err(),
            ConnectError::ConfigMissing
        );
        assert_eq!(
            no_wallet.connect().await.unwrap_err(),
            ConnectError::NoWalletProvider
        );
    }

    #[tokio::test(start_paused = true)]
    async fn connect__concurrent_calls_share_one_authorization() {
        // given
        let wallet = fake_wallet(addr(0xaa));
        wallet.set_request_delay(Duration::from_millis(500));
        let (connector, wallet) = connector_for(wallet);

        // when
        let (first, second) = tokio::join!(connector.connect(), connector.connect());

        // then
        assert_eq!(first.unwrap(), second.unwrap());
        assert_eq!(wallet.request_count(), 1);
    }

    #[tokio::test]
    async fn handle_event__account_change_updates_connected_account() {
        // given
        let (connector, _) = connector_for(fake_wallet(addr(0xaa)));
        connector.connect().await.unwrap();

        // when
        let state = connector
            .handle_event(WalletEvent::AccountsChanged(vec![addr(0xbb)]))
            .await
            .unwrap();

        // then
        assert_eq!(state.account(), Some(addr(0xbb)));
    }

    #[tokio::test]
    async fn handle_event__empty_accounts_marks_wallet_locked() {
        // given
        let (connector, _) = connector_for(fake_wallet(addr(0xaa)));
        connector.connect().await.unwrap();

        // when
        let state = connector
            .handle_event(WalletEvent::AccountsChanged(vec![]))
            .await
            .unwrap();

        // then
        assert_eq!(
            state,
            ConnectionState::Failed {
                reason: LOCKED_REASON.to_string()
            }
        );
    }

    #[tokio::test]
    async fn handle_event__accounts_while_disconnected_are_ignored() {
        let (connector, _) = connector_for(fake_wallet(addr(0xaa)));

        let state = connector
            .handle_event(WalletEvent::AccountsChanged(vec![addr(0xbb)]))
            .await
            .unwrap();

        assert_eq!(state, ConnectionState::Disconnected);
        assert_eq!(connector.current().epoch, 0);
    }

    #[tokio::test]
    async fn handle_event__chain_change_reconnects_under_new_epoch() {
        // given
        let (connector, wallet) = connector_for(fake_wallet(addr(0xaa)));
        connector.connect().await.unwrap();
        let before = connector.current().epoch;

        // when
        let state = connector
            .handle_event(WalletEvent::ChainChanged(SONIC_CHAIN_ID))
            .await
            .unwrap();

        // then
        assert!(state.is_connected());
        assert!(connector.current().epoch > before);
        assert_eq!(wallet.request_count(), 2);
    }

    #[tokio::test]
    async fn handle_event__chain_change_to_wrong_network_fails() {
        // given
        let (connector, wallet) = connector_for(fake_wallet(addr(0xaa)));
        connector.connect().await.unwrap();
        wallet.set_chain_id(1);

        // when
        let result = connector.handle_event(WalletEvent::ChainChanged(1)).await;

        // then
        assert!(matches!(result, Err(ConnectError::WrongNetwork { .. })));
        assert!(matches!(
            connector.current().state,
            ConnectionState::Failed { .. }
        ));
    }

    #[tokio::test]
    async fn listener__forwards_wallet_events_after_connect() {
        // given
        let (connector, wallet) = connector_for(fake_wallet(addr(0xaa)));
        connector.connect().await.unwrap();
        let mut updates = connector.subscribe();

        // when
        wallet.emit(WalletEvent::AccountsChanged(vec![]));
        updates.changed().await.unwrap();

        // then
        assert_eq!(
            updates.borrow().state,
            ConnectionState::Failed {
                reason: LOCKED_REASON.to_string()
            }
        );
    }

    #[test]
    fn connection_state__serializes_with_status_tag() {
        let state = ConnectionState::Connected {
            account: addr(0xaa),
            chain_id: 146,
        };

        let json = serde_json::to_value(&state).unwrap();

        assert_eq!(json["status"], "connected");
        assert_eq!(json["chainId"], 146);
    }
}
