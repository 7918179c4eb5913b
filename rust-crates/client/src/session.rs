//! Everything a front end needs, wired together.
//!
//! The session owns the connector, the read handle, the poller and the
//! submitter. A reconcile task watches the connection and, on every epoch
//! change, drops the memoized write handle and clears pending transactions.

use crate::{
    binding::{
        WriteHandle,
        bind_read_write,
    },
    connector::{
        Connection,
        ConnectionState,
        WalletConnector,
    },
    contract::{
        JointRead,
        TxReceipt,
    },
    error::{
        BindError,
        ConnectError,
        PollError,
        TxError,
    },
    history::{
        PastHolder,
        holder_history,
    },
    poller::{
        PollHandle,
        Snapshot,
        SnapshotStore,
        owned_tokens,
        start_polling,
    },
    submitter::{
        PendingTx,
        TxKind,
        TxSlot,
        TxSubmitter,
    },
    wallet::WalletProvider,
};
use alloy::primitives::{
    Address,
    U256,
};
use joint_config::JointConfig;
use std::{
    sync::{
        Arc,
        Mutex,
        PoisonError,
    },
    time::Duration,
};
use tokio::{
    sync::watch,
    task::JoinHandle,
};

/// Write handle memo plus the last connection epoch dependent state was reset for.
struct Reconciled<W> {
    epoch: u64,
    handle: Option<Arc<WriteHandle<W>>>,
}

type WriteMemo<W> = Arc<Mutex<Reconciled<W>>>;

/// Drops the handle and clears pending flags once per newer epoch.
fn reconcile<W>(state: &mut Reconciled<W>, epoch: u64, submitter: &TxSubmitter) {
    if epoch > state.epoch {
        state.epoch = epoch;
        state.handle = None;
        submitter.reset();
        tracing::debug!(epoch, "connection changed, dropped write handle and pending flags");
    }
}

pub struct JointSession<P: WalletProvider, R> {
    config: Arc<JointConfig>,
    connector: WalletConnector<P>,
    reader: Arc<R>,
    store: SnapshotStore,
    poller: PollHandle,
    submitter: Arc<TxSubmitter>,
    write: WriteMemo<P::Writer>,
    reconcile: JoinHandle<()>,
}

impl<P, R> JointSession<P, R>
where
    P: WalletProvider,
    R: JointRead + 'static,
{
    /// Starts polling right away; must be called inside a tokio runtime.
    pub fn new(
        config: Arc<JointConfig>,
        wallet: Option<Arc<P>>,
        reader: Arc<R>,
        poll_interval: Duration,
    ) -> Self {
        let connector = WalletConnector::new(wallet, Some(config.clone()));
        let store = SnapshotStore::new();
        let poller = start_polling(reader.clone(), poll_interval, store.clone());
        let submitter = Arc::new(TxSubmitter::new());
        let write: WriteMemo<P::Writer> = Arc::new(Mutex::new(Reconciled {
            epoch: 0,
            handle: None,
        }));
        let reconcile = tokio::spawn(reconcile_on_epoch_change(
            connector.subscribe(),
            write.clone(),
            submitter.clone(),
        ));
        Self {
            config,
            connector,
            reader,
            store,
            poller,
            submitter,
            write,
            reconcile,
        }
    }

    pub fn config(&self) -> &JointConfig {
        &self.config
    }

    pub fn connector(&self) -> &WalletConnector<P> {
        &self.connector
    }

    pub fn reader(&self) -> &Arc<R> {
        &self.reader
    }

    pub async fn connect(&self) -> Result<ConnectionState, ConnectError> {
        self.connector.connect().await
    }

    pub fn connection(&self) -> Connection {
        self.connector.current()
    }

    pub fn watch_connection(&self) -> watch::Receiver<Connection> {
        self.connector.subscribe()
    }

    pub fn snapshot(&self) -> Option<Arc<Snapshot>> {
        self.store.latest()
    }

    pub fn watch_snapshot(&self) -> watch::Receiver<Option<Arc<Snapshot>>> {
        self.store.subscribe()
    }

    pub fn refresh_now(&self) {
        self.poller.refresh_now();
    }

    /// The write handle for the current epoch, bound on first use.
    pub fn write_handle(&self) -> Result<Arc<WriteHandle<P::Writer>>, BindError> {
        let connection = self.connector.current();
        let mut memo = self.write.lock().unwrap_or_else(PoisonError::into_inner);
        reconcile(&mut memo, connection.epoch, &self.submitter);
        if let Some(handle) = memo.handle.as_ref().filter(|h| h.epoch() == connection.epoch) {
            return Ok(handle.clone());
        }
        let wallet = self.connector.wallet().ok_or(BindError::NotConnected)?;
        let handle = Arc::new(bind_read_write(wallet.as_ref(), &connection, &self.config)?);
        if memo.epoch == connection.epoch {
            memo.handle = Some(handle.clone());
        }
        Ok(handle)
    }

    /// Sends the transaction and, once it is mined, polls once more.
    pub async fn submit(&self, kind: TxKind) -> Result<TxReceipt, TxError> {
        let handle = self.write_handle()?;
        let receipt = self.submitter.submit(kind, &handle).await?;
        self.poller.refresh_now();
        Ok(receipt)
    }

    pub fn pending(&self, slot: TxSlot) -> PendingTx {
        self.submitter.status(slot)
    }

    pub async fn holder_history(&self) -> Result<Vec<PastHolder>, PollError> {
        holder_history(self.reader.as_ref(), &self.config).await
    }

    pub async fn owned_tokens(&self, account: Address) -> Result<Vec<U256>, PollError> {
        owned_tokens(self.reader.as_ref(), account).await
    }

    pub fn shutdown(&self) {
        self.poller.stop();
        self.reconcile.abort();
        tracing::info!("session shut down");
    }
}

impl<P: WalletProvider, R> Drop for JointSession<P, R> {
    fn drop(&mut self) {
        self.reconcile.abort();
    }
}

async fn reconcile_on_epoch_change<W>(
    mut connection: watch::Receiver<Connection>,
    write: WriteMemo<W>,
    submitter: Arc<TxSubmitter>,
) {
    while connection.changed().await.is_ok() {
        let epoch = connection.borrow_and_update().epoch;
        let mut memo = write.lock().unwrap_or_else(PoisonError::into_inner);
        reconcile(&mut memo, epoch, &submitter);
    }
}
