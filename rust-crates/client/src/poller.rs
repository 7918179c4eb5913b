//! Periodic contract reads published as wholesale snapshots.

use crate::{
    contract::JointRead,
    error::PollError,
};
use alloy::primitives::{
    Address,
    U256,
};
use chrono::{
    DateTime,
    Utc,
};
use futures::future::try_join_all;
use joint_abi::JOINT_TOKEN_ID;
use serde::Serialize;
use std::{
    sync::{
        Arc,
        Mutex,
        PoisonError,
    },
    time::Duration,
};
use tokio::{
    sync::{
        mpsc,
        watch,
    },
    task::JoinHandle,
    time::{
        self,
        MissedTickBehavior,
    },
};
use tracing::{
    debug,
    warn,
};

pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(1000);
/// Shorter intervals are raised to this; a zero period would kill the worker.
pub const MIN_POLL_INTERVAL: Duration = Duration::from_millis(1);

#[derive(Clone, Debug, Eq, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenOwner {
    pub index: u64,
    pub token_id: U256,
    pub owner: Address,
}

/// One consistent view of the contract; replaced as a unit.
#[derive(Clone, Debug, Eq, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Snapshot {
    pub cooldown_secs: u64,
    /// Owner of the joint (token 0).
    pub holder: Address,
    /// Descending by enumeration index.
    pub tokens: Vec<TokenOwner>,
    pub observed_at: DateTime<Utc>,
}

impl Snapshot {
    pub fn is_yoinkable(&self) -> bool {
        self.cooldown_secs == 0
    }

    pub fn is_held_by(&self, account: Address) -> bool {
        self.holder == account
    }

    pub fn owned_by(&self, account: Address) -> impl Iterator<Item = &TokenOwner> {
        self.tokens.iter().filter(move |t| t.owner == account)
    }
}

fn to_count(value: U256, what: &str) -> Result<u64, PollError> {
    u64::try_from(value)
        .map_err(|_| PollError::Malformed(format!("{what} {value} does not fit in u64")))
}

/// Reads cooldown, holder and the full token set concurrently.
/// Any failing read discards the whole poll.
pub async fn poll_once<R: JointRead>(reader: &R) -> Result<Snapshot, PollError> {
    let (cooldown, holder, tokens) = tokio::try_join!(
        async { Ok::<_, PollError>(reader.time_until_yoinkable().await?) },
        async { Ok::<_, PollError>(reader.owner_of(JOINT_TOKEN_ID).await?) },
        enumerate_tokens(reader),
    )?;
    Ok(Snapshot {
        cooldown_secs: u64::try_from(cooldown).unwrap_or(u64::MAX),
        holder,
        tokens,
        observed_at: Utc::now(),
    })
}

async fn enumerate_tokens<R: JointRead>(reader: &R) -> Result<Vec<TokenOwner>, PollError> {
    let supply = to_count(reader.total_supply().await?, "total supply")?;
    let lookups = (0..supply).rev().map(|index| async move {
        let token_id = reader.token_by_index(U256::from(index)).await?;
        let owner = reader.owner_of(token_id).await?;
        Ok::<_, PollError>(TokenOwner {
            index,
            token_id,
            owner,
        })
    });
    try_join_all(lookups).await
}

/// Token ids held by `account`, in owner-index order.
pub async fn owned_tokens<R: JointRead>(
    reader: &R,
    account: Address,
) -> Result<Vec<U256>, PollError> {
    let balance = to_count(reader.balance_of(account).await?, "balance")?;
    let lookups =
        (0..balance).map(|i| reader.token_of_owner_by_index(account, U256::from(i)));
    Ok(try_join_all(lookups).await?)
}

/// Latest published snapshot, `None` until the first successful poll.
#[derive(Clone, Debug)]
pub struct SnapshotStore {
    tx: Arc<watch::Sender<Option<Arc<Snapshot>>>>,
}

impl Default for SnapshotStore {
    fn default() -> Self {
        Self::new()
    }
}

impl SnapshotStore {
    pub fn new() -> Self {
        let (tx, _) = watch::channel(None);
        Self { tx: Arc::new(tx) }
    }

    pub fn latest(&self) -> Option<Arc<Snapshot>> {
        self.tx.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<Option<Arc<Snapshot>>> {
        self.tx.subscribe()
    }

    fn publish(&self, snapshot: Snapshot) {
        self.tx.send_replace(Some(Arc::new(snapshot)));
    }
}

enum PollCommand {
    FetchNow,
}

/// Owns the poll worker. Dropping the handle stops polling.
pub struct PollHandle {
    commands: mpsc::UnboundedSender<PollCommand>,
    // `true` while results may be published; held for the duration of a publish
    running: Arc<Mutex<bool>>,
    task: JoinHandle<()>,
}

impl PollHandle {
    /// Queue one immediate poll.
    pub fn refresh_now(&self) {
        let _ = self.commands.send(PollCommand::FetchNow);
    }

    /// After this returns no poll starts and nothing more is published.
    pub fn stop(&self) {
        let mut running = self.running.lock().unwrap_or_else(PoisonError::into_inner);
        if *running {
            *running = false;
            debug!("poller stopped");
        }
        self.task.abort();
    }

    pub fn is_running(&self) -> bool {
        *self.running.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Drop for PollHandle {
    fn drop(&mut self) {
        self.stop();
    }
}

pub fn start_polling<R: JointRead + 'static>(
    reader: Arc<R>,
    interval: Duration,
    store: SnapshotStore,
) -> PollHandle {
    if interval < MIN_POLL_INTERVAL {
        warn!(?interval, min = ?MIN_POLL_INTERVAL, "poll interval too short, clamping");
    }
    let interval = interval.max(MIN_POLL_INTERVAL);
    let (commands, command_rx) = mpsc::unbounded_channel();
    let running = Arc::new(Mutex::new(true));
    let task = tokio::spawn(poll_worker(
        reader,
        interval,
        store,
        command_rx,
        running.clone(),
    ));
    PollHandle {
        commands,
        running,
        task,
    }
}

async fn poll_worker<R: JointRead>(
    reader: Arc<R>,
    interval: Duration,
    store: SnapshotStore,
    mut commands: mpsc::UnboundedReceiver<PollCommand>,
    running: Arc<Mutex<bool>>,
) {
    let is_running = || *running.lock().unwrap_or_else(PoisonError::into_inner);
    let mut ticker = time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            biased;
            cmd = commands.recv() => match cmd {
                Some(PollCommand::FetchNow) => debug!("refresh requested"),
                None => break,
            },
            _ = ticker.tick() => {}
        }
        if !is_running() {
            break;
        }
        let result = poll_once(reader.as_ref()).await;
        {
            let open = running.lock().unwrap_or_else(PoisonError::into_inner);
            if !*open {
                break;
            }
            match result {
                Ok(snapshot) => store.publish(snapshot),
                Err(err) => warn!(%err, "poll failed, keeping previous snapshot"),
            }
        }
    }
}
