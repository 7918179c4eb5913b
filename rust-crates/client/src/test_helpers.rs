use crate::{
    contract::{
        CallResult,
        JointRead,
        JointWrite,
        TransferFilter,
        TransferRecord,
        TxReceipt,
    },
    error::{
        ContractError,
        TxError,
        WalletError,
    },
    session::JointSession,
    wallet::{
        WalletEvent,
        WalletProvider,
    },
};
use alloy::primitives::{
    Address,
    B256,
    U256,
};
use joint_config::{
    DisplayFlags,
    JointConfig,
    NetworkConfig,
};
use std::{
    collections::{
        HashMap,
        HashSet,
    },
    sync::{
        Arc,
        Mutex,
        atomic::{
            AtomicU64,
            AtomicUsize,
            Ordering,
        },
    },
    time::Duration,
};
use tokio::sync::{
    broadcast,
    watch,
};

pub const SONIC_CHAIN_ID: u64 = 146;
pub const DEFAULT_HOLDER: Address = Address::repeat_byte(0x11);

pub fn addr(byte: u8) -> Address {
    Address::repeat_byte(byte)
}

pub fn test_config() -> JointConfig {
    JointConfig {
        contract_address: addr(0xc0),
        network: NetworkConfig {
            id: SONIC_CHAIN_ID,
            name: "Sonic".to_string(),
            symbol: Some("S".to_string()),
        },
        rpc_url: "http://127.0.0.1:8545".parse().unwrap(),
        deployment_block: 100,
        display: DisplayFlags {
            show_background: true,
        },
    }
}

/// Open/closed gate that async calls wait on.
struct Gate(watch::Sender<bool>);

impl Gate {
    fn open() -> Self {
        Self(watch::channel(true).0)
    }

    fn set(&self, open: bool) {
        self.0.send_replace(open);
    }

    async fn pass(&self) {
        let mut rx = self.0.subscribe();
        let _ = rx.wait_for(|open| *open).await;
    }
}

#[derive(Default)]
struct ChainState {
    cooldown: U256,
    owners: HashMap<U256, Address>,
    by_index: Vec<U256>,
    supply_override: Option<U256>,
    transfers: Vec<TransferRecord>,
    failing: HashSet<&'static str>,
    next_tx_failure: Option<TxError>,
    tx_count: u64,
}

/// In-memory contract. Token 0 starts out owned by [`DEFAULT_HOLDER`].
pub struct FakeJoint {
    state: Mutex<ChainState>,
    calls: Mutex<HashMap<&'static str, usize>>,
    reads: Gate,
    writes: Gate,
}

impl Default for FakeJoint {
    fn default() -> Self {
        Self::new()
    }
}

impl FakeJoint {
    pub fn new() -> Self {
        let mut state = ChainState::default();
        state.owners.insert(U256::ZERO, DEFAULT_HOLDER);
        state.by_index.push(U256::ZERO);
        Self {
            state: Mutex::new(state),
            calls: Mutex::new(HashMap::new()),
            reads: Gate::open(),
            writes: Gate::open(),
        }
    }

    pub fn set_cooldown(&self, seconds: U256) {
        self.state.lock().unwrap().cooldown = seconds;
    }

    pub fn set_holder(&self, holder: Address) {
        self.state.lock().unwrap().owners.insert(U256::ZERO, holder);
    }

    /// Replaces the enumeration with `tokens` in index order.
    pub fn set_tokens(&self, tokens: &[(u64, Address)]) {
        let mut state = self.state.lock().unwrap();
        state.by_index.clear();
        for (token_id, owner) in tokens {
            let token_id = U256::from(*token_id);
            state.owners.insert(token_id, *owner);
            state.by_index.push(token_id);
        }
    }

    pub fn set_total_supply(&self, supply: U256) {
        self.state.lock().unwrap().supply_override = Some(supply);
    }

    pub fn push_transfer(&self, from: Address, to: Address, token_id: u64, block: u64) {
        self.state.lock().unwrap().transfers.push(TransferRecord {
            from,
            to,
            token_id: U256::from(token_id),
            block_number: Some(block),
        });
    }

    pub fn fail(&self, method: &'static str) {
        self.state.lock().unwrap().failing.insert(method);
    }

    pub fn recover(&self, method: &'static str) {
        self.state.lock().unwrap().failing.remove(method);
    }

    pub fn fail_next_tx(&self, err: TxError) {
        self.state.lock().unwrap().next_tx_failure = Some(err);
    }

    /// Reads block until [`FakeJoint::release_reads`].
    pub fn hold_reads(&self) {
        self.reads.set(false);
    }

    pub fn release_reads(&self) {
        self.reads.set(true);
    }

    /// Writes block until [`FakeJoint::release_writes`].
    pub fn hold_writes(&self) {
        self.writes.set(false);
    }

    pub fn release_writes(&self) {
        self.writes.set(true);
    }

    pub fn calls(&self, method: &str) -> usize {
        self.calls.lock().unwrap().get(method).copied().unwrap_or(0)
    }

    fn record(&self, method: &'static str) -> CallResult<()> {
        *self.calls.lock().unwrap().entry(method).or_default() += 1;
        if self.state.lock().unwrap().failing.contains(method) {
            return Err(ContractError::new(method, "injected failure"));
        }
        Ok(())
    }

    async fn read<T>(
        &self,
        method: &'static str,
        f: impl FnOnce(&ChainState) -> CallResult<T>,
    ) -> CallResult<T> {
        self.record(method)?;
        self.reads.pass().await;
        let state = self.state.lock().unwrap();
        f(&state)
    }

    async fn write(
        &self,
        method: &'static str,
        holder: Option<Address>,
    ) -> Result<TxReceipt, TxError> {
        *self.calls.lock().unwrap().entry(method).or_default() += 1;
        self.writes.pass().await;
        let mut state = self.state.lock().unwrap();
        if let Some(err) = state.next_tx_failure.take() {
            return Err(err);
        }
        if let Some(holder) = holder {
            state.owners.insert(U256::ZERO, holder);
        }
        state.tx_count += 1;
        Ok(TxReceipt {
            tx_hash: B256::from(U256::from(state.tx_count)),
            block_number: Some(state.tx_count),
            gas_used: 21_000,
        })
    }
}

impl JointRead for FakeJoint {
    async fn time_until_yoinkable(&self) -> CallResult<U256> {
        self.read("timeUntilYoinkable", |s| Ok(s.cooldown)).await
    }

    async fn owner_of(&self, token_id: U256) -> CallResult<Address> {
        self.read("ownerOf", |s| {
            s.owners
                .get(&token_id)
                .copied()
                .ok_or_else(|| ContractError::new("ownerOf", "ERC721: invalid token ID"))
        })
        .await
    }

    async fn balance_of(&self, owner: Address) -> CallResult<U256> {
        self.read("balanceOf", |s| {
            let count = s
                .by_index
                .iter()
                .filter(|id| s.owners.get(id) == Some(&owner))
                .count();
            Ok(U256::from(count))
        })
        .await
    }

    async fn token_of_owner_by_index(&self, owner: Address, index: U256) -> CallResult<U256> {
        self.read("tokenOfOwnerByIndex", |s| {
            let index = usize::try_from(index).unwrap_or(usize::MAX);
            s.by_index
                .iter()
                .filter(|id| s.owners.get(id) == Some(&owner))
                .nth(index)
                .copied()
                .ok_or_else(|| {
                    ContractError::new("tokenOfOwnerByIndex", "owner index out of bounds")
                })
        })
        .await
    }

    async fn total_supply(&self) -> CallResult<U256> {
        self.read("totalSupply", |s| {
            Ok(s.supply_override.unwrap_or(U256::from(s.by_index.len())))
        })
        .await
    }

    async fn token_by_index(&self, index: U256) -> CallResult<U256> {
        self.read("tokenByIndex", |s| {
            let index = usize::try_from(index).unwrap_or(usize::MAX);
            s.by_index
                .get(index)
                .copied()
                .ok_or_else(|| ContractError::new("tokenByIndex", "global index out of bounds"))
        })
        .await
    }

    async fn transfers(&self, filter: TransferFilter) -> CallResult<Vec<TransferRecord>> {
        self.read("Transfer", |s| {
            Ok(s.transfers
                .iter()
                .filter(|record| filter.matches(record))
                .copied()
                .collect())
        })
        .await
    }
}

impl JointWrite for FakeJoint {
    async fn yoink(&self) -> Result<TxReceipt, TxError> {
        self.write("yoink", None).await
    }

    async fn yoink_to(&self, target: Address) -> Result<TxReceipt, TxError> {
        self.write("yoinkTo", Some(target)).await
    }
}

/// Scriptable wallet whose writer is a shared [`FakeJoint`].
pub struct FakeWallet {
    accounts: Mutex<Result<Vec<Address>, WalletError>>,
    chain_id: AtomicU64,
    events: broadcast::Sender<WalletEvent>,
    joint: Arc<FakeJoint>,
    writer_failure: Mutex<Option<WalletError>>,
    request_delay: Mutex<Duration>,
    requests: AtomicUsize,
}

impl FakeWallet {
    pub fn new(account: Address, chain_id: u64, joint: Arc<FakeJoint>) -> Self {
        let (events, _) = broadcast::channel(16);
        Self {
            accounts: Mutex::new(Ok(vec![account])),
            chain_id: AtomicU64::new(chain_id),
            events,
            joint,
            writer_failure: Mutex::new(None),
            request_delay: Mutex::new(Duration::ZERO),
            requests: AtomicUsize::new(0),
        }
    }

    pub fn set_accounts(&self, accounts: Result<Vec<Address>, WalletError>) {
        *self.accounts.lock().unwrap() = accounts;
    }

    pub fn set_chain_id(&self, chain_id: u64) {
        self.chain_id.store(chain_id, Ordering::SeqCst);
    }

    pub fn fail_writer(&self, err: WalletError) {
        *self.writer_failure.lock().unwrap() = Some(err);
    }

    pub fn set_request_delay(&self, delay: Duration) {
        *self.request_delay.lock().unwrap() = delay;
    }

    pub fn emit(&self, event: WalletEvent) {
        let _ = self.events.send(event);
    }

    pub fn request_count(&self) -> usize {
        self.requests.load(Ordering::SeqCst)
    }
}

impl WalletProvider for FakeWallet {
    type Writer = Arc<FakeJoint>;

    async fn request_accounts(&self) -> Result<Vec<Address>, WalletError> {
        self.requests.fetch_add(1, Ordering::SeqCst);
        let delay = *self.request_delay.lock().unwrap();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        self.accounts.lock().unwrap().clone()
    }

    async fn chain_id(&self) -> Result<u64, WalletError> {
        Ok(self.chain_id.load(Ordering::SeqCst))
    }

    fn subscribe(&self) -> broadcast::Receiver<WalletEvent> {
        self.events.subscribe()
    }

    fn writer(&self, _contract: Address, _account: Address) -> Result<Arc<FakeJoint>, WalletError> {
        match self.writer_failure.lock().unwrap().clone() {
            Some(err) => Err(err),
            None => Ok(self.joint.clone()),
        }
    }
}

pub const ALICE: Address = Address::repeat_byte(0xaa);

/// A session over [`FakeJoint`] with [`ALICE`] connected through a [`FakeWallet`].
pub struct TestContext {
    joint: Arc<FakeJoint>,
    wallet: Arc<FakeWallet>,
    session: JointSession<FakeWallet, FakeJoint>,
}

impl TestContext {
    /// Must be called inside a tokio runtime; polling starts immediately.
    pub fn new(poll_interval: Duration) -> Self {
        let joint = Arc::new(FakeJoint::new());
        let wallet = Arc::new(FakeWallet::new(ALICE, SONIC_CHAIN_ID, joint.clone()));
        let session = JointSession::new(
            Arc::new(test_config()),
            Some(wallet.clone()),
            joint.clone(),
            poll_interval,
        );
        Self {
            joint,
            wallet,
            session,
        }
    }

    pub fn joint(&self) -> &Arc<FakeJoint> {
        &self.joint
    }

    pub fn wallet(&self) -> &Arc<FakeWallet> {
        &self.wallet
    }

    pub fn session(&self) -> &JointSession<FakeWallet, FakeJoint> {
        &self.session
    }
}
