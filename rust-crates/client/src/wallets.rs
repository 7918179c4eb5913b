//! Keystore-backed wallet provider.
//!
//! Stands in for a browser-injected provider: accounts are authorized by
//! unlocking a JSON keystore, chain changes are observed by polling the node.

use crate::{
    binding::SignedContract,
    error::WalletError,
    wallet::{
        WalletEvent,
        WalletProvider,
    },
};
use alloy::{
    network::EthereumWallet,
    primitives::Address,
    providers::{
        DynProvider,
        Provider,
        ProviderBuilder,
    },
    signers::local::PrivateKeySigner,
};
use eth_keystore::decrypt_key;
use rpassword::prompt_password;
use std::{
    fs,
    path::{
        Path,
        PathBuf,
    },
    sync::{
        Arc,
        Mutex,
        PoisonError,
        Weak,
    },
    time::Duration,
};
use tokio::{
    sync::broadcast,
    task::JoinHandle,
    time,
};
use url::Url;

pub const PASSWORD_ENV_VAR: &str = "JOINT_WALLET_PASSWORD";
const EVENT_CAPACITY: usize = 16;

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct WalletDescriptor {
    pub name: String,
    pub path: PathBuf,
}

impl WalletDescriptor {
    pub fn new(name: impl Into<String>, path: PathBuf) -> Self {
        Self {
            name: name.into(),
            path,
        }
    }
}

pub fn default_wallet_dir() -> Result<PathBuf, WalletError> {
    let home = std::env::var("HOME")
        .map_err(|_| WalletError::Unavailable("HOME environment variable not set".into()))?;
    Ok(PathBuf::from(home).join(".foundry").join("keystores"))
}

pub fn resolve_wallet_dir(dir: Option<&str>) -> Result<PathBuf, WalletError> {
    match dir {
        Some(raw) => {
            let expanded = shellexpand::tilde(raw);
            Ok(PathBuf::from(expanded.into_owned()))
        }
        None => default_wallet_dir(),
    }
}

pub fn list_wallets(dir: &Path) -> Result<Vec<WalletDescriptor>, WalletError> {
    if !dir.exists() {
        return Ok(Vec::new());
    }
    let read_err = |e: std::io::Error| {
        WalletError::Unavailable(format!("failed to read wallet directory: {e}"))
    };
    let mut wallets = Vec::new();
    for entry in fs::read_dir(dir).map_err(read_err)? {
        let path = entry.map_err(read_err)?.path();
        if !path.is_file() {
            continue;
        }
        let Some(file_name) = path.file_name().and_then(|name| name.to_str()) else {
            continue;
        };
        if file_name.starts_with('.') {
            continue;
        }
        let name = file_name.trim_end_matches(".json").to_owned();
        wallets.push(WalletDescriptor::new(name, path));
    }
    wallets.sort_by(|a, b| a.name.cmp(&b.name));
    Ok(wallets)
}

pub fn find_wallet(dir: &Path, name: &str) -> Result<WalletDescriptor, WalletError> {
    list_wallets(dir)?
        .into_iter()
        .find(|w| w.name == name)
        .ok_or_else(|| {
            WalletError::Unavailable(format!(
                "wallet '{name}' not found in {}",
                dir.to_string_lossy()
            ))
        })
}

#[derive(Clone, Debug)]
pub enum PasswordSource {
    /// Ask on the terminal.
    Prompt,
    /// Read from the named environment variable.
    Env(String),
    Fixed(String),
}

impl PasswordSource {
    /// Environment variable when set, terminal prompt otherwise.
    pub fn from_env_or_prompt() -> Self {
        if std::env::var_os(PASSWORD_ENV_VAR).is_some() {
            PasswordSource::Env(PASSWORD_ENV_VAR.to_string())
        } else {
            PasswordSource::Prompt
        }
    }

    fn read(&self, descriptor: &WalletDescriptor) -> Result<String, WalletError> {
        let password = match self {
            PasswordSource::Prompt => {
                let prompt = format!("Enter password for wallet '{}': ", descriptor.name);
                prompt_password(prompt).map_err(|e| {
                    WalletError::Rejected(format!("failed to read wallet password: {e}"))
                })?
            }
            PasswordSource::Env(var) => std::env::var(var).map_err(|_| {
                WalletError::Unavailable(format!("{var} environment variable not set"))
            })?,
            PasswordSource::Fixed(password) => password.clone(),
        };
        if password.is_empty() {
            return Err(WalletError::Rejected("no password entered".into()));
        }
        Ok(password)
    }
}

pub fn unlock_signer(
    descriptor: &WalletDescriptor,
    password: &str,
) -> Result<PrivateKeySigner, WalletError> {
    let secret = decrypt_key(&descriptor.path, password.as_bytes()).map_err(|_| {
        WalletError::Rejected(format!("invalid password for wallet '{}'", descriptor.name))
    })?;
    PrivateKeySigner::from_slice(&secret).map_err(|_| {
        WalletError::Unavailable(format!(
            "wallet '{}' contained unsupported key material",
            descriptor.name
        ))
    })
}

pub struct KeystoreWallet {
    descriptor: WalletDescriptor,
    rpc_url: Url,
    password: PasswordSource,
    rpc: DynProvider,
    signer: Mutex<Option<PrivateKeySigner>>,
    events: broadcast::Sender<WalletEvent>,
}

impl KeystoreWallet {
    pub fn new(descriptor: WalletDescriptor, rpc_url: Url, password: PasswordSource) -> Self {
        let rpc = ProviderBuilder::new()
            .connect_http(rpc_url.clone())
            .erased();
        Self::with_rpc(descriptor, rpc_url, password, rpc)
    }

    /// `rpc` answers chain id queries; signing providers still use `rpc_url`.
    fn with_rpc(
        descriptor: WalletDescriptor,
        rpc_url: Url,
        password: PasswordSource,
        rpc: DynProvider,
    ) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            descriptor,
            rpc_url,
            password,
            rpc,
            signer: Mutex::new(None),
            events,
        }
    }

    pub fn name(&self) -> &str {
        &self.descriptor.name
    }

    pub fn is_unlocked(&self) -> bool {
        self.cached_signer().is_some()
    }

    /// Whether unlocking will read from the terminal.
    pub fn prompts_for_password(&self) -> bool {
        matches!(self.password, PasswordSource::Prompt)
    }

    fn cached_signer(&self) -> Option<PrivateKeySigner> {
        self.signer
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Forget the decrypted key; subscribers see an empty account list.
    pub fn lock(&self) {
        let had_signer = self
            .signer
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
            .is_some();
        if had_signer {
            tracing::info!(wallet = %self.descriptor.name, "wallet locked");
            let _ = self.events.send(WalletEvent::AccountsChanged(Vec::new()));
        }
    }

    /// Poll the node's chain id and emit `ChainChanged` when it moves.
    /// The task ends once the wallet is dropped.
    pub fn watch_chain(self: &Arc<Self>, interval: Duration) -> JoinHandle<()> {
        let weak: Weak<Self> = Arc::downgrade(self);
        tokio::spawn(async move {
            let mut ticker = time::interval(interval);
            ticker.set_missed_tick_behavior(time::MissedTickBehavior::Skip);
            let mut last_seen: Option<u64> = None;
            loop {
                ticker.tick().await;
                let Some(wallet) = weak.upgrade() else {
                    break;
                };
                match wallet.rpc.get_chain_id().await {
                    Ok(chain_id) => {
                        if last_seen.is_some_and(|prev| prev != chain_id) {
                            tracing::info!(chain_id, "wallet chain changed");
                            let _ = wallet.events.send(WalletEvent::ChainChanged(chain_id));
                        }
                        last_seen = Some(chain_id);
                    }
                    Err(err) => {
                        tracing::warn!(%err, "chain id poll failed");
                    }
                }
            }
        })
    }
}

impl WalletProvider for KeystoreWallet {
    type Writer = SignedContract;

    async fn request_accounts(&self) -> Result<Vec<Address>, WalletError> {
        if let Some(signer) = self.cached_signer() {
            return Ok(vec![signer.address()]);
        }
        let descriptor = self.descriptor.clone();
        let source = self.password.clone();
        // Prompting and scrypt decryption both block.
        let signer = tokio::task::spawn_blocking(move || {
            let password = source.read(&descriptor)?;
            unlock_signer(&descriptor, &password)
        })
        .await
        .map_err(|e| WalletError::Unavailable(format!("unlock task failed: {e}")))??;
        let address = signer.address();
        *self.signer.lock().unwrap_or_else(PoisonError::into_inner) = Some(signer);
        tracing::info!(wallet = %self.descriptor.name, %address, "wallet unlocked");
        Ok(vec![address])
    }

    async fn chain_id(&self) -> Result<u64, WalletError> {
        self.rpc
            .get_chain_id()
            .await
            .map_err(|e| WalletError::Rpc(e.to_string()))
    }

    fn subscribe(&self) -> broadcast::Receiver<WalletEvent> {
        self.events.subscribe()
    }

    fn writer(&self, contract: Address, account: Address) -> Result<SignedContract, WalletError> {
        let signer = self
            .cached_signer()
            .filter(|signer| signer.address() == account)
            .ok_or_else(|| WalletError::Unavailable("wallet is locked".into()))?;
        let provider = ProviderBuilder::new()
            .wallet(EthereumWallet::from(signer))
            .connect_http(self.rpc_url.clone())
            .erased();
        Ok(SignedContract::new(contract, provider))
    }
}
