use crate::ui;
use alloy::primitives::Address;
use color_eyre::eyre::{
    Result,
    WrapErr,
    eyre,
};
use joint_client::{
    ConnectionState,
    JointConfig,
    JointSession,
    PendingTx,
    TxKind,
    TxSlot,
    binding::ReadHandle,
    connector::LOCKED_REASON,
    history::PastHolder,
    poller::Snapshot,
    wallets::KeystoreWallet,
};
use std::{
    path::Path,
    sync::Arc,
    time::Duration,
};
use tracing::{
    error,
    info,
    warn,
};
use tracing_appender::{
    non_blocking::WorkerGuard,
    rolling,
};
use tracing_subscriber::{
    EnvFilter,
    fmt,
};

const MAX_ERRORS: usize = 50;
const CHAIN_WATCH_INTERVAL: Duration = Duration::from_secs(5);

pub struct AppConfig {
    pub joint: Arc<JointConfig>,
    pub wallet: Option<Arc<KeystoreWallet>>,
    pub poll_interval: Duration,
}

/// Everything one frame needs.
#[derive(Clone, Debug)]
pub struct AppView {
    pub network: String,
    pub contract: Address,
    pub wallet_name: Option<String>,
    pub connection: ConnectionState,
    pub snapshot: Option<Arc<Snapshot>>,
    pub pending: Vec<(TxSlot, PendingTx)>,
    pub past_holders: Vec<PastHolder>,
    pub status: String,
    pub errors: Vec<String>,
}

pub struct AppController {
    session: JointSession<KeystoreWallet, ReadHandle>,
    wallet: Option<Arc<KeystoreWallet>>,
    past_holders: Vec<PastHolder>,
    status: String,
    errors: Vec<String>,
}

impl AppController {
    pub fn new(config: AppConfig) -> Self {
        let reader = Arc::new(joint_client::bind_read_only(&config.joint));
        let session = JointSession::new(
            config.joint,
            config.wallet.clone(),
            reader,
            config.poll_interval,
        );
        Self {
            session,
            wallet: config.wallet,
            past_holders: Vec::new(),
            status: String::new(),
            errors: Vec::new(),
        }
    }

    fn set_status(&mut self, status: impl Into<String>) {
        self.status = status.into();
    }

    fn push_errors(&mut self, mut items: Vec<String>) {
        if items.is_empty() {
            return;
        }
        for item in &items {
            error!("{}", item);
        }
        self.errors.append(&mut items);
        if self.errors.len() > MAX_ERRORS {
            let drain = self.errors.len() - MAX_ERRORS;
            self.errors.drain(0..drain);
        }
    }

    pub fn view(&self) -> AppView {
        let config = self.session.config();
        let network = match &config.network.symbol {
            Some(symbol) => format!("{} ({symbol})", config.network.name),
            None => config.network.name.clone(),
        };
        AppView {
            network,
            contract: config.contract_address,
            wallet_name: self.wallet.as_ref().map(|w| w.name().to_string()),
            connection: self.session.connection().state,
            snapshot: self.session.snapshot(),
            pending: [TxSlot::Claim, TxSlot::TransferTo]
                .into_iter()
                .map(|slot| (slot, self.session.pending(slot)))
                .collect(),
            past_holders: self.past_holders.clone(),
            status: self.status.clone(),
            errors: self.errors.clone(),
        }
    }

    /// Unlocking a keystore interactively needs the plain terminal.
    fn needs_terminal(&self) -> bool {
        self.wallet
            .as_ref()
            .is_some_and(|w| w.prompts_for_password() && !w.is_unlocked())
    }

    async fn refresh_history(&mut self) {
        match self.session.holder_history().await {
            Ok(holders) => {
                info!(count = holders.len(), "past holders refreshed");
                self.past_holders = holders;
            }
            Err(e) => self.push_errors(vec![format!("Failed to load past holders: {e}")]),
        }
    }

    async fn connect(&mut self) {
        self.set_status("Connecting wallet...");
        match self.session.connect().await {
            Ok(ConnectionState::Connected { account, .. }) => {
                self.set_status(format!("Connected as {account}"));
            }
            Ok(other) => self.set_status(format!("Wallet state: {other:?}")),
            Err(e) => {
                self.set_status("Wallet connection failed");
                self.push_errors(vec![e.to_string()]);
            }
        }
    }

    /// Drops the decrypted key; the connector reacts to the emitted event.
    fn lock_wallet(&mut self) {
        match &self.wallet {
            Some(wallet) if wallet.is_unlocked() => {
                wallet.lock();
                self.set_status("Locking wallet...");
            }
            Some(_) => self.set_status("Wallet is already locked"),
            None => self.set_status("No wallet selected (use --wallet)"),
        }
    }

    async fn submit(&mut self, kind: TxKind) {
        let slot = kind.slot();
        match self.session.submit(kind).await {
            Ok(receipt) => {
                self.set_status(format!(
                    "{slot} confirmed in {} (gas {})",
                    receipt.tx_hash, receipt.gas_used
                ));
                self.refresh_history().await;
            }
            Err(e) => {
                self.set_status(format!("{slot} failed"));
                self.push_errors(vec![format!("{slot} failed: {e}")]);
            }
        }
    }

    fn on_connection_change(&mut self, state: &ConnectionState) {
        match state {
            ConnectionState::Failed { reason } if reason == LOCKED_REASON => {
                self.set_status("Wallet locked or disconnected");
                self.push_errors(vec!["Please connect to a Web3 wallet".to_string()]);
            }
            ConnectionState::Connected { account, .. } => {
                self.set_status(format!("Connected as {account}"));
            }
            ConnectionState::Connecting => self.set_status("Connecting wallet..."),
            ConnectionState::Disconnected | ConnectionState::Failed { .. } => {}
        }
    }
}

pub fn init_tracing(log_dir: &Path) -> Result<WorkerGuard> {
    std::fs::create_dir_all(log_dir)
        .wrap_err_with(|| format!("creating log directory {}", log_dir.display()))?;
    let appender = rolling::daily(log_dir, "pass-the-joint.log");
    let (writer, guard) = tracing_appender::non_blocking(appender);
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    fmt()
        .with_env_filter(filter)
        .with_writer(writer)
        .with_ansi(false)
        .try_init()
        .map_err(|e| eyre!("failed to install tracing subscriber: {e}"))?;
    Ok(guard)
}

pub async fn run_app(config: AppConfig) -> Result<()> {
    let _chain_watch = config
        .wallet
        .as_ref()
        .map(|wallet| wallet.watch_chain(CHAIN_WATCH_INTERVAL));
    let mut controller = AppController::new(config);
    let mut ui_state = ui::UiState::default();
    let mut input_events = ui::input_event_stream();

    tracing::info!("Starting UI");
    ui::terminal_enter(&mut ui_state)?;
    let res = run_loop(&mut controller, &mut ui_state, &mut input_events).await;
    controller.session.shutdown();
    ui::terminal_exit(&mut ui_state)?;
    res
}

async fn run_loop(
    controller: &mut AppController,
    ui_state: &mut ui::UiState,
    input_events: &mut ui::InputEvents,
) -> Result<()> {
    let mut snapshots = controller.session.watch_snapshot();
    let mut connection = controller.session.watch_connection();
    ui::draw(ui_state, &controller.view()).wrap_err("initial draw failed")?;
    controller.refresh_history().await;
    ui::draw(ui_state, &controller.view()).wrap_err("draw after history load failed")?;

    loop {
        tokio::select! {
            changed = snapshots.changed() => {
                if changed.is_err() {
                    warn!("snapshot channel closed");
                    break;
                }
                ui::draw(ui_state, &controller.view())
                    .wrap_err("draw after snapshot refresh failed")?;
            }
            changed = connection.changed() => {
                if changed.is_err() {
                    warn!("connection channel closed");
                    break;
                }
                let state = connection.borrow_and_update().state.clone();
                controller.on_connection_change(&state);
                ui::draw(ui_state, &controller.view())
                    .wrap_err("draw after connection change failed")?;
            }
            _ = tokio::signal::ctrl_c() => {
                break;
            }
            ev = ui::next_event(ui_state, input_events) => {
                match ev? {
                    ui::UserEvent::Quit => break,
                    ui::UserEvent::Connect => {
                        if controller.needs_terminal() {
                            ui::terminal_exit(ui_state)?;
                            controller.connect().await;
                            ui::terminal_enter(ui_state)?;
                            *input_events = ui::input_event_stream();
                        } else {
                            controller.connect().await;
                        }
                    }
                    ui::UserEvent::Lock => controller.lock_wallet(),
                    ui::UserEvent::Yoink => {
                        controller.set_status("Yoinking the joint...");
                        ui::draw(ui_state, &controller.view())
                            .wrap_err("draw while submitting yoink failed")?;
                        controller.submit(TxKind::Claim).await;
                    }
                    ui::UserEvent::ConfirmTransfer(target) => {
                        controller.set_status(format!("Yoinking the joint to {target}..."));
                        ui::draw(ui_state, &controller.view())
                            .wrap_err("draw while submitting yoinkTo failed")?;
                        controller.submit(TxKind::TransferTo(target)).await;
                    }
                    ui::UserEvent::RefreshHistory => {
                        controller.set_status("Loading past holders...");
                        controller.refresh_history().await;
                        controller.set_status("Past holders refreshed");
                    }
                    ui::UserEvent::RefreshNow => controller.session.refresh_now(),
                    ui::UserEvent::OpenTransferModal | ui::UserEvent::Redraw => {}
                }
                ui::draw(ui_state, &controller.view()).wrap_err("draw after input failed")?;
            }
        }
    }
    Ok(())
}
