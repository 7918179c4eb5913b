use clap::{
    Parser,
    Subcommand,
};
use color_eyre::eyre::{
    Result,
    WrapErr,
};
use joint_client::{
    ConfigOverrides,
    ConfigSource,
    bind_read_only,
    history::holder_history,
    load_config,
    poll_once,
    poller::owned_tokens,
    submitter::parse_address,
    wallets::{
        KeystoreWallet,
        PasswordSource,
        find_wallet,
        resolve_wallet_dir,
    },
};
use std::{
    path::PathBuf,
    sync::Arc,
    time::Duration,
};
use url::Url;

mod client;
mod ui;

#[derive(Parser, Debug)]
#[command(
    name = "pass-the-joint",
    about = "Watch, yoink and pass the JOINT",
    version
)]
struct Cli {
    /// Configuration file path or http(s) URL
    #[arg(long, default_value = joint_config::DEFAULT_CONFIG_PATH)]
    config: String,

    /// Override the RPC URL from the configuration
    #[arg(long)]
    rpc_url: Option<Url>,

    /// Keystore name to connect with
    #[arg(long)]
    wallet: Option<String>,

    /// Override keystore directory (defaults to ~/.foundry/keystores)
    #[arg(long)]
    wallet_dir: Option<String>,

    /// Milliseconds between contract polls
    #[arg(long, default_value_t = 1000, value_parser = clap::value_parser!(u64).range(1..))]
    poll_interval_ms: u64,

    /// Directory for the rolling log file
    #[arg(long, default_value = "logs")]
    log_dir: PathBuf,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Interactive terminal UI (default)
    Tui,
    /// Poll the contract once and print the result
    Status {
        #[arg(long)]
        json: bool,
    },
    /// List past holders of the joint, most recent first
    History,
    /// List tokens owned by an address
    Owned { address: String },
}

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;
    let cli = Cli::parse();
    let _log_guard = client::init_tracing(&cli.log_dir)?;
    tracing::info!("starting pass-the-joint client");

    let source = ConfigSource::parse(&cli.config).wrap_err("invalid --config")?;
    let overrides = ConfigOverrides {
        rpc_url: cli.rpc_url.clone(),
    };
    let joint = load_config(&source, &overrides)
        .await
        .wrap_err_with(|| format!("loading configuration from {source}"))?;

    match cli.command.unwrap_or(Command::Tui) {
        Command::Tui => {
            let wallet = match cli.wallet.as_deref() {
                Some(name) => {
                    let dir = resolve_wallet_dir(cli.wallet_dir.as_deref())?;
                    let descriptor = find_wallet(&dir, name)?;
                    Some(Arc::new(KeystoreWallet::new(
                        descriptor,
                        joint.rpc_url.clone(),
                        PasswordSource::from_env_or_prompt(),
                    )))
                }
                None => None,
            };
            client::run_app(client::AppConfig {
                joint: Arc::new(joint),
                wallet,
                poll_interval: Duration::from_millis(cli.poll_interval_ms),
            })
            .await
        }
        Command::Status { json } => {
            let reader = bind_read_only(&joint);
            let snapshot = poll_once(&reader).await.wrap_err("polling contract")?;
            if json {
                println!("{}", serde_json::to_string_pretty(&snapshot)?);
            } else {
                println!("Contract: {}", reader.address());
                println!("{}", ui::format_cooldown(snapshot.cooldown_secs));
                println!("Current holder: {}", snapshot.holder);
                println!("Tokens ({}):", snapshot.tokens.len());
                for token in &snapshot.tokens {
                    println!("  #{} token {} owner {}", token.index, token.token_id, token.owner);
                }
            }
            Ok(())
        }
        Command::History => {
            let reader = bind_read_only(&joint);
            let holders = holder_history(&reader, &joint)
                .await
                .wrap_err("fetching transfer history")?;
            if holders.is_empty() {
                println!("No past holders yet");
            }
            for holder in holders {
                println!("{holder}");
            }
            Ok(())
        }
        Command::Owned { address } => {
            let account = parse_address(&address)?;
            let reader = bind_read_only(&joint);
            let tokens = owned_tokens(&reader, account)
                .await
                .wrap_err("enumerating owned tokens")?;
            println!("{account} owns {} token(s)", tokens.len());
            for token in tokens {
                println!("  {token}");
            }
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    #![allow(non_snake_case)]
    use super::*;

    #[test]
    fn cli__rejects_zero_poll_interval() {
        let err = Cli::try_parse_from(["pass-the-joint", "--poll-interval-ms", "0"]).unwrap_err();

        assert_eq!(err.kind(), clap::error::ErrorKind::ValueValidation);
    }

    #[test]
    fn cli__defaults_to_tui_and_one_second_polls() {
        let cli = Cli::try_parse_from(["pass-the-joint"]).unwrap();

        assert_eq!(cli.poll_interval_ms, 1000);
        assert!(cli.command.is_none());
    }
}
