use alloy_primitives::Address;
use serde::Deserialize;
use std::{
    fmt,
    fs,
    io,
    path::{
        Path,
        PathBuf,
    },
};
use url::Url;

pub const DEFAULT_CONFIG_PATH: &str = "config/config.json";

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("configuration not found at {0}")]
    Missing(String),
    #[error("failed to read configuration from {location}: {message}")]
    Read { location: String, message: String },
    #[error("configuration is not valid JSON: {0}")]
    Malformed(#[from] serde_json::Error),
    #[error("configuration is missing required field `{0}`")]
    MissingField(&'static str),
    #[error("invalid contract address `{0}`")]
    InvalidContractAddress(String),
    #[error("invalid RPC URL `{url}`: {message}")]
    InvalidRpcUrl { url: String, message: String },
}

pub type Result<T, E = ConfigError> = std::result::Result<T, E>;

/// Where the configuration document is fetched from.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum ConfigSource {
    File(PathBuf),
    Url(Url),
}

impl ConfigSource {
    pub fn parse(raw: &str) -> Result<Self> {
        let trimmed = raw.trim();
        if trimmed.starts_with("http://") || trimmed.starts_with("https://") {
            let url = Url::parse(trimmed).map_err(|e| ConfigError::Read {
                location: trimmed.to_string(),
                message: e.to_string(),
            })?;
            return Ok(ConfigSource::Url(url));
        }
        let expanded = shellexpand::tilde(trimmed);
        Ok(ConfigSource::File(PathBuf::from(expanded.into_owned())))
    }
}

impl Default for ConfigSource {
    fn default() -> Self {
        ConfigSource::File(PathBuf::from(DEFAULT_CONFIG_PATH))
    }
}

impl fmt::Display for ConfigSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigSource::File(path) => write!(f, "{}", path.display()),
            ConfigSource::Url(url) => write!(f, "{url}"),
        }
    }
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct NetworkConfig {
    pub id: u64,
    pub name: String,
    pub symbol: Option<String>,
}

#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct DisplayFlags {
    pub show_background: bool,
}

/// Immutable application configuration, loaded once at startup.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct JointConfig {
    pub contract_address: Address,
    pub network: NetworkConfig,
    pub rpc_url: Url,
    /// First block worth scanning for `Transfer` logs.
    pub deployment_block: u64,
    pub display: DisplayFlags,
}

/// Values supplied outside the document (command line) that take precedence.
#[derive(Clone, Debug, Default)]
pub struct ConfigOverrides {
    pub rpc_url: Option<Url>,
}

// The upper-case aliases are the keys used by the classic NFT dapp template.
#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawConfig {
    #[serde(default, alias = "CONTRACT_ADDRESS")]
    contract_address: Option<String>,
    #[serde(default, alias = "NETWORK")]
    network: Option<RawNetwork>,
    #[serde(default, alias = "RPC_URL")]
    rpc_url: Option<String>,
    #[serde(default, alias = "DEPLOYMENT_BLOCK")]
    deployment_block: Option<u64>,
    #[serde(default, alias = "SHOW_BACKGROUND")]
    show_background: bool,
}

#[derive(Deserialize)]
struct RawNetwork {
    #[serde(alias = "ID")]
    id: u64,
    #[serde(alias = "NAME")]
    name: String,
    #[serde(default, alias = "SYMBOL")]
    symbol: Option<String>,
}

impl JointConfig {
    pub fn from_json(bytes: &[u8], overrides: &ConfigOverrides) -> Result<Self> {
        let raw: RawConfig = serde_json::from_slice(bytes)?;

        let address_str = raw
            .contract_address
            .filter(|s| !s.trim().is_empty())
            .ok_or(ConfigError::MissingField("contractAddress"))?;
        let contract_address = parse_address(&address_str)
            .ok_or_else(|| ConfigError::InvalidContractAddress(address_str.clone()))?;

        let network = raw.network.ok_or(ConfigError::MissingField("network"))?;

        let rpc_url = match (&overrides.rpc_url, raw.rpc_url) {
            (Some(url), _) => url.clone(),
            (None, Some(raw_url)) => {
                Url::parse(raw_url.trim()).map_err(|e| ConfigError::InvalidRpcUrl {
                    url: raw_url.clone(),
                    message: e.to_string(),
                })?
            }
            (None, None) => return Err(ConfigError::MissingField("rpcUrl")),
        };

        Ok(JointConfig {
            contract_address,
            network: NetworkConfig {
                id: network.id,
                name: network.name,
                symbol: network.symbol,
            },
            rpc_url,
            deployment_block: raw.deployment_block.unwrap_or_default(),
            display: DisplayFlags {
                show_background: raw.show_background,
            },
        })
    }
}

/// Parses an address the way web3 wallets do.
///
/// Optional `0x` prefix and 40 hex digits. All-lowercase and all-uppercase
/// digits are taken as-is; mixed case must be a valid EIP-55 checksum.
pub fn parse_address(input: &str) -> Option<Address> {
    let trimmed = input.trim();
    let body = trimmed
        .strip_prefix("0x")
        .or_else(|| trimmed.strip_prefix("0X"))
        .unwrap_or(trimmed);
    if body.len() != 40 || !body.bytes().all(|b| b.is_ascii_hexdigit()) {
        return None;
    }
    let address = Address::from_slice(&hex::decode(body).ok()?);

    let has_lower = body.bytes().any(|b| b.is_ascii_lowercase());
    let has_upper = body.bytes().any(|b| b.is_ascii_uppercase());
    if has_lower && has_upper && address.to_checksum(None)[2..] != *body {
        return None;
    }
    Some(address)
}

/// Fetch and parse the configuration document. Failures are fatal for the caller.
pub async fn load_config(
    source: &ConfigSource,
    overrides: &ConfigOverrides,
) -> Result<JointConfig> {
    let bytes = match source {
        ConfigSource::File(path) => read_file(path)?,
        ConfigSource::Url(url) => fetch_url(url).await?,
    };
    let config = JointConfig::from_json(&bytes, overrides)?;
    tracing::info!(
        %source,
        contract = %config.contract_address,
        network = %config.network.name,
        chain_id = config.network.id,
        "configuration loaded"
    );
    Ok(config)
}

fn read_file(path: &Path) -> Result<Vec<u8>> {
    fs::read(path).map_err(|e| match e.kind() {
        io::ErrorKind::NotFound => ConfigError::Missing(path.display().to_string()),
        _ => ConfigError::Read {
            location: path.display().to_string(),
            message: e.to_string(),
        },
    })
}

async fn fetch_url(url: &Url) -> Result<Vec<u8>> {
    let read_err = |message: String| ConfigError::Read {
        location: url.to_string(),
        message,
    };
    let res = reqwest::get(url.clone())
        .await
        .map_err(|e| read_err(e.to_string()))?;
    let status = res.status();
    if status == reqwest::StatusCode::NOT_FOUND {
        return Err(ConfigError::Missing(url.to_string()));
    }
    if !status.is_success() {
        return Err(read_err(format!("server responded with {status}")));
    }
    let bytes = res.bytes().await.map_err(|e| read_err(e.to_string()))?;
    Ok(bytes.to_vec())
}

#[cfg(test)]
mod tests {
    #![allow(non_snake_case)]
    use super::*;
    use alloy_primitives::address;

    const CAMEL_CASE: &str = r#"{
        "contractAddress": "0x374b897AF1c0213cc2153a761A856bd80fb91c92",
        "network": { "id": 146, "name": "Sonic", "symbol": "S" },
        "rpcUrl": "https://sonic.drpc.org",
        "deploymentBlock": 1943598,
        "showBackground": true
    }"#;

    const TEMPLATE_KEYS: &str = r#"{
        "CONTRACT_ADDRESS": "0x374b897af1c0213cc2153a761a856bd80fb91c92",
        "NETWORK": { "NAME": "Sonic", "SYMBOL": "S", "ID": 146 },
        "RPC_URL": "https://sonic.drpc.org",
        "SHOW_BACKGROUND": false
    }"#;

    #[test]
    fn from_json__parses_camel_case_document() {
        // when
        let config =
            JointConfig::from_json(CAMEL_CASE.as_bytes(), &ConfigOverrides::default())
                .unwrap();

        // then
        assert_eq!(
            config.contract_address,
            address!("0x374b897AF1c0213cc2153a761A856bd80fb91c92")
        );
        assert_eq!(config.network.id, 146);
        assert_eq!(config.network.name, "Sonic");
        assert_eq!(config.network.symbol.as_deref(), Some("S"));
        assert_eq!(config.rpc_url.as_str(), "https://sonic.drpc.org/");
        assert_eq!(config.deployment_block, 1_943_598);
        assert!(config.display.show_background);
    }

    #[test]
    fn from_json__accepts_template_upper_case_keys() {
        // when
        let config =
            JointConfig::from_json(TEMPLATE_KEYS.as_bytes(), &ConfigOverrides::default())
                .unwrap();

        // then
        assert_eq!(
            config.contract_address,
            address!("0x374b897AF1c0213cc2153a761A856bd80fb91c92")
        );
        assert_eq!(config.network.name, "Sonic");
        assert_eq!(config.deployment_block, 0);
        assert!(!config.display.show_background);
    }

    #[test]
    fn from_json__rejects_missing_contract_address() {
        let doc = r#"{ "network": { "id": 1, "name": "Mainnet" }, "rpcUrl": "http://localhost:8545" }"#;

        let err = JointConfig::from_json(doc.as_bytes(), &ConfigOverrides::default())
            .unwrap_err();

        assert!(matches!(err, ConfigError::MissingField("contractAddress")));
    }

    #[test]
    fn from_json__rejects_malformed_json() {
        let err = JointConfig::from_json(b"{ not json", &ConfigOverrides::default())
            .unwrap_err();

        assert!(matches!(err, ConfigError::Malformed(_)));
    }

    #[test]
    fn from_json__rejects_invalid_contract_address() {
        let doc = r#"{
            "contractAddress": "0x1234",
            "network": { "id": 1, "name": "Mainnet" },
            "rpcUrl": "http://localhost:8545"
        }"#;

        let err = JointConfig::from_json(doc.as_bytes(), &ConfigOverrides::default())
            .unwrap_err();

        assert!(matches!(err, ConfigError::InvalidContractAddress(_)));
    }

    #[test]
    fn from_json__rejects_contract_address_with_bad_checksum() {
        // given
        let doc = r#"{
            "contractAddress": "0x374B897AF1c0213cc2153a761A856bd80fb91c92",
            "network": { "id": 146, "name": "Sonic" },
            "rpcUrl": "http://localhost:8545"
        }"#;

        // when
        let err = JointConfig::from_json(doc.as_bytes(), &ConfigOverrides::default())
            .unwrap_err();

        // then
        assert!(matches!(err, ConfigError::InvalidContractAddress(_)));
    }

    #[test]
    fn from_json__accepts_single_case_contract_address() {
        let doc = r#"{
            "contractAddress": "0x374b897af1c0213cc2153a761a856bd80fb91c92",
            "network": { "id": 146, "name": "Sonic" },
            "rpcUrl": "http://localhost:8545"
        }"#;

        let config = JointConfig::from_json(doc.as_bytes(), &ConfigOverrides::default())
            .unwrap();

        assert_eq!(
            config.contract_address.to_checksum(None),
            "0x374b897AF1c0213cc2153a761A856bd80fb91c92"
        );
    }

    #[test]
    fn from_json__requires_rpc_url_without_override() {
        let doc = r#"{
            "contractAddress": "0x374b897AF1c0213cc2153a761A856bd80fb91c92",
            "network": { "id": 146, "name": "Sonic" }
        }"#;

        let err = JointConfig::from_json(doc.as_bytes(), &ConfigOverrides::default())
            .unwrap_err();
        assert!(matches!(err, ConfigError::MissingField("rpcUrl")));

        let overrides = ConfigOverrides {
            rpc_url: Some(Url::parse("http://localhost:8545").unwrap()),
        };
        let config = JointConfig::from_json(doc.as_bytes(), &overrides).unwrap();
        assert_eq!(config.rpc_url.as_str(), "http://localhost:8545/");
    }

    #[test]
    fn from_json__override_takes_precedence_over_document() {
        let overrides = ConfigOverrides {
            rpc_url: Some(Url::parse("http://127.0.0.1:9000").unwrap()),
        };

        let config = JointConfig::from_json(CAMEL_CASE.as_bytes(), &overrides).unwrap();

        assert_eq!(config.rpc_url.as_str(), "http://127.0.0.1:9000/");
    }

    #[test]
    fn config_source__distinguishes_urls_from_paths() {
        assert!(matches!(
            ConfigSource::parse("https://example.com/config.json").unwrap(),
            ConfigSource::Url(_)
        ));
        assert_eq!(
            ConfigSource::parse("config/config.json").unwrap(),
            ConfigSource::File(PathBuf::from("config/config.json"))
        );
    }

    #[tokio::test]
    async fn load_config__reads_document_from_file() {
        // given
        let path = std::env::temp_dir().join(format!(
            "joint-config-{}-ok.json",
            std::process::id()
        ));
        fs::write(&path, CAMEL_CASE).unwrap();

        // when
        let config =
            load_config(&ConfigSource::File(path.clone()), &ConfigOverrides::default())
                .await
                .unwrap();

        // then
        assert_eq!(config.network.id, 146);
        fs::remove_file(path).unwrap();
    }

    #[tokio::test]
    async fn load_config__reports_missing_file() {
        let path = std::env::temp_dir().join("joint-config-definitely-absent.json");

        let err = load_config(&ConfigSource::File(path), &ConfigOverrides::default())
            .await
            .unwrap_err();

        assert!(matches!(err, ConfigError::Missing(_)));
    }
}
