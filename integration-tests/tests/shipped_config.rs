#![allow(non_snake_case)]

use alloy::primitives::address;
use joint_config::{
    ConfigOverrides,
    ConfigSource,
    load_config,
};
use std::path::PathBuf;

fn shipped_config() -> ConfigSource {
    let path = PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("../config/config.json");
    ConfigSource::File(path)
}

#[tokio::test]
async fn load_config__shipped_document_targets_sonic() {
    // when
    let config = load_config(&shipped_config(), &ConfigOverrides::default())
        .await
        .unwrap();

    // then
    assert_eq!(
        config.contract_address,
        address!("0x374b897AF1c0213cc2153a761A856bd80fb91c92")
    );
    assert_eq!(config.network.id, 146);
    assert_eq!(config.network.name, "Sonic");
    assert_eq!(config.deployment_block, 1_943_598);
    assert!(config.display.show_background);
}

#[tokio::test]
async fn load_config__rpc_override_replaces_shipped_endpoint() {
    // given
    let overrides = ConfigOverrides {
        rpc_url: Some("http://127.0.0.1:8545".parse().unwrap()),
    };

    // when
    let config = load_config(&shipped_config(), &overrides).await.unwrap();

    // then
    assert_eq!(config.rpc_url.as_str(), "http://127.0.0.1:8545/");
}
