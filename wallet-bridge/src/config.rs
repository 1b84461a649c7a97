use std::time::Duration;

use anyhow::{Context, ensure};
use serde::{Deserialize, Serialize};
use serde_with::{DurationMilliSeconds, DurationSeconds, serde_as};

/// Tunables for the bridge. Every field has a default, so an empty TOML
/// document is a valid config.
#[serde_as]
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct BridgeConfig {
    /// The engine network to create the wallet on.
    pub network: String,
    /// Transaction list recomputes triggered within this window coalesce.
    #[serde_as(as = "DurationMilliSeconds<u64>")]
    pub list_debounce: Duration,
    /// How long one base-node sync round may take.
    #[serde_as(as = "DurationSeconds<u64>")]
    pub validation_timeout: Duration,
    pub sync_max_attempts: u32,
    pub required_confirmations: u64,
    /// The minimum fee per gram accepted by `send_tx`.
    pub min_fee: u64,
    /// Pending txs older than this get cancelled.
    #[serde_as(as = "DurationSeconds<u64>")]
    pub pending_tx_expiry: Duration,
    #[serde_as(as = "DurationSeconds<u64>")]
    pub expiry_check_interval: Duration,
    /// `RUST_LOG`-style filter for the host log sink.
    pub rust_log: String,
    pub event_bus_capacity: usize,
    /// How long background tasks get to finish after shutdown.
    #[serde_as(as = "DurationSeconds<u64>")]
    pub shutdown_timeout: Duration,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            network: "mainnet".to_owned(),
            list_debounce: Duration::from_millis(500),
            validation_timeout: Duration::from_secs(120),
            sync_max_attempts: 3,
            required_confirmations: 3,
            min_fee: 100,
            pending_tx_expiry: Duration::from_secs(3 * 24 * 60 * 60),
            expiry_check_interval: Duration::from_secs(30 * 60),
            rust_log: "info".to_owned(),
            event_bus_capacity: wallet_tokio::DEFAULT_CHANNEL_SIZE,
            shutdown_timeout: Duration::from_secs(5),
        }
    }
}

impl BridgeConfig {
    pub fn from_toml_str(s: &str) -> anyhow::Result<Self> {
        let config = toml::from_str::<Self>(s)
            .context("Failed to parse bridge config")?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        ensure!(!self.network.is_empty(), "network must not be empty");
        ensure!(self.sync_max_attempts > 0, "sync_max_attempts must be > 0");
        ensure!(self.event_bus_capacity > 0, "event_bus_capacity must be > 0");
        ensure!(
            !self.expiry_check_interval.is_zero(),
            "expiry_check_interval must be > 0"
        );
        Ok(())
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn empty_toml_is_default() {
        let config = BridgeConfig::from_toml_str("").unwrap();
        assert_eq!(config, BridgeConfig::default());
        assert_eq!(config.list_debounce, Duration::from_millis(500));
        assert_eq!(config.min_fee, 100);
    }

    #[test]
    fn overrides_and_units() {
        let config = BridgeConfig::from_toml_str(
            r#"
            network = "testnet"
            list_debounce = 250
            validation_timeout = 30
            rust_log = "wallet_bridge=debug"
            "#,
        )
        .unwrap();
        assert_eq!(config.network, "testnet");
        assert_eq!(config.list_debounce, Duration::from_millis(250));
        assert_eq!(config.validation_timeout, Duration::from_secs(30));
        assert_eq!(config.sync_max_attempts, 3);
    }

    #[test]
    fn rejects_unknown_and_invalid() {
        assert!(BridgeConfig::from_toml_str("debounce = 5").is_err());
        assert!(BridgeConfig::from_toml_str("sync_max_attempts = 0").is_err());
        assert!(BridgeConfig::from_toml_str("list_debounce = \"fast\"").is_err());
    }
}
