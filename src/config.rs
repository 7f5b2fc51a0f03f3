use crate::domain::Network;
use std::collections::HashMap;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    pub network: Network,
    pub wallet_poll_ms: u64,
    pub ledger_sync_ms: u64,
    pub fee_probe_lovelace: u64,
    pub build_settle_ms: u64,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Invalid value for {0}: {1}")]
    InvalidValue(String, String),
}

impl Default for Config {
    fn default() -> Self {
        Self {
            network: Network::Preview,
            wallet_poll_ms: 10_000,
            ledger_sync_ms: 5_000,
            fee_probe_lovelace: 2_000_000,
            build_settle_ms: 100,
        }
    }
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_env_map(std::env::vars().collect())
    }

    pub fn from_env_map(env_map: HashMap<String, String>) -> Result<Self, ConfigError> {
        let defaults = Config::default();

        let network = match env_map.get("CASUMA_NETWORK") {
            Some(s) => s
                .parse::<Network>()
                .map_err(|reason| ConfigError::InvalidValue("CASUMA_NETWORK".to_string(), reason))?,
            None => defaults.network,
        };

        let wallet_poll_ms = parse_ms(&env_map, "WALLET_POLL_MS", defaults.wallet_poll_ms)?;
        let ledger_sync_ms = parse_ms(&env_map, "LEDGER_SYNC_MS", defaults.ledger_sync_ms)?;
        let build_settle_ms = match env_map.get("BUILD_SETTLE_MS") {
            Some(s) => s.parse::<u64>().map_err(|_| {
                ConfigError::InvalidValue(
                    "BUILD_SETTLE_MS".to_string(),
                    "must be a valid u64".to_string(),
                )
            })?,
            None => defaults.build_settle_ms,
        };

        let fee_probe_lovelace = match env_map.get("FEE_PROBE_LOVELACE") {
            Some(s) => s.parse::<u64>().ok().filter(|n| *n > 0).ok_or_else(|| {
                ConfigError::InvalidValue(
                    "FEE_PROBE_LOVELACE".to_string(),
                    "must be a positive lovelace amount".to_string(),
                )
            })?,
            None => defaults.fee_probe_lovelace,
        };

        Ok(Config {
            network,
            wallet_poll_ms,
            ledger_sync_ms,
            fee_probe_lovelace,
            build_settle_ms,
        })
    }

    pub fn wallet_poll(&self) -> Duration {
        Duration::from_millis(self.wallet_poll_ms)
    }

    pub fn ledger_sync(&self) -> Duration {
        Duration::from_millis(self.ledger_sync_ms)
    }

    pub fn build_settle(&self) -> Duration {
        Duration::from_millis(self.build_settle_ms)
    }
}

/// Poll periods must be non-zero; a zero period would spin.
fn parse_ms(env_map: &HashMap<String, String>, key: &str, default: u64) -> Result<u64, ConfigError> {
    match env_map.get(key) {
        Some(s) => s.parse::<u64>().ok().filter(|n| *n > 0).ok_or_else(|| {
            ConfigError::InvalidValue(key.to_string(), "must be a positive u64".to_string())
        }),
        None => Ok(default),
    }
}
