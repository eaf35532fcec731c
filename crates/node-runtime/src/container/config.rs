//! # Node Configuration
//!
//! Unified configuration for the node core and its collaborators.
//!
//! Defaults describe a mempool-only node. Environment overrides use the
//! `LC_` prefix, e.g. `LC_TX_INDEX=1 LC_ADDR_INDEX=1`.

use lc_01_mempool::MempoolConfig;
use lc_03_indexing::DEFAULT_MAX_TXS;

use crate::genesis::GenesisConfig;
use crate::telemetry::TelemetryConfig;

/// Complete node configuration.
#[derive(Debug, Clone, Default)]
pub struct NodeConfig {
    /// Optional indexes.
    pub indexes: IndexConfig,
    /// Mempool policy.
    pub mempool: MempoolConfig,
    /// Relay behavior.
    pub relay: RelayConfig,
    /// Reconciler mailbox.
    pub reconciler: ReconcilerConfig,
    /// Event bus sizing.
    pub bus: BusConfig,
    /// Logging.
    pub telemetry: TelemetryConfig,
    /// Development genesis block.
    pub genesis: GenesisConfig,
}

impl NodeConfig {
    /// Every index enabled, permissive mempool.
    pub fn full_for_testing() -> Self {
        Self {
            indexes: IndexConfig {
                tx_index: true,
                addr_index: true,
                token_index: true,
                ..Default::default()
            },
            mempool: MempoolConfig::for_testing(),
            ..Default::default()
        }
    }

    /// Rejects combinations the node cannot run with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.indexes.token_index && !self.indexes.tx_index {
            return Err(ConfigError::TokenIndexRequiresTxIndex);
        }
        if self.indexes.max_txs == 0 {
            return Err(ConfigError::ZeroValue("indexes.max_txs"));
        }
        if self.reconciler.queue_capacity == 0 {
            return Err(ConfigError::ZeroValue("reconciler.queue_capacity"));
        }
        if self.bus.capacity == 0 {
            return Err(ConfigError::ZeroValue("bus.capacity"));
        }
        Ok(())
    }

    /// Defaults overridden by `LC_*` process environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Defaults overridden by whatever `lookup` returns for each `LC_*` key.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();
        let env = EnvReader { lookup: &lookup };

        if let Some(v) = env.flag("LC_TX_INDEX")? {
            config.indexes.tx_index = v;
        }
        if let Some(v) = env.flag("LC_ADDR_INDEX")? {
            config.indexes.addr_index = v;
        }
        if let Some(v) = env.flag("LC_TOKEN_INDEX")? {
            config.indexes.token_index = v;
        }
        if let Some(v) = env.number("LC_MAX_TXS")? {
            config.indexes.max_txs = v;
        }
        if let Some(v) = env.number("LC_MIN_RELAY_FEE")? {
            config.mempool.min_relay_fee = v;
        }
        if let Some(v) = env.number("LC_MEMPOOL_MAX_BYTES")? {
            config.mempool.max_size_bytes = v;
        }
        if let Some(v) = env.number("LC_COINBASE_MATURITY")? {
            config.mempool.coinbase_maturity = v;
        }
        if let Some(v) = env.flag("LC_SELFISH")? {
            config.relay.selfish = v;
        }
        if let Some(v) = env.number("LC_QUEUE_CAPACITY")? {
            config.reconciler.queue_capacity = v;
        }
        if let Some(v) = env.number("LC_BUS_CAPACITY")? {
            config.bus.capacity = v;
        }
        if let Some(v) = lookup("LC_LOG_LEVEL") {
            config.telemetry.log_level = v;
        }
        if let Some(v) = env.flag("LC_LOG_JSON")? {
            config.telemetry.json = v;
        }
        if let Some(v) = lookup("LC_GENESIS_ADDRESS") {
            config.genesis.payout = decode_payout(&v)?;
        }
        if let Some(v) = env.number("LC_GENESIS_TIME")? {
            config.genesis.time = v;
        }

        Ok(config)
    }
}

struct EnvReader<'a, F> {
    lookup: &'a F,
}

impl<F> EnvReader<'_, F>
where
    F: Fn(&str) -> Option<String>,
{
    fn flag(&self, key: &'static str) -> Result<Option<bool>, ConfigError> {
        let Some(value) = (self.lookup)(key) else {
            return Ok(None);
        };
        match value.trim().to_ascii_lowercase().as_str() {
            "1" | "true" | "yes" | "on" => Ok(Some(true)),
            "0" | "false" | "no" | "off" => Ok(Some(false)),
            _ => Err(ConfigError::InvalidEnv { key, value }),
        }
    }

    fn number<T: std::str::FromStr>(&self, key: &'static str) -> Result<Option<T>, ConfigError> {
        let Some(value) = (self.lookup)(key) else {
            return Ok(None);
        };
        value
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| ConfigError::InvalidEnv { key, value })
    }
}

fn decode_payout(value: &str) -> Result<[u8; 20], ConfigError> {
    let invalid = || ConfigError::InvalidEnv {
        key: "LC_GENESIS_ADDRESS",
        value: value.to_string(),
    };
    let bytes = hex::decode(value.trim()).map_err(|_| invalid())?;
    bytes.try_into().map_err(|_| invalid())
}

/// Configuration errors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    /// The token index resolves transactions through the tx index.
    TokenIndexRequiresTxIndex,
    /// A size or capacity that must be positive is zero.
    ZeroValue(&'static str),
    /// An environment override could not be parsed.
    InvalidEnv { key: &'static str, value: String },
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::TokenIndexRequiresTxIndex => write!(
                f,
                "token index requires the tx index; set LC_TX_INDEX=1 or disable LC_TOKEN_INDEX"
            ),
            ConfigError::ZeroValue(field) => write!(f, "{field} must be greater than zero"),
            ConfigError::InvalidEnv { key, value } => {
                write!(f, "invalid value for {key}: {value:?}")
            }
        }
    }
}

impl std::error::Error for ConfigError {}

/// Optional indexes. The mempool is always present.
#[derive(Debug, Clone)]
pub struct IndexConfig {
    pub tx_index: bool,
    pub addr_index: bool,
    pub token_index: bool,
    /// Cap on confirmed history results per address query.
    pub max_txs: usize,
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self {
            tx_index: false,
            addr_index: false,
            token_index: false,
            max_txs: DEFAULT_MAX_TXS,
        }
    }
}

/// Relay configuration.
#[derive(Debug, Clone, Default)]
pub struct RelayConfig {
    /// Non-cooperative relay. Passive announcement is off, so the
    /// submission path broadcasts accepted transactions itself.
    pub selfish: bool,
}

/// Reconciler configuration.
#[derive(Debug, Clone)]
pub struct ReconcilerConfig {
    /// Chain events buffered before the chain adapter waits.
    pub queue_capacity: usize,
}

impl Default for ReconcilerConfig {
    fn default() -> Self {
        Self {
            queue_capacity: 1024,
        }
    }
}

/// Event bus configuration.
#[derive(Debug, Clone)]
pub struct BusConfig {
    pub capacity: usize,
}

impl Default for BusConfig {
    fn default() -> Self {
        Self {
            capacity: shared_bus::DEFAULT_CHANNEL_CAPACITY,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults_are_valid() {
        let config = NodeConfig::default();
        assert!(config.validate().is_ok());
        assert!(!config.indexes.tx_index);
        assert_eq!(config.indexes.max_txs, DEFAULT_MAX_TXS);
        assert!(!config.relay.selfish);
    }

    #[test]
    fn test_token_index_requires_tx_index() {
        let mut config = NodeConfig::default();
        config.indexes.token_index = true;
        assert_eq!(config.validate(), Err(ConfigError::TokenIndexRequiresTxIndex));
        config.indexes.tx_index = true;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_env_overrides() {
        let config = NodeConfig::from_lookup(lookup(&[
            ("LC_TX_INDEX", "1"),
            ("LC_ADDR_INDEX", "true"),
            ("LC_MAX_TXS", "25"),
            ("LC_SELFISH", "yes"),
            ("LC_LOG_LEVEL", "debug"),
            ("LC_GENESIS_ADDRESS", "0101010101010101010101010101010101010101"),
        ]))
        .unwrap();

        assert!(config.indexes.tx_index);
        assert!(config.indexes.addr_index);
        assert!(!config.indexes.token_index);
        assert_eq!(config.indexes.max_txs, 25);
        assert!(config.relay.selfish);
        assert_eq!(config.telemetry.log_level, "debug");
        assert_eq!(config.genesis.payout, [1; 20]);
    }

    #[test]
    fn test_invalid_env_value() {
        let err = NodeConfig::from_lookup(lookup(&[("LC_MAX_TXS", "lots")])).unwrap_err();
        assert_eq!(
            err,
            ConfigError::InvalidEnv {
                key: "LC_MAX_TXS",
                value: "lots".into()
            }
        );
        assert!(NodeConfig::from_lookup(lookup(&[("LC_GENESIS_ADDRESS", "abcd")])).is_err());
    }
}
