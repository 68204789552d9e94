use anyhow::{anyhow, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;
use tokio::fs;

use crate::ethereum::events::WatchSettings;
use crate::ethereum::provider::RetryPolicy;
use crate::ethereum::transaction::TxSettings;

pub const PRIVATE_KEYS_ENV: &str = "BRIDGE_PRIVATE_KEYS";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Bridge deployments keyed by token name (`usdt`, `dai`, ...).
    #[serde(default)]
    pub bridges: HashMap<String, BridgeConfig>,
    #[serde(default)]
    pub rpc: RpcConfig,
    #[serde(default)]
    pub watch: WatchConfig,
    #[serde(default)]
    pub pool: PoolConfig,
    #[serde(default)]
    pub scenario: ScenarioConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BridgeConfig {
    pub home_rpc: String,
    pub foreign_rpc: String,
    pub home_bridge: String,
    pub foreign_bridge: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RpcConfig {
    pub retry_delay_ms: u64,
    pub max_retries: u32,
    pub request_timeout_secs: u64,
    pub receipt_poll_interval_ms: u64,
    pub receipt_timeout_secs: u64,
    pub default_gas_price: u64,
    pub default_gas_limit: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WatchConfig {
    pub poll_interval_secs: u64,
    pub timeout_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PoolConfig {
    pub workers: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ScenarioConfig {
    /// One pool task per key.
    pub private_keys: Vec<String>,
    /// Time given to the bridge validators to relay a transfer.
    pub settle_secs: u64,
    /// Whole token units moved per task.
    pub units: u64,
}

impl Default for RpcConfig {
    fn default() -> Self {
        Self {
            retry_delay_ms: 1000,
            max_retries: 1,
            request_timeout_secs: 30,
            receipt_poll_interval_ms: 1000,
            receipt_timeout_secs: 60,
            default_gas_price: 9_000_000_000, // 9 Gwei
            default_gas_limit: 22_000,
        }
    }
}

impl Default for WatchConfig {
    fn default() -> Self {
        Self {
            poll_interval_secs: 5,
            timeout_secs: 120,
        }
    }
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self { workers: 5 }
    }
}

impl Default for ScenarioConfig {
    fn default() -> Self {
        Self {
            private_keys: Vec::new(),
            settle_secs: 30,
            units: 1,
        }
    }
}

impl RpcConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_retries: self.max_retries,
            delay: Duration::from_millis(self.retry_delay_ms),
        }
    }

    pub fn tx_settings(&self) -> TxSettings {
        TxSettings {
            poll_interval: Duration::from_millis(self.receipt_poll_interval_ms),
            confirm_timeout: Duration::from_secs(self.receipt_timeout_secs),
            default_gas_price: u128::from(self.default_gas_price),
            default_gas_limit: self.default_gas_limit,
        }
    }
}

impl WatchConfig {
    pub fn settings(&self) -> WatchSettings {
        WatchSettings {
            poll_interval: Duration::from_secs(self.poll_interval_secs),
            timeout: Duration::from_secs(self.timeout_secs),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        let mut bridges = HashMap::new();
        bridges.insert(
            "usdt".to_string(),
            BridgeConfig {
                home_rpc: "http://localhost:8545".to_string(),
                foreign_rpc: "http://localhost:8546".to_string(),
                home_bridge: "0x0000000000000000000000000000000000000000".to_string(),
                foreign_bridge: "0x0000000000000000000000000000000000000000".to_string(),
            },
        );

        Self {
            bridges,
            rpc: RpcConfig::default(),
            watch: WatchConfig::default(),
            pool: PoolConfig::default(),
            scenario: ScenarioConfig::default(),
        }
    }
}

impl Config {
    /// Load configuration from a TOML file
    pub async fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)
            .await
            .map_err(|e| anyhow!("Failed to read config file {:?}: {}", path, e))?;

        toml::from_str(&content)
            .map_err(|e| anyhow!("Failed to parse config file {:?}: {}", path, e))
    }

    pub async fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let path = path.as_ref();
        let content = toml::to_string_pretty(self)
            .map_err(|e| anyhow!("Failed to serialize config: {}", e))?;

        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                fs::create_dir_all(parent).await.map_err(|e| {
                    anyhow!("Failed to create config directory {:?}: {}", parent, e)
                })?;
            }
        }

        fs::write(path, content)
            .await
            .map_err(|e| anyhow!("Failed to write config file {:?}: {}", path, e))
    }

    /// Load configuration with fallback to default
    pub async fn load_or_default<P: AsRef<Path>>(path: Option<P>) -> Self {
        let mut config = match path {
            Some(path) => match Self::load_from_file(path).await {
                Ok(config) => {
                    tracing::info!("Loaded configuration from file");
                    config
                }
                Err(e) => {
                    tracing::warn!("Failed to load config file, using defaults: {}", e);
                    Self::default()
                }
            },
            None => Self::default(),
        };

        config.apply_env_vars();
        config
    }

    pub fn bridge(&self, token: &str) -> Result<&BridgeConfig> {
        self.bridges.get(token).ok_or_else(|| {
            let mut available: Vec<&str> = self.bridges.keys().map(String::as_str).collect();
            available.sort_unstable();
            anyhow!(
                "Bridge '{}' not configured. Available bridges: {}",
                token,
                available.join(", ")
            )
        })
    }

    fn apply_env_vars(&mut self) {
        self.apply_private_keys(std::env::var(PRIVATE_KEYS_ENV).ok());
    }

    fn apply_private_keys(&mut self, keys: Option<String>) {
        if let Some(keys) = keys {
            let keys: Vec<String> = keys
                .split(',')
                .map(str::trim)
                .filter(|k| !k.is_empty())
                .map(str::to_string)
                .collect();
            tracing::info!(
                "Using {} private keys from {} environment variable",
                keys.len(),
                PRIVATE_KEYS_ENV
            );
            self.scenario.private_keys = keys;
        } else if !self.scenario.private_keys.is_empty() {
            tracing::warn!(
                "Private keys are stored in the config file, consider setting {} instead",
                PRIVATE_KEYS_ENV
            );
        }
    }

    /// Patches one value, `section.key=value` style (e.g. `rpc.max_retries=3`
    /// or `bridges.dai.home_rpc=http://...`). The value is read as a TOML
    /// literal when it parses as one, otherwise as a string.
    pub fn apply_override(&mut self, assignment: &str) -> Result<()> {
        let (path, raw) = assignment
            .split_once('=')
            .ok_or_else(|| anyhow!("Override '{}' must look like key.path=value", assignment))?;
        let keys: Vec<&str> = path.trim().split('.').collect();
        if keys.iter().any(|k| k.is_empty()) {
            return Err(anyhow!("Invalid override key '{}'", path));
        }

        let mut document = toml::Value::try_from(&*self)
            .map_err(|e| anyhow!("Failed to serialize config: {}", e))?;

        let (last, parents) = keys
            .split_last()
            .ok_or_else(|| anyhow!("Invalid override key '{}'", path))?;
        let mut table = document
            .as_table_mut()
            .ok_or_else(|| anyhow!("Config is not a table"))?;
        for key in parents {
            table = table
                .entry(key.to_string())
                .or_insert_with(|| toml::Value::Table(toml::map::Map::new()))
                .as_table_mut()
                .ok_or_else(|| anyhow!("'{}' in '{}' is not a section", key, path))?;
        }
        table.insert(last.to_string(), parse_literal(raw.trim()));

        *self = document
            .try_into()
            .map_err(|e| anyhow!("Override '{}' produced an invalid config: {}", assignment, e))?;
        Ok(())
    }

    pub fn default_config_path() -> Result<std::path::PathBuf> {
        let config_dir =
            dirs::config_dir().ok_or_else(|| anyhow!("Could not determine config directory"))?;
        Ok(config_dir.join("bridge-client").join("config.toml"))
    }

    pub fn generate_sample() -> String {
        let sample_config = r#"# Bridge client configuration

# One section per bridged token, selected with --token
[bridges.usdt]
home_rpc = "http://localhost:8545"
foreign_rpc = "http://localhost:8546"
home_bridge = "0x0000000000000000000000000000000000000000"
foreign_bridge = "0x0000000000000000000000000000000000000000"

[bridges.dai]
home_rpc = "http://localhost:8545"
foreign_rpc = "http://localhost:8547"
home_bridge = "0x0000000000000000000000000000000000000000"
foreign_bridge = "0x0000000000000000000000000000000000000000"

[rpc]
retry_delay_ms = 1000          # connection failures are retried after this delay
max_retries = 1
request_timeout_secs = 30
receipt_poll_interval_ms = 1000
receipt_timeout_secs = 60
default_gas_price = 9_000_000_000  # 9 Gwei, used when the node reports 0
default_gas_limit = 22_000     # plain value transfers

[watch]
poll_interval_secs = 5
timeout_secs = 120

[pool]
workers = 5

[scenario]
settle_secs = 30
units = 1
# private_keys = ["0x..."]

# Environment variables that can be used:
# BRIDGE_PRIVATE_KEYS - comma separated private keys for the parallel scenario
"#;
        sample_config.to_string()
    }
}

fn parse_literal(raw: &str) -> toml::Value {
    #[derive(Deserialize)]
    struct Literal {
        v: toml::Value,
    }

    toml::from_str::<Literal>(&format!("v = {}", raw))
        .map(|literal| literal.v)
        .unwrap_or_else(|_| toml::Value::String(raw.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[tokio::test]
    async fn test_save_and_load_round_trip() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("nested").join("config.toml");

        let mut config = Config::default();
        config.pool.workers = 3;
        config.save_to_file(&path).await.unwrap();

        let loaded = Config::load_from_file(&path).await.unwrap();
        assert_eq!(loaded.pool.workers, 3);
        assert_eq!(loaded.bridge("usdt").unwrap().foreign_rpc, "http://localhost:8546");
    }

    #[tokio::test]
    async fn test_sample_parses() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.toml");
        fs::write(&path, Config::generate_sample()).await.unwrap();

        let config = Config::load_from_file(&path).await.unwrap();
        assert_eq!(config.bridges.len(), 2);
        assert_eq!(config.rpc.retry_policy(), RetryPolicy::default());
        assert_eq!(config.watch.settings().timeout, Duration::from_secs(120));
        assert!(config.scenario.private_keys.is_empty());
    }

    #[tokio::test]
    async fn test_partial_file_uses_defaults() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.toml");
        fs::write(&path, "[rpc]\nmax_retries = 0\n").await.unwrap();

        let config = Config::load_from_file(&path).await.unwrap();
        assert_eq!(config.rpc.max_retries, 0);
        assert_eq!(config.rpc.receipt_timeout_secs, 60);
        assert!(config.bridges.is_empty());
        assert!(config.bridge("usdt").is_err());
    }

    #[tokio::test]
    async fn test_missing_file_falls_back() {
        let dir = tempdir().unwrap();
        let config = Config::load_or_default(Some(dir.path().join("absent.toml"))).await;
        assert!(config.bridges.contains_key("usdt"));
    }

    #[test]
    fn test_overrides() {
        let mut config = Config::default();
        config.apply_override("rpc.max_retries=3").unwrap();
        config.apply_override("pool.workers = 8").unwrap();
        config
            .apply_override("bridges.usdt.home_rpc=http://10.0.0.1:8545")
            .unwrap();
        config
            .apply_override(r#"scenario.private_keys=["0x01", "0x02"]"#)
            .unwrap();

        assert_eq!(config.rpc.max_retries, 3);
        assert_eq!(config.pool.workers, 8);
        assert_eq!(config.bridge("usdt").unwrap().home_rpc, "http://10.0.0.1:8545");
        assert_eq!(config.scenario.private_keys, vec!["0x01", "0x02"]);

        assert!(config.apply_override("rpc.max_retries").is_err());
        assert!(config.apply_override("rpc.max_retries=lots").is_err());
        assert!(config.apply_override("rpc..x=1").is_err());
        // Failed overrides leave the config untouched.
        assert_eq!(config.rpc.max_retries, 3);
    }

    #[test]
    fn test_private_keys_from_env_value() {
        let mut config = Config::default();
        config.apply_private_keys(Some(" 0xaa, 0xbb ,,".to_string()));
        assert_eq!(config.scenario.private_keys, vec!["0xaa", "0xbb"]);

        config.apply_private_keys(None);
        assert_eq!(config.scenario.private_keys.len(), 2);
    }

    #[test]
    fn test_settings_conversion() {
        let rpc = RpcConfig::default();
        let tx = rpc.tx_settings();
        assert_eq!(tx.confirm_timeout, Duration::from_secs(60));
        assert_eq!(tx.default_gas_price, 9_000_000_000);
        assert_eq!(rpc.retry_policy().delay, Duration::from_secs(1));
    }
}
