//! Configuration management for vaultlink
//!
//! Loads configuration from TOML files with environment variable substitution.

use crate::chain::{recommended_confirmations, ChainId};

use anyhow::{Context, Result};
use serde::Deserialize;
use std::collections::HashMap;
use std::env;
use std::path::PathBuf;
use std::time::Duration;

/// Root configuration structure
#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    pub session: SessionConfig,
    pub chains: HashMap<String, ChainConfig>,
    #[serde(default)]
    pub registry: RegistryConfig,
    #[serde(default)]
    pub aggregator: AggregatorConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub monitor: MonitorConfig,
    #[serde(default)]
    pub metrics: MetricsConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SessionConfig {
    /// Fallback chain when nothing has been selected; 0 means unselected
    pub default_chain: ChainId,
    #[serde(default = "default_connect_timeout_ms")]
    pub connect_timeout_ms: u64,
    #[serde(default = "default_true")]
    pub restore_last_wallet: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ChainConfig {
    pub chain_id: u64,
    pub name: String,
    pub family: ChainFamily,
    #[serde(default)]
    pub rpc_urls: Vec<String>,
    pub confirmation_blocks: Option<u64>,
    pub enabled: bool,
}

impl ChainConfig {
    pub fn id(&self) -> ChainId {
        ChainId::Network(self.chain_id)
    }

    /// Configured confirmation depth, or the recommended depth for this chain
    pub fn confirmation_depth(&self) -> u64 {
        self.confirmation_blocks
            .unwrap_or_else(|| recommended_confirmations(self.chain_id))
    }
}

/// Wallet ecosystem a chain belongs to; decides which wallets it offers
#[derive(Debug, Clone, Copy, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ChainFamily {
    Evm,
    Solana,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RegistryConfig {
    pub poll_interval_ms: u64,
    /// Blocks to wait for a receipt before settling to `Error`
    pub timeout_blocks: u64,
    pub max_wait_secs: u64,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: 4_000,
            timeout_blocks: 250,
            max_wait_secs: 3_600,
        }
    }
}

impl RegistryConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn max_wait(&self) -> Duration {
        Duration::from_secs(self.max_wait_secs)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct AggregatorConfig {
    pub default_interval_ms: u64,
    /// Per-source overrides keyed by source name
    #[serde(default)]
    pub intervals: HashMap<String, u64>,
}

impl Default for AggregatorConfig {
    fn default() -> Self {
        Self {
            default_interval_ms: 15_000,
            intervals: HashMap::new(),
        }
    }
}

impl AggregatorConfig {
    pub fn interval_for(&self, source: &str) -> Duration {
        let ms = self
            .intervals
            .get(source)
            .copied()
            .unwrap_or(self.default_interval_ms);
        Duration::from_millis(ms)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct StorageConfig {
    pub backend: StorageBackend,
    pub path: Option<String>,
    pub url: Option<String>,
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            backend: StorageBackend::Memory,
            path: None,
            url: None,
            max_connections: default_max_connections(),
        }
    }
}

#[derive(Debug, Clone, Copy, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    Memory,
    File,
    Postgres,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct MonitorConfig {
    #[serde(default)]
    pub accounts: Vec<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct MetricsConfig {
    pub enabled: bool,
}

fn default_connect_timeout_ms() -> u64 {
    60_000
}

fn default_max_connections() -> u32 {
    5
}

fn default_true() -> bool {
    true
}

impl Settings {
    /// Load settings from configuration files
    pub fn load() -> Result<Self> {
        let config_path = env::var("VAULTLINK_CONFIG")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("config/default.toml"));

        let config_str = std::fs::read_to_string(&config_path)
            .with_context(|| format!("Failed to read config file: {:?}", config_path))?;

        Self::from_toml_str(&config_str)
    }

    /// Parse and validate an in-memory TOML document
    pub fn from_toml_str(input: &str) -> Result<Self> {
        // Substitute environment variables
        let config_str = substitute_env_vars(input);

        let settings: Settings =
            toml::from_str(&config_str).with_context(|| "Failed to parse configuration")?;

        settings.validate()?;

        Ok(settings)
    }

    /// Validate configuration
    fn validate(&self) -> Result<()> {
        // At least one chain must be enabled
        if self.enabled_chains().is_empty() {
            anyhow::bail!("At least one chain must be enabled");
        }

        for (name, chain) in &self.chains {
            if chain.enabled && chain.family == ChainFamily::Evm && chain.rpc_urls.is_empty() {
                anyhow::bail!("Chain {} has no RPC URLs configured", name);
            }
            if chain.chain_id == 0 {
                anyhow::bail!("Chain {} uses reserved chain id 0", name);
            }
        }

        if let ChainId::Network(id) = self.session.default_chain {
            if !self.enabled_chains().iter().any(|(_, c)| c.chain_id == id) {
                anyhow::bail!("Default chain {} is not an enabled chain", id);
            }
        }

        if self.registry.poll_interval_ms == 0 || self.aggregator.default_interval_ms == 0 {
            anyhow::bail!("Poll intervals must be non-zero");
        }
        for (source, ms) in &self.aggregator.intervals {
            if *ms == 0 {
                anyhow::bail!("Poll interval for source {} must be non-zero", source);
            }
        }

        if self.storage.backend == StorageBackend::File && self.storage.path.is_none() {
            anyhow::bail!("File storage requires a path");
        }
        if self.storage.backend == StorageBackend::Postgres && self.storage.url.is_none() {
            anyhow::bail!("Postgres storage requires a url");
        }

        Ok(())
    }

    /// Get list of enabled chains
    pub fn enabled_chains(&self) -> Vec<(&String, &ChainConfig)> {
        self.chains.iter().filter(|(_, c)| c.enabled).collect()
    }

    /// Get chain config by chain ID
    pub fn get_chain_by_id(&self, chain_id: u64) -> Option<&ChainConfig> {
        self.chains.values().find(|c| c.chain_id == chain_id)
    }
}

/// Substitute environment variables in the format ${VAR_NAME}
fn substitute_env_vars(input: &str) -> String {
    let mut result = input.to_string();
    let re = match regex::Regex::new(r"\$\{([A-Z_][A-Z0-9_]*)\}") {
        Ok(re) => re,
        Err(_) => return result,
    };

    for cap in re.captures_iter(input) {
        let var_name = &cap[1];
        let var_value = env::var(var_name).unwrap_or_default();
        result = result.replace(&cap[0], &var_value);
    }

    result
}
