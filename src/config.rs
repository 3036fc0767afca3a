//! Network configuration.
//!
//! # Resolution order
//!
//! 1. An entry with the requested name in the `--config` JSON file
//! 2. A built-in network: `dev`, `localhost`, `sepolia`, `mainnet`
//!
//! Secrets never live in the file; they are filled in from [`Secrets`]
//! (populated from `ALCHEMY_API_KEY` / `ETHERSCAN_API_KEY`) when the entry
//! leaves them unset.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::ErrorKind;

/// Confirmations awaited on public networks before verification.
pub const PUBLIC_CONFIRMATIONS: u64 = 6;

const DEFAULT_POLL_INTERVAL_MS: u64 = 4_000;
const ETHERSCAN_MAINNET_API: &str = "https://api.etherscan.io/api";
const ETHERSCAN_SEPOLIA_API: &str = "https://api-sepolia.etherscan.io/api";
const LOCALHOST_RPC: &str = "http://127.0.0.1:8545";

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("cannot read config file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid config file {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("unknown network `{0}`")]
    UnknownNetwork(String),
    #[error("network `{network}` requires {variable} to be set")]
    MissingSecret {
        network: String,
        variable: &'static str,
    },
}

impl ConfigError {
    pub fn kind(&self) -> ErrorKind {
        ErrorKind::InvalidInput
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Endpoint {
    /// In-process chain persisted to `state_file`.
    Dev { state_file: PathBuf },
    Rpc { url: String },
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct NetworkConfig {
    pub name: String,
    pub endpoint: Endpoint,
    /// Confirmations awaited before verification. A verifying network
    /// with no target (or zero) waits for [`PUBLIC_CONFIRMATIONS`].
    #[serde(default)]
    pub confirmations: u64,
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
    /// Off for local networks: the confirmation wait and explorer
    /// verification are both skipped.
    #[serde(default)]
    pub verify: bool,
    #[serde(default)]
    pub explorer_url: Option<String>,
    #[serde(default, skip_serializing)]
    pub explorer_api_key: Option<String>,
    pub manifest: PathBuf,
}

fn default_poll_interval_ms() -> u64 {
    DEFAULT_POLL_INTERVAL_MS
}

impl NetworkConfig {
    pub fn dev() -> Self {
        Self {
            name: "dev".into(),
            endpoint: Endpoint::Dev {
                state_file: PathBuf::from(".ctk/dev-chain.json"),
            },
            confirmations: 0,
            poll_interval_ms: DEFAULT_POLL_INTERVAL_MS,
            verify: false,
            explorer_url: None,
            explorer_api_key: None,
            manifest: manifest_path("dev"),
        }
    }

    pub fn localhost() -> Self {
        Self {
            name: "localhost".into(),
            endpoint: Endpoint::Rpc {
                url: LOCALHOST_RPC.into(),
            },
            ..Self::dev()
        }
        .with_manifest(manifest_path("localhost"))
    }

    fn alchemy(name: &str, subdomain: &str, explorer: &str, secrets: &Secrets) -> Result<Self, ConfigError> {
        let key = secrets
            .alchemy_api_key
            .as_deref()
            .ok_or_else(|| ConfigError::MissingSecret {
                network: name.to_string(),
                variable: "ALCHEMY_API_KEY",
            })?;
        Ok(Self {
            name: name.to_string(),
            endpoint: Endpoint::Rpc {
                url: format!("https://{subdomain}.g.alchemy.com/v2/{key}"),
            },
            confirmations: PUBLIC_CONFIRMATIONS,
            poll_interval_ms: DEFAULT_POLL_INTERVAL_MS,
            verify: true,
            explorer_url: Some(explorer.to_string()),
            explorer_api_key: secrets.etherscan_api_key.clone(),
            manifest: manifest_path(name),
        })
    }

    pub fn with_manifest(mut self, manifest: PathBuf) -> Self {
        self.manifest = manifest;
        self
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    fn complete(mut self, secrets: &Secrets) -> Self {
        if self.explorer_api_key.is_none() {
            self.explorer_api_key = secrets.etherscan_api_key.clone();
        }
        if self.verify && self.confirmations == 0 {
            self.confirmations = PUBLIC_CONFIRMATIONS;
        }
        self
    }
}

fn manifest_path(network: &str) -> PathBuf {
    PathBuf::from(".ctk").join(format!("{network}.json"))
}

#[derive(Clone, Debug, Default)]
pub struct Secrets {
    pub alchemy_api_key: Option<String>,
    pub etherscan_api_key: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct ConfigFile {
    #[serde(default)]
    pub networks: BTreeMap<String, NetworkConfig>,
}

impl ConfigFile {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let bytes = fs::read(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        serde_json::from_slice(&bytes).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }
}

pub fn builtin(name: &str, secrets: &Secrets) -> Result<NetworkConfig, ConfigError> {
    match name {
        "dev" | "hardhat" => Ok(NetworkConfig::dev()),
        "localhost" => Ok(NetworkConfig::localhost()),
        "sepolia" => NetworkConfig::alchemy(name, "eth-sepolia", ETHERSCAN_SEPOLIA_API, secrets),
        "mainnet" => NetworkConfig::alchemy(name, "eth-mainnet", ETHERSCAN_MAINNET_API, secrets),
        other => Err(ConfigError::UnknownNetwork(other.to_string())),
    }
}

pub fn resolve_network(
    name: &str,
    file: Option<&ConfigFile>,
    secrets: &Secrets,
) -> Result<NetworkConfig, ConfigError> {
    if let Some(config) = file.and_then(|file| file.networks.get(name)) {
        return Ok(config.clone().complete(secrets));
    }
    builtin(name, secrets)
}
