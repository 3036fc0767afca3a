//! Per-network deployment manifest.
//!
//! Records every contract the orchestrator created, so that an upgrade can
//! be checked against what was actually deployed: the proxy must be known,
//! its recorded implementation must match the chain, and the recorded
//! layout is the baseline for the compatibility check.

use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::path::Path;

use alloy_primitives::Address;
use serde::{Deserialize, Serialize};

use crate::error::ErrorKind;
use crate::logic::{StorageLayout, TokenLogic};
use crate::network::TxHash;
use crate::persist::write_atomic;

pub const MANIFEST_VERSION: u8 = 1;

#[derive(Debug, thiserror::Error)]
pub enum ManifestError {
    #[error("manifest io error: {0}")]
    Io(#[from] io::Error),
    #[error("malformed manifest: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("manifest belongs to network `{found}`, expected `{expected}`")]
    NetworkMismatch { expected: String, found: String },
    #[error("unsupported manifest version {0}")]
    UnsupportedVersion(u8),
}

impl ManifestError {
    pub fn kind(&self) -> ErrorKind {
        ErrorKind::InvalidInput
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenRecord {
    pub logic: String,
    pub tx_hash: TxHash,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImplementationRecord {
    pub logic: String,
    pub version: u32,
    pub layout: StorageLayout,
    pub tx_hash: TxHash,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProxyRecord {
    pub implementation: Address,
    pub tx_hash: TxHash,
    /// Earlier implementations, oldest first.
    #[serde(default)]
    pub history: Vec<Address>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeploymentManifest {
    pub version: u8,
    pub network: String,
    #[serde(default)]
    pub tokens: BTreeMap<Address, TokenRecord>,
    #[serde(default)]
    pub implementations: BTreeMap<Address, ImplementationRecord>,
    #[serde(default)]
    pub proxies: BTreeMap<Address, ProxyRecord>,
}

impl DeploymentManifest {
    pub fn new(network: &str) -> Self {
        Self {
            version: MANIFEST_VERSION,
            network: network.to_string(),
            tokens: BTreeMap::new(),
            implementations: BTreeMap::new(),
            proxies: BTreeMap::new(),
        }
    }

    /// Loads the manifest at `path`; a missing file is an empty manifest.
    pub fn load(path: &Path, network: &str) -> Result<Self, ManifestError> {
        let bytes = match fs::read(path) {
            Ok(bytes) => bytes,
            Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(Self::new(network)),
            Err(err) => return Err(err.into()),
        };
        let manifest: Self = serde_json::from_slice(&bytes)?;
        if manifest.version != MANIFEST_VERSION {
            return Err(ManifestError::UnsupportedVersion(manifest.version));
        }
        if manifest.network != network {
            return Err(ManifestError::NetworkMismatch {
                expected: network.to_string(),
                found: manifest.network,
            });
        }
        Ok(manifest)
    }

    pub fn save(&self, path: &Path) -> Result<(), ManifestError> {
        write_atomic(path, &serde_json::to_vec_pretty(self)?)?;
        Ok(())
    }

    pub fn record_token(&mut self, address: Address, logic: &str, tx_hash: TxHash) {
        self.tokens.insert(
            address,
            TokenRecord {
                logic: logic.to_string(),
                tx_hash,
            },
        );
    }

    pub fn record_implementation(&mut self, address: Address, logic: &dyn TokenLogic, tx_hash: TxHash) {
        self.implementations.insert(
            address,
            ImplementationRecord {
                logic: logic.id().to_string(),
                version: logic.version(),
                layout: logic.layout(),
                tx_hash,
            },
        );
    }

    pub fn record_proxy(&mut self, proxy: Address, implementation: Address, tx_hash: TxHash) {
        self.proxies.insert(
            proxy,
            ProxyRecord {
                implementation,
                tx_hash,
                history: Vec::new(),
            },
        );
    }

    /// Moves `proxy` to `implementation`, keeping the previous pointer in
    /// its history. Returns false when the proxy is unknown.
    pub fn record_upgrade(&mut self, proxy: Address, implementation: Address) -> bool {
        match self.proxies.get_mut(&proxy) {
            Some(record) => {
                let previous = std::mem::replace(&mut record.implementation, implementation);
                record.history.push(previous);
                true
            }
            None => false,
        }
    }

    pub fn implementation_of(&self, proxy: Address) -> Option<(Address, &ImplementationRecord)> {
        let record = self.proxies.get(&proxy)?;
        let implementation = self.implementations.get(&record.implementation)?;
        Some((record.implementation, implementation))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use alloy_primitives::B256;

    use crate::logic::{CustomTokenFinal, CustomTokenUpgradeable};

    const PROXY: Address = Address::repeat_byte(0x01);
    const V1: Address = Address::repeat_byte(0x02);
    const V2: Address = Address::repeat_byte(0x03);

    #[test]
    fn missing_file_loads_empty() {
        let dir = tempfile::tempdir().unwrap();
        let manifest = DeploymentManifest::load(&dir.path().join("none.json"), "dev").unwrap();
        assert_eq!(manifest, DeploymentManifest::new("dev"));
    }

    #[test]
    fn upgrade_history_survives_save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("dev.json");

        let mut manifest = DeploymentManifest::new("dev");
        manifest.record_implementation(V1, &CustomTokenUpgradeable, B256::repeat_byte(1));
        manifest.record_proxy(PROXY, V1, B256::repeat_byte(2));
        manifest.record_implementation(V2, &CustomTokenFinal, B256::repeat_byte(3));
        assert!(manifest.record_upgrade(PROXY, V2));
        assert!(!manifest.record_upgrade(V1, V2));
        manifest.save(&path).unwrap();

        let loaded = DeploymentManifest::load(&path, "dev").unwrap();
        assert_eq!(loaded, manifest);
        let (current, record) = loaded.implementation_of(PROXY).unwrap();
        assert_eq!(current, V2);
        assert_eq!(record.version, 2);
        assert_eq!(loaded.proxies[&PROXY].history, vec![V1]);
    }

    #[test]
    fn manifest_of_another_network_is_refused() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("m.json");
        DeploymentManifest::new("sepolia").save(&path).unwrap();
        assert!(matches!(
            DeploymentManifest::load(&path, "mainnet"),
            Err(ManifestError::NetworkMismatch { .. })
        ));
    }
}
