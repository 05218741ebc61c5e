//! The record of a deployment run.

use std::path::Path;

use alloy_core::primitives::{Address, TxHash};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A labelled value read back from a deployed contract.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Fact {
    pub label: String,
    pub value: String,
}

/// A contract whose deployment has been confirmed on-chain.
///
/// There is no status field: an entry is only created once the receipt reports success
/// with the configured confirmation depth, so every entry is confirmed. Submitted,
/// reverted and timed-out deployments never appear. `block_number` is the block that
/// included the creation transaction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeployedContract {
    pub name: String,
    pub address: Address,
    pub tx_hash: TxHash,
    pub block_number: u64,
    pub gas_used: u64,
    /// Resolved constructor arguments, as passed to the encoder.
    pub args: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub facts: Vec<Fact>,
}

/// A resolved identity value, e.g. the operator bound to the deployer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResolvedIdentity {
    pub label: String,
    pub value: String,
}

/// Ordered record of the contracts deployed by one run.
///
/// Entries are only ever appended, each after its contract is confirmed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeploymentManifest {
    pub network: String,
    pub chain_id: u64,
    pub deployer: Address,
    pub timestamp: DateTime<Utc>,
    pub contracts: Vec<DeployedContract>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub identities: Vec<ResolvedIdentity>,
}

impl DeploymentManifest {
    pub fn new(network: impl Into<String>, chain_id: u64, deployer: Address) -> Self {
        Self {
            network: network.into(),
            chain_id,
            deployer,
            timestamp: Utc::now(),
            contracts: Vec::new(),
            identities: Vec::new(),
        }
    }

    /// Confirmed address of the contract named `name`.
    pub fn address_of(&self, name: &str) -> Option<Address> {
        self.contracts
            .iter()
            .find(|contract| contract.name == name)
            .map(|contract| contract.address)
    }

    pub fn to_json_pretty(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    /// Write the manifest as pretty JSON.
    pub fn save_to_file(&self, path: &Path) -> anyhow::Result<()> {
        use anyhow::Context;

        let content = self
            .to_json_pretty()
            .context("Failed to serialize deployment manifest")?;
        std::fs::write(path, content)
            .context(format!("Failed to write manifest to {}", path.display()))?;
        tracing::info!(path = %path.display(), "Manifest saved");
        Ok(())
    }
}
