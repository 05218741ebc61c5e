//! Signer selection.

use alloy_core::primitives::Address;
use alloy_signer_local::PrivateKeySigner;

use super::ChainClient;
use crate::{DeployError, NetworkConfig};

/// The identity submitting deployment transactions.
///
/// Exactly one transaction per signer is outstanding at any time: the orchestrator waits
/// for each confirmation before submitting the next.
#[derive(Debug, Clone)]
pub enum DeploySigner {
    /// An account unlocked on the node itself; the node signs.
    Unlocked(Address),
    /// A local private key; transactions are signed before submission.
    Local(PrivateKeySigner),
}

impl DeploySigner {
    pub fn address(&self) -> Address {
        match self {
            DeploySigner::Unlocked(address) => *address,
            DeploySigner::Local(signer) => signer.address(),
        }
    }

    /// Use the configured credential, or fall back to the node's first account on a local
    /// network.
    pub async fn select<C: ChainClient>(
        config: &NetworkConfig,
        chain: &C,
    ) -> Result<Self, DeployError> {
        match &config.private_key {
            Some(credential) => {
                let signer = credential
                    .expose()
                    .trim()
                    .parse::<PrivateKeySigner>()
                    .map_err(|e| {
                        DeployError::Configuration(format!("invalid deployer private key: {e}"))
                    })?;
                tracing::debug!(address = %signer.address(), "Using configured deployer key");
                Ok(Self::Local(signer))
            }
            None if config.local => {
                let address = chain.default_account().await?;
                tracing::debug!(%address, "Using the node's default account");
                Ok(Self::Unlocked(address))
            }
            None => Err(DeployError::Configuration(format!(
                "network `{}` requires a deployer credential",
                config.name
            ))),
        }
    }
}
