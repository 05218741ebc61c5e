//! Error taxonomy for a deployment run.

use alloy_core::primitives::TxHash;

use crate::DeploymentManifest;

/// Errors that can abort a deployment run.
///
/// None of these are retried: a deployment transaction is costly and not idempotent,
/// so the first error ends the run and is surfaced as-is.
#[derive(Debug, thiserror::Error)]
pub enum DeployError {
    /// The network configuration is incomplete or inconsistent.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// A constructor argument references a contract that has no confirmed address yet.
    #[error("dependency error: `{contract}` references `{reference}`, which has no confirmed deployment")]
    Dependency { contract: String, reference: String },

    /// The deployment plan itself is malformed.
    #[error("invalid deployment plan: {0}")]
    InvalidPlan(String),

    /// A compilation artifact is missing or cannot encode the requested call.
    #[error("artifact error for `{contract}`: {message}")]
    Artifact { contract: String, message: String },

    /// Transport or JSON-RPC failure while talking to the node.
    #[error("network error: {0}")]
    Network(String),

    /// The constructor reverted, either when the node simulated the deployment or after
    /// the transaction was mined. `tx_hash` is only known in the second case.
    #[error("deployment of `{contract}` reverted{}", revert_detail(.tx_hash, .reason))]
    DeploymentReverted {
        contract: String,
        tx_hash: Option<TxHash>,
        reason: Option<String>,
    },

    /// No receipt was observed within the confirmation policy.
    #[error("timed out after {waited_secs}s waiting for confirmation of tx {tx_hash}")]
    ConfirmationTimeout { tx_hash: TxHash, waited_secs: u64 },
}

impl DeployError {
    pub(crate) fn artifact(contract: &str, message: impl ToString) -> Self {
        Self::Artifact {
            contract: contract.to_string(),
            message: message.to_string(),
        }
    }

    /// A revert reported by the node before any transaction hash exists.
    ///
    /// The contract is not known at this level; see [`DeployError::for_contract`].
    pub fn rejected_by_node(reason: impl Into<String>) -> Self {
        Self::DeploymentReverted {
            contract: String::new(),
            tx_hash: None,
            reason: Some(reason.into()),
        }
    }

    /// Attribute a revert to `contract` if it is not attributed yet.
    pub fn for_contract(self, contract: &str) -> Self {
        match self {
            Self::DeploymentReverted {
                contract: unattributed,
                tx_hash,
                reason,
            } if unattributed.is_empty() => Self::DeploymentReverted {
                contract: contract.to_string(),
                tx_hash,
                reason,
            },
            other => other,
        }
    }
}

fn revert_detail(tx_hash: &Option<TxHash>, reason: &Option<String>) -> String {
    match (tx_hash, reason) {
        (Some(tx_hash), Some(reason)) => format!(" (tx {tx_hash}): {reason}"),
        (Some(tx_hash), None) => format!(" (tx {tx_hash})"),
        (None, Some(reason)) => format!(": {reason}"),
        (None, None) => String::new(),
    }
}

/// A run that stopped early.
///
/// Contracts confirmed before the failure stay on-chain; `manifest` lists exactly those.
#[derive(Debug, thiserror::Error)]
#[error("{error}")]
pub struct DeploymentFailure {
    /// Entries confirmed before the failure, in declared order.
    pub manifest: DeploymentManifest,
    /// The error that ended the run.
    #[source]
    pub error: DeployError,
}
