//! The network seam.
//!
//! Everything the orchestrator needs from a node goes through [`ChainClient`], so that a
//! run can be driven against a live JSON-RPC endpoint ([`RpcChain`]) or a scripted chain in
//! tests.

mod rpc;
mod signer;
mod tx;

use std::future::Future;

use alloy_core::primitives::{Address, Bytes, TxHash, U256};
use serde::{Deserialize, Serialize};

pub use rpc::RpcChain;
pub use signer::DeploySigner;

use crate::DeployError;

/// Receipt of an included transaction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TxReceipt {
    pub transaction_hash: TxHash,
    /// `false` when execution reverted.
    #[serde(deserialize_with = "rpc::deserialize_status")]
    pub status: bool,
    #[serde(default)]
    pub contract_address: Option<Address>,
    #[serde(deserialize_with = "rpc::deserialize_u64_from_hex")]
    pub block_number: u64,
    #[serde(deserialize_with = "rpc::deserialize_u64_from_hex")]
    pub gas_used: u64,
}

/// Operations the orchestrator needs from the network.
///
/// Implementations must not retry submissions on their own: a repeated deployment
/// transaction is a second contract.
pub trait ChainClient: Sync {
    /// Chain ID reported by the node.
    fn chain_id(&self) -> impl Future<Output = Result<u64, DeployError>> + Send;

    /// First account managed by the node, used as the signer on local networks.
    fn default_account(&self) -> impl Future<Output = Result<Address, DeployError>> + Send;

    /// Balance of `address` at the latest block, in wei.
    fn balance(&self, address: Address)
    -> impl Future<Output = Result<U256, DeployError>> + Send;

    /// Submit a contract-creation transaction and return its hash.
    fn submit_deployment(
        &self,
        signer: &DeploySigner,
        init_code: Bytes,
    ) -> impl Future<Output = Result<TxHash, DeployError>> + Send;

    /// Suspend until `tx_hash` is confirmed according to the client's confirmation policy.
    fn await_confirmation(
        &self,
        tx_hash: TxHash,
    ) -> impl Future<Output = Result<TxReceipt, DeployError>> + Send;

    /// Execute a read-only call against the latest block.
    fn call(&self, to: Address, data: Bytes)
    -> impl Future<Output = Result<Bytes, DeployError>> + Send;
}
