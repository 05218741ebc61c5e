//! JSON-RPC chain client.

use std::time::{Duration, Instant};

use alloy_core::primitives::{Address, Bytes, TxHash, U256};
use serde::{Deserialize, Deserializer, de::DeserializeOwned};
use serde_json::{Value, json};
use url::Url;

use super::{
    ChainClient, DeploySigner, TxReceipt,
    tx::{deployment_tx, sign_legacy},
};
use crate::{ConfirmationPolicy, DeployError, NetworkConfig};

/// Default timeout for a single RPC request.
const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Headroom added on top of `eth_estimateGas`, in percent.
const GAS_LIMIT_MARGIN_PERCENT: u64 = 20;

/// Methods whose errors can carry a constructor revert.
const SUBMISSION_METHODS: &[&str] = &[
    "eth_estimateGas",
    "eth_sendTransaction",
    "eth_sendRawTransaction",
];

/// JSON-RPC error code nodes use for `execution reverted`.
const REVERT_ERROR_CODE: i64 = 3;

/// Whether a JSON-RPC error reports that execution reverted.
fn is_revert(code: Option<i64>, message: &str) -> bool {
    let message = message.to_lowercase();
    code == Some(REVERT_ERROR_CODE)
        || message.contains("execution reverted")
        || message.contains("vm exception")
}

/// Deserialize a u64 from a hex quantity (with 0x prefix).
pub(super) fn deserialize_u64_from_hex<'de, D>(deserializer: D) -> Result<u64, D::Error>
where
    D: Deserializer<'de>,
{
    let s = String::deserialize(deserializer)?;
    u64::from_str_radix(s.trim_start_matches("0x"), 16).map_err(serde::de::Error::custom)
}

/// Deserialize a receipt status (`0x1` success, `0x0` reverted).
pub(super) fn deserialize_status<'de, D>(deserializer: D) -> Result<bool, D::Error>
where
    D: Deserializer<'de>,
{
    deserialize_u64_from_hex(deserializer).map(|status| status == 1)
}

/// A [`ChainClient`] speaking JSON-RPC over HTTP.
#[derive(Debug, Clone)]
pub struct RpcChain {
    client: reqwest::Client,
    url: Url,
    chain_id: u64,
    gas_price: Option<u64>,
    confirmation: ConfirmationPolicy,
}

impl RpcChain {
    pub fn new(config: &NetworkConfig) -> Result<Self, DeployError> {
        let client = reqwest::Client::builder()
            .timeout(DEFAULT_REQUEST_TIMEOUT)
            .build()
            .map_err(|e| DeployError::Network(format!("failed to create HTTP client: {e}")))?;

        Ok(Self {
            client,
            url: config.url()?,
            chain_id: config.chain_id,
            gas_price: config.gas_price,
            confirmation: config.confirmation.clone(),
        })
    }

    /// Make a JSON-RPC call and deserialize the result.
    async fn request<T: DeserializeOwned>(
        &self,
        method: &str,
        params: Vec<Value>,
    ) -> Result<T, DeployError> {
        tracing::trace!(method, "RPC request");

        let response = self
            .client
            .post(self.url.clone())
            .json(&json!({
                "jsonrpc": "2.0",
                "method": method,
                "params": params,
                "id": 1
            }))
            .send()
            .await
            .map_err(|e| DeployError::Network(format!("failed to send {method} request: {e}")))?;

        let body: Value = response
            .json()
            .await
            .map_err(|e| DeployError::Network(format!("failed to parse {method} response: {e}")))?;

        if let Some(error) = body.get("error") {
            let message = error
                .get("message")
                .and_then(|m| m.as_str())
                .unwrap_or("unknown RPC error");
            let code = error.get("code").and_then(|c| c.as_i64());

            if SUBMISSION_METHODS.contains(&method) && is_revert(code, message) {
                tracing::debug!(method, code, message, "Node rejected the deployment as reverting");
                return Err(DeployError::rejected_by_node(message));
            }
            return Err(DeployError::Network(format!("{method} failed: {message}")));
        }

        let result = body
            .get("result")
            .cloned()
            .ok_or_else(|| DeployError::Network(format!("no result in {method} response")))?;

        serde_json::from_value(result).map_err(|e| {
            DeployError::Network(format!("failed to deserialize {method} result: {e}"))
        })
    }

    /// Request a hex-encoded u64 quantity.
    async fn quantity(&self, method: &str, params: Vec<Value>) -> Result<u64, DeployError> {
        let value: String = self.request(method, params).await?;
        u64::from_str_radix(value.trim_start_matches("0x"), 16).map_err(|e| {
            DeployError::Network(format!("invalid quantity `{value}` from {method}: {e}"))
        })
    }

    async fn gas_price(&self) -> Result<u128, DeployError> {
        if let Some(gas_price) = self.gas_price {
            return Ok(u128::from(gas_price));
        }
        let gas_price: U256 = self.request("eth_gasPrice", vec![]).await?;
        u128::try_from(gas_price)
            .map_err(|_| DeployError::Network(format!("gas price {gas_price} out of range")))
    }

    async fn block_number(&self) -> Result<u64, DeployError> {
        self.quantity("eth_blockNumber", vec![]).await
    }

    async fn receipt(&self, tx_hash: TxHash) -> Result<Option<TxReceipt>, DeployError> {
        self.request("eth_getTransactionReceipt", vec![json!(tx_hash)])
            .await
    }

    async fn send_signed(
        &self,
        signer: &alloy_signer_local::PrivateKeySigner,
        init_code: Bytes,
    ) -> Result<TxHash, DeployError> {
        let from = signer.address();

        let nonce = self
            .quantity("eth_getTransactionCount", vec![json!(from), json!("pending")])
            .await?;

        let gas_price = self.gas_price().await?;

        let estimate = self
            .quantity(
                "eth_estimateGas",
                vec![json!({ "from": from, "data": init_code })],
            )
            .await?;
        let gas_limit = estimate + estimate * GAS_LIMIT_MARGIN_PERCENT / 100;

        tracing::debug!(%from, nonce, gas_price, gas_limit, "Submitting signed deployment");

        let tx = deployment_tx(self.chain_id, nonce, gas_price, gas_limit, init_code);
        let raw = sign_legacy(tx, signer)?;
        self.request("eth_sendRawTransaction", vec![json!(raw)])
            .await
    }

    async fn send_unlocked(&self, from: Address, init_code: Bytes) -> Result<TxHash, DeployError> {
        let mut tx = json!({ "from": from, "data": init_code });
        if let Some(gas_price) = self.gas_price {
            tx["gasPrice"] = json!(format!("0x{gas_price:x}"));
        }

        tracing::debug!(%from, "Submitting deployment through the node's account");

        self.request("eth_sendTransaction", vec![tx]).await
    }
}

impl ChainClient for RpcChain {
    async fn chain_id(&self) -> Result<u64, DeployError> {
        self.quantity("eth_chainId", vec![]).await
    }

    async fn default_account(&self) -> Result<Address, DeployError> {
        let accounts: Vec<Address> = self.request("eth_accounts", vec![]).await?;
        accounts.into_iter().next().ok_or_else(|| {
            DeployError::Configuration(
                "the node exposes no accounts; configure a deployer credential".to_string(),
            )
        })
    }

    async fn balance(&self, address: Address) -> Result<U256, DeployError> {
        self.request("eth_getBalance", vec![json!(address), json!("latest")])
            .await
    }

    async fn submit_deployment(
        &self,
        signer: &DeploySigner,
        init_code: Bytes,
    ) -> Result<TxHash, DeployError> {
        match signer {
            DeploySigner::Unlocked(from) => self.send_unlocked(*from, init_code).await,
            DeploySigner::Local(key) => self.send_signed(key, init_code).await,
        }
    }

    async fn await_confirmation(&self, tx_hash: TxHash) -> Result<TxReceipt, DeployError> {
        let start = Instant::now();
        let policy = &self.confirmation;

        // The transaction is already submitted, so a failed poll is retried until the timeout.
        loop {
            match self.receipt(tx_hash).await {
                Ok(Some(receipt)) => match self.block_number().await {
                    Ok(head) => {
                        let depth = head.saturating_sub(receipt.block_number) + 1;
                        if depth >= policy.confirmations {
                            return Ok(receipt);
                        }
                        tracing::trace!(%tx_hash, depth, "Waiting for more confirmations...");
                    }
                    Err(e) => {
                        tracing::trace!(%tx_hash, error = %e, "Block number poll failed, retrying...");
                    }
                },
                Ok(None) => {
                    tracing::trace!(%tx_hash, "Receipt not available yet, polling...");
                }
                Err(e) => {
                    tracing::trace!(%tx_hash, error = %e, "Receipt poll failed, retrying...");
                }
            }

            if start.elapsed() >= policy.timeout() {
                return Err(DeployError::ConfirmationTimeout {
                    tx_hash,
                    waited_secs: start.elapsed().as_secs(),
                });
            }

            tokio::time::sleep(policy.poll_interval()).await;
        }
    }

    async fn call(&self, to: Address, data: Bytes) -> Result<Bytes, DeployError> {
        self.request(
            "eth_call",
            vec![json!({ "to": to, "data": data }), json!("latest")],
        )
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::{
        Mock, MockServer, ResponseTemplate,
        matchers::{body_partial_json, method},
    };

    const TX_HASH: &str = "0x88df016429689c079f3b2f6ad39fa052532c56795b733da78a91ebe6a713944b";
    const CONTRACT: &str = "0x5FbDB2315678afecb367f032d93F642f64180aa3";

    fn config(server: &MockServer) -> NetworkConfig {
        let mut config = NetworkConfig::local("test", &server.uri(), 1337);
        config.confirmation = ConfirmationPolicy {
            confirmations: 1,
            timeout_secs: 0,
            poll_interval_ms: 10,
        };
        config
    }

    async fn respond_error(server: &MockServer, rpc_method: &str, error: Value) {
        Mock::given(method("POST"))
            .and(body_partial_json(json!({ "method": rpc_method })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "jsonrpc": "2.0",
                "id": 1,
                "error": error
            })))
            .mount(server)
            .await;
    }

    async fn respond(server: &MockServer, rpc_method: &str, result: Value) {
        Mock::given(method("POST"))
            .and(body_partial_json(json!({ "method": rpc_method })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "jsonrpc": "2.0",
                "id": 1,
                "result": result
            })))
            .mount(server)
            .await;
    }

    fn receipt(status: &str) -> Value {
        json!({
            "transactionHash": TX_HASH,
            "status": status,
            "contractAddress": CONTRACT,
            "blockNumber": "0x1",
            "gasUsed": "0x5208"
        })
    }

    #[tokio::test]
    async fn test_chain_id() {
        let server = MockServer::start().await;
        respond(&server, "eth_chainId", json!("0x539")).await;

        let chain = RpcChain::new(&config(&server)).unwrap();
        assert_eq!(chain.chain_id().await.unwrap(), 1337);
    }

    #[tokio::test]
    async fn test_rpc_error_is_a_network_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "jsonrpc": "2.0",
                "id": 1,
                "error": { "code": -32000, "message": "insufficient funds" }
            })))
            .mount(&server)
            .await;

        let chain = RpcChain::new(&config(&server)).unwrap();
        let err = chain.balance(Address::ZERO).await.unwrap_err();
        assert!(matches!(err, DeployError::Network(ref m) if m.contains("insufficient funds")));
    }

    #[tokio::test]
    async fn test_unreachable_node_is_a_network_error() {
        let config = NetworkConfig::local("down", "http://127.0.0.1:1", 1337);
        let chain = RpcChain::new(&config).unwrap();
        assert!(matches!(
            chain.chain_id().await,
            Err(DeployError::Network(_))
        ));
    }

    #[tokio::test]
    async fn test_unlocked_submission() {
        let server = MockServer::start().await;
        respond(&server, "eth_sendTransaction", json!(TX_HASH)).await;

        let chain = RpcChain::new(&config(&server)).unwrap();
        let signer = DeploySigner::Unlocked(Address::repeat_byte(0x11));
        let tx_hash = chain
            .submit_deployment(&signer, Bytes::from_static(&[0x60, 0x80]))
            .await
            .unwrap();
        assert_eq!(tx_hash, TX_HASH.parse::<TxHash>().unwrap());
    }

    #[tokio::test]
    async fn test_signed_submission() {
        let server = MockServer::start().await;
        respond(&server, "eth_getTransactionCount", json!("0x3")).await;
        respond(&server, "eth_gasPrice", json!("0x3b9aca00")).await;
        respond(&server, "eth_estimateGas", json!("0x186a0")).await;
        respond(&server, "eth_sendRawTransaction", json!(TX_HASH)).await;

        let chain = RpcChain::new(&config(&server)).unwrap();
        let signer = DeploySigner::Local(alloy_signer_local::PrivateKeySigner::random());
        let tx_hash = chain
            .submit_deployment(&signer, Bytes::from_static(&[0x60, 0x80]))
            .await
            .unwrap();
        assert_eq!(tx_hash, TX_HASH.parse::<TxHash>().unwrap());

        let requests = server.received_requests().await.unwrap();
        let raw = requests
            .iter()
            .map(|r| serde_json::from_slice::<Value>(&r.body).unwrap())
            .find(|body| body["method"] == "eth_sendRawTransaction")
            .unwrap();
        assert!(raw["params"][0].as_str().unwrap().starts_with("0xf8"));
    }

    #[tokio::test]
    async fn test_unlocked_revert_is_a_deployment_revert() {
        let server = MockServer::start().await;
        respond_error(
            &server,
            "eth_sendTransaction",
            json!({
                "code": -32603,
                "message": "Error: VM Exception while processing transaction: reverted with reason string 'bad supply'"
            }),
        )
        .await;

        let chain = RpcChain::new(&config(&server)).unwrap();
        let signer = DeploySigner::Unlocked(Address::repeat_byte(0x11));
        let err = chain
            .submit_deployment(&signer, Bytes::from_static(&[0x60, 0x80]))
            .await
            .unwrap_err();
        match err {
            DeployError::DeploymentReverted {
                tx_hash, reason, ..
            } => {
                assert!(tx_hash.is_none());
                assert!(reason.unwrap().contains("bad supply"));
            }
            other => panic!("expected a revert, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_estimate_revert_is_a_deployment_revert() {
        let server = MockServer::start().await;
        respond(&server, "eth_getTransactionCount", json!("0x0")).await;
        respond(&server, "eth_gasPrice", json!("0x3b9aca00")).await;
        respond_error(
            &server,
            "eth_estimateGas",
            json!({ "code": 3, "message": "execution reverted: bad supply", "data": "0x" }),
        )
        .await;

        let chain = RpcChain::new(&config(&server)).unwrap();
        let signer = DeploySigner::Local(alloy_signer_local::PrivateKeySigner::random());
        let err = chain
            .submit_deployment(&signer, Bytes::from_static(&[0x60, 0x80]))
            .await
            .unwrap_err();
        assert!(matches!(err, DeployError::DeploymentReverted { tx_hash: None, .. }));

        // Nothing was broadcast.
        let requests = server.received_requests().await.unwrap();
        assert!(
            requests
                .iter()
                .map(|r| serde_json::from_slice::<Value>(&r.body).unwrap())
                .all(|body| body["method"] != "eth_sendRawTransaction")
        );
    }

    #[tokio::test]
    async fn test_reverting_view_is_a_network_error() {
        let server = MockServer::start().await;
        respond_error(
            &server,
            "eth_call",
            json!({ "code": 3, "message": "execution reverted" }),
        )
        .await;

        let chain = RpcChain::new(&config(&server)).unwrap();
        let err = chain
            .call(Address::repeat_byte(0x22), Bytes::new())
            .await
            .unwrap_err();
        assert!(matches!(err, DeployError::Network(_)));
    }

    #[tokio::test]
    async fn test_failed_poll_is_retried() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(body_partial_json(json!({ "method": "eth_getTransactionReceipt" })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "jsonrpc": "2.0",
                "id": 1,
                "error": { "code": -32000, "message": "header not found" }
            })))
            .up_to_n_times(1)
            .with_priority(1)
            .mount(&server)
            .await;
        respond(&server, "eth_getTransactionReceipt", receipt("0x1")).await;
        respond(&server, "eth_blockNumber", json!("0x1")).await;

        let mut config = config(&server);
        config.confirmation.timeout_secs = 10;
        let chain = RpcChain::new(&config).unwrap();
        let receipt = chain
            .await_confirmation(TX_HASH.parse().unwrap())
            .await
            .unwrap();
        assert!(receipt.status);

        let receipt_polls = server
            .received_requests()
            .await
            .unwrap()
            .iter()
            .map(|r| serde_json::from_slice::<Value>(&r.body).unwrap())
            .filter(|body| body["method"] == "eth_getTransactionReceipt")
            .count();
        assert_eq!(receipt_polls, 2);
    }

    #[tokio::test]
    async fn test_failing_polls_time_out() {
        let server = MockServer::start().await;
        respond_error(
            &server,
            "eth_getTransactionReceipt",
            json!({ "code": -32000, "message": "header not found" }),
        )
        .await;

        let chain = RpcChain::new(&config(&server)).unwrap();
        assert!(matches!(
            chain.await_confirmation(TX_HASH.parse().unwrap()).await,
            Err(DeployError::ConfirmationTimeout { .. })
        ));
    }

    #[tokio::test]
    async fn test_confirmed_receipt() {
        let server = MockServer::start().await;
        respond(&server, "eth_getTransactionReceipt", receipt("0x1")).await;
        respond(&server, "eth_blockNumber", json!("0x1")).await;

        let chain = RpcChain::new(&config(&server)).unwrap();
        let receipt = chain
            .await_confirmation(TX_HASH.parse().unwrap())
            .await
            .unwrap();
        assert!(receipt.status);
        assert_eq!(receipt.contract_address, Some(CONTRACT.parse().unwrap()));
        assert_eq!(receipt.gas_used, 21_000);
    }

    #[tokio::test]
    async fn test_reverted_receipt_is_returned() {
        let server = MockServer::start().await;
        respond(&server, "eth_getTransactionReceipt", receipt("0x0")).await;
        respond(&server, "eth_blockNumber", json!("0x1")).await;

        let chain = RpcChain::new(&config(&server)).unwrap();
        let receipt = chain
            .await_confirmation(TX_HASH.parse().unwrap())
            .await
            .unwrap();
        assert!(!receipt.status);
    }

    #[tokio::test]
    async fn test_missing_receipt_times_out() {
        let server = MockServer::start().await;
        respond(&server, "eth_getTransactionReceipt", Value::Null).await;

        let chain = RpcChain::new(&config(&server)).unwrap();
        let err = chain
            .await_confirmation(TX_HASH.parse().unwrap())
            .await
            .unwrap_err();
        assert!(matches!(err, DeployError::ConfirmationTimeout { .. }));
    }

    #[tokio::test]
    async fn test_shallow_receipt_times_out() {
        let server = MockServer::start().await;
        respond(&server, "eth_getTransactionReceipt", receipt("0x1")).await;
        respond(&server, "eth_blockNumber", json!("0x1")).await;

        let mut config = config(&server);
        config.confirmation.confirmations = 3;
        let chain = RpcChain::new(&config).unwrap();
        assert!(matches!(
            chain.await_confirmation(TX_HASH.parse().unwrap()).await,
            Err(DeployError::ConfirmationTimeout { .. })
        ));
    }
}
