//! A scripted in-memory chain for driving the orchestrator in tests.

#![allow(dead_code)]

use std::{collections::HashMap, path::PathBuf, sync::Mutex};

use alloy_core::{
    dyn_abi::{DynSolValue, FunctionExt, JsonAbiExt},
    primitives::{Address, Bytes, TxHash, U256, keccak256},
};
use pmd_deploy::{
    ChainClient, ContractArtifact, DeployError, DeploySigner, HardhatArtifacts, NetworkConfig,
    TxReceipt,
};

pub const CHAIN_ID: u64 = 1337;

pub fn artifacts_dir() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("tests/fixtures/artifacts")
}

pub fn artifacts() -> HardhatArtifacts {
    HardhatArtifacts::new(artifacts_dir())
}

pub fn network() -> NetworkConfig {
    NetworkConfig::local("hardhat", "http://127.0.0.1:8545", CHAIN_ID)
}

fn load(name: &str) -> ContractArtifact {
    let path = artifacts_dir()
        .join("contracts")
        .join(format!("{name}.sol"))
        .join(format!("{name}.json"));
    ContractArtifact::load_from_file(&path).unwrap()
}

/// Answers a view call from the constructor arguments the contract was created with.
type Responder = fn(&str, &[DynSolValue]) -> Option<DynSolValue>;

struct Model {
    artifact: ContractArtifact,
    respond: Responder,
}

fn token_model(function: &str, args: &[DynSolValue]) -> Option<DynSolValue> {
    match function {
        "totalSupply" => {
            let supply = args.get(2)?.as_uint()?.0;
            Some(DynSolValue::Uint(
                supply * U256::from(10u64).pow(U256::from(18)),
                256,
            ))
        }
        "decimals" => Some(DynSolValue::Uint(U256::from(18), 8)),
        "symbol" => args.get(1).cloned(),
        _ => None,
    }
}

fn market_model(function: &str, args: &[DynSolValue]) -> Option<DynSolValue> {
    match function {
        "aiOperator" => args.first().cloned(),
        "token" => args.get(1).cloned(),
        "marketCount" => Some(DynSolValue::Uint(U256::ZERO, 256)),
        _ => None,
    }
}

#[derive(Debug, Clone)]
pub struct Submission {
    pub from: Address,
    pub contract: String,
    pub tx_hash: TxHash,
    pub args: Vec<DynSolValue>,
}

struct Deployed {
    model: usize,
    args: Vec<DynSolValue>,
}

#[derive(Default)]
struct State {
    nonces: HashMap<Address, u64>,
    block: u64,
    submissions: Vec<Submission>,
    pending: HashMap<TxHash, (usize, Address)>,
    contracts: HashMap<Address, Deployed>,
}

/// Faults injected at a given submission index (0-based).
#[derive(Debug, Clone, Copy, Default)]
pub struct Faults {
    pub reject_submission: Option<usize>,
    /// The node refuses the submission because the constructor would revert.
    pub reject_revert: Option<usize>,
    pub revert: Option<usize>,
    pub timeout: Option<usize>,
    pub fail_calls: bool,
}

pub struct MockChain {
    chain_id: u64,
    default_account: Address,
    models: Vec<Model>,
    faults: Faults,
    state: Mutex<State>,
}

impl MockChain {
    /// A fresh chain with a random unlocked account and the prediction market contracts.
    pub fn new() -> Self {
        Self::with_faults(Faults::default())
    }

    pub fn with_faults(faults: Faults) -> Self {
        Self {
            chain_id: CHAIN_ID,
            default_account: Address::from(rand::random::<[u8; 20]>()),
            models: vec![
                Model {
                    artifact: load("PredictionToken"),
                    respond: token_model,
                },
                Model {
                    artifact: load("AIPredictionMarket"),
                    respond: market_model,
                },
            ],
            faults,
            state: Mutex::new(State::default()),
        }
    }

    pub fn with_chain_id(mut self, chain_id: u64) -> Self {
        self.chain_id = chain_id;
        self
    }

    pub fn submissions(&self) -> Vec<Submission> {
        self.state.lock().unwrap().submissions.clone()
    }

    fn model_for(&self, init_code: &[u8]) -> Option<usize> {
        self.models
            .iter()
            .position(|model| init_code.starts_with(&model.artifact.bytecode))
    }
}

impl ChainClient for MockChain {
    async fn chain_id(&self) -> Result<u64, DeployError> {
        Ok(self.chain_id)
    }

    async fn default_account(&self) -> Result<Address, DeployError> {
        Ok(self.default_account)
    }

    async fn balance(&self, _address: Address) -> Result<U256, DeployError> {
        Ok(U256::from(10_000u64) * U256::from(10u64).pow(U256::from(18)))
    }

    async fn submit_deployment(
        &self,
        signer: &DeploySigner,
        init_code: Bytes,
    ) -> Result<TxHash, DeployError> {
        let mut state = self.state.lock().unwrap();
        let index = state.submissions.len();
        if self.faults.reject_submission == Some(index) {
            return Err(DeployError::Network("connection reset by peer".to_string()));
        }
        if self.faults.reject_revert == Some(index) {
            return Err(DeployError::rejected_by_node(
                "VM Exception while processing transaction: reverted with reason string 'bad supply'",
            ));
        }

        let model = self
            .model_for(&init_code)
            .ok_or_else(|| DeployError::Network("unknown bytecode".to_string()))?;
        let artifact = &self.models[model].artifact;
        let args = match &artifact.abi.constructor {
            Some(constructor) => constructor
                .abi_decode_input(&init_code[artifact.bytecode.len()..])
                .map_err(|e| DeployError::Network(e.to_string()))?,
            None => Vec::new(),
        };

        let from = signer.address();
        let nonce = state.nonces.entry(from).or_default();
        let address = from.create(*nonce);
        let tx_hash = keccak256(
            [&init_code[..], nonce.to_be_bytes().as_slice(), from.as_slice()].concat(),
        );
        *nonce += 1;

        state.submissions.push(Submission {
            from,
            contract: artifact.name.clone(),
            tx_hash,
            args: args.clone(),
        });
        state.pending.insert(tx_hash, (index, address));
        state.contracts.insert(address, Deployed { model, args });

        Ok(tx_hash)
    }

    async fn await_confirmation(&self, tx_hash: TxHash) -> Result<TxReceipt, DeployError> {
        let mut state = self.state.lock().unwrap();
        let (index, address) = state
            .pending
            .remove(&tx_hash)
            .ok_or_else(|| DeployError::Network(format!("unknown transaction {tx_hash}")))?;

        if self.faults.timeout == Some(index) {
            state.contracts.remove(&address);
            return Err(DeployError::ConfirmationTimeout {
                tx_hash,
                waited_secs: 1,
            });
        }

        state.block += 1;
        let reverted = self.faults.revert == Some(index);
        if reverted {
            state.contracts.remove(&address);
        }

        Ok(TxReceipt {
            transaction_hash: tx_hash,
            status: !reverted,
            contract_address: (!reverted).then_some(address),
            block_number: state.block,
            gas_used: 1_000_000 + index as u64,
        })
    }

    async fn call(&self, to: Address, data: Bytes) -> Result<Bytes, DeployError> {
        if self.faults.fail_calls {
            return Err(DeployError::Network("eth_call failed".to_string()));
        }

        let state = self.state.lock().unwrap();
        let deployed = state
            .contracts
            .get(&to)
            .ok_or_else(|| DeployError::Network(format!("no code at {to}")))?;
        let model = &self.models[deployed.model];

        let function = model
            .artifact
            .abi
            .functions()
            .find(|f| data.len() >= 4 && f.selector().as_slice() == &data[..4])
            .ok_or_else(|| DeployError::Network("execution reverted".to_string()))?;
        let value = (model.respond)(&function.name, &deployed.args)
            .ok_or_else(|| DeployError::Network("execution reverted".to_string()))?;

        function
            .abi_encode_output(&[value])
            .map(Bytes::from)
            .map_err(|e| DeployError::Network(e.to_string()))
    }
}
