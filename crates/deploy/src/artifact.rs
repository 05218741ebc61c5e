//! Compilation artifacts and the contract factory built on top of them.

use std::{
    collections::BTreeMap,
    path::{Path, PathBuf},
};

use alloy_core::{
    dyn_abi::{DynSolType, DynSolValue, FunctionExt, JsonAbiExt},
    json_abi::{Function, JsonAbi},
    primitives::{Bytes, TxHash},
};
use serde::Deserialize;

use crate::{ChainClient, DeployError, DeploySigner};

/// Layout of a Hardhat artifact file. Only the fields needed to deploy are read.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct HardhatArtifactFile {
    contract_name: String,
    abi: JsonAbi,
    bytecode: Bytes,
}

/// Interface and creation bytecode of a compiled contract.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContractArtifact {
    pub name: String,
    pub abi: JsonAbi,
    pub bytecode: Bytes,
}

impl ContractArtifact {
    /// Parse a Hardhat artifact (`{ contractName, abi, bytecode, .. }`).
    pub fn from_json(content: &str) -> Result<Self, DeployError> {
        let file: HardhatArtifactFile = serde_json::from_str(content)
            .map_err(|e| DeployError::artifact("<unknown>", format!("invalid artifact: {e}")))?;

        Ok(Self {
            name: file.contract_name,
            abi: file.abi,
            bytecode: file.bytecode,
        })
    }

    pub fn load_from_file(path: &Path) -> Result<Self, DeployError> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            DeployError::artifact(
                &path.display().to_string(),
                format!("failed to read artifact: {e}"),
            )
        })?;
        Self::from_json(&content)
    }
}

/// Source of contract factories, by artifact name.
pub trait ArtifactStore {
    fn factory(&self, name: &str) -> Result<ContractFactory, DeployError>;
}

/// Artifacts laid out by Hardhat under an `artifacts/` directory.
#[derive(Debug, Clone)]
pub struct HardhatArtifacts {
    root: PathBuf,
}

impl HardhatArtifacts {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Candidate paths for `name`: `contracts/<name>.sol/<name>.json`, then `<name>.json`.
    fn candidates(&self, name: &str) -> [PathBuf; 2] {
        [
            self.root
                .join("contracts")
                .join(format!("{name}.sol"))
                .join(format!("{name}.json")),
            self.root.join(format!("{name}.json")),
        ]
    }
}

impl ArtifactStore for HardhatArtifacts {
    fn factory(&self, name: &str) -> Result<ContractFactory, DeployError> {
        let path = self
            .candidates(name)
            .into_iter()
            .find(|path| path.is_file())
            .ok_or_else(|| {
                DeployError::artifact(
                    name,
                    format!("no artifact found under {}", self.root.display()),
                )
            })?;

        tracing::debug!(contract = name, path = %path.display(), "Loading artifact");

        let artifact = ContractArtifact::load_from_file(&path)?;
        ContractFactory::new(artifact)
    }
}

impl ArtifactStore for BTreeMap<String, ContractArtifact> {
    fn factory(&self, name: &str) -> Result<ContractFactory, DeployError> {
        let artifact = self
            .get(name)
            .cloned()
            .ok_or_else(|| DeployError::artifact(name, "no such artifact"))?;
        ContractFactory::new(artifact)
    }
}

/// A submitted, not yet confirmed, deployment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingDeployment {
    pub contract: String,
    pub tx_hash: TxHash,
}

/// Binds a contract's interface and bytecode to a deploy operation.
#[derive(Debug, Clone)]
pub struct ContractFactory {
    artifact: ContractArtifact,
}

impl ContractFactory {
    /// Fails for artifacts without creation code (interfaces, abstract contracts).
    pub fn new(artifact: ContractArtifact) -> Result<Self, DeployError> {
        if artifact.bytecode.is_empty() {
            return Err(DeployError::artifact(
                &artifact.name,
                "artifact has no creation bytecode",
            ));
        }
        Ok(Self { artifact })
    }

    pub fn name(&self) -> &str {
        &self.artifact.name
    }

    pub fn artifact(&self) -> &ContractArtifact {
        &self.artifact
    }

    /// Coerce resolved string arguments to the constructor's parameter types.
    pub fn constructor_args<S: AsRef<str>>(&self, args: &[S]) -> Result<Vec<DynSolValue>, DeployError> {
        let inputs = self
            .artifact
            .abi
            .constructor
            .as_ref()
            .map(|constructor| constructor.inputs.as_slice())
            .unwrap_or_default();

        if inputs.len() != args.len() {
            return Err(DeployError::artifact(
                self.name(),
                format!(
                    "constructor takes {} argument(s), {} given",
                    inputs.len(),
                    args.len()
                ),
            ));
        }

        std::iter::zip(inputs, args)
            .map(|(input, arg)| {
                let ty = DynSolType::parse(&input.selector_type())
                    .map_err(|e| DeployError::artifact(self.name(), e))?;
                ty.coerce_str(arg.as_ref()).map_err(|e| {
                    DeployError::artifact(
                        self.name(),
                        format!("argument `{}` ({}): {e}", input.name, input.ty),
                    )
                })
            })
            .collect()
    }

    /// Creation bytecode followed by the ABI-encoded constructor arguments.
    pub fn init_code<S: AsRef<str>>(&self, args: &[S]) -> Result<Bytes, DeployError> {
        let values = self.constructor_args(args)?;

        let encoded_args = match &self.artifact.abi.constructor {
            Some(constructor) => constructor
                .abi_encode_input(&values)
                .map_err(|e| DeployError::artifact(self.name(), e))?,
            None => Vec::new(),
        };

        let mut init_code = self.artifact.bytecode.to_vec();
        init_code.extend_from_slice(&encoded_args);
        Ok(init_code.into())
    }

    /// Submit the deployment transaction. The returned handle is not yet confirmed.
    pub async fn deploy<C: ChainClient, S: AsRef<str>>(
        &self,
        chain: &C,
        signer: &DeploySigner,
        args: &[S],
    ) -> Result<PendingDeployment, DeployError> {
        let init_code = self.init_code(args)?;
        let tx_hash = chain.submit_deployment(signer, init_code).await?;

        Ok(PendingDeployment {
            contract: self.name().to_string(),
            tx_hash,
        })
    }

    /// The zero-argument view function `name`.
    fn view(&self, name: &str) -> Result<&Function, DeployError> {
        self.artifact
            .abi
            .function(name)
            .and_then(|overloads| overloads.iter().find(|f| f.inputs.is_empty()))
            .ok_or_else(|| {
                DeployError::artifact(self.name(), format!("no zero-argument function `{name}`"))
            })
    }

    /// Calldata for the zero-argument view function `name`.
    pub fn encode_view(&self, name: &str) -> Result<Bytes, DeployError> {
        let function = self.view(name)?;
        function
            .abi_encode_input(&[])
            .map(Bytes::from)
            .map_err(|e| DeployError::artifact(self.name(), e))
    }

    /// Decode the first return value of the view function `name`.
    pub fn decode_view(&self, name: &str, data: &[u8]) -> Result<DynSolValue, DeployError> {
        let function = self.view(name)?;
        function
            .abi_decode_output(data)
            .map_err(|e| DeployError::artifact(self.name(), e))?
            .into_iter()
            .next()
            .ok_or_else(|| {
                DeployError::artifact(self.name(), format!("`{name}` returns nothing"))
            })
    }
}
