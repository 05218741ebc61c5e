//! Sequential deployment of a plan.
//!
//! Each spec is deployed and confirmed before the next one starts: later specs may take
//! earlier addresses as constructor arguments, and the signer may only have one
//! transaction in flight.

use std::collections::BTreeMap;

use alloy_core::primitives::Address;

use crate::{
    ArgTemplate, ArtifactStore, ChainClient, DeployError, DeploySigner, DeployedContract,
    DeploymentFailure, DeploymentManifest, DeploymentObserver, DeploymentPlan, DeploymentSpec,
    Fact, NetworkConfig, ResolvedIdentity, TxReceipt, report::format_fact,
};

/// Confirmed addresses by contract name, filled in as the run progresses.
#[derive(Debug, Clone, Default)]
pub struct AddressBook {
    deployer: Address,
    confirmed: BTreeMap<String, Address>,
}

impl AddressBook {
    pub fn new(deployer: Address) -> Self {
        Self {
            deployer,
            confirmed: BTreeMap::new(),
        }
    }

    pub fn get(&self, name: &str) -> Option<Address> {
        self.confirmed.get(name).copied()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.confirmed.contains_key(name)
    }

    fn insert(&mut self, name: &str, address: Address) {
        self.confirmed.insert(name.to_string(), address);
    }

    /// Resolve one template on behalf of `requester`.
    pub fn resolve(&self, requester: &str, template: &ArgTemplate) -> Result<String, DeployError> {
        match template {
            ArgTemplate::Literal(value) => Ok(value.clone()),
            ArgTemplate::Deployer => Ok(self.deployer.to_string()),
            ArgTemplate::AddressOf(name) => self
                .get(name)
                .map(|address| address.to_string())
                .ok_or_else(|| DeployError::Dependency {
                    contract: requester.to_string(),
                    reference: name.clone(),
                }),
        }
    }

    /// Resolve every constructor argument of `spec`.
    pub fn resolve_args(&self, spec: &DeploymentSpec) -> Result<Vec<String>, DeployError> {
        spec.args
            .iter()
            .map(|template| self.resolve(&spec.name, template))
            .collect()
    }
}

/// Drives a [`DeploymentPlan`] against a chain, one confirmed contract at a time.
pub struct Orchestrator<'a, C, A> {
    chain: &'a C,
    artifacts: &'a A,
    network: String,
    chain_id: u64,
}

impl<'a, C, A> Orchestrator<'a, C, A>
where
    C: ChainClient,
    A: ArtifactStore,
{
    pub fn new(chain: &'a C, artifacts: &'a A, config: &NetworkConfig) -> Self {
        Self {
            chain,
            artifacts,
            network: config.name.clone(),
            chain_id: config.chain_id,
        }
    }

    /// Check that the node serves the configured chain.
    pub async fn verify_chain(&self) -> Result<(), DeployError> {
        let actual = self.chain.chain_id().await?;
        if actual != self.chain_id {
            return Err(DeployError::Configuration(format!(
                "network `{}` is configured for chain {} but the node reports chain {actual}",
                self.network, self.chain_id
            )));
        }
        Ok(())
    }

    /// Deploy every spec of `plan` in declared order.
    ///
    /// On failure the returned [`DeploymentFailure`] carries the contracts confirmed so far;
    /// they are not rolled back.
    pub async fn deploy<O: DeploymentObserver>(
        &self,
        plan: &DeploymentPlan,
        signer: &DeploySigner,
        observer: &mut O,
    ) -> Result<DeploymentManifest, DeploymentFailure> {
        let deployer = signer.address();
        let mut manifest = DeploymentManifest::new(&self.network, self.chain_id, deployer);
        let mut book = AddressBook::new(deployer);

        let balance = match self.chain.balance(deployer).await {
            Ok(balance) => balance,
            Err(error) => return Err(DeploymentFailure { manifest, error }),
        };

        tracing::info!(
            network = %self.network,
            chain_id = self.chain_id,
            %deployer,
            contracts = plan.contracts.len(),
            "Starting deployment..."
        );
        observer.on_run_started(plan, deployer, balance);

        for (index, spec) in plan.contracts.iter().enumerate() {
            observer.on_step_started(index, spec);

            if let Err(error) = self
                .deploy_step(spec, signer, &mut book, &mut manifest, observer, index)
                .await
            {
                tracing::error!(
                    contract = %spec.name,
                    step = index + 1,
                    confirmed = manifest.contracts.len(),
                    %error,
                    "Deployment aborted"
                );
                return Err(DeploymentFailure { manifest, error });
            }
        }

        for identity in &plan.identities {
            match book.resolve(&identity.label, &identity.value) {
                Ok(value) => manifest.identities.push(ResolvedIdentity {
                    label: identity.label.clone(),
                    value,
                }),
                Err(error) => return Err(DeploymentFailure { manifest, error }),
            }
        }

        tracing::info!(contracts = manifest.contracts.len(), "Deployment complete");

        Ok(manifest)
    }

    async fn deploy_step<O: DeploymentObserver>(
        &self,
        spec: &DeploymentSpec,
        signer: &DeploySigner,
        book: &mut AddressBook,
        manifest: &mut DeploymentManifest,
        observer: &mut O,
        index: usize,
    ) -> Result<(), DeployError> {
        if book.contains(&spec.name) {
            return Err(DeployError::InvalidPlan(format!(
                "contract `{}` was already deployed in this run",
                spec.name
            )));
        }

        // Resolution happens before anything is submitted for this spec.
        let args = book.resolve_args(spec)?;
        let factory = self.artifacts.factory(spec.artifact())?;

        let pending = factory
            .deploy(self.chain, signer, &args)
            .await
            .map_err(|e| e.for_contract(&spec.name))?;
        tracing::info!(contract = %spec.name, tx_hash = %pending.tx_hash, "Deployment submitted");
        observer.on_submitted(spec, pending.tx_hash);

        let receipt = self.chain.await_confirmation(pending.tx_hash).await?;
        let address = confirmed_address(spec, &receipt)?;

        tracing::info!(
            contract = %spec.name,
            %address,
            block = receipt.block_number,
            gas_used = receipt.gas_used,
            "Deployment confirmed"
        );

        let mut contract = DeployedContract {
            name: spec.name.clone(),
            address,
            tx_hash: receipt.transaction_hash,
            block_number: receipt.block_number,
            gas_used: receipt.gas_used,
            args,
            facts: Vec::with_capacity(spec.facts.len()),
        };

        // The contract is on-chain from here on; a failed read-back must not hide it.
        let mut read_back_error = None;
        for read_back in &spec.facts {
            let value = match factory.encode_view(&read_back.function) {
                Ok(calldata) => match self.chain.call(address, calldata).await {
                    Ok(data) => factory.decode_view(&read_back.function, &data),
                    Err(e) => Err(e),
                },
                Err(e) => Err(e),
            };

            match value {
                Ok(value) => contract.facts.push(Fact {
                    label: read_back.label.clone(),
                    value: format_fact(&value, read_back),
                }),
                Err(e) => {
                    read_back_error = Some(e);
                    break;
                }
            }
        }

        book.insert(&spec.name, address);
        if read_back_error.is_none() {
            observer.on_confirmed(index, &contract);
        }
        manifest.contracts.push(contract);

        match read_back_error {
            Some(DeployError::Network(message)) => Err(DeployError::Network(format!(
                "`{}` deployed at {address} but reading it back failed: {message}",
                spec.name
            ))),
            Some(error) => Err(error),
            None => Ok(()),
        }
    }
}

fn confirmed_address(spec: &DeploymentSpec, receipt: &TxReceipt) -> Result<Address, DeployError> {
    match (receipt.status, receipt.contract_address) {
        (true, Some(address)) => Ok(address),
        _ => Err(DeployError::DeploymentReverted {
            contract: spec.name.clone(),
            tx_hash: Some(receipt.transaction_hash),
            reason: None,
        }),
    }
}
