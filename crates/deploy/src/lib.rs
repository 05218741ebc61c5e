//! pmd-deploy - Ordered deployment of interdependent contracts.
//!
//! A [`DeploymentPlan`] lists contracts in the order they must be created. The
//! [`Orchestrator`] deploys them one at a time, waits for each to be confirmed, feeds
//! confirmed addresses into the constructor arguments of later contracts, and records the
//! result in a [`DeploymentManifest`].

mod artifact;
pub use artifact::{
    ArtifactStore, ContractArtifact, ContractFactory, HardhatArtifacts, PendingDeployment,
};

mod chain;
pub use chain::{ChainClient, DeploySigner, RpcChain, TxReceipt};

mod config;
pub use config::{
    CONFIG_FILENAME, ConfigLoader, ConfirmationPolicy, Credential, NetworkConfig, NetworkPreset,
    PRIVATE_KEY_ENV,
};

mod error;
pub use error::{DeployError, DeploymentFailure};

mod exit;
pub use exit::RunOutcome;

mod manifest;
pub use manifest::{DeployedContract, DeploymentManifest, Fact, ResolvedIdentity};

mod orchestrator;
pub use orchestrator::{AddressBook, Orchestrator};

mod plan;
pub use plan::{ArgTemplate, DeploymentPlan, DeploymentSpec, Identity, ReadBack};

mod report;
pub use report::{DeploymentObserver, Reporter, format_fact, format_scaled};
