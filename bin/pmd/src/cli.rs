use std::path::PathBuf;

use clap::Parser;
use pmd_deploy::{CONFIG_FILENAME, DeploymentPlan};
use tracing::level_filters::LevelFilter;

/// The network used when none is given.
const DEFAULT_NETWORK: &str = "hardhat";

/// Where Hardhat writes compilation artifacts by default.
const DEFAULT_ARTIFACTS_DIR: &str = "artifacts";

#[derive(Parser)]
#[command(name = "pmd")]
#[command(
    author,
    version,
    about = "Deploy the prediction market contracts in dependency order"
)]
pub struct Cli {
    /// The verbosity level.
    #[arg(short, long, env = "PMD_VERBOSITY", default_value_t = LevelFilter::INFO)]
    pub verbosity: LevelFilter,

    /// Target network: a preset (hardhat, localhost, aurora) or a network defined in the
    /// config file.
    #[arg(short, long, env = "PMD_NETWORK", default_value = DEFAULT_NETWORK)]
    pub network: String,

    /// Path to the network configuration file. A missing file is not an error.
    #[arg(short, long, alias = "conf", env = "PMD_CONFIG", default_value = CONFIG_FILENAME)]
    pub config: PathBuf,

    /// Deployment plan (TOML). Deploys the built-in prediction market plan when omitted.
    #[arg(short, long, env = "PMD_PLAN")]
    pub plan: Option<PathBuf>,

    /// Directory containing the Hardhat compilation artifacts.
    #[arg(long, env = "PMD_ARTIFACTS", default_value = DEFAULT_ARTIFACTS_DIR)]
    pub artifacts: PathBuf,

    /// Also write the manifest to this file as pretty JSON.
    #[arg(long, alias = "out", env = "PMD_MANIFEST_OUT")]
    pub manifest_out: Option<PathBuf>,

    /// Validate the configuration, plan and artifacts without submitting anything.
    #[arg(long, env = "PMD_CHECK", default_value_t = false)]
    pub check: bool,
}

impl Cli {
    /// The plan to deploy.
    pub fn plan(&self) -> anyhow::Result<DeploymentPlan> {
        match &self.plan {
            Some(path) => Ok(DeploymentPlan::load_from_file(path)?),
            None => Ok(DeploymentPlan::prediction_market()),
        }
    }
}
