//! Network configuration.
//!
//! Configuration is resolved once at startup by [`ConfigLoader`] and then passed around as
//! a plain [`NetworkConfig`] value. Sources, from lowest to highest priority:
//! 1. the built-in preset for the selected network (if any),
//! 2. the network's table in the TOML config file (`Deploy.toml` by default),
//! 3. `PMD_*` environment variables,
//! 4. `DEPLOYER_PRIVATE_KEY` for the signing credential.

use std::{
    fmt,
    path::{Path, PathBuf},
    time::Duration,
};

use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};
use url::Url;

use crate::DeployError;

/// The default name for the network configuration file.
pub const CONFIG_FILENAME: &str = "Deploy.toml";

/// Prefix of the environment variables overriding network settings.
pub const ENV_PREFIX: &str = "PMD_";

/// Environment variable holding the deployer's private key.
pub const PRIVATE_KEY_ENV: &str = "DEPLOYER_PRIVATE_KEY";

/// Default time to wait for a deployment receipt.
pub const DEFAULT_CONFIRMATION_TIMEOUT_SECS: u64 = 300;

/// Default interval between receipt polls.
pub const DEFAULT_POLL_INTERVAL_MS: u64 = 1_000;

/// Networks known without any configuration file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, strum::Display, strum::EnumString)]
#[strum(serialize_all = "kebab-case")]
pub enum NetworkPreset {
    /// In-process Hardhat network.
    Hardhat,
    /// A local development node (`npx hardhat node`, anvil).
    Localhost,
    /// Aurora mainnet.
    Aurora,
}

impl NetworkPreset {
    pub fn config(&self) -> NetworkConfig {
        match self {
            NetworkPreset::Hardhat => NetworkConfig::local("hardhat", "http://127.0.0.1:8545", 1337),
            NetworkPreset::Localhost => {
                NetworkConfig::local("localhost", "http://127.0.0.1:8545", 31337)
            }
            NetworkPreset::Aurora => NetworkConfig {
                name: "aurora".to_string(),
                rpc_url: "https://mainnet.aurora.dev".to_string(),
                chain_id: 1313161554,
                gas_price: Some(200_000_000),
                local: false,
                private_key: None,
                confirmation: ConfirmationPolicy::default(),
            },
        }
    }
}

/// A signing credential. Never printed.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Credential(String);

impl Credential {
    pub fn new(secret: impl Into<String>) -> Self {
        Self(secret.into())
    }

    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Credential(<redacted>)")
    }
}

/// How long and how deep to wait for a deployment to be confirmed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfirmationPolicy {
    /// Blocks (including the inclusion block) a receipt must be buried under.
    pub confirmations: u64,
    /// Give up waiting after this many seconds.
    pub timeout_secs: u64,
    /// Interval between receipt polls, in milliseconds.
    pub poll_interval_ms: u64,
}

impl ConfirmationPolicy {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

impl Default for ConfirmationPolicy {
    fn default() -> Self {
        Self {
            confirmations: 1,
            timeout_secs: DEFAULT_CONFIRMATION_TIMEOUT_SECS,
            poll_interval_ms: DEFAULT_POLL_INTERVAL_MS,
        }
    }
}

/// Resolved configuration for the target network.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NetworkConfig {
    /// Network name, used in logs and in the manifest.
    pub name: String,
    /// JSON-RPC endpoint.
    pub rpc_url: String,
    /// Expected chain ID.
    pub chain_id: u64,
    /// Fixed gas price in wei. Queried from the node when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gas_price: Option<u64>,
    /// Local development network: no credential required, the node's first account signs.
    #[serde(default)]
    pub local: bool,
    #[serde(default, skip_serializing)]
    pub private_key: Option<Credential>,
    #[serde(default)]
    pub confirmation: ConfirmationPolicy,
}

impl NetworkConfig {
    /// A local development network with default settings.
    pub fn local(name: &str, rpc_url: &str, chain_id: u64) -> Self {
        Self {
            name: name.to_string(),
            rpc_url: rpc_url.to_string(),
            chain_id,
            gas_price: None,
            local: true,
            private_key: None,
            confirmation: ConfirmationPolicy::default(),
        }
    }

    pub fn url(&self) -> Result<Url, DeployError> {
        Url::parse(&self.rpc_url).map_err(|e| {
            DeployError::Configuration(format!("invalid RPC URL `{}`: {e}", self.rpc_url))
        })
    }

    fn validate(&self) -> Result<(), DeployError> {
        self.url()?;

        if !self.local && self.private_key.is_none() {
            return Err(DeployError::Configuration(format!(
                "network `{}` requires a deployer credential; set {PRIVATE_KEY_ENV}",
                self.name
            )));
        }

        if self.confirmation.confirmations == 0 {
            return Err(DeployError::Configuration(
                "confirmation.confirmations must be at least 1".to_string(),
            ));
        }

        Ok(())
    }
}

/// Resolves a [`NetworkConfig`] from presets, a config file and the environment.
#[derive(Debug, Clone)]
pub struct ConfigLoader {
    network: String,
    config_file: PathBuf,
}

impl ConfigLoader {
    pub fn new(network: impl Into<String>) -> Self {
        Self {
            network: network.into(),
            config_file: PathBuf::from(CONFIG_FILENAME),
        }
    }

    /// Use a config file other than `Deploy.toml`. A missing file is not an error.
    pub fn config_file(mut self, path: impl AsRef<Path>) -> Self {
        self.config_file = path.as_ref().to_path_buf();
        self
    }

    /// Layer all configuration sources for the selected network.
    pub fn figment(&self) -> Figment {
        let base = match self.network.parse::<NetworkPreset>() {
            Ok(preset) => Figment::from(Serialized::defaults(preset.config())),
            Err(_) => Figment::from(Serialized::default("name", &self.network)),
        };

        base.merge(Toml::file(&self.config_file).nested())
            .merge(Env::prefixed(ENV_PREFIX).split("__").global())
            .merge(
                Env::raw()
                    .filter_map(|key| {
                        key.as_str()
                            .eq_ignore_ascii_case(PRIVATE_KEY_ENV)
                            .then(|| "private_key".into())
                    })
                    .global(),
            )
            .select(self.network.as_str())
    }

    /// Load and validate the configuration.
    ///
    /// Fails with [`DeployError::Configuration`] when a non-local network has no credential.
    pub fn load(&self) -> Result<NetworkConfig, DeployError> {
        self.load_from(self.figment())
    }

    /// Extract and validate a configuration from an explicit figment.
    pub fn load_from(&self, figment: Figment) -> Result<NetworkConfig, DeployError> {
        let mut config: NetworkConfig = figment.extract().map_err(|e| {
            DeployError::Configuration(format!(
                "failed to load configuration for network `{}`: {e}",
                self.network
            ))
        })?;

        // An empty variable counts as unset.
        if config
            .private_key
            .as_ref()
            .is_some_and(|key| key.expose().trim().is_empty())
        {
            config.private_key = None;
        }

        config.validate()?;

        tracing::debug!(
            network = %config.name,
            chain_id = config.chain_id,
            rpc_url = %config.rpc_url,
            local = config.local,
            "Configuration loaded"
        );

        Ok(config)
    }
}
