//! Declarative deployment plans.
//!
//! A plan is an ordered list of [`DeploymentSpec`]s. A spec's declared order is its
//! position in the list, and its constructor arguments may only reference contracts
//! declared before it.

use std::{collections::BTreeSet, fmt, path::Path, str::FromStr};

use serde::{Deserialize, Serialize};

use crate::DeployError;

/// Prefix marking a reference to an earlier contract's address.
const ADDRESS_OF_PREFIX: char = '@';

/// Prefix marking a built-in variable.
const VARIABLE_PREFIX: char = '$';

/// Name of the variable bound to the deployer address.
const DEPLOYER_VARIABLE: &str = "deployer";

/// One constructor-argument template.
///
/// Written in plans as plain strings:
/// - `$deployer` is the signer's address,
/// - `@Name` is the confirmed address of the earlier contract `Name`,
/// - anything else is a literal, coerced to the constructor's ABI type at encode time.
///
/// A literal that starts with `@` or `$` is written with the prefix doubled.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum ArgTemplate {
    Literal(String),
    AddressOf(String),
    Deployer,
}

impl ArgTemplate {
    pub fn literal(value: impl Into<String>) -> Self {
        Self::Literal(value.into())
    }

    pub fn address_of(name: impl Into<String>) -> Self {
        Self::AddressOf(name.into())
    }

    /// The contract name this template depends on, if any.
    pub fn reference(&self) -> Option<&str> {
        match self {
            Self::AddressOf(name) => Some(name),
            _ => None,
        }
    }
}

impl FromStr for ArgTemplate {
    type Err = DeployError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut chars = s.chars();
        match (chars.next(), chars.next()) {
            (Some(ADDRESS_OF_PREFIX), Some(ADDRESS_OF_PREFIX))
            | (Some(VARIABLE_PREFIX), Some(VARIABLE_PREFIX)) => Ok(Self::Literal(s[1..].to_string())),
            (Some(ADDRESS_OF_PREFIX), _) => {
                let name = &s[1..];
                if name.is_empty() {
                    return Err(DeployError::InvalidPlan(
                        "`@` must be followed by a contract name".to_string(),
                    ));
                }
                Ok(Self::AddressOf(name.to_string()))
            }
            (Some(VARIABLE_PREFIX), _) => match &s[1..] {
                DEPLOYER_VARIABLE => Ok(Self::Deployer),
                other => Err(DeployError::InvalidPlan(format!(
                    "unknown variable `${other}`"
                ))),
            },
            _ => Ok(Self::Literal(s.to_string())),
        }
    }
}

impl fmt::Display for ArgTemplate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Literal(value)
                if value.starts_with(ADDRESS_OF_PREFIX) || value.starts_with(VARIABLE_PREFIX) =>
            {
                // Double the first character so the literal survives a round trip.
                write!(f, "{}{}", &value[..1], value)
            }
            Self::Literal(value) => f.write_str(value),
            Self::AddressOf(name) => write!(f, "{ADDRESS_OF_PREFIX}{name}"),
            Self::Deployer => write!(f, "{VARIABLE_PREFIX}{DEPLOYER_VARIABLE}"),
        }
    }
}

impl TryFrom<String> for ArgTemplate {
    type Error = DeployError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<ArgTemplate> for String {
    fn from(value: ArgTemplate) -> Self {
        value.to_string()
    }
}

/// A fact read back from a freshly deployed contract through a zero-argument view function.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReadBack {
    /// Label used in the transcript, e.g. "Total supply".
    pub label: String,
    /// Name of the view function in the contract's ABI.
    pub function: String,
    /// Decimals used to scale an integer result.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub units: Option<u8>,
    /// Unit symbol appended to the value.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub symbol: Option<String>,
}

impl ReadBack {
    pub fn new(label: impl Into<String>, function: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            function: function.into(),
            units: None,
            symbol: None,
        }
    }

    pub fn scaled(mut self, units: u8, symbol: impl Into<String>) -> Self {
        self.units = Some(units);
        self.symbol = Some(symbol.into());
        self
    }
}

/// Declarative description of one contract to deploy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeploymentSpec {
    /// Name the contract is known by in the plan and in the manifest.
    pub name: String,
    /// Artifact to deploy. Defaults to `name`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub contract: Option<String>,
    /// Constructor-argument templates, in ABI order.
    #[serde(default)]
    pub args: Vec<ArgTemplate>,
    /// Facts read back and reported once the contract is confirmed.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub facts: Vec<ReadBack>,
}

impl DeploymentSpec {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            contract: None,
            args: Vec::new(),
            facts: Vec::new(),
        }
    }

    pub fn arg(mut self, arg: ArgTemplate) -> Self {
        self.args.push(arg);
        self
    }

    pub fn fact(mut self, fact: ReadBack) -> Self {
        self.facts.push(fact);
        self
    }

    /// The artifact name backing this spec.
    pub fn artifact(&self) -> &str {
        self.contract.as_deref().unwrap_or(&self.name)
    }
}

/// A labelled identity value recorded in the manifest, e.g. an operator bound to the deployer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
    pub label: String,
    pub value: ArgTemplate,
}

/// An ordered set of contracts to deploy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeploymentPlan {
    /// Title printed at the start of the transcript.
    pub title: String,
    /// Contracts in declared order.
    #[serde(default)]
    pub contracts: Vec<DeploymentSpec>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub identities: Vec<Identity>,
}

impl DeploymentPlan {
    /// The Prediction Market System: the collateral token, then the market bound to it.
    pub fn prediction_market() -> Self {
        Self {
            title: "Prediction Market System".to_string(),
            contracts: vec![
                DeploymentSpec::new("PredictionToken")
                    .arg(ArgTemplate::literal("Prediction Token"))
                    .arg(ArgTemplate::literal("pUSDC"))
                    .arg(ArgTemplate::literal("100000000"))
                    .arg(ArgTemplate::Deployer)
                    .fact(ReadBack::new("Total supply", "totalSupply").scaled(18, "PRED")),
                DeploymentSpec::new("AIPredictionMarket")
                    .arg(ArgTemplate::Deployer)
                    .arg(ArgTemplate::address_of("PredictionToken"))
                    .fact(ReadBack::new("AI Operator", "aiOperator"))
                    .fact(ReadBack::new("Token", "token")),
            ],
            identities: vec![Identity {
                label: "AI Operator".to_string(),
                value: ArgTemplate::Deployer,
            }],
        }
    }

    /// Parse a plan from TOML and validate it.
    pub fn from_toml(content: &str) -> Result<Self, DeployError> {
        let plan: Self = toml::from_str(content)
            .map_err(|e| DeployError::InvalidPlan(format!("failed to parse plan: {e}")))?;
        plan.validate()?;
        Ok(plan)
    }

    /// Load a plan from a TOML file.
    pub fn load_from_file(path: &Path) -> Result<Self, DeployError> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            DeployError::InvalidPlan(format!("failed to read {}: {e}", path.display()))
        })?;
        let plan = Self::from_toml(&content)?;
        tracing::info!(path = %path.display(), contracts = plan.contracts.len(), "Plan loaded");
        Ok(plan)
    }

    /// Reject structural problems: an empty plan or a name declared twice.
    pub fn validate(&self) -> Result<(), DeployError> {
        if self.contracts.is_empty() {
            return Err(DeployError::InvalidPlan(
                "plan declares no contracts".to_string(),
            ));
        }

        let mut seen = BTreeSet::new();
        for spec in &self.contracts {
            if !seen.insert(spec.name.as_str()) {
                return Err(DeployError::InvalidPlan(format!(
                    "contract `{}` is declared more than once",
                    spec.name
                )));
            }
        }

        Ok(())
    }

    /// Statically check that every `@Name` points to an earlier spec.
    ///
    /// The orchestrator performs the same check step by step while deploying; this lets a
    /// plan be vetted without touching the network.
    pub fn check_references(&self) -> Result<(), DeployError> {
        let mut declared = BTreeSet::new();
        for spec in &self.contracts {
            for reference in spec.args.iter().filter_map(ArgTemplate::reference) {
                if !declared.contains(reference) {
                    return Err(DeployError::Dependency {
                        contract: spec.name.clone(),
                        reference: reference.to_string(),
                    });
                }
            }
            declared.insert(spec.name.as_str());
        }

        for identity in &self.identities {
            if let Some(reference) = identity.value.reference() {
                if !declared.contains(reference) {
                    return Err(DeployError::Dependency {
                        contract: identity.label.clone(),
                        reference: reference.to_string(),
                    });
                }
            }
        }

        Ok(())
    }
}
