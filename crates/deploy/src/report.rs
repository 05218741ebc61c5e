//! Human-readable progress transcript.

use std::{fmt, io::Write};

use alloy_core::{
    dyn_abi::DynSolValue,
    primitives::{Address, TxHash, U256, utils::format_units},
};
use comfy_table::Table;

use crate::{DeployedContract, DeploymentManifest, DeploymentPlan, DeploymentSpec, ReadBack};

/// Decimals of the native currency.
const ETHER_DECIMALS: u8 = 18;

/// Receives progress events from the orchestrator, strictly in run order.
pub trait DeploymentObserver {
    fn on_run_started(&mut self, _plan: &DeploymentPlan, _deployer: Address, _balance: U256) {}

    fn on_step_started(&mut self, _index: usize, _spec: &DeploymentSpec) {}

    fn on_submitted(&mut self, _spec: &DeploymentSpec, _tx_hash: TxHash) {}

    fn on_confirmed(&mut self, _index: usize, _contract: &DeployedContract) {}
}

impl DeploymentObserver for () {}

/// Writes the transcript of a run: one announcement per step, then a summary.
pub struct Reporter<W: Write> {
    out: W,
}

impl<W: Write> Reporter<W> {
    pub fn new(out: W) -> Self {
        Self { out }
    }

    pub fn into_inner(self) -> W {
        self.out
    }

    fn line(&mut self, args: fmt::Arguments<'_>) {
        if let Err(e) = self.out.write_fmt(args).and_then(|_| self.out.write_all(b"\n")) {
            tracing::warn!(error = %e, "Failed to write transcript line");
        }
    }

    /// Announce a confirmed contract with its address and read-back facts.
    pub fn report(&mut self, contract: &DeployedContract) {
        self.line(format_args!(
            "   {} deployed to: {}",
            contract.name, contract.address
        ));
        for fact in &contract.facts {
            self.line(format_args!("   {}: {}", fact.label, fact.value));
        }
        self.line(format_args!(""));
    }

    /// Summarize a completed run.
    pub fn summarize(&mut self, manifest: &DeploymentManifest) {
        let mut table = Table::new();
        table.set_header(vec!["Contract", "Address", "Transaction", "Gas used"]);
        for contract in &manifest.contracts {
            table.add_row(vec![
                contract.name.clone(),
                contract.address.to_string(),
                contract.tx_hash.to_string(),
                contract.gas_used.to_string(),
            ]);
        }

        self.line(format_args!("=== Deployment Summary ==="));
        self.line(format_args!("{table}"));
        for identity in &manifest.identities {
            self.line(format_args!("{}: {}", identity.label, identity.value));
        }
        self.line(format_args!(""));
        self.line(format_args!(
            "All {} contracts deployed successfully on {} (chain {}).",
            manifest.contracts.len(),
            manifest.network,
            manifest.chain_id
        ));
    }
}

impl<W: Write> DeploymentObserver for Reporter<W> {
    fn on_run_started(&mut self, plan: &DeploymentPlan, deployer: Address, balance: U256) {
        self.line(format_args!("=== Deploying {} ===", plan.title));
        self.line(format_args!("Deployer account: {deployer}"));
        self.line(format_args!(
            "Account balance: {} ETH",
            format_scaled(balance, ETHER_DECIMALS)
        ));
        self.line(format_args!(""));
    }

    fn on_step_started(&mut self, index: usize, spec: &DeploymentSpec) {
        self.line(format_args!("{}. Deploying {}...", index + 1, spec.name));
    }

    fn on_confirmed(&mut self, _index: usize, contract: &DeployedContract) {
        self.report(contract);
    }
}

/// Render `value` scaled by `decimals`, trimmed like `1.5` or `100.0`.
pub fn format_scaled(value: U256, decimals: u8) -> String {
    match format_units(value, decimals) {
        Ok(formatted) if formatted.contains('.') => {
            let trimmed = formatted.trim_end_matches('0');
            if trimmed.ends_with('.') {
                format!("{trimmed}0")
            } else {
                trimmed.to_string()
            }
        }
        Ok(formatted) => formatted,
        Err(_) => value.to_string(),
    }
}

/// Render a read-back value for the transcript and manifest.
pub fn format_fact(value: &DynSolValue, fact: &ReadBack) -> String {
    let rendered = match (value, fact.units) {
        (DynSolValue::Uint(v, _), Some(units)) => format_scaled(*v, units),
        (DynSolValue::Uint(v, _), None) => v.to_string(),
        (DynSolValue::Int(v, _), _) => v.to_string(),
        (DynSolValue::Address(address), _) => address.to_string(),
        (DynSolValue::Bool(b), _) => b.to_string(),
        (DynSolValue::String(s), _) => s.clone(),
        (other, _) => format!("{other:?}"),
    };

    match &fact.symbol {
        Some(symbol) => format!("{rendered} {symbol}"),
        None => rendered,
    }
}
