//! pmd deploys the prediction market contracts to an EVM network, in dependency order, and
//! prints the resulting manifest.

mod cli;

use std::{io::Write, path::Path, process::ExitCode};

use anyhow::{Context, Result};
use clap::Parser;

use cli::Cli;
use pmd_deploy::{
    ArtifactStore, ConfigLoader, DeploySigner, HardhatArtifacts, Orchestrator, Reporter, RpcChain,
    RunOutcome,
};

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    // Logs go to stderr; stdout carries the transcript and the manifest.
    tracing_subscriber::fmt()
        .with_max_level(cli.verbosity)
        .with_writer(std::io::stderr)
        .init();

    if cli.check {
        return match check(&cli) {
            Ok(()) => ExitCode::SUCCESS,
            Err(e) => finish(RunOutcome::Failed(e), None),
        };
    }

    let outcome = match deploy(&cli).await {
        Ok(outcome) => outcome,
        Err(e) => RunOutcome::Failed(e),
    };
    finish(outcome, cli.manifest_out.as_deref())
}

/// Print the outcome, save the manifest if asked to, and map both to the exit status.
fn finish(outcome: RunOutcome, manifest_out: Option<&Path>) -> ExitCode {
    ExitCode::from(outcome.conclude(
        manifest_out,
        &mut std::io::stdout().lock(),
        &mut std::io::stderr().lock(),
    ))
}

/// Resolve everything a run needs without touching the network.
fn check(cli: &Cli) -> Result<()> {
    let config = ConfigLoader::new(&cli.network)
        .config_file(&cli.config)
        .load()?;
    let plan = cli.plan()?;
    plan.check_references()?;

    let artifacts = HardhatArtifacts::new(&cli.artifacts);
    for spec in &plan.contracts {
        artifacts
            .factory(spec.artifact())
            .context(format!("Contract `{}` cannot be deployed", spec.name))?;
    }

    let mut out = std::io::stdout().lock();
    writeln!(
        out,
        "Plan `{}` is valid: {} contracts for {} (chain {}).",
        plan.title,
        plan.contracts.len(),
        config.name,
        config.chain_id
    )?;
    Ok(())
}

/// Deploy the plan. Errors returned here happen before the first submission.
async fn deploy(cli: &Cli) -> Result<RunOutcome> {
    let config = ConfigLoader::new(&cli.network)
        .config_file(&cli.config)
        .load()?;
    let plan = cli.plan()?;

    tracing::info!(
        network = %config.name,
        rpc_url = %config.rpc_url,
        plan = %plan.title,
        artifacts = %cli.artifacts.display(),
        "Preparing deployment..."
    );

    let chain = RpcChain::new(&config)?;
    let artifacts = HardhatArtifacts::new(&cli.artifacts);
    let orchestrator = Orchestrator::new(&chain, &artifacts, &config);

    orchestrator.verify_chain().await?;
    let signer = DeploySigner::select(&config, &chain).await?;

    let mut reporter = Reporter::new(std::io::stdout());
    let result = orchestrator.deploy(&plan, &signer, &mut reporter).await;

    if let Ok(manifest) = &result {
        reporter.summarize(manifest);
    }

    Ok(result.into())
}
