//! Mapping a finished run to the process exit status.

use std::{io::Write, path::Path};

use crate::{DeploymentFailure, DeploymentManifest};

/// How a run ended.
#[derive(Debug)]
pub enum RunOutcome {
    /// Every contract in the plan was confirmed.
    Completed(DeploymentManifest),
    /// The orchestrator stopped partway; the failure carries what was confirmed.
    Aborted(DeploymentFailure),
    /// The run failed before anything was submitted (configuration, plan, connection).
    Failed(anyhow::Error),
}

impl RunOutcome {
    pub fn exit_code(&self) -> u8 {
        match self {
            Self::Completed(_) => 0,
            Self::Aborted(_) | Self::Failed(_) => 1,
        }
    }

    /// The manifest this outcome carries, partial for an aborted run.
    pub fn manifest(&self) -> Option<&DeploymentManifest> {
        match self {
            Self::Completed(manifest) => Some(manifest),
            Self::Aborted(failure) => Some(&failure.manifest),
            Self::Failed(_) => None,
        }
    }

    /// Print the result, then write the manifest to `manifest_out` if given.
    ///
    /// The outcome is always printed first. A failed save is reported on its own and
    /// turns the exit status into a failure. Returns the exit status.
    pub fn conclude(
        &self,
        manifest_out: Option<&Path>,
        out: &mut impl Write,
        err: &mut impl Write,
    ) -> u8 {
        if let Err(e) = self.emit(out, err) {
            tracing::warn!(error = %e, "Failed to print the deployment result");
        }

        let mut exit_code = self.exit_code();
        if let (Some(path), Some(manifest)) = (manifest_out, self.manifest()) {
            if let Err(e) = manifest.save_to_file(path) {
                tracing::error!(path = %path.display(), error = %e, "Failed to save the manifest");
                let _ = writeln!(err, "Failed to save manifest: {e:#}");
                exit_code = 1;
            }
        }
        exit_code
    }

    /// Print the final result: the manifest to `out` on success, the error to `err` otherwise.
    pub fn emit(&self, out: &mut impl Write, err: &mut impl Write) -> std::io::Result<()> {
        match self {
            Self::Completed(manifest) => {
                let json = manifest.to_json_pretty().map_err(std::io::Error::other)?;
                writeln!(out, "Deployment result: {json}")?;
            }
            Self::Aborted(failure) => {
                writeln!(err, "Deployment failed: {}", failure.error)?;
                if !failure.manifest.contracts.is_empty() {
                    writeln!(err, "Contracts confirmed before the failure:")?;
                    for contract in &failure.manifest.contracts {
                        writeln!(err, "   {}: {}", contract.name, contract.address)?;
                    }
                }
            }
            Self::Failed(error) => {
                writeln!(err, "Deployment failed: {error:#}")?;
            }
        }
        Ok(())
    }
}

impl From<Result<DeploymentManifest, DeploymentFailure>> for RunOutcome {
    fn from(result: Result<DeploymentManifest, DeploymentFailure>) -> Self {
        match result {
            Ok(manifest) => Self::Completed(manifest),
            Err(failure) => Self::Aborted(failure),
        }
    }
}
