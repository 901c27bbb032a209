//! Full build command: clean, then every transform task.

use anyhow::{Context, Result};
use kiln_server::dev::log_summary;

use crate::config::Project;

/// Run the build command. Fails if any task failed.
pub async fn run(project: &Project) -> Result<()> {
    tracing::info!("Building assets...");

    let builder = project.builder();
    let summary = builder
        .rebuild()
        .await
        .context("Failed to clean output directory")?;

    log_summary(&summary);
    tracing::info!("Output: {}", builder.config().output_dir().display());

    let failed: Vec<String> = summary.failures().map(|(kind, _)| kind.to_string()).collect();
    if !failed.is_empty() {
        anyhow::bail!("Build failed: {}", failed.join(", "));
    }

    Ok(())
}
