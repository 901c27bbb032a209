//! Single-task commands: html, styles, scripts, images, fonts.

use anyhow::{Context, Result};
use kiln_assets::AssetKind;

use crate::config::Project;

/// Run the transform task for one asset kind.
pub async fn run(project: &Project, kind: AssetKind) -> Result<()> {
    let report = project
        .builder()
        .run(kind)
        .await
        .with_context(|| format!("Task {} failed", kind))?;

    for file in &report.files {
        tracing::debug!("Wrote {}", file.display());
    }

    Ok(())
}
