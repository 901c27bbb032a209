//! Clean command.

use anyhow::Result;

use crate::config::Project;

/// Delete the output directory.
pub fn run(project: &Project) -> Result<()> {
    project.builder().clean()?;
    Ok(())
}
