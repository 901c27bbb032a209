//! Watch command.

use anyhow::Result;
use kiln_server::DevSession;

use crate::config::Project;

/// Rebuild assets on change without serving them.
pub async fn run(project: &Project) -> Result<()> {
    let session = DevSession::new(project.builder(), project.server_config(None, false));
    session.watch().await?;
    Ok(())
}
