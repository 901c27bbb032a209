//! Serve command.

use anyhow::Result;
use kiln_server::{DevServer, LiveReloadHub};

use crate::config::Project;

/// Serve the current output directory.
pub async fn run(project: &Project, port: Option<u16>, open: bool) -> Result<()> {
    let config = project.server_config(port, open);

    if !config.root.exists() {
        anyhow::bail!(
            "Directory not found: {}. Run 'kiln build' first.",
            config.root.display()
        );
    }

    DevServer::new(config, LiveReloadHub::new()).start().await?;

    Ok(())
}
