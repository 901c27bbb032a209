//! Development pipeline command.

use anyhow::Result;
use kiln_server::DevSession;

use crate::config::Project;

/// Clean, build, then watch and serve.
pub async fn run(project: &Project, port: Option<u16>, open: bool) -> Result<()> {
    let server = project.server_config(port, open);
    tracing::info!("Starting development pipeline on port {}", server.port);

    DevSession::new(project.builder(), server).run().await?;

    Ok(())
}
