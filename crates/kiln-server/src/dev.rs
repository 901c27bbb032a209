//! The default pipeline: clean, build everything, then watch and serve.

use kiln_assets::{AssetBuilder, AssetKind, BuildSummary};

use crate::livereload::{LiveReloadHub, LiveReloadMessage};
use crate::server::{DevServer, DevServerConfig, ServerError};
use crate::watcher::{FileWatcher, WatchTable};

/// A development session over one project.
pub struct DevSession {
    builder: AssetBuilder,
    server: DevServerConfig,
    hub: LiveReloadHub,
}

impl DevSession {
    /// Create a session; the server serves the builder's output directory.
    pub fn new(builder: AssetBuilder, server: DevServerConfig) -> Self {
        let server = DevServerConfig {
            root: builder.config().output_dir(),
            ..server
        };
        Self {
            builder,
            server,
            hub: LiveReloadHub::new(),
        }
    }

    /// The hub browsers are notified through.
    pub fn hub(&self) -> &LiveReloadHub {
        &self.hub
    }

    /// Clean, build every asset kind, then watch and serve until an error.
    ///
    /// Failed tasks are logged; the watcher and server still start so a fix
    /// can rebuild.
    pub async fn run(&self) -> Result<(), ServerError> {
        let summary = self.builder.rebuild().await?;
        log_summary(&summary);

        tokio::try_join!(self.watch(), self.serve())?;
        Ok(())
    }

    /// Re-run the matching task for every source change.
    pub async fn watch(&self) -> Result<(), ServerError> {
        let config = self.builder.config();
        let table = WatchTable::new(&config.root, &config.paths)?;
        let source_dir = config.source_dir();

        let (watcher, mut rx) = FileWatcher::new(std::slice::from_ref(&source_dir))?;
        tracing::info!("Watching {}", source_dir.display());

        while let Some(event) = rx.recv().await {
            for kind in table.kinds_for(&event.path) {
                tracing::info!(
                    "{:?} {}, running {}",
                    event.kind,
                    event.path.display(),
                    kind
                );
                self.spawn_run(kind);
            }
        }

        drop(watcher);
        Ok(())
    }

    /// Serve the output directory.
    pub async fn serve(&self) -> Result<(), ServerError> {
        DevServer::new(self.server.clone(), self.hub.clone())
            .start()
            .await
    }

    /// Run one task in the background and notify browsers when it succeeds.
    fn spawn_run(&self, kind: AssetKind) {
        let builder = self.builder.clone();
        let hub = self.hub.clone();
        let output_dir = builder.config().output_dir();

        tokio::spawn(async move {
            match builder.run(kind).await {
                Ok(report) => hub.send(LiveReloadMessage::for_report(&report, &output_dir)),
                Err(e) => tracing::error!("Task {} failed: {}", kind, e),
            }
        });
    }
}

/// Log the outcome of a full build.
pub fn log_summary(summary: &BuildSummary) {
    let failed = summary.failures().count();
    if failed == 0 {
        tracing::info!(
            "Built {} file(s) in {}ms",
            summary.files().count(),
            summary.duration_ms
        );
    } else {
        tracing::warn!(
            "Build finished with {} failed task(s) in {}ms",
            failed,
            summary.duration_ms
        );
    }
}
