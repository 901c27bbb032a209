//! Build orchestration: clean, then every transform task in parallel.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use tokio::task::JoinSet;

use crate::clean::{clean_output, CleanError};
use crate::paths::{AssetKind, PathTable};
use crate::task::{task_for, TaskError, TaskReport};

/// Configuration for building assets.
#[derive(Debug, Clone)]
pub struct BuildConfig {
    /// Project root; every path in the table is relative to it
    pub root: PathBuf,

    /// Source, output and watch paths per asset kind
    pub paths: PathTable,

    /// Append inline source maps to stylesheets
    pub sourcemaps: bool,

    /// Minify bundled scripts
    pub minify_js: bool,

    /// Abort the html task when the linter reports problems
    pub lint_fails_build: bool,
}

impl Default for BuildConfig {
    fn default() -> Self {
        Self {
            root: PathBuf::from("."),
            paths: PathTable::default(),
            sourcemaps: true,
            minify_js: true,
            lint_fails_build: false,
        }
    }
}

impl BuildConfig {
    /// Resolve a table path against the project root.
    pub fn resolve(&self, relative: &Path) -> PathBuf {
        self.root.join(relative)
    }

    /// Output directory for an asset kind.
    pub fn build_dir(&self, kind: AssetKind) -> PathBuf {
        self.resolve(&self.paths.entry(kind).build)
    }

    /// Root of the output tree.
    pub fn output_dir(&self) -> PathBuf {
        self.resolve(self.paths.clear())
    }

    /// Root of the source tree.
    pub fn source_dir(&self) -> PathBuf {
        self.resolve(self.paths.source())
    }
}

/// Outcome of running every transform task once.
#[derive(Debug)]
pub struct BuildSummary {
    /// One outcome per asset kind, in table order
    pub outcomes: Vec<(AssetKind, Result<TaskReport, TaskError>)>,

    /// Wall-clock build time in milliseconds
    pub duration_ms: u64,
}

impl BuildSummary {
    /// Whether every task succeeded.
    pub fn is_success(&self) -> bool {
        self.outcomes.iter().all(|(_, r)| r.is_ok())
    }

    /// Tasks that failed, with their errors.
    pub fn failures(&self) -> impl Iterator<Item = (AssetKind, &TaskError)> {
        self.outcomes
            .iter()
            .filter_map(|(kind, r)| r.as_ref().err().map(|e| (*kind, e)))
    }

    /// Every file written by the successful tasks.
    pub fn files(&self) -> impl Iterator<Item = &PathBuf> {
        self.outcomes
            .iter()
            .filter_map(|(_, r)| r.as_ref().ok())
            .flat_map(|report| report.files.iter())
    }
}

/// Runs transform tasks against one build configuration.
#[derive(Debug, Clone)]
pub struct AssetBuilder {
    config: Arc<BuildConfig>,
}

impl AssetBuilder {
    /// Create a new asset builder.
    pub fn new(config: BuildConfig) -> Self {
        Self {
            config: Arc::new(config),
        }
    }

    /// The configuration this builder runs with.
    pub fn config(&self) -> &BuildConfig {
        &self.config
    }

    /// Delete the output tree.
    pub fn clean(&self) -> Result<(), CleanError> {
        clean_output(&self.config)
    }

    /// Run one transform task on the blocking pool.
    pub async fn run(&self, kind: AssetKind) -> Result<TaskReport, TaskError> {
        let config = Arc::clone(&self.config);
        tokio::task::spawn_blocking(move || task_for(kind).run(&config))
            .await
            .map_err(|e| TaskError::Join(e.to_string()))?
    }

    /// Run every transform task concurrently.
    ///
    /// A failing task does not stop the others.
    pub async fn build(&self) -> BuildSummary {
        let start = Instant::now();
        let mut set = JoinSet::new();

        for kind in AssetKind::ALL {
            let builder = self.clone();
            set.spawn(async move { (kind, builder.run(kind).await) });
        }

        let mut outcomes = Vec::with_capacity(AssetKind::ALL.len());
        while let Some(joined) = set.join_next().await {
            match joined {
                Ok(outcome) => outcomes.push(outcome),
                Err(e) => tracing::error!("Build task did not complete: {}", e),
            }
        }
        outcomes.sort_by_key(|(kind, _)| *kind);

        for (kind, err) in outcomes
            .iter()
            .filter_map(|(kind, r)| r.as_ref().err().map(|e| (kind, e)))
        {
            tracing::error!("Task {} failed: {}", kind, err);
        }

        BuildSummary {
            outcomes,
            duration_ms: start.elapsed().as_millis() as u64,
        }
    }

    /// Clean, then run every transform task.
    pub async fn rebuild(&self) -> Result<BuildSummary, CleanError> {
        self.clean()?;
        Ok(self.build().await)
    }
}
