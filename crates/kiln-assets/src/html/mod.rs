//! The html task: includes, lint, minify.

mod include;
mod lint;
mod minify;

pub use include::resolve_includes;
pub use lint::{lint, LintMessage};
pub use minify::minify;

use crate::builder::BuildConfig;
use crate::paths::AssetKind;
use crate::task::{collect_sources, AssetTask, OutputFile, TaskError};

/// Builds `index.html` from its partials.
pub struct HtmlTask;

impl AssetTask for HtmlTask {
    fn kind(&self) -> AssetKind {
        AssetKind::Html
    }

    fn transform(&self, config: &BuildConfig) -> Result<Vec<OutputFile>, TaskError> {
        let out_dir = config.build_dir(AssetKind::Html);
        let mut outputs = Vec::new();

        for source in collect_sources(config, AssetKind::Html)? {
            let html = resolve_includes(&source.path)?;

            let findings = lint(&html);
            for finding in &findings {
                tracing::warn!("{}: {}", source.path.display(), finding);
            }
            if config.lint_fails_build && !findings.is_empty() {
                return Err(TaskError::Lint {
                    path: source.path,
                    count: findings.len(),
                });
            }

            outputs.push(OutputFile::new(
                out_dir.join(&source.relative),
                minify(&html),
            ));
        }

        Ok(outputs)
    }
}
