//! The scripts task: bundle the entry module and its imports.

use kiln_bundle::{BundleOptions, Bundler};

use crate::builder::BuildConfig;
use crate::paths::AssetKind;
use crate::task::{collect_sources, AssetTask, OutputFile, TaskError};

/// Builds `scripts/index.js` from its module graph.
pub struct ScriptsTask;

impl AssetTask for ScriptsTask {
    fn kind(&self) -> AssetKind {
        AssetKind::Js
    }

    fn transform(&self, config: &BuildConfig) -> Result<Vec<OutputFile>, TaskError> {
        let out_dir = config.build_dir(AssetKind::Js);
        let bundler = Bundler::new(BundleOptions {
            minify: config.minify_js,
        });

        let mut outputs = Vec::new();
        for source in collect_sources(config, AssetKind::Js)? {
            let bundle = bundler.bundle(&source.path)?;
            tracing::debug!(
                "Bundled {} module(s) from {}",
                bundle.modules.len(),
                source.path.display()
            );
            outputs.push(OutputFile::new(out_dir.join(&source.relative), bundle.code));
        }

        Ok(outputs)
    }
}
