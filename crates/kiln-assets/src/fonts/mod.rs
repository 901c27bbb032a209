//! The fonts task: `.woff` and `.woff2` from every `.ttf`.

pub mod sfnt;
pub mod woff;
pub mod woff2;

use crate::builder::BuildConfig;
use crate::paths::AssetKind;
use crate::task::{collect_sources, read_source, AssetTask, OutputFile, TaskError};

/// Converts TrueType fonts to WOFF and WOFF2.
pub struct FontsTask;

impl AssetTask for FontsTask {
    fn kind(&self) -> AssetKind {
        AssetKind::Fonts
    }

    fn transform(&self, config: &BuildConfig) -> Result<Vec<OutputFile>, TaskError> {
        let out_dir = config.build_dir(AssetKind::Fonts);
        let mut outputs = Vec::new();

        for source in collect_sources(config, AssetKind::Fonts)? {
            let bytes = read_source(&source.path)?;
            let font_error = |message: String| TaskError::Font {
                path: source.path.clone(),
                message,
            };

            let font = sfnt::parse(&bytes).map_err(font_error)?;
            let target = out_dir.join(&source.relative);

            outputs.push(OutputFile::new(
                target.with_extension("woff"),
                woff::encode(&font).map_err(font_error)?,
            ));
            outputs.push(OutputFile::new(
                target.with_extension("woff2"),
                woff2::encode(&font).map_err(font_error)?,
            ));
            tracing::debug!(
                "Converted {} ({} tables)",
                source.relative.display(),
                font.tables.len()
            );
        }

        Ok(outputs)
    }
}
