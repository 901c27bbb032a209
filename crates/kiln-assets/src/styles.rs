//! The styles task: bundle, lower, prefix and minify stylesheets with lightningcss.

use std::path::Path;

use base64::Engine;
use lightningcss::bundler::{Bundler, FileProvider};
use lightningcss::stylesheet::{MinifyOptions, ParserOptions, PrinterOptions};
use lightningcss::targets::{Browsers, Features, Targets};
use parcel_sourcemap::SourceMap;

use crate::builder::BuildConfig;
use crate::paths::AssetKind;
use crate::task::{collect_sources, AssetTask, OutputFile, TaskError};

/// Browserslist query the output must support.
const BROWSERS: &str = "defaults";

/// Builds `styles/index.css` and everything it imports.
pub struct StylesTask;

impl AssetTask for StylesTask {
    fn kind(&self) -> AssetKind {
        AssetKind::Css
    }

    fn transform(&self, config: &BuildConfig) -> Result<Vec<OutputFile>, TaskError> {
        let out_dir = config.build_dir(AssetKind::Css);
        let targets = targets();

        collect_sources(config, AssetKind::Css)?
            .into_iter()
            .map(|source| {
                let css = compile(&source.path, &config.source_dir(), targets, config.sourcemaps)?;
                Ok(OutputFile::new(out_dir.join(&source.relative), css))
            })
            .collect()
    }
}

/// Browser targets for the `defaults` query.
///
/// Media range syntax is always lowered so older engines read the queries.
pub fn targets() -> Targets {
    let browsers = match Browsers::from_browserslist([BROWSERS]) {
        Ok(browsers) => browsers,
        Err(e) => {
            tracing::warn!("Failed to resolve browserslist query '{}': {}", BROWSERS, e);
            None
        }
    };

    Targets {
        browsers,
        include: Features::MediaRangeSyntax | Features::MediaIntervalSyntax,
        ..Default::default()
    }
}

/// Compile one entry stylesheet, inlining its imports.
pub fn compile(
    entry: &Path,
    source_root: &Path,
    targets: Targets,
    sourcemaps: bool,
) -> Result<String, TaskError> {
    let css_error = |message: String| TaskError::Css {
        path: entry.to_path_buf(),
        message,
    };

    let provider = FileProvider::new();
    let mut source_map = sourcemaps.then(|| SourceMap::new(&source_root.to_string_lossy()));

    let mut bundler = Bundler::new(&provider, source_map.as_mut(), ParserOptions::default());
    let mut stylesheet = bundler
        .bundle(entry)
        .map_err(|e| css_error(e.to_string()))?;
    drop(bundler);

    stylesheet
        .minify(MinifyOptions {
            targets,
            ..Default::default()
        })
        .map_err(|e| css_error(format!("minify error: {}", e)))?;

    let result = stylesheet
        .to_css(PrinterOptions {
            minify: true,
            targets,
            source_map: source_map.as_mut(),
            ..Default::default()
        })
        .map_err(|e| css_error(format!("print error: {}", e)))?;

    let mut css = result.code;

    if let Some(map) = source_map.as_mut() {
        let json = map
            .to_json(None)
            .map_err(|e| css_error(format!("source map error: {:?}", e)))?;
        css.push_str(&inline_source_map(&json));
    }

    Ok(css)
}

fn inline_source_map(json: &str) -> String {
    format!(
        "\n/*# sourceMappingURL=data:application/json;charset=utf-8;base64,{} */",
        base64::engine::general_purpose::STANDARD.encode(json)
    )
}
