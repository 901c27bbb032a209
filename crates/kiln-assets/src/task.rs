//! The transform task seam shared by every asset kind.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Instant;

use walkdir::WalkDir;

use crate::builder::BuildConfig;
use crate::fonts::FontsTask;
use crate::html::HtmlTask;
use crate::images::ImagesTask;
use crate::paths::{compile_glob, glob_base, is_literal, to_slash, AssetKind};
use crate::scripts::ScriptsTask;
use crate::styles::StylesTask;

/// Errors that abort a task run.
#[derive(Debug, thiserror::Error)]
pub enum TaskError {
    #[error("Source not found: {0}")]
    MissingSource(PathBuf),

    #[error("Invalid glob pattern '{pattern}': {message}")]
    Pattern { pattern: String, message: String },

    #[error("Failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to write {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Include error in {path}: {message}")]
    Include { path: PathBuf, message: String },

    #[error("{count} lint problem(s) in {path}")]
    Lint { path: PathBuf, count: usize },

    #[error("CSS error in {path}: {message}")]
    Css { path: PathBuf, message: String },

    #[error(transparent)]
    Script(#[from] kiln_bundle::BundleError),

    #[error("Image error in {path}: {message}")]
    Image { path: PathBuf, message: String },

    #[error("Font error in {path}: {message}")]
    Font { path: PathBuf, message: String },

    #[error("Task did not complete: {0}")]
    Join(String),
}

/// A file produced by a task, held in memory until the run succeeds.
#[derive(Debug, Clone)]
pub struct OutputFile {
    pub path: PathBuf,
    pub contents: Vec<u8>,
}

impl OutputFile {
    pub fn new(path: PathBuf, contents: impl Into<Vec<u8>>) -> Self {
        Self {
            path,
            contents: contents.into(),
        }
    }
}

/// Result of a successful task run.
#[derive(Debug, Clone)]
pub struct TaskReport {
    /// Asset kind the task built
    pub kind: AssetKind,

    /// Files written, without duplicates
    pub files: Vec<PathBuf>,

    /// Run time in milliseconds
    pub duration_ms: u64,
}

/// A source file matched by a task's source glob.
#[derive(Debug, Clone)]
pub struct SourceFile {
    /// Path on disk
    pub path: PathBuf,

    /// Path relative to the glob base; reused under the output directory
    pub relative: PathBuf,
}

/// One transform task per asset kind.
pub trait AssetTask: Send + Sync {
    /// Asset kind this task builds.
    fn kind(&self) -> AssetKind;

    /// Task name used in logs and on the command line.
    fn name(&self) -> &'static str {
        self.kind().task_name()
    }

    /// Run the transformation chain and return the files to write.
    ///
    /// Must not touch the output directory.
    fn transform(&self, config: &BuildConfig) -> Result<Vec<OutputFile>, TaskError>;

    /// Transform, then write every output.
    ///
    /// Nothing is written unless the whole transformation succeeded.
    fn run(&self, config: &BuildConfig) -> Result<TaskReport, TaskError> {
        let start = Instant::now();
        tracing::debug!("Starting {}", self.name());

        let outputs = self.transform(config)?;
        let files = write_outputs(&outputs)?;
        let duration_ms = start.elapsed().as_millis() as u64;

        tracing::info!(
            "Built {} file(s) for {} in {}ms",
            files.len(),
            self.name(),
            duration_ms
        );

        Ok(TaskReport {
            kind: self.kind(),
            files,
            duration_ms,
        })
    }
}

/// The transform task for an asset kind.
pub fn task_for(kind: AssetKind) -> Box<dyn AssetTask> {
    match kind {
        AssetKind::Html => Box::new(HtmlTask),
        AssetKind::Css => Box::new(StylesTask),
        AssetKind::Js => Box::new(ScriptsTask),
        AssetKind::Img => Box::new(ImagesTask),
        AssetKind::Fonts => Box::new(FontsTask),
    }
}

/// Find the files matched by `kind`'s source glob.
///
/// A glob without wildcards must match its file; an empty wildcard match is
/// not an error.
pub fn collect_sources(
    config: &BuildConfig,
    kind: AssetKind,
) -> Result<Vec<SourceFile>, TaskError> {
    let pattern = &config.paths.entry(kind).src;
    let matcher = compile_glob(pattern).map_err(|e| TaskError::Pattern {
        pattern: pattern.clone(),
        message: e.to_string(),
    })?;

    let base = glob_base(pattern);
    let base_dir = config.resolve(&base);
    let mut sources = Vec::new();

    if base_dir.is_dir() {
        for entry in WalkDir::new(&base_dir)
            .follow_links(true)
            .sort_by_file_name()
            .into_iter()
            .filter_map(|e| e.ok())
        {
            if !entry.file_type().is_file() {
                continue;
            }

            let path = entry.path();
            let Ok(from_root) = path.strip_prefix(&config.root) else {
                continue;
            };
            if !matcher.is_match(to_slash(from_root)) {
                continue;
            }

            let relative = path
                .strip_prefix(&base_dir)
                .unwrap_or(path)
                .to_path_buf();

            sources.push(SourceFile {
                path: path.to_path_buf(),
                relative,
            });
        }
    }

    if sources.is_empty() && is_literal(pattern) {
        return Err(TaskError::MissingSource(config.resolve(Path::new(pattern))));
    }

    Ok(sources)
}

/// Read a source file.
pub fn read_source(path: &Path) -> Result<Vec<u8>, TaskError> {
    fs::read(path).map_err(|source| TaskError::Read {
        path: path.to_path_buf(),
        source,
    })
}

/// Write outputs in order, creating parent directories as needed.
///
/// A later output for the same path replaces an earlier one.
pub fn write_outputs(outputs: &[OutputFile]) -> Result<Vec<PathBuf>, TaskError> {
    let mut written: Vec<PathBuf> = Vec::with_capacity(outputs.len());

    for output in outputs {
        if let Some(parent) = output.path.parent() {
            fs::create_dir_all(parent).map_err(|source| TaskError::Write {
                path: parent.to_path_buf(),
                source,
            })?;
        }
        fs::write(&output.path, &output.contents).map_err(|source| TaskError::Write {
            path: output.path.clone(),
            source,
        })?;

        if !written.contains(&output.path) {
            written.push(output.path.clone());
        }
    }

    Ok(written)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::paths::PathTable;
    use tempfile::tempdir;

    fn config_in(root: &Path) -> BuildConfig {
        BuildConfig {
            root: root.to_path_buf(),
            ..Default::default()
        }
    }

    #[test]
    fn every_kind_has_exactly_one_task() {
        let table = PathTable::default();
        for kind in AssetKind::ALL {
            // The watch table and the task registry agree on every kind.
            assert!(!table.entry(kind).watch.is_empty());
            assert_eq!(task_for(kind).kind(), kind);
            assert_eq!(task_for(kind).name(), kind.task_name());
        }
    }

    #[test]
    fn collects_nested_sources_relative_to_glob_base() {
        let temp = tempdir().unwrap();
        let images = temp.path().join("src/images");
        fs::create_dir_all(images.join("icons")).unwrap();
        fs::write(images.join("logo.png"), b"png").unwrap();
        fs::write(images.join("icons/arrow.svg"), b"<svg/>").unwrap();
        fs::write(images.join("readme.txt"), b"skip").unwrap();

        let sources = collect_sources(&config_in(temp.path()), AssetKind::Img).unwrap();
        let relative: Vec<_> = sources.iter().map(|s| s.relative.clone()).collect();

        assert_eq!(
            relative,
            vec![PathBuf::from("icons/arrow.svg"), PathBuf::from("logo.png")]
        );
    }

    #[test]
    fn missing_literal_source_is_an_error() {
        let temp = tempdir().unwrap();

        let err = collect_sources(&config_in(temp.path()), AssetKind::Css).unwrap_err();

        assert!(matches!(err, TaskError::MissingSource(_)));
    }

    #[test]
    fn empty_wildcard_match_is_not_an_error() {
        let temp = tempdir().unwrap();

        let sources = collect_sources(&config_in(temp.path()), AssetKind::Fonts).unwrap();

        assert!(sources.is_empty());
    }

    #[test]
    fn later_outputs_replace_earlier_ones() {
        let temp = tempdir().unwrap();
        let target = temp.path().join("out/a.txt");

        let written = write_outputs(&[
            OutputFile::new(target.clone(), "first"),
            OutputFile::new(target.clone(), "second"),
        ])
        .unwrap();

        assert_eq!(written, vec![target.clone()]);
        assert_eq!(fs::read_to_string(target).unwrap(), "second");
    }
}
