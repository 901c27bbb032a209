//! The path table: where each asset kind is read from, written to and watched.

use std::fmt;
use std::path::{Path, PathBuf};

use globset::{GlobBuilder, GlobMatcher};

/// Asset kinds handled by the pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum AssetKind {
    Html,
    Css,
    Js,
    Img,
    Fonts,
}

impl AssetKind {
    /// Every kind, in table order.
    pub const ALL: [AssetKind; 5] = [
        AssetKind::Html,
        AssetKind::Css,
        AssetKind::Js,
        AssetKind::Img,
        AssetKind::Fonts,
    ];

    /// Key of this kind in the path table.
    pub fn key(self) -> &'static str {
        match self {
            AssetKind::Html => "html",
            AssetKind::Css => "css",
            AssetKind::Js => "js",
            AssetKind::Img => "img",
            AssetKind::Fonts => "fonts",
        }
    }

    /// Name of the transform task that builds this kind.
    pub fn task_name(self) -> &'static str {
        match self {
            AssetKind::Html => "html",
            AssetKind::Css => "styles",
            AssetKind::Js => "scripts",
            AssetKind::Img => "images",
            AssetKind::Fonts => "fonts",
        }
    }

    fn index(self) -> usize {
        self as usize
    }
}

impl fmt::Display for AssetKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.task_name())
    }
}

/// Source glob, output directory and watch glob for one asset kind.
///
/// Globs and directories are relative to the project root.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathEntry {
    pub src: String,
    pub build: PathBuf,
    pub watch: String,
}

/// Static mapping from asset kind to its paths.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathTable {
    source: PathBuf,
    clear: PathBuf,
    entries: [PathEntry; 5],
}

const IMAGE_GLOB: &str = "**/*.{webp,jpg,png,svg,gif,ico}";

impl PathTable {
    /// Build the table for a source folder and a project (output) folder.
    pub fn new(source_folder: &str, project_folder: &str) -> Self {
        let src = source_folder.trim_end_matches('/');
        let out = project_folder.trim_end_matches('/');

        let entry = |src_glob: String, build: String, watch: String| PathEntry {
            src: src_glob,
            build: PathBuf::from(build),
            watch,
        };

        Self {
            source: PathBuf::from(src),
            clear: PathBuf::from(out),
            entries: [
                entry(
                    format!("{src}/index.html"),
                    format!("{out}/"),
                    format!("{src}/**/*.html"),
                ),
                entry(
                    format!("{src}/styles/index.css"),
                    format!("{out}/styles/"),
                    format!("{src}/styles/**/*.css"),
                ),
                entry(
                    format!("{src}/scripts/index.js"),
                    format!("{out}/scripts/"),
                    format!("{src}/scripts/**/*.js"),
                ),
                entry(
                    format!("{src}/images/{IMAGE_GLOB}"),
                    format!("{out}/images/"),
                    format!("{src}/images/{IMAGE_GLOB}"),
                ),
                entry(
                    format!("{src}/fonts/**/*.ttf"),
                    format!("{out}/fonts/"),
                    format!("{src}/fonts/**/*.ttf"),
                ),
            ],
        }
    }

    /// Paths for an asset kind.
    pub fn entry(&self, kind: AssetKind) -> &PathEntry {
        &self.entries[kind.index()]
    }

    /// Root of the output tree; removed by the cleaner.
    pub fn clear(&self) -> &Path {
        &self.clear
    }

    /// Root of the source tree; watched recursively.
    pub fn source(&self) -> &Path {
        &self.source
    }
}

impl Default for PathTable {
    fn default() -> Self {
        Self::new("src", "dist")
    }
}

fn is_glob_segment(segment: &str) -> bool {
    segment.contains(['*', '?', '[', '{'])
}

/// Directory prefix of a glob that contains no wildcards.
///
/// Matched files keep their path relative to this base in the output tree.
/// A pattern without wildcards names a single file, so its base is the parent.
pub fn glob_base(pattern: &str) -> PathBuf {
    let segments: Vec<&str> = pattern.split('/').collect();
    match segments.iter().position(|s| is_glob_segment(s)) {
        Some(pos) => segments[..pos].iter().collect(),
        None => Path::new(pattern)
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_default(),
    }
}

/// Whether a pattern names exactly one file.
pub fn is_literal(pattern: &str) -> bool {
    !pattern.split('/').any(is_glob_segment)
}

/// Compile a glob where `*` does not cross directory separators.
pub fn compile_glob(pattern: &str) -> Result<GlobMatcher, globset::Error> {
    Ok(GlobBuilder::new(pattern)
        .literal_separator(true)
        .build()?
        .compile_matcher())
}

/// Forward-slash form of a relative path, as globs expect.
pub fn to_slash(path: &Path) -> String {
    path.components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/")
}
