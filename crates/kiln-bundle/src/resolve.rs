//! Node-style module resolution.

use std::fs;
use std::path::{Path, PathBuf};

use crate::traits::{BundleError, Resolver};

const EXTENSIONS: &[&str] = &["js", "mjs"];

/// Resolves relative specifiers against the importer and bare specifiers
/// through `node_modules` directories.
#[derive(Debug, Default, Clone)]
pub struct NodeResolver;

impl NodeResolver {
    /// Create a new resolver.
    pub fn new() -> Self {
        Self
    }

    fn resolve_path(&self, candidate: &Path) -> Result<Option<PathBuf>, BundleError> {
        if let Some(file) = resolve_file(candidate) {
            return Ok(Some(file));
        }
        if !candidate.is_dir() {
            return Ok(None);
        }

        let manifest = candidate.join("package.json");
        if manifest.is_file() {
            if let Some(main) = read_entry_field(&manifest)? {
                let target = candidate.join(main);
                if let Some(file) = resolve_file(&target).or_else(|| resolve_index(&target)) {
                    return Ok(Some(file));
                }
            }
        }

        Ok(resolve_index(candidate))
    }
}

/// `candidate` itself, or `candidate` with one of the known extensions appended.
fn resolve_file(candidate: &Path) -> Option<PathBuf> {
    if candidate.is_file() {
        return Some(candidate.to_path_buf());
    }

    EXTENSIONS.iter().find_map(|ext| {
        let mut with_ext = candidate.as_os_str().to_owned();
        with_ext.push(".");
        with_ext.push(ext);
        let with_ext = PathBuf::from(with_ext);
        with_ext.is_file().then_some(with_ext)
    })
}

/// The `index` module of a directory.
fn resolve_index(dir: &Path) -> Option<PathBuf> {
    EXTENSIONS
        .iter()
        .map(|ext| dir.join(format!("index.{ext}")))
        .find(|index| index.is_file())
}

impl Resolver for NodeResolver {
    fn resolve(&self, specifier: &str, importer: &Path) -> Result<PathBuf, BundleError> {
        let unresolved = || BundleError::Unresolved {
            specifier: specifier.to_string(),
            importer: importer.to_path_buf(),
        };

        let importer_dir = importer.parent().unwrap_or(Path::new("."));

        let found = if is_relative(specifier) {
            self.resolve_path(&importer_dir.join(specifier))?
        } else if Path::new(specifier).is_absolute() {
            self.resolve_path(Path::new(specifier))?
        } else {
            let mut found = None;
            for dir in importer_dir.ancestors() {
                let candidate = dir.join("node_modules").join(specifier);
                if let Some(path) = self.resolve_path(&candidate)? {
                    found = Some(path);
                    break;
                }
            }
            found
        };

        let path = found.ok_or_else(unresolved)?;
        fs::canonicalize(&path).map_err(|source| BundleError::Read { path, source })
    }
}

fn is_relative(specifier: &str) -> bool {
    specifier == "."
        || specifier == ".."
        || specifier.starts_with("./")
        || specifier.starts_with("../")
}

/// Read the `module` or `main` field of a package manifest.
fn read_entry_field(manifest: &Path) -> Result<Option<String>, BundleError> {
    let content = fs::read_to_string(manifest).map_err(|source| BundleError::Read {
        path: manifest.to_path_buf(),
        source,
    })?;

    let value: serde_json::Value =
        serde_json::from_str(&content).map_err(|e| BundleError::Manifest {
            path: manifest.to_path_buf(),
            message: e.to_string(),
        })?;

    Ok(["module", "main"]
        .iter()
        .find_map(|key| value.get(key).and_then(|v| v.as_str()))
        .map(str::to_string))
}
