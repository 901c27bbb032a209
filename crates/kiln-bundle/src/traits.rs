//! Trait definitions and shared types for bundling.

use std::path::{Path, PathBuf};

/// Options controlling bundle output.
#[derive(Debug, Clone)]
pub struct BundleOptions {
    /// Compress, mangle and print the bundle without whitespace or comments
    pub minify: bool,
}

impl Default for BundleOptions {
    fn default() -> Self {
        Self { minify: true }
    }
}

/// Result of bundling an entry module.
#[derive(Debug, Clone)]
pub struct Bundle {
    /// Bundled script source
    pub code: String,

    /// Module files in table order; the entry is first
    pub modules: Vec<PathBuf>,
}

/// Errors that can occur during bundling.
#[derive(Debug, thiserror::Error)]
pub enum BundleError {
    #[error("Failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Parse error in {path}: {message}")]
    Parse { path: PathBuf, message: String },

    #[error("Cannot resolve '{specifier}' imported from {importer}")]
    Unresolved { specifier: String, importer: PathBuf },

    #[error("Invalid package manifest {path}: {message}")]
    Manifest { path: PathBuf, message: String },
}

/// Trait for turning import specifiers into module files.
pub trait Resolver: Send + Sync {
    /// Resolve `specifier` as written in the module at `importer`.
    ///
    /// Returns a canonical path so the same file always maps to one module.
    fn resolve(&self, specifier: &str, importer: &Path) -> Result<PathBuf, BundleError>;
}
