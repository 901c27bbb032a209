//! Removal of the output tree before a full build.

use std::fs;
use std::io::ErrorKind;
use std::path::PathBuf;

use crate::builder::BuildConfig;

/// Errors that can occur while cleaning.
#[derive(Debug, thiserror::Error)]
pub enum CleanError {
    #[error("Refusing to clean {path}: {reason}")]
    Unsafe { path: PathBuf, reason: &'static str },

    #[error("Failed to remove {path}: {source}")]
    Remove {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Recursively delete the output directory. A missing directory is fine.
pub fn clean_output(config: &BuildConfig) -> Result<(), CleanError> {
    let output = config.output_dir();

    if output == config.root || config.root.starts_with(&output) {
        return Err(CleanError::Unsafe {
            path: output,
            reason: "it contains the project root",
        });
    }
    if config.source_dir().starts_with(&output) {
        return Err(CleanError::Unsafe {
            path: output,
            reason: "it contains the source tree",
        });
    }

    match fs::remove_dir_all(&output) {
        Ok(()) => {
            tracing::info!("Cleaned {}", output.display());
            Ok(())
        }
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
        Err(source) => Err(CleanError::Remove {
            path: output,
            source,
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::paths::PathTable;
    use tempfile::tempdir;

    fn config(root: &std::path::Path, source: &str, output: &str) -> BuildConfig {
        BuildConfig {
            root: root.to_path_buf(),
            paths: PathTable::new(source, output),
            ..Default::default()
        }
    }

    #[test]
    fn removes_output_tree() {
        let temp = tempdir().unwrap();
        let stale = temp.path().join("dist/styles/old.css");
        fs::create_dir_all(stale.parent().unwrap()).unwrap();
        fs::write(&stale, "a{}").unwrap();

        clean_output(&config(temp.path(), "src", "dist")).unwrap();

        assert!(!temp.path().join("dist").exists());
    }

    #[test]
    fn missing_output_is_not_an_error() {
        let temp = tempdir().unwrap();

        assert!(clean_output(&config(temp.path(), "src", "dist")).is_ok());
    }

    #[test]
    fn refuses_to_remove_source_tree() {
        let temp = tempdir().unwrap();
        fs::create_dir_all(temp.path().join("site/src")).unwrap();

        let err = clean_output(&config(temp.path(), "site/src", "site")).unwrap_err();

        assert!(matches!(err, CleanError::Unsafe { .. }));
        assert!(temp.path().join("site/src").exists());
    }

    #[test]
    fn refuses_to_remove_project_root() {
        let temp = tempdir().unwrap();

        let err = clean_output(&config(temp.path(), "src", ".")).unwrap_err();

        assert!(matches!(err, CleanError::Unsafe { .. }));
    }
}
