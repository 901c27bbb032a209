//! File watching: source changes mapped to the tasks that rebuild them.

use std::path::{Path, PathBuf};
use std::sync::mpsc;

use globset::GlobMatcher;
use kiln_assets::paths::{compile_glob, to_slash};
use kiln_assets::{AssetKind, PathTable};
use notify::{RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::mpsc as async_mpsc;

use crate::server::ServerError;

/// What happened to a watched path.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeKind {
    Created,
    Modified,
    Removed,
}

/// A change reported by the file watcher.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WatchEvent {
    pub kind: ChangeKind,
    pub path: PathBuf,
}

/// Watch globs compiled once, keyed by asset kind.
#[derive(Debug, Clone)]
pub struct WatchTable {
    root: PathBuf,
    rules: Vec<(AssetKind, GlobMatcher)>,
}

impl WatchTable {
    /// Compile the watch globs of `paths`, relative to the project `root`.
    pub fn new(root: &Path, paths: &PathTable) -> Result<Self, ServerError> {
        let rules = AssetKind::ALL
            .into_iter()
            .map(|kind| {
                let pattern = &paths.entry(kind).watch;
                compile_glob(pattern)
                    .map(|matcher| (kind, matcher))
                    .map_err(|e| ServerError::Pattern {
                        pattern: pattern.clone(),
                        message: e.to_string(),
                    })
            })
            .collect::<Result<_, _>>()?;

        Ok(Self {
            root: root.to_path_buf(),
            rules,
        })
    }

    /// Asset kinds whose watch glob matches `path`, in table order.
    ///
    /// `path` may be absolute or relative to the project root.
    pub fn kinds_for(&self, path: &Path) -> Vec<AssetKind> {
        let relative = if path.is_absolute() {
            match path.strip_prefix(&self.root) {
                Ok(relative) => relative,
                Err(_) => return Vec::new(),
            }
        } else {
            path
        };
        let relative = to_slash(relative);

        self.rules
            .iter()
            .filter(|(_, matcher)| matcher.is_match(&relative))
            .map(|(kind, _)| *kind)
            .collect()
    }
}

/// File watcher for detecting changes.
pub struct FileWatcher {
    _watcher: RecommendedWatcher,
}

impl FileWatcher {
    /// Watch `paths` recursively.
    ///
    /// Returns the watcher and a channel to receive events. Every event is
    /// forwarded; nothing is debounced.
    pub fn new(
        paths: &[PathBuf],
    ) -> Result<(Self, async_mpsc::Receiver<WatchEvent>), ServerError> {
        let (sync_tx, sync_rx) = mpsc::channel();
        let (async_tx, async_rx) = async_mpsc::channel(100);

        let mut watcher = notify::recommended_watcher(move |res: notify::Result<notify::Event>| {
            match res {
                Ok(event) => {
                    let _ = sync_tx.send(event);
                }
                Err(e) => tracing::warn!("Watch error: {}", e),
            }
        })?;

        for path in paths {
            if path.exists() {
                watcher.watch(path, RecursiveMode::Recursive)?;
            } else {
                tracing::warn!("Not watching missing directory {}", path.display());
            }
        }

        std::thread::spawn(move || {
            while let Ok(event) = sync_rx.recv() {
                let Some(kind) = classify_event(&event.kind) else {
                    continue;
                };
                for path in event.paths {
                    if async_tx.blocking_send(WatchEvent { kind, path }).is_err() {
                        return;
                    }
                }
            }
        });

        Ok((Self { _watcher: watcher }, async_rx))
    }
}

/// Classify a notify event; access events are ignored.
fn classify_event(kind: &notify::EventKind) -> Option<ChangeKind> {
    use notify::EventKind;

    match kind {
        EventKind::Create(_) => Some(ChangeKind::Created),
        EventKind::Modify(_) => Some(ChangeKind::Modified),
        EventKind::Remove(_) => Some(ChangeKind::Removed),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use std::time::Duration;
    use tempfile::tempdir;

    fn table() -> WatchTable {
        WatchTable::new(Path::new("/site"), &PathTable::default()).unwrap()
    }

    #[test]
    fn each_source_file_matches_exactly_one_kind() {
        let table = table();

        let cases = [
            ("src/index.html", AssetKind::Html),
            ("src/partials/header.html", AssetKind::Html),
            ("src/styles/index.css", AssetKind::Css),
            ("src/styles/base/reset.css", AssetKind::Css),
            ("src/scripts/lib/util.js", AssetKind::Js),
            ("src/images/icons/logo.png", AssetKind::Img),
            ("src/images/photo.jpg", AssetKind::Img),
            ("src/fonts/Inter.ttf", AssetKind::Fonts),
        ];
        for (path, kind) in cases {
            assert_eq!(table.kinds_for(Path::new(path)), vec![kind], "{path}");
        }
    }

    #[test]
    fn unrelated_files_match_nothing() {
        let table = table();

        for path in [
            "src/notes.txt",
            "src/scripts/data.json",
            "src/main.css",
            "dist/index.html",
        ] {
            assert!(table.kinds_for(Path::new(path)).is_empty(), "{path}");
        }
    }

    #[test]
    fn absolute_paths_are_made_relative_to_root() {
        let table = table();

        assert_eq!(
            table.kinds_for(Path::new("/site/src/styles/index.css")),
            vec![AssetKind::Css]
        );
        assert!(table.kinds_for(Path::new("/elsewhere/src/index.html")).is_empty());
    }

    #[test]
    fn classifies_notify_events() {
        use notify::event::{AccessKind, CreateKind, ModifyKind, RemoveKind};
        use notify::EventKind;

        assert_eq!(
            classify_event(&EventKind::Create(CreateKind::File)),
            Some(ChangeKind::Created)
        );
        assert_eq!(
            classify_event(&EventKind::Modify(ModifyKind::Any)),
            Some(ChangeKind::Modified)
        );
        assert_eq!(
            classify_event(&EventKind::Remove(RemoveKind::File)),
            Some(ChangeKind::Removed)
        );
        assert_eq!(classify_event(&EventKind::Access(AccessKind::Any)), None);
    }

    #[tokio::test]
    async fn watches_file_changes() {
        let temp = tempdir().unwrap();
        let test_file = temp.path().join("index.html");

        // Create the watcher first so it catches file creation
        let (watcher, mut rx) = FileWatcher::new(&[temp.path().to_path_buf()]).unwrap();

        // Give inotify time to set up
        tokio::time::sleep(Duration::from_millis(100)).await;

        fs::write(&test_file, "<p>created</p>").unwrap();

        let event = tokio::time::timeout(Duration::from_secs(3), rx.recv()).await;

        drop(watcher);

        let event = event
            .expect("timeout waiting for file watch event")
            .expect("channel should not be closed");
        assert_eq!(event.path.file_name(), test_file.file_name());
    }
}
