//! Development server, live reload and file watching for kiln.
//!
//! Serves the output directory, pushes reload notifications over a
//! WebSocket and re-runs transform tasks when their sources change.

pub mod dev;
pub mod livereload;
pub mod server;
pub mod watcher;

pub use dev::DevSession;
pub use livereload::{LiveReloadHub, LiveReloadMessage};
pub use server::{router, DevServer, DevServerConfig, ServerError};
pub use watcher::{ChangeKind, FileWatcher, WatchEvent, WatchTable};
