//! Asset transform tasks and build orchestration for kiln.
//!
//! Each asset kind (html, css, js, img, fonts) has one transform task that
//! reads its sources from the path table, runs its transformation chain and
//! writes into its output directory.

pub mod builder;
pub mod clean;
pub mod fonts;
pub mod html;
pub mod images;
pub mod paths;
pub mod scripts;
pub mod styles;
pub mod task;

pub use builder::{AssetBuilder, BuildConfig, BuildSummary};
pub use clean::CleanError;
pub use paths::{AssetKind, PathEntry, PathTable};
pub use task::{task_for, AssetTask, OutputFile, TaskError, TaskReport};
