//! One module per command-line target.

pub mod build;
pub mod clean;
pub mod dev;
pub mod serve;
pub mod task;
pub mod watch;
