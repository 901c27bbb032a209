//! ES module bundler for kiln script builds.
//!
//! Walks the import graph of an entry module, rewrites each module into a
//! function in a module table, and emits a single self-executing script.

pub mod bundler;
pub mod module;
pub mod resolve;
pub mod traits;

pub use bundler::Bundler;
pub use module::ModuleSource;
pub use resolve::NodeResolver;
pub use traits::{Bundle, BundleError, BundleOptions, Resolver};
