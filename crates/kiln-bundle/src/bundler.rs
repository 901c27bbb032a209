//! Module graph traversal and bundle emission.

use std::collections::{HashMap, VecDeque};
use std::fs;
use std::path::{Path, PathBuf};

use oxc_allocator::Allocator;
use oxc_codegen::{Codegen, CodegenOptions};
use oxc_minifier::{CompressOptions, MangleOptions, Minifier, MinifierOptions};
use oxc_parser::Parser;
use oxc_span::SourceType;

use crate::module::{ModuleSource, REQUIRE};
use crate::resolve::NodeResolver;
use crate::traits::{Bundle, BundleError, BundleOptions, Resolver};

/// Bundles an entry module and its imports into one script.
pub struct Bundler<R: Resolver = NodeResolver> {
    resolver: R,
    options: BundleOptions,
}

impl Bundler<NodeResolver> {
    /// Create a bundler with Node-style resolution.
    pub fn new(options: BundleOptions) -> Self {
        Self::with_resolver(NodeResolver::new(), options)
    }
}

impl<R: Resolver> Bundler<R> {
    /// Create a bundler with a custom resolver.
    pub fn with_resolver(resolver: R, options: BundleOptions) -> Self {
        Self { resolver, options }
    }

    /// Bundle the module graph rooted at `entry`.
    pub fn bundle(&self, entry: &Path) -> Result<Bundle, BundleError> {
        let entry = fs::canonicalize(entry).map_err(|source| BundleError::Read {
            path: entry.to_path_buf(),
            source,
        })?;

        let mut ids: HashMap<PathBuf, usize> = HashMap::new();
        let mut paths: Vec<PathBuf> = vec![entry.clone()];
        let mut modules: Vec<Option<(ModuleSource, Vec<usize>)>> = vec![None];
        let mut queue = VecDeque::from([0usize]);
        ids.insert(entry.clone(), 0);

        while let Some(id) = queue.pop_front() {
            let path = paths[id].clone();
            let source = fs::read_to_string(&path).map_err(|source| BundleError::Read {
                path: path.clone(),
                source,
            })?;
            let module = ModuleSource::parse(&path, source)?;

            let mut dep_ids = Vec::with_capacity(module.dependencies().len());
            for specifier in module.dependencies() {
                let resolved = self.resolver.resolve(specifier, &path)?;
                let dep_id = match ids.get(&resolved) {
                    Some(&existing) => existing,
                    None => {
                        let next = paths.len();
                        ids.insert(resolved.clone(), next);
                        paths.push(resolved);
                        modules.push(None);
                        queue.push_back(next);
                        next
                    }
                };
                dep_ids.push(dep_id);
            }

            tracing::debug!("Module {} -> {}", id, path.display());
            modules[id] = Some((module, dep_ids));
        }

        let root = entry.parent().unwrap_or(Path::new("/"));
        let mut table = String::new();
        for (id, slot) in modules.iter().enumerate() {
            if let Some((module, dep_ids)) = slot {
                table.push_str(&format!(
                    "/* {}: {} */\nfunction (module, exports, {REQUIRE}) {{\n{}\n}},\n",
                    id,
                    module_label(&paths[id], root),
                    module.render(dep_ids)
                ));
            }
        }

        let code = format!("{RUNTIME_PRELUDE}{table}{RUNTIME_EPILOGUE}");
        let code = if self.options.minify {
            minify(&entry, &code)?
        } else {
            code
        };

        Ok(Bundle {
            code,
            modules: paths,
        })
    }
}

/// Display label for a module: its path relative to the entry directory.
fn module_label(path: &Path, root: &Path) -> String {
    match path.strip_prefix(root) {
        Ok(relative) => relative.display().to_string(),
        Err(_) => path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default(),
    }
    .replace("*/", "")
}

/// Compress and mangle the bundle, then print it without whitespace or comments.
fn minify(entry: &Path, code: &str) -> Result<String, BundleError> {
    let allocator = Allocator::default();
    let ret = Parser::new(&allocator, code, SourceType::mjs()).parse();

    if ret.panicked || !ret.errors.is_empty() {
        let message = ret
            .errors
            .first()
            .map(|e| e.to_string())
            .unwrap_or_else(|| "unrecoverable syntax error".to_string());
        return Err(BundleError::Parse {
            path: entry.to_path_buf(),
            message,
        });
    }

    let mut program = ret.program;
    let options = MinifierOptions {
        mangle: Some(MangleOptions::default()),
        compress: Some(CompressOptions::default()),
    };
    let ret = Minifier::new(options).build(&allocator, &mut program);

    Ok(Codegen::new()
        .with_options(CodegenOptions::minify())
        .with_scoping(ret.scoping)
        .build(&program)
        .code)
}

const RUNTIME_PRELUDE: &str = r#"(function (modules) {
  "use strict";
  var cache = {};
  function __kiln_require__(id) {
    var cached = cache[id];
    if (cached !== undefined) return cached.exports;
    var module = (cache[id] = { exports: {} });
    modules[id](module, module.exports, __kiln_require__);
    return module.exports;
  }
  __kiln_require__.r = function (exports) {
    if (typeof Symbol !== "undefined" && Symbol.toStringTag) {
      Object.defineProperty(exports, Symbol.toStringTag, { value: "Module" });
    }
    Object.defineProperty(exports, "__esModule", { value: true });
  };
  __kiln_require__.d = function (exports, getters) {
    for (var key in getters) {
      if (!Object.prototype.hasOwnProperty.call(exports, key)) {
        Object.defineProperty(exports, key, { enumerable: true, get: getters[key] });
      }
    }
  };
  __kiln_require__.e = function (exports, source) {
    Object.keys(source).forEach(function (key) {
      if (key !== "default" && !Object.prototype.hasOwnProperty.call(exports, key)) {
        Object.defineProperty(exports, key, {
          enumerable: true,
          get: function () { return source[key]; },
        });
      }
    });
  };
  __kiln_require__(0);
})([
"#;

const RUNTIME_EPILOGUE: &str = "]);\n";
