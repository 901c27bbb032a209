//! Rewriting ES modules into module-table functions.
//!
//! Import and export statements are located with the oxc parser and spliced
//! out of the source text. Every reference to an imported binding is
//! rewritten into a property read on the required module, so imports stay
//! live; exports become lazy getters on `exports`.

use std::collections::HashMap;
use std::path::Path;

use oxc_allocator::Allocator;
use oxc_ast::ast::{
    BindingIdentifier, BindingPattern, BindingPatternKind, Declaration,
    ExportDefaultDeclarationKind, ImportDeclarationSpecifier, ModuleExportName, Statement,
};
use oxc_ast::AstKind;
use oxc_parser::Parser;
use oxc_semantic::{Semantic, SemanticBuilder};
use oxc_span::{GetSpan, SourceType};

use crate::traits::BundleError;

/// Name of the runtime require function inside module functions.
pub const REQUIRE: &str = "__kiln_require__";

const DEFAULT_LOCAL: &str = "__kiln_default__";

#[derive(Debug, Clone, PartialEq, Eq)]
enum ExportBinding {
    /// Export of a binding declared in this module.
    Local { exported: String, local: String },
    /// `export { imported as exported } from "..."`; `None` re-exports the namespace.
    Forward {
        exported: String,
        slot: usize,
        imported: Option<String>,
    },
    /// `export * from "..."`
    Star { slot: usize },
}

/// Replace `start..end` of the source with `text`.
#[derive(Debug, Clone)]
struct Edit {
    start: usize,
    end: usize,
    text: String,
}

/// A parsed module ready to be linked into a bundle.
#[derive(Debug, Clone)]
pub struct ModuleSource {
    source: String,
    dependencies: Vec<String>,
    /// Imported local name to the expression that reads it.
    imports: HashMap<String, String>,
    exports: Vec<ExportBinding>,
    edits: Vec<Edit>,
}

impl ModuleSource {
    /// Parse a module and record how its import/export statements must change.
    pub fn parse(path: &Path, source: String) -> Result<Self, BundleError> {
        let allocator = Allocator::default();
        let ret = Parser::new(&allocator, &source, SourceType::mjs()).parse();

        if ret.panicked || !ret.errors.is_empty() {
            let message = ret
                .errors
                .first()
                .map(|e| e.to_string())
                .unwrap_or_else(|| "unrecoverable syntax error".to_string());
            return Err(BundleError::Parse {
                path: path.to_path_buf(),
                message,
            });
        }

        let semantic = SemanticBuilder::new().build(&ret.program).semantic;
        let mut analysis = Analysis::default();

        for stmt in &ret.program.body {
            match stmt {
                Statement::ImportDeclaration(decl) => {
                    let slot = analysis.slot(decl.source.value.as_str());
                    if let Some(specifiers) = &decl.specifiers {
                        for spec in specifiers {
                            let (local, access) = match spec {
                                ImportDeclarationSpecifier::ImportSpecifier(s) => {
                                    (&s.local, member(slot, &export_name(&s.imported)))
                                }
                                ImportDeclarationSpecifier::ImportDefaultSpecifier(s) => {
                                    (&s.local, member(slot, "default"))
                                }
                                ImportDeclarationSpecifier::ImportNamespaceSpecifier(s) => {
                                    (&s.local, module_var(slot))
                                }
                            };
                            analysis.bind_import(&semantic, local, access);
                        }
                    }
                    analysis.remove(decl.span.start, decl.span.end);
                }

                Statement::ExportNamedDeclaration(decl) => {
                    if let Some(declaration) = &decl.declaration {
                        for name in declared_names(declaration) {
                            analysis.exports.push(ExportBinding::Local {
                                exported: name.clone(),
                                local: name,
                            });
                        }
                        // Keep the declaration, drop the `export` keyword.
                        analysis.remove(decl.span.start, declaration.span().start);
                        continue;
                    }

                    match &decl.source {
                        Some(source) => {
                            let slot = analysis.slot(source.value.as_str());
                            for spec in &decl.specifiers {
                                analysis.exports.push(ExportBinding::Forward {
                                    exported: export_name(&spec.exported),
                                    slot,
                                    imported: Some(export_name(&spec.local)),
                                });
                            }
                        }
                        None => {
                            for spec in &decl.specifiers {
                                analysis.exports.push(ExportBinding::Local {
                                    exported: export_name(&spec.exported),
                                    local: export_name(&spec.local),
                                });
                            }
                        }
                    }
                    analysis.remove(decl.span.start, decl.span.end);
                }

                Statement::ExportDefaultDeclaration(decl) => {
                    let inner_start = decl.declaration.span().start;
                    let named = match &decl.declaration {
                        ExportDefaultDeclarationKind::FunctionDeclaration(f) => {
                            f.id.as_ref().map(|id| id.name.to_string())
                        }
                        ExportDefaultDeclarationKind::ClassDeclaration(c) => {
                            c.id.as_ref().map(|id| id.name.to_string())
                        }
                        _ => None,
                    };

                    let local = match named {
                        Some(name) => {
                            analysis.remove(decl.span.start, inner_start);
                            name
                        }
                        None => {
                            analysis.replace(
                                decl.span.start,
                                inner_start,
                                format!("const {DEFAULT_LOCAL} = "),
                            );
                            DEFAULT_LOCAL.to_string()
                        }
                    };

                    analysis.exports.push(ExportBinding::Local {
                        exported: "default".to_string(),
                        local,
                    });
                }

                Statement::ExportAllDeclaration(decl) => {
                    let slot = analysis.slot(decl.source.value.as_str());
                    let binding = match &decl.exported {
                        Some(exported) => ExportBinding::Forward {
                            exported: export_name(exported),
                            slot,
                            imported: None,
                        },
                        None => ExportBinding::Star { slot },
                    };
                    analysis.exports.push(binding);
                    analysis.remove(decl.span.start, decl.span.end);
                }

                _ => {}
            }
        }

        analysis.merge_references();

        Ok(Self {
            source,
            dependencies: analysis.dependencies,
            imports: analysis.imports,
            exports: analysis.exports,
            edits: analysis.edits,
        })
    }

    /// Import specifiers in first-seen order, without duplicates.
    pub fn dependencies(&self) -> &[String] {
        &self.dependencies
    }

    /// Render the body of this module's table function.
    ///
    /// `ids[slot]` is the module table index of `dependencies()[slot]`.
    pub fn render(&self, ids: &[usize]) -> String {
        let mut out = String::with_capacity(self.source.len() + 256);
        out.push_str("\"use strict\";\n");
        out.push_str(&format!("{REQUIRE}.r(exports);\n"));

        let getters: Vec<String> = self
            .exports
            .iter()
            .filter_map(|export| match export {
                ExportBinding::Local { exported, local } => {
                    let target = self.imports.get(local).unwrap_or(local);
                    Some(format!("{}: () => {}", quote(exported), target))
                }
                ExportBinding::Forward {
                    exported,
                    slot,
                    imported,
                } => {
                    let target = match imported {
                        Some(name) => member(*slot, name),
                        None => module_var(*slot),
                    };
                    Some(format!("{}: () => {}", quote(exported), target))
                }
                ExportBinding::Star { .. } => None,
            })
            .collect();

        if !getters.is_empty() {
            out.push_str(&format!("{REQUIRE}.d(exports, {{ {} }});\n", getters.join(", ")));
        }

        for (slot, id) in ids.iter().enumerate() {
            out.push_str(&format!("const {} = {REQUIRE}({id});\n", module_var(slot)));
        }

        for export in &self.exports {
            if let ExportBinding::Star { slot } = export {
                out.push_str(&format!("{REQUIRE}.e(exports, {});\n", module_var(*slot)));
            }
        }

        out.push_str(&self.apply_edits());
        out
    }

    fn apply_edits(&self) -> String {
        let mut edits: Vec<&Edit> = self.edits.iter().collect();
        edits.sort_by_key(|e| e.start);

        let mut out = String::with_capacity(self.source.len());
        let mut cursor = 0;
        for edit in edits {
            out.push_str(&self.source[cursor..edit.start]);
            out.push_str(&edit.text);
            cursor = edit.end;
        }
        out.push_str(&self.source[cursor..]);
        out
    }
}

#[derive(Default)]
struct Analysis {
    dependencies: Vec<String>,
    imports: HashMap<String, String>,
    exports: Vec<ExportBinding>,
    edits: Vec<Edit>,
    references: Vec<Edit>,
}

impl Analysis {
    fn slot(&mut self, specifier: &str) -> usize {
        if let Some(pos) = self.dependencies.iter().position(|d| d == specifier) {
            return pos;
        }
        self.dependencies.push(specifier.to_string());
        self.dependencies.len() - 1
    }

    /// Record an import binding and rewrite every reference to it into `access`.
    fn bind_import(&mut self, semantic: &Semantic<'_>, local: &BindingIdentifier, access: String) {
        let nodes = semantic.nodes();
        for reference in semantic.scoping().get_resolved_references(local.symbol_id()) {
            let node_id = reference.node_id();
            let span = nodes.kind(node_id).span();
            let text = match nodes.parent_kind(node_id) {
                Some(AstKind::ObjectProperty(prop)) if prop.shorthand => {
                    format!("{}: {}", local.name, access)
                }
                // A bare call must not receive the module object as `this`.
                Some(AstKind::CallExpression(call)) if call.callee.span() == span => {
                    format!("(0, {access})")
                }
                Some(AstKind::TaggedTemplateExpression(tagged)) if tagged.tag.span() == span => {
                    format!("(0, {access})")
                }
                _ => access.clone(),
            };
            self.references.push(Edit {
                start: span.start as usize,
                end: span.end as usize,
                text,
            });
        }
        self.imports.insert(local.name.to_string(), access);
    }

    /// Add reference rewrites that fall outside removed statements.
    fn merge_references(&mut self) {
        let references = std::mem::take(&mut self.references);
        for edit in references {
            let removed = self
                .edits
                .iter()
                .any(|e| e.start <= edit.start && edit.end <= e.end);
            if !removed {
                self.edits.push(edit);
            }
        }
    }

    fn remove(&mut self, start: u32, end: u32) {
        self.replace(start, end, String::new());
    }

    fn replace(&mut self, start: u32, end: u32, text: String) {
        self.edits.push(Edit {
            start: start as usize,
            end: end as usize,
            text,
        });
    }
}

fn module_var(slot: usize) -> String {
    format!("__kiln_m{slot}")
}

/// Property read of `name` on the module bound to `slot`.
fn member(slot: usize, name: &str) -> String {
    if is_identifier(name) {
        format!("{}.{}", module_var(slot), name)
    } else {
        format!("{}[{}]", module_var(slot), quote(name))
    }
}

fn is_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    chars
        .next()
        .is_some_and(|c| c.is_ascii_alphabetic() || c == '_' || c == '$')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '$')
}

fn quote(name: &str) -> String {
    serde_json::Value::String(name.to_string()).to_string()
}

fn export_name(name: &ModuleExportName) -> String {
    match name {
        ModuleExportName::IdentifierName(id) => id.name.to_string(),
        ModuleExportName::IdentifierReference(id) => id.name.to_string(),
        ModuleExportName::StringLiteral(lit) => lit.value.to_string(),
    }
}

fn declared_names(declaration: &Declaration) -> Vec<String> {
    let mut names = Vec::new();
    match declaration {
        Declaration::VariableDeclaration(var) => {
            for declarator in &var.declarations {
                collect_pattern_names(&declarator.id, &mut names);
            }
        }
        Declaration::FunctionDeclaration(f) => {
            if let Some(id) = &f.id {
                names.push(id.name.to_string());
            }
        }
        Declaration::ClassDeclaration(c) => {
            if let Some(id) = &c.id {
                names.push(id.name.to_string());
            }
        }
        _ => {}
    }
    names
}

fn collect_pattern_names(pattern: &BindingPattern, names: &mut Vec<String>) {
    match &pattern.kind {
        BindingPatternKind::BindingIdentifier(id) => names.push(id.name.to_string()),
        BindingPatternKind::ObjectPattern(obj) => {
            for prop in &obj.properties {
                collect_pattern_names(&prop.value, names);
            }
            if let Some(rest) = &obj.rest {
                collect_pattern_names(&rest.argument, names);
            }
        }
        BindingPatternKind::ArrayPattern(arr) => {
            for element in arr.elements.iter().flatten() {
                collect_pattern_names(element, names);
            }
            if let Some(rest) = &arr.rest {
                collect_pattern_names(&rest.argument, names);
            }
        }
        BindingPatternKind::AssignmentPattern(assign) => {
            collect_pattern_names(&assign.left, names);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn parse(source: &str) -> ModuleSource {
        ModuleSource::parse(Path::new("test.js"), source.to_string()).unwrap()
    }

    #[test]
    fn collects_dependencies_once_in_order() {
        let module = parse(
            "import a from './a.js';\nimport { b } from './b.js';\nimport { c } from './a.js';\n",
        );

        assert_eq!(module.dependencies(), ["./a.js", "./b.js"]);
    }

    #[test]
    fn rewrites_named_and_default_imports() {
        let module = parse("import x, { y as z } from './dep.js';\nconsole.log(x, z);\n");
        let body = module.render(&[4]);

        assert!(body.contains("const __kiln_m0 = __kiln_require__(4);"));
        assert!(!body.contains("import"));
        assert!(!body.contains("const x"));
        assert!(body.contains("console.log(__kiln_m0.default, __kiln_m0.y);"));
    }

    #[test]
    fn imported_references_stay_live() {
        let module = parse(
            "import { count, inc } from './counter.js';
inc();
console.log(count);
",
        );
        let body = module.render(&[1]);

        assert!(body.contains("(0, __kiln_m0.inc)();"));
        assert!(body.contains("console.log(__kiln_m0.count);"));
    }

    #[test]
    fn rewrites_shorthand_properties_and_namespaces() {
        let module = parse(
            "import * as util from './util.js';
import { name } from './name.js';
export const info = { name, size: util.size };
",
        );
        let body = module.render(&[1, 2]);

        assert!(body.contains("{ name: __kiln_m1.name, size: __kiln_m0.size }"));
    }

    #[test]
    fn shadowed_names_are_left_alone() {
        let module = parse(
            "import { value } from './value.js';
function show(value) { return value; }
show(value);
",
        );
        let body = module.render(&[1]);

        assert!(body.contains("function show(value) { return value; }"));
        assert!(body.contains("show(__kiln_m0.value);"));
    }

    #[test]
    fn reexported_imports_read_through_the_module() {
        let module = parse("import { a } from './a.js';
export { a };
");
        let body = module.render(&[1]);

        assert!(body.contains(r#""a": () => __kiln_m0.a"#));
        assert!(!body.contains("export"));
    }

    #[test]
    fn keeps_side_effect_imports() {
        let module = parse("import './polyfill.js';\n");
        let body = module.render(&[1]);

        assert!(body.contains("const __kiln_m0 = __kiln_require__(1);"));
    }

    #[test]
    fn exports_declarations_through_getters() {
        let module = parse("export const answer = 42;\nexport function add(a, b) { return a + b; }\n");
        let body = module.render(&[]);

        assert!(body.contains(r#"__kiln_require__.d(exports, { "answer": () => answer, "add": () => add });"#));
        assert!(body.contains("const answer = 42;"));
        assert!(body.contains("function add(a, b)"));
        assert!(!body.contains("export "));
    }

    #[test]
    fn exports_destructured_bindings() {
        let module = parse("const obj = { a: 1, b: [2] };\nexport const { a, b: [c] } = obj;\n");
        let body = module.render(&[]);

        assert!(body.contains(r#""a": () => a"#));
        assert!(body.contains(r#""c": () => c"#));
    }

    #[test]
    fn rewrites_anonymous_default_export() {
        let module = parse("export default 1 + 2;\n");
        let body = module.render(&[]);

        assert!(body.contains("const __kiln_default__ = 1 + 2;"));
        assert!(body.contains(r#""default": () => __kiln_default__"#));
    }

    #[test]
    fn keeps_named_default_function() {
        let module = parse("export default function greet() { return 'hi'; }\n");
        let body = module.render(&[]);

        assert!(body.contains("function greet()"));
        assert!(body.contains(r#""default": () => greet"#));
    }

    #[test]
    fn forwards_reexports() {
        let module = parse(
            "export { a as b } from './x.js';\nexport * from './y.js';\nexport * as ns from './z.js';\n",
        );
        let body = module.render(&[1, 2, 3]);

        assert_eq!(module.dependencies(), ["./x.js", "./y.js", "./z.js"]);
        assert!(body.contains(r#""b": () => __kiln_m0.a"#));
        assert!(body.contains(r#""ns": () => __kiln_m2"#));
        assert!(body.contains("__kiln_require__.e(exports, __kiln_m1);"));
    }

    #[test]
    fn exports_specifier_lists() {
        let module = parse("const a = 1;\nconst b = 2;\nexport { a, b as default };\n");
        let body = module.render(&[]);

        assert!(body.contains(r#""a": () => a"#));
        assert!(body.contains(r#""default": () => b"#));
    }

    #[test]
    fn reports_syntax_errors() {
        let result = ModuleSource::parse(Path::new("bad.js"), "let = ;".to_string());

        assert!(matches!(result, Err(BundleError::Parse { .. })));
    }
}
