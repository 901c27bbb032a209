//! `@@include` resolution for HTML partials.
//!
//! `@@include('partial.html')` is replaced by the partial's processed content.
//! An optional JSON object, `@@include('card.html', {"title": "Hi"})`, defines
//! variables that `@@title` references in the partial expand to. Paths are
//! relative to the including file.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use regex::{Captures, Regex};
use serde_json::{Map, Value};

use crate::task::TaskError;

const INCLUDE: &str = "@@include(";

static VARIABLE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"@@([A-Za-z_][A-Za-z0-9_]*(?:\.[A-Za-z_][A-Za-z0-9_]*)*)")
        .expect("Invalid variable regex")
});

/// Read `path` and expand every include in it, recursively.
pub fn resolve_includes(path: &Path) -> Result<String, TaskError> {
    Includer::default().process(path, &Map::new())
}

#[derive(Default)]
struct Includer {
    stack: Vec<PathBuf>,
}

struct IncludeCall {
    path: String,
    vars: Map<String, Value>,
}

impl Includer {
    fn process(&mut self, path: &Path, vars: &Map<String, Value>) -> Result<String, TaskError> {
        let canonical = fs::canonicalize(path).map_err(|source| TaskError::Read {
            path: path.to_path_buf(),
            source,
        })?;

        if self.stack.contains(&canonical) {
            let chain: Vec<String> = self
                .stack
                .iter()
                .chain(std::iter::once(&canonical))
                .map(|p| p.display().to_string())
                .collect();
            return Err(TaskError::Include {
                path: path.to_path_buf(),
                message: format!("include cycle: {}", chain.join(" -> ")),
            });
        }

        let content = fs::read_to_string(&canonical).map_err(|source| TaskError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let dir = canonical.parent().unwrap_or(Path::new(".")).to_path_buf();

        self.stack.push(canonical);
        let expanded = self.expand(path, &dir, &content, vars);
        self.stack.pop();

        Ok(substitute(&expanded?, vars))
    }

    fn expand(
        &mut self,
        path: &Path,
        dir: &Path,
        content: &str,
        vars: &Map<String, Value>,
    ) -> Result<String, TaskError> {
        let mut out = String::with_capacity(content.len());
        let mut rest = content;

        while let Some(idx) = rest.find(INCLUDE) {
            out.push_str(&rest[..idx]);
            let after = &rest[idx + INCLUDE.len()..];

            let (call, consumed) = parse_call(after).map_err(|message| TaskError::Include {
                path: path.to_path_buf(),
                message,
            })?;

            let mut child_vars = vars.clone();
            child_vars.extend(call.vars);

            let target = dir.join(&call.path);
            if !target.is_file() {
                return Err(TaskError::Include {
                    path: path.to_path_buf(),
                    message: format!("included file not found: {}", call.path),
                });
            }

            out.push_str(&self.process(&target, &child_vars)?);
            rest = &after[consumed..];
        }

        out.push_str(rest);
        Ok(out)
    }
}

/// Parse `'path'[, {json}])` following `@@include(`.
///
/// Returns the call and the number of bytes consumed, including the `)`.
fn parse_call(input: &str) -> Result<(IncludeCall, usize), String> {
    let mut i = skip_whitespace(input, 0);

    let quote = input[i..]
        .chars()
        .next()
        .filter(|c| *c == '\'' || *c == '"')
        .ok_or_else(|| "expected a quoted path after @@include(".to_string())?;
    i += 1;
    let close = input[i..]
        .find(quote)
        .ok_or_else(|| "unterminated include path".to_string())?;
    let path = input[i..i + close].to_string();
    i = skip_whitespace(input, i + close + 1);

    let mut vars = Map::new();
    if input[i..].starts_with(',') {
        i = skip_whitespace(input, i + 1);
        let mut stream = serde_json::Deserializer::from_str(&input[i..]).into_iter::<Value>();
        match stream.next() {
            Some(Ok(Value::Object(map))) => vars = map,
            Some(Ok(_)) => return Err("include variables must be a JSON object".to_string()),
            Some(Err(e)) => return Err(format!("invalid include variables: {e}")),
            None => return Err("missing include variables after ','".to_string()),
        }
        i = skip_whitespace(input, i + stream.byte_offset());
    }

    if !input[i..].starts_with(')') {
        return Err(format!("expected ')' to close @@include('{path}'"));
    }

    Ok((IncludeCall { path, vars }, i + 1))
}

fn skip_whitespace(input: &str, from: usize) -> usize {
    from + input[from..]
        .find(|c: char| !c.is_whitespace())
        .unwrap_or(input.len() - from)
}

/// Replace `@@name` and `@@a.b` references that resolve in `vars`.
fn substitute(content: &str, vars: &Map<String, Value>) -> String {
    if vars.is_empty() {
        return content.to_string();
    }

    VARIABLE
        .replace_all(content, |caps: &Captures| {
            let mut parts = caps[1].split('.');
            let first = parts.next().and_then(|key| vars.get(key));
            let value = parts.fold(first, |value, key| value.and_then(|v| v.get(key)));
            match value {
                Some(Value::String(s)) => s.clone(),
                Some(other) => other.to_string(),
                None => caps[0].to_string(),
            }
        })
        .into_owned()
}
