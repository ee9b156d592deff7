//! Variable reference resolution for configuration documents.
//!
//! Supports `${section.field}` syntax for cross-referencing values within config.
//! Use `$${...}` to escape and produce a literal `${...}`.

use std::collections::HashMap;
use std::fmt;

use toml::{Table, Value};

use super::document::{split_key, Document};
use super::ConfigError;

/// Resolves interpolation references in a merged document.
pub trait Resolver: Send + Sync + fmt::Debug {
    fn resolve(&self, document: &Document) -> Result<Document, ConfigError>;
}

/// Resolves `${path.to.field}` references against the document itself.
///
/// A string consisting of exactly one reference takes the referenced value
/// with its type, so `port = "${base.port}"` stays an integer and a table can
/// be aliased. References embedded in surrounding text must point at scalars.
/// Substituted text is never scanned again.
#[derive(Debug, Default, Clone, Copy)]
pub struct ReferenceResolver;

impl Resolver for ReferenceResolver {
    fn resolve(&self, document: &Document) -> Result<Document, ConfigError> {
        let mut resolution = Resolution::new(document.root());
        let table = resolution.resolve_table("", document.root())?;
        Ok(Document::from_table(table))
    }
}

#[derive(Debug, PartialEq)]
enum Token {
    Literal(String),
    Reference(String),
}

struct Resolution<'a> {
    root: &'a Table,
    resolved: HashMap<String, Value>,
    in_progress: Vec<String>,
}

impl<'a> Resolution<'a> {
    fn new(root: &'a Table) -> Self {
        Self {
            root,
            resolved: HashMap::new(),
            in_progress: Vec::new(),
        }
    }

    fn resolve_table(&mut self, prefix: &str, table: &Table) -> Result<Table, ConfigError> {
        let mut out = Table::new();
        for (key, value) in table {
            let path = join(prefix, key);
            out.insert(key.clone(), self.resolve_value(&path, value)?);
        }
        Ok(out)
    }

    fn resolve_value(&mut self, key: &str, value: &Value) -> Result<Value, ConfigError> {
        match value {
            Value::String(s) => self.resolve_string(key, s),
            Value::Table(t) => Ok(Value::Table(self.resolve_table(key, t)?)),
            Value::Array(arr) => {
                let mut out = Vec::with_capacity(arr.len());
                for (idx, item) in arr.iter().enumerate() {
                    out.push(self.resolve_value(&format!("{key}[{idx}]"), item)?);
                }
                Ok(Value::Array(out))
            }
            other => Ok(other.clone()),
        }
    }

    fn resolve_string(&mut self, key: &str, s: &str) -> Result<Value, ConfigError> {
        let tokens = tokenize(key, s)?;

        if let [Token::Reference(path)] = tokens.as_slice() {
            return self.resolve_reference(key, path);
        }

        let mut result = String::with_capacity(s.len());
        for token in tokens {
            match token {
                Token::Literal(text) => result.push_str(&text),
                Token::Reference(path) => {
                    let value = self.resolve_reference(key, &path)?;
                    let text = scalar_to_string(&value).ok_or_else(|| {
                        ConfigError::NonScalarReference {
                            reference: path.clone(),
                            key: key.to_string(),
                        }
                    })?;
                    result.push_str(&text);
                }
            }
        }

        Ok(Value::String(result))
    }

    /// Resolves the value at `path`, which is referenced from `key`.
    fn resolve_reference(&mut self, key: &str, path: &str) -> Result<Value, ConfigError> {
        if let Some(value) = self.resolved.get(path) {
            return Ok(value.clone());
        }
        if self.in_progress.iter().any(|p| p == path) {
            return Err(ConfigError::CircularReference(path.to_string()));
        }

        let Some(raw) = lookup_path(self.root, path) else {
            return self.resolve_through_parent(key, path);
        };

        self.in_progress.push(path.to_string());
        let value = self.resolve_value(path, raw)?;
        self.in_progress.pop();

        self.resolved.insert(path.to_string(), value.clone());
        Ok(value)
    }

    /// Resolves `path` by resolving its parent first, for paths that pass
    /// through an aliased table such as `${server.port}` with
    /// `server = "${defaults}"`.
    fn resolve_through_parent(&mut self, key: &str, path: &str) -> Result<Value, ConfigError> {
        let not_found = || ConfigError::ReferenceNotFound {
            reference: path.to_string(),
            key: key.to_string(),
        };
        let Some((parent, last)) = path.rsplit_once('.') else {
            return Err(not_found());
        };

        let parent = match self.resolve_reference(key, parent) {
            Ok(value) => value,
            Err(ConfigError::ReferenceNotFound { .. }) => return Err(not_found()),
            Err(e) => return Err(e),
        };
        parent
            .as_table()
            .and_then(|table| table.get(last))
            .cloned()
            .ok_or_else(not_found)
    }
}

fn join(prefix: &str, key: &str) -> String {
    if prefix.is_empty() {
        key.to_string()
    } else {
        format!("{prefix}.{key}")
    }
}

/// Splits a string into literal text and `${...}` references.
/// Handles `$$` escape sequences.
fn tokenize(key: &str, s: &str) -> Result<Vec<Token>, ConfigError> {
    let mut tokens = Vec::new();
    let mut literal = String::new();
    let mut chars = s.chars().peekable();

    while let Some(ch) = chars.next() {
        if ch != '$' {
            literal.push(ch);
            continue;
        }

        match chars.peek() {
            Some('$') => {
                // Escape sequence: $$ -> $
                chars.next();
                literal.push('$');
            }
            Some('{') => {
                chars.next();
                let path = consume_until(&mut chars, '}')
                    .ok_or_else(|| ConfigError::UnclosedReference(key.to_string()))?;
                if split_key(&path).is_none() {
                    return Err(ConfigError::InvalidReferencePath(path));
                }

                if !literal.is_empty() {
                    tokens.push(Token::Literal(std::mem::take(&mut literal)));
                }
                tokens.push(Token::Reference(path));
            }
            _ => literal.push('$'),
        }
    }

    if !literal.is_empty() {
        tokens.push(Token::Literal(literal));
    }
    Ok(tokens)
}

/// Consumes characters until the delimiter, returning the collected string.
fn consume_until(chars: &mut std::iter::Peekable<std::str::Chars>, delim: char) -> Option<String> {
    let mut result = String::new();
    for ch in chars.by_ref() {
        if ch == delim {
            return Some(result);
        }
        result.push(ch);
    }
    None
}

fn lookup_path<'t>(root: &'t Table, path: &str) -> Option<&'t Value> {
    let parts = split_key(path)?;
    let (first, rest) = parts.split_first()?;
    let mut current = root.get(first)?;
    for part in rest {
        current = current.as_table()?.get(part)?;
    }
    Some(current)
}

fn scalar_to_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Integer(i) => Some(i.to_string()),
        Value::Float(f) => Some(f.to_string()),
        Value::Boolean(b) => Some(b.to_string()),
        Value::Datetime(dt) => Some(dt.to_string()),
        Value::Array(_) | Value::Table(_) => None,
    }
}
