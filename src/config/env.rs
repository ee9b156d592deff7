use std::collections::BTreeMap;

use toml::{Table, Value};

use super::document::{merge_at_path, split_key, Document};

/// How environment variable names map onto configuration keys.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum EnvMapping {
    /// Every variable is used, its name split on `.` into a key path:
    /// `logging.level=TRACE` sets `logging.level`.
    #[default]
    Dotted,
    /// Only variables starting with `prefix` + `separator` are used. The rest
    /// of the name is split on `separator` and lower-cased:
    /// `MYAPP__DATABASE__HOST` with prefix `MYAPP` and separator `__` sets
    /// `database.host`.
    Prefixed { prefix: String, separator: String },
}

impl EnvMapping {
    /// Maps variables named `<prefix><separator>...` onto config keys.
    ///
    /// # Panics
    ///
    /// Panics if `separator` is empty.
    pub fn prefixed(prefix: impl Into<String>, separator: impl Into<String>) -> Self {
        let separator = separator.into();
        assert!(!separator.is_empty(), "separator must not be empty");
        Self::Prefixed {
            prefix: prefix.into(),
            separator,
        }
    }

    fn key_path(&self, name: &str) -> Option<Vec<String>> {
        match self {
            EnvMapping::Dotted => split_key(name),
            EnvMapping::Prefixed { prefix, separator } => {
                let path_str = name
                    .strip_prefix(prefix.as_str())?
                    .strip_prefix(separator.as_str())?;
                if path_str.is_empty() {
                    return None;
                }

                let path: Vec<String> = path_str
                    .split(separator.as_str())
                    .map(|s| s.to_lowercase())
                    .collect();
                if path.iter().any(|s| s.is_empty()) {
                    return None;
                }
                Some(path)
            }
        }
    }
}

/// Builds a document from environment variables.
pub(crate) fn env_document(vars: &BTreeMap<String, String>, mapping: &EnvMapping) -> Document {
    vars_document(vars, mapping)
}

/// Builds a document from process properties. Property names are always dotted keys.
pub(crate) fn properties_document(properties: &BTreeMap<String, String>) -> Document {
    vars_document(properties, &EnvMapping::Dotted)
}

// BTreeMap iteration is sorted, so `a` applies before `a.b` and the table wins.
fn vars_document(vars: &BTreeMap<String, String>, mapping: &EnvMapping) -> Document {
    let mut table = Table::new();

    for (name, value) in vars {
        if let Some(path) = mapping.key_path(name) {
            merge_at_path(&mut table, &path, literal(value));
        }
    }

    Document::from_table(table)
}

/// Keeps a process value as text, escaping `$` so it is never read as a
/// reference. Typing happens at decode time.
fn literal(value: &str) -> Value {
    Value::String(value.replace('$', "$$"))
}
