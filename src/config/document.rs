//! Immutable hierarchical configuration documents.
//!
//! A [`Document`] wraps a TOML table. Every operation returns a new document;
//! nothing mutates a document after it has been created.

use std::path::Path;

use toml::{Table, Value};

use super::error::ParseFailure;
use super::ConfigError;

/// Text formats a document can be parsed from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Syntax {
    Toml,
    Json,
    Properties,
}

impl Syntax {
    /// All syntaxes in lookup priority order. Earlier syntaxes win when a
    /// resource exists in more than one form.
    pub const ALL: [Syntax; 3] = [Syntax::Toml, Syntax::Json, Syntax::Properties];

    pub fn extension(self) -> &'static str {
        match self {
            Syntax::Toml => "toml",
            Syntax::Json => "json",
            Syntax::Properties => "properties",
        }
    }

    /// Picks the syntax matching a path's extension, if it is a known one.
    pub fn from_path(path: impl AsRef<Path>) -> Option<Syntax> {
        let ext = path.as_ref().extension()?.to_str()?;
        Syntax::ALL
            .into_iter()
            .find(|syntax| syntax.extension().eq_ignore_ascii_case(ext))
    }
}

/// An immutable configuration tree.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Document {
    root: Table,
}

impl Document {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn from_table(root: Table) -> Self {
        Self { root }
    }

    /// Parses `text` in the given syntax. `origin` names the source in errors.
    pub fn parse(text: &str, syntax: Syntax, origin: &str) -> Result<Self, ConfigError> {
        let parsed = match syntax {
            Syntax::Toml => toml::from_str::<Table>(text).map_err(ParseFailure::from),
            Syntax::Json => parse_json(text),
            Syntax::Properties => parse_properties(text),
        };

        parsed
            .map(Self::from_table)
            .map_err(|source| ConfigError::ParseError {
                origin: origin.to_string(),
                source,
            })
    }

    pub fn root(&self) -> &Table {
        &self.root
    }

    pub fn into_table(self) -> Table {
        self.root
    }

    pub fn is_empty(&self) -> bool {
        self.root.is_empty()
    }

    /// Returns a new document in which this document's values win and
    /// `fallback` fills the gaps. Tables merge recursively; arrays and
    /// scalars are replaced whole.
    pub fn with_fallback(&self, fallback: &Document) -> Document {
        let mut root = fallback.root.clone();
        deep_merge(&mut root, self.root.clone());
        Document { root }
    }

    /// Looks up a dotted path.
    pub fn get(&self, path: &str) -> Option<&Value> {
        let parts = split_key(path)?;
        let (first, rest) = parts.split_first()?;
        let mut current = self.root.get(first)?;
        for part in rest {
            current = current.as_table()?.get(part)?;
        }
        Some(current)
    }

    /// Returns the sub-tree at a dotted path.
    pub fn at_path(&self, path: &str) -> Result<Document, ConfigError> {
        match self.get(path) {
            Some(Value::Table(table)) => Ok(Document::from_table(table.clone())),
            Some(_) => Err(ConfigError::SubPathNotTable(path.to_string())),
            None => Err(ConfigError::SubPathNotFound(path.to_string())),
        }
    }

    /// Keeps only the keys that `shape` has, descending into tables both
    /// documents share.
    pub(crate) fn restrict_to(&self, shape: &Document) -> Document {
        Document {
            root: restrict_table(&self.root, &shape.root),
        }
    }

    /// Renders the document as TOML text, for diagnostics.
    pub fn render(&self) -> Result<String, ConfigError> {
        Ok(toml::to_string(&self.root)?)
    }
}

impl From<Table> for Document {
    fn from(root: Table) -> Self {
        Self::from_table(root)
    }
}

/// Splits a dotted key into segments. Keys with empty segments are rejected.
pub(crate) fn split_key(key: &str) -> Option<Vec<String>> {
    let parts: Vec<String> = key.split('.').map(str::to_string).collect();
    if parts.iter().any(|p| p.is_empty()) {
        return None;
    }
    Some(parts)
}

pub(crate) fn merge_at_path(table: &mut Table, path: &[String], value: Value) {
    let Some((first, rest)) = path.split_first() else {
        if let Value::Table(overlay) = value {
            deep_merge(table, overlay);
        }
        return;
    };

    if rest.is_empty() {
        match (table.get_mut(first), value) {
            (Some(Value::Table(base)), Value::Table(overlay)) => {
                deep_merge(base, overlay);
            }
            (_, value) => {
                table.insert(first.clone(), value);
            }
        }
        return;
    }

    if !matches!(table.get(first), Some(Value::Table(_))) {
        table.insert(first.clone(), Value::Table(Table::new()));
    }

    if let Some(Value::Table(nested)) = table.get_mut(first) {
        merge_at_path(nested, rest, value);
    }
}

fn restrict_table(table: &Table, shape: &Table) -> Table {
    let mut out = Table::new();
    for (key, shaped) in shape {
        let value = match (table.get(key), shaped) {
            (Some(Value::Table(inner)), Value::Table(shaped)) => {
                Value::Table(restrict_table(inner, shaped))
            }
            (Some(value), _) => value.clone(),
            (None, _) => continue,
        };
        out.insert(key.clone(), value);
    }
    out
}

fn deep_merge(base: &mut Table, overlay: Table) {
    for (key, value) in overlay {
        match (base.get_mut(&key), value) {
            (Some(Value::Table(base_table)), Value::Table(overlay_table)) => {
                deep_merge(base_table, overlay_table);
            }
            (_, value) => {
                base.insert(key, value);
            }
        }
    }
}

fn parse_json(text: &str) -> Result<Table, ParseFailure> {
    match serde_json::from_str::<serde_json::Value>(text)? {
        serde_json::Value::Object(map) => Ok(json_object_to_table(map)),
        _ => Err(ParseFailure::JsonNotObject),
    }
}

fn json_object_to_table(map: serde_json::Map<String, serde_json::Value>) -> Table {
    map.into_iter()
        .filter_map(|(key, value)| json_to_toml(value).map(|value| (key, value)))
        .collect()
}

/// TOML has no null, so JSON nulls are dropped.
fn json_to_toml(value: serde_json::Value) -> Option<Value> {
    use serde_json::Value as Json;

    match value {
        Json::Null => None,
        Json::Bool(b) => Some(Value::Boolean(b)),
        Json::Number(n) => n
            .as_i64()
            .map(Value::Integer)
            .or_else(|| n.as_f64().map(Value::Float)),
        Json::String(s) => Some(Value::String(s)),
        Json::Array(items) => Some(Value::Array(
            items.into_iter().filter_map(json_to_toml).collect(),
        )),
        Json::Object(map) => Some(Value::Table(json_object_to_table(map))),
    }
}

/// Parses `key=value` / `key: value` lines into a nested table.
fn parse_properties(text: &str) -> Result<Table, ParseFailure> {
    let mut table = Table::new();
    let mut pending = String::new();
    let mut start_line = 0;

    for (idx, raw) in text.lines().enumerate() {
        let line = raw.trim();
        if pending.is_empty() {
            if line.is_empty() || line.starts_with('#') || line.starts_with('!') {
                continue;
            }
            start_line = idx + 1;
        }

        // Trailing backslash continues the entry on the next line
        if let Some(head) = line.strip_suffix('\\') {
            pending.push_str(head);
            continue;
        }

        pending.push_str(line);
        let entry = std::mem::take(&mut pending);
        insert_property(&mut table, &entry, start_line)?;
    }

    if !pending.is_empty() {
        insert_property(&mut table, &pending, start_line)?;
    }

    Ok(table)
}

fn insert_property(table: &mut Table, entry: &str, line: usize) -> Result<(), ParseFailure> {
    let split = entry
        .find(&['=', ':'][..])
        .ok_or_else(|| ParseFailure::Properties {
            line,
            message: format!("expected 'key=value', found '{entry}'"),
        })?;

    let key = entry[..split].trim();
    let value = entry[split + 1..].trim();
    let path = split_key(key).ok_or_else(|| ParseFailure::Properties {
        line,
        message: format!("invalid key '{key}'"),
    })?;

    merge_at_path(table, &path, Value::String(value.to_string()));
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn toml_doc(text: &str) -> Document {
        Document::parse(text, Syntax::Toml, "test").unwrap()
    }

    #[test]
    fn test_with_fallback_prefers_receiver() {
        let high = toml_doc(
            r#"
            port = 4433
            [logging.loggers]
            "io.app" = "test"
            "#,
        );
        let low = toml_doc(
            r#"
            port = 8765
            name = "demo"
            [logging.loggers]
            "io.app" = "debug"
            "io.net" = "warn"
            "#,
        );

        let merged = high.with_fallback(&low);

        assert_eq!(merged.get("port"), Some(&Value::Integer(4433)));
        assert_eq!(merged.get("name"), Some(&Value::String("demo".into())));
        let loggers = merged.get("logging.loggers").unwrap().as_table().unwrap();
        assert_eq!(loggers["io.app"].as_str(), Some("test"));
        assert_eq!(loggers["io.net"].as_str(), Some("warn"));

        // inputs are untouched
        assert_eq!(low.get("port"), Some(&Value::Integer(8765)));
        assert!(high.get("name").is_none());
    }

    #[test]
    fn test_with_fallback_replaces_arrays() {
        let high = toml_doc("hosts = [\"a\"]");
        let low = toml_doc("hosts = [\"b\", \"c\"]");

        let merged = high.with_fallback(&low);
        assert_eq!(merged.get("hosts").unwrap().as_array().unwrap().len(), 1);
    }

    #[test]
    fn test_with_fallback_empty_is_identity() {
        let doc = toml_doc("a = 1\n[b]\nc = true");

        assert_eq!(doc.with_fallback(&Document::empty()), doc);
        assert_eq!(Document::empty().with_fallback(&doc), doc);
    }

    #[test]
    fn test_restrict_to_drops_fallback_keys() {
        let own = toml_doc("home = \"${HOME_DIR}\"\nalias = \"${base}\"\n[server]\nport = 1");
        let merged = toml_doc(
            "HOME_DIR = \"/srv\"\nhome = \"/srv\"\n\
             [alias]\nx = 1\n[server]\nport = 1\nhost = \"env\"",
        );

        let restricted = merged.restrict_to(&own);
        assert_eq!(
            restricted,
            toml_doc("home = \"/srv\"\n[alias]\nx = 1\n[server]\nport = 1")
        );
    }

    #[test]
    fn test_with_fallback_is_associative() {
        let a = toml_doc("x = 1\n[t]\np = \"a\"");
        let b = toml_doc("x = 2\ny = 2\n[t]\nq = \"b\"");
        let c = toml_doc("y = 3\nz = 3\n[t]\np = \"c\"\nr = \"c\"");

        let left = a.with_fallback(&b).with_fallback(&c);
        let right = a.with_fallback(&b.with_fallback(&c));
        assert_eq!(left, right);
        assert_eq!(left.get("x"), Some(&Value::Integer(1)));
        assert_eq!(left.get("y"), Some(&Value::Integer(2)));
        assert_eq!(left.get("t.p"), Some(&Value::String("a".into())));
        assert_eq!(left.get("t.r"), Some(&Value::String("c".into())));
    }

    #[test]
    fn test_at_path() {
        let doc = toml_doc(
            r#"
            port = 8765
            [sub]
            port = 8198
            "#,
        );

        let sub = doc.at_path("sub").unwrap();
        assert_eq!(sub.get("port"), Some(&Value::Integer(8198)));

        assert!(matches!(
            doc.at_path("missing"),
            Err(ConfigError::SubPathNotFound(_))
        ));
        assert!(matches!(
            doc.at_path("port"),
            Err(ConfigError::SubPathNotTable(_))
        ));
        assert!(matches!(
            doc.at_path("sub..port"),
            Err(ConfigError::SubPathNotFound(_))
        ));
    }

    #[test]
    fn test_parse_toml_error() {
        let result = Document::parse("port = = 1", Syntax::Toml, "broken.toml");
        match result {
            Err(ConfigError::ParseError { origin, source }) => {
                assert_eq!(origin, "broken.toml");
                assert!(matches!(source, ParseFailure::Toml(_)));
            }
            other => panic!("expected parse error, got {other:?}"),
        }
    }

    #[test]
    fn test_parse_json_drops_nulls() {
        let doc = Document::parse(
            r#"{ "port": 8080, "ratio": 0.5, "name": null, "server": { "hosts": ["a", null] } }"#,
            Syntax::Json,
            "test.json",
        )
        .unwrap();

        assert_eq!(doc.get("port"), Some(&Value::Integer(8080)));
        assert_eq!(doc.get("ratio"), Some(&Value::Float(0.5)));
        assert!(doc.get("name").is_none());
        assert_eq!(
            doc.get("server.hosts").unwrap().as_array().unwrap().len(),
            1
        );
    }

    #[test]
    fn test_parse_json_rejects_non_object() {
        let result = Document::parse("[1, 2]", Syntax::Json, "list.json");
        assert!(matches!(
            result,
            Err(ConfigError::ParseError {
                source: ParseFailure::JsonNotObject,
                ..
            })
        ));
    }

    #[test]
    fn test_parse_properties() {
        let doc = Document::parse(
            "# comment\n\
             ! another comment\n\
             server.port = 8080\n\
             server.host: localhost\n\
             debug=true\n\
             motd = hello \\\n  world\n",
            Syntax::Properties,
            "app.properties",
        )
        .unwrap();

        assert_eq!(doc.get("server.port"), Some(&Value::String("8080".into())));
        assert_eq!(
            doc.get("server.host"),
            Some(&Value::String("localhost".into()))
        );
        assert_eq!(doc.get("debug"), Some(&Value::String("true".into())));
        assert_eq!(doc.get("motd"), Some(&Value::String("hello world".into())));
    }

    #[test]
    fn test_parse_properties_reports_line() {
        let result = Document::parse("a = 1\n\nnot a pair\n", Syntax::Properties, "bad");
        match result {
            Err(ConfigError::ParseError {
                source: ParseFailure::Properties { line, .. },
                ..
            }) => assert_eq!(line, 3),
            other => panic!("expected properties error, got {other:?}"),
        }
    }

    #[test]
    fn test_syntax_from_path() {
        assert_eq!(Syntax::from_path("conf/app.toml"), Some(Syntax::Toml));
        assert_eq!(Syntax::from_path("app.JSON"), Some(Syntax::Json));
        assert_eq!(Syntax::from_path("app.properties"), Some(Syntax::Properties));
        assert_eq!(Syntax::from_path("app.yaml"), None);
        assert_eq!(Syntax::from_path("app"), None);
    }

    #[test]
    fn test_render_round_trips_through_toml() {
        let doc = toml_doc("name = \"demo\"\n[server]\nport = 1");
        let text = doc.render().unwrap();
        assert!(text.contains("name = \"demo\""));
        assert!(text.contains("[server]"));
    }
}
