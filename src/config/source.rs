use std::fmt;
use std::path::Path;

use log::debug;

use super::document::{Document, Syntax};
use super::env::{env_document, properties_document, EnvMapping};
use super::file::{read_optional_file, Resources};
use super::process::ProcessSnapshot;
use super::ConfigError;

/// Identifies where a layer's raw content comes from.
#[derive(Debug, Clone, Copy)]
pub enum SourceDescriptor<'a> {
    /// A bundled resource by logical name, in any supported syntax.
    Resource(&'a str),
    /// A file on disk; the syntax follows the extension, TOML by default.
    File(&'a Path),
    Environment,
    Properties,
}

impl fmt::Display for SourceDescriptor<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SourceDescriptor::Resource(name) => write!(f, "resource:{name}"),
            SourceDescriptor::File(path) => write!(f, "file:{}", path.display()),
            SourceDescriptor::Environment => f.write_str("environment"),
            SourceDescriptor::Properties => f.write_str("properties"),
        }
    }
}

/// Turns source descriptors into documents. Read-only.
#[derive(Debug, Clone, Copy)]
pub struct SourceLoader<'a> {
    resources: &'a dyn Resources,
    snapshot: &'a ProcessSnapshot,
    env_mapping: &'a EnvMapping,
}

impl<'a> SourceLoader<'a> {
    pub fn new(
        resources: &'a dyn Resources,
        snapshot: &'a ProcessSnapshot,
        env_mapping: &'a EnvMapping,
    ) -> Self {
        Self {
            resources,
            snapshot,
            env_mapping,
        }
    }

    /// Loads a source. `Ok(None)` means the source does not exist, which
    /// is not an error; malformed content is.
    pub fn load(&self, descriptor: SourceDescriptor<'_>) -> Result<Option<Document>, ConfigError> {
        match descriptor {
            SourceDescriptor::Resource(name) => self.load_resource(name),
            SourceDescriptor::File(path) => load_file(path),
            SourceDescriptor::Environment => {
                Ok(Some(env_document(self.snapshot.env(), self.env_mapping)))
            }
            SourceDescriptor::Properties => {
                Ok(Some(properties_document(self.snapshot.properties())))
            }
        }
    }

    /// Reads `name.toml`, `name.json` and `name.properties`. All forms found
    /// are merged; earlier syntaxes win on collision.
    fn load_resource(&self, name: &str) -> Result<Option<Document>, ConfigError> {
        let mut merged: Option<Document> = None;

        for syntax in Syntax::ALL {
            let file_name = format!("{name}.{}", syntax.extension());
            let Some(text) = self.resources.read(&file_name)? else {
                continue;
            };

            debug!("found resource {file_name}");
            let document = Document::parse(&text, syntax, &file_name)?;
            merged = Some(match merged {
                Some(higher) => higher.with_fallback(&document),
                None => document,
            });
        }

        Ok(merged)
    }
}

fn load_file(path: &Path) -> Result<Option<Document>, ConfigError> {
    let Some(text) = read_optional_file(path)? else {
        return Ok(None);
    };

    let syntax = Syntax::from_path(path).unwrap_or(Syntax::Toml);
    Document::parse(&text, syntax, &path.display().to_string()).map(Some)
}
