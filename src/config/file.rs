//! Where raw configuration text comes from: bundled resources, the
//! filesystem, and caller-supplied source providers.

use std::collections::BTreeMap;
use std::fmt;
use std::io::Read;
use std::path::{Path, PathBuf};

use super::ConfigError;

/// A set of bundled configuration resources addressed by file name
/// (e.g. `application.toml`).
pub trait Resources: Send + Sync + fmt::Debug {
    /// Returns `Ok(None)` when the resource does not exist.
    fn read(&self, file_name: &str) -> Result<Option<String>, ConfigError>;
}

/// Resources stored as files under a directory.
#[derive(Debug, Clone)]
pub struct DirResources {
    root: PathBuf,
}

impl DirResources {
    pub fn new(root: impl AsRef<Path>) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }
}

impl Resources for DirResources {
    fn read(&self, file_name: &str) -> Result<Option<String>, ConfigError> {
        read_optional_file(&self.root.join(file_name))
    }
}

/// Resources compiled into the binary, typically with `include_str!`.
///
/// ```
/// use confstack::EmbeddedResources;
///
/// let resources = EmbeddedResources::new()
///     .with("application.toml", "port = 8080")
///     .with("reference.toml", "name = \"app\"");
/// # let _ = resources;
/// ```
#[derive(Debug, Clone, Default)]
pub struct EmbeddedResources {
    files: BTreeMap<String, String>,
}

impl EmbeddedResources {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, file_name: impl Into<String>, contents: impl Into<String>) -> Self {
        self.files.insert(file_name.into(), contents.into());
        self
    }
}

impl Resources for EmbeddedResources {
    fn read(&self, file_name: &str) -> Result<Option<String>, ConfigError> {
        Ok(self.files.get(file_name).cloned())
    }
}

/// Opens an explicitly addressed configuration source.
///
/// A source that does not exist must be reported as an
/// [`std::io::ErrorKind::NotFound`] error so the caller can fall back to a
/// resource search.
pub trait SourceProvider: fmt::Debug {
    fn open(&self, path: &str) -> std::io::Result<Box<dyn Read + '_>>;
}

/// Opens sources from the filesystem.
#[derive(Debug, Default, Clone, Copy)]
pub struct FileSourceProvider;

impl SourceProvider for FileSourceProvider {
    fn open(&self, path: &str) -> std::io::Result<Box<dyn Read + '_>> {
        Ok(Box::new(std::fs::File::open(path)?))
    }
}

/// Reads a file, returning `Ok(None)` if it doesn't exist.
pub(crate) fn read_optional_file(path: &Path) -> Result<Option<String>, ConfigError> {
    match std::fs::read_to_string(path) {
        Ok(contents) => Ok(Some(contents)),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(ConfigError::ReadError {
            origin: path.display().to_string(),
            source: e,
        }),
    }
}
