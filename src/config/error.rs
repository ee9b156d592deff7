use thiserror::Error;

#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ConfigError {
    #[error("configuration source not found: {0}")]
    SourceNotFound(String),

    #[error("failed to read configuration source '{origin}': {source}")]
    ReadError {
        origin: String,
        source: std::io::Error,
    },

    #[error("failed to determine working directory: {0}")]
    WorkingDirectory(#[source] std::io::Error),

    #[error("failed to parse configuration source '{origin}': {source}")]
    ParseError {
        origin: String,
        source: ParseFailure,
    },

    #[error("circular reference detected at '{0}'")]
    CircularReference(String),

    #[error("referenced path '{reference}' not found (used by '{key}')")]
    ReferenceNotFound { reference: String, key: String },

    #[error("invalid reference path: {0}")]
    InvalidReferencePath(String),

    #[error("cannot embed non-scalar value '{reference}' in a string (used by '{key}')")]
    NonScalarReference { reference: String, key: String },

    #[error("unclosed reference (missing '}}') in '{0}'")]
    UnclosedReference(String),

    #[error("configuration sub-path not found: {0}")]
    SubPathNotFound(String),

    #[error("configuration sub-path is not a table: {0}")]
    SubPathNotTable(String),

    #[error("failed to decode configuration at {scope}: {source}")]
    DecodeError {
        scope: String,
        source: toml::de::Error,
    },

    #[error("failed to render configuration: {0}")]
    RenderError(#[from] toml::ser::Error),
}

/// Syntax-specific cause of a [`ConfigError::ParseError`].
#[derive(Debug, Error)]
pub enum ParseFailure {
    #[error(transparent)]
    Toml(#[from] toml::de::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error("top-level JSON value must be an object")]
    JsonNotObject,

    #[error("line {line}: {message}")]
    Properties { line: usize, message: String },
}
