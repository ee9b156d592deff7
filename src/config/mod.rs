//! Layered configuration loading and resolution.

mod builder;
mod decode;
mod document;
mod env;
mod environment;
mod error;
mod file;
mod layers;
mod options;
mod process;
mod resolve;
mod source;

pub use builder::ConfigFactory;
pub use decode::{decode, extract, Resolved};
pub use document::{Document, Syntax};
pub use env::EnvMapping;
pub use environment::{EnvironmentName, EnvironmentSelector};
pub use error::{ConfigError, ParseFailure};
pub use file::{DirResources, EmbeddedResources, FileSourceProvider, Resources, SourceProvider};
pub use layers::{merge_layers, ConfigLayer, Layer, LayerSource};
pub use options::{
    LoaderOptions, DEFAULT_APPLICATION_RESOURCE, DEFAULT_ENVIRONMENT_VARIABLE,
    DEFAULT_LOCAL_OVERRIDE_FILE, DEFAULT_REFERENCE_RESOURCE, DEFAULT_RESOURCE_DIR,
};
pub use process::{
    cached_snapshot, clear_property, invalidate_caches, parse_property_flags, properties,
    set_property, ProcessSnapshot,
};
pub use resolve::{ReferenceResolver, Resolver};
pub use source::{SourceDescriptor, SourceLoader};
