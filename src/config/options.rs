use std::path::PathBuf;

use super::env::EnvMapping;

/// Variable (and property) naming the active environment.
pub const DEFAULT_ENVIRONMENT_VARIABLE: &str = "ENV";
/// Base bundled resource.
pub const DEFAULT_APPLICATION_RESOURCE: &str = "application";
/// Lowest-precedence defaults resource.
pub const DEFAULT_REFERENCE_RESOURCE: &str = "reference";
/// Local override file, relative to the working directory.
pub const DEFAULT_LOCAL_OVERRIDE_FILE: &str = "application.local.toml";
/// Resource directory, relative to the working directory.
pub const DEFAULT_RESOURCE_DIR: &str = "resources";

/// Names and locations used by default discovery.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoaderOptions {
    pub environment_variable: String,
    pub application_resource: String,
    pub reference_resource: String,
    /// Relative paths are resolved against the snapshot's working directory.
    pub local_override_file: PathBuf,
    /// Used only when no explicit resources are configured. Relative paths
    /// are resolved against the snapshot's working directory.
    pub resource_dir: PathBuf,
    pub env_mapping: EnvMapping,
}

impl Default for LoaderOptions {
    fn default() -> Self {
        Self {
            environment_variable: DEFAULT_ENVIRONMENT_VARIABLE.to_string(),
            application_resource: DEFAULT_APPLICATION_RESOURCE.to_string(),
            reference_resource: DEFAULT_REFERENCE_RESOURCE.to_string(),
            local_override_file: PathBuf::from(DEFAULT_LOCAL_OVERRIDE_FILE),
            resource_dir: PathBuf::from(DEFAULT_RESOURCE_DIR),
            env_mapping: EnvMapping::Dotted,
        }
    }
}
