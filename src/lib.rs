//! Layered, environment-aware configuration resolved into typed structs.
//!
//! Configuration is assembled from environment variables, process
//! properties, a local override file and bundled resources, merged by a fixed
//! precedence, interpolated once and decoded with serde. See
//! [`ConfigFactory`] for the layer order.

pub mod config;

pub use config::{ConfigError, ConfigFactory, Document, Resolved};
pub use config::{DirResources, EmbeddedResources, FileSourceProvider, ProcessSnapshot};
