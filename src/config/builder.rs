use std::io::Read;
use std::path::Path;
use std::sync::Arc;

use log::{debug, info};
use serde::de::DeserializeOwned;

use super::decode::{decode, extract, Resolved};
use super::document::{Document, Syntax};
use super::env::{env_document, EnvMapping};
use super::environment::{EnvironmentName, EnvironmentSelector};
use super::file::{DirResources, Resources, SourceProvider};
use super::layers::{merge_layers, Layer, LayerSource};
use super::options::LoaderOptions;
use super::process::{cached_snapshot, ProcessSnapshot};
use super::resolve::{ReferenceResolver, Resolver};
use super::source::{SourceDescriptor, SourceLoader};
use super::ConfigError;

/// Builds typed configuration from layered sources.
///
/// Default discovery ([`build`](Self::build)) merges these layers, highest
/// precedence first:
///
/// 1. process environment variables
/// 2. process properties (`-Dkey=value` flags)
/// 3. `application.local.toml` in the working directory, if present
/// 4. the `<env>.application` resource, when an environment is active
/// 5. the `application` resource
/// 6. the `reference` resource
///
/// Nested tables are merged recursively; other values (including arrays)
/// are replaced entirely. Missing layers contribute nothing.
///
/// ## Variable References
///
/// String values can reference other config values using `${path.to.field}` syntax:
///
/// ```toml
/// [server]
/// host = "localhost"
/// port = 8080
/// url = "http://${server.host}:${server.port}/api"
/// ```
///
/// References are resolved once, after every layer is merged, so a resource
/// can refer to keys supplied by any other layer. Use `$$` to escape a
/// literal `$` (e.g., `$${VAR}` becomes `${VAR}`).
///
/// ## Example
///
/// ```no_run
/// use confstack::ConfigFactory;
/// use serde::Deserialize;
///
/// #[derive(Deserialize)]
/// struct MyConfig {
///     name: String,
///     port: u16,
/// }
///
/// let config = ConfigFactory::builder()
///     .with_resource_dir("config")
///     .build::<MyConfig>()?;
///
/// println!("{} listens on {}", config.name, config.port);
/// println!("{}", config.document().render()?);
/// # Ok::<(), confstack::ConfigError>(())
/// ```
#[derive(Debug)]
#[must_use = "factories do nothing until .build() is called"]
pub struct ConfigFactory {
    options: LoaderOptions,
    resources: Option<Arc<dyn Resources>>,
    snapshot: Option<Arc<ProcessSnapshot>>,
    resolver: Box<dyn Resolver>,
    sub_path: Option<String>,
}

impl Default for ConfigFactory {
    fn default() -> Self {
        Self {
            options: LoaderOptions::default(),
            resources: None,
            snapshot: None,
            resolver: Box::new(ReferenceResolver),
            sub_path: None,
        }
    }
}

impl ConfigFactory {
    /// Creates a new configuration factory.
    pub fn builder() -> Self {
        Self::default()
    }

    /// Replaces all loader options.
    pub fn with_options(mut self, options: LoaderOptions) -> Self {
        self.options = options;
        self
    }

    /// Uses the given bundled resources instead of `<cwd>/resources`.
    pub fn with_resources(mut self, resources: impl Resources + 'static) -> Self {
        self.resources = Some(Arc::new(resources));
        self
    }

    /// Reads bundled resources from a directory.
    pub fn with_resource_dir(self, dir: impl AsRef<Path>) -> Self {
        self.with_resources(DirResources::new(dir))
    }

    /// Builds against a fixed process snapshot instead of the cached one.
    pub fn with_snapshot(mut self, snapshot: ProcessSnapshot) -> Self {
        self.snapshot = Some(Arc::new(snapshot));
        self
    }

    /// Decodes only the table at this dotted path.
    ///
    /// Extraction happens after merging and resolution, so values under the
    /// sub-path may reference keys outside it.
    pub fn with_sub_path(mut self, path: impl Into<String>) -> Self {
        self.sub_path = Some(path.into());
        self
    }

    /// Uses a different local override file. Relative paths are resolved
    /// against the working directory.
    pub fn with_local_override(mut self, path: impl AsRef<Path>) -> Self {
        self.options.local_override_file = path.as_ref().to_path_buf();
        self
    }

    /// Maps only prefixed environment variables onto config keys.
    ///
    /// With prefix `MYAPP` and separator `__`, `MYAPP__DATABASE__HOST` sets
    /// `database.host`. Other variables are ignored.
    ///
    /// # Panics
    ///
    /// Panics if `separator` is empty.
    pub fn with_env_prefix(
        mut self,
        prefix: impl Into<String>,
        separator: impl Into<String>,
    ) -> Self {
        self.options.env_mapping = EnvMapping::prefixed(prefix, separator);
        self
    }

    /// Replaces the interpolation engine.
    pub fn with_resolver(mut self, resolver: impl Resolver + 'static) -> Self {
        self.resolver = Box::new(resolver);
        self
    }

    /// Returns the loader options in effect.
    pub fn options(&self) -> &LoaderOptions {
        &self.options
    }

    /// Builds configuration by default discovery: loads every layer, merges,
    /// resolves, extracts the sub-path and decodes.
    pub fn build<T: DeserializeOwned>(&self) -> Result<Resolved<T>, ConfigError> {
        let snapshot = self.snapshot()?;
        let environment =
            EnvironmentSelector::new(&self.options.environment_variable, &snapshot).resolve();
        let layers = self.discover_layers(&snapshot, environment.as_ref())?;

        self.finish(layers, environment, None)
    }

    /// Builds configuration from one explicitly addressed source.
    ///
    /// The source is loaded on its own, without the layered merge. References
    /// it cannot satisfy itself are looked up in the environment variables,
    /// which contribute no other keys.
    ///
    /// If the provider reports the source as not found, `path` (minus any
    /// known extension) is used as a resource name instead, layered under the
    /// environment and process properties and over the reference resource.
    pub fn build_from<T: DeserializeOwned>(
        &self,
        provider: &dyn SourceProvider,
        path: &str,
    ) -> Result<Resolved<T>, ConfigError> {
        match provider.open(path) {
            Ok(mut reader) => {
                let mut text = String::new();
                reader
                    .read_to_string(&mut text)
                    .map_err(|source| ConfigError::ReadError {
                        origin: path.to_string(),
                        source,
                    })?;

                let syntax = Syntax::from_path(path).unwrap_or(Syntax::Toml);
                let document = Document::parse(&text, syntax, path)?;
                debug!("loaded explicit source {path}");
                let snapshot = self.snapshot()?;
                let lookups = env_document(snapshot.env(), &self.options.env_mapping);
                let layers = vec![Layer::new(LayerSource::Explicit, path, Some(document))];
                self.finish(layers, None, Some(&lookups))
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!("explicit source {path} not found, searching resources");
                let snapshot = self.snapshot()?;
                let layers = self.fallback_layers(&snapshot, path)?;
                let anchor_found = layers
                    .iter()
                    .any(|l| l.source == LayerSource::Explicit && l.document.is_some());
                if !anchor_found {
                    return Err(ConfigError::SourceNotFound(path.to_string()));
                }
                self.finish(layers, None, None)
            }
            Err(source) => Err(ConfigError::ReadError {
                origin: path.to_string(),
                source,
            }),
        }
    }

    /// Loads the default-discovery layers, highest precedence first, without
    /// merging them.
    pub fn load_layers(&self) -> Result<Vec<Layer>, ConfigError> {
        let snapshot = self.snapshot()?;
        let environment =
            EnvironmentSelector::new(&self.options.environment_variable, &snapshot).resolve();
        self.discover_layers(&snapshot, environment.as_ref())
    }

    fn snapshot(&self) -> Result<Arc<ProcessSnapshot>, ConfigError> {
        match &self.snapshot {
            Some(snapshot) => Ok(Arc::clone(snapshot)),
            None => cached_snapshot(),
        }
    }

    fn resources(&self, snapshot: &ProcessSnapshot) -> Arc<dyn Resources> {
        match &self.resources {
            Some(resources) => Arc::clone(resources),
            None => Arc::new(DirResources::new(
                snapshot.cwd().join(&self.options.resource_dir),
            )),
        }
    }

    fn discover_layers(
        &self,
        snapshot: &ProcessSnapshot,
        environment: Option<&EnvironmentName>,
    ) -> Result<Vec<Layer>, ConfigError> {
        let resources = self.resources(snapshot);
        let loader = SourceLoader::new(resources.as_ref(), snapshot, &self.options.env_mapping);
        let local_override = snapshot.cwd().join(&self.options.local_override_file);

        let mut plan = vec![
            (LayerSource::Environment, SourceDescriptor::Environment),
            (LayerSource::Properties, SourceDescriptor::Properties),
            (LayerSource::LocalOverride, SourceDescriptor::File(&local_override)),
        ];

        let overlay =
            environment.map(|env| env.overlay_resource(&self.options.application_resource));
        if let Some(overlay) = overlay.as_deref() {
            plan.push((LayerSource::Overlay, SourceDescriptor::Resource(overlay)));
        }
        plan.push((
            LayerSource::Application,
            SourceDescriptor::Resource(&self.options.application_resource),
        ));
        plan.push((
            LayerSource::Reference,
            SourceDescriptor::Resource(&self.options.reference_resource),
        ));

        load_plan(&loader, plan)
    }

    fn fallback_layers(
        &self,
        snapshot: &ProcessSnapshot,
        path: &str,
    ) -> Result<Vec<Layer>, ConfigError> {
        let resources = self.resources(snapshot);
        let loader = SourceLoader::new(resources.as_ref(), snapshot, &self.options.env_mapping);
        let anchor = resource_anchor(path);

        load_plan(
            &loader,
            vec![
                (LayerSource::Environment, SourceDescriptor::Environment),
                (LayerSource::Properties, SourceDescriptor::Properties),
                (LayerSource::Explicit, SourceDescriptor::Resource(anchor)),
                (
                    LayerSource::Reference,
                    SourceDescriptor::Resource(&self.options.reference_resource),
                ),
            ],
        )
    }

    /// Merges, resolves, extracts and decodes.
    ///
    /// `lookups` can satisfy references but adds no keys of its own.
    fn finish<T: DeserializeOwned>(
        &self,
        layers: Vec<Layer>,
        environment: Option<EnvironmentName>,
        lookups: Option<&Document>,
    ) -> Result<Resolved<T>, ConfigError> {
        let merged = merge_layers(&layers);
        let resolved = match lookups {
            Some(lookups) => self
                .resolver
                .resolve(&merged.with_fallback(lookups))?
                .restrict_to(&merged),
            None => self.resolver.resolve(&merged)?,
        };
        let scoped = extract(resolved, self.sub_path.as_deref())?;
        let config = decode(&scoped, self.sub_path.as_deref().unwrap_or("<root>"))?;

        let layers: Vec<_> = layers.iter().map(Layer::meta).collect();
        info!(
            "configuration built (layers={}, environment={})",
            layers.iter().filter(|l| l.loaded).count(),
            environment.as_ref().map_or("none", EnvironmentName::as_str),
        );

        Ok(Resolved::new(config, scoped, environment, layers))
    }
}

fn load_plan(
    loader: &SourceLoader<'_>,
    plan: Vec<(LayerSource, SourceDescriptor<'_>)>,
) -> Result<Vec<Layer>, ConfigError> {
    let mut layers = Vec::with_capacity(plan.len());

    for (source, descriptor) in plan {
        let document = loader.load(descriptor)?;
        if document.is_some() {
            debug!("loaded {source} layer ({descriptor})");
        } else {
            debug!("skipping missing {source} layer ({descriptor})");
        }
        layers.push(Layer::new(source, descriptor.to_string(), document));
    }

    Ok(layers)
}

/// Strips a known syntax extension, so `conf/app.toml` anchors resource `conf/app`.
fn resource_anchor(path: &str) -> &str {
    Syntax::ALL
        .into_iter()
        .find_map(|syntax| {
            path.strip_suffix(syntax.extension())
                .and_then(|rest| rest.strip_suffix('.'))
        })
        .unwrap_or(path)
}
