//! Precedence-ordered layers and the reducer that merges them.

use std::fmt;

use super::document::Document;

/// Origin of a configuration layer, in precedence order (highest first).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum LayerSource {
    /// Process environment variables.
    Environment,
    /// Process properties and `-D` flags.
    Properties,
    /// Optional local override file in the working directory.
    LocalOverride,
    /// Named-environment overlay resource (`<env>.application`).
    Overlay,
    /// Base application resource.
    Application,
    /// Reference defaults resource.
    Reference,
    /// A source addressed explicitly by the caller.
    Explicit,
}

impl fmt::Display for LayerSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            LayerSource::Environment => "environment",
            LayerSource::Properties => "properties",
            LayerSource::LocalOverride => "local-override",
            LayerSource::Overlay => "overlay",
            LayerSource::Application => "application",
            LayerSource::Reference => "reference",
            LayerSource::Explicit => "explicit",
        };
        f.write_str(name)
    }
}

/// Metadata about one layer considered during a build.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigLayer {
    pub source: LayerSource,
    /// Human-readable location, e.g. `resource:application` or a file path.
    pub origin: String,
    /// Whether the layer existed and contributed to the merge.
    pub loaded: bool,
}

/// One source's contribution. `document` is `None` when the source was absent.
#[derive(Debug, Clone)]
pub struct Layer {
    pub source: LayerSource,
    pub origin: String,
    pub document: Option<Document>,
}

impl Layer {
    pub fn new(source: LayerSource, origin: impl Into<String>, document: Option<Document>) -> Self {
        Self {
            source,
            origin: origin.into(),
            document,
        }
    }

    pub fn meta(&self) -> ConfigLayer {
        ConfigLayer {
            source: self.source,
            origin: self.origin.clone(),
            loaded: self.document.is_some(),
        }
    }
}

/// Merges layers given highest precedence first.
///
/// Folds from the lowest layer up, placing each layer over everything beneath
/// it. Absent layers are skipped.
pub fn merge_layers(layers: &[Layer]) -> Document {
    layers
        .iter()
        .rev()
        .fold(Document::empty(), |below, layer| match &layer.document {
            Some(document) => document.with_fallback(&below),
            None => below,
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::document::Syntax;
    use pretty_assertions::assert_eq;
    use toml::Value;

    fn layer(source: LayerSource, text: Option<&str>) -> Layer {
        let document = text.map(|t| Document::parse(t, Syntax::Toml, "test").unwrap());
        Layer::new(source, source.to_string(), document)
    }

    #[test]
    fn test_higher_layer_wins() {
        let layers = vec![
            layer(LayerSource::Environment, Some("[logging]\nlevel = \"TRACE\"")),
            layer(
                LayerSource::Application,
                Some("[logging]\nlevel = \"INFO\"\nformat = \"plain\""),
            ),
        ];

        let merged = merge_layers(&layers);
        assert_eq!(
            merged.get("logging.level"),
            Some(&Value::String("TRACE".into()))
        );
        assert_eq!(
            merged.get("logging.format"),
            Some(&Value::String("plain".into()))
        );
    }

    #[test]
    fn test_absent_layers_change_nothing() {
        let present = vec![
            layer(LayerSource::Properties, Some("port = 1")),
            layer(LayerSource::Application, Some("port = 2\nname = \"a\"")),
            layer(LayerSource::Reference, Some("name = \"b\"\nextra = true")),
        ];
        let with_gaps = vec![
            layer(LayerSource::Environment, None),
            layer(LayerSource::Properties, Some("port = 1")),
            layer(LayerSource::LocalOverride, None),
            layer(LayerSource::Overlay, None),
            layer(LayerSource::Application, Some("port = 2\nname = \"a\"")),
            layer(LayerSource::Reference, Some("name = \"b\"\nextra = true")),
        ];

        assert_eq!(merge_layers(&present), merge_layers(&with_gaps));
    }

    #[test]
    fn test_single_layer_is_identity() {
        let layers = vec![layer(LayerSource::Application, Some("a = 1\n[b]\nc = 2"))];
        let expected = layers[0].document.clone().unwrap();
        assert_eq!(merge_layers(&layers), expected);
    }

    #[test]
    fn test_no_layers_is_empty() {
        assert!(merge_layers(&[]).is_empty());
    }

    #[test]
    fn test_meta_records_presence() {
        let meta = layer(LayerSource::Overlay, None).meta();
        assert_eq!(meta.source, LayerSource::Overlay);
        assert!(!meta.loaded);
    }
}
