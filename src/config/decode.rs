//! Sub-path extraction and typed decoding of resolved documents.

use std::ops::Deref;

use serde::de::value::{
    MapAccessDeserializer, MapDeserializer, SeqDeserializer, StringDeserializer,
};
use serde::de::{DeserializeOwned, Error as _, IntoDeserializer, Unexpected, Visitor};
use serde::{forward_to_deserialize_any, Deserialize, Deserializer};
use toml::de::Error;
use toml::Value;

use super::document::Document;
use super::environment::EnvironmentName;
use super::layers::ConfigLayer;
use super::ConfigError;

/// A decoded configuration together with the resolved document it came from.
///
/// The document is fixed at construction and kept for the lifetime of the
/// value, so collaborators that need raw access can still inspect it.
#[derive(Debug, Clone)]
pub struct Resolved<T> {
    config: T,
    document: Document,
    environment: Option<EnvironmentName>,
    layers: Vec<ConfigLayer>,
}

impl<T> Resolved<T> {
    pub(crate) fn new(
        config: T,
        document: Document,
        environment: Option<EnvironmentName>,
        layers: Vec<ConfigLayer>,
    ) -> Self {
        Self {
            config,
            document,
            environment,
            layers,
        }
    }

    pub fn config(&self) -> &T {
        &self.config
    }

    /// The resolved document, narrowed to the sub-path if one was requested.
    pub fn document(&self) -> &Document {
        &self.document
    }

    /// The named environment active during the build, if any.
    pub fn environment(&self) -> Option<&EnvironmentName> {
        self.environment.as_ref()
    }

    /// Every layer considered, highest precedence first.
    pub fn layers(&self) -> &[ConfigLayer] {
        &self.layers
    }

    pub fn into_inner(self) -> T {
        self.config
    }

    pub fn into_parts(self) -> (T, Document) {
        (self.config, self.document)
    }
}

impl<T> Deref for Resolved<T> {
    type Target = T;

    fn deref(&self) -> &T {
        &self.config
    }
}

/// Narrows a resolved document to `path`, or returns it unchanged.
pub fn extract(document: Document, path: Option<&str>) -> Result<Document, ConfigError> {
    match path {
        None => Ok(document),
        Some(path) => document.at_path(path),
    }
}

/// Decodes a document into `T`.
///
/// Keys unknown to `T` are ignored, enums decode from their names and empty
/// tables decode into empty structs. Missing required fields fail.
///
/// Environment variables and properties only ever supply text, so typing is
/// settled here: text decodes into numeric and boolean fields when it parses,
/// and scalars decode into string fields as their text.
pub fn decode<T: DeserializeOwned>(document: &Document, scope: &str) -> Result<T, ConfigError> {
    let value = Value::Table(document.root().clone());
    T::deserialize(TextTolerant(value)).map_err(|source| ConfigError::DecodeError {
        scope: scope.to_string(),
        source,
    })
}

/// Deserializer over a [`Value`] that converts between text and scalars on demand.
struct TextTolerant(Value);

impl TextTolerant {
    fn deserialize_integer<'de, V: Visitor<'de>>(self, visitor: V) -> Result<V::Value, Error> {
        match self.0 {
            Value::String(s) => {
                if let Ok(i) = s.parse::<i64>() {
                    visitor.visit_i64(i)
                } else if let Ok(u) = s.parse::<u64>() {
                    visitor.visit_u64(u)
                } else {
                    Err(Error::invalid_type(Unexpected::Str(&s), &visitor))
                }
            }
            other => TextTolerant(other).deserialize_any(visitor),
        }
    }

    fn deserialize_float<'de, V: Visitor<'de>>(self, visitor: V) -> Result<V::Value, Error> {
        match self.0 {
            Value::String(s) => match s.parse::<f64>() {
                Ok(f) => visitor.visit_f64(f),
                Err(_) => Err(Error::invalid_type(Unexpected::Str(&s), &visitor)),
            },
            other => TextTolerant(other).deserialize_any(visitor),
        }
    }

    fn map_access<'de>(
        table: toml::Table,
    ) -> MapDeserializer<'de, impl Iterator<Item = (String, TextTolerant)>, Error> {
        MapDeserializer::new(table.into_iter().map(|(k, v)| (k, TextTolerant(v))))
    }
}

impl<'de> IntoDeserializer<'de, Error> for TextTolerant {
    type Deserializer = Self;

    fn into_deserializer(self) -> Self {
        self
    }
}

impl<'de> Deserializer<'de> for TextTolerant {
    type Error = Error;

    fn deserialize_any<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value, Error> {
        match self.0 {
            Value::String(s) => visitor.visit_string(s),
            Value::Array(items) => {
                let mut seq: SeqDeserializer<_, Error> =
                    SeqDeserializer::new(items.into_iter().map(TextTolerant));
                let value = visitor.visit_seq(&mut seq)?;
                seq.end()?;
                Ok(value)
            }
            Value::Table(table) => {
                let mut map = Self::map_access(table);
                let value = visitor.visit_map(&mut map)?;
                map.end()?;
                Ok(value)
            }
            scalar => scalar.deserialize_any(visitor),
        }
    }

    fn deserialize_bool<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value, Error> {
        match self.0 {
            Value::String(s) if s.eq_ignore_ascii_case("true") => visitor.visit_bool(true),
            Value::String(s) if s.eq_ignore_ascii_case("false") => visitor.visit_bool(false),
            Value::String(s) => Err(Error::invalid_type(Unexpected::Str(&s), &visitor)),
            other => TextTolerant(other).deserialize_any(visitor),
        }
    }

    fn deserialize_i8<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value, Error> {
        self.deserialize_integer(visitor)
    }

    fn deserialize_i16<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value, Error> {
        self.deserialize_integer(visitor)
    }

    fn deserialize_i32<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value, Error> {
        self.deserialize_integer(visitor)
    }

    fn deserialize_i64<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value, Error> {
        self.deserialize_integer(visitor)
    }

    fn deserialize_u8<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value, Error> {
        self.deserialize_integer(visitor)
    }

    fn deserialize_u16<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value, Error> {
        self.deserialize_integer(visitor)
    }

    fn deserialize_u32<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value, Error> {
        self.deserialize_integer(visitor)
    }

    fn deserialize_u64<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value, Error> {
        self.deserialize_integer(visitor)
    }

    fn deserialize_f32<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value, Error> {
        self.deserialize_float(visitor)
    }

    fn deserialize_f64<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value, Error> {
        self.deserialize_float(visitor)
    }

    fn deserialize_string<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value, Error> {
        match self.0 {
            Value::Integer(i) => visitor.visit_string(i.to_string()),
            Value::Float(f) => visitor.visit_string(f.to_string()),
            Value::Boolean(b) => visitor.visit_string(b.to_string()),
            Value::Datetime(dt) => visitor.visit_string(dt.to_string()),
            other => TextTolerant(other).deserialize_any(visitor),
        }
    }

    fn deserialize_str<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value, Error> {
        self.deserialize_string(visitor)
    }

    fn deserialize_char<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value, Error> {
        self.deserialize_string(visitor)
    }

    // Absent keys never reach the deserializer, so every value is `Some`.
    fn deserialize_option<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value, Error> {
        visitor.visit_some(self)
    }

    fn deserialize_newtype_struct<V: Visitor<'de>>(
        self,
        _name: &'static str,
        visitor: V,
    ) -> Result<V::Value, Error> {
        visitor.visit_newtype_struct(self)
    }

    fn deserialize_enum<V: Visitor<'de>>(
        self,
        name: &'static str,
        variants: &'static [&'static str],
        visitor: V,
    ) -> Result<V::Value, Error> {
        match self.0 {
            Value::String(s) => {
                let variant: StringDeserializer<Error> = s.into_deserializer();
                visitor.visit_enum(variant)
            }
            Value::Table(table) => {
                visitor.visit_enum(MapAccessDeserializer::new(Self::map_access(table)))
            }
            other => other.deserialize_enum(name, variants, visitor),
        }
    }

    fn deserialize_ignored_any<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value, Error> {
        visitor.visit_unit()
    }

    forward_to_deserialize_any! {
        i128 u128 bytes byte_buf unit unit_struct seq tuple tuple_struct map struct identifier
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::document::Syntax;
    use pretty_assertions::assert_eq;
    use serde::Deserialize;
    use std::collections::BTreeMap;

    #[derive(Debug, Deserialize, PartialEq)]
    #[serde(rename_all = "UPPERCASE")]
    enum Level {
        Trace,
        Debug,
        Info,
    }

    #[derive(Debug, Deserialize, PartialEq)]
    struct Metrics {}

    #[derive(Debug, Deserialize)]
    struct Logging {
        level: Level,
        #[serde(default)]
        loggers: BTreeMap<String, String>,
    }

    #[derive(Debug, Deserialize)]
    struct AppConfig {
        port: u16,
        logging: Logging,
        metrics: Metrics,
    }

    fn doc(text: &str) -> Document {
        Document::parse(text, Syntax::Toml, "test").unwrap()
    }

    #[test]
    fn test_decode_ignores_unknown_keys() {
        let document = doc(
            r#"
            port = 8765
            [foo]
            bar = 1
            [logging]
            level = "INFO"
            unused = "x"
            [metrics]
            "#,
        );

        let config: AppConfig = decode(&document, "<root>").unwrap();
        assert_eq!(config.port, 8765);
        assert_eq!(config.logging.level, Level::Info);
        assert!(config.logging.loggers.is_empty());
        assert_eq!(config.metrics, Metrics {});
    }

    #[test]
    fn test_decode_missing_required_field() {
        let document = doc("[logging]\nlevel = \"INFO\"\n[metrics]");
        let result = decode::<AppConfig>(&document, "<root>");

        match result {
            Err(ConfigError::DecodeError { scope, source }) => {
                assert_eq!(scope, "<root>");
                assert!(source.to_string().contains("port"));
            }
            other => panic!("expected decode error, got {other:?}"),
        }
    }

    #[test]
    fn test_decode_unknown_enum_name_fails() {
        let document = doc("port = 1\n[logging]\nlevel = \"LOUD\"\n[metrics]");
        assert!(matches!(
            decode::<AppConfig>(&document, "<root>"),
            Err(ConfigError::DecodeError { .. })
        ));
    }

    #[test]
    fn test_decode_converts_text_and_scalars() {
        #[derive(Debug, Deserialize)]
        struct Settings {
            password: String,
            version: String,
            port: u16,
            offset: i32,
            ratio: f64,
            enabled: bool,
            label: String,
            retries: Option<u8>,
            level: Level,
            sizes: Vec<u32>,
        }

        let mut table = toml::Table::new();
        for (key, value) in [
            ("password", "007"),
            ("version", "1.10"),
            ("port", "8080"),
            ("offset", "-3"),
            ("ratio", "0.25"),
            ("enabled", "TRUE"),
            ("retries", "2"),
            ("level", "DEBUG"),
        ] {
            table.insert(key.to_string(), toml::Value::String(value.to_string()));
        }
        table.insert("label".to_string(), toml::Value::Integer(42));
        table.insert(
            "sizes".to_string(),
            toml::Value::Array(vec![
                toml::Value::String("1".into()),
                toml::Value::Integer(2),
            ]),
        );

        let settings: Settings = decode(&Document::from_table(table), "<root>").unwrap();
        assert_eq!(settings.password, "007");
        assert_eq!(settings.version, "1.10");
        assert_eq!(settings.port, 8080);
        assert_eq!(settings.offset, -3);
        assert_eq!(settings.ratio, 0.25);
        assert!(settings.enabled);
        assert_eq!(settings.label, "42");
        assert_eq!(settings.retries, Some(2));
        assert_eq!(settings.level, Level::Debug);
        assert_eq!(settings.sizes, vec![1, 2]);
    }

    #[test]
    fn test_decode_rejects_unparseable_text() {
        #[derive(Debug, Deserialize)]
        #[allow(dead_code)]
        struct Port {
            port: u16,
        }

        let document = doc(r#"port = "eighty""#);
        assert!(matches!(
            decode::<Port>(&document, "<root>"),
            Err(ConfigError::DecodeError { .. })
        ));
    }

    #[test]
    fn test_decode_keeps_table_values() {
        let document = doc("a = 1\nb = \"x\"\nwhen = 1979-05-27\n[c]\nd = [true]");
        let table: toml::Table = decode(&document, "<root>").unwrap();
        assert_eq!(&table, document.root());
    }

    #[test]
    fn test_extract_sub_path() {
        let document = doc(
            r#"
            port = 8765
            [subConfig]
            port = 8198
            [subConfig.logging]
            level = "DEBUG"
            [subConfig.metrics]
            "#,
        );

        let same = extract(document.clone(), None).unwrap();
        assert_eq!(same, document);

        let sub = extract(document.clone(), Some("subConfig")).unwrap();
        let config: AppConfig = decode(&sub, "subConfig").unwrap();
        assert_eq!(config.port, 8198);
        assert_eq!(config.logging.level, Level::Debug);

        assert!(matches!(
            extract(document, Some("otherConfig")),
            Err(ConfigError::SubPathNotFound(_))
        ));
    }

    #[test]
    fn test_resolved_keeps_document() {
        let document = doc("port = 1\n[logging]\nlevel = \"TRACE\"\n[metrics]\n[extra]\nkey = 2");
        let config: AppConfig = decode(&document, "<root>").unwrap();
        let resolved = Resolved::new(config, document, None, Vec::new());

        assert_eq!(resolved.port, 1);
        assert_eq!(resolved.logging.level, Level::Trace);
        assert_eq!(
            resolved.document().get("extra.key"),
            Some(&toml::Value::Integer(2))
        );
        assert!(resolved.environment().is_none());
    }
}
