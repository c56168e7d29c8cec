//! Key schema loading and partitioning.
//!
//! A schema document declares every expected key under `configs`:
//!
//! ```yaml
//! configs:
//!   port:
//!     type: int
//!     default: 8080
//!     source: yaml
//!   api_token:
//!     type: string
//!     default: ""
//!     source: env
//! ```
//!
//! [`Schema`] splits the entries into one [`Partition`] per source. Entries
//! with an unrecognized source land in neither partition.

use std::collections::BTreeMap;

use serde::{Deserialize, Deserializer};

use crate::document::{Document, deserialize_scalar};
use crate::error::Error;
use crate::source::SourceKind;
use crate::value::ValueType;

/// Declared keys for one source, by name.
pub type Partition = BTreeMap<String, KeySpec>;

/// One declared key.
#[derive(Clone, Debug, Deserialize, PartialEq, Eq)]
pub struct KeySpec {
    /// Declared type. Unknown tags are accepted here and rejected when the
    /// value is converted.
    #[serde(rename = "type", default = "KeySpec::missing_type")]
    pub value_type: ValueType,

    /// Raw default, converted lazily by the owning provider.
    #[serde(default, deserialize_with = "deserialize_default")]
    pub default: String,

    /// Which provider owns the key.
    #[serde(default = "KeySpec::missing_source")]
    pub source: SourceKind,
}

impl KeySpec {
    /// Creates a key declaration.
    pub fn new(value_type: ValueType, default: impl Into<String>, source: SourceKind) -> Self {
        Self {
            value_type,
            default: default.into(),
            source,
        }
    }

    fn missing_type() -> ValueType {
        ValueType::Unknown(String::new())
    }

    fn missing_source() -> SourceKind {
        SourceKind::Unknown(String::new())
    }
}

fn deserialize_default<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    deserialize_scalar(deserializer).map(Option::unwrap_or_default)
}

#[derive(Deserialize)]
struct SchemaDocument {
    #[serde(default)]
    configs: Option<BTreeMap<String, KeySpec>>,
}

/// The decoded schema, partitioned by source.
#[derive(Clone, Debug, Default)]
pub struct Schema {
    document: Partition,
    environment: Partition,
    unknown: Vec<(String, String)>,
}

impl Schema {
    /// Decodes the `configs` section of `document` and partitions it.
    ///
    /// A document without `configs`, or with an empty one, yields an empty
    /// schema.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Schema`] if the document is empty or its entries do
    /// not have the expected shape.
    pub fn from_document(document: &Document) -> Result<Self, Error> {
        let decoded: SchemaDocument = document.decode()?;
        Ok(Self::from_entries(decoded.configs.unwrap_or_default()))
    }

    /// Partitions already-decoded entries.
    pub fn from_entries<I>(entries: I) -> Self
    where
        I: IntoIterator<Item = (String, KeySpec)>,
    {
        let mut schema = Self::default();

        for (name, spec) in entries {
            match &spec.source {
                SourceKind::Document => {
                    schema.document.insert(name, spec);
                }

                SourceKind::Environment => {
                    schema.environment.insert(name, spec);
                }

                SourceKind::Unknown(tag) => {
                    tracing::debug!(key = %name, source = %tag, "dropping key with unknown source");
                    schema.unknown.push((name, tag.clone()));
                }
            }
        }

        schema
    }

    /// Keys routed to the values document.
    #[must_use]
    pub const fn document(&self) -> &Partition {
        &self.document
    }

    /// Keys routed to the environment.
    #[must_use]
    pub const fn environment(&self) -> &Partition {
        &self.environment
    }

    /// The partition for `kind`, or `None` for an unknown source.
    #[must_use]
    pub const fn partition(&self, kind: &SourceKind) -> Option<&Partition> {
        match kind {
            SourceKind::Document => Some(&self.document),

            SourceKind::Environment => Some(&self.environment),

            SourceKind::Unknown(_) => None,
        }
    }

    /// `(key, source tag)` of every entry dropped for an unknown source.
    #[must_use]
    pub fn unknown_sources(&self) -> &[(String, String)] {
        &self.unknown
    }

    /// Looks up a partitioned key.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&KeySpec> {
        self.document.get(key).or_else(|| self.environment.get(key))
    }

    /// Number of partitioned keys.
    #[must_use]
    pub fn len(&self) -> usize {
        self.document.len() + self.environment.len()
    }

    /// Returns `true` if no key was partitioned.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::DocumentFormat;

    const SCHEMA_JSON: &str = r#"{
        "configs": {
            "key1": {"type": "string", "default": "str", "source": "yaml"},
            "key2": {"type": "int", "default": 2, "source": "yaml"},
            "key4": {"type": "bool", "default": false, "source": "yaml"},
            "key11": {"type": "string", "default": "default_env_1", "source": "env"},
            "key99": {"type": "string", "default": "x", "source": "consul"}
        }
    }"#;

    fn schema() -> Schema {
        let doc = Document::parse_str(SCHEMA_JSON, DocumentFormat::Json).unwrap();
        Schema::from_document(&doc).unwrap()
    }

    #[test]
    fn test_partitions() {
        let schema = schema();
        assert_eq!(schema.document().len(), 3);
        assert_eq!(schema.environment().len(), 1);
        assert_eq!(schema.len(), 4);
        assert!(schema.environment().contains_key("key11"));
    }

    #[test]
    fn test_unknown_source_dropped() {
        let schema = schema();
        assert!(schema.get("key99").is_none());
        assert_eq!(
            schema.unknown_sources(),
            &[("key99".to_string(), "consul".to_string())]
        );
    }

    #[test]
    fn test_scalar_defaults_become_text() {
        let schema = schema();
        assert_eq!(schema.get("key2").unwrap().default, "2");
        assert_eq!(schema.get("key4").unwrap().default, "false");
        assert_eq!(schema.get("key2").unwrap().value_type, ValueType::Int);
    }

    #[test]
    fn test_missing_fields_are_lenient() {
        let doc = Document::parse_str(
            r#"{"configs": {"a": {"source": "env"}, "b": {"type": "int"}}}"#,
            DocumentFormat::Json,
        )
        .unwrap();
        let schema = Schema::from_document(&doc).unwrap();

        let a = schema.get("a").unwrap();
        assert_eq!(a.default, "");
        assert!(a.value_type.is_unknown());
        assert_eq!(schema.unknown_sources().len(), 1);
    }

    #[test]
    fn test_missing_configs_is_empty() {
        for json in [r#"{"other": 1}"#, r#"{"configs": null}"#] {
            let doc = Document::parse_str(json, DocumentFormat::Json).unwrap();
            assert!(Schema::from_document(&doc).unwrap().is_empty());
        }
    }

    #[test]
    fn test_bad_shape_reports_path() {
        let doc = Document::parse_str(
            r#"{"configs": {"a": {"type": "int", "default": [1, 2], "source": "yaml"}}}"#,
            DocumentFormat::Json,
        )
        .unwrap();

        match Schema::from_document(&doc).unwrap_err() {
            Error::Schema { path, .. } => assert_eq!(path, "configs.a.default"),
            other => panic!("expected Schema error, got {other:?}"),
        }
    }
}
