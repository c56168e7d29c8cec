//! Values document provider.

use std::collections::HashMap;
use std::sync::Arc;

use serde::Deserialize;

use super::{Collector, Provider, Raw, build_cells, sorted_keys};
use crate::cell::TypedValue;
use crate::document::Document;
use crate::error::Error;
use crate::schema::Partition;
use crate::source::{Origin, SourceKind};

#[derive(Deserialize)]
struct ValuesDocument {
    #[serde(default)]
    values: Option<HashMap<String, Option<String>>>,
}

/// Provider backed by the `values` section of a document.
///
/// ```yaml
/// values:
///   port: 9090
///   weights: "a:1,b:2"
/// ```
///
/// Only keys in the partition are read; other entries are ignored. A `null`
/// entry counts as absent and the key falls back to its schema default.
///
/// # Example
///
/// ```rust
/// use keyconf::provider::{DocumentProvider, Provider};
/// use keyconf::schema::{KeySpec, Partition};
/// use keyconf::{Document, DocumentFormat, SourceKind, ValueType};
///
/// let partition = Partition::from([(
///     "port".to_string(),
///     KeySpec::new(ValueType::Int, "8080", SourceKind::Document),
/// )]);
/// let doc = Document::parse_str(r#"{"values": {"port": 9090}}"#, DocumentFormat::Json).unwrap();
///
/// let provider = DocumentProvider::new(&doc, &partition).unwrap();
/// assert_eq!(provider.value("port").unwrap().as_int(), 9090);
/// ```
#[derive(Debug)]
pub struct DocumentProvider {
    origin: String,
    cells: HashMap<String, Arc<TypedValue>>,
}

impl DocumentProvider {
    /// Builds cells for `partition` from `document`, logging and skipping
    /// keys that do not convert.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Schema`] if the `values` section is malformed.
    pub fn new(document: &Document, partition: &Partition) -> Result<Self, Error> {
        Self::build(document, partition, &mut Collector::new(false))
    }

    /// Like [`new`](Self::new), but a key that does not convert is an error.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Schema`] for a malformed `values` section, or the
    /// accumulated [`Error::Conversion`]s.
    pub fn strict(document: &Document, partition: &Partition) -> Result<Self, Error> {
        let mut collector = Collector::new(true);
        let provider = Self::build(document, partition, &mut collector)?;
        collector.finish()?;
        Ok(provider)
    }

    pub(crate) fn build(
        document: &Document,
        partition: &Partition,
        collector: &mut Collector,
    ) -> Result<Self, Error> {
        let decoded: ValuesDocument = document.decode()?;
        let mut values = decoded.values.unwrap_or_default();

        let origin = document.origin().to_string();
        let cells = build_cells("document", partition, collector, |key| {
            Ok(values
                .remove(key)
                .flatten()
                .map(|value| Raw::new(value, Origin::Document(origin.clone()))))
        });

        Ok(Self { origin, cells })
    }

    /// Label of the document the values were read from.
    #[must_use]
    pub fn origin(&self) -> &str {
        &self.origin
    }
}

impl Provider for DocumentProvider {
    fn name(&self) -> &str {
        "document"
    }

    fn source(&self) -> SourceKind {
        SourceKind::Document
    }

    fn value(&self, key: &str) -> Option<Arc<TypedValue>> {
        self.cells.get(key).cloned()
    }

    fn keys(&self) -> Vec<&str> {
        sorted_keys(&self.cells)
    }

    fn len(&self) -> usize {
        self.cells.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::DocumentFormat;
    use crate::schema::KeySpec;
    use crate::value::ValueType;
    use std::time::Duration;

    fn partition() -> Partition {
        [
            ("key1", ValueType::String, "str"),
            ("key2", ValueType::Int, "2"),
            ("key5", ValueType::Duration, "1m"),
            ("key6", ValueType::Int, "6"),
            ("key7", ValueType::Int, "7"),
        ]
        .into_iter()
        .map(|(name, value_type, default)| {
            (
                name.to_string(),
                KeySpec::new(value_type, default, SourceKind::Document),
            )
        })
        .collect()
    }

    fn doc(json: &str) -> Document {
        Document::parse_str(json, DocumentFormat::Json).unwrap()
    }

    #[test]
    fn test_values_override_defaults() {
        let doc = doc(r#"{"values": {"key1": "value", "key2": 22, "key5": "40m"}}"#);
        let provider = DocumentProvider::new(&doc, &partition()).unwrap();

        assert_eq!(provider.value("key1").unwrap().as_string(), "value");
        assert_eq!(provider.value("key2").unwrap().as_int(), 22);
        assert_eq!(
            provider.value("key5").unwrap().as_duration(),
            Duration::from_secs(40 * 60)
        );
        assert_eq!(provider.value("key6").unwrap().as_int(), 6);
        assert_eq!(
            provider.value("key1").unwrap().origin(),
            &Origin::Document("<string>".to_string())
        );
        assert_eq!(provider.value("key6").unwrap().origin(), &Origin::Default);
    }

    #[test]
    fn test_unconvertible_value_is_omitted() {
        let doc = doc(r#"{"values": {"key7": "seven"}}"#);
        let provider = DocumentProvider::new(&doc, &partition()).unwrap();

        assert!(provider.value("key7").is_none());
        assert_eq!(provider.len(), 4);
    }

    #[test]
    fn test_null_entry_uses_default() {
        let doc = doc(r#"{"values": {"key2": null}}"#);
        let provider = DocumentProvider::new(&doc, &partition()).unwrap();
        assert_eq!(provider.value("key2").unwrap().as_int(), 2);
    }

    #[test]
    fn test_missing_or_null_values_section() {
        for json in [r#"{"other": 1}"#, r#"{"values": null}"#] {
            let provider = DocumentProvider::new(&doc(json), &partition()).unwrap();
            assert_eq!(provider.len(), 5);
        }
    }

    #[test]
    fn test_nested_value_is_decode_error() {
        let doc = doc(r#"{"values": {"key1": {"nested": true}}}"#);
        match DocumentProvider::new(&doc, &partition()).unwrap_err() {
            Error::Schema { path, .. } => assert_eq!(path, "values.key1"),
            other => panic!("expected Schema error, got {other:?}"),
        }
    }

    #[test]
    fn test_strict_reports_bad_value() {
        let doc = doc(r#"{"values": {"key7": "seven"}}"#);
        let err = DocumentProvider::strict(&doc, &partition()).unwrap_err();
        assert!(matches!(err, Error::Conversion { ref key, .. } if key == "key7"));
    }

    #[test]
    fn test_watch_attaches_callbacks() {
        let doc = doc(r#"{"values": {}}"#);
        let provider = DocumentProvider::new(&doc, &partition()).unwrap();

        let cell = provider
            .watch("key2", vec![crate::cell::watch_fn(|_, _| Ok(()))])
            .unwrap();
        assert!(cell.is_watch_started());
        assert_eq!(cell.callback_count(), 1);
        assert!(provider.watch("nope", Vec::new()).is_none());
    }

    #[test]
    fn test_keys_sorted() {
        let provider = DocumentProvider::new(&doc("{}"), &partition()).unwrap();
        assert_eq!(
            provider.keys(),
            vec!["key1", "key2", "key5", "key6", "key7"]
        );
    }
}
