//! The key registry.
//!
//! A [`Registry`] is built once from a schema, an optional values document
//! and the environment. After construction it is immutable: lookups route a
//! key to the provider that owns it and hand back its shared cell. Only the
//! cells themselves change, through [`TypedValue::update`](crate::TypedValue::update).
//!
//! ```rust
//! use keyconf::{DocumentFormat, Registry};
//!
//! let registry = Registry::builder()
//!     .schema_str(
//!         r#"{"configs": {"port": {"type": "int", "default": 8080, "source": "yaml"}}}"#,
//!         DocumentFormat::Json,
//!     )
//!     .values_str(r#"{"values": {"port": 9090}}"#, DocumentFormat::Json)
//!     .build()
//!     .unwrap();
//!
//! assert_eq!(registry.value("port").as_int(), 9090);
//! assert!(registry.value("missing").is_none());
//! ```
//!
//! # Global Registry
//!
//! [`RegistryBuilder::init_global`] installs a process-wide registry, read
//! through [`value`], [`watch`] and [`global`]. It can be installed once.

use std::collections::BTreeSet;
use std::fmt;
use std::io::Read;
use std::path::PathBuf;
use std::sync::OnceLock;

use crate::cell::{ValueRef, WatchFn};
use crate::document::{Document, DocumentFormat};
use crate::error::Error;
use crate::provider::{Collector, DocumentProvider, EnvProvider, EnvSource, Provider};
use crate::schema::{KeySpec, Schema};
use crate::source::SourceKind;

static GLOBAL: OnceLock<Registry> = OnceLock::new();

/// Where a document comes from, resolved at build time.
enum Input {
    Str {
        content: String,
        format: DocumentFormat,
    },

    File(PathBuf),

    Reader {
        reader: Box<dyn Read>,
        format: DocumentFormat,
    },
}

impl Input {
    fn load(self) -> Result<Document, Error> {
        match self {
            Self::Str { content, format } => Document::parse(content, format, "<string>"),

            Self::File(path) => Document::from_file(path),

            Self::Reader { reader, format } => Document::from_reader(reader, format, "<reader>"),
        }
    }
}

// Manual Debug impl: readers are opaque
impl fmt::Debug for Input {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Str { format, .. } => write!(f, "Str({})", format.name()),

            Self::File(path) => write!(f, "File({})", path.display()),

            Self::Reader { format, .. } => write!(f, "Reader({})", format.name()),
        }
    }
}

/// Builder for [`Registry`].
///
/// A schema source is required. Without a values source, document-sourced
/// keys are not registered and look up as unknown.
#[derive(Debug, Default)]
#[must_use]
pub struct RegistryBuilder {
    schema: Option<Input>,
    values: Option<Input>,
    env: EnvSource,
    strict: bool,
}

impl RegistryBuilder {
    /// Creates an empty builder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Uses an in-memory schema document.
    pub fn schema_str(mut self, content: impl Into<String>, format: DocumentFormat) -> Self {
        self.schema = Some(Input::Str {
            content: content.into(),
            format,
        });
        self
    }

    /// Reads the schema from a file; the format follows the extension.
    pub fn schema_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.schema = Some(Input::File(path.into()));
        self
    }

    /// Reads the schema from `reader` when the registry is built.
    pub fn schema_reader(mut self, reader: impl Read + 'static, format: DocumentFormat) -> Self {
        self.schema = Some(Input::Reader {
            reader: Box::new(reader),
            format,
        });
        self
    }

    /// Uses an in-memory values document.
    pub fn values_str(mut self, content: impl Into<String>, format: DocumentFormat) -> Self {
        self.values = Some(Input::Str {
            content: content.into(),
            format,
        });
        self
    }

    /// Reads values from a file; the format follows the extension.
    pub fn values_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.values = Some(Input::File(path.into()));
        self
    }

    /// Reads values from `reader` when the registry is built.
    pub fn values_reader(mut self, reader: impl Read + 'static, format: DocumentFormat) -> Self {
        self.values = Some(Input::Reader {
            reader: Box::new(reader),
            format,
        });
        self
    }

    /// Prepends `prefix` to environment variable names.
    pub fn env_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.env = self.env.with_prefix(prefix);
        self
    }

    /// Falls back to `path` for variables missing from the environment.
    #[cfg(feature = "dotenv")]
    pub fn dotenv_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.env = self.env.with_dotenv(path);
        self
    }

    /// In strict mode, values that do not convert, unknown sources and
    /// non-UTF-8 variables fail the build instead of being logged.
    pub fn strict(mut self, strict: bool) -> Self {
        self.strict = strict;
        self
    }

    /// Loads every source and builds the registry.
    ///
    /// # Errors
    ///
    /// - [`Error::MissingSchema`] if no schema source was set
    /// - Document errors ([`Error::NotFound`], [`Error::Parse`],
    ///   [`Error::Schema`], ...) for the schema or values document
    /// - [`Error::Dotenv`] if a configured dotenv file cannot be read
    /// - In strict mode, the collected per-key errors
    pub fn build(self) -> Result<Registry, Error> {
        let schema_doc = self.schema.ok_or(Error::MissingSchema)?.load()?;
        let schema = Schema::from_document(&schema_doc)?;

        let mut collector = Collector::new(self.strict);
        if collector.is_strict() {
            for (key, tag) in schema.unknown_sources() {
                collector.push(Error::UnknownSource {
                    key: key.clone(),
                    source_tag: tag.clone(),
                });
            }
        }

        let document = match self.values {
            Some(input) => {
                let values_doc = input.load()?;
                Some(DocumentProvider::build(
                    &values_doc,
                    schema.document(),
                    &mut collector,
                )?)
            }

            None => {
                if !schema.document().is_empty() {
                    tracing::debug!(
                        keys = schema.document().len(),
                        "no values document, document keys are not registered"
                    );
                }
                None
            }
        };

        let dotenv = self.env.load_dotenv()?;
        let environment =
            EnvProvider::build(schema.environment(), &self.env, &dotenv, &mut collector);

        collector.finish()?;

        Ok(Registry::new(schema, document, environment))
    }

    /// Builds the registry and installs it as the global registry.
    ///
    /// # Errors
    ///
    /// Any [`build`](Self::build) error, or [`Error::AlreadyInitialized`].
    pub fn init_global(self) -> Result<&'static Registry, Error> {
        self.build()?.install()
    }
}

/// Routes keys to the provider that owns them.
#[derive(Debug)]
pub struct Registry {
    schema: Schema,
    document_keys: BTreeSet<String>,
    env_keys: BTreeSet<String>,
    document: Option<DocumentProvider>,
    environment: EnvProvider,
}

impl Registry {
    /// Creates a [`RegistryBuilder`].
    pub fn builder() -> RegistryBuilder {
        RegistryBuilder::new()
    }

    /// Assembles a registry from already-built providers.
    ///
    /// Document keys are registered only when `document` is present.
    #[must_use]
    pub fn new(
        schema: Schema,
        document: Option<DocumentProvider>,
        environment: EnvProvider,
    ) -> Self {
        let document_keys = if document.is_some() {
            schema.document().keys().cloned().collect()
        } else {
            BTreeSet::new()
        };
        let env_keys = schema.environment().keys().cloned().collect();

        Self {
            schema,
            document_keys,
            env_keys,
            document,
            environment,
        }
    }

    /// Installs this registry as the global registry.
    ///
    /// # Errors
    ///
    /// Returns [`Error::AlreadyInitialized`] if one is already installed.
    pub fn install(self) -> Result<&'static Self, Error> {
        let mut installed = false;
        let registry = GLOBAL.get_or_init(|| {
            installed = true;
            self
        });

        if installed {
            tracing::debug!(keys = registry.len(), "global registry installed");
            Ok(registry)
        } else {
            Err(Error::AlreadyInitialized)
        }
    }

    /// The provider serving `source`, if it was built.
    #[must_use]
    pub fn provider(&self, source: &SourceKind) -> Option<&dyn Provider> {
        match source {
            SourceKind::Document => self.document.as_ref().map(|p| p as &dyn Provider),

            SourceKind::Environment => Some(&self.environment),

            SourceKind::Unknown(_) => None,
        }
    }

    /// Which source owns `key`, if it is registered.
    #[must_use]
    pub fn source_of(&self, key: &str) -> Option<SourceKind> {
        if self.document_keys.contains(key) {
            Some(SourceKind::Document)
        } else if self.env_keys.contains(key) {
            Some(SourceKind::Environment)
        } else {
            None
        }
    }

    fn route(&self, key: &str) -> Option<&dyn Provider> {
        let provider = self.source_of(key).and_then(|source| self.provider(&source));
        if provider.is_none() {
            tracing::warn!(key, "unknown value key");
        }
        provider
    }

    /// Looks up the cell for `key`.
    ///
    /// An unregistered key logs a warning. Both it and a registered key
    /// whose value did not convert return an empty ref.
    pub fn value(&self, key: &str) -> ValueRef {
        self.route(key)
            .and_then(|provider| provider.value(key))
            .into()
    }

    /// Attaches `callbacks` to the cell for `key` and marks it watched.
    ///
    /// Callbacks for a key with no cell are dropped.
    pub fn watch<I>(&self, key: &str, callbacks: I) -> ValueRef
    where
        I: IntoIterator<Item = WatchFn>,
    {
        self.route(key)
            .and_then(|provider| provider.watch(key, callbacks.into_iter().collect()))
            .into()
    }

    /// Returns `true` if `key` is registered.
    #[must_use]
    pub fn contains(&self, key: &str) -> bool {
        self.source_of(key).is_some()
    }

    /// All registered keys, sorted.
    #[must_use]
    pub fn keys(&self) -> Vec<&str> {
        let mut keys: Vec<&str> = self
            .document_keys
            .iter()
            .chain(&self.env_keys)
            .map(String::as_str)
            .collect();
        keys.sort_unstable();
        keys.dedup();
        keys
    }

    /// Number of registered keys.
    #[must_use]
    pub fn len(&self) -> usize {
        self.keys().len()
    }

    /// Returns `true` if no key is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.document_keys.is_empty() && self.env_keys.is_empty()
    }

    /// The declaration of `key`, registered or not.
    #[must_use]
    pub fn spec(&self, key: &str) -> Option<&KeySpec> {
        self.schema.get(key)
    }

    /// The decoded schema.
    #[must_use]
    pub const fn schema(&self) -> &Schema {
        &self.schema
    }
}

/// The global registry, if installed.
#[must_use]
pub fn global() -> Option<&'static Registry> {
    GLOBAL.get()
}

/// Looks up `key` in the global registry.
///
/// Returns an empty ref, with a warning, if no registry is installed.
pub fn value(key: &str) -> ValueRef {
    match global() {
        Some(registry) => registry.value(key),

        None => {
            tracing::warn!(key, "global registry not initialized");
            ValueRef::none()
        }
    }
}

/// Watches `key` in the global registry.
///
/// Returns an empty ref, with a warning, if no registry is installed.
pub fn watch<I>(key: &str, callbacks: I) -> ValueRef
where
    I: IntoIterator<Item = WatchFn>,
{
    match global() {
        Some(registry) => registry.watch(key, callbacks),

        None => {
            tracing::warn!(key, "global registry not initialized");
            ValueRef::none()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cell::watch_fn;

    const SCHEMA: &str = r#"{
        "configs": {
            "name": {"type": "string", "default": "svc", "source": "yaml"},
            "workers": {"type": "int", "default": 4, "source": "yaml"},
            "kcreg_token": {"type": "string", "default": "none", "source": "env"},
            "remote": {"type": "string", "default": "", "source": "consul"}
        }
    }"#;

    fn builder() -> RegistryBuilder {
        Registry::builder().schema_str(SCHEMA, DocumentFormat::Json)
    }

    #[test]
    fn test_missing_schema() {
        let err = Registry::builder().build().unwrap_err();
        assert!(matches!(err, Error::MissingSchema));
    }

    #[test]
    fn test_routing() {
        let registry = builder()
            .values_str(r#"{"values": {"workers": 8}}"#, DocumentFormat::Json)
            .build()
            .unwrap();

        assert_eq!(registry.value("name").as_string(), "svc");
        assert_eq!(registry.value("workers").as_int(), 8);
        assert_eq!(registry.value("kcreg_token").as_string(), "none");
        assert!(registry.value("remote").is_none());
        assert!(registry.value("nope").is_none());

        assert_eq!(registry.source_of("workers"), Some(SourceKind::Document));
        assert_eq!(registry.source_of("kcreg_token"), Some(SourceKind::Environment));
        assert_eq!(registry.keys(), vec!["kcreg_token", "name", "workers"]);
        assert_eq!(registry.len(), 3);
        assert_eq!(registry.spec("remote"), None);
    }

    #[test]
    fn test_document_keys_need_values_source() {
        let registry = builder().build().unwrap();

        assert!(!registry.contains("name"));
        assert!(registry.value("name").is_none());
        assert!(registry.contains("kcreg_token"));
        assert!(registry.provider(&SourceKind::Document).is_none());
        assert!(registry.spec("name").is_some());
    }

    #[test]
    fn test_lookups_share_one_cell() {
        let registry = builder().values_str("{}", DocumentFormat::Json).build().unwrap();

        let a = registry.value("workers");
        let b = registry.value("workers");
        assert!(a.update(16));
        assert_eq!(b.as_int(), 16);
    }

    #[test]
    fn test_watch_attaches_callbacks_and_starts_watch() {
        let registry = builder().values_str("{}", DocumentFormat::Json).build().unwrap();

        let cell = registry.watch("name", [watch_fn(|_, _| Ok(()))]);
        assert!(cell.is_watch_started());
        assert_eq!(cell.cell().map(|c| c.callback_count()), Some(1));

        assert!(registry.watch("nope", Vec::new()).is_none());
    }

    #[test]
    fn test_strict_collects_errors() {
        let err = builder()
            .values_str(r#"{"values": {"workers": "many"}}"#, DocumentFormat::Json)
            .strict(true)
            .build()
            .unwrap_err();

        assert_eq!(err.error_count(), 2);
        let Error::Multiple { errors } = err else {
            panic!("expected Multiple");
        };
        assert!(errors.iter().any(|e| matches!(e, Error::UnknownSource { key, .. } if key == "remote")));
        assert!(errors.iter().any(|e| matches!(e, Error::Conversion { key, .. } if key == "workers")));
    }

    #[test]
    fn test_values_decode_error_is_returned() {
        let err = builder()
            .values_str(r#"{"values": {"name": [1]}}"#, DocumentFormat::Json)
            .build()
            .unwrap_err();
        assert!(matches!(err, Error::Schema { .. }));
    }

    #[test]
    fn test_reader_sources() {
        let registry = Registry::builder()
            .schema_reader(std::io::Cursor::new(SCHEMA.as_bytes().to_vec()), DocumentFormat::Json)
            .values_reader(
                std::io::Cursor::new(br#"{"values": {"name": "api"}}"#.to_vec()),
                DocumentFormat::Json,
            )
            .build()
            .unwrap();

        assert_eq!(registry.value("name").as_string(), "api");
    }
}
