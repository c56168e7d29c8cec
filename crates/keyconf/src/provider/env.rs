//! Environment variable provider.

use std::collections::HashMap;
use std::env::VarError;
#[cfg(feature = "dotenv")]
use std::path::Path;
use std::path::PathBuf;
use std::sync::Arc;

use super::{Collector, Provider, Raw, build_cells, sorted_keys};
use crate::cell::TypedValue;
use crate::error::Error;
use crate::schema::Partition;
use crate::source::{Origin, SourceKind};

/// Where an [`EnvProvider`] looks for variables.
///
/// # Example
///
/// ```rust
/// use keyconf::provider::EnvSource;
///
/// // Without prefix
/// assert_eq!(EnvSource::new().full_key("port"), "PORT");
///
/// // With prefix (reads APP_PORT for key "port")
/// assert_eq!(EnvSource::new().with_prefix("APP_").full_key("port"), "APP_PORT");
/// ```
#[derive(Clone, Debug, Default)]
pub struct EnvSource {
    prefix: Option<String>,

    #[cfg(feature = "dotenv")]
    dotenv: Option<PathBuf>,
}

impl EnvSource {
    /// Process environment only, no prefix.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            prefix: None,

            #[cfg(feature = "dotenv")]
            dotenv: None,
        }
    }

    /// Prepends `prefix` to every variable name.
    ///
    /// The prefix is used as given; only the key is upper-cased.
    #[must_use]
    pub fn with_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.prefix = Some(prefix.into());
        self
    }

    /// Consults `path` for variables missing from the process environment.
    ///
    /// The file is read once and never written into the process environment.
    #[cfg(feature = "dotenv")]
    #[must_use]
    pub fn with_dotenv(mut self, path: impl Into<PathBuf>) -> Self {
        self.dotenv = Some(path.into());
        self
    }

    /// The configured prefix.
    #[must_use]
    pub fn prefix(&self) -> Option<&str> {
        self.prefix.as_deref()
    }

    /// Variable name for `key`: prefix plus upper-cased key.
    #[must_use]
    pub fn full_key(&self, key: &str) -> String {
        let key = key.to_uppercase();
        self.prefix
            .as_ref()
            .map_or_else(|| key.clone(), |p| format!("{p}{key}"))
    }

    /// Reads the dotenv file, if one is configured.
    pub(crate) fn load_dotenv(&self) -> Result<DotenvValues, Error> {
        #[cfg(feature = "dotenv")]
        {
            if let Some(path) = &self.dotenv {
                return DotenvValues::read(path);
            }
        }

        Ok(DotenvValues::default())
    }

    fn lookup(&self, key: &str, dotenv: &DotenvValues) -> Result<Option<Raw>, Error> {
        let var = self.full_key(key);

        match std::env::var(&var) {
            Ok(value) => Ok(Some(Raw::new(value, Origin::Environment(var)))),

            Err(VarError::NotPresent) => Ok(dotenv.get(&var)),

            Err(VarError::NotUnicode(_)) => Err(Error::InvalidUnicode { var }),
        }
    }
}

/// Variables read from a dotenv file.
#[derive(Debug, Default)]
pub(crate) struct DotenvValues {
    path: PathBuf,
    values: HashMap<String, String>,
}

impl DotenvValues {
    #[cfg(feature = "dotenv")]
    fn read(path: &Path) -> Result<Self, Error> {
        let to_error = |source| Error::Dotenv {
            path: path.display().to_string(),
            source,
        };

        let values = dotenvy::from_path_iter(path)
            .map_err(to_error)?
            .collect::<Result<HashMap<_, _>, _>>()
            .map_err(to_error)?;

        tracing::debug!(path = %path.display(), vars = values.len(), "loaded dotenv file");

        Ok(Self {
            path: path.to_path_buf(),
            values,
        })
    }

    fn get(&self, var: &str) -> Option<Raw> {
        self.values
            .get(var)
            .map(|value| Raw::new(value.clone(), Origin::Dotenv(self.path.clone())))
    }
}

/// Provider backed by environment variables.
///
/// Each key is looked up as `PREFIX + UPPERCASE(key)`, then in the dotenv
/// file if one is configured, then falls back to the schema default. A
/// variable that is not valid UTF-8 is logged and the key uses its default.
///
/// Variables are read once, when the provider is built.
///
/// # Example
///
/// ```rust,ignore
/// use keyconf::provider::{EnvProvider, EnvSource};
///
/// // Reads APP_PORT, then .env, then the default
/// let source = EnvSource::new().with_prefix("APP_").with_dotenv(".env");
/// let provider = EnvProvider::with_source(schema.environment(), &source)?;
/// ```
#[derive(Debug)]
pub struct EnvProvider {
    prefix: Option<String>,
    cells: HashMap<String, Arc<TypedValue>>,
}

impl EnvProvider {
    /// Builds cells for `partition` from the process environment.
    #[must_use]
    pub fn new(partition: &Partition) -> Self {
        Self::build(
            partition,
            &EnvSource::new(),
            &DotenvValues::default(),
            &mut Collector::new(false),
        )
    }

    /// Builds cells for `partition` as configured by `source`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Dotenv`] if a configured dotenv file cannot be read.
    pub fn with_source(partition: &Partition, source: &EnvSource) -> Result<Self, Error> {
        let dotenv = source.load_dotenv()?;
        Ok(Self::build(
            partition,
            source,
            &dotenv,
            &mut Collector::new(false),
        ))
    }

    pub(crate) fn build(
        partition: &Partition,
        source: &EnvSource,
        dotenv: &DotenvValues,
        collector: &mut Collector,
    ) -> Self {
        let cells = build_cells("environment", partition, collector, |key| {
            source.lookup(key, dotenv)
        });

        Self {
            prefix: source.prefix.clone(),
            cells,
        }
    }

    /// The variable-name prefix in use.
    #[must_use]
    pub fn prefix(&self) -> Option<&str> {
        self.prefix.as_deref()
    }
}

impl Provider for EnvProvider {
    fn name(&self) -> &str {
        "environment"
    }

    fn source(&self) -> SourceKind {
        SourceKind::Environment
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
