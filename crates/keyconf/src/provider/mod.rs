//! Source providers.
//!
//! A provider owns the cells for one schema partition. It resolves each key
//! to a raw string once, at construction, converts it to the declared type
//! and keeps the resulting [`TypedValue`]s for its whole life.
//!
//! # Built-in Providers
//!
//! - [`DocumentProvider`] - Reads the `values` section of a document
//! - [`EnvProvider`] - Reads process environment variables (and optionally a
//!   dotenv file)
//!
//! # Resolution
//!
//! ```text
//! source value > schema default
//! ```
//!
//! A key whose resolved string does not convert is omitted: lookups for it
//! return an empty [`ValueRef`](crate::ValueRef). In strict mode the failure
//! is collected and returned from [`RegistryBuilder::build`](crate::RegistryBuilder::build)
//! instead.

mod document;
mod env;

pub use document::DocumentProvider;
pub use env::{EnvProvider, EnvSource};

use std::collections::HashMap;
use std::sync::Arc;

use crate::cell::{TypedValue, WatchFn};
use crate::convert::{convert, try_convert};
use crate::error::Error;
use crate::schema::Partition;
use crate::source::{Origin, SourceKind};

/// A configuration source serving one schema partition.
///
/// # Example
///
/// ```rust
/// use keyconf::provider::{EnvProvider, Provider};
/// use keyconf::schema::Partition;
///
/// let provider = EnvProvider::new(&Partition::new());
/// assert_eq!(provider.name(), "environment");
/// assert!(provider.value("missing").is_none());
/// ```
pub trait Provider: Send + Sync {
    /// Provider name for logs.
    fn name(&self) -> &str;

    /// The schema source this provider serves.
    fn source(&self) -> SourceKind;

    /// The cell for `key`, if the key resolved and converted.
    fn value(&self, key: &str) -> Option<Arc<TypedValue>>;

    /// Attaches `callbacks` to the cell for `key` and marks it watched.
    ///
    /// Returns the cell, or `None` (dropping the callbacks) if there is none.
    fn watch(&self, key: &str, callbacks: Vec<WatchFn>) -> Option<Arc<TypedValue>> {
        let cell = self.value(key)?;
        cell.add_watch_callbacks(callbacks);
        cell.start_watch();
        Some(cell)
    }

    /// Keys that have a cell, sorted.
    fn keys(&self) -> Vec<&str>;

    /// Number of cells.
    fn len(&self) -> usize;

    /// Returns `true` if the provider holds no cells.
    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Collects per-key failures while providers are built.
///
/// Lenient collection logs and drops them; strict collection keeps them for
/// the caller.
#[derive(Debug, Default)]
pub(crate) struct Collector {
    strict: bool,
    errors: Vec<Error>,
}

impl Collector {
    pub(crate) const fn new(strict: bool) -> Self {
        Self {
            strict,
            errors: Vec::new(),
        }
    }

    pub(crate) const fn is_strict(&self) -> bool {
        self.strict
    }

    /// Records `error` in strict mode; logs it otherwise.
    pub(crate) fn push(&mut self, error: Error) {
        if self.strict {
            self.errors.push(error);
        } else {
            tracing::warn!(%error, "ignoring configuration error");
        }
    }

    pub(crate) fn finish(self) -> Result<(), Error> {
        Error::from_accumulated(self.errors)
    }
}

/// A raw string and where it came from.
pub(crate) struct Raw {
    pub(crate) value: String,
    pub(crate) origin: Origin,
}

impl Raw {
    pub(crate) fn new(value: impl Into<String>, origin: Origin) -> Self {
        Self {
            value: value.into(),
            origin,
        }
    }
}

/// Builds one cell per resolvable key of `partition`.
///
/// `lookup` returns the source's raw string for a key, `Ok(None)` if the
/// source has none, or an error that the collector handles before the key
/// falls back to its default.
pub(crate) fn build_cells<F>(
    provider: &str,
    partition: &Partition,
    collector: &mut Collector,
    mut lookup: F,
) -> HashMap<String, Arc<TypedValue>>
where
    F: FnMut(&str) -> Result<Option<Raw>, Error>,
{
    let mut cells = HashMap::with_capacity(partition.len());

    for (key, spec) in partition {
        let raw = match lookup(key) {
            Ok(Some(raw)) => raw,

            Ok(None) => {
                tracing::debug!(provider, key = %key, "no source value, using default");
                Raw::new(spec.default.clone(), Origin::Default)
            }

            Err(error) => {
                let strict = collector.is_strict();
                collector.push(error);
                if strict {
                    continue;
                }
                Raw::new(spec.default.clone(), Origin::Default)
            }
        };

        let converted = if collector.is_strict() {
            match try_convert(&raw.value, &spec.value_type) {
                Ok(value) => Some(value),

                Err(source) => {
                    collector.push(Error::Conversion {
                        key: key.clone(),
                        source,
                    });
                    None
                }
            }
        } else {
            convert(&raw.value, &spec.value_type)
        };

        if let Some(value) = converted {
            let cell = TypedValue::new(value, key.clone()).with_origin(raw.origin);
            cells.insert(key.clone(), Arc::new(cell));
        }
    }

    tracing::debug!(provider, keys = cells.len(), "provider built");
    cells
}

/// Sorted keys of a cell map.
pub(crate) fn sorted_keys(cells: &HashMap<String, Arc<TypedValue>>) -> Vec<&str> {
    let mut keys: Vec<&str> = cells.keys().map(String::as_str).collect();
    keys.sort_unstable();
    keys
}
