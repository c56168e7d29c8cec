//! Error types for schema and values loading.
//!
//! Only failures that make a registry unusable are errors: unreadable or
//! malformed documents, a missing schema, and (in strict mode) values that do
//! not convert. Everything else degrades to a logged warning and a zero value.
//!
//! | Variant | When It Occurs |
//! |---------|----------------|
//! | [`Error::NotFound`] | Document file does not exist |
//! | [`Error::Read`] | Document file or reader could not be read |
//! | [`Error::UnknownFormat`] | File extension is not a supported format |
//! | [`Error::Parse`] | Document is not valid YAML/JSON/TOML |
//! | [`Error::Schema`] | Document parsed but has the wrong shape |
//! | [`Error::MissingSchema`] | Registry built without a schema source |
//! | [`Error::Dotenv`] | Dotenv file could not be read (with `dotenv` feature) |
//! | [`Error::Conversion`] | Value does not match its declared type (strict mode) |
//! | [`Error::UnknownSource`] | Schema entry names an unknown source (strict mode) |
//! | [`Error::InvalidUnicode`] | Environment variable is not UTF-8 (strict mode) |
//! | [`Error::Multiple`] | Several of the above at once |
//! | [`Error::AlreadyInitialized`] | Global registry installed twice |

use std::error::Error as StdError;

use miette::{Diagnostic, NamedSource, SourceSpan};
use thiserror::Error as ThisError;

use crate::convert::ConversionError;

/// Error returned by a watch callback.
///
/// Callback errors are logged with the key and never abort an update.
pub type CallbackError = Box<dyn StdError + Send + Sync>;

/// Errors that can occur while building a [`Registry`](crate::Registry).
///
/// # Example
///
/// ```rust,ignore
/// match Registry::builder().schema_file("keys.yaml").build() {
///     Ok(registry) => { /* use registry */ }
///     Err(e) => eprintln!("{:?}", miette::Report::from(e)),
/// }
/// ```
#[derive(Debug, ThisError, Diagnostic)]
#[non_exhaustive]
pub enum Error {
    /// Document file not found.
    #[error("configuration document not found: {path}")]
    #[diagnostic(
        code(keyconf::document::not_found),
        help("ensure the file exists at the specified path")
    )]
    NotFound {
        /// Path to the missing file.
        path: String,
    },

    /// Failed to read a document.
    #[error("failed to read configuration document: {origin}")]
    #[diagnostic(
        code(keyconf::document::read_error),
        help("check file permissions and ensure it's readable")
    )]
    Read {
        /// File path or reader label.
        origin: String,

        /// The underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// Unknown document format.
    #[error("unknown configuration document format: .{extension}")]
    #[diagnostic(
        code(keyconf::document::unknown_format),
        help("supported formats: .json, .toml, .yaml, .yml")
    )]
    UnknownFormat {
        /// The file extension that wasn't recognized.
        extension: String,
    },

    /// Syntax error with source location.
    #[error("{format} parse error in {origin}")]
    #[diagnostic(code(keyconf::document::parse_error))]
    Parse {
        /// Format name (JSON, TOML, YAML).
        format: &'static str,

        /// File path or reader label.
        origin: String,

        /// The document content for display.
        #[source_code]
        src: NamedSource<String>,

        /// The location of the error.
        #[label("{message}")]
        span: SourceSpan,

        /// Description of what went wrong.
        message: String,

        /// Suggestion for how to fix.
        #[help]
        help: String,
    },

    /// Syntax error without source location (fallback).
    #[error("{format} parse error: {message}")]
    #[diagnostic(code(keyconf::document::parse_error))]
    ParseNoSpan {
        /// Format name.
        format: &'static str,

        /// Error message.
        message: String,

        /// Suggestion for how to fix.
        #[help]
        help: String,
    },

    /// The document parsed but does not have the expected structure.
    #[error("invalid document {origin} at `{path}`: {message}")]
    #[diagnostic(
        code(keyconf::document::schema),
        help(
            "schema documents map `configs.<name>` to type, default and source; values documents map `values.<name>` to a scalar"
        )
    )]
    Schema {
        /// File path or reader label.
        origin: String,

        /// Path inside the document, e.g. `configs.port.type`.
        path: String,

        /// What was wrong.
        message: String,
    },

    /// The registry builder was never given a schema.
    #[error("no schema source configured")]
    #[diagnostic(
        code(keyconf::registry::missing_schema),
        help("call schema_file, schema_str or schema_reader on the builder")
    )]
    MissingSchema,

    /// A dotenv file could not be loaded.
    #[cfg(feature = "dotenv")]
    #[error("failed to load dotenv file {path}")]
    #[diagnostic(code(keyconf::env::dotenv))]
    Dotenv {
        /// Path to the dotenv file.
        path: String,

        /// The underlying dotenvy error.
        #[source]
        source: dotenvy::Error,
    },

    /// A value could not be converted to its declared type.
    #[error("key `{key}`: {source}")]
    #[diagnostic(code(keyconf::conversion))]
    Conversion {
        /// The configuration key.
        key: String,

        /// Why conversion failed.
        #[source]
        #[diagnostic_source]
        source: ConversionError,
    },

    /// A schema entry names a source that no provider serves.
    #[error("key `{key}` declares unknown source {source_tag:?}")]
    #[diagnostic(
        code(keyconf::schema::unknown_source),
        help("use `yaml` for document values or `env` for environment variables")
    )]
    UnknownSource {
        /// The configuration key.
        key: String,

        /// The unrecognized source tag.
        source_tag: String,
    },

    /// An environment variable is not valid Unicode.
    #[error("environment variable {var} contains invalid UTF-8")]
    #[diagnostic(
        code(keyconf::env::invalid_unicode),
        help("ensure the variable contains valid UTF-8 text")
    )]
    InvalidUnicode {
        /// The variable name.
        var: String,
    },

    /// Multiple configuration errors occurred.
    #[error("{} configuration error(s)", .errors.len())]
    #[diagnostic(
        code(keyconf::multiple_errors),
        help("fix all listed configuration errors")
    )]
    Multiple {
        /// All accumulated errors.
        #[related]
        errors: Vec<Error>,
    },

    /// The process-wide registry was already installed.
    #[error("global registry is already initialized")]
    #[diagnostic(
        code(keyconf::registry::already_initialized),
        help("initialize the global registry exactly once, before any lookup")
    )]
    AlreadyInitialized,
}

impl Error {
    /// Creates a `Schema` error.
    pub fn schema(
        origin: impl Into<String>,
        path: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self::Schema {
            origin: origin.into(),
            path: path.into(),
            message: message.into(),
        }
    }

    /// Collapses accumulated errors: `Ok` if empty, the error itself if
    /// there is one, [`Error::Multiple`] otherwise.
    pub(crate) fn from_accumulated(mut errors: Vec<Self>) -> Result<(), Self> {
        match errors.len() {
            0 => Ok(()),

            1 => Err(errors.remove(0)),

            _ => Err(Self::Multiple { errors }),
        }
    }

    /// Number of leaf errors (flattening [`Error::Multiple`]).
    #[must_use]
    pub fn error_count(&self) -> usize {
        match self {
            Self::Multiple { errors } => errors.iter().map(Self::error_count).sum(),

            _ => 1,
        }
    }
}
