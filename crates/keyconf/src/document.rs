//! Structured document decoding.
//!
//! Schema and values documents are parsed into a generic
//! [`serde_json::Value`] tree, whatever their on-disk format, for syntax
//! checking. Sections are then decoded with [`serde_path_to_error`] so
//! structural errors name the offending path.
//!
//! Every scalar is decoded as text. YAML sections are decoded straight from
//! the document, so a plain scalar keeps its exact spelling (`1.10`, `007`).
//! JSON and TOML scalars are typed by the format and rendered from their
//! parsed value.
//!
//! # Supported Formats
//!
//! | Format | Feature | Extensions |
//! |--------|---------|------------|
//! | JSON | always | `.json` |
//! | YAML | `yaml` (default) | `.yaml`, `.yml` |
//! | TOML | `toml` | `.toml` |

#[cfg(feature = "yaml")]
use std::cell::RefCell;
use std::io::Read;
use std::path::Path;

use miette::{NamedSource, SourceSpan};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer};
use serde_json as SJSON;

#[cfg(feature = "yaml")]
use serde_saphyr as YAML;

#[cfg(feature = "toml")]
use toml as TOML;

use crate::error::Error;

/// Supported document formats.
///
/// # Example
///
/// ```rust
/// use keyconf::DocumentFormat;
/// use std::path::Path;
///
/// assert_eq!(DocumentFormat::from_path(Path::new("keys.json")), Some(DocumentFormat::Json));
/// assert_eq!(DocumentFormat::from_path(Path::new("keys.txt")), None);
/// ```
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum DocumentFormat {
    /// JSON format (`.json` extension).
    Json,

    /// YAML format (`.yaml` or `.yml` extension).
    ///
    /// Requires the `yaml` feature flag.
    #[cfg(feature = "yaml")]
    Yaml,

    /// TOML format (`.toml` extension).
    ///
    /// Requires the `toml` feature flag.
    #[cfg(feature = "toml")]
    Toml,
}

impl DocumentFormat {
    /// Detects the format from the file extension.
    ///
    /// Returns `None` if the extension is not recognized or if the
    /// required feature flag is not enabled.
    #[must_use]
    pub fn from_path(path: &Path) -> Option<Self> {
        let ext = path.extension()?.to_str()?;

        match ext.to_lowercase().as_str() {
            "json" => Some(Self::Json),

            #[cfg(feature = "yaml")]
            "yaml" | "yml" => Some(Self::Yaml),

            #[cfg(feature = "toml")]
            "toml" => Some(Self::Toml),

            _ => None,
        }
    }

    /// Format name for error messages.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Json => "JSON",

            #[cfg(feature = "yaml")]
            Self::Yaml => "YAML",

            #[cfg(feature = "toml")]
            Self::Toml => "TOML",
        }
    }
}

/// A parsed schema or values document.
#[derive(Clone, Debug)]
pub struct Document {
    format: DocumentFormat,
    origin: String,
    content: String,
    root: SJSON::Value,
}

impl Document {
    /// Parses `content` as `format`. `origin` labels the document in errors
    /// and source attribution.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Parse`] (or [`Error::ParseNoSpan`]) on a syntax error.
    pub fn parse(
        content: impl Into<String>,
        format: DocumentFormat,
        origin: impl Into<String>,
    ) -> Result<Self, Error> {
        let content = content.into();
        let origin = origin.into();

        let root = match format {
            DocumentFormat::Json => SJSON::from_str(&content)
                .map_err(|e| Self::json_parse_error(&e, &content, &origin))?,

            #[cfg(feature = "yaml")]
            DocumentFormat::Yaml => YAML::from_str(&content)
                .map_err(|e| Self::yaml_parse_error(&e, &content, &origin))?,

            #[cfg(feature = "toml")]
            DocumentFormat::Toml => {
                let toml_value: TOML::Value = TOML::from_str(&content)
                    .map_err(|e| Self::toml_parse_error(&e, &content, &origin))?;
                Self::toml_to_json(toml_value)
            }
        };

        Ok(Self {
            format,
            origin,
            content,
            root,
        })
    }

    /// Parses an in-memory string, labelled `<string>`.
    ///
    /// # Errors
    ///
    /// See [`parse`](Self::parse).
    pub fn parse_str(content: &str, format: DocumentFormat) -> Result<Self, Error> {
        Self::parse(content, format, "<string>")
    }

    /// Reads and parses a file, detecting the format from its extension.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotFound`], [`Error::Read`] or
    /// [`Error::UnknownFormat`] before parsing, or a parse error.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, Error> {
        let path = path.as_ref();
        let path_str = path.display().to_string();

        if !path.exists() {
            return Err(Error::NotFound { path: path_str });
        }

        let format = DocumentFormat::from_path(path).ok_or_else(|| Error::UnknownFormat {
            extension: path
                .extension()
                .and_then(|e| e.to_str())
                .unwrap_or("unknown")
                .to_string(),
        })?;

        let content = std::fs::read_to_string(path).map_err(|source| Error::Read {
            origin: path_str.clone(),
            source,
        })?;

        Self::parse(content, format, path_str)
    }

    /// Reads a whole reader and parses it as `format`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Read`] if the reader fails, or a parse error.
    pub fn from_reader<R: Read>(
        mut reader: R,
        format: DocumentFormat,
        origin: impl Into<String>,
    ) -> Result<Self, Error> {
        let origin = origin.into();
        let mut content = String::new();

        reader
            .read_to_string(&mut content)
            .map_err(|source| Error::Read {
                origin: origin.clone(),
                source,
            })?;

        Self::parse(content, format, origin)
    }

    /// The document format.
    #[must_use]
    pub const fn format(&self) -> DocumentFormat {
        self.format
    }

    /// File path or label of the document.
    #[must_use]
    pub fn origin(&self) -> &str {
        &self.origin
    }

    /// The raw document text.
    #[must_use]
    pub fn content(&self) -> &str {
        &self.content
    }

    /// The parsed tree.
    #[must_use]
    pub const fn root(&self) -> &SJSON::Value {
        &self.root
    }

    /// Decodes the whole document into `T`, reporting the failing path.
    ///
    /// Scalars reach `T` as strings: numbers and booleans must be decoded
    /// into `String` fields.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Schema`] if the document is empty or its structure
    /// does not match `T`.
    pub fn decode<T: DeserializeOwned>(&self) -> Result<T, Error> {
        if self.root.is_null() {
            return Err(Error::schema(&self.origin, ".", "document is empty"));
        }

        #[cfg(feature = "yaml")]
        {
            if self.format == DocumentFormat::Yaml {
                return self.decode_yaml();
            }
        }

        serde_path_to_error::deserialize(Self::scalars_to_text(self.root.clone())).map_err(|e| {
            Error::schema(&self.origin, e.path().to_string(), e.inner().to_string())
        })
    }

    #[cfg(feature = "yaml")]
    fn decode_yaml<T: DeserializeOwned>(&self) -> Result<T, Error> {
        FAILED_PATH.with(|slot| *slot.borrow_mut() = None);

        YAML::from_str::<Tracked<T>>(&self.content)
            .map(|Tracked(value)| value)
            .map_err(|e| {
                let path = FAILED_PATH
                    .with(|slot| slot.borrow_mut().take())
                    .unwrap_or_else(|| ".".to_string());
                Error::schema(&self.origin, path, e.to_string())
            })
    }

    /// Renders every number and boolean leaf as a string.
    fn scalars_to_text(value: SJSON::Value) -> SJSON::Value {
        match value {
            SJSON::Value::Number(n) => SJSON::Value::String(n.to_string()),

            SJSON::Value::Bool(b) => SJSON::Value::String(b.to_string()),

            SJSON::Value::Array(arr) => {
                SJSON::Value::Array(arr.into_iter().map(Self::scalars_to_text).collect())
            }

            SJSON::Value::Object(map) => SJSON::Value::Object(
                map.into_iter()
                    .map(|(k, v)| (k, Self::scalars_to_text(v)))
                    .collect(),
            ),

            other @ (SJSON::Value::Null | SJSON::Value::String(_)) => other,
        }
    }

    // ========================================================================
    // Parse diagnostics
    // ========================================================================

    /// Converts a byte offset to a [`SourceSpan`] with a reasonable length.
    fn offset_to_span(offset: usize, content: &str) -> SourceSpan {
        let offset = offset.min(content.len());
        let remaining = content.get(offset..).unwrap_or_default();
        let len = remaining
            .find(|c: char| c.is_whitespace() || (c == ',') || (c == '}') || (c == ']'))
            .unwrap_or_else(|| remaining.len().min(20))
            .max(1);

        SourceSpan::new(offset.into(), len)
    }

    /// Convert line/column (1-indexed) to byte offset.
    ///
    /// Line lengths include their own terminator, so `\r\n` documents do
    /// not drift.
    fn line_col_to_offset(content: &str, line: usize, col: usize) -> usize {
        let mut offset = 0;

        for (i, l) in content.split_inclusive('\n').enumerate() {
            if (i + 1) == line {
                return offset + col.saturating_sub(1);
            }

            offset += l.len();
        }

        offset
    }

    fn json_parse_error(e: &SJSON::Error, content: &str, origin: &str) -> Error {
        let offset = Self::line_col_to_offset(content, e.line(), e.column());

        Error::Parse {
            format: "JSON",
            origin: origin.to_string(),
            src: NamedSource::new(origin, content.to_string()),
            span: Self::offset_to_span(offset, content),
            message: e.to_string(),
            help: "check for missing commas, quotes, or brackets".to_string(),
        }
    }

    #[cfg(feature = "toml")]
    fn toml_parse_error(e: &TOML::de::Error, content: &str, origin: &str) -> Error {
        if let Some(span) = e.span() {
            Error::Parse {
                format: "TOML",
                origin: origin.to_string(),
                src: NamedSource::new(origin, content.to_string()),
                span: SourceSpan::new(span.start.into(), span.end - span.start),
                message: e.message().to_string(),
                help: "check for missing quotes, invalid values, or syntax errors".to_string(),
            }
        } else {
            Error::ParseNoSpan {
                format: "TOML",
                message: e.to_string(),
                help: "check for missing quotes, invalid values, or syntax errors".to_string(),
            }
        }
    }

    #[cfg(feature = "yaml")]
    fn yaml_parse_error(e: &YAML::Error, content: &str, origin: &str) -> Error {
        let msg = e.to_string();

        if let Some((line, col)) = Self::extract_yaml_location(&msg) {
            let offset = Self::line_col_to_offset(content, line, col);

            Error::Parse {
                format: "YAML",
                origin: origin.to_string(),
                src: NamedSource::new(origin, content.to_string()),
                span: Self::offset_to_span(offset, content),
                message: msg,
                help: "check indentation and ensure proper YAML syntax".to_string(),
            }
        } else {
            Error::ParseNoSpan {
                format: "YAML",
                message: msg,
                help: "check indentation and ensure proper YAML syntax".to_string(),
            }
        }
    }

    /// Try to extract line/column from a YAML error message.
    #[cfg(feature = "yaml")]
    fn extract_yaml_location(msg: &str) -> Option<(usize, usize)> {
        let line_idx = msg.find("line ")?;
        let after_line = &msg[(line_idx + 5)..];
        let line_end = after_line.find(|c: char| !c.is_ascii_digit())?;
        let line = after_line[..line_end].parse::<usize>().ok()?;

        let col_idx = after_line.find("column ")?;
        let after_col = &after_line[(col_idx + 7)..];
        let col_end = after_col
            .find(|c: char| !c.is_ascii_digit())
            .unwrap_or(after_col.len());
        let col = after_col[..col_end].parse::<usize>().ok()?;

        Some((line, col))
    }

    /// Convert a TOML value to a JSON value.
    #[cfg(feature = "toml")]
    fn toml_to_json(toml: TOML::Value) -> SJSON::Value {
        match toml {
            TOML::Value::String(s) => SJSON::Value::String(s),

            TOML::Value::Integer(i) => SJSON::Value::Number(i.into()),

            TOML::Value::Float(f) => {
                SJSON::Number::from_f64(f).map_or(SJSON::Value::Null, SJSON::Value::Number)
            }

            TOML::Value::Boolean(b) => SJSON::Value::Bool(b),

            TOML::Value::Datetime(dt) => SJSON::Value::String(dt.to_string()),

            TOML::Value::Array(arr) => {
                SJSON::Value::Array(arr.into_iter().map(Self::toml_to_json).collect())
            }

            TOML::Value::Table(table) => SJSON::Value::Object(
                table
                    .into_iter()
                    .map(|(k, v)| (k, Self::toml_to_json(v)))
                    .collect(),
            ),
        }
    }
}

/// Path of the last failed YAML decode on this thread.
#[cfg(feature = "yaml")]
thread_local! {
    static FAILED_PATH: RefCell<Option<String>> = const { RefCell::new(None) };
}

/// Tracks the path while serde-saphyr drives the decode. The YAML
/// deserializer is not public, so the path leaves through `FAILED_PATH`.
#[cfg(feature = "yaml")]
struct Tracked<T>(T);

#[cfg(feature = "yaml")]
impl<'de, T: Deserialize<'de>> Deserialize<'de> for Tracked<T> {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        serde_path_to_error::deserialize(deserializer)
            .map(Self)
            .map_err(|e| {
                let path = e.path().to_string();
                FAILED_PATH.with(|slot| *slot.borrow_mut() = Some(path));
                e.into_inner()
            })
    }
}

/// Deserializes a scalar leaf as its text, `null` as `None`.
///
/// Mappings and sequences are rejected: every configuration value is a
/// single scalar.
pub(crate) fn deserialize_scalar<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Option::<String>::deserialize(deserializer)
}
