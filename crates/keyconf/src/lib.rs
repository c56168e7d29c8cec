//! # keyconf
//!
//! A schema-driven, typed configuration store.
//!
//! A schema document declares every configuration key with its type, its
//! default and the source that owns it. `keyconf` loads the values for each
//! key from that source (a values document or the environment), converts
//! them once, and hands out shared, concurrently readable cells that can be
//! updated at runtime and notify watchers.
//!
//! ## Quick Start
//!
//! ```yaml
//! # keys.yaml
//! configs:
//!   port:     { type: int,      default: 8080,  source: yaml }
//!   timeout:  { type: duration, default: 30s,   source: yaml }
//!   api_key:  { type: string,   default: "",    source: env }
//!
//! # values.yaml
//! values:
//!   port: 9090
//! ```
//!
//! ```rust,ignore
//! use keyconf::{Registry, watch_fn};
//!
//! fn main() -> miette::Result<()> {
//!     let registry = Registry::builder()
//!         .schema_file("keys.yaml")
//!         .values_file("values.yaml")
//!         .env_prefix("APP_")
//!         .build()?;
//!
//!     let port = registry.value("port").as_int();        // 9090
//!     let api_key = registry.value("api_key").as_string(); // $APP_API_KEY or ""
//!
//!     registry.watch("timeout", [watch_fn(|old, new| {
//!         tracing::info!(from = ?old.as_duration(), to = ?new.as_duration(), "timeout changed");
//!         Ok(())
//!     })]);
//!     Ok(())
//! }
//! ```
//!
//! ## Value Types
//!
//! | Tag | Rust type | Example |
//! |-----|-----------|---------|
//! | `string` | `String` | `hello` |
//! | `int` | `i64` | `-42` |
//! | `float` | `f64` | `1.5` |
//! | `bool` | `bool` | `true`, `F`, `1` |
//! | `duration` | [`std::time::Duration`] | `1h30m`, `300ms` |
//! | `int_map` | `HashMap<String, i64>` | `a:1,b:2` |
//!
//! ## Failure Handling
//!
//! Accessors never fail. A missing key, a value that did not convert, or a
//! type mismatch logs through [`tracing`] and yields the zero value of the
//! requested type. Only unreadable or malformed documents fail
//! [`RegistryBuilder::build`], unless strict mode is enabled:
//!
//! ```rust,ignore
//! match Registry::builder().schema_file("keys.yaml").strict(true).build() {
//!     Ok(registry) => { /* use registry */ }
//!     Err(e) => eprintln!("{:?}", miette::Report::from(e)),
//! }
//! ```
//!
//! ## Feature Flags
//!
//! | Feature | Description | Default |
//! |---------|-------------|---------|
//! | `yaml` | YAML documents | **Yes** |
//! | `dotenv` | `.env` fallback for environment keys | **Yes** |
//! | `toml` | TOML documents | No |
//! | `full` | Enable all features | No |
//!
//! JSON documents are always supported.

#![deny(missing_docs)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]

// ============================================================================
// Re-exported Dependencies
// ============================================================================

/// Re-export miette for error handling.
/// Users can use `keyconf::miette` instead of adding miette as a dependency.
pub use miette;

/// Re-export `serde_json`, whose values back parsed documents.
pub use serde_json;

#[cfg(feature = "toml")]
pub use toml;

#[cfg(feature = "yaml")]
pub use serde_saphyr as yaml;

#[cfg(feature = "dotenv")]
pub use dotenvy;

// ============================================================================
// Modules
// ============================================================================

mod cell;
mod document;
mod error;
mod registry;
mod source;
mod value;

pub mod convert;
pub mod provider;
pub mod schema;

pub use cell::{TypedValue, ValueRef, WatchFn, watch_fn};
pub use convert::ConversionError;
pub use document::{Document, DocumentFormat};
pub use error::{CallbackError, Error};
pub use provider::Provider;
pub use registry::{Registry, RegistryBuilder, global, value, watch};
pub use schema::{KeySpec, Schema};
pub use source::{Origin, SourceKind};
pub use value::{ConfigValue, ValueType};
