//! File-based schema and values documents across formats.
//!
//! Each test writes into its own temporary directory.

#![allow(clippy::pedantic)]

use std::fs;
use std::path::{Path, PathBuf};

use keyconf::{Error, Origin, Registry};
#[cfg(feature = "dotenv")]
use serial_test::serial;
use tempfile::{TempDir, tempdir};

const SCHEMA_JSON: &str = r#"{
    "configs": {
        "listen": {"type": "string", "default": "0.0.0.0:80", "source": "yaml"},
        "grace": {"type": "duration", "default": "5s", "source": "yaml"},
        "kcfile_secret": {"type": "string", "default": "", "source": "env"}
    }
}"#;

fn write(dir: &TempDir, name: &str, content: &str) -> PathBuf {
    let path = dir.path().join(name);
    fs::write(&path, content).expect("Failed to write test file");
    path
}

#[cfg(feature = "dotenv")]
fn cleanup_env(vars: &[&str]) {
    unsafe {
        for k in vars {
            std::env::remove_var(*k);
        }
    }
}

// ============================================================================
// JSON
// ============================================================================

#[test]
fn test_json_files() {
    let dir = tempdir().unwrap();
    let schema = write(&dir, "keys.json", SCHEMA_JSON);
    let values = write(
        &dir,
        "values.json",
        r#"{"values": {"listen": "127.0.0.1:8080", "grace": "1m30s"}}"#,
    );

    let registry = Registry::builder()
        .schema_file(&schema)
        .values_file(&values)
        .build()
        .unwrap();

    assert_eq!(registry.value("listen").as_string(), "127.0.0.1:8080");
    assert_eq!(registry.value("grace").as_duration().as_secs(), 90);
    assert_eq!(
        registry.value("listen").cell().unwrap().origin(),
        &Origin::Document(values.display().to_string())
    );
}

#[test]
fn test_json_syntax_error_has_span() {
    let dir = tempdir().unwrap();
    let schema = write(&dir, "keys.json", "{\n  \"configs\": {\n    \"a\": \n}");

    let err = Registry::builder().schema_file(&schema).build().unwrap_err();
    match err {
        Error::Parse {
            format,
            origin,
            span,
            ..
        } => {
            assert_eq!(format, "JSON");
            assert_eq!(origin, schema.display().to_string());
            assert!(span.offset() > 0);
        }
        other => panic!("expected Parse error, got {other:?}"),
    }
}

// ============================================================================
// YAML
// ============================================================================

#[cfg(feature = "yaml")]
#[test]
fn test_yaml_files_with_yml_extension() {
    let dir = tempdir().unwrap();
    let schema = write(
        &dir,
        "keys.yml",
        "configs:\n  retries:\n    type: int\n    default: 3\n    source: yaml\n",
    );
    let values = write(&dir, "values.yaml", "values:\n  retries: 7\n");

    let registry = Registry::builder()
        .schema_file(&schema)
        .values_file(&values)
        .build()
        .unwrap();

    assert_eq!(registry.value("retries").as_int(), 7);
}

#[cfg(feature = "yaml")]
#[test]
fn test_yaml_wrong_shape_names_path() {
    let dir = tempdir().unwrap();
    let schema = write(
        &dir,
        "keys.yaml",
        "configs:\n  retries:\n    type: [int]\n    source: yaml\n",
    );

    let err = Registry::builder().schema_file(&schema).build().unwrap_err();
    match err {
        Error::Schema { path, .. } => assert_eq!(path, "configs.retries.type"),
        other => panic!("expected Schema error, got {other:?}"),
    }
}

// ============================================================================
// TOML
// ============================================================================

#[cfg(feature = "toml")]
#[test]
fn test_toml_files() {
    let dir = tempdir().unwrap();
    let schema = write(
        &dir,
        "keys.toml",
        r#"
[configs.ratio]
type = "float"
default = 0.5
source = "yaml"

[configs.limits]
type = "int_map"
default = "a:1"
source = "yaml"
"#,
    );
    let values = write(
        &dir,
        "values.toml",
        "[values]\nratio = 0.75\nlimits = \"a:10,b:20\"\n",
    );

    let registry = Registry::builder()
        .schema_file(&schema)
        .values_file(&values)
        .build()
        .unwrap();

    assert_eq!(registry.value("ratio").as_float(), 0.75);
    assert_eq!(registry.value("limits").as_int_map()["b"], 20);
}

// ============================================================================
// File Errors
// ============================================================================

#[test]
fn test_missing_schema_file() {
    let err = Registry::builder()
        .schema_file(Path::new("/nonexistent/keyconf/keys.json"))
        .build()
        .unwrap_err();
    assert!(matches!(err, Error::NotFound { .. }));
}

#[test]
fn test_missing_values_file() {
    let dir = tempdir().unwrap();
    let schema = write(&dir, "keys.json", SCHEMA_JSON);

    let err = Registry::builder()
        .schema_file(&schema)
        .values_file(dir.path().join("values.json"))
        .build()
        .unwrap_err();
    assert!(matches!(err, Error::NotFound { .. }));
}

#[test]
fn test_unknown_extension() {
    let dir = tempdir().unwrap();
    let schema = write(&dir, "keys.ini", "[configs]");

    let err = Registry::builder().schema_file(&schema).build().unwrap_err();
    match err {
        Error::UnknownFormat { extension } => assert_eq!(extension, "ini"),
        other => panic!("expected UnknownFormat error, got {other:?}"),
    }
}

// ============================================================================
// Dotenv
// ============================================================================

#[cfg(feature = "dotenv")]
#[test]
#[serial]
fn test_dotenv_file_fallback() {
    cleanup_env(&["KCFILE_SECRET"]);

    let dir = tempdir().unwrap();
    let schema = write(&dir, "keys.json", SCHEMA_JSON);
    let dotenv = write(&dir, ".env", "# local overrides\nKCFILE_SECRET=\"hunter2\"\n");

    let registry = Registry::builder()
        .schema_file(&schema)
        .dotenv_file(&dotenv)
        .build()
        .unwrap();

    let secret = registry.value("kcfile_secret");
    assert_eq!(secret.as_string(), "hunter2");
    assert_eq!(secret.cell().unwrap().origin(), &Origin::Dotenv(dotenv));
    assert!(std::env::var("KCFILE_SECRET").is_err());
}

#[cfg(feature = "dotenv")]
#[test]
#[serial]
fn test_process_env_beats_dotenv() {
    unsafe {
        std::env::set_var("KCFILE_SECRET", "from-env");
    }

    let dir = tempdir().unwrap();
    let schema = write(&dir, "keys.json", SCHEMA_JSON);
    let dotenv = write(&dir, ".env", "KCFILE_SECRET=from-file\n");

    let registry = Registry::builder()
        .schema_file(&schema)
        .dotenv_file(&dotenv)
        .build()
        .unwrap();
    assert_eq!(registry.value("kcfile_secret").as_string(), "from-env");

    cleanup_env(&["KCFILE_SECRET"]);
}

#[cfg(feature = "dotenv")]
#[test]
fn test_missing_dotenv_file() {
    let dir = tempdir().unwrap();
    let schema = write(&dir, "keys.json", SCHEMA_JSON);

    let err = Registry::builder()
        .schema_file(&schema)
        .dotenv_file(dir.path().join(".env.missing"))
        .build()
        .unwrap_err();
    assert!(matches!(err, Error::Dotenv { .. }));
}
