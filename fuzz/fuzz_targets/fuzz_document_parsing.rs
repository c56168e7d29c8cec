#![no_main]

use libfuzzer_sys::fuzz_target;
use keyconf::{Document, DocumentFormat, Schema};

fuzz_target!(|data: &str| {
    // === Every format either parses or reports an error, never panics ===
    for format in [DocumentFormat::Json, DocumentFormat::Yaml, DocumentFormat::Toml] {
        let Ok(doc) = Document::parse_str(data, format) else {
            continue;
        };

        // === Schema decoding tolerates any parsed tree ===
        if let Ok(schema) = Schema::from_document(&doc) {
            assert!(schema.document().len() + schema.environment().len() == schema.len());
        }
    }
});
