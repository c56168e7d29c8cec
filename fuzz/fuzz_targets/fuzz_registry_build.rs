#![no_main]

use arbitrary::Arbitrary;
use libfuzzer_sys::fuzz_target;
use keyconf::{DocumentFormat, Registry};

#[derive(Arbitrary, Debug)]
struct Input<'a> {
    schema: &'a str,
    values: &'a str,
    strict: bool,
    key: &'a str,
}

fuzz_target!(|input: Input<'_>| {
    let Ok(registry) = Registry::builder()
        .schema_str(input.schema, DocumentFormat::Yaml)
        .values_str(input.values, DocumentFormat::Yaml)
        .strict(input.strict)
        .build()
    else {
        return;
    };

    // === Lookups and accessors never panic ===
    let value = registry.value(input.key);
    let _ = value.as_string();
    let _ = value.as_int();
    let _ = value.as_int_map();
    if value.is_some() {
        assert!(registry.contains(input.key));
    }

    for key in registry.keys() {
        assert!(registry.source_of(key).is_some());
    }
});
