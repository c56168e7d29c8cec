#![no_main]

use arbitrary::Arbitrary;
use libfuzzer_sys::fuzz_target;
use keyconf::convert::try_convert;
use keyconf::{TypedValue, ValueType};

#[derive(Arbitrary, Debug)]
struct Input<'a> {
    raw: &'a str,
    tag: &'a str,
    update: &'a str,
}

fuzz_target!(|input: Input<'_>| {
    let value_type: ValueType = input.tag.parse().unwrap();

    // === Conversion never panics and keeps the requested type ===
    let Ok(value) = try_convert(input.raw, &value_type) else {
        return;
    };
    assert_eq!(value.value_type(), value_type);

    // === Display never panics ===
    let rendered = value.to_string();

    // === Int maps render back into parseable text ===
    if value_type == ValueType::IntMap {
        assert_eq!(try_convert(&rendered, &value_type).unwrap(), value);
    }

    // === Cell updates from text keep the declared type ===
    let cell = TypedValue::new(value, "fuzz");
    let before = cell.epoch();
    let applied = cell.update_from_str(input.update);
    assert_eq!(cell.value_type(), value_type);
    assert_eq!(cell.has_changed_since(before), applied);
});
