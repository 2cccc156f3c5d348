#![no_main]

use landscape_schema::Value;
use landscape_transport::wire;
use libfuzzer_sys::fuzz_target;

// Every value the codec can encode must decode back to itself (DESIGN.md,
// "Serialization format"): this is the round-trip half of the fuzz target
// the design notes call for.
fuzz_target!(|value: Value| {
    let encoded = wire::encode(&value);
    let decoded = wire::decode(&encoded).expect("a freshly encoded value must decode");
    assert_eq!(decoded, value);
});
