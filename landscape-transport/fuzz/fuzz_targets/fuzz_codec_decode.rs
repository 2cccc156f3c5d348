#![no_main]

use landscape_transport::wire;
use libfuzzer_sys::fuzz_target;

// Arbitrary, possibly malformed bytes must never panic the decoder --
// only ever return a structured `WireError` (spec §7, "Protocol" errors).
fuzz_target!(|data: &[u8]| {
    let _ = wire::decode(data);
});
