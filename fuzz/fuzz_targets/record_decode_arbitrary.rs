#![no_main]
use libfuzzer_sys::fuzz_target;

use geostream::RecordDecoder;

// Arbitrary bytes must decode to Ok or a typed error, never a panic, an
// abort, or an unbounded allocation.
fuzz_target!(|data: &[u8]| {
    let mut decoder = RecordDecoder::new();
    let _ = decoder.decode(data);
});
