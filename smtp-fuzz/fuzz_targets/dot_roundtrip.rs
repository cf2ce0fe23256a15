#![no_main]

use libfuzzer_sys::fuzz_target;
use smtp::codec::DotReader;

fuzz_target!(|data: &[u8]| {
    let mut reader = DotReader::new();
    let mut out = Vec::new();
    let _ = reader.feed(data, &mut out);
});
