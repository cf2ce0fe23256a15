#![no_main]

use libfuzzer_sys::fuzz_target;
use smtp::Command;

fuzz_target!(|data: &str| {
    let _ = Command::parse(data);
});
