#![no_main]

use libfuzzer_sys::fuzz_target;
use tamper_guard::parse_tracer_pid;

fuzz_target!(|data: &[u8]| {
    if let Ok(status) = std::str::from_utf8(data) {
        let _ = parse_tracer_pid(status);
    }
});
