#![no_main]

use libfuzzer_sys::fuzz_target;
use tamper_guard::parse_module_paths;

fuzz_target!(|data: &[u8]| {
    if let Ok(maps) = std::str::from_utf8(data) {
        let _ = parse_module_paths(maps);
    }
});
