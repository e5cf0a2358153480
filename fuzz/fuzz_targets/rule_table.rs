#![no_main]

use libfuzzer_sys::fuzz_target;
use testlens::recommendation::RuleSet;

fuzz_target!(|data: &[u8]| {
    if let Ok(input) = std::str::from_utf8(data) {
        // Arbitrary TOML must either load or produce an error
        let _ = RuleSet::from_toml_str(input);
    }
});
