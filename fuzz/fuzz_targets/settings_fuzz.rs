//! Fuzz test for TOML cache settings
//!
//! Parsing and validating arbitrary settings files must never panic.
//!
//! Run with: cargo +nightly fuzz run settings_fuzz -- -max_total_time=60

#![no_main]

use cachet_core::CacheSettings;
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    if let Ok(input) = std::str::from_utf8(data) {
        if let Ok(settings) = CacheSettings::from_toml_str(input) {
            // Validation reports problems as errors, never by panicking.
            let _ = settings.validate();
        }
    }
});
