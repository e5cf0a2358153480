#![no_main]

use libfuzzer_sys::fuzz_target;
use testlens::record::RawExecutionResult;
use testlens::store::{MetricStore, WindowSelector};

fuzz_target!(|data: &[u8]| {
    if let Ok(input) = std::str::from_utf8(data) {
        // Malformed results must be rejected, never panic
        if let Ok(results) = serde_json::from_str::<Vec<RawExecutionResult>>(input) {
            let store = MetricStore::new();
            if let Ok(range) = store.ingest(&results) {
                let window = store.window(&WindowSelector::Sequences(range.clone()));
                assert_eq!(window.len() as u64, range.end - range.start);
            } else {
                assert!(store.is_empty());
            }
        }
    }
});
