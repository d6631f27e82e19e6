#![no_main]
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &str| {
    // Whatever deserializes must come out of sanitize() with finite numbers only.
    if let Ok(state) = toml::from_str::<kegmon_config::PersistedState>(data) {
        let state = state.sanitize();
        if let Some(raw) = state.last_estimate_raw {
            assert!(raw.is_finite());
        }
        if let Some(stats) = &state.stats {
            assert!(stats.total_volume_l.is_finite());
        }
    }
});
