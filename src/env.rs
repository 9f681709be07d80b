pub use std::env::*;
use std::{num::NonZero, sync::LazyLock};

use indexmap::IndexSet;

pub static MONOHOOK_LOG: LazyLock<log::LevelFilter> = LazyLock::new(|| {
    var_log_level("MONOHOOK_LOG")
        .or(var_log_level("MONOHOOK_LOG_LEVEL"))
        .unwrap_or(log::LevelFilter::Info)
});

pub static MONOHOOK_JOBS: LazyLock<NonZero<usize>> = LazyLock::new(|| {
    var("MONOHOOK_JOBS")
        .ok()
        .and_then(|v| v.trim().parse::<NonZero<usize>>().ok())
        .or_else(|| std::thread::available_parallelism().ok())
        .unwrap_or(NonZero::<usize>::MIN)
});

// Per-stream byte cap for captured step output
pub static MONOHOOK_OUTPUT_LIMIT: LazyLock<usize> = LazyLock::new(|| {
    var("MONOHOOK_OUTPUT_LIMIT")
        .ok()
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(1024 * 1024)
});

pub static MONOHOOK_JSON: LazyLock<bool> = LazyLock::new(|| var_true("MONOHOOK_JSON"));

pub static MONOHOOK_SKIP_STEPS: LazyLock<IndexSet<String>> = LazyLock::new(|| {
    var_csv("MONOHOOK_SKIP_STEPS")
        .or(var_csv("MONOHOOK_SKIP_STEP"))
        .unwrap_or_default()
});

fn var_csv(name: &str) -> Option<IndexSet<String>> {
    var(name)
        .map(|val| {
            val.split(',')
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect()
        })
        .ok()
}

fn var_log_level(name: &str) -> Option<log::LevelFilter> {
    var(name).ok().and_then(|level| level.parse().ok())
}

fn var_true(name: &str) -> bool {
    var(name)
        .map(|val| val.to_lowercase())
        .map(|val| val == "true" || val == "1")
        .unwrap_or(false)
}
