#![allow(dead_code)]

pub mod mock_asr;
pub mod mock_backend;
pub mod mock_tts;

use jarvis::config::Config;

/// Config with timers long enough that paused-clock tests never trip them by accident
pub fn quiet_config() -> Config {
    Config {
        command_timeout_secs: 600,
        silence_timeout_ms: 600_000,
        capture_restart_ms: 1000,
        capture_end_restart_ms: 500,
        ..Config::default()
    }
}
