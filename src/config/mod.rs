//! Configuration module.
//!
//! Provides `AppConfig` (top-level settings), one sub-config per subsystem,
//! `AppPaths` for platform directories, and TOML persistence via
//! `AppConfig::load` / `AppConfig::save`.

pub mod paths;
pub mod settings;

pub use paths::AppPaths;
pub use settings::{
    AppConfig, CaptureConfig, HotkeyConfig, LlmConfig, LlmProvider, PlaybackConfig,
    SessionConfig, UiConfig,
};
