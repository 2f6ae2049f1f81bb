//! Cross-platform application paths using the `dirs` crate.
//!
//! Config dir (`settings.toml`):
//!   Windows: %APPDATA%\doc-voice-agent\
//!   macOS:   ~/Library/Application Support/doc-voice-agent/
//!   Linux:   ~/.config/doc-voice-agent/
//!
//! Data dir (whisper models):
//!   Windows: %LOCALAPPDATA%\doc-voice-agent\models\
//!   macOS:   ~/Library/Application Support/doc-voice-agent/models/
//!   Linux:   ~/.local/share/doc-voice-agent/models/

use std::path::PathBuf;

/// Resolved application directory/file paths.
#[derive(Debug, Clone)]
pub struct AppPaths {
    pub config_dir: PathBuf,
    pub settings_file: PathBuf,
    /// Directory holding whisper GGML model files.
    pub models_dir: PathBuf,
}

impl AppPaths {
    const APP_NAME: &'static str = "doc-voice-agent";

    /// Resolve all paths, falling back to the current directory when the
    /// platform has no standard location.
    pub fn new() -> Self {
        let config_dir = dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(Self::APP_NAME);

        let models_dir = dirs::data_local_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(Self::APP_NAME)
            .join("models");

        Self {
            settings_file: config_dir.join("settings.toml"),
            config_dir,
            models_dir,
        }
    }
}

impl Default for AppPaths {
    fn default() -> Self {
        Self::new()
    }
}
