//! Application settings structs, defaults and TOML persistence.
//!
//! Every section implements `Serialize`, `Deserialize`, `Default` and
//! `Clone`.  Sections are `#[serde(default)]` so a hand-edited
//! `settings.toml` may omit any key.

use std::path::PathBuf;

use anyhow::Result;
use serde::{Deserialize, Serialize};

use super::AppPaths;

// ---------------------------------------------------------------------------
// LlmProvider
// ---------------------------------------------------------------------------

/// Which wire format the reply generator speaks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LlmProvider {
    /// Google Gemini `generateContent` REST API.
    Gemini,
    /// Any OpenAI-compatible `/v1/chat/completions` endpoint (OpenAI,
    /// Ollama, Groq, LM Studio …).
    OpenAiCompatible,
}

impl Default for LlmProvider {
    fn default() -> Self {
        Self::Gemini
    }
}

// ---------------------------------------------------------------------------
// LlmConfig
// ---------------------------------------------------------------------------

/// Settings for the hosted language model that answers each turn.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmConfig {
    /// Which backend to call.
    pub provider: LlmProvider,
    /// Base URL of the API endpoint, without a trailing path.
    ///
    /// - Gemini: `https://generativelanguage.googleapis.com`
    /// - Ollama: `http://localhost:11434`
    pub base_url: String,
    /// API key stored in the config file.  Takes precedence over
    /// `api_key_env`.
    pub api_key: Option<String>,
    /// Environment variable consulted when `api_key` is unset.
    pub api_key_env: String,
    /// Model identifier sent to the API.
    pub model: String,
    /// Sampling temperature.
    pub temperature: f32,
    /// Upper bound on generated tokens; replies are spoken, so keep it short.
    pub max_output_tokens: u32,
    /// Maximum seconds to wait for a reply.
    pub timeout_secs: u64,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            provider: LlmProvider::default(),
            base_url: "https://generativelanguage.googleapis.com".into(),
            api_key: None,
            api_key_env: "GEMINI_API_KEY".into(),
            model: "gemini-2.5-flash".into(),
            temperature: 0.7,
            max_output_tokens: 500,
            timeout_secs: 30,
        }
    }
}

impl LlmConfig {
    /// The API key to send, if any: the configured key when non-empty,
    /// otherwise the value of `api_key_env`.
    pub fn resolved_api_key(&self) -> Option<String> {
        self.api_key
            .as_deref()
            .filter(|k| !k.is_empty())
            .map(str::to_string)
            .or_else(|| {
                std::env::var(&self.api_key_env)
                    .ok()
                    .filter(|k| !k.is_empty())
            })
    }
}

// ---------------------------------------------------------------------------
// CaptureConfig
// ---------------------------------------------------------------------------

/// Settings for the continuous speech recognizer.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CaptureConfig {
    /// Whisper GGML model file stem under the models directory.
    pub model: String,
    /// Recognition locale as an ISO-639-1 code.
    pub language: String,
    /// RMS level above which a chunk counts as speech.
    pub vad_threshold: f32,
    /// Trailing silence that ends an utterance.
    pub end_silence_ms: u64,
    /// How often a partial transcription is produced while speaking.
    pub interim_interval_ms: u64,
    /// Give up when nothing was said for this long.
    pub no_speech_timeout_secs: u64,
    /// Hard cap on a single utterance.
    pub max_utterance_secs: u64,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            model: "ggml-base.en".into(),
            language: "en".into(),
            vad_threshold: 0.01,
            end_silence_ms: 900,
            interim_interval_ms: 1_200,
            no_speech_timeout_secs: 8,
            max_utterance_secs: 30,
        }
    }
}

// ---------------------------------------------------------------------------
// PlaybackConfig
// ---------------------------------------------------------------------------

/// Settings for speaking replies aloud.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PlaybackConfig {
    /// Speech synthesis program (must accept `espeak-ng` style flags).
    pub program: String,
    /// Only voices whose language tag starts with this prefix are offered.
    pub voice_language: String,
    /// Maximum number of voices offered in the picker.
    pub max_voices: usize,
    /// Speaking rate multiplier (1.0 = normal).
    pub rate: f32,
    /// Pitch multiplier (1.0 = normal).
    pub pitch: f32,
    /// Volume multiplier (1.0 = normal).
    pub volume: f32,
}

impl Default for PlaybackConfig {
    fn default() -> Self {
        Self {
            program: "espeak-ng".into(),
            voice_language: "en".into(),
            max_voices: 12,
            rate: 1.0,
            pitch: 1.0,
            volume: 1.0,
        }
    }
}

// ---------------------------------------------------------------------------
// SessionConfig
// ---------------------------------------------------------------------------

/// Context loaded when the app starts.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Persona (system instruction) shaping the assistant's replies.
    pub persona: String,
    /// Document to ingest on startup, if any.
    pub document_path: Option<PathBuf>,
}

// ---------------------------------------------------------------------------
// HotkeyConfig
// ---------------------------------------------------------------------------

/// Global hotkey bindings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HotkeyConfig {
    /// Starts a turn when idle, stops listening or speaking otherwise.
    pub talk_key: String,
    /// Toggles mute.
    pub mute_key: String,
}

impl Default for HotkeyConfig {
    fn default() -> Self {
        Self {
            talk_key: "F9".into(),
            mute_key: "F10".into(),
        }
    }
}

// ---------------------------------------------------------------------------
// UiConfig
// ---------------------------------------------------------------------------

/// Desktop window settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct UiConfig {
    /// Keep the window floating above all other windows.
    pub always_on_top: bool,
    /// Initial inner size `(width, height)` in logical pixels.
    pub window_size: (f32, f32),
}

impl Default for UiConfig {
    fn default() -> Self {
        Self {
            always_on_top: false,
            window_size: (520.0, 680.0),
        }
    }
}

// ---------------------------------------------------------------------------
// AppConfig  (top-level)
// ---------------------------------------------------------------------------

/// Top-level application configuration, serialised as `settings.toml`.
///
/// ```rust,no_run
/// use doc_voice_agent::config::AppConfig;
///
/// // Load (returns Default when file is missing)
/// let config = AppConfig::load().unwrap();
/// ```
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub llm: LlmConfig,
    pub capture: CaptureConfig,
    pub playback: PlaybackConfig,
    pub session: SessionConfig,
    pub hotkey: HotkeyConfig,
    pub ui: UiConfig,
}

impl AppConfig {
    /// Load configuration from the platform-appropriate `settings.toml`.
    ///
    /// Returns `Ok(AppConfig::default())` when the file does not exist yet.
    pub fn load() -> Result<Self> {
        Self::load_from(&AppPaths::new().settings_file)
    }

    /// Load from an explicit path.
    pub fn load_from(path: &std::path::Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path)?;
        let config: Self = toml::from_str(&content)?;
        Ok(config)
    }

    /// Save configuration to the platform-appropriate `settings.toml`,
    /// creating parent directories as needed.
    pub fn save(&self) -> Result<()> {
        self.save_to(&AppPaths::new().settings_file)
    }

    /// Save to an explicit path.
    pub fn save_to(&self, path: &std::path::Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Where the configured whisper model is expected on disk.
    pub fn whisper_model_path(&self) -> PathBuf {
        AppPaths::new()
            .models_dir
            .join(format!("{}.bin", self.capture.model))
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn load_missing_returns_default() {
        let dir = tempdir().expect("temp dir");
        let path = dir.path().join("nonexistent.toml");

        let config = AppConfig::load_from(&path).expect("should not error");

        assert_eq!(config.llm.provider, LlmProvider::Gemini);
        assert_eq!(config.capture.language, "en");
        assert_eq!(config.playback.program, "espeak-ng");
        assert!(config.session.document_path.is_none());
    }

    #[test]
    fn default_values() {
        let cfg = AppConfig::default();

        assert_eq!(cfg.llm.model, "gemini-2.5-flash");
        assert_eq!(cfg.llm.max_output_tokens, 500);
        assert!((cfg.llm.temperature - 0.7).abs() < f32::EPSILON);
        assert_eq!(cfg.llm.api_key_env, "GEMINI_API_KEY");
        assert_eq!(cfg.playback.max_voices, 12);
        assert!((cfg.playback.rate - 1.0).abs() < f32::EPSILON);
        assert_eq!(cfg.hotkey.talk_key, "F9");
        assert_eq!(cfg.hotkey.mute_key, "F10");
        assert!(cfg.session.persona.is_empty());
    }

    #[test]
    fn modified_values_survive_save_and_load() {
        let dir = tempdir().expect("temp dir");
        let path = dir.path().join("nested").join("settings.toml");

        let mut cfg = AppConfig::default();
        cfg.llm.provider = LlmProvider::OpenAiCompatible;
        cfg.llm.base_url = "http://localhost:11434".into();
        cfg.llm.api_key = Some("sk-test".into());
        cfg.capture.end_silence_ms = 1_500;
        cfg.session.persona = "You are a patient tutor.".into();
        cfg.session.document_path = Some(PathBuf::from("/tmp/notes.md"));
        cfg.hotkey.talk_key = "F8".into();

        cfg.save_to(&path).expect("save");
        let loaded = AppConfig::load_from(&path).expect("load");

        assert_eq!(loaded.llm.provider, LlmProvider::OpenAiCompatible);
        assert_eq!(loaded.llm.base_url, "http://localhost:11434");
        assert_eq!(loaded.llm.api_key.as_deref(), Some("sk-test"));
        assert_eq!(loaded.capture.end_silence_ms, 1_500);
        assert_eq!(loaded.session.persona, "You are a patient tutor.");
        assert_eq!(
            loaded.session.document_path,
            Some(PathBuf::from("/tmp/notes.md"))
        );
        assert_eq!(loaded.hotkey.talk_key, "F8");
    }

    #[test]
    fn partial_file_fills_missing_keys_with_defaults() {
        let dir = tempdir().expect("temp dir");
        let path = dir.path().join("settings.toml");
        std::fs::write(&path, "[session]\npersona = \"Be brief.\"\n").expect("write");

        let cfg = AppConfig::load_from(&path).expect("load");

        assert_eq!(cfg.session.persona, "Be brief.");
        assert_eq!(cfg.llm.model, "gemini-2.5-flash");
        assert_eq!(cfg.capture.model, "ggml-base.en");
    }

    #[test]
    fn configured_api_key_wins() {
        let cfg = LlmConfig {
            api_key: Some("from-file".into()),
            api_key_env: "DOC_VOICE_AGENT_TEST_UNSET_KEY".into(),
            ..LlmConfig::default()
        };
        assert_eq!(cfg.resolved_api_key().as_deref(), Some("from-file"));
    }

    #[test]
    fn empty_api_key_falls_back_to_env_lookup() {
        let cfg = LlmConfig {
            api_key: Some(String::new()),
            api_key_env: "DOC_VOICE_AGENT_TEST_UNSET_KEY".into(),
            ..LlmConfig::default()
        };
        assert!(cfg.resolved_api_key().is_none());
    }

    #[test]
    fn whisper_model_path_uses_model_stem() {
        let cfg = AppConfig::default();
        let path = cfg.whisper_model_path();
        assert!(path.ends_with("models/ggml-base.en.bin"));
    }
}
