//! Speaking replies aloud.
//!
//! * [`SpeechSink`]: trait the turn controller drives.
//! * [`CommandSpeechSink`]: `espeak-ng` subprocess backend.
//! * [`rank_voices`] / [`parse_voice_table`]: build the voice picker list.

pub mod espeak;
pub mod voices;

use thiserror::Error;

use crate::config::PlaybackConfig;
use crate::turn::PlaybackReporter;

pub use espeak::CommandSpeechSink;
pub use voices::{parse_voice_table, rank_voices, VoiceOption};

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

#[derive(Debug, Error)]
pub enum PlaybackError {
    #[error("failed to launch {program}: {reason}")]
    Spawn { program: String, reason: String },

    #[error("speech output unavailable: {0}")]
    Unavailable(String),
}

/// Rate, pitch and volume multipliers; 1.0 is the engine's normal.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct VoiceSettings {
    pub rate: f32,
    pub pitch: f32,
    pub volume: f32,
}

impl Default for VoiceSettings {
    fn default() -> Self {
        Self {
            rate: 1.0,
            pitch: 1.0,
            volume: 1.0,
        }
    }
}

impl VoiceSettings {
    pub fn from_config(config: &PlaybackConfig) -> Self {
        Self {
            rate: config.rate,
            pitch: config.pitch,
            volume: config.volume,
        }
    }
}

/// One piece of text to speak.
#[derive(Debug, Clone, PartialEq)]
pub struct Utterance {
    pub text: String,
    /// [`VoiceOption::id`] to use; `None` or an unknown id means the
    /// engine's default voice.
    pub voice: Option<String>,
    pub settings: VoiceSettings,
}

// ---------------------------------------------------------------------------
// SpeechSink trait
// ---------------------------------------------------------------------------

/// Text-to-speech output driven by the turn controller.
///
/// * `speak` begins one utterance and returns immediately; progress goes to
///   `reporter` (`started`, then `ended` or `failed`).
/// * `cancel` silences whatever is playing and is a no-op otherwise.  A
///   cancelled utterance must not report `ended` as if it finished, though
///   stray reports are tolerated.
pub trait SpeechSink: Send {
    /// Voices offered to the user, best first.
    fn voices(&self) -> Vec<VoiceOption>;

    fn speak(&mut self, utterance: Utterance, reporter: PlaybackReporter)
        -> Result<(), PlaybackError>;

    fn cancel(&mut self);
}
