//! `espeak-ng` subprocess speech output.
//!
//! Each utterance runs one child process fed through stdin.  The child is
//! owned by a tokio task; cancelling aborts the task, and `kill_on_drop`
//! takes the process down with it.

use std::process::Stdio;

use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tokio::task::JoinHandle;

use crate::config::PlaybackConfig;
use crate::turn::PlaybackReporter;

use super::voices::{parse_voice_table, rank_voices, VoiceOption};
use super::{PlaybackError, SpeechSink, Utterance, VoiceSettings};

/// espeak-ng's default speed in words per minute.
const BASE_WPM: f32 = 175.0;

pub struct CommandSpeechSink {
    program: String,
    voices: Vec<VoiceOption>,
    current: Option<JoinHandle<()>>,
}

impl CommandSpeechSink {
    /// Query `program --voices` and keep the ranked voices.  A missing
    /// program leaves the list empty; speaking will then fail per turn.
    pub fn discover(config: &PlaybackConfig) -> Self {
        let voices = match std::process::Command::new(&config.program)
            .arg("--voices")
            .output()
        {
            Ok(output) if output.status.success() => {
                let table = String::from_utf8_lossy(&output.stdout);
                rank_voices(
                    parse_voice_table(&table),
                    &config.voice_language,
                    config.max_voices,
                )
            }
            Ok(output) => {
                log::warn!("playback: {} --voices exited with {}", config.program, output.status);
                Vec::new()
            }
            Err(e) => {
                log::warn!("playback: cannot run {}: {e}", config.program);
                Vec::new()
            }
        };

        log::info!("playback: {} voices available via {}", voices.len(), config.program);
        Self::with_voices(config.program.clone(), voices)
    }

    pub fn with_voices(program: impl Into<String>, voices: Vec<VoiceOption>) -> Self {
        Self {
            program: program.into(),
            voices,
            current: None,
        }
    }

    fn args(&self, utterance: &Utterance) -> Vec<String> {
        let voice = utterance
            .voice
            .as_deref()
            .filter(|id| self.voices.iter().any(|v| v.id == *id));
        espeak_args(&utterance.settings, voice)
    }
}

/// Command-line flags for one utterance.  Text is read from stdin.
pub fn espeak_args(settings: &VoiceSettings, voice: Option<&str>) -> Vec<String> {
    let speed = (settings.rate * BASE_WPM).round().clamp(80.0, 450.0) as u32;
    let pitch = (settings.pitch * 50.0).round().clamp(0.0, 99.0) as u32;
    let amplitude = (settings.volume * 100.0).round().clamp(0.0, 200.0) as u32;

    let mut args = vec![
        "-s".to_string(),
        speed.to_string(),
        "-p".to_string(),
        pitch.to_string(),
        "-a".to_string(),
        amplitude.to_string(),
    ];
    if let Some(id) = voice {
        args.push("-v".to_string());
        args.push(id.to_string());
    }
    args.push("--stdin".to_string());
    args
}

impl SpeechSink for CommandSpeechSink {
    fn voices(&self) -> Vec<VoiceOption> {
        self.voices.clone()
    }

    fn speak(
        &mut self,
        utterance: Utterance,
        reporter: PlaybackReporter,
    ) -> Result<(), PlaybackError> {
        self.cancel();

        let mut child = Command::new(&self.program)
            .args(self.args(&utterance))
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| PlaybackError::Spawn {
                program: self.program.clone(),
                reason: e.to_string(),
            })?;

        let stdin = child.stdin.take();
        let program = self.program.clone();
        let text = utterance.text;

        reporter.started();
        self.current = Some(tokio::spawn(async move {
            if let Some(mut stdin) = stdin {
                if let Err(e) = stdin.write_all(text.as_bytes()).await {
                    log::debug!("playback: writing to {program} failed: {e}");
                }
            }

            match child.wait().await {
                Ok(status) if status.success() => {
                    reporter.ended();
                }
                Ok(status) => {
                    reporter.failed(format!("{program} exited with {status}"));
                }
                Err(e) => {
                    reporter.failed(e.to_string());
                }
            }
        }));

        Ok(())
    }

    fn cancel(&mut self) {
        if let Some(task) = self.current.take() {
            task.abort();
        }
    }
}

impl Drop for CommandSpeechSink {
    fn drop(&mut self) {
        self.cancel();
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
