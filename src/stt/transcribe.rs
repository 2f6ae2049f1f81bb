//! Inference settings and transcript post-processing.

use crate::config::CaptureConfig;

/// Settings for one Whisper inference run.
///
/// ```
/// use doc_voice_agent::stt::TranscribeParams;
///
/// let params = TranscribeParams {
///     language: "de".into(),
///     ..TranscribeParams::default()
/// };
/// assert_eq!(params.best_of, 1);
/// ```
#[derive(Debug, Clone)]
pub struct TranscribeParams {
    /// ISO-639-1 code, or `"auto"` for detection.
    pub language: String,
    /// Greedy candidates per step.  1 keeps interims fast.
    pub best_of: i32,
    pub n_threads: i32,
}

impl Default for TranscribeParams {
    fn default() -> Self {
        Self {
            language: "en".into(),
            best_of: 1,
            n_threads: optimal_threads(),
        }
    }
}

impl TranscribeParams {
    pub fn from_config(config: &CaptureConfig) -> Self {
        Self {
            language: config.language.clone(),
            ..Self::default()
        }
    }
}

/// Physical parallelism capped at 8; Whisper gains little beyond that.
pub(crate) fn optimal_threads() -> i32 {
    std::thread::available_parallelism()
        .map(|n| n.get().min(8) as i32)
        .unwrap_or(4)
}

/// Strip Whisper's non-speech annotations (`[BLANK_AUDIO]`, `(music)`, …)
/// and collapse whitespace.
pub fn clean_transcript(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    let mut depth = 0usize;
    for c in raw.chars() {
        match c {
            '[' | '(' => depth += 1,
            ']' | ')' if depth > 0 => depth -= 1,
            _ if depth == 0 => out.push(c),
            _ => {}
        }
    }
    out.split_whitespace().collect::<Vec<_>>().join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn removes_annotations() {
        assert_eq!(clean_transcript(" [BLANK_AUDIO] "), "");
        assert_eq!(clean_transcript(" Hello (coughs) there."), "Hello there.");
        assert_eq!(clean_transcript("[Music] Hi [inaudible]"), "Hi");
    }

    #[test]
    fn keeps_plain_speech() {
        assert_eq!(clean_transcript("  What time   is it? "), "What time is it?");
    }

    #[test]
    fn params_follow_capture_language() {
        let config = CaptureConfig {
            language: "fr".into(),
            ..CaptureConfig::default()
        };
        let params = TranscribeParams::from_config(&config);
        assert_eq!(params.language, "fr");
        assert!(params.n_threads >= 1 && params.n_threads <= 8);
    }
}
