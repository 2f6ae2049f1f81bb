//! `SttEngine` trait and the whisper.cpp implementation.
//!
//! [`WhisperEngine`] keeps one loaded `WhisperContext` and creates a fresh
//! `WhisperState` per call, so it can be shared behind `Arc<dyn SttEngine>`
//! without locking.

use std::path::Path;

use thiserror::Error;
use whisper_rs::{FullParams, SamplingStrategy, WhisperContext, WhisperContextParameters};

use super::transcribe::{clean_transcript, TranscribeParams};

// ---------------------------------------------------------------------------
// SttError
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Error)]
pub enum SttError {
    #[error("model not found: {0}")]
    ModelNotFound(String),

    /// whisper-rs failed to create a context or per-call state.
    #[error("whisper initialisation failed: {0}")]
    ContextInit(String),

    #[error("transcription failed: {0}")]
    Transcription(String),

    #[error("utterance too long ({0} samples)")]
    AudioTooLong(usize),
}

// ---------------------------------------------------------------------------
// SttEngine trait
// ---------------------------------------------------------------------------

/// Speech-to-text over 16 kHz mono `f32` samples.
///
/// Returns cleaned text; an empty string means nothing intelligible was
/// said.
pub trait SttEngine: Send + Sync {
    fn transcribe(&self, audio: &[f32]) -> Result<String, SttError>;
}

/// Whisper works on 30 s windows; shorter clips are zero-padded to this
/// minimum so a single short word still decodes.
const MIN_SAMPLES: usize = 16_000;
/// 60 s at 16 kHz.
const MAX_SAMPLES: usize = 960_000;

// ---------------------------------------------------------------------------
// WhisperEngine
// ---------------------------------------------------------------------------

pub struct WhisperEngine {
    ctx: WhisperContext,
    params: TranscribeParams,
}

impl std::fmt::Debug for WhisperEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WhisperEngine")
            .field("params", &self.params)
            .finish_non_exhaustive()
    }
}

impl WhisperEngine {
    /// Load a GGML model file.
    pub fn load(model_path: impl AsRef<Path>, params: TranscribeParams) -> Result<Self, SttError> {
        let path = model_path.as_ref();
        if !path.exists() {
            return Err(SttError::ModelNotFound(path.display().to_string()));
        }
        let path_str = path.to_str().ok_or_else(|| {
            SttError::ModelNotFound(format!("non-UTF-8 model path: {}", path.display()))
        })?;

        let ctx = WhisperContext::new_with_params(path_str, WhisperContextParameters::default())
            .map_err(|e| SttError::ContextInit(e.to_string()))?;

        log::info!("stt: loaded {} ({:?})", path.display(), params.language);
        Ok(Self { ctx, params })
    }

    fn full_params(&self) -> FullParams<'_, '_> {
        let mut fp = FullParams::new(SamplingStrategy::Greedy {
            best_of: self.params.best_of,
        });
        let language = match self.params.language.as_str() {
            "auto" => None,
            code => Some(code),
        };
        fp.set_language(language);
        fp.set_n_threads(self.params.n_threads);
        fp.set_no_context(true);
        fp.set_print_progress(false);
        fp.set_print_realtime(false);
        fp.set_print_special(false);
        fp
    }
}

impl SttEngine for WhisperEngine {
    fn transcribe(&self, audio: &[f32]) -> Result<String, SttError> {
        if audio.len() > MAX_SAMPLES {
            return Err(SttError::AudioTooLong(audio.len()));
        }
        let padded;
        let audio = if audio.len() < MIN_SAMPLES {
            padded = pad_to(audio, MIN_SAMPLES);
            padded.as_slice()
        } else {
            audio
        };

        let mut state = self
            .ctx
            .create_state()
            .map_err(|e| SttError::ContextInit(e.to_string()))?;

        let started = std::time::Instant::now();
        state
            .full(self.full_params(), audio)
            .map_err(|e| SttError::Transcription(e.to_string()))?;

        let n_segments = state
            .full_n_segments()
            .map_err(|e| SttError::Transcription(e.to_string()))?;
        let mut raw = String::new();
        for i in 0..n_segments {
            let segment = state
                .full_get_segment_text(i)
                .map_err(|e| SttError::Transcription(format!("segment {i}: {e}")))?;
            raw.push_str(&segment);
        }

        let text = clean_transcript(&raw);
        log::trace!(
            "stt: {} samples -> {} chars in {} ms",
            audio.len(),
            text.len(),
            started.elapsed().as_millis()
        );
        Ok(text)
    }
}

fn pad_to(audio: &[f32], len: usize) -> Vec<f32> {
    let mut out = Vec::with_capacity(len);
    out.extend_from_slice(audio);
    out.resize(len, 0.0);
    out
}

// ---------------------------------------------------------------------------
// MockSttEngine  (test-only)
// ---------------------------------------------------------------------------

/// Returns a fixed transcript and counts calls.
#[cfg(test)]
pub struct MockSttEngine {
    response: Result<String, SttError>,
    calls: std::sync::atomic::AtomicUsize,
}

#[cfg(test)]
impl MockSttEngine {
    pub fn ok(text: impl Into<String>) -> Self {
        Self {
            response: Ok(text.into()),
            calls: Default::default(),
        }
    }

    pub fn err(error: SttError) -> Self {
        Self {
            response: Err(error),
            calls: Default::default(),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(std::sync::atomic::Ordering::SeqCst)
    }
}

#[cfg(test)]
impl SttEngine for MockSttEngine {
    fn transcribe(&self, _audio: &[f32]) -> Result<String, SttError> {
        self.calls.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
        self.response.clone()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
