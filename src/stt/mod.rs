//! Offline speech-to-text backed by whisper.cpp.
//!
//! ```text
//! 16 kHz mono f32 ──▶ SttEngine::transcribe ──▶ clean_transcript ──▶ text
//!                        (WhisperEngine)
//! ```
//!
//! The speech capture worker holds the engine as `Arc<dyn SttEngine>` and
//! calls it from its own thread for both interim and final transcripts.

pub mod engine;
pub mod transcribe;

pub use engine::{SttEngine, SttError, WhisperEngine};
pub use transcribe::{clean_transcript, TranscribeParams};

#[cfg(test)]
pub use engine::MockSttEngine;
