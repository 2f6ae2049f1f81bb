//! Microphone input and the signal helpers the speech recognizer needs.
//!
//! ```text
//! cpal callback ──▶ AudioChunk (std mpsc) ──▶ to_speech_samples()
//!                                              (downmix + resample to 16 kHz)
//!                                            ──▶ RingBuffer / VadDetector
//! ```

pub mod buffer;
pub mod capture;
pub mod resample;
pub mod vad;

pub use buffer::RingBuffer;
pub use capture::{AudioChunk, Microphone, MicrophoneError, StreamGuard};
pub use resample::{downmix, resample_linear, SPEECH_SAMPLE_RATE};
pub use vad::VadDetector;
