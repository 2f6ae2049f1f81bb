//! Speech capture: microphone to transcripts.
//!
//! A [`CaptureSource`] opens the microphone when the turn controller starts
//! listening and reports what it hears through a
//! [`CaptureReporter`](crate::turn::CaptureReporter): interim transcripts
//! while the user speaks, then exactly one final transcript, failure or end.
//!
//! [`WhisperCaptureSource`] is the production source; [`UtteranceSegmenter`]
//! holds its audio-only decisions so they can be tested without hardware.

pub mod segmenter;
pub mod whisper;

use thiserror::Error;

use crate::turn::CaptureReporter;

pub use segmenter::{Segment, SegmenterSettings, UtteranceSegmenter};
pub use whisper::WhisperCaptureSource;

// ---------------------------------------------------------------------------
// CaptureError
// ---------------------------------------------------------------------------

#[derive(Debug, Error)]
pub enum CaptureError {
    /// Recognition cannot work on this system at all.
    #[error("speech recognition unavailable: {0}")]
    Unsupported(String),

    /// The microphone could not be opened.
    #[error("microphone error: {0}")]
    Device(String),

    #[error("capture worker failed: {0}")]
    Worker(String),
}

// ---------------------------------------------------------------------------
// CaptureSource trait
// ---------------------------------------------------------------------------

/// Push-based speech recognizer driven by the turn controller.
///
/// Contract:
/// * `start` opens a new session; events go to `reporter` until the source
///   emits a final result, a failure or `ended`, or until `stop` is called.
/// * `stop` is idempotent and safe to call when nothing is running.
/// * After `stop`, stray events are tolerated: the reporter's generation no
///   longer matches and the controller drops them.
pub trait CaptureSource: Send {
    /// Whether `start` can possibly succeed (model loaded, input device
    /// present).
    fn is_supported(&self) -> bool;

    fn start(&mut self, reporter: CaptureReporter) -> Result<(), CaptureError>;

    fn stop(&mut self);
}
