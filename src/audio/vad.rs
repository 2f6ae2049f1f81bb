//! Energy-based voice activity detection.
//!
//! Audio is examined in 30 ms frames (480 samples at 16 kHz); a frame is
//! voice when its RMS exceeds the threshold.  The recognizer uses this to
//! decide when speech has started, when it has ended, and what to trim
//! before transcription.

/// Frame-wise RMS gate.
///
/// ```rust
/// use doc_voice_agent::audio::VadDetector;
///
/// let vad = VadDetector::new(0.01);
/// let mut audio = vec![0.0_f32; 480];
/// audio.extend(vec![0.5_f32; 480]);
/// audio.extend(vec![0.0_f32; 960]);
///
/// assert!(vad.contains_voice(&audio));
/// assert_eq!(vad.trailing_silence(&audio), 960);
/// assert_eq!(vad.trim_silence(&audio).len(), 480);
/// ```
#[derive(Debug, Clone)]
pub struct VadDetector {
    threshold: f32,
    frame_size: usize,
}

impl VadDetector {
    pub fn new(threshold: f32) -> Self {
        Self::with_frame_size(threshold, 480)
    }

    /// # Panics
    ///
    /// Panics if `frame_size == 0`.
    pub fn with_frame_size(threshold: f32, frame_size: usize) -> Self {
        assert!(frame_size > 0, "frame_size must be > 0");
        Self {
            threshold,
            frame_size,
        }
    }

    pub fn threshold(&self) -> f32 {
        self.threshold
    }

    /// RMS level of `frame`; 0 for an empty slice.
    pub fn rms(frame: &[f32]) -> f32 {
        if frame.is_empty() {
            return 0.0;
        }
        (frame.iter().map(|s| s * s).sum::<f32>() / frame.len() as f32).sqrt()
    }

    fn is_voice(&self, frame: &[f32]) -> bool {
        Self::rms(frame) > self.threshold
    }

    /// Whether any frame of `audio` is voice.
    pub fn contains_voice(&self, audio: &[f32]) -> bool {
        audio.chunks(self.frame_size).any(|f| self.is_voice(f))
    }

    /// Number of samples after the last voice frame, rounded to frames.
    /// Equals `audio.len()` when there is no voice at all.
    pub fn trailing_silence(&self, audio: &[f32]) -> usize {
        match self.voice_bounds(audio) {
            Some((_, end)) => audio.len() - end,
            None => audio.len(),
        }
    }

    /// Sub-slice from the first voice frame through the last one.  Empty
    /// when the whole clip is silent.
    pub fn trim_silence<'a>(&self, audio: &'a [f32]) -> &'a [f32] {
        match self.voice_bounds(audio) {
            Some((start, end)) => &audio[start..end],
            None => &audio[..0],
        }
    }

    fn voice_bounds(&self, audio: &[f32]) -> Option<(usize, usize)> {
        let frames: Vec<bool> = audio
            .chunks(self.frame_size)
            .map(|f| self.is_voice(f))
            .collect();
        let first = frames.iter().position(|&v| v)?;
        let last = frames.iter().rposition(|&v| v)?;
        let end = ((last + 1) * self.frame_size).min(audio.len());
        Some((first * self.frame_size, end))
    }
}
