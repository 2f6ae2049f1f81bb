//! Decides, chunk by chunk, what a listening session should do next.
//!
//! ```text
//! waiting ──voice──▶ speaking ──every interim interval──▶ Interim(audio so far)
//!    │                  │
//!    │                  ├─ trailing silence ≥ end_silence ──▶ Final(utterance)
//!    │                  └─ utterance ≥ max length ─────────▶ Final(utterance)
//!    └─ no voice for no_speech_timeout ─────────────────────▶ NoSpeech
//! ```
//!
//! Samples are 16 kHz mono.  After `Final` or `NoSpeech` the segmenter is
//! finished and every further push returns `Pending`.

use std::time::Duration;

use crate::audio::{RingBuffer, VadDetector, SPEECH_SAMPLE_RATE};
use crate::config::CaptureConfig;

/// Audio kept from before the first voice frame so soft onsets survive.
const PRE_ROLL: Duration = Duration::from_millis(300);

#[derive(Debug, Clone, PartialEq)]
pub enum Segment {
    Pending,
    /// Audio of the utterance so far; transcribe for a partial result.
    Interim(Vec<f32>),
    /// The complete utterance, silence-trimmed.
    Final(Vec<f32>),
    /// Nothing was said before the timeout.
    NoSpeech,
}

/// Timing thresholds, all in samples at [`SPEECH_SAMPLE_RATE`].
#[derive(Debug, Clone)]
pub struct SegmenterSettings {
    pub vad_threshold: f32,
    pub end_silence: usize,
    pub interim_interval: usize,
    pub no_speech_timeout: usize,
    pub max_utterance: usize,
}

impl SegmenterSettings {
    pub fn from_config(config: &CaptureConfig) -> Self {
        Self {
            vad_threshold: config.vad_threshold,
            end_silence: samples_for(Duration::from_millis(config.end_silence_ms)),
            interim_interval: samples_for(Duration::from_millis(config.interim_interval_ms)),
            no_speech_timeout: samples_for(Duration::from_secs(config.no_speech_timeout_secs)),
            max_utterance: samples_for(Duration::from_secs(config.max_utterance_secs)),
        }
    }
}

fn samples_for(duration: Duration) -> usize {
    (duration.as_millis() as usize * SPEECH_SAMPLE_RATE as usize) / 1000
}

// ---------------------------------------------------------------------------
// UtteranceSegmenter
// ---------------------------------------------------------------------------

pub struct UtteranceSegmenter {
    settings: SegmenterSettings,
    vad: VadDetector,
    buffer: RingBuffer<f32>,
    pre_roll: usize,
    heard_voice: bool,
    waited: usize,
    spoken: usize,
    silence_run: usize,
    since_interim: usize,
    finished: bool,
}

impl UtteranceSegmenter {
    pub fn new(settings: SegmenterSettings) -> Self {
        let pre_roll = samples_for(PRE_ROLL);
        Self {
            vad: VadDetector::new(settings.vad_threshold),
            buffer: RingBuffer::new(settings.max_utterance.max(1) + pre_roll),
            pre_roll,
            settings,
            heard_voice: false,
            waited: 0,
            spoken: 0,
            silence_run: 0,
            since_interim: 0,
            finished: false,
        }
    }

    pub fn is_finished(&self) -> bool {
        self.finished
    }

    pub fn push(&mut self, samples: &[f32]) -> Segment {
        if self.finished || samples.is_empty() {
            return Segment::Pending;
        }

        let voiced = self.vad.contains_voice(samples);

        if !self.heard_voice {
            if !voiced {
                self.waited += samples.len();
                self.keep_pre_roll(samples);
                if self.waited >= self.settings.no_speech_timeout {
                    self.finished = true;
                    return Segment::NoSpeech;
                }
                return Segment::Pending;
            }
            self.heard_voice = true;
        }

        self.buffer.push_slice(samples);
        self.spoken += samples.len();
        self.since_interim += samples.len();
        if voiced {
            self.silence_run = self.vad.trailing_silence(samples);
        } else {
            self.silence_run += samples.len();
        }

        if self.silence_run >= self.settings.end_silence
            || self.spoken >= self.settings.max_utterance
        {
            return self.finish();
        }

        if self.since_interim >= self.settings.interim_interval {
            self.since_interim = 0;
            return Segment::Interim(self.buffer.snapshot());
        }

        Segment::Pending
    }

    fn finish(&mut self) -> Segment {
        self.finished = true;
        let audio = self.buffer.drain();
        Segment::Final(self.vad.trim_silence(&audio).to_vec())
    }

    /// Before speech starts only the most recent pre-roll is worth keeping.
    fn keep_pre_roll(&mut self, samples: &[f32]) {
        self.buffer.push_slice(samples);
        if self.buffer.len() > self.pre_roll {
            let tail = self.buffer.drain();
            self.buffer.push_slice(&tail[tail.len() - self.pre_roll..]);
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
