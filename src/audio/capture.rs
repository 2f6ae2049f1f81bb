//! Default-microphone input via `cpal`.
//!
//! [`Microphone::start`] streams [`AudioChunk`]s over a std channel from the
//! cpal audio thread.  The returned [`StreamGuard`] owns the stream; drop it
//! to stop recording.  `cpal::Stream` is not `Send` on every platform, so
//! open and start the microphone on the thread that will own the guard.

use std::sync::mpsc;

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use thiserror::Error;

use super::resample::{downmix, resample_linear, SPEECH_SAMPLE_RATE};

// ---------------------------------------------------------------------------
// AudioChunk
// ---------------------------------------------------------------------------

/// One hardware buffer of interleaved `f32` samples.
#[derive(Debug, Clone)]
pub struct AudioChunk {
    pub samples: Vec<f32>,
    pub sample_rate: u32,
    pub channels: u16,
}

impl AudioChunk {
    /// Mono samples at [`SPEECH_SAMPLE_RATE`].
    pub fn to_speech_samples(&self) -> Vec<f32> {
        let mono = downmix(&self.samples, self.channels);
        resample_linear(&mono, self.sample_rate, SPEECH_SAMPLE_RATE)
    }
}

// ---------------------------------------------------------------------------
// MicrophoneError
// ---------------------------------------------------------------------------

#[derive(Debug, Error)]
pub enum MicrophoneError {
    #[error("no input device found on the default audio host")]
    NoDevice,

    #[error("failed to query default input config: {0}")]
    DefaultConfig(#[from] cpal::DefaultStreamConfigError),

    #[error("failed to build input stream: {0}")]
    BuildStream(#[from] cpal::BuildStreamError),

    #[error("failed to start audio stream: {0}")]
    PlayStream(#[from] cpal::PlayStreamError),
}

// ---------------------------------------------------------------------------
// Microphone
// ---------------------------------------------------------------------------

/// Keeps the cpal input stream alive.
pub struct StreamGuard {
    _stream: cpal::Stream,
}

/// The system default input device with its preferred configuration.
pub struct Microphone {
    device: cpal::Device,
    config: cpal::StreamConfig,
}

impl Microphone {
    /// Whether the default host exposes any input device.
    pub fn is_available() -> bool {
        cpal::default_host().default_input_device().is_some()
    }

    pub fn open() -> Result<Self, MicrophoneError> {
        let device = cpal::default_host()
            .default_input_device()
            .ok_or(MicrophoneError::NoDevice)?;
        let config: cpal::StreamConfig = device.default_input_config()?.into();

        log::debug!(
            "audio: input {:?} @ {} Hz, {} ch",
            device.name().unwrap_or_default(),
            config.sample_rate.0,
            config.channels
        );
        Ok(Self { device, config })
    }

    /// Begin streaming chunks to `tx`.  Chunks are dropped silently once
    /// the receiver is gone; stream errors are logged.
    pub fn start(&self, tx: mpsc::Sender<AudioChunk>) -> Result<StreamGuard, MicrophoneError> {
        let sample_rate = self.config.sample_rate.0;
        let channels = self.config.channels;

        let stream = self.device.build_input_stream(
            &self.config,
            move |data: &[f32], _: &cpal::InputCallbackInfo| {
                let _ = tx.send(AudioChunk {
                    samples: data.to_vec(),
                    sample_rate,
                    channels,
                });
            },
            |err: cpal::StreamError| log::error!("audio: input stream error: {err}"),
            None,
        )?;
        stream.play()?;

        Ok(StreamGuard { _stream: stream })
    }

    pub fn sample_rate(&self) -> u32 {
        self.config.sample_rate.0
    }
}
