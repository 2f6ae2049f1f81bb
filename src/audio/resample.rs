//! Channel mixing and sample-rate conversion.
//!
//! Whisper expects 16 kHz mono; microphones usually deliver 44.1 or 48 kHz,
//! often stereo.  Conversion is linear interpolation, which is plenty for
//! speech recognition.

/// Sample rate the speech recognizer consumes.
pub const SPEECH_SAMPLE_RATE: u32 = 16_000;

/// Average interleaved channels into one.  A trailing partial frame is
/// dropped; `channels == 0` yields nothing.
///
/// ```rust
/// use doc_voice_agent::audio::downmix;
///
/// assert_eq!(downmix(&[0.5, 0.25, 1.0, 0.0], 2), vec![0.375, 0.5]);
/// ```
pub fn downmix(samples: &[f32], channels: u16) -> Vec<f32> {
    let width = usize::from(channels);
    match width {
        0 => Vec::new(),
        1 => samples.to_vec(),
        _ => samples
            .chunks_exact(width)
            .map(|frame| frame.iter().sum::<f32>() / width as f32)
            .collect(),
    }
}

/// Convert `samples` from `from_rate` to `to_rate` Hz.
///
/// Output length is `ceil(len * to_rate / from_rate)`.
pub fn resample_linear(samples: &[f32], from_rate: u32, to_rate: u32) -> Vec<f32> {
    if from_rate == to_rate || samples.is_empty() {
        return samples.to_vec();
    }
    if from_rate == 0 || to_rate == 0 {
        return Vec::new();
    }

    let step = f64::from(from_rate) / f64::from(to_rate);
    let out_len = (samples.len() as f64 / step).ceil() as usize;
    let last = samples.len() - 1;

    (0..out_len)
        .map(|i| {
            let pos = i as f64 * step;
            let idx = (pos as usize).min(last);
            let next = (idx + 1).min(last);
            let frac = (pos - idx as f64) as f32;
            samples[idx] + (samples[next] - samples[idx]) * frac
        })
        .collect()
}
