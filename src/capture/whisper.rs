//! Microphone + whisper.cpp speech capture.
//!
//! Each `start` spawns a worker thread that owns the cpal stream (it is not
//! `Send` everywhere) and runs the segmenter and the STT engine:
//!
//! ```text
//! start ──spawn──▶ worker: join previous worker, open mic
//!                   loop: chunk → segmenter
//!                          Interim → transcribe → reporter.interim
//!                          Final   → transcribe → reporter.final_text  (exit)
//!                          NoSpeech           → reporter.failed     (exit)
//! stop  ──▶ set stop flag; worker exits at its next poll
//! ```
//!
//! `start` and `stop` never wait on the worker: they run on the turn
//! controller's task.  A stopped worker may still be finishing a
//! transcription; the next worker joins it before opening the microphone,
//! so two workers never hold the device at once.  A microphone that fails
//! to open is reported through the reporter like any other capture failure.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, RecvTimeoutError};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use crate::audio::{AudioChunk, Microphone};
use crate::config::CaptureConfig;
use crate::stt::SttEngine;
use crate::turn::CaptureReporter;

use super::segmenter::{Segment, SegmenterSettings, UtteranceSegmenter};
use super::{CaptureError, CaptureSource};

const POLL: Duration = Duration::from_millis(50);

struct Worker {
    stop: Arc<AtomicBool>,
    thread: JoinHandle<()>,
}

impl Worker {
    fn signal_stop(&self) {
        self.stop.store(true, Ordering::Release);
    }
}

/// Spawn a worker that first waits for `previous` to exit, then runs `body`
/// unless it was stopped in the meantime.  Returns without waiting.
fn spawn_after<F>(previous: Option<Worker>, body: F) -> std::io::Result<Worker>
where
    F: FnOnce(Arc<AtomicBool>) + Send + 'static,
{
    if let Some(previous) = &previous {
        previous.signal_stop();
    }
    let stop = Arc::new(AtomicBool::new(false));

    let thread = std::thread::Builder::new()
        .name("speech-capture".into())
        .spawn({
            let stop = Arc::clone(&stop);
            move || {
                if let Some(previous) = previous {
                    if previous.thread.join().is_err() {
                        log::error!("capture: previous worker thread panicked");
                    }
                }
                if stop.load(Ordering::Acquire) {
                    return;
                }
                body(stop);
            }
        })?;

    Ok(Worker { stop, thread })
}

/// [`CaptureSource`] backed by the default microphone and a Whisper model.
///
/// Unsupported when no model was loaded or no input device existed when the
/// source was created.
pub struct WhisperCaptureSource {
    engine: Option<Arc<dyn SttEngine>>,
    settings: SegmenterSettings,
    supported: bool,
    worker: Option<Worker>,
}

impl WhisperCaptureSource {
    pub fn new(engine: Option<Arc<dyn SttEngine>>, config: &CaptureConfig) -> Self {
        let supported = engine.is_some() && Microphone::is_available();
        if engine.is_some() && !supported {
            log::warn!("capture: no audio input device found");
        }
        Self {
            engine,
            settings: SegmenterSettings::from_config(config),
            supported,
            worker: None,
        }
    }
}

impl CaptureSource for WhisperCaptureSource {
    fn is_supported(&self) -> bool {
        self.supported
    }

    fn start(&mut self, reporter: CaptureReporter) -> Result<(), CaptureError> {
        let engine = self
            .engine
            .clone()
            .ok_or_else(|| CaptureError::Unsupported("no speech model loaded".into()))?;
        let settings = self.settings.clone();

        let worker = spawn_after(self.worker.take(), move |stop| {
            capture_worker(engine, settings, &stop, &reporter)
        })
        .map_err(|e| CaptureError::Worker(e.to_string()))?;

        self.worker = Some(worker);
        Ok(())
    }

    fn stop(&mut self) {
        if let Some(worker) = &self.worker {
            worker.signal_stop();
        }
    }
}

impl Drop for WhisperCaptureSource {
    fn drop(&mut self) {
        self.stop();
    }
}

// ---------------------------------------------------------------------------
// Worker
// ---------------------------------------------------------------------------

fn capture_worker(
    engine: Arc<dyn SttEngine>,
    settings: SegmenterSettings,
    stop: &AtomicBool,
    reporter: &CaptureReporter,
) {
    let (tx, rx) = mpsc::channel();
    let _guard = match Microphone::open().and_then(|mic| mic.start(tx)) {
        Ok(guard) => guard,
        Err(e) => {
            if !stop.load(Ordering::Acquire) {
                reporter.failed(format!("microphone error: {e}"));
            }
            return;
        }
    };

    log::debug!("capture: listening ({:?})", reporter.generation());
    drive(engine.as_ref(), settings, &rx, stop, reporter);
    log::debug!("capture: session finished ({:?})", reporter.generation());
}

/// Feed chunks through the segmenter until the session produces a result,
/// is stopped, or the audio input disappears.
fn drive(
    engine: &dyn SttEngine,
    settings: SegmenterSettings,
    chunks: &mpsc::Receiver<AudioChunk>,
    stop: &AtomicBool,
    reporter: &CaptureReporter,
) {
    let stopped = || stop.load(Ordering::Acquire);
    let mut segmenter = UtteranceSegmenter::new(settings);

    while !stopped() {
        let chunk = match chunks.recv_timeout(POLL) {
            Ok(chunk) => chunk,
            Err(RecvTimeoutError::Timeout) => continue,
            Err(RecvTimeoutError::Disconnected) => {
                if !stopped() {
                    reporter.failed("audio input closed");
                }
                return;
            }
        };

        match segmenter.push(&chunk.to_speech_samples()) {
            Segment::Pending => {}
            Segment::Interim(audio) => match engine.transcribe(&audio) {
                Ok(text) if text.is_empty() => {}
                Ok(text) => {
                    if stopped() || !reporter.interim(text) {
                        return;
                    }
                }
                Err(e) => log::debug!("capture: interim transcription failed: {e}"),
            },
            Segment::Final(audio) => {
                let result = engine.transcribe(&audio);
                if stopped() {
                    return;
                }
                match result {
                    Ok(text) => reporter.final_text(text),
                    Err(e) => reporter.failed(e.to_string()),
                };
                return;
            }
            Segment::NoSpeech => {
                reporter.failed("no speech detected");
                return;
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use tokio::sync::mpsc as tokio_mpsc;

    use super::*;
    use crate::stt::{MockSttEngine, SttError};
    use crate::turn::{CaptureEvent, ControllerMessage, Generation};

    fn settings() -> SegmenterSettings {
        SegmenterSettings {
            vad_threshold: 0.01,
            end_silence: 3_200,
            interim_interval: 8_000,
            no_speech_timeout: 16_000,
            max_utterance: 160_000,
        }
    }

    fn chunk(level: f32) -> AudioChunk {
        AudioChunk {
            samples: vec![level; 1_600],
            sample_rate: 16_000,
            channels: 1,
        }
    }

    fn run(
        engine: &dyn SttEngine,
        chunks: Vec<AudioChunk>,
        stop: bool,
    ) -> Vec<CaptureEvent> {
        let (audio_tx, audio_rx) = mpsc::channel();
        for c in chunks {
            audio_tx.send(c).unwrap();
        }
        drop(audio_tx);

        let (inbox, mut messages) = tokio_mpsc::unbounded_channel();
        let reporter = CaptureReporter::new(Generation::default(), inbox);
        drive(engine, settings(), &audio_rx, &AtomicBool::new(stop), &reporter);

        std::iter::from_fn(|| messages.try_recv().ok())
            .map(|m| match m {
                ControllerMessage::Capture { event, .. } => event,
                other => panic!("unexpected message {other:?}"),
            })
            .collect()
    }

    #[test]
    fn utterance_produces_interim_then_final() {
        let engine = MockSttEngine::ok("hello there");
        let mut chunks = vec![chunk(0.3); 6];
        chunks.extend(vec![chunk(0.0); 3]);

        let events = run(&engine, chunks, false);

        assert_eq!(
            events,
            vec![
                CaptureEvent::Interim("hello there".into()),
                CaptureEvent::Final("hello there".into()),
            ]
        );
        assert_eq!(engine.calls(), 2);
    }

    #[test]
    fn silence_reports_no_speech() {
        let engine = MockSttEngine::ok("unused");
        let events = run(&engine, vec![chunk(0.0); 12], false);

        assert_eq!(events, vec![CaptureEvent::Failed("no speech detected".into())]);
        assert_eq!(engine.calls(), 0);
    }

    #[test]
    fn engine_error_on_final_is_a_failure() {
        let engine = MockSttEngine::err(SttError::Transcription("decoder".into()));
        let mut chunks = vec![chunk(0.3); 2];
        chunks.extend(vec![chunk(0.0); 3]);

        let events = run(&engine, chunks, false);

        assert!(matches!(events.as_slice(), [CaptureEvent::Failed(r)] if r.contains("decoder")));
    }

    #[test]
    fn closed_input_mid_utterance_is_a_failure() {
        let engine = MockSttEngine::ok("x");
        let events = run(&engine, vec![chunk(0.3); 2], false);
        assert_eq!(events, vec![CaptureEvent::Failed("audio input closed".into())]);
    }

    #[test]
    fn stopped_session_reports_nothing() {
        let engine = MockSttEngine::ok("x");
        let events = run(&engine, vec![chunk(0.3); 10], true);
        assert!(events.is_empty());
    }

    #[test]
    fn next_worker_waits_for_previous_without_blocking_caller() {
        let (release_tx, release_rx) = mpsc::channel::<()>();
        let busy = spawn_after(None, move |_| {
            let _ = release_rx.recv();
        })
        .expect("spawn busy worker");

        let (ran_tx, ran_rx) = mpsc::channel();
        let next = spawn_after(Some(busy), move |_| {
            let _ = ran_tx.send(());
        })
        .expect("spawn next worker");

        assert!(ran_rx.recv_timeout(Duration::from_millis(100)).is_err());

        release_tx.send(()).unwrap();
        ran_rx.recv_timeout(Duration::from_secs(5)).expect("next worker ran");
        next.thread.join().unwrap();
    }

    #[test]
    fn worker_stopped_while_waiting_never_runs() {
        let (release_tx, release_rx) = mpsc::channel::<()>();
        let busy = spawn_after(None, move |_| {
            let _ = release_rx.recv();
        })
        .expect("spawn busy worker");

        let (ran_tx, ran_rx) = mpsc::channel();
        let next = spawn_after(Some(busy), move |_| {
            let _ = ran_tx.send(());
        })
        .expect("spawn next worker");
        next.signal_stop();

        release_tx.send(()).unwrap();
        next.thread.join().unwrap();
        assert!(ran_rx.try_recv().is_err());
    }

    #[test]
    fn previous_worker_is_told_to_stop() {
        let busy = spawn_after(None, |stop| {
            while !stop.load(Ordering::Acquire) {
                std::thread::sleep(Duration::from_millis(5));
            }
        })
        .expect("spawn busy worker");
        let busy_stop = Arc::clone(&busy.stop);

        let next = spawn_after(Some(busy), |_| {}).expect("spawn next worker");
        assert!(busy_stop.load(Ordering::Acquire));
        next.thread.join().unwrap();
    }

    #[test]
    fn source_without_model_is_unsupported() {
        let mut source = WhisperCaptureSource::new(None, &CaptureConfig::default());
        assert!(!source.is_supported());

        let (inbox, _rx) = tokio_mpsc::unbounded_channel();
        let result = source.start(CaptureReporter::new(Generation::default(), inbox));
        assert!(matches!(result, Err(CaptureError::Unsupported(_))));
        source.stop();
    }
}
