//! Test doubles for the controller's collaborators.
//!
//! Each mock shares its recorded state through an `Arc<Mutex<_>>` probe so a
//! test can keep inspecting it after the mock has been boxed and moved into
//! the controller.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use crate::capture::{CaptureError, CaptureSource};
use crate::playback::{PlaybackError, SpeechSink, Utterance, VoiceOption};
use crate::reply::{ReplyError, ReplyGenerator};

use super::event::{CaptureReporter, PlaybackReporter};
use super::state::Message;

pub fn voice(id: &str, name: &str) -> VoiceOption {
    VoiceOption {
        id: id.into(),
        name: name.into(),
        lang: "en".into(),
    }
}

// ---------------------------------------------------------------------------
// MockCapture
// ---------------------------------------------------------------------------

pub struct CaptureProbe {
    pub supported: bool,
    pub fail_start: Option<String>,
    pub starts: usize,
    pub stops: usize,
    pub active: bool,
    /// Reporter from the most recent successful start.
    pub reporter: Option<CaptureReporter>,
}

pub struct MockCapture(Arc<Mutex<CaptureProbe>>);

impl MockCapture {
    pub fn new() -> (Self, Arc<Mutex<CaptureProbe>>) {
        let probe = Arc::new(Mutex::new(CaptureProbe {
            supported: true,
            fail_start: None,
            starts: 0,
            stops: 0,
            active: false,
            reporter: None,
        }));
        (Self(Arc::clone(&probe)), probe)
    }
}

impl CaptureSource for MockCapture {
    fn is_supported(&self) -> bool {
        self.0.lock().unwrap().supported
    }

    fn start(&mut self, reporter: CaptureReporter) -> Result<(), CaptureError> {
        let mut probe = self.0.lock().unwrap();
        if let Some(reason) = probe.fail_start.clone() {
            return Err(CaptureError::Device(reason));
        }
        probe.starts += 1;
        probe.active = true;
        probe.reporter = Some(reporter);
        Ok(())
    }

    fn stop(&mut self) {
        let mut probe = self.0.lock().unwrap();
        probe.stops += 1;
        probe.active = false;
    }
}

// ---------------------------------------------------------------------------
// MockSink
// ---------------------------------------------------------------------------

#[derive(Default)]
pub struct PlaybackProbe {
    pub voices: Vec<VoiceOption>,
    pub fail_speak: Option<String>,
    pub spoken: Vec<Utterance>,
    pub cancels: usize,
    pub active: bool,
    pub reporter: Option<PlaybackReporter>,
}

pub struct MockSink(Arc<Mutex<PlaybackProbe>>);

impl MockSink {
    pub fn with_voices(voices: Vec<VoiceOption>) -> (Self, Arc<Mutex<PlaybackProbe>>) {
        let probe = Arc::new(Mutex::new(PlaybackProbe {
            voices,
            ..PlaybackProbe::default()
        }));
        (Self(Arc::clone(&probe)), probe)
    }
}

impl SpeechSink for MockSink {
    fn voices(&self) -> Vec<VoiceOption> {
        self.0.lock().unwrap().voices.clone()
    }

    fn speak(
        &mut self,
        utterance: Utterance,
        reporter: PlaybackReporter,
    ) -> Result<(), PlaybackError> {
        let mut probe = self.0.lock().unwrap();
        if let Some(reason) = probe.fail_speak.clone() {
            return Err(PlaybackError::Unavailable(reason));
        }
        probe.spoken.push(utterance);
        probe.active = true;
        probe.reporter = Some(reporter);
        Ok(())
    }

    fn cancel(&mut self) {
        let mut probe = self.0.lock().unwrap();
        probe.cancels += 1;
        probe.active = false;
    }
}

// ---------------------------------------------------------------------------
// ScriptedReplies
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct ReplyRequest {
    pub history: Vec<Message>,
    pub context: String,
    pub persona: String,
}

/// Returns queued results in order and records every request.
pub struct ScriptedReplies {
    results: Mutex<VecDeque<Result<String, ReplyError>>>,
    requests: Mutex<Vec<ReplyRequest>>,
}

impl ScriptedReplies {
    pub fn new(results: Vec<Result<String, ReplyError>>) -> Self {
        Self {
            results: Mutex::new(results.into()),
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn requests(&self) -> Vec<ReplyRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl ReplyGenerator for ScriptedReplies {
    async fn generate_reply(
        &self,
        history: &[Message],
        context: &str,
        persona: &str,
    ) -> Result<String, ReplyError> {
        self.requests.lock().unwrap().push(ReplyRequest {
            history: history.to_vec(),
            context: context.to_string(),
            persona: persona.to_string(),
        });
        self.results
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Err(ReplyError::Parse("no scripted reply left".into())))
    }
}
