//! The voice-turn controller.
//!
//! [`TurnController`] owns the [`Session`] and the three collaborators of a
//! turn: a [`CaptureSource`], a [`SpeechSink`] and a [`ReplyGenerator`].  It
//! consumes [`ControllerMessage`]s one at a time from its inbox and applies
//! them through a single transition function, [`TurnController::handle`].
//!
//! # Turn flow
//!
//! ```text
//! Start            └─▶ capture.start(reporter@g)                [Listening]
//! Capture::Interim └─▶ transcript = text
//! Capture::Final   └─▶ capture.stop, push user, spawn reply@g'  [AwaitingReply]
//! Reply Ok         └─▶ push assistant
//!                        ├─ muted / empty → Idle
//!                        └─ sink.speak(reporter@g'')            [Speaking]
//! Reply Err        └─▶ ReplyFailed                              [Idle]
//! Playback::Ended  └─▶                                          [Idle]
//! Stop             └─▶ capture.stop | sink.cancel               [Idle]
//! ```
//!
//! The generation is advanced whenever an operation is started or
//! abandoned.  Adapter events are applied only when they carry the current
//! generation *and* the controller is in the state that issued them.
//!
//! A reply request in flight cannot be cancelled: `Stop` while awaiting a
//! reply is ignored and the request completes or fails on its own.

use std::sync::Arc;

use tokio::sync::{mpsc, watch};

use crate::capture::{CaptureError, CaptureSource};
use crate::playback::{SpeechSink, Utterance, VoiceOption, VoiceSettings};
use crate::reply::ReplyGenerator;

use super::event::{
    CaptureEvent, CaptureReporter, ControllerMessage, Generation, Inbox, PlaybackEvent,
    PlaybackReporter, SessionCommand,
};
use super::state::{Message, Session, SessionContext, TurnError, TurnState};
use super::surface::{SessionHandle, SessionSnapshot};

// ---------------------------------------------------------------------------
// TurnController
// ---------------------------------------------------------------------------

/// Single state machine per session sequencing capture → reply → playback.
///
/// ```rust,no_run
/// # use std::sync::Arc;
/// # use doc_voice_agent::capture::CaptureSource;
/// # use doc_voice_agent::playback::{SpeechSink, VoiceSettings};
/// # use doc_voice_agent::reply::ReplyGenerator;
/// # fn parts() -> (Box<dyn CaptureSource>, Box<dyn SpeechSink>, Arc<dyn ReplyGenerator>) { unimplemented!() }
/// use doc_voice_agent::turn::TurnController;
///
/// # async fn example() {
/// let (capture, playback, replies) = parts();
/// let (controller, handle) =
///     TurnController::new(capture, playback, replies, VoiceSettings::default());
/// tokio::spawn(controller.run());
///
/// handle.start();
/// # }
/// ```
pub struct TurnController {
    state: TurnState,
    generation: Generation,
    session: Session,
    voices: Vec<VoiceOption>,
    voice_settings: VoiceSettings,
    capture: Box<dyn CaptureSource>,
    playback: Box<dyn SpeechSink>,
    replies: Arc<dyn ReplyGenerator>,
    inbox: Inbox,
    inbox_rx: mpsc::UnboundedReceiver<ControllerMessage>,
    snapshot_tx: watch::Sender<SessionSnapshot>,
    running: bool,
}

impl TurnController {
    /// Create a controller and the [`SessionHandle`] that drives it.
    ///
    /// The first voice offered by `playback` becomes the initial selection.
    pub fn new(
        capture: Box<dyn CaptureSource>,
        playback: Box<dyn SpeechSink>,
        replies: Arc<dyn ReplyGenerator>,
        voice_settings: VoiceSettings,
    ) -> (Self, SessionHandle) {
        let (inbox, inbox_rx) = mpsc::unbounded_channel();
        let voices = playback.voices();
        let session = Session {
            selected_voice: voices.first().map(|v| v.id.clone()),
            ..Session::default()
        };
        let (snapshot_tx, snapshot_rx) = watch::channel(SessionSnapshot::default());

        let controller = Self {
            state: TurnState::Idle,
            generation: Generation::default(),
            session,
            voices,
            voice_settings,
            capture,
            playback,
            replies,
            inbox: inbox.clone(),
            inbox_rx,
            snapshot_tx,
            running: true,
        };
        controller.publish();

        (controller, SessionHandle::new(inbox, snapshot_rx))
    }

    pub fn state(&self) -> TurnState {
        self.state
    }

    pub fn generation(&self) -> Generation {
        self.generation
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    // -----------------------------------------------------------------------
    // Main async loop
    // -----------------------------------------------------------------------

    /// Process messages until a `Shutdown` command arrives.
    pub async fn run(mut self) {
        log::info!("turn: controller started");
        while self.step().await {}
        log::info!("turn: controller stopped");
    }

    /// Wait for one message and apply it.
    ///
    /// Returns `false` once the controller has shut down.
    pub async fn step(&mut self) -> bool {
        match self.inbox_rx.recv().await {
            Some(message) => {
                self.handle(message);
                self.running
            }
            None => false,
        }
    }

    /// The transition function.  Applies one message and republishes the
    /// session snapshot.
    pub fn handle(&mut self, message: ControllerMessage) {
        match message {
            ControllerMessage::Command(command) => self.on_command(command),
            ControllerMessage::Capture { generation, event } => {
                if self.accepts(generation, TurnState::Listening) {
                    self.on_capture(event);
                } else {
                    log::trace!("turn: dropping stale capture event {event:?} from {generation:?}");
                }
            }
            ControllerMessage::Reply { generation, result } => {
                if self.accepts(generation, TurnState::AwaitingReply) {
                    self.on_reply(result);
                } else {
                    log::trace!("turn: dropping stale reply from {generation:?}");
                }
            }
            ControllerMessage::Playback { generation, event } => {
                if self.accepts(generation, TurnState::Speaking) {
                    self.on_playback(event);
                } else {
                    log::trace!("turn: dropping stale playback event {event:?} from {generation:?}");
                }
            }
        }
        self.publish();
    }

    // -----------------------------------------------------------------------
    // Commands
    // -----------------------------------------------------------------------

    fn on_command(&mut self, command: SessionCommand) {
        match command {
            SessionCommand::Start => self.start(),
            SessionCommand::Stop => self.stop(),
            SessionCommand::ToggleMute => self.toggle_mute(),
            SessionCommand::SelectVoice(id) => {
                log::debug!("turn: voice {id:?} selected for the next playback");
                self.session.selected_voice = Some(id);
            }
            SessionCommand::SetContext(context) => self.set_context(context),
            SessionCommand::ClearContext => self.clear_context(),
            SessionCommand::Shutdown => {
                self.halt_adapters();
                self.go_idle();
                self.running = false;
            }
        }
    }

    fn start(&mut self) {
        if self.state != TurnState::Idle {
            log::debug!("turn: start ignored while {:?}", self.state);
            return;
        }
        if !self.session.is_ready() {
            log::debug!("turn: start ignored, no document or persona loaded");
            return;
        }
        if !self.capture.is_supported() {
            self.record(TurnError::CaptureUnsupported);
            return;
        }

        self.session.error = None;
        self.session.transcript.clear();

        let generation = self.advance();
        let reporter = CaptureReporter::new(generation, self.inbox.clone());
        match self.capture.start(reporter) {
            Ok(()) => self.set_state(TurnState::Listening),
            Err(CaptureError::Unsupported(reason)) => {
                log::warn!("turn: capture unsupported: {reason}");
                self.record(TurnError::CaptureUnsupported);
            }
            Err(e) => self.record(TurnError::CaptureFailed {
                reason: e.to_string(),
            }),
        }
    }

    fn stop(&mut self) {
        match self.state {
            TurnState::Listening => {
                self.capture.stop();
                self.go_idle();
            }
            TurnState::Speaking => {
                self.playback.cancel();
                self.go_idle();
            }
            TurnState::AwaitingReply => {
                log::debug!("turn: stop ignored, the reply request cannot be cancelled");
            }
            TurnState::Idle => {}
        }
    }

    fn toggle_mute(&mut self) {
        self.session.muted = !self.session.muted;
        log::info!("turn: muted = {}", self.session.muted);

        if self.session.muted && self.state == TurnState::Speaking {
            self.playback.cancel();
            self.go_idle();
        }
    }

    fn set_context(&mut self, context: SessionContext) {
        if context.is_ready() {
            log::info!(
                "turn: context ready ({} chars from {:?})",
                context.document_text.len(),
                context.document_name
            );
            self.session.context = Some(context);
        } else {
            self.clear_context();
        }
    }

    fn clear_context(&mut self) {
        log::info!("turn: context cleared");
        self.halt_adapters();
        self.go_idle();
        self.session.reset();
    }

    // -----------------------------------------------------------------------
    // Adapter events
    // -----------------------------------------------------------------------

    fn on_capture(&mut self, event: CaptureEvent) {
        match event {
            CaptureEvent::Interim(text) => {
                self.session.transcript = text;
            }
            CaptureEvent::Final(text) => {
                self.capture.stop();
                self.session.transcript.clear();

                let text = text.trim();
                if text.is_empty() {
                    log::debug!("turn: blank final transcript, nothing to send");
                    self.go_idle();
                    return;
                }

                self.session.messages.push(Message::user(text));
                let generation = self.advance();
                self.set_state(TurnState::AwaitingReply);
                self.request_reply(generation);
            }
            CaptureEvent::Failed(reason) => {
                self.capture.stop();
                self.go_idle();
                self.record(TurnError::CaptureFailed { reason });
            }
            CaptureEvent::Ended => {
                self.capture.stop();
                self.go_idle();
            }
        }
    }

    fn on_reply(&mut self, result: Result<String, crate::reply::ReplyError>) {
        match result {
            Ok(text) => {
                self.session.messages.push(Message::assistant(text.clone()));
                if self.session.muted || text.trim().is_empty() {
                    self.go_idle();
                } else {
                    self.speak(text);
                }
            }
            Err(e) => {
                self.go_idle();
                self.record(TurnError::ReplyFailed {
                    reason: e.to_string(),
                });
            }
        }
    }

    fn on_playback(&mut self, event: PlaybackEvent) {
        match event {
            PlaybackEvent::Started => log::debug!("turn: playback started"),
            PlaybackEvent::Ended => self.go_idle(),
            PlaybackEvent::Failed(reason) => {
                self.go_idle();
                self.record(TurnError::PlaybackFailed { reason });
            }
        }
    }

    // -----------------------------------------------------------------------
    // Side effects
    // -----------------------------------------------------------------------

    fn request_reply(&self, generation: Generation) {
        let history = self.session.messages.clone();
        let (context, persona) = self
            .session
            .context
            .as_ref()
            .map(|c| (c.document_text.clone(), c.persona.clone()))
            .unwrap_or_default();
        let replies = Arc::clone(&self.replies);
        let inbox = self.inbox.clone();

        tokio::spawn(async move {
            let result = replies.generate_reply(&history, &context, &persona).await;
            if inbox
                .send(ControllerMessage::Reply { generation, result })
                .is_err()
            {
                log::debug!("turn: controller gone before reply arrived");
            }
        });
    }

    fn speak(&mut self, text: String) {
        let generation = self.advance();
        let utterance = Utterance {
            text,
            voice: self.session.selected_voice.clone(),
            settings: self.voice_settings,
        };
        let reporter = PlaybackReporter::new(generation, self.inbox.clone());

        match self.playback.speak(utterance, reporter) {
            Ok(()) => self.set_state(TurnState::Speaking),
            Err(e) => {
                self.go_idle();
                self.record(TurnError::PlaybackFailed {
                    reason: e.to_string(),
                });
            }
        }
    }

    /// Stop whichever adapter the current state has open.
    fn halt_adapters(&mut self) {
        match self.state {
            TurnState::Listening => self.capture.stop(),
            TurnState::Speaking => self.playback.cancel(),
            TurnState::Idle | TurnState::AwaitingReply => {}
        }
    }

    // -----------------------------------------------------------------------
    // Helpers
    // -----------------------------------------------------------------------

    fn accepts(&self, generation: Generation, expected: TurnState) -> bool {
        generation == self.generation && self.state == expected
    }

    fn advance(&mut self) -> Generation {
        self.generation = self.generation.next();
        self.generation
    }

    fn set_state(&mut self, next: TurnState) {
        if self.state != next {
            log::debug!("turn: {:?} -> {:?} ({:?})", self.state, next, self.generation);
        }
        self.state = next;
    }

    /// Abandon whatever was in flight and return to `Idle`.
    fn go_idle(&mut self) {
        self.advance();
        self.set_state(TurnState::Idle);
        self.session.transcript.clear();
    }

    fn record(&mut self, error: TurnError) {
        log::warn!("turn: {error:?}");
        self.session.error = Some(error);
    }

    fn publish(&self) {
        self.snapshot_tx.send_replace(self.snapshot());
    }

    fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            ready: self.session.is_ready(),
            phase: self.state.phase(),
            messages: self.session.messages.clone(),
            transcript: self.session.transcript.clone(),
            muted: self.session.muted,
            selected_voice: self.session.selected_voice.clone(),
            voices: self.voices.clone(),
            error: self.session.error.clone(),
            document_name: self
                .session
                .context
                .as_ref()
                .map(|c| c.document_name.clone()),
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use super::*;
    use crate::reply::ReplyError;
    use crate::turn::mock::{
        voice, CaptureProbe, MockCapture, MockSink, PlaybackProbe, ScriptedReplies,
    };
    use crate::turn::state::Role;

    // -----------------------------------------------------------------------
    // Harness
    // -----------------------------------------------------------------------

    struct Harness {
        controller: TurnController,
        handle: SessionHandle,
        capture: Arc<Mutex<CaptureProbe>>,
        playback: Arc<Mutex<PlaybackProbe>>,
        replies: Arc<ScriptedReplies>,
    }

    impl Harness {
        fn new(replies: Vec<Result<String, ReplyError>>) -> Self {
            Self::with_voices(replies, Vec::new())
        }

        fn with_voices(
            replies: Vec<Result<String, ReplyError>>,
            voices: Vec<VoiceOption>,
        ) -> Self {
            let (capture, capture_probe) = MockCapture::new();
            let (sink, playback_probe) = MockSink::with_voices(voices);
            let replies = Arc::new(ScriptedReplies::new(replies));
            let (controller, handle) = TurnController::new(
                Box::new(capture),
                Box::new(sink),
                Arc::clone(&replies) as Arc<dyn ReplyGenerator>,
                VoiceSettings::default(),
            );
            Self {
                controller,
                handle,
                capture: capture_probe,
                playback: playback_probe,
                replies,
            }
        }

        /// Harness with a ready context already applied.
        async fn ready(replies: Vec<Result<String, ReplyError>>) -> Self {
            let mut h = Self::new(replies);
            h.handle.set_context(context());
            h.step().await;
            h
        }

        async fn step(&mut self) {
            assert!(self.controller.step().await, "controller stopped unexpectedly");
        }

        fn capture_reporter(&self) -> CaptureReporter {
            self.capture
                .lock()
                .unwrap()
                .reporter
                .clone()
                .expect("capture was never started")
        }

        fn playback_reporter(&self) -> PlaybackReporter {
            self.playback
                .lock()
                .unwrap()
                .reporter
                .clone()
                .expect("nothing was spoken")
        }

        fn state(&self) -> TurnState {
            self.controller.state()
        }

        /// Drive `start → final(text)` and deliver the scripted reply.
        async fn run_turn_until_reply(&mut self, text: &str) {
            self.handle.start();
            self.step().await;
            self.capture_reporter().final_text(text);
            self.step().await;
            assert_eq!(self.state(), TurnState::AwaitingReply);
            self.step().await;
        }
    }

    fn context() -> SessionContext {
        SessionContext {
            document_name: "handbook.txt".into(),
            document_text: "The office opens at nine.".into(),
            persona: "You are a friendly receptionist.".into(),
        }
    }

    // -----------------------------------------------------------------------
    // Full scenarios
    // -----------------------------------------------------------------------

    #[tokio::test]
    async fn full_turn_appends_both_messages_and_returns_to_idle() {
        let mut h = Harness::ready(vec![Ok("Hi! How can I help?".into())]).await;

        h.handle.start();
        h.step().await;
        assert_eq!(h.state(), TurnState::Listening);

        let capture = h.capture_reporter();
        capture.interim("Hel");
        h.step().await;
        assert_eq!(h.handle.snapshot().transcript, "Hel");

        capture.interim("Hello");
        h.step().await;
        assert_eq!(h.handle.snapshot().transcript, "Hello");

        capture.final_text("Hello there");
        h.step().await;
        assert_eq!(h.state(), TurnState::AwaitingReply);
        assert!(h.handle.snapshot().transcript.is_empty());
        assert_eq!(h.capture.lock().unwrap().stops, 1);

        h.step().await; // reply arrives
        assert_eq!(h.state(), TurnState::Speaking);

        let playback = h.playback_reporter();
        playback.started();
        h.step().await;
        assert_eq!(h.state(), TurnState::Speaking);
        playback.ended();
        h.step().await;

        let snapshot = h.handle.snapshot();
        assert_eq!(h.state(), TurnState::Idle);
        assert_eq!(
            snapshot.messages,
            vec![
                Message::user("Hello there"),
                Message::assistant("Hi! How can I help?"),
            ]
        );
        assert!(snapshot.transcript.is_empty());
        assert!(snapshot.error.is_none());

        let spoken = &h.playback.lock().unwrap().spoken;
        assert_eq!(spoken.len(), 1);
        assert_eq!(spoken[0].text, "Hi! How can I help?");
    }

    #[tokio::test]
    async fn reply_failure_leaves_orphan_user_message() {
        let mut h = Harness::ready(vec![Err(ReplyError::Timeout)]).await;

        h.run_turn_until_reply("What is this about?").await;

        let snapshot = h.handle.snapshot();
        assert_eq!(h.state(), TurnState::Idle);
        assert_eq!(snapshot.messages, vec![Message::user("What is this about?")]);
        assert!(matches!(snapshot.error, Some(TurnError::ReplyFailed { .. })));
        assert!(h.playback.lock().unwrap().spoken.is_empty());
    }

    #[tokio::test]
    async fn muting_mid_speech_cancels_playback_and_keeps_message() {
        let mut h = Harness::ready(vec![Ok("It covers office hours.".into())]).await;

        h.run_turn_until_reply("Tell me more").await;
        assert_eq!(h.state(), TurnState::Speaking);

        h.handle.toggle_mute();
        h.step().await;

        assert_eq!(h.state(), TurnState::Idle);
        assert_eq!(h.playback.lock().unwrap().cancels, 1);
        let snapshot = h.handle.snapshot();
        assert!(snapshot.muted);
        assert_eq!(
            snapshot.messages.last(),
            Some(&Message::assistant("It covers office hours."))
        );
    }

    #[tokio::test]
    async fn muted_session_skips_playback() {
        let mut h = Harness::ready(vec![Ok("Hello".into())]).await;
        h.handle.toggle_mute();
        h.step().await;

        h.run_turn_until_reply("Hi").await;

        assert_eq!(h.state(), TurnState::Idle);
        assert!(h.playback.lock().unwrap().spoken.is_empty());
        assert_eq!(
            h.handle.snapshot().messages,
            vec![Message::user("Hi"), Message::assistant("Hello")]
        );
    }

    #[tokio::test]
    async fn reply_request_carries_history_context_and_persona() {
        let mut h =
            Harness::ready(vec![Ok("Nine o'clock.".into()), Ok("You're welcome.".into())]).await;
        h.handle.toggle_mute();
        h.step().await;

        h.run_turn_until_reply("When do you open?").await;
        h.run_turn_until_reply("Thanks").await;

        let requests = h.replies.requests();
        assert_eq!(requests.len(), 2);
        assert_eq!(requests[1].context, "The office opens at nine.");
        assert_eq!(requests[1].persona, "You are a friendly receptionist.");
        let roles: Vec<Role> = requests[1].history.iter().map(|m| m.role).collect();
        assert_eq!(roles, vec![Role::User, Role::Assistant, Role::User]);
        assert_eq!(requests[1].history[2].text, "Thanks");
    }

    // -----------------------------------------------------------------------
    // start() guards
    // -----------------------------------------------------------------------

    #[tokio::test]
    async fn start_without_context_is_ignored() {
        let mut h = Harness::new(vec![]);

        h.handle.start();
        h.step().await;

        assert_eq!(h.state(), TurnState::Idle);
        assert_eq!(h.capture.lock().unwrap().starts, 0);
        assert!(h.handle.snapshot().error.is_none());
    }

    #[tokio::test]
    async fn start_while_listening_is_a_no_op() {
        let mut h = Harness::ready(vec![]).await;
        h.handle.start();
        h.step().await;
        let generation = h.controller.generation();

        h.handle.start();
        h.step().await;

        assert_eq!(h.state(), TurnState::Listening);
        assert_eq!(h.controller.generation(), generation);
        assert_eq!(h.capture.lock().unwrap().starts, 1);
    }

    #[tokio::test]
    async fn start_while_awaiting_reply_or_speaking_is_a_no_op() {
        let mut h = Harness::ready(vec![Ok("Sure.".into())]).await;
        h.handle.start();
        h.step().await;
        h.capture_reporter().final_text("Question");
        h.step().await;

        h.handle.start();
        h.step().await;
        assert_eq!(h.state(), TurnState::AwaitingReply);

        h.step().await; // reply
        assert_eq!(h.state(), TurnState::Speaking);
        h.handle.start();
        h.step().await;

        assert_eq!(h.state(), TurnState::Speaking);
        assert_eq!(h.capture.lock().unwrap().starts, 1);
        assert_eq!(h.handle.snapshot().messages.len(), 2);
    }

    #[tokio::test]
    async fn unsupported_capture_records_error_and_stays_idle() {
        let mut h = Harness::ready(vec![]).await;
        h.capture.lock().unwrap().supported = false;

        h.handle.start();
        h.step().await;

        assert_eq!(h.state(), TurnState::Idle);
        assert_eq!(h.handle.snapshot().error, Some(TurnError::CaptureUnsupported));
        assert_eq!(h.capture.lock().unwrap().starts, 0);
    }

    #[tokio::test]
    async fn capture_start_failure_is_recoverable() {
        let mut h = Harness::ready(vec![]).await;
        h.capture.lock().unwrap().fail_start = Some("device busy".into());

        h.handle.start();
        h.step().await;
        assert_eq!(h.state(), TurnState::Idle);
        assert!(matches!(
            h.handle.snapshot().error,
            Some(TurnError::CaptureFailed { .. })
        ));

        h.capture.lock().unwrap().fail_start = None;
        h.handle.start();
        h.step().await;
        assert_eq!(h.state(), TurnState::Listening);
        assert!(h.handle.snapshot().error.is_none(), "error clears on a new turn");
    }

    // -----------------------------------------------------------------------
    // stop()
    // -----------------------------------------------------------------------

    #[tokio::test]
    async fn stop_in_idle_is_a_no_op() {
        let mut h = Harness::ready(vec![]).await;
        let generation = h.controller.generation();

        h.handle.stop();
        h.step().await;

        assert_eq!(h.state(), TurnState::Idle);
        assert_eq!(h.controller.generation(), generation);
        assert!(h.handle.snapshot().error.is_none());
    }

    #[tokio::test]
    async fn stop_while_listening_discards_transcript_without_error() {
        let mut h = Harness::ready(vec![]).await;
        h.handle.start();
        h.step().await;
        h.capture_reporter().interim("half a sen");
        h.step().await;

        h.handle.stop();
        h.step().await;

        let snapshot = h.handle.snapshot();
        assert_eq!(h.state(), TurnState::Idle);
        assert!(snapshot.transcript.is_empty());
        assert!(snapshot.messages.is_empty());
        assert!(snapshot.error.is_none());
        assert_eq!(h.capture.lock().unwrap().stops, 1);
    }

    #[tokio::test]
    async fn stop_while_speaking_cancels_playback() {
        let mut h = Harness::ready(vec![Ok("A long answer".into())]).await;
        h.run_turn_until_reply("Explain").await;

        h.handle.stop();
        h.step().await;

        assert_eq!(h.state(), TurnState::Idle);
        assert_eq!(h.playback.lock().unwrap().cancels, 1);
        assert_eq!(
            h.handle.snapshot().messages.last(),
            Some(&Message::assistant("A long answer"))
        );
    }

    #[tokio::test]
    async fn stop_while_awaiting_reply_lets_request_finish() {
        let mut h = Harness::ready(vec![Ok("Done".into())]).await;
        h.handle.start();
        h.step().await;
        h.capture_reporter().final_text("Go");
        h.step().await;

        h.handle.stop();
        h.step().await;
        assert_eq!(h.state(), TurnState::AwaitingReply);

        h.step().await;
        assert_eq!(h.state(), TurnState::Speaking);
    }

    // -----------------------------------------------------------------------
    // Stale and duplicate callbacks
    // -----------------------------------------------------------------------

    #[tokio::test]
    async fn late_interim_after_stop_is_ignored() {
        let mut h = Harness::ready(vec![]).await;
        h.handle.start();
        h.step().await;
        let capture = h.capture_reporter();
        h.handle.stop();
        h.step().await;

        capture.interim("late words");
        h.step().await;

        assert_eq!(h.state(), TurnState::Idle);
        assert!(h.handle.snapshot().transcript.is_empty());
    }

    #[tokio::test]
    async fn previous_turn_events_do_not_touch_new_turn() {
        let mut h = Harness::ready(vec![]).await;
        h.handle.start();
        h.step().await;
        let old = h.capture_reporter();
        h.handle.stop();
        h.step().await;

        h.handle.start();
        h.step().await;
        assert_eq!(h.state(), TurnState::Listening);

        old.final_text("from the old turn");
        h.step().await;
        old.interim("old interim");
        h.step().await;

        let snapshot = h.handle.snapshot();
        assert_eq!(h.state(), TurnState::Listening);
        assert!(snapshot.messages.is_empty());
        assert!(snapshot.transcript.is_empty());
        assert!(h.replies.requests().is_empty());
    }

    #[tokio::test]
    async fn only_first_final_result_ends_the_turn() {
        let mut h = Harness::ready(vec![Ok("Answer".into()), Ok("Extra".into())]).await;
        h.handle.start();
        h.step().await;
        let capture = h.capture_reporter();

        capture.final_text("First");
        capture.final_text("Second");
        h.step().await;
        h.step().await;
        h.step().await; // reply

        assert_eq!(h.replies.requests().len(), 1);
        assert_eq!(
            h.handle.snapshot().messages,
            vec![Message::user("First"), Message::assistant("Answer")]
        );
    }

    #[tokio::test]
    async fn ended_event_after_cancel_does_not_reach_next_turn() {
        let mut h = Harness::ready(vec![Ok("One".into()), Ok("Two".into())]).await;
        h.run_turn_until_reply("first").await;
        let first_playback = h.playback_reporter();
        h.handle.stop();
        h.step().await;

        h.run_turn_until_reply("second").await;
        assert_eq!(h.state(), TurnState::Speaking);

        first_playback.ended();
        h.step().await;

        assert_eq!(h.state(), TurnState::Speaking);
    }

    // -----------------------------------------------------------------------
    // Capture outcomes
    // -----------------------------------------------------------------------

    #[tokio::test]
    async fn capture_failure_records_error() {
        let mut h = Harness::ready(vec![]).await;
        h.handle.start();
        h.step().await;
        let capture = h.capture_reporter();
        capture.interim("some");
        h.step().await;

        capture.failed("network");
        h.step().await;

        let snapshot = h.handle.snapshot();
        assert_eq!(h.state(), TurnState::Idle);
        assert_eq!(
            snapshot.error,
            Some(TurnError::CaptureFailed {
                reason: "network".into()
            })
        );
        assert!(snapshot.transcript.is_empty());
    }

    #[tokio::test]
    async fn capture_ending_without_result_returns_to_idle_quietly() {
        let mut h = Harness::ready(vec![]).await;
        h.handle.start();
        h.step().await;

        h.capture_reporter().ended();
        h.step().await;

        assert_eq!(h.state(), TurnState::Idle);
        assert!(h.handle.snapshot().error.is_none());
    }

    #[tokio::test]
    async fn blank_final_transcript_sends_nothing() {
        let mut h = Harness::ready(vec![]).await;
        h.handle.start();
        h.step().await;

        h.capture_reporter().final_text("   ");
        h.step().await;

        assert_eq!(h.state(), TurnState::Idle);
        assert!(h.handle.snapshot().messages.is_empty());
        assert!(h.replies.requests().is_empty());
    }

    // -----------------------------------------------------------------------
    // Playback outcomes
    // -----------------------------------------------------------------------

    #[tokio::test]
    async fn playback_start_failure_is_recoverable() {
        let mut h = Harness::ready(vec![Ok("Reply".into())]).await;
        h.playback.lock().unwrap().fail_speak = Some("espeak-ng not found".into());

        h.run_turn_until_reply("Hi").await;

        let snapshot = h.handle.snapshot();
        assert_eq!(h.state(), TurnState::Idle);
        assert!(matches!(snapshot.error, Some(TurnError::PlaybackFailed { .. })));
        assert_eq!(snapshot.messages.len(), 2);
    }

    #[tokio::test]
    async fn playback_error_event_returns_to_idle() {
        let mut h = Harness::ready(vec![Ok("Reply".into())]).await;
        h.run_turn_until_reply("Hi").await;

        h.playback_reporter().failed("audio device lost");
        h.step().await;

        assert_eq!(h.state(), TurnState::Idle);
        assert!(matches!(
            h.handle.snapshot().error,
            Some(TurnError::PlaybackFailed { .. })
        ));
    }

    #[tokio::test]
    async fn empty_reply_is_logged_but_not_spoken() {
        let mut h = Harness::ready(vec![Ok(String::new())]).await;
        h.run_turn_until_reply("Hi").await;

        assert_eq!(h.state(), TurnState::Idle);
        assert!(h.playback.lock().unwrap().spoken.is_empty());
        assert_eq!(h.handle.snapshot().messages.len(), 2);
    }

    // -----------------------------------------------------------------------
    // Voices
    // -----------------------------------------------------------------------

    #[tokio::test]
    async fn first_voice_is_selected_by_default() {
        let h = Harness::with_voices(
            vec![],
            vec![voice("gmw/en-US", "English (America)"), voice("gmw/en", "English")],
        );

        let snapshot = h.handle.snapshot();
        assert_eq!(snapshot.selected_voice.as_deref(), Some("gmw/en-US"));
        assert_eq!(snapshot.voices.len(), 2);
    }

    #[tokio::test]
    async fn selected_voice_applies_to_next_playback_only() {
        let mut h = Harness::with_voices(
            vec![Ok("First".into()), Ok("Second".into())],
            vec![voice("gmw/en-US", "English (America)"), voice("gmw/en", "English")],
        );
        h.handle.set_context(context());
        h.step().await;

        h.run_turn_until_reply("one").await;
        h.handle.select_voice("gmw/en");
        h.step().await;
        assert_eq!(h.state(), TurnState::Speaking, "selecting a voice never interrupts");
        assert_eq!(h.playback.lock().unwrap().cancels, 0);

        h.playback_reporter().ended();
        h.step().await;
        h.run_turn_until_reply("two").await;

        let spoken = &h.playback.lock().unwrap().spoken;
        assert_eq!(spoken[0].voice.as_deref(), Some("gmw/en-US"));
        assert_eq!(spoken[1].voice.as_deref(), Some("gmw/en"));
    }

    // -----------------------------------------------------------------------
    // Context lifecycle
    // -----------------------------------------------------------------------

    #[tokio::test]
    async fn incomplete_context_is_not_ready() {
        let mut h = Harness::new(vec![]);
        h.handle.set_context(SessionContext {
            persona: "  ".into(),
            ..context()
        });
        h.step().await;

        assert!(!h.handle.snapshot().ready);
    }

    #[tokio::test]
    async fn clearing_context_drops_log_and_in_flight_reply() {
        let mut h = Harness::ready(vec![Ok("Too late".into())]).await;
        h.handle.start();
        h.step().await;
        h.capture_reporter().final_text("Question");
        h.step().await;

        h.handle.clear_context();
        h.step().await;
        assert_eq!(h.state(), TurnState::Idle);
        assert!(h.handle.snapshot().messages.is_empty());

        h.step().await; // stale reply
        let snapshot = h.handle.snapshot();
        assert_eq!(h.state(), TurnState::Idle);
        assert!(snapshot.messages.is_empty());
        assert!(!snapshot.ready);
        assert!(h.playback.lock().unwrap().spoken.is_empty());
    }

    #[tokio::test]
    async fn clearing_context_while_listening_stops_capture() {
        let mut h = Harness::ready(vec![]).await;
        h.handle.start();
        h.step().await;

        h.handle.clear_context();
        h.step().await;

        assert_eq!(h.state(), TurnState::Idle);
        assert_eq!(h.capture.lock().unwrap().stops, 1);
        assert!(h.handle.snapshot().document_name.is_none());
    }

    #[tokio::test]
    async fn replacing_context_keeps_conversation() {
        let mut h = Harness::ready(vec![Ok("Hello".into())]).await;
        h.handle.toggle_mute();
        h.step().await;
        h.run_turn_until_reply("Hi").await;

        h.handle.set_context(SessionContext {
            document_name: "other.md".into(),
            ..context()
        });
        h.step().await;

        let snapshot = h.handle.snapshot();
        assert_eq!(snapshot.messages.len(), 2);
        assert_eq!(snapshot.document_name.as_deref(), Some("other.md"));
    }

    // -----------------------------------------------------------------------
    // Shutdown / run loop
    // -----------------------------------------------------------------------

    #[tokio::test]
    async fn shutdown_stops_open_capture() {
        let mut h = Harness::ready(vec![]).await;
        h.handle.start();
        h.step().await;

        h.handle.shutdown();
        assert!(!h.controller.step().await);
        assert_eq!(h.capture.lock().unwrap().stops, 1);
    }

    #[tokio::test]
    async fn run_returns_after_shutdown() {
        let h = Harness::new(vec![]);
        let handle = h.handle.clone();
        let task = tokio::spawn(h.controller.run());

        handle.shutdown();
        task.await.expect("controller task panicked");
    }

    // -----------------------------------------------------------------------
    // Invariants over arbitrary event sequences
    // -----------------------------------------------------------------------

    #[tokio::test]
    async fn invariants_hold_for_pseudo_random_event_sequences() {
        let replies = (0..500).map(|i| Ok(format!("reply {i}"))).collect();
        let mut h = Harness::ready(replies).await;
        let mut seed: u64 = 0x5eed;

        for _ in 0..500 {
            seed = seed
                .wrapping_mul(6364136223846793005)
                .wrapping_add(1442695040888963407);
            let capture = h.capture.lock().unwrap().reporter.clone();
            let playback = h.playback.lock().unwrap().reporter.clone();

            let sent = match (seed >> 33) % 8 {
                0 => {
                    h.handle.start();
                    true
                }
                1 => {
                    h.handle.stop();
                    true
                }
                2 => {
                    h.handle.toggle_mute();
                    true
                }
                3 => capture.map(|c| c.interim("partial")).unwrap_or(false),
                4 => capture.map(|c| c.final_text("question")).unwrap_or(false),
                5 => capture.map(|c| c.failed("glitch")).unwrap_or(false),
                6 => playback
                    .map(|p| {
                        h.playback.lock().unwrap().active = false;
                        p.ended()
                    })
                    .unwrap_or(false),
                _ => capture.map(|c| c.ended()).unwrap_or(false),
            };
            if !sent {
                continue;
            }
            h.step().await;
            if h.state() == TurnState::AwaitingReply {
                h.step().await;
            }

            let state = h.state();
            let snapshot = h.handle.snapshot();
            assert_eq!(
                h.capture.lock().unwrap().active,
                state == TurnState::Listening,
                "capture open only while listening"
            );
            assert_eq!(
                h.playback.lock().unwrap().active,
                state == TurnState::Speaking,
                "playback active only while speaking"
            );
            if state != TurnState::Listening {
                assert!(snapshot.transcript.is_empty());
            }
            if state != TurnState::AwaitingReply {
                assert_eq!(snapshot.messages.len() % 2, 0, "every user message is answered");
            }
        }
    }
}
