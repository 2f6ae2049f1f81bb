//! Messages consumed by the turn controller.
//!
//! Every input the controller reacts to (a caller command, a capture
//! transcript, a finished reply request, a playback notification) arrives as
//! one [`ControllerMessage`] on a single channel, so transitions are
//! processed strictly one at a time.
//!
//! Adapter events carry the [`Generation`] that was current when their
//! operation started.  The reporters handed to adapters stamp it for them.

use tokio::sync::mpsc;

use crate::reply::ReplyError;

use super::state::SessionContext;

// ---------------------------------------------------------------------------
// Generation
// ---------------------------------------------------------------------------

/// Monotonic tag identifying one controller state instance.
///
/// Advanced on every state transition; a callback whose tag no longer
/// matches belongs to an operation the controller has already left.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Generation(u64);

impl Generation {
    pub fn next(self) -> Self {
        Generation(self.0.wrapping_add(1))
    }

    pub fn value(self) -> u64 {
        self.0
    }
}

// ---------------------------------------------------------------------------
// Adapter events
// ---------------------------------------------------------------------------

/// Output of a speech capture session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CaptureEvent {
    /// Partial transcript; replaces the previous interim text.
    Interim(String),
    /// Finalised utterance.  Only the first one of a session ends the turn.
    Final(String),
    /// Recognition error other than a caller-requested stop.
    Failed(String),
    /// The source finished without producing a final result.
    Ended,
}

/// Notifications from a speech playback sink.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlaybackEvent {
    Started,
    Ended,
    Failed(String),
}

// ---------------------------------------------------------------------------
// Commands
// ---------------------------------------------------------------------------

/// Control operations issued through the session surface.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionCommand {
    Start,
    Stop,
    ToggleMute,
    SelectVoice(String),
    SetContext(SessionContext),
    ClearContext,
    /// Stop adapters and end the controller loop.
    Shutdown,
}

// ---------------------------------------------------------------------------
// ControllerMessage
// ---------------------------------------------------------------------------

/// Everything the controller's inbox carries.
#[derive(Debug)]
pub enum ControllerMessage {
    Command(SessionCommand),
    Capture {
        generation: Generation,
        event: CaptureEvent,
    },
    Reply {
        generation: Generation,
        result: Result<String, ReplyError>,
    },
    Playback {
        generation: Generation,
        event: PlaybackEvent,
    },
}

/// Sending half of the controller inbox.
pub type Inbox = mpsc::UnboundedSender<ControllerMessage>;

// ---------------------------------------------------------------------------
// Reporters
// ---------------------------------------------------------------------------

/// Handle a capture source uses to deliver events for one capture session.
///
/// Cheap to clone and usable from any thread.  Every method returns `false`
/// once the controller is gone so workers can stop early.
#[derive(Debug, Clone)]
pub struct CaptureReporter {
    generation: Generation,
    inbox: Inbox,
}

impl CaptureReporter {
    pub fn new(generation: Generation, inbox: Inbox) -> Self {
        Self { generation, inbox }
    }

    pub fn generation(&self) -> Generation {
        self.generation
    }

    pub fn interim(&self, text: impl Into<String>) -> bool {
        self.send(CaptureEvent::Interim(text.into()))
    }

    pub fn final_text(&self, text: impl Into<String>) -> bool {
        self.send(CaptureEvent::Final(text.into()))
    }

    pub fn failed(&self, reason: impl Into<String>) -> bool {
        self.send(CaptureEvent::Failed(reason.into()))
    }

    pub fn ended(&self) -> bool {
        self.send(CaptureEvent::Ended)
    }

    fn send(&self, event: CaptureEvent) -> bool {
        self.inbox
            .send(ControllerMessage::Capture {
                generation: self.generation,
                event,
            })
            .is_ok()
    }
}

/// Handle a playback sink uses to report on one utterance.
#[derive(Debug, Clone)]
pub struct PlaybackReporter {
    generation: Generation,
    inbox: Inbox,
}

impl PlaybackReporter {
    pub fn new(generation: Generation, inbox: Inbox) -> Self {
        Self { generation, inbox }
    }

    pub fn generation(&self) -> Generation {
        self.generation
    }

    pub fn started(&self) -> bool {
        self.send(PlaybackEvent::Started)
    }

    pub fn ended(&self) -> bool {
        self.send(PlaybackEvent::Ended)
    }

    pub fn failed(&self, reason: impl Into<String>) -> bool {
        self.send(PlaybackEvent::Failed(reason.into()))
    }

    fn send(&self, event: PlaybackEvent) -> bool {
        self.inbox
            .send(ControllerMessage::Playback {
                generation: self.generation,
                event,
            })
            .is_ok()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
