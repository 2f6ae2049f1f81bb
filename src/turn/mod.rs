//! Voice-turn orchestration.
//!
//! One [`TurnController`] per session sequences speech capture, reply
//! generation and speech playback.  Callers talk to it through a
//! [`SessionHandle`]; adapters report back through the reporters in
//! [`event`].

pub mod controller;
pub mod event;
pub mod state;
pub mod surface;

#[cfg(test)]
pub(crate) mod mock;

pub use controller::TurnController;
pub use event::{
    CaptureEvent, CaptureReporter, ControllerMessage, Generation, PlaybackEvent, PlaybackReporter,
    SessionCommand,
};
pub use state::{Message, Role, Session, SessionContext, SessionPhase, TurnError, TurnState};
pub use surface::{SessionHandle, SessionSnapshot};
