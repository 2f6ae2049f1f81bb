//! Caller-facing surface of a running session.
//!
//! [`SessionHandle`] turns method calls into [`SessionCommand`]s on the
//! controller inbox and exposes the latest [`SessionSnapshot`] through a
//! `watch` channel.  It never touches session state directly.

use tokio::sync::watch;

use crate::playback::VoiceOption;

use super::event::{ControllerMessage, Inbox, SessionCommand};
use super::state::{Message, SessionContext, SessionPhase, TurnError};

// ---------------------------------------------------------------------------
// SessionSnapshot
// ---------------------------------------------------------------------------

/// Everything a UI needs to render the session, published after every
/// message the controller handles.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SessionSnapshot {
    pub ready: bool,
    pub phase: SessionPhase,
    pub messages: Vec<Message>,
    pub transcript: String,
    pub muted: bool,
    pub selected_voice: Option<String>,
    pub voices: Vec<VoiceOption>,
    pub error: Option<TurnError>,
    pub document_name: Option<String>,
}

impl SessionSnapshot {
    pub fn is_thinking(&self) -> bool {
        self.phase == SessionPhase::Thinking
    }

    /// Name of the selected voice, falling back to its id.
    pub fn selected_voice_name(&self) -> Option<&str> {
        let id = self.selected_voice.as_deref()?;
        Some(
            self.voices
                .iter()
                .find(|v| v.id == id)
                .map(|v| v.name.as_str())
                .unwrap_or(id),
        )
    }
}

// ---------------------------------------------------------------------------
// SessionHandle
// ---------------------------------------------------------------------------

/// Cloneable remote control for a [`TurnController`](super::TurnController).
#[derive(Debug, Clone)]
pub struct SessionHandle {
    inbox: Inbox,
    snapshot: watch::Receiver<SessionSnapshot>,
}

impl SessionHandle {
    pub(crate) fn new(inbox: Inbox, snapshot: watch::Receiver<SessionSnapshot>) -> Self {
        Self { inbox, snapshot }
    }

    /// Begin a turn.  Ignored unless the session is idle and ready.
    pub fn start(&self) {
        self.send(SessionCommand::Start);
    }

    /// End the current capture or playback.
    pub fn stop(&self) {
        self.send(SessionCommand::Stop);
    }

    pub fn toggle_mute(&self) {
        self.send(SessionCommand::ToggleMute);
    }

    pub fn select_voice(&self, id: impl Into<String>) {
        self.send(SessionCommand::SelectVoice(id.into()));
    }

    pub fn set_context(&self, context: SessionContext) {
        self.send(SessionCommand::SetContext(context));
    }

    pub fn clear_context(&self) {
        self.send(SessionCommand::ClearContext);
    }

    pub fn shutdown(&self) {
        self.send(SessionCommand::Shutdown);
    }

    /// Latest published snapshot.
    pub fn snapshot(&self) -> SessionSnapshot {
        self.snapshot.borrow().clone()
    }

    /// Wait until a new snapshot is published.  Returns `false` once the
    /// controller has been dropped.
    pub async fn changed(&mut self) -> bool {
        self.snapshot.changed().await.is_ok()
    }

    /// Forward a raw command to the controller.
    pub fn send(&self, command: SessionCommand) {
        if let Err(err) = self.inbox.send(ControllerMessage::Command(command)) {
            log::warn!("session: controller is gone, dropping {:?}", err.0);
        }
    }
}
