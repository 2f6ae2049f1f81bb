//! Turn state machine states and the session data they operate on.
//!
//! [`TurnState`] is the controller's single source of truth for "what is
//! happening right now".  Capturing, generating and speaking are variants of
//! one enum, so two of them can never be active at once.
//!
//! [`Session`] holds everything else a conversation owns: the append-only
//! message log, the interim transcript, the mute flag, the selected voice,
//! the most recent error and the document/persona context.

use thiserror::Error;

// ---------------------------------------------------------------------------
// TurnState
// ---------------------------------------------------------------------------

/// States of the voice-turn controller.
///
/// ```text
/// Idle ──start──▶ Listening ──final──▶ AwaitingReply ──success──▶ Speaking
///  ▲                 │ stop/error/ended      │ failure / success+muted   │ end/stop/mute
///  └─────────────────┴───────────────────────┴───────────────────────────┘
/// ```
///
/// There is no terminal state; the controller cycles for the lifetime of
/// the session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TurnState {
    #[default]
    Idle,
    /// The capture source is open and streaming transcripts.
    Listening,
    /// A reply request is in flight.
    AwaitingReply,
    /// The playback sink is speaking the latest assistant message.
    Speaking,
}

impl TurnState {
    /// Collapse into the four-valued phase shown to the caller.
    pub fn phase(self) -> SessionPhase {
        match self {
            TurnState::Idle => SessionPhase::Idle,
            TurnState::Listening => SessionPhase::Listening,
            TurnState::AwaitingReply => SessionPhase::Thinking,
            TurnState::Speaking => SessionPhase::Speaking,
        }
    }
}

// ---------------------------------------------------------------------------
// SessionPhase
// ---------------------------------------------------------------------------

/// Caller-facing projection of [`TurnState`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SessionPhase {
    #[default]
    Idle,
    Listening,
    Thinking,
    Speaking,
}

impl SessionPhase {
    /// Short label for a status indicator.
    pub fn label(self) -> &'static str {
        match self {
            SessionPhase::Idle => "Idle",
            SessionPhase::Listening => "Listening",
            SessionPhase::Thinking => "Thinking",
            SessionPhase::Speaking => "Speaking",
        }
    }

    /// One-line hint telling the user what the microphone control does now.
    pub fn hint(self) -> &'static str {
        match self {
            SessionPhase::Idle => "Click microphone to speak",
            SessionPhase::Listening => "Listening... Click to stop",
            SessionPhase::Thinking => "Processing...",
            SessionPhase::Speaking => "Speaking...",
        }
    }
}

// ---------------------------------------------------------------------------
// Message
// ---------------------------------------------------------------------------

/// Who said a [`Message`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    User,
    Assistant,
}

/// One entry of the conversation log.  Immutable once appended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    pub role: Role,
    pub text: String,
}

impl Message {
    pub fn user(text: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            text: text.into(),
        }
    }

    pub fn assistant(text: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            text: text.into(),
        }
    }
}

// ---------------------------------------------------------------------------
// TurnError
// ---------------------------------------------------------------------------

/// Recoverable failures surfaced to the caller.
///
/// None of these are fatal: the controller is back in `Idle` with the
/// message log intact whenever one is recorded.  The most recent error stays
/// visible until the next turn starts.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TurnError {
    #[error("Speech recognition is not supported on this system")]
    CaptureUnsupported,

    #[error("Speech recognition error: {reason}")]
    CaptureFailed { reason: String },

    #[error("Failed to get response. Please try again.")]
    ReplyFailed { reason: String },

    #[error("Speech playback failed: {reason}")]
    PlaybackFailed { reason: String },
}

// ---------------------------------------------------------------------------
// SessionContext
// ---------------------------------------------------------------------------

/// The background a session converses about.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionContext {
    /// Display name of the ingested document.
    pub document_name: String,
    /// Extracted document text.
    pub document_text: String,
    /// System instruction shaping the assistant's tone.
    pub persona: String,
}

impl SessionContext {
    /// A session can hold turns only with both a document and a persona.
    pub fn is_ready(&self) -> bool {
        !self.document_text.is_empty() && !self.persona.trim().is_empty()
    }
}

// ---------------------------------------------------------------------------
// Session
// ---------------------------------------------------------------------------

/// Mutable conversation state owned exclusively by the turn controller.
#[derive(Debug, Clone, Default)]
pub struct Session {
    /// Append-only conversation history.
    pub messages: Vec<Message>,
    /// Partial recognition output; never part of `messages`.
    pub transcript: String,
    pub muted: bool,
    /// Voice used for the next playback; `None` means system default.
    pub selected_voice: Option<String>,
    /// Most recent recoverable error.
    pub error: Option<TurnError>,
    /// Installed only when ready.
    pub context: Option<SessionContext>,
}

impl Session {
    pub fn is_ready(&self) -> bool {
        self.context.is_some()
    }

    /// Drop the conversation and every transient field; keeps mute and
    /// voice preferences.
    pub fn reset(&mut self) {
        self.messages.clear();
        self.transcript.clear();
        self.error = None;
        self.context = None;
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
