//! Document Voice Agent: talk to an uploaded document through a hosted LLM.
//!
//! The heart of the crate is [`turn::TurnController`], a single state machine
//! per session that sequences speech capture, reply generation and speech
//! playback into one interruptible turn.  Everything else plugs into it:
//!
//! * [`capture`]: speech capture sources (continuous whisper recognizer).
//! * [`playback`]: speech playback sinks (`espeak-ng`).
//! * [`reply`]: reply generators (Gemini / OpenAI-compatible HTTP).
//! * [`document`]: document ingestion into plain context text.
//! * [`config`], [`hotkey`], [`app`]: settings, global keys, desktop window.

pub mod app;
pub mod audio;
pub mod capture;
pub mod config;
pub mod document;
pub mod hotkey;
pub mod playback;
pub mod reply;
pub mod stt;
pub mod turn;
