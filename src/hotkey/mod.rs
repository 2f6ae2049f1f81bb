//! Global hotkeys: talk and mute, backed by `rdev`.
//!
//! ```text
//! rdev thread ──HotkeyEvent──▶ route_hotkeys task ──SessionCommand──▶ controller
//!                              (reads the current phase)
//! ```
//!
//! The talk key toggles: it starts a turn when idle and stops listening or
//! speaking otherwise.  While a reply is being generated it does nothing.

pub mod listener;

use tokio::sync::mpsc;

use crate::config::HotkeyConfig;
use crate::turn::{SessionCommand, SessionHandle, SessionPhase};

pub use listener::HotkeyListener;

/// Key presses forwarded by the listener thread.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HotkeyEvent {
    TalkPressed,
    MutePressed,
}

/// Resolved key bindings.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HotkeyBindings {
    pub talk: rdev::Key,
    pub mute: rdev::Key,
}

impl HotkeyBindings {
    /// Resolve the configured key names, falling back to F9 / F10 for
    /// names that are not recognised.
    pub fn from_config(config: &HotkeyConfig) -> Self {
        let resolve = |name: &str, fallback: rdev::Key| {
            parse_key(name).unwrap_or_else(|| {
                log::warn!("hotkey: unknown key {name:?}, using {fallback:?}");
                fallback
            })
        };
        Self {
            talk: resolve(&config.talk_key, rdev::Key::F9),
            mute: resolve(&config.mute_key, rdev::Key::F10),
        }
    }

    pub fn event_for(&self, key: rdev::Key) -> Option<HotkeyEvent> {
        if key == self.talk {
            Some(HotkeyEvent::TalkPressed)
        } else if key == self.mute {
            Some(HotkeyEvent::MutePressed)
        } else {
            None
        }
    }
}

/// The command a hotkey press means in `phase`.
pub fn route_hotkey(event: HotkeyEvent, phase: SessionPhase) -> Option<SessionCommand> {
    match (event, phase) {
        (HotkeyEvent::MutePressed, _) => Some(SessionCommand::ToggleMute),
        (HotkeyEvent::TalkPressed, SessionPhase::Idle) => Some(SessionCommand::Start),
        (HotkeyEvent::TalkPressed, SessionPhase::Listening | SessionPhase::Speaking) => {
            Some(SessionCommand::Stop)
        }
        (HotkeyEvent::TalkPressed, SessionPhase::Thinking) => None,
    }
}

/// Forward hotkey presses to the session until the listener goes away.
pub async fn route_hotkeys(mut events: mpsc::Receiver<HotkeyEvent>, session: SessionHandle) {
    while let Some(event) = events.recv().await {
        let phase = session.snapshot().phase;
        match route_hotkey(event, phase) {
            Some(command) => session.send(command),
            None => log::debug!("hotkey: {event:?} ignored while {}", phase.label()),
        }
    }
}

/// Parse a key name from the config file.  Case-insensitive; supports
/// F1–F12, common named keys and single letters.
///
/// ```
/// use doc_voice_agent::hotkey::parse_key;
///
/// assert_eq!(parse_key("F9"), Some(rdev::Key::F9));
/// assert_eq!(parse_key("esc"), Some(rdev::Key::Escape));
/// assert_eq!(parse_key("m"), Some(rdev::Key::KeyM));
/// assert_eq!(parse_key("Ctrl+M"), None);
/// ```
pub fn parse_key(name: &str) -> Option<rdev::Key> {
    use rdev::Key::*;

    const LETTERS: [rdev::Key; 26] = [
        KeyA, KeyB, KeyC, KeyD, KeyE, KeyF, KeyG, KeyH, KeyI, KeyJ, KeyK, KeyL, KeyM, KeyN, KeyO,
        KeyP, KeyQ, KeyR, KeyS, KeyT, KeyU, KeyV, KeyW, KeyX, KeyY, KeyZ,
    ];
    const FUNCTION: [rdev::Key; 12] = [F1, F2, F3, F4, F5, F6, F7, F8, F9, F10, F11, F12];

    let upper = name.trim().to_ascii_uppercase();
    let key = match upper.as_str() {
        "ESCAPE" | "ESC" => Escape,
        "SPACE" => Space,
        "RETURN" | "ENTER" => Return,
        "TAB" => Tab,
        "HOME" => Home,
        "END" => End,
        "PAGEUP" => PageUp,
        "PAGEDOWN" => PageDown,
        "PAUSE" => Pause,
        "SCROLLLOCK" => ScrollLock,
        "PRINTSCREEN" => PrintScreen,
        s if s.len() == 1 && s.as_bytes()[0].is_ascii_uppercase() => {
            LETTERS[usize::from(s.as_bytes()[0] - b'A')]
        }
        s => {
            let n: usize = s.strip_prefix('F')?.parse().ok()?;
            *FUNCTION.get(n.checked_sub(1)?)?
        }
    };
    Some(key)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn talk_key_toggles_by_phase() {
        let talk = HotkeyEvent::TalkPressed;
        assert_eq!(route_hotkey(talk, SessionPhase::Idle), Some(SessionCommand::Start));
        assert_eq!(route_hotkey(talk, SessionPhase::Listening), Some(SessionCommand::Stop));
        assert_eq!(route_hotkey(talk, SessionPhase::Speaking), Some(SessionCommand::Stop));
        assert_eq!(route_hotkey(talk, SessionPhase::Thinking), None);
    }

    #[test]
    fn mute_key_always_toggles() {
        for phase in [
            SessionPhase::Idle,
            SessionPhase::Listening,
            SessionPhase::Thinking,
            SessionPhase::Speaking,
        ] {
            assert_eq!(
                route_hotkey(HotkeyEvent::MutePressed, phase),
                Some(SessionCommand::ToggleMute)
            );
        }
    }

    #[test]
    fn parses_function_and_letter_keys() {
        assert_eq!(parse_key("F1"), Some(rdev::Key::F1));
        assert_eq!(parse_key("f12"), Some(rdev::Key::F12));
        assert_eq!(parse_key("A"), Some(rdev::Key::KeyA));
        assert_eq!(parse_key("z"), Some(rdev::Key::KeyZ));
        assert_eq!(parse_key("Enter"), Some(rdev::Key::Return));
    }

    #[test]
    fn rejects_unknown_names() {
        assert_eq!(parse_key(""), None);
        assert_eq!(parse_key("F0"), None);
        assert_eq!(parse_key("F13"), None);
        assert_eq!(parse_key("1"), None);
        assert_eq!(parse_key("xyz"), None);
    }

    #[test]
    fn bindings_fall_back_for_unknown_names() {
        let bindings = HotkeyBindings::from_config(&HotkeyConfig {
            talk_key: "nonsense".into(),
            mute_key: "M".into(),
        });
        assert_eq!(bindings.talk, rdev::Key::F9);
        assert_eq!(bindings.mute, rdev::Key::KeyM);
        assert_eq!(bindings.event_for(rdev::Key::KeyM), Some(HotkeyEvent::MutePressed));
        assert_eq!(bindings.event_for(rdev::Key::KeyQ), None);
    }
}
