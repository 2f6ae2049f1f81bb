//! OS-level key listener on a dedicated thread.
//!
//! `rdev::listen` blocks forever and has no shutdown API, so it lives on its
//! own thread for the rest of the process.  Dropping [`HotkeyListener`]
//! only sets a flag that stops forwarding.

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::sync::mpsc;

use super::{HotkeyBindings, HotkeyEvent};

/// Emits one event per physical press; OS auto-repeat while a key is held
/// is swallowed until the key is released.
#[derive(Debug, Default)]
pub struct KeyLatch {
    held: HashSet<HotkeyEvent>,
}

impl KeyLatch {
    pub fn press(&mut self, event: HotkeyEvent) -> bool {
        self.held.insert(event)
    }

    pub fn release(&mut self, event: HotkeyEvent) {
        self.held.remove(&event);
    }
}

pub struct HotkeyListener {
    stop: Arc<AtomicBool>,
    _thread: std::thread::JoinHandle<()>,
}

impl HotkeyListener {
    /// Start listening for `bindings`, forwarding presses to `tx`.
    pub fn start(
        bindings: HotkeyBindings,
        tx: mpsc::Sender<HotkeyEvent>,
    ) -> std::io::Result<Self> {
        let stop = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&stop);

        let thread = std::thread::Builder::new()
            .name("hotkey-listener".into())
            .spawn(move || {
                let mut latch = KeyLatch::default();
                let result = rdev::listen(move |event| {
                    if flag.load(Ordering::Relaxed) {
                        return;
                    }
                    match event.event_type {
                        rdev::EventType::KeyPress(key) => {
                            if let Some(ev) = bindings.event_for(key) {
                                if latch.press(ev) {
                                    let _ = tx.blocking_send(ev);
                                }
                            }
                        }
                        rdev::EventType::KeyRelease(key) => {
                            if let Some(ev) = bindings.event_for(key) {
                                latch.release(ev);
                            }
                        }
                        _ => {}
                    }
                });
                if let Err(e) = result {
                    log::error!("hotkey: rdev::listen failed: {e:?}");
                }
            })?;

        log::info!("hotkey: talk={:?} mute={:?}", bindings.talk, bindings.mute);
        Ok(Self {
            stop,
            _thread: thread,
        })
    }
}

impl Drop for HotkeyListener {
    fn drop(&mut self) {
        self.stop.store(true, Ordering::Relaxed);
    }
}
