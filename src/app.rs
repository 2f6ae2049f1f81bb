//! Desktop window: egui/eframe rendering of a running session.
//!
//! # Architecture
//!
//! [`DocVoiceApp`] is the top-level [`eframe::App`].  It owns no turn
//! state: every frame it reads the latest [`SessionSnapshot`] from its
//! [`SessionHandle`] and turns clicks into session commands.
//!
//! ```text
//! controller ──watch──▶ SessionSnapshot ──▶ update() renders
//!     ▲                                         │
//!     └────────── SessionHandle commands ◀──────┘ clicks
//! ```
//!
//! [`repaint_on_change`] wakes the UI whenever the controller publishes, so
//! the window does not have to poll.
//!
//! # Layout
//!
//! | Area | Contents |
//! |------|----------|
//! | Header | readiness dot, document name, mute toggle |
//! | Setup | document path + load, persona, start/clear session |
//! | Voice | voice picker |
//! | Log | conversation, interim transcript, thinking spinner |
//! | Footer | error, microphone / stop buttons, status line |

use std::path::PathBuf;
use std::time::Duration;

use eframe::egui;

use crate::config::{AppConfig, SessionConfig};
use crate::document::Document;
use crate::hotkey::{route_hotkey, HotkeyEvent};
use crate::turn::{Role, SessionContext, SessionHandle, SessionPhase, SessionSnapshot};

// ---------------------------------------------------------------------------
// Colours
// ---------------------------------------------------------------------------

const DIM: egui::Color32 = egui::Color32::from_rgb(120, 120, 120);
const READY: egui::Color32 = egui::Color32::from_rgb(80, 200, 120);
const LISTENING: egui::Color32 = egui::Color32::from_rgb(255, 68, 68);
const THINKING: egui::Color32 = egui::Color32::from_rgb(68, 136, 255);
const WARNING: egui::Color32 = egui::Color32::from_rgb(255, 136, 68);

// ---------------------------------------------------------------------------
// DocVoiceApp
// ---------------------------------------------------------------------------

pub struct DocVoiceApp {
    session: SessionHandle,
    /// Snapshot rendered this frame.
    snapshot: SessionSnapshot,

    // ── Setup form ───────────────────────────────────────────────────────
    document_path: String,
    persona: String,
    /// Last successfully loaded document.
    document: Option<Document>,
    /// Why the last load attempt failed.
    load_error: Option<String>,

    spinner_phase: f32,
    hotkey_hint: String,
    /// Written back to disk when a session starts.
    config: AppConfig,
}

impl DocVoiceApp {
    /// Create the window state, pre-filling the setup form from `config`.
    pub fn new(session: SessionHandle, config: &AppConfig) -> Self {
        Self {
            snapshot: session.snapshot(),
            session,
            document_path: config
                .session
                .document_path
                .as_ref()
                .map(|p| p.display().to_string())
                .unwrap_or_default(),
            persona: config.session.persona.clone(),
            document: None,
            load_error: None,
            spinner_phase: 0.0,
            hotkey_hint: format!(
                "{} talk / stop, {} mute",
                config.hotkey.talk_key, config.hotkey.mute_key
            ),
            config: config.clone(),
        }
    }

    /// Show `document` as already loaded, e.g. the startup document.
    pub fn with_document(mut self, document: Document) -> Self {
        self.document = Some(document);
        self
    }

    // ── Setup actions ────────────────────────────────────────────────────

    fn load_document(&mut self) {
        let path = self.document_path.trim();
        if path.is_empty() {
            self.load_error = Some("Enter a document path first".into());
            return;
        }
        match Document::load(path) {
            Ok(document) => {
                self.document = Some(document);
                self.load_error = None;
            }
            Err(e) => {
                log::warn!("app: {e}");
                self.document = None;
                self.load_error = Some(e.to_string());
            }
        }
    }

    fn start_session(&mut self) {
        match build_context(self.document.as_ref(), &self.persona) {
            Some(context) => {
                self.session.set_context(context);
                self.persist_setup();
            }
            None => {
                self.load_error = Some("A document and a persona are both required".into());
            }
        }
    }

    /// Remember the document path and persona for the next launch.
    fn persist_setup(&mut self) {
        if !remember_setup(&mut self.config.session, &self.document_path, &self.persona) {
            return;
        }
        match self.config.save() {
            Ok(()) => log::info!("app: session setup saved"),
            Err(e) => log::warn!("app: failed to save settings: {e}"),
        }
    }

    fn clear_session(&mut self) {
        self.session.clear_context();
        self.document = None;
        self.load_error = None;
    }

    // ── Panel renderers ──────────────────────────────────────────────────

    fn draw_header(&mut self, ui: &mut egui::Ui) {
        ui.horizontal(|ui| {
            let (dot, label) = if self.snapshot.ready {
                (READY, "Ready")
            } else {
                (DIM, "Not ready")
            };
            ui.label(egui::RichText::new("●").color(dot));
            ui.label(egui::RichText::new(label).strong());
            if let Some(name) = &self.snapshot.document_name {
                ui.label(egui::RichText::new(name).color(DIM).size(12.0));
            }

            ui.with_layout(egui::Layout::right_to_left(egui::Align::Center), |ui| {
                let text = if self.snapshot.muted { "Unmute" } else { "Mute" };
                if ui.button(text).clicked() {
                    self.session.toggle_mute();
                }
            });
        });
    }

    fn draw_setup(&mut self, ui: &mut egui::Ui) {
        egui::CollapsingHeader::new("Document & persona")
            .default_open(!self.snapshot.ready)
            .show(ui, |ui| {
                ui.horizontal(|ui| {
                    ui.label("Document");
                    ui.add(
                        egui::TextEdit::singleline(&mut self.document_path)
                            .hint_text("/path/to/notes.md")
                            .desired_width(280.0),
                    );
                    if ui.button("Load").clicked() {
                        self.load_document();
                    }
                });
                if let Some(document) = &self.document {
                    ui.label(
                        egui::RichText::new(format!(
                            "{} ({} characters)",
                            document.name,
                            document.content.chars().count()
                        ))
                        .color(READY)
                        .size(12.0),
                    );
                }

                ui.label("Persona");
                ui.add(
                    egui::TextEdit::multiline(&mut self.persona)
                        .hint_text("You are a friendly tutor who explains things simply.")
                        .desired_rows(3)
                        .desired_width(f32::INFINITY),
                );

                ui.horizontal(|ui| {
                    let can_start = build_context(self.document.as_ref(), &self.persona).is_some();
                    if ui
                        .add_enabled(can_start, egui::Button::new("Start session"))
                        .clicked()
                    {
                        self.start_session();
                    }
                    if ui.button("Clear").clicked() {
                        self.clear_session();
                    }
                });

                if let Some(err) = &self.load_error {
                    ui.label(egui::RichText::new(err).color(WARNING).size(12.0));
                }
            });
    }

    fn draw_voice_picker(&mut self, ui: &mut egui::Ui) {
        if self.snapshot.voices.is_empty() {
            return;
        }
        let selected = self
            .snapshot
            .selected_voice_name()
            .unwrap_or("System default")
            .to_string();

        ui.horizontal(|ui| {
            ui.label("Voice");
            egui::ComboBox::from_id_salt("voice-picker")
                .selected_text(selected)
                .show_ui(ui, |ui| {
                    for voice in &self.snapshot.voices {
                        let current = self.snapshot.selected_voice.as_deref() == Some(&voice.id);
                        let label = format!("{} ({})", voice.name, voice.lang);
                        if ui.selectable_label(current, label).clicked() && !current {
                            self.session.select_voice(voice.id.clone());
                        }
                    }
                });
        });
    }

    fn draw_log(&self, ui: &mut egui::Ui) {
        let footer = 90.0;
        egui::ScrollArea::vertical()
            .auto_shrink([false, false])
            .stick_to_bottom(true)
            .max_height((ui.available_height() - footer).max(80.0))
            .show(ui, |ui| {
                if self.snapshot.messages.is_empty() && self.snapshot.transcript.is_empty() {
                    ui.label(
                        egui::RichText::new("Ask a question about your document.")
                            .color(DIM)
                            .italics(),
                    );
                }

                for message in &self.snapshot.messages {
                    let (who, colour) = match message.role {
                        Role::User => ("You", THINKING),
                        Role::Assistant => ("Assistant", READY),
                    };
                    ui.label(egui::RichText::new(who).color(colour).size(11.0).strong());
                    ui.label(egui::RichText::new(&message.text).size(13.0));
                    ui.add_space(6.0);
                }

                if !self.snapshot.transcript.is_empty() {
                    ui.label(
                        egui::RichText::new(&self.snapshot.transcript)
                            .color(DIM)
                            .italics()
                            .size(13.0),
                    );
                }

                if self.snapshot.is_thinking() {
                    ui.label(
                        egui::RichText::new(format!("{} Thinking...", self.spinner_char()))
                            .color(THINKING)
                            .size(13.0),
                    );
                }
            });
    }

    fn draw_footer(&mut self, ui: &mut egui::Ui) {
        if let Some(err) = &self.snapshot.error {
            ui.label(egui::RichText::new(err.to_string()).color(WARNING).size(12.0));
        }

        let phase = self.snapshot.phase;
        ui.horizontal(|ui| {
            let mic = egui::Button::new(
                egui::RichText::new(mic_label(phase)).color(phase_color(phase)).size(15.0),
            )
            .min_size(egui::vec2(110.0, 32.0));
            let mic_enabled = self.snapshot.ready && phase != SessionPhase::Thinking;
            if ui.add_enabled(mic_enabled, mic).clicked() {
                if let Some(command) = route_hotkey(HotkeyEvent::TalkPressed, phase) {
                    self.session.send(command);
                }
            }

            if phase == SessionPhase::Speaking && ui.button("Stop").clicked() {
                self.session.stop();
            }
        });

        ui.label(egui::RichText::new(status_line(&self.snapshot)).color(DIM).size(12.0));
        ui.label(egui::RichText::new(&self.hotkey_hint).color(DIM).size(10.0));
    }

    // ── Helpers ───────────────────────────────────────────────────────────

    fn spinner_char(&self) -> char {
        let chars = ['|', '/', '-', '\\'];
        let idx = (self.spinner_phase as usize) % chars.len();
        chars[idx]
    }
}

/// The context to install, or `None` while the form is incomplete.
pub fn build_context(document: Option<&Document>, persona: &str) -> Option<SessionContext> {
    let document = document?;
    let context = SessionContext {
        document_name: document.name.clone(),
        document_text: document.content.clone(),
        persona: persona.trim().to_string(),
    };
    context.is_ready().then_some(context)
}

/// Copy the setup form into `session`.  Returns whether anything changed.
pub fn remember_setup(session: &mut SessionConfig, document_path: &str, persona: &str) -> bool {
    let document_path = Some(document_path.trim())
        .filter(|p| !p.is_empty())
        .map(PathBuf::from);
    let persona = persona.trim();

    if session.document_path == document_path && session.persona == persona {
        return false;
    }
    session.document_path = document_path;
    session.persona = persona.to_string();
    true
}

/// Status line under the microphone button.
pub fn status_line(snapshot: &SessionSnapshot) -> &'static str {
    if snapshot.ready {
        snapshot.phase.hint()
    } else {
        "Load a document and enter a persona to begin"
    }
}

fn mic_label(phase: SessionPhase) -> &'static str {
    match phase {
        SessionPhase::Idle => "Speak",
        SessionPhase::Listening => "Stop listening",
        SessionPhase::Thinking => "Thinking",
        SessionPhase::Speaking => "Interrupt",
    }
}

fn phase_color(phase: SessionPhase) -> egui::Color32 {
    match phase {
        SessionPhase::Idle => egui::Color32::from_rgb(200, 200, 200),
        SessionPhase::Listening => LISTENING,
        SessionPhase::Thinking => THINKING,
        SessionPhase::Speaking => READY,
    }
}

/// Repaint `ctx` every time the controller publishes a snapshot.  Ends when
/// the controller goes away.
pub async fn repaint_on_change(mut session: SessionHandle, ctx: egui::Context) {
    while session.changed().await {
        ctx.request_repaint();
    }
    log::debug!("app: session closed, repaint forwarding stopped");
}

// ---------------------------------------------------------------------------
// eframe::App impl
// ---------------------------------------------------------------------------

impl eframe::App for DocVoiceApp {
    fn update(&mut self, ctx: &egui::Context, _frame: &mut eframe::Frame) {
        self.snapshot = self.session.snapshot();

        // --- Spinner animation while a reply is pending -------------------
        if self.snapshot.is_thinking() {
            self.spinner_phase += 0.08;
            if self.spinner_phase >= 4.0 {
                self.spinner_phase = 0.0;
            }
            ctx.request_repaint_after(Duration::from_millis(66));
        }

        egui::CentralPanel::default().show(ctx, |ui| {
            self.draw_header(ui);
            ui.separator();
            self.draw_setup(ui);
            self.draw_voice_picker(ui);
            ui.separator();
            self.draw_log(ui);
            ui.separator();
            self.draw_footer(ui);
        });
    }

    fn on_exit(&mut self, _gl: Option<&eframe::glow::Context>) {
        log::info!("app: window closing, shutting down session");
        self.session.shutdown();
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
