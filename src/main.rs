//! Application entry point: Document Voice Agent.
//!
//! # Startup sequence
//!
//! 1. Initialise logging.
//! 2. Load [`AppConfig`] from disk (returns default on first run).
//! 3. Create [`tokio`] runtime (multi-thread, 2 workers).
//! 4. Build the adapters: whisper capture, `espeak-ng` playback, HTTP
//!    reply generator.
//! 5. Spawn the [`TurnController`] on the runtime.
//! 6. Install the startup document and persona, if configured.
//! 7. Spawn the hotkey listener thread and its routing task.
//! 8. Run [`eframe::run_native`], which blocks the main thread until the window
//!    is closed.

use std::sync::Arc;

use doc_voice_agent::{
    app::{build_context, repaint_on_change, DocVoiceApp},
    capture::WhisperCaptureSource,
    config::AppConfig,
    document::Document,
    hotkey::{route_hotkeys, HotkeyBindings, HotkeyEvent, HotkeyListener},
    playback::{CommandSpeechSink, VoiceSettings},
    reply::{ApiReplyGenerator, ReplyGenerator},
    stt::{SttEngine, TranscribeParams, WhisperEngine},
    turn::{SessionHandle, TurnController},
};
use tokio::sync::mpsc;

use eframe::egui;

// ---------------------------------------------------------------------------
// Native options builder
// ---------------------------------------------------------------------------

fn native_options(config: &AppConfig) -> eframe::NativeOptions {
    let (width, height) = config.ui.window_size;
    let mut vp = egui::ViewportBuilder::default()
        .with_title("Document Voice Agent")
        .with_inner_size([width, height])
        .with_min_inner_size([360.0, 420.0]);

    if config.ui.always_on_top {
        vp = vp.with_always_on_top();
    }

    eframe::NativeOptions {
        viewport: vp,
        ..Default::default()
    }
}

// ---------------------------------------------------------------------------
// Startup helpers
// ---------------------------------------------------------------------------

/// Load the whisper model; without one, capture reports itself unsupported.
fn load_stt(config: &AppConfig) -> Option<Arc<dyn SttEngine>> {
    let path = config.whisper_model_path();
    match WhisperEngine::load(&path, TranscribeParams::from_config(&config.capture)) {
        Ok(engine) => {
            log::info!("Whisper model loaded: {}", path.display());
            Some(Arc::new(engine))
        }
        Err(e) => {
            log::warn!(
                "Could not load Whisper model ({}): {e}. Speech capture is disabled.",
                path.display()
            );
            None
        }
    }
}

/// Install the configured document and persona, returning the document so
/// the window can show it.
fn install_startup_context(config: &AppConfig, session: &SessionHandle) -> Option<Document> {
    let path = config.session.document_path.as_ref()?;
    let document = match Document::load(path) {
        Ok(document) => document,
        Err(e) => {
            log::warn!("Startup document not loaded: {e}");
            return None;
        }
    };

    match build_context(Some(&document), &config.session.persona) {
        Some(context) => session.set_context(context),
        None => log::info!("Startup document loaded; waiting for a persona"),
    }
    Some(document)
}

// ---------------------------------------------------------------------------
// main
// ---------------------------------------------------------------------------

fn main() -> eframe::Result<()> {
    // 1. Logging
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    log::info!("Document Voice Agent starting up");

    // 2. Configuration
    let config = AppConfig::load().unwrap_or_else(|e| {
        log::warn!("Failed to load config ({e}); using defaults");
        AppConfig::default()
    });

    // 3. Tokio runtime (2 worker threads: controller and reply requests)
    let rt = tokio::runtime::Builder::new_multi_thread()
        .worker_threads(2)
        .enable_all()
        .build()
        .expect("failed to create tokio runtime");
    let _guard = rt.enter();

    // 4. Adapters
    let replies = ApiReplyGenerator::from_config(&config.llm);
    if !replies.has_api_key() {
        log::warn!(
            "No API key configured (set llm.api_key or ${}); replies may fail",
            config.llm.api_key_env
        );
    }
    let replies: Arc<dyn ReplyGenerator> = Arc::new(replies);
    let capture = WhisperCaptureSource::new(load_stt(&config), &config.capture);
    let playback = CommandSpeechSink::discover(&config.playback);

    // 5. Turn controller
    let (controller, session) = TurnController::new(
        Box::new(capture),
        Box::new(playback),
        replies,
        VoiceSettings::from_config(&config.playback),
    );
    rt.spawn(controller.run());

    // 6. Startup context
    let startup_document = install_startup_context(&config, &session);

    // 7. Hotkeys
    let (hotkey_tx, hotkey_rx) = mpsc::channel::<HotkeyEvent>(16);
    let _hotkey_listener =
        match HotkeyListener::start(HotkeyBindings::from_config(&config.hotkey), hotkey_tx) {
            Ok(listener) => Some(listener),
            Err(e) => {
                log::warn!("Global hotkeys unavailable: {e}");
                None
            }
        };
    rt.spawn(route_hotkeys(hotkey_rx, session.clone()));

    // 8. Window (blocks until closed)
    let mut app = DocVoiceApp::new(session.clone(), &config);
    if let Some(document) = startup_document {
        app = app.with_document(document);
    }
    let options = native_options(&config);
    let handle = rt.handle().clone();

    let result = eframe::run_native(
        "Document Voice Agent",
        options,
        Box::new(move |cc| {
            handle.spawn(repaint_on_change(session, cc.egui_ctx.clone()));
            Ok(Box::new(app))
        }),
    );

    log::info!("Document Voice Agent shut down");
    result
}
