use serde::Serialize;
use tauri::{AppHandle, Emitter};

use super::EngineRegistration;
use crate::speech::{SpeechPlatform, Utterance, VoiceInfo};

pub const ENQUEUE_EVENT: &str = "speech://enqueue";
pub const CANCEL_EVENT: &str = "speech://cancel";
pub const PAUSE_EVENT: &str = "speech://pause";
pub const RESUME_EVENT: &str = "speech://resume";

/// `window.speechSynthesis` of the main webview, driven over Tauri events.
///
/// The webview reports back through the `speech_chunk_*` commands.
pub struct WebviewSpeech {
    app_handle: AppHandle,
    engine: EngineRegistration,
}

impl WebviewSpeech {
    pub fn new(app_handle: AppHandle) -> Self {
        Self {
            app_handle,
            engine: EngineRegistration::default(),
        }
    }

    /// Record what the webview reported about its speech engine.
    pub fn register(&self, available: bool, voices: Vec<VoiceInfo>) {
        self.engine.register(available, voices);
    }

    fn send<S: Serialize + Clone>(&self, event: &str, payload: S) {
        if let Err(e) = self.app_handle.emit(event, payload) {
            tracing::error!("Failed to emit {}: {}", event, e);
        }
    }
}

impl SpeechPlatform for WebviewSpeech {
    fn is_available(&self) -> bool {
        self.engine.is_available()
    }

    fn enqueue(&self, utterance: &Utterance) {
        self.send(ENQUEUE_EVENT, utterance.clone());
    }

    fn cancel_all(&self) {
        self.send(CANCEL_EVENT, ());
    }

    fn pause(&self) {
        self.send(PAUSE_EVENT, ());
    }

    fn resume(&self) {
        self.send(RESUME_EVENT, ());
    }

    fn list_voices(&self) -> Vec<VoiceInfo> {
        self.engine.voices()
    }
}
