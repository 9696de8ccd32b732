use std::sync::Arc;

use anyhow::Result;
use tauri::{AppHandle, Emitter, Manager};
use tokio::sync::mpsc::UnboundedReceiver;

use crate::platform::{PlatformProfile, WebviewSpeech};
use crate::speech::{PlaybackEvent, PlaybackSnapshot, PlaybackStatus, UtteranceId, VoiceInfo};
use crate::state::AppState;

pub const STATUS_EVENT: &str = "playback-status";
pub const ERROR_EVENT: &str = "playback-error";

/// Tauri command: speak `text`, or the loaded article when omitted
#[tauri::command]
pub fn speak(app_handle: AppHandle, text: Option<String>) -> Result<PlaybackSnapshot, String> {
    do_speak(&app_handle, text).map_err(|e| e.to_string())
}

#[tauri::command]
pub fn pause(app_handle: AppHandle) -> Result<PlaybackSnapshot, String> {
    control(&app_handle, |c| c.pause())
}

#[tauri::command]
pub fn resume(app_handle: AppHandle) -> Result<PlaybackSnapshot, String> {
    control(&app_handle, |c| c.resume())
}

#[tauri::command]
pub fn stop(app_handle: AppHandle) -> Result<PlaybackSnapshot, String> {
    control(&app_handle, |c| c.stop())
}

/// Tauri command: change the rate, live if speaking, and remember it
#[tauri::command]
pub fn set_rate(app_handle: AppHandle, rate: f32) -> Result<PlaybackSnapshot, String> {
    let state = app_handle.state::<AppState>();
    let (applied, snapshot) = state
        .with_playback(|c| (c.set_rate(rate), c.snapshot()))
        .map_err(|e| e.to_string())?;

    if let Ok(mut settings) = state.settings.lock() {
        settings.tts.rate = applied;
    }
    crate::persistence::save_settings(&app_handle);
    Ok(snapshot)
}

#[tauri::command]
pub fn playback_snapshot(app_handle: AppHandle) -> Result<PlaybackSnapshot, String> {
    control(&app_handle, |_| ())
}

/// Webview notification: utterance `id` finished
#[tauri::command]
pub fn speech_chunk_ended(app_handle: AppHandle, id: UtteranceId) -> Result<(), String> {
    let state = app_handle.state::<AppState>();
    state
        .with_playback(|c| c.on_chunk_end(id))
        .map_err(|e| e.to_string())
}

/// Webview notification: utterance `id` failed with `error`
#[tauri::command]
pub fn speech_chunk_failed(app_handle: AppHandle, id: UtteranceId, error: String) -> Result<(), String> {
    let state = app_handle.state::<AppState>();
    state
        .with_playback(|c| c.on_chunk_error(id, &error))
        .map_err(|e| e.to_string())
}

/// Webview notification: utterance `id` reached the word at `char_index`
#[tauri::command]
pub fn speech_boundary(app_handle: AppHandle, id: UtteranceId, char_index: usize) -> Result<(), String> {
    let state = app_handle.state::<AppState>();
    state
        .with_playback(|c| c.on_boundary(id, char_index))
        .map_err(|e| e.to_string())
}

/// Webview handshake: what engine is available and which browser hosts it
#[tauri::command]
pub fn register_platform(
    app_handle: AppHandle,
    user_agent: String,
    speech_available: bool,
    voices: Vec<VoiceInfo>,
) -> Result<PlatformProfile, String> {
    let profile = PlatformProfile::from_user_agent(&user_agent);
    tracing::info!(
        "Webview speech: available={}, {} voice(s), {:?} (chunks <= {}, keep-alive: {})",
        speech_available,
        voices.len(),
        profile.class,
        profile.max_chunk_len,
        profile.needs_keep_alive
    );

    app_handle
        .state::<Arc<WebviewSpeech>>()
        .register(speech_available, voices);

    let state = app_handle.state::<AppState>();
    state
        .with_playback(|c| c.set_profile(profile))
        .map_err(|e| e.to_string())?;
    Ok(profile)
}

/// Internal: speak `text`, falling back to the loaded article
pub fn do_speak(app_handle: &AppHandle, text: Option<String>) -> Result<PlaybackSnapshot> {
    let state = app_handle.state::<AppState>();
    let text = match text {
        Some(text) => text,
        None => state
            .article
            .lock()
            .map_err(|_| anyhow::anyhow!("Article state poisoned"))?
            .as_ref()
            .map(|loaded| loaded.text.clone())
            .ok_or_else(|| anyhow::anyhow!("No article loaded"))?,
    };

    let snapshot = state.with_playback(|c| c.speak(&text).map(|()| c.snapshot()))??;
    Ok(snapshot)
}

/// Internal: pause while speaking, resume while paused, start the article
/// when idle
pub fn do_toggle(app_handle: &AppHandle) -> Result<PlaybackSnapshot> {
    let state = app_handle.state::<AppState>();
    let status = state.with_playback(|c| c.status())?;
    match status {
        PlaybackStatus::Playing => Ok(state.with_playback(|c| {
            c.pause();
            c.snapshot()
        })?),
        PlaybackStatus::Paused => Ok(state.with_playback(|c| {
            c.resume();
            c.snapshot()
        })?),
        PlaybackStatus::Idle => do_speak(app_handle, None),
    }
}

fn control(
    app_handle: &AppHandle,
    f: impl FnOnce(&mut crate::speech::PlaybackController),
) -> Result<PlaybackSnapshot, String> {
    let state = app_handle.state::<AppState>();
    state
        .with_playback(|c| {
            f(c);
            c.snapshot()
        })
        .map_err(|e| e.to_string())
}

/// Relay controller events to the webview as status snapshots.
pub fn forward_events(app_handle: AppHandle, mut events: UnboundedReceiver<PlaybackEvent>) {
    tauri::async_runtime::spawn(async move {
        while let Some(event) = events.recv().await {
            if let PlaybackEvent::Failed(error) = &event {
                let _ = app_handle.emit(ERROR_EVENT, error.clone());
            }

            let state = app_handle.state::<AppState>();
            match state.with_playback(|c| c.snapshot()) {
                Ok(snapshot) => {
                    let _ = app_handle.emit(STATUS_EVENT, snapshot);
                }
                Err(e) => tracing::warn!("Dropping playback event {:?}: {}", event, e),
            }
        }
        tracing::debug!("Playback event channel closed");
    });
}
