use tauri::{AppHandle, Manager};

use crate::state::{AppState, Settings};

#[tauri::command]
pub fn get_settings(app_handle: AppHandle) -> Result<Settings, String> {
    let state = app_handle.state::<AppState>();
    let settings = state.settings.lock().map_err(|e| e.to_string())?.clone();
    Ok(settings)
}

/// Tauri command: replace the settings, apply them live, and persist
#[tauri::command]
pub fn update_settings(app_handle: AppHandle, settings: Settings) -> Result<Settings, String> {
    let state = app_handle.state::<AppState>();
    let previous_shortcut = {
        let mut current = state.settings.lock().map_err(|e| e.to_string())?;
        let previous = current.shortcuts.toggle_playback.clone();
        *current = settings.clone();
        previous
    };

    let applied_rate = state
        .with_playback(|c| {
            c.set_keep_alive(settings.tts.keep_alive, settings.tts.keep_alive_interval());
            c.set_rate(settings.tts.rate.get())
        })
        .map_err(|e| e.to_string())?;

    if settings.shortcuts.toggle_playback != previous_shortcut {
        if let Err(e) =
            crate::hotkey::register_toggle_shortcut(&app_handle, &settings.shortcuts.toggle_playback)
        {
            tracing::warn!(
                "Failed to register shortcut '{}': {}. Keeping '{}'.",
                settings.shortcuts.toggle_playback,
                e,
                previous_shortcut
            );
            let _ = crate::hotkey::register_toggle_shortcut(&app_handle, &previous_shortcut);
            if let Ok(mut current) = state.settings.lock() {
                current.shortcuts.toggle_playback = previous_shortcut;
            }
        }
    }

    let stored = {
        let mut current = state.settings.lock().map_err(|e| e.to_string())?;
        current.tts.rate = applied_rate;
        current.clone()
    };
    crate::persistence::write(&app_handle, &stored).map_err(|e| format!("{:#}", e))?;
    tracing::info!("Settings updated");
    Ok(stored)
}

#[tauri::command]
pub fn get_app_version() -> String {
    env!("CARGO_PKG_VERSION").to_string()
}
