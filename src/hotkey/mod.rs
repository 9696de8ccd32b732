use anyhow::Result;
use tauri::AppHandle;
use tauri_plugin_global_shortcut::{GlobalShortcutExt, ShortcutState};

pub const FALLBACK_SHORTCUT: &str = "Alt+Shift+Space";

/// Bind `shortcut` to play/pause, replacing any earlier binding.
pub fn register_toggle_shortcut(app_handle: &AppHandle, shortcut: &str) -> Result<()> {
    let shortcuts = app_handle.global_shortcut();
    shortcuts.unregister_all()?;
    shortcuts.on_shortcut(shortcut, |app, _shortcut, event| {
        // Act on key press only
        if event.state != ShortcutState::Pressed {
            return;
        }
        match crate::commands::playback::do_toggle(app) {
            Ok(snapshot) => tracing::debug!("Shortcut toggled playback: {:?}", snapshot.status),
            Err(e) => tracing::warn!("Shortcut ignored: {}", e),
        }
    })?;
    tracing::info!("Playback shortcut registered: {}", shortcut);
    Ok(())
}
