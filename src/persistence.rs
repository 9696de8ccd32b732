//! Settings stored in the app data directory through `tauri-plugin-store`.
//!
//! Only preferences are persisted. Playback position is not.

use anyhow::{Context, Result};
use tauri::{AppHandle, Manager};
use tauri_plugin_store::StoreExt;

use crate::state::{AppState, Settings};

const STORE_FILE: &str = "settings.json";
const SETTINGS_KEY: &str = "settings";

/// Stored settings, or defaults when the store is missing or unreadable.
pub fn load_settings(app_handle: &AppHandle) -> Settings {
    match read(app_handle) {
        Ok(Some(settings)) => settings,
        Ok(None) => {
            tracing::info!("No stored settings found, using defaults");
            Settings::default()
        }
        Err(e) => {
            tracing::warn!("{:#}. Using defaults.", e);
            Settings::default()
        }
    }
}

fn read(app_handle: &AppHandle) -> Result<Option<Settings>> {
    let store = app_handle
        .store(STORE_FILE)
        .context("Failed to open settings store")?;
    store
        .get(SETTINGS_KEY)
        .map(|value| serde_json::from_value(value).context("Failed to deserialize stored settings"))
        .transpose()
}

/// Write `settings` to disk.
pub fn write(app_handle: &AppHandle, settings: &Settings) -> Result<()> {
    let store = app_handle
        .store(STORE_FILE)
        .context("Failed to open settings store for saving")?;
    let value = serde_json::to_value(settings).context("Failed to serialize settings")?;
    store.set(SETTINGS_KEY, value);
    store.save().context("Failed to save settings store to disk")?;
    Ok(())
}

/// Persist the current in-memory settings, logging instead of failing.
pub fn save_settings(app_handle: &AppHandle) {
    let settings = {
        let state = app_handle.state::<AppState>();
        let guard = state.settings.lock();
        match guard {
            Ok(settings) => settings.clone(),
            Err(_) => {
                tracing::error!("Settings lock poisoned, not saving");
                return;
            }
        }
    };
    if let Err(e) = write(app_handle, &settings) {
        tracing::error!("{:#}", e);
    }
}
