pub mod error;
pub mod platform;
pub mod reader;
pub mod speech;
pub mod state;

#[cfg(feature = "desktop")]
mod commands;
#[cfg(feature = "desktop")]
mod hotkey;
#[cfg(feature = "desktop")]
mod persistence;

#[cfg(feature = "desktop")]
#[cfg_attr(mobile, tauri::mobile_entry_point)]
pub fn run() {
    use std::sync::Arc;

    use platform::{PlatformProfile, WebviewSpeech};
    use speech::PlaybackController;
    use state::AppState;
    use tauri::Manager;
    use tracing_subscriber::EnvFilter;

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    tracing::info!("Starting Website Reader v{}", env!("CARGO_PKG_VERSION"));

    let result = tauri::Builder::default()
        .plugin(tauri_plugin_opener::init())
        .plugin(tauri_plugin_global_shortcut::Builder::new().build())
        .plugin(tauri_plugin_store::Builder::new().build())
        .manage(AppState::new())
        .invoke_handler(tauri::generate_handler![
            commands::playback::speak,
            commands::playback::pause,
            commands::playback::resume,
            commands::playback::stop,
            commands::playback::set_rate,
            commands::playback::playback_snapshot,
            commands::playback::speech_chunk_ended,
            commands::playback::speech_chunk_failed,
            commands::playback::speech_boundary,
            commands::playback::register_platform,
            commands::reader::load_article,
            commands::reader::current_article,
            commands::reader::open_article_url,
            commands::settings::get_settings,
            commands::settings::update_settings,
            commands::settings::get_app_version,
        ])
        .setup(|app| {
            let loaded = persistence::load_settings(app.handle());
            let options = loaded.tts.controller_options();
            let saved_shortcut = loaded.shortcuts.toggle_playback.clone();
            {
                let state = app.state::<AppState>();
                let mut settings = state
                    .settings
                    .lock()
                    .map_err(|_| anyhow::anyhow!("Settings state poisoned"))?;
                *settings = loaded;
                tracing::info!("Settings loaded from store");
            }

            // The profile is refined once the webview registers its user agent
            let speech = Arc::new(WebviewSpeech::new(app.handle().clone()));
            app.manage(speech.clone());
            let runtime = tauri::async_runtime::handle().inner().clone();
            let (controller, events) =
                PlaybackController::new(speech, PlatformProfile::default(), options, runtime);
            {
                let state = app.state::<AppState>();
                let mut playback = state
                    .playback
                    .lock()
                    .map_err(|_| anyhow::anyhow!("Playback state poisoned"))?;
                *playback = Some(controller);
            }
            commands::playback::forward_events(app.handle().clone(), events);

            // Register the saved shortcut, falling back to the default on failure
            if let Err(e) = hotkey::register_toggle_shortcut(app.handle(), &saved_shortcut) {
                tracing::warn!(
                    "Failed to register saved shortcut '{}': {}. Falling back to {}.",
                    saved_shortcut,
                    e,
                    hotkey::FALLBACK_SHORTCUT
                );
                if saved_shortcut != hotkey::FALLBACK_SHORTCUT {
                    match hotkey::register_toggle_shortcut(app.handle(), hotkey::FALLBACK_SHORTCUT) {
                        Ok(()) => {
                            let state = app.state::<AppState>();
                            if let Ok(mut settings) = state.settings.lock() {
                                settings.shortcuts.toggle_playback =
                                    hotkey::FALLBACK_SHORTCUT.to_string();
                            }
                            persistence::save_settings(app.handle());
                        }
                        Err(e2) => tracing::error!(
                            "Failed to register fallback shortcut {}: {}",
                            hotkey::FALLBACK_SHORTCUT,
                            e2
                        ),
                    }
                }
            }

            // Closing the window silences the reader
            if let Some(window) = app.get_webview_window("main") {
                let app_handle = app.handle().clone();
                window.on_window_event(move |event| {
                    if let tauri::WindowEvent::CloseRequested { .. } = event {
                        let state = app_handle.state::<AppState>();
                        if let Err(e) = state.with_playback(|c| c.stop()) {
                            tracing::debug!("Nothing to stop on close: {}", e);
                        }
                    }
                });
            }

            tracing::info!("App setup complete");
            Ok(())
        })
        .run(tauri::generate_context!());

    if let Err(e) = result {
        tracing::error!("Error while running tauri application: {}", e);
        std::process::exit(1);
    }
}
