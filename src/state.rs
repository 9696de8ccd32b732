use std::sync::Mutex;
use std::time::Duration;

use anyhow::Result;
use serde::{Deserialize, Serialize};

use crate::reader::{fetch, LoadedArticle, DEFAULT_MIN_CONTENT_CHARS};
use crate::speech::{ControllerOptions, KeepAliveMode, PlaybackController, PlaybackRate};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AppStatus {
    #[default]
    Idle,
    Loading,
    Ready,
}

pub struct AppState {
    pub status: Mutex<AppStatus>,
    pub settings: Mutex<Settings>,
    pub playback: Mutex<Option<PlaybackController>>,
    pub article: Mutex<Option<LoadedArticle>>,
}

impl AppState {
    pub fn new() -> Self {
        Self {
            status: Mutex::new(AppStatus::default()),
            settings: Mutex::new(Settings::default()),
            playback: Mutex::new(None),
            article: Mutex::new(None),
        }
    }

    /// Run `f` against the playback controller, if the speech bridge is up.
    pub fn with_playback<R>(&self, f: impl FnOnce(&mut PlaybackController) -> R) -> Result<R> {
        let mut guard = self
            .playback
            .lock()
            .map_err(|_| anyhow::anyhow!("Playback state poisoned"))?;
        let controller = guard
            .as_mut()
            .ok_or_else(|| anyhow::anyhow!("Speech engine not initialized"))?;
        Ok(f(controller))
    }
}

impl Default for AppState {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub tts: TtsSettings,
    pub reader: ReaderSettings,
    pub shortcuts: ShortcutSettings,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TtsSettings {
    pub rate: PlaybackRate,
    pub keep_alive: KeepAliveMode,
    pub keep_alive_interval_ms: u64,
}

impl Default for TtsSettings {
    fn default() -> Self {
        Self {
            rate: PlaybackRate::NORMAL,
            keep_alive: KeepAliveMode::Auto,
            keep_alive_interval_ms: 5_000,
        }
    }
}

impl TtsSettings {
    /// Shortest accepted keep-alive interval; the engine timer fires at ~15s.
    const MIN_KEEP_ALIVE_MS: u64 = 1_000;
    const MAX_KEEP_ALIVE_MS: u64 = 14_000;

    pub fn keep_alive_interval(&self) -> Duration {
        Duration::from_millis(
            self.keep_alive_interval_ms
                .clamp(Self::MIN_KEEP_ALIVE_MS, Self::MAX_KEEP_ALIVE_MS),
        )
    }

    pub fn controller_options(&self) -> ControllerOptions {
        ControllerOptions {
            rate: self.rate,
            keep_alive: self.keep_alive,
            keep_alive_interval: self.keep_alive_interval(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReaderSettings {
    pub proxies: Vec<String>,
    pub min_content_chars: usize,
    pub request_timeout_s: u64,
}

impl Default for ReaderSettings {
    fn default() -> Self {
        Self {
            proxies: fetch::DEFAULT_PROXIES.iter().map(|p| p.to_string()).collect(),
            min_content_chars: DEFAULT_MIN_CONTENT_CHARS,
            request_timeout_s: 20,
        }
    }
}

impl ReaderSettings {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_s.max(1))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ShortcutSettings {
    /// Pauses while speaking, resumes while paused.
    pub toggle_playback: String,
}

impl Default for ShortcutSettings {
    fn default() -> Self {
        Self {
            toggle_playback: "Alt+Shift+Space".to_string(),
        }
    }
}
