#[cfg(feature = "desktop")]
mod webview;
#[cfg(feature = "desktop")]
pub use webview::WebviewSpeech;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

use serde::{Deserialize, Serialize};

use crate::speech::VoiceInfo;

/// Browser engine family hosting the speech engine, as far as it matters for
/// speech workarounds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BrowserClass {
    /// Any browser on iPhone, iPad or iPod.
    Ios,
    /// Chrome and Chromium derivatives (Edge included).
    Chrome,
    Safari,
    Firefox,
    Other,
}

impl BrowserClass {
    pub fn from_user_agent(user_agent: &str) -> Self {
        if is_ios(user_agent) {
            Self::Ios
        } else if user_agent.contains("Chrome") {
            Self::Chrome
        } else if user_agent.contains("Safari") {
            Self::Safari
        } else if user_agent.contains("Firefox") {
            Self::Firefox
        } else {
            Self::Other
        }
    }
}

fn is_ios(user_agent: &str) -> bool {
    ["iPad", "iPhone", "iPod"]
        .iter()
        .any(|device| user_agent.contains(device))
}

/// Speech workarounds that apply to the running platform.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlatformProfile {
    pub class: BrowserClass,
    /// Nominal upper bound on characters per utterance.
    pub max_chunk_len: usize,
    /// The engine stops speaking after ~15s without a pause/resume pulse.
    pub needs_keep_alive: bool,
}

impl PlatformProfile {
    pub const IOS_CHUNK_LEN: usize = 100;
    pub const CHROME_CHUNK_LEN: usize = 200;
    pub const DEFAULT_CHUNK_LEN: usize = 300;

    pub fn for_class(class: BrowserClass) -> Self {
        let max_chunk_len = match class {
            BrowserClass::Ios => Self::IOS_CHUNK_LEN,
            BrowserClass::Chrome => Self::CHROME_CHUNK_LEN,
            _ => Self::DEFAULT_CHUNK_LEN,
        };
        let needs_keep_alive = matches!(
            class,
            BrowserClass::Ios | BrowserClass::Chrome | BrowserClass::Safari
        );
        Self {
            class,
            max_chunk_len,
            needs_keep_alive,
        }
    }

    pub fn from_user_agent(user_agent: &str) -> Self {
        let mut profile = Self::for_class(BrowserClass::from_user_agent(user_agent));
        // The iOS timer bug only affects the WebKit builds that identify as Safari.
        if profile.class == BrowserClass::Ios {
            profile.needs_keep_alive = user_agent.contains("Safari");
        }
        profile
    }
}

impl Default for PlatformProfile {
    fn default() -> Self {
        Self::for_class(BrowserClass::Other)
    }
}

/// What the host reported about its speech engine.
#[derive(Debug, Default)]
pub struct EngineRegistration {
    available: AtomicBool,
    voices: Mutex<Vec<VoiceInfo>>,
}

impl EngineRegistration {
    pub fn register(&self, available: bool, voices: Vec<VoiceInfo>) {
        self.available.store(available, Ordering::SeqCst);
        match self.voices.lock() {
            Ok(mut current) => *current = voices,
            Err(_) => tracing::warn!("Voice list lock poisoned, keeping previous voices"),
        }
    }

    pub fn is_available(&self) -> bool {
        self.available.load(Ordering::SeqCst)
    }

    pub fn voices(&self) -> Vec<VoiceInfo> {
        match self.voices.lock() {
            Ok(voices) => voices.clone(),
            Err(_) => {
                tracing::warn!("Voice list lock poisoned, reporting no voices");
                Vec::new()
            }
        }
    }
}
