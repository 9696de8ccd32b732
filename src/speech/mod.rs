pub mod controller;
pub mod keep_alive;
pub mod segmenter;

pub use controller::{
    ControllerOptions, KeepAliveMode, PlaybackController, PlaybackEvent, PlaybackSnapshot,
    PlaybackStatus,
};
pub use keep_alive::KeepAliveGuard;
pub use segmenter::segment;

use serde::{Deserialize, Serialize};

/// Identifier the controller assigns to every utterance it enqueues.
///
/// Platform notifications echo it back so that completions from cancelled
/// utterances can be told apart from the one currently in flight.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UtteranceId(pub u64);

impl std::fmt::Display for UtteranceId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// One unit of text handed to the speech engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Utterance {
    pub id: UtteranceId,
    pub text: String,
    pub rate: f32,
    pub chunk_index: usize,
    pub chunk_count: usize,
}

/// A voice reported by the platform.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VoiceInfo {
    pub name: String,
    pub lang: String,
    #[serde(default)]
    pub default: bool,
}

/// Speech playback rate, always within [`PlaybackRate::MIN`, `PlaybackRate::MAX`].
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Serialize, Deserialize)]
#[serde(from = "f32", into = "f32")]
pub struct PlaybackRate(f32);

impl PlaybackRate {
    pub const MIN: f32 = 0.5;
    pub const MAX: f32 = 2.0;
    pub const NORMAL: Self = Self(1.0);

    /// Rates offered as one-click presets in the UI.
    pub const PRESETS: [f32; 6] = [0.5, 0.75, 1.0, 1.25, 1.5, 2.0];

    /// Clamp `value` into range. Non-finite input falls back to normal speed.
    pub fn new(value: f32) -> Self {
        if value.is_finite() {
            Self(value.clamp(Self::MIN, Self::MAX))
        } else {
            Self::NORMAL
        }
    }

    pub fn get(self) -> f32 {
        self.0
    }
}

impl Default for PlaybackRate {
    fn default() -> Self {
        Self::NORMAL
    }
}

impl From<f32> for PlaybackRate {
    fn from(value: f32) -> Self {
        Self::new(value)
    }
}

impl From<PlaybackRate> for f32 {
    fn from(rate: PlaybackRate) -> Self {
        rate.0
    }
}

/// The host's speech synthesis engine.
///
/// All calls are fire-and-forget. Completion, error and word-boundary
/// notifications travel back separately through
/// [`PlaybackController::on_chunk_end`], [`PlaybackController::on_chunk_error`]
/// and [`PlaybackController::on_boundary`], keyed by [`UtteranceId`].
#[cfg_attr(test, mockall::automock)]
pub trait SpeechPlatform: Send + Sync {
    fn is_available(&self) -> bool;
    fn enqueue(&self, utterance: &Utterance);
    fn cancel_all(&self);
    fn pause(&self);
    fn resume(&self);
    fn list_voices(&self) -> Vec<VoiceInfo>;
}
