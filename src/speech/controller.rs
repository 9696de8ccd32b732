//! Sequential, chunked speech playback.
//!
//! The controller owns the chunk list of the current session and feeds the
//! platform one utterance at a time: chunk `n + 1` is enqueued only after the
//! platform reports the end of chunk `n`. Every enqueued utterance carries a
//! fresh [`UtteranceId`]; notifications for any other id are stale leftovers
//! of cancelled utterances and are dropped.

use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::runtime::Handle;
use tokio::sync::{mpsc, watch};

use super::keep_alive::{self, KeepAliveGuard};
use super::{segment, PlaybackRate, SpeechPlatform, Utterance, UtteranceId};
use crate::error::PlaybackError;
use crate::platform::PlatformProfile;

/// When to run the keep-alive pulse.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum KeepAliveMode {
    /// Only on platforms known to have the idle-timer bug.
    #[default]
    Auto,
    Always,
    Never,
}

impl KeepAliveMode {
    pub fn applies_to(self, profile: &PlatformProfile) -> bool {
        match self {
            Self::Auto => profile.needs_keep_alive,
            Self::Always => true,
            Self::Never => false,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ControllerOptions {
    pub rate: PlaybackRate,
    pub keep_alive: KeepAliveMode,
    pub keep_alive_interval: Duration,
}

impl Default for ControllerOptions {
    fn default() -> Self {
        Self {
            rate: PlaybackRate::NORMAL,
            keep_alive: KeepAliveMode::Auto,
            keep_alive_interval: keep_alive::DEFAULT_INTERVAL,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlaybackStatus {
    Idle,
    Playing,
    Paused,
}

/// Notifications for observers of the controller.
#[derive(Debug, Clone, PartialEq)]
pub enum PlaybackEvent {
    SpeakingChanged(bool),
    RateChanged(f32),
    /// A chunk (0-based `index`) was handed to the platform.
    ChunkStarted { index: usize, count: usize },
    /// The last chunk of the session finished.
    Finished,
    /// The session was aborted by a platform error.
    Failed(PlaybackError),
}

/// Serializable view of the controller for the UI.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PlaybackSnapshot {
    pub status: PlaybackStatus,
    pub speaking: bool,
    pub rate: f32,
    pub chunk_index: Option<usize>,
    pub chunk_count: usize,
}

struct Session {
    chunks: Vec<String>,
    index: usize,
    in_flight: UtteranceId,
    /// Byte offset in the current chunk where the in-flight utterance starts.
    submitted_from: usize,
    /// Byte offset in the current chunk of the word being spoken.
    spoken: usize,
    /// The current chunk must be re-enqueued instead of platform-resumed.
    restart_on_resume: bool,
}

impl Session {
    fn new(chunks: Vec<String>) -> Self {
        Self {
            chunks,
            index: 0,
            in_flight: UtteranceId(0),
            submitted_from: 0,
            spoken: 0,
            restart_on_resume: false,
        }
    }

    fn current_chunk(&self) -> &str {
        &self.chunks[self.index]
    }

    /// Unspoken tail of the current chunk. A boundary reported at the very end
    /// of the chunk leaves nothing to resume from, so the whole chunk is used.
    fn remaining(&self) -> (usize, &str) {
        let chunk = self.current_chunk();
        let rest = chunk.get(self.spoken..).unwrap_or_default().trim_start();
        if rest.is_empty() {
            (0, chunk)
        } else {
            (chunk.len() - rest.len(), rest)
        }
    }

    fn advance(&mut self) -> bool {
        if self.index + 1 < self.chunks.len() {
            self.index += 1;
            self.submitted_from = 0;
            self.spoken = 0;
            true
        } else {
            false
        }
    }
}

enum PlaybackState {
    Idle,
    Playing(Session),
    Paused(Session),
}

pub struct PlaybackController {
    platform: Arc<dyn SpeechPlatform>,
    profile: PlatformProfile,
    options: ControllerOptions,
    runtime: Handle,
    state: PlaybackState,
    rate: PlaybackRate,
    next_id: u64,
    keep_alive: Option<KeepAliveGuard>,
    speaking: watch::Sender<bool>,
    events: mpsc::UnboundedSender<PlaybackEvent>,
}

impl PlaybackController {
    pub fn new(
        platform: Arc<dyn SpeechPlatform>,
        profile: PlatformProfile,
        options: ControllerOptions,
        runtime: Handle,
    ) -> (Self, mpsc::UnboundedReceiver<PlaybackEvent>) {
        let (events, rx) = mpsc::unbounded_channel();
        let (speaking, _) = watch::channel(false);
        let controller = Self {
            platform,
            profile,
            rate: options.rate,
            options,
            runtime,
            state: PlaybackState::Idle,
            next_id: 0,
            keep_alive: None,
            speaking,
            events,
        };
        (controller, rx)
    }

    /// Start speaking `text` from the beginning, replacing any current session
    /// (playing or paused).
    ///
    /// Blank text is ignored: no platform call is made and the current session,
    /// if any, keeps going.
    pub fn speak(&mut self, text: &str) -> Result<(), PlaybackError> {
        if !self.platform.is_available() {
            tracing::error!("Speech synthesis not supported on this platform");
            return Err(PlaybackError::UnsupportedPlatform);
        }

        let chunks = segment(text, self.profile.max_chunk_len);
        if chunks.is_empty() {
            tracing::debug!("Ignoring speak request with blank text");
            return Ok(());
        }

        self.keep_alive = None;
        let was_paused = matches!(self.state, PlaybackState::Paused(_));
        self.platform.cancel_all();
        if was_paused {
            // A cancelled queue stays paused on some engines.
            self.platform.resume();
        }

        tracing::info!(
            "Speaking {} chars in {} chunk(s) at {:.2}x",
            text.len(),
            chunks.len(),
            self.rate.get()
        );
        self.state = PlaybackState::Playing(Session::new(chunks));
        self.submit_current();
        self.set_speaking(true);
        Ok(())
    }

    /// The platform finished speaking utterance `id`.
    pub fn on_chunk_end(&mut self, id: UtteranceId) {
        let Some(session) = self.session_for(id) else {
            tracing::debug!("Ignoring end of stale utterance {}", id);
            return;
        };

        if !session.advance() {
            tracing::info!("Playback finished ({} chunk(s))", session.chunks.len());
            self.state = PlaybackState::Idle;
            self.set_speaking(false);
            self.emit(PlaybackEvent::Finished);
            return;
        }

        if self.status() == PlaybackStatus::Playing {
            self.submit_current();
        } else if let PlaybackState::Paused(session) = &mut self.state {
            // The end raced a pause; the next chunk goes out on resume.
            session.restart_on_resume = true;
        }
    }

    /// The platform failed to speak utterance `id`. The rest of the session is
    /// dropped.
    pub fn on_chunk_error(&mut self, id: UtteranceId, message: &str) {
        let Some(session) = self.session_for(id) else {
            tracing::debug!("Ignoring error of stale utterance {}: {}", id, message);
            return;
        };

        let error = PlaybackError::ChunkPlayback {
            chunk_index: session.index,
            message: message.to_string(),
        };
        tracing::error!("{}", error);

        self.keep_alive = None;
        self.platform.cancel_all();
        self.state = PlaybackState::Idle;
        self.set_speaking(false);
        self.emit(PlaybackEvent::Failed(error));
    }

    /// Word-boundary progress for utterance `id`. `char_index` is the UTF-16
    /// offset reported by the engine, relative to the utterance text.
    pub fn on_boundary(&mut self, id: UtteranceId, char_index: usize) {
        let Some(session) = self.session_for(id) else {
            return;
        };
        let from = session.submitted_from;
        let spoken_text = session.current_chunk().get(from..).unwrap_or_default();
        session.spoken = from + utf16_to_byte_offset(spoken_text, char_index);
    }

    pub fn pause(&mut self) {
        let state = std::mem::replace(&mut self.state, PlaybackState::Idle);
        self.state = match state {
            PlaybackState::Playing(session) => {
                // Disarm first so no pulse can resume the engine behind us.
                self.keep_alive = None;
                self.platform.pause();
                tracing::info!("Playback paused at chunk {}", session.index + 1);
                PlaybackState::Paused(session)
            }
            other => {
                tracing::debug!("Pause ignored: not playing");
                other
            }
        };
        self.set_speaking(false);
    }

    pub fn resume(&mut self) {
        let state = std::mem::replace(&mut self.state, PlaybackState::Idle);
        match state {
            PlaybackState::Paused(mut session) => {
                let restart = std::mem::take(&mut session.restart_on_resume);
                self.state = PlaybackState::Playing(session);
                if restart {
                    self.platform.cancel_all();
                    self.platform.resume();
                    self.submit_current();
                } else {
                    self.platform.resume();
                }
                tracing::info!("Playback resumed");
                self.set_speaking(true);
            }
            other => {
                tracing::debug!("Resume ignored: nothing paused");
                self.state = other;
            }
        }
    }

    /// Cancel everything and return to idle. Safe to call in any state.
    pub fn stop(&mut self) {
        self.keep_alive = None;
        self.platform.cancel_all();
        if !matches!(self.state, PlaybackState::Idle) {
            tracing::info!("Playback stopped");
        }
        self.state = PlaybackState::Idle;
        self.set_speaking(false);
    }

    /// Change the playback rate. While playing, the current chunk is restarted
    /// from the word being spoken; while paused, the restart happens on resume.
    pub fn set_rate(&mut self, value: f32) -> PlaybackRate {
        let rate = PlaybackRate::new(value);
        if rate == self.rate {
            return rate;
        }
        self.rate = rate;
        tracing::info!("Playback rate set to {:.2}x", rate.get());
        self.emit(PlaybackEvent::RateChanged(rate.get()));

        if self.status() == PlaybackStatus::Playing {
            self.platform.cancel_all();
            self.submit_current();
        } else if let PlaybackState::Paused(session) = &mut self.state {
            session.restart_on_resume = true;
        }
        rate
    }

    /// Apply a newly detected platform profile. Takes effect for the keep-alive
    /// immediately and for chunking on the next `speak`.
    pub fn set_profile(&mut self, profile: PlatformProfile) {
        self.profile = profile;
        self.keep_alive = None;
        self.sync_keep_alive();
    }

    pub fn set_keep_alive(&mut self, mode: KeepAliveMode, interval: Duration) {
        self.options.keep_alive = mode;
        self.options.keep_alive_interval = interval;
        self.keep_alive = None;
        self.sync_keep_alive();
    }

    pub fn speaking(&self) -> bool {
        *self.speaking.borrow()
    }

    pub fn subscribe_speaking(&self) -> watch::Receiver<bool> {
        self.speaking.subscribe()
    }

    pub fn rate(&self) -> PlaybackRate {
        self.rate
    }

    pub fn profile(&self) -> &PlatformProfile {
        &self.profile
    }

    pub fn keep_alive_active(&self) -> bool {
        self.keep_alive.is_some()
    }

    pub fn status(&self) -> PlaybackStatus {
        match self.state {
            PlaybackState::Idle => PlaybackStatus::Idle,
            PlaybackState::Playing(_) => PlaybackStatus::Playing,
            PlaybackState::Paused(_) => PlaybackStatus::Paused,
        }
    }

    pub fn snapshot(&self) -> PlaybackSnapshot {
        let (chunk_index, chunk_count) = match &self.state {
            PlaybackState::Playing(s) | PlaybackState::Paused(s) => (Some(s.index), s.chunks.len()),
            PlaybackState::Idle => (None, 0),
        };
        PlaybackSnapshot {
            status: self.status(),
            speaking: self.speaking(),
            rate: self.rate.get(),
            chunk_index,
            chunk_count,
        }
    }

    fn session_for(&mut self, id: UtteranceId) -> Option<&mut Session> {
        match &mut self.state {
            PlaybackState::Playing(s) | PlaybackState::Paused(s) if s.in_flight == id => Some(s),
            _ => None,
        }
    }

    /// Enqueue the unspoken part of the current chunk at the current rate.
    fn submit_current(&mut self) {
        self.next_id += 1;
        let id = UtteranceId(self.next_id);
        let rate = self.rate.get();

        let (PlaybackState::Playing(session) | PlaybackState::Paused(session)) = &mut self.state
        else {
            return;
        };
        let (from, text) = session.remaining();
        let utterance = Utterance {
            id,
            text: text.to_string(),
            rate,
            chunk_index: session.index,
            chunk_count: session.chunks.len(),
        };
        session.in_flight = id;
        session.submitted_from = from;
        session.spoken = from;

        tracing::debug!(
            "Enqueue chunk {}/{} as {} ({} chars)",
            utterance.chunk_index + 1,
            utterance.chunk_count,
            id,
            utterance.text.len()
        );
        self.platform.enqueue(&utterance);
        self.emit(PlaybackEvent::ChunkStarted {
            index: utterance.chunk_index,
            count: utterance.chunk_count,
        });
    }

    fn set_speaking(&mut self, speaking: bool) {
        let changed = self.speaking.send_if_modified(|current| {
            let changed = *current != speaking;
            *current = speaking;
            changed
        });
        if changed {
            self.emit(PlaybackEvent::SpeakingChanged(speaking));
        }
        self.sync_keep_alive();
    }

    /// Arm the keep-alive while speaking on an affected platform, and tear it
    /// down otherwise.
    fn sync_keep_alive(&mut self) {
        let wanted = self.speaking() && self.options.keep_alive.applies_to(&self.profile);
        if !wanted {
            self.keep_alive = None;
        } else if self.keep_alive.is_none() {
            self.keep_alive = Some(KeepAliveGuard::arm(
                Arc::clone(&self.platform),
                self.options.keep_alive_interval,
                &self.runtime,
            ));
        }
    }

    fn emit(&self, event: PlaybackEvent) {
        let _ = self.events.send(event);
    }
}

impl Drop for PlaybackController {
    fn drop(&mut self) {
        self.keep_alive = None;
        if !matches!(self.state, PlaybackState::Idle) {
            self.platform.cancel_all();
        }
    }
}

/// Convert a UTF-16 code-unit offset into a byte offset in `text`, clamped to
/// the text length.
fn utf16_to_byte_offset(text: &str, utf16_index: usize) -> usize {
    let mut units = 0;
    for (byte, c) in text.char_indices() {
        if units >= utf16_index {
            return byte;
        }
        units += c.len_utf16();
    }
    text.len()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::platform::BrowserClass;
    use crate::speech::{MockSpeechPlatform, VoiceInfo};
    use std::sync::Mutex;

    #[derive(Debug, Clone, PartialEq)]
    enum Call {
        Enqueue(Utterance),
        Cancel,
        Pause,
        Resume,
    }

    #[derive(Default)]
    struct FakePlatform {
        calls: Mutex<Vec<Call>>,
        unavailable: bool,
    }

    impl FakePlatform {
        fn calls(&self) -> Vec<Call> {
            self.calls.lock().unwrap().clone()
        }

        fn enqueued(&self) -> Vec<Utterance> {
            self.calls()
                .into_iter()
                .filter_map(|c| match c {
                    Call::Enqueue(u) => Some(u),
                    _ => None,
                })
                .collect()
        }

        fn last(&self) -> Utterance {
            self.enqueued().pop().expect("nothing enqueued")
        }

        fn count(&self, call: &Call) -> usize {
            self.calls().iter().filter(|c| *c == call).count()
        }
    }

    impl SpeechPlatform for FakePlatform {
        fn is_available(&self) -> bool {
            !self.unavailable
        }
        fn enqueue(&self, utterance: &Utterance) {
            self.calls.lock().unwrap().push(Call::Enqueue(utterance.clone()));
        }
        fn cancel_all(&self) {
            self.calls.lock().unwrap().push(Call::Cancel);
        }
        fn pause(&self) {
            self.calls.lock().unwrap().push(Call::Pause);
        }
        fn resume(&self) {
            self.calls.lock().unwrap().push(Call::Resume);
        }
        fn list_voices(&self) -> Vec<VoiceInfo> {
            Vec::new()
        }
    }

    const THREE_CHUNKS: &str = "First sentence here. Second sentence here. Third sentence here.";

    fn small_chunks() -> PlatformProfile {
        PlatformProfile {
            class: BrowserClass::Other,
            max_chunk_len: 25,
            needs_keep_alive: false,
        }
    }

    fn controller(
        platform: &Arc<FakePlatform>,
        profile: PlatformProfile,
    ) -> (PlaybackController, mpsc::UnboundedReceiver<PlaybackEvent>) {
        PlaybackController::new(
            platform.clone(),
            profile,
            ControllerOptions::default(),
            Handle::current(),
        )
    }

    fn drain(rx: &mut mpsc::UnboundedReceiver<PlaybackEvent>) -> Vec<PlaybackEvent> {
        let mut events = Vec::new();
        while let Ok(e) = rx.try_recv() {
            events.push(e);
        }
        events
    }

    #[tokio::test]
    async fn speak_submits_only_the_first_chunk() {
        let platform = Arc::new(FakePlatform::default());
        let (mut ctl, _rx) = controller(&platform, small_chunks());

        ctl.speak(THREE_CHUNKS).unwrap();

        assert_eq!(platform.calls()[0], Call::Cancel);
        let enqueued = platform.enqueued();
        assert_eq!(enqueued.len(), 1);
        assert_eq!(enqueued[0].text, "First sentence here.");
        assert_eq!(enqueued[0].chunk_index, 0);
        assert_eq!(enqueued[0].chunk_count, 3);
        assert!(ctl.speaking());
        assert_eq!(ctl.status(), PlaybackStatus::Playing);
    }

    #[tokio::test]
    async fn chunks_are_submitted_in_order_one_completion_at_a_time() {
        let platform = Arc::new(FakePlatform::default());
        let (mut ctl, mut rx) = controller(&platform, small_chunks());

        ctl.speak(THREE_CHUNKS).unwrap();
        for expected in 1..=3 {
            assert_eq!(platform.enqueued().len(), expected);
            ctl.on_chunk_end(platform.last().id);
        }

        let texts: Vec<_> = platform.enqueued().into_iter().map(|u| u.text).collect();
        assert_eq!(
            texts,
            vec!["First sentence here.", "Second sentence here.", "Third sentence here."]
        );
        assert!(!ctl.speaking());
        assert_eq!(ctl.status(), PlaybackStatus::Idle);

        let events = drain(&mut rx);
        assert_eq!(events.first(), Some(&PlaybackEvent::ChunkStarted { index: 0, count: 3 }));
        assert!(events.contains(&PlaybackEvent::SpeakingChanged(true)));
        assert_eq!(
            &events[events.len() - 2..],
            &[PlaybackEvent::SpeakingChanged(false), PlaybackEvent::Finished]
        );
    }

    #[tokio::test]
    async fn blank_text_is_a_no_op() {
        let platform = Arc::new(FakePlatform::default());
        let (mut ctl, mut rx) = controller(&platform, small_chunks());

        ctl.speak("").unwrap();
        ctl.speak("   \n ").unwrap();

        assert!(platform.calls().is_empty());
        assert!(!ctl.speaking());
        assert!(drain(&mut rx).is_empty());
    }

    #[tokio::test]
    async fn blank_text_leaves_a_running_session_alone() {
        let platform = Arc::new(FakePlatform::default());
        let (mut ctl, _rx) = controller(&platform, small_chunks());

        ctl.speak(THREE_CHUNKS).unwrap();
        ctl.speak(" ").unwrap();

        assert!(ctl.speaking());
        assert_eq!(platform.enqueued().len(), 1);
    }

    #[tokio::test]
    async fn unsupported_platform_fails_fast() {
        let platform = Arc::new(FakePlatform {
            unavailable: true,
            ..Default::default()
        });
        let (mut ctl, _rx) = controller(&platform, small_chunks());

        assert_eq!(ctl.speak(THREE_CHUNKS), Err(PlaybackError::UnsupportedPlatform));
        assert!(platform.calls().is_empty());
        assert!(!ctl.speaking());
    }

    #[tokio::test]
    async fn chunk_error_aborts_the_session() {
        let platform = Arc::new(FakePlatform::default());
        let (mut ctl, mut rx) = controller(&platform, small_chunks());

        ctl.speak(THREE_CHUNKS).unwrap();
        ctl.on_chunk_end(platform.last().id);
        assert!(ctl.speaking());

        let second = platform.last();
        assert_eq!(second.chunk_index, 1);
        ctl.on_chunk_error(second.id, "synthesis-failed");

        assert!(!ctl.speaking());
        assert_eq!(ctl.status(), PlaybackStatus::Idle);
        // A late end for the failed utterance must not revive the session.
        ctl.on_chunk_end(second.id);
        assert_eq!(platform.enqueued().len(), 2);

        let failure = drain(&mut rx).into_iter().find_map(|e| match e {
            PlaybackEvent::Failed(err) => Some(err),
            _ => None,
        });
        assert_eq!(
            failure,
            Some(PlaybackError::ChunkPlayback {
                chunk_index: 1,
                message: "synthesis-failed".into()
            })
        );
    }

    #[tokio::test]
    async fn speak_after_error_starts_cleanly() {
        let platform = Arc::new(FakePlatform::default());
        let (mut ctl, _rx) = controller(&platform, small_chunks());

        ctl.speak(THREE_CHUNKS).unwrap();
        ctl.on_chunk_error(platform.last().id, "network");
        ctl.speak("Again.").unwrap();

        assert!(ctl.speaking());
        assert_eq!(platform.last().text, "Again.");
    }

    #[tokio::test]
    async fn pause_and_resume_keep_the_session() {
        let platform = Arc::new(FakePlatform::default());
        let (mut ctl, _rx) = controller(&platform, small_chunks());

        ctl.speak(THREE_CHUNKS).unwrap();
        ctl.on_chunk_end(platform.last().id);
        ctl.pause();

        assert!(!ctl.speaking());
        assert_eq!(ctl.status(), PlaybackStatus::Paused);
        assert_eq!(ctl.snapshot().chunk_index, Some(1));

        ctl.resume();
        assert!(ctl.speaking());
        assert_eq!(platform.count(&Call::Pause), 1);
        assert_eq!(platform.count(&Call::Resume), 1);
        assert_eq!(platform.enqueued().len(), 2);

        ctl.on_chunk_end(platform.last().id);
        assert_eq!(platform.last().text, "Third sentence here.");
    }

    #[tokio::test]
    async fn pause_and_resume_are_no_ops_out_of_state() {
        let platform = Arc::new(FakePlatform::default());
        let (mut ctl, _rx) = controller(&platform, small_chunks());

        ctl.resume();
        ctl.pause();
        assert!(platform.calls().is_empty());

        ctl.speak(THREE_CHUNKS).unwrap();
        ctl.resume();
        assert_eq!(platform.count(&Call::Resume), 0);
    }

    #[tokio::test]
    async fn stop_is_idempotent() {
        let platform = Arc::new(FakePlatform::default());
        let (mut ctl, mut rx) = controller(&platform, small_chunks());

        ctl.speak(THREE_CHUNKS).unwrap();
        drain(&mut rx);
        ctl.stop();
        ctl.stop();

        assert!(!ctl.speaking());
        assert_eq!(ctl.status(), PlaybackStatus::Idle);
        assert_eq!(drain(&mut rx), vec![PlaybackEvent::SpeakingChanged(false)]);

        ctl.resume();
        assert_eq!(platform.count(&Call::Resume), 0);
    }

    #[tokio::test]
    async fn stop_then_speak_never_submits_old_chunks() {
        let platform = Arc::new(FakePlatform::default());
        let (mut ctl, _rx) = controller(&platform, small_chunks());

        ctl.speak(THREE_CHUNKS).unwrap();
        let old = platform.last();
        ctl.stop();
        ctl.speak("Brand new text.").unwrap();
        let new = platform.last();

        // The cancelled utterance reports its end late.
        ctl.on_chunk_end(old.id);
        ctl.on_chunk_error(old.id, "interrupted");

        assert!(ctl.speaking());
        assert_eq!(platform.enqueued(), vec![old, new]);
    }

    #[tokio::test]
    async fn speak_while_paused_discards_the_paused_session() {
        let platform = Arc::new(FakePlatform::default());
        let (mut ctl, _rx) = controller(&platform, small_chunks());

        ctl.speak(THREE_CHUNKS).unwrap();
        ctl.pause();
        ctl.speak("Other text.").unwrap();

        assert_eq!(ctl.status(), PlaybackStatus::Playing);
        assert_eq!(ctl.snapshot().chunk_count, 1);
        let calls = platform.calls();
        let tail = &calls[calls.len() - 3..];
        assert_eq!(tail[0], Call::Cancel);
        assert_eq!(tail[1], Call::Resume);
        assert!(matches!(&tail[2], Call::Enqueue(u) if u.text == "Other text."));
    }

    #[tokio::test]
    async fn rate_change_restarts_the_current_chunk_only() {
        let platform = Arc::new(FakePlatform::default());
        let (mut ctl, mut rx) = controller(&platform, small_chunks());

        ctl.speak(THREE_CHUNKS).unwrap();
        ctl.on_chunk_end(platform.last().id);
        let before = platform.last();

        assert_eq!(ctl.set_rate(1.5).get(), 1.5);

        let after = platform.last();
        assert_eq!(after.chunk_index, 1);
        assert_eq!(after.text, "Second sentence here.");
        assert_eq!(after.rate, 1.5);
        assert_ne!(after.id, before.id);
        assert!(ctl.speaking());

        // The interrupted utterance is stale now.
        ctl.on_chunk_end(before.id);
        assert_eq!(platform.enqueued().len(), 3);

        ctl.on_chunk_end(after.id);
        let third = platform.last();
        assert_eq!(third.text, "Third sentence here.");
        assert_eq!(third.rate, 1.5);
        let first_spoken = platform
            .enqueued()
            .iter()
            .filter(|u| u.text == "First sentence here.")
            .count();
        assert_eq!(first_spoken, 1);
        assert!(drain(&mut rx).contains(&PlaybackEvent::RateChanged(1.5)));
    }

    #[tokio::test]
    async fn rate_change_resumes_from_the_last_word_boundary() {
        let platform = Arc::new(FakePlatform::default());
        let (mut ctl, _rx) = controller(&platform, small_chunks());

        ctl.speak(THREE_CHUNKS).unwrap();
        let first = platform.last();
        ctl.on_boundary(first.id, 6);
        ctl.set_rate(2.0);
        let restarted = platform.last();
        assert_eq!(restarted.text, "sentence here.");

        // Boundaries of the restarted utterance are relative to its own text.
        ctl.on_boundary(restarted.id, 9);
        ctl.set_rate(0.75);
        assert_eq!(platform.last().text, "here.");
        assert_eq!(platform.last().chunk_index, 0);
    }

    #[tokio::test]
    async fn same_rate_is_not_a_restart() {
        let platform = Arc::new(FakePlatform::default());
        let (mut ctl, _rx) = controller(&platform, small_chunks());

        ctl.speak(THREE_CHUNKS).unwrap();
        ctl.set_rate(1.0);
        assert_eq!(platform.enqueued().len(), 1);
        assert_eq!(platform.count(&Call::Cancel), 1);
    }

    #[tokio::test]
    async fn rate_change_while_idle_applies_to_the_next_speak() {
        let platform = Arc::new(FakePlatform::default());
        let (mut ctl, _rx) = controller(&platform, small_chunks());

        ctl.set_rate(9.0);
        assert!(platform.calls().is_empty());
        ctl.speak("Hi.").unwrap();
        assert_eq!(platform.last().rate, 2.0);
    }

    #[tokio::test]
    async fn rate_change_while_paused_applies_on_resume() {
        let platform = Arc::new(FakePlatform::default());
        let (mut ctl, _rx) = controller(&platform, small_chunks());

        ctl.speak(THREE_CHUNKS).unwrap();
        ctl.pause();
        ctl.set_rate(0.5);
        assert_eq!(platform.enqueued().len(), 1);
        assert!(!ctl.speaking());

        ctl.resume();
        let restarted = platform.last();
        assert_eq!(restarted.chunk_index, 0);
        assert_eq!(restarted.rate, 0.5);
        assert!(ctl.speaking());
    }

    #[tokio::test]
    async fn chunk_end_racing_a_pause_defers_the_next_chunk() {
        let platform = Arc::new(FakePlatform::default());
        let (mut ctl, _rx) = controller(&platform, small_chunks());

        ctl.speak(THREE_CHUNKS).unwrap();
        let first = platform.last();
        ctl.pause();
        ctl.on_chunk_end(first.id);
        assert_eq!(platform.enqueued().len(), 1);

        ctl.resume();
        assert_eq!(platform.last().text, "Second sentence here.");
    }

    #[tokio::test]
    async fn speaking_flag_is_observable() {
        let platform = Arc::new(FakePlatform::default());
        let (mut ctl, _rx) = controller(&platform, small_chunks());
        let mut speaking = ctl.subscribe_speaking();

        ctl.speak("One chunk only.").unwrap();
        assert!(speaking.has_changed().unwrap());
        assert!(*speaking.borrow_and_update());

        ctl.on_chunk_end(platform.last().id);
        assert!(!*speaking.borrow_and_update());
    }

    #[tokio::test]
    async fn dropping_the_controller_cancels_playback() {
        let platform = Arc::new(FakePlatform::default());
        let (mut ctl, _rx) = controller(&platform, small_chunks());
        ctl.speak(THREE_CHUNKS).unwrap();
        drop(ctl);
        assert_eq!(platform.count(&Call::Cancel), 2);
    }

    #[tokio::test]
    async fn keep_alive_follows_the_speaking_flag() {
        let platform = Arc::new(FakePlatform::default());
        let profile = PlatformProfile {
            needs_keep_alive: true,
            ..small_chunks()
        };
        let (mut ctl, _rx) = controller(&platform, profile);

        assert!(!ctl.keep_alive_active());
        ctl.speak(THREE_CHUNKS).unwrap();
        assert!(ctl.keep_alive_active());
        ctl.pause();
        assert!(!ctl.keep_alive_active());
        ctl.resume();
        assert!(ctl.keep_alive_active());
        ctl.stop();
        assert!(!ctl.keep_alive_active());
    }

    async fn settle() {
        for _ in 0..5 {
            tokio::task::yield_now().await;
        }
    }

    #[tokio::test(start_paused = true)]
    async fn keep_alive_pulses_only_while_speaking() {
        let platform = Arc::new(FakePlatform::default());
        let profile = PlatformProfile {
            needs_keep_alive: true,
            ..small_chunks()
        };
        let (mut ctl, _rx) = controller(&platform, profile);

        ctl.speak(THREE_CHUNKS).unwrap();
        tokio::time::sleep(Duration::from_millis(11_000)).await;
        settle().await;
        assert_eq!(platform.count(&Call::Pause), 2);

        // Natural end of the session
        for _ in 0..3 {
            ctl.on_chunk_end(platform.last().id);
        }
        assert!(!ctl.speaking());
        tokio::time::sleep(Duration::from_secs(30)).await;
        settle().await;
        assert_eq!(platform.count(&Call::Pause), 2);

        ctl.speak(THREE_CHUNKS).unwrap();
        tokio::time::sleep(Duration::from_millis(5_100)).await;
        settle().await;
        assert_eq!(platform.count(&Call::Pause), 3);

        ctl.stop();
        tokio::time::sleep(Duration::from_secs(30)).await;
        settle().await;
        assert_eq!(platform.count(&Call::Pause), 3);
        assert_eq!(platform.count(&Call::Resume), 3);
    }

    #[tokio::test]
    async fn keep_alive_mode_overrides_the_profile() {
        let platform = Arc::new(FakePlatform::default());
        let (mut ctl, _rx) = controller(&platform, small_chunks());

        ctl.speak(THREE_CHUNKS).unwrap();
        assert!(!ctl.keep_alive_active());
        ctl.set_keep_alive(KeepAliveMode::Always, keep_alive::DEFAULT_INTERVAL);
        assert!(ctl.keep_alive_active());
        ctl.set_keep_alive(KeepAliveMode::Never, keep_alive::DEFAULT_INTERVAL);
        assert!(!ctl.keep_alive_active());
    }

    #[tokio::test]
    async fn new_speak_cancels_before_enqueueing() {
        let mut mock = MockSpeechPlatform::new();
        let mut seq = mockall::Sequence::new();
        mock.expect_is_available().return_const(true);
        mock.expect_cancel_all()
            .times(1)
            .in_sequence(&mut seq)
            .return_const(());
        mock.expect_enqueue()
            .withf(|u| u.text == "Hello there." && u.chunk_index == 0)
            .times(1)
            .in_sequence(&mut seq)
            .return_const(());

        let (mut ctl, _rx) = PlaybackController::new(
            Arc::new(mock),
            small_chunks(),
            ControllerOptions::default(),
            Handle::current(),
        );
        ctl.speak("Hello there.").unwrap();
        // Finish the session so dropping the controller issues no cancel.
        ctl.on_chunk_end(UtteranceId(1));
        assert_eq!(ctl.status(), PlaybackStatus::Idle);
    }

    #[test]
    fn utf16_offsets_map_to_byte_offsets() {
        assert_eq!(utf16_to_byte_offset("hello world", 6), 6);
        assert_eq!(utf16_to_byte_offset("é café", 2), 3);
        assert_eq!(utf16_to_byte_offset("😀 ok", 3), 5);
        assert_eq!(utf16_to_byte_offset("short", 99), 5);
    }
}
