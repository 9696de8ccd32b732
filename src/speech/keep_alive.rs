//! Pause/resume pulse for speech engines with an idle-timer bug.
//!
//! Chrome and Safari silently stop synthesis roughly fifteen seconds into a
//! queue unless the engine is nudged. A pause immediately followed by a resume
//! resets the engine's timer without an audible gap.

use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use tokio::runtime::Handle;
use tokio::task::JoinHandle;

use super::SpeechPlatform;

pub const DEFAULT_INTERVAL: Duration = Duration::from_secs(5);

/// Periodic keep-alive task, armed for as long as the guard is alive.
///
/// Dropping the guard (or calling [`KeepAliveGuard::disarm`]) stops pulsing
/// before it returns: a pulse is issued only while holding the `armed` lock
/// and after re-checking it, and disarming clears the flag under that lock.
pub struct KeepAliveGuard {
    armed: Arc<Mutex<bool>>,
    task: JoinHandle<()>,
}

impl KeepAliveGuard {
    /// Start pulsing `platform` every `interval`. The first pulse fires one
    /// interval after arming.
    pub fn arm(platform: Arc<dyn SpeechPlatform>, interval: Duration, runtime: &Handle) -> Self {
        let armed = Arc::new(Mutex::new(true));
        let flag = Arc::clone(&armed);

        let task = runtime.spawn(async move {
            let mut ticker = tokio::time::interval_at(tokio::time::Instant::now() + interval, interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                let armed = flag.lock().unwrap_or_else(PoisonError::into_inner);
                if !*armed {
                    break;
                }
                platform.pause();
                platform.resume();
                tracing::trace!("Keep-alive pulse");
            }
        });

        tracing::debug!("Keep-alive armed ({}ms interval)", interval.as_millis());
        Self { armed, task }
    }

    pub fn is_armed(&self) -> bool {
        *self.armed.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Stop pulsing. Once this returns no further pulse is issued.
    pub fn disarm(&self) {
        let mut armed = self.armed.lock().unwrap_or_else(PoisonError::into_inner);
        if *armed {
            *armed = false;
            self.task.abort();
            tracing::debug!("Keep-alive disarmed");
        }
    }
}

impl Drop for KeepAliveGuard {
    fn drop(&mut self) {
        self.disarm();
    }
}
