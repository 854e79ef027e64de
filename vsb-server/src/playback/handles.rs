//! Live playback handles
//!
//! A handle exists from the moment a clip is attached to the sink until
//! the sink reports it finished, or the reaper gives up on it. Both paths
//! go through [`HandleRegistry::release`], which removes the handle from
//! the map, so each handle is released exactly once.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};
use uuid::Uuid;

/// One playing instance of a clip
#[derive(Debug, Clone, Serialize)]
pub struct PlaybackHandle {
    pub playback_id: Uuid,
    pub identifier: String,
    pub started_at: DateTime<Utc>,
    /// Clip length at the rate it was decoded for
    #[serde(with = "duration_ms")]
    pub duration: Duration,
    #[serde(skip)]
    started: Instant,
    /// Shared with the voice in the mixer; set when the handle is reaped
    #[serde(skip)]
    cancelled: Arc<AtomicBool>,
}

impl PlaybackHandle {
    pub fn new(identifier: impl Into<String>, duration: Duration) -> Self {
        Self {
            playback_id: Uuid::new_v4(),
            identifier: identifier.into(),
            started_at: Utc::now(),
            duration,
            started: Instant::now(),
            cancelled: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Tell the mixer to drop this playback's voice on its next pull
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::Release);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Acquire)
    }

    pub(crate) fn cancel_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.cancelled)
    }

    /// Whether the handle outlived its clip by more than `grace`
    pub fn is_stale(&self, now: Instant, grace: Duration) -> bool {
        now.saturating_duration_since(self.started) > self.duration + grace
    }
}

mod duration_ms {
    use serde::Serializer;
    use std::time::Duration;

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(d.as_millis() as u64)
    }
}

/// All live handles, keyed by playback id
#[derive(Debug, Default)]
pub struct HandleRegistry {
    handles: Mutex<HashMap<Uuid, PlaybackHandle>>,
}

impl HandleRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, handle: PlaybackHandle) {
        self.lock().insert(handle.playback_id, handle);
    }

    /// Remove and return the handle. `None` if it was already released.
    pub fn release(&self, playback_id: Uuid) -> Option<PlaybackHandle> {
        self.lock().remove(&playback_id)
    }

    /// Release every handle that is stale at `now`
    pub fn release_stale(&self, now: Instant, grace: Duration) -> Vec<PlaybackHandle> {
        let mut handles = self.lock();
        let stale: Vec<Uuid> = handles
            .values()
            .filter(|h| h.is_stale(now, grace))
            .map(|h| h.playback_id)
            .collect();
        stale.into_iter().filter_map(|id| handles.remove(&id)).collect()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    pub fn contains(&self, playback_id: Uuid) -> bool {
        self.lock().contains_key(&playback_id)
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<Uuid, PlaybackHandle>> {
        self.handles.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
