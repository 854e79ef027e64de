//! Playback dispatcher
//!
//! `trigger` resolves an identifier, decodes the clip at the active output
//! rate and attaches it to the shared mixer, then returns. It does not wait
//! for the clip to finish and holds no lock across triggers, so overlapping
//! triggers play concurrently.
//!
//! Handles are released by the completion listener when the mixer reports
//! a voice finished, or by the reaper when that report never comes.

use crate::audio::decoder::SimpleDecoder;
use crate::devices::DeviceRegistry;
use crate::error::{Error, Result};
use crate::library::{sanitize_identifier, SoundLibrary};
use crate::playback::handles::{HandleRegistry, PlaybackHandle};
use crate::playback::mixer::{Mixer, PlaybackEvent, Voice};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// How often the reaper looks for stale handles
const REAPER_INTERVAL: Duration = Duration::from_secs(1);

pub struct PlaybackDispatcher {
    library: Arc<SoundLibrary>,
    devices: Arc<DeviceRegistry>,
    mixer: Arc<Mixer>,
    handles: HandleRegistry,
    grace: Duration,
}

impl PlaybackDispatcher {
    pub fn new(
        library: Arc<SoundLibrary>,
        devices: Arc<DeviceRegistry>,
        mixer: Arc<Mixer>,
        grace: Duration,
    ) -> Self {
        Self {
            library,
            devices,
            mixer,
            handles: HandleRegistry::new(),
            grace,
        }
    }

    /// Start playing `identifier` and return its handle immediately.
    ///
    /// # Errors
    /// - `InvalidIdentifier` / `SoundNotFound` from the library
    /// - `DeviceBusy` if an output switch does not finish in time
    /// - `AudioOutput` if no output stream is open
    /// - `DecodeFailed` if the stored file cannot be decoded
    /// - `Playback` if the mixer refuses the voice
    pub async fn trigger(&self, identifier: &str) -> Result<PlaybackHandle> {
        let identifier = sanitize_identifier(identifier)?;
        let path = self.library.resolve(&identifier).await?;

        // Held until the voice is attached: a switch cannot slip in between
        // the rate snapshot and the attach
        let output = self.devices.attach_guard().await?;
        let sample_rate = output.sample_rate();
        if !output.is_open() {
            return Err(Error::AudioOutput(format!(
                "no output stream open on '{}'",
                output.device_name()
            )));
        }

        let clip = {
            let identifier = identifier.clone();
            tokio::task::spawn_blocking(move || SimpleDecoder::decode_clip(&path, &identifier, sample_rate)).await??
        };

        let handle = PlaybackHandle::new(identifier, clip.duration());
        self.handles.register(handle.clone());

        if let Err(e) = self.mixer.attach(Voice::for_handle(&handle, clip)) {
            self.handles.release(handle.playback_id);
            return Err(e);
        }
        drop(output);

        info!(
            playback_id = %handle.playback_id,
            identifier = %handle.identifier,
            sample_rate,
            duration_ms = handle.duration.as_millis() as u64,
            "Playback started"
        );

        Ok(handle)
    }

    /// Number of playbacks not yet released
    pub fn active_playbacks(&self) -> usize {
        self.handles.len()
    }

    pub fn is_active(&self, playback_id: uuid::Uuid) -> bool {
        self.handles.contains(playback_id)
    }

    fn on_event(&self, event: PlaybackEvent) {
        match event {
            PlaybackEvent::Finished { playback_id } => match self.handles.release(playback_id) {
                Some(handle) => debug!(
                    playback_id = %playback_id,
                    identifier = %handle.identifier,
                    "Playback finished"
                ),
                None => debug!(playback_id = %playback_id, "Finished playback was already released"),
            },
        }
    }

    /// Release every stale handle now and detach its voice from the mixer.
    /// Returns how many were released.
    pub fn reap_stale(&self) -> usize {
        let reaped = self.handles.release_stale(Instant::now(), self.grace);
        for handle in &reaped {
            handle.cancel();
            warn!(
                playback_id = %handle.playback_id,
                identifier = %handle.identifier,
                "Releasing playback with no completion report"
            );
        }
        reaped.len()
    }

    /// Consume mixer completion events until the mixer is gone
    pub fn spawn_completion_listener(
        self: &Arc<Self>,
        mut events: mpsc::UnboundedReceiver<PlaybackEvent>,
    ) -> JoinHandle<()> {
        let dispatcher = Arc::clone(self);
        tokio::spawn(async move {
            while let Some(event) = events.recv().await {
                dispatcher.on_event(event);
            }
            debug!("Completion listener stopped");
        })
    }

    /// Periodically release handles whose completion never arrived
    pub fn spawn_reaper(self: &Arc<Self>) -> JoinHandle<()> {
        let dispatcher = Arc::downgrade(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(REAPER_INTERVAL);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                let Some(dispatcher) = dispatcher.upgrade() else {
                    break;
                };
                dispatcher.reap_stale();
            }
            debug!("Playback reaper stopped");
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::backend::NullBackend;
    use crate::playback::tone::ToneToggle;

    async fn dispatcher_in(dir: &std::path::Path) -> Arc<PlaybackDispatcher> {
        let (mixer, events) = Mixer::new(48000, Arc::new(ToneToggle::new()));
        let devices = DeviceRegistry::open(
            Arc::new(NullBackend::new(48000)),
            Arc::clone(&mixer),
            None,
            Duration::from_millis(200),
        )
        .await
        .unwrap();
        let library = SoundLibrary::open(dir).await.unwrap();
        let dispatcher = Arc::new(PlaybackDispatcher::new(
            Arc::new(library),
            Arc::new(devices),
            mixer,
            Duration::from_millis(50),
        ));
        dispatcher.spawn_completion_listener(events);
        dispatcher
    }

    #[tokio::test]
    async fn test_trigger_missing_sound() {
        let dir = tempfile::tempdir().unwrap();
        let dispatcher = dispatcher_in(dir.path()).await;
        let result = dispatcher.trigger("ghost.wav").await;
        assert!(matches!(result, Err(Error::SoundNotFound(_))));
        assert_eq!(dispatcher.active_playbacks(), 0);
    }

    #[tokio::test]
    async fn test_trigger_undecodable_sound() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("broken.wav"), b"RIFF nonsense").unwrap();
        let dispatcher = dispatcher_in(dir.path()).await;
        let result = dispatcher.trigger("broken.wav").await;
        assert!(matches!(result, Err(Error::DecodeFailed(_))));
        assert_eq!(dispatcher.active_playbacks(), 0);
    }

    #[tokio::test]
    async fn test_reap_stale_releases_orphans() {
        let dir = tempfile::tempdir().unwrap();
        let dispatcher = dispatcher_in(dir.path()).await;
        let handle = PlaybackHandle::new("orphan.wav", Duration::ZERO);
        let id = handle.playback_id;
        let handle_copy = handle.clone();
        dispatcher.handles.register(handle);

        tokio::time::sleep(Duration::from_millis(80)).await;
        assert_eq!(dispatcher.reap_stale(), 1);
        assert!(!dispatcher.is_active(id));
        assert!(handle_copy.is_cancelled());
    }
}
