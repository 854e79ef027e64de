//! Service context
//!
//! Every long-lived component is built once here and shared by reference.
//! Handlers receive a clone of [`AppContext`]; there are no process-wide
//! singletons.

use crate::audio::AudioBackend;
use crate::devices::DeviceRegistry;
use crate::error::Result;
use crate::ingest::{IngestionPipeline, Transcoder};
use crate::library::SoundLibrary;
use crate::playback::{Mixer, PlaybackDispatcher, ToneToggle};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

/// Rate the mixer starts at, before the first device reports its own
const INITIAL_MIXER_RATE: u32 = 48000;

/// Settings the core needs at startup
#[derive(Debug, Clone)]
pub struct ServiceOptions {
    pub clip_dir: PathBuf,
    pub output_device: Option<String>,
    pub device_busy_timeout: Duration,
    pub playback_grace: Duration,
}

/// Shared application context passed to all handlers
#[derive(Clone)]
pub struct AppContext {
    pub library: Arc<SoundLibrary>,
    pub devices: Arc<DeviceRegistry>,
    pub ingest: Arc<IngestionPipeline>,
    pub dispatcher: Arc<PlaybackDispatcher>,
    pub tone: Arc<ToneToggle>,
}

impl AppContext {
    /// Build the core and start its background tasks.
    ///
    /// Must be called inside a tokio runtime.
    pub async fn start(
        options: ServiceOptions,
        backend: Arc<dyn AudioBackend>,
        transcoder: Arc<dyn Transcoder>,
    ) -> Result<Self> {
        let library = Arc::new(SoundLibrary::open(&options.clip_dir).await?);
        library.sweep_staging().await?;

        let tone = Arc::new(ToneToggle::new());
        let (mixer, events) = Mixer::new(INITIAL_MIXER_RATE, Arc::clone(&tone));

        let devices = Arc::new(
            DeviceRegistry::open(
                backend,
                Arc::clone(&mixer),
                options.output_device.clone(),
                options.device_busy_timeout,
            )
            .await?,
        );

        let ingest = Arc::new(IngestionPipeline::new(
            Arc::clone(&library),
            Arc::clone(&devices),
            transcoder,
        ));

        let dispatcher = Arc::new(PlaybackDispatcher::new(
            Arc::clone(&library),
            Arc::clone(&devices),
            mixer,
            options.playback_grace,
        ));
        dispatcher.spawn_completion_listener(events);
        dispatcher.spawn_reaper();

        info!("Soundboard core initialized");

        Ok(Self {
            library,
            devices,
            ingest,
            dispatcher,
            tone,
        })
    }

    /// Stop the output device. Background tasks end with the runtime.
    pub async fn shutdown(&self) {
        self.devices.shutdown().await;
        info!("Soundboard core stopped");
    }
}
