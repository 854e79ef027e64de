//! Test helper modules for vsb-server integration tests
//!
//! - ManualBackend: output devices whose stream is pulled by the test
//! - audio_generator: deterministic WAV bytes
//! - WavTranscoder: native stand-in for ffmpeg
//! - TestService: a fully wired context on a temp clip directory

#![allow(dead_code)]

pub mod audio_generator;
pub mod manual_backend;
pub mod test_transcoder;

pub use audio_generator::{sine_wav_bytes, write_sine_wav};
pub use manual_backend::{ManualBackend, DEVICE_A, DEVICE_B};
pub use test_transcoder::WavTranscoder;

use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use vsb_server::{AppContext, ServiceOptions};

/// Context on a temp clip directory, driven by a [`ManualBackend`]
pub struct TestService {
    pub ctx: AppContext,
    pub backend: ManualBackend,
    pub clip_dir: TempDir,
}

impl TestService {
    pub async fn start() -> Self {
        Self::start_with_grace(Duration::from_secs(30)).await
    }

    pub async fn start_with_grace(playback_grace: Duration) -> Self {
        let clip_dir = tempfile::tempdir().unwrap();
        let backend = ManualBackend::new();

        let ctx = AppContext::start(
            ServiceOptions {
                clip_dir: clip_dir.path().to_path_buf(),
                output_device: Some(DEVICE_A.to_string()),
                device_busy_timeout: Duration::from_millis(500),
                playback_grace,
            },
            Arc::new(backend.clone()),
            Arc::new(WavTranscoder),
        )
        .await
        .unwrap();

        Self { ctx, backend, clip_dir }
    }

    /// Pull the output until no playback is active, or panic after `max_frames`
    pub async fn drain_playbacks(&self, max_frames: usize) {
        let mut pulled = 0;
        while self.ctx.dispatcher.active_playbacks() > 0 {
            assert!(pulled < max_frames, "playbacks still active after {} frames", pulled);
            self.backend.pull(1024);
            pulled += 1024;
            // Let the completion listener run
            tokio::task::yield_now().await;
            tokio::time::sleep(Duration::from_millis(1)).await;
        }
    }
}
