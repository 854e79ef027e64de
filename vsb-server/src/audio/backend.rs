//! Output backend seam
//!
//! The device registry talks to audio hardware only through
//! [`AudioBackend`]. `CpalBackend` drives real devices; [`NullBackend`]
//! renders into nothing at real-time pace, for headless hosts.

use crate::audio::AudioFrame;
use crate::error::{Error, Result};
use crate::playback::mixer::Mixer;
use std::sync::mpsc;
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;
use tracing::{debug, info};

/// Source of devices and output streams
pub trait AudioBackend: Send + Sync {
    /// Short backend name for logs and `/health`
    fn name(&self) -> &'static str;

    fn input_devices(&self) -> Result<Vec<String>>;

    fn output_devices(&self) -> Result<Vec<String>>;

    /// Open `device` (None = backend default) and start pulling audio from
    /// `mixer`.
    ///
    /// Implementations must call [`Mixer::retarget`] with the device rate
    /// before the first render.
    fn open_output(&self, device: Option<&str>, mixer: Arc<Mixer>) -> Result<Box<dyn OutputStream>>;
}

/// A running output stream
pub trait OutputStream: Send + Sync {
    fn device_name(&self) -> &str;

    fn sample_rate(&self) -> u32;

    /// Stop rendering. Blocks until the stream no longer touches the mixer.
    fn stop(&mut self);
}

/// Output device name exposed by [`NullBackend`]
pub const NULL_OUTPUT_DEVICE: &str = "Null Output";

/// Input device name exposed by [`NullBackend`]
pub const NULL_INPUT_DEVICE: &str = "Null Input";

/// Render block size for the null stream
const NULL_BLOCK: Duration = Duration::from_millis(10);

/// Backend without hardware: a paced thread pulls the mixer and discards
/// the result.
#[derive(Debug, Clone)]
pub struct NullBackend {
    sample_rate: u32,
}

impl NullBackend {
    pub fn new(sample_rate: u32) -> Self {
        Self { sample_rate }
    }
}

impl Default for NullBackend {
    fn default() -> Self {
        Self::new(48000)
    }
}

impl AudioBackend for NullBackend {
    fn name(&self) -> &'static str {
        "null"
    }

    fn input_devices(&self) -> Result<Vec<String>> {
        Ok(vec![NULL_INPUT_DEVICE.to_string()])
    }

    fn output_devices(&self) -> Result<Vec<String>> {
        Ok(vec![NULL_OUTPUT_DEVICE.to_string()])
    }

    fn open_output(&self, device: Option<&str>, mixer: Arc<Mixer>) -> Result<Box<dyn OutputStream>> {
        if let Some(name) = device {
            if name != NULL_OUTPUT_DEVICE {
                return Err(Error::DeviceNotFound(name.to_string()));
            }
        }

        let sample_rate = self.sample_rate;
        mixer.retarget(sample_rate);

        let block_frames = (sample_rate as u64 * NULL_BLOCK.as_millis() as u64 / 1000) as usize;
        let (stop_tx, stop_rx) = mpsc::channel::<()>();

        let thread = std::thread::Builder::new()
            .name("vsb-null-output".to_string())
            .spawn(move || {
                let mut buffer = vec![AudioFrame::zero(); block_frames];
                // Pacing: each timeout is one block of wall-clock audio
                while let Err(mpsc::RecvTimeoutError::Timeout) = stop_rx.recv_timeout(NULL_BLOCK) {
                    mixer.render(&mut buffer);
                }
                debug!("Null output thread exiting");
            })
            .map_err(|e| Error::AudioOutput(format!("Failed to spawn null output thread: {}", e)))?;

        info!("Null output started at {}Hz", sample_rate);

        Ok(Box::new(NullStream {
            sample_rate,
            stop_tx: Some(stop_tx),
            thread: Some(thread),
        }))
    }
}

struct NullStream {
    sample_rate: u32,
    stop_tx: Option<mpsc::Sender<()>>,
    thread: Option<JoinHandle<()>>,
}

impl OutputStream for NullStream {
    fn device_name(&self) -> &str {
        NULL_OUTPUT_DEVICE
    }

    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    fn stop(&mut self) {
        if let Some(tx) = self.stop_tx.take() {
            let _ = tx.send(());
        }
        if let Some(thread) = self.thread.take() {
            let _ = thread.join();
        }
    }
}

impl Drop for NullStream {
    fn drop(&mut self) {
        self.stop();
    }
}
