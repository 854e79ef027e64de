//! Output backend driven by the test
//!
//! Two fake devices with different rates. Nothing renders on its own: the
//! test calls [`ManualBackend::pull`] to advance the output, so playback
//! completion is deterministic.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use vsb_server::audio::{AudioBackend, AudioFrame, OutputStream};
use vsb_server::playback::Mixer;
use vsb_server::{Error, Result};

pub const DEVICE_A: &str = "Manual A";
pub const DEVICE_B: &str = "Manual B";

const DEVICE_A_RATE: u32 = 48000;
const DEVICE_B_RATE: u32 = 44100;

#[derive(Default)]
struct Shared {
    open: Mutex<Option<Arc<Mixer>>>,
    failing_opens: AtomicUsize,
    opens: AtomicUsize,
}

#[derive(Clone, Default)]
pub struct ManualBackend {
    shared: Arc<Shared>,
}

impl ManualBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn rate_of(device: &str) -> Option<u32> {
        match device {
            DEVICE_A => Some(DEVICE_A_RATE),
            DEVICE_B => Some(DEVICE_B_RATE),
            _ => None,
        }
    }

    /// Render `frames` frames from the open stream, if any
    pub fn pull(&self, frames: usize) -> Vec<AudioFrame> {
        let mut buffer = vec![AudioFrame::zero(); frames];
        if let Some(mixer) = self.shared.open.lock().unwrap().as_ref() {
            mixer.render(&mut buffer);
        }
        buffer
    }

    /// Make the next `open_output` call fail with an output error
    pub fn fail_next_open(&self) {
        self.fail_next_opens(1);
    }

    /// Make the next `count` `open_output` calls fail
    pub fn fail_next_opens(&self, count: usize) {
        self.shared.failing_opens.store(count, Ordering::SeqCst);
    }

    pub fn open_count(&self) -> usize {
        self.shared.opens.load(Ordering::SeqCst)
    }

    pub fn is_open(&self) -> bool {
        self.shared.open.lock().unwrap().is_some()
    }
}

impl AudioBackend for ManualBackend {
    fn name(&self) -> &'static str {
        "manual"
    }

    fn input_devices(&self) -> Result<Vec<String>> {
        Ok(vec!["Manual Mic".to_string()])
    }

    fn output_devices(&self) -> Result<Vec<String>> {
        Ok(vec![DEVICE_A.to_string(), DEVICE_B.to_string()])
    }

    fn open_output(&self, device: Option<&str>, mixer: Arc<Mixer>) -> Result<Box<dyn OutputStream>> {
        let name = device.unwrap_or(DEVICE_A);
        let rate = Self::rate_of(name).ok_or_else(|| Error::DeviceNotFound(name.to_string()))?;

        let failing = self
            .shared
            .failing_opens
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1));
        if failing.is_ok() {
            return Err(Error::AudioOutput(format!("{} refused to open", name)));
        }

        mixer.retarget(rate);
        *self.shared.open.lock().unwrap() = Some(mixer);
        self.shared.opens.fetch_add(1, Ordering::SeqCst);

        Ok(Box::new(ManualStream {
            device_name: name.to_string(),
            sample_rate: rate,
            shared: Arc::clone(&self.shared),
        }))
    }
}

struct ManualStream {
    device_name: String,
    sample_rate: u32,
    shared: Arc<Shared>,
}

impl OutputStream for ManualStream {
    fn device_name(&self) -> &str {
        &self.device_name
    }

    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    fn stop(&mut self) {
        self.shared.open.lock().unwrap().take();
    }
}
