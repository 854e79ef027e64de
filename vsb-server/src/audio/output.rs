//! Audio output using cpal
//!
//! Manages device enumeration and callback-based playback. The stream
//! callback pulls whole buffers from the mixer.

use crate::audio::backend::{AudioBackend, OutputStream};
use crate::audio::AudioFrame;
use crate::error::{Error, Result};
use crate::playback::mixer::Mixer;
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{Device, FromSample, SampleFormat, SizedSample, Stream, StreamConfig};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc;
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;
use tracing::{debug, error, info, warn};

/// How often the stream thread checks the error flag
const ERROR_POLL_INTERVAL: Duration = Duration::from_secs(1);

/// Audio output manager using cpal.
pub struct AudioOutput {
    device: Device,
    device_name: String,
    config: StreamConfig,
    sample_format: SampleFormat,
    stream: Option<Stream>,
    /// Stream error flag - set by audio callback on error
    error_flag: Arc<AtomicBool>,
}

impl AudioOutput {
    /// List available audio output devices.
    pub fn list_output_devices() -> Result<Vec<String>> {
        let host = cpal::default_host();

        let devices: Vec<String> = host
            .output_devices()
            .map_err(|e| Error::AudioOutput(format!("Failed to enumerate devices: {}", e)))?
            .filter_map(|device| device.name().ok())
            .collect();

        debug!("Found {} output devices", devices.len());
        Ok(devices)
    }

    /// List available audio input devices.
    pub fn list_input_devices() -> Result<Vec<String>> {
        let host = cpal::default_host();

        let devices: Vec<String> = host
            .input_devices()
            .map_err(|e| Error::AudioOutput(format!("Failed to enumerate devices: {}", e)))?
            .filter_map(|device| device.name().ok())
            .collect();

        debug!("Found {} input devices", devices.len());
        Ok(devices)
    }

    /// Open audio device for output.
    ///
    /// # Arguments
    /// - `device_name`: Optional device name (None = host default device)
    ///
    /// # Errors
    /// - `DeviceNotFound` if a named device is not present
    /// - `AudioOutput` if the device has no usable configuration
    pub fn new(device_name: Option<&str>) -> Result<Self> {
        let host = cpal::default_host();

        let (device, device_name) = match device_name {
            Some(name) => {
                let mut devices = host
                    .output_devices()
                    .map_err(|e| Error::AudioOutput(format!("Failed to enumerate devices: {}", e)))?;

                let dev = devices
                    .find(|d| d.name().ok().as_deref() == Some(name))
                    .ok_or_else(|| Error::DeviceNotFound(name.to_string()))?;
                info!("Found requested audio device: {}", name);
                (dev, name.to_string())
            }
            None => {
                let dev = host
                    .default_output_device()
                    .ok_or_else(|| Error::AudioOutput("No default output device found".to_string()))?;

                let name = dev.name().unwrap_or_else(|_| "Unknown".to_string());
                info!("Using default audio device: {}", name);
                (dev, name)
            }
        };

        let (config, sample_format) = Self::get_best_config(&device)?;

        debug!(
            "Audio config: sample_rate={}, channels={}, format={:?}",
            config.sample_rate.0, config.channels, sample_format
        );

        Ok(Self {
            device,
            device_name,
            config,
            sample_format,
            stream: None,
            error_flag: Arc::new(AtomicBool::new(false)),
        })
    }

    /// Get the configuration to play with.
    ///
    /// Uses the device's default rate so that uploads can be normalized to
    /// exactly what the device runs at.
    fn get_best_config(device: &Device) -> Result<(StreamConfig, SampleFormat)> {
        let supported_config = device
            .default_output_config()
            .map_err(|e| Error::AudioOutput(format!("Failed to get default config: {}", e)))?;

        let sample_format = supported_config.sample_format();
        let config = supported_config.config();
        Ok((config, sample_format))
    }

    pub fn device_name(&self) -> &str {
        &self.device_name
    }

    pub fn sample_rate(&self) -> u32 {
        self.config.sample_rate.0
    }

    pub fn has_error(&self) -> bool {
        self.error_flag.load(Ordering::SeqCst)
    }

    /// Start audio playback with callback.
    ///
    /// `render` is invoked on the real-time audio thread once per device
    /// buffer and must fill the slice it is given. It must not block.
    pub fn start<F>(&mut self, render: F) -> Result<()>
    where
        F: FnMut(&mut [AudioFrame]) + Send + 'static,
    {
        info!("Starting audio stream on {}", self.device_name);

        let stream = match self.sample_format {
            SampleFormat::F32 => self.build_stream::<f32, F>(render)?,
            SampleFormat::I16 => self.build_stream::<i16, F>(render)?,
            SampleFormat::U16 => self.build_stream::<u16, F>(render)?,
            sample_format => {
                return Err(Error::AudioOutput(format!(
                    "Unsupported sample format: {:?}",
                    sample_format
                )));
            }
        };

        stream
            .play()
            .map_err(|e| Error::AudioOutput(format!("Failed to start stream: {}", e)))?;

        self.stream = Some(stream);

        info!("Audio stream started successfully");
        Ok(())
    }

    fn build_stream<T, F>(&self, mut render: F) -> Result<Stream>
    where
        T: SizedSample + FromSample<f32>,
        F: FnMut(&mut [AudioFrame]) + Send + 'static,
    {
        let channels = self.config.channels as usize;
        let error_flag = Arc::clone(&self.error_flag);
        let mut scratch: Vec<AudioFrame> = Vec::new();

        self.device
            .build_output_stream(
                &self.config,
                move |data: &mut [T], _: &cpal::OutputCallbackInfo| {
                    let frames = data.len() / channels.max(1);
                    scratch.resize(frames, AudioFrame::zero());
                    render(&mut scratch);

                    for (out, frame) in data.chunks_mut(channels).zip(scratch.iter()) {
                        match out.len() {
                            0 => {}
                            1 => out[0] = T::from_sample((frame.left + frame.right) * 0.5),
                            _ => {
                                out[0] = T::from_sample(frame.left);
                                out[1] = T::from_sample(frame.right);
                                for extra in out.iter_mut().skip(2) {
                                    *extra = T::from_sample(0.0f32);
                                }
                            }
                        }
                    }
                },
                move |err| {
                    error!("Audio stream error: {}", err);
                    error_flag.store(true, Ordering::SeqCst);
                },
                None,
            )
            .map_err(|e| Error::AudioOutput(format!("Failed to build stream: {}", e)))
    }

    /// Stop audio playback.
    pub fn stop(&mut self) {
        if let Some(stream) = self.stream.take() {
            info!("Stopping audio stream on {}", self.device_name);
            drop(stream);
        }
    }
}

impl Drop for AudioOutput {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Output backend driving real sound cards through cpal.
///
/// `cpal::Stream` is not `Send`, so every open device lives on its own
/// thread for as long as it plays. The handle talks to that thread over
/// channels.
#[derive(Debug, Default)]
pub struct CpalBackend;

impl CpalBackend {
    pub fn new() -> Self {
        Self
    }
}

impl AudioBackend for CpalBackend {
    fn name(&self) -> &'static str {
        "cpal"
    }

    fn input_devices(&self) -> Result<Vec<String>> {
        AudioOutput::list_input_devices()
    }

    fn output_devices(&self) -> Result<Vec<String>> {
        AudioOutput::list_output_devices()
    }

    fn open_output(&self, device: Option<&str>, mixer: Arc<Mixer>) -> Result<Box<dyn OutputStream>> {
        let requested = device.map(str::to_string);
        let (ready_tx, ready_rx) = mpsc::sync_channel::<Result<(String, u32)>>(1);
        let (stop_tx, stop_rx) = mpsc::channel::<()>();

        let thread = std::thread::Builder::new()
            .name("vsb-audio-output".to_string())
            .spawn(move || {
                let mut output = match AudioOutput::new(requested.as_deref()) {
                    Ok(output) => output,
                    Err(e) => {
                        let _ = ready_tx.send(Err(e));
                        return;
                    }
                };

                let sample_rate = output.sample_rate();
                mixer.retarget(sample_rate);

                let render_mixer = Arc::clone(&mixer);
                if let Err(e) = output.start(move |buf| render_mixer.render(buf)) {
                    let _ = ready_tx.send(Err(e));
                    return;
                }

                let _ = ready_tx.send(Ok((output.device_name().to_string(), sample_rate)));

                let mut reported = false;
                loop {
                    match stop_rx.recv_timeout(ERROR_POLL_INTERVAL) {
                        Err(mpsc::RecvTimeoutError::Timeout) => {
                            if output.has_error() && !reported {
                                warn!("Output stream on {} reported an error", output.device_name());
                                reported = true;
                            }
                        }
                        _ => break,
                    }
                }

                output.stop();
            })
            .map_err(|e| Error::AudioOutput(format!("Failed to spawn output thread: {}", e)))?;

        match ready_rx.recv() {
            Ok(Ok((device_name, sample_rate))) => Ok(Box::new(CpalStream {
                device_name,
                sample_rate,
                stop_tx: Some(stop_tx),
                thread: Some(thread),
            })),
            Ok(Err(e)) => {
                let _ = thread.join();
                Err(e)
            }
            Err(_) => {
                let _ = thread.join();
                Err(Error::AudioOutput("Output thread exited during startup".to_string()))
            }
        }
    }
}

/// Handle to a device stream running on its own thread
struct CpalStream {
    device_name: String,
    sample_rate: u32,
    stop_tx: Option<mpsc::Sender<()>>,
    thread: Option<JoinHandle<()>>,
}

impl OutputStream for CpalStream {
    fn device_name(&self) -> &str {
        &self.device_name
    }

    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    fn stop(&mut self) {
        if let Some(tx) = self.stop_tx.take() {
            let _ = tx.send(());
        }
        if let Some(thread) = self.thread.take() {
            if thread.join().is_err() {
                error!("Output thread for {} panicked", self.device_name);
            }
        }
    }
}

impl Drop for CpalStream {
    fn drop(&mut self) {
        self.stop();
    }
}
