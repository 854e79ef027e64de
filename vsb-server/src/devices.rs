//! Device registry
//!
//! Owns the active output device. Every consumer reads the active device
//! and its sample rate through [`DeviceRegistry::active_output`] or an
//! [`OutputGuard`], never from a copy cached elsewhere.
//!
//! **Concurrency:**
//! - Switching takes the write side of the output lock for the whole
//!   close/open sequence, so readers see either the old device or the new
//!   one, never a half-switched state.
//! - Only one switch runs at a time; a second concurrent switch fails
//!   immediately with `DeviceBusy`.
//! - Playback attach holds the read side for the short decode-and-attach
//!   window and gives up with `DeviceBusy` after the busy timeout.

use crate::audio::{AudioBackend, OutputStream};
use crate::error::{Error, Result};
use crate::playback::mixer::Mixer;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, RwLock, RwLockReadGuard};
use tracing::{error, info, warn};

/// Which way a device moves audio
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum DeviceDirection {
    Capture,
    Render,
}

/// One enumerated device. Valid for the request that produced it only.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DeviceDescriptor {
    pub name: String,
    /// Position in the backend's enumeration order
    pub index: usize,
    pub direction: DeviceDirection,
}

fn describe(names: Vec<String>, direction: DeviceDirection) -> Vec<DeviceDescriptor> {
    names
        .into_iter()
        .enumerate()
        .map(|(index, name)| DeviceDescriptor { name, index, direction })
        .collect()
}

/// Snapshot of the active output device
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActiveOutputContext {
    pub device_name: String,
    pub sample_rate: u32,
    pub opened_at: DateTime<Utc>,
}

struct ActiveOutput {
    stream: Option<Box<dyn OutputStream>>,
    context: ActiveOutputContext,
}

impl ActiveOutput {
    fn from_stream(stream: Box<dyn OutputStream>) -> Self {
        let context = ActiveOutputContext {
            device_name: stream.device_name().to_string(),
            sample_rate: stream.sample_rate(),
            opened_at: Utc::now(),
        };
        Self {
            stream: Some(stream),
            context,
        }
    }
}

/// Read access to the active output, held while a playback attaches
pub struct OutputGuard<'a> {
    inner: RwLockReadGuard<'a, ActiveOutput>,
}

impl OutputGuard<'_> {
    pub fn device_name(&self) -> &str {
        &self.inner.context.device_name
    }

    pub fn sample_rate(&self) -> u32 {
        self.inner.context.sample_rate
    }

    /// Whether a stream is currently pulling the mixer
    pub fn is_open(&self) -> bool {
        self.inner.stream.is_some()
    }
}

/// Enumerates devices and owns the active output stream
pub struct DeviceRegistry {
    backend: Arc<dyn AudioBackend>,
    mixer: Arc<Mixer>,
    output: RwLock<ActiveOutput>,
    switch_lock: Mutex<()>,
    selected_input: RwLock<Option<String>>,
    busy_timeout: Duration,
}

impl DeviceRegistry {
    /// Open the startup output device.
    ///
    /// A configured device that is not present falls back to the backend
    /// default with a warning.
    pub async fn open(
        backend: Arc<dyn AudioBackend>,
        mixer: Arc<Mixer>,
        initial_device: Option<String>,
        busy_timeout: Duration,
    ) -> Result<Self> {
        let stream = match initial_device {
            Some(name) => match open_blocking(&backend, &mixer, Some(name.clone())).await {
                Ok(stream) => stream,
                Err(Error::DeviceNotFound(_)) => {
                    warn!("Configured output device '{}' not found, falling back to default device", name);
                    open_blocking(&backend, &mixer, None).await?
                }
                Err(e) => return Err(e),
            },
            None => open_blocking(&backend, &mixer, None).await?,
        };

        let output = ActiveOutput::from_stream(stream);
        info!(
            device = %output.context.device_name,
            sample_rate = output.context.sample_rate,
            backend = backend.name(),
            "Output device opened"
        );

        Ok(Self {
            backend,
            mixer,
            output: RwLock::new(output),
            switch_lock: Mutex::new(()),
            selected_input: RwLock::new(None),
            busy_timeout,
        })
    }

    pub fn backend_name(&self) -> &'static str {
        self.backend.name()
    }

    /// Current output devices in enumeration order, freshly enumerated
    pub async fn list_output_devices(&self) -> Result<Vec<DeviceDescriptor>> {
        let backend = Arc::clone(&self.backend);
        let names = tokio::task::spawn_blocking(move || backend.output_devices()).await??;
        Ok(describe(names, DeviceDirection::Render))
    }

    /// Current input devices in enumeration order, freshly enumerated
    pub async fn list_input_devices(&self) -> Result<Vec<DeviceDescriptor>> {
        let backend = Arc::clone(&self.backend);
        let names = tokio::task::spawn_blocking(move || backend.input_devices()).await??;
        Ok(describe(names, DeviceDirection::Capture))
    }

    /// Snapshot of the active output.
    ///
    /// Waits for an in-progress switch to finish.
    pub async fn active_output(&self) -> ActiveOutputContext {
        self.output.read().await.context.clone()
    }

    /// Hold the active output steady while a playback is prepared.
    ///
    /// # Errors
    /// `DeviceBusy` if a switch is still running after the busy timeout.
    pub async fn attach_guard(&self) -> Result<OutputGuard<'_>> {
        match tokio::time::timeout(self.busy_timeout, self.output.read()).await {
            Ok(inner) => Ok(OutputGuard { inner }),
            Err(_) => Err(Error::DeviceBusy(format!(
                "output device switch still in progress after {}ms",
                self.busy_timeout.as_millis()
            ))),
        }
    }

    /// Make `name` the active output device.
    ///
    /// If the new device fails to open, the previous device is reopened so
    /// the service keeps an output.
    pub async fn set_output_device(&self, name: &str) -> Result<ActiveOutputContext> {
        let _switching = self
            .switch_lock
            .try_lock()
            .map_err(|_| Error::DeviceBusy("another output device switch is in progress".to_string()))?;

        let available = self.list_output_devices().await?;
        if !available.iter().any(|d| d.name == name) {
            return Err(Error::DeviceNotFound(name.to_string()));
        }

        let mut output = self.output.write().await;
        let previous = output.context.clone();

        if let Some(old) = output.stream.take() {
            close_blocking(old).await?;
        }

        match open_blocking(&self.backend, &self.mixer, Some(name.to_string())).await {
            Ok(stream) => {
                *output = ActiveOutput::from_stream(stream);
                info!(
                    device = %output.context.device_name,
                    sample_rate = output.context.sample_rate,
                    previous = %previous.device_name,
                    "Output device switched"
                );
                Ok(output.context.clone())
            }
            Err(e) => {
                warn!("Failed to open output device '{}': {}, restoring '{}'", name, e, previous.device_name);
                match open_blocking(&self.backend, &self.mixer, Some(previous.device_name.clone())).await {
                    Ok(stream) => *output = ActiveOutput::from_stream(stream),
                    Err(restore_err) => {
                        // Keep the old context so rate snapshots stay meaningful
                        error!("Failed to restore output device '{}': {}", previous.device_name, restore_err);
                        output.context = previous;
                    }
                }
                Err(e)
            }
        }
    }

    /// Record the selected input device.
    ///
    /// Nothing captures audio yet; the selection is validated and kept.
    pub async fn set_input_device(&self, name: &str) -> Result<()> {
        let available = self.list_input_devices().await?;
        if !available.iter().any(|d| d.name == name) {
            return Err(Error::DeviceNotFound(name.to_string()));
        }

        *self.selected_input.write().await = Some(name.to_string());
        info!(device = name, "Input device selected");
        Ok(())
    }

    pub async fn selected_input(&self) -> Option<String> {
        self.selected_input.read().await.clone()
    }

    /// Stop the active output stream
    pub async fn shutdown(&self) {
        let mut output = self.output.write().await;
        if let Some(stream) = output.stream.take() {
            if let Err(e) = close_blocking(stream).await {
                warn!("Error closing output device: {}", e);
            }
        }
    }
}

async fn open_blocking(
    backend: &Arc<dyn AudioBackend>,
    mixer: &Arc<Mixer>,
    device: Option<String>,
) -> Result<Box<dyn OutputStream>> {
    let backend = Arc::clone(backend);
    let mixer = Arc::clone(mixer);
    tokio::task::spawn_blocking(move || backend.open_output(device.as_deref(), mixer)).await?
}

async fn close_blocking(mut stream: Box<dyn OutputStream>) -> Result<()> {
    tokio::task::spawn_blocking(move || stream.stop()).await?;
    Ok(())
}
