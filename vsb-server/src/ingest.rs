//! Ingestion pipeline
//!
//! Turns an uploaded file into a stored clip normalized to the active
//! output rate:
//!
//! 1. Sanitize the identifier
//! 2. Snapshot the active device's sample rate
//! 3. Write the raw bytes to a staging file
//! 4. Transcode the staging file to the snapshot rate
//! 5. Check the result decodes with the playback decoder
//! 6. Atomically rename the result over the final name
//!
//! Ingests of different identifiers share nothing but the directory.
//! Two ingests of the same identifier race; the last rename wins and
//! both files are always complete.

use crate::audio::decoder::SimpleDecoder;
use crate::devices::DeviceRegistry;
use crate::error::{Error, Result};
use crate::library::{sanitize_identifier, SoundEntry, SoundLibrary};
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Resamples an audio file to a target rate
pub trait Transcoder: Send + Sync {
    /// Read `input`, write `output` at `sample_rate`.
    ///
    /// The output container is chosen from `output`'s extension.
    /// Blocking; called from a blocking task.
    fn normalize(&self, input: &Path, output: &Path, sample_rate: u32) -> Result<()>;
}

/// Transcoder running the `ffmpeg` command-line tool
#[derive(Debug, Clone)]
pub struct FfmpegTranscoder {
    program: PathBuf,
}

impl Default for FfmpegTranscoder {
    fn default() -> Self {
        Self::new("ffmpeg")
    }
}

impl FfmpegTranscoder {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self { program: program.into() }
    }

    /// Check that the program can be started
    pub fn is_available(&self) -> bool {
        Command::new(&self.program).arg("-version").output().is_ok()
    }

    fn args(input: &Path, output: &Path, sample_rate: u32) -> Vec<OsString> {
        vec![
            "-hide_banner".into(),
            "-loglevel".into(),
            "error".into(),
            "-y".into(),
            "-i".into(),
            input.as_os_str().to_owned(),
            "-ar".into(),
            sample_rate.to_string().into(),
            output.as_os_str().to_owned(),
        ]
    }
}

impl Transcoder for FfmpegTranscoder {
    fn normalize(&self, input: &Path, output: &Path, sample_rate: u32) -> Result<()> {
        debug!(
            input = %input.display(),
            output = %output.display(),
            sample_rate,
            "Running ffmpeg"
        );

        let result = Command::new(&self.program)
            .args(Self::args(input, output, sample_rate))
            .output()
            .map_err(|e| Error::TranscodeFailed(format!("Failed to run {}: {}", self.program.display(), e)))?;

        if !result.status.success() {
            let stderr = String::from_utf8_lossy(&result.stderr);
            return Err(Error::TranscodeFailed(format!(
                "Exit code: {:?}, stderr: {}",
                result.status.code(),
                stderr.trim()
            )));
        }

        Ok(())
    }
}

/// Upload-to-library pipeline
pub struct IngestionPipeline {
    library: Arc<SoundLibrary>,
    devices: Arc<DeviceRegistry>,
    transcoder: Arc<dyn Transcoder>,
}

impl IngestionPipeline {
    pub fn new(library: Arc<SoundLibrary>, devices: Arc<DeviceRegistry>, transcoder: Arc<dyn Transcoder>) -> Self {
        Self {
            library,
            devices,
            transcoder,
        }
    }

    /// Store `bytes` under `identifier`, normalized to the active rate.
    ///
    /// # Errors
    /// - `InvalidIdentifier`: nothing is written
    /// - `TranscodeFailed`: the previous file (if any) stays in place. Also
    ///   returned when the transcoded file cannot be decoded for playback.
    /// - `Io`: staging or rename failed
    pub async fn ingest(&self, identifier: &str, bytes: &[u8]) -> Result<SoundEntry> {
        let identifier = sanitize_identifier(identifier)?;

        if bytes.is_empty() {
            return Err(Error::TranscodeFailed(format!("{}: upload is empty", identifier)));
        }

        let sample_rate = self.devices.active_output().await.sample_rate;
        let extension = Path::new(&identifier).extension().and_then(|e| e.to_str()).map(str::to_string);

        let raw = self.library.staging_path(extension.as_deref());
        let normalized = self.library.staging_path(extension.as_deref());

        let result = self
            .stage_and_commit(&identifier, bytes, &raw, &normalized, sample_rate)
            .await;

        remove_if_present(&raw).await;
        if result.is_err() {
            remove_if_present(&normalized).await;
        }

        match &result {
            Ok(entry) => info!(
                identifier = %entry.identifier,
                sample_rate = entry.sample_rate,
                bytes = bytes.len(),
                "Sound ingested"
            ),
            Err(e) => warn!(identifier = %identifier, "Ingest failed: {}", e),
        }

        result
    }

    async fn stage_and_commit(
        &self,
        identifier: &str,
        bytes: &[u8],
        raw: &Path,
        normalized: &Path,
        sample_rate: u32,
    ) -> Result<SoundEntry> {
        tokio::fs::write(raw, bytes).await?;

        let transcoder = Arc::clone(&self.transcoder);
        let input = raw.to_path_buf();
        let output = normalized.to_path_buf();
        tokio::task::spawn_blocking(move || transcoder.normalize(&input, &output, sample_rate)).await??;

        match tokio::fs::metadata(normalized).await {
            Ok(meta) if meta.len() > 0 => {}
            _ => {
                return Err(Error::TranscodeFailed(format!("{}: transcoder produced no output", identifier)));
            }
        }

        let output = normalized.to_path_buf();
        tokio::task::spawn_blocking(move || SimpleDecoder::decode_file(&output))
            .await?
            .map_err(|e| Error::TranscodeFailed(format!("{}: output is not playable: {}", identifier, e)))?;

        self.library.commit(normalized, identifier, sample_rate).await
    }
}

async fn remove_if_present(path: &Path) {
    match tokio::fs::remove_file(path).await {
        Ok(()) => debug!("Removed staging file {}", path.display()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => warn!("Failed to remove staging file {}: {}", path.display(), e),
    }
}
