//! Sound library
//!
//! Maps identifiers to files in the clip directory. The directory is the
//! only source of truth: no index is kept, every listing is a fresh scan,
//! and writes become visible through a single atomic rename.

use crate::error::{Error, Result};
use chrono::{DateTime, Utc};
use std::path::{Path, PathBuf};
use tracing::{debug, info};
use uuid::Uuid;

/// Prefix of in-progress files inside the clip directory
pub const STAGING_PREFIX: &str = ".staging-";

/// Longest accepted identifier, in bytes (common filesystem name limit)
pub const MAX_IDENTIFIER_BYTES: usize = 255;

/// A stored, normalized sound
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SoundEntry {
    /// Sanitized file name; unique and case-sensitive
    pub identifier: String,
    /// Absolute storage path
    pub path: PathBuf,
    /// Sample rate the file was normalized to
    pub sample_rate: u32,
    /// When this version of the file became visible
    pub created_at: DateTime<Utc>,
}

/// Check an untrusted file name and return it as an identifier.
///
/// Names are rejected, never rewritten: an accepted identifier is always
/// exactly what the uploader sent, and always a single path component
/// inside the clip directory.
pub fn sanitize_identifier(raw: &str) -> Result<String> {
    let reject = |reason: &str| Err(Error::InvalidIdentifier(format!("{:?}: {}", raw, reason)));

    if raw.trim().is_empty() {
        return reject("empty name");
    }
    if raw.trim() != raw {
        return reject("leading or trailing whitespace");
    }
    if raw.len() > MAX_IDENTIFIER_BYTES {
        return reject("name too long");
    }
    if raw == "." || raw == ".." {
        return reject("directory reference");
    }
    if raw.contains('/') || raw.contains('\\') {
        return reject("path separator");
    }
    if raw.chars().any(char::is_control) {
        return reject("control character");
    }
    if raw.starts_with('.') {
        return reject("hidden or reserved name");
    }

    Ok(raw.to_string())
}

/// Identifier-to-file mapping over one directory
#[derive(Debug, Clone)]
pub struct SoundLibrary {
    clip_dir: PathBuf,
}

impl SoundLibrary {
    /// Open the library, creating the clip directory if needed
    pub async fn open(clip_dir: impl Into<PathBuf>) -> Result<Self> {
        let clip_dir = clip_dir.into();
        tokio::fs::create_dir_all(&clip_dir).await?;
        let clip_dir = tokio::fs::canonicalize(&clip_dir).await?;
        info!("Sound library at {}", clip_dir.display());
        Ok(Self { clip_dir })
    }

    pub fn clip_dir(&self) -> &Path {
        &self.clip_dir
    }

    /// All stored identifiers, sorted.
    ///
    /// Staging files and other hidden entries are not sounds.
    pub async fn list(&self) -> Result<Vec<String>> {
        let mut entries = tokio::fs::read_dir(&self.clip_dir).await?;
        let mut ids = Vec::new();

        while let Some(entry) = entries.next_entry().await? {
            let Ok(name) = entry.file_name().into_string() else {
                continue;
            };
            if name.starts_with('.') {
                continue;
            }
            // A file can vanish between read_dir and file_type
            match entry.file_type().await {
                Ok(ft) if ft.is_file() => ids.push(name),
                _ => {}
            }
        }

        ids.sort();
        debug!(count = ids.len(), "Listed sound library");
        Ok(ids)
    }

    /// Path of the stored file for `identifier`.
    ///
    /// # Errors
    /// - `InvalidIdentifier` if the identifier fails sanitization
    /// - `SoundNotFound` if no such file exists right now
    pub async fn resolve(&self, identifier: &str) -> Result<PathBuf> {
        let identifier = sanitize_identifier(identifier)?;
        let path = self.clip_dir.join(&identifier);

        match tokio::fs::metadata(&path).await {
            Ok(meta) if meta.is_file() => Ok(path),
            Ok(_) => Err(Error::SoundNotFound(identifier)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Err(Error::SoundNotFound(identifier)),
            Err(e) => Err(Error::Io(e)),
        }
    }

    /// Fresh path for an in-progress file with the given extension.
    ///
    /// Staging files live in the clip directory so that the final rename
    /// stays on one filesystem.
    pub fn staging_path(&self, extension: Option<&str>) -> PathBuf {
        let mut name = format!("{}{}", STAGING_PREFIX, Uuid::new_v4());
        if let Some(ext) = extension {
            name.push('.');
            name.push_str(ext);
        }
        self.clip_dir.join(name)
    }

    /// Atomically publish a staged file under `identifier`.
    ///
    /// Replaces any existing file of that name; readers see either the old
    /// complete file or the new one.
    pub async fn commit(&self, staged: &Path, identifier: &str, sample_rate: u32) -> Result<SoundEntry> {
        let identifier = sanitize_identifier(identifier)?;
        let path = self.clip_dir.join(&identifier);

        tokio::fs::rename(staged, &path).await?;
        debug!(identifier = %identifier, "Committed staged file");

        Ok(SoundEntry {
            identifier,
            path,
            sample_rate,
            created_at: Utc::now(),
        })
    }

    /// Remove stale staging files left behind by a crash
    pub async fn sweep_staging(&self) -> Result<usize> {
        let mut entries = tokio::fs::read_dir(&self.clip_dir).await?;
        let mut removed = 0;

        while let Some(entry) = entries.next_entry().await? {
            let is_staging = entry
                .file_name()
                .to_str()
                .is_some_and(|n| n.starts_with(STAGING_PREFIX));
            if is_staging && tokio::fs::remove_file(entry.path()).await.is_ok() {
                removed += 1;
            }
        }

        if removed > 0 {
            info!(removed, "Removed leftover staging files");
        }
        Ok(removed)
    }
}
