//! Bootstrap configuration loading and clip folder resolution
//!
//! Settings sources, highest priority first:
//! 1. Command-line arguments
//! 2. Environment variables
//! 3. TOML configuration file
//! 4. Built-in defaults (code constants)
//!
//! The TOML file is optional. A missing file means defaults; a file that
//! exists but fails to parse is a configuration error.

use crate::{Error, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Environment variable naming the clip directory
pub const CLIP_DIR_ENV: &str = "VSB_CLIP_DIR";

/// Name of the clip directory inside the data folder
pub const CLIP_DIR_NAME: &str = "Audio Clips";

/// Bootstrap configuration loaded from TOML file
///
/// Every field is optional so that a partial file only overrides what it
/// names.
#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct TomlConfig {
    /// HTTP server port
    pub port: Option<u16>,

    /// Directory holding the sound library
    pub clip_dir: Option<PathBuf>,

    /// Directory with the browser UI (main.html, script.js, ...)
    pub web_root: Option<PathBuf>,

    /// Output device opened at startup (None = host default)
    pub output_device: Option<String>,

    /// Audio backend: "cpal" or "null"
    pub audio_backend: Option<String>,

    /// Largest accepted upload body in bytes
    pub max_upload_bytes: Option<usize>,

    /// How long a trigger waits for an in-progress device switch
    pub device_busy_timeout_ms: Option<u64>,

    /// Slack added to a clip's duration before its handle counts as stale
    pub playback_grace_ms: Option<u64>,

    #[serde(default)]
    pub transcoder: TranscoderConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

/// External transcoder settings
#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct TranscoderConfig {
    /// Program used to resample uploads (default: `ffmpeg` on PATH)
    pub program: Option<PathBuf>,
}

/// Logging configuration
#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct LoggingConfig {
    /// Log filter directive (trace, debug, info, warn, error or a full
    /// `EnvFilter` string)
    pub level: Option<String>,
}

impl TomlConfig {
    /// Parse configuration from TOML text
    pub fn parse(text: &str) -> Result<Self> {
        Ok(toml::from_str(text)?)
    }

    /// Read and parse a configuration file
    pub fn from_file(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::parse(&text).map_err(|e| Error::Config(format!("{}: {}", path.display(), e)))
    }

    /// Load the bootstrap configuration.
    ///
    /// An explicitly requested file must exist. Without one, the platform
    /// locations are searched and a missing file yields defaults.
    pub fn load(explicit: Option<&Path>) -> Result<Self> {
        if let Some(path) = explicit {
            info!("Loading configuration from {}", path.display());
            return Self::from_file(path);
        }

        match find_config_file() {
            Some(path) => {
                info!("Loading configuration from {}", path.display());
                Self::from_file(&path)
            }
            None => {
                warn!("No configuration file found, using built-in defaults");
                Ok(Self::default())
            }
        }
    }
}

/// Candidate configuration file locations for the platform, in search order
pub fn config_file_candidates() -> Vec<PathBuf> {
    let mut candidates = Vec::new();

    if let Some(dir) = dirs::config_dir() {
        candidates.push(dir.join("vsb").join("config.toml"));
    }

    if cfg!(target_os = "linux") {
        candidates.push(PathBuf::from("/etc/vsb/config.toml"));
    }

    candidates
}

fn find_config_file() -> Option<PathBuf> {
    config_file_candidates().into_iter().find(|path| {
        let exists = path.exists();
        debug!("Config candidate {}: exists={}", path.display(), exists);
        exists
    })
}

/// Clip directory resolution:
/// 1. Command-line argument (highest priority)
/// 2. `VSB_CLIP_DIR` environment variable
/// 3. TOML `clip_dir`
/// 4. OS-dependent compiled default
pub fn resolve_clip_dir(cli_arg: Option<&Path>, toml: &TomlConfig) -> PathBuf {
    if let Some(path) = cli_arg {
        return path.to_path_buf();
    }

    if let Ok(path) = std::env::var(CLIP_DIR_ENV) {
        if !path.trim().is_empty() {
            return PathBuf::from(path);
        }
    }

    if let Some(path) = &toml.clip_dir {
        return path.clone();
    }

    default_clip_dir()
}

/// OS-dependent default clip directory
pub fn default_clip_dir() -> PathBuf {
    if cfg!(target_os = "linux") {
        // ~/.local/share/vsb/Audio Clips
        dirs::data_local_dir()
            .map(|d| d.join("vsb").join(CLIP_DIR_NAME))
            .unwrap_or_else(|| PathBuf::from("/var/lib/vsb").join(CLIP_DIR_NAME))
    } else if cfg!(target_os = "macos") || cfg!(target_os = "windows") {
        dirs::data_local_dir()
            .map(|d| d.join("vsb").join(CLIP_DIR_NAME))
            .unwrap_or_else(|| PathBuf::from(CLIP_DIR_NAME))
    } else {
        PathBuf::from(CLIP_DIR_NAME)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_empty_is_default() {
        let config = TomlConfig::parse("").unwrap();
        assert_eq!(config, TomlConfig::default());
    }

    #[test]
    fn test_parse_nested_sections() {
        let config = TomlConfig::parse(
            r#"
            port = 8080
            clip_dir = "/srv/clips"

            [transcoder]
            program = "/usr/local/bin/ffmpeg"

            [logging]
            level = "debug"
            "#,
        )
        .unwrap();

        assert_eq!(config.port, Some(8080));
        assert_eq!(config.clip_dir, Some(PathBuf::from("/srv/clips")));
        assert_eq!(config.transcoder.program, Some(PathBuf::from("/usr/local/bin/ffmpeg")));
        assert_eq!(config.logging.level.as_deref(), Some("debug"));
    }

    #[test]
    fn test_unknown_key_is_rejected() {
        let result = TomlConfig::parse("prot = 80");
        assert!(matches!(result, Err(Error::Config(_))));
    }

    #[test]
    fn test_cli_arg_wins() {
        let toml = TomlConfig {
            clip_dir: Some(PathBuf::from("/from/toml")),
            ..Default::default()
        };
        let resolved = resolve_clip_dir(Some(Path::new("/from/cli")), &toml);
        assert_eq!(resolved, PathBuf::from("/from/cli"));
    }

    #[test]
    fn test_default_clip_dir_ends_with_clip_dir_name() {
        assert!(default_clip_dir().ends_with(CLIP_DIR_NAME));
    }
}
