//! Runtime configuration
//!
//! Assembled once at startup from command-line/environment overrides and
//! the bootstrap TOML file. Everything downstream reads this struct.

use crate::error::{Error, Result};
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;
use vsb_common::config::{resolve_clip_dir, TomlConfig};

pub const DEFAULT_PORT: u16 = 40605;
pub const DEFAULT_MAX_UPLOAD_BYTES: usize = 32 * 1024 * 1024;
pub const DEFAULT_DEVICE_BUSY_TIMEOUT_MS: u64 = 2000;
pub const DEFAULT_PLAYBACK_GRACE_MS: u64 = 5000;
pub const DEFAULT_LOG_FILTER: &str = "vsb_server=info,tower_http=info";

/// Which audio backend drives the mixer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
pub enum BackendKind {
    /// Real sound cards through cpal
    #[default]
    Cpal,
    /// No hardware; a software clock pulls the mixer
    Null,
}

impl FromStr for BackendKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "cpal" => Ok(Self::Cpal),
            "null" => Ok(Self::Null),
            other => Err(Error::Config(format!(
                "Unknown audio backend '{}' (expected cpal or null)",
                other
            ))),
        }
    }
}

/// Values given on the command line or through environment variables.
///
/// `None` means "not given"; the TOML file or the default applies.
#[derive(Debug, Clone, Default)]
pub struct ConfigOverrides {
    pub port: Option<u16>,
    pub clip_dir: Option<PathBuf>,
    pub web_root: Option<PathBuf>,
    pub output_device: Option<String>,
    pub audio_backend: Option<BackendKind>,
    pub ffmpeg: Option<PathBuf>,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub port: u16,
    pub clip_dir: PathBuf,
    pub web_root: Option<PathBuf>,
    pub output_device: Option<String>,
    pub audio_backend: BackendKind,
    pub ffmpeg: PathBuf,
    pub max_upload_bytes: usize,
    pub device_busy_timeout: Duration,
    pub playback_grace: Duration,
    pub log_filter: String,
}

impl Config {
    pub fn from_sources(overrides: ConfigOverrides, toml: &TomlConfig) -> Result<Self> {
        let audio_backend = match overrides.audio_backend {
            Some(kind) => kind,
            None => match &toml.audio_backend {
                Some(name) => name.parse()?,
                None => BackendKind::default(),
            },
        };

        let max_upload_bytes = toml.max_upload_bytes.unwrap_or(DEFAULT_MAX_UPLOAD_BYTES);
        if max_upload_bytes == 0 {
            return Err(Error::Config("max_upload_bytes must be greater than zero".to_string()));
        }

        Ok(Self {
            port: overrides.port.or(toml.port).unwrap_or(DEFAULT_PORT),
            clip_dir: resolve_clip_dir(overrides.clip_dir.as_deref(), toml),
            web_root: overrides.web_root.or_else(|| toml.web_root.clone()),
            output_device: overrides.output_device.or_else(|| toml.output_device.clone()),
            audio_backend,
            ffmpeg: overrides
                .ffmpeg
                .or_else(|| toml.transcoder.program.clone())
                .unwrap_or_else(|| PathBuf::from("ffmpeg")),
            max_upload_bytes,
            device_busy_timeout: Duration::from_millis(
                toml.device_busy_timeout_ms.unwrap_or(DEFAULT_DEVICE_BUSY_TIMEOUT_MS),
            ),
            playback_grace: Duration::from_millis(toml.playback_grace_ms.unwrap_or(DEFAULT_PLAYBACK_GRACE_MS)),
            log_filter: toml
                .logging
                .level
                .clone()
                .unwrap_or_else(|| DEFAULT_LOG_FILTER.to_string()),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let overrides = ConfigOverrides {
            clip_dir: Some(PathBuf::from("/tmp/clips")),
            ..Default::default()
        };
        let config = Config::from_sources(overrides, &TomlConfig::default()).unwrap();
        assert_eq!(config.port, DEFAULT_PORT);
        assert_eq!(config.clip_dir, PathBuf::from("/tmp/clips"));
        assert_eq!(config.audio_backend, BackendKind::Cpal);
        assert_eq!(config.ffmpeg, PathBuf::from("ffmpeg"));
        assert_eq!(config.max_upload_bytes, DEFAULT_MAX_UPLOAD_BYTES);
        assert_eq!(config.device_busy_timeout, Duration::from_millis(2000));
        assert_eq!(config.log_filter, DEFAULT_LOG_FILTER);
        assert!(config.web_root.is_none());
    }

    #[test]
    fn test_overrides_beat_toml() {
        let toml = TomlConfig::parse(
            r#"
            port = 9000
            audio_backend = "null"
            output_device = "HDMI"

            [transcoder]
            program = "/opt/ffmpeg"
            "#,
        )
        .unwrap();

        let overrides = ConfigOverrides {
            port: Some(9100),
            clip_dir: Some(PathBuf::from("/tmp/clips")),
            audio_backend: Some(BackendKind::Cpal),
            ..Default::default()
        };
        let config = Config::from_sources(overrides, &toml).unwrap();
        assert_eq!(config.port, 9100);
        assert_eq!(config.audio_backend, BackendKind::Cpal);
        assert_eq!(config.output_device.as_deref(), Some("HDMI"));
        assert_eq!(config.ffmpeg, PathBuf::from("/opt/ffmpeg"));
    }

    #[test]
    fn test_toml_tuning_values() {
        let toml = TomlConfig::parse(
            r#"
            max_upload_bytes = 1024
            device_busy_timeout_ms = 50
            playback_grace_ms = 10

            [logging]
            level = "debug"
            "#,
        )
        .unwrap();
        let overrides = ConfigOverrides {
            clip_dir: Some(PathBuf::from("/tmp/clips")),
            ..Default::default()
        };
        let config = Config::from_sources(overrides, &toml).unwrap();
        assert_eq!(config.max_upload_bytes, 1024);
        assert_eq!(config.device_busy_timeout, Duration::from_millis(50));
        assert_eq!(config.playback_grace, Duration::from_millis(10));
        assert_eq!(config.log_filter, "debug");
    }

    #[test]
    fn test_unknown_backend_rejected() {
        let toml = TomlConfig::parse(r#"audio_backend = "jack""#).unwrap();
        let overrides = ConfigOverrides {
            clip_dir: Some(PathBuf::from("/tmp/clips")),
            ..Default::default()
        };
        assert!(matches!(Config::from_sources(overrides, &toml), Err(Error::Config(_))));
    }

    #[test]
    fn test_backend_kind_parse() {
        assert_eq!("NULL".parse::<BackendKind>().unwrap(), BackendKind::Null);
        assert_eq!(" cpal ".parse::<BackendKind>().unwrap(), BackendKind::Cpal);
    }
}
