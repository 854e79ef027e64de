//! Virtual Soundboard service (vsb-server)
//!
//! LAN soundboard: uploads are normalized to the output device's sample
//! rate and stored in a clip directory; triggers decode a clip and mix it
//! into one shared output stream, overlapping freely with other triggers
//! and with a momentary 1 kHz tone.
//!
//! # Architecture
//!
//! - [`devices::DeviceRegistry`] owns the active output device and its rate
//! - [`library::SoundLibrary`] maps identifiers to files, atomically
//! - [`ingest::IngestionPipeline`] sanitizes, transcodes and stores uploads
//! - [`playback::PlaybackDispatcher`] decodes clips and attaches them to
//!   the [`playback::Mixer`]
//! - [`playback::ToneToggle`] holds the sequence-ordered tone state
//! - [`api`] exposes all of it over HTTP

pub mod api;
pub mod audio;
pub mod config;
pub mod context;
pub mod devices;
pub mod error;
pub mod ingest;
pub mod library;
pub mod playback;

pub use context::{AppContext, ServiceOptions};
pub use error::{Error, Result};
