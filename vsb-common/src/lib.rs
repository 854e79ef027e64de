//! # Virtual Soundboard Common Library
//!
//! Shared code for the soundboard service and its tooling:
//! - Error type shared by configuration loading
//! - Bootstrap TOML configuration and clip folder resolution
//! - JSON request types of the HTTP API

pub mod api;
pub mod config;
pub mod error;

pub use error::{Error, Result};
