//! Request bodies accepted by the soundboard HTTP API
//!
//! Kept here so that clients (the web UI test harness, scripts) and the
//! server agree on field names.

use serde::{Deserialize, Serialize};

/// Body of `POST /api/set-input-device` and `POST /api/set-output-device`
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SetDeviceRequest {
    /// Device name exactly as reported by the device listing endpoints
    pub device: String,
}

/// Body of `POST /api/play-beep`
///
/// `sequence` is optional: browsers that only send `{"play": bool}` get a
/// server-assigned sequence in arrival order.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ToneRequest {
    pub play: bool,
    #[serde(default)]
    pub sequence: Option<u64>,
}
