//! HTTP request handlers
//!
//! Every failure is logged here, at the request boundary, before it becomes
//! a response. No failure ends the process.

use crate::context::AppContext;
use crate::devices::DeviceDescriptor;
use crate::error::Error;
use crate::playback::ToneUpdate;
use axum::{
    body::Bytes,
    extract::{multipart::MultipartRejection, Multipart, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use tracing::{error, info, warn};
use vsb_common::api::{SetDeviceRequest, ToneRequest};

// ============================================================================
// Response Types
// ============================================================================

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    status: String,
    module: String,
    version: String,
    git_hash: String,
    build_timestamp: String,
    build_profile: String,
    audio_backend: String,
    output_device: String,
    sample_rate: u32,
    active_playbacks: usize,
    sound_count: usize,
}

#[derive(Debug, Serialize)]
pub struct OutputDeviceResponse {
    device: String,
    sample_rate: u32,
}

#[derive(Debug, Serialize)]
pub struct InputDeviceResponse {
    device: String,
}

fn log_failure(operation: &str, err: &Error) {
    if err.status_code().is_server_error() {
        error!(operation, "Request failed: {}", err);
    } else {
        warn!(operation, "Request rejected: {}", err);
    }
}

// ============================================================================
// Health Endpoint
// ============================================================================

/// GET /health - Health check endpoint
pub async fn health(State(ctx): State<AppContext>) -> Json<HealthResponse> {
    let output = ctx.devices.active_output().await;
    let sound_count = match ctx.library.list().await {
        Ok(ids) => ids.len(),
        Err(e) => {
            warn!("Health check could not list sounds: {}", e);
            0
        }
    };

    Json(HealthResponse {
        status: "healthy".to_string(),
        module: "vsb-server".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        git_hash: env!("GIT_HASH").to_string(),
        build_timestamp: env!("BUILD_TIMESTAMP").to_string(),
        build_profile: env!("BUILD_PROFILE").to_string(),
        audio_backend: ctx.devices.backend_name().to_string(),
        output_device: output.device_name,
        sample_rate: output.sample_rate,
        active_playbacks: ctx.dispatcher.active_playbacks(),
        sound_count,
    })
}

// ============================================================================
// Device Endpoints
// ============================================================================

fn device_names(devices: Vec<DeviceDescriptor>) -> Json<Vec<String>> {
    Json(devices.into_iter().map(|d| d.name).collect())
}

/// GET /api/input-devices
pub async fn list_input_devices(State(ctx): State<AppContext>) -> Result<Json<Vec<String>>, Error> {
    ctx.devices.list_input_devices().await.map(device_names).map_err(|e| {
        log_failure("list_input_devices", &e);
        e
    })
}

/// GET /api/output-devices
pub async fn list_output_devices(State(ctx): State<AppContext>) -> Result<Json<Vec<String>>, Error> {
    ctx.devices.list_output_devices().await.map(device_names).map_err(|e| {
        log_failure("list_output_devices", &e);
        e
    })
}

/// POST /api/set-input-device
pub async fn set_input_device(
    State(ctx): State<AppContext>,
    Json(req): Json<SetDeviceRequest>,
) -> Result<Json<InputDeviceResponse>, Error> {
    match ctx.devices.set_input_device(&req.device).await {
        Ok(()) => Ok(Json(InputDeviceResponse { device: req.device })),
        Err(e) => {
            log_failure("set_input_device", &e);
            Err(e)
        }
    }
}

/// POST /api/set-output-device
pub async fn set_output_device(
    State(ctx): State<AppContext>,
    Json(req): Json<SetDeviceRequest>,
) -> Result<Json<OutputDeviceResponse>, Error> {
    match ctx.devices.set_output_device(&req.device).await {
        Ok(active) => Ok(Json(OutputDeviceResponse {
            device: active.device_name,
            sample_rate: active.sample_rate,
        })),
        Err(e) => {
            log_failure("set_output_device", &e);
            Err(e)
        }
    }
}

// ============================================================================
// Tone Endpoint
// ============================================================================

/// POST /api/play-beep
///
/// Requests without a `sequence` are ordered by arrival.
pub async fn play_beep(State(ctx): State<AppContext>, Json(req): Json<ToneRequest>) -> Result<&'static str, Error> {
    let update = match req.sequence {
        Some(sequence) => ctx.tone.set_tone(req.play, sequence).map_err(|e| {
            log_failure("play_beep", &e);
            e
        })?,
        None => ctx.tone.set_tone_next(req.play),
    };

    Ok(match update {
        ToneUpdate::Applied(state) if state.active => "Beep started",
        ToneUpdate::Applied(_) => "Beep stopped",
        ToneUpdate::Stale { .. } => "Beep request ignored",
    })
}

// ============================================================================
// Sound Endpoints
// ============================================================================

/// POST /api/upload-sound
///
/// Multipart form; the first part that carries a file name is stored under
/// that name.
pub async fn upload_sound(
    State(ctx): State<AppContext>,
    multipart: Result<Multipart, MultipartRejection>,
) -> Response {
    let mut multipart = match multipart {
        Ok(multipart) => multipart,
        Err(rejection) => {
            warn!("Upload rejected: {}", rejection);
            return (StatusCode::BAD_REQUEST, "Invalid content type.").into_response();
        }
    };

    let mut upload: Option<(String, Bytes)> = None;
    loop {
        match multipart.next_field().await {
            Ok(Some(field)) => {
                let Some(file_name) = field.file_name().map(str::to_string) else {
                    continue;
                };
                match field.bytes().await {
                    Ok(bytes) => {
                        upload = Some((file_name, bytes));
                        break;
                    }
                    Err(e) => {
                        warn!("Failed to read upload body: {}", e);
                        return (e.status(), e.body_text()).into_response();
                    }
                }
            }
            Ok(None) => break,
            Err(e) => {
                warn!("Malformed multipart upload: {}", e);
                return (e.status(), e.body_text()).into_response();
            }
        }
    }

    let Some((identifier, bytes)) = upload else {
        return (StatusCode::BAD_REQUEST, "No file found in the request.").into_response();
    };

    info!(identifier = %identifier, bytes = bytes.len(), "Upload received");

    match ctx.ingest.ingest(&identifier, &bytes).await {
        Ok(_) => (StatusCode::OK, "Sound uploaded!").into_response(),
        Err(e) => {
            log_failure("upload_sound", &e);
            if e.status_code().is_client_error() {
                e.into_response()
            } else {
                (StatusCode::INTERNAL_SERVER_ERROR, "Error uploading sound.").into_response()
            }
        }
    }
}

/// Any non-POST method on the upload route
pub async fn upload_wrong_method() -> (StatusCode, &'static str) {
    (StatusCode::BAD_REQUEST, "Invalid request method.")
}

/// GET /api/get-sound-ids
pub async fn get_sound_ids(State(ctx): State<AppContext>) -> Result<Json<Vec<String>>, Error> {
    ctx.library.list().await.map(Json).map_err(|e| {
        log_failure("get_sound_ids", &e);
        e
    })
}

/// POST /api/play-sound
///
/// Body is the identifier as plain text, used exactly as sent. Returns once
/// the clip is attached to the mixer, not when it finishes.
pub async fn play_sound(State(ctx): State<AppContext>, body: String) -> Response {
    match ctx.dispatcher.trigger(&body).await {
        Ok(handle) => (StatusCode::OK, format!("Sound played: {}", handle.identifier)).into_response(),
        Err(e) => {
            log_failure("play_sound", &e);
            let status = match e {
                Error::DeviceBusy(_) => StatusCode::SERVICE_UNAVAILABLE,
                _ => StatusCode::INTERNAL_SERVER_ERROR,
            };
            (status, "Error playing sound.").into_response()
        }
    }
}
