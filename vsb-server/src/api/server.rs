//! HTTP server setup and routing

use crate::context::AppContext;
use axum::{
    extract::DefaultBodyLimit,
    routing::{get, post},
    Router,
};
use std::path::Path;
use tower_http::cors::CorsLayer;
use tower_http::services::{ServeDir, ServeFile};
use tower_http::trace::TraceLayer;
use tracing::info;

/// Page served at `/` when a web root is configured
pub const INDEX_PAGE: &str = "main.html";

/// Build the application router.
///
/// API routes take precedence over files under `web_root`.
pub fn create_router(ctx: AppContext, web_root: Option<&Path>, max_upload_bytes: usize) -> Router {
    let api = Router::new()
        // Health endpoint
        .route("/health", get(super::handlers::health))

        // Audio devices
        .route("/api/input-devices", get(super::handlers::list_input_devices))
        .route("/api/output-devices", get(super::handlers::list_output_devices))
        .route("/api/set-input-device", post(super::handlers::set_input_device))
        .route("/api/set-output-device", post(super::handlers::set_output_device))

        // Tone
        .route("/api/play-beep", post(super::handlers::play_beep))

        // Sounds
        .route(
            "/api/upload-sound",
            post(super::handlers::upload_sound).fallback(super::handlers::upload_wrong_method),
        )
        .route("/api/get-sound-ids", get(super::handlers::get_sound_ids))
        .route("/api/play-sound", post(super::handlers::play_sound))

        // Attach application context
        .with_state(ctx);

    let app = match web_root {
        Some(root) => {
            info!("Serving web UI from {}", root.display());
            api.route_service("/", ServeFile::new(root.join(INDEX_PAGE)))
                .fallback_service(ServeDir::new(root))
        }
        None => api,
    };

    app.layer(DefaultBodyLimit::max(max_upload_bytes))
        .layer(TraceLayer::new_for_http())
        // Enable CORS for local access
        .layer(CorsLayer::permissive())
}
