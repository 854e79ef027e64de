//! Virtual Soundboard (vsb-server) - Main entry point

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tokio::signal;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use vsb_common::config::TomlConfig;
use vsb_server::audio::{AudioBackend, CpalBackend, NullBackend};
use vsb_server::config::{BackendKind, Config, ConfigOverrides};
use vsb_server::ingest::FfmpegTranscoder;
use vsb_server::{api, AppContext, ServiceOptions};

/// Command-line arguments for vsb-server
#[derive(Parser, Debug)]
#[command(name = "vsb-server")]
#[command(about = "LAN soundboard: upload clips, trigger them, mix them live")]
#[command(version)]
struct Args {
    /// Port to listen on [default: 40605]
    #[arg(short, long, env = "VSB_PORT")]
    port: Option<u16>,

    /// Directory holding the sound library
    #[arg(long, env = "VSB_CLIP_DIR")]
    clip_dir: Option<PathBuf>,

    /// Bootstrap TOML configuration file
    #[arg(long, env = "VSB_CONFIG")]
    config: Option<PathBuf>,

    /// Directory with the browser UI
    #[arg(long, env = "VSB_WEB_ROOT")]
    web_root: Option<PathBuf>,

    /// Output device to open at startup
    #[arg(long, env = "VSB_OUTPUT_DEVICE")]
    output_device: Option<String>,

    /// Audio backend
    #[arg(long, value_enum, env = "VSB_AUDIO_BACKEND")]
    audio_backend: Option<BackendKind>,

    /// Transcoder program used to normalize uploads
    #[arg(long, env = "VSB_FFMPEG")]
    ffmpeg: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Parse command-line arguments
    let args = Args::parse();

    // Config file is read before tracing starts so its log level applies
    let toml_config = TomlConfig::load(args.config.as_deref()).context("Failed to load configuration file")?;

    let config = Config::from_sources(
        ConfigOverrides {
            port: args.port,
            clip_dir: args.clip_dir,
            web_root: args.web_root,
            output_device: args.output_device,
            audio_backend: args.audio_backend,
            ffmpeg: args.ffmpeg,
        },
        &toml_config,
    )
    .context("Invalid configuration")?;

    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| config.log_filter.as_str().into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting vsb-server v{} ({})", env!("CARGO_PKG_VERSION"), env!("GIT_HASH"));
    info!("Clip directory: {}", config.clip_dir.display());

    let backend: Arc<dyn AudioBackend> = match config.audio_backend {
        BackendKind::Cpal => Arc::new(CpalBackend::new()),
        BackendKind::Null => Arc::new(NullBackend::default()),
    };

    let transcoder = FfmpegTranscoder::new(&config.ffmpeg);
    if !transcoder.is_available() {
        warn!(
            "Transcoder '{}' could not be started; uploads will fail until it is installed",
            config.ffmpeg.display()
        );
    }

    let ctx = AppContext::start(
        ServiceOptions {
            clip_dir: config.clip_dir.clone(),
            output_device: config.output_device.clone(),
            device_busy_timeout: config.device_busy_timeout,
            playback_grace: config.playback_grace,
        },
        backend,
        Arc::new(transcoder),
    )
    .await
    .context("Failed to initialize soundboard")?;

    let app = api::create_router(ctx.clone(), config.web_root.as_deref(), config.max_upload_bytes);

    // Create socket address
    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));

    info!("Starting HTTP server on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind to {}", addr))?;

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    ctx.shutdown().await;
    info!("Server shutdown complete");
    Ok(())
}

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, shutting down");
        },
        _ = terminate => {
            info!("Received terminate signal, shutting down");
        },
    }
}
