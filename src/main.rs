//! Audio Conversion Server
//!
//! An HTTP service that accepts an uploaded audio file, converts it to AAC,
//! FLAC or MP3 with ffmpeg and returns the converted file as a download.

mod config;
mod config_file;
mod error;
mod format;
mod http;
mod state;
mod transcode;
mod upload;

use std::net::SocketAddr;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::config::{LogFormat, ServerConfig};
use crate::error::ServerError;
use crate::format::AudioFormat;
use crate::http::create_router;
use crate::state::AppState;
use crate::transcode::FfmpegEngine;

/// Application version
const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Application name
const APP_NAME: &str = "audio-convert-server";

#[tokio::main]
async fn main() -> Result<(), ServerError> {
    // Load configuration
    let config_path = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "config.toml".to_string());
    let loaded = config_file::load(&config_path);
    let config = match &loaded {
        Ok(Some(config)) => config.clone(),
        _ => ServerConfig::default(),
    };

    // Initialize logging
    init_logging(&config);

    tracing::info!("{} v{} starting", APP_NAME, VERSION);
    if let Err(e) = &loaded {
        tracing::warn!(
            "Failed to load config file {}: {}. Using defaults.",
            config_path,
            e
        );
    }
    tracing::info!("Configuration loaded: {:?}", config);

    // Locate ffmpeg
    let engine = FfmpegEngine::discover(&config.engine)?;
    tracing::info!("Using ffmpeg at {}", engine.program().display());

    prepare_staging_dirs(&config).await?;

    // Create application state
    let state = Arc::new(AppState::new(config.clone(), engine));
    tracing::info!(
        "Staging uploads in {} (limit {} bytes), conversions in {}",
        state.stager.upload_dir().display(),
        state.stager.max_bytes(),
        state.transcoder.convert_dir().display()
    );
    tracing::info!(
        "Supported formats: {}",
        AudioFormat::ALL.map(|f| f.as_str()).join(", ")
    );

    // Build router
    let app = create_router(state);

    // Start server
    let addr: SocketAddr = config
        .socket_addr()
        .parse()
        .map_err(|e| ServerError::Config(format!("invalid listen address: {}", e)))?;
    tracing::info!("Starting HTTP server on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

/// Create the staging directories if they are missing
async fn prepare_staging_dirs(config: &ServerConfig) -> Result<(), ServerError> {
    for dir in [&config.storage.upload_dir, &config.storage.convert_dir] {
        tokio::fs::create_dir_all(dir).await.map_err(|e| {
            ServerError::Config(format!(
                "cannot create staging directory {}: {}",
                dir.display(),
                e
            ))
        })?;
    }
    Ok(())
}

/// Initialize logging with tracing
fn init_logging(config: &ServerConfig) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        format!(
            "audio_convert_server={level},ffmpeg={level},tower_http={level}",
            level = config.log_level
        )
        .into()
    });

    let registry = tracing_subscriber::registry().with(filter);
    match config.log_format {
        LogFormat::Json => registry.with(tracing_subscriber::fmt::layer().json()).init(),
        LogFormat::Pretty => registry.with(tracing_subscriber::fmt::layer()).init(),
    }
}
