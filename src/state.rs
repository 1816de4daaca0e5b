//! Application state management
//!
//! This module defines the AppState structure that holds:
//! - Server configuration
//! - The upload stager (upload directory and size ceiling)
//! - The transcoder (ffmpeg, conversion directory and concurrency limit)

use crate::config::ServerConfig;
use crate::transcode::{FfmpegEngine, Transcoder};
use crate::upload::UploadStager;

/// Application state shared across all handlers
pub struct AppState {
    /// Server configuration
    pub config: ServerConfig,

    /// Stages uploads into the upload directory
    pub stager: UploadStager,

    /// Runs ffmpeg against staged uploads
    pub transcoder: Transcoder,
}

impl AppState {
    /// Create a new AppState with the given configuration and engine
    pub fn new(config: ServerConfig, engine: FfmpegEngine) -> Self {
        let stager = UploadStager::new(
            config.storage.upload_dir.clone(),
            config.limits.max_upload_bytes,
        );
        let transcoder = Transcoder::new(engine, config.storage.convert_dir.clone(), &config.limits);

        Self {
            config,
            stager,
            transcoder,
        }
    }
}
