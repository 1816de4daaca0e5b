//! Server configuration

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Staging directory configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Directory that receives uploaded files while they are converted
    pub upload_dir: PathBuf,

    /// Directory that receives ffmpeg output files
    pub convert_dir: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            upload_dir: PathBuf::from("data/upload-tmp"),
            convert_dir: PathBuf::from("data/convert-tmp"),
        }
    }
}

/// Request and transcoding limits
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LimitsConfig {
    /// Maximum size of the uploaded audio payload in bytes
    pub max_upload_bytes: u64,

    /// Maximum number of ffmpeg processes running at once
    pub max_concurrent_transcodes: usize,

    /// Time allowed for a single ffmpeg run in seconds
    pub transcode_timeout_secs: u64,
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            max_upload_bytes: 10 << 20, // 10 MiB
            max_concurrent_transcodes: 4,
            transcode_timeout_secs: 300,
        }
    }
}

/// Extra bytes the HTTP body may carry beyond the payload for multipart
/// boundaries, part headers and small form fields.
pub const MULTIPART_OVERHEAD_BYTES: u64 = 64 * 1024;

impl LimitsConfig {
    /// Deadline for one ffmpeg run, never shorter than a second
    pub fn transcode_timeout(&self) -> Duration {
        Duration::from_secs(self.transcode_timeout_secs.max(1))
    }

    /// Limit applied to the whole request body
    pub fn max_body_bytes(&self) -> usize {
        let bytes = self.max_upload_bytes.saturating_add(MULTIPART_OVERHEAD_BYTES);
        usize::try_from(bytes).unwrap_or(usize::MAX)
    }
}

/// Transcoding engine configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Explicit ffmpeg binary; looked up in PATH when unset
    pub ffmpeg_path: Option<PathBuf>,

    /// ffmpeg `-loglevel` (quiet, error, warning, info, verbose, debug)
    pub log_level: Option<String>,
}

impl EngineConfig {
    pub fn ffmpeg_log_level(&self) -> &str {
        self.log_level.as_deref().unwrap_or("warning")
    }
}

/// Log output format
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

/// Server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Host address to bind to
    pub host: String,

    /// Port to listen on
    pub port: u16,

    /// Staging directories
    pub storage: StorageConfig,

    /// Upload and transcoding limits
    pub limits: LimitsConfig,

    /// ffmpeg settings
    pub engine: EngineConfig,

    /// Log level (trace, debug, info, warn, error)
    pub log_level: String,

    /// Log output format
    pub log_format: LogFormat,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
            storage: StorageConfig::default(),
            limits: LimitsConfig::default(),
            engine: EngineConfig::default(),
            log_level: "info".to_string(),
            log_format: LogFormat::Pretty,
        }
    }
}

impl ServerConfig {
    /// Get the socket address string
    pub fn socket_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}
