//! Configuration file support
//!
//! Loads server configuration from TOML files. Every section is optional and
//! missing values fall back to [`ServerConfig::default`].

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::config::{LogFormat, ServerConfig};
use crate::error::ServerError;

/// Configuration file format
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ConfigFile {
    /// Server settings
    pub server: Option<ServerSettings>,
    /// Staging directory settings
    pub storage: Option<StorageSettings>,
    /// Limits settings
    pub limits: Option<LimitsSettings>,
    /// ffmpeg settings
    pub engine: Option<EngineSettings>,
    /// Logging settings
    pub logging: Option<LoggingSettings>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerSettings {
    /// Host address to bind to
    pub host: Option<String>,
    /// Port to listen on
    pub port: Option<u16>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageSettings {
    pub upload_dir: Option<PathBuf>,
    pub convert_dir: Option<PathBuf>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LimitsSettings {
    /// Maximum upload size in MB
    pub max_upload_mb: Option<u64>,
    pub max_concurrent_transcodes: Option<usize>,
    pub transcode_timeout_secs: Option<u64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineSettings {
    pub ffmpeg_path: Option<PathBuf>,
    pub log_level: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingSettings {
    /// Log level (trace, debug, info, warn, error)
    pub level: Option<String>,
    /// Output format (json, pretty)
    pub format: Option<LogFormat>,
}

impl ConfigFile {
    /// Load configuration from a TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ServerError> {
        let content = std::fs::read_to_string(path.as_ref())?;
        Self::from_toml(&content)
    }

    pub fn from_toml(content: &str) -> Result<Self, ServerError> {
        toml::from_str(content).map_err(|e| ServerError::Config(e.to_string()))
    }

    /// Convert to ServerConfig
    pub fn into_server_config(self) -> ServerConfig {
        let mut config = ServerConfig::default();

        if let Some(server) = self.server {
            if let Some(host) = server.host {
                config.host = host;
            }
            if let Some(port) = server.port {
                config.port = port;
            }
        }

        if let Some(storage) = self.storage {
            if let Some(dir) = storage.upload_dir {
                config.storage.upload_dir = dir;
            }
            if let Some(dir) = storage.convert_dir {
                config.storage.convert_dir = dir;
            }
        }

        if let Some(limits) = self.limits {
            if let Some(mb) = limits.max_upload_mb {
                config.limits.max_upload_bytes = mb.saturating_mul(1024 * 1024);
            }
            if let Some(n) = limits.max_concurrent_transcodes {
                config.limits.max_concurrent_transcodes = n.max(1);
            }
            if let Some(secs) = limits.transcode_timeout_secs {
                config.limits.transcode_timeout_secs = secs.max(1);
            }
        }

        if let Some(engine) = self.engine {
            config.engine.ffmpeg_path = engine.ffmpeg_path;
            config.engine.log_level = engine.log_level;
        }

        if let Some(logging) = self.logging {
            if let Some(level) = logging.level {
                config.log_level = level;
            }
            if let Some(format) = logging.format {
                config.log_format = format;
            }
        }

        config
    }
}

/// Load the server configuration from `path`.
///
/// Returns `Ok(None)` when the file does not exist.
pub fn load<P: AsRef<Path>>(path: P) -> Result<Option<ServerConfig>, ServerError> {
    let path = path.as_ref();
    if !path.exists() {
        return Ok(None);
    }
    ConfigFile::from_file(path).map(|cf| Some(cf.into_server_config()))
}
