//! Bounded, time-limited conversion of staged uploads

use bytes::Bytes;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::io::AsyncReadExt;
use tokio::sync::Semaphore;

use crate::config::LimitsConfig;
use crate::error::{ConvertError, Result};
use crate::format::{directives_for, AudioFormat};
use crate::upload::stager::TEMP_FILE_PREFIX;
use crate::upload::StagedUpload;

use super::engine::FfmpegEngine;

/// Converted audio, fully buffered
#[derive(Debug, Clone)]
pub struct ConversionResult {
    pub bytes: Bytes,
    pub format: AudioFormat,
}

/// Runs the engine with at most `max_concurrent_transcodes` processes alive
/// and a deadline per run.
#[derive(Debug, Clone)]
pub struct Transcoder {
    engine: FfmpegEngine,
    convert_dir: PathBuf,
    permits: Arc<Semaphore>,
    timeout: Duration,
}

impl Transcoder {
    pub fn new(engine: FfmpegEngine, convert_dir: impl Into<PathBuf>, limits: &LimitsConfig) -> Self {
        Self {
            engine,
            convert_dir: convert_dir.into(),
            permits: Arc::new(Semaphore::new(limits.max_concurrent_transcodes.max(1))),
            timeout: limits.transcode_timeout(),
        }
    }

    pub fn convert_dir(&self) -> &Path {
        &self.convert_dir
    }

    /// Convert a staged upload to `format`
    pub async fn convert(&self, upload: &StagedUpload, format: AudioFormat) -> Result<ConversionResult> {
        self.convert_file(upload.path(), format).await
    }

    /// Convert the file at `input` to `format`.
    ///
    /// The output temp file is removed before this returns, whatever the
    /// outcome.
    pub async fn convert_file(&self, input: &Path, format: AudioFormat) -> Result<ConversionResult> {
        let directives = directives_for(format);

        let permit = self
            .permits
            .acquire()
            .await
            .map_err(|_| ConvertError::TranscodeFailure("transcoder is shut down".to_string()))?;

        let output = tempfile::Builder::new()
            .prefix(TEMP_FILE_PREFIX)
            .suffix(&format!(".{}", directives.extension))
            .tempfile_in(&self.convert_dir)
            .map_err(|e| {
                ConvertError::TranscodeFailure(format!("could not create the output file: {}", e))
            })?
            .into_temp_path();

        tracing::debug!(
            "transcoding {} to {} ({} / {})",
            input.display(),
            output.display(),
            directives.codec,
            directives.container
        );

        let started = Instant::now();
        match tokio::time::timeout(self.timeout, self.engine.run(input, &output, &directives)).await {
            Ok(result) => result?,
            Err(_) => {
                return Err(ConvertError::TranscodeFailure(format!(
                    "ffmpeg did not finish within {:?}",
                    self.timeout
                )));
            }
        }
        drop(permit);

        let bytes = read_output(&output).await?;
        tracing::info!(
            "transcoded {} to {} ({} bytes) in {:?}",
            input.display(),
            format,
            bytes.len(),
            started.elapsed()
        );

        let output_path = output.to_path_buf();
        if let Err(e) = output.close() {
            tracing::warn!(
                "failed to remove conversion output {}: {}",
                output_path.display(),
                e
            );
        }

        Ok(ConversionResult { bytes, format })
    }
}

/// Read the whole output file, checking the byte count against its size
async fn read_output(path: &Path) -> Result<Bytes> {
    let metadata = tokio::fs::metadata(path).await.map_err(|e| {
        ConvertError::OutputReadFailure(format!("stat {}: {}", path.display(), e))
    })?;
    let expected = metadata.len();
    if expected == 0 {
        return Err(ConvertError::OutputReadFailure(
            "ffmpeg produced an empty file".to_string(),
        ));
    }

    let mut file = tokio::fs::File::open(path).await.map_err(|e| {
        ConvertError::OutputReadFailure(format!("open {}: {}", path.display(), e))
    })?;
    let mut buffer = Vec::with_capacity(expected as usize);
    file.read_to_end(&mut buffer).await.map_err(|e| {
        ConvertError::OutputReadFailure(format!("read {}: {}", path.display(), e))
    })?;

    if buffer.len() as u64 != expected {
        return Err(ConvertError::OutputReadFailure(format!(
            "read {} bytes but the file is {} bytes",
            buffer.len(),
            expected
        )));
    }

    Ok(Bytes::from(buffer))
}
