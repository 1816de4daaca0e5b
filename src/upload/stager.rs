//! Multipart upload stager

use axum::extract::multipart::{Field, Multipart, MultipartError};
use axum::http::StatusCode;
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use tokio::io::AsyncWriteExt;

use crate::error::{ConvertError, Result};

/// Name of the multipart field that carries the audio file
pub const AUDIO_FIELD: &str = "audio_file";

/// Prefix shared by every temp file the service creates
pub const TEMP_FILE_PREFIX: &str = "audio-file-";

/// Longest extension copied from the client's filename
const MAX_EXTENSION_LEN: usize = 10;

/// An uploaded audio file materialized in the upload directory.
///
/// The file lives exactly as long as this value: [`StagedUpload::release`]
/// closes and removes it, and dropping it without releasing removes it too.
#[derive(Debug)]
pub struct StagedUpload {
    file: NamedTempFile,
    filename: String,
    size: u64,
}

impl StagedUpload {
    /// Path of the staged file
    pub fn path(&self) -> &Path {
        self.file.path()
    }

    /// Filename the client sent with the upload
    pub fn filename(&self) -> &str {
        &self.filename
    }

    /// Number of payload bytes written
    pub fn size(&self) -> u64 {
        self.size
    }

    /// Close the backing handle and remove the file
    pub fn release(self) {
        let path = self.file.path().to_path_buf();
        match self.file.close() {
            Ok(()) => tracing::debug!("removed staged upload {}", path.display()),
            Err(e) => tracing::warn!("failed to remove staged upload {}: {}", path.display(), e),
        }
    }
}

/// Stages multipart uploads into the upload directory
#[derive(Debug, Clone)]
pub struct UploadStager {
    upload_dir: PathBuf,
    max_bytes: u64,
}

impl UploadStager {
    pub fn new(upload_dir: impl Into<PathBuf>, max_bytes: u64) -> Self {
        Self {
            upload_dir: upload_dir.into(),
            max_bytes,
        }
    }

    pub fn upload_dir(&self) -> &Path {
        &self.upload_dir
    }

    pub fn max_bytes(&self) -> u64 {
        self.max_bytes
    }

    /// Find the audio field in `multipart` and copy it to a temp file.
    ///
    /// Fields with other names are skipped.
    pub async fn stage(&self, multipart: &mut Multipart) -> Result<StagedUpload> {
        loop {
            let field = multipart
                .next_field()
                .await
                .map_err(|e| self.locate_error(e))?;

            match field {
                Some(field) if field.name() == Some(AUDIO_FIELD) => {
                    return self.stage_field(field).await;
                }
                Some(field) => {
                    tracing::debug!("skipping multipart field {:?}", field.name());
                }
                None => {
                    return Err(ConvertError::UploadMissing(format!(
                        "no `{}` field in the request body",
                        AUDIO_FIELD
                    )));
                }
            }
        }
    }

    async fn stage_field(&self, mut field: Field<'_>) -> Result<StagedUpload> {
        let filename = match field.file_name() {
            Some(name) => name.to_string(),
            None => {
                return Err(ConvertError::UploadMissing(format!(
                    "`{}` is not a file upload",
                    AUDIO_FIELD
                )));
            }
        };
        let suffix = extension_suffix(&filename);

        let file = tempfile::Builder::new()
            .prefix(TEMP_FILE_PREFIX)
            .suffix(&suffix)
            .tempfile_in(&self.upload_dir)
            .map_err(ConvertError::UploadIo)?;

        let handle = file.as_file().try_clone().map_err(ConvertError::UploadIo)?;
        let mut writer = tokio::fs::File::from_std(handle);
        let mut size: u64 = 0;

        // On any early return `file` is dropped, which removes it.
        while let Some(chunk) = field.chunk().await.map_err(|e| self.copy_error(e))? {
            size += chunk.len() as u64;
            if size > self.max_bytes {
                return Err(ConvertError::PayloadTooLarge {
                    limit: self.max_bytes,
                });
            }
            writer
                .write_all(&chunk)
                .await
                .map_err(ConvertError::UploadIo)?;
        }
        writer.flush().await.map_err(ConvertError::UploadIo)?;

        tracing::info!(
            "copied the uploaded audio file {:?} to {} (total size: {} bytes)",
            filename,
            file.path().display(),
            size
        );

        Ok(StagedUpload {
            file,
            filename,
            size,
        })
    }

    /// Error while looking for the audio field
    fn locate_error(&self, err: MultipartError) -> ConvertError {
        if err.status() == StatusCode::PAYLOAD_TOO_LARGE {
            return ConvertError::PayloadTooLarge {
                limit: self.max_bytes,
            };
        }
        ConvertError::UploadMissing(err.body_text())
    }

    /// Error while reading the audio field's bytes
    fn copy_error(&self, err: MultipartError) -> ConvertError {
        if err.status() == StatusCode::PAYLOAD_TOO_LARGE {
            return ConvertError::PayloadTooLarge {
                limit: self.max_bytes,
            };
        }
        ConvertError::UploadIo(std::io::Error::other(err.body_text()))
    }
}

/// `.ext` taken from the client's filename, or empty when it has none or the
/// extension is not plain alphanumeric.
fn extension_suffix(filename: &str) -> String {
    Path::new(filename)
        .extension()
        .and_then(|ext| ext.to_str())
        .filter(|ext| {
            !ext.is_empty()
                && ext.len() <= MAX_EXTENSION_LEN
                && ext.chars().all(|c| c.is_ascii_alphanumeric())
        })
        .map(|ext| format!(".{}", ext))
        .unwrap_or_default()
}
