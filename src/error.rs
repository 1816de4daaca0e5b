use std::fmt;

use thiserror::Error;

/// Errors raised while serving a single conversion request.
///
/// Every variant is terminal for the request. The HTTP layer collapses them
/// into one client-facing status, so the variant is what logs and tests use
/// to tell failures apart.
#[derive(Error, Debug)]
pub enum ConvertError {
    #[error("{0} is not a supported audio format")]
    UnsupportedFormat(String),

    #[error("error retrieving the audio file from the request. reason: {0}")]
    UploadMissing(String),

    #[error("the uploaded audio file exceeds the limit of {limit} bytes")]
    PayloadTooLarge { limit: u64 },

    #[error("could not buffer the uploaded audio file. reason: {0}")]
    UploadIo(#[source] std::io::Error),

    #[error("could not convert the uploaded audio file. reason: {0}")]
    TranscodeFailure(String),

    #[error("could not read the converted audio file. reason: {0}")]
    OutputReadFailure(String),
}

/// Discriminant of [`ConvertError`], kept for logging and tests.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    UnsupportedFormat,
    UploadMissing,
    PayloadTooLarge,
    UploadIo,
    TranscodeFailure,
    OutputReadFailure,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::UnsupportedFormat => "unsupported_format",
            ErrorKind::UploadMissing => "upload_missing",
            ErrorKind::PayloadTooLarge => "payload_too_large",
            ErrorKind::UploadIo => "upload_io",
            ErrorKind::TranscodeFailure => "transcode_failure",
            ErrorKind::OutputReadFailure => "output_read_failure",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl ConvertError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            ConvertError::UnsupportedFormat(_) => ErrorKind::UnsupportedFormat,
            ConvertError::UploadMissing(_) => ErrorKind::UploadMissing,
            ConvertError::PayloadTooLarge { .. } => ErrorKind::PayloadTooLarge,
            ConvertError::UploadIo(_) => ErrorKind::UploadIo,
            ConvertError::TranscodeFailure(_) => ErrorKind::TranscodeFailure,
            ConvertError::OutputReadFailure(_) => ErrorKind::OutputReadFailure,
        }
    }
}

/// Errors that abort server startup
#[derive(Error, Debug)]
pub enum ServerError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Transcoding engine not found: {0}")]
    EngineNotFound(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type alias for the request pipeline
pub type Result<T> = std::result::Result<T, ConvertError>;
