//! Audio transcoding module
//!
//! This module converts staged uploads with the ffmpeg CLI:
//! - ffmpeg discovery and command line construction
//! - Forwarding of ffmpeg diagnostics to the service log
//! - Bounded concurrency and a per-run timeout
//! - Output temp file lifecycle and in-memory buffering of the result

pub mod engine;
pub mod invoker;

pub use engine::FfmpegEngine;
pub use invoker::{ConversionResult, Transcoder};
