//! Upload staging
//!
//! Copies the audio payload of a multipart request into a uniquely named
//! file in the upload directory:
//! - Enforces the upload size ceiling while copying
//! - Keeps the original file extension so ffmpeg can pick a demuxer
//! - Removes the file when the staged upload is released or dropped

pub mod stager;

pub use stager::{StagedUpload, UploadStager, AUDIO_FIELD};
