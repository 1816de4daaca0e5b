//! Target audio formats
//!
//! The allow-list of formats clients may request and the ffmpeg codec and
//! muxer used to produce each of them.

use std::fmt;
use std::str::FromStr;

use crate::error::ConvertError;

/// Formats the service can convert to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AudioFormat {
    Aac,
    Flac,
    Mp3,
}

/// Codec and container parameters handed to the transcoding engine
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TranscodeDirectives {
    /// ffmpeg audio encoder (`-c:a`)
    pub codec: &'static str,
    /// ffmpeg output muxer (`-f`)
    pub container: &'static str,
    /// Extension used for temp files and the download name
    pub extension: &'static str,
}

impl AudioFormat {
    pub const ALL: [AudioFormat; 3] = [AudioFormat::Aac, AudioFormat::Flac, AudioFormat::Mp3];

    pub fn as_str(&self) -> &'static str {
        match self {
            AudioFormat::Aac => "aac",
            AudioFormat::Flac => "flac",
            AudioFormat::Mp3 => "mp3",
        }
    }

    /// Value of the `Content-Type` header for converted files
    pub fn mime_type(&self) -> &'static str {
        match self {
            AudioFormat::Aac => "audio/aac",
            AudioFormat::Flac => "audio/flac",
            AudioFormat::Mp3 => "audio/mp3",
        }
    }
}

impl fmt::Display for AudioFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AudioFormat {
    type Err = ConvertError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "aac" => Ok(AudioFormat::Aac),
            "flac" => Ok(AudioFormat::Flac),
            "mp3" => Ok(AudioFormat::Mp3),
            _ => Err(ConvertError::UnsupportedFormat(s.to_string())),
        }
    }
}

/// Case-insensitive membership test against the allow-list
#[allow(dead_code)]
pub fn is_supported(format: &str) -> bool {
    AudioFormat::ALL
        .iter()
        .any(|f| f.as_str().eq_ignore_ascii_case(format))
}

/// Engine parameters for a supported format
pub fn directives_for(format: AudioFormat) -> TranscodeDirectives {
    match format {
        // Raw AAC goes in an ADTS stream; ffmpeg has no muxer named "aac".
        AudioFormat::Aac => TranscodeDirectives {
            codec: "aac",
            container: "adts",
            extension: "aac",
        },
        AudioFormat::Flac => TranscodeDirectives {
            codec: "flac",
            container: "flac",
            extension: "flac",
        },
        AudioFormat::Mp3 => TranscodeDirectives {
            codec: "libmp3lame",
            container: "mp3",
            extension: "mp3",
        },
    }
}
