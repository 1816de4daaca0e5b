//! ffmpeg subprocess wrapper
//!
//! Runs the ffmpeg CLI against an input and output path. Its diagnostics are
//! forwarded to `tracing` under the `ffmpeg` target instead of the client.

use std::collections::VecDeque;
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::Command;

use crate::config::EngineConfig;
use crate::error::{ConvertError, Result, ServerError};
use crate::format::TranscodeDirectives;

/// Number of diagnostic lines logged when ffmpeg fails
const DIAGNOSTIC_TAIL_LINES: usize = 4;

/// Handle to the ffmpeg binary
#[derive(Debug, Clone)]
pub struct FfmpegEngine {
    program: PathBuf,
    log_level: String,
}

impl FfmpegEngine {
    pub fn new(program: impl Into<PathBuf>, log_level: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            log_level: log_level.into(),
        }
    }

    /// Resolve the ffmpeg binary from the configuration or `PATH`.
    ///
    /// A configured path that does not exist falls back to a `PATH` lookup.
    pub fn discover(config: &EngineConfig) -> std::result::Result<Self, ServerError> {
        let program = match &config.ffmpeg_path {
            Some(path) if path.exists() => path.clone(),
            other => {
                if let Some(path) = other {
                    tracing::warn!(
                        "configured ffmpeg {} does not exist, searching PATH",
                        path.display()
                    );
                }
                which::which("ffmpeg").map_err(|e| {
                    ServerError::EngineNotFound(format!(
                        "ffmpeg not found; is it installed and in PATH? ({})",
                        e
                    ))
                })?
            }
        };

        Ok(Self::new(program, config.ffmpeg_log_level()))
    }

    pub fn program(&self) -> &Path {
        &self.program
    }

    /// Command line for converting `input` into `output`
    pub fn args(
        &self,
        input: &Path,
        output: &Path,
        directives: &TranscodeDirectives,
    ) -> Vec<OsString> {
        let mut args: Vec<OsString> = [
            "-hide_banner",
            "-nostdin",
            "-nostats",
            "-loglevel",
        ]
        .iter()
        .map(OsString::from)
        .collect();
        args.push(format!("level+{}", self.log_level).into());
        args.push("-y".into());
        args.push("-i".into());
        args.push(input.as_os_str().to_owned());
        // Audio only; cover art in the source would otherwise become a video stream.
        args.push("-vn".into());
        args.push("-c:a".into());
        args.push(directives.codec.into());
        args.push("-f".into());
        args.push(directives.container.into());
        args.push(output.as_os_str().to_owned());
        args
    }

    /// Run ffmpeg to completion.
    ///
    /// The child is killed if the returned future is dropped, so callers can
    /// bound it with a timeout.
    pub async fn run(
        &self,
        input: &Path,
        output: &Path,
        directives: &TranscodeDirectives,
    ) -> Result<()> {
        let name = self.program_name();

        let mut child = Command::new(&self.program)
            .args(self.args(input, output, directives))
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| ConvertError::TranscodeFailure(format!("failed to spawn {}: {}", name, e)))?;

        let mut tail = VecDeque::with_capacity(DIAGNOSTIC_TAIL_LINES);
        if let Some(stderr) = child.stderr.take() {
            let mut reader = BufReader::new(stderr);
            let mut buf = Vec::new();
            loop {
                buf.clear();
                let n = reader.read_until(b'\n', &mut buf).await.map_err(|e| {
                    ConvertError::TranscodeFailure(format!("reading {} output: {}", name, e))
                })?;
                if n == 0 {
                    break;
                }
                let line = String::from_utf8_lossy(&buf).trim_end().to_string();
                if line.is_empty() {
                    continue;
                }
                log_diagnostic(&line);
                if tail.len() == DIAGNOSTIC_TAIL_LINES {
                    tail.pop_front();
                }
                tail.push_back(line);
            }
        }

        let status = child.wait().await.map_err(|e| {
            ConvertError::TranscodeFailure(format!("waiting for {}: {}", name, e))
        })?;

        if !status.success() {
            // Diagnostics go to the log only.
            let diagnostics = tail.into_iter().collect::<Vec<_>>().join("; ");
            tracing::error!(target: "ffmpeg", "{} exited with {}: {}", name, status, diagnostics);
            return Err(ConvertError::TranscodeFailure(format!(
                "{} exited with {}",
                name, status
            )));
        }

        Ok(())
    }

    fn program_name(&self) -> String {
        self.program
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| self.program.to_string_lossy().to_string())
    }
}

/// Forward one line of ffmpeg output at the level ffmpeg tagged it with
fn log_diagnostic(line: &str) {
    if line.contains("[fatal]") || line.contains("[panic]") || line.contains("[error]") {
        tracing::error!(target: "ffmpeg", "{}", line);
    } else if line.contains("[warning]") {
        tracing::warn!(target: "ffmpeg", "{}", line);
    } else if line.contains("[info]") {
        tracing::debug!(target: "ffmpeg", "{}", line);
    } else {
        tracing::trace!(target: "ffmpeg", "{}", line);
    }
}
