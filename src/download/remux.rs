//! Stream-copy remux through an external `ffmpeg`.
//!
//! Audio is never re-encoded. Container metadata is stripped (tags are
//! written later by whoever owns them) and MP4-family outputs get the
//! fast-start layout.

use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::process::Stdio;

use thiserror::Error;
use tokio::process::Command;
use tracing::{debug, instrument};

use crate::codec::ContainerKind;

/// Why the remux step could not produce its output.
///
/// The assembler reports this alongside the unremuxed file; it is never a
/// hard failure.
#[derive(Debug, Error)]
pub enum RemuxError {
    /// The tool could not be started at all.
    #[error(
        "remux tool '{}' could not be started: {source}\n  Suggestion: install ffmpeg or set `ffmpeg_path` in the config file",
        program.display()
    )]
    ToolUnavailable {
        program: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The tool ran and reported failure.
    #[error("remux tool exited with {status}: {stderr}")]
    ToolFailed {
        /// Exit status as reported by the OS.
        status: String,
        /// Last lines of the tool's error output.
        stderr: String,
    },
}

/// Runs `ffmpeg` to change container without re-encoding.
#[derive(Debug, Clone)]
pub struct Remuxer {
    program: PathBuf,
}

impl Remuxer {
    #[must_use]
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
        }
    }

    /// Finds `ffmpeg` the usual way; see [`locate_ffmpeg`].
    #[must_use]
    pub fn locate(configured: Option<&Path>) -> Self {
        Self::new(locate_ffmpeg(configured))
    }

    #[must_use]
    pub fn program(&self) -> &Path {
        &self.program
    }

    /// Remuxes `input` into `output`. A partial output is removed on failure.
    #[instrument(skip(self), fields(program = %self.program.display()))]
    pub async fn remux(
        &self,
        input: &Path,
        output: &Path,
        container: ContainerKind,
    ) -> Result<(), RemuxError> {
        let args = build_remux_args(input, output, container);
        debug!(?args, "running remux");

        let result = Command::new(&self.program)
            .args(&args)
            .env("LC_ALL", "C")
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|source| RemuxError::ToolUnavailable {
                program: self.program.clone(),
                source,
            })?;

        if result.status.success() {
            return Ok(());
        }

        let _ = tokio::fs::remove_file(output).await;
        let stderr = String::from_utf8_lossy(&result.stderr);
        let tail: Vec<&str> = stderr.lines().rev().take(5).collect();
        Err(RemuxError::ToolFailed {
            status: result.status.to_string(),
            stderr: tail.into_iter().rev().collect::<Vec<_>>().join("\n"),
        })
    }
}

/// Builds the `ffmpeg` argument list for a stream-copy remux.
#[must_use]
pub fn build_remux_args(input: &Path, output: &Path, container: ContainerKind) -> Vec<OsString> {
    let mut args: Vec<OsString> = ["-hide_banner", "-y", "-loglevel", "error", "-i"]
        .into_iter()
        .map(OsString::from)
        .collect();
    args.push(input.as_os_str().to_owned());
    args.extend(["-map_metadata", "-1", "-c:a", "copy"].map(OsString::from));
    if container.is_mp4_family() {
        args.extend(["-movflags", "+faststart"].map(OsString::from));
    }
    args.push(output.as_os_str().to_owned());
    args
}

/// Locates `ffmpeg`.
///
/// Order: current directory, directory of the running executable, the
/// configured path, then whatever `ffmpeg` resolves to on `PATH`.
#[must_use]
pub fn locate_ffmpeg(configured: Option<&Path>) -> PathBuf {
    let name = format!("ffmpeg{}", std::env::consts::EXE_SUFFIX);

    let local = std::env::current_dir().ok().map(|dir| dir.join(&name));
    let beside_exe = std::env::current_exe()
        .ok()
        .and_then(|exe| exe.parent().map(|dir| dir.join(&name)));
    let configured = configured.map(Path::to_path_buf);

    [local, beside_exe, configured]
        .into_iter()
        .flatten()
        .find(|candidate| candidate.is_file())
        .unwrap_or_else(|| PathBuf::from(name))
}
