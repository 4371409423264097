//! Thin wrappers around the `ffmpeg` and `ffprobe` binaries.

use async_trait::async_trait;
use crossposter_core::{AssemblyError, VideoConfig};
use std::io;
use std::path::{Path, PathBuf};
use std::process::Output;
use tokio::process::Command as TokioCommand;
use tracing::{debug, error};

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait EncoderRunner: Send + Sync {
    async fn run_ffmpeg(&self, args: Vec<String>) -> io::Result<Output>;
    async fn run_ffprobe_for_duration(&self, media_path: &Path) -> io::Result<Output>;
}

pub struct RealEncoderRunner {
    ffmpeg: PathBuf,
    ffprobe: PathBuf,
}

impl RealEncoderRunner {
    /// Resolves both binaries on `PATH` (or as given paths) up front so a
    /// missing install fails before any work is done.
    pub fn locate(config: &VideoConfig) -> Result<Self, AssemblyError> {
        let ffmpeg = which::which(&config.ffmpeg_bin).map_err(|_| AssemblyError::EncoderNotFound {
            binary: config.ffmpeg_bin.clone(),
        })?;
        let ffprobe =
            which::which(&config.ffprobe_bin).map_err(|_| AssemblyError::EncoderNotFound {
                binary: config.ffprobe_bin.clone(),
            })?;
        debug!("Using {} and {}", ffmpeg.display(), ffprobe.display());
        Ok(Self { ffmpeg, ffprobe })
    }
}

#[async_trait]
impl EncoderRunner for RealEncoderRunner {
    async fn run_ffmpeg(&self, args: Vec<String>) -> io::Result<Output> {
        TokioCommand::new(&self.ffmpeg)
            .arg("-hide_banner")
            .arg("-loglevel")
            .arg("error")
            .args(&args)
            .output()
            .await
    }

    async fn run_ffprobe_for_duration(&self, media_path: &Path) -> io::Result<Output> {
        TokioCommand::new(&self.ffprobe)
            .arg("-v")
            .arg("error")
            .arg("-show_entries")
            .arg("format=duration")
            .arg("-of")
            .arg("default=noprint_wrappers=1:nokey=1")
            .arg(media_path)
            .output()
            .await
    }
}

/// Runs ffmpeg and turns a non-zero exit into `AssemblyError::EncoderFailed`
/// carrying the captured stderr.
pub async fn run_ffmpeg_checked(
    runner: &dyn EncoderRunner,
    args: Vec<String>,
) -> Result<Output, AssemblyError> {
    debug!("ffmpeg {}", args.join(" "));
    let output = runner.run_ffmpeg(args).await.map_err(|e| spawn_error("ffmpeg", e))?;
    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
        error!("ffmpeg failed: {}", stderr);
        return Err(AssemblyError::EncoderFailed {
            binary: "ffmpeg".to_string(),
            status: output.status.code().unwrap_or(-1),
            stderr,
        });
    }
    Ok(output)
}

/// Duration of a media file in seconds as reported by ffprobe.
pub async fn probe_duration(
    runner: &dyn EncoderRunner,
    media_path: &Path,
) -> Result<f64, AssemblyError> {
    let output = runner
        .run_ffprobe_for_duration(media_path)
        .await
        .map_err(|e| spawn_error("ffprobe", e))?;

    if !output.status.success() {
        return Err(AssemblyError::ProbeFailed {
            path: media_path.display().to_string(),
            details: String::from_utf8_lossy(&output.stderr).trim().to_string(),
        });
    }

    let stdout = String::from_utf8_lossy(&output.stdout);
    stdout
        .trim()
        .parse::<f64>()
        .ok()
        .filter(|d| d.is_finite() && *d >= 0.0)
        .ok_or_else(|| AssemblyError::ProbeFailed {
            path: media_path.display().to_string(),
            details: format!("unparsable duration '{}'", stdout.trim()),
        })
}

fn spawn_error(binary: &str, e: io::Error) -> AssemblyError {
    if e.kind() == io::ErrorKind::NotFound {
        AssemblyError::EncoderNotFound {
            binary: binary.to_string(),
        }
    } else {
        AssemblyError::EncoderFailed {
            binary: binary.to_string(),
            status: -1,
            stderr: e.to_string(),
        }
    }
}

/// Formats seconds the way ffmpeg expects for `-t` and `-ss`.
pub fn seconds_arg(seconds: f64) -> String {
    format!("{:.3}", seconds.max(0.0))
}
