//! FFmpeg transcoder

use super::types::{TranscodeJob, Transcoder};
use crate::utils::{BoothError, BoothResult};
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

pub struct FfmpegTranscoder {
    binary: PathBuf,
}

impl FfmpegTranscoder {
    pub fn new(binary: impl Into<PathBuf>) -> Self {
        Self {
            binary: binary.into(),
        }
    }

    /// Check that the binary runs at all
    pub fn is_available(&self) -> bool {
        Command::new(&self.binary)
            .arg("-version")
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .map(|s| s.success())
            .unwrap_or(false)
    }
}

impl Default for FfmpegTranscoder {
    fn default() -> Self {
        Self::new("ffmpeg")
    }
}

fn path_arg(path: &Path) -> String {
    path.to_string_lossy().to_string()
}

pub(crate) fn build_args(job: &TranscodeJob) -> Vec<String> {
    let mut args = vec!["-y".to_string(), "-loglevel".to_string(), "error".to_string()];
    match job {
        TranscodeJob::Mux {
            video,
            audio,
            output,
        } => {
            args.extend([
                "-i".to_string(),
                path_arg(video),
                "-i".to_string(),
                path_arg(audio),
                "-c:v".to_string(),
                "copy".to_string(),
                "-c:a".to_string(),
                "aac".to_string(),
                "-shortest".to_string(),
                path_arg(output),
            ]);
        }
        TranscodeJob::Overlay {
            video,
            overlay,
            output,
        } => {
            args.extend([
                "-i".to_string(),
                path_arg(video),
                "-i".to_string(),
                path_arg(overlay),
                "-filter_complex".to_string(),
                "[0:v][1:v]overlay=0:0[outv]".to_string(),
                "-map".to_string(),
                "[outv]".to_string(),
                // Optional mapping: silent recordings have no audio stream
                "-map".to_string(),
                "0:a?".to_string(),
                "-c:v".to_string(),
                "libx264".to_string(),
                "-pix_fmt".to_string(),
                "yuv420p".to_string(),
                "-c:a".to_string(),
                "copy".to_string(),
                path_arg(output),
            ]);
        }
    }
    args
}

impl Transcoder for FfmpegTranscoder {
    fn run(&self, job: &TranscodeJob) -> BoothResult<()> {
        let args = build_args(job);
        tracing::info!("Running FFmpeg {}: {:?}", job.name(), args);

        let output = Command::new(&self.binary)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .output()
            .map_err(|e| BoothError::TranscodeFailed {
                message: format!("Failed to start FFmpeg: {}", e),
                preserved: None,
            })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            tracing::error!("FFmpeg {} failed: {}", job.name(), stderr);
            return Err(BoothError::TranscodeFailed {
                message: format!(
                    "FFmpeg {} exited with {}: {}",
                    job.name(),
                    output.status,
                    stderr.lines().last().unwrap_or("")
                ),
                preserved: None,
            });
        }
        Ok(())
    }
}
