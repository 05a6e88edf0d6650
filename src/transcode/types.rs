//! Transcode job description and the transcoder trait

use crate::utils::{BoothError, BoothResult};
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TranscodeJob {
    /// Copy the video stream and encode `audio` alongside it, cut to the
    /// shorter of the two
    Mux {
        video: PathBuf,
        audio: PathBuf,
        output: PathBuf,
    },
    /// Composite a full-frame image over the video; audio is copied if present
    Overlay {
        video: PathBuf,
        overlay: PathBuf,
        output: PathBuf,
    },
}

impl TranscodeJob {
    pub fn output(&self) -> &Path {
        match self {
            TranscodeJob::Mux { output, .. } | TranscodeJob::Overlay { output, .. } => output,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            TranscodeJob::Mux { .. } => "mux",
            TranscodeJob::Overlay { .. } => "overlay",
        }
    }
}

pub trait Transcoder: Send + Sync {
    /// Run `job` to completion. A non-zero exit is `TranscodeFailed`.
    fn run(&self, job: &TranscodeJob) -> BoothResult<()>;
}

/// A successful run must leave a non-empty output file
pub fn verify_output(job: &TranscodeJob) -> BoothResult<()> {
    let output = job.output();
    match std::fs::metadata(output) {
        Ok(meta) if meta.len() > 0 => Ok(()),
        Ok(_) => Err(BoothError::TranscodeFailed {
            message: format!("{} produced an empty file {:?}", job.name(), output),
            preserved: None,
        }),
        Err(_) => Err(BoothError::TranscodeFailed {
            message: format!("{} produced no output at {:?}", job.name(), output),
            preserved: None,
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_verify_output_rejects_missing_and_empty() {
        let dir = tempfile::tempdir().unwrap();
        let output = dir.path().join("final_video.mp4");
        let job = TranscodeJob::Mux {
            video: dir.path().join("video.mp4"),
            audio: dir.path().join("audio.wav"),
            output: output.clone(),
        };

        assert_eq!(verify_output(&job).unwrap_err().code(), "TRANSCODE_FAILED");

        std::fs::write(&output, b"").unwrap();
        assert!(verify_output(&job).is_err());

        std::fs::write(&output, b"mp4").unwrap();
        assert!(verify_output(&job).is_ok());
    }
}
