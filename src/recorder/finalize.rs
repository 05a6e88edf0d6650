//! Post-processing of a finished recording
//!
//! Each transcoder step writes `final_<name>` and, once verified, replaces
//! the video atomically. The audio file and every intermediate are removed
//! on both success and failure. A failed step leaves the video as it was
//! before that step and reports it as preserved.

use super::state::RecordingOutput;
use crate::compose::{write_overlay_png, Overlay};
use crate::transcode::{verify_output, TranscodeJob, Transcoder};
use crate::utils::fs::{replace_atomic, ArtifactPaths, TempFiles, CLEANUP_BACKOFF};
use crate::utils::{BoothError, BoothResult};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

pub struct Finalizer {
    transcoder: Arc<dyn Transcoder>,
    cleanup_backoff: Duration,
}

impl Finalizer {
    pub fn new(transcoder: Arc<dyn Transcoder>) -> Self {
        Self {
            transcoder,
            cleanup_backoff: CLEANUP_BACKOFF,
        }
    }

    pub fn with_cleanup_backoff(mut self, backoff: Duration) -> Self {
        self.cleanup_backoff = backoff;
        self
    }

    /// Mux audio (if captured) and burn in the overlay (if configured).
    /// Returns the final video path, which is the recorded video path.
    pub fn finalize(
        &self,
        recording: &RecordingOutput,
        overlay: Option<&Overlay>,
        canvas: (u32, u32),
        paths: &ArtifactPaths,
    ) -> BoothResult<PathBuf> {
        let video = recording.video.clone();
        let mut temps = TempFiles::with_backoff(self.cleanup_backoff);

        if let Some(audio) = &recording.audio {
            temps.track(audio);
            if audio.exists() {
                let job = TranscodeJob::Mux {
                    video: video.clone(),
                    audio: audio.clone(),
                    output: paths.final_for(&video),
                };
                self.apply(&job, &video, &mut temps)?;
                tracing::info!("Muxed audio into {:?}", video);
            } else {
                tracing::warn!("Audio file {:?} missing, keeping silent video", audio);
            }
        }

        if let Some(overlay) = overlay {
            let image = paths.temp("overlay").with_extension("png");
            temps.track(&image);
            write_overlay_png(overlay, canvas.0, canvas.1, &image).map_err(|e| {
                BoothError::TranscodeFailed {
                    message: format!("Failed to prepare overlay: {}", e),
                    preserved: Some(video.clone()),
                }
            })?;

            let job = TranscodeJob::Overlay {
                video: video.clone(),
                overlay: image,
                output: paths.final_for(&video),
            };
            self.apply(&job, &video, &mut temps)?;
            tracing::info!("Applied overlay to {:?}", video);
        }

        Ok(video)
    }

    fn apply(&self, job: &TranscodeJob, video: &Path, temps: &mut TempFiles) -> BoothResult<()> {
        temps.track(job.output());

        let preserve = |e: BoothError| match e {
            BoothError::TranscodeFailed { message, .. } => BoothError::TranscodeFailed {
                message,
                preserved: Some(video.to_path_buf()),
            },
            other => BoothError::TranscodeFailed {
                message: other.to_string(),
                preserved: Some(video.to_path_buf()),
            },
        };

        self.transcoder.run(job).map_err(preserve)?;
        verify_output(job).map_err(preserve)?;
        replace_atomic(job.output(), video).map_err(|e| preserve(BoothError::Io(e)))?;
        temps.release(job.output());
        Ok(())
    }
}
