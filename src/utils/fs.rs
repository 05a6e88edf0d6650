//! Filesystem helpers for artifacts and session-scoped temporary files
//!
//! Artifacts land under the output directory with timestamp-derived names
//! (`photo_<ts>.jpg`, `video_<ts>.mp4`, `audio_<ts>.wav`). Intermediate files
//! use the `temp_` / `final_` prefixes and are always removed.

use chrono::{DateTime, Local};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Attempts made to remove a temporary file before giving up
pub const CLEANUP_ATTEMPTS: u32 = 5;

/// Pause between removal attempts
pub const CLEANUP_BACKOFF: Duration = Duration::from_secs(1);

/// Timestamp tag used in every artifact name
pub fn timestamp_tag(now: DateTime<Local>) -> String {
    now.format("%Y%m%d_%H%M%S").to_string()
}

/// Deterministic artifact paths for one session
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtifactPaths {
    dir: PathBuf,
    tag: String,
}

impl ArtifactPaths {
    pub fn new(dir: &Path, now: DateTime<Local>) -> Self {
        Self {
            dir: dir.to_path_buf(),
            tag: timestamp_tag(now),
        }
    }

    pub fn tag(&self) -> &str {
        &self.tag
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn photo(&self, extension: &str) -> PathBuf {
        self.dir.join(format!("photo_{}.{}", self.tag, extension))
    }

    pub fn video(&self) -> PathBuf {
        self.dir.join(format!("video_{}.mp4", self.tag))
    }

    pub fn audio(&self) -> PathBuf {
        self.dir.join(format!("audio_{}.wav", self.tag))
    }

    pub fn qr(&self) -> PathBuf {
        self.dir.join(format!("qr_{}.png", self.tag))
    }

    /// Intermediate output of a transcoder pass over `artifact`
    pub fn final_for(&self, artifact: &Path) -> PathBuf {
        prefixed(artifact, "final_")
    }

    /// Scratch input (e.g. an overlay image handed to the transcoder)
    pub fn temp(&self, name: &str) -> PathBuf {
        self.dir.join(format!("temp_{}_{}", name, self.tag))
    }
}

/// `dir/name.ext` -> `dir/<prefix>name.ext`
pub fn prefixed(path: &Path, prefix: &str) -> PathBuf {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_default();
    path.with_file_name(format!("{}{}", prefix, name))
}

/// Atomically move `from` over `to`
pub fn replace_atomic(from: &Path, to: &Path) -> std::io::Result<()> {
    std::fs::rename(from, to)
}

/// Remove a file, retrying with a fixed backoff. Never fails the caller;
/// returns whether the file is gone.
pub fn remove_with_retry(path: &Path, attempts: u32, backoff: Duration) -> bool {
    for attempt in 1..=attempts {
        match std::fs::remove_file(path) {
            Ok(()) => {
                tracing::debug!("Removed temporary file {:?}", path);
                return true;
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return true,
            Err(e) => {
                tracing::warn!(
                    "Attempt {}/{}: failed to remove {:?}: {}",
                    attempt,
                    attempts,
                    path,
                    e
                );
                if attempt < attempts {
                    std::thread::sleep(backoff);
                }
            }
        }
    }
    tracing::error!(
        "Giving up removing {:?} after {} attempts",
        path,
        attempts
    );
    false
}

/// Removes its files on drop, on every exit path
#[derive(Debug, Default)]
pub struct TempFiles {
    paths: Vec<PathBuf>,
    backoff: Option<Duration>,
}

impl TempFiles {
    pub fn new() -> Self {
        Self::default()
    }

    /// Override the cleanup backoff (tests use a zero backoff)
    pub fn with_backoff(backoff: Duration) -> Self {
        Self {
            paths: Vec::new(),
            backoff: Some(backoff),
        }
    }

    pub fn track(&mut self, path: impl Into<PathBuf>) {
        self.paths.push(path.into());
    }

    /// Stop tracking a path that became a kept artifact
    pub fn release(&mut self, path: &Path) {
        self.paths.retain(|p| p != path);
    }

    pub fn cleanup(&mut self) {
        let backoff = self.backoff.unwrap_or(CLEANUP_BACKOFF);
        for path in self.paths.drain(..) {
            if path.exists() {
                remove_with_retry(&path, CLEANUP_ATTEMPTS, backoff);
            }
        }
    }
}

impl Drop for TempFiles {
    fn drop(&mut self) {
        self.cleanup();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_artifact_names_are_timestamp_derived() {
        let now = Local.with_ymd_and_hms(2026, 3, 14, 9, 26, 53).unwrap();
        let paths = ArtifactPaths::new(Path::new("/out"), now);

        assert_eq!(paths.photo("jpg"), PathBuf::from("/out/photo_20260314_092653.jpg"));
        assert_eq!(paths.video(), PathBuf::from("/out/video_20260314_092653.mp4"));
        assert_eq!(paths.audio(), PathBuf::from("/out/audio_20260314_092653.wav"));
        assert_eq!(
            paths.final_for(&paths.video()),
            PathBuf::from("/out/final_video_20260314_092653.mp4")
        );
    }

    #[test]
    fn test_temp_files_removed_on_drop() {
        let dir = tempfile::tempdir().unwrap();
        let scratch = dir.path().join("temp_overlay.png");
        std::fs::write(&scratch, b"x").unwrap();

        {
            let mut temps = TempFiles::with_backoff(Duration::ZERO);
            temps.track(&scratch);
        }

        assert!(!scratch.exists());
    }

    #[test]
    fn test_released_path_survives() {
        let dir = tempfile::tempdir().unwrap();
        let kept = dir.path().join("video.mp4");
        std::fs::write(&kept, b"x").unwrap();

        let mut temps = TempFiles::with_backoff(Duration::ZERO);
        temps.track(&kept);
        temps.release(&kept);
        drop(temps);

        assert!(kept.exists());
    }

    #[test]
    fn test_remove_missing_file_is_success() {
        let dir = tempfile::tempdir().unwrap();
        assert!(remove_with_retry(
            &dir.path().join("nope"),
            CLEANUP_ATTEMPTS,
            Duration::ZERO
        ));
    }
}
