//! Publishing a finished artifact
//!
//! The artifact goes to the selected event folder and to a pooled folder
//! under the pooled root. The share link points at the pooled folder, so
//! it is only handed out once both uploads succeeded. Anything created
//! remotely by a publish that then fails is deleted again, best effort.

use super::qr::render_qr;
use super::retry::RetryPolicy;
use super::storage::{mime_for, ListFilter, RemoteEntry, RemoteStorage};
use crate::settings::UploadSettings;
use crate::utils::{BoothError, BoothResult};
use image::GrayImage;
use parking_lot::Mutex;
use std::path::Path;
use std::sync::Arc;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadDestination {
    pub event_folder_id: String,
    pub pooled_root_id: String,
}

impl UploadDestination {
    /// None until an event folder has been selected
    pub fn from_settings(settings: &UploadSettings) -> Option<Self> {
        let event_folder_id = settings.event_folder_id.clone().filter(|id| !id.is_empty())?;
        Some(Self {
            event_folder_id,
            pooled_root_id: settings.pooled_root_id.clone(),
        })
    }
}

#[derive(Debug, Clone)]
pub struct Publication {
    pub link: String,
    pub pooled_folder_id: String,
    pub qr: GrayImage,
}

pub struct Publisher {
    storage: Arc<dyn RemoteStorage>,
    retry: RetryPolicy,
    share_link_base: String,
    qr_size: u32,
    share_publicly: bool,
    events_root_id: String,
    /// Pooled folder of the last fully published artifact
    last_pooled: Mutex<Option<String>>,
}

impl Publisher {
    pub fn new(storage: Arc<dyn RemoteStorage>, settings: &UploadSettings) -> Self {
        Self {
            storage,
            retry: RetryPolicy::default(),
            share_link_base: settings.share_link_base.clone(),
            qr_size: settings.qr_size,
            share_publicly: settings.share_publicly,
            events_root_id: settings.events_root_id.clone(),
            last_pooled: Mutex::new(None),
        }
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn last_pooled(&self) -> Option<String> {
        self.last_pooled.lock().clone()
    }

    pub fn share_link(&self, folder_id: &str) -> String {
        format!("{}{}", self.share_link_base, folder_id)
    }

    /// Upload `artifact` to both destinations and build its share link and
    /// QR code. The local file is never modified.
    pub async fn publish(
        &self,
        artifact: &Path,
        destination: &UploadDestination,
        reuse_last: bool,
    ) -> BoothResult<Publication> {
        if !artifact.is_file() {
            return Err(BoothError::PublishFailed(format!(
                "Artifact {:?} does not exist",
                artifact
            )));
        }

        let mut created = Vec::new();
        match self
            .publish_to(artifact, destination, reuse_last, &mut created)
            .await
        {
            Ok(publication) => Ok(publication),
            Err(e) => {
                self.roll_back(created).await;
                Err(e)
            }
        }
    }

    /// Pushes every remote id it creates onto `created`
    async fn publish_to(
        &self,
        artifact: &Path,
        destination: &UploadDestination,
        reuse_last: bool,
        created: &mut Vec<String>,
    ) -> BoothResult<Publication> {
        let mime = mime_for(artifact);

        let event_file = self
            .retry
            .run("Event upload", || {
                self.storage
                    .upload_file(&destination.event_folder_id, artifact, mime)
            })
            .await?;
        created.push(event_file);

        let reused = if reuse_last { self.last_pooled() } else { None };
        let pooled_folder_id = match reused {
            Some(id) => {
                tracing::info!("Reusing pooled folder {}", id);
                id
            }
            None => {
                let name = artifact
                    .file_stem()
                    .map(|s| s.to_string_lossy().to_string())
                    .unwrap_or_else(|| "artifact".to_string());
                let id = self
                    .retry
                    .run("Pooled folder creation", || {
                        self.storage
                            .create_folder(&destination.pooled_root_id, &name)
                    })
                    .await?;
                created.push(id.clone());
                if self.share_publicly {
                    self.retry
                        .run("Pooled folder sharing", || self.storage.make_public(&id))
                        .await?;
                }
                id
            }
        };

        let pooled_file = self
            .retry
            .run("Pooled upload", || {
                self.storage.upload_file(&pooled_folder_id, artifact, mime)
            })
            .await?;
        created.push(pooled_file);

        let link = self.share_link(&pooled_folder_id);
        let qr = render_qr(&link, self.qr_size)?;
        *self.last_pooled.lock() = Some(pooled_folder_id.clone());

        tracing::info!("Published {:?} -> {}", artifact, link);
        Ok(Publication {
            link,
            pooled_folder_id,
            qr,
        })
    }

    /// Delete what a failed publish created, newest first. Errors are
    /// logged and dropped so the original failure is what gets reported.
    async fn roll_back(&self, created: Vec<String>) {
        for id in created.into_iter().rev() {
            match self.storage.delete(&id).await {
                Ok(()) => tracing::info!("Rolled back remote {}", id),
                Err(e) => tracing::warn!("Could not delete remote {}: {}", id, e),
            }
        }
    }

    pub async fn list_events(&self) -> BoothResult<Vec<RemoteEntry>> {
        let events = self
            .retry
            .run("Event listing", || {
                self.storage.list(&self.events_root_id, ListFilter::Folders)
            })
            .await?;
        Ok(events)
    }

    pub async fn create_event(&self, name: &str) -> BoothResult<String> {
        let id = self
            .retry
            .run("Event creation", || {
                self.storage.create_folder(&self.events_root_id, name)
            })
            .await?;
        Ok(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::ScriptedStorage;
    use std::time::Duration;
    use tokio::time::Instant;

    fn settings() -> UploadSettings {
        UploadSettings {
            events_root_id: "events".into(),
            pooled_root_id: "pooled".into(),
            event_folder_id: Some("event-1".into()),
            share_link_base: "https://share.example/".into(),
            qr_size: 120,
            ..Default::default()
        }
    }

    fn artifact(dir: &tempfile::TempDir) -> std::path::PathBuf {
        let path = dir.path().join("photo_20260314_092653.jpg");
        std::fs::write(&path, b"jpeg bytes").unwrap();
        path
    }

    fn destination() -> UploadDestination {
        UploadDestination::from_settings(&settings()).unwrap()
    }

    #[tokio::test(start_paused = true)]
    async fn test_transient_failures_back_off_then_succeed() {
        let dir = tempfile::tempdir().unwrap();
        let storage = Arc::new(ScriptedStorage::new());
        storage.fail_times("upload", 2);
        let publisher = Publisher::new(storage.clone(), &settings());

        let started = Instant::now();
        let publication = publisher
            .publish(&artifact(&dir), &destination(), false)
            .await
            .unwrap();

        assert_eq!(started.elapsed(), Duration::from_secs(3));
        assert_eq!(
            publication.link,
            format!("https://share.example/{}", publication.pooled_folder_id)
        );
        assert_eq!(publication.qr.dimensions(), (120, 120));
        assert_eq!(storage.count("create:pooled:photo_20260314_092653"), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_exhausted_retries_leave_artifact_intact() {
        let dir = tempfile::tempdir().unwrap();
        let path = artifact(&dir);
        let storage = Arc::new(ScriptedStorage::new());
        storage.fail_times("upload", 3);
        let publisher = Publisher::new(storage.clone(), &settings());

        let err = publisher.publish(&path, &destination(), false).await.unwrap_err();

        assert_eq!(err.code(), "PUBLISH_FAILED");
        assert_eq!(std::fs::read(&path).unwrap(), b"jpeg bytes");
        assert_eq!(storage.count("create:"), 0);
        assert!(publisher.last_pooled().is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_pooled_upload_is_overall_failure() {
        let dir = tempfile::tempdir().unwrap();
        let storage = Arc::new(ScriptedStorage::new());
        storage.fail_uploads_outside("event-1");
        let publisher = Publisher::new(storage.clone(), &settings());

        let err = publisher
            .publish(&artifact(&dir), &destination(), false)
            .await
            .unwrap_err();

        assert_eq!(err.code(), "PUBLISH_FAILED");
        assert_eq!(storage.count("upload:event-1:"), 1);
        assert!(publisher.last_pooled().is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_pooled_upload_deletes_event_file_and_new_folder() {
        let dir = tempfile::tempdir().unwrap();
        let storage = Arc::new(ScriptedStorage::new());
        storage.fail_uploads_outside("event-1");
        let publisher = Publisher::new(storage.clone(), &settings());

        publisher
            .publish(&artifact(&dir), &destination(), false)
            .await
            .unwrap_err();

        // Event upload was file-1, the pooled folder folder-2
        let deletes: Vec<String> = storage
            .calls()
            .into_iter()
            .filter(|c| c.starts_with("delete:"))
            .collect();
        assert_eq!(deletes, vec!["delete:folder-2", "delete:file-1"]);
        assert!(storage
            .list("pooled", ListFilter::Folders)
            .await
            .unwrap()
            .is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_reused_folder_survives_failed_publish() {
        let dir = tempfile::tempdir().unwrap();
        let path = artifact(&dir);
        let storage = Arc::new(ScriptedStorage::new());
        let publisher = Publisher::new(storage.clone(), &settings());
        let first = publisher.publish(&path, &destination(), false).await.unwrap();

        storage.fail_uploads_outside("event-1");
        publisher.publish(&path, &destination(), true).await.unwrap_err();

        assert_eq!(storage.count(&format!("delete:{}", first.pooled_folder_id)), 0);
        assert_eq!(storage.count("delete:"), 1);
        assert_eq!(publisher.last_pooled(), Some(first.pooled_folder_id));
    }

    #[tokio::test(start_paused = true)]
    async fn test_cleanup_errors_keep_the_publish_error() {
        let dir = tempfile::tempdir().unwrap();
        let storage = Arc::new(ScriptedStorage::new());
        storage.fail_times("create", 3);
        storage.fail_times("delete", 1);
        let publisher = Publisher::new(storage.clone(), &settings());

        let err = publisher
            .publish(&artifact(&dir), &destination(), false)
            .await
            .unwrap_err();

        assert_eq!(err.code(), "PUBLISH_FAILED");
        assert!(err.to_string().contains("503"));
        assert_eq!(storage.count("delete:file-1"), 1);
    }

    #[tokio::test]
    async fn test_public_sharing_applies_to_new_pooled_folders_only() {
        let dir = tempfile::tempdir().unwrap();
        let path = artifact(&dir);
        let storage = Arc::new(ScriptedStorage::new());
        let publisher = Publisher::new(
            storage.clone(),
            &UploadSettings {
                share_publicly: true,
                ..settings()
            },
        );

        let first = publisher.publish(&path, &destination(), false).await.unwrap();
        publisher.publish(&path, &destination(), true).await.unwrap();

        assert_eq!(storage.count("share:"), 1);
        assert_eq!(storage.count(&format!("share:{}", first.pooled_folder_id)), 1);
    }

    #[tokio::test]
    async fn test_private_by_default() {
        let dir = tempfile::tempdir().unwrap();
        let storage = Arc::new(ScriptedStorage::new());
        let publisher = Publisher::new(storage.clone(), &settings());

        publisher
            .publish(&artifact(&dir), &destination(), false)
            .await
            .unwrap();
        assert_eq!(storage.count("share:"), 0);
    }

    #[tokio::test]
    async fn test_reuse_last_pooled_folder() {
        let dir = tempfile::tempdir().unwrap();
        let path = artifact(&dir);
        let storage = Arc::new(ScriptedStorage::new());
        let publisher = Publisher::new(storage.clone(), &settings());

        // Nothing to reuse yet
        let first = publisher.publish(&path, &destination(), true).await.unwrap();
        let second = publisher.publish(&path, &destination(), true).await.unwrap();
        let third = publisher.publish(&path, &destination(), false).await.unwrap();

        assert_eq!(first.pooled_folder_id, second.pooled_folder_id);
        assert_ne!(second.pooled_folder_id, third.pooled_folder_id);
        assert_eq!(storage.count("create:pooled:"), 2);
        assert_eq!(publisher.last_pooled(), Some(third.pooled_folder_id));
    }

    #[tokio::test]
    async fn test_events_listed_and_created_under_events_root() {
        let storage = Arc::new(ScriptedStorage::new());
        let publisher = Publisher::new(storage.clone(), &settings());

        let id = publisher.create_event("Wedding").await.unwrap();
        let events = publisher.list_events().await.unwrap();

        assert_eq!(
            events,
            vec![RemoteEntry {
                id,
                name: "Wedding".into()
            }]
        );
    }

    #[test]
    fn test_no_event_selected_means_no_destination() {
        let mut s = settings();
        s.event_folder_id = None;
        assert!(UploadDestination::from_settings(&s).is_none());
    }
}
