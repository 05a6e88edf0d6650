//! Remote storage interface

use crate::utils::BoothError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteEntry {
    pub id: String,
    pub name: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ListFilter {
    Folders,
    All,
}

#[derive(Error, Debug)]
pub enum StorageError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Remote returned {status}: {body}")]
    Status { status: u16, body: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("No access token configured")]
    Auth,

    #[error("Malformed response: {0}")]
    Malformed(String),
}

pub type StorageResult<T> = Result<T, StorageError>;

impl From<StorageError> for BoothError {
    fn from(error: StorageError) -> Self {
        BoothError::PublishFailed(error.to_string())
    }
}

/// Folder-based remote storage. The same calls serve the event and pooled
/// destinations.
#[async_trait]
pub trait RemoteStorage: Send + Sync {
    async fn list(&self, parent: &str, filter: ListFilter) -> StorageResult<Vec<RemoteEntry>>;

    /// Returns the new folder id
    async fn create_folder(&self, parent: &str, name: &str) -> StorageResult<String>;

    /// Returns the uploaded file id
    async fn upload_file(&self, parent: &str, path: &Path, mime_type: &str) -> StorageResult<String>;

    /// Delete a file or folder. Deleting a folder removes its contents.
    async fn delete(&self, id: &str) -> StorageResult<()>;

    /// Let anyone holding the link read `id`
    async fn make_public(&self, id: &str) -> StorageResult<()>;
}

pub fn mime_for(path: &Path) -> &'static str {
    match path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
        .as_deref()
    {
        Some("jpg") | Some("jpeg") => "image/jpeg",
        Some("png") => "image/png",
        Some("mp4") => "video/mp4",
        Some("wav") => "audio/wav",
        _ => "application/octet-stream",
    }
}
