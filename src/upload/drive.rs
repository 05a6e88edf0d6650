//! Google Drive v3 REST client
//!
//! Uses a bearer token obtained elsewhere; the auth bootstrap is not part
//! of this crate.

use super::storage::{ListFilter, RemoteEntry, RemoteStorage, StorageError, StorageResult};
use crate::settings::UploadSettings;
use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;

const FOLDER_MIME: &str = "application/vnd.google-apps.folder";
const REQUEST_TIMEOUT_SECS: u64 = 300;
const BOUNDARY: &str = "photobooth-upload-boundary";

#[derive(Debug, Deserialize)]
struct FileList {
    #[serde(default)]
    files: Vec<RemoteEntry>,
}

#[derive(Debug, Deserialize)]
struct CreatedFile {
    id: String,
}

pub struct DriveClient {
    client: Client,
    api_base: String,
    upload_base: String,
    token: String,
}

impl DriveClient {
    pub fn new(api_base: &str, upload_base: &str, token: &str) -> StorageResult<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .build()?;
        Ok(Self {
            client,
            api_base: api_base.trim_end_matches('/').to_string(),
            upload_base: upload_base.trim_end_matches('/').to_string(),
            token: token.to_string(),
        })
    }

    pub fn from_settings(settings: &UploadSettings) -> StorageResult<Self> {
        let token = settings.resolve_token().ok_or(StorageError::Auth)?;
        Self::new(&settings.api_base, &settings.upload_base, &token)
    }

    async fn check(response: reqwest::Response) -> StorageResult<String> {
        let status = response.status();
        let body = response.text().await?;
        if !status.is_success() {
            return Err(StorageError::Status {
                status: status.as_u16(),
                body,
            });
        }
        Ok(body)
    }

    fn created_id(body: &str) -> StorageResult<String> {
        serde_json::from_str::<CreatedFile>(body)
            .map(|f| f.id)
            .map_err(|e| StorageError::Malformed(e.to_string()))
    }
}

pub(crate) fn list_query(parent: &str, filter: ListFilter) -> String {
    let mut q = format!("'{}' in parents and trashed=false", parent.replace('\'', "\\'"));
    if filter == ListFilter::Folders {
        q.push_str(&format!(" and mimeType='{}'", FOLDER_MIME));
    }
    q
}

pub(crate) fn public_permission() -> serde_json::Value {
    serde_json::json!({ "role": "reader", "type": "anyone" })
}

/// multipart/related body: JSON metadata part followed by the file bytes
pub(crate) fn multipart_body(metadata: &serde_json::Value, mime_type: &str, data: &[u8]) -> Vec<u8> {
    let mut body = Vec::with_capacity(data.len() + 512);
    body.extend_from_slice(format!("--{}\r\n", BOUNDARY).as_bytes());
    body.extend_from_slice(b"Content-Type: application/json; charset=UTF-8\r\n\r\n");
    body.extend_from_slice(metadata.to_string().as_bytes());
    body.extend_from_slice(format!("\r\n--{}\r\n", BOUNDARY).as_bytes());
    body.extend_from_slice(format!("Content-Type: {}\r\n\r\n", mime_type).as_bytes());
    body.extend_from_slice(data);
    body.extend_from_slice(format!("\r\n--{}--\r\n", BOUNDARY).as_bytes());
    body
}

#[async_trait]
impl RemoteStorage for DriveClient {
    async fn list(&self, parent: &str, filter: ListFilter) -> StorageResult<Vec<RemoteEntry>> {
        let response = self
            .client
            .get(format!("{}/files", self.api_base))
            .bearer_auth(&self.token)
            .query(&[
                ("q", list_query(parent, filter).as_str()),
                ("fields", "files(id,name)"),
            ])
            .send()
            .await?;
        let body = Self::check(response).await?;
        let list: FileList =
            serde_json::from_str(&body).map_err(|e| StorageError::Malformed(e.to_string()))?;
        Ok(list.files)
    }

    async fn create_folder(&self, parent: &str, name: &str) -> StorageResult<String> {
        let metadata = serde_json::json!({
            "name": name,
            "mimeType": FOLDER_MIME,
            "parents": [parent],
        });
        let response = self
            .client
            .post(format!("{}/files", self.api_base))
            .bearer_auth(&self.token)
            .query(&[("fields", "id")])
            .json(&metadata)
            .send()
            .await?;
        let id = Self::created_id(&Self::check(response).await?)?;
        tracing::info!("Created folder {} ({}) under {}", name, id, parent);
        Ok(id)
    }

    async fn upload_file(&self, parent: &str, path: &Path, mime_type: &str) -> StorageResult<String> {
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default();
        let data = tokio::fs::read(path).await?;
        let metadata = serde_json::json!({ "name": name, "parents": [parent] });
        let body = multipart_body(&metadata, mime_type, &data);

        let response = self
            .client
            .post(format!("{}/files", self.upload_base))
            .bearer_auth(&self.token)
            .query(&[("uploadType", "multipart"), ("fields", "id")])
            .header(
                reqwest::header::CONTENT_TYPE,
                format!("multipart/related; boundary={}", BOUNDARY),
            )
            .body(body)
            .send()
            .await?;
        let id = Self::created_id(&Self::check(response).await?)?;
        tracing::info!("Uploaded {} ({} bytes) to {} as {}", name, data.len(), parent, id);
        Ok(id)
    }

    async fn delete(&self, id: &str) -> StorageResult<()> {
        let response = self
            .client
            .delete(format!("{}/files/{}", self.api_base, id))
            .bearer_auth(&self.token)
            .send()
            .await?;
        Self::check(response).await?;
        tracing::info!("Deleted {}", id);
        Ok(())
    }

    async fn make_public(&self, id: &str) -> StorageResult<()> {
        let response = self
            .client
            .post(format!("{}/files/{}/permissions", self.api_base, id))
            .bearer_auth(&self.token)
            .json(&public_permission())
            .send()
            .await?;
        Self::check(response).await?;
        tracing::info!("Shared {} with anyone holding the link", id);
        Ok(())
    }
}
