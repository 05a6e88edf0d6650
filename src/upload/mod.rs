//! Upload manager: remote storage, retries, publishing and QR codes

pub mod drive;
pub mod publisher;
pub mod qr;
pub mod retry;
pub mod storage;

pub use drive::DriveClient;
pub use publisher::{Publication, Publisher, UploadDestination};
pub use qr::render_qr;
pub use retry::RetryPolicy;
pub use storage::{mime_for, ListFilter, RemoteEntry, RemoteStorage, StorageError, StorageResult};
