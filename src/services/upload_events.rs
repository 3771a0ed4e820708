//! Upload outcome notifications.
//!
//! The upload service reports every attempt that reaches the storage backend
//! here and nowhere else. Response construction never depends on an observer.

use crate::services::storage_backend::StorageError;
use tracing::{error, info};

/// A completed upload.
#[derive(Debug, Clone)]
pub struct StoredUpload<'a> {
    pub bucket: &'a str,
    pub name: &'a str,
    pub content_length: u64,
    pub media_link: Option<&'a str>,
}

/// An upload the storage backend did not complete.
#[derive(Debug)]
pub struct FailedUpload<'a> {
    pub bucket: &'a str,
    pub name: &'a str,
    pub content_length: u64,
    pub error: &'a StorageError,
}

pub trait UploadObserver: Send + Sync {
    fn object_stored(&self, event: &StoredUpload<'_>);
    fn upload_failed(&self, event: &FailedUpload<'_>);
}

/// Emits one structured `tracing` event per attempt.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingObserver;

impl UploadObserver for TracingObserver {
    fn object_stored(&self, event: &StoredUpload<'_>) {
        info!(
            bucket = event.bucket,
            name = event.name,
            content_length = event.content_length,
            media_link = event.media_link.unwrap_or_default(),
            "[uploaded]"
        );
    }

    fn upload_failed(&self, event: &FailedUpload<'_>) {
        error!(
            bucket = event.bucket,
            name = event.name,
            content_length = event.content_length,
            error = %event.error,
            "upload failed"
        );
    }
}
