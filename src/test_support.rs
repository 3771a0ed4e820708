//! Fakes shared by the unit tests.

use crate::{
    models::object::{ObjectDescriptor, StoredObject},
    services::{
        storage_backend::{ByteStream, ObjectStore, StorageError, StorageResult},
        upload_events::{FailedUpload, StoredUpload, UploadObserver},
    },
};
use async_trait::async_trait;
use axum::Router;
use bytes::Bytes;
use futures::{StreamExt, TryStreamExt, stream};
use std::sync::Mutex;
use tokio::net::TcpListener;

/// Serve `app` on an ephemeral local port and return its base URL.
pub async fn serve(app: Router) -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://{}", addr)
}

/// A request body delivered in the given chunks.
pub fn body_stream(chunks: &[&str]) -> ByteStream {
    let chunks: Vec<std::io::Result<Bytes>> = chunks
        .iter()
        .map(|chunk| Ok(Bytes::copy_from_slice(chunk.as_bytes())))
        .collect();
    stream::iter(chunks).boxed()
}

#[derive(Debug, Clone)]
pub struct RecordedInsert {
    pub descriptor: ObjectDescriptor,
    pub content_length: u64,
    pub body: Vec<u8>,
}

/// In-memory `ObjectStore` that records every insert.
#[derive(Default)]
pub struct MockStore {
    fail: bool,
    calls: Mutex<Vec<RecordedInsert>>,
}

impl MockStore {
    /// A store whose inserts always fail with an upstream error.
    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::default()
        }
    }

    pub fn calls(&self) -> Vec<RecordedInsert> {
        self.calls.lock().unwrap().clone()
    }

    pub fn media_link(bucket: &str, name: &str) -> String {
        format!(
            "https://storage.googleapis.com/download/storage/v1/b/{}/o/{}?alt=media",
            bucket, name
        )
    }
}

#[async_trait]
impl ObjectStore for MockStore {
    async fn insert_object(
        &self,
        descriptor: &ObjectDescriptor,
        content_length: u64,
        body: ByteStream,
    ) -> StorageResult<StoredObject> {
        let chunks: Vec<Bytes> = body.try_collect().await.map_err(|err| StorageError::Upstream {
            status: 499,
            message: err.to_string(),
        })?;
        let body = chunks.concat();
        self.calls.lock().unwrap().push(RecordedInsert {
            descriptor: descriptor.clone(),
            content_length,
            body: body.clone(),
        });

        if self.fail {
            return Err(StorageError::Upstream {
                status: 503,
                message: "backend unavailable".into(),
            });
        }

        Ok(StoredObject {
            name: descriptor.name.clone(),
            bucket: descriptor.bucket.clone(),
            media_link: Some(Self::media_link(&descriptor.bucket, &descriptor.name)),
            size: Some(body.len().to_string()),
            content_type: descriptor.content_type.clone(),
            cache_control: descriptor.cache_control.clone(),
            ..StoredObject::default()
        })
    }

    async fn check_access(&self) -> StorageResult<()> {
        if self.fail {
            return Err(StorageError::Upstream {
                status: 401,
                message: "no credentials".into(),
            });
        }
        Ok(())
    }
}

/// Observer that remembers object names per outcome.
#[derive(Default)]
pub struct RecordingObserver {
    stored: Mutex<Vec<String>>,
    failed: Mutex<Vec<String>>,
}

impl RecordingObserver {
    pub fn stored(&self) -> Vec<String> {
        self.stored.lock().unwrap().clone()
    }

    pub fn failed(&self) -> Vec<String> {
        self.failed.lock().unwrap().clone()
    }

    pub fn is_empty(&self) -> bool {
        self.stored().is_empty() && self.failed().is_empty()
    }
}

impl UploadObserver for RecordingObserver {
    fn object_stored(&self, event: &StoredUpload<'_>) {
        self.stored.lock().unwrap().push(event.name.to_string());
    }

    fn upload_failed(&self, event: &FailedUpload<'_>) {
        self.failed.lock().unwrap().push(event.name.to_string());
    }
}
