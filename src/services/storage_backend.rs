//! src/services/storage_backend.rs
//!
//! The one outbound dependency of the relay: something that can create an
//! object in a bucket from a byte stream. `GcsClient` talks to the Cloud
//! Storage JSON API; tests substitute their own `ObjectStore`.

use crate::{
    models::object::{ObjectDescriptor, StoredObject},
    services::credentials::{CredentialsError, TokenSource},
};
use async_trait::async_trait;
use bytes::Bytes;
use futures::{StreamExt, future, stream, stream::BoxStream};
use reqwest::{StatusCode, Url, header};
use serde::Deserialize;
use std::io;
use thiserror::Error;
use tracing::debug;
use uuid::Uuid;

/// Request payload as handed over by the HTTP layer.
pub type ByteStream = BoxStream<'static, io::Result<Bytes>>;

const DEFAULT_MEDIA_TYPE: &str = "application/octet-stream";

#[derive(Debug, Error)]
pub enum StorageError {
    #[error(transparent)]
    Credentials(#[from] CredentialsError),
    #[error("invalid storage endpoint `{0}`")]
    InvalidEndpoint(String),
    #[error("encoding object metadata: {0}")]
    Metadata(#[from] serde_json::Error),
    #[error("storage request failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("storage backend returned {status}: {message}")]
    Upstream { status: u16, message: String },
}

pub type StorageResult<T> = Result<T, StorageError>;

/// Creates objects in remote buckets.
///
/// Implementations are shared by every request task and must not need
/// exclusive access.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Create `descriptor.name` in `descriptor.bucket`, streaming exactly
    /// `content_length` bytes of `body` as its content.
    async fn insert_object(
        &self,
        descriptor: &ObjectDescriptor,
        content_length: u64,
        body: ByteStream,
    ) -> StorageResult<StoredObject>;

    /// Confirm the store can authorize requests right now.
    async fn check_access(&self) -> StorageResult<()>;
}

/// Cloud Storage JSON API client.
pub struct GcsClient {
    http: reqwest::Client,
    endpoint: Url,
    tokens: TokenSource,
}

impl GcsClient {
    pub fn new(endpoint: &str, tokens: TokenSource, http: reqwest::Client) -> StorageResult<Self> {
        let endpoint = Url::parse(endpoint)
            .ok()
            .filter(|url| matches!(url.scheme(), "http" | "https") && !url.cannot_be_a_base())
            .ok_or_else(|| StorageError::InvalidEndpoint(endpoint.to_string()))?;
        Ok(Self {
            http,
            endpoint,
            tokens,
        })
    }

    /// `{endpoint}/upload/storage/v1/b/{bucket}/o?uploadType=multipart`
    fn upload_url(&self, bucket: &str) -> StorageResult<Url> {
        let mut url = self.endpoint.clone();
        url.path_segments_mut()
            .map_err(|_| StorageError::InvalidEndpoint(self.endpoint.to_string()))?
            .pop_if_empty()
            .extend(["upload", "storage", "v1", "b", bucket, "o"]);
        url.query_pairs_mut().append_pair("uploadType", "multipart");
        Ok(url)
    }
}

#[async_trait]
impl ObjectStore for GcsClient {
    async fn insert_object(
        &self,
        descriptor: &ObjectDescriptor,
        content_length: u64,
        body: ByteStream,
    ) -> StorageResult<StoredObject> {
        let url = self.upload_url(&descriptor.bucket)?;
        let token = self.tokens.token().await?;
        let upload = MultipartRelated::new(descriptor)?;
        let total_length = upload.framing_len() + content_length;

        debug!(
            bucket = %descriptor.bucket,
            name = %descriptor.name,
            content_length,
            "inserting object"
        );

        let mut request = self
            .http
            .post(url)
            .header(header::CONTENT_TYPE, upload.content_type())
            .header(header::CONTENT_LENGTH, total_length)
            .body(reqwest::Body::wrap_stream(upload.into_stream(body)));
        if let Some(token) = token {
            request = request.bearer_auth(token);
        }

        let response = request.send().await?;
        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(StorageError::Upstream {
                status: status.as_u16(),
                message: upstream_message(status, &text),
            });
        }

        Ok(response.json::<StoredObject>().await?)
    }

    async fn check_access(&self) -> StorageResult<()> {
        self.tokens.token().await?;
        Ok(())
    }
}

/// Framing for a `multipart/related` upload: JSON metadata, then the media.
struct MultipartRelated {
    boundary: String,
    head: String,
    tail: String,
}

impl MultipartRelated {
    fn new(descriptor: &ObjectDescriptor) -> StorageResult<Self> {
        let boundary = format!("upload_relay_{}", Uuid::new_v4().simple());
        let metadata = serde_json::to_string(descriptor)?;
        let media_type = descriptor
            .content_type
            .as_deref()
            .unwrap_or(DEFAULT_MEDIA_TYPE);

        let head = format!(
            "--{b}\r\nContent-Type: application/json; charset=UTF-8\r\n\r\n{metadata}\r\n\
             --{b}\r\nContent-Type: {media_type}\r\n\r\n",
            b = boundary
        );
        let tail = format!("\r\n--{}--\r\n", boundary);

        Ok(Self {
            boundary,
            head,
            tail,
        })
    }

    fn content_type(&self) -> String {
        format!("multipart/related; boundary={}", self.boundary)
    }

    fn framing_len(&self) -> u64 {
        (self.head.len() + self.tail.len()) as u64
    }

    fn into_stream(self, media: ByteStream) -> ByteStream {
        stream::once(future::ready(Ok(Bytes::from(self.head))))
            .chain(media)
            .chain(stream::once(future::ready(Ok(Bytes::from(self.tail)))))
            .boxed()
    }
}

#[derive(Deserialize)]
struct ApiErrorBody {
    error: ApiErrorDetail,
}

#[derive(Deserialize)]
struct ApiErrorDetail {
    message: String,
}

/// Prefer the JSON API's `error.message`; fall back to the raw body.
fn upstream_message(status: StatusCode, body: &str) -> String {
    match serde_json::from_str::<ApiErrorBody>(body) {
        Ok(parsed) => parsed.error.message,
        Err(_) if body.trim().is_empty() => status.to_string(),
        Err(_) => body.trim().to_string(),
    }
}
