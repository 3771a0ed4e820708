//! src/services/upload_service.rs
//!
//! UploadService: validates an inbound upload, names it, and relays the body
//! to the object store in a single call. Holds no per-request state; clones
//! share the store, the observer and the frozen settings.

use crate::{
    config::{AppConfig, BucketSource, UrlStyle},
    errors::AppError,
    models::{
        object::{ObjectDescriptor, StoredObject},
        upload::UploadRequest,
    },
    services::{
        storage_backend::{ByteStream, ObjectStore, StorageError},
        upload_events::{FailedUpload, StoredUpload, UploadObserver},
    },
};
use std::sync::Arc;
use thiserror::Error;

const BUCKET_NAME_MIN_LEN: usize = 3;
const BUCKET_NAME_MAX_LEN: usize = 63;
/// Names containing dots may be longer, as long as every part stays within
/// `BUCKET_NAME_MAX_LEN`.
const DOTTED_BUCKET_NAME_MAX_LEN: usize = 222;

#[derive(Debug, Error)]
pub enum UploadError {
    #[error("invalid bucket")]
    InvalidBucket,
    #[error("invalid body")]
    InvalidBody,
    #[error("filesize limited to {limit} bytes")]
    TooLarge { limit: u64 },
    #[error(transparent)]
    Storage(#[from] StorageError),
}

pub type UploadResult<T> = Result<T, UploadError>;

impl From<UploadError> for AppError {
    fn from(err: UploadError) -> Self {
        match err {
            UploadError::Storage(_) => AppError::internal(),
            client => AppError::bad_request(client.to_string()),
        }
    }
}

/// The upload-relevant slice of `AppConfig`.
#[derive(Debug, Clone)]
pub struct UploadSettings {
    pub bucket: BucketSource,
    /// `0` disables the size check.
    pub max_length: u64,
    pub cache_control: Option<String>,
    pub infer_extension: bool,
    pub url_style: UrlStyle,
    pub public_base_url: String,
}

impl From<&AppConfig> for UploadSettings {
    fn from(cfg: &AppConfig) -> Self {
        Self {
            bucket: cfg.bucket.clone(),
            max_length: cfg.max_length,
            cache_control: cfg.cache_control.clone(),
            infer_extension: cfg.infer_extension,
            url_style: cfg.url_style,
            public_base_url: cfg.public_base_url.clone(),
        }
    }
}

#[derive(Clone)]
pub struct UploadService {
    store: Arc<dyn ObjectStore>,
    observer: Arc<dyn UploadObserver>,
    settings: Arc<UploadSettings>,
}

impl UploadService {
    pub fn new(
        store: Arc<dyn ObjectStore>,
        observer: Arc<dyn UploadObserver>,
        settings: UploadSettings,
    ) -> Self {
        Self {
            store,
            observer,
            settings: Arc::new(settings),
        }
    }

    pub fn settings(&self) -> &UploadSettings {
        &self.settings
    }

    /// Validate `request`, stream `body` into a freshly named object and
    /// return the URL handed back to the caller.
    ///
    /// Validation failures return before the store is touched. The store is
    /// called at most once and never retried.
    pub async fn upload(&self, request: UploadRequest, body: ByteStream) -> UploadResult<String> {
        let bucket = self.resolve_bucket(request.bucket.as_deref())?;
        let content_length = self.check_length(request.content_length)?;

        let descriptor = ObjectDescriptor {
            name: ObjectDescriptor::generate_name(
                request.content_type.as_deref(),
                self.settings.infer_extension,
            ),
            bucket,
            content_type: request.content_type,
            cache_control: self.settings.cache_control.clone(),
        };

        match self
            .store
            .insert_object(&descriptor, content_length, body)
            .await
        {
            Ok(stored) => {
                self.observer.object_stored(&StoredUpload {
                    bucket: &descriptor.bucket,
                    name: &descriptor.name,
                    content_length,
                    media_link: stored.media_link.as_deref(),
                });
                Ok(self.response_url(&descriptor, &stored))
            }
            Err(error) => {
                self.observer.upload_failed(&FailedUpload {
                    bucket: &descriptor.bucket,
                    name: &descriptor.name,
                    content_length,
                    error: &error,
                });
                Err(error.into())
            }
        }
    }

    /// Confirm the store is usable (readiness).
    pub async fn check_store(&self) -> Result<(), StorageError> {
        self.store.check_access().await
    }

    fn resolve_bucket(&self, from_path: Option<&str>) -> UploadResult<String> {
        match &self.settings.bucket {
            BucketSource::Fixed(name) => Ok(name.clone()),
            BucketSource::Path => match from_path {
                Some(name) if is_valid_bucket_name(name) => Ok(name.to_string()),
                _ => Err(UploadError::InvalidBucket),
            },
        }
    }

    fn check_length(&self, declared: Option<u64>) -> UploadResult<u64> {
        let length = match declared {
            Some(0) | None => return Err(UploadError::InvalidBody),
            Some(length) => length,
        };
        let limit = self.settings.max_length;
        if limit > 0 && length > limit {
            return Err(UploadError::TooLarge { limit });
        }
        Ok(length)
    }

    fn response_url(&self, descriptor: &ObjectDescriptor, stored: &StoredObject) -> String {
        let public = || {
            format!(
                "{}/{}/{}",
                self.settings.public_base_url, descriptor.bucket, descriptor.name
            )
        };
        match self.settings.url_style {
            UrlStyle::Public => public(),
            UrlStyle::MediaLink => stored.media_link.clone().unwrap_or_else(public),
        }
    }
}

/// Cloud Storage bucket naming rules:
/// - 3–63 characters, or up to 222 when dotted with each part at most 63
/// - lowercase letters, digits, dashes, underscores and dots only
/// - starts and ends with a letter or digit
/// - no consecutive dots, no dotted-decimal IP form
/// - no `goog` prefix and no `google` anywhere
pub fn is_valid_bucket_name(name: &str) -> bool {
    let len = name.len();
    let max_len = if name.contains('.') {
        DOTTED_BUCKET_NAME_MAX_LEN
    } else {
        BUCKET_NAME_MAX_LEN
    };
    if !(BUCKET_NAME_MIN_LEN..=max_len).contains(&len) {
        return false;
    }
    if name
        .split('.')
        .any(|part| part.is_empty() || part.len() > BUCKET_NAME_MAX_LEN)
    {
        return false;
    }
    if !name
        .chars()
        .all(|c| matches!(c, 'a'..='z' | '0'..='9' | '-' | '_' | '.'))
    {
        return false;
    }
    let edge_ok = |c: Option<char>| c.is_some_and(|c| c.is_ascii_alphanumeric());
    if !edge_ok(name.chars().next()) || !edge_ok(name.chars().last()) {
        return false;
    }
    if name.contains("..") || is_ipv4_like(name) {
        return false;
    }
    !(name.starts_with("goog") || name.contains("google"))
}

/// Check if a string matches IPv4-like dotted decimal form.
fn is_ipv4_like(name: &str) -> bool {
    let parts: Vec<&str> = name.split('.').collect();
    parts.len() == 4
        && parts.iter().all(|segment| {
            !segment.is_empty()
                && segment.len() <= 3
                && segment.chars().all(|c| c.is_ascii_digit())
                && segment.parse::<u8>().is_ok()
        })
}
