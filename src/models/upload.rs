//! Represents an inbound upload before any validation has run.

use axum::http::{HeaderMap, header};

/// What the caller declared about an upload.
///
/// Lives for a single request. The body itself travels separately as a stream.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct UploadRequest {
    /// Bucket segment from the request path, if the route has one.
    pub bucket: Option<String>,

    /// Declared `Content-Length`. `None` when absent or unparsable.
    pub content_length: Option<u64>,

    /// Declared `Content-Type`, when present and valid UTF-8.
    pub content_type: Option<String>,
}

impl UploadRequest {
    /// Read the declared length and type from request headers.
    pub fn from_headers(bucket: Option<String>, headers: &HeaderMap) -> Self {
        let content_length = headers
            .get(header::CONTENT_LENGTH)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.trim().parse::<u64>().ok());
        let content_type = headers
            .get(header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .map(|v| v.to_string());

        Self {
            bucket,
            content_length,
            content_type,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn reads_declared_headers() {
        let mut headers = HeaderMap::new();
        headers.insert(header::CONTENT_LENGTH, HeaderValue::from_static("5"));
        headers.insert(header::CONTENT_TYPE, HeaderValue::from_static("text/plain"));

        let req = UploadRequest::from_headers(Some("assets".into()), &headers);
        assert_eq!(req.bucket.as_deref(), Some("assets"));
        assert_eq!(req.content_length, Some(5));
        assert_eq!(req.content_type.as_deref(), Some("text/plain"));
    }

    #[test]
    fn missing_or_bad_headers_are_none() {
        let mut headers = HeaderMap::new();
        headers.insert(header::CONTENT_LENGTH, HeaderValue::from_static("-1"));
        headers.insert(header::CONTENT_TYPE, HeaderValue::from_static(""));

        let req = UploadRequest::from_headers(None, &headers);
        assert_eq!(req, UploadRequest::default());
    }
}
