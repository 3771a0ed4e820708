//! HTTP handlers for uploads.
//! Streams request bodies without buffering them in memory and delegates
//! validation and storage to `UploadService`.

use crate::{
    errors::AppError,
    models::upload::UploadRequest,
    services::{storage_backend::ByteStream, upload_service::UploadService},
};
use axum::{
    body::Body,
    extract::{Path, State},
    http::{HeaderMap, header},
    response::IntoResponse,
};
use futures::StreamExt;
use std::io;

/// `POST /`: upload into the configured bucket.
///
/// When buckets come from the path this route exists only to reject the
/// request as "invalid bucket".
pub async fn upload_root(
    State(service): State<UploadService>,
    headers: HeaderMap,
    body: Body,
) -> Result<impl IntoResponse, AppError> {
    relay(service, UploadRequest::from_headers(None, &headers), body).await
}

/// `POST /{bucket}`: upload into the bucket named by the path.
pub async fn upload_to_bucket(
    State(service): State<UploadService>,
    Path(bucket): Path<String>,
    headers: HeaderMap,
    body: Body,
) -> Result<impl IntoResponse, AppError> {
    relay(service, UploadRequest::from_headers(Some(bucket), &headers), body).await
}

async fn relay(
    service: UploadService,
    request: UploadRequest,
    body: Body,
) -> Result<impl IntoResponse, AppError> {
    let url = service.upload(request, into_byte_stream(body)).await?;
    Ok(([(header::CONTENT_TYPE, "text/plain")], url))
}

fn into_byte_stream(body: Body) -> ByteStream {
    body.into_data_stream()
        .map(|chunk| chunk.map_err(io::Error::other))
        .boxed()
}
