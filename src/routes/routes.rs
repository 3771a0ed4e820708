//! Defines the HTTP surface of the relay.
//!
//! ## Structure
//! - `POST /`         : upload into the configured bucket
//! - `POST /{bucket}` : upload into the named bucket (bucket-from-path mode;
//!   `POST /` is then rejected as "invalid bucket")
//! - `GET  /healthz`  : liveness
//! - `GET  /readyz`   : readiness (storage credentials usable)
//!
//! Any other method on an upload path answers 405.

use crate::{
    config::BucketSource,
    handlers::{
        health_handlers::{healthz, readyz},
        upload_handlers::{upload_root, upload_to_bucket},
    },
    services::upload_service::UploadService,
};
use axum::{
    Router,
    http::{HeaderName, Method, header},
    routing::{get, post},
};
use tower_http::{
    catch_panic::CatchPanicLayer,
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

/// Build the router for the given bucket mode.
///
/// The router carries shared state (`UploadService`) to all handlers.
pub fn routes(bucket: &BucketSource) -> Router<UploadService> {
    let router = Router::new()
        // health endpoints (mounted at root)
        .route("/healthz", get(healthz))
        .route("/readyz", get(readyz))
        .route("/", post(upload_root));

    match bucket {
        BucketSource::Path => router.route("/{bucket}", post(upload_to_bucket)),
        BucketSource::Fixed(_) => router,
    }
}

/// Full application: routes, panic recovery, access logging and optional CORS.
pub fn app(service: UploadService, cors: bool) -> Router {
    let mut router = routes(&service.settings().bucket)
        .layer(CatchPanicLayer::new())
        .layer(TraceLayer::new_for_http());
    if cors {
        router = router.layer(cors_layer());
    }
    router.with_state(service)
}

/// Any origin, `POST` only, no credentialed requests, simple headers.
fn cors_layer() -> CorsLayer {
    CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::POST])
        .allow_headers([
            header::ACCEPT,
            header::CONTENT_TYPE,
            HeaderName::from_static("x-requested-with"),
        ])
}
