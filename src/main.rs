use anyhow::{Context, Result, bail};
use std::{io::ErrorKind, sync::Arc, time::Duration};
use tokio::{net::TcpListener, signal};
use tracing_subscriber::EnvFilter;

mod config;
mod errors;
mod handlers;
mod models;
mod routes;
mod services;
#[cfg(test)]
mod test_support;

use config::BucketSource;
use services::{
    credentials::TokenSource,
    storage_backend::GcsClient,
    upload_events::TracingObserver,
    upload_service::{UploadService, UploadSettings, is_valid_bucket_name},
};

#[tokio::main]
async fn main() -> Result<()> {
    // --- Parse config ---
    let cfg = config::AppConfig::from_env_and_args()?;

    // --- Logging setup ---
    let default_filter = if cfg.dev { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter)),
        )
        .init();

    tracing::info!("Starting upload-relay with config: {:?}", cfg);

    if let BucketSource::Fixed(name) = &cfg.bucket {
        if !is_valid_bucket_name(name) {
            bail!("configured bucket `{}` is not a valid bucket name", name);
        }
    }

    // --- Storage client, shared read-only by every request ---
    let http = reqwest::Client::builder()
        .user_agent(concat!("upload-relay/", env!("CARGO_PKG_VERSION")))
        .connect_timeout(Duration::from_secs(10))
        .build()
        .context("building HTTP client")?;
    let tokens = TokenSource::from_config(cfg.credentials.as_ref(), http.clone())
        .context("loading storage credentials")?;
    match &tokens {
        TokenSource::ServiceAccount(source) => {
            tracing::info!("Authenticating as {}", source.client_email())
        }
        TokenSource::Anonymous => {
            tracing::warn!("No storage credentials configured; sending anonymous requests")
        }
    }
    let store = GcsClient::new(&cfg.storage_endpoint, tokens, http)?;

    let service = UploadService::new(
        Arc::new(store),
        Arc::new(TracingObserver),
        UploadSettings::from(&cfg),
    );

    // --- Build router ---
    let app = routes::routes::app(service, cfg.cors);

    // --- Start server ---
    let addr = cfg.addr();
    let listener = match TcpListener::bind(&addr).await {
        Ok(listener) => listener,
        Err(err)
            if err.kind() == ErrorKind::PermissionDenied
                && matches!(cfg.host.as_str(), "0.0.0.0" | "::") =>
        {
            let fallback_addr = format!("127.0.0.1:{}", cfg.port);
            tracing::warn!(
                "Permission denied binding to {} ({}). Falling back to {}",
                addr,
                err,
                fallback_addr
            );
            TcpListener::bind(&fallback_addr).await?
        }
        Err(err) => return Err(err.into()),
    };

    tracing::info!("Server listening on http://{}", listener.local_addr()?);
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("Server stopped");
    Ok(())
}

/// Resolve on Ctrl-C or SIGTERM so in-flight uploads can finish.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = signal::ctrl_c().await {
            tracing::error!("failed to listen for Ctrl-C: {}", err);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(err) => {
                tracing::error!("failed to listen for SIGTERM: {}", err);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    tracing::info!("Shutdown signal received, draining in-flight uploads");
}
