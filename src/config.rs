use anyhow::{Context, Result, bail};
use clap::{Parser, ValueEnum};
use std::{env, path::PathBuf};

pub const DEFAULT_STORAGE_ENDPOINT: &str = "https://storage.googleapis.com";

/// Centralized application configuration.
/// Combines environment variables and CLI arguments; frozen after startup.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub host: String,
    pub port: u16,
    pub bucket: BucketSource,
    pub credentials: Option<CredentialSource>,
    /// Upper bound on the declared `Content-Length`. `0` disables the check.
    pub max_length: u64,
    pub cache_control: Option<String>,
    pub cors: bool,
    pub infer_extension: bool,
    pub url_style: UrlStyle,
    pub storage_endpoint: String,
    pub public_base_url: String,
    pub dev: bool,
}

/// Where the destination bucket of an upload comes from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BucketSource {
    /// Every upload goes to the configured bucket (`POST /`).
    Fixed(String),
    /// The caller names the bucket (`POST /{bucket}`).
    Path,
}

/// Service-account key material for the storage backend.
#[derive(Clone, PartialEq, Eq)]
pub enum CredentialSource {
    File(PathBuf),
    Json(String),
}

impl std::fmt::Debug for CredentialSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::File(path) => f.debug_tuple("File").field(path).finish(),
            Self::Json(_) => f.write_str("Json(<redacted>)"),
        }
    }
}

/// Which URL is handed back to the caller after a successful upload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum UrlStyle {
    /// `{public_base_url}/{bucket}/{name}`
    Public,
    /// The media link reported by the storage backend.
    MediaLink,
}

/// Command-line + environment configuration.
#[derive(Parser, Debug, Default)]
#[command(author, version, about = "Relays single-file POST uploads to Google Cloud Storage")]
pub struct Args {
    /// Host to bind to (overrides UPLOAD_RELAY_HOST)
    #[arg(long)]
    pub host: Option<String>,

    /// Port to bind to (overrides UPLOAD_RELAY_PORT)
    #[arg(long)]
    pub port: Option<u16>,

    /// Fixed destination bucket (overrides UPLOAD_RELAY_BUCKET)
    #[arg(long)]
    pub bucket: Option<String>,

    /// Take the bucket from the request path instead of --bucket
    #[arg(long)]
    pub bucket_from_path: bool,

    /// Service-account JSON key file (overrides UPLOAD_RELAY_CREDENTIALS)
    #[arg(long)]
    pub credentials: Option<PathBuf>,

    /// Maximum accepted Content-Length in bytes, 0 for unlimited (overrides UPLOAD_RELAY_MAX_LENGTH)
    #[arg(long)]
    pub max_length: Option<u64>,

    /// Cache-Control directive stored with every object (overrides UPLOAD_RELAY_CACHE_CONTROL)
    #[arg(long)]
    pub cache_control: Option<String>,

    /// Allow cross-origin POST from any origin
    #[arg(long)]
    pub cors: bool,

    /// Append a file extension derived from the Content-Type to object names
    #[arg(long)]
    pub infer_extension: bool,

    /// URL returned on success (overrides UPLOAD_RELAY_URL_STYLE)
    #[arg(long, value_enum)]
    pub url_style: Option<UrlStyle>,

    /// Storage JSON API endpoint (overrides UPLOAD_RELAY_STORAGE_ENDPOINT)
    #[arg(long)]
    pub storage_endpoint: Option<String>,

    /// Base of the public object URLs (overrides UPLOAD_RELAY_PUBLIC_BASE_URL)
    #[arg(long)]
    pub public_base_url: Option<String>,

    /// Development mode: credentials optional, debug logging
    #[arg(long)]
    pub dev: bool,
}

impl AppConfig {
    /// Parse environment variables + CLI args into AppConfig.
    pub fn from_env_and_args() -> Result<Self> {
        Self::merge(Args::parse(), |key| env::var(key).ok())
    }

    /// Merge parsed arguments over values found through `lookup`.
    pub fn merge(args: Args, lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let env_port = match lookup("UPLOAD_RELAY_PORT") {
            Some(value) => value
                .parse::<u16>()
                .with_context(|| format!("parsing UPLOAD_RELAY_PORT value `{}`", value))?,
            None => 8080,
        };
        let env_max_length = match lookup("UPLOAD_RELAY_MAX_LENGTH") {
            Some(value) => value
                .parse::<u64>()
                .with_context(|| format!("parsing UPLOAD_RELAY_MAX_LENGTH value `{}`", value))?,
            None => 0,
        };
        let env_url_style = match lookup("UPLOAD_RELAY_URL_STYLE") {
            Some(value) => UrlStyle::from_str(&value, true)
                .map_err(anyhow::Error::msg)
                .with_context(|| format!("parsing UPLOAD_RELAY_URL_STYLE value `{}`", value))?,
            None => UrlStyle::Public,
        };

        let dev = args.dev || env_flag(&lookup, "UPLOAD_RELAY_DEV")?;
        let bucket_from_path =
            args.bucket_from_path || env_flag(&lookup, "UPLOAD_RELAY_BUCKET_FROM_PATH")?;

        let bucket = if bucket_from_path {
            BucketSource::Path
        } else {
            match args
                .bucket
                .or_else(|| lookup("UPLOAD_RELAY_BUCKET"))
                .filter(|name| !name.is_empty())
            {
                Some(name) => BucketSource::Fixed(name),
                None => bail!("a bucket is required unless --bucket-from-path is set"),
            }
        };

        let credentials = args
            .credentials
            .or_else(|| lookup("UPLOAD_RELAY_CREDENTIALS").map(PathBuf::from))
            .map(CredentialSource::File)
            .or_else(|| lookup("UPLOAD_RELAY_CREDENTIALS_JSON").map(CredentialSource::Json))
            .or_else(|| {
                lookup("GOOGLE_APPLICATION_CREDENTIALS")
                    .map(|path| CredentialSource::File(PathBuf::from(path)))
            });
        if credentials.is_none() && !dev {
            bail!("storage credentials are required outside development mode");
        }

        let cfg = Self {
            host: args
                .host
                .or_else(|| lookup("UPLOAD_RELAY_HOST"))
                .unwrap_or_else(|| "0.0.0.0".into()),
            port: args.port.unwrap_or(env_port),
            bucket,
            credentials,
            max_length: args.max_length.unwrap_or(env_max_length),
            cache_control: args
                .cache_control
                .or_else(|| lookup("UPLOAD_RELAY_CACHE_CONTROL"))
                .filter(|value| !value.is_empty()),
            cors: args.cors || env_flag(&lookup, "UPLOAD_RELAY_CORS")?,
            infer_extension: args.infer_extension
                || env_flag(&lookup, "UPLOAD_RELAY_INFER_EXTENSION")?,
            url_style: args.url_style.unwrap_or(env_url_style),
            storage_endpoint: trim_base(
                args.storage_endpoint
                    .or_else(|| lookup("UPLOAD_RELAY_STORAGE_ENDPOINT"))
                    .unwrap_or_else(|| DEFAULT_STORAGE_ENDPOINT.into()),
            ),
            public_base_url: trim_base(
                args.public_base_url
                    .or_else(|| lookup("UPLOAD_RELAY_PUBLIC_BASE_URL"))
                    .unwrap_or_else(|| DEFAULT_STORAGE_ENDPOINT.into()),
            ),
            dev,
        };

        Ok(cfg)
    }

    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

fn env_flag(lookup: &impl Fn(&str) -> Option<String>, key: &str) -> Result<bool> {
    match lookup(key) {
        None => Ok(false),
        Some(value) => match value.to_ascii_lowercase().as_str() {
            "1" | "true" | "yes" | "on" => Ok(true),
            "" | "0" | "false" | "no" | "off" => Ok(false),
            _ => bail!("parsing {} value `{}`: expected a boolean", key, value),
        },
    }
}

fn trim_base(url: String) -> String {
    url.trim_end_matches('/').to_string()
}
