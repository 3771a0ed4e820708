//! Service-account credentials for the storage backend.
//!
//! The key is parsed once at startup; a malformed key is fatal. Bearer tokens
//! are obtained through the OAuth 2.0 JWT-bearer grant and cached until they
//! are about to expire. A failed exchange is reported per request.
//!
//! The cache lock is never held across an exchange, and every exchange is
//! bounded by a timeout.

use crate::config::CredentialSource;
use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::{Algorithm, EncodingKey, Header};
use serde::{Deserialize, Serialize};
use std::{fmt, io, path::PathBuf, time::Duration as StdDuration};
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::debug;

/// OAuth scope granting object read/write on Cloud Storage.
pub const STORAGE_READ_WRITE_SCOPE: &str = "https://www.googleapis.com/auth/devstorage.read_write";

const DEFAULT_TOKEN_URI: &str = "https://oauth2.googleapis.com/token";
const JWT_BEARER_GRANT: &str = "urn:ietf:params:oauth:grant-type:jwt-bearer";
const ASSERTION_LIFETIME_SECS: i64 = 3600;
/// Tokens closer than this to expiry are refreshed before use.
const REFRESH_MARGIN_SECS: i64 = 60;
const DEFAULT_EXCHANGE_TIMEOUT: StdDuration = StdDuration::from_secs(30);

#[derive(Debug, Error)]
pub enum CredentialsError {
    #[error("reading credentials file `{path}`: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("parsing service-account key: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("credentials of type `{0}` are not a service-account key")]
    UnsupportedType(String),
    #[error("invalid service-account private key: {0}")]
    InvalidKey(#[source] jsonwebtoken::errors::Error),
    #[error("signing token assertion: {0}")]
    Sign(#[source] jsonwebtoken::errors::Error),
    #[error("token exchange failed: {0}")]
    Exchange(#[from] reqwest::Error),
    #[error("token endpoint rejected the assertion ({status}): {message}")]
    Rejected { status: u16, message: String },
}

pub type CredentialsResult<T> = Result<T, CredentialsError>;

/// The subset of a Google service-account JSON key this service needs.
#[derive(Deserialize, Clone)]
pub struct ServiceAccountKey {
    #[serde(rename = "type")]
    pub key_type: String,
    pub client_email: String,
    pub private_key: String,
    #[serde(default)]
    pub private_key_id: Option<String>,
    #[serde(default = "default_token_uri")]
    pub token_uri: String,
}

fn default_token_uri() -> String {
    DEFAULT_TOKEN_URI.to_string()
}

impl fmt::Debug for ServiceAccountKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServiceAccountKey")
            .field("client_email", &self.client_email)
            .field("private_key_id", &self.private_key_id)
            .field("token_uri", &self.token_uri)
            .finish_non_exhaustive()
    }
}

impl ServiceAccountKey {
    pub fn from_json(json: &str) -> CredentialsResult<Self> {
        let key: Self = serde_json::from_str(json)?;
        if key.key_type != "service_account" {
            return Err(CredentialsError::UnsupportedType(key.key_type));
        }
        Ok(key)
    }

    pub fn load(source: &CredentialSource) -> CredentialsResult<Self> {
        match source {
            CredentialSource::Json(json) => Self::from_json(json),
            CredentialSource::File(path) => {
                let json =
                    std::fs::read_to_string(path).map_err(|source| CredentialsError::Read {
                        path: path.clone(),
                        source,
                    })?;
                Self::from_json(&json)
            }
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone)]
struct AssertionClaims {
    iss: String,
    scope: String,
    aud: String,
    iat: i64,
    exp: i64,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    expires_in: Option<i64>,
}

#[derive(Clone, Debug)]
struct AccessToken {
    value: String,
    expires_at: DateTime<Utc>,
}

impl AccessToken {
    fn is_fresh(&self, now: DateTime<Utc>) -> bool {
        self.expires_at - Duration::seconds(REFRESH_MARGIN_SECS) > now
    }
}

/// Exchanges signed service-account assertions for bearer tokens.
pub struct ServiceAccountTokenSource {
    client_email: String,
    key_id: Option<String>,
    token_uri: String,
    scope: String,
    encoding_key: EncodingKey,
    http: reqwest::Client,
    exchange_timeout: StdDuration,
    cached: Mutex<Option<AccessToken>>,
}

impl ServiceAccountTokenSource {
    pub fn new(key: ServiceAccountKey, http: reqwest::Client) -> CredentialsResult<Self> {
        let encoding_key = EncodingKey::from_rsa_pem(key.private_key.as_bytes())
            .map_err(CredentialsError::InvalidKey)?;
        Ok(Self {
            client_email: key.client_email,
            key_id: key.private_key_id,
            token_uri: key.token_uri,
            scope: STORAGE_READ_WRITE_SCOPE.to_string(),
            encoding_key,
            http,
            exchange_timeout: DEFAULT_EXCHANGE_TIMEOUT,
            cached: Mutex::new(None),
        })
    }

    /// Upper bound on a single token exchange, connect to last byte.
    pub fn with_exchange_timeout(mut self, timeout: StdDuration) -> Self {
        self.exchange_timeout = timeout;
        self
    }

    pub fn client_email(&self) -> &str {
        &self.client_email
    }

    /// Return a valid bearer token, exchanging a new assertion when needed.
    ///
    /// Concurrent callers that all find the cache stale each run their own
    /// exchange; the latest-expiring token wins the cache.
    pub async fn token(&self) -> CredentialsResult<String> {
        if let Some(token) = self.cached_token().await {
            return Ok(token);
        }

        let token = self.exchange().await?;
        let value = token.value.clone();
        let mut cached = self.cached.lock().await;
        if cached
            .as_ref()
            .is_none_or(|current| current.expires_at < token.expires_at)
        {
            *cached = Some(token);
        }
        Ok(value)
    }

    async fn cached_token(&self) -> Option<String> {
        let cached = self.cached.lock().await;
        cached
            .as_ref()
            .filter(|t| t.is_fresh(Utc::now()))
            .map(|t| t.value.clone())
    }

    fn sign_assertion(&self, now: DateTime<Utc>) -> CredentialsResult<String> {
        let iat = now.timestamp();
        let claims = AssertionClaims {
            iss: self.client_email.clone(),
            scope: self.scope.clone(),
            aud: self.token_uri.clone(),
            iat,
            exp: iat + ASSERTION_LIFETIME_SECS,
        };
        let mut header = Header::new(Algorithm::RS256);
        header.kid = self.key_id.clone();
        jsonwebtoken::encode(&header, &claims, &self.encoding_key).map_err(CredentialsError::Sign)
    }

    async fn exchange(&self) -> CredentialsResult<AccessToken> {
        let now = Utc::now();
        let assertion = self.sign_assertion(now)?;
        debug!(token_uri = %self.token_uri, "exchanging service-account assertion");

        let response = self
            .http
            .post(&self.token_uri)
            .timeout(self.exchange_timeout)
            .form(&[("grant_type", JWT_BEARER_GRANT), ("assertion", assertion.as_str())])
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(CredentialsError::Rejected {
                status: status.as_u16(),
                message: response.text().await.unwrap_or_default(),
            });
        }

        let body: TokenResponse = response.json().await?;
        let lifetime = body.expires_in.unwrap_or(ASSERTION_LIFETIME_SECS);
        Ok(AccessToken {
            value: body.access_token,
            expires_at: now + Duration::seconds(lifetime),
        })
    }
}

/// How requests to the storage backend are authorized.
pub enum TokenSource {
    /// No `Authorization` header; for storage emulators in development mode.
    Anonymous,
    ServiceAccount(ServiceAccountTokenSource),
}

impl TokenSource {
    /// Build the token source from configured key material, if any.
    pub fn from_config(
        source: Option<&CredentialSource>,
        http: reqwest::Client,
    ) -> CredentialsResult<Self> {
        match source {
            None => Ok(Self::Anonymous),
            Some(source) => {
                let key = ServiceAccountKey::load(source)?;
                Ok(Self::ServiceAccount(ServiceAccountTokenSource::new(
                    key, http,
                )?))
            }
        }
    }

    /// Bearer token for the next request, or `None` when anonymous.
    pub async fn token(&self) -> CredentialsResult<Option<String>> {
        match self {
            Self::Anonymous => Ok(None),
            Self::ServiceAccount(source) => source.token().await.map(Some),
        }
    }
}
