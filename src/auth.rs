//! OAuth2 access tokens for the Google APIs the pipeline talks to.
//!
//! Three sources implement [`TokenSource`]:
//!
//! - [`ServiceAccountTokenSource`]: signs an RS256 JWT grant with a
//!   service-account key file and exchanges it at the key's `token_uri`.
//! - [`MetadataServerTokenSource`]: asks the instance metadata server, which
//!   is how a deployed function gets its identity.
//! - [`StaticTokenSource`]: a fixed token for tests and local debugging.
//!
//! Tokens are cached until [`EXPIRY_MARGIN_SECS`] before they expire.

use crate::error::TallyError;
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::{Algorithm, EncodingKey, Header};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info};

/// Scopes requested for Storage reads, Realtime Database writes and Sheets appends.
pub const DEFAULT_SCOPES: &[&str] = &[
    "https://www.googleapis.com/auth/spreadsheets",
    "https://www.googleapis.com/auth/devstorage.read_only",
    "https://www.googleapis.com/auth/firebase.database",
    "https://www.googleapis.com/auth/userinfo.email",
];

/// A cached token is refreshed this many seconds before it expires.
pub const EXPIRY_MARGIN_SECS: i64 = 60;

const DEFAULT_TOKEN_URI: &str = "https://oauth2.googleapis.com/token";
const METADATA_TOKEN_URL: &str =
    "http://metadata.google.internal/computeMetadata/v1/instance/service-accounts/default/token";
const JWT_BEARER_GRANT: &str = "urn:ietf:params:oauth:grant-type:jwt-bearer";

/// Something that can hand out a bearer token.
#[async_trait]
pub trait TokenSource: Send + Sync {
    async fn access_token(&self) -> Result<String, TallyError>;
}

// ── Token cache ──────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
struct CachedToken {
    token: String,
    expires_at: DateTime<Utc>,
}

impl CachedToken {
    fn is_fresh(&self, now: DateTime<Utc>) -> bool {
        self.expires_at - Duration::seconds(EXPIRY_MARGIN_SECS) > now
    }
}

/// Reply shape shared by the OAuth token endpoint and the metadata server.
#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default = "default_expires_in")]
    expires_in: i64,
}

fn default_expires_in() -> i64 {
    3600
}

impl TokenResponse {
    fn into_cached(self, now: DateTime<Utc>) -> CachedToken {
        CachedToken {
            token: self.access_token,
            expires_at: now + Duration::seconds(self.expires_in),
        }
    }
}

async fn read_token_response(resp: reqwest::Response) -> Result<TokenResponse, TallyError> {
    let status = resp.status();
    if !status.is_success() {
        let body = resp.text().await.unwrap_or_default();
        return Err(TallyError::Auth(format!("token endpoint returned HTTP {status}: {body}")));
    }
    resp.json::<TokenResponse>()
        .await
        .map_err(|e| TallyError::Auth(format!("unreadable token response: {e}")))
}

// ── Service account ──────────────────────────────────────────────────────

/// The fields of a service-account JSON key that the grant needs.
#[derive(Debug, Clone, Deserialize)]
pub struct ServiceAccountKey {
    pub client_email: String,
    pub private_key: String,
    #[serde(default = "default_token_uri")]
    pub token_uri: String,
    #[serde(default)]
    pub project_id: Option<String>,
}

fn default_token_uri() -> String {
    DEFAULT_TOKEN_URI.to_string()
}

impl ServiceAccountKey {
    pub fn from_json(json: &str) -> Result<Self, TallyError> {
        serde_json::from_str(json)
            .map_err(|e| TallyError::Auth(format!("invalid service account key: {e}")))
    }

    pub fn from_file(path: &Path) -> Result<Self, TallyError> {
        let json = std::fs::read_to_string(path).map_err(|e| {
            TallyError::Auth(format!("cannot read key file '{}': {e}", path.display()))
        })?;
        Self::from_json(&json)
    }
}

#[derive(Debug, Serialize)]
struct GrantClaims<'a> {
    iss: &'a str,
    scope: String,
    aud: &'a str,
    iat: i64,
    exp: i64,
}

/// JWT-bearer grant flow for a service-account key.
pub struct ServiceAccountTokenSource {
    key: ServiceAccountKey,
    scopes: Vec<String>,
    client: reqwest::Client,
    cache: Mutex<Option<CachedToken>>,
}

impl ServiceAccountTokenSource {
    pub fn new(key: ServiceAccountKey) -> Self {
        Self {
            key,
            scopes: DEFAULT_SCOPES.iter().map(|s| s.to_string()).collect(),
            client: reqwest::Client::new(),
            cache: Mutex::new(None),
        }
    }

    pub fn from_file(path: &Path) -> Result<Self, TallyError> {
        Ok(Self::new(ServiceAccountKey::from_file(path)?))
    }

    pub fn with_scopes<I, S>(mut self, scopes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.scopes = scopes.into_iter().map(Into::into).collect();
        self
    }

    pub fn client_email(&self) -> &str {
        &self.key.client_email
    }

    /// Signed assertion valid for one hour from `now`.
    fn sign_grant(&self, now: DateTime<Utc>) -> Result<String, TallyError> {
        let claims = GrantClaims {
            iss: &self.key.client_email,
            scope: self.scopes.join(" "),
            aud: &self.key.token_uri,
            iat: now.timestamp(),
            exp: (now + Duration::hours(1)).timestamp(),
        };
        let key = EncodingKey::from_rsa_pem(self.key.private_key.as_bytes())
            .map_err(|e| TallyError::Auth(format!("invalid private key: {e}")))?;
        jsonwebtoken::encode(&Header::new(Algorithm::RS256), &claims, &key)
            .map_err(|e| TallyError::Auth(format!("failed to sign grant: {e}")))
    }

    async fn fetch(&self, now: DateTime<Utc>) -> Result<CachedToken, TallyError> {
        let assertion = self.sign_grant(now)?;
        let resp = self
            .client
            .post(&self.key.token_uri)
            .form(&[("grant_type", JWT_BEARER_GRANT), ("assertion", assertion.as_str())])
            .send()
            .await
            .map_err(|e| TallyError::Auth(format!("token request failed: {e}")))?;
        Ok(read_token_response(resp).await?.into_cached(now))
    }
}

#[async_trait]
impl TokenSource for ServiceAccountTokenSource {
    async fn access_token(&self) -> Result<String, TallyError> {
        let mut cache = self.cache.lock().await;
        let now = Utc::now();
        if let Some(cached) = cache.as_ref().filter(|c| c.is_fresh(now)) {
            return Ok(cached.token.clone());
        }
        debug!("Requesting access token for {}", self.key.client_email);
        let fresh = self.fetch(now).await?;
        let token = fresh.token.clone();
        *cache = Some(fresh);
        Ok(token)
    }
}

// ── Metadata server ──────────────────────────────────────────────────────

/// Default credentials of the runtime the function is deployed on.
pub struct MetadataServerTokenSource {
    client: reqwest::Client,
    url: String,
    cache: Mutex<Option<CachedToken>>,
}

impl MetadataServerTokenSource {
    pub fn new() -> Self {
        Self {
            client: reqwest::Client::new(),
            url: METADATA_TOKEN_URL.to_string(),
            cache: Mutex::new(None),
        }
    }
}

impl Default for MetadataServerTokenSource {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl TokenSource for MetadataServerTokenSource {
    async fn access_token(&self) -> Result<String, TallyError> {
        let mut cache = self.cache.lock().await;
        let now = Utc::now();
        if let Some(cached) = cache.as_ref().filter(|c| c.is_fresh(now)) {
            return Ok(cached.token.clone());
        }
        let resp = self
            .client
            .get(&self.url)
            .header("Metadata-Flavor", "Google")
            .send()
            .await
            .map_err(|e| TallyError::Auth(format!("metadata server unreachable: {e}")))?;
        let fresh = read_token_response(resp).await?.into_cached(now);
        let token = fresh.token.clone();
        *cache = Some(fresh);
        Ok(token)
    }
}

// ── Static ───────────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct StaticTokenSource(String);

impl StaticTokenSource {
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }
}

#[async_trait]
impl TokenSource for StaticTokenSource {
    async fn access_token(&self) -> Result<String, TallyError> {
        Ok(self.0.clone())
    }
}

/// Key file from the argument, `BYLINE_SERVICE_ACCOUNT` or
/// `GOOGLE_APPLICATION_CREDENTIALS`, else the metadata server.
pub fn default_token_source(key_file: Option<&Path>) -> Result<Arc<dyn TokenSource>, TallyError> {
    let from_env = || {
        ["BYLINE_SERVICE_ACCOUNT", "GOOGLE_APPLICATION_CREDENTIALS"]
            .iter()
            .filter_map(|var| std::env::var_os(var))
            .find(|v| !v.is_empty())
            .map(PathBuf::from)
    };
    match key_file.map(Path::to_path_buf).or_else(from_env) {
        Some(path) => {
            let source = ServiceAccountTokenSource::from_file(&path)?;
            info!("Using service account {}", source.client_email());
            Ok(Arc::new(source))
        }
        None => {
            info!("No service account key configured, using the metadata server");
            Ok(Arc::new(MetadataServerTokenSource::new()))
        }
    }
}
