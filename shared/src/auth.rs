//! Google credential resolution and OAuth2 token exchange.
//!
//! Credentials are looked up through an ordered list of strategies. Each
//! strategy is a plain function from configuration to an optional source;
//! the first source that yields a token wins.

use async_trait::async_trait;
use aws_sdk_secretsmanager::Client as SecretsClient;
use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::{encode, Algorithm, EncodingKey, Header};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use tokio::sync::RwLock;
use tracing::{info, warn};

use crate::config::{Config, CredentialStrategy};
use crate::{secrets, Error, Result};

/// OAuth scopes: write rows, and find spreadsheets by name through Drive.
pub const SCOPES: &[&str] = &[
    "https://www.googleapis.com/auth/spreadsheets",
    "https://www.googleapis.com/auth/drive.readonly",
];

const GOOGLE_TOKEN_URI: &str = "https://oauth2.googleapis.com/token";
const METADATA_TOKEN_URL: &str =
    "http://metadata.google.internal/computeMetadata/v1/instance/service-accounts/default/token";
const JWT_BEARER_GRANT: &str = "urn:ietf:params:oauth:grant-type:jwt-bearer";

/// Tokens are refreshed this long before Google says they expire.
const EXPIRY_MARGIN_SECS: i64 = 60;

/// Google credentials document, as written by the Cloud console or gcloud.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum GoogleCredentials {
    ServiceAccount(ServiceAccountKey),
    AuthorizedUser(AuthorizedUser),
}

/// Service account key file.
#[derive(Clone, Deserialize)]
pub struct ServiceAccountKey {
    pub client_email: String,
    pub private_key: String,
    #[serde(default)]
    pub private_key_id: Option<String>,
    #[serde(default = "default_token_uri")]
    pub token_uri: String,
}

// Keep the private key out of logs.
impl fmt::Debug for ServiceAccountKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServiceAccountKey")
            .field("client_email", &self.client_email)
            .field("private_key_id", &self.private_key_id)
            .field("token_uri", &self.token_uri)
            .finish_non_exhaustive()
    }
}

/// User credentials from `gcloud auth application-default login`.
#[derive(Clone, Deserialize)]
pub struct AuthorizedUser {
    pub client_id: String,
    pub client_secret: String,
    pub refresh_token: String,
}

impl fmt::Debug for AuthorizedUser {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AuthorizedUser")
            .field("client_id", &self.client_id)
            .finish_non_exhaustive()
    }
}

fn default_token_uri() -> String {
    GOOGLE_TOKEN_URI.to_string()
}

impl GoogleCredentials {
    pub fn from_json(text: &str) -> Result<Self> {
        serde_json::from_str(text)
            .map_err(|e| Error::Auth(format!("Invalid credentials document: {}", e)))
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path).map_err(|e| {
            Error::Auth(format!("Failed to read '{}': {}", path.display(), e))
        })?;
        Self::from_json(&text)
    }
}

/// Where a strategy found credentials.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CredentialSource {
    File(PathBuf),
    Secret(String),
    Metadata,
}

impl fmt::Display for CredentialSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CredentialSource::File(path) => write!(f, "file '{}'", path.display()),
            CredentialSource::Secret(arn) => write!(f, "secret '{}'", arn),
            CredentialSource::Metadata => write!(f, "metadata server"),
        }
    }
}

/// `GOOGLE_APPLICATION_CREDENTIALS`, when it points at an existing file.
pub fn explicit_file(config: &Config) -> Option<CredentialSource> {
    config
        .credentials_path
        .as_ref()
        .filter(|path| path.exists())
        .map(|path| CredentialSource::File(path.clone()))
}

/// The conventional local key file, when present.
pub fn default_file(config: &Config) -> Option<CredentialSource> {
    let path = &config.default_credentials_path;
    path.exists().then(|| CredentialSource::File(path.clone()))
}

/// Platform identity. Always available; whether it works is only known once
/// the token request is made.
pub fn ambient(config: &Config) -> Option<CredentialSource> {
    Some(match &config.credentials_secret_arn {
        Some(arn) => CredentialSource::Secret(arn.clone()),
        None => CredentialSource::Metadata,
    })
}

fn strategy_source(strategy: CredentialStrategy) -> fn(&Config) -> Option<CredentialSource> {
    match strategy {
        CredentialStrategy::ExplicitFile => explicit_file,
        CredentialStrategy::DefaultFile => default_file,
        CredentialStrategy::Ambient => ambient,
    }
}

fn unavailable_reason(strategy: CredentialStrategy, config: &Config) -> String {
    match strategy {
        CredentialStrategy::ExplicitFile => match &config.credentials_path {
            Some(path) => format!(
                "GOOGLE_APPLICATION_CREDENTIALS path '{}' does not exist",
                path.display()
            ),
            None => "GOOGLE_APPLICATION_CREDENTIALS is not set".to_string(),
        },
        CredentialStrategy::DefaultFile => format!(
            "'{}' not found",
            config.default_credentials_path.display()
        ),
        CredentialStrategy::Ambient => {
            "GOOGLE_CREDENTIALS_SECRET_ARN is set but no Secrets Manager client is configured"
                .to_string()
        }
    }
}

/// A bearer token for the Google APIs.
#[derive(Debug, Clone)]
pub struct AccessToken {
    pub token: String,
    pub expires_at: DateTime<Utc>,
}

impl AccessToken {
    pub fn is_fresh(&self, now: DateTime<Utc>) -> bool {
        now + Duration::seconds(EXPIRY_MARGIN_SECS) < self.expires_at
    }
}

/// OAuth token endpoint response
#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    expires_in: i64,
}

impl TokenResponse {
    fn into_token(self, now: DateTime<Utc>) -> AccessToken {
        AccessToken {
            token: self.access_token,
            expires_at: now + Duration::seconds(self.expires_in),
        }
    }
}

/// Claims of the self-signed assertion a service account trades for a token.
#[derive(Debug, Serialize)]
struct AssertionClaims<'a> {
    iss: &'a str,
    scope: String,
    aud: &'a str,
    iat: i64,
    exp: i64,
}

/// Anything that can hand the pipeline a bearer token.
#[async_trait]
pub trait TokenSource: Send + Sync {
    async fn access_token(&self) -> Result<AccessToken>;

    /// Forget any cached token, e.g. after the backend rejected it.
    async fn invalidate(&self);
}

/// Resolves credentials and hands out access tokens, caching the last good
/// one until shortly before it expires.
pub struct Authenticator {
    config: Config,
    http_client: reqwest::Client,
    secrets_client: Option<SecretsClient>,
    token_uri: String,
    metadata_url: String,
    cached: RwLock<Option<AccessToken>>,
}

impl Authenticator {
    pub fn new(
        config: Config,
        http_client: reqwest::Client,
        secrets_client: Option<SecretsClient>,
    ) -> Self {
        Self {
            config,
            http_client,
            secrets_client,
            token_uri: GOOGLE_TOKEN_URI.to_string(),
            metadata_url: METADATA_TOKEN_URL.to_string(),
            cached: RwLock::new(None),
        }
    }

    /// Use other endpoints for the refresh-token grant and the metadata
    /// server. Service account keys keep the `token_uri` they carry.
    pub fn with_endpoints(mut self, token_uri: &str, metadata_url: &str) -> Self {
        self.token_uri = token_uri.to_string();
        self.metadata_url = metadata_url.to_string();
        self
    }

    /// A secret source is only usable with a Secrets Manager client.
    fn can_fetch(&self, source: &CredentialSource) -> bool {
        !matches!(source, CredentialSource::Secret(_)) || self.secrets_client.is_some()
    }

    /// Walk the strategy list in order and return the first working token.
    pub async fn resolve(&self) -> Result<AccessToken> {
        let mut attempts = Vec::new();

        for &strategy in &self.config.credential_strategies {
            let source = strategy_source(strategy)(&self.config).filter(|s| self.can_fetch(s));
            let Some(source) = source else {
                attempts.push(format!(
                    "{}: {}",
                    strategy.name(),
                    unavailable_reason(strategy, &self.config)
                ));
                continue;
            };

            match self.fetch(&source).await {
                Ok(token) => {
                    info!(strategy = strategy.name(), source = %source, "Authenticated with Google Sheets");
                    return Ok(token);
                }
                Err(e) => {
                    warn!(strategy = strategy.name(), source = %source, error = %e, "Credential strategy failed");
                    let reason = match e {
                        Error::Auth(reason) => reason,
                        other => other.to_string(),
                    };
                    attempts.push(format!("{} ({}): {}", strategy.name(), source, reason));
                }
            }
        }

        Err(Error::Auth(format!(
            "No usable credentials found. Tried: {}. Place a service account key at '{}', \
             or set GOOGLE_APPLICATION_CREDENTIALS to the key file path, \
             and share the spreadsheet with the service account's email.",
            attempts.join("; "),
            self.config.default_credentials_path.display()
        )))
    }

    async fn fetch(&self, source: &CredentialSource) -> Result<AccessToken> {
        match source {
            CredentialSource::File(path) => {
                let credentials = GoogleCredentials::from_file(path)?;
                self.exchange(&credentials).await
            }
            CredentialSource::Secret(arn) => {
                let client = self.secrets_client.as_ref().ok_or_else(|| {
                    Error::Aws("Secrets Manager client not configured".to_string())
                })?;
                let document = secrets::get_secret(client, arn).await?;
                let result = match GoogleCredentials::from_json(&document) {
                    Ok(credentials) => self.exchange(&credentials).await,
                    Err(e) => Err(e),
                };
                if result.is_err() {
                    secrets::evict(arn).await;
                }
                result
            }
            CredentialSource::Metadata => self.metadata_token().await,
        }
    }

    /// Trade a credentials document for an access token.
    pub async fn exchange(&self, credentials: &GoogleCredentials) -> Result<AccessToken> {
        match credentials {
            GoogleCredentials::ServiceAccount(key) => {
                let assertion = sign_assertion(key, Utc::now())?;
                self.post_token(
                    &key.token_uri,
                    &[("grant_type", JWT_BEARER_GRANT), ("assertion", &assertion)],
                )
                .await
            }
            GoogleCredentials::AuthorizedUser(user) => {
                self.post_token(
                    &self.token_uri,
                    &[
                        ("client_id", user.client_id.as_str()),
                        ("client_secret", user.client_secret.as_str()),
                        ("refresh_token", user.refresh_token.as_str()),
                        ("grant_type", "refresh_token"),
                    ],
                )
                .await
            }
        }
    }

    async fn post_token(&self, token_uri: &str, params: &[(&str, &str)]) -> Result<AccessToken> {
        let response = self
            .http_client
            .post(token_uri)
            .form(params)
            .send()
            .await
            .map_err(|e| Error::Auth(format!("Token request failed: {}", e)))?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().await.unwrap_or_default();
            return Err(Error::Auth(format!(
                "Token exchange failed ({}): {}",
                status, error_text
            )));
        }

        let token: TokenResponse = response
            .json()
            .await
            .map_err(|e| Error::Auth(format!("Failed to parse token response: {}", e)))?;

        Ok(token.into_token(Utc::now()))
    }

    async fn metadata_token(&self) -> Result<AccessToken> {
        let response = self
            .http_client
            .get(&self.metadata_url)
            .query(&[("scopes", SCOPES.join(","))])
            .header("Metadata-Flavor", "Google")
            .timeout(std::time::Duration::from_secs(3))
            .send()
            .await
            .map_err(|e| Error::Auth(format!("Metadata server unreachable: {}", e)))?;

        if !response.status().is_success() {
            return Err(Error::Auth(format!(
                "Metadata server returned {}",
                response.status()
            )));
        }

        let token: TokenResponse = response
            .json()
            .await
            .map_err(|e| Error::Auth(format!("Failed to parse metadata token: {}", e)))?;

        Ok(token.into_token(Utc::now()))
    }
}

#[async_trait]
impl TokenSource for Authenticator {
    /// Get a usable token, resolving credentials again if the cached one is
    /// missing or stale.
    async fn access_token(&self) -> Result<AccessToken> {
        {
            let cached = self.cached.read().await;
            if let Some(token) = cached.as_ref().filter(|t| t.is_fresh(Utc::now())) {
                return Ok(token.clone());
            }
        }

        let token = self.resolve().await?;
        *self.cached.write().await = Some(token.clone());
        Ok(token)
    }

    async fn invalidate(&self) {
        *self.cached.write().await = None;
    }
}

/// Build the RS256-signed JWT a service account presents to the token endpoint.
fn sign_assertion(key: &ServiceAccountKey, now: DateTime<Utc>) -> Result<String> {
    let claims = AssertionClaims {
        iss: &key.client_email,
        scope: SCOPES.join(" "),
        aud: &key.token_uri,
        iat: now.timestamp(),
        exp: (now + Duration::hours(1)).timestamp(),
    };

    let mut header = Header::new(Algorithm::RS256);
    header.kid = key.private_key_id.clone();

    let signing_key = EncodingKey::from_rsa_pem(key.private_key.as_bytes())
        .map_err(|e| Error::Auth(format!("Invalid service account private key: {}", e)))?;

    encode(&header, &claims, &signing_key)
        .map_err(|e| Error::Auth(format!("Failed to sign token assertion: {}", e)))
}
