use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::{DateTime, Duration, Utc};
use drivewatch_core::backend::Backend;
use drivewatch_core::backend::local::LocalBackend;
use drivewatch_core::store::split_path;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

const GOOGLE_AUTH_URI: &str = "https://accounts.google.com/o/oauth2/v2/auth";
const GOOGLE_TOKEN_URI: &str = "https://oauth2.googleapis.com/token";

/// Tokens are treated as expired this long before their actual expiry.
const EXPIRY_SKEW_SECS: i64 = 60;

/// OAuth client registration.
#[derive(Debug, Clone, Deserialize)]
pub struct OAuthClient {
    pub client_id: String,
    pub client_secret: String,
    #[serde(default = "default_auth_uri")]
    pub auth_uri: String,
    #[serde(default = "default_token_uri")]
    pub token_uri: String,
    #[serde(default)]
    pub redirect_uris: Vec<String>,
}

fn default_auth_uri() -> String {
    GOOGLE_AUTH_URI.to_string()
}

fn default_token_uri() -> String {
    GOOGLE_TOKEN_URI.to_string()
}

#[derive(Deserialize)]
struct ClientSecretFile {
    installed: Option<OAuthClient>,
    web: Option<OAuthClient>,
}

impl OAuthClient {
    pub fn new(client_id: impl Into<String>, client_secret: impl Into<String>) -> Self {
        Self {
            client_id: client_id.into(),
            client_secret: client_secret.into(),
            auth_uri: default_auth_uri(),
            token_uri: default_token_uri(),
            redirect_uris: Vec::new(),
        }
    }

    /// Parse a client secret JSON as downloaded from the Google Cloud
    /// console (`installed` or `web` application).
    pub fn from_json(data: &str) -> Result<Self> {
        let file: ClientSecretFile =
            serde_json::from_str(data).context("invalid client secret file")?;
        file.installed
            .or(file.web)
            .context("client secret file has neither an `installed` nor a `web` section")
    }

    pub fn from_secret_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let data = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read client secret file {}", path.display()))?;
        Self::from_json(&data)
    }
}

/// Access and refresh token pair.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credential {
    pub access_token: String,
    pub refresh_token: String,
    pub expiry: DateTime<Utc>,
}

impl Credential {
    pub fn new(access_token: String, refresh_token: String, expires_in_secs: i64) -> Self {
        Self {
            access_token,
            refresh_token,
            expiry: Utc::now() + Duration::seconds(expires_in_secs),
        }
    }

    pub fn is_usable(&self) -> bool {
        self.expiry > Utc::now() + Duration::seconds(EXPIRY_SKEW_SECS)
    }
}

/// Persists the single credential record.
#[derive(Clone)]
pub struct CredentialStore {
    backend: Arc<dyn Backend>,
    key: String,
}

impl CredentialStore {
    pub fn new(backend: Arc<dyn Backend>, key: impl Into<String>) -> Self {
        Self {
            backend,
            key: key.into(),
        }
    }

    pub fn at_path(path: impl AsRef<Path>) -> Result<Self> {
        let (root, key) = split_path(path.as_ref())?;
        Ok(Self::new(Arc::new(LocalBackend::new(root)), key))
    }

    /// The stored credential. A corrupt record is deleted and treated as
    /// absent.
    pub async fn load(&self) -> Result<Option<Credential>> {
        if !self.backend.exists(&self.key).await? {
            debug!(path = %self.key, "no stored credential");
            return Ok(None);
        }
        let data = self.backend.read(&self.key).await?;
        match serde_json::from_slice(&data) {
            Ok(credential) => Ok(Some(credential)),
            Err(err) => {
                warn!(path = %self.key, error = %err, "stored credential is corrupt, discarding");
                self.clear().await?;
                Ok(None)
            }
        }
    }

    pub async fn save(&self, credential: &Credential) -> Result<()> {
        let data = serde_json::to_vec_pretty(credential)?;
        self.backend
            .write(&self.key, &data)
            .await
            .with_context(|| format!("failed to save credential to {}", self.key))
    }

    pub async fn clear(&self) -> Result<()> {
        self.backend.delete(&self.key).await
    }
}
