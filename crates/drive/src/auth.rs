use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use rand::Rng;
use rand::distributions::Alphanumeric;
use reqwest::Url;
use serde::Deserialize;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{Mutex, RwLock};
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

use crate::credential::{Credential, CredentialStore, OAuthClient};
use crate::error::AuthError;

pub const DRIVE_READONLY_SCOPE: &str = "https://www.googleapis.com/auth/drive.readonly";
pub const DEFAULT_REDIRECT_URI: &str = "http://localhost:3000/oauth2callback";

const MAX_CALLBACK_REQUEST: usize = 16 * 1024;
const REQUEST_READ_TIMEOUT: Duration = Duration::from_secs(10);

/// Called with the authorization URL the operator has to open.
pub type UrlPrompt = Arc<dyn Fn(&Url) + Send + Sync>;

#[derive(Debug, Clone)]
pub struct AuthSettings {
    /// Must match a redirect URI registered for the client. The listener
    /// binds to its port on the loopback interface.
    pub redirect_uri: String,
    pub scope: String,
    /// How long to wait for the operator to complete authorization.
    pub authorization_timeout: Duration,
    pub request_timeout: Duration,
}

impl Default for AuthSettings {
    fn default() -> Self {
        Self {
            redirect_uri: DEFAULT_REDIRECT_URI.to_string(),
            scope: DRIVE_READONLY_SCOPE.to_string(),
            authorization_timeout: Duration::from_secs(600),
            request_timeout: Duration::from_secs(30),
        }
    }
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    expires_in: i64,
    refresh_token: Option<String>,
}

/// Hands out bearer tokens, refreshing or re-authorizing as needed.
#[derive(Clone)]
pub struct TokenManager {
    client: Arc<OAuthClient>,
    settings: Arc<AuthSettings>,
    http: reqwest::Client,
    store: CredentialStore,
    cache: Arc<RwLock<Option<Credential>>>,
    renewing: Arc<Mutex<()>>,
    prompt: UrlPrompt,
}

impl TokenManager {
    /// Load the stored credential, if any. No network access.
    pub async fn open(
        client: OAuthClient,
        settings: AuthSettings,
        store: CredentialStore,
    ) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(settings.request_timeout)
            .build()
            .context("failed to build HTTP client")?;
        let credential = store.load().await?;
        Ok(Self {
            client: Arc::new(client),
            settings: Arc::new(settings),
            http,
            store,
            cache: Arc::new(RwLock::new(credential)),
            renewing: Arc::new(Mutex::new(())),
            prompt: Arc::new(|url: &Url| {
                info!("authorization required");
                eprintln!("\nAuthorize this app by visiting:\n\n  {url}\n");
            }),
        })
    }

    pub fn with_prompt(mut self, prompt: UrlPrompt) -> Self {
        self.prompt = prompt;
        self
    }

    pub async fn has_credential(&self) -> bool {
        self.cache.read().await.is_some()
    }

    /// A token valid for at least another minute.
    ///
    /// An expired token is refreshed silently. If the refresh token is
    /// rejected, or no credential exists, the stored credential is dropped
    /// and the interactive flow runs.
    pub async fn get_valid_token(&self) -> Result<String, AuthError> {
        if let Some(token) = self.cached_token().await {
            return Ok(token);
        }

        let _renewing = self.renewing.lock().await;
        // Another caller may have renewed while we waited.
        if let Some(token) = self.cached_token().await {
            return Ok(token);
        }

        let current = self.cache.read().await.clone();
        if let Some(credential) = current {
            match self.refresh(&credential.refresh_token).await {
                Ok(fresh) => {
                    debug!(expiry = %fresh.expiry, "access token refreshed");
                    let token = fresh.access_token.clone();
                    self.replace(fresh).await?;
                    return Ok(token);
                }
                Err(err @ AuthError::RefreshRejected { .. }) => {
                    warn!(error = %err, "stored credential no longer valid, re-authorizing");
                    self.discard().await?;
                }
                Err(err) => return Err(err),
            }
        } else {
            info!("no stored credential");
        }

        Ok(self.run_authorization().await?.access_token)
    }

    /// Run the interactive flow unconditionally, replacing any stored
    /// credential on success.
    pub async fn authorize(&self) -> Result<Credential, AuthError> {
        let _renewing = self.renewing.lock().await;
        self.run_authorization().await
    }

    async fn cached_token(&self) -> Option<String> {
        self.cache
            .read()
            .await
            .as_ref()
            .filter(|credential| credential.is_usable())
            .map(|credential| credential.access_token.clone())
    }

    async fn replace(&self, credential: Credential) -> Result<(), AuthError> {
        self.store.save(&credential).await.map_err(AuthError::Store)?;
        *self.cache.write().await = Some(credential);
        Ok(())
    }

    async fn discard(&self) -> Result<(), AuthError> {
        *self.cache.write().await = None;
        self.store.clear().await.map_err(AuthError::Store)
    }

    async fn refresh(&self, refresh_token: &str) -> Result<Credential, AuthError> {
        let resp = self
            .http
            .post(&self.client.token_uri)
            .form(&[
                ("client_id", self.client.client_id.as_str()),
                ("client_secret", self.client.client_secret.as_str()),
                ("refresh_token", refresh_token),
                ("grant_type", "refresh_token"),
            ])
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(
                if status == reqwest::StatusCode::BAD_REQUEST
                    || status == reqwest::StatusCode::UNAUTHORIZED
                {
                    AuthError::RefreshRejected {
                        status: status.as_u16(),
                        body,
                    }
                } else {
                    AuthError::TokenEndpoint {
                        status: status.as_u16(),
                        body,
                    }
                },
            );
        }

        let token: TokenResponse = resp.json().await?;
        Ok(Credential::new(
            token.access_token,
            token
                .refresh_token
                .unwrap_or_else(|| refresh_token.to_string()),
            token.expires_in,
        ))
    }

    async fn run_authorization(&self) -> Result<Credential, AuthError> {
        let redirect = Url::parse(&self.settings.redirect_uri).map_err(|e| {
            AuthError::RedirectUri {
                uri: self.settings.redirect_uri.clone(),
                reason: e.to_string(),
            }
        })?;
        let port = redirect
            .port_or_known_default()
            .ok_or_else(|| AuthError::RedirectUri {
                uri: self.settings.redirect_uri.clone(),
                reason: "no port".to_string(),
            })?;
        let addr = SocketAddr::from(([127, 0, 0, 1], port));

        let listener = TcpListener::bind(addr)
            .await
            .map_err(|source| AuthError::Bind {
                addr: addr.to_string(),
                source,
            })?;
        info!(%addr, "authorization listener started");

        let state = random_state();
        let auth_url = self.authorization_url(&state)?;
        (self.prompt)(&auth_url);

        let waited = tokio::time::timeout(
            self.settings.authorization_timeout,
            wait_for_code(&listener, redirect.path(), &state),
        )
        .await;
        drop(listener);
        debug!("authorization listener closed");
        let code = waited.map_err(|_| AuthError::Timeout(self.settings.authorization_timeout))??;

        let credential = self.exchange_code(&code).await?;
        self.replace(credential.clone()).await?;
        info!("authorization complete");
        Ok(credential)
    }

    fn authorization_url(&self, state: &str) -> Result<Url, AuthError> {
        Url::parse_with_params(
            &self.client.auth_uri,
            [
                ("client_id", self.client.client_id.as_str()),
                ("redirect_uri", self.settings.redirect_uri.as_str()),
                ("response_type", "code"),
                ("scope", self.settings.scope.as_str()),
                ("access_type", "offline"),
                ("prompt", "consent"),
                ("state", state),
            ],
        )
        .map_err(|e| AuthError::Callback(format!("invalid auth uri: {e}")))
    }

    async fn exchange_code(&self, code: &str) -> Result<Credential, AuthError> {
        let resp = self
            .http
            .post(&self.client.token_uri)
            .form(&[
                ("client_id", self.client.client_id.as_str()),
                ("client_secret", self.client.client_secret.as_str()),
                ("code", code),
                ("redirect_uri", self.settings.redirect_uri.as_str()),
                ("grant_type", "authorization_code"),
            ])
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(AuthError::Exchange {
                status: status.as_u16(),
                body,
            });
        }

        let token: TokenResponse = resp.json().await?;
        let Some(refresh_token) = token.refresh_token else {
            return Err(AuthError::Exchange {
                status: status.as_u16(),
                body: "response carries no refresh token".to_string(),
            });
        };
        Ok(Credential::new(
            token.access_token,
            refresh_token,
            token.expires_in,
        ))
    }
}

fn random_state() -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(32)
        .map(char::from)
        .collect()
}

/// Accept connections until one hits the callback path, and return its code.
///
/// Requests are read concurrently, so a connection that never sends anything
/// cannot hold back the callback queued behind it.
async fn wait_for_code(
    listener: &TcpListener,
    callback_path: &str,
    state: &str,
) -> Result<String, AuthError> {
    let mut reads = JoinSet::new();
    loop {
        tokio::select! {
            accepted = listener.accept() => {
                let (stream, peer) = accepted.map_err(|e| AuthError::Callback(e.to_string()))?;
                reads.spawn(async move {
                    let mut stream = stream;
                    let target =
                        tokio::time::timeout(REQUEST_READ_TIMEOUT, read_request_target(&mut stream)).await;
                    (stream, peer, target)
                });
            }
            Some(joined) = reads.join_next() => {
                let Ok((mut stream, peer, target)) = joined else {
                    continue;
                };
                let target = match target {
                    Ok(Ok(target)) => target,
                    Ok(Err(err)) => {
                        debug!(%peer, error = %err, "ignoring unreadable request");
                        continue;
                    }
                    Err(_) => {
                        debug!(%peer, "connection sent no request in time");
                        continue;
                    }
                };
                if let Some(outcome) = handle_callback(&mut stream, &target, callback_path, state).await {
                    return outcome;
                }
            }
        }
    }
}

/// `None` when the request is not the callback and the listener keeps waiting.
async fn handle_callback(
    stream: &mut TcpStream,
    target: &str,
    callback_path: &str,
    state: &str,
) -> Option<Result<String, AuthError>> {
    let Ok(url) = Url::parse("http://localhost").and_then(|base| base.join(target)) else {
        respond(stream, 400, "Bad request.").await;
        return None;
    };
    if url.path() != callback_path {
        respond(stream, 404, "Not found.").await;
        return None;
    }

    let params: HashMap<String, String> = url.query_pairs().into_owned().collect();
    if let Some(error) = params.get("error") {
        respond(stream, 400, "Authorization failed. You can close this tab.").await;
        return Some(Err(AuthError::Callback(format!("authorization denied: {error}"))));
    }
    if params.get("state").map(String::as_str) != Some(state) {
        respond(stream, 400, "Invalid state.").await;
        return Some(Err(AuthError::Callback("state mismatch".to_string())));
    }
    let Some(code) = params.get("code") else {
        respond(stream, 400, "Missing authorization code.").await;
        return Some(Err(AuthError::Callback("missing authorization code".to_string())));
    };

    respond(stream, 200, "Authentication successful! You can close this tab.").await;
    Some(Ok(code.clone()))
}

async fn read_request_target(stream: &mut TcpStream) -> Result<String> {
    let mut buf = Vec::new();
    let mut chunk = [0u8; 2048];
    while !buf.windows(4).any(|w| w == b"\r\n\r\n") {
        let n = stream.read(&mut chunk).await?;
        if n == 0 {
            break;
        }
        buf.extend_from_slice(&chunk[..n]);
        if buf.len() > MAX_CALLBACK_REQUEST {
            anyhow::bail!("request head too large");
        }
    }
    let head = String::from_utf8_lossy(&buf);
    head.lines()
        .next()
        .and_then(|line| line.split_whitespace().nth(1))
        .map(str::to_string)
        .context("malformed request line")
}

async fn respond(stream: &mut TcpStream, status: u16, message: &str) {
    let reason = match status {
        200 => "OK",
        404 => "Not Found",
        _ => "Bad Request",
    };
    let body = format!("{message}\n");
    let response = format!(
        "HTTP/1.1 {status} {reason}\r\nContent-Type: text/plain; charset=utf-8\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
        body.len()
    );
    let _ = stream.write_all(response.as_bytes()).await;
    let _ = stream.shutdown().await;
}
