use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use drivewatch_core::WatchSettings;
use drivewatch_drive::auth::{AuthSettings, DEFAULT_REDIRECT_URI, DRIVE_READONLY_SCOPE};
use drivewatch_drive::client::{DEFAULT_API_BASE, DEFAULT_FIELDS};
use drivewatch_drive::OAuthClient;

const CONFIG_FILE: &str = "drivewatch.toml";
const TELEGRAM_API: &str = "https://api.telegram.org";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub google: GoogleConfig,
    #[serde(default)]
    pub watch: WatchConfig,
    #[serde(default)]
    pub notify: NotifyConfig,
    #[serde(default)]
    pub telegram: TelegramConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GoogleConfig {
    /// Client secret JSON downloaded from the Google Cloud console.
    pub client_secret_file: Option<String>,
    pub client_id: Option<String>,
    pub client_secret: Option<String>,
    pub redirect_uri: Option<String>,
    pub scope: String,
    pub api_base: String,
    pub fields: Vec<String>,
}

impl Default for GoogleConfig {
    fn default() -> Self {
        Self {
            client_secret_file: Some("credentials.json".to_string()),
            client_id: None,
            client_secret: None,
            redirect_uri: None,
            scope: DRIVE_READONLY_SCOPE.to_string(),
            api_base: DEFAULT_API_BASE.to_string(),
            fields: DEFAULT_FIELDS.iter().map(|f| f.to_string()).collect(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WatchConfig {
    pub ids_file: String,
    pub state_file: String,
    pub token_file: String,
    pub check_interval_secs: u64,
    /// Zero or negative disables reminders.
    pub reminder_interval_mins: i64,
    pub request_timeout_secs: u64,
    pub auth_timeout_secs: u64,
}

impl Default for WatchConfig {
    fn default() -> Self {
        Self {
            ids_file: "files.txt".to_string(),
            state_file: "lastModified.json".to_string(),
            token_file: "tokens.json".to_string(),
            check_interval_secs: 60,
            reminder_interval_mins: 0,
            request_timeout_secs: 30,
            auth_timeout_secs: 600,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NotifyConfig {
    pub telegram: bool,
    pub log: bool,
}

impl Default for NotifyConfig {
    fn default() -> Self {
        Self {
            telegram: true,
            log: false,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TelegramConfig {
    pub bot_token: Option<String>,
    pub chat_id: Option<String>,
    pub api_base: String,
}

impl Default for TelegramConfig {
    fn default() -> Self {
        Self {
            bot_token: None,
            chat_id: None,
            api_base: TELEGRAM_API.to_string(),
        }
    }
}

impl AppConfig {
    pub fn config_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("drivewatch")
            .join(CONFIG_FILE)
    }

    /// Load `path`, or fall back to defaults when it does not exist.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            tracing::debug!(path = %path.display(), "no config file, using defaults");
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config {}", path.display()))?;
        let config: Self = toml::from_str(&content).context("failed to parse config")?;
        config.validate()?;
        Ok(config)
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)
            .with_context(|| format!("failed to write config to {}", path.display()))?;
        Ok(())
    }

    fn validate(&self) -> Result<()> {
        if self.watch.check_interval_secs == 0 {
            anyhow::bail!("watch.check_interval_secs must be positive");
        }
        if self.google.fields.is_empty() {
            anyhow::bail!("google.fields must not be empty");
        }
        if self.watch.reminder_interval_mins > 0 && self.reminder_interval().is_none() {
            anyhow::bail!(
                "watch.reminder_interval_mins is too large: {}",
                self.watch.reminder_interval_mins
            );
        }
        Ok(())
    }

    pub fn oauth_client(&self) -> Result<OAuthClient> {
        match (&self.google.client_id, &self.google.client_secret) {
            (Some(id), Some(secret)) => Ok(OAuthClient::new(id, secret)),
            _ => {
                let path = self.google.client_secret_file.as_deref().context(
                    "set google.client_secret_file or google.client_id and google.client_secret",
                )?;
                OAuthClient::from_secret_file(path).with_context(|| {
                    format!(
                        "create an OAuth client in the Google Cloud console, add {DEFAULT_REDIRECT_URI} \
                         as a redirect URI and save its JSON as {path}"
                    )
                })
            }
        }
    }

    pub fn auth_settings(&self, client: &OAuthClient) -> AuthSettings {
        let redirect_uri = self
            .google
            .redirect_uri
            .clone()
            .or_else(|| {
                client
                    .redirect_uris
                    .iter()
                    .find(|uri| uri.starts_with("http://localhost") || uri.starts_with("http://127.0.0.1"))
                    .cloned()
            })
            .unwrap_or_else(|| DEFAULT_REDIRECT_URI.to_string());
        AuthSettings {
            redirect_uri,
            scope: self.google.scope.clone(),
            authorization_timeout: Duration::from_secs(self.watch.auth_timeout_secs),
            request_timeout: self.request_timeout(),
        }
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.watch.request_timeout_secs)
    }

    pub fn watch_settings(&self) -> WatchSettings {
        WatchSettings {
            poll_interval: Duration::from_secs(self.watch.check_interval_secs),
            reminder_interval: self.reminder_interval(),
        }
    }

    /// `None` when reminders are disabled or the interval does not fit.
    fn reminder_interval(&self) -> Option<Duration> {
        u64::try_from(self.watch.reminder_interval_mins)
            .ok()
            .filter(|mins| *mins > 0)
            .and_then(|mins| mins.checked_mul(60))
            .map(Duration::from_secs)
    }

    /// Bot token and chat id, taken from `BOT_TOKEN` / `CHAT_ID` when the
    /// config leaves them out.
    pub fn telegram_target(&self) -> Result<(String, String)> {
        let bot_token = self
            .telegram
            .bot_token
            .clone()
            .or_else(|| std::env::var("BOT_TOKEN").ok())
            .filter(|v| !v.is_empty());
        let chat_id = self
            .telegram
            .chat_id
            .clone()
            .or_else(|| std::env::var("CHAT_ID").ok())
            .filter(|v| !v.is_empty());
        match (bot_token, chat_id) {
            (Some(token), Some(chat)) => Ok((token, chat)),
            (token, chat) => {
                let missing: Vec<_> = [("BOT_TOKEN", token.is_none()), ("CHAT_ID", chat.is_none())]
                    .into_iter()
                    .filter_map(|(name, absent)| absent.then_some(name))
                    .collect();
                anyhow::bail!(
                    "telegram notifications enabled but missing: {}",
                    missing.join(", ")
                )
            }
        }
    }
}
