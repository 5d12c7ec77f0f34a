use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::Path;

#[derive(Debug, Deserialize, Clone, Default)]
pub struct Config {
    #[serde(default)]
    pub zoom: ZoomConfig,
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub bot: BotConfig,
}

/// Zoom app credentials and endpoints.
///
/// Credentials stay optional: nothing is checked at startup, a missing value
/// only surfaces when the operation that needs it runs.
#[derive(Debug, Deserialize, Clone)]
pub struct ZoomConfig {
    #[serde(default)]
    pub client_id: Option<String>,
    #[serde(default)]
    pub client_secret: Option<String>,
    #[serde(default)]
    pub account_id: Option<String>,
    #[serde(default)]
    pub verification_token: Option<String>,
    /// Robot JID used by the test-send endpoint when the request has none
    #[serde(default)]
    pub bot_jid: Option<String>,
    #[serde(default = "default_oauth_url")]
    pub oauth_url: String,
    #[serde(default = "default_api_base_url")]
    pub api_base_url: String,
    /// Seconds shaved off the provider-stated token lifetime
    #[serde(default = "default_expiry_buffer_secs")]
    pub expiry_buffer_secs: i64,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    #[serde(default = "default_port")]
    pub port: u16,
}

#[derive(Debug, Deserialize, Clone)]
pub struct BotConfig {
    /// IANA zone name used by the `time` command
    #[serde(default = "default_timezone")]
    pub timezone: String,
    /// Display name used when a webhook payload carries no userName
    #[serde(default = "default_user_name")]
    pub default_user_name: String,
}

fn default_oauth_url() -> String {
    "https://zoom.us/oauth/token".to_string()
}

fn default_api_base_url() -> String {
    "https://api.zoom.us/v2".to_string()
}

fn default_expiry_buffer_secs() -> i64 {
    300
}

fn default_port() -> u16 {
    3001
}

fn default_timezone() -> String {
    "Asia/Shanghai".to_string()
}

fn default_user_name() -> String {
    "User".to_string()
}

impl Default for ZoomConfig {
    fn default() -> Self {
        Self {
            client_id: None,
            client_secret: None,
            account_id: None,
            verification_token: None,
            bot_jid: None,
            oauth_url: default_oauth_url(),
            api_base_url: default_api_base_url(),
            expiry_buffer_secs: default_expiry_buffer_secs(),
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: default_port(),
        }
    }
}

impl Default for BotConfig {
    fn default() -> Self {
        Self {
            timezone: default_timezone(),
            default_user_name: default_user_name(),
        }
    }
}

impl Config {
    /// Load `path` if it exists, then overlay the process environment.
    pub fn load(path: &Path) -> Result<Self> {
        let mut config = if path.exists() {
            let content = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read config file: {}", path.display()))?;
            toml::from_str(&content)
                .with_context(|| format!("Failed to parse config file: {}", path.display()))?
        } else {
            Config::default()
        };

        config.apply_env(|key| std::env::var(key).ok())?;
        Ok(config)
    }

    /// Overlay environment-style variables on top of the file values.
    /// Empty variables are ignored.
    pub fn apply_env<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.is_empty());

        if let Some(v) = get("ZOOM_CLIENT_ID") {
            self.zoom.client_id = Some(v);
        }
        if let Some(v) = get("ZOOM_CLIENT_SECRET") {
            self.zoom.client_secret = Some(v);
        }
        if let Some(v) = get("ZOOM_ACCOUNT_ID") {
            self.zoom.account_id = Some(v);
        }
        if let Some(v) = get("ZOOM_VERIFICATION_TOKEN") {
            self.zoom.verification_token = Some(v);
        }
        if let Some(v) = get("ZOOM_BOT_JID") {
            self.zoom.bot_jid = Some(v);
        }
        if let Some(v) = get("PORT") {
            self.server.port = v
                .parse()
                .with_context(|| format!("Invalid PORT value: {}", v))?;
        }

        Ok(())
    }
}
