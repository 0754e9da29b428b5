use crate::errors::MirrorError;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

/// Service configuration, loaded from a TOML file with environment-variable
/// overrides for secrets. A missing file yields `Config::default()` so the
/// service can boot in a dev environment and be configured entirely via env.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub gateway: GatewayConfig,
    pub store: StoreConfig,
    pub webhook: WebhookConfig,
    pub facebook: FacebookConfig,
    pub whatsapp: WhatsAppConfig,
    pub tiktok: TikTokConfig,
    pub reply: ReplyConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GatewayConfig {
    pub host: String,
    pub port: u16,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8090,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    pub db_path: String,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            db_path: "hubmirror.db".to_string(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct WebhookConfig {
    /// Shared secret echoed back during the platform verification handshake.
    pub verify_token: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FacebookConfig {
    pub page_token: String,
    /// Page-scoped tenant id used as the conversation account key.
    pub page_id: String,
    pub graph_base_url: String,
}

impl Default for FacebookConfig {
    fn default() -> Self {
        Self {
            page_token: String::new(),
            page_id: String::new(),
            graph_base_url: "https://graph.facebook.com/v19.0".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WhatsAppConfig {
    pub access_token: String,
    pub base_url: String,
    /// Business accounts known to this tenant. `phone_number_id` is the
    /// webhook routing key for all inbound WhatsApp traffic; these rows are
    /// seeded into the store at startup.
    pub accounts: Vec<WhatsAppAccountConfig>,
}

impl Default for WhatsAppConfig {
    fn default() -> Self {
        Self {
            access_token: String::new(),
            base_url: "https://graph.facebook.com/v19.0".to_string(),
            accounts: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WhatsAppAccountConfig {
    pub owner_id: String,
    pub waba_id: String,
    pub phone_number_id: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct TikTokConfig {
    /// Client secret used to validate TikTok callback signatures.
    pub client_secret: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ReplyConfig {
    /// Reply engine endpoint. When unset, inbound messages are mirrored but
    /// no bot reply is ever attempted.
    pub endpoint: Option<String>,
    /// Maximum number of prior messages included in reply-engine history.
    pub history_limit: usize,
}

impl Default for ReplyConfig {
    fn default() -> Self {
        Self {
            endpoint: None,
            history_limit: 50,
        }
    }
}

pub fn load_config(path: Option<&Path>) -> Result<Config> {
    let mut config = match path {
        Some(p) if p.exists() => {
            let content = fs::read_to_string(p)
                .with_context(|| format!("Failed to read config from {}", p.display()))?;
            toml::from_str(&content)
                .with_context(|| format!("Failed to parse config TOML from {}", p.display()))?
        }
        Some(p) => {
            return Err(MirrorError::Config(format!("config file not found: {}", p.display())).into());
        }
        None => {
            let default_path = Path::new("hubmirror.toml");
            if default_path.exists() {
                let content = fs::read_to_string(default_path)
                    .context("Failed to read hubmirror.toml")?;
                toml::from_str(&content).context("Failed to parse hubmirror.toml")?
            } else {
                Config::default()
            }
        }
    };

    apply_env_overrides(&mut config);
    Ok(config)
}

/// Secrets can always be supplied via environment, overriding the file.
fn apply_env_overrides(config: &mut Config) {
    let overrides: [(&str, &mut String); 4] = [
        ("HUBMIRROR_VERIFY_TOKEN", &mut config.webhook.verify_token),
        ("HUBMIRROR_FB_PAGE_TOKEN", &mut config.facebook.page_token),
        ("HUBMIRROR_WA_ACCESS_TOKEN", &mut config.whatsapp.access_token),
        ("HUBMIRROR_TIKTOK_SECRET", &mut config.tiktok.client_secret),
    ];
    for (var, slot) in overrides {
        if let Ok(value) = std::env::var(var)
            && !value.is_empty()
        {
            *slot = value;
        }
    }
}
