use serde::Deserialize;
use std::{error::Error, fs, path::Path};
use url::Url;

use crate::yaml_include::load_yaml_with_includes;

/// Value of `database_url` that selects the in-process store.
pub const IN_MEMORY_DATABASE_URL: &str = "memory";

#[derive(Debug, Deserialize, Clone, Default)]
pub struct CommonConfig {
    pub project_name: String,
    pub database_url: String,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct BackendConfig {
    pub server_address: String,
    pub log_level: String,
    /// Origin allowed by CORS. `*` (or empty) allows any origin.
    pub allowed_origin: String,
    /// Upsert the static campus catalog on startup.
    pub seed_catalog: bool,
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            server_address: "0.0.0.0:3000".to_string(),
            log_level: "info".to_string(),
            allowed_origin: "*".to_string(),
            seed_catalog: true,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct OtpConfig {
    pub ttl_seconds: u64,
    pub resend_limit: usize,
    pub resend_window_seconds: u64,
}

impl Default for OtpConfig {
    fn default() -> Self {
        Self {
            ttl_seconds: 600,
            resend_limit: 3,
            resend_window_seconds: 900,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct MailerConfig {
    /// HTTP email API. When absent, messages are only logged.
    pub endpoint: Option<Url>,
    pub api_key: Option<String>,
    pub from: String,
    /// Used to build `{user}@{domain}` when an order carries no student email.
    pub fallback_domain: String,
    pub max_attempts: u32,
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
    pub timeout_ms: u64,
}

impl Default for MailerConfig {
    fn default() -> Self {
        Self {
            endpoint: None,
            api_key: None,
            from: "no-reply@campus.edu".to_string(),
            fallback_domain: "campus.edu".to_string(),
            max_attempts: 3,
            base_delay_ms: 1000,
            max_delay_ms: 5000,
            timeout_ms: 10_000,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct WalletConfig {
    pub default_balance: f64,
}

impl Default for WalletConfig {
    fn default() -> Self {
        Self {
            default_balance: 500.0,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct DeliveryConfig {
    pub batch_payout_ratio: f64,
    pub default_rating: f64,
}

impl Default for DeliveryConfig {
    fn default() -> Self {
        Self {
            batch_payout_ratio: 0.85,
            default_rating: 4.9,
        }
    }
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct Config {
    pub common: CommonConfig,
    #[serde(default)]
    pub backend: BackendConfig,
    #[serde(default)]
    pub otp: OtpConfig,
    #[serde(default)]
    pub mailer: MailerConfig,
    #[serde(default)]
    pub wallet: WalletConfig,
    #[serde(default)]
    pub delivery: DeliveryConfig,
}

impl Config {
    pub fn load(config_path: &str) -> Result<Self, Box<dyn Error + Send + Sync>> {
        let contents = fs::read_to_string(config_path)?;
        Self::from_yaml_str(&contents)
    }

    /// Loads a source config file, resolving `!include` lines first.
    pub fn load_with_includes(path: &Path) -> Result<Self, Box<dyn Error + Send + Sync>> {
        let yaml = load_yaml_with_includes(path).map_err(|e| e.to_string())?;
        let mut out = String::new();
        {
            let mut emitter = yaml_rust2::YamlEmitter::new(&mut out);
            emitter.dump(&yaml).map_err(|e| e.to_string())?;
        }
        Self::from_yaml_str(&out)
    }

    pub fn from_yaml_str(contents: &str) -> Result<Self, Box<dyn Error + Send + Sync>> {
        let config = serde_yml::from_str(contents)?;
        Ok(config)
    }

    pub fn uses_in_memory_storage(&self) -> bool {
        let url = self.common.database_url.trim();
        url.is_empty() || url == IN_MEMORY_DATABASE_URL
    }
}
