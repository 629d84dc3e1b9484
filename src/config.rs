use crate::model::ConfigError;
use serde::Deserialize;
use std::fs;
use std::path::Path;

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub source_url: String,
    pub database_path: String,
    pub bind_address: String,
    pub port: u16,
    pub listing_limit: u32,
    pub user_agent: String,
    pub request_timeout_seconds: u64,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            source_url: "https://www.nytimes.com/".to_string(),
            database_path: "articles.db".to_string(),
            bind_address: "0.0.0.0".to_string(),
            port: 3000,
            listing_limit: 30,
            user_agent: "Mozilla/5.0 (X11; Linux x86_64) HeadlineKeeper/0.1".to_string(),
            request_timeout_seconds: 30,
        }
    }
}

impl AppConfig {
    pub fn listen_addr(&self) -> String {
        format!("{}:{}", self.bind_address, self.port)
    }
}

/// Reads `path` if it exists (defaults otherwise), then applies environment overrides.
pub fn load_config(path: &str) -> Result<AppConfig, ConfigError> {
    let mut config = if Path::new(path).exists() {
        let content = fs::read_to_string(path)?;
        serde_json::from_str(&content)?
    } else {
        AppConfig::default()
    };
    apply_env(&mut config, |name| std::env::var(name).ok())?;
    Ok(config)
}

fn apply_env(
    config: &mut AppConfig,
    lookup: impl Fn(&str) -> Option<String>,
) -> Result<(), ConfigError> {
    if let Some(port) = lookup("PORT") {
        config.port = port
            .trim()
            .parse()
            .map_err(|_| ConfigError::InvalidEnv { name: "PORT", value: port })?;
    }
    if let Some(path) = lookup("DATABASE_PATH") {
        config.database_path = path;
    }
    if let Some(url) = lookup("SOURCE_URL") {
        config.source_url = url;
    }
    Ok(())
}
