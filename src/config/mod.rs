use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
    pub site: SiteConfig,
    #[serde(default)]
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub media: MediaConfig,
    #[serde(default)]
    pub auth: AuthConfig,
    #[serde(default)]
    pub cache: CacheConfig,
    #[serde(default)]
    pub api: ApiConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SiteConfig {
    pub title: String,
    #[serde(default)]
    pub description: String,
    pub url: String,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DatabaseConfig {
    pub path: String,
    #[serde(default = "default_pool_size")]
    pub pool_size: u32,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct MediaConfig {
    pub upload_dir: String,
    #[serde(default = "default_max_upload")]
    pub max_upload_size: String,
    /// Serve uploads under `/media/` from this process.
    #[serde(default = "default_true")]
    pub serve: bool,
}

impl MediaConfig {
    pub fn max_upload_bytes(&self) -> Result<usize> {
        parse_size(&self.max_upload_size)
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AuthConfig {
    #[serde(default = "default_session_lifetime")]
    pub session_lifetime: String,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            session_lifetime: default_session_lifetime(),
        }
    }
}

impl AuthConfig {
    pub fn session_days(&self) -> Result<i64> {
        parse_days(&self.session_lifetime)
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct CacheConfig {
    #[serde(default = "default_cache_ttl")]
    pub ttl_seconds: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            ttl_seconds: default_cache_ttl(),
        }
    }
}

impl CacheConfig {
    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_seconds)
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ApiConfig {
    #[serde(default = "default_page_size")]
    pub default_page_size: usize,
    #[serde(default = "default_max_page_size")]
    pub max_page_size: usize,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            default_page_size: default_page_size(),
            max_page_size: default_max_page_size(),
        }
    }
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    8000
}

fn default_pool_size() -> u32 {
    10
}

fn default_true() -> bool {
    true
}

fn default_max_upload() -> String {
    "10MB".to_string()
}

fn default_session_lifetime() -> String {
    "7d".to_string()
}

fn default_cache_ttl() -> u64 {
    300
}

fn default_page_size() -> usize {
    20
}

fn default_max_page_size() -> usize {
    100
}

/// Parses sizes such as `512KB`, `10MB` or a bare byte count.
pub fn parse_size(value: &str) -> Result<usize> {
    let value = value.trim().to_uppercase();
    let (digits, multiplier) = if let Some(n) = value.strip_suffix("GB") {
        (n, 1024 * 1024 * 1024)
    } else if let Some(n) = value.strip_suffix("MB") {
        (n, 1024 * 1024)
    } else if let Some(n) = value.strip_suffix("KB") {
        (n, 1024)
    } else if let Some(n) = value.strip_suffix('B') {
        (n, 1)
    } else {
        (value.as_str(), 1)
    };
    let n: usize = digits
        .trim()
        .parse()
        .map_err(|_| anyhow::anyhow!("Invalid size '{}'", value))?;
    Ok(n * multiplier)
}

/// Parses lifetimes such as `7d`, `2w` or a bare day count.
pub fn parse_days(value: &str) -> Result<i64> {
    let value = value.trim().to_lowercase();
    let (digits, multiplier) = if let Some(n) = value.strip_suffix('w') {
        (n, 7)
    } else if let Some(n) = value.strip_suffix('d') {
        (n, 1)
    } else {
        (value.as_str(), 1)
    };
    let n: i64 = digits
        .trim()
        .parse()
        .map_err(|_| anyhow::anyhow!("Invalid lifetime '{}'", value))?;
    if n <= 0 {
        anyhow::bail!("Lifetime must be at least one day");
    }
    Ok(n * multiplier)
}

/// The file written by `academy init`.
pub fn default_config_toml(site_name: &str) -> String {
    format!(
        r#"[site]
title = "{}"
description = "Online courses"
url = "http://localhost:8000"

[server]
host = "127.0.0.1"
port = 8000

[database]
path = "./data/academy.db"

[media]
upload_dir = "./data/media"
max_upload_size = "10MB"
serve = true

[auth]
session_lifetime = "7d"

[cache]
ttl_seconds = 300

[api]
default_page_size = 20
max_page_size = 100
"#,
        site_name
    )
}

impl Config {
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            anyhow::anyhow!(
                "Could not read config file '{}': {}. Run 'academy init' first?",
                path.display(),
                e
            )
        })?;
        Self::parse(&content)
    }

    pub fn parse(content: &str) -> Result<Self> {
        let config: Config = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.api.default_page_size == 0 {
            anyhow::bail!("api.default_page_size must be greater than 0");
        }
        if self.api.default_page_size > self.api.max_page_size {
            anyhow::bail!("api.default_page_size must not exceed api.max_page_size");
        }
        if self.database.pool_size == 0 {
            anyhow::bail!("database.pool_size must be greater than 0");
        }
        self.media.max_upload_bytes()?;
        self.auth.session_days()?;
        Ok(())
    }
}
