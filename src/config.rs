use anyhow::{Context, bail};
use serde::{Deserialize, Serialize};
use std::fs;
use std::time::Duration;

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct AppConfig {
    pub log_level: String,
    pub log_dir: String,
    pub log_file: String,
    pub use_json: bool,
    pub rotation: String,
    pub gateway: GatewayConfig,
    #[serde(default)]
    pub postgres: PostgresConfig,
    #[serde(default)]
    pub ledger: LedgerConfig,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct GatewayConfig {
    pub host: String,
    pub port: u16,
}

/// PostgreSQL connection settings
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct PostgresConfig {
    /// Connection URL; usually supplied through `POSTGRES_DSN`
    #[serde(default)]
    pub url: Option<String>,
    pub max_connections: u32,
    pub min_connections: u32,
    pub acquire_timeout_secs: u64,
    /// Run the bundled schema at startup
    #[serde(default)]
    pub apply_schema: bool,
}

impl Default for PostgresConfig {
    fn default() -> Self {
        Self {
            url: None,
            max_connections: 10,
            min_connections: 1,
            acquire_timeout_secs: 5,
            apply_schema: false,
        }
    }
}

/// Transfer engine settings
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct LedgerConfig {
    /// Upper bound for every engine call
    pub request_timeout_ms: u64,
    /// Default page size for audit history
    pub history_limit: i64,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            request_timeout_ms: 5000,
            history_limit: 100,
        }
    }
}

impl LedgerConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }
}

impl AppConfig {
    /// Load `config/<env>.yaml` and apply environment overrides
    pub fn load(env: &str) -> anyhow::Result<Self> {
        let config_path = format!("config/{}.yaml", env);
        let content = fs::read_to_string(&config_path)
            .with_context(|| format!("Failed to read config file: {}", config_path))?;
        let mut config = Self::from_yaml(&content)?;
        config.apply_overrides(|key| std::env::var(key).ok());
        Ok(config)
    }

    pub fn from_yaml(content: &str) -> anyhow::Result<Self> {
        serde_yaml::from_str(content).context("Failed to parse config yaml")
    }

    /// Apply `POSTGRES_DSN`, `PORT` and `REQ_TIMEOUT_SEC` from `lookup`.
    ///
    /// Unparseable or non-positive values are ignored.
    pub fn apply_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(dsn) = lookup("POSTGRES_DSN").filter(|s| !s.is_empty()) {
            self.postgres.url = Some(dsn);
        }
        if let Some(port) = lookup("PORT").and_then(|s| s.parse::<u16>().ok()) {
            self.gateway.port = port;
        }
        if let Some(secs) = lookup("REQ_TIMEOUT_SEC")
            .and_then(|s| s.parse::<u64>().ok())
            .filter(|v| *v > 0)
        {
            self.ledger.request_timeout_ms = secs * 1000;
        }
    }

    /// Connection URL, required to start the server
    pub fn postgres_url(&self) -> anyhow::Result<&str> {
        match self.postgres.url.as_deref() {
            Some(url) if !url.is_empty() => Ok(url),
            _ => bail!("POSTGRES_DSN is required"),
        }
    }
}
