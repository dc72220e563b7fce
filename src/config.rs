use serde::Deserialize;
use std::time::Duration;

pub const DEFAULT_AUTH_URL: &str = "https://login.sellsy.com/oauth2/access-tokens";
pub const DEFAULT_OPPORTUNITIES_URL: &str = "https://api.sellsy.com/v2/opportunities";
pub const DEFAULT_EXCLUDED_PIPELINE: &str = "Prospection GLOBAL";

/// Upstream rate limits allow at most one full re-fetch per 15 minutes.
pub const MIN_REFRESH_INTERVAL_SECS: u64 = 900;

#[derive(Clone, Deserialize)]
pub struct Config {
    pub port: u16,
    pub client_id: String,
    pub client_secret: String,
    pub auth_url: String,
    pub opportunities_url: String,
    pub refresh_interval_secs: u64,
    pub auth_timeout_secs: u64,
    pub page_timeout_secs: u64,
    pub excluded_pipeline: String,
}

impl std::fmt::Debug for Config {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Config")
            .field("port", &self.port)
            .field("client_id", &"[REDACTED]")
            .field("client_secret", &"[REDACTED]")
            .field("auth_url", &self.auth_url)
            .field("opportunities_url", &self.opportunities_url)
            .field("refresh_interval_secs", &self.refresh_interval_secs)
            .field("auth_timeout_secs", &self.auth_timeout_secs)
            .field("page_timeout_secs", &self.page_timeout_secs)
            .field("excluded_pipeline", &self.excluded_pipeline)
            .finish()
    }
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();

        let config = Self {
            port: std::env::var("PORT")
                .unwrap_or_else(|_| "3000".to_string())
                .parse()
                .map_err(|_| anyhow::anyhow!("PORT must be a valid number between 1-65535"))?,
            client_id: required_secret("SELLSY_CLIENT_ID")?,
            client_secret: required_secret("SELLSY_CLIENT_SECRET")?,
            auth_url: http_url("SELLSY_AUTH_URL", DEFAULT_AUTH_URL)?,
            opportunities_url: http_url("SELLSY_OPPORTUNITIES_URL", DEFAULT_OPPORTUNITIES_URL)?,
            refresh_interval_secs: seconds("REFRESH_INTERVAL_SECS", MIN_REFRESH_INTERVAL_SECS)?,
            auth_timeout_secs: seconds("AUTH_TIMEOUT_SECS", 30)?,
            page_timeout_secs: seconds("PAGE_TIMEOUT_SECS", 60)?,
            excluded_pipeline: std::env::var("EXCLUDED_PIPELINE")
                .ok()
                .filter(|s| !s.trim().is_empty())
                .unwrap_or_else(|| DEFAULT_EXCLUDED_PIPELINE.to_string()),
        }
        .clamped();

        // Log successful configuration load (without sensitive values)
        tracing::info!("Configuration loaded successfully");
        tracing::debug!("Sellsy auth URL: {}", config.auth_url);
        tracing::debug!("Sellsy opportunities URL: {}", config.opportunities_url);
        tracing::debug!(
            "Refresh interval: {}s, timeouts: auth {}s / page {}s",
            config.refresh_interval_secs,
            config.auth_timeout_secs,
            config.page_timeout_secs
        );
        tracing::debug!("Server Port: {}", config.port);

        Ok(config)
    }

    /// Raises the refresh interval to the upstream minimum and forbids zero timeouts.
    pub fn clamped(mut self) -> Self {
        if self.refresh_interval_secs < MIN_REFRESH_INTERVAL_SECS {
            tracing::warn!(
                "REFRESH_INTERVAL_SECS={} is below the {}s minimum, using the minimum",
                self.refresh_interval_secs,
                MIN_REFRESH_INTERVAL_SECS
            );
            self.refresh_interval_secs = MIN_REFRESH_INTERVAL_SECS;
        }
        self.auth_timeout_secs = self.auth_timeout_secs.max(1);
        self.page_timeout_secs = self.page_timeout_secs.max(1);
        self
    }

    pub fn refresh_interval(&self) -> Duration {
        Duration::from_secs(self.refresh_interval_secs)
    }

    pub fn auth_timeout(&self) -> Duration {
        Duration::from_secs(self.auth_timeout_secs)
    }

    pub fn page_timeout(&self) -> Duration {
        Duration::from_secs(self.page_timeout_secs)
    }
}

fn required_secret(name: &str) -> anyhow::Result<String> {
    std::env::var(name)
        .map_err(|_| anyhow::anyhow!("{} environment variable required", name))
        .and_then(|value| {
            if value.trim().is_empty() {
                anyhow::bail!("{} cannot be empty", name);
            }
            Ok(value)
        })
}

fn http_url(name: &str, default: &str) -> anyhow::Result<String> {
    let raw = std::env::var(name)
        .ok()
        .filter(|s| !s.trim().is_empty())
        .unwrap_or_else(|| default.to_string());

    let parsed = url::Url::parse(&raw)
        .map_err(|e| anyhow::anyhow!("{} is not a valid URL: {}", name, e))?;
    if parsed.scheme() != "http" && parsed.scheme() != "https" {
        anyhow::bail!("{} must start with http:// or https://", name);
    }
    Ok(raw)
}

fn seconds(name: &str, default: u64) -> anyhow::Result<u64> {
    match std::env::var(name) {
        Ok(value) if !value.trim().is_empty() => value
            .trim()
            .parse()
            .map_err(|_| anyhow::anyhow!("{} must be a whole number of seconds", name)),
        _ => Ok(default),
    }
}
