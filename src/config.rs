use serde::Deserialize;
use std::time::Duration;

/// Fallback location used when the form leaves it blank.
pub const DEFAULT_LOCATION: &str = "Waterloo, ON";

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub port: u16,
    /// Base URL of the FastAPI backend every outbound call is made against.
    pub backend_base_url: String,
    /// Ceiling for one analysis attempt, history lookup included.
    pub analysis_timeout: Duration,
    /// Property search runs against a slow upstream, so it gets its own bound.
    pub search_timeout: Duration,
    /// Bound for the remaining relayed routes (dashboard, transactions, statements).
    pub proxy_timeout: Duration,
    pub default_location: String,
    /// Price-to-down-payment multiple the search service uses.
    pub search_leverage: f64,
    /// Idle expiry for planner sessions.
    pub plan_session_ttl: Duration,
    pub max_upload_bytes: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            port: 3000,
            backend_base_url: "http://127.0.0.1:8000".to_string(),
            analysis_timeout: Duration::from_secs(60),
            search_timeout: Duration::from_secs(120),
            proxy_timeout: Duration::from_secs(30),
            default_location: DEFAULT_LOCATION.to_string(),
            search_leverage: 5.0,
            plan_session_ttl: Duration::from_secs(1800),
            max_upload_bytes: 10 * 1024 * 1024,
        }
    }
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();

        let defaults = Self::default();

        let config = Self {
            port: std::env::var("PORT")
                .unwrap_or_else(|_| defaults.port.to_string())
                .parse()
                .map_err(|_| anyhow::anyhow!("PORT must be a valid number between 1-65535"))?,
            backend_base_url: std::env::var("BACKEND_URL")
                .or_else(|_| std::env::var("NEXT_PUBLIC_API_BASE"))
                .unwrap_or(defaults.backend_base_url)
                .trim()
                .trim_end_matches('/')
                .to_string(),
            analysis_timeout: secs_var("ANALYSIS_TIMEOUT_SECS", defaults.analysis_timeout)?,
            search_timeout: secs_var("HOUSE_SEARCH_TIMEOUT_SECS", defaults.search_timeout)?,
            proxy_timeout: secs_var("PROXY_TIMEOUT_SECS", defaults.proxy_timeout)?,
            default_location: std::env::var("DEFAULT_LOCATION")
                .ok()
                .filter(|s| !s.trim().is_empty())
                .unwrap_or(defaults.default_location),
            search_leverage: std::env::var("HOUSE_SEARCH_LEVERAGE")
                .ok()
                .map(|v| {
                    v.parse::<f64>()
                        .ok()
                        .filter(|l| l.is_finite() && *l > 0.0)
                        .ok_or_else(|| {
                            anyhow::anyhow!("HOUSE_SEARCH_LEVERAGE must be a positive number")
                        })
                })
                .transpose()?
                .unwrap_or(defaults.search_leverage),
            plan_session_ttl: secs_var("PLAN_SESSION_TTL_SECS", defaults.plan_session_ttl)?,
            max_upload_bytes: std::env::var("MAX_UPLOAD_BYTES")
                .ok()
                .map(|v| {
                    v.parse::<usize>()
                        .map_err(|_| anyhow::anyhow!("MAX_UPLOAD_BYTES must be a byte count"))
                })
                .transpose()?
                .unwrap_or(defaults.max_upload_bytes),
        };

        config.validate()?;

        // Log successful configuration load
        tracing::info!("Configuration loaded successfully");
        tracing::debug!("Backend URL: {}", config.backend_base_url);
        tracing::debug!(
            "Timeouts: analysis={}s search={}s proxy={}s",
            config.analysis_timeout.as_secs(),
            config.search_timeout.as_secs(),
            config.proxy_timeout.as_secs()
        );
        tracing::debug!("Default location: {}", config.default_location);
        tracing::debug!("Server Port: {}", config.port);

        Ok(config)
    }

    /// Checks the backend URL is an absolute http(s) URL.
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.backend_base_url.trim().is_empty() {
            anyhow::bail!("BACKEND_URL cannot be empty");
        }
        if !self.backend_base_url.starts_with("http://")
            && !self.backend_base_url.starts_with("https://")
        {
            anyhow::bail!("BACKEND_URL must start with http:// or https://");
        }
        url::Url::parse(&self.backend_base_url)
            .map_err(|e| anyhow::anyhow!("BACKEND_URL is not a valid URL: {}", e))?;
        Ok(())
    }
}

fn secs_var(key: &str, default: Duration) -> anyhow::Result<Duration> {
    match std::env::var(key) {
        Ok(raw) => {
            let secs: u64 = raw
                .trim()
                .parse()
                .map_err(|_| anyhow::anyhow!("{} must be a whole number of seconds", key))?;
            if secs == 0 {
                anyhow::bail!("{} must be greater than zero", key);
            }
            Ok(Duration::from_secs(secs))
        }
        Err(_) => Ok(default),
    }
}
