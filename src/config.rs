use anyhow::Context;
use std::env;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use crate::pagination::DEFAULT_PAGE_SIZE;

pub const DEFAULT_BACKEND_URL: &str = "http://127.0.0.1:8000";

#[derive(Debug, Clone)]
pub struct Config {
    /// Server root without trailing slash; the API lives under `/api`.
    pub backend_url: String,
    pub access_token: Option<String>,
    pub refresh_token: Option<String>,
    pub page_size: usize,
    pub http_timeout: Duration,
    pub output_dir: PathBuf,
    pub acta_poll_attempts: u32,
    pub acta_poll_interval: Duration,
    pub log_filter: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            backend_url: DEFAULT_BACKEND_URL.to_string(),
            access_token: None,
            refresh_token: None,
            page_size: DEFAULT_PAGE_SIZE,
            http_timeout: Duration::from_secs(30),
            output_dir: env::temp_dir(),
            acta_poll_attempts: 30,
            acta_poll_interval: Duration::from_millis(1000),
            log_filter: "info".to_string(),
        }
    }
}

impl Config {
    pub fn api_base(&self) -> String {
        format!("{}/api", self.backend_url)
    }

    /// Reads `ACADEMICD_*` variables, after loading `.env` when present.
    pub fn from_env() -> anyhow::Result<Self> {
        let _ = dotenv::dotenv();
        Self::from_lookup(|key| env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> anyhow::Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| {
            lookup(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };
        let mut cfg = Config::default();

        if let Some(url) = get("ACADEMICD_BACKEND_URL") {
            cfg.backend_url = normalize_base_url(&url);
        }
        cfg.access_token = get("ACADEMICD_ACCESS_TOKEN");
        cfg.refresh_token = get("ACADEMICD_REFRESH_TOKEN");
        if let Some(v) = get("ACADEMICD_PAGE_SIZE") {
            cfg.page_size = parse_var::<usize>("ACADEMICD_PAGE_SIZE", &v)?.max(1);
        }
        if let Some(v) = get("ACADEMICD_HTTP_TIMEOUT_SECS") {
            cfg.http_timeout = Duration::from_secs(parse_var("ACADEMICD_HTTP_TIMEOUT_SECS", &v)?);
        }
        if let Some(v) = get("ACADEMICD_OUTPUT_DIR") {
            cfg.output_dir = PathBuf::from(v);
        }
        if let Some(v) = get("ACADEMICD_ACTA_POLL_ATTEMPTS") {
            cfg.acta_poll_attempts = parse_var::<u32>("ACADEMICD_ACTA_POLL_ATTEMPTS", &v)?.max(1);
        }
        if let Some(v) = get("ACADEMICD_ACTA_POLL_INTERVAL_MS") {
            cfg.acta_poll_interval =
                Duration::from_millis(parse_var("ACADEMICD_ACTA_POLL_INTERVAL_MS", &v)?);
        }
        if let Some(v) = get("ACADEMICD_LOG") {
            cfg.log_filter = v;
        }
        Ok(cfg)
    }
}

fn parse_var<T>(key: &str, raw: &str) -> anyhow::Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    raw.parse::<T>()
        .with_context(|| format!("invalid value for {key}: {raw:?}"))
}

pub fn normalize_base_url(raw: &str) -> String {
    raw.trim().trim_end_matches('/').to_string()
}
