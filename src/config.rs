//! Runtime configuration from env (+ `.env` via dotenv).

use anyhow::{Context, Result};
use game_scraper::SchedulerMode;
use snapshot_cache::DEFAULT_TTL_MINUTES;
use std::env;
use std::net::SocketAddr;
use std::num::NonZeroUsize;
use std::path::PathBuf;
use std::time::Duration;

pub const DEFAULT_BASE_URL: &str = "https://www.lottery.example";
pub const DEFAULT_CATALOG_PATH: &str = "/api/v1/games";

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub base_url: String,
    pub catalog_url: String,
    pub catalog_timeout: Duration,
    pub scrape_concurrency: NonZeroUsize,
    pub scrape_item_timeout: Duration,
    pub scrape_nav_timeout: Duration,
    pub scrape_table_wait: Duration,
    pub scheduler_mode: SchedulerMode,
    pub cache_ttl: Duration,
    pub refresh_after: Duration,
    pub cache_db_path: PathBuf,
    pub http_bind: SocketAddr,
    pub log_dir: PathBuf,
}

fn var_or<T: std::str::FromStr>(key: &str, default: T) -> T {
    env::var(key)
        .ok()
        .and_then(|v| v.trim().parse::<T>().ok())
        .unwrap_or(default)
}

impl AppConfig {
    pub fn from_env() -> Result<Self> {
        let base_url = env::var("LOTTERY_BASE_URL").unwrap_or_else(|_| DEFAULT_BASE_URL.to_string());
        let catalog_url = env::var("LOTTERY_CATALOG_URL")
            .unwrap_or_else(|_| format!("{}{}", base_url.trim_end_matches('/'), DEFAULT_CATALOG_PATH));

        let scrape_concurrency = NonZeroUsize::new(var_or("SCRAPE_CONCURRENCY", 3usize))
            .context("SCRAPE_CONCURRENCY must be > 0")?;

        let scheduler_mode = match env::var("SCRAPE_SCHEDULER") {
            Ok(raw) => raw.parse().context("Invalid SCRAPE_SCHEDULER")?,
            Err(_) => SchedulerMode::default(),
        };

        let ttl_minutes = var_or("CACHE_TTL_MINUTES", DEFAULT_TTL_MINUTES).max(1);
        let cache_ttl = Duration::from_secs(ttl_minutes * 60);
        let refresh_after = match env::var("CACHE_REFRESH_AFTER_MINUTES").ok().and_then(|v| v.parse::<u64>().ok()) {
            Some(m) => Duration::from_secs(m.max(1) * 60).min(cache_ttl),
            None => cache_ttl / 2,
        };

        let http_bind = env::var("EV_HTTP_BIND").unwrap_or_else(|_| "127.0.0.1:8090".to_string());

        Ok(Self {
            base_url,
            catalog_url,
            catalog_timeout: Duration::from_secs(var_or("CATALOG_TIMEOUT_SECS", 10)),
            scrape_concurrency,
            scrape_item_timeout: Duration::from_secs(var_or("SCRAPE_ITEM_TIMEOUT_SECS", 90)),
            scrape_nav_timeout: Duration::from_secs(var_or("SCRAPE_NAV_TIMEOUT_SECS", 45)),
            scrape_table_wait: Duration::from_secs(var_or("SCRAPE_TABLE_WAIT_SECS", 15)),
            scheduler_mode,
            cache_ttl,
            refresh_after,
            cache_db_path: PathBuf::from(env::var("EV_CACHE_DB_PATH").unwrap_or_else(|_| "data/ev_cache.db".to_string())),
            http_bind: http_bind.parse().context("Invalid EV_HTTP_BIND")?,
            log_dir: PathBuf::from(env::var("EV_LOG_DIR").unwrap_or_else(|_| "logs".to_string())),
        })
    }
}
