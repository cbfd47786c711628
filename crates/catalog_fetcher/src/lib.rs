/// ScratchEV — Catalog Fetcher
///
/// Pulls the list of currently offered games from the upstream listing
/// endpoint and keeps only instant scratch games (`gameType == "Scratch"`).
/// Detail page URL = `<base-host>/games/draw-and-instants/<identifier>`.

use anyhow::{Context, Result};
use logger::{CatalogStatusEvent, EventLogger, now_iso};
use serde::Deserialize;
use serde_json::Value;
use std::time::Duration;
use tracing::{debug, info, warn};

pub const SCRATCH_GAME_TYPE: &str = "Scratch";
pub const GAME_PATH: &str = "/games/draw-and-instants/";

// ── Upstream structs ─────────────────────────────────────────────────────────

#[derive(Deserialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct CatalogEntry {
    pub name:       String,
    pub identifier: String,
    #[serde(default)]
    pub id:         Value,            // number on some feeds, string on others
    #[serde(default)]
    pub game_type:  String,
    #[serde(default)]
    pub top_prize:  Value,
    #[serde(default)]
    pub price:      Value,
    #[serde(default)]
    pub odds:       Option<Value>,
    #[serde(default)]
    pub start_date: Option<String>,
}

#[derive(Deserialize, Debug)]
#[serde(untagged)]
enum CatalogResponse {
    List(Vec<CatalogEntry>),
    Wrapped { games: Vec<CatalogEntry> },
}

impl CatalogResponse {
    fn into_entries(self) -> Vec<CatalogEntry> {
        match self {
            CatalogResponse::List(v) => v,
            CatalogResponse::Wrapped { games } => games,
        }
    }
}

/// One scrape target.
#[derive(Debug, Clone, PartialEq)]
pub struct CatalogGame {
    pub name:        String,
    pub url:         String,
    pub price:       Option<f64>,
    pub game_number: String,
    pub top_prize:   Option<f64>,
    pub start_date:  Option<String>,
}

#[derive(Debug, Clone)]
pub struct CatalogConfig {
    pub catalog_url: String,
    pub base_host:   String,
    pub timeout:     Duration,
}

// ── Value helpers ────────────────────────────────────────────────────────────

/// `5`, `5.0`, `"5"`, `"$5.00"`, `"$1,000,000"` → number
pub fn money_from_value(v: &Value) -> Option<f64> {
    match v {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => {
            let cleaned: String = s.chars().filter(|c| c.is_ascii_digit() || *c == '.').collect();
            cleaned.parse().ok()
        }
        _ => None,
    }
}

fn id_to_string(v: &Value) -> Option<String> {
    match v {
        Value::Number(n) => Some(n.to_string()),
        Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
        _ => None,
    }
}

pub fn game_url(base_host: &str, identifier: &str) -> String {
    format!("{}{}{}", base_host.trim_end_matches('/'), GAME_PATH, identifier.trim_matches('/'))
}

/// Keeps scratch games in upstream order and builds their detail URLs.
pub fn filter_scratch(entries: Vec<CatalogEntry>, base_host: &str) -> Vec<CatalogGame> {
    entries
        .into_iter()
        .filter(|e| e.game_type == SCRATCH_GAME_TYPE)
        .map(|e| {
            let game_number = id_to_string(&e.id).unwrap_or_else(|| e.identifier.clone());
            CatalogGame {
                url: game_url(base_host, &e.identifier),
                price: money_from_value(&e.price),
                top_prize: money_from_value(&e.top_prize),
                start_date: e.start_date,
                name: e.name,
                game_number,
            }
        })
        .collect()
}

// ── CatalogFetcher ───────────────────────────────────────────────────────────

pub struct CatalogFetcher {
    client: reqwest::Client,
    config: CatalogConfig,
    logger: Option<EventLogger>,
}

impl CatalogFetcher {
    pub fn new(config: CatalogConfig) -> Self {
        Self {
            client: reqwest::Client::builder()
                .user_agent("Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36")
                .timeout(config.timeout)
                .build()
                .unwrap_or_else(|_| reqwest::Client::new()),
            config,
            logger: None,
        }
    }

    pub fn with_event_log(mut self, log_dir: impl Into<std::path::PathBuf>) -> Self {
        self.logger = Some(EventLogger::new(log_dir));
        self
    }

    /// Current scratch catalog, or an error the caller can act on
    /// (e.g. keep serving the previous snapshot).
    pub async fn fetch_games(&self) -> Result<Vec<CatalogGame>> {
        let url = &self.config.catalog_url;

        let resp = match self.client.get(url)
            .header("Accept", "application/json")
            .send()
            .await
            .context("Catalog request failed")
        {
            Ok(r) => r,
            Err(e) => {
                self.log_status(false, None, &format!("{e:#}"), 0, 0);
                return Err(e);
            }
        };

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            let msg = format!("Catalog HTTP {status}: {}", body.chars().take(200).collect::<String>());
            self.log_status(false, Some(status.as_u16()), &msg, 0, 0);
            return Err(anyhow::anyhow!(msg));
        }

        let raw = resp.text().await.context("Catalog body read failed")?;
        debug!("Catalog raw (first 300): {}", raw.chars().take(300).collect::<String>());

        let entries = match serde_json::from_str::<CatalogResponse>(&raw)
            .context("Catalog JSON parse failed")
        {
            Ok(parsed) => parsed.into_entries(),
            Err(e) => {
                self.log_status(false, Some(status.as_u16()), &format!("{e:#}"), 0, 0);
                return Err(e);
            }
        };

        let total = entries.len();
        let games = filter_scratch(entries, &self.config.base_host);
        info!("Catalog: {} entries, {} scratch games", total, games.len());
        self.log_status(true, Some(status.as_u16()), "ok", total, games.len());

        Ok(games)
    }

    /// Failure collapses to "nothing available".
    pub async fn fetch_games_or_empty(&self) -> Vec<CatalogGame> {
        match self.fetch_games().await {
            Ok(games) => games,
            Err(e) => {
                warn!("Catalog fetch failed, treating as empty: {e:#}");
                Vec::new()
            }
        }
    }

    fn log_status(&self, ok: bool, status_code: Option<u16>, message: &str, total: usize, kept: usize) {
        if let Some(logger) = &self.logger {
            logger.log_or_warn(&CatalogStatusEvent {
                ts:          now_iso(),
                event:       "CATALOG_STATUS",
                source:      self.config.catalog_url.clone(),
                ok,
                status_code,
                message:     message.to_string(),
                items_total: total,
                items_kept:  kept,
            });
        }
    }
}
