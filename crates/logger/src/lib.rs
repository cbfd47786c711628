/// ScratchEV — Logger
/// JSONL event stream (one file per UTC day)

use anyhow::Result;
use chrono::Utc;
use serde::Serialize;
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

pub struct EventLogger {
    log_dir: PathBuf,
}

impl EventLogger {
    pub fn new(log_dir: impl Into<PathBuf>) -> Self {
        let dir = log_dir.into();
        fs::create_dir_all(&dir).ok();
        Self { log_dir: dir }
    }

    pub fn log_dir(&self) -> &Path {
        &self.log_dir
    }

    pub fn log<T: Serialize>(&self, event: &T) -> Result<()> {
        let date  = Utc::now().format("%Y-%m-%d").to_string();
        let path  = self.log_dir.join(format!("{date}.jsonl"));
        let line  = serde_json::to_string(event)?;
        let mut f = OpenOptions::new().create(true).append(true).open(&path)?;
        writeln!(f, "{line}")?;
        Ok(())
    }

    /// Same as `log`, but a failed write only ends up in tracing.
    pub fn log_or_warn<T: Serialize>(&self, event: &T) {
        if let Err(e) = self.log(event) {
            tracing::warn!("Event log write failed: {e}");
        }
    }
}

pub fn now_iso() -> String {
    Utc::now().to_rfc3339()
}

// ── Event types ────────────────────────────────────────────────────────────────

#[derive(Serialize, Debug)]
pub struct CatalogStatusEvent {
    pub ts:           String,
    pub event:        &'static str,   // "CATALOG_STATUS"
    pub source:       String,
    pub ok:           bool,
    pub status_code:  Option<u16>,
    pub message:      String,
    pub items_total:  usize,
    pub items_kept:   usize,          // gameType == "Scratch" only
}

#[derive(Serialize, Debug)]
pub struct GameScrapedEvent {
    pub ts:           String,
    pub event:        &'static str,   // "GAME_SCRAPED"
    pub game_number:  String,
    pub name:         String,
    pub url:          String,
    pub tiers:        usize,
    pub rows_skipped: usize,
    pub render_ms:    u64,
}

#[derive(Serialize, Debug)]
pub struct GameDroppedEvent {
    pub ts:           String,
    pub event:        &'static str,   // "GAME_DROPPED"
    pub url:          String,
    pub reason:       String,         // "render_failed" | "unparseable"
    pub detail:       String,
}

#[derive(Serialize, Debug)]
pub struct RefreshCycleEvent {
    pub ts:           String,
    pub event:        &'static str,   // "REFRESH_CYCLE"
    pub trigger:      String,         // "sync_miss" | "background" | "warmup"
    pub ok:           bool,
    pub games:        usize,
    pub duration_ms:  u64,
    pub message:      String,
}
