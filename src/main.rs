/// ScratchEV — Live EV Observer
///
/// What it does:
///   1. Warms the snapshot cache with one full cycle (catalog → scrape → EV)
///   2. Serves the cached snapshot over HTTP (`/health`, `/snapshot`)
///   3. Ticks a background refresh every `CACHE_REFRESH_AFTER_MINUTES`
///
/// Run:
///   cargo run --bin ev-observer

use anyhow::Result;
use dotenv::dotenv;
use logger::EventLogger;
use scratch_ev_live::{build_pipeline, http, AppConfig, RefreshTrigger, SnapshotService};
use snapshot_cache::SqliteStore;
use std::env;
use std::fs::File;
use std::sync::Arc;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{info, warn};
use tracing_subscriber::{fmt, EnvFilter};

#[tokio::main]
async fn main() -> Result<()> {
    dotenv().ok();

    fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info"))
        )
        .init();

    let cfg = AppConfig::from_env()?;

    info!("=== ScratchEV Observer ===");
    info!("Catalog: {}", cfg.catalog_url);
    info!(
        "Scrape: concurrency={} mode={:?} item_timeout={:?}",
        cfg.scrape_concurrency, cfg.scheduler_mode, cfg.scrape_item_timeout
    );
    info!("Cache: ttl={:?} refresh_after={:?} db={:?}", cfg.cache_ttl, cfg.refresh_after, cfg.cache_db_path);
    info!("Logs: {:?}", cfg.log_dir);

    // Single instance lock
    let lock_file_path = env::temp_dir().join("scratch_ev_observer.lock");
    let lock_file = match File::create(&lock_file_path) {
        Ok(f) => f,
        Err(e) => {
            warn!("Failed to create lock file at {:?}: {}", lock_file_path, e);
            return Ok(());
        }
    };

    let mut lock = fd_lock::RwLock::new(lock_file);
    let _write_guard = match lock.try_write() {
        Ok(guard) => {
            info!("Acquired single-instance lock.");
            guard
        }
        Err(_) => {
            warn!("Another instance of ev-observer is already running! Exiting.");
            return Ok(());
        }
    };

    let store = SqliteStore::open(&cfg.cache_db_path)?;

    let service = SnapshotService::new(store, Arc::new(build_pipeline(&cfg)), cfg.cache_ttl, cfg.refresh_after)
        .with_event_log(Arc::new(EventLogger::new(cfg.log_dir.clone())));

    match service.cached() {
        Some(hit) => info!(
            "Cached snapshot from {} ({} games), serving it until refresh",
            hit.stored_at,
            hit.value.games.len()
        ),
        None => match service.refresh_now(RefreshTrigger::Warmup).await {
            Ok(snap) => info!("Warmup done: {} games", snap.games.len()),
            Err(e) => warn!("Warmup failed, first request will retry: {:#}", e),
        },
    }

    let ticker_service = service.clone();
    let every = cfg.refresh_after;
    tokio::spawn(async move {
        let mut tick = interval(every);
        tick.set_missed_tick_behavior(MissedTickBehavior::Skip);
        tick.tick().await;
        loop {
            tick.tick().await;
            if !ticker_service.trigger_refresh() {
                info!("Refresh tick skipped, previous cycle still running");
            }
        }
    });

    http::start_http_server(service, cfg.http_bind).await
}
