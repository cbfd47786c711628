//! ScratchEV — catalog → scrape → EV → cached snapshot.

pub mod config;
pub mod http;
pub mod pipeline;
pub mod service;

pub use config::AppConfig;
pub use pipeline::{SnapshotPipeline, SnapshotSource};
pub use service::{RefreshTrigger, SnapshotService};

use catalog_fetcher::{CatalogConfig, CatalogFetcher};
use game_scraper::{BatchScheduler, ChromeRenderer, GameScraper};
use logger::EventLogger;
use std::sync::Arc;

/// Production wiring: HTTP catalog, headless Chrome, configured scheduler.
pub fn build_pipeline(cfg: &AppConfig) -> SnapshotPipeline {
    let catalog = CatalogFetcher::new(CatalogConfig {
        catalog_url: cfg.catalog_url.clone(),
        base_host: cfg.base_url.clone(),
        timeout: cfg.catalog_timeout,
    })
    .with_event_log(cfg.log_dir.clone());

    let renderer = ChromeRenderer {
        nav_timeout: cfg.scrape_nav_timeout,
        table_wait: cfg.scrape_table_wait,
    };
    let scraper = GameScraper::new(Arc::new(renderer))
        .with_render_limit(cfg.scrape_concurrency)
        .with_event_log(Arc::new(EventLogger::new(cfg.log_dir.clone())));

    let scheduler =
        BatchScheduler::new(cfg.scrape_concurrency, Some(cfg.scrape_item_timeout)).with_mode(cfg.scheduler_mode);

    SnapshotPipeline::new(catalog, scraper, scheduler)
}
