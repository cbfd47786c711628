//! One refresh cycle: catalog → scrape batch → EV.

use anyhow::{Context, Result};
use async_trait::async_trait;
use catalog_fetcher::{CatalogFetcher, CatalogGame};
use ev_engine::{evaluate_all, summarize, Snapshot};
use game_scraper::{compact, BatchScheduler, GameScraper};
use std::time::Instant;
use tracing::info;

/// Produces a full snapshot. Errors only for pipeline-level failures;
/// per-game failures just mean fewer games.
#[async_trait]
pub trait SnapshotSource: Send + Sync {
    async fn build(&self) -> Result<Snapshot>;
}

pub struct SnapshotPipeline {
    catalog: CatalogFetcher,
    scraper: GameScraper,
    scheduler: BatchScheduler,
}

impl SnapshotPipeline {
    pub fn new(catalog: CatalogFetcher, scraper: GameScraper, scheduler: BatchScheduler) -> Self {
        Self { catalog, scraper, scheduler }
    }

    /// Scrapes the given targets; output keeps catalog order.
    pub async fn scrape_targets(&self, targets: Vec<CatalogGame>) -> Vec<ev_engine::LotteryGame> {
        let scraper = self.scraper.clone();
        let results = self
            .scheduler
            .run(targets, move |target| {
                let scraper = scraper.clone();
                async move { scraper.scrape(&target.url, target.price).await }
            })
            .await;
        compact(results)
    }
}

#[async_trait]
impl SnapshotSource for SnapshotPipeline {
    async fn build(&self) -> Result<Snapshot> {
        let started = Instant::now();

        // an unreachable catalog must not turn into an empty snapshot
        let targets = self.catalog.fetch_games().await.context("catalog unavailable")?;
        let requested = targets.len();

        let games = evaluate_all(self.scrape_targets(targets).await);
        let summary = summarize(&games);

        info!(
            requested,
            scraped = summary.game_count,
            dropped = requested - summary.game_count,
            mean_ev_per_dollar = format!("{:.3}", summary.mean_ev_per_dollar),
            "Snapshot built in {:?}",
            started.elapsed()
        );
        if let Some((name, evpd)) = &summary.best_game {
            info!("Best EV per dollar: {} ({:.3})", name, evpd);
        }

        Ok(Snapshot::new(games))
    }
}
