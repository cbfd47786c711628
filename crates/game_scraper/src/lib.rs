//! Scratch game page scraper
//!
//! Prize tables on the game detail pages are rendered by JavaScript, so each
//! page goes through a `PageRenderer` (headless Chrome in production) and the
//! resulting HTML through `parse`.
//!
//! Detail page: `<base-host>/games/draw-and-instants/<identifier>`
//! Prize row:   `<td>$250,0001 in 129,230.77 odds</td><td>39 Start9 Claimed30 Remaining</td>`

pub mod parse;
pub mod renderer;
pub mod scheduler;

pub use parse::{GameParse, ParseStats, RowSkip};
pub use renderer::{ChromeRenderer, PageRenderer, StaticRenderer};
pub use scheduler::{compact, BatchScheduler, SchedulerMode};

use ev_engine::LotteryGame;
use logger::{now_iso, EventLogger, GameDroppedEvent, GameScrapedEvent};
use std::num::NonZeroUsize;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::Semaphore;
use tokio::task;
use tracing::{debug, info, warn};

/// Renders and parses one game page. Cheap to clone, shares the renderer.
#[derive(Clone)]
pub struct GameScraper {
    renderer: Arc<dyn PageRenderer>,
    logger: Option<Arc<EventLogger>>,
    /// Caps live renders. A permit is held by the blocking thread, so it
    /// outlives a caller that gave up on the render.
    render_slots: Option<Arc<Semaphore>>,
}

impl GameScraper {
    pub fn new(renderer: Arc<dyn PageRenderer>) -> Self {
        Self {
            renderer,
            logger: None,
            render_slots: None,
        }
    }

    /// At most `limit` renders at once across all clones of this scraper.
    pub fn with_render_limit(mut self, limit: NonZeroUsize) -> Self {
        self.render_slots = Some(Arc::new(Semaphore::new(limit.get())));
        self
    }

    pub fn with_event_log(mut self, logger: Arc<EventLogger>) -> Self {
        self.logger = Some(logger);
        self
    }

    async fn render(&self, url: &str) -> anyhow::Result<String> {
        let permit = match &self.render_slots {
            Some(slots) => Some(Arc::clone(slots).acquire_owned().await?),
            None => None,
        };
        let renderer = Arc::clone(&self.renderer);
        let url = url.to_string();
        task::spawn_blocking(move || {
            let _permit = permit;
            renderer.render(&url)
        })
        .await?
    }

    /// `None` when the page failed to render or had no usable prize rows.
    pub async fn scrape(&self, url: &str, known_price: Option<f64>) -> Option<LotteryGame> {
        let started = Instant::now();

        let html = match self.render(url).await {
            Ok(html) => html,
            Err(e) => {
                warn!("Render failed for {}: {:#}", url, e);
                self.log_dropped(url, "render_failed", &format!("{e:#}"));
                return None;
            }
        };
        let render_ms = started.elapsed().as_millis() as u64;

        let GameParse { game, stats } = parse::parse_game_page(&html, url, known_price);
        debug!("Parse stats for {}: {:?}", url, stats);

        let Some(game) = game else {
            warn!(
                "No prize tiers on {} ({} tables, {} rows skipped), dropping game",
                url,
                stats.tables_seen,
                stats.rows_skipped()
            );
            self.log_dropped(url, "unparseable", &format!("{:?}", stats.skipped));
            return None;
        };

        info!(
            "Scraped {} #{}: {} tiers, {} rows skipped, {}ms",
            game.name,
            game.game_number,
            game.prize_tiers.len(),
            stats.rows_skipped(),
            render_ms
        );
        if let Some(logger) = &self.logger {
            logger.log_or_warn(&GameScrapedEvent {
                ts: now_iso(),
                event: "GAME_SCRAPED",
                game_number: game.game_number.clone(),
                name: game.name.clone(),
                url: url.to_string(),
                tiers: game.prize_tiers.len(),
                rows_skipped: stats.rows_skipped(),
                render_ms,
            });
        }

        Some(game)
    }

    fn log_dropped(&self, url: &str, reason: &str, detail: &str) {
        if let Some(logger) = &self.logger {
            logger.log_or_warn(&GameDroppedEvent {
                ts: now_iso(),
                event: "GAME_DROPPED",
                url: url.to_string(),
                reason: reason.to_string(),
                detail: detail.to_string(),
            });
        }
    }
}
