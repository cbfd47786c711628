//! Page rendering capability.
//!
//! Prize tables are built client-side, so a plain HTTP GET returns an empty
//! shell. `ChromeRenderer` drives headless Chrome; `StaticRenderer` serves
//! canned HTML for fixtures.

use anyhow::{Context, Result};
use headless_chrome::{Browser, LaunchOptions};
use std::collections::HashMap;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

/// Blocking render of a URL into its final HTML.
/// Implementations run on `spawn_blocking`, never on the async executor.
pub trait PageRenderer: Send + Sync {
    fn render(&self, url: &str) -> Result<String>;
}

#[derive(Debug, Clone)]
pub struct ChromeRenderer {
    /// Upper bound for navigation and any single CDP call.
    pub nav_timeout: Duration,
    /// How long to wait for a `<table>` to show up after navigation.
    pub table_wait: Duration,
}

impl Default for ChromeRenderer {
    fn default() -> Self {
        Self {
            nav_timeout: Duration::from_secs(45),
            table_wait: Duration::from_secs(15),
        }
    }
}

impl PageRenderer for ChromeRenderer {
    fn render(&self, url: &str) -> Result<String> {
        let started = Instant::now();

        let options = LaunchOptions::default_builder()
            .headless(true)
            .sandbox(false)
            .idle_browser_timeout(self.nav_timeout)
            .build()
            .context("Failed to build Chrome launch options")?;

        // Chrome process lives exactly as long as `browser`; every `?` below
        // drops it and kills the process.
        let browser = Browser::new(options).context("Failed to launch Chrome")?;
        let tab = browser.new_tab().context("Failed to create browser tab")?;
        tab.set_default_timeout(self.nav_timeout);

        tab.navigate_to(url).context("Chrome navigate failed")?;
        tab.wait_until_navigated().context("Chrome navigation did not settle")?;

        if let Err(e) = tab.wait_for_element_with_custom_timeout("table", self.table_wait) {
            warn!("No prize table on {} after {:?}, parsing what rendered: {}", url, self.table_wait, e);
        }

        let html = tab.get_content().context("Failed to read HTML from browser tab")?;
        debug!("Rendered {} ({} bytes) in {:?}", url, html.len(), started.elapsed());

        drop(tab);
        drop(browser);
        Ok(html)
    }
}

/// url → html map, for tests and offline runs.
#[derive(Debug, Default, Clone)]
pub struct StaticRenderer {
    pages: HashMap<String, String>,
}

impl StaticRenderer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_page(mut self, url: impl Into<String>, html: impl Into<String>) -> Self {
        self.pages.insert(url.into(), html.into());
        self
    }
}

impl PageRenderer for StaticRenderer {
    fn render(&self, url: &str) -> Result<String> {
        self.pages
            .get(url)
            .cloned()
            .ok_or_else(|| anyhow::anyhow!("no page for {}", url))
    }
}
