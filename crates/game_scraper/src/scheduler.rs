//! Batch scheduler: runs one async job per input with at most `C` in flight.
//! Output has one slot per input, in input order.

use futures_util::future::join_all;
use futures_util::stream::{self, StreamExt};
use std::future::Future;
use std::num::NonZeroUsize;
use std::str::FromStr;
use std::time::Duration;
use tracing::{debug, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SchedulerMode {
    /// Next job starts as soon as any slot frees.
    #[default]
    Pooled,
    /// Consecutive chunks of `C`; a chunk must finish before the next starts.
    Chunked,
}

impl FromStr for SchedulerMode {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "pooled" | "pool" => Ok(SchedulerMode::Pooled),
            "chunked" | "chunk" => Ok(SchedulerMode::Chunked),
            other => Err(anyhow::anyhow!("unknown scheduler mode '{}'", other)),
        }
    }
}

#[derive(Debug, Clone)]
pub struct BatchScheduler {
    concurrency: NonZeroUsize,
    item_timeout: Option<Duration>,
    mode: SchedulerMode,
}

impl BatchScheduler {
    pub fn new(concurrency: NonZeroUsize, item_timeout: Option<Duration>) -> Self {
        Self {
            concurrency,
            item_timeout,
            mode: SchedulerMode::default(),
        }
    }

    pub fn with_mode(mut self, mode: SchedulerMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn concurrency(&self) -> usize {
        self.concurrency.get()
    }

    pub fn mode(&self) -> SchedulerMode {
        self.mode
    }

    pub async fn run<T, R, F, Fut>(&self, items: Vec<T>, f: F) -> Vec<Option<R>>
    where
        F: FnMut(T) -> Fut,
        Fut: Future<Output = Option<R>>,
    {
        match self.mode {
            SchedulerMode::Pooled => self.run_pooled(items, f).await,
            SchedulerMode::Chunked => self.run_chunked(items, f).await,
        }
    }

    pub async fn run_pooled<T, R, F, Fut>(&self, items: Vec<T>, f: F) -> Vec<Option<R>>
    where
        F: FnMut(T) -> Fut,
        Fut: Future<Output = Option<R>>,
    {
        let timeout = self.item_timeout;
        debug!("Pooled batch: {} items, concurrency {}", items.len(), self.concurrency);

        let mut out: Vec<Option<R>> = (0..items.len()).map(|_| None).collect();

        // unordered so a finished item frees its slot even behind a slow head
        let finished: Vec<(usize, Option<R>)> = stream::iter(items)
            .map(f)
            .enumerate()
            .map(|(idx, fut)| async move { (idx, guarded(idx, fut, timeout).await) })
            .buffer_unordered(self.concurrency.get())
            .collect()
            .await;

        for (idx, res) in finished {
            out[idx] = res;
        }
        out
    }

    pub async fn run_chunked<T, R, F, Fut>(&self, items: Vec<T>, mut f: F) -> Vec<Option<R>>
    where
        F: FnMut(T) -> Fut,
        Fut: Future<Output = Option<R>>,
    {
        let timeout = self.item_timeout;
        let size = self.concurrency.get();
        let total = items.len();
        let mut out = Vec::with_capacity(total);
        let mut items = items.into_iter().enumerate().peekable();

        while items.peek().is_some() {
            let chunk: Vec<_> = items
                .by_ref()
                .take(size)
                .map(|(idx, item)| guarded(idx, f(item), timeout))
                .collect();
            debug!("Chunk of {} ({} / {} done)", chunk.len(), out.len(), total);
            out.extend(join_all(chunk).await);
        }

        out
    }
}

async fn guarded<R, Fut>(idx: usize, fut: Fut, timeout: Option<Duration>) -> Option<R>
where
    Fut: Future<Output = Option<R>>,
{
    match timeout {
        Some(limit) => match tokio::time::timeout(limit, fut).await {
            Ok(res) => res,
            Err(_) => {
                warn!("Batch item {} timed out after {:?}, dropping", idx, limit);
                None
            }
        },
        None => fut.await,
    }
}

/// Drops failed slots, keeps order.
pub fn compact<R>(results: Vec<Option<R>>) -> Vec<R> {
    results.into_iter().flatten().collect()
}
