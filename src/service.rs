//! Snapshot service: cache fast path, synchronous fill on miss, and at most
//! one background refresh at a time.

use crate::pipeline::SnapshotSource;
use anyhow::Result;
use ev_engine::Snapshot;
use logger::{now_iso, EventLogger, RefreshCycleEvent};
use snapshot_cache::{Cached, KvStore, RefreshLock, ResultCache, SNAPSHOT_KEY};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefreshTrigger {
    SyncMiss,
    Background,
    Warmup,
}

impl RefreshTrigger {
    fn as_str(&self) -> &'static str {
        match self {
            RefreshTrigger::SyncMiss => "sync_miss",
            RefreshTrigger::Background => "background",
            RefreshTrigger::Warmup => "warmup",
        }
    }
}

struct Inner<S: KvStore> {
    cache: ResultCache<S>,
    source: Arc<dyn SnapshotSource>,
    lock: Arc<RefreshLock>,
    /// Coalesces concurrent misses into one live cycle.
    miss_gate: Mutex<()>,
    ttl: Duration,
    refresh_after: Duration,
}

pub struct SnapshotService<S: KvStore + 'static> {
    inner: Arc<Inner<S>>,
    logger: Option<Arc<EventLogger>>,
}

impl<S: KvStore + 'static> Clone for SnapshotService<S> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
            logger: self.logger.clone(),
        }
    }
}

impl<S: KvStore + 'static> SnapshotService<S> {
    /// `refresh_after` is the age at which a still-live entry triggers a
    /// background refresh; it is capped at `ttl`.
    pub fn new(store: S, source: Arc<dyn SnapshotSource>, ttl: Duration, refresh_after: Duration) -> Self {
        Self {
            inner: Arc::new(Inner {
                cache: ResultCache::new(store),
                source,
                lock: RefreshLock::new(),
                miss_gate: Mutex::new(()),
                ttl,
                refresh_after: refresh_after.min(ttl),
            }),
            logger: None,
        }
    }

    pub fn with_event_log(mut self, logger: Arc<EventLogger>) -> Self {
        self.logger = Some(logger);
        self
    }

    pub fn ttl(&self) -> Duration {
        self.inner.ttl
    }

    pub fn is_refreshing(&self) -> bool {
        self.inner.lock.is_refreshing()
    }

    /// Current entry without side effects.
    pub fn cached(&self) -> Option<Cached<Snapshot>> {
        self.inner.cache.get(SNAPSHOT_KEY)
    }

    pub fn invalidate(&self) {
        self.inner.cache.invalidate(SNAPSHOT_KEY);
    }

    /// Fresh entry → returned immediately (plus a background refresh once it
    /// is older than `refresh_after`). Miss → live cycle, cached, returned.
    pub async fn get_snapshot(&self) -> Result<Snapshot> {
        if let Some(hit) = self.cached() {
            if hit.age() >= self.inner.refresh_after {
                self.trigger_refresh();
            }
            return Ok(hit.value);
        }

        let _gate = self.inner.miss_gate.lock().await;
        // another miss may have filled the cache while we waited
        if let Some(hit) = self.cached() {
            return Ok(hit.value);
        }
        self.refresh_now(RefreshTrigger::SyncMiss).await
    }

    /// Starts a background cycle unless one is already running.
    /// Returns whether a cycle was started; a dropped request is not queued.
    pub fn trigger_refresh(&self) -> bool {
        let Some(guard) = self.inner.lock.try_acquire() else {
            debug!("Refresh already in flight, dropping request");
            return false;
        };

        let this = self.clone();
        tokio::spawn(async move {
            let _guard = guard;
            if let Err(e) = this.run_cycle(RefreshTrigger::Background).await {
                warn!("Background refresh failed, keeping previous snapshot: {:#}", e);
            }
        });
        true
    }

    /// Runs a cycle in the caller's task and writes the result to the cache.
    /// Holds the refresh lock when it is free so background triggers are
    /// dropped meanwhile; never waits for it.
    pub async fn refresh_now(&self, trigger: RefreshTrigger) -> Result<Snapshot> {
        let _guard = self.inner.lock.try_acquire();
        self.run_cycle(trigger).await
    }

    async fn run_cycle(&self, trigger: RefreshTrigger) -> Result<Snapshot> {
        let started = Instant::now();
        let result = self.inner.source.build().await;
        let duration_ms = started.elapsed().as_millis() as u64;

        let (ok, games, message) = match &result {
            Ok(snapshot) => {
                let message = match self.inner.cache.set(SNAPSHOT_KEY, snapshot, self.inner.ttl) {
                    Ok(()) => "ok".to_string(),
                    Err(e) => {
                        warn!("Snapshot not cached: {:#}", e);
                        format!("cache_write_failed: {e:#}")
                    }
                };
                info!(
                    "Refresh ({}) done: {} games in {}ms",
                    trigger.as_str(),
                    snapshot.games.len(),
                    duration_ms
                );
                (true, snapshot.games.len(), message)
            }
            Err(e) => (false, 0, format!("{e:#}")),
        };

        if let Some(logger) = &self.logger {
            logger.log_or_warn(&RefreshCycleEvent {
                ts: now_iso(),
                event: "REFRESH_CYCLE",
                trigger: trigger.as_str().to_string(),
                ok,
                games,
                duration_ms,
                message,
            });
        }

        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use ev_engine::{evaluate, LotteryGame, OverallOdds, PrizeTier};
    use snapshot_cache::{MemoryStore, StoredEntry};
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

    struct FakeSource {
        builds: AtomicUsize,
        in_flight: AtomicUsize,
        peak: AtomicUsize,
        fail: AtomicBool,
        delay: Duration,
    }

    impl FakeSource {
        fn new(delay_ms: u64) -> Arc<Self> {
            Arc::new(Self {
                builds: AtomicUsize::new(0),
                in_flight: AtomicUsize::new(0),
                peak: AtomicUsize::new(0),
                fail: AtomicBool::new(false),
                delay: Duration::from_millis(delay_ms),
            })
        }

        fn builds(&self) -> usize {
            self.builds.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl SnapshotSource for FakeSource {
        async fn build(&self) -> Result<Snapshot> {
            let n = self.builds.fetch_add(1, Ordering::SeqCst) + 1;
            let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(now, Ordering::SeqCst);
            tokio::time::sleep(self.delay).await;
            self.in_flight.fetch_sub(1, Ordering::SeqCst);

            if self.fail.load(Ordering::SeqCst) {
                anyhow::bail!("catalog unavailable");
            }
            Ok(Snapshot::new(vec![evaluate(LotteryGame {
                name: format!("Build {n}"),
                game_number: n.to_string(),
                price: 5.0,
                overall_odds: OverallOdds::default(),
                source_url: format!("https://lottery.test/games/draw-and-instants/{n}"),
                prize_tiers: vec![PrizeTier {
                    label: "$100".to_string(),
                    prize_value: 100.0,
                    odds: 50.0,
                    prizes_at_start: 10,
                    prizes_remaining: 5,
                }],
                last_updated: None,
            })]))
        }
    }

    fn service(source: Arc<FakeSource>, refresh_after: Duration) -> SnapshotService<MemoryStore> {
        SnapshotService::new(MemoryStore::new(), source, Duration::from_secs(60), refresh_after)
    }

    async fn wait_idle(svc: &SnapshotService<MemoryStore>) {
        for _ in 0..200 {
            if !svc.is_refreshing() {
                return;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        panic!("refresh never finished");
    }

    #[tokio::test]
    async fn miss_builds_synchronously_then_hits() {
        let source = FakeSource::new(0);
        let svc = service(source.clone(), Duration::from_secs(60));

        let first = svc.get_snapshot().await.unwrap();
        assert_eq!(source.builds(), 1);
        assert_eq!(first.games[0].game.game_number, "1");

        let second = svc.get_snapshot().await.unwrap();
        assert_eq!(source.builds(), 1);
        assert_eq!(second, first);
        assert!(!svc.is_refreshing());
    }

    #[tokio::test]
    async fn concurrent_misses_share_one_cycle() {
        let source = FakeSource::new(30);
        let svc = service(source.clone(), Duration::from_secs(60));

        let calls: Vec<_> = (0..5)
            .map(|_| {
                let svc = svc.clone();
                tokio::spawn(async move { svc.get_snapshot().await })
            })
            .collect();
        for call in calls {
            assert!(call.await.unwrap().is_ok());
        }
        assert_eq!(source.builds(), 1);
    }

    #[tokio::test]
    async fn aging_entry_is_served_and_refreshed_once_in_background() {
        let source = FakeSource::new(50);
        let svc = service(source.clone(), Duration::ZERO);

        let first = svc.get_snapshot().await.unwrap();
        assert_eq!(source.builds(), 1);

        // every read returns the cached entry at once; only one refresh starts
        for _ in 0..5 {
            let snap = svc.get_snapshot().await.unwrap();
            assert_eq!(snap, first);
        }
        assert!(svc.is_refreshing());
        assert!(!svc.trigger_refresh());

        wait_idle(&svc).await;
        assert_eq!(source.builds(), 2);
        assert_eq!(source.peak.load(Ordering::SeqCst), 1);

        let refreshed = svc.cached().unwrap().value;
        assert_eq!(refreshed.games[0].game.game_number, "2");
    }

    #[tokio::test]
    async fn failed_background_refresh_keeps_entry_and_releases_lock() {
        let source = FakeSource::new(0);
        let svc = service(source.clone(), Duration::from_secs(60));
        let first = svc.get_snapshot().await.unwrap();

        source.fail.store(true, Ordering::SeqCst);
        assert!(svc.trigger_refresh());
        wait_idle(&svc).await;

        assert_eq!(source.builds(), 2);
        assert_eq!(svc.cached().unwrap().value, first);
        assert!(svc.trigger_refresh());
        wait_idle(&svc).await;
    }

    #[tokio::test]
    async fn miss_with_failing_source_surfaces_error() {
        let source = FakeSource::new(0);
        source.fail.store(true, Ordering::SeqCst);
        let svc = service(source.clone(), Duration::from_secs(60));

        let err = svc.get_snapshot().await.unwrap_err();
        assert!(err.to_string().contains("catalog unavailable"));
        assert!(svc.cached().is_none());
        assert!(!svc.is_refreshing());
    }

    #[tokio::test]
    async fn expired_entry_falls_through_to_live_cycle() {
        let source = FakeSource::new(0);
        let svc = service(source.clone(), Duration::from_secs(60));
        svc.get_snapshot().await.unwrap();

        svc.invalidate();
        let snap = svc.get_snapshot().await.unwrap();
        assert_eq!(source.builds(), 2);
        assert_eq!(snap.games[0].game.game_number, "2");
    }

    struct BrokenStore;

    impl KvStore for BrokenStore {
        fn get(&self, _key: &str) -> Result<Option<StoredEntry>> {
            anyhow::bail!("db offline")
        }
        fn set(&self, _key: &str, _entry: StoredEntry) -> Result<()> {
            anyhow::bail!("db offline")
        }
        fn delete(&self, _key: &str) -> Result<()> {
            anyhow::bail!("db offline")
        }
    }

    #[tokio::test]
    async fn broken_store_still_answers_from_live_cycle() {
        let source = FakeSource::new(0);
        let svc = SnapshotService::new(BrokenStore, source.clone(), Duration::from_secs(60), Duration::from_secs(30));

        assert!(svc.get_snapshot().await.is_ok());
        assert!(svc.get_snapshot().await.is_ok());
        assert_eq!(source.builds(), 2);
    }
}
