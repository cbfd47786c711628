//! Result cache with per-entry TTL and a process-wide refresh guard.
//!
//! Expiry is lazy: an expired entry is purged by the read that finds it.
//! Store errors never reach callers, a failed read is a miss and a failed
//! write leaves the previous entry in place.

mod store;

pub use store::{KvStore, MemoryStore, SqliteStore, StoredEntry};

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// Key of the "current catalog snapshot" entry.
pub const SNAPSHOT_KEY: &str = "scratch:snapshot:current";
pub const DEFAULT_TTL_MINUTES: u64 = 60;

#[derive(Debug, Clone, PartialEq)]
pub struct Cached<T> {
    pub value: T,
    pub stored_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl<T> Cached<T> {
    pub fn age(&self) -> Duration {
        (Utc::now() - self.stored_at).to_std().unwrap_or_default()
    }
}

fn to_chrono(d: Duration) -> chrono::Duration {
    chrono::Duration::from_std(d).unwrap_or_else(|_| chrono::Duration::days(36_500))
}

pub struct ResultCache<S: KvStore> {
    store: S,
}

impl<S: KvStore> ResultCache<S> {
    pub fn new(store: S) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Live entry or `None`. Expired and undecodable entries are removed.
    pub fn get<T: DeserializeOwned>(&self, key: &str) -> Option<Cached<T>> {
        let entry = match self.store.get(key) {
            Ok(Some(entry)) => entry,
            Ok(None) => return None,
            Err(e) => {
                warn!("Cache read failed for {}, treating as miss: {:#}", key, e);
                return None;
            }
        };

        if entry.is_expired_at(Utc::now()) {
            debug!("Cache entry {} expired at {}, purging", key, entry.expires_at);
            self.purge(key);
            return None;
        }

        match serde_json::from_str::<T>(&entry.payload) {
            Ok(value) => Some(Cached {
                value,
                stored_at: entry.stored_at,
                expires_at: entry.expires_at,
            }),
            Err(e) => {
                warn!("Cache entry {} does not decode, purging: {}", key, e);
                self.purge(key);
                None
            }
        }
    }

    /// Replaces whatever is stored under `key`.
    pub fn set<T: Serialize>(&self, key: &str, value: &T, ttl: Duration) -> Result<()> {
        let payload = serde_json::to_string(value).context("serialize cache payload")?;
        let stored_at = Utc::now();
        self.store
            .set(
                key,
                StoredEntry {
                    payload,
                    stored_at,
                    expires_at: stored_at + to_chrono(ttl),
                },
            )
            .with_context(|| format!("cache write for {key}"))
    }

    pub fn invalidate(&self, key: &str) {
        self.purge(key);
    }

    fn purge(&self, key: &str) {
        if let Err(e) = self.store.delete(key) {
            warn!("Cache delete failed for {}: {:#}", key, e);
        }
    }
}

// ── Refresh lock ─────────────────────────────────────────────────────────────

/// At most one refresh cycle in flight. Acquire never waits.
#[derive(Debug, Default)]
pub struct RefreshLock {
    busy: AtomicBool,
}

impl RefreshLock {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// `None` if a refresh is already running.
    pub fn try_acquire(self: &Arc<Self>) -> Option<RefreshGuard> {
        self.busy
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| RefreshGuard { lock: Arc::clone(self) })
    }

    pub fn is_refreshing(&self) -> bool {
        self.busy.load(Ordering::Acquire)
    }
}

/// Releases the lock on drop, including unwinding.
#[derive(Debug)]
pub struct RefreshGuard {
    lock: Arc<RefreshLock>,
}

impl Drop for RefreshGuard {
    fn drop(&mut self) {
        self.lock.busy.store(false, Ordering::Release);
    }
}
