use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use std::collections::HashMap;
use std::path::Path;
use std::sync::{Mutex, RwLock};

/// Raw cache record as the persistence layer sees it.
#[derive(Debug, Clone, PartialEq)]
pub struct StoredEntry {
    pub payload: String,
    pub stored_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl StoredEntry {
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }
}

/// Get/set key-value collaborator. `set` replaces the whole entry.
pub trait KvStore: Send + Sync {
    fn get(&self, key: &str) -> Result<Option<StoredEntry>>;
    fn set(&self, key: &str, entry: StoredEntry) -> Result<()>;
    fn delete(&self, key: &str) -> Result<()>;
}

// ── In-memory ────────────────────────────────────────────────────────────────

#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: RwLock<HashMap<String, StoredEntry>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.read().map(|m| m.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl KvStore for MemoryStore {
    fn get(&self, key: &str) -> Result<Option<StoredEntry>> {
        let map = self.entries.read().map_err(|_| anyhow::anyhow!("memory store lock poisoned"))?;
        Ok(map.get(key).cloned())
    }

    fn set(&self, key: &str, entry: StoredEntry) -> Result<()> {
        let mut map = self.entries.write().map_err(|_| anyhow::anyhow!("memory store lock poisoned"))?;
        map.insert(key.to_string(), entry);
        Ok(())
    }

    fn delete(&self, key: &str) -> Result<()> {
        let mut map = self.entries.write().map_err(|_| anyhow::anyhow!("memory store lock poisoned"))?;
        map.remove(key);
        Ok(())
    }
}

// ── SQLite ───────────────────────────────────────────────────────────────────

/// Survives restarts, so a fresh process can serve the last snapshot immediately.
pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let db_path = path.as_ref();
        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent).ok();
        }

        let conn = Connection::open(db_path).context("open sqlite db")?;
        conn.pragma_update(None, "journal_mode", "WAL").ok();
        conn.pragma_update(None, "synchronous", "NORMAL").ok();
        Self::with_connection(conn)
    }

    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().context("open in-memory sqlite")?;
        Self::with_connection(conn)
    }

    fn with_connection(conn: Connection) -> Result<Self> {
        init_schema(&conn)?;
        Ok(Self { conn: Mutex::new(conn) })
    }

    fn conn(&self) -> Result<std::sync::MutexGuard<'_, Connection>> {
        self.conn.lock().map_err(|_| anyhow::anyhow!("sqlite connection lock poisoned"))
    }

    /// All entries, newest first. Used by the stats binary.
    pub fn entries(&self) -> Result<Vec<(String, StoredEntry)>> {
        let conn = self.conn()?;
        let mut stmt = conn
            .prepare("SELECT key, payload, stored_at, expires_at FROM cache_entries ORDER BY stored_at DESC")
            .context("prepare entries")?;

        let rows = stmt
            .query_map([], |r| {
                Ok((
                    r.get::<_, String>(0)?,
                    r.get::<_, String>(1)?,
                    r.get::<_, String>(2)?,
                    r.get::<_, String>(3)?,
                ))
            })
            .context("query entries")?;

        let mut out = Vec::new();
        for row in rows {
            let (key, payload, stored_at, expires_at) = row?;
            out.push((key, entry_from_row(payload, &stored_at, &expires_at)?));
        }
        Ok(out)
    }
}

fn init_schema(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        r#"
        CREATE TABLE IF NOT EXISTS cache_entries (
            key TEXT PRIMARY KEY,
            payload TEXT NOT NULL,
            stored_at TEXT NOT NULL,
            expires_at TEXT NOT NULL
        );
        "#,
    ).context("init schema")?;

    Ok(())
}

fn parse_ts(raw: &str) -> Result<DateTime<Utc>> {
    Ok(DateTime::parse_from_rfc3339(raw)
        .with_context(|| format!("bad timestamp '{raw}'"))?
        .with_timezone(&Utc))
}

fn entry_from_row(payload: String, stored_at: &str, expires_at: &str) -> Result<StoredEntry> {
    Ok(StoredEntry {
        payload,
        stored_at: parse_ts(stored_at)?,
        expires_at: parse_ts(expires_at)?,
    })
}

impl KvStore for SqliteStore {
    fn get(&self, key: &str) -> Result<Option<StoredEntry>> {
        let conn = self.conn()?;
        let row: Option<(String, String, String)> = conn
            .query_row(
                "SELECT payload, stored_at, expires_at FROM cache_entries WHERE key = ?1",
                params![key],
                |r| Ok((r.get(0)?, r.get(1)?, r.get(2)?)),
            )
            .optional()
            .context("read cache entry")?;

        row.map(|(payload, stored_at, expires_at)| entry_from_row(payload, &stored_at, &expires_at))
            .transpose()
    }

    fn set(&self, key: &str, entry: StoredEntry) -> Result<()> {
        let conn = self.conn()?;
        conn.execute(
            r#"
            INSERT INTO cache_entries(key, payload, stored_at, expires_at)
            VALUES (?1, ?2, ?3, ?4)
            ON CONFLICT(key) DO UPDATE SET
                payload=excluded.payload,
                stored_at=excluded.stored_at,
                expires_at=excluded.expires_at
            "#,
            params![key, entry.payload, entry.stored_at.to_rfc3339(), entry.expires_at.to_rfc3339()],
        ).context("write cache entry")?;
        Ok(())
    }

    fn delete(&self, key: &str) -> Result<()> {
        let conn = self.conn()?;
        conn.execute("DELETE FROM cache_entries WHERE key = ?1", params![key])
            .context("delete cache entry")?;
        Ok(())
    }
}
