use anyhow::{Context, Result};
use chrono::Utc;
use ev_engine::{rank_by_ev_per_dollar, Snapshot};
use snapshot_cache::{SqliteStore, SNAPSHOT_KEY};

fn main() -> Result<()> {
    dotenv::dotenv().ok();
    let db_path = std::env::var("EV_CACHE_DB_PATH").unwrap_or_else(|_| "data/ev_cache.db".to_string());
    let store = SqliteStore::open(&db_path).with_context(|| format!("open db at {db_path}"))?;

    let entries = store.entries().context("read cache entries")?;
    let now = Utc::now();

    println!("db_path={db_path}");
    println!("cache_entries: {}", entries.len());
    for (key, entry) in &entries {
        println!(
            "{key}: stored_at={} expires_at={} expired={} bytes={}",
            entry.stored_at.to_rfc3339(),
            entry.expires_at.to_rfc3339(),
            entry.is_expired_at(now),
            entry.payload.len()
        );
    }

    let Some((_, entry)) = entries.iter().find(|(k, _)| k == SNAPSHOT_KEY) else {
        println!("snapshot: <none>");
        return Ok(());
    };

    let snapshot: Snapshot = serde_json::from_str(&entry.payload).context("decode snapshot payload")?;
    println!("snapshot: updated_at={} games={}", snapshot.updated_at.to_rfc3339(), snapshot.games.len());

    let mut games = snapshot.games;
    rank_by_ev_per_dollar(&mut games);
    for (i, g) in games.iter().take(5).enumerate() {
        println!(
            "#{} {:<32} price=${:<6.2} ev/$={:.4} net={:+.2}",
            i + 1,
            g.game.name,
            g.game.price,
            g.ev_per_dollar,
            g.net_current_ev
        );
    }

    Ok(())
}
