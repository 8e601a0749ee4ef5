use anyhow::Result;
use rusqlite::Connection;

/// Async database wrapper around `tokio_rusqlite::Connection`.
///
/// Runs all SQLite operations on a dedicated background thread via
/// `tokio_rusqlite`, keeping the Tokio runtime cooperative. Clone is
/// cheap (shared mpsc sender to the background thread). Because every
/// caller goes through the same connection thread, reads always observe
/// prior writes and single-row inserts are atomic, which is what the
/// sweep loop and concurrent admin commands rely on.
#[derive(Clone)]
pub struct AsyncDb {
    conn: tokio_rusqlite::Connection,
}

impl AsyncDb {
    /// Open a database at `path`, set PRAGMAs (WAL, foreign keys,
    /// busy_timeout) and run migrations on the background thread.
    pub async fn open(path: &str) -> Result<Self> {
        let conn = tokio_rusqlite::Connection::open(path).await?;

        conn.call(|conn| -> std::result::Result<(), rusqlite::Error> {
            // An admin CLI invocation can hold the write lock while the
            // collector starts; let SQLite retry instead of failing.
            conn.busy_timeout(std::time::Duration::from_secs(30))?;
            conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA foreign_keys=ON;")?;
            conn.execute_batch(SCHEMA)?;
            migrate_signals_auto_column(conn)?;
            Ok(())
        })
        .await
        .map_err(|e| anyhow::anyhow!("AsyncDb::open: migration failed: {e}"))?;

        Ok(Self { conn })
    }

    /// Run a closure on the background SQLite thread and return the result.
    pub async fn call<F, R>(&self, function: F) -> Result<R>
    where
        F: FnOnce(&mut rusqlite::Connection) -> Result<R> + Send + 'static,
        R: Send + 'static,
    {
        self.conn.call(move |conn| function(conn)).await.map_err(
            |e: tokio_rusqlite::Error<anyhow::Error>| match e {
                tokio_rusqlite::Error::ConnectionClosed => {
                    anyhow::anyhow!("database connection closed")
                }
                tokio_rusqlite::Error::Close((_, err)) => {
                    anyhow::anyhow!("database close error: {err}")
                }
                tokio_rusqlite::Error::Error(err) => err,
                other => anyhow::anyhow!("database error: {other}"),
            },
        )
    }

    /// Like [`Self::call`], but records latency and error metrics per
    /// operation. Measures the full wall-clock time including queueing on
    /// the SQLite thread.
    pub async fn call_named<F, R>(&self, op: &'static str, function: F) -> Result<R>
    where
        F: FnOnce(&mut rusqlite::Connection) -> Result<R> + Send + 'static,
        R: Send + 'static,
    {
        let start = std::time::Instant::now();
        let res = self.call(function).await;
        let ms = start.elapsed().as_secs_f64() * 1000.0;

        match &res {
            Ok(_) => {
                metrics::histogram!(
                    "collector_db_query_latency_ms",
                    "op" => op,
                    "status" => "ok"
                )
                .record(ms);
            }
            Err(_) => {
                metrics::histogram!(
                    "collector_db_query_latency_ms",
                    "op" => op,
                    "status" => "err"
                )
                .record(ms);
                metrics::counter!("collector_db_query_errors_total", "op" => op).increment(1);
            }
        }

        res
    }
}

/// Add the `auto` column to signals for databases created before
/// subscription discovery existed.
fn migrate_signals_auto_column(conn: &Connection) -> std::result::Result<(), rusqlite::Error> {
    let has: i64 = conn.query_row(
        "SELECT COUNT(*) FROM pragma_table_info('signals') WHERE name='auto'",
        [],
        |row| row.get(0),
    )?;
    if has == 0 {
        conn.execute(
            "ALTER TABLE signals ADD COLUMN auto INTEGER NOT NULL DEFAULT 0",
            [],
        )?;
    }
    Ok(())
}

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS signals (
    id           TEXT PRIMARY KEY,      -- opaque id from the source URL
    url          TEXT NOT NULL,
    name         TEXT,
    auto         INTEGER NOT NULL DEFAULT 0,  -- 1 = added by discovery
    weeks        INTEGER,
    start_year   INTEGER,
    latest_trade INTEGER,               -- minutes since last trade
    added_at     TEXT NOT NULL DEFAULT (datetime('now'))
);

-- Append-only observation history. One row per (signal, second);
-- replaying a sweep within the same second is a silent no-op.
CREATE TABLE IF NOT EXISTS signal_history (
    id             INTEGER PRIMARY KEY AUTOINCREMENT,
    signal_id      TEXT NOT NULL,
    captured_at    INTEGER NOT NULL,   -- unix epoch seconds
    name           TEXT,
    growth         REAL,
    drawdown       REAL,
    monthly_growth REAL,
    weeks          INTEGER,
    start_year     INTEGER,
    latest_trade   INTEGER,
    trades         INTEGER,
    profit_trades  INTEGER,
    loss_trades    INTEGER,
    UNIQUE(signal_id, captured_at)
);

CREATE TABLE IF NOT EXISTS users (
    id          INTEGER PRIMARY KEY,
    name        TEXT,
    description TEXT,
    is_admin    INTEGER NOT NULL DEFAULT 0
);

CREATE TABLE IF NOT EXISTS settings (
    key        TEXT PRIMARY KEY,
    value      TEXT NOT NULL,
    updated_at TEXT NOT NULL DEFAULT (datetime('now'))
);

CREATE INDEX IF NOT EXISTS idx_signal_history_signal_captured
    ON signal_history(signal_id, captured_at);
"#;

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_open_creates_all_tables() {
        let db = AsyncDb::open(":memory:").await.unwrap();
        let tables: Vec<String> = db
            .call(|conn| {
                let mut stmt = conn
                    .prepare("SELECT name FROM sqlite_master WHERE type='table' ORDER BY name")?;
                let rows = stmt
                    .query_map([], |row| row.get(0))?
                    .filter_map(std::result::Result::ok)
                    .collect();
                Ok(rows)
            })
            .await
            .unwrap();

        assert!(tables.contains(&"signals".to_string()));
        assert!(tables.contains(&"signal_history".to_string()));
        assert!(tables.contains(&"users".to_string()));
        assert!(tables.contains(&"settings".to_string()));
    }

    #[tokio::test]
    async fn test_open_is_idempotent_on_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("collector.db");
        let path = path.to_str().unwrap();

        {
            let db = AsyncDb::open(path).await.unwrap();
            db.call(|conn| {
                conn.execute(
                    "INSERT INTO signals (id, url) VALUES ('123', 'https://example.test/123')",
                    [],
                )?;
                Ok(())
            })
            .await
            .unwrap();
        }

        // Second open reruns migrations against the existing file.
        let db = AsyncDb::open(path).await.unwrap();
        let count: i64 = db
            .call(|conn| Ok(conn.query_row("SELECT COUNT(*) FROM signals", [], |r| r.get(0))?))
            .await
            .unwrap();
        assert_eq!(count, 1);
    }

    #[tokio::test]
    async fn test_history_unique_constraint() {
        let db = AsyncDb::open(":memory:").await.unwrap();
        let inserted: usize = db
            .call(|conn| {
                conn.execute(
                    "INSERT INTO signal_history (signal_id, captured_at) VALUES ('1', 100)",
                    [],
                )?;
                Ok(conn.execute(
                    "INSERT OR IGNORE INTO signal_history (signal_id, captured_at) VALUES ('1', 100)",
                    [],
                )?)
            })
            .await
            .unwrap();
        assert_eq!(inserted, 0);
    }

    #[tokio::test]
    async fn test_async_db_is_clone_and_send() {
        let db = AsyncDb::open(":memory:").await.unwrap();
        let db2 = db.clone();

        db.call(|conn| {
            conn.execute(
                "INSERT INTO signals (id, url) VALUES ('42', 'https://example.test/42')",
                [],
            )?;
            Ok(())
        })
        .await
        .unwrap();

        // Same underlying connection thread, so the clone sees the write.
        let url: String = db2
            .call(|conn| {
                Ok(conn.query_row("SELECT url FROM signals WHERE id = '42'", [], |row| {
                    row.get(0)
                })?)
            })
            .await
            .unwrap();
        assert_eq!(url, "https://example.test/42");
    }

    #[tokio::test]
    async fn test_call_returns_error_on_bad_sql() {
        let db = AsyncDb::open(":memory:").await.unwrap();
        let result: Result<()> = db
            .call(|conn| {
                conn.execute("INVALID SQL", [])?;
                Ok(())
            })
            .await;
        assert!(result.is_err());
    }
}
