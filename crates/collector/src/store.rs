//! Persistence for the signal roster, the append-only snapshot history,
//! the subscriber roster and the auth cookie.
//!
//! All operations run on the shared [`AsyncDb`] connection thread, so a
//! read issued after an append sees it, and single-row inserts are
//! atomic without extra locking. Storage failures surface as `Err`;
//! constraint races (duplicate snapshot, duplicate signal id) are
//! swallowed into `Ok(false)`.

use anyhow::Result;
use common::db::AsyncDb;
use common::types::{Signal, Snapshot};
use rusqlite::OptionalExtension;

const HISTORY_COLS: &str = "signal_id, captured_at, name, growth, drawdown, monthly_growth, \
     weeks, start_year, latest_trade, trades, profit_trades, loss_trades";

fn row_to_snapshot(row: &rusqlite::Row<'_>) -> rusqlite::Result<Snapshot> {
    Ok(Snapshot {
        signal_id: row.get(0)?,
        captured_at: row.get(1)?,
        name: row.get(2)?,
        growth: row.get(3)?,
        drawdown: row.get(4)?,
        monthly_growth: row.get(5)?,
        weeks: row.get(6)?,
        start_year: row.get(7)?,
        latest_trade: row.get(8)?,
        trades: row.get(9)?,
        profit_trades: row.get(10)?,
        loss_trades: row.get(11)?,
    })
}

fn row_to_signal(row: &rusqlite::Row<'_>) -> rusqlite::Result<Signal> {
    Ok(Signal {
        id: row.get(0)?,
        url: row.get(1)?,
        name: row.get(2)?,
        auto: row.get::<_, i64>(3)? != 0,
        weeks: row.get(4)?,
        start_year: row.get(5)?,
        latest_trade: row.get(6)?,
    })
}

// ---------- history ----------

/// Insert-if-absent keyed by `(signal_id, captured_at)`. Returns whether
/// a new row was written; an identical timestamp for the same signal is
/// a silent no-op so replaying a sweep within one second cannot create
/// duplicates or fail.
pub async fn append_snapshot(db: &AsyncDb, snapshot: &Snapshot) -> Result<bool> {
    let s = snapshot.clone();
    db.call_named("append_snapshot", move |conn| {
        let changed = conn.execute(
            &format!(
                "INSERT OR IGNORE INTO signal_history ({HISTORY_COLS}) \
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)"
            ),
            rusqlite::params![
                s.signal_id,
                s.captured_at,
                s.name,
                s.growth,
                s.drawdown,
                s.monthly_growth,
                s.weeks,
                s.start_year,
                s.latest_trade,
                s.trades,
                s.profit_trades,
                s.loss_trades,
            ],
        )?;
        Ok(changed > 0)
    })
    .await
}

/// Snapshot with the greatest `captured_at` for the signal.
pub async fn latest_snapshot(db: &AsyncDb, signal_id: &str) -> Result<Option<Snapshot>> {
    let id = signal_id.to_string();
    db.call_named("latest_snapshot", move |conn| {
        Ok(conn
            .query_row(
                &format!(
                    "SELECT {HISTORY_COLS} FROM signal_history \
                     WHERE signal_id = ?1 ORDER BY captured_at DESC LIMIT 1"
                ),
                rusqlite::params![id],
                row_to_snapshot,
            )
            .optional()?)
    })
    .await
}

/// Snapshot with the greatest `captured_at` that is `<= ts`.
pub async fn snapshot_at(db: &AsyncDb, signal_id: &str, ts: i64) -> Result<Option<Snapshot>> {
    bounded_snapshot(db, "snapshot_at", signal_id, ts, "<=").await
}

/// Snapshot with the greatest `captured_at` strictly below `ts`.
pub async fn snapshot_before(db: &AsyncDb, signal_id: &str, ts: i64) -> Result<Option<Snapshot>> {
    bounded_snapshot(db, "snapshot_before", signal_id, ts, "<").await
}

async fn bounded_snapshot(
    db: &AsyncDb,
    op: &'static str,
    signal_id: &str,
    ts: i64,
    cmp: &'static str,
) -> Result<Option<Snapshot>> {
    let id = signal_id.to_string();
    db.call_named(op, move |conn| {
        Ok(conn
            .query_row(
                &format!(
                    "SELECT {HISTORY_COLS} FROM signal_history \
                     WHERE signal_id = ?1 AND captured_at {cmp} ?2 \
                     ORDER BY captured_at DESC LIMIT 1"
                ),
                rusqlite::params![id, ts],
                row_to_snapshot,
            )
            .optional()?)
    })
    .await
}

/// Explicit administrative purge. Roster removal never touches history;
/// this is the only way snapshots get deleted.
pub async fn purge_history(db: &AsyncDb, signal_id: &str) -> Result<usize> {
    let id = signal_id.to_string();
    db.call_named("purge_history", move |conn| {
        Ok(conn.execute(
            "DELETE FROM signal_history WHERE signal_id = ?1",
            rusqlite::params![id],
        )?)
    })
    .await
}

// ---------- signal roster ----------

/// False when the id is already tracked.
pub async fn add_signal(
    db: &AsyncDb,
    id: &str,
    url: &str,
    name: Option<&str>,
    auto: bool,
) -> Result<bool> {
    let (id, url, name) = (id.to_string(), url.to_string(), name.map(str::to_string));
    db.call_named("add_signal", move |conn| {
        let changed = conn.execute(
            "INSERT OR IGNORE INTO signals (id, url, name, auto) VALUES (?1, ?2, ?3, ?4)",
            rusqlite::params![id, url, name, i64::from(auto)],
        )?;
        Ok(changed > 0)
    })
    .await
}

/// Number of roster rows removed (0 or 1). History stays.
pub async fn remove_signal(db: &AsyncDb, id: &str) -> Result<usize> {
    let id = id.to_string();
    db.call_named("remove_signal", move |conn| {
        Ok(conn.execute("DELETE FROM signals WHERE id = ?1", rusqlite::params![id])?)
    })
    .await
}

/// Full roster in stable id order; one sweep consumes this once.
pub async fn list_signals(db: &AsyncDb) -> Result<Vec<Signal>> {
    db.call_named("list_signals", |conn| {
        let mut stmt = conn.prepare(
            "SELECT id, url, name, auto, weeks, start_year, latest_trade \
             FROM signals ORDER BY id",
        )?;
        let rows = stmt
            .query_map([], row_to_signal)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(rows)
    })
    .await
}

pub async fn get_signal(db: &AsyncDb, id: &str) -> Result<Option<Signal>> {
    let id = id.to_string();
    db.call_named("get_signal", move |conn| {
        Ok(conn
            .query_row(
                "SELECT id, url, name, auto, weeks, start_year, latest_trade \
                 FROM signals WHERE id = ?1",
                rusqlite::params![id],
                row_to_signal,
            )
            .optional()?)
    })
    .await
}

/// Refresh the roster row's derived fields from a fresh snapshot.
/// `None` values leave the stored value alone rather than clearing it.
pub async fn update_signal_info(db: &AsyncDb, snapshot: &Snapshot) -> Result<()> {
    let s = snapshot.clone();
    db.call_named("update_signal_info", move |conn| {
        conn.execute(
            "UPDATE signals SET \
                 name = COALESCE(?2, name), \
                 weeks = COALESCE(?3, weeks), \
                 start_year = COALESCE(?4, start_year), \
                 latest_trade = COALESCE(?5, latest_trade) \
             WHERE id = ?1",
            rusqlite::params![s.signal_id, s.name, s.weeks, s.start_year, s.latest_trade],
        )?;
        Ok(())
    })
    .await
}

// ---------- subscribers ----------

#[derive(Debug, Clone, PartialEq)]
pub struct User {
    pub id: i64,
    pub name: Option<String>,
    pub description: Option<String>,
    pub is_admin: bool,
}

/// False when the subscriber already exists.
pub async fn add_user(
    db: &AsyncDb,
    id: i64,
    name: Option<&str>,
    description: Option<&str>,
    admin: bool,
) -> Result<bool> {
    let (name, description) = (name.map(str::to_string), description.map(str::to_string));
    db.call_named("add_user", move |conn| {
        let changed = conn.execute(
            "INSERT OR IGNORE INTO users (id, name, description, is_admin) \
             VALUES (?1, ?2, ?3, ?4)",
            rusqlite::params![id, name, description, i64::from(admin)],
        )?;
        Ok(changed > 0)
    })
    .await
}

pub async fn remove_user(db: &AsyncDb, id: i64) -> Result<usize> {
    db.call_named("remove_user", move |conn| {
        Ok(conn.execute("DELETE FROM users WHERE id = ?1", rusqlite::params![id])?)
    })
    .await
}

pub async fn set_admin(db: &AsyncDb, id: i64, value: bool) -> Result<()> {
    db.call_named("set_admin", move |conn| {
        conn.execute(
            "UPDATE users SET is_admin = ?2 WHERE id = ?1",
            rusqlite::params![id, i64::from(value)],
        )?;
        Ok(())
    })
    .await
}

pub async fn is_admin(db: &AsyncDb, id: i64) -> Result<bool> {
    db.call_named("is_admin", move |conn| {
        let row: Option<i64> = conn
            .query_row(
                "SELECT 1 FROM users WHERE id = ?1 AND is_admin = 1",
                rusqlite::params![id],
                |row| row.get(0),
            )
            .optional()?;
        Ok(row.is_some())
    })
    .await
}

pub async fn list_users(db: &AsyncDb) -> Result<Vec<User>> {
    db.call_named("list_users", |conn| {
        let mut stmt =
            conn.prepare("SELECT id, name, description, is_admin FROM users ORDER BY id")?;
        let rows = stmt
            .query_map([], |row| {
                Ok(User {
                    id: row.get(0)?,
                    name: row.get(1)?,
                    description: row.get(2)?,
                    is_admin: row.get::<_, i64>(3)? != 0,
                })
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(rows)
    })
    .await
}

/// Notification fan-out targets, in stable order.
pub async fn list_user_ids(db: &AsyncDb) -> Result<Vec<i64>> {
    db.call_named("list_user_ids", |conn| {
        let mut stmt = conn.prepare("SELECT id FROM users ORDER BY id")?;
        let rows = stmt
            .query_map([], |row| row.get(0))?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(rows)
    })
    .await
}

// ---------- credential store ----------

const AUTH_COOKIE_KEY: &str = "auth_cookie";

pub async fn get_auth_cookie(db: &AsyncDb) -> Result<Option<String>> {
    db.call_named("get_auth_cookie", |conn| {
        Ok(conn
            .query_row(
                "SELECT value FROM settings WHERE key = ?1",
                rusqlite::params![AUTH_COOKIE_KEY],
                |row| row.get(0),
            )
            .optional()?)
    })
    .await
}

pub async fn set_auth_cookie(db: &AsyncDb, cookie: &str) -> Result<()> {
    let cookie = cookie.to_string();
    db.call_named("set_auth_cookie", move |conn| {
        conn.execute(
            "INSERT INTO settings (key, value, updated_at) VALUES (?1, ?2, datetime('now')) \
             ON CONFLICT(key) DO UPDATE SET value = excluded.value, \
                 updated_at = excluded.updated_at",
            rusqlite::params![AUTH_COOKIE_KEY, cookie],
        )?;
        Ok(())
    })
    .await
}
