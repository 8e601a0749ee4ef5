use std::time::Duration;

use anyhow::Result;
use common::config::Config;
use common::db::AsyncDb;

use crate::client::{PageFetcher, SignalClient};
use crate::diff;
use crate::discovery;
use crate::notify::LogNotifier;
use crate::store;
use crate::sweep::{self, SweepPolicy};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Run,
    Add { url: String },
    Remove { id: String },
    List,
    Stats { id: String, at: Option<i64> },
    Sweep,
    SyncSubs,
    SetCookie { value: String },
    ShowCookie,
    TestCookie,
    PurgeHistory { id: String },
    AddUser { id: i64, name: Option<String> },
    RemoveUser { id: i64 },
    ToggleAdmin { id: i64 },
    Users,
}

pub fn parse_args<I>(mut args: I) -> std::result::Result<Command, String>
where
    I: Iterator<Item = String>,
{
    // Drop argv[0].
    let _ = args.next();

    let Some(cmd) = args.next() else {
        return Ok(Command::Run);
    };

    match cmd.as_str() {
        "run" => Ok(Command::Run),
        "add" => {
            let url = args
                .next()
                .ok_or_else(|| "usage: collector add <signal-url>".to_string())?;
            Ok(Command::Add { url })
        }
        "remove" => {
            let id = args
                .next()
                .ok_or_else(|| "usage: collector remove <signal-id>".to_string())?;
            Ok(Command::Remove { id })
        }
        "list" => Ok(Command::List),
        "stats" => {
            let id = args
                .next()
                .ok_or_else(|| "usage: collector stats <signal-id> [unix-ts]".to_string())?;
            let at = match args.next() {
                Some(ts) => Some(
                    ts.parse()
                        .map_err(|_| format!("invalid timestamp: {ts}"))?,
                ),
                None => None,
            };
            Ok(Command::Stats { id, at })
        }
        "sweep" => Ok(Command::Sweep),
        "sync-subs" => Ok(Command::SyncSubs),
        "set-cookie" => {
            let value = args
                .next()
                .ok_or_else(|| "usage: collector set-cookie <cookie>".to_string())?;
            Ok(Command::SetCookie { value })
        }
        "show-cookie" => Ok(Command::ShowCookie),
        "test-cookie" => Ok(Command::TestCookie),
        "purge-history" => {
            let id = args
                .next()
                .ok_or_else(|| "usage: collector purge-history <signal-id>".to_string())?;
            Ok(Command::PurgeHistory { id })
        }
        "add-user" => {
            let id = parse_user_id(args.next())?;
            Ok(Command::AddUser {
                id,
                name: args.next(),
            })
        }
        "remove-user" => Ok(Command::RemoveUser {
            id: parse_user_id(args.next())?,
        }),
        "toggle-admin" => Ok(Command::ToggleAdmin {
            id: parse_user_id(args.next())?,
        }),
        "users" => Ok(Command::Users),
        other => Err(format!("unknown command: {other}")),
    }
}

fn parse_user_id(arg: Option<String>) -> std::result::Result<i64, String> {
    let arg = arg.ok_or_else(|| "missing user id".to_string())?;
    arg.parse().map_err(|_| format!("invalid user id: {arg}"))
}

/// Trailing numeric path segment of a signal page URL.
pub fn signal_id_from_url(url: &str) -> Option<&str> {
    let path = url.split(['?', '#']).next().unwrap_or(url);
    let tail = path.rsplit('/').next()?;
    (!tail.is_empty() && tail.bytes().all(|b| b.is_ascii_digit())).then_some(tail)
}

async fn client_from_store(db: &AsyncDb, config: &Config) -> Result<SignalClient> {
    let cookie = store::get_auth_cookie(db).await?;
    Ok(SignalClient::new(
        &config.source.base_url,
        Duration::from_secs(config.collector.fetch_timeout_secs),
        cookie.as_deref(),
    )?)
}

pub async fn run_command(db: &AsyncDb, config: &Config, cmd: Command) -> Result<()> {
    match cmd {
        Command::Run => Ok(()),
        Command::Add { url } => {
            let Some(id) = signal_id_from_url(&url) else {
                anyhow::bail!("cannot find a signal id in {url}");
            };
            if !store::add_signal(db, id, &url, None, false).await? {
                println!("signal {id} is already tracked");
                return Ok(());
            }
            println!("added signal {id}");
            // First snapshot right away so `stats` has data before the
            // next scheduled sweep. Failure leaves the signal tracked.
            let client = client_from_store(db, config).await?;
            match client.fetch_page(&url).await {
                Ok(html) => {
                    let snap = crate::snapshot::build_snapshot(id, &html);
                    store::append_snapshot(db, &snap).await?;
                    store::update_signal_info(db, &snap).await?;
                    println!(
                        "first snapshot captured ({})",
                        snap.name.as_deref().unwrap_or("name unknown")
                    );
                }
                Err(e) => println!("initial fetch failed, will retry on next sweep: {e}"),
            }
            Ok(())
        }
        Command::Remove { id } => {
            let signal = store::get_signal(db, &id).await?;
            let removed = store::remove_signal(db, &id).await?;
            if removed > 0 {
                let name = signal.and_then(|s| s.name);
                println!(
                    "removed signal {id} ({}), history kept",
                    name.as_deref().unwrap_or("-")
                );
            } else {
                println!("signal {id} is not tracked");
            }
            Ok(())
        }
        Command::List => {
            let signals = store::list_signals(db).await?;
            if signals.is_empty() {
                println!("no signals tracked");
            }
            for s in signals {
                println!(
                    "{}  {}  {}{}",
                    s.id,
                    s.name.as_deref().unwrap_or("-"),
                    s.url,
                    if s.auto { "  [auto]" } else { "" },
                );
            }
            Ok(())
        }
        Command::Stats { id, at: Some(ts) } => {
            // Historical point lookup, no deltas.
            match store::snapshot_at(db, &id, ts).await? {
                None => println!("no snapshot for signal {id} at or before {ts}"),
                Some(snap) => print_snapshot(&id, &snap),
            }
            Ok(())
        }
        Command::Stats { id, at: None } => {
            match diff::compute_diff(db, &id, &config.collector.diff_exclude).await? {
                None => println!("no data yet for signal {id}"),
                Some(diff) => print_stats(&id, &diff),
            }
            Ok(())
        }
        Command::Sweep => {
            let client = client_from_store(db, config).await?;
            let policy = SweepPolicy::new(
                config.collector.jitter_min_secs,
                config.collector.jitter_max_secs,
            );
            let stats = sweep::run_sweep_once(
                db,
                &client,
                &LogNotifier,
                &policy,
                &config.collector.diff_exclude,
            )
            .await?;
            println!(
                "sweep done: {} swept, {} appended, {} failed, {} notified",
                stats.swept, stats.appended, stats.failed, stats.notified
            );
            Ok(())
        }
        Command::SyncSubs => {
            let client = client_from_store(db, config).await?;
            let html = client.fetch_page(&client.subscriptions_url()).await?;
            let found = discovery::parse_subscriptions(&html, &config.source.base_url);
            let added = discovery::sync_discovered(db, &found).await?;
            println!("{} subscriptions found, {added} new", found.len());
            Ok(())
        }
        Command::SetCookie { value } => {
            store::set_auth_cookie(db, &value).await?;
            println!("cookie stored");
            Ok(())
        }
        Command::ShowCookie => {
            match store::get_auth_cookie(db).await? {
                Some(cookie) => println!("cookie set: {}", mask_cookie(&cookie)),
                None => println!("no cookie stored"),
            }
            Ok(())
        }
        Command::TestCookie => {
            let client = client_from_store(db, config).await?;
            if client.check_auth().await? {
                println!("cookie is valid");
            } else {
                println!("cookie is missing or expired");
            }
            Ok(())
        }
        Command::PurgeHistory { id } => {
            let purged = store::purge_history(db, &id).await?;
            println!("purged {purged} snapshots for signal {id}");
            Ok(())
        }
        Command::AddUser { id, name } => {
            if store::add_user(db, id, name.as_deref(), None, false).await? {
                println!("added user {id}");
            } else {
                println!("user {id} already exists");
            }
            Ok(())
        }
        Command::RemoveUser { id } => {
            let removed = store::remove_user(db, id).await?;
            println!("removed {removed} user(s)");
            Ok(())
        }
        Command::ToggleAdmin { id } => {
            let admin = store::is_admin(db, id).await?;
            store::set_admin(db, id, !admin).await?;
            println!("user {id} admin: {}", !admin);
            Ok(())
        }
        Command::Users => {
            let users = store::list_users(db).await?;
            if users.is_empty() {
                println!("no users");
            }
            for u in users {
                println!(
                    "{}  {}  {}{}",
                    u.id,
                    u.name.as_deref().unwrap_or("-"),
                    u.description.as_deref().unwrap_or("-"),
                    if u.is_admin { "  [admin]" } else { "" },
                );
            }
            Ok(())
        }
    }
}

/// Keep credentials out of terminal scrollback; show just enough to
/// tell cookies apart.
fn mask_cookie(cookie: &str) -> String {
    let head: String = cookie.chars().take(8).collect();
    format!("{head}... ({} chars)", cookie.len())
}

fn print_stats(id: &str, diff: &diff::SignalDiff) {
    let latest = &diff.latest;
    println!("{} ({id})", latest.name.as_deref().unwrap_or("-"));
    if let Some(previous) = &diff.previous {
        println!(
            "captured {} (previous {})",
            latest.captured_at, previous.captured_at
        );
    } else {
        println!("captured {} (first snapshot)", latest.captured_at);
    }
    for field in diff::DIFF_FIELDS {
        let Some(value) = field_display(latest, field) else {
            continue;
        };
        match diff.deltas.get(field).copied().flatten() {
            Some(delta) if delta != 0.0 => {
                let rounded = (delta * 100.0).round() / 100.0;
                println!("{field}: {value} ({rounded:+})");
            }
            _ => println!("{field}: {value}"),
        }
    }
}

fn print_snapshot(id: &str, snap: &common::types::Snapshot) {
    println!(
        "{} ({id}) at {}",
        snap.name.as_deref().unwrap_or("-"),
        snap.captured_at
    );
    for field in diff::DIFF_FIELDS {
        if let Some(value) = field_display(snap, field) {
            println!("{field}: {value}");
        }
    }
}

fn field_display(snapshot: &common::types::Snapshot, field: &str) -> Option<String> {
    match field {
        "growth" => snapshot.growth.map(|v| v.to_string()),
        "drawdown" => snapshot.drawdown.map(|v| v.to_string()),
        "monthly_growth" => snapshot.monthly_growth.map(|v| v.to_string()),
        "weeks" => snapshot.weeks.map(|v| v.to_string()),
        "start_year" => snapshot.start_year.map(|v| v.to_string()),
        "latest_trade" => snapshot.latest_trade.map(|v| format!("{v}m")),
        "trades" => snapshot.trades.map(|v| v.to_string()),
        "profit_trades" => snapshot.profit_trades.map(|v| v.to_string()),
        "loss_trades" => snapshot.loss_trades.map(|v| v.to_string()),
        _ => None,
    }
}
