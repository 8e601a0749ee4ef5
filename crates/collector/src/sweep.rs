//! One collection pass over the signal roster.
//!
//! Signals are processed strictly in sequence, in stable roster order,
//! with a randomized pause between consecutive fetches. A failure while
//! processing one signal is logged and the sweep moves on.

use std::ops::RangeInclusive;

use anyhow::Result;
use chrono::Utc;
use rand::Rng;

use common::db::AsyncDb;

use crate::client::PageFetcher;
use crate::diff;
use crate::extract::SignalPage;
use crate::notify::Notifier;
use crate::snapshot;
use crate::store;

fn unix_now() -> i64 {
    Utc::now().timestamp()
}

/// Pacing and timing knobs for a sweep. The clock is a plain function
/// pointer so tests can drive capture timestamps deterministically.
#[derive(Debug, Clone)]
pub struct SweepPolicy {
    pub jitter_secs: RangeInclusive<u64>,
    pub clock: fn() -> i64,
}

impl SweepPolicy {
    pub fn new(jitter_min_secs: u64, jitter_max_secs: u64) -> Self {
        Self {
            jitter_secs: jitter_min_secs..=jitter_max_secs.max(jitter_min_secs),
            clock: unix_now,
        }
    }
}

impl Default for SweepPolicy {
    fn default() -> Self {
        Self::new(5, 15)
    }
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct SweepStats {
    pub swept: usize,
    pub appended: usize,
    pub failed: usize,
    pub notified: usize,
}

/// Fetch, extract, persist and diff one signal, then fan the change
/// summary out to every subscriber.
async fn process_signal<F: PageFetcher + Sync, N: Notifier + Sync>(
    db: &AsyncDb,
    fetcher: &F,
    notifier: &N,
    policy: &SweepPolicy,
    diff_exclude: &[String],
    signal: &common::types::Signal,
    stats: &mut SweepStats,
) -> Result<()> {
    let html = fetcher.fetch_page(&signal.url).await?;
    // Parsed DOM is not Send; keep it out of scope before the awaits below.
    let snap = {
        let page = SignalPage::parse(&html);
        snapshot::snapshot_from_page(&signal.id, &page, (policy.clock)())
    };

    let appended = store::append_snapshot(db, &snap).await?;
    if appended {
        stats.appended += 1;
        metrics::counter!("collector_snapshots_appended_total").increment(1);
    } else {
        tracing::debug!(signal_id = %signal.id, captured_at = snap.captured_at, "duplicate snapshot skipped");
    }
    store::update_signal_info(db, &snap).await?;

    let Some(diff) = diff::compute_diff(db, &signal.id, diff_exclude).await? else {
        return Ok(());
    };
    let Some(text) = diff::format_changes(&signal.id, &diff) else {
        return Ok(());
    };

    for subscriber_id in store::list_user_ids(db).await? {
        match notifier.notify(subscriber_id, &text).await {
            Ok(()) => stats.notified += 1,
            Err(error) => {
                metrics::counter!("collector_notify_errors_total").increment(1);
                tracing::warn!(signal_id = %signal.id, subscriber_id, %error, "notification failed");
            }
        }
    }
    Ok(())
}

/// One full sweep. Consumes the roster once, in id order.
pub async fn run_sweep_once<F: PageFetcher + Sync, N: Notifier + Sync>(
    db: &AsyncDb,
    fetcher: &F,
    notifier: &N,
    policy: &SweepPolicy,
    diff_exclude: &[String],
) -> Result<SweepStats> {
    let roster = store::list_signals(db).await?;
    tracing::info!(signals = roster.len(), "sweep started");

    let mut stats = SweepStats::default();
    for (index, signal) in roster.iter().enumerate() {
        if index > 0 {
            let pause = rand::thread_rng().gen_range(policy.jitter_secs.clone());
            tokio::time::sleep(std::time::Duration::from_secs(pause)).await;
        }
        stats.swept += 1;
        if let Err(error) =
            process_signal(db, fetcher, notifier, policy, diff_exclude, signal, &mut stats).await
        {
            stats.failed += 1;
            metrics::counter!("collector_sweep_errors_total").increment(1);
            tracing::warn!(signal_id = %signal.id, %error, "signal processing failed");
        }
    }

    tracing::info!(
        swept = stats.swept,
        appended = stats.appended,
        failed = stats.failed,
        notified = stats.notified,
        "sweep finished"
    );
    Ok(stats)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::FetchError;
    use crate::snapshot::fixture_page;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicI64, Ordering};
    use std::sync::Mutex;

    // One clock per test; tests in this binary run in parallel.
    macro_rules! test_clock {
        ($name:ident, $cell:ident) => {
            static $cell: AtomicI64 = AtomicI64::new(1_700_000_000);
            fn $name() -> i64 {
                $cell.load(Ordering::SeqCst)
            }
        };
    }

    fn policy_with(clock: fn() -> i64) -> SweepPolicy {
        SweepPolicy {
            jitter_secs: 0..=0,
            clock,
        }
    }

    struct MapFetcher {
        pages: HashMap<String, String>,
    }

    impl PageFetcher for MapFetcher {
        async fn fetch_page(&self, url: &str) -> Result<String, FetchError> {
            self.pages.get(url).cloned().ok_or(FetchError::Status {
                status: reqwest::StatusCode::GATEWAY_TIMEOUT,
                url: url.to_string(),
            })
        }
    }

    #[derive(Default)]
    struct RecordingNotifier {
        sent: Mutex<Vec<(i64, String)>>,
        fail_for: Option<i64>,
    }

    impl Notifier for RecordingNotifier {
        async fn notify(&self, subscriber_id: i64, text: &str) -> Result<()> {
            if self.fail_for == Some(subscriber_id) {
                anyhow::bail!("delivery refused");
            }
            self.sent
                .lock()
                .unwrap()
                .push((subscriber_id, text.to_string()));
            Ok(())
        }
    }

    async fn seed_roster(db: &AsyncDb, ids: &[&str]) {
        for id in ids {
            store::add_signal(db, id, &format!("https://s.test/{id}"), None, false)
                .await
                .unwrap();
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_one_bad_fetch_does_not_abort_sweep() {
        test_clock!(clock, CLOCK_BAD_FETCH);
        let db = AsyncDb::open(":memory:").await.unwrap();
        seed_roster(&db, &["1", "2", "3"]).await;

        let mut pages = HashMap::new();
        pages.insert(
            "https://s.test/1".to_string(),
            fixture_page("One", "12.3%", "4.5%", "1.1%", 100),
        );
        pages.insert(
            "https://s.test/3".to_string(),
            fixture_page("Three", "7.0%", "2.0%", "0.4%", 50),
        );
        let fetcher = MapFetcher { pages };
        let notifier = RecordingNotifier::default();

        let stats = run_sweep_once(&db, &fetcher, &notifier, &policy_with(clock), &[])
            .await
            .unwrap();
        assert_eq!(stats.swept, 3);
        assert_eq!(stats.appended, 2);
        assert_eq!(stats.failed, 1);

        assert!(store::latest_snapshot(&db, "1").await.unwrap().is_some());
        assert!(store::latest_snapshot(&db, "2").await.unwrap().is_none());
        assert!(store::latest_snapshot(&db, "3").await.unwrap().is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn test_change_fans_out_and_bad_subscriber_is_isolated() {
        test_clock!(clock, CLOCK_FAN_OUT);
        let db = AsyncDb::open(":memory:").await.unwrap();
        seed_roster(&db, &["1"]).await;
        store::add_user(&db, 10, None, None, false).await.unwrap();
        store::add_user(&db, 20, None, None, false).await.unwrap();
        store::add_user(&db, 30, None, None, false).await.unwrap();

        let page_v1 = fixture_page("Steady Pips", "10.0%", "4.5%", "1.1%", 100);
        let page_v2 = fixture_page("Steady Pips", "12.5%", "4.5%", "1.1%", 100);

        let notifier = RecordingNotifier {
            fail_for: Some(20),
            ..RecordingNotifier::default()
        };

        let fetcher = MapFetcher {
            pages: HashMap::from([("https://s.test/1".to_string(), page_v1)]),
        };
        run_sweep_once(&db, &fetcher, &notifier, &policy_with(clock), &[])
            .await
            .unwrap();
        // First observation, nothing to compare against.
        assert!(notifier.sent.lock().unwrap().is_empty());

        CLOCK_FAN_OUT.fetch_add(3600, Ordering::SeqCst);
        let fetcher = MapFetcher {
            pages: HashMap::from([("https://s.test/1".to_string(), page_v2)]),
        };
        let stats = run_sweep_once(&db, &fetcher, &notifier, &policy_with(clock), &[])
            .await
            .unwrap();
        assert_eq!(stats.notified, 2);

        let sent = notifier.sent.lock().unwrap();
        let recipients: Vec<i64> = sent.iter().map(|(id, _)| *id).collect();
        assert_eq!(recipients, vec![10, 30]);
        assert!(sent[0].1.contains("Updates for Steady Pips (1):"));
        assert!(sent[0].1.contains("growth: +2.5"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_same_second_replay_appends_nothing() {
        test_clock!(clock, CLOCK_REPLAY);
        let db = AsyncDb::open(":memory:").await.unwrap();
        seed_roster(&db, &["1"]).await;
        let fetcher = MapFetcher {
            pages: HashMap::from([(
                "https://s.test/1".to_string(),
                fixture_page("One", "12.3%", "4.5%", "1.1%", 100),
            )]),
        };
        let notifier = RecordingNotifier::default();

        let first = run_sweep_once(&db, &fetcher, &notifier, &policy_with(clock), &[])
            .await
            .unwrap();
        let replay = run_sweep_once(&db, &fetcher, &notifier, &policy_with(clock), &[])
            .await
            .unwrap();
        assert_eq!(first.appended, 1);
        assert_eq!(replay.appended, 0);
        assert_eq!(replay.failed, 0);
    }
}
