//! Field-wise deltas between the two most recent snapshots of a signal.

use std::collections::BTreeMap;

use anyhow::Result;
use common::db::AsyncDb;
use common::types::Snapshot;

use crate::store;

/// Fields that participate in delta computation. Name and capture time
/// never diff; everything else does unless the configured exclusion
/// list removes it.
pub const DIFF_FIELDS: [&str; 9] = [
    "growth",
    "drawdown",
    "monthly_growth",
    "weeks",
    "start_year",
    "latest_trade",
    "trades",
    "profit_trades",
    "loss_trades",
];

fn field_value(snapshot: &Snapshot, field: &str) -> Option<f64> {
    match field {
        "growth" => snapshot.growth,
        "drawdown" => snapshot.drawdown,
        "monthly_growth" => snapshot.monthly_growth,
        "weeks" => snapshot.weeks.map(|v| v as f64),
        "start_year" => snapshot.start_year.map(|v| v as f64),
        "latest_trade" => snapshot.latest_trade.map(|v| v as f64),
        "trades" => snapshot.trades.map(|v| v as f64),
        "profit_trades" => snapshot.profit_trades.map(|v| v as f64),
        "loss_trades" => snapshot.loss_trades.map(|v| v as f64),
        _ => None,
    }
}

/// Derived, never persisted. `deltas[f]` is `Some` only when both
/// snapshots carried the field.
#[derive(Debug, Clone, PartialEq)]
pub struct SignalDiff {
    pub latest: Snapshot,
    pub previous: Option<Snapshot>,
    pub deltas: BTreeMap<&'static str, Option<f64>>,
}

/// Reads the two most recent snapshots and diffs them. `None` only when
/// the signal has no history at all; a single snapshot yields an empty
/// delta map. Reads storage fresh on every call.
pub async fn compute_diff(
    db: &AsyncDb,
    signal_id: &str,
    exclude: &[String],
) -> Result<Option<SignalDiff>> {
    let Some(latest) = store::latest_snapshot(db, signal_id).await? else {
        return Ok(None);
    };
    let previous = store::snapshot_before(db, signal_id, latest.captured_at).await?;

    let mut deltas = BTreeMap::new();
    if let Some(previous) = &previous {
        for field in DIFF_FIELDS {
            if exclude.iter().any(|e| e == field) {
                continue;
            }
            let delta = match (field_value(&latest, field), field_value(previous, field)) {
                (Some(now), Some(then)) => Some(now - then),
                _ => None,
            };
            deltas.insert(field, delta);
        }
    }

    Ok(Some(SignalDiff {
        latest,
        previous,
        deltas,
    }))
}

/// Renders the notification text, or `None` when no field actually
/// moved. Deltas print signed, rounded to two decimals.
pub fn format_changes(signal_id: &str, diff: &SignalDiff) -> Option<String> {
    let mut lines = Vec::new();
    for (field, delta) in &diff.deltas {
        let Some(delta) = delta else { continue };
        if *delta == 0.0 {
            continue;
        }
        let rounded = (delta * 100.0).round() / 100.0;
        lines.push(format!("{field}: {rounded:+}"));
    }
    if lines.is_empty() {
        return None;
    }
    let name = diff.latest.name.as_deref().unwrap_or(signal_id);
    Some(format!("Updates for {name} ({signal_id}):\n{}", lines.join("\n")))
}
