//! Snapshot assembly: one immutable record per fetched page.

use chrono::Utc;
use common::types::Snapshot;

use crate::extract::SignalPage;
use crate::normalize::{first_year, normalize_duration, normalize_number};

/// Region a field is read from. The mapping below is configuration, not
/// inheritance: each entry pairs a snapshot field with the region-kind
/// and the literal label text as it appears on the page.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Region {
    ListInfo,
    DataColumns,
}

/// field → (region, label) table for the numeric fields. The name comes
/// from the page heading and is handled separately.
pub const FIELD_LABELS: [(&str, Region, &str); 9] = [
    ("growth", Region::ListInfo, "Growth:"),
    ("weeks", Region::ListInfo, "Weeks:"),
    ("start_year", Region::ListInfo, "Started:"),
    ("latest_trade", Region::ListInfo, "Latest trade:"),
    ("drawdown", Region::DataColumns, "By Balance:"),
    ("monthly_growth", Region::DataColumns, "Monthly growth:"),
    ("trades", Region::DataColumns, "Trades:"),
    ("profit_trades", Region::DataColumns, "Profit Trades:"),
    ("loss_trades", Region::DataColumns, "Loss Trades:"),
];

/// Build a snapshot from raw page HTML. `captured_at` is the wall clock
/// at extraction, never a timestamp from the page. A page with no
/// recognizable regions yields a mostly-`None` snapshot; fetch failures
/// are the caller's problem and never reach this function.
pub fn build_snapshot(signal_id: &str, html: &str) -> Snapshot {
    snapshot_from_page(signal_id, &SignalPage::parse(html), Utc::now().timestamp())
}

/// Deterministic core of [`build_snapshot`]; tests drive the clock.
pub fn snapshot_from_page(signal_id: &str, page: &SignalPage, captured_at: i64) -> Snapshot {
    let raw = |field: &str| -> Option<String> {
        let (_, region, label) = FIELD_LABELS.iter().find(|(name, _, _)| *name == field)?;
        match region {
            Region::ListInfo => page.list_info(label),
            Region::DataColumns => page.data_column(label),
        }
    };
    let number = |field: &str| normalize_number(raw(field).as_deref());
    let count = |field: &str| number(field).map(|v| v as i64);

    Snapshot {
        signal_id: signal_id.to_string(),
        captured_at,
        name: page.title(),
        growth: number("growth"),
        drawdown: number("drawdown"),
        monthly_growth: number("monthly_growth"),
        weeks: count("weeks"),
        start_year: first_year(raw("start_year").as_deref()),
        latest_trade: normalize_duration(raw("latest_trade").as_deref()),
        trades: count("trades"),
        profit_trades: count("profit_trades"),
        loss_trades: count("loss_trades"),
    }
}

#[cfg(test)]
pub(crate) fn fixture_page(
    name: &str,
    growth: &str,
    drawdown: &str,
    monthly: &str,
    trades: i64,
) -> String {
    format!(
        r#"<html><body>
        <h1 class="title-min">{name}</h1>
        <div class="s-list-info">
            <div class="s-list-info__item">
                <div class="s-list-info__label">Growth:</div>
                <div class="s-list-info__value">{growth}</div>
            </div>
            <div class="s-list-info__item">
                <div class="s-list-info__label">Weeks:</div>
                <div class="s-list-info__value">87</div>
            </div>
            <div class="s-list-info__item">
                <div class="s-list-info__label">Started:</div>
                <div class="s-list-info__value">Mar 12, 2021</div>
            </div>
            <div class="s-list-info__item">
                <div class="s-list-info__label">Latest trade:</div>
                <div class="s-list-info__value">2 hours ago</div>
            </div>
        </div>
        <div class="s-data-columns">
            <div class="s-data-columns__item">
                <div class="s-data-columns__label">By Balance:</div>
                <div class="s-data-columns__value">{drawdown}</div>
            </div>
            <div class="s-data-columns__item">
                <div class="s-data-columns__label">Monthly growth:</div>
                <div class="s-data-columns__value">{monthly}</div>
            </div>
            <div class="s-data-columns__item">
                <div class="s-data-columns__label">Trades:</div>
                <div class="s-data-columns__value">{trades}</div>
            </div>
            <div class="s-data-columns__item">
                <div class="s-data-columns__label">Profit Trades:</div>
                <div class="s-data-columns__value">412 (68.2%)</div>
            </div>
            <div class="s-data-columns__item">
                <div class="s-data-columns__label">Loss Trades:</div>
                <div class="s-data-columns__value">192 (31.8%)</div>
            </div>
        </div>
        </body></html>"#
    )
}
