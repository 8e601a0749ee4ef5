/// One tracked signal page on the source site.
///
/// `auto` marks rows inserted by subscription discovery rather than a
/// manual add. `name`, `weeks`, `start_year` and `latest_trade` are
/// refreshed from the most recent snapshot after every sweep.
#[derive(Debug, Clone, PartialEq)]
pub struct Signal {
    pub id: String,
    pub url: String,
    pub name: Option<String>,
    pub auto: bool,
    pub weeks: Option<i64>,
    pub start_year: Option<i64>,
    pub latest_trade: Option<i64>,
}

/// One immutable observation of a signal page.
///
/// Every field except `signal_id` and `captured_at` may be `None`:
/// extraction gaps are data, not errors, and `None` is never conflated
/// with zero anywhere downstream. A snapshot is uniquely identified by
/// `(signal_id, captured_at)`; `captured_at` is unix seconds at
/// extraction time, never a timestamp from the page itself.
#[derive(Debug, Clone, PartialEq)]
pub struct Snapshot {
    pub signal_id: String,
    pub captured_at: i64,
    pub name: Option<String>,
    pub growth: Option<f64>,
    pub drawdown: Option<f64>,
    pub monthly_growth: Option<f64>,
    pub weeks: Option<i64>,
    pub start_year: Option<i64>,
    /// Minutes since the signal's most recent trade.
    pub latest_trade: Option<i64>,
    pub trades: Option<i64>,
    pub profit_trades: Option<i64>,
    pub loss_trades: Option<i64>,
}

impl Snapshot {
    pub fn empty(signal_id: &str, captured_at: i64) -> Self {
        Self {
            signal_id: signal_id.to_string(),
            captured_at,
            name: None,
            growth: None,
            drawdown: None,
            monthly_growth: None,
            weeks: None,
            start_year: None,
            latest_trade: None,
            trades: None,
            profit_trades: None,
            loss_trades: None,
        }
    }
}
