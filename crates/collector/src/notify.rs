//! Change-notification sink.

use anyhow::Result;

/// Best-effort delivery of one message to one subscriber. Failures are
/// per-subscriber; the sweep decides whether to keep going.
pub trait Notifier {
    fn notify(
        &self,
        subscriber_id: i64,
        text: &str,
    ) -> impl std::future::Future<Output = Result<()>> + Send;
}

/// Default sink: writes notifications to the log. Stands in until a
/// chat transport is wired up.
pub struct LogNotifier;

impl Notifier for LogNotifier {
    async fn notify(&self, subscriber_id: i64, text: &str) -> Result<()> {
        tracing::info!(subscriber_id, %text, "notification");
        Ok(())
    }
}
