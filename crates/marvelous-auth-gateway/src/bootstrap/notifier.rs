//! Fatal-failure alerts.

use async_trait::async_trait;

/// Fire-and-forget alert sink for failures an operator must see.
#[async_trait]
pub trait FailureNotifier: Send + Sync {
    /// Send an alert. Must not fail the caller.
    async fn notify_failure(&self, message: &str);
}

/// Notifier that writes alerts to the log at error severity.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogNotifier;

#[async_trait]
impl FailureNotifier for LogNotifier {
    async fn notify_failure(&self, message: &str) {
        tracing::error!(target: "marvelous_auth::alert", alert = %message, "Operator alert");
    }
}
