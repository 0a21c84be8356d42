//! Operator alerting.
//!
//! Alerts are fire-and-forget: a failure to deliver one must never fail a
//! run, so [`AlertChannel::notify`] is infallible from the caller's side.

use async_trait::async_trait;

/// How urgent an alert is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Info,
    Warning,
    /// Conditions that should halt future scheduled runs (persistence
    /// failures, repeated fatal publish errors).
    Critical,
}

/// Destination for operator notifications.
#[async_trait]
pub trait AlertChannel: Send + Sync {
    /// Deliver a message. Implementations swallow their own delivery errors.
    async fn notify(&self, message: &str, severity: Severity);
}

/// Default channel: structured log lines via `tracing`.
#[derive(Debug, Clone, Default)]
pub struct LogAlerts;

#[async_trait]
impl AlertChannel for LogAlerts {
    async fn notify(&self, message: &str, severity: Severity) {
        match severity {
            Severity::Info => tracing::info!(alert = message, "operator alert"),
            Severity::Warning => tracing::warn!(alert = message, "operator alert"),
            Severity::Critical => tracing::error!(alert = message, "operator alert"),
        }
    }
}
