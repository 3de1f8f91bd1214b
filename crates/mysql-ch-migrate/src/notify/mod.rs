//! Run notifications.
//!
//! The orchestrator reports run start, run success and per-table failure to a
//! [`Notifier`]. Delivery problems are logged and swallowed; a notifier can
//! never change the outcome of a migration.

mod feishu;

pub use feishu::FeishuNotifier;

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{info, warn};

use crate::config::{NotificationConfig, TableJob};
use crate::orchestrator::RunStatistics;

/// Details of one failed table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FailureNotice {
    pub failed_table: String,
    pub error_message: String,
    pub total_tables: usize,
    /// Tables attempted before the failing one.
    pub completed_tables: usize,
    /// Extended error report (error chain).
    pub detail: Option<String>,
}

/// Receiver of run-level notifications.
#[async_trait]
pub trait Notifier: Send + Sync {
    /// Before the first table.
    async fn notify_start(&self, tables: &[TableJob], source_db: &str, target_db: &str);

    /// After the last table, only when no table failed.
    async fn notify_success(&self, stats: &RunStatistics);

    /// Right after a table fails.
    async fn notify_failure(&self, failure: &FailureNotice);
}

/// Notifier that does nothing.
#[derive(Debug, Default, Clone)]
pub struct NoOpNotifier;

#[async_trait]
impl Notifier for NoOpNotifier {
    async fn notify_start(&self, _tables: &[TableJob], _source_db: &str, _target_db: &str) {}

    async fn notify_success(&self, _stats: &RunStatistics) {}

    async fn notify_failure(&self, _failure: &FailureNotice) {}
}

/// Build the notifier described by `config`.
///
/// An enabled notifier without a webhook URL is disabled with a warning.
pub fn from_config(config: &NotificationConfig) -> Arc<dyn Notifier> {
    if !config.enabled {
        return Arc::new(NoOpNotifier);
    }
    if config.webhook_url.trim().is_empty() {
        warn!("Notifications enabled but webhook_url is not configured, disabling");
        return Arc::new(NoOpNotifier);
    }
    match FeishuNotifier::new(config.clone()) {
        Ok(notifier) => {
            info!("Webhook notifications enabled");
            Arc::new(notifier)
        }
        Err(e) => {
            warn!("Could not initialize webhook notifier, disabling: {}", e);
            Arc::new(NoOpNotifier)
        }
    }
}
