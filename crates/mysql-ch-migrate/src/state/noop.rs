//! No-op run sink used when the task ledger is disabled.

use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use tracing::warn;

use crate::error::Result;
use crate::orchestrator::{RunStatistics, TableMigrationResult};
use crate::state::backend::{RunSink, RunStatus};

/// Run sink that doesn't persist anything.
///
/// Logs a warning on first use.
pub struct NoOpRunSink {
    warned: AtomicBool,
}

impl NoOpRunSink {
    /// Create a new no-op run sink.
    pub fn new() -> Self {
        Self {
            warned: AtomicBool::new(false),
        }
    }

    fn warn_once(&self) {
        if !self.warned.swap(true, Ordering::SeqCst) {
            warn!("Task ledger disabled: run results will not be recorded");
        }
    }
}

impl Default for NoOpRunSink {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl RunSink for NoOpRunSink {
    async fn run_status(
        &self,
        _status: RunStatus,
        _stats: &RunStatistics,
        _error: Option<&str>,
    ) -> Result<()> {
        self.warn_once();
        Ok(())
    }

    async fn table_result(&self, _result: &TableMigrationResult) -> Result<()> {
        Ok(())
    }

    fn backend_type(&self) -> &'static str {
        "noop"
    }
}
