//! Run-result sink trait.
//!
//! The orchestrator publishes a run's status and each table's result to a
//! [`RunSink`]. Publishing is fire-and-forget: a failing sink is logged by the
//! caller and never changes the migration outcome.

use std::fmt;
use std::str::FromStr;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::{MigrateError, Result};
use crate::orchestrator::{RunStatistics, TableMigrationResult};

/// Overall run status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Running,
    Completed,
    Failed,
    Cancelled,
}

impl RunStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RunStatus::Running => "running",
            RunStatus::Completed => "completed",
            RunStatus::Failed => "failed",
            RunStatus::Cancelled => "cancelled",
        }
    }

    /// Whether the run has ended.
    pub fn is_terminal(&self) -> bool {
        !matches!(self, RunStatus::Running)
    }
}

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RunStatus {
    type Err = MigrateError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "running" => Ok(RunStatus::Running),
            "completed" => Ok(RunStatus::Completed),
            "failed" => Ok(RunStatus::Failed),
            "cancelled" => Ok(RunStatus::Cancelled),
            _ => Err(MigrateError::Ledger(format!("Invalid run status: {}", s))),
        }
    }
}

/// Receiver of one run's status updates and table results.
#[async_trait]
pub trait RunSink: Send + Sync {
    /// Record the run status with the counters so far.
    async fn run_status(
        &self,
        status: RunStatus,
        stats: &RunStatistics,
        error: Option<&str>,
    ) -> Result<()>;

    /// Record one table's final result.
    async fn table_result(&self, result: &TableMigrationResult) -> Result<()>;

    /// Backend type name for logging.
    fn backend_type(&self) -> &'static str;
}
