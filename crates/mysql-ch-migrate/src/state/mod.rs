//! Run-result persistence.
//!
//! - [`RunSink`]: what the orchestrator publishes to
//! - [`SqliteLedger`]: the SQLite task ledger (tasks, task logs, table results)
//! - [`NoOpRunSink`]: used when the ledger is disabled

mod backend;
mod noop;
mod sqlite;

pub use backend::{RunSink, RunStatus};
pub use noop::NoOpRunSink;
pub use sqlite::{
    LedgerRunSink, SqliteLedger, TableMigrationRecord, TaskLogRecord, TaskRecord,
    DEFAULT_LOG_LIMIT, DEFAULT_TASK_LIMIT,
};
