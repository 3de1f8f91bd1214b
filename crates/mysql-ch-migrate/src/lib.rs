//! # mysql-ch-migrate
//!
//! Streaming MySQL to ClickHouse snapshot migration library.
//!
//! Copies tables from a MySQL/MariaDB database into ClickHouse:
//!
//! - **Schema conversion**: column types mapped to ClickHouse types, the
//!   primary key becomes the MergeTree `ORDER BY`
//! - **Streaming transfer** through a forward-only cursor in bounded batches
//! - **Row-count verification** after each table
//! - **Per-table failure isolation** with an optional continue-on-error policy
//! - **Task ledger** in SQLite and webhook notifications
//!
//! ## Example
//!
//! ```rust,no_run
//! use mysql_ch_migrate::{Config, Orchestrator};
//!
//! #[tokio::main]
//! async fn main() -> mysql_ch_migrate::Result<()> {
//!     let config = Config::load("config.yaml")?;
//!     let orchestrator = Orchestrator::connect(config).await?;
//!     let stats = orchestrator.run().await?;
//!     println!("Migrated {} rows", stats.total_rows);
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod core;
pub mod ddl;
pub mod drivers;
pub mod error;
pub mod events;
pub mod notify;
pub mod orchestrator;
pub mod state;
pub mod transfer;
pub mod typemap;
pub mod verify;

// Re-exports for convenient access
pub use config::{Config, MigrationConfig, SourceConfig, TableJob, TableMapping, TargetConfig};
pub use crate::core::{ColumnDescriptor, PrimaryKey, Row, SourceReader, SqlValue, TableSchema, TargetWriter};
pub use drivers::{ClickhouseWriter, MysqlReader};
pub use error::{MigrateError, Result};
pub use events::{ChannelSink, DroppedEvents, EventSink, MigrationEvent, NullSink, TeeSink, TracingSink};
pub use notify::{FailureNotice, Notifier};
pub use orchestrator::{
    health_check, HealthReport, Orchestrator, RunStatistics, TableMigrationResult, TableState,
    TableStatus, ValidationEntry,
};
pub use state::{NoOpRunSink, RunSink, RunStatus, SqliteLedger};
pub use transfer::{TransferConfig, TransferEngine, TransferStats};
pub use typemap::mysql_to_clickhouse;
pub use verify::{VerificationChecker, VerifyOutcome};
