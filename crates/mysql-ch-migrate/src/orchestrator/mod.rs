//! Migration orchestrator - main workflow coordinator.
//!
//! Tables run strictly one after another. Each goes through
//! describe → drop → create → transfer → verify, and its outcome is recorded
//! individually so a partially failed run still yields a complete report.

use std::sync::Arc;
use std::time::Instant;

use serde::{Deserialize, Serialize};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn, Level};

use crate::config::{Config, TableJob};
use crate::core::{SourceReader, TargetWriter};
use crate::ddl;
use crate::drivers::{ClickhouseWriter, MysqlReader};
use crate::error::{MigrateError, Result};
use crate::events::{EventSink, MigrationEvent, TracingSink};
use crate::notify::{self, FailureNotice, Notifier};
use crate::state::{NoOpRunSink, RunSink, RunStatus};
use crate::transfer::{TransferConfig, TransferEngine, TransferStats};
use crate::verify::{VerificationChecker, VerifyOutcome};

mod health;

pub use health::{health_check, EndpointHealth, HealthReport};

/// Where a table is in its migration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TableState {
    Pending,
    StructureRead,
    TargetDropped,
    TargetCreated,
    Transferring,
    Verified,
    Unverified,
    VerifySkipped,
    Success,
    Failed,
}

impl TableState {
    pub fn as_str(&self) -> &'static str {
        match self {
            TableState::Pending => "pending",
            TableState::StructureRead => "structure_read",
            TableState::TargetDropped => "target_dropped",
            TableState::TargetCreated => "target_created",
            TableState::Transferring => "transferring",
            TableState::Verified => "verified",
            TableState::Unverified => "unverified",
            TableState::VerifySkipped => "verify_skipped",
            TableState::Success => "success",
            TableState::Failed => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, TableState::Success | TableState::Failed)
    }
}

impl std::fmt::Display for TableState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Final status of one table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TableStatus {
    Success,
    Failed,
}

impl TableStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TableStatus::Success => "success",
            TableStatus::Failed => "failed",
        }
    }
}

/// Outcome of one table.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TableMigrationResult {
    pub source_table: String,
    pub target_table: String,
    pub status: TableStatus,
    pub rows_transferred: u64,
    pub elapsed_seconds: f64,
    pub rows_per_second: f64,
    /// Row counts matched after the transfer. False when verification was skipped.
    pub verified: bool,
    pub error: Option<String>,
}

impl TableMigrationResult {
    fn success(job: &TableJob, stats: &TransferStats, verified: bool, elapsed: f64) -> Self {
        Self {
            source_table: job.source_table.clone(),
            target_table: job.target_table.clone(),
            status: TableStatus::Success,
            rows_transferred: stats.rows,
            elapsed_seconds: elapsed,
            rows_per_second: stats.avg_speed,
            verified,
            error: None,
        }
    }

    fn failed(job: &TableJob, elapsed: f64, error: &MigrateError) -> Self {
        Self {
            source_table: job.source_table.clone(),
            target_table: job.target_table.clone(),
            status: TableStatus::Failed,
            rows_transferred: 0,
            elapsed_seconds: elapsed,
            rows_per_second: 0.0,
            verified: false,
            error: Some(error.to_string()),
        }
    }
}

/// Aggregate over every attempted table of a run.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RunStatistics {
    pub total_tables: usize,
    pub success_tables: usize,
    pub failed_tables: usize,
    pub total_rows: u64,
    pub total_elapsed: f64,
    pub avg_speed: f64,
    pub tables: Vec<TableMigrationResult>,
}

impl RunStatistics {
    fn record(&mut self, result: TableMigrationResult) {
        match result.status {
            TableStatus::Success => self.success_tables += 1,
            TableStatus::Failed => self.failed_tables += 1,
        }
        self.total_rows += result.rows_transferred;
        self.tables.push(result);
    }

    fn finish(&mut self, elapsed: f64) {
        self.total_elapsed = elapsed;
        self.avg_speed = if self.total_rows > 0 && elapsed > 0.0 {
            self.total_rows as f64 / elapsed
        } else {
            0.0
        };
    }

    /// Convert to JSON string.
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

/// Row-count comparison for one configured mapping.
#[derive(Debug, Clone, Serialize)]
pub struct ValidationEntry {
    pub source_table: String,
    pub target_table: String,
    pub outcome: Option<VerifyOutcome>,
    pub error: Option<String>,
}

impl ValidationEntry {
    pub fn matched(&self) -> bool {
        self.outcome.map(|o| o.matched()).unwrap_or(false)
    }
}

/// Migration orchestrator.
pub struct Orchestrator {
    config: Config,
    run_id: String,
    source: Arc<dyn SourceReader>,
    target: Arc<dyn TargetWriter>,
    notifier: Arc<dyn Notifier>,
    run_sink: Arc<dyn RunSink>,
    events: Arc<dyn EventSink>,
    cancel: CancellationToken,
}

impl Orchestrator {
    /// Connect to both databases. Connection failures are always fatal.
    pub async fn connect(config: Config) -> Result<Self> {
        let source = MysqlReader::new(&config.source, &config.performance).await?;
        let target = match ClickhouseWriter::new(&config.target, &config.performance).await {
            Ok(target) => target,
            Err(e) => {
                source.close().await;
                return Err(e);
            }
        };

        Ok(Self::new(config, Arc::new(source), Arc::new(target)))
    }

    /// Create an orchestrator over already-connected collaborators.
    pub fn new(
        config: Config,
        source: Arc<dyn SourceReader>,
        target: Arc<dyn TargetWriter>,
    ) -> Self {
        let notifier = notify::from_config(&config.notification);
        Self {
            config,
            run_id: uuid::Uuid::new_v4().to_string(),
            source,
            target,
            notifier,
            run_sink: Arc::new(NoOpRunSink::new()),
            events: Arc::new(TracingSink),
            cancel: CancellationToken::new(),
        }
    }

    pub fn with_notifier(mut self, notifier: Arc<dyn Notifier>) -> Self {
        self.notifier = notifier;
        self
    }

    /// Publish run status and table results to `sink`.
    pub fn with_run_sink(mut self, sink: Arc<dyn RunSink>) -> Self {
        self.run_sink = sink;
        self
    }

    pub fn with_events(mut self, events: Arc<dyn EventSink>) -> Self {
        self.events = events;
        self
    }

    /// Stop between batches and between tables once `cancel` fires.
    pub fn with_cancel(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn run_id(&self) -> &str {
        &self.run_id
    }

    /// Run the migration on its own task.
    pub fn spawn(self) -> JoinHandle<Result<RunStatistics>> {
        tokio::spawn(self.run())
    }

    /// Run every configured table, then close both connections.
    pub async fn run(self) -> Result<RunStatistics> {
        let mut stats = RunStatistics::default();
        let result = self.run_tables(&mut stats).await;

        match &result {
            Ok(()) => {
                self.publish_status(RunStatus::Completed, &stats, None).await;
            }
            Err(e) => {
                let status = if matches!(e, MigrateError::Cancelled) {
                    RunStatus::Cancelled
                } else {
                    RunStatus::Failed
                };
                self.publish_status(status, &stats, Some(&e.to_string()))
                    .await;
            }
        }

        self.source.close().await;
        self.target.close().await;
        info!("Closed source and target connections");

        result.map(|()| stats)
    }

    async fn run_tables(&self, stats: &mut RunStatistics) -> Result<()> {
        let started = Instant::now();
        let jobs = self.resolve_jobs();
        stats.total_tables = jobs.len();

        if jobs.is_empty() {
            warn!("No valid tables configured");
        }

        self.events.emit(MigrationEvent::RunStarted {
            run_id: self.run_id.clone(),
            tables: jobs.iter().map(|j| j.source_table.clone()).collect(),
        });
        self.publish_status(RunStatus::Running, stats, None).await;
        self.notifier
            .notify_start(&jobs, self.source.database(), self.target.database())
            .await;

        let continue_on_error = self.config.advanced.continue_on_error;

        for (idx, job) in jobs.iter().enumerate() {
            if self.cancel.is_cancelled() {
                stats.finish(started.elapsed().as_secs_f64());
                return Err(MigrateError::Cancelled);
            }

            self.message(
                Level::INFO,
                format!(
                    "[TABLE {}/{}] {} -> {}",
                    idx + 1,
                    jobs.len(),
                    job.source_table,
                    job.target_table
                ),
            );

            let table_started = Instant::now();
            match self.migrate_table(job).await {
                Ok((transfer, verified)) => {
                    let result = TableMigrationResult::success(
                        job,
                        &transfer,
                        verified,
                        table_started.elapsed().as_secs_f64(),
                    );
                    self.set_state(job, TableState::Success);
                    self.finish_table(stats, result).await;
                }
                Err(e) => {
                    let elapsed = table_started.elapsed().as_secs_f64();
                    self.set_state(job, TableState::Failed);
                    self.notifier
                        .notify_failure(&FailureNotice {
                            failed_table: job.source_table.clone(),
                            error_message: e.to_string(),
                            total_tables: jobs.len(),
                            completed_tables: idx,
                            detail: Some(e.format_detailed()),
                        })
                        .await;

                    if e.is_fatal() || !continue_on_error {
                        self.message(
                            Level::ERROR,
                            format!("Failed table {}: {}", job.source_table, e),
                        );
                        stats.failed_tables += 1;
                        stats.finish(started.elapsed().as_secs_f64());
                        return Err(e);
                    }

                    let result = TableMigrationResult::failed(job, elapsed, &e);
                    self.finish_table(stats, result).await;
                }
            }
        }

        stats.finish(started.elapsed().as_secs_f64());
        self.events.emit(MigrationEvent::RunFinished(stats.clone()));

        if stats.failed_tables == 0 {
            self.notifier.notify_success(stats).await;
        } else {
            self.message(
                Level::WARN,
                format!("Completed with {} failures", stats.failed_tables),
            );
        }

        Ok(())
    }

    /// Apply defaults to every mapping, dropping the ones missing a table name.
    fn resolve_jobs(&self) -> Vec<TableJob> {
        let migration = &self.config.migration;
        migration
            .tables
            .iter()
            .enumerate()
            .filter_map(|(index, mapping)| {
                if mapping.is_valid() {
                    Some(migration.resolve(mapping))
                } else {
                    self.events.emit(MigrationEvent::MappingSkipped {
                        index,
                        reason: format!(
                            "source_table '{}' and target_table '{}' are both required",
                            mapping.source_table, mapping.target_table
                        ),
                    });
                    None
                }
            })
            .collect()
    }

    /// Run the per-table procedure, returning transfer stats and the verify flag.
    async fn migrate_table(&self, job: &TableJob) -> Result<(TransferStats, bool)> {
        let source_table = job.source_table.as_str();
        let target_table = job.target_table.as_str();
        self.set_state(job, TableState::Pending);

        let schema = self
            .source
            .describe_table(source_table)
            .await
            .map_err(|e| per_table(e, |e| MigrateError::schema(source_table, e)))?;
        self.set_state(job, TableState::StructureRead);

        if self.config.advanced.drop_table_before_create {
            self.target
                .drop_table(target_table)
                .await
                .map_err(|e| per_table(e, |e| MigrateError::ddl(target_table, e)))?;
            self.set_state(job, TableState::TargetDropped);
        }

        let create = ddl::build(target_table, &schema.columns, &schema.primary_key);
        self.target
            .execute(&create)
            .await
            .map_err(|e| per_table(e, |e| MigrateError::ddl(target_table, e)))?;
        self.set_state(job, TableState::TargetCreated);

        self.set_state(job, TableState::Transferring);
        let engine = TransferEngine::new(
            self.source.clone(),
            self.target.clone(),
            TransferConfig::from_config(&self.config),
            self.events.clone(),
        )
        .with_cancel(self.cancel.clone());
        let transfer = engine
            .transfer(source_table, target_table, job.batch_size)
            .await?;

        let verified = if job.verify {
            let verified = self.checker().verify(source_table, target_table).await?;
            self.set_state(
                job,
                if verified {
                    TableState::Verified
                } else {
                    TableState::Unverified
                },
            );
            verified
        } else {
            self.set_state(job, TableState::VerifySkipped);
            false
        };

        Ok((transfer, verified))
    }

    /// Verification-only pass over the configured mappings.
    pub async fn validate(&self) -> Result<Vec<ValidationEntry>> {
        let checker = self.checker();
        let mut entries = Vec::new();

        for job in self.resolve_jobs() {
            let entry = match checker.compare(&job.source_table, &job.target_table).await {
                Ok(outcome) => ValidationEntry {
                    source_table: job.source_table,
                    target_table: job.target_table,
                    outcome: Some(outcome),
                    error: None,
                },
                Err(e) if e.is_fatal() => return Err(e),
                Err(e) => {
                    warn!("Could not validate {}: {}", job.source_table, e);
                    ValidationEntry {
                        source_table: job.source_table,
                        target_table: job.target_table,
                        outcome: None,
                        error: Some(e.to_string()),
                    }
                }
            };
            entries.push(entry);
        }

        Ok(entries)
    }

    /// Close both connections without running.
    pub async fn close(&self) {
        self.source.close().await;
        self.target.close().await;
    }

    fn checker(&self) -> VerificationChecker {
        VerificationChecker::new(
            self.source.clone(),
            self.target.clone(),
            self.events.clone(),
        )
    }

    async fn finish_table(&self, stats: &mut RunStatistics, result: TableMigrationResult) {
        self.events
            .emit(MigrationEvent::TableFinished(result.clone()));
        if let Err(e) = self.run_sink.table_result(&result).await {
            warn!(
                "Failed to record result of {} in {} ledger: {}",
                result.source_table,
                self.run_sink.backend_type(),
                e
            );
        }
        stats.record(result);
    }

    async fn publish_status(&self, status: RunStatus, stats: &RunStatistics, error: Option<&str>) {
        if let Err(e) = self.run_sink.run_status(status, stats, error).await {
            warn!(
                "Failed to record run status {} in {} ledger: {}",
                status,
                self.run_sink.backend_type(),
                e
            );
        }
    }

    fn set_state(&self, job: &TableJob, state: TableState) {
        self.events.emit(MigrationEvent::TableState {
            table: job.source_table.clone(),
            state,
        });
    }

    fn message(&self, level: Level, text: String) {
        self.events.emit(MigrationEvent::Message { level, text });
    }
}

/// Wrap a per-table error, leaving fatal errors untouched.
fn per_table(e: MigrateError, wrap: impl FnOnce(MigrateError) -> MigrateError) -> MigrateError {
    if e.is_fatal() {
        e
    } else {
        match e {
            MigrateError::Schema { .. } | MigrateError::Ddl { .. } => e,
            other => wrap(other),
        }
    }
}
