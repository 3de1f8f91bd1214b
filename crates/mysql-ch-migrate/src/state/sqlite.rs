//! SQLite task ledger.
//!
//! One row per run in `tasks`, free-form messages in `task_logs`, and one row
//! per attempted table in `table_migrations`. The ledger is local to the
//! machine running the migration and never touches the source or target.

use std::str::FromStr;

use async_trait::async_trait;
use chrono::Local;
use serde::Serialize;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions, SqliteRow};
use sqlx::Row;
use tracing::debug;

use crate::error::{MigrateError, Result};
use crate::orchestrator::{RunStatistics, TableMigrationResult};
use crate::state::backend::{RunSink, RunStatus};

/// Default number of tasks returned by [`SqliteLedger::list_tasks`].
pub const DEFAULT_TASK_LIMIT: u32 = 50;
/// Default number of log lines returned by [`SqliteLedger::get_task_logs`].
pub const DEFAULT_LOG_LIMIT: u32 = 1000;

const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

const SCHEMA: [&str; 3] = [
    r#"
    CREATE TABLE IF NOT EXISTS tasks (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        task_name TEXT NOT NULL,
        config_snapshot TEXT NOT NULL,
        config_hash TEXT NOT NULL DEFAULT '',
        status TEXT NOT NULL,
        start_time TEXT,
        end_time TEXT,
        total_tables INTEGER NOT NULL DEFAULT 0,
        success_tables INTEGER NOT NULL DEFAULT 0,
        failed_tables INTEGER NOT NULL DEFAULT 0,
        total_rows INTEGER NOT NULL DEFAULT 0,
        total_time REAL NOT NULL DEFAULT 0,
        error_message TEXT,
        created_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS task_logs (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        task_id INTEGER NOT NULL,
        log_level TEXT NOT NULL,
        log_message TEXT NOT NULL,
        log_time TEXT NOT NULL,
        FOREIGN KEY (task_id) REFERENCES tasks (id)
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS table_migrations (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        task_id INTEGER NOT NULL,
        mysql_table TEXT NOT NULL,
        ch_table TEXT NOT NULL,
        status TEXT NOT NULL,
        rows INTEGER NOT NULL DEFAULT 0,
        time_used REAL NOT NULL DEFAULT 0,
        speed REAL NOT NULL DEFAULT 0,
        verified BOOLEAN NOT NULL DEFAULT 0,
        error_message TEXT,
        FOREIGN KEY (task_id) REFERENCES tasks (id)
    )
    "#,
];

/// One recorded run.
#[derive(Debug, Clone, Serialize)]
pub struct TaskRecord {
    pub id: i64,
    pub task_name: String,
    pub config_snapshot: serde_json::Value,
    pub config_hash: String,
    pub status: RunStatus,
    pub start_time: Option<String>,
    pub end_time: Option<String>,
    pub total_tables: i64,
    pub success_tables: i64,
    pub failed_tables: i64,
    pub total_rows: i64,
    pub total_time: f64,
    pub error_message: Option<String>,
    pub created_at: String,
}

/// One log line attached to a run.
#[derive(Debug, Clone, Serialize)]
pub struct TaskLogRecord {
    pub id: i64,
    pub task_id: i64,
    pub log_level: String,
    pub log_message: String,
    pub log_time: String,
}

/// One table's recorded outcome.
#[derive(Debug, Clone, Serialize)]
pub struct TableMigrationRecord {
    pub id: i64,
    pub task_id: i64,
    pub source_table: String,
    pub target_table: String,
    pub status: String,
    pub rows: i64,
    pub time_used: f64,
    pub speed: f64,
    pub verified: bool,
    pub error_message: Option<String>,
}

fn ledger_err(e: sqlx::Error) -> MigrateError {
    MigrateError::Ledger(e.to_string())
}

fn now() -> String {
    Local::now().format(TIMESTAMP_FORMAT).to_string()
}

fn to_i64(v: u64) -> i64 {
    i64::try_from(v).unwrap_or(i64::MAX)
}

/// SQLite-backed task ledger.
#[derive(Clone)]
pub struct SqliteLedger {
    pool: SqlitePool,
}

impl SqliteLedger {
    /// Open (creating if missing) the ledger file at `path`.
    pub async fn open(path: &str) -> Result<Self> {
        let options = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(4)
            .connect_with(options)
            .await
            .map_err(|e| MigrateError::Ledger(format!("opening {}: {}", path, e)))?;

        let ledger = Self { pool };
        ledger.init_schema().await?;
        debug!("Opened task ledger at {}", path);
        Ok(ledger)
    }

    /// Open a private in-memory ledger.
    pub async fn open_in_memory() -> Result<Self> {
        let options = SqliteConnectOptions::from_str("sqlite::memory:").map_err(ledger_err)?;
        // Each in-memory connection is its own database, so keep exactly one alive.
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .min_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(options)
            .await
            .map_err(ledger_err)?;

        let ledger = Self { pool };
        ledger.init_schema().await?;
        Ok(ledger)
    }

    async fn init_schema(&self) -> Result<()> {
        for ddl in SCHEMA {
            sqlx::query(ddl)
                .execute(&self.pool)
                .await
                .map_err(ledger_err)?;
        }
        Ok(())
    }

    /// Insert a new run in the `running` state and return its id.
    pub async fn create_task(
        &self,
        task_name: &str,
        config_snapshot: &serde_json::Value,
        config_hash: &str,
        total_tables: usize,
    ) -> Result<i64> {
        let result = sqlx::query(
            r#"INSERT INTO tasks (task_name, config_snapshot, config_hash, status, start_time, total_tables)
               VALUES (?, ?, ?, ?, ?, ?)"#,
        )
        .bind(task_name)
        .bind(config_snapshot.to_string())
        .bind(config_hash)
        .bind(RunStatus::Running.as_str())
        .bind(now())
        .bind(total_tables as i64)
        .execute(&self.pool)
        .await
        .map_err(ledger_err)?;

        Ok(result.last_insert_rowid())
    }

    /// Update a run's status. Terminal statuses also stamp `end_time`.
    pub async fn update_task_status(
        &self,
        task_id: i64,
        status: RunStatus,
        stats: Option<&RunStatistics>,
        error: Option<&str>,
    ) -> Result<()> {
        let end_time = status.is_terminal().then(now);

        sqlx::query(
            r#"UPDATE tasks SET status = ?, end_time = COALESCE(?, end_time),
                   error_message = COALESCE(?, error_message)
               WHERE id = ?"#,
        )
        .bind(status.as_str())
        .bind(end_time)
        .bind(error)
        .bind(task_id)
        .execute(&self.pool)
        .await
        .map_err(ledger_err)?;

        if let Some(stats) = stats {
            sqlx::query(
                r#"UPDATE tasks SET total_tables = ?, success_tables = ?, failed_tables = ?,
                       total_rows = ?, total_time = ?
                   WHERE id = ?"#,
            )
            .bind(stats.total_tables as i64)
            .bind(stats.success_tables as i64)
            .bind(stats.failed_tables as i64)
            .bind(to_i64(stats.total_rows))
            .bind(stats.total_elapsed)
            .bind(task_id)
            .execute(&self.pool)
            .await
            .map_err(ledger_err)?;
        }

        Ok(())
    }

    /// Append a log line to a run.
    pub async fn add_log(&self, task_id: i64, level: &str, message: &str) -> Result<()> {
        sqlx::query(
            "INSERT INTO task_logs (task_id, log_level, log_message, log_time) VALUES (?, ?, ?, ?)",
        )
        .bind(task_id)
        .bind(level)
        .bind(message)
        .bind(now())
        .execute(&self.pool)
        .await
        .map_err(ledger_err)?;
        Ok(())
    }

    /// Record one table's outcome.
    pub async fn add_table_migration(
        &self,
        task_id: i64,
        result: &TableMigrationResult,
    ) -> Result<()> {
        sqlx::query(
            r#"INSERT INTO table_migrations
                   (task_id, mysql_table, ch_table, status, rows, time_used, speed, verified, error_message)
               VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)"#,
        )
        .bind(task_id)
        .bind(&result.source_table)
        .bind(&result.target_table)
        .bind(result.status.as_str())
        .bind(to_i64(result.rows_transferred))
        .bind(result.elapsed_seconds)
        .bind(result.rows_per_second)
        .bind(result.verified)
        .bind(result.error.as_deref())
        .execute(&self.pool)
        .await
        .map_err(ledger_err)?;
        Ok(())
    }

    /// Fetch one run.
    pub async fn get_task(&self, task_id: i64) -> Result<Option<TaskRecord>> {
        let row = sqlx::query("SELECT * FROM tasks WHERE id = ?")
            .bind(task_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(ledger_err)?;

        row.as_ref().map(task_from_row).transpose()
    }

    /// Most recent runs first.
    pub async fn list_tasks(&self, limit: u32) -> Result<Vec<TaskRecord>> {
        let rows = sqlx::query("SELECT * FROM tasks ORDER BY created_at DESC, id DESC LIMIT ?")
            .bind(limit as i64)
            .fetch_all(&self.pool)
            .await
            .map_err(ledger_err)?;

        rows.iter().map(task_from_row).collect()
    }

    /// A run's log lines, newest first.
    pub async fn get_task_logs(&self, task_id: i64, limit: u32) -> Result<Vec<TaskLogRecord>> {
        let rows = sqlx::query(
            "SELECT * FROM task_logs WHERE task_id = ? ORDER BY log_time DESC, id DESC LIMIT ?",
        )
        .bind(task_id)
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await
        .map_err(ledger_err)?;

        rows.iter()
            .map(|row| {
                Ok(TaskLogRecord {
                    id: row.try_get("id").map_err(ledger_err)?,
                    task_id: row.try_get("task_id").map_err(ledger_err)?,
                    log_level: row.try_get("log_level").map_err(ledger_err)?,
                    log_message: row.try_get("log_message").map_err(ledger_err)?,
                    log_time: row.try_get("log_time").map_err(ledger_err)?,
                })
            })
            .collect()
    }

    /// A run's table outcomes in the order they were recorded.
    pub async fn get_table_migrations(&self, task_id: i64) -> Result<Vec<TableMigrationRecord>> {
        let rows = sqlx::query("SELECT * FROM table_migrations WHERE task_id = ? ORDER BY id")
            .bind(task_id)
            .fetch_all(&self.pool)
            .await
            .map_err(ledger_err)?;

        rows.iter()
            .map(|row| {
                Ok(TableMigrationRecord {
                    id: row.try_get("id").map_err(ledger_err)?,
                    task_id: row.try_get("task_id").map_err(ledger_err)?,
                    source_table: row.try_get("mysql_table").map_err(ledger_err)?,
                    target_table: row.try_get("ch_table").map_err(ledger_err)?,
                    status: row.try_get("status").map_err(ledger_err)?,
                    rows: row.try_get("rows").map_err(ledger_err)?,
                    time_used: row.try_get("time_used").map_err(ledger_err)?,
                    speed: row.try_get("speed").map_err(ledger_err)?,
                    verified: row.try_get("verified").map_err(ledger_err)?,
                    error_message: row.try_get("error_message").map_err(ledger_err)?,
                })
            })
            .collect()
    }

    /// A [`RunSink`] that records into this ledger under `task_id`.
    pub fn run_sink(&self, task_id: i64) -> LedgerRunSink {
        LedgerRunSink {
            ledger: self.clone(),
            task_id,
        }
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }
}

fn task_from_row(row: &SqliteRow) -> Result<TaskRecord> {
    let snapshot: String = row.try_get("config_snapshot").map_err(ledger_err)?;
    let status: String = row.try_get("status").map_err(ledger_err)?;

    Ok(TaskRecord {
        id: row.try_get("id").map_err(ledger_err)?,
        task_name: row.try_get("task_name").map_err(ledger_err)?,
        config_snapshot: serde_json::from_str(&snapshot)?,
        config_hash: row.try_get("config_hash").map_err(ledger_err)?,
        status: status.parse()?,
        start_time: row.try_get("start_time").map_err(ledger_err)?,
        end_time: row.try_get("end_time").map_err(ledger_err)?,
        total_tables: row.try_get("total_tables").map_err(ledger_err)?,
        success_tables: row.try_get("success_tables").map_err(ledger_err)?,
        failed_tables: row.try_get("failed_tables").map_err(ledger_err)?,
        total_rows: row.try_get("total_rows").map_err(ledger_err)?,
        total_time: row.try_get("total_time").map_err(ledger_err)?,
        error_message: row.try_get("error_message").map_err(ledger_err)?,
        created_at: row.try_get("created_at").map_err(ledger_err)?,
    })
}

/// Run sink bound to one ledger task.
#[derive(Clone)]
pub struct LedgerRunSink {
    ledger: SqliteLedger,
    task_id: i64,
}

impl LedgerRunSink {
    pub fn task_id(&self) -> i64 {
        self.task_id
    }

    pub fn ledger(&self) -> &SqliteLedger {
        &self.ledger
    }
}

#[async_trait]
impl RunSink for LedgerRunSink {
    async fn run_status(
        &self,
        status: RunStatus,
        stats: &RunStatistics,
        error: Option<&str>,
    ) -> Result<()> {
        self.ledger
            .update_task_status(self.task_id, status, Some(stats), error)
            .await
    }

    async fn table_result(&self, result: &TableMigrationResult) -> Result<()> {
        self.ledger.add_table_migration(self.task_id, result).await
    }

    fn backend_type(&self) -> &'static str {
        "sqlite"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::orchestrator::TableStatus;

    fn result(source: &str, status: TableStatus, rows: u64) -> TableMigrationResult {
        TableMigrationResult {
            source_table: source.to_string(),
            target_table: format!("{}_ch", source),
            status,
            rows_transferred: rows,
            elapsed_seconds: 2.0,
            rows_per_second: rows as f64 / 2.0,
            verified: status == TableStatus::Success,
            error: (status == TableStatus::Failed).then(|| "boom".to_string()),
        }
    }

    #[tokio::test]
    async fn test_create_task_starts_running() {
        let ledger = SqliteLedger::open_in_memory().await.unwrap();
        let snapshot = serde_json::json!({"migration": {"tables": []}});
        let id = ledger.create_task("nightly", &snapshot, "abc", 3).await.unwrap();

        let task = ledger.get_task(id).await.unwrap().unwrap();
        assert_eq!(task.task_name, "nightly");
        assert_eq!(task.status, RunStatus::Running);
        assert_eq!(task.total_tables, 3);
        assert_eq!(task.config_snapshot, snapshot);
        assert_eq!(task.config_hash, "abc");
        assert!(task.start_time.is_some());
        assert!(task.end_time.is_none());
    }

    #[tokio::test]
    async fn test_terminal_status_sets_end_time_and_counters() {
        let ledger = SqliteLedger::open_in_memory().await.unwrap();
        let id = ledger
            .create_task("run", &serde_json::json!({}), "", 2)
            .await
            .unwrap();

        let stats = RunStatistics {
            total_tables: 2,
            success_tables: 1,
            failed_tables: 1,
            total_rows: 500,
            total_elapsed: 4.5,
            avg_speed: 111.1,
            tables: Vec::new(),
        };
        ledger
            .update_task_status(id, RunStatus::Failed, Some(&stats), Some("orders failed"))
            .await
            .unwrap();

        let task = ledger.get_task(id).await.unwrap().unwrap();
        assert_eq!(task.status, RunStatus::Failed);
        assert!(task.end_time.is_some());
        assert_eq!(task.success_tables, 1);
        assert_eq!(task.failed_tables, 1);
        assert_eq!(task.total_rows, 500);
        assert_eq!(task.error_message.as_deref(), Some("orders failed"));
    }

    #[tokio::test]
    async fn test_missing_task_is_none() {
        let ledger = SqliteLedger::open_in_memory().await.unwrap();
        assert!(ledger.get_task(42).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_list_tasks_newest_first_with_limit() {
        let ledger = SqliteLedger::open_in_memory().await.unwrap();
        for name in ["first", "second", "third"] {
            ledger
                .create_task(name, &serde_json::json!({}), "", 1)
                .await
                .unwrap();
        }

        let tasks = ledger.list_tasks(2).await.unwrap();
        assert_eq!(tasks.len(), 2);
        assert_eq!(tasks[0].task_name, "third");
        assert_eq!(tasks[1].task_name, "second");
    }

    #[tokio::test]
    async fn test_logs_are_scoped_to_task() {
        let ledger = SqliteLedger::open_in_memory().await.unwrap();
        let a = ledger.create_task("a", &serde_json::json!({}), "", 1).await.unwrap();
        let b = ledger.create_task("b", &serde_json::json!({}), "", 1).await.unwrap();

        ledger.add_log(a, "INFO", "starting").await.unwrap();
        ledger.add_log(a, "ERROR", "failed").await.unwrap();
        ledger.add_log(b, "INFO", "other").await.unwrap();

        let logs = ledger.get_task_logs(a, DEFAULT_LOG_LIMIT).await.unwrap();
        assert_eq!(logs.len(), 2);
        assert_eq!(logs[0].log_message, "failed");
        assert_eq!(logs[0].log_level, "ERROR");
    }

    #[tokio::test]
    async fn test_run_sink_records_table_results() {
        let ledger = SqliteLedger::open_in_memory().await.unwrap();
        let id = ledger.create_task("run", &serde_json::json!({}), "", 2).await.unwrap();
        let sink = ledger.run_sink(id);

        sink.table_result(&result("orders", TableStatus::Success, 1000))
            .await
            .unwrap();
        sink.table_result(&result("users", TableStatus::Failed, 0))
            .await
            .unwrap();

        let tables = ledger.get_table_migrations(id).await.unwrap();
        assert_eq!(tables.len(), 2);
        assert_eq!(tables[0].source_table, "orders");
        assert_eq!(tables[0].target_table, "orders_ch");
        assert_eq!(tables[0].status, "success");
        assert_eq!(tables[0].rows, 1000);
        assert!(tables[0].verified);
        assert_eq!(tables[1].status, "failed");
        assert!(!tables[1].verified);
        assert_eq!(tables[1].error_message.as_deref(), Some("boom"));
        assert_eq!(sink.backend_type(), "sqlite");
    }

    #[tokio::test]
    async fn test_open_file_ledger_persists() {
        let dir = std::env::temp_dir().join(format!("ledger-{}", uuid::Uuid::new_v4()));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("tasks.db");
        let path = path.to_str().unwrap();

        let ledger = SqliteLedger::open(path).await.unwrap();
        let id = ledger.create_task("disk", &serde_json::json!({}), "", 1).await.unwrap();
        ledger.close().await;

        let reopened = SqliteLedger::open(path).await.unwrap();
        assert!(reopened.get_task(id).await.unwrap().is_some());
        reopened.close().await;
        let _ = std::fs::remove_dir_all(&dir);
    }
}
