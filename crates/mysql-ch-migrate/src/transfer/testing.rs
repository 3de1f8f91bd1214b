//! In-memory source/target fakes shared by engine, verification and orchestrator tests.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;

use crate::core::{
    ColumnDescriptor, PrimaryKey, Row, RowStream, SourceReader, SqlValue, TableSchema,
    TargetWriter,
};
use crate::error::{MigrateError, Result};
use crate::events::{EventSink, MigrationEvent};
use crate::transfer::progress::ProgressReport;

#[derive(Debug, Clone)]
struct FakeTable {
    rows: u64,
    fail_read_after: Option<u64>,
}

#[derive(Default)]
pub struct FakeSource {
    tables: HashMap<String, FakeTable>,
    failing_describe: HashSet<String>,
    failing_count: HashSet<String>,
    pub closed: AtomicBool,
}

impl FakeSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_table(mut self, name: &str, rows: u64) -> Self {
        self.tables.insert(
            name.to_string(),
            FakeTable {
                rows,
                fail_read_after: None,
            },
        );
        self
    }

    pub fn failing_describe(mut self, name: &str) -> Self {
        self.failing_describe.insert(name.to_string());
        self
    }

    pub fn failing_count(mut self, name: &str) -> Self {
        self.failing_count.insert(name.to_string());
        self
    }

    pub fn failing_read_after(mut self, name: &str, rows: u64) -> Self {
        if let Some(t) = self.tables.get_mut(name) {
            t.fail_read_after = Some(rows);
        }
        self
    }

    fn table(&self, name: &str) -> Result<&FakeTable> {
        self.tables
            .get(name)
            .ok_or_else(|| MigrateError::schema(name, "table does not exist"))
    }
}

#[async_trait]
impl SourceReader for FakeSource {
    async fn describe_table(&self, table: &str) -> Result<TableSchema> {
        if self.failing_describe.contains(table) {
            return Err(MigrateError::schema(table, "metadata unavailable"));
        }
        self.table(table)?;
        Ok(TableSchema {
            name: table.to_string(),
            columns: vec![
                ColumnDescriptor::new("id", "bigint(20) unsigned", false),
                ColumnDescriptor::new("name", "varchar(32)", true),
            ],
            primary_key: PrimaryKey(vec!["id".to_string()]),
        })
    }

    async fn count_rows(&self, table: &str) -> Result<u64> {
        if self.failing_count.contains(table) {
            return Err(MigrateError::Source(sqlx::Error::RowNotFound));
        }
        Ok(self.table(table)?.rows)
    }

    async fn probe_columns(&self, table: &str) -> Result<Vec<String>> {
        self.table(table)?;
        Ok(vec!["id".to_string(), "name".to_string()])
    }

    fn stream_rows(&self, table: &str, _columns: &[String]) -> RowStream {
        let fake = self.tables.get(table).cloned();
        let table = table.to_string();
        RowStream::spawn(16, move |tx| async move {
            let Some(fake) = fake else {
                let _ = tx
                    .send(Err(MigrateError::schema(table, "table does not exist")))
                    .await;
                return;
            };
            for i in 0..fake.rows {
                if fake.fail_read_after == Some(i) {
                    let _ = tx.send(Err(MigrateError::Source(sqlx::Error::RowNotFound))).await;
                    return;
                }
                let row: Row = vec![SqlValue::UInt(i), SqlValue::Text(format!("name-{}", i))];
                if tx.send(Ok(row)).await.is_err() {
                    return;
                }
            }
        })
    }

    async fn test_connection(&self) -> Result<()> {
        Ok(())
    }

    fn database(&self) -> &str {
        "shop"
    }

    fn db_type(&self) -> &str {
        "fake"
    }

    async fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
    }
}

#[derive(Default)]
pub struct FakeTarget {
    batches: Mutex<HashMap<String, Vec<usize>>>,
    statements: Mutex<Vec<String>>,
    count_overrides: HashMap<String, u64>,
    failing_insert: HashSet<String>,
    pub closed: AtomicBool,
}

impl FakeTarget {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing_insert(mut self, table: &str) -> Self {
        self.failing_insert.insert(table.to_string());
        self
    }

    pub fn with_count(mut self, table: &str, count: u64) -> Self {
        self.count_overrides.insert(table.to_string(), count);
        self
    }

    pub fn batch_sizes(&self, table: &str) -> Vec<usize> {
        self.batches
            .lock()
            .unwrap()
            .get(table)
            .cloned()
            .unwrap_or_default()
    }

    pub fn statements(&self) -> Vec<String> {
        self.statements.lock().unwrap().clone()
    }
}

#[async_trait]
impl TargetWriter for FakeTarget {
    async fn execute(&self, sql: &str) -> Result<()> {
        self.statements.lock().unwrap().push(sql.to_string());
        Ok(())
    }

    async fn insert_batch(&self, table: &str, _columns: &[String], rows: &[Row]) -> Result<u64> {
        if self.failing_insert.contains(table) {
            return Err(MigrateError::Target("insert rejected".into()));
        }
        self.batches
            .lock()
            .unwrap()
            .entry(table.to_string())
            .or_default()
            .push(rows.len());
        Ok(rows.len() as u64)
    }

    async fn query_scalar(&self, _sql: &str) -> Result<u64> {
        Ok(0)
    }

    async fn count_rows(&self, table: &str) -> Result<u64> {
        if let Some(n) = self.count_overrides.get(table) {
            return Ok(*n);
        }
        Ok(self.batch_sizes(table).iter().sum::<usize>() as u64)
    }

    async fn test_connection(&self) -> Result<()> {
        Ok(())
    }

    fn database(&self) -> &str {
        "analytics"
    }

    fn db_type(&self) -> &str {
        "fake"
    }

    async fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
    }
}

/// Keeps every event for later inspection.
#[derive(Default)]
pub struct RecordingSink {
    events: Mutex<Vec<MigrationEvent>>,
}

impl RecordingSink {
    pub fn events(&self) -> Vec<MigrationEvent> {
        self.events.lock().unwrap().clone()
    }

    pub fn progress_reports(&self) -> Vec<ProgressReport> {
        self.events()
            .into_iter()
            .filter_map(|e| match e {
                MigrationEvent::Progress(r) => Some(r),
                _ => None,
            })
            .collect()
    }
}

impl EventSink for RecordingSink {
    fn emit(&self, event: MigrationEvent) {
        self.events.lock().unwrap().push(event);
    }
}
