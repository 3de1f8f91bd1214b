//! Collaborator traits for the migration engine.
//!
//! - [`SourceReader`]: metadata, counts and a forward-only cursor on the source
//! - [`TargetWriter`]: statement execution, bulk insert and scalar queries on the target
//!
//! The orchestrator, transfer engine and verification checker only talk to
//! these traits, so they run unchanged against in-memory fakes in tests.

use async_trait::async_trait;

use crate::ddl::quote_ident;
use crate::error::Result;

use super::schema::TableSchema;
use super::stream::RowStream;
use super::value::Row;

/// Read structure and data from the source database.
#[async_trait]
pub trait SourceReader: Send + Sync {
    /// Columns in declaration order and the primary key ordered by key position.
    ///
    /// Fails with a schema error when the table does not exist.
    async fn describe_table(&self, table: &str) -> Result<TableSchema>;

    /// Lightweight row count for progress accounting and verification.
    async fn count_rows(&self, table: &str) -> Result<u64>;

    /// Resolve the projection column order with a single-row probe.
    async fn probe_columns(&self, table: &str) -> Result<Vec<String>>;

    /// Open a forward-only cursor over `table` projecting `columns`.
    ///
    /// Rows are produced one at a time by a background task; nothing is
    /// materialized beyond the stream's channel capacity.
    fn stream_rows(&self, table: &str, columns: &[String]) -> RowStream;

    /// Round-trip a trivial query.
    async fn test_connection(&self) -> Result<()>;

    /// Name of the connected database.
    fn database(&self) -> &str;

    /// Database type identifier (e.g. "mysql").
    fn db_type(&self) -> &str;

    /// Close the connection pool.
    async fn close(&self);
}

/// Write structure and data to the target database.
#[async_trait]
pub trait TargetWriter: Send + Sync {
    /// Execute a DDL or DML statement.
    async fn execute(&self, sql: &str) -> Result<()>;

    /// Drop a table if it exists.
    async fn drop_table(&self, table: &str) -> Result<()> {
        self.execute(&format!("DROP TABLE IF EXISTS {}", quote_ident(table)))
            .await
    }

    /// Bulk insert one batch with an explicit ordered column list.
    ///
    /// Returns the number of rows written.
    async fn insert_batch(&self, table: &str, columns: &[String], rows: &[Row]) -> Result<u64>;

    /// Run a query returning a single unsigned scalar.
    async fn query_scalar(&self, sql: &str) -> Result<u64>;

    /// Row count of a target table.
    async fn count_rows(&self, table: &str) -> Result<u64> {
        self.query_scalar(&format!("SELECT count() FROM {}", quote_ident(table)))
            .await
    }

    /// Round-trip a trivial query.
    async fn test_connection(&self) -> Result<()>;

    /// Name of the connected database.
    fn database(&self) -> &str;

    /// Database type identifier (e.g. "clickhouse").
    fn db_type(&self) -> &str;

    /// Release any held connections.
    async fn close(&self);
}
