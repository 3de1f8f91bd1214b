//! MySQL/MariaDB source reader implementation.
//!
//! Implements the `SourceReader` trait for MySQL/MariaDB databases on top of
//! SQLx: INFORMATION_SCHEMA introspection, buffered count/probe queries, and a
//! streaming cursor that pulls one row at a time off the wire.

use std::collections::HashSet;
use std::time::Duration;

use async_trait::async_trait;
use futures::{Stream, TryStreamExt};
use sqlx::mysql::{
    MySqlArguments, MySqlConnectOptions, MySqlPool, MySqlPoolOptions, MySqlRow, MySqlSslMode,
};
use sqlx::{Column as _, Row as _, TypeInfo, ValueRef};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::config::{PerformanceConfig, SourceConfig};
use crate::core::schema::{ColumnDescriptor, PrimaryKey, TableSchema};
use crate::core::stream::{RowStream, ROW_CHANNEL_CAPACITY};
use crate::core::traits::SourceReader;
use crate::core::value::{Row, SqlValue};
use crate::ddl::quote_ident;
use crate::error::{MigrateError, Result};

type MySqlQuery<'q> = sqlx::query::Query<'q, sqlx::MySql, MySqlArguments>;

/// MySQL/MariaDB source reader implementation.
pub struct MysqlReader {
    pool: MySqlPool,
    database: String,
    read_timeout: Duration,
}

impl MysqlReader {
    /// Create a new MySQL reader from configuration.
    pub async fn new(config: &SourceConfig, performance: &PerformanceConfig) -> Result<Self> {
        let ssl_mode = match config.ssl_mode.to_lowercase().as_str() {
            "disabled" => MySqlSslMode::Disabled,
            "required" => MySqlSslMode::Required,
            _ => MySqlSslMode::Preferred,
        };

        let options = MySqlConnectOptions::new()
            .host(&config.host)
            .port(config.port)
            .database(&config.database)
            .username(&config.user)
            .password(&config.password)
            .charset(&config.charset)
            .ssl_mode(ssl_mode);

        let pool = MySqlPoolOptions::new()
            .max_connections(performance.max_connections)
            .acquire_timeout(performance.connect_timeout())
            .connect_with(options)
            .await
            .map_err(|e| MigrateError::connection(e, "creating MySQL source pool"))?;

        let reader = Self {
            pool,
            database: config.database.clone(),
            read_timeout: performance.read_timeout(),
        };
        reader.test_connection().await?;

        info!(
            "Connected to MySQL source: {}:{}/{}",
            config.host, config.port, config.database
        );

        Ok(reader)
    }

    /// Run a buffered query under the configured read timeout.
    async fn fetch_all(&self, query: MySqlQuery<'_>) -> Result<Vec<MySqlRow>> {
        match tokio::time::timeout(self.read_timeout, query.fetch_all(&self.pool)).await {
            Ok(rows) => rows.map_err(classify),
            Err(_) => Err(MigrateError::connection(
                format!("no response within {:?}", self.read_timeout),
                "reading from MySQL source",
            )),
        }
    }

    async fn load_columns(&self, table: &str) -> Result<Vec<ColumnDescriptor>> {
        // COLUMN_TYPE carries length, precision and the unsigned qualifier.
        let query = r#"
            SELECT
                CAST(COLUMN_NAME AS CHAR(255)) AS COLUMN_NAME,
                CAST(COLUMN_TYPE AS CHAR(255)) AS COLUMN_TYPE,
                IF(IS_NULLABLE = 'YES', 1, 0) AS is_nullable
            FROM INFORMATION_SCHEMA.COLUMNS
            WHERE TABLE_SCHEMA = ? AND TABLE_NAME = ?
            ORDER BY ORDINAL_POSITION
        "#;

        let rows = self
            .fetch_all(sqlx::query(query).bind(&self.database).bind(table))
            .await
            .map_err(|e| schema_error(table, e))?;

        rows.iter()
            .map(|row| {
                Ok(ColumnDescriptor {
                    name: row.try_get::<String, _>("COLUMN_NAME")?,
                    source_type: row.try_get::<String, _>("COLUMN_TYPE")?,
                    nullable: row.try_get::<i32, _>("is_nullable")? == 1,
                })
            })
            .collect::<std::result::Result<Vec<_>, sqlx::Error>>()
            .map_err(|e| MigrateError::schema(table, e))
    }

    async fn load_primary_key(&self, table: &str) -> Result<PrimaryKey> {
        // CAST to CHAR to handle collation differences
        let query = r#"
            SELECT CAST(COLUMN_NAME AS CHAR(255)) AS COLUMN_NAME
            FROM INFORMATION_SCHEMA.KEY_COLUMN_USAGE
            WHERE TABLE_SCHEMA = ? AND TABLE_NAME = ? AND CONSTRAINT_NAME = 'PRIMARY'
            ORDER BY ORDINAL_POSITION
        "#;

        let rows = self
            .fetch_all(sqlx::query(query).bind(&self.database).bind(table))
            .await
            .map_err(|e| schema_error(table, e))?;

        let columns = rows
            .iter()
            .map(|row| row.try_get::<String, _>("COLUMN_NAME"))
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(|e| MigrateError::schema(table, e))?;

        Ok(PrimaryKey(columns))
    }

    async fn stream_impl(
        pool: MySqlPool,
        sql: String,
        read_timeout: Duration,
        tx: mpsc::Sender<Result<Row>>,
    ) -> Result<()> {
        let rows = sqlx::query(&sql).fetch(&pool);
        let mut decoder = RowDecoder::default();
        pump_rows(rows, read_timeout, &tx, |row| decoder.decode(&row)).await
    }
}

/// Forward cursor rows into the channel, waiting at most `read_timeout` for each.
async fn pump_rows<S, T, F>(
    mut rows: S,
    read_timeout: Duration,
    tx: &mpsc::Sender<Result<Row>>,
    mut convert: F,
) -> Result<()>
where
    S: Stream<Item = std::result::Result<T, sqlx::Error>> + Unpin,
    F: FnMut(T) -> Row,
{
    loop {
        let next = match tokio::time::timeout(read_timeout, rows.try_next()).await {
            Ok(next) => next.map_err(classify)?,
            Err(_) => {
                return Err(MigrateError::connection(
                    format!("no row within {:?}", read_timeout),
                    "streaming from MySQL source",
                ))
            }
        };
        let Some(row) = next else {
            break;
        };
        if tx.send(Ok(convert(row))).await.is_err() {
            break; // Receiver dropped
        }
    }
    Ok(())
}

#[async_trait]
impl SourceReader for MysqlReader {
    async fn describe_table(&self, table: &str) -> Result<TableSchema> {
        let columns = self.load_columns(table).await?;
        if columns.is_empty() {
            return Err(MigrateError::schema(
                table,
                format!("table does not exist in database {}", self.database),
            ));
        }
        let primary_key = self.load_primary_key(table).await?;

        info!("Got table structure: {} ({} columns)", table, columns.len());
        if primary_key.is_empty() {
            warn!("Table {} has no primary key, ordering by tuple()", table);
        } else {
            info!("Primary key of {}: {}", table, primary_key.columns().join(", "));
        }

        Ok(TableSchema {
            name: table.to_string(),
            columns,
            primary_key,
        })
    }

    async fn count_rows(&self, table: &str) -> Result<u64> {
        let query = format!("SELECT COUNT(*) AS cnt FROM {}", quote_ident(table));
        let rows = self.fetch_all(sqlx::query(&query)).await?;
        let count = rows
            .first()
            .map(|row| row.try_get::<i64, _>("cnt"))
            .transpose()?
            .unwrap_or(0);
        Ok(count.max(0) as u64)
    }

    async fn probe_columns(&self, table: &str) -> Result<Vec<String>> {
        let query = format!("SELECT * FROM {} LIMIT 1", quote_ident(table));
        let rows = self.fetch_all(sqlx::query(&query)).await?;
        match rows.first() {
            Some(row) => Ok(row
                .columns()
                .iter()
                .map(|c| c.name().to_string())
                .collect()),
            None => {
                debug!("Probe of {} returned no row, using declared columns", table);
                Ok(self.describe_table(table).await?.column_names())
            }
        }
    }

    fn stream_rows(&self, table: &str, columns: &[String]) -> RowStream {
        let col_list = if columns.is_empty() {
            "*".to_string()
        } else {
            columns
                .iter()
                .map(|c| quote_ident(c))
                .collect::<Vec<_>>()
                .join(", ")
        };
        let sql = format!("SELECT {} FROM {}", col_list, quote_ident(table));
        let pool = self.pool.clone();
        let read_timeout = self.read_timeout;

        RowStream::spawn(ROW_CHANNEL_CAPACITY, move |tx| async move {
            if let Err(e) = Self::stream_impl(pool, sql, read_timeout, tx.clone()).await {
                let _ = tx.send(Err(e)).await;
            }
        })
    }

    async fn test_connection(&self) -> Result<()> {
        sqlx::query("SELECT 1")
            .fetch_one(&self.pool)
            .await
            .map_err(|e| MigrateError::connection(e, "testing MySQL source connection"))?;
        Ok(())
    }

    fn database(&self) -> &str {
        &self.database
    }

    fn db_type(&self) -> &str {
        "mysql"
    }

    async fn close(&self) {
        self.pool.close().await;
        info!("MySQL connection closed");
    }
}

/// Lost or unreachable connections end the run; anything else is a query error.
fn classify(e: sqlx::Error) -> MigrateError {
    match e {
        sqlx::Error::Io(_)
        | sqlx::Error::Tls(_)
        | sqlx::Error::PoolTimedOut
        | sqlx::Error::PoolClosed
        | sqlx::Error::WorkerCrashed => MigrateError::connection(e, "reading from MySQL source"),
        other => MigrateError::Source(other),
    }
}

fn schema_error(table: &str, e: MigrateError) -> MigrateError {
    if e.is_fatal() {
        e
    } else {
        MigrateError::schema(table, e)
    }
}

/// Converts MySQL rows to canonical rows, positionally.
///
/// Values that do not decode as their declared type (zero dates, TIME
/// outside a single day) keep their raw value; each such column is
/// reported once per stream.
#[derive(Default)]
struct RowDecoder {
    warned: HashSet<String>,
}

impl RowDecoder {
    fn decode(&mut self, row: &MySqlRow) -> Row {
        row.columns()
            .iter()
            .enumerate()
            .map(|(idx, col)| {
                let is_null = row.try_get_raw(idx).map(|r| r.is_null()).unwrap_or(true);
                if is_null {
                    return SqlValue::Null;
                }
                let type_name = col.type_info().name();
                let kind = ColumnKind::from_type_name(type_name);
                if let Some(value) = typed_value(row, idx, kind) {
                    return value;
                }
                if self.warned.insert(col.name().to_string()) {
                    warn!(
                        "Column {} has {} values that do not decode, passing raw values through",
                        col.name(),
                        type_name
                    );
                }
                match row.try_get_unchecked::<Vec<u8>, _>(idx) {
                    Ok(raw) => decode_raw(kind, raw),
                    Err(_) => SqlValue::Null,
                }
            })
            .collect()
    }
}

/// Decode family of a MySQL wire type name (e.g. `INT UNSIGNED`, `DATETIME`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ColumnKind {
    Signed,
    Unsigned,
    Bool,
    Float,
    Double,
    Decimal,
    Date,
    Time,
    DateTime,
    Binary,
    Other,
}

impl ColumnKind {
    fn from_type_name(type_name: &str) -> Self {
        let upper = type_name.to_uppercase();
        let base = upper.split_whitespace().next().unwrap_or_default();
        match base {
            "YEAR" => ColumnKind::Unsigned,
            "TINYINT" | "SMALLINT" | "MEDIUMINT" | "INT" | "INTEGER" | "BIGINT" => {
                if upper.contains("UNSIGNED") {
                    ColumnKind::Unsigned
                } else {
                    ColumnKind::Signed
                }
            }
            "BOOLEAN" | "BOOL" => ColumnKind::Bool,
            "FLOAT" => ColumnKind::Float,
            "DOUBLE" | "REAL" => ColumnKind::Double,
            "DECIMAL" | "NUMERIC" => ColumnKind::Decimal,
            "DATE" => ColumnKind::Date,
            "TIME" => ColumnKind::Time,
            "DATETIME" | "TIMESTAMP" => ColumnKind::DateTime,
            "BINARY" | "VARBINARY" | "BLOB" | "TINYBLOB" | "MEDIUMBLOB" | "LONGBLOB" => {
                ColumnKind::Binary
            }
            _ => ColumnKind::Other,
        }
    }
}

/// Decode a non-NULL value as its declared type.
fn typed_value(row: &MySqlRow, idx: usize, kind: ColumnKind) -> Option<SqlValue> {
    match kind {
        ColumnKind::Signed => row.try_get::<i64, _>(idx).ok().map(SqlValue::Int),
        ColumnKind::Unsigned => row.try_get::<u64, _>(idx).ok().map(SqlValue::UInt),
        ColumnKind::Bool => row
            .try_get::<bool, _>(idx)
            .ok()
            .map(|v| SqlValue::Int(i64::from(v))),
        ColumnKind::Float => row
            .try_get::<f32, _>(idx)
            .ok()
            .map(|v| SqlValue::Float(f64::from(v))),
        ColumnKind::Double => row.try_get::<f64, _>(idx).ok().map(SqlValue::Float),
        ColumnKind::Decimal => row
            .try_get::<rust_decimal::Decimal, _>(idx)
            .ok()
            .map(SqlValue::Decimal),
        ColumnKind::Date => row
            .try_get::<chrono::NaiveDate, _>(idx)
            .ok()
            .map(SqlValue::from_date),
        ColumnKind::Time => row
            .try_get::<chrono::NaiveTime, _>(idx)
            .ok()
            .map(SqlValue::from_time),
        ColumnKind::DateTime => row
            .try_get::<chrono::NaiveDateTime, _>(idx)
            .ok()
            .map(SqlValue::from_datetime),
        ColumnKind::Binary => row.try_get::<Vec<u8>, _>(idx).ok().map(SqlValue::Bytes),
        ColumnKind::Other => row.try_get::<String, _>(idx).ok().map(SqlValue::Text),
    }
}

/// Decode the undecoded payload of a value.
///
/// Temporal payloads become text in the normalized layout whether they
/// arrived in text or binary protocol form. Other payloads become text when
/// they are UTF-8 and bytes otherwise.
fn decode_raw(kind: ColumnKind, raw: Vec<u8>) -> SqlValue {
    let temporal = match kind {
        ColumnKind::Date => temporal_text(&raw, |r| binary_datetime(r, false)),
        ColumnKind::DateTime => temporal_text(&raw, |r| binary_datetime(r, true)),
        ColumnKind::Time => temporal_text(&raw, binary_time),
        _ => None,
    };
    if let Some(text) = temporal {
        return SqlValue::Text(text);
    }
    if kind == ColumnKind::Binary {
        return SqlValue::Bytes(raw);
    }
    match String::from_utf8(raw) {
        Ok(text) => SqlValue::Text(text),
        Err(e) => SqlValue::Bytes(e.into_bytes()),
    }
}

fn temporal_text(raw: &[u8], binary: impl Fn(&[u8]) -> Option<String>) -> Option<String> {
    let is_text = !raw.is_empty()
        && raw
            .iter()
            .all(|b| b.is_ascii_digit() || matches!(b, b'-' | b':' | b' ' | b'.'));
    if is_text {
        // Fractional seconds are dropped like in the typed path.
        let text = std::str::from_utf8(raw).ok()?;
        return Some(text.split('.').next().unwrap_or(text).to_string());
    }
    binary(raw)
}

/// Binary protocol DATE/DATETIME: empty for the zero date, otherwise year
/// (u16 LE), month, day, then optional hour, minute, second, microseconds.
fn binary_datetime(raw: &[u8], with_time: bool) -> Option<String> {
    let (year, month, day) = match raw.len() {
        0 => (0, 0, 0),
        4 | 7 | 11 => (u16::from_le_bytes([raw[0], raw[1]]), raw[2], raw[3]),
        _ => return None,
    };
    let (hour, minute, second) = if raw.len() >= 7 {
        (raw[4], raw[5], raw[6])
    } else {
        (0, 0, 0)
    };
    let date = format!("{:04}-{:02}-{:02}", year, month, day);
    if with_time {
        Some(format!("{} {:02}:{:02}:{:02}", date, hour, minute, second))
    } else {
        Some(date)
    }
}

/// Binary protocol TIME: empty for zero, otherwise sign, days (u32 LE),
/// hour, minute, second and optional microseconds.
fn binary_time(raw: &[u8]) -> Option<String> {
    match raw.len() {
        0 => Some("00:00:00".to_string()),
        8 | 12 => {
            let sign = if raw[0] == 1 { "-" } else { "" };
            let days = u32::from_le_bytes([raw[1], raw[2], raw[3], raw[4]]);
            let hours = u64::from(days) * 24 + u64::from(raw[5]);
            Some(format!("{}{:02}:{:02}:{:02}", sign, hours, raw[6], raw[7]))
        }
        _ => None,
    }
}
