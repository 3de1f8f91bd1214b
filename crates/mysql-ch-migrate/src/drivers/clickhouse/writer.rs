//! ClickHouse target writer implementation.

use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;
use ::clickhouse::Client;
use tracing::{debug, info};

use crate::config::{PerformanceConfig, TargetConfig};
use crate::core::traits::TargetWriter;
use crate::core::value::{Row, SqlValue};
use crate::ddl::quote_ident;
use crate::error::{MigrateError, Result};

/// ClickHouse target writer over the HTTP interface.
pub struct ClickhouseWriter {
    client: Client,
    http: reqwest::Client,
    url: String,
    user: String,
    password: String,
    database: String,
    read_timeout: Duration,
}

impl ClickhouseWriter {
    /// Create a new ClickHouse writer from configuration.
    pub async fn new(config: &TargetConfig, performance: &PerformanceConfig) -> Result<Self> {
        let url = config.url();

        let client = Client::default()
            .with_url(&url)
            .with_user(&config.user)
            .with_password(&config.password)
            .with_database(&config.database);

        let http = reqwest::Client::builder()
            .connect_timeout(performance.connect_timeout())
            .timeout(performance.read_timeout())
            .build()
            .map_err(|e| MigrateError::connection(e, "building ClickHouse HTTP client"))?;

        let writer = Self {
            client,
            http,
            url,
            user: config.user.clone(),
            password: config.password.clone(),
            database: config.database.clone(),
            read_timeout: performance.read_timeout(),
        };
        writer.test_connection().await?;

        info!(
            "Connected to ClickHouse target: {}:{}/{}",
            config.host, config.port, config.database
        );

        Ok(writer)
    }

    /// Await a client call under the configured read timeout.
    async fn timed<T, F>(&self, context: &str, fut: F) -> Result<T>
    where
        F: Future<Output = std::result::Result<T, ::clickhouse::error::Error>>,
    {
        match tokio::time::timeout(self.read_timeout, fut).await {
            Ok(Ok(v)) => Ok(v),
            Ok(Err(::clickhouse::error::Error::Network(e))) => {
                Err(MigrateError::connection(e, context.to_string()))
            }
            Ok(Err(e)) => Err(MigrateError::Target(format!("{}: {}", context, e))),
            Err(_) => Err(MigrateError::connection(
                format!("no response within {:?}", self.read_timeout),
                context.to_string(),
            )),
        }
    }
}

/// Encode rows as newline-delimited JSON objects keyed by column name.
///
/// Text and byte values are written as raw bytes inside the quotes, so a
/// BLOB that is not valid UTF-8 reaches a `String` column unchanged.
pub(crate) fn encode_json_each_row(columns: &[String], rows: &[Row]) -> Result<Vec<u8>> {
    let mut body = Vec::with_capacity(rows.len() * columns.len() * 16);
    for row in rows {
        body.push(b'{');
        for (i, (col, value)) in columns.iter().zip(row.iter()).enumerate() {
            if i > 0 {
                body.push(b',');
            }
            write_json_string(&mut body, col.as_bytes());
            body.push(b':');
            match value {
                SqlValue::Text(v) => write_json_string(&mut body, v.as_bytes()),
                SqlValue::Bytes(v) => write_json_string(&mut body, v),
                other => serde_json::to_writer(&mut body, &other.to_json())?,
            }
        }
        body.extend_from_slice(b"}\n");
    }
    Ok(body)
}

/// Quote a byte string. Only the quote, the backslash and control bytes are
/// escaped; every other byte is copied as is.
fn write_json_string(out: &mut Vec<u8>, bytes: &[u8]) {
    out.push(b'"');
    for &b in bytes {
        match b {
            b'"' => out.extend_from_slice(b"\\\""),
            b'\\' => out.extend_from_slice(b"\\\\"),
            b'\n' => out.extend_from_slice(b"\\n"),
            b'\r' => out.extend_from_slice(b"\\r"),
            b'\t' => out.extend_from_slice(b"\\t"),
            0x00..=0x1f | 0x7f => out.extend_from_slice(format!("\\u{:04x}", b).as_bytes()),
            _ => out.push(b),
        }
    }
    out.push(b'"');
}

fn insert_statement(table: &str, columns: &[String]) -> String {
    let cols = columns
        .iter()
        .map(|c| quote_ident(c))
        .collect::<Vec<_>>()
        .join(", ");
    format!(
        "INSERT INTO {} ({}) FORMAT JSONEachRow",
        quote_ident(table),
        cols
    )
}

#[async_trait]
impl TargetWriter for ClickhouseWriter {
    async fn execute(&self, sql: &str) -> Result<()> {
        debug!("Executing on ClickHouse: {}", sql);
        self.timed("executing ClickHouse statement", self.client.query(sql).execute())
            .await
    }

    async fn insert_batch(&self, table: &str, columns: &[String], rows: &[Row]) -> Result<u64> {
        if rows.is_empty() {
            return Ok(0);
        }

        let body = encode_json_each_row(columns, rows)?;
        let statement = insert_statement(table, columns);

        let response = self
            .http
            .post(&self.url)
            .query(&[("database", self.database.as_str()), ("query", statement.as_str())])
            .header("X-ClickHouse-User", &self.user)
            .header("X-ClickHouse-Key", &self.password)
            .body(body)
            .send()
            .await
            .map_err(|e| {
                if e.is_connect() || e.is_timeout() {
                    MigrateError::connection(e, "inserting into ClickHouse")
                } else {
                    MigrateError::Target(format!("HTTP request failed: {}", e))
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            let err_body = response.text().await.unwrap_or_default();
            return Err(MigrateError::Target(format!(
                "ClickHouse error ({}): {}",
                status,
                err_body.trim()
            )));
        }

        Ok(rows.len() as u64)
    }

    async fn query_scalar(&self, sql: &str) -> Result<u64> {
        self.timed("querying ClickHouse", self.client.query(sql).fetch_one::<u64>())
            .await
    }

    async fn test_connection(&self) -> Result<()> {
        let one = self
            .timed("testing ClickHouse connection", self.client.query("SELECT 1").fetch_one::<u8>())
            .await
            .map_err(|e| match e {
                MigrateError::Target(msg) => {
                    MigrateError::connection(msg, "testing ClickHouse connection")
                }
                other => other,
            })?;
        if one != 1 {
            return Err(MigrateError::connection(
                "unexpected result from SELECT 1",
                "testing ClickHouse connection",
            ));
        }
        Ok(())
    }

    fn database(&self) -> &str {
        &self.database
    }

    fn db_type(&self) -> &str {
        "clickhouse"
    }

    async fn close(&self) {
        // HTTP connections are pooled by the clients and released on drop.
        info!("ClickHouse connection closed");
    }
}
