//! Connectivity check for both endpoints.

use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;
use tokio::time::Instant;

use crate::config::Config;
use crate::core::{SourceReader, TargetWriter};
use crate::drivers::{ClickhouseWriter, MysqlReader};
use crate::error::{MigrateError, Result};

/// Connectivity of one endpoint.
#[derive(Debug, Clone, Serialize)]
pub struct EndpointHealth {
    pub connected: bool,
    pub latency_ms: u64,
    pub error: Option<String>,
}

/// Result of [`health_check`].
#[derive(Debug, Clone, Serialize)]
pub struct HealthReport {
    pub source: EndpointHealth,
    pub target: EndpointHealth,
    pub healthy: bool,
}

/// Connect to each side independently and time a round trip.
///
/// Never fails: connection errors are reported per endpoint.
pub async fn health_check(config: &Config) -> HealthReport {
    let source = check(MysqlReader::new(&config.source, &config.performance)).await;
    let target = check(ClickhouseWriter::new(&config.target, &config.performance)).await;

    let healthy = source.connected && target.connected;
    HealthReport {
        source,
        target,
        healthy,
    }
}

/// An open connection the health check can ping.
#[async_trait]
trait Endpoint: Send + Sync {
    async fn ping(&self) -> Result<()>;
    async fn release(&self);
}

#[async_trait]
impl Endpoint for MysqlReader {
    async fn ping(&self) -> Result<()> {
        SourceReader::test_connection(self).await
    }

    async fn release(&self) {
        SourceReader::close(self).await;
    }
}

#[async_trait]
impl Endpoint for ClickhouseWriter {
    async fn ping(&self) -> Result<()> {
        TargetWriter::test_connection(self).await
    }

    async fn release(&self) {
        TargetWriter::close(self).await;
    }
}

/// Latency covers the ping alone, not pool setup. A failed connect reports 0.
async fn check<E, F>(connect: F) -> EndpointHealth
where
    E: Endpoint,
    F: Future<Output = Result<E>>,
{
    let conn = match connect.await {
        Ok(conn) => conn,
        Err(e) => return endpoint(Duration::ZERO, Some(e)),
    };
    let started = Instant::now();
    let result = conn.ping().await;
    let latency = started.elapsed();
    conn.release().await;
    endpoint(latency, result.err())
}

fn endpoint(latency: Duration, error: Option<MigrateError>) -> EndpointHealth {
    EndpointHealth {
        connected: error.is_none(),
        latency_ms: latency.as_millis() as u64,
        error: error.map(|e| e.to_string()),
    }
}
