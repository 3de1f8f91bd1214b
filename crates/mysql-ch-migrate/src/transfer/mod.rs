//! Streaming transfer engine.
//!
//! Moves one table from the source cursor into the target in bounded batches:
//!
//! 1. Count rows (progress only; a failed count never blocks the transfer)
//! 2. Resolve the projection column order once with a single-row probe
//! 3. Pull rows through the forward-only cursor into a [`Batch`]
//! 4. Bulk-write each full batch, then the leftover once at end of stream
//!
//! Memory stays bounded by the batch size plus the cursor channel capacity.

pub mod progress;

use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::config::Config;
use crate::core::{Batch, SourceReader, TargetWriter};
use crate::error::{MigrateError, Result};
use crate::events::{EventSink, MigrationEvent};

use self::progress::{rate, ProgressTracker};

/// Transfer knobs resolved from configuration.
#[derive(Debug, Clone)]
pub struct TransferConfig {
    /// Width of the textual progress bar.
    pub bar_width: usize,
    /// Minimum wall-clock time between progress lines.
    pub log_interval: Duration,
    /// Return early without streaming when the source count is zero.
    pub skip_empty_tables: bool,
}

impl Default for TransferConfig {
    fn default() -> Self {
        Self {
            bar_width: 40,
            log_interval: Duration::from_secs(3),
            skip_empty_tables: true,
        }
    }
}

impl TransferConfig {
    pub fn from_config(config: &Config) -> Self {
        Self {
            bar_width: config.migration.progress_bar_width,
            log_interval: config.migration.log_interval(),
            skip_empty_tables: config.advanced.skip_empty_tables,
        }
    }
}

/// Statistics from one table transfer.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TransferStats {
    /// Total rows written to the target.
    pub rows: u64,

    /// Lifetime average rows per second.
    pub avg_speed: f64,

    /// Wall-clock time of the transfer.
    pub elapsed: Duration,

    /// Bulk writes issued.
    pub batches: u64,

    /// The source was empty and the cursor was never opened.
    pub skipped_empty: bool,
}

/// Transfer engine for moving one table at a time.
pub struct TransferEngine {
    source: Arc<dyn SourceReader>,
    target: Arc<dyn TargetWriter>,
    config: TransferConfig,
    events: Arc<dyn EventSink>,
    cancel: CancellationToken,
}

impl TransferEngine {
    /// Create a new transfer engine.
    pub fn new(
        source: Arc<dyn SourceReader>,
        target: Arc<dyn TargetWriter>,
        config: TransferConfig,
        events: Arc<dyn EventSink>,
    ) -> Self {
        Self {
            source,
            target,
            config,
            events,
            cancel: CancellationToken::new(),
        }
    }

    /// Stop between batches once `cancel` fires.
    pub fn with_cancel(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Copy every row of `source_table` into `target_table`.
    ///
    /// Read and write failures abort the transfer as [`MigrateError::Transfer`];
    /// lost connections and cancellation come back unchanged. Nothing is retried.
    pub async fn transfer(
        &self,
        source_table: &str,
        target_table: &str,
        batch_size: usize,
    ) -> Result<TransferStats> {
        let batch_size = batch_size.max(1);
        let wrap = |e: MigrateError| {
            if e.is_fatal() {
                e
            } else {
                MigrateError::transfer(source_table, e)
            }
        };

        let total_rows = match self.source.count_rows(source_table).await {
            Ok(n) => Some(n),
            Err(e) if e.is_fatal() => return Err(e),
            Err(e) => {
                warn!(
                    "Could not count rows of {}, progress will not show a total: {}",
                    source_table, e
                );
                None
            }
        };

        if total_rows == Some(0) && self.config.skip_empty_tables {
            self.events.emit(MigrationEvent::EmptyTableSkipped {
                table: source_table.to_string(),
            });
            return Ok(TransferStats {
                skipped_empty: true,
                ..TransferStats::default()
            });
        }

        let start = Instant::now();
        let mut tracker = ProgressTracker::new(
            source_table,
            total_rows,
            batch_size,
            self.config.bar_width,
            self.config.log_interval,
            start,
        );
        self.events.emit(MigrationEvent::Plan {
            table: source_table.to_string(),
            total_rows,
            batch_size,
            total_batches: tracker.total_batches(),
        });

        let columns = self.source.probe_columns(source_table).await.map_err(wrap)?;
        debug!("Resolved {} columns for {}", columns.len(), source_table);

        let mut stream = self.source.stream_rows(source_table, &columns);
        let mut batch = Batch::new(batch_size);

        while let Some(row) = stream.next().await {
            batch.push(row.map_err(wrap)?);
            if batch.is_full() {
                self.flush(target_table, &columns, &mut batch, &mut tracker)
                    .await
                    .map_err(wrap)?;
                if self.cancel.is_cancelled() {
                    return Err(MigrateError::Cancelled);
                }
            }
        }
        // Release the cursor before the final write.
        drop(stream);

        if !batch.is_empty() {
            self.flush(target_table, &columns, &mut batch, &mut tracker)
                .await
                .map_err(wrap)?;
        }

        let now = Instant::now();
        self.events
            .emit(MigrationEvent::Progress(tracker.finish(now)));

        let elapsed = now.saturating_duration_since(start);
        let stats = TransferStats {
            rows: tracker.rows(),
            avg_speed: rate(tracker.rows(), elapsed),
            elapsed,
            batches: tracker.batches(),
            skipped_empty: false,
        };

        self.events.emit(MigrationEvent::TransferCompleted {
            table: source_table.to_string(),
            rows: stats.rows,
            elapsed: stats.elapsed,
            avg_speed: stats.avg_speed,
        });

        Ok(stats)
    }

    async fn flush(
        &self,
        target_table: &str,
        columns: &[String],
        batch: &mut Batch,
        tracker: &mut ProgressTracker,
    ) -> Result<()> {
        self.target
            .insert_batch(target_table, columns, batch.rows())
            .await?;
        let written = batch.len();
        batch.clear();

        if let Some(report) = tracker.on_batch(written, Instant::now()) {
            self.events.emit(MigrationEvent::Progress(report));
        }
        Ok(())
    }
}

#[cfg(test)]
pub(crate) mod testing;
