//! Structured migration events and the sinks that receive them.
//!
//! The transfer engine and orchestrator never write run output to ambient
//! global state. Each run is handed its own [`EventSink`]; the default
//! [`TracingSink`] forwards to `tracing`, a [`ChannelSink`] feeds a per-run
//! channel (drained into the task ledger by the CLI).

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tracing::Level;

use crate::orchestrator::{RunStatistics, TableMigrationResult, TableState};
use crate::transfer::progress::{format_duration, format_number, ProgressReport};

/// Something that happened during a migration run.
#[derive(Debug, Clone)]
pub enum MigrationEvent {
    /// A run is starting with the given tables.
    RunStarted { run_id: String, tables: Vec<String> },

    /// A table entered a new state.
    TableState {
        table: String,
        state: TableState,
    },

    /// A table mapping was skipped because a name is missing.
    MappingSkipped { index: usize, reason: String },

    /// The transfer plan for a table.
    Plan {
        table: String,
        total_rows: Option<u64>,
        batch_size: usize,
        total_batches: Option<u64>,
    },

    /// The source table is empty and was not streamed.
    EmptyTableSkipped { table: String },

    /// Throttled transfer progress.
    Progress(ProgressReport),

    /// A table's transfer finished.
    TransferCompleted {
        table: String,
        rows: u64,
        elapsed: Duration,
        avg_speed: f64,
    },

    /// Row counts compared after a transfer.
    Verified {
        table: String,
        source_count: u64,
        target_count: u64,
    },

    /// A table reached a terminal state.
    TableFinished(TableMigrationResult),

    /// The run ended.
    RunFinished(RunStatistics),

    /// Free-form message.
    Message { level: Level, text: String },
}

impl MigrationEvent {
    /// Severity of this event for log output.
    pub fn level(&self) -> Level {
        match self {
            MigrationEvent::MappingSkipped { .. } => Level::ERROR,
            MigrationEvent::EmptyTableSkipped { .. } => Level::WARN,
            MigrationEvent::Verified {
                source_count,
                target_count,
                ..
            } if source_count != target_count => Level::ERROR,
            MigrationEvent::TableFinished(result) if result.error.is_some() => Level::ERROR,
            MigrationEvent::TableState { .. } => Level::DEBUG,
            MigrationEvent::Message { level, .. } => *level,
            _ => Level::INFO,
        }
    }
}

impl fmt::Display for MigrationEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MigrationEvent::RunStarted { run_id, tables } => write!(
                f,
                "Starting migration run {} ({} tables: {})",
                run_id,
                tables.len(),
                tables.join(", ")
            ),
            MigrationEvent::TableState { table, state } => {
                write!(f, "Table {} -> {}", table, state)
            }
            MigrationEvent::MappingSkipped { index, reason } => {
                write!(f, "Skipping table mapping #{}: {}", index + 1, reason)
            }
            MigrationEvent::Plan {
                table,
                total_rows,
                batch_size,
                total_batches,
            } => write!(
                f,
                "Migration plan for {}: total rows {}, batch size {}, total batches {}",
                table,
                total_rows.map(format_number).unwrap_or_else(|| "?".into()),
                format_number(*batch_size as u64),
                total_batches.map(format_number).unwrap_or_else(|| "?".into()),
            ),
            MigrationEvent::EmptyTableSkipped { table } => {
                write!(f, "Table {} is empty, skipping transfer", table)
            }
            MigrationEvent::Progress(report) => write!(f, "[PROGRESS] {}", report),
            MigrationEvent::TransferCompleted {
                table,
                rows,
                elapsed,
                avg_speed,
            } => write!(
                f,
                "Data migration of {} completed: {} rows in {} ({} rows/s)",
                table,
                format_number(*rows),
                format_duration(elapsed.as_secs_f64()),
                format_number(*avg_speed as u64)
            ),
            MigrationEvent::Verified {
                table,
                source_count,
                target_count,
            } => {
                write!(
                    f,
                    "Verify {}: source {} | target {}",
                    table,
                    format_number(*source_count),
                    format_number(*target_count)
                )?;
                if source_count != target_count {
                    write!(
                        f,
                        " | verification failed, diff {}",
                        format_number(source_count.abs_diff(*target_count))
                    )?;
                }
                Ok(())
            }
            MigrationEvent::TableFinished(result) => match &result.error {
                Some(err) => write!(
                    f,
                    "Table {} -> {} failed after {}: {}",
                    result.source_table,
                    result.target_table,
                    format_duration(result.elapsed_seconds),
                    err
                ),
                None => write!(
                    f,
                    "Table {} -> {} completed in {} ({} rows, verified: {})",
                    result.source_table,
                    result.target_table,
                    format_duration(result.elapsed_seconds),
                    format_number(result.rows_transferred),
                    result.verified
                ),
            },
            MigrationEvent::RunFinished(stats) => write!(
                f,
                "Migration finished: {}/{} tables succeeded, {} failed, {} rows in {} ({} rows/s)",
                stats.success_tables,
                stats.total_tables,
                stats.failed_tables,
                format_number(stats.total_rows),
                format_duration(stats.total_elapsed),
                format_number(stats.avg_speed as u64)
            ),
            MigrationEvent::Message { text, .. } => f.write_str(text),
        }
    }
}

/// Receiver of migration events.
///
/// `emit` must not block: sinks are called inline from the transfer loop.
pub trait EventSink: Send + Sync {
    fn emit(&self, event: MigrationEvent);
}

/// Writes events through `tracing` at their own level.
#[derive(Debug, Default, Clone)]
pub struct TracingSink;

impl EventSink for TracingSink {
    fn emit(&self, event: MigrationEvent) {
        match event.level() {
            Level::ERROR => tracing::error!("{}", event),
            Level::WARN => tracing::warn!("{}", event),
            Level::INFO => tracing::info!("{}", event),
            Level::DEBUG => tracing::debug!("{}", event),
            _ => tracing::trace!("{}", event),
        }
    }
}

/// Sends events into a per-run channel.
///
/// Events are dropped when the channel is full or closed; [`ChannelSink::dropped`]
/// counts them.
#[derive(Debug, Clone)]
pub struct ChannelSink {
    tx: mpsc::Sender<MigrationEvent>,
    dropped: DroppedEvents,
}

impl ChannelSink {
    pub fn new(tx: mpsc::Sender<MigrationEvent>) -> Self {
        Self {
            tx,
            dropped: DroppedEvents::default(),
        }
    }

    /// Create a sink and the receiver that drains it.
    pub fn channel(capacity: usize) -> (Self, mpsc::Receiver<MigrationEvent>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        (Self::new(tx), rx)
    }

    /// Counter of events this sink (and its clones) could not deliver.
    ///
    /// The handle holds no sender, so the receiver still closes once every
    /// sink is gone.
    pub fn dropped(&self) -> DroppedEvents {
        self.dropped.clone()
    }
}

impl EventSink for ChannelSink {
    fn emit(&self, event: MigrationEvent) {
        // Non-blocking
        if self.tx.try_send(event).is_err() {
            self.dropped.0.fetch_add(1, Ordering::Relaxed);
        }
    }
}

/// Shared count of events a [`ChannelSink`] dropped.
#[derive(Debug, Clone, Default)]
pub struct DroppedEvents(Arc<AtomicU64>);

impl DroppedEvents {
    pub fn count(&self) -> u64 {
        self.0.load(Ordering::Relaxed)
    }
}

/// Discards every event.
#[derive(Debug, Default, Clone)]
pub struct NullSink;

impl EventSink for NullSink {
    fn emit(&self, _event: MigrationEvent) {}
}

/// Forwards every event to two sinks.
pub struct TeeSink<A, B> {
    first: A,
    second: B,
}

impl<A: EventSink, B: EventSink> TeeSink<A, B> {
    pub fn new(first: A, second: B) -> Self {
        Self { first, second }
    }
}

impl<A: EventSink, B: EventSink> EventSink for TeeSink<A, B> {
    fn emit(&self, event: MigrationEvent) {
        self.first.emit(event.clone());
        self.second.emit(event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_channel_sink_delivers_events() {
        let (sink, mut rx) = ChannelSink::channel(4);
        sink.emit(MigrationEvent::EmptyTableSkipped {
            table: "orders".into(),
        });
        let event = rx.try_recv().unwrap();
        assert_eq!(event.level(), Level::WARN);
        assert_eq!(event.to_string(), "Table orders is empty, skipping transfer");
    }

    #[test]
    fn test_channel_sink_drops_when_full() {
        let (sink, mut rx) = ChannelSink::channel(1);
        let dropped = sink.dropped();
        let clone = sink.clone();
        for _ in 0..3 {
            sink.emit(MigrationEvent::Message {
                level: Level::INFO,
                text: "x".into(),
            });
        }
        clone.emit(MigrationEvent::EmptyTableSkipped { table: "t".into() });
        assert!(rx.try_recv().is_ok());
        assert!(rx.try_recv().is_err());
        assert_eq!(dropped.count(), 3);

        // The counter does not keep the channel open.
        drop(sink);
        drop(clone);
        assert!(matches!(
            rx.try_recv(),
            Err(mpsc::error::TryRecvError::Disconnected)
        ));
        assert_eq!(dropped.count(), 3);
    }

    #[test]
    fn test_verified_mismatch_reports_difference() {
        let event = MigrationEvent::Verified {
            table: "orders".into(),
            source_count: 100,
            target_count: 97,
        };
        assert_eq!(event.level(), Level::ERROR);
        assert!(event.to_string().ends_with("diff 3"));
    }

    #[test]
    fn test_plan_with_unknown_total() {
        let event = MigrationEvent::Plan {
            table: "t".into(),
            total_rows: None,
            batch_size: 10_000,
            total_batches: None,
        };
        assert_eq!(
            event.to_string(),
            "Migration plan for t: total rows ?, batch size 10,000, total batches ?"
        );
    }

    #[test]
    fn test_tee_sink_forwards_to_both() {
        let (a, mut rx_a) = ChannelSink::channel(2);
        let (b, mut rx_b) = ChannelSink::channel(2);
        TeeSink::new(a, b).emit(MigrationEvent::Message {
            level: Level::INFO,
            text: "hello".into(),
        });
        assert!(rx_a.try_recv().is_ok());
        assert!(rx_b.try_recv().is_ok());
    }
}
