//! Forward-only row cursor handed out by source readers.

use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use super::value::Row;
use crate::error::Result;

/// Rows buffered between the cursor task and the consumer.
pub const ROW_CHANNEL_CAPACITY: usize = 1024;

/// A stream of rows fed by a background cursor task.
///
/// The producer runs on its own task and blocks on the bounded channel, so at
/// most the channel capacity of rows is in flight. Dropping the stream aborts
/// the producer, which releases its connection on every exit path including a
/// consumer that bails out mid-table.
pub struct RowStream {
    rx: mpsc::Receiver<Result<Row>>,
    task: Option<JoinHandle<()>>,
}

impl RowStream {
    /// Spawn `producer` with the sending half of a bounded row channel.
    pub fn spawn<F, Fut>(buffer: usize, producer: F) -> Self
    where
        F: FnOnce(mpsc::Sender<Result<Row>>) -> Fut,
        Fut: std::future::Future<Output = ()> + Send + 'static,
    {
        let (tx, rx) = mpsc::channel(buffer.max(1));
        let task = tokio::spawn(producer(tx));
        Self {
            rx,
            task: Some(task),
        }
    }

    /// Build a stream over rows already in memory.
    pub fn from_rows(rows: Vec<Result<Row>>) -> Self {
        let (tx, rx) = mpsc::channel(rows.len().max(1));
        for row in rows {
            // Capacity covers every row.
            let _ = tx.try_send(row);
        }
        Self { rx, task: None }
    }

    /// Next row, or `None` once the cursor is exhausted.
    pub async fn next(&mut self) -> Option<Result<Row>> {
        self.rx.recv().await
    }
}

impl Drop for RowStream {
    fn drop(&mut self) {
        self.rx.close();
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}
