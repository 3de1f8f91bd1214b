//! Throttled progress telemetry for a streaming transfer.
//!
//! [`ProgressTracker`] is pure bookkeeping: callers pass in the current
//! `Instant`, so emission cadence and speed math are deterministic under test.

use std::fmt;
use std::time::{Duration, Instant};

/// Emit a progress line at least every this many batches.
pub const EMIT_EVERY_BATCHES: u64 = 10;

/// One progress line.
#[derive(Debug, Clone, PartialEq)]
pub struct ProgressReport {
    pub table: String,
    pub elapsed: Duration,
    pub rows: u64,
    pub total_rows: Option<u64>,
    /// Percent complete, always within `[0, 100]`.
    pub percent: f64,
    pub batch: u64,
    pub total_batches: Option<u64>,
    /// Rows per second since the previous emission; lifetime average on the final line.
    pub speed: f64,
    /// `None` when the average speed is not positive or the total is unknown.
    pub eta: Option<Duration>,
    pub bar: String,
    pub is_final: bool,
}

impl fmt::Display for ProgressReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let total = self
            .total_rows
            .map(format_number)
            .unwrap_or_else(|| "?".to_string());
        let batches = self
            .total_batches
            .map(format_number)
            .unwrap_or_else(|| "?".to_string());
        write!(
            f,
            "[{}] {:.2}% | {}/{} rows | Batch {}/{} | Speed: {} rows/s | ",
            self.bar,
            self.percent,
            format_number(self.rows),
            total,
            format_number(self.batch),
            batches,
            format_number(self.speed as u64),
        )?;
        if self.is_final {
            write!(f, "Time: {}", format_duration(self.elapsed.as_secs_f64()))
        } else {
            let eta = self
                .eta
                .map(|d| format_duration(d.as_secs_f64()))
                .unwrap_or_else(|| "N/A".to_string());
            write!(f, "ETA: {}", eta)
        }
    }
}

/// Tracks rows and batches for one table and decides when to report.
#[derive(Debug)]
pub struct ProgressTracker {
    table: String,
    total_rows: Option<u64>,
    total_batches: Option<u64>,
    bar_width: usize,
    log_interval: Duration,
    start: Instant,
    last_emit: Instant,
    rows_at_last_emit: u64,
    rows: u64,
    batches: u64,
}

impl ProgressTracker {
    pub fn new(
        table: impl Into<String>,
        total_rows: Option<u64>,
        batch_size: usize,
        bar_width: usize,
        log_interval: Duration,
        start: Instant,
    ) -> Self {
        Self {
            table: table.into(),
            total_rows,
            total_batches: total_rows.map(|t| total_batches(t, batch_size)),
            bar_width: bar_width.max(1),
            log_interval,
            start,
            last_emit: start,
            rows_at_last_emit: 0,
            rows: 0,
            batches: 0,
        }
    }

    pub fn rows(&self) -> u64 {
        self.rows
    }

    pub fn batches(&self) -> u64 {
        self.batches
    }

    pub fn total_batches(&self) -> Option<u64> {
        self.total_batches
    }

    /// Record a written batch; returns a report when one is due.
    ///
    /// A report is due after the first batch, on every
    /// [`EMIT_EVERY_BATCHES`]th batch, and whenever `log_interval` has passed
    /// since the previous report.
    pub fn on_batch(&mut self, rows_in_batch: usize, now: Instant) -> Option<ProgressReport> {
        self.rows += rows_in_batch as u64;
        self.batches += 1;

        let since_last = now.saturating_duration_since(self.last_emit);
        let due = self.batches == 1
            || self.batches % EMIT_EVERY_BATCHES == 0
            || since_last >= self.log_interval;
        if !due {
            return None;
        }

        let elapsed = now.saturating_duration_since(self.start);
        let avg = rate(self.rows, elapsed);
        let recent_rows = self.rows - self.rows_at_last_emit;
        let speed = if since_last > Duration::ZERO {
            rate(recent_rows, since_last)
        } else {
            avg
        };
        let eta = match self.total_rows {
            Some(total) if avg > 0.0 => Some(Duration::from_secs_f64(
                total.saturating_sub(self.rows) as f64 / avg,
            )),
            _ => None,
        };
        let percent = self.percent();

        self.last_emit = now;
        self.rows_at_last_emit = self.rows;

        Some(ProgressReport {
            table: self.table.clone(),
            elapsed,
            rows: self.rows,
            total_rows: self.total_rows,
            percent,
            batch: self.batches,
            total_batches: self.total_batches,
            speed,
            eta,
            bar: render_bar(self.bar_width, percent),
            is_final: false,
        })
    }

    /// The unconditional end-of-stream report at 100% with lifetime speed.
    pub fn finish(&self, now: Instant) -> ProgressReport {
        let elapsed = now.saturating_duration_since(self.start);
        ProgressReport {
            table: self.table.clone(),
            elapsed,
            rows: self.rows,
            total_rows: self.total_rows,
            percent: 100.0,
            batch: self.batches,
            total_batches: self.total_batches,
            speed: rate(self.rows, elapsed),
            eta: None,
            bar: render_bar(self.bar_width, 100.0),
            is_final: true,
        }
    }

    fn percent(&self) -> f64 {
        match self.total_rows {
            Some(0) => 100.0,
            Some(total) => (self.rows as f64 / total as f64 * 100.0).clamp(0.0, 100.0),
            None => 0.0,
        }
    }
}

/// `ceil(total / batch_size)`.
pub fn total_batches(total_rows: u64, batch_size: usize) -> u64 {
    total_rows.div_ceil(batch_size.max(1) as u64)
}

/// Rows per second, zero for a non-positive interval.
pub fn rate(rows: u64, elapsed: Duration) -> f64 {
    let secs = elapsed.as_secs_f64();
    if secs > 0.0 {
        rows as f64 / secs
    } else {
        0.0
    }
}

/// Render `[====>.....]` content for `percent` at `width` characters.
pub fn render_bar(width: usize, percent: f64) -> String {
    let width = width.max(1);
    if percent >= 100.0 {
        return "=".repeat(width);
    }
    let filled = ((width as f64 * percent.max(0.0) / 100.0).floor() as usize).min(width - 1);
    format!(
        "{}>{}",
        "=".repeat(filled),
        ".".repeat(width - filled - 1)
    )
}

/// `Ns`, `Mm Ss` or `Hh Mm Ss`; `N/A` for negative input.
pub fn format_duration(seconds: f64) -> String {
    if seconds < 0.0 || seconds.is_nan() {
        return "N/A".to_string();
    }
    let total = seconds as u64;
    let (h, m, s) = (total / 3600, (total % 3600) / 60, total % 60);
    if total < 60 {
        format!("{}s", s)
    } else if h == 0 {
        format!("{}m {}s", m, s)
    } else {
        format!("{}h {}m {}s", h, m, s)
    }
}

/// Integer with `,` thousands separators.
pub fn format_number(n: u64) -> String {
    let digits = n.to_string();
    let mut out = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, c) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push(',');
        }
        out.push(c);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tracker(total: Option<u64>, start: Instant) -> ProgressTracker {
        ProgressTracker::new("t", total, 100, 10, Duration::from_secs(3), start)
    }

    #[test]
    fn test_cadence_over_35_batches() {
        let start = Instant::now();
        let mut t = tracker(Some(3_500), start);
        let mut emitted = Vec::new();
        let mut last_rows = 0;
        for i in 1..=35u64 {
            // 10ms per batch keeps the time trigger out of play.
            let now = start + Duration::from_millis(10 * i);
            if let Some(report) = t.on_batch(100, now) {
                assert!(report.rows >= last_rows);
                assert!((0.0..=100.0).contains(&report.percent));
                last_rows = report.rows;
                emitted.push(report.batch);
            }
        }
        assert_eq!(emitted, vec![1, 10, 20, 30]);
        assert_eq!(t.rows(), 3_500);
        assert_eq!(t.total_batches(), Some(35));
    }

    #[test]
    fn test_time_trigger() {
        let start = Instant::now();
        let mut t = tracker(Some(1_000), start);
        assert!(t.on_batch(100, start + Duration::from_millis(1)).is_some());
        assert!(t.on_batch(100, start + Duration::from_secs(1)).is_none());
        let report = t.on_batch(100, start + Duration::from_secs(5)).unwrap();
        assert_eq!(report.batch, 3);
    }

    #[test]
    fn test_speed_is_instantaneous() {
        let start = Instant::now();
        let mut t = tracker(Some(10_000), start);
        // First batch: 100 rows in 1s.
        let first = t.on_batch(100, start + Duration::from_secs(1)).unwrap();
        assert_eq!(first.speed, 100.0);
        // 200 rows over the next 4s, triggered by the interval.
        assert!(t.on_batch(100, start + Duration::from_secs(2)).is_none());
        let second = t.on_batch(100, start + Duration::from_secs(5)).unwrap();
        assert_eq!(second.speed, 50.0);
        // ETA uses the lifetime average: 300 rows in 5s = 60 rows/s.
        assert_eq!(second.eta, Some(Duration::from_secs_f64(9_700.0 / 60.0)));
    }

    #[test]
    fn test_eta_unavailable_without_speed() {
        let start = Instant::now();
        let mut t = tracker(Some(1_000), start);
        let report = t.on_batch(100, start).unwrap();
        assert_eq!(report.eta, None);
        assert!(report.to_string().ends_with("ETA: N/A"));
    }

    #[test]
    fn test_percent_is_clamped() {
        let start = Instant::now();
        // Source grew after counting.
        let mut t = tracker(Some(50), start);
        let report = t.on_batch(100, start + Duration::from_secs(1)).unwrap();
        assert_eq!(report.percent, 100.0);

        let mut unknown = tracker(None, start);
        let report = unknown.on_batch(100, start + Duration::from_secs(1)).unwrap();
        assert_eq!(report.percent, 0.0);
        assert!(report.to_string().contains("100/? rows"));
    }

    #[test]
    fn test_finish_is_full() {
        let start = Instant::now();
        let mut t = tracker(Some(250), start);
        t.on_batch(100, start + Duration::from_secs(1));
        t.on_batch(100, start + Duration::from_secs(2));
        t.on_batch(50, start + Duration::from_secs(2));
        let report = t.finish(start + Duration::from_secs(5));
        assert!(report.is_final);
        assert_eq!(report.bar, "==========");
        assert_eq!(report.speed, 50.0);
        assert_eq!(
            report.to_string(),
            "[==========] 100.00% | 250/250 rows | Batch 3/3 | Speed: 50 rows/s | Time: 5s"
        );
    }

    #[test]
    fn test_render_bar() {
        assert_eq!(render_bar(10, 0.0), ">.........");
        assert_eq!(render_bar(10, 45.0), "====>.....");
        assert_eq!(render_bar(10, 99.9), "=========>");
        assert_eq!(render_bar(10, 100.0), "==========");
    }

    #[test]
    fn test_format_duration() {
        assert_eq!(format_duration(-1.0), "N/A");
        assert_eq!(format_duration(8.2), "8s");
        assert_eq!(format_duration(59.6), "59s");
        assert_eq!(format_duration(60.0), "1m 0s");
        assert_eq!(format_duration(119.9), "1m 59s");
        assert_eq!(format_duration(125.0), "2m 5s");
        assert_eq!(format_duration(3_725.0), "1h 2m 5s");
    }

    #[test]
    fn test_format_number() {
        assert_eq!(format_number(0), "0");
        assert_eq!(format_number(999), "999");
        assert_eq!(format_number(1_000), "1,000");
        assert_eq!(format_number(1_234_567), "1,234,567");
    }

    #[test]
    fn test_total_batches() {
        assert_eq!(total_batches(25_000, 10_000), 3);
        assert_eq!(total_batches(20_000, 10_000), 2);
        assert_eq!(total_batches(0, 10_000), 0);
    }
}
