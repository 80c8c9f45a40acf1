//! Job-wide counters and the progress log.

use std::time::{Duration, Instant};

use crate::collector::BatchReport;

/// Running totals for a load job.
///
/// Updated only by the driver thread between batches. `attempted` counts
/// writes actually issued; `succeeded` counts writes the store confirmed.
/// `attempted == succeeded + failed` holds after every batch.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Serialize)]
pub struct JobStats {
    pub records_read: u64,
    pub attempted: u64,
    pub succeeded: u64,
    pub failed: u64,
    pub cancelled: u64,
    pub batches: u64,
}

impl JobStats {
    pub fn is_consistent(&self) -> bool {
        self.attempted == self.succeeded + self.failed
            && self.records_read == self.attempted + self.cancelled
    }
}

/// Adds batch reports into [`JobStats`] and logs a line per batch.
pub struct ProgressReporter {
    expected: Option<u64>,
    started: Instant,
}

impl ProgressReporter {
    /// `expected` is the number of source records, when known up front.
    pub fn new(expected: Option<u64>) -> Self {
        Self {
            expected,
            started: Instant::now(),
        }
    }

    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }

    pub fn report(&self, stats: &mut JobStats, report: &BatchReport) {
        stats.records_read += report.len;
        stats.attempted += report.attempted();
        stats.succeeded += report.succeeded;
        stats.failed += report.failed;
        stats.cancelled += report.cancelled;
        stats.batches += 1;

        let progress = match self.expected {
            Some(total) if total > 0 => format!(
                " ({:.1}% of {total})",
                stats.records_read as f64 * 100.0 / total as f64
            ),
            _ => String::new(),
        };
        tracing::info!(
            "Batch {}: {}/{} written, {} inserted so far{progress}",
            stats.batches,
            report.succeeded,
            report.len,
            stats.succeeded,
        );

        if let Some(sample) = &report.first_failure {
            tracing::warn!(
                "Batch {}: {} writes failed, first failure {}: {}",
                stats.batches,
                report.failed,
                sample.transaction_id,
                sample.cause,
            );
        }
        if report.cancelled > 0 {
            tracing::warn!(
                "Batch {}: {} writes cancelled",
                stats.batches,
                report.cancelled
            );
        }
    }

    /// Final summary line, emitted whether or not the job completed.
    pub fn finish(&self, stats: &JobStats) {
        let secs = self.elapsed().as_secs_f64();
        let rate = if secs > 0.0 {
            stats.attempted as f64 / secs
        } else {
            0.0
        };
        tracing::info!(
            "{} batches, {} read, {} attempted, {} succeeded, {} failed, {} cancelled in {:.1}s ({:.0} writes/s)",
            stats.batches,
            stats.records_read,
            stats.attempted,
            stats.succeeded,
            stats.failed,
            stats.cancelled,
            secs,
            rate,
        );
    }
}
