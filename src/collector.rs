//! Per-batch failure bookkeeping.

use crate::store::FailureKind;
use crate::writer::{WriteFailure, WriteOutcome};

/// The one failure kept per batch for diagnostics.
#[derive(Debug, Clone, PartialEq, serde::Serialize)]
pub struct SampledFailure {
    pub transaction_id: String,
    pub cause: WriteFailure,
}

/// Aggregate of the outcomes of one batch.
#[derive(Debug, Clone, Default, PartialEq, serde::Serialize)]
pub struct BatchReport {
    pub len: u64,
    pub succeeded: u64,
    pub failed: u64,
    pub cancelled: u64,
    /// Failures whose cause was a lost connection.
    pub connection_lost: u64,
    pub first_failure: Option<SampledFailure>,
}

impl BatchReport {
    /// Writes actually issued against the store.
    pub fn attempted(&self) -> u64 {
        self.succeeded + self.failed
    }

    pub fn has_failures(&self) -> bool {
        self.failed > 0
    }

    /// True when the store accepted nothing and every failure was a lost
    /// connection, i.e. there was no write path at all for this batch.
    pub fn store_unreachable(&self) -> bool {
        self.failed > 0 && self.succeeded == 0 && self.connection_lost == self.failed
    }
}

/// Fold a batch's outcomes into a [`BatchReport`].
///
/// Only the first failure cause is retained, however many writes failed.
pub fn collect(outcomes: &[WriteOutcome]) -> BatchReport {
    let mut report = BatchReport {
        len: outcomes.len() as u64,
        ..Default::default()
    };
    for outcome in outcomes {
        match outcome {
            WriteOutcome::Success => report.succeeded += 1,
            WriteOutcome::Cancelled { .. } => report.cancelled += 1,
            WriteOutcome::Failure {
                transaction_id,
                cause,
            } => {
                report.failed += 1;
                if cause.kind == FailureKind::ConnectionLost {
                    report.connection_lost += 1;
                }
                if report.first_failure.is_none() {
                    report.first_failure = Some(SampledFailure {
                        transaction_id: transaction_id.clone(),
                        cause: cause.clone(),
                    });
                }
            }
        }
    }
    report
}
