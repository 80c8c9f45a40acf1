//! Bounded-concurrency writer for one batch at a time.
//!
//! The insert template is prepared once per session and shared by a fixed
//! pool of `concurrency` worker threads. [`ConcurrentWriter::write`] hands
//! every record of a batch to the pool and blocks until each one has
//! produced a [`WriteOutcome`], so at most `concurrency` writes are ever in
//! flight and no write of batch N+1 starts before batch N has drained.

use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::channel;
use std::sync::Arc;

use tracing::debug;
use workerpool::thunk::{Thunk, ThunkWorker};
use workerpool::Pool;

use crate::batch::Batch;
use crate::error::{LoadError, Result};
use crate::record::SaleRecord;
use crate::store::{FailureKind, Store, StoreError};

/// Default number of simultaneous writes per batch.
pub const DEFAULT_CONCURRENCY: usize = 100;

/// Cause attached to a failed write.
#[derive(Debug, Clone, PartialEq, serde::Serialize)]
pub struct WriteFailure {
    pub kind: FailureKind,
    pub message: String,
}

impl fmt::Display for WriteFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.kind, self.message)
    }
}

impl From<StoreError> for WriteFailure {
    fn from(err: StoreError) -> Self {
        WriteFailure {
            kind: err.kind(),
            message: err.to_string(),
        }
    }
}

/// Result of one attempted write of one record.
#[derive(Debug, Clone, PartialEq)]
pub enum WriteOutcome {
    Success,
    Failure {
        transaction_id: String,
        cause: WriteFailure,
    },
    /// The write was never issued because the job was interrupted.
    Cancelled { transaction_id: String },
}

impl WriteOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, WriteOutcome::Success)
    }

    /// Transaction id of a record that did not land, if any.
    pub fn unwritten_id(&self) -> Option<&str> {
        match self {
            WriteOutcome::Success => None,
            WriteOutcome::Failure { transaction_id, .. }
            | WriteOutcome::Cancelled { transaction_id } => Some(transaction_id),
        }
    }
}

fn attempt<S: Store>(store: &S, prepared: &S::Prepared, record: &SaleRecord) -> WriteOutcome {
    // A panicking backend must still yield an outcome for its record.
    let result = panic::catch_unwind(AssertUnwindSafe(|| store.insert(prepared, record)));
    match result {
        Ok(Ok(())) => WriteOutcome::Success,
        Ok(Err(err)) => WriteOutcome::Failure {
            transaction_id: record.transaction_id.clone(),
            cause: err.into(),
        },
        Err(_) => WriteOutcome::Failure {
            transaction_id: record.transaction_id.clone(),
            cause: WriteFailure {
                kind: FailureKind::Rejected,
                message: "write task panicked".to_string(),
            },
        },
    }
}

pub struct ConcurrentWriter<S: Store> {
    store: Arc<S>,
    prepared: Arc<S::Prepared>,
    pool: Pool<ThunkWorker<WriteOutcome>>,
    concurrency: usize,
    stop: Arc<AtomicBool>,
}

impl<S: Store> ConcurrentWriter<S> {
    /// Prepare the insert template and start `concurrency` workers.
    ///
    /// A store that cannot even compile the template offers no write path,
    /// which is reported as [`LoadError::StoreUnreachable`].
    pub fn new(store: Arc<S>, concurrency: usize, stop: Arc<AtomicBool>) -> Result<Self> {
        if concurrency == 0 {
            return Err(LoadError::invalid_config(
                "concurrency",
                "must be a positive integer",
            ));
        }
        let prepared = store
            .prepare_insert()
            .map_err(|e| LoadError::unreachable(format!("cannot prepare insert: {e}")))?;
        debug!(
            "Prepared insert on {} store, {concurrency} writers",
            store.name()
        );
        Ok(Self {
            store,
            prepared: Arc::new(prepared),
            pool: Pool::<ThunkWorker<WriteOutcome>>::new(concurrency),
            concurrency,
            stop,
        })
    }

    pub fn concurrency(&self) -> usize {
        self.concurrency
    }

    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    /// Write every record of `batch`, returning exactly one outcome per record.
    ///
    /// Outcomes arrive in completion order. Once the stop flag is raised,
    /// records not yet handed to a store call come back as
    /// [`WriteOutcome::Cancelled`] while writes already running finish.
    pub fn write(&self, batch: Batch<SaleRecord>) -> Vec<WriteOutcome> {
        let expected = batch.len();
        let mut outcomes = Vec::with_capacity(expected);
        let (tx, rx) = channel();

        for record in batch.records {
            if self.stop.load(Ordering::SeqCst) {
                outcomes.push(WriteOutcome::Cancelled {
                    transaction_id: record.transaction_id,
                });
                continue;
            }
            let store = self.store.clone();
            let prepared = self.prepared.clone();
            let stop = self.stop.clone();
            self.pool.execute_to(
                tx.clone(),
                Thunk::of(move || {
                    if stop.load(Ordering::SeqCst) {
                        return WriteOutcome::Cancelled {
                            transaction_id: record.transaction_id,
                        };
                    }
                    attempt::<S>(&store, &prepared, &record)
                }),
            );
        }
        drop(tx);

        // Every dispatched thunk sends exactly once; the channel closes when
        // the last one is done.
        outcomes.extend(rx.iter());
        debug_assert_eq!(outcomes.len(), expected);
        outcomes
    }
}
