//! The load job state machine.
//!
//! ```text
//! pre-flight ─► Connecting ─► Streaming ─► Validating ─► Completed
//!      │             │            │
//!      └─────────────┴────────────┴──────► Aborted
//! ```
//!
//! Pre-flight (configuration, source schema, id filter, ledger) runs before
//! any session is opened. Batches are written strictly one after another;
//! [`JobStats`] is only touched here, between batches.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tracing::{debug, error, info, warn};

use crate::batch::{Batch, Batcher};
use crate::collector::collect;
use crate::config::LoadConfig;
use crate::error::{LoadError, Result};
use crate::ledger::{read_id_list, FailureLedger};
use crate::progress::{JobStats, ProgressReporter};
use crate::record::{RecordSource, SaleRecord};
use crate::store::{Store, StoreError};
use crate::writer::ConcurrentWriter;

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
pub enum JobState {
    Connecting,
    Streaming,
    Validating,
    Completed,
    Aborted,
}

impl fmt::Display for JobState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            JobState::Connecting => "connecting",
            JobState::Streaming => "streaming",
            JobState::Validating => "validating",
            JobState::Completed => "completed",
            JobState::Aborted => "aborted",
        };
        f.write_str(name)
    }
}

/// How a job ended. Stats are always present, partial on abort.
#[derive(Debug, Clone)]
pub struct JobOutcome {
    pub state: JobState,
    pub stats: JobStats,
    pub error: Option<LoadError>,
    /// Rows read back during validation.
    pub sample: Vec<SaleRecord>,
}

impl JobOutcome {
    /// An outcome for a job that failed before it could be started.
    pub fn aborted(error: LoadError) -> Self {
        JobOutcome {
            state: JobState::Aborted,
            stats: JobStats::default(),
            error: Some(error),
            sample: Vec::new(),
        }
    }

    pub fn is_completed(&self) -> bool {
        self.state == JobState::Completed
    }

    pub fn exit_code(&self) -> i32 {
        if self.is_completed() {
            0
        } else {
            1
        }
    }
}

/// Machine-readable summary written by `--summary-json`.
#[derive(Debug, serde::Serialize)]
pub struct JobSummary<'a> {
    pub state: JobState,
    pub stats: &'a JobStats,
    pub error: Option<String>,
}

impl<'a> From<&'a JobOutcome> for JobSummary<'a> {
    fn from(outcome: &'a JobOutcome) -> Self {
        JobSummary {
            state: outcome.state,
            stats: &outcome.stats,
            error: outcome.error.as_ref().map(ToString::to_string),
        }
    }
}

struct Job {
    stats: JobStats,
    sample: Vec<SaleRecord>,
    ledger: Option<FailureLedger>,
}

impl Job {
    /// Append the ids of every record the job never reached to the ledger,
    /// so that the ledger alone is the complement of what was stored.
    ///
    /// A source error stops the drain; ids past it cannot be read.
    fn record_unread<I>(&mut self, rest: I)
    where
        I: Iterator<Item = Result<Batch<SaleRecord>>>,
    {
        let Some(ledger) = self.ledger.as_mut() else {
            return;
        };
        let mut unread = 0u64;
        for batch in rest {
            let batch = match batch {
                Ok(batch) => batch,
                Err(e) => {
                    warn!("Source failed while recording unread ids: {e}");
                    break;
                }
            };
            match ledger.record_ids(batch.records.iter().map(|r| r.transaction_id.as_str())) {
                Ok(n) => unread += n,
                Err(e) => {
                    warn!("Failed to record unread ids: {e}");
                    return;
                }
            }
        }
        if unread > 0 {
            info!("{unread} unread ids recorded for a re-run");
        }
    }

    fn abort(self, err: LoadError, reporter: Option<&ProgressReporter>) -> JobOutcome {
        error!("Load aborted: {err}");
        self.end(JobState::Aborted, Some(err), reporter)
    }

    fn end(
        mut self,
        state: JobState,
        error: Option<LoadError>,
        reporter: Option<&ProgressReporter>,
    ) -> JobOutcome {
        if let Some(ledger) = self.ledger.as_mut() {
            match ledger.flush() {
                Ok(()) if ledger.written() > 0 => info!(
                    "{} unwritten ids recorded in {}",
                    ledger.written(),
                    ledger.path().display()
                ),
                Ok(()) => {}
                Err(e) => warn!("Failed to flush {}: {e}", ledger.path().display()),
            }
        }
        if let Some(reporter) = reporter {
            reporter.finish(&self.stats);
        }
        JobOutcome {
            state,
            stats: self.stats,
            error,
            sample: self.sample,
        }
    }
}

fn preflight(config: &LoadConfig) -> Result<(RecordSource, Option<FailureLedger>)> {
    config.validate()?;
    let mut source = RecordSource::open(&config.source)?;
    if source.num_rows() == 0 {
        return Err(LoadError::EmptySource {
            path: config.source.display().to_string(),
        });
    }
    if let Some(path) = &config.only_ids {
        let ids = read_id_list(path)?;
        info!("Restricting load to {} ids from {}", ids.len(), path.display());
        source = source.with_only_ids(ids);
    }
    let ledger = config
        .failed_ids
        .as_deref()
        .map(FailureLedger::create)
        .transpose()?;
    Ok((source, ledger))
}

/// Run a load job end to end.
///
/// `connect` opens the store session; it is only called once pre-flight
/// has passed. Raising `stop` stops dispatching new writes and aborts the
/// job with [`LoadError::Interrupted`] once in-flight writes have returned.
pub fn run_job<S, F>(config: &LoadConfig, connect: F, stop: Arc<AtomicBool>) -> JobOutcome
where
    S: Store,
    F: FnOnce(&LoadConfig) -> std::result::Result<S, StoreError>,
{
    let mut job = Job {
        stats: JobStats::default(),
        sample: Vec::new(),
        ledger: None,
    };

    let source = match preflight(config) {
        Ok((source, ledger)) => {
            job.ledger = ledger;
            source
        }
        Err(e) => return job.abort(e, None),
    };
    info!(
        "Loading {} records from {}",
        source.expected_records(),
        source.path().display()
    );

    debug!("State: {}", JobState::Connecting);
    info!("Connecting to {}", config.store);
    let store = match connect(config) {
        Ok(store) => Arc::new(store),
        Err(e) => return job.abort(e.into(), None),
    };
    let writer = match ConcurrentWriter::new(store.clone(), config.concurrency, stop.clone()) {
        Ok(writer) => writer,
        Err(e) => return job.abort(e, None),
    };
    info!(
        "Connected to {} store; batches of {} with {} concurrent writes",
        store.name(),
        config.batch_size,
        writer.concurrency()
    );

    debug!("State: {}", JobState::Streaming);
    let reporter = ProgressReporter::new(Some(source.expected_records() as u64));
    let mut batches = match Batcher::new(source, config.batch_size) {
        Ok(batches) => batches,
        Err(e) => return job.abort(e, Some(&reporter)),
    };
    while let Some(batch) = batches.next() {
        if stop.load(Ordering::SeqCst) {
            // The batch just read was never dispatched either.
            job.record_unread(std::iter::once(batch).chain(&mut batches));
            return job.abort(LoadError::Interrupted, Some(&reporter));
        }
        let batch = match batch {
            Ok(batch) => batch,
            Err(e) => return job.abort(e, Some(&reporter)),
        };
        let outcomes = writer.write(batch);
        if let Some(ledger) = job.ledger.as_mut() {
            if let Err(e) = ledger.record(&outcomes) {
                warn!("Failed to record unwritten ids: {e}");
            }
        }
        let report = collect(&outcomes);
        reporter.report(&mut job.stats, &report);

        if report.cancelled > 0 || stop.load(Ordering::SeqCst) {
            job.record_unread(&mut batches);
            return job.abort(LoadError::Interrupted, Some(&reporter));
        }
        if report.store_unreachable() {
            job.record_unread(&mut batches);
            let cause = report
                .first_failure
                .map(|f| f.cause.message)
                .unwrap_or_default();
            return job.abort(
                LoadError::unreachable(format!("every write in batch failed: {cause}")),
                Some(&reporter),
            );
        }
    }
    debug_assert!(job.stats.is_consistent());

    if config.validate {
        debug!("State: {}", JobState::Validating);
        match store.sample(config.validate_limit) {
            Ok(rows) => {
                info!("Validation read returned {} rows", rows.len());
                for r in &rows {
                    info!(
                        "  state={}, category={}, transaction_id={}, total_value={}, purchase_date={}",
                        r.state,
                        r.category,
                        r.transaction_id,
                        r.total_value,
                        r.purchased_at()
                            .map(|t| t.to_rfc3339())
                            .unwrap_or_else(|| r.purchase_ts_ms.to_string()),
                    );
                }
                if rows.is_empty() && job.stats.succeeded > 0 {
                    warn!("Validation read returned no rows after a successful load");
                }
                job.sample = rows;
            }
            Err(e) => warn!("Validation read failed: {e}"),
        }
    }

    info!("Load completed");
    job.end(JobState::Completed, None, Some(&reporter))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::test_utils::{sample_records, write_parquet};
    use crate::store::MemoryStore;
    use std::path::PathBuf;
    use tempfile::TempDir;

    fn config_for(source: PathBuf) -> LoadConfig {
        LoadConfig {
            source,
            batch_size: 10,
            concurrency: 4,
            ..Default::default()
        }
    }

    #[test]
    fn test_completed_job() {
        let dir = TempDir::new().unwrap();
        let path = write_parquet(dir.path(), "sales.parquet", &sample_records(25));
        let outcome = run_job(&config_for(path), |_| Ok(MemoryStore::new()), Arc::default());
        assert_eq!(outcome.state, JobState::Completed);
        assert_eq!(outcome.exit_code(), 0);
        assert_eq!(outcome.stats.batches, 3);
        assert_eq!(outcome.stats.succeeded, 25);
        assert_eq!(outcome.sample.len(), 5);
    }

    #[test]
    fn test_invalid_config_never_connects() {
        let dir = TempDir::new().unwrap();
        let path = write_parquet(dir.path(), "sales.parquet", &sample_records(3));
        let config = LoadConfig {
            batch_size: 0,
            ..config_for(path)
        };
        let outcome = run_job(
            &config,
            |_| -> std::result::Result<MemoryStore, StoreError> {
                panic!("must not connect")
            },
            Arc::default(),
        );
        assert_eq!(outcome.state, JobState::Aborted);
        assert!(matches!(
            outcome.error,
            Some(LoadError::InvalidConfiguration { .. })
        ));
    }

    #[test]
    fn test_empty_source_aborts() {
        let dir = TempDir::new().unwrap();
        let path = write_parquet(dir.path(), "empty.parquet", &[]);
        let outcome = run_job(&config_for(path), |_| Ok(MemoryStore::new()), Arc::default());
        assert!(matches!(outcome.error, Some(LoadError::EmptySource { .. })));
        assert_eq!(outcome.exit_code(), 1);
    }

    #[test]
    fn test_connection_lost_mid_stream() {
        let dir = TempDir::new().unwrap();
        let path = write_parquet(dir.path(), "sales.parquet", &sample_records(30));
        let store = MemoryStore::new().with_rejection(|r| {
            (r.transaction_id.as_str() >= "T000000010")
                .then(|| StoreError::Unreachable("node down".to_string()))
        });
        let outcome = run_job(&config_for(path), move |_| Ok(store), Arc::default());
        assert_eq!(outcome.state, JobState::Aborted);
        assert!(matches!(
            outcome.error,
            Some(LoadError::StoreUnreachable { .. })
        ));
        // The first batch landed; the dead batch is accounted for, not dropped.
        assert_eq!(outcome.stats.batches, 2);
        assert_eq!(outcome.stats.succeeded, 10);
        assert_eq!(outcome.stats.failed, 10);
        assert!(outcome.stats.is_consistent());
    }

    #[test]
    fn test_dead_store_leaves_complement_in_ledger() {
        let dir = TempDir::new().unwrap();
        let path = write_parquet(dir.path(), "sales.parquet", &sample_records(45));
        let ledger = dir.path().join("unwritten.txt");
        let store = Arc::new(MemoryStore::new().with_rejection(|r| {
            (r.transaction_id.as_str() >= "T000000010")
                .then(|| StoreError::Unreachable("node down".to_string()))
        }));
        let config = LoadConfig {
            failed_ids: Some(ledger.clone()),
            ..config_for(path)
        };
        let outcome = run_job(&config, |_| Ok(store.clone()), Arc::default());
        assert!(matches!(
            outcome.error,
            Some(LoadError::StoreUnreachable { .. })
        ));
        assert_eq!(outcome.stats.records_read, 20);

        // 10 failed in the dead batch plus 25 never read.
        let ids = read_id_list(&ledger).unwrap();
        assert_eq!(ids.len(), 35);
        assert!(ids.iter().all(|id| !store.contains(id)));
        assert_eq!(ids.len() + store.len(), 45);
    }

    #[test]
    fn test_interrupt_before_dispatch_records_whole_source() {
        let dir = TempDir::new().unwrap();
        let path = write_parquet(dir.path(), "sales.parquet", &sample_records(25));
        let ledger = dir.path().join("unwritten.txt");
        let config = LoadConfig {
            failed_ids: Some(ledger.clone()),
            ..config_for(path)
        };
        let stop = Arc::new(AtomicBool::new(true));
        let outcome = run_job(&config, |_| Ok(MemoryStore::new()), stop);
        assert_eq!(outcome.error, Some(LoadError::Interrupted));
        assert_eq!(outcome.stats, JobStats::default());
        assert_eq!(read_id_list(&ledger).unwrap().len(), 25);
    }

    #[test]
    fn test_aborted_outcome_has_zero_stats() {
        let outcome = JobOutcome::aborted(LoadError::invalid_config("store", "bad address"));
        assert_eq!(outcome.state, JobState::Aborted);
        assert_eq!(outcome.exit_code(), 1);
        assert_eq!(outcome.stats, JobStats::default());
        assert!(outcome.sample.is_empty());
    }

    #[test]
    fn test_summary_serializes() {
        let outcome = JobOutcome::aborted(LoadError::Interrupted);
        let json = serde_json::to_value(JobSummary::from(&outcome)).unwrap();
        assert_eq!(json["state"], "Aborted");
        assert_eq!(json["stats"]["attempted"], 0);
        assert_eq!(json["error"], "interrupted by operator");
    }
}
