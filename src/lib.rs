//! marketload - batched, bounded-concurrency bulk loading of marketplace
//! sales into a Cassandra-compatible store, plus the read-back reports and a
//! synthetic dataset generator.
//!
//! # Modules
//!
//! - [`record`] - the sales record, its Arrow schema, Parquet source and writer
//! - [`batch`] - fixed-size batching of the record stream
//! - [`writer`] - per-batch writer with a bounded worker pool
//! - [`collector`] - per-batch success/failure accounting
//! - [`progress`] - job-wide counters and progress log
//! - [`driver`] - the load job state machine
//! - [`store`] - Cassandra, SQLite and in-memory backends
//! - [`reports`] - aggregation reports over a full table scan
//! - [`generate`] - reproducible synthetic dataset
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use marketload::{run_job, LoadConfig, MemoryStore};
//!
//! let config = LoadConfig::default();
//! let outcome = run_job(&config, |_| Ok(MemoryStore::new()), Arc::default());
//! println!("{} records written", outcome.stats.succeeded);
//! ```

pub mod batch;
pub mod collector;
pub mod config;
pub mod driver;
pub mod error;
pub mod generate;
pub mod ledger;
pub mod progress;
pub mod record;
pub mod reports;
pub mod store;
pub mod writer;

pub use batch::{batched, Batch, Batcher, DEFAULT_BATCH_SIZE};
pub use collector::{collect, BatchReport, SampledFailure};
pub use config::{AnalyzeConfig, GenerateConfig, LoadConfig};
pub use driver::{run_job, JobOutcome, JobState, JobSummary};
pub use error::{LoadError, Result};
pub use ledger::{read_id_list, FailureLedger};
pub use progress::{JobStats, ProgressReporter};
pub use record::{RecordSource, SaleRecord};
pub use store::{
    CassandraStore, FailureKind, MemoryStore, SqliteStore, Store, StoreError, StoreTarget,
};
pub use writer::{ConcurrentWriter, WriteFailure, WriteOutcome, DEFAULT_CONCURRENCY};
