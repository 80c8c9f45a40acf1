//! Job configuration.

use std::path::PathBuf;
use std::time::Duration;

use crate::batch::DEFAULT_BATCH_SIZE;
use crate::error::{LoadError, Result};
use crate::store::StoreTarget;
use crate::writer::DEFAULT_CONCURRENCY;

/// Configuration for a load job.
#[derive(Debug, Clone)]
pub struct LoadConfig {
    /// Parquet file to load.
    pub source: PathBuf,

    pub store: StoreTarget,

    /// Records per batch.
    pub batch_size: usize,

    /// Maximum simultaneous writes within a batch.
    pub concurrency: usize,

    /// Deadline for a single write. `None` waits for the driver's own timeout.
    pub write_timeout: Option<Duration>,

    /// Read back a few rows after loading.
    pub validate: bool,

    /// Rows read back when `validate` is set.
    pub validate_limit: usize,

    /// Where to append ids of records that were not written.
    pub failed_ids: Option<PathBuf>,

    /// Restrict the source to the ids listed in this file.
    pub only_ids: Option<PathBuf>,

    /// Create the sales table if the store does not have it.
    pub create_table: bool,
}

impl Default for LoadConfig {
    fn default() -> Self {
        Self {
            source: PathBuf::from("data/raw/marketplace_bigdata_1M.parquet"),
            store: StoreTarget::default(),
            batch_size: DEFAULT_BATCH_SIZE,
            concurrency: DEFAULT_CONCURRENCY,
            write_timeout: None,
            validate: true,
            validate_limit: 5,
            failed_ids: None,
            only_ids: None,
            create_table: false,
        }
    }
}

impl LoadConfig {
    pub fn validate(&self) -> Result<()> {
        if self.batch_size == 0 {
            return Err(LoadError::invalid_config(
                "batch_size",
                "must be a positive integer",
            ));
        }
        if self.concurrency == 0 {
            return Err(LoadError::invalid_config(
                "concurrency",
                "must be a positive integer",
            ));
        }
        if self.write_timeout.is_some_and(|t| t.is_zero()) {
            return Err(LoadError::invalid_config(
                "write_timeout",
                "must be greater than zero",
            ));
        }
        if self.validate && self.validate_limit == 0 {
            return Err(LoadError::invalid_config(
                "validate_limit",
                "must be a positive integer",
            ));
        }
        Ok(())
    }
}

/// Configuration for the read-back reports.
#[derive(Debug, Clone)]
pub struct AnalyzeConfig {
    pub store: StoreTarget,
    /// Rows fetched per scan round trip.
    pub page_size: usize,
    pub output_dir: PathBuf,
    /// Log a line every this many rows read.
    pub progress_every: u64,
}

impl Default for AnalyzeConfig {
    fn default() -> Self {
        Self {
            store: StoreTarget::default(),
            page_size: 10_000,
            output_dir: PathBuf::from("data/processed"),
            progress_every: 100_000,
        }
    }
}

impl AnalyzeConfig {
    pub fn validate(&self) -> Result<()> {
        if self.page_size == 0 {
            return Err(LoadError::invalid_config(
                "page_size",
                "must be a positive integer",
            ));
        }
        Ok(())
    }
}

/// Configuration for the synthetic dataset generator.
#[derive(Debug, Clone)]
pub struct GenerateConfig {
    pub rows: usize,
    pub seed: u64,
    pub output: PathBuf,
    /// Rows per Parquet row group.
    pub chunk_rows: usize,
}

impl Default for GenerateConfig {
    fn default() -> Self {
        Self {
            rows: 1_000_000,
            seed: 42,
            output: PathBuf::from("data/raw/marketplace_bigdata_1M.parquet"),
            chunk_rows: 100_000,
        }
    }
}

impl GenerateConfig {
    pub fn validate(&self) -> Result<()> {
        if self.rows == 0 {
            return Err(LoadError::invalid_config("rows", "must be a positive integer"));
        }
        if self.chunk_rows == 0 {
            return Err(LoadError::invalid_config(
                "chunk_rows",
                "must be a positive integer",
            ));
        }
        Ok(())
    }
}
