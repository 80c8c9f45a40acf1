//! Common test utilities for marketload integration tests.

#![allow(dead_code)]

use std::path::{Path, PathBuf};
use std::process::{Command, Output};

use marketload::generate::SalesGenerator;
use marketload::record::write_sales_parquet;
use marketload::{LoadConfig, SaleRecord};

/// Seed shared by every fixture so failures are reproducible.
pub const FIXTURE_SEED: u64 = 42;

/// `n` synthetic records with ids `T000000001` ..= `T{n:09}`.
pub fn sales_records(n: usize) -> Vec<SaleRecord> {
    SalesGenerator::new(FIXTURE_SEED)
        .expect("Failed to create generator")
        .take(n)
        .collect()
}

/// Write `n` synthetic records to `dir/name` and return the path.
pub fn write_source(dir: &Path, name: &str, n: usize) -> PathBuf {
    let path = dir.join(name);
    write_sales_parquet(&path, &sales_records(n)).expect("Failed to write source parquet");
    path
}

/// Numeric part of a generated transaction id.
pub fn id_number(transaction_id: &str) -> u64 {
    transaction_id[1..]
        .parse()
        .expect("transaction id is not T<number>")
}

/// A load config reading `source` that skips the read-back.
pub fn load_config(source: PathBuf, batch_size: usize, concurrency: usize) -> LoadConfig {
    LoadConfig {
        source,
        batch_size,
        concurrency,
        validate: false,
        ..Default::default()
    }
}

/// Run the marketload binary with the given arguments.
pub fn run_cli(args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_marketload"))
        .args(args)
        .env("RUST_LOG", "warn")
        .output()
        .expect("Failed to run marketload")
}
