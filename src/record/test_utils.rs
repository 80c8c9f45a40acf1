//! Shared fixtures for record and pipeline unit tests.

use std::fs::File;
use std::path::{Path, PathBuf};

use arrow::record_batch::RecordBatch;
use parquet::arrow::ArrowWriter;
use parquet::basic::Compression;
use parquet::file::properties::WriterProperties;

use super::{write_sales_parquet, SaleRecord};

/// Deterministic records with ids `T000000000`, `T000000001`, ...
pub fn sample_records(n: usize) -> Vec<SaleRecord> {
    (0..n)
        .map(|i| SaleRecord {
            state: ["SP", "RJ", "MG"][i % 3].to_string(),
            category: ["Livros", "Moda"][i % 2].to_string(),
            transaction_id: format!("T{i:09}"),
            customer_id: format!("C{:06}", i % 1000),
            product_id: format!("P{:07}", i % 50),
            price: 10.0 + (i % 7) as f64,
            quantity: (i % 5) as i32 + 1,
            total_value: (10.0 + (i % 7) as f64) * ((i % 5) as f64 + 1.0),
            purchase_ts_ms: 1_546_300_800_000 + i as i64 * 60_000,
            city: "Santos".to_string(),
            payment_method: "pix".to_string(),
            device_type: "mobile".to_string(),
            rating: 4.0,
        })
        .collect()
}

/// Write records with the canonical schema.
///
/// # Panics
///
/// Panics if the file cannot be written.
pub fn write_parquet(dir: &Path, name: &str, records: &[SaleRecord]) -> PathBuf {
    let path = dir.join(name);
    write_sales_parquet(&path, records).expect("Failed to write sales parquet");
    path
}

/// Write an arbitrary batch, for schema edge cases.
///
/// # Panics
///
/// Panics if the file cannot be written.
pub fn write_batch(dir: &Path, name: &str, batch: RecordBatch) -> PathBuf {
    let path = dir.join(name);
    let file = File::create(&path).expect("Failed to create test parquet file");
    let props = WriterProperties::builder()
        .set_compression(Compression::SNAPPY)
        .build();
    let mut writer = ArrowWriter::try_new(file, batch.schema(), Some(props))
        .expect("Failed to create arrow writer");
    writer.write(&batch).expect("Failed to write batch");
    writer.close().expect("Failed to close writer");
    path
}
