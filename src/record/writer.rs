//! Streaming Parquet writer for sales records.
//!
//! Records are buffered and flushed as one row group per `batch_size`
//! records, so producing a large table never holds more than one batch in
//! memory.
//!
//! # Thread Safety
//!
//! `SalesParquetWriter` is NOT thread-safe. Use from a single thread.

use std::fs::{self, File};
use std::path::Path;

use anyhow::{Context, Result};
use parquet::arrow::ArrowWriter;
use parquet::basic::Compression;
use parquet::file::properties::WriterProperties;

use super::schema::{sales_schema, to_record_batch};
use super::SaleRecord;

/// Default number of buffered records per row group.
const DEFAULT_BATCH_SIZE: usize = 100_000;

pub struct SalesParquetWriter {
    writer: ArrowWriter<File>,
    buffer: Vec<SaleRecord>,
    batch_size: usize,
    total_records: usize,
}

impl SalesParquetWriter {
    /// Create `path`, including missing parent directories.
    pub fn create(path: &Path) -> Result<Self> {
        Self::with_batch_size(path, DEFAULT_BATCH_SIZE)
    }

    pub fn with_batch_size(path: &Path, batch_size: usize) -> Result<Self> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                fs::create_dir_all(parent).with_context(|| {
                    format!("Failed to create output directory: {}", parent.display())
                })?;
            }
        }
        let file = File::create(path)
            .with_context(|| format!("Failed to create parquet file: {}", path.display()))?;
        let props = WriterProperties::builder()
            .set_compression(Compression::SNAPPY)
            .build();
        let writer = ArrowWriter::try_new(file, sales_schema(), Some(props))
            .context("Failed to create arrow writer")?;

        Ok(Self {
            writer,
            buffer: Vec::new(),
            batch_size: batch_size.max(1),
            total_records: 0,
        })
    }

    pub fn push(&mut self, record: SaleRecord) -> Result<()> {
        if self.buffer.is_empty() {
            self.buffer.reserve(self.batch_size);
        }
        self.buffer.push(record);
        if self.buffer.len() >= self.batch_size {
            self.flush()?;
        }
        Ok(())
    }

    /// Write buffered records as a row group.
    pub fn flush(&mut self) -> Result<()> {
        if self.buffer.is_empty() {
            return Ok(());
        }
        let batch = to_record_batch(&self.buffer).context("Failed to build sales batch")?;
        self.writer
            .write(&batch)
            .context("Failed to write sales batch")?;
        self.writer.flush().context("Failed to flush row group")?;
        self.total_records += self.buffer.len();
        self.buffer.clear();
        Ok(())
    }

    /// Flush and close the file, returning the number of records written.
    pub fn finish(mut self) -> Result<usize> {
        self.flush()?;
        self.writer.close().context("Failed to close parquet file")?;
        Ok(self.total_records)
    }
}

/// Write `records` to a new parquet file at `path`.
pub fn write_sales_parquet(path: &Path, records: &[SaleRecord]) -> Result<usize> {
    let mut writer = SalesParquetWriter::create(path)?;
    for record in records {
        writer.push(record.clone())?;
    }
    writer.finish()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::test_utils::sample_records;
    use parquet::file::reader::{FileReader, SerializedFileReader};
    use tempfile::TempDir;

    #[test]
    fn test_row_groups_follow_batch_size() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested").join("sales.parquet");
        let mut writer = SalesParquetWriter::with_batch_size(&path, 4).unwrap();
        for record in sample_records(10) {
            writer.push(record).unwrap();
        }
        assert_eq!(writer.finish().unwrap(), 10);

        let reader = SerializedFileReader::new(File::open(&path).unwrap()).unwrap();
        let metadata = reader.metadata();
        assert_eq!(metadata.file_metadata().num_rows(), 10);
        assert_eq!(metadata.num_row_groups(), 3);
    }

    #[test]
    fn test_empty_file_has_schema() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("empty.parquet");
        assert_eq!(write_sales_parquet(&path, &[]).unwrap(), 0);
        let source = crate::record::RecordSource::open(&path).unwrap();
        assert_eq!(source.num_rows(), 0);
    }
}
