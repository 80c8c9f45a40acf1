//! Lazy record source over a Parquet sales table.
//!
//! The footer is read and the schema checked when the source is opened; rows
//! are decoded one Arrow batch at a time as the iterator advances, so only a
//! single decode batch is resident ahead of the batcher. Reopening the file
//! restarts the sequence.

use std::collections::HashSet;
use std::fs::File;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use arrow::array::{
    Array, ArrayRef, Float64Array, Int32Array, RecordBatch, StringArray,
    TimestampMillisecondArray,
};
use arrow::compute::cast;
use parquet::arrow::arrow_reader::{ParquetRecordBatchReader, ParquetRecordBatchReaderBuilder};

use super::schema::{FieldKind, SALES_FIELDS};
use super::SaleRecord;
use crate::error::{LoadError, Result};

/// Rows decoded per Arrow batch.
const DECODE_BATCH_ROWS: usize = 8192;

/// Resolved position of a required field in the file schema.
#[derive(Clone, Copy, Debug)]
struct ColumnSlot {
    name: &'static str,
    kind: FieldKind,
    index: usize,
}

/// Iterator of [`SaleRecord`]s read from a Parquet file.
///
/// Yields `Err` at most once (a null or an uncoercible value), after which
/// the iterator is exhausted.
pub struct RecordSource {
    path: PathBuf,
    num_rows: usize,
    slots: Vec<ColumnSlot>,
    reader: ParquetRecordBatchReader,
    pending: std::vec::IntoIter<SaleRecord>,
    only_ids: Option<Arc<HashSet<String>>>,
    rows_decoded: usize,
    done: bool,
}

impl RecordSource {
    /// Open `path` and verify that every required field is present with a
    /// compatible encoding.
    pub fn open(path: &Path) -> Result<Self> {
        let unavailable = |message: String| LoadError::SourceUnavailable {
            path: path.display().to_string(),
            message,
        };

        if !path.exists() {
            return Err(unavailable("file not found".to_string()));
        }
        let file = File::open(path).map_err(|e| unavailable(e.to_string()))?;
        let builder =
            ParquetRecordBatchReaderBuilder::try_new(file).map_err(|e| unavailable(e.to_string()))?;

        let schema = builder.schema().clone();
        let mut slots = Vec::with_capacity(SALES_FIELDS.len());
        for (name, kind) in SALES_FIELDS {
            let index = schema.index_of(name).map_err(|_| LoadError::SchemaMismatch {
                field: name.to_string(),
                expected: kind.describe().to_string(),
                found: "missing column".to_string(),
            })?;
            let data_type = schema.field(index).data_type();
            if !kind.accepts(data_type) {
                return Err(LoadError::SchemaMismatch {
                    field: name.to_string(),
                    expected: kind.describe().to_string(),
                    found: data_type.to_string(),
                });
            }
            slots.push(ColumnSlot { name, kind, index });
        }

        let num_rows = builder.metadata().file_metadata().num_rows().max(0) as usize;
        let reader = builder
            .with_batch_size(DECODE_BATCH_ROWS)
            .build()
            .map_err(|e| unavailable(e.to_string()))?;

        Ok(Self {
            path: path.to_path_buf(),
            num_rows,
            slots,
            reader,
            pending: Vec::new().into_iter(),
            only_ids: None,
            rows_decoded: 0,
            done: false,
        })
    }

    /// Restrict the sequence to records whose transaction id is in `ids`.
    pub fn with_only_ids(mut self, ids: HashSet<String>) -> Self {
        self.only_ids = Some(Arc::new(ids));
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Row count from the Parquet footer, ignoring any id filter.
    pub fn num_rows(&self) -> usize {
        self.num_rows
    }

    /// Upper bound on the number of records this source will yield.
    pub fn expected_records(&self) -> usize {
        match &self.only_ids {
            Some(ids) => ids.len().min(self.num_rows),
            None => self.num_rows,
        }
    }

    fn next_batch(&mut self) -> Option<Result<Vec<SaleRecord>>> {
        let batch = match self.reader.next()? {
            Ok(batch) => batch,
            Err(e) => {
                return Some(Err(LoadError::SourceUnavailable {
                    path: self.path.display().to_string(),
                    message: e.to_string(),
                }))
            }
        };
        let offset = self.rows_decoded;
        self.rows_decoded += batch.num_rows();
        Some(decode_batch(&batch, &self.slots, offset))
    }
}

impl Iterator for RecordSource {
    type Item = Result<SaleRecord>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if self.done {
                return None;
            }
            if let Some(record) = self.pending.next() {
                if let Some(ids) = &self.only_ids {
                    if !ids.contains(&record.transaction_id) {
                        continue;
                    }
                }
                return Some(Ok(record));
            }
            match self.next_batch() {
                Some(Ok(records)) => self.pending = records.into_iter(),
                Some(Err(e)) => {
                    self.done = true;
                    return Some(Err(e));
                }
                None => {
                    self.done = true;
                    return None;
                }
            }
        }
    }
}

/// Cast a column to its canonical type.
fn coerce(column: &ArrayRef, slot: &ColumnSlot) -> Result<ArrayRef> {
    let target = slot.kind.canonical_type(column.data_type());
    if column.data_type() == &target {
        return Ok(column.clone());
    }
    cast(column, &target).map_err(|e| LoadError::SchemaMismatch {
        field: slot.name.to_string(),
        expected: slot.kind.describe().to_string(),
        found: format!("{} ({e})", column.data_type()),
    })
}

fn downcast<'a, T: 'static>(array: &'a ArrayRef, slot: &ColumnSlot) -> Result<&'a T> {
    array
        .as_any()
        .downcast_ref::<T>()
        .ok_or_else(|| LoadError::SchemaMismatch {
            field: slot.name.to_string(),
            expected: slot.kind.describe().to_string(),
            found: array.data_type().to_string(),
        })
}

fn decode_batch(batch: &RecordBatch, slots: &[ColumnSlot], offset: usize) -> Result<Vec<SaleRecord>> {
    let arrays = slots
        .iter()
        .map(|slot| coerce(batch.column(slot.index), slot))
        .collect::<Result<Vec<_>>>()?;

    for (array, slot) in arrays.iter().zip(slots) {
        if array.null_count() > 0 {
            let row = (0..array.len()).find(|&i| array.is_null(i)).unwrap_or(0);
            return Err(LoadError::SchemaMismatch {
                field: slot.name.to_string(),
                expected: format!("non-null {}", slot.kind.describe()),
                found: format!("null at row {}", offset + row),
            });
        }
    }

    // Slot order follows SALES_FIELDS.
    let text = |i: usize| downcast::<StringArray>(&arrays[i], &slots[i]);
    let float = |i: usize| downcast::<Float64Array>(&arrays[i], &slots[i]);
    let state = text(0)?;
    let category = text(1)?;
    let transaction_id = text(2)?;
    let customer_id = text(3)?;
    let product_id = text(4)?;
    let price = float(5)?;
    let quantity = downcast::<Int32Array>(&arrays[6], &slots[6])?;
    let total_value = float(7)?;
    let purchase_date = downcast::<TimestampMillisecondArray>(&arrays[8], &slots[8])?;
    let city = text(9)?;
    let payment_method = text(10)?;
    let device_type = text(11)?;
    let rating = float(12)?;

    let records = (0..batch.num_rows())
        .map(|i| SaleRecord {
            state: state.value(i).to_string(),
            category: category.value(i).to_string(),
            transaction_id: transaction_id.value(i).to_string(),
            customer_id: customer_id.value(i).to_string(),
            product_id: product_id.value(i).to_string(),
            price: price.value(i),
            quantity: quantity.value(i),
            total_value: total_value.value(i),
            purchase_ts_ms: purchase_date.value(i),
            city: city.value(i).to_string(),
            payment_method: payment_method.value(i).to_string(),
            device_type: device_type.value(i).to_string(),
            rating: rating.value(i),
        })
        .collect();
    Ok(records)
}
